#![allow(clippy::redundant_closure_call)]

use std::{any::type_name, sync::Arc};

use arrow_array::{self, Array, GenericStringArray, OffsetSizeTrait};
use arrow_schema::{DataType, Field, TimeUnit};
use bytes::{BufMut, BytesMut};
use enum_dispatch::enum_dispatch;

use crate::{error::Error, pg_schema_mapper::PostgresType};

/// Days between the Unix epoch (Arrow) and 2000-01-01 (Postgres).
const PG_BASE_DATE_OFFSET: i32 = 10_957;
/// Microseconds between the Unix epoch (Arrow) and 2000-01-01 (Postgres).
const PG_BASE_TIMESTAMP_OFFSET_US: i64 = 946_684_800_000_000;

const NULL_MARKER: i32 = -1;

#[inline]
fn downcast_checked<'a, T: 'static>(arr: &'a dyn Array, field: &str) -> Result<&'a T, Error> {
    arr.as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::mismatched_column_type(field, type_name::<T>(), arr.data_type()))
}

#[enum_dispatch]
pub trait Encode: std::fmt::Debug {
    /// Writes the length-prefixed value at `row`, or the null marker.
    fn encode(&self, row: usize, buf: &mut BytesMut) -> Result<(), Error>;
    /// Bytes needed to encode the whole column.
    fn size_hint(&self) -> Result<usize, Error>;
}

#[enum_dispatch(Encode)]
#[derive(Debug)]
pub enum Encoder<'a> {
    Boolean(BooleanEncoder<'a>),
    Int32(Int32Encoder<'a>),
    Int64(Int64Encoder<'a>),
    Float64(Float64Encoder<'a>),
    Date32(Date32Encoder<'a>),
    Date64(Date64Encoder<'a>),
    TimestampSecond(TimestampSecondEncoder<'a>),
    TimestampMillisecond(TimestampMillisecondEncoder<'a>),
    TimestampMicrosecond(TimestampMicrosecondEncoder<'a>),
    TimestampNanosecond(TimestampNanosecondEncoder<'a>),
    String(StringEncoder<'a>),
    LargeString(LargeStringEncoder<'a>),
    Null(NullEncoder),
}

macro_rules! impl_encode {
    ($struct_name:ident, $pg_type:expr, $transform:expr, $write:expr) => {
        impl<'a> Encode for $struct_name<'a> {
            fn encode(&self, row: usize, buf: &mut BytesMut) -> Result<(), Error> {
                if self.arr.is_null(row) {
                    buf.put_i32(NULL_MARKER);
                } else {
                    buf.put_i32(fixed_size($pg_type) as i32);
                    let v = self.arr.value(row);
                    let tv = $transform(&self.field, v)?;
                    $write(buf, tv);
                }
                Ok(())
            }
            fn size_hint(&self) -> Result<usize, Error> {
                let item_count = self.arr.len();
                let value_count = item_count - self.arr.null_count();
                Ok(item_count * 4 + value_count * fixed_size($pg_type))
            }
        }
    };
}

#[inline]
const fn fixed_size(tp: PostgresType) -> usize {
    match tp.size() {
        Some(size) => size,
        None => 0,
    }
}

#[inline(always)]
fn infallible<T>(_field: &str, v: T) -> Result<T, Error> {
    Ok(v)
}

#[derive(Debug)]
pub struct BooleanEncoder<'a> {
    arr: &'a arrow_array::BooleanArray,
    field: String,
}
impl_encode!(
    BooleanEncoder,
    PostgresType::Bool,
    |_: &str, v: bool| Ok::<_, Error>(u8::from(v)),
    BufMut::put_u8
);

#[derive(Debug)]
pub struct Int32Encoder<'a> {
    arr: &'a arrow_array::Int32Array,
    field: String,
}
impl_encode!(Int32Encoder, PostgresType::Int4, infallible, BufMut::put_i32);

#[derive(Debug)]
pub struct Int64Encoder<'a> {
    arr: &'a arrow_array::Int64Array,
    field: String,
}
impl_encode!(Int64Encoder, PostgresType::Int8, infallible, BufMut::put_i64);

#[derive(Debug)]
pub struct Float64Encoder<'a> {
    arr: &'a arrow_array::Float64Array,
    field: String,
}
impl_encode!(Float64Encoder, PostgresType::Float8, infallible, BufMut::put_f64);

/// Days since 1970-01-01 to days since 2000-01-01.
#[inline(always)]
fn convert_arrow_date32_to_postgres_date(field: &str, days: i32) -> Result<i32, Error> {
    days.checked_sub(PG_BASE_DATE_OFFSET)
        .ok_or_else(|| Error::encode(field, "date underflows the Postgres epoch offset"))
}

#[derive(Debug)]
pub struct Date32Encoder<'a> {
    arr: &'a arrow_array::Date32Array,
    field: String,
}
impl_encode!(
    Date32Encoder,
    PostgresType::Date,
    convert_arrow_date32_to_postgres_date,
    BufMut::put_i32
);

/// Units since 1970-01-01 to microseconds since 2000-01-01.
#[inline(always)]
fn to_pg_timestamp(field: &str, value: i64, unit: TimeUnit) -> Result<i64, Error> {
    let micros = match unit {
        TimeUnit::Second => value.checked_mul(1_000_000),
        TimeUnit::Millisecond => value.checked_mul(1_000),
        TimeUnit::Microsecond => Some(value),
        TimeUnit::Nanosecond => Some(value.div_euclid(1_000)),
    }
    .ok_or_else(|| Error::encode(field, "timestamp overflows microsecond precision"))?;

    micros
        .checked_sub(PG_BASE_TIMESTAMP_OFFSET_US)
        .ok_or_else(|| Error::encode(field, "timestamp underflows the Postgres epoch offset"))
}

#[derive(Debug)]
pub struct Date64Encoder<'a> {
    arr: &'a arrow_array::Date64Array,
    field: String,
}
impl_encode!(
    Date64Encoder,
    PostgresType::Timestamp,
    |field: &str, v: i64| to_pg_timestamp(field, v, TimeUnit::Millisecond),
    BufMut::put_i64
);

#[derive(Debug)]
pub struct TimestampSecondEncoder<'a> {
    arr: &'a arrow_array::TimestampSecondArray,
    field: String,
}
impl_encode!(
    TimestampSecondEncoder,
    PostgresType::Timestamp,
    |field: &str, v: i64| to_pg_timestamp(field, v, TimeUnit::Second),
    BufMut::put_i64
);

#[derive(Debug)]
pub struct TimestampMillisecondEncoder<'a> {
    arr: &'a arrow_array::TimestampMillisecondArray,
    field: String,
}
impl_encode!(
    TimestampMillisecondEncoder,
    PostgresType::Timestamp,
    |field: &str, v: i64| to_pg_timestamp(field, v, TimeUnit::Millisecond),
    BufMut::put_i64
);

#[derive(Debug)]
pub struct TimestampMicrosecondEncoder<'a> {
    arr: &'a arrow_array::TimestampMicrosecondArray,
    field: String,
}
impl_encode!(
    TimestampMicrosecondEncoder,
    PostgresType::Timestamp,
    |field: &str, v: i64| to_pg_timestamp(field, v, TimeUnit::Microsecond),
    BufMut::put_i64
);

/// Sub-microsecond precision is truncated.
#[derive(Debug)]
pub struct TimestampNanosecondEncoder<'a> {
    arr: &'a arrow_array::TimestampNanosecondArray,
    field: String,
}
impl_encode!(
    TimestampNanosecondEncoder,
    PostgresType::Timestamp,
    |field: &str, v: i64| to_pg_timestamp(field, v, TimeUnit::Nanosecond),
    BufMut::put_i64
);

#[derive(Debug)]
pub struct GenericStringEncoder<'a, O: OffsetSizeTrait> {
    arr: &'a GenericStringArray<O>,
    field: String,
}

pub type StringEncoder<'a> = GenericStringEncoder<'a, i32>;
pub type LargeStringEncoder<'a> = GenericStringEncoder<'a, i64>;

impl<O: OffsetSizeTrait> Encode for GenericStringEncoder<'_, O> {
    fn encode(&self, row: usize, buf: &mut BytesMut) -> Result<(), Error> {
        if self.arr.is_null(row) {
            buf.put_i32(NULL_MARKER);
        } else {
            let v = self.arr.value(row).as_bytes();
            let len = i32::try_from(v.len())
                .map_err(|_| Error::field_too_large(&self.field, v.len()))?;
            buf.put_i32(len);
            buf.put_slice(v);
        }
        Ok(())
    }

    fn size_hint(&self) -> Result<usize, Error> {
        let item_count = self.arr.len();
        let offsets = self.arr.value_offsets();
        let value_bytes = match (offsets.first(), offsets.last()) {
            (Some(first), Some(last)) => (*last - *first).as_usize(),
            _ => 0,
        };
        Ok(item_count * 4 + value_bytes)
    }
}

/// Every row of an Arrow `Null` column is a SQL NULL.
#[derive(Debug)]
pub struct NullEncoder {
    len: usize,
}

impl Encode for NullEncoder {
    fn encode(&self, _row: usize, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_i32(NULL_MARKER);
        Ok(())
    }

    fn size_hint(&self) -> Result<usize, Error> {
        Ok(self.len * 4)
    }
}

/// Per-column encoder factory, fixed to one Arrow field and its Postgres type.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderBuilder {
    field: Arc<Field>,
    output: PostgresType,
}

impl EncoderBuilder {
    /// Picks the Postgres type for `field`, failing for Arrow types the writer does not map.
    pub fn try_new(field: Arc<Field>) -> Result<Self, Error> {
        let output = match field.data_type() {
            DataType::Boolean => PostgresType::Bool,
            DataType::Int32 => PostgresType::Int4,
            DataType::Int64 => PostgresType::Int8,
            DataType::Float64 => PostgresType::Float8,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Null => PostgresType::Text,
            DataType::Date32 => PostgresType::Date,
            DataType::Date64 | DataType::Timestamp(_, None) => PostgresType::Timestamp,
            DataType::Timestamp(_, Some(_)) => PostgresType::TimestampTz,
            other => return Err(Error::type_unsupported(field.name(), other)),
        };
        Ok(Self { field, output })
    }

    pub fn output(&self) -> PostgresType {
        self.output
    }

    /// Binds an encoder to one column of a batch.
    pub fn try_new_encoder<'a>(&self, arr: &'a dyn Array) -> Result<Encoder<'a>, Error> {
        let name = self.field.name().as_str();
        let field = name.to_string();
        let encoder = match self.field.data_type() {
            DataType::Boolean => Encoder::Boolean(BooleanEncoder {
                arr: downcast_checked(arr, name)?,
                field,
            }),
            DataType::Int32 => Encoder::Int32(Int32Encoder {
                arr: downcast_checked(arr, name)?,
                field,
            }),
            DataType::Int64 => Encoder::Int64(Int64Encoder {
                arr: downcast_checked(arr, name)?,
                field,
            }),
            DataType::Float64 => Encoder::Float64(Float64Encoder {
                arr: downcast_checked(arr, name)?,
                field,
            }),
            DataType::Date32 => Encoder::Date32(Date32Encoder {
                arr: downcast_checked(arr, name)?,
                field,
            }),
            DataType::Date64 => Encoder::Date64(Date64Encoder {
                arr: downcast_checked(arr, name)?,
                field,
            }),
            DataType::Timestamp(TimeUnit::Second, _) => {
                Encoder::TimestampSecond(TimestampSecondEncoder {
                    arr: downcast_checked(arr, name)?,
                    field,
                })
            }
            DataType::Timestamp(TimeUnit::Millisecond, _) => {
                Encoder::TimestampMillisecond(TimestampMillisecondEncoder {
                    arr: downcast_checked(arr, name)?,
                    field,
                })
            }
            DataType::Timestamp(TimeUnit::Microsecond, _) => {
                Encoder::TimestampMicrosecond(TimestampMicrosecondEncoder {
                    arr: downcast_checked(arr, name)?,
                    field,
                })
            }
            DataType::Timestamp(TimeUnit::Nanosecond, _) => {
                Encoder::TimestampNanosecond(TimestampNanosecondEncoder {
                    arr: downcast_checked(arr, name)?,
                    field,
                })
            }
            DataType::Utf8 => Encoder::String(StringEncoder {
                arr: downcast_checked(arr, name)?,
                field,
            }),
            DataType::LargeUtf8 => Encoder::LargeString(LargeStringEncoder {
                arr: downcast_checked(arr, name)?,
                field,
            }),
            DataType::Null => {
                if arr.data_type() != &DataType::Null {
                    return Err(Error::mismatched_column_type(
                        name,
                        "NullArray",
                        arr.data_type(),
                    ));
                }
                Encoder::Null(NullEncoder { len: arr.len() })
            }
            other => return Err(Error::type_unsupported(name, other)),
        };
        Ok(encoder)
    }
}

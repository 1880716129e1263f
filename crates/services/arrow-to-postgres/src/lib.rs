//! Arrow to PostgreSQL binary COPY encoder
//!
//! Encodes an Arrow [`RecordBatch`] into the payload of
//! `COPY <table> FROM STDIN WITH (FORMAT BINARY)`.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use arrow_array::{Int64Array, RecordBatch, StringArray};
//! use arrow_schema::{DataType, Field, Schema};
//! use arrow_to_postgres::ArrowToPostgresBinaryEncoder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Arc::new(Schema::new(vec![
//!     Field::new("member_id", DataType::Int64, true),
//!     Field::new("gender", DataType::Utf8, true),
//! ]));
//! let batch = RecordBatch::try_new(
//!     schema.clone(),
//!     vec![
//!         Arc::new(Int64Array::from(vec![1, 2])),
//!         Arc::new(StringArray::from(vec![Some("F"), None])),
//!     ],
//! )?;
//!
//! let encoder = ArrowToPostgresBinaryEncoder::try_new(&schema)?;
//! let (buffer, _finished) = encoder.encode_batch(&batch)?;
//! # Ok(())
//! # }
//! ```

use std::marker::PhantomData;

use arrow_array::RecordBatch;
use arrow_schema::{Fields, Schema};
use bytes::{BufMut, BytesMut};

use crate::{
    encoders::{Encode, EncoderBuilder},
    error::Error,
    pg_schema_mapper::PostgresSchema,
};

pub mod encoders;
pub mod error;
pub mod pg_schema_mapper;

const HEADER_MAGIC_BYTES: &[u8] = b"PGCOPY\n\xff\r\n\0";
/// Magic bytes, flags field and header extension length.
const HEADER_SIZE: usize = HEADER_MAGIC_BYTES.len() + 4 + 4;
const FOOTER_SIZE: usize = 2;

/// Type-state marker: the encoder has not encoded a batch yet.
#[derive(Debug)]
pub struct Ready;

/// Type-state marker: the encoder has produced its buffer. The schema can still be queried.
#[derive(Debug)]
pub struct Finished;

/// Binary COPY encoder for one Arrow schema.
///
/// `encode_batch` consumes the [`Ready`] encoder, so each encoder produces exactly one
/// COPY payload.
#[derive(Debug)]
pub struct ArrowToPostgresBinaryEncoder<S = Ready> {
    fields: Fields,
    encoder_builders: Vec<EncoderBuilder>,
    _state: PhantomData<S>,
}

impl ArrowToPostgresBinaryEncoder<Ready> {
    /// Maps every field of `schema` to a Postgres type.
    ///
    /// Fails with [`Error::TypeNotSupported`] on the first unmappable field.
    pub fn try_new(schema: &Schema) -> Result<Self, Error> {
        let fields = schema.fields();
        let encoder_builders = fields
            .iter()
            .map(|f| EncoderBuilder::try_new(f.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ArrowToPostgresBinaryEncoder {
            fields: fields.clone(),
            encoder_builders,
            _state: PhantomData,
        })
    }

    /// Encodes header, every row and the trailer into one buffer.
    pub fn encode_batch(
        self,
        batch: &RecordBatch,
    ) -> Result<(BytesMut, ArrowToPostgresBinaryEncoder<Finished>), Error> {
        if batch.num_columns() != self.fields.len() {
            return Err(Error::ColumnCountMismatch {
                expected: self.fields.len(),
                actual: batch.num_columns(),
            });
        }

        let encoders = batch
            .columns()
            .iter()
            .zip(&self.encoder_builders)
            .map(|(col, builder)| builder.try_new_encoder(col.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let n_rows = batch.num_rows();
        let mut data_size = n_rows * 2;
        for encoder in &encoders {
            data_size += encoder.size_hint()?;
        }

        let mut buffer = BytesMut::with_capacity(HEADER_SIZE + data_size + FOOTER_SIZE);
        buffer.put(HEADER_MAGIC_BYTES);
        buffer.put_i32(0); // flags
        buffer.put_i32(0); // header extension

        let n_cols = encoders.len() as i16;
        for row in 0..n_rows {
            buffer.put_i16(n_cols);
            for encoder in &encoders {
                encoder.encode(row, &mut buffer)?;
            }
        }

        buffer.put_i16(-1);

        let finished = ArrowToPostgresBinaryEncoder {
            fields: self.fields,
            encoder_builders: self.encoder_builders,
            _state: PhantomData,
        };
        Ok((buffer, finished))
    }
}

impl<S> ArrowToPostgresBinaryEncoder<S> {
    /// Column names and Postgres types the payload is encoded as.
    pub fn schema(&self) -> PostgresSchema {
        PostgresSchema {
            columns: self
                .encoder_builders
                .iter()
                .zip(&self.fields)
                .map(|(builder, field)| (field.name().clone(), builder.output()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_array::{Date32Array, Int32Array, StringArray};
    use arrow_schema::{DataType, Field};

    use super::*;
    use crate::pg_schema_mapper::PostgresType;

    fn make_test_data() -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("qty", DataType::Int32, true),
            Field::new("gender", DataType::Utf8, true),
        ]);

        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int32Array::from(vec![Some(1), None])),
                Arc::new(StringArray::from(vec![Some("a"), None])),
            ],
        )
        .expect("Failed to build test batch")
    }

    #[test]
    fn encode_batch_writes_header_rows_and_trailer() {
        //* Given
        let batch = make_test_data();
        let encoder =
            ArrowToPostgresBinaryEncoder::try_new(&batch.schema()).expect("schema is supported");

        //* When
        let (buffer, _finished) = encoder.encode_batch(&batch).expect("batch should encode");

        //* Then
        let mut expected = BytesMut::new();
        expected.put(HEADER_MAGIC_BYTES);
        expected.put_i32(0);
        expected.put_i32(0);
        // row 0
        expected.put_i16(2);
        expected.put_i32(4);
        expected.put_i32(1);
        expected.put_i32(1);
        expected.put_slice(b"a");
        // row 1
        expected.put_i16(2);
        expected.put_i32(-1);
        expected.put_i32(-1);
        expected.put_i16(-1);
        assert_eq!(buffer, expected);
        assert_eq!(&buffer[..HEADER_MAGIC_BYTES.len()], b"PGCOPY\n\xff\r\n\0");
    }

    #[test]
    fn empty_batch_has_only_header_and_trailer() {
        //* Given
        let schema = Schema::new(vec![Field::new("qty", DataType::Int32, true)]);
        let batch = RecordBatch::new_empty(Arc::new(schema.clone()));
        let encoder = ArrowToPostgresBinaryEncoder::try_new(&schema).expect("schema is supported");

        //* When
        let (buffer, _finished) = encoder.encode_batch(&batch).expect("batch should encode");

        //* Then
        assert_eq!(buffer.len(), HEADER_SIZE + FOOTER_SIZE);
        assert_eq!(&buffer[HEADER_SIZE..], &(-1_i16).to_be_bytes());
    }

    #[test]
    fn schema_is_available_before_and_after_encoding() {
        //* Given
        let schema = Schema::new(vec![
            Field::new("member_id", DataType::Utf8, true),
            Field::new("bill_date", DataType::Date32, true),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema.clone()),
            vec![
                Arc::new(StringArray::from(vec!["M001"])),
                Arc::new(Date32Array::from(vec![19_359])),
            ],
        )
        .expect("Failed to build test batch");
        let encoder = ArrowToPostgresBinaryEncoder::try_new(&schema).expect("schema is supported");

        //* When
        let ready_schema = encoder.schema();
        let (_buffer, finished) = encoder.encode_batch(&batch).expect("batch should encode");

        //* Then
        let expected = vec![
            ("member_id".to_string(), PostgresType::Text),
            ("bill_date".to_string(), PostgresType::Date),
        ];
        assert_eq!(ready_schema.columns, expected);
        assert_eq!(finished.schema(), ready_schema);
    }

    #[test]
    fn column_count_mismatch_is_rejected() {
        //* Given
        let schema = Schema::new(vec![Field::new("qty", DataType::Int32, true)]);
        let encoder = ArrowToPostgresBinaryEncoder::try_new(&schema).expect("schema is supported");

        //* When
        let result = encoder.encode_batch(&make_test_data());

        //* Then
        assert!(matches!(
            result,
            Err(Error::ColumnCountMismatch {
                expected: 1,
                actual: 2
            })
        ));
    }
}

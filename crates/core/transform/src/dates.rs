use arrow::{
    array::{Array, ArrayRef, AsArray as _, Date32Array, StringArray},
    compute::cast,
    datatypes::{DataType, Date32Type},
    error::ArrowError,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A `bill_date` column viewed as either native dates or text to be parsed.
pub(crate) enum DateColumn {
    Dates(Date32Array),
    Text(StringArray),
}

impl DateColumn {
    /// Returns `Ok(None)` when the column type cannot hold dates.
    pub(crate) fn try_new(array: &ArrayRef) -> Result<Option<Self>, ArrowError> {
        let column = match array.data_type() {
            DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => {
                let dates = cast(array, &DataType::Date32)?;
                Some(Self::Dates(dates.as_primitive::<Date32Type>().clone()))
            }
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Null => {
                let text = cast(array, &DataType::Utf8)?;
                Some(Self::Text(text.as_string::<i32>().clone()))
            }
            _ => None,
        };
        Ok(column)
    }

    /// The date at row `i`. Nulls and unparseable text are errors.
    pub(crate) fn date(&self, i: usize) -> Result<NaiveDate, DateValueError> {
        match self {
            Self::Dates(dates) => {
                if dates.is_null(i) {
                    return Err(DateValueError::Null);
                }
                dates
                    .value_as_date(i)
                    .ok_or_else(|| DateValueError::Unparseable {
                        value: dates.value(i).to_string(),
                    })
            }
            Self::Text(text) => {
                if text.is_null(i) {
                    return Err(DateValueError::Null);
                }
                let value = text.value(i);
                parse_date(value).ok_or_else(|| DateValueError::Unparseable {
                    value: value.to_string(),
                })
            }
        }
    }
}

/// Parses a calendar date from text, ignoring any time-of-day part.
pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .or_else(|| {
            DATE_TIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
                .map(|date_time| date_time.date())
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|date_time| date_time.date_naive())
        })
}

#[derive(Debug, thiserror::Error)]
pub enum DateValueError {
    #[error("value is null")]
    Null,

    #[error("cannot parse '{value}' as a date")]
    Unparseable { value: String },
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Date64Array, TimestampMillisecondArray};

    use super::*;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid calendar date")
    }

    #[test]
    fn parse_date_accepts_common_layouts() {
        let cases = [
            "2023-01-02",
            "2023/01/02",
            "01/02/2023",
            "2023-01-02 09:15:00",
            "2023-01-02T09:15:00.250",
            "2023-01-02T09:15:00+07:00",
            " 2023-01-02 ",
        ];

        for value in cases {
            //* When
            let date = parse_date(value);

            //* Then
            assert_eq!(date, Some(ymd(2023, 1, 2)), "value {value:?}");
        }
    }

    #[test]
    fn parse_date_rejects_garbage() {
        for value in ["", "yesterday", "2023-13-01", "02.01.2023"] {
            //* When
            let date = parse_date(value);

            //* Then
            assert_eq!(date, None, "value {value:?}");
        }
    }

    #[test]
    fn date_column_reads_native_temporal_types() {
        //* Given
        let midnight_ms = ymd(2023, 1, 2)
            .and_hms_opt(0, 0, 0)
            .expect("valid time")
            .and_utc()
            .timestamp_millis();
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Date64Array::from(vec![midnight_ms])),
            Arc::new(TimestampMillisecondArray::from(vec![midnight_ms + 3_600_000])),
        ];

        for array in columns {
            //* When
            let column = DateColumn::try_new(&array)
                .expect("cast should succeed")
                .expect("temporal types should be supported");

            //* Then
            assert_eq!(
                column.date(0).expect("row should hold a date"),
                ymd(2023, 1, 2),
                "type {}",
                array.data_type()
            );
        }
    }

    #[test]
    fn date_column_reports_nulls() {
        //* Given
        let array: ArrayRef = Arc::new(StringArray::from(vec![None::<&str>]));
        let column = DateColumn::try_new(&array)
            .expect("cast should succeed")
            .expect("text should be supported");

        //* When
        let result = column.date(0);

        //* Then
        assert!(matches!(result, Err(DateValueError::Null)));
    }

    #[test]
    fn date_column_does_not_support_numbers() {
        //* Given
        let array: ArrayRef = Arc::new(arrow::array::Int64Array::from(vec![20230102]));

        //* When
        let column = DateColumn::try_new(&array).expect("no cast should be attempted");

        //* Then
        assert!(column.is_none());
    }
}

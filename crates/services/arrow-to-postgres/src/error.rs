use arrow_schema::DataType;

/// Failures while mapping or encoding a batch. Every variant names the offending column,
/// except the batch-level column count check.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The array bound to a column is not the Arrow type its field declares.
    #[error("column '{field}' holds {actual:?} data, encoder expects {expected}")]
    ColumnTypeMismatch {
        field: String,
        expected: String,
        actual: DataType,
    },

    /// The Arrow type has no PostgreSQL column type in this encoder.
    #[error("column '{field}' has unsupported type {tp}")]
    TypeNotSupported { field: String, tp: DataType },

    /// A text value is longer than the `i32` length prefix of a COPY field can express.
    #[error("value in column '{field}' is {size} bytes, above the COPY field limit")]
    FieldTooLarge { field: String, size: usize },

    /// A value is out of the range PostgreSQL can store after epoch conversion.
    #[error("cannot encode value in column '{field}': {reason}")]
    Encode { field: String, reason: String },

    #[error("batch has {actual} columns, encoder was built for {expected}")]
    ColumnCountMismatch { expected: usize, actual: usize },
}

impl Error {
    pub(crate) fn field_too_large(field: &str, size: usize) -> Self {
        Self::FieldTooLarge {
            field: field.into(),
            size,
        }
    }

    pub(crate) fn type_unsupported(field: &str, tp: &DataType) -> Self {
        Self::TypeNotSupported {
            field: field.into(),
            tp: tp.clone(),
        }
    }

    pub(crate) fn mismatched_column_type(field: &str, expected: &str, actual: &DataType) -> Self {
        Self::ColumnTypeMismatch {
            field: field.into(),
            expected: expected.into(),
            actual: actual.clone(),
        }
    }

    pub(crate) fn encode(field: &str, reason: &str) -> Self {
        Self::Encode {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_column() {
        //* Given
        let too_large = Error::field_too_large("note", 3_000_000_000);
        let out_of_range = Error::encode("bill_date", "date underflows the Postgres epoch offset");

        //* When
        let too_large = too_large.to_string();
        let out_of_range = out_of_range.to_string();

        //* Then
        assert_eq!(
            too_large,
            "value in column 'note' is 3000000000 bytes, above the COPY field limit"
        );
        assert_eq!(
            out_of_range,
            "cannot encode value in column 'bill_date': date underflows the Postgres epoch offset"
        );
    }
}

//! Identifier validation and statement builders for table replacement.
//!
//! Table names come from configuration, so they are validated before any statement is
//! built. Every identifier is quoted with `pg_escape::quote_identifier`.

use arrow_to_postgres::pg_schema_mapper::PostgresSchema;
use pg_escape::quote_identifier;

/// PostgreSQL truncates identifiers longer than this many bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, thiserror::Error)]
pub enum ValidateIdentifierError {
    #[error("identifier cannot be empty")]
    Empty,

    #[error("identifier exceeds PostgreSQL limit of {MAX_IDENTIFIER_LEN} bytes (got {length})")]
    TooLong { length: usize },

    #[error("identifier contains invalid character: '{character}'")]
    InvalidCharacter { character: char },

    #[error("identifier must start with a letter or underscore, got '{first_char}'")]
    InvalidFirstCharacter { first_char: char },
}

/// Accepts simple unqualified identifiers: ASCII letters, digits, `_` and `$`, not starting
/// with a digit or `$`.
pub fn validate_identifier(name: &str) -> Result<(), ValidateIdentifierError> {
    let Some(first_char) = name.chars().next() else {
        return Err(ValidateIdentifierError::Empty);
    };

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidateIdentifierError::TooLong { length: name.len() });
    }

    if let Some(character) = name
        .chars()
        .find(|ch| !ch.is_ascii_alphanumeric() && *ch != '_' && *ch != '$')
    {
        return Err(ValidateIdentifierError::InvalidCharacter { character });
    }

    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(ValidateIdentifierError::InvalidFirstCharacter { first_char });
    }

    Ok(())
}

pub fn drop_table_if_exists(table_name: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_identifier(table_name))
}

/// `CREATE TABLE` with one nullable column per schema entry, in schema order.
pub fn create_table(table_name: &str, schema: &PostgresSchema) -> String {
    let columns = schema
        .columns
        .iter()
        .map(|(name, data_type)| PostgresSchema::column_to_ddl(&quote_identifier(name), *data_type))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", quote_identifier(table_name), columns)
}

pub fn copy_from_stdin(table_name: &str) -> String {
    format!(
        "COPY {} FROM STDIN WITH (FORMAT BINARY)",
        quote_identifier(table_name)
    )
}

#[cfg(test)]
mod tests {
    use arrow_to_postgres::pg_schema_mapper::PostgresType;

    use super::*;

    #[test]
    fn validate_identifier_accepts_simple_names() {
        for name in ["lf_data", "lf_customer", "_staging", "Sales2023", "a$b"] {
            assert!(validate_identifier(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn validate_identifier_rejects_unsafe_names() {
        //* When
        let empty = validate_identifier("");
        let too_long = validate_identifier(&"a".repeat(64));
        let injection = validate_identifier("lf_data; DROP TABLE users");
        let qualified = validate_identifier("public.lf_data");
        let leading_digit = validate_identifier("1table");

        //* Then
        assert!(matches!(empty, Err(ValidateIdentifierError::Empty)));
        assert!(matches!(
            too_long,
            Err(ValidateIdentifierError::TooLong { length: 64 })
        ));
        assert!(matches!(
            injection,
            Err(ValidateIdentifierError::InvalidCharacter { character: ';' })
        ));
        assert!(matches!(
            qualified,
            Err(ValidateIdentifierError::InvalidCharacter { character: '.' })
        ));
        assert!(matches!(
            leading_digit,
            Err(ValidateIdentifierError::InvalidFirstCharacter { first_char: '1' })
        ));
    }

    #[test]
    fn create_table_quotes_columns_that_need_it() {
        //* Given
        let schema = PostgresSchema {
            columns: vec![
                ("member_id".to_string(), PostgresType::Text),
                ("Bill Date".to_string(), PostgresType::Date),
                ("amount".to_string(), PostgresType::Float8),
            ],
        };

        //* When
        let sql = create_table("lf_data", &schema);

        //* Then
        assert_eq!(
            sql,
            "CREATE TABLE lf_data (member_id TEXT, \"Bill Date\" DATE, amount DOUBLE PRECISION)"
        );
    }

    #[test]
    fn replacement_statements_target_the_quoted_table() {
        //* When
        let drop = drop_table_if_exists("LfData");
        let copy = copy_from_stdin("LfData");

        //* Then
        assert_eq!(drop, "DROP TABLE IF EXISTS \"LfData\"");
        assert_eq!(copy, "COPY \"LfData\" FROM STDIN WITH (FORMAT BINARY)");
    }
}

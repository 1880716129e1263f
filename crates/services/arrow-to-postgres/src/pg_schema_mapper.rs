/// PostgreSQL column types produced by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostgresType {
    Bool,
    Int4,
    Int8,
    Float8,
    Text,
    Date,
    /// Without time zone. Values are microseconds since 2000-01-01.
    Timestamp,
    /// Same wire format as `Timestamp`, read by Postgres as a UTC instant.
    TimestampTz,
}

impl PostgresType {
    /// Width of the binary representation, `None` for variable sized types.
    pub const fn size(&self) -> Option<usize> {
        match self {
            PostgresType::Bool => Some(1),
            PostgresType::Int4 => Some(4),
            PostgresType::Int8 => Some(8),
            PostgresType::Float8 => Some(8),
            PostgresType::Text => None,
            PostgresType::Date => Some(4),
            PostgresType::Timestamp | PostgresType::TimestampTz => Some(8),
        }
    }

    /// Type name as used in `CREATE TABLE` statements.
    pub const fn to_ddl_string(&self) -> &'static str {
        match self {
            PostgresType::Bool => "BOOLEAN",
            PostgresType::Int4 => "INTEGER",
            PostgresType::Int8 => "BIGINT",
            PostgresType::Float8 => "DOUBLE PRECISION",
            PostgresType::Text => "TEXT",
            PostgresType::Date => "DATE",
            PostgresType::Timestamp => "TIMESTAMP",
            PostgresType::TimestampTz => "TIMESTAMPTZ",
        }
    }
}

impl std::fmt::Display for PostgresType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_ddl_string())
    }
}

/// Column names and types of the table an encoder writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresSchema {
    pub columns: Vec<(String, PostgresType)>,
}

impl PostgresSchema {
    /// Renders one nullable column definition, e.g. `"bill_date" DATE`.
    ///
    /// `quoted_name` must already be a quoted identifier.
    pub fn column_to_ddl(quoted_name: &str, data_type: PostgresType) -> String {
        format!("{quoted_name} {}", data_type.to_ddl_string())
    }
}

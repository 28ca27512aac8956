// ABOUTME: Table and column metadata shared by every stage of the diff
// ABOUTME: Classifies vendor type names into semantic column categories

use std::cmp::Ordering;
use std::fmt;

/// Semantic category of a declared column type.
///
/// Vendor type names are folded into these categories so literal encoding
/// does not depend on which database produced the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Decimal,
    Float,
    Boolean,
    Text,
    Date,
    Time,
    Timestamp,
    Uuid,
    Json,
    /// BLOB-like types. Not representable as a delimited literal.
    LargeBinary,
    /// CLOB-like types. Not representable as a delimited literal.
    LargeText,
    /// No declared type (SQLite). Values keep whatever storage class they were written with.
    Untyped,
    /// Anything unrecognised. Text values are quoted, numbers stored as numbers stay bare.
    Other(String),
}

impl ColumnType {
    /// Classify a declared type name such as `VARCHAR2(40)` or `timestamp with time zone`.
    pub fn from_declared(declared: &str) -> Self {
        let lowered = declared.trim().to_ascii_lowercase();
        // Drop precision/length suffixes: numeric(10,2), varchar(255)
        let base = match lowered.find('(') {
            Some(idx) => {
                let mut stripped = lowered[..idx].trim_end().to_string();
                if let Some(close) = lowered[idx..].find(')') {
                    stripped.push_str(&lowered[idx + close + 1..]);
                }
                stripped
            }
            None => lowered,
        };
        let base = base.trim();

        match base {
            "int" | "integer" | "int2" | "int4" | "int8" | "smallint" | "bigint" | "tinyint"
            | "mediumint" | "serial" | "bigserial" | "smallserial" | "oid" => ColumnType::Integer,
            "numeric" | "decimal" | "number" => ColumnType::Decimal,
            "real" | "float" | "float4" | "float8" | "double" | "double precision"
            | "binary_float" | "binary_double" => ColumnType::Float,
            "bool" | "boolean" => ColumnType::Boolean,
            "text" | "char" | "character" | "varchar" | "varchar2" | "nvarchar"
            | "nvarchar2" | "nchar" | "character varying" | "bpchar" | "name" | "citext"
            | "string" | "tinytext" => ColumnType::Text,
            "date" => ColumnType::Date,
            "time" | "time without time zone" | "time with time zone" | "timetz" => {
                ColumnType::Time
            }
            "timestamp" | "timestamptz" | "datetime" | "timestamp without time zone"
            | "timestamp with time zone" | "timestamp with local time zone" => {
                ColumnType::Timestamp
            }
            "uuid" => ColumnType::Uuid,
            "json" | "jsonb" => ColumnType::Json,
            "blob" | "bytea" | "raw" | "long raw" | "bfile" | "image" | "varbinary"
            | "binary" | "longblob" | "mediumblob" | "tinyblob" => ColumnType::LargeBinary,
            "clob" | "nclob" | "long" | "longtext" | "mediumtext" => ColumnType::LargeText,
            // SQLite declares untyped columns with an empty type
            "" => ColumnType::Untyped,
            _ => ColumnType::Other(declared.trim().to_string()),
        }
    }

    /// Large object types whose values cannot be emitted as literals.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ColumnType::LargeBinary | ColumnType::LargeText)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Integer | ColumnType::Decimal | ColumnType::Float
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "integer",
            ColumnType::Decimal => "decimal",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Uuid => "uuid",
            ColumnType::Json => "json",
            ColumnType::LargeBinary => "large binary",
            ColumnType::LargeText => "large text",
            ColumnType::Untyped => "untyped",
            ColumnType::Other(name) => name,
        };
        f.write_str(name)
    }
}

/// The single ordering used wherever column order matters: key building,
/// row lookup predicates and INSERT column lists.
pub fn column_order(a: &str, b: &str) -> Ordering {
    a.cmp(b)
}

/// One column of a table as seen by the diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    /// Type name as the catalog reported it.
    pub declared_type: String,
    pub column_type: ColumnType,
    /// Whether the column takes part in the row identity.
    pub is_identity: bool,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>, is_identity: bool) -> Self {
        let declared_type = declared_type.into();
        Self {
            name: name.into(),
            column_type: ColumnType::from_declared(&declared_type),
            declared_type,
            is_identity,
        }
    }
}

impl PartialOrd for ColumnMetadata {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ColumnMetadata {
    fn cmp(&self, other: &Self) -> Ordering {
        column_order(&self.name, &other.name)
    }
}

/// A candidate table and its columns.
///
/// Columns are held in name order so every consumer iterates them the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    name: String,
    columns: Vec<ColumnMetadata>,
}

impl TableMetadata {
    pub fn new(name: impl Into<String>, mut columns: Vec<ColumnMetadata>) -> Self {
        columns.sort();
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All columns, in name order.
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    /// Identity columns, in name order.
    pub fn identity_columns(&self) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns.iter().filter(|c| c.is_identity)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }
}

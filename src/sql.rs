// ABOUTME: SQL text rendering for identifiers, literals and statements
// ABOUTME: Every value is encoded by its column category before it reaches SQL text

use crate::error::{DiffError, DiffResult};
use crate::schema::{ColumnMetadata, ColumnType};
use crate::snapshot::SqlValue;

/// SQL dialect of a snapshot. Only affects identifier rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

/// PostgreSQL keywords that are reserved, or only usable as a column or
/// function/type name. Unreserved keywords read back fine when bare.
const POSTGRES_KEYWORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "authorization", "between", "bigint", "binary", "bit", "boolean", "both", "case", "cast",
    "char", "character", "check", "coalesce", "collate", "collation", "column", "concurrently",
    "constraint", "create", "cross", "current_catalog", "current_date", "current_role",
    "current_schema", "current_time", "current_timestamp", "current_user", "dec", "decimal",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "exists",
    "extract", "false", "fetch", "float", "for", "foreign", "freeze", "from", "full", "grant",
    "greatest", "group", "grouping", "having", "ilike", "in", "initially", "inner", "inout",
    "int", "integer", "intersect", "interval", "into", "is", "isnull", "join", "json",
    "json_array", "json_arrayagg", "json_exists", "json_object", "json_objectagg",
    "json_query", "json_scalar", "json_serialize", "json_table", "json_value", "lateral",
    "leading", "least", "left", "like", "limit", "localtime", "localtimestamp", "merge_action",
    "national", "natural", "nchar", "none", "normalize", "not", "notnull", "null", "nullif",
    "numeric", "offset", "on", "only", "or", "order", "out", "outer", "overlaps", "overlay",
    "placing", "position", "precision", "primary", "real", "references", "returning", "right",
    "row", "select", "session_user", "setof", "similar", "smallint", "some", "substring",
    "symmetric", "system_user", "table", "tablesample", "then", "time", "timestamp", "to",
    "trailing", "treat", "trim", "true", "union", "unique", "user", "using", "values",
    "varchar", "variadic", "verbose", "when", "where", "window", "with", "xmlattributes",
    "xmlconcat", "xmlelement", "xmlexists", "xmlforest", "xmlnamespaces", "xmlparse", "xmlpi",
    "xmlroot", "xmlserialize", "xmltable",
];

/// Every SQLite keyword, plus the TRUE/FALSE constants.
const SQLITE_KEYWORDS: &[&str] = &[
    "abort", "action", "add", "after", "all", "alter", "always", "analyze", "and", "as", "asc",
    "attach", "autoincrement", "before", "begin", "between", "by", "cascade", "case", "cast",
    "check", "collate", "column", "commit", "conflict", "constraint", "create", "cross",
    "current", "current_date", "current_time", "current_timestamp", "database", "default",
    "deferrable", "deferred", "delete", "desc", "detach", "distinct", "do", "drop", "each",
    "else", "end", "escape", "except", "exclude", "exclusive", "exists", "explain", "fail",
    "false", "filter", "first", "following", "for", "foreign", "from", "full", "generated",
    "glob", "group", "groups", "having", "if", "ignore", "immediate", "in", "index", "indexed",
    "initially", "inner", "insert", "instead", "intersect", "into", "is", "isnull", "join",
    "key", "last", "left", "like", "limit", "match", "materialized", "natural", "no", "not",
    "nothing", "notnull", "null", "nulls", "of", "offset", "on", "or", "order", "others",
    "outer", "over", "partition", "plan", "pragma", "preceding", "primary", "query", "raise",
    "range", "recursive", "references", "regexp", "reindex", "release", "rename", "replace",
    "restrict", "returning", "right", "rollback", "row", "rows", "savepoint", "select", "set",
    "table", "temp", "temporary", "then", "ties", "to", "transaction", "trigger", "true",
    "unbounded", "union", "unique", "update", "using", "vacuum", "values", "view", "virtual",
    "when", "where", "window", "with", "without",
];

/// Quote an identifier (table, column)
///
/// Escapes embedded quotes and wraps the identifier in double quotes.
pub fn quote_ident(identifier: &str) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push('"');
    for ch in identifier.chars() {
        if ch == '"' {
            quoted.push('"');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Quote a SQL string literal
///
/// Escapes single quotes by doubling them and wraps the string in single quotes.
///
/// # Examples
///
/// ```
/// use db_insert_diff::sql::quote_literal;
/// assert_eq!(quote_literal("hello"), "'hello'");
/// assert_eq!(quote_literal("it's"), "'it''s'");
/// assert_eq!(quote_literal(""), "''");
/// ```
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push('\'');
        }
        quoted.push(ch);
    }
    quoted.push('\'');
    quoted
}

/// Render an identifier bare when the dialect reads it back unchanged, quoted otherwise.
///
/// PostgreSQL folds unquoted names to lower case, so only lower-case plain
/// identifiers stay bare there. SQLite compares names case-insensitively.
///
/// # Examples
///
/// ```
/// use db_insert_diff::sql::{render_ident, Dialect};
/// assert_eq!(render_ident("users", Dialect::Postgres), "users");
/// assert_eq!(render_ident("Users", Dialect::Postgres), "\"Users\"");
/// assert_eq!(render_ident("Users", Dialect::Sqlite), "Users");
/// assert_eq!(render_ident("order", Dialect::Sqlite), "\"order\"");
/// ```
pub fn render_ident(identifier: &str, dialect: Dialect) -> String {
    if is_plain_identifier(identifier, dialect) {
        identifier.to_string()
    } else {
        quote_ident(identifier)
    }
}

fn is_plain_identifier(identifier: &str, dialect: Dialect) -> bool {
    let mut chars = identifier.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    let allowed = |c: char| match dialect {
        Dialect::Postgres => c.is_ascii_lowercase() || c == '_',
        Dialect::Sqlite => c.is_ascii_alphabetic() || c == '_',
    };
    if !allowed(first) {
        return false;
    }
    if !chars.all(|c| allowed(c) || c.is_ascii_digit()) {
        return false;
    }
    let keywords = match dialect {
        Dialect::Postgres => POSTGRES_KEYWORDS,
        Dialect::Sqlite => SQLITE_KEYWORDS,
    };
    !keywords.contains(&identifier.to_ascii_lowercase().as_str())
}

/// Whether `value` is a plain numeric literal: `[+-]digits[.digits][e[+-]digits]`.
pub fn is_numeric_literal(value: &str) -> bool {
    let bytes = value.as_bytes();
    let mut pos = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        pos += 1;
    }

    let int_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    let mut digits = pos - int_start;

    if pos < bytes.len() && bytes[pos] == b'.' {
        pos += 1;
        let frac_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        digits += pos - frac_start;
    }
    if digits == 0 {
        return false;
    }

    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        pos += 1;
        if pos < bytes.len() && (bytes[pos] == b'+' || bytes[pos] == b'-') {
            pos += 1;
        }
        let exp_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        if pos == exp_start {
            return false;
        }
    }

    pos == bytes.len()
}

fn parse_boolean(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "1" | "y" | "yes" | "on" => Some(true),
        "f" | "false" | "0" | "n" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn encode_error(table: &str, column: &ColumnMetadata, value: &str) -> DiffError {
    DiffError::Encode {
        table: table.to_string(),
        column: column.name.clone(),
        value: value.to_string(),
        category: column.column_type.to_string(),
    }
}

/// Encode a textual column value as a SQL literal according to its category.
pub fn encode_literal(table: &str, column: &ColumnMetadata, value: &str) -> DiffResult<String> {
    let invalid = || encode_error(table, column, value);

    match &column.column_type {
        ColumnType::Integer | ColumnType::Decimal | ColumnType::Float => {
            let trimmed = value.trim();
            if is_numeric_literal(trimmed) {
                Ok(trimmed.to_string())
            } else if matches!(
                trimmed,
                "NaN" | "Infinity" | "-Infinity" | "inf" | "-inf"
            ) && column.column_type != ColumnType::Integer
            {
                Ok(quote_literal(trimmed))
            } else {
                Err(invalid())
            }
        }
        ColumnType::Boolean => match parse_boolean(value) {
            Some(true) => Ok("TRUE".to_string()),
            Some(false) => Ok("FALSE".to_string()),
            None => Err(invalid()),
        },
        ColumnType::LargeBinary | ColumnType::LargeText => Err(invalid()),
        _ => Ok(quote_literal(value)),
    }
}

/// Encode a value read from a snapshot.
///
/// Columns without a known category take the value's storage class: a number
/// stays a bare numeric literal, so SQLite compares and stores it as a number.
pub fn encode_value(
    table: &str,
    column: &ColumnMetadata,
    value: &SqlValue,
) -> DiffResult<String> {
    match (&column.column_type, value) {
        (ColumnType::Untyped | ColumnType::Other(_), SqlValue::Number(number)) => {
            if is_numeric_literal(number) {
                Ok(number.clone())
            } else {
                // SQLite reads an overflowing literal back as an infinite REAL
                match number.as_str() {
                    "inf" => Ok("9e999".to_string()),
                    "-inf" => Ok("-9e999".to_string()),
                    _ => Err(encode_error(table, column, number)),
                }
            }
        }
        (_, value) => encode_literal(table, column, value.as_str()),
    }
}

/// `SELECT * FROM <table>`
pub fn select_all(table: &str, dialect: Dialect) -> String {
    format!("SELECT * FROM {}", render_ident(table, dialect))
}

/// `SELECT * FROM <table> WHERE a = .. AND b = ..` for the given encoded predicate terms.
///
/// A `None` value becomes `IS NULL`.
pub fn select_matching(
    table: &str,
    predicate: &[(String, Option<String>)],
    dialect: Dialect,
) -> String {
    let terms: Vec<String> = predicate
        .iter()
        .map(|(column, literal)| match literal {
            Some(literal) => format!("{} = {}", render_ident(column, dialect), literal),
            None => format!("{} IS NULL", render_ident(column, dialect)),
        })
        .collect();

    if terms.is_empty() {
        select_all(table, dialect)
    } else {
        format!(
            "SELECT * FROM {} WHERE {}",
            render_ident(table, dialect),
            terms.join(" AND ")
        )
    }
}

/// `INSERT INTO <table> (<cols>) VALUES (<vals>)<terminator>`
///
/// `columns` and `values` must already be in lockstep. A row without any
/// captured value falls back to `DEFAULT VALUES`.
pub fn render_insert(
    table: &str,
    columns: &[String],
    values: &[String],
    dialect: Dialect,
    terminator: &str,
) -> String {
    debug_assert_eq!(columns.len(), values.len());
    if columns.is_empty() {
        return format!(
            "INSERT INTO {} DEFAULT VALUES{}",
            render_ident(table, dialect),
            terminator
        );
    }
    let cols: Vec<String> = columns.iter().map(|c| render_ident(c, dialect)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}){}",
        render_ident(table, dialect),
        cols.join(","),
        values.join(","),
        terminator
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, declared: &str) -> ColumnMetadata {
        ColumnMetadata::new(name, declared, false)
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_render_ident_per_dialect() {
        assert_eq!(render_ident("T", Dialect::Sqlite), "T");
        assert_eq!(render_ident("T", Dialect::Postgres), "\"T\"");
        assert_eq!(render_ident("a_id", Dialect::Postgres), "a_id");
        assert_eq!(render_ident("1col", Dialect::Sqlite), "\"1col\"");
        assert_eq!(render_ident("has space", Dialect::Sqlite), "\"has space\"");
        assert_eq!(render_ident("user", Dialect::Postgres), "\"user\"");
        assert_eq!(render_ident("", Dialect::Postgres), "\"\"");
    }

    #[test]
    fn test_render_ident_quotes_keywords() {
        for word in [
            "left", "right", "full", "only", "for", "window", "array", "cast", "true", "fetch",
            "grant", "current_date", "current_user", "time", "natural",
        ] {
            assert_eq!(
                render_ident(word, Dialect::Postgres),
                format!("\"{}\"", word),
                "{} must be quoted",
                word
            );
        }
        for word in ["left", "current_date", "key", "true", "replace", "rows"] {
            assert_eq!(render_ident(word, Dialect::Sqlite), format!("\"{}\"", word));
        }
        assert_eq!(render_ident("Left", Dialect::Sqlite), "\"Left\"");
        // Unreserved words stay bare
        assert_eq!(render_ident("name", Dialect::Postgres), "name");
        assert_eq!(render_ident("value", Dialect::Sqlite), "value");
    }

    #[test]
    fn test_select_matching_quotes_keyword_columns() {
        let sql = select_matching(
            "sessions",
            &[("current_user".to_string(), Some("'bob'".to_string()))],
            Dialect::Postgres,
        );
        assert_eq!(sql, "SELECT * FROM sessions WHERE \"current_user\" = 'bob'");
    }

    #[test]
    fn test_is_numeric_literal() {
        for ok in ["0", "42", "-7", "+3", "3.14", ".5", "5.", "1e10", "-2.5E-3"] {
            assert!(is_numeric_literal(ok), "{} should be numeric", ok);
        }
        for bad in ["", "-", ".", "1e", "1.2.3", "12abc", "1; DROP TABLE t", "0x10", " 1"] {
            assert!(!is_numeric_literal(bad), "{} should not be numeric", bad);
        }
    }

    #[test]
    fn test_encode_numeric_unquoted() {
        let col = column("id", "integer");
        assert_eq!(encode_literal("t", &col, "2").unwrap(), "2");
        assert_eq!(encode_literal("t", &col, " 15 ").unwrap(), "15");
    }

    #[test]
    fn test_encode_numeric_rejects_injection() {
        let col = column("id", "numeric");
        let err = encode_literal("t", &col, "1 OR 1=1").unwrap_err();
        assert!(matches!(err, DiffError::Encode { .. }));
    }

    #[test]
    fn test_encode_float_special_values() {
        let col = column("ratio", "double precision");
        assert_eq!(encode_literal("t", &col, "NaN").unwrap(), "'NaN'");
        assert_eq!(encode_literal("t", &col, "-Infinity").unwrap(), "'-Infinity'");
        let int_col = column("n", "integer");
        assert!(encode_literal("t", &int_col, "NaN").is_err());
    }

    #[test]
    fn test_encode_text_escapes_quotes() {
        let col = column("name", "varchar(20)");
        assert_eq!(encode_literal("t", &col, "b").unwrap(), "'b'");
        assert_eq!(
            encode_literal("t", &col, "O'Brien'); DROP TABLE t; --").unwrap(),
            "'O''Brien''); DROP TABLE t; --'"
        );
    }

    #[test]
    fn test_encode_boolean() {
        let col = column("active", "boolean");
        assert_eq!(encode_literal("t", &col, "t").unwrap(), "TRUE");
        assert_eq!(encode_literal("t", &col, "0").unwrap(), "FALSE");
        assert!(encode_literal("t", &col, "maybe").is_err());
    }

    #[test]
    fn test_encode_money_is_quoted() {
        let col = column("price", "money");
        assert_eq!(encode_literal("t", &col, "$12.34").unwrap(), "'$12.34'");
    }

    #[test]
    fn test_encode_value_follows_storage_class_when_untyped() {
        let col = column("id", "");
        assert_eq!(
            encode_value("t", &col, &SqlValue::Number("2".to_string())).unwrap(),
            "2"
        );
        assert_eq!(
            encode_value("t", &col, &SqlValue::Text("2".to_string())).unwrap(),
            "'2'"
        );
        assert_eq!(
            encode_value("t", &col, &SqlValue::Number("-inf".to_string())).unwrap(),
            "-9e999"
        );
    }

    #[test]
    fn test_encode_value_typed_columns_ignore_storage_class() {
        let text = column("name", "text");
        assert_eq!(
            encode_value("t", &text, &SqlValue::Number("7".to_string())).unwrap(),
            "'7'"
        );
        let int = column("n", "integer");
        assert_eq!(
            encode_value("t", &int, &SqlValue::Text("7".to_string())).unwrap(),
            "7"
        );
    }

    #[test]
    fn test_encode_dates_are_quoted() {
        let col = column("created", "date");
        assert_eq!(encode_literal("t", &col, "2024-01-31").unwrap(), "'2024-01-31'");
    }

    #[test]
    fn test_select_matching_joins_with_and() {
        let sql = select_matching(
            "J",
            &[
                ("a_id".to_string(), Some("3".to_string())),
                ("b_id".to_string(), Some("4".to_string())),
            ],
            Dialect::Sqlite,
        );
        assert_eq!(sql, "SELECT * FROM J WHERE a_id = 3 AND b_id = 4");
    }

    #[test]
    fn test_select_matching_null_term() {
        let sql = select_matching(
            "t",
            &[("code".to_string(), None)],
            Dialect::Postgres,
        );
        assert_eq!(sql, "SELECT * FROM t WHERE code IS NULL");
    }

    #[test]
    fn test_render_insert() {
        let sql = render_insert(
            "T",
            &["id".to_string(), "name".to_string()],
            &["2".to_string(), "'b'".to_string()],
            Dialect::Sqlite,
            ";",
        );
        assert_eq!(sql, "INSERT INTO T (id,name) VALUES (2,'b');");
    }

    #[test]
    fn test_render_insert_without_values() {
        let sql = render_insert("t", &[], &[], Dialect::Postgres, ";");
        assert_eq!(sql, "INSERT INTO t DEFAULT VALUES;");
    }
}

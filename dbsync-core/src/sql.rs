//! MySQL statement construction helpers.
//!
//! Identifier quoting, literal escaping and the handful of statements the
//! orchestrator issues itself (`CREATE DATABASE`, `DROP ... IF EXISTS`,
//! batched `INSERT`). Identifiers always go through [`quote_identifier`],
//! even when they come from a privileged caller.

use crate::models::{Row, SchemaObjectKind};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Key used to carry binary cell values as base64 text.
pub const BASE64_CELL_KEY: &str = "base64";

/// Quotes a MySQL identifier with backticks, doubling embedded backticks.
///
/// ```rust
/// use dbsync_core::sql::quote_identifier;
///
/// assert_eq!(quote_identifier("users"), "`users`");
/// assert_eq!(quote_identifier("we`ird"), "`we``ird`");
/// ```
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quotes a string as a MySQL literal.
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len().saturating_add(2));
    quoted.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\0' => quoted.push_str("\\0"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\u{1a}' => quoted.push_str("\\Z"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    quoted
}

/// Renders a wire cell value as a SQL literal.
pub fn value_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_literal(s),
        Value::Object(map) => match (map.len(), map.get(BASE64_CELL_KEY)) {
            (1, Some(Value::String(encoded))) => format!("FROM_BASE64({})", quote_literal(encoded)),
            _ => quote_literal(&value.to_string()),
        },
        Value::Array(_) => quote_literal(&value.to_string()),
    }
}

/// Builds one multi-row `INSERT` for a page of rows.
///
/// Columns are the union of keys across the page in order of first
/// appearance; rows lacking a column get `NULL`. Returns `None` for an empty
/// page.
pub fn build_insert(table: &str, rows: &[Row]) -> Option<String> {
    if rows.is_empty() {
        return None;
    }

    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let column_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");

    let tuples = rows
        .iter()
        .map(|row| {
            let values = columns
                .iter()
                .map(|c| row.get(*c).map_or_else(|| "NULL".to_string(), value_literal))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", values)
        })
        .collect::<Vec<_>>()
        .join(",\n");

    Some(format!(
        "INSERT INTO {} ({}) VALUES\n{}",
        quote_identifier(table),
        column_list,
        tuples
    ))
}

/// `DROP <kind> IF EXISTS` for one object.
pub fn drop_if_exists(kind: SchemaObjectKind, name: &str) -> String {
    format!(
        "DROP {} IF EXISTS {}",
        kind.sql_keyword(),
        quote_identifier(name)
    )
}

/// `CREATE DATABASE IF NOT EXISTS` with a utf8mb4 default character set.
pub fn create_database(name: &str) -> String {
    format!(
        "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
        quote_identifier(name)
    )
}

/// `USE` statement for a database.
pub fn use_database(name: &str) -> String {
    format!("USE {}", quote_identifier(name))
}

/// True when the statement creates a database (or schema).
pub fn is_create_database(statement: &str) -> bool {
    let mut words = statement.split_whitespace().map(str::to_ascii_uppercase);
    matches!(
        (words.next().as_deref(), words.next().as_deref()),
        (Some("CREATE"), Some("DATABASE" | "SCHEMA"))
    )
}

fn definer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)\bDEFINER\s*=\s*(?:CURRENT_USER(?:\s*\(\s*\))?|(?:`(?:[^`]|``)*`|'(?:[^']|'')*'|[^\s@]+)\s*@\s*(?:`(?:[^`]|``)*`|'(?:[^']|'')*'|\S+))\s*",
        )
        .expect("Invalid DEFINER pattern")
    })
}

/// Removes the `DEFINER=user@host` clause from view, routine or trigger DDL
/// so it can be recreated by a local account that lacks `SET_USER_ID`.
///
/// ```rust
/// use dbsync_core::sql::strip_definer;
///
/// let ddl = "CREATE DEFINER=`app`@`%` PROCEDURE `p`() SELECT 1";
/// assert_eq!(strip_definer(ddl), "CREATE PROCEDURE `p`() SELECT 1");
/// ```
pub fn strip_definer(statement: &str) -> String {
    definer_pattern().replacen(statement, 1, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_quote_literal_escapes() {
        assert_eq!(quote_literal("O'Brien"), r"'O\'Brien'");
        assert_eq!(quote_literal("a\\b"), r"'a\\b'");
        assert_eq!(quote_literal("line\nnext"), r"'line\nnext'");
        assert_eq!(quote_literal("nul\0"), r"'nul\0'");
    }

    #[test]
    fn test_value_literal() {
        assert_eq!(value_literal(&Value::Null), "NULL");
        assert_eq!(value_literal(&json!(true)), "1");
        assert_eq!(value_literal(&json!(42)), "42");
        assert_eq!(value_literal(&json!(-1.5)), "-1.5");
        assert_eq!(value_literal(&json!("x")), "'x'");
        assert_eq!(
            value_literal(&json!({"base64": "AAE="})),
            "FROM_BASE64('AAE=')"
        );
        assert_eq!(value_literal(&json!({"a": 1})), r#"'{"a":1}'"#);
        assert_eq!(value_literal(&json!([1, 2])), "'[1,2]'");
    }

    #[test]
    fn test_build_insert_single_batch() {
        let rows = vec![
            row(&[("id", json!(1)), ("name", json!("ann"))]),
            row(&[("id", json!(2)), ("name", Value::Null)]),
        ];
        let sql = build_insert("users", &rows).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO `users` (`id`, `name`) VALUES\n(1, 'ann'),\n(2, NULL)"
        );
    }

    #[test]
    fn test_build_insert_missing_columns_become_null() {
        let rows = vec![
            row(&[("id", json!(1))]),
            row(&[("id", json!(2)), ("note", json!("n"))]),
        ];
        let sql = build_insert("t", &rows).unwrap();
        assert!(sql.contains("(`id`, `note`)"));
        assert!(sql.contains("(1, NULL)"));
        assert!(sql.contains("(2, 'n')"));
    }

    #[test]
    fn test_build_insert_empty_page() {
        assert!(build_insert("t", &[]).is_none());
    }

    #[test]
    fn test_drop_and_create_database() {
        assert_eq!(
            drop_if_exists(SchemaObjectKind::View, "v`1"),
            "DROP VIEW IF EXISTS `v``1`"
        );
        assert!(create_database("shop").starts_with("CREATE DATABASE IF NOT EXISTS `shop`"));
        assert_eq!(use_database("shop"), "USE `shop`");
    }

    #[test]
    fn test_is_create_database() {
        assert!(is_create_database("CREATE DATABASE IF NOT EXISTS `x`"));
        assert!(is_create_database("  create   schema y"));
        assert!(!is_create_database("CREATE TABLE t (id INT)"));
        assert!(!is_create_database("DROP DATABASE x"));
        assert!(!is_create_database(""));
    }

    #[test]
    fn test_strip_definer_variants() {
        assert_eq!(
            strip_definer(
                "CREATE ALGORITHM=UNDEFINED DEFINER=`root`@`localhost` SQL SECURITY DEFINER VIEW `v` AS select 1"
            ),
            "CREATE ALGORITHM=UNDEFINED SQL SECURITY DEFINER VIEW `v` AS select 1"
        );
        assert_eq!(
            strip_definer("CREATE DEFINER='app'@'10.%' FUNCTION `f`() RETURNS int RETURN 1"),
            "CREATE FUNCTION `f`() RETURNS int RETURN 1"
        );
        assert_eq!(
            strip_definer("CREATE DEFINER=CURRENT_USER TRIGGER t BEFORE INSERT ON x FOR EACH ROW SET @a = 1"),
            "CREATE TRIGGER t BEFORE INSERT ON x FOR EACH ROW SET @a = 1"
        );
        assert_eq!(strip_definer("CREATE TABLE t (id INT)"), "CREATE TABLE t (id INT)");
    }

    proptest! {
        #[test]
        fn prop_quote_identifier_round_trips(name in ".{0,40}") {
            let quoted = quote_identifier(&name);
            prop_assert!(quoted.starts_with('`') && quoted.ends_with('`'));
            let inner = &quoted[1..quoted.len() - 1];
            prop_assert_eq!(inner.replace("``", "`"), name);
        }

        #[test]
        fn prop_quote_literal_has_no_bare_quote(value in ".{0,40}") {
            let quoted = quote_literal(&value);
            let inner = &quoted[1..quoted.len() - 1];
            let mut escaped = false;
            for ch in inner.chars() {
                if escaped {
                    escaped = false;
                    continue;
                }
                match ch {
                    '\\' => escaped = true,
                    '\'' => prop_assert!(false, "unescaped quote in {}", quoted),
                    _ => {}
                }
            }
            prop_assert!(!escaped);
        }
    }
}

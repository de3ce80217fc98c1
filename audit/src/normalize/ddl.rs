//! Best-effort table name recovery from DDL statement text.

use std::sync::LazyLock;

use regex::Regex;

// Matches the object keyword and the identifier that follows it, allowing
// for IF [NOT] EXISTS between them.
static OBJECT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(?:TABLE|INDEX|VIEW|PROCEDURE|FUNCTION|TRIGGER)\s+(?:IF\s+(?:NOT\s+)?EXISTS\s+)?([`"\w$.]+)"#,
    )
    .unwrap_or_else(|_| unreachable!("static pattern is valid"))
});

/// Scans a DDL statement for the name of the object it targets.
///
/// Returns the bare table name with quoting and any schema qualifier
/// stripped. Returns `None` when no object keyword is followed by an
/// identifier; the record is still captured in that case.
pub fn extract_table_name(statement: &str) -> Option<String> {
    let captures = OBJECT_NAME.captures(statement)?;
    let raw = captures.get(1)?.as_str();

    let unqualified = raw.rsplit('.').next().unwrap_or(raw);
    let cleaned: String = unqualified
        .trim_matches(|c| c == '`' || c == '"' || c == '\'')
        .to_string();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table() {
        assert_eq!(
            extract_table_name("CREATE TABLE orders (id INT)"),
            Some("orders".to_string())
        );
    }

    #[test]
    fn test_if_not_exists_and_backticks() {
        assert_eq!(
            extract_table_name("CREATE TABLE IF NOT EXISTS `shop`.`order_items` (id INT)"),
            Some("order_items".to_string())
        );
    }

    #[test]
    fn test_alter_and_drop() {
        assert_eq!(
            extract_table_name("ALTER TABLE users ADD COLUMN age INT"),
            Some("users".to_string())
        );
        assert_eq!(
            extract_table_name("DROP INDEX idx_users_email"),
            Some("idx_users_email".to_string())
        );
    }

    #[test]
    fn test_other_object_kinds() {
        assert_eq!(
            extract_table_name("CREATE OR REPLACE VIEW active_users AS SELECT 1"),
            Some("active_users".to_string())
        );
        assert_eq!(
            extract_table_name("DROP PROCEDURE IF EXISTS cleanup"),
            Some("cleanup".to_string())
        );
    }

    #[test]
    fn test_no_object_keyword() {
        assert_eq!(extract_table_name("SET GLOBAL binlog_format = ROW"), None);
        assert_eq!(extract_table_name("BEGIN"), None);
    }
}

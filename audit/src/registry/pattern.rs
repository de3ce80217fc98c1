//! Glob patterns for matching table names.

use regex::Regex;

use crate::error::{AuditResult, ErrorKind};

/// A compiled table name pattern.
///
/// Patterns are matched against `database.table` when they contain a dot,
/// against the bare table name otherwise. `*` matches any run of characters
/// and `?` matches a single character. Matching is case-insensitive, the
/// way identifiers compare on hosts with lowercased table storage.
#[derive(Debug, Clone)]
pub struct TablePattern {
    source: String,
    qualified: bool,
    regex: Regex,
}

impl TablePattern {
    /// Compiles a glob pattern.
    ///
    /// Fails with [`ErrorKind::ConfigError`] on an empty pattern. The glob
    /// translation itself cannot produce an invalid regex.
    pub fn compile(pattern: &str) -> AuditResult<Self> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            crate::bail!(
                ErrorKind::ConfigError,
                "Table pattern is empty",
                format!("pattern {pattern:?} contains no characters")
            );
        }

        let regex = Regex::new(&glob_to_regex(trimmed))?;

        Ok(Self {
            source: trimmed.to_string(),
            qualified: trimmed.contains('.'),
            regex,
        })
    }

    /// Returns the original pattern text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Tests a table against this pattern.
    ///
    /// Qualified patterns see `database.table`, bare patterns see only the
    /// table name.
    pub fn matches(&self, database: &str, table: &str) -> bool {
        if self.qualified {
            self.regex.is_match(&format!("{database}.{table}"))
        } else {
            self.regex.is_match(table)
        }
    }
}

/// Translates a glob into an anchored, case-insensitive regex.
fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::with_capacity(glob.len() + 12);
    regex.push_str("(?i)^");
    for ch in glob.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    regex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_pattern_matches_table_in_any_database() {
        let pattern = TablePattern::compile("users").unwrap();
        assert!(pattern.matches("shop", "users"));
        assert!(pattern.matches("crm", "users"));
        assert!(!pattern.matches("shop", "users_archive"));
    }

    #[test]
    fn test_qualified_pattern_requires_database() {
        let pattern = TablePattern::compile("shop.orders").unwrap();
        assert!(pattern.matches("shop", "orders"));
        assert!(!pattern.matches("crm", "orders"));
    }

    #[test]
    fn test_wildcards() {
        let pattern = TablePattern::compile("shop.order*").unwrap();
        assert!(pattern.matches("shop", "orders"));
        assert!(pattern.matches("shop", "order_items"));
        assert!(!pattern.matches("shop", "customers"));

        let pattern = TablePattern::compile("audit_?").unwrap();
        assert!(pattern.matches("any", "audit_1"));
        assert!(!pattern.matches("any", "audit_12"));
    }

    #[test]
    fn test_matching_ignores_case() {
        let pattern = TablePattern::compile("Shop.Orders*").unwrap();
        assert!(pattern.matches("SHOP", "orders_2024"));
        assert!(pattern.matches("shop", "ORDERS"));

        let pattern = TablePattern::compile("users").unwrap();
        assert!(pattern.matches("crm", "Users"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let pattern = TablePattern::compile("a+b").unwrap();
        assert!(pattern.matches("db", "a+b"));
        assert!(!pattern.matches("db", "aab"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(TablePattern::compile("  ").is_err());
    }
}

//! Irreversible masking of sensitive column values.
//!
//! The masking style is chosen from the column name. Credential-like columns
//! are fully redacted; contact and account-like columns keep a fixed prefix
//! and suffix; everything else gets a generic partial reveal. Masking always
//! replaces the stored value with a string, the original type is not
//! recoverable.

use serde_json::Value;

/// How a sensitive column is redacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MaskStyle {
    /// Full redaction, no characters revealed.
    Credential,
    /// First three and last four characters revealed.
    Phone,
    /// First two characters of the local part revealed, domain kept.
    Email,
    /// First four and last four characters revealed.
    Account,
    /// First two and last two characters revealed.
    Generic,
}

fn style_for(column: &str) -> MaskStyle {
    let name = column.to_ascii_lowercase();

    if ["password", "passwd", "pwd", "secret", "token", "api_key"]
        .iter()
        .any(|kw| name.contains(kw))
    {
        MaskStyle::Credential
    } else if name.contains("phone") || name.contains("mobile") || name.contains("tel") {
        MaskStyle::Phone
    } else if name.contains("email") || name.contains("mail") {
        MaskStyle::Email
    } else if name.contains("card") || name.contains("account") || name.contains("iban") {
        MaskStyle::Account
    } else {
        MaskStyle::Generic
    }
}

/// Masks a stored value according to the column's masking style.
///
/// Nulls stay null. Non-string values are rendered to text first, so a
/// numeric account column still ends up masked.
pub fn mask_value(column: &str, value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    Value::String(mask_text(style_for(column), &text))
}

fn mask_text(style: MaskStyle, text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    match style {
        MaskStyle::Credential => "***".to_string(),
        MaskStyle::Phone => {
            if len >= 7 {
                format!(
                    "{}****{}",
                    chars[..3].iter().collect::<String>(),
                    chars[len - 4..].iter().collect::<String>()
                )
            } else {
                "***".to_string()
            }
        }
        MaskStyle::Email => match text.split_once('@') {
            Some((local, domain)) if local.chars().count() > 2 => {
                let prefix: String = local.chars().take(2).collect();
                format!("{prefix}***@{domain}")
            }
            Some((_, domain)) => format!("***@{domain}"),
            None => mask_text(MaskStyle::Generic, text),
        },
        MaskStyle::Account => {
            if len > 8 {
                format!(
                    "{}****{}",
                    chars[..4].iter().collect::<String>(),
                    chars[len - 4..].iter().collect::<String>()
                )
            } else {
                "***".to_string()
            }
        }
        MaskStyle::Generic => {
            if len > 6 {
                format!(
                    "{}***{}",
                    chars[..2].iter().collect::<String>(),
                    chars[len - 2..].iter().collect::<String>()
                )
            } else {
                "***".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_credential_columns_are_fully_redacted() {
        assert_eq!(
            mask_value("password_hash", &json!("hunter2hunter2")),
            json!("***")
        );
        assert_eq!(mask_value("api_key", &json!("sk-12345678")), json!("***"));
    }

    #[test]
    fn test_phone_keeps_prefix_and_suffix() {
        assert_eq!(
            mask_value("phone", &json!("13812345678")),
            json!("138****5678")
        );
        assert_eq!(mask_value("phone", &json!("12345")), json!("***"));
    }

    #[test]
    fn test_email_keeps_domain() {
        assert_eq!(
            mask_value("email", &json!("alice@example.com")),
            json!("al***@example.com")
        );
        assert_eq!(
            mask_value("email", &json!("ab@example.com")),
            json!("***@example.com")
        );
    }

    #[test]
    fn test_account_reveals_four_and_four() {
        assert_eq!(
            mask_value("card_number", &json!("4111111111111111")),
            json!("4111****1111")
        );
        assert_eq!(mask_value("account", &json!("12345678")), json!("***"));
    }

    #[test]
    fn test_generic_partial_reveal() {
        assert_eq!(
            mask_value("address", &json!("742 Evergreen Terrace")),
            json!("74***ce")
        );
        assert_eq!(mask_value("address", &json!("short")), json!("***"));
    }

    #[test]
    fn test_null_stays_null() {
        assert_eq!(mask_value("password", &Value::Null), Value::Null);
    }

    #[test]
    fn test_numbers_are_masked_as_text() {
        assert_eq!(
            mask_value("account_no", &json!(1234567890u64)),
            json!("1234****7890")
        );
    }
}

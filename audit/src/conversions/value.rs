//! Conversion of [`SourceValue`]s into portable JSON values.
//!
//! Stored records must be comparable and renderable without knowledge of the
//! source's native types. Temporal values become ISO-8601 strings, fixed
//! point decimals become decimal strings, and binary data is stored as UTF-8
//! text when valid, hex otherwise.

use chrono::SecondsFormat;
use serde_json::{Number, Value};

use crate::types::SourceValue;

/// Converts a [`SourceValue`] into its stored JSON representation.
///
/// The conversion is total. Non-finite floats have no JSON number form and
/// are stored as their string rendering.
pub fn to_stored_value(value: &SourceValue) -> Value {
    match value {
        SourceValue::Null => Value::Null,
        SourceValue::Bool(b) => Value::Bool(*b),
        SourceValue::Int(i) => Value::Number(Number::from(*i)),
        SourceValue::UInt(u) => Value::Number(Number::from(*u)),
        SourceValue::Float(f) => match Number::from_f64(*f) {
            Some(number) => Value::Number(number),
            None => Value::String(f.to_string()),
        },
        SourceValue::Decimal(d) => Value::String(d.to_string()),
        SourceValue::Text(s) => Value::String(s.clone()),
        SourceValue::Bytes(bytes) => Value::String(bytes_to_string(bytes)),
        SourceValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        SourceValue::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
        SourceValue::DateTime(dt) => {
            Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        SourceValue::Timestamp(ts) => {
            Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
        SourceValue::Json(v) => v.clone(),
    }
}

/// Decodes binary data as UTF-8 when valid, lowercase hex otherwise.
fn bytes_to_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let mut hex = String::with_capacity(bytes.len() * 2);
            for byte in bytes {
                hex.push_str(&format!("{byte:02x}"));
            }
            hex
        }
    }
}

#[cfg(test)]
mod tests {
    use bigdecimal::BigDecimal;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_scalars_convert_to_json() {
        assert_eq!(to_stored_value(&SourceValue::Null), Value::Null);
        assert_eq!(to_stored_value(&SourceValue::Bool(true)), Value::Bool(true));
        assert_eq!(
            to_stored_value(&SourceValue::Int(-7)),
            Value::Number(Number::from(-7))
        );
    }

    #[test]
    fn test_decimal_becomes_string() {
        let decimal = BigDecimal::from_str("1234.5600").unwrap();
        assert_eq!(
            to_stored_value(&SourceValue::Decimal(decimal)),
            Value::String("1234.5600".to_string())
        );
    }

    #[test]
    fn test_temporal_values_are_iso_8601() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(
            to_stored_value(&SourceValue::Date(date)),
            Value::String("2024-03-15".to_string())
        );

        let timestamp = Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap();
        assert_eq!(
            to_stored_value(&SourceValue::Timestamp(timestamp)),
            Value::String("2024-03-15T09:30:00Z".to_string())
        );
    }

    #[test]
    fn test_valid_utf8_bytes_are_decoded() {
        assert_eq!(
            to_stored_value(&SourceValue::Bytes(b"hello".to_vec())),
            Value::String("hello".to_string())
        );
    }

    #[test]
    fn test_invalid_utf8_bytes_become_hex() {
        assert_eq!(
            to_stored_value(&SourceValue::Bytes(vec![0xff, 0x00, 0xab])),
            Value::String("ff00ab".to_string())
        );
    }

    #[test]
    fn test_non_finite_float_becomes_string() {
        assert_eq!(
            to_stored_value(&SourceValue::Float(f64::NAN)),
            Value::String("NaN".to_string())
        );
    }
}

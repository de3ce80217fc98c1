//! Shared configuration types for the audit pipeline.
//!
//! All configuration consumed by the `audit` crate is declared here so that
//! binaries, tests, and any outer CLI/HTTP layer deserialize the exact same
//! shapes. Structs are plain serde types with explicit `validate()` methods;
//! no file loading happens in this crate.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod shared;

/// A secret string that can be serialized and deserialized.
///
/// Wraps [`SecretString`] so credentials can live inside serde config structs
/// while staying redacted in `Debug` output and never being printed by
/// accident. Serialization is implemented by hand because secrecy does not
/// mark `String` as serializable; exposing the value here is the single
/// deliberate escape hatch for writing configs back out.
#[derive(Clone)]
pub struct SerializableSecretString(SecretString);

impl Serialize for SerializableSecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.expose_secret())
    }
}

impl<'de> Deserialize<'de> for SerializableSecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::from)
    }
}

impl SerializableSecretString {
    /// Returns the inner secret value.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for SerializableSecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerializableSecretString(***)")
    }
}

impl From<String> for SerializableSecretString {
    fn from(value: String) -> Self {
        Self(SecretString::new(value))
    }
}

impl From<&str> for SerializableSecretString {
    fn from(value: &str) -> Self {
        Self(SecretString::new(value.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_string_is_redacted_in_debug() {
        let secret = SerializableSecretString::from("hunter2");

        assert_eq!(format!("{secret:?}"), "SerializableSecretString(***)");
        assert_eq!(secret.expose_secret(), "hunter2");
    }

    #[test]
    fn test_secret_string_round_trips_through_serde() {
        let secret = SerializableSecretString::from("hunter2");

        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, "\"hunter2\"");

        let back: SerializableSecretString = serde_json::from_str(&json).unwrap();
        assert_eq!(back.expose_secret(), "hunter2");
    }
}

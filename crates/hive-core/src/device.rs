//! Validated device identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Longest device key accepted from the wire.
pub const MAX_DEVICE_KEY_LEN: usize = 128;

/// Rejected device key.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidDeviceKey {
    /// Key was empty or only whitespace.
    #[error("device key is empty")]
    Empty,
    /// Key exceeds [`MAX_DEVICE_KEY_LEN`].
    #[error("device key is {0} bytes, limit is {limit}", limit = MAX_DEVICE_KEY_LEN)]
    TooLong(usize),
    /// Key contains a topic separator, MQTT wildcard, or whitespace.
    #[error("device key contains forbidden character {0:?}")]
    ForbiddenChar(char),
}

/// Stable identifier of a physical sensing unit.
///
/// Device keys appear as a single MQTT topic level and as a URL path segment,
/// so topic separators, wildcards, and whitespace are rejected at construction.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceKey(String);

impl DeviceKey {
    /// Validate and wrap a raw key.
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidDeviceKey> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(InvalidDeviceKey::Empty);
        }
        if raw.len() > MAX_DEVICE_KEY_LEN {
            return Err(InvalidDeviceKey::TooLong(raw.len()));
        }
        if let Some(c) = raw
            .chars()
            .find(|c| matches!(c, '/' | '+' | '#') || c.is_whitespace() || c.is_control())
        {
            return Err(InvalidDeviceKey::ForbiddenChar(c));
        }
        Ok(Self(raw))
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceKey {
    type Err = InvalidDeviceKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DeviceKey {
    type Error = InvalidDeviceKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DeviceKey> for String {
    fn from(key: DeviceKey) -> Self {
        key.0
    }
}

impl AsRef<str> for DeviceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn accepts_plain_key() {
        let key = DeviceKey::new("hive-001").unwrap();
        assert_eq!(key.as_str(), "hive-001");
        assert_eq!(key.to_string(), "hive-001");
    }

    #[test]
    fn rejects_empty() {
        assert_matches!(DeviceKey::new(""), Err(InvalidDeviceKey::Empty));
        assert_matches!(DeviceKey::new("   "), Err(InvalidDeviceKey::Empty));
    }

    #[test]
    fn rejects_topic_characters() {
        assert_matches!(DeviceKey::new("a/b"), Err(InvalidDeviceKey::ForbiddenChar('/')));
        assert_matches!(DeviceKey::new("hive+"), Err(InvalidDeviceKey::ForbiddenChar('+')));
        assert_matches!(DeviceKey::new("#"), Err(InvalidDeviceKey::ForbiddenChar('#')));
        assert_matches!(DeviceKey::new("hive 1"), Err(InvalidDeviceKey::ForbiddenChar(' ')));
    }

    #[test]
    fn rejects_overlong() {
        let raw = "x".repeat(MAX_DEVICE_KEY_LEN + 1);
        assert_matches!(DeviceKey::new(raw), Err(InvalidDeviceKey::TooLong(129)));
    }

    #[test]
    fn serde_is_a_plain_string() {
        let key = DeviceKey::new("hive-007").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"hive-007\"");
        let back: DeviceKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn deserialize_validates() {
        let err = serde_json::from_str::<DeviceKey>("\"bad/key\"");
        assert!(err.is_err());
    }

    #[test]
    fn from_str_parses() {
        let key: DeviceKey = "hive-42".parse().unwrap();
        assert_eq!(key.as_ref(), "hive-42");
    }
}

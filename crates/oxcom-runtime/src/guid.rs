//! 128-bit capability identifiers.
//!
//! Interface, class and library identities are all [`Guid`]s. Equality is
//! bit-for-bit; the textual form accepted by [`Guid::parse`] is
//! case-insensitive and may be wrapped in braces.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A globally unique identifier naming an interface, class or library.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Guid(Uuid);

/// Interface identifier.
pub type Iid = Guid;

/// Class identifier.
pub type Clsid = Guid;

/// The "no interface" sentinel.
pub const IID_NULL: Guid = Guid::from_u128(0);

/// The lifetime-management capability. Every live object supports it.
pub const IID_IUNKNOWN: Guid = Guid::from_u128(0x00000000_0000_0000_c000_000000000046);

/// The generic late-bound invocation capability.
pub const IID_IDISPATCH: Guid = Guid::from_u128(0x00020400_0000_0000_c000_000000000046);

/// The optional diagnostics capability.
pub const IID_ISUPPORT_ERROR_INFO: Guid = Guid::from_u128(0xdf0b3d60_548f_101b_8e65_08002b2bd119);

impl Guid {
    /// Build a GUID from its big-endian 128-bit value.
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Build a GUID from the classic `Data1..Data4` fields.
    pub const fn from_fields(d1: u32, d2: u16, d3: u16, d4: [u8; 8]) -> Self {
        Self(Uuid::from_fields(d1, d2, d3, &d4))
    }

    /// Generate a fresh random GUID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}` with or without braces.
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(trimmed);
        Uuid::parse_str(inner).ok().map(Self)
    }

    /// Whether this is [`IID_NULL`].
    pub fn is_null(&self) -> bool {
        self.0.is_nil()
    }

    /// The in-memory layout used across the boundary (little-endian
    /// `Data1..Data3`).
    pub fn to_bytes_le(&self) -> [u8; 16] {
        self.0.to_bytes_le()
    }

    /// Rebuild a GUID from its boundary memory layout.
    pub fn from_bytes_le(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes_le(bytes))
    }

    /// Match against a small fixed list of identifiers.
    pub fn is_one_of(&self, list: &[&Guid]) -> bool {
        list.iter().any(|candidate| *candidate == self)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Uuid::encode_buffer();
        let text = self.0.hyphenated().encode_upper(&mut buf);
        write!(f, "{{{}}}", text)
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Error returned when a GUID string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid GUID: {0}")]
pub struct ParseGuidError(pub String);

impl FromStr for Guid {
    type Err = ParseGuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ParseGuidError(s.to_string()))
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        let upper = Guid::parse("{00020400-0000-0000-C000-000000000046}").unwrap();
        let lower = Guid::parse("00020400-0000-0000-c000-000000000046").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper, IID_IDISPATCH);
    }

    #[test]
    fn test_display_is_braced_upper() {
        assert_eq!(
            IID_IUNKNOWN.to_string(),
            "{00000000-0000-0000-C000-000000000046}"
        );
    }

    #[test]
    fn test_boundary_layout_round_trip() {
        let bytes = IID_IDISPATCH.to_bytes_le();
        // Data1 is stored little-endian
        assert_eq!(&bytes[..4], &[0x00, 0x04, 0x02, 0x00]);
        assert_eq!(Guid::from_bytes_le(bytes), IID_IDISPATCH);
    }

    #[test]
    fn test_is_one_of() {
        assert!(IID_IDISPATCH.is_one_of(&[&IID_IUNKNOWN, &IID_IDISPATCH]));
        assert!(!IID_NULL.is_one_of(&[&IID_IUNKNOWN]));
        assert!(IID_NULL.is_null());
    }

    #[test]
    fn test_invalid_guid() {
        assert!(Guid::parse("not-a-guid").is_none());
        assert!("{1234}".parse::<Guid>().is_err());
    }
}

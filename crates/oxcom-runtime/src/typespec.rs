//! Declared parameter and field types.

use crate::variant::VarType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A type as written in a type library manifest.
///
/// Textual forms: `i2`, `i4`, `ui4`, `r8`, `bool`, `bstr`, `variant`,
/// `record:<Name>` and `array:<element type>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeSpec {
    I2,
    I4,
    Ui4,
    R8,
    Bool,
    Bstr,
    Variant,
    Record(String),
    Array(Box<TypeSpec>),
}

/// Pointer size on the boundary.
const POINTER: usize = 8;

/// Size of a tagged value on the boundary.
const VARIANT_SIZE: usize = 24;

impl TypeSpec {
    /// Parse the textual form.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(name) = text.strip_prefix("record:") {
            let name = name.trim();
            return (!name.is_empty()).then(|| TypeSpec::Record(name.to_string()));
        }
        if let Some(element) = text.strip_prefix("array:") {
            return Self::parse(element).map(|e| TypeSpec::Array(Box::new(e)));
        }
        match text.to_ascii_lowercase().as_str() {
            "i2" => Some(TypeSpec::I2),
            "i4" => Some(TypeSpec::I4),
            "ui4" => Some(TypeSpec::Ui4),
            "r8" => Some(TypeSpec::R8),
            "bool" => Some(TypeSpec::Bool),
            "bstr" => Some(TypeSpec::Bstr),
            "variant" => Some(TypeSpec::Variant),
            _ => None,
        }
    }

    /// The variant tag a value of this type carries.
    pub fn vt(&self) -> VarType {
        match self {
            TypeSpec::I2 => VarType::I2,
            TypeSpec::I4 => VarType::I4,
            TypeSpec::Ui4 => VarType::Ui4,
            TypeSpec::R8 => VarType::R8,
            TypeSpec::Bool => VarType::Bool,
            TypeSpec::Bstr => VarType::Bstr,
            TypeSpec::Variant => VarType::Variant,
            TypeSpec::Record(_) => VarType::Record,
            TypeSpec::Array(_) => VarType::Array,
        }
    }

    /// Name of the record this type refers to, directly or as array element.
    pub fn record_name(&self) -> Option<&str> {
        match self {
            TypeSpec::Record(name) => Some(name),
            TypeSpec::Array(element) => element.record_name(),
            _ => None,
        }
    }

    /// Size and alignment of a field of this type. Records are laid out by
    /// the caller, which knows their fields.
    pub fn scalar_layout(&self) -> Option<(usize, usize)> {
        match self {
            TypeSpec::I2 | TypeSpec::Bool => Some((2, 2)),
            TypeSpec::I4 | TypeSpec::Ui4 => Some((4, 4)),
            TypeSpec::R8 => Some((8, 8)),
            TypeSpec::Bstr | TypeSpec::Array(_) => Some((POINTER, POINTER)),
            TypeSpec::Variant => Some((VARIANT_SIZE, 8)),
            TypeSpec::Record(_) => None,
        }
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Record(name) => write!(f, "record:{}", name),
            TypeSpec::Array(element) => write!(f, "array:{}", element),
            scalar => f.write_str(scalar.vt().as_str()),
        }
    }
}

impl TryFrom<String> for TypeSpec {
    type Error = String;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::parse(&text).ok_or_else(|| format!("unknown type '{}'", text))
    }
}

impl From<TypeSpec> for String {
    fn from(spec: TypeSpec) -> Self {
        spec.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalars() {
        assert_eq!(TypeSpec::parse("i4"), Some(TypeSpec::I4));
        assert_eq!(TypeSpec::parse("BSTR"), Some(TypeSpec::Bstr));
        assert_eq!(TypeSpec::parse("float"), None);
    }

    #[test]
    fn test_parse_composites() {
        assert_eq!(
            TypeSpec::parse("array:record:DeviceInfo"),
            Some(TypeSpec::Array(Box::new(TypeSpec::Record(
                "DeviceInfo".to_string()
            ))))
        );
        assert_eq!(TypeSpec::parse("record:"), None);
        assert_eq!(TypeSpec::parse("array:nope"), None);
    }

    #[test]
    fn test_display_matches_parse() {
        for text in ["r8", "record:StructRecordParamTest", "array:r8", "variant"] {
            assert_eq!(TypeSpec::parse(text).unwrap().to_string(), text);
        }
    }

    #[test]
    fn test_record_name() {
        let spec = TypeSpec::parse("array:record:DeviceInfo").unwrap();
        assert_eq!(spec.record_name(), Some("DeviceInfo"));
        assert_eq!(TypeSpec::R8.record_name(), None);
    }
}

//! Tagged values exchanged through late-bound calls.

use crate::array::SafeArray;
use crate::bstr::BStr;
use crate::record::RecordValue;
use std::fmt;

/// Canonical true for boundary booleans.
pub const VARIANT_TRUE: i16 = -1;

/// Canonical false for boundary booleans.
pub const VARIANT_FALSE: i16 = 0;

/// A 16-bit boundary boolean.
///
/// Only [`VARIANT_TRUE`] and [`VARIANT_FALSE`] are canonical; any other
/// raw value is neither, which is why comparisons go through [`is_true`]
/// rather than a plain non-zero test.
///
/// [`is_true`]: VariantBool::is_true
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VariantBool(i16);

impl VariantBool {
    pub const TRUE: VariantBool = VariantBool(VARIANT_TRUE);
    pub const FALSE: VariantBool = VariantBool(VARIANT_FALSE);

    /// Wrap a raw boundary value.
    pub const fn from_raw(raw: i16) -> Self {
        Self(raw)
    }

    /// The raw boundary value.
    pub const fn raw(self) -> i16 {
        self.0
    }

    /// Exactly [`VARIANT_TRUE`].
    pub const fn is_true(self) -> bool {
        self.0 == VARIANT_TRUE
    }

    /// Exactly [`VARIANT_FALSE`].
    pub const fn is_false(self) -> bool {
        self.0 == VARIANT_FALSE
    }
}

impl From<bool> for VariantBool {
    fn from(value: bool) -> Self {
        if value {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }
}

impl fmt::Debug for VariantBool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            VARIANT_TRUE => f.write_str("VARIANT_TRUE"),
            VARIANT_FALSE => f.write_str("VARIANT_FALSE"),
            raw => write!(f, "VariantBool({})", raw),
        }
    }
}

/// Type tag of a [`Variant`] or of array elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarType {
    Empty,
    Null,
    I2,
    I4,
    Ui4,
    R8,
    Bool,
    Bstr,
    Variant,
    Record,
    Array,
}

impl VarType {
    /// Short lowercase name used in diagnostics and type strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            VarType::Empty => "empty",
            VarType::Null => "null",
            VarType::I2 => "i2",
            VarType::I4 => "i4",
            VarType::Ui4 => "ui4",
            VarType::R8 => "r8",
            VarType::Bool => "bool",
            VarType::Bstr => "bstr",
            VarType::Variant => "variant",
            VarType::Record => "record",
            VarType::Array => "array",
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value crossing the dynamic-invocation boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    #[default]
    Empty,
    Null,
    I2(i16),
    I4(i32),
    Ui4(u32),
    R8(f64),
    Bool(VariantBool),
    Bstr(BStr),
    Record(RecordValue),
    Array(SafeArray),
}

impl Variant {
    /// The type tag of this value.
    pub fn vt(&self) -> VarType {
        match self {
            Variant::Empty => VarType::Empty,
            Variant::Null => VarType::Null,
            Variant::I2(_) => VarType::I2,
            Variant::I4(_) => VarType::I4,
            Variant::Ui4(_) => VarType::Ui4,
            Variant::R8(_) => VarType::R8,
            Variant::Bool(_) => VarType::Bool,
            Variant::Bstr(_) => VarType::Bstr,
            Variant::Record(_) => VarType::Record,
            Variant::Array(_) => VarType::Array,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Variant::Empty)
    }

    pub fn as_i4(&self) -> Option<i32> {
        match self {
            Variant::I4(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_r8(&self) -> Option<f64> {
        match self {
            Variant::R8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<VariantBool> {
        match self {
            Variant::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bstr(&self) -> Option<&BStr> {
        match self {
            Variant::Bstr(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordValue> {
        match self {
            Variant::Record(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&SafeArray> {
        match self {
            Variant::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut SafeArray> {
        match self {
            Variant::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Convert a scalar value to `target`, the way argument binding does.
    ///
    /// Numeric conversions must be lossless; text converts to and from
    /// numbers and booleans; `Empty` converts to the zero value of any
    /// scalar type. Records and arrays only convert to their own type.
    /// Returns `None` when no conversion exists.
    pub fn change_type(self, target: VarType) -> Option<Variant> {
        if self.vt() == target || target == VarType::Variant {
            return Some(self);
        }
        match target {
            VarType::I2 => self.to_i64().and_then(|v| i16::try_from(v).ok()).map(Variant::I2),
            VarType::I4 => self.to_i64().and_then(|v| i32::try_from(v).ok()).map(Variant::I4),
            VarType::Ui4 => self.to_i64().and_then(|v| u32::try_from(v).ok()).map(Variant::Ui4),
            VarType::R8 => self.to_f64().map(Variant::R8),
            VarType::Bool => self.to_bool().map(Variant::Bool),
            VarType::Bstr => self.to_text().map(|t| Variant::Bstr(BStr::from(t))),
            VarType::Empty | VarType::Null | VarType::Record | VarType::Array | VarType::Variant => {
                None
            }
        }
    }

    fn to_i64(&self) -> Option<i64> {
        match self {
            Variant::Empty => Some(0),
            Variant::I2(v) => Some(i64::from(*v)),
            Variant::I4(v) => Some(i64::from(*v)),
            Variant::Ui4(v) => Some(i64::from(*v)),
            Variant::Bool(v) => Some(i64::from(v.raw())),
            Variant::R8(v) if v.fract() == 0.0 && v.abs() < 9.007_199_254_740_992e15 => {
                Some(*v as i64)
            }
            Variant::Bstr(text) => text.as_str().trim().parse().ok(),
            _ => None,
        }
    }

    fn to_f64(&self) -> Option<f64> {
        match self {
            Variant::Empty => Some(0.0),
            Variant::I2(v) => Some(f64::from(*v)),
            Variant::I4(v) => Some(f64::from(*v)),
            Variant::Ui4(v) => Some(f64::from(*v)),
            Variant::R8(v) => Some(*v),
            Variant::Bool(v) => Some(f64::from(v.raw())),
            Variant::Bstr(text) => text.as_str().trim().parse().ok(),
            _ => None,
        }
    }

    fn to_bool(&self) -> Option<VariantBool> {
        match self {
            Variant::Bstr(text) => {
                let trimmed = text.as_str().trim();
                if trimmed.eq_ignore_ascii_case("true") {
                    Some(VariantBool::TRUE)
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Some(VariantBool::FALSE)
                } else {
                    trimmed.parse::<f64>().ok().map(|v| (v != 0.0).into())
                }
            }
            other => other.to_f64().map(|v| (v != 0.0).into()),
        }
    }

    fn to_text(&self) -> Option<String> {
        match self {
            Variant::Empty => Some(String::new()),
            Variant::I2(v) => Some(v.to_string()),
            Variant::I4(v) => Some(v.to_string()),
            Variant::Ui4(v) => Some(v.to_string()),
            Variant::R8(v) => Some(v.to_string()),
            Variant::Bool(v) => Some(if v.is_false() { "False" } else { "True" }.to_string()),
            Variant::Bstr(text) => Some(text.as_str().to_string()),
            _ => None,
        }
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::I4(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::R8(value)
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value.into())
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::Bstr(BStr::new(value))
    }
}

impl From<BStr> for Variant {
    fn from(value: BStr) -> Self {
        Variant::Bstr(value)
    }
}

impl From<RecordValue> for Variant {
    fn from(value: RecordValue) -> Self {
        Variant::Record(value)
    }
}

impl From<SafeArray> for Variant {
    fn from(value: SafeArray) -> Self {
        Variant::Array(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_bool_is_tri_state() {
        assert!(VariantBool::TRUE.is_true());
        assert!(VariantBool::FALSE.is_false());
        let odd = VariantBool::from_raw(1);
        assert!(!odd.is_true());
        assert!(!odd.is_false());
    }

    #[test]
    fn test_numeric_widening_and_narrowing() {
        assert_eq!(Variant::I2(7).change_type(VarType::I4), Some(Variant::I4(7)));
        assert_eq!(Variant::R8(3.0).change_type(VarType::I4), Some(Variant::I4(3)));
        assert_eq!(Variant::R8(3.5).change_type(VarType::I4), None);
        assert_eq!(Variant::I4(-1).change_type(VarType::Ui4), None);
        assert_eq!(Variant::I4(70_000).change_type(VarType::I2), None);
    }

    #[test]
    fn test_text_conversions() {
        assert_eq!(Variant::from("42").change_type(VarType::I4), Some(Variant::I4(42)));
        assert_eq!(
            Variant::from("TRUE").change_type(VarType::Bool),
            Some(Variant::Bool(VariantBool::TRUE))
        );
        assert_eq!(
            Variant::I4(12).change_type(VarType::Bstr),
            Some(Variant::from("12"))
        );
        assert_eq!(Variant::from("abc").change_type(VarType::R8), None);
    }

    #[test]
    fn test_empty_converts_to_zero_values() {
        assert_eq!(Variant::Empty.change_type(VarType::I4), Some(Variant::I4(0)));
        assert_eq!(
            Variant::Empty.change_type(VarType::Bool),
            Some(Variant::Bool(VariantBool::FALSE))
        );
        assert_eq!(Variant::Null.change_type(VarType::I4), None);
    }

    #[test]
    fn test_bool_to_number() {
        assert_eq!(Variant::from(true).change_type(VarType::I4), Some(Variant::I4(-1)));
    }
}

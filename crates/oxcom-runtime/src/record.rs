//! Fixed-field parameter records and their descriptors.
//!
//! A [`RecordInfo`] describes the layout of one record type from a type
//! library. A [`RecordValue`] is an instance of it carried inside a
//! [`Variant`]. Rust types that mirror a record implement [`Record`] to
//! convert to and from the dynamic representation.

use crate::error::{ComError, ComResult};
use crate::guid::Guid;
use crate::typespec::TypeSpec;
use crate::variant::{VarType, Variant, VariantBool};
use std::sync::Arc;

/// One field of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDesc {
    pub name: String,
    pub ty: TypeSpec,
    /// Byte offset within the record.
    pub offset: usize,
    /// Descriptor of a nested record field.
    pub nested: Option<Arc<RecordInfo>>,
}

/// Descriptor of a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordInfo {
    name: String,
    guid: Guid,
    fields: Vec<FieldDesc>,
    size: usize,
    align: usize,
}

impl RecordInfo {
    /// Lay out a record from its fields in declaration order.
    ///
    /// `nested` resolves record-typed fields to their descriptors.
    pub fn new<F>(name: &str, guid: Guid, fields: &[(String, TypeSpec)], nested: F) -> ComResult<Self>
    where
        F: Fn(&str) -> Option<Arc<RecordInfo>>,
    {
        let mut offset = 0;
        let mut align = 1;
        let mut laid_out = Vec::with_capacity(fields.len());

        for (field_name, ty) in fields {
            let inner = match ty {
                TypeSpec::Record(record) => Some(nested(record).ok_or_else(|| {
                    ComError::ElementNotFound(format!("record '{}' used by '{}'", record, name))
                })?),
                _ => None,
            };
            let (field_size, field_align) = match (&inner, ty.scalar_layout()) {
                (Some(info), _) => (info.size, info.align),
                (None, Some(layout)) => layout,
                (None, None) => unreachable!("non-record types always have a layout"),
            };

            offset = align_up(offset, field_align);
            laid_out.push(FieldDesc {
                name: field_name.clone(),
                ty: ty.clone(),
                offset,
                nested: inner,
            });
            offset += field_size;
            align = align.max(field_align);
        }

        Ok(Self {
            name: name.to_string(),
            guid,
            fields: laid_out,
            size: align_up(offset, align),
            align,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    /// Size of the record in boundary memory.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    /// Position of the field called `name`.
    pub fn field_index(&self, name: &str) -> ComResult<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| ComError::InvalidArg(format!("{} has no field '{}'", self.name, name)))
    }

    /// Whether `other` describes the same record type.
    pub fn is_matching_type(&self, other: &RecordInfo) -> bool {
        self.guid == other.guid
    }

    /// A new record with every field at its zero value. Text fields are null.
    pub fn record_init(self: &Arc<Self>) -> RecordValue {
        let fields = self.fields.iter().map(zero_value).collect();
        RecordValue {
            info: Arc::clone(self),
            fields,
        }
    }

    /// Reset every field of `record` to its zero value, releasing text buffers.
    pub fn record_clear(&self, record: &mut RecordValue) -> ComResult<()> {
        self.check(record)?;
        for (slot, field) in record.fields.iter_mut().zip(&self.fields) {
            *slot = zero_value(field);
        }
        Ok(())
    }

    /// Copy `src` into `dst`, releasing whatever `dst` held.
    pub fn record_copy(&self, src: &RecordValue, dst: &mut RecordValue) -> ComResult<()> {
        self.check(src)?;
        self.check(dst)?;
        dst.fields.clone_from(&src.fields);
        Ok(())
    }

    /// Allocate a copy of `src`.
    pub fn record_create_copy(&self, src: &RecordValue) -> ComResult<RecordValue> {
        self.check(src)?;
        Ok(src.clone())
    }

    /// Release a record previously produced by this descriptor.
    pub fn record_destroy(&self, record: RecordValue) -> ComResult<()> {
        self.check(&record)?;
        drop(record);
        Ok(())
    }

    /// A copy of the field called `name`.
    pub fn get_field(&self, record: &RecordValue, name: &str) -> ComResult<Variant> {
        self.check(record)?;
        let index = self.field_index(name)?;
        Ok(record.fields[index].clone())
    }

    /// Store `value` into the field called `name`, converting it to the
    /// field's declared type.
    pub fn put_field(&self, record: &mut RecordValue, name: &str, value: Variant) -> ComResult<()> {
        self.check(record)?;
        let index = self.field_index(name)?;
        let field = &self.fields[index];
        let converted = coerce_field(field, value).ok_or_else(|| ComError::TypeMismatch {
            arg: index as u32,
            expected: field.ty.to_string(),
        })?;
        record.fields[index] = converted;
        Ok(())
    }

    fn check(&self, record: &RecordValue) -> ComResult<()> {
        if self.is_matching_type(&record.info) {
            Ok(())
        } else {
            Err(ComError::InvalidArg(format!(
                "record of type {} passed where {} was expected",
                record.info.name, self.name
            )))
        }
    }
}

fn align_up(offset: usize, align: usize) -> usize {
    offset.div_ceil(align) * align
}

fn zero_value(field: &FieldDesc) -> Variant {
    match (&field.ty, &field.nested) {
        (TypeSpec::I2, _) => Variant::I2(0),
        (TypeSpec::I4, _) => Variant::I4(0),
        (TypeSpec::Ui4, _) => Variant::Ui4(0),
        (TypeSpec::R8, _) => Variant::R8(0.0),
        (TypeSpec::Bool, _) => Variant::Bool(VariantBool::FALSE),
        (TypeSpec::Bstr, _) => Variant::Bstr(Default::default()),
        (TypeSpec::Record(_), Some(info)) => Variant::Record(info.record_init()),
        _ => Variant::Empty,
    }
}

fn coerce_field(field: &FieldDesc, value: Variant) -> Option<Variant> {
    match (&field.ty, value) {
        (TypeSpec::Record(_), Variant::Record(record)) => field
            .nested
            .as_ref()
            .filter(|info| info.is_matching_type(&record.info))
            .map(|_| Variant::Record(record)),
        (TypeSpec::Array(_), Variant::Array(array)) => Some(Variant::Array(array)),
        (TypeSpec::Array(_), Variant::Empty) => Some(Variant::Empty),
        (TypeSpec::Record(_) | TypeSpec::Array(_), _) => None,
        (ty, value) => value.change_type(ty.vt()),
    }
}

/// An instance of a record type.
#[derive(Debug, Clone)]
pub struct RecordValue {
    info: Arc<RecordInfo>,
    fields: Vec<Variant>,
}

impl RecordValue {
    /// The descriptor of this record.
    pub fn info(&self) -> &Arc<RecordInfo> {
        &self.info
    }

    /// Field values in declaration order.
    pub fn fields(&self) -> &[Variant] {
        &self.fields
    }

    /// The field called `name`.
    pub fn field(&self, name: &str) -> ComResult<&Variant> {
        let index = self.info.field_index(name)?;
        Ok(&self.fields[index])
    }

    /// Store into the field called `name` with conversion to its type.
    pub fn set(&mut self, name: &str, value: Variant) -> ComResult<()> {
        let info = Arc::clone(&self.info);
        info.put_field(self, name, value)
    }

    /// Read a field expected to hold `vt`, converting losslessly if needed.
    pub fn get_as(&self, name: &str, vt: VarType) -> ComResult<Variant> {
        let value = self.field(name)?.clone();
        value.change_type(vt).ok_or_else(|| ComError::TypeMismatch {
            arg: self.info.field_index(name).unwrap_or_default() as u32,
            expected: vt.to_string(),
        })
    }
}

impl PartialEq for RecordValue {
    fn eq(&self, other: &Self) -> bool {
        self.info.is_matching_type(&other.info) && self.fields == other.fields
    }
}

/// A Rust type mirroring a record declared in a type library.
pub trait Record: Sized {
    /// Name of the record in its type library.
    const NAME: &'static str;

    /// Build the typed record from a dynamic one.
    fn from_record(value: &RecordValue) -> ComResult<Self>;

    /// Convert into a dynamic record described by `info`.
    fn into_record(self, info: &Arc<RecordInfo>) -> ComResult<RecordValue>;
}

/// Ensure `value` is a record named `R::NAME`.
pub fn expect_record<R: Record>(value: &RecordValue) -> ComResult<()> {
    if value.info.name == R::NAME {
        Ok(())
    } else {
        Err(ComError::InvalidArg(format!(
            "expected record {}, got {}",
            R::NAME,
            value.info.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bstr::BStr;

    fn question_record() -> Arc<RecordInfo> {
        let fields = vec![
            ("question".to_string(), TypeSpec::Bstr),
            ("answer".to_string(), TypeSpec::I4),
            ("needs_clarification".to_string(), TypeSpec::Bool),
        ];
        Arc::new(RecordInfo::new("Question", Guid::generate(), &fields, |_| None).unwrap())
    }

    #[test]
    fn test_layout_uses_natural_alignment() {
        let info = question_record();
        assert_eq!(info.fields()[0].offset, 0);
        assert_eq!(info.fields()[1].offset, 8);
        assert_eq!(info.fields()[2].offset, 12);
        assert_eq!(info.size(), 16);
    }

    #[test]
    fn test_record_init_has_null_text() {
        let info = question_record();
        let record = info.record_init();
        assert_eq!(record.field("question").unwrap(), &Variant::Bstr(BStr::null()));
        assert_eq!(record.field("answer").unwrap(), &Variant::I4(0));
    }

    #[test]
    fn test_put_field_converts() {
        let info = question_record();
        let mut record = info.record_init();
        info.put_field(&mut record, "answer", Variant::R8(42.0)).unwrap();
        assert_eq!(info.get_field(&record, "answer").unwrap(), Variant::I4(42));

        let err = info
            .put_field(&mut record, "answer", Variant::from("many"))
            .unwrap_err();
        assert!(matches!(err, ComError::TypeMismatch { arg: 1, .. }));
    }

    #[test]
    fn test_copy_and_clear() {
        let info = question_record();
        let mut src = info.record_init();
        src.set("question", Variant::from("foo")).unwrap();
        src.set("answer", Variant::I4(3)).unwrap();

        let mut dst = info.record_init();
        info.record_copy(&src, &mut dst).unwrap();
        assert_eq!(dst, src);

        let copy = info.record_create_copy(&src).unwrap();
        info.record_clear(&mut src).unwrap();
        assert_eq!(copy.field("answer").unwrap(), &Variant::I4(3));
        assert_eq!(src.field("answer").unwrap(), &Variant::I4(0));
        info.record_destroy(copy).unwrap();
    }

    #[test]
    fn test_mismatched_record_rejected() {
        let a = question_record();
        let b = question_record();
        let mut dst = b.record_init();
        assert!(!a.is_matching_type(&b));
        assert!(a.record_copy(&a.record_init(), &mut dst).is_err());
    }

    #[test]
    fn test_unknown_nested_record() {
        let fields = vec![("inner".to_string(), TypeSpec::Record("Missing".into()))];
        let err = RecordInfo::new("Outer", Guid::generate(), &fields, |_| None).unwrap_err();
        assert!(err.is_descriptor_unavailable());
    }
}

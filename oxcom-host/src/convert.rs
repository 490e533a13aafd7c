//! Conversion between JSON values and variants.
//!
//! Arguments typed on the command line are JSON. They are converted using
//! the declared parameter type: records are JSON objects keyed by field
//! name, arrays are JSON arrays. Results go the other way.

use anyhow::{anyhow, bail, Context, Result};
use oxcom_runtime::{RecordInfo, RecordValue, SafeArray, SafeArrayBound, TypeSpec, Variant};
use serde_json::{Map, Number, Value};
use std::sync::Arc;

/// Convert `value` to a variant of type `ty`.
///
/// `record` describes the record type `ty` refers to, directly or as array
/// element.
pub fn json_to_variant(value: &Value, ty: &TypeSpec, record: Option<&Arc<RecordInfo>>) -> Result<Variant> {
    match ty {
        TypeSpec::Record(name) => {
            let info = record.ok_or_else(|| anyhow!("no descriptor for record {}", name))?;
            json_to_record(value, info).map(Variant::Record)
        }
        TypeSpec::Array(element) => json_to_array(value, element, record).map(Variant::Array),
        TypeSpec::Variant => untyped(value),
        scalar => {
            let raw = untyped(value)?;
            let shown = raw.vt();
            raw.change_type(scalar.vt())
                .ok_or_else(|| anyhow!("cannot convert {} ({}) to {}", value, shown, scalar))
        }
    }
}

/// The natural variant for a JSON value with no declared type.
fn untyped(value: &Value) -> Result<Variant> {
    Ok(match value {
        Value::Null => Variant::Empty,
        Value::Bool(b) => Variant::from(*b),
        Value::Number(n) => number(n),
        Value::String(s) => Variant::from(s.as_str()),
        Value::Array(items) => {
            let values = items.iter().map(untyped).collect::<Result<Vec<_>>>()?;
            Variant::Array(SafeArray::from_vec(values)?)
        }
        Value::Object(_) => bail!("an untyped value cannot be a record"),
    })
}

fn number(n: &Number) -> Variant {
    if let Some(v) = n.as_i64() {
        if let Ok(v) = i32::try_from(v) {
            return Variant::I4(v);
        }
        if let Ok(v) = u32::try_from(v) {
            return Variant::Ui4(v);
        }
    }
    Variant::R8(n.as_f64().unwrap_or_default())
}

fn json_to_record(value: &Value, info: &Arc<RecordInfo>) -> Result<RecordValue> {
    let fields = match value {
        Value::Object(fields) => fields,
        Value::Null => return Ok(info.record_init()),
        other => bail!("expected a {} object, got {}", info.name(), other),
    };

    let mut record = info.record_init();
    for (key, field_value) in fields {
        let field = info
            .fields()
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(key))
            .ok_or_else(|| anyhow!("{} has no field {}", info.name(), key))?;
        let converted = json_to_variant(field_value, &field.ty, field.nested.as_ref())
            .with_context(|| format!("field {}.{}", info.name(), field.name))?;
        info.put_field(&mut record, &field.name, converted)?;
    }
    Ok(record)
}

fn json_to_array(value: &Value, element: &TypeSpec, record: Option<&Arc<RecordInfo>>) -> Result<SafeArray> {
    let items = value
        .as_array()
        .ok_or_else(|| anyhow!("expected an array of {}, got {}", element, value))?;
    let count = u32::try_from(items.len()).context("array too large")?;
    let bounds = [SafeArrayBound::new(count, 0)];

    let array = match (element, record) {
        (TypeSpec::Record(_), Some(info)) => SafeArray::create_records(info, &bounds)?,
        (TypeSpec::Record(name), None) => bail!("no descriptor for record {}", name),
        (scalar, _) => SafeArray::create(scalar.vt(), &bounds)?,
    };
    for (index, item) in items.iter().enumerate() {
        let converted =
            json_to_variant(item, element, record).with_context(|| format!("element {}", index))?;
        array.put_element(&[index as i32], converted)?;
    }
    Ok(array)
}

/// Convert a variant to JSON.
///
/// Multi-dimensional arrays nest by dimension, the first dimension
/// outermost.
pub fn variant_to_json(value: &Variant) -> Result<Value> {
    Ok(match value {
        Variant::Empty | Variant::Null => Value::Null,
        Variant::I2(v) => Value::from(*v),
        Variant::I4(v) => Value::from(*v),
        Variant::Ui4(v) => Value::from(*v),
        Variant::R8(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
        Variant::Bool(v) => Value::Bool(!v.is_false()),
        Variant::Bstr(text) => Value::String(text.as_str().to_string()),
        Variant::Record(record) => record_to_json(record)?,
        Variant::Array(array) => {
            if array.dims() == 0 {
                Value::Array(Vec::new())
            } else {
                let mut indices = vec![0; array.bounds().len()];
                dimension_to_json(array, 0, &mut indices)?
            }
        }
    })
}

fn record_to_json(record: &RecordValue) -> Result<Value> {
    let mut object = Map::new();
    for (field, value) in record.info().fields().iter().zip(record.fields()) {
        object.insert(field.name.clone(), variant_to_json(value)?);
    }
    Ok(Value::Object(object))
}

fn dimension_to_json(array: &SafeArray, dim: usize, indices: &mut [i32]) -> Result<Value> {
    let bound = array.bounds()[dim];
    let mut items = Vec::with_capacity(bound.elements as usize);
    for offset in 0..bound.elements {
        indices[dim] = i32::try_from(i64::from(bound.lower_bound) + i64::from(offset))
            .context("array index out of range")?;
        let item = if dim + 1 == indices.len() {
            variant_to_json(&array.get_element(indices)?)?
        } else {
            dimension_to_json(array, dim + 1, indices)?
        };
        items.push(item);
    }
    Ok(Value::Array(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxcom_runtime::{Guid, TypeLib, VarType};
    use serde_json::json;

    const LIBRARY: &str = r#"
[library]
name = "ConvertLib"
guid = "{6A0E2B71-3F4C-4D5E-8A9B-0C1D2E3F4A5B}"
version = "1.0"

[[records]]
name = "Point"
guid = "{7B1F3C82-405D-4E6F-9BAC-1D2E3F4A5B6C}"
fields = [
    { name = "x", type = "i4" },
    { name = "y", type = "i4" },
    { name = "label", type = "bstr" },
]
"#;

    fn point_info() -> Arc<RecordInfo> {
        TypeLib::from_str(LIBRARY).unwrap().record_info("Point").unwrap()
    }

    #[test]
    fn test_scalars_follow_declared_type() {
        assert_eq!(json_to_variant(&json!(7), &TypeSpec::R8, None).unwrap(), Variant::R8(7.0));
        assert_eq!(json_to_variant(&json!("12"), &TypeSpec::I4, None).unwrap(), Variant::I4(12));
        assert_eq!(json_to_variant(&json!(3), &TypeSpec::Bstr, None).unwrap(), Variant::from("3"));
        assert_eq!(json_to_variant(&json!(null), &TypeSpec::I4, None).unwrap(), Variant::I4(0));
        assert!(json_to_variant(&json!(1.5), &TypeSpec::I4, None).is_err());
        assert!(json_to_variant(&json!(70000), &TypeSpec::I2, None).is_err());
    }

    #[test]
    fn test_untyped_values() {
        assert_eq!(json_to_variant(&json!(true), &TypeSpec::Variant, None).unwrap(), Variant::from(true));
        assert_eq!(
            json_to_variant(&json!(3_000_000_000_u32), &TypeSpec::Variant, None).unwrap(),
            Variant::Ui4(3_000_000_000)
        );
        let array = json_to_variant(&json!([1, "a"]), &TypeSpec::Variant, None).unwrap();
        assert_eq!(array.as_array().unwrap().vt(), VarType::Variant);
        assert!(json_to_variant(&json!({"a": 1}), &TypeSpec::Variant, None).is_err());
    }

    #[test]
    fn test_record_from_object() {
        let info = point_info();
        let ty = TypeSpec::Record("Point".to_string());
        let value = json_to_variant(&json!({"X": 3, "y": "4"}), &ty, Some(&info)).unwrap();

        let record = value.as_record().unwrap();
        assert_eq!(record.field("x").unwrap(), &Variant::I4(3));
        assert_eq!(record.field("y").unwrap(), &Variant::I4(4));
        assert!(record.field("label").unwrap().as_bstr().unwrap().is_null());
    }

    #[test]
    fn test_record_rejects_unknown_field() {
        let info = point_info();
        let ty = TypeSpec::Record("Point".to_string());
        let err = json_to_variant(&json!({"z": 1}), &ty, Some(&info)).unwrap_err();
        assert!(err.to_string().contains("no field z"));
        assert!(json_to_variant(&json!({"x": 1}), &ty, None).is_err());
    }

    #[test]
    fn test_array_of_records() {
        let info = point_info();
        let ty = TypeSpec::Array(Box::new(TypeSpec::Record("Point".to_string())));
        let value =
            json_to_variant(&json!([{"x": 1}, {"x": 2, "label": "b"}]), &ty, Some(&info)).unwrap();

        let array = value.as_array().unwrap();
        assert_eq!(array.element_count(), 2);
        assert_eq!(array.record_info().unwrap().guid(), Guid::parse("{7B1F3C82-405D-4E6F-9BAC-1D2E3F4A5B6C}").unwrap());
        assert_eq!(
            variant_to_json(&value).unwrap(),
            json!([{"x": 1, "y": 0, "label": ""}, {"x": 2, "y": 0, "label": "b"}])
        );
    }

    #[test]
    fn test_scalar_array() {
        let ty = TypeSpec::Array(Box::new(TypeSpec::R8));
        let value = json_to_variant(&json!([0, 1.5, "2"]), &ty, None).unwrap();
        assert_eq!(value.as_array().unwrap().to_vec::<f64>().unwrap(), vec![0.0, 1.5, 2.0]);
        assert!(json_to_variant(&json!(4), &ty, None).is_err());
    }

    #[test]
    fn test_multi_dimensional_array_nests() {
        let array = SafeArray::create(
            VarType::I4,
            &[SafeArrayBound::new(2, 1), SafeArrayBound::new(3, 0)],
        )
        .unwrap();
        array.put_element(&[2, 1], Variant::I4(5)).unwrap();

        assert_eq!(
            variant_to_json(&Variant::Array(array)).unwrap(),
            json!([[0, 0, 0], [0, 5, 0]])
        );
    }

    #[test]
    fn test_scalars_to_json() {
        assert_eq!(variant_to_json(&Variant::Empty).unwrap(), Value::Null);
        assert_eq!(variant_to_json(&Variant::from(false)).unwrap(), json!(false));
        assert_eq!(variant_to_json(&Variant::R8(0.5)).unwrap(), json!(0.5));
        assert_eq!(variant_to_json(&Variant::R8(f64::NAN)).unwrap(), Value::Null);
        assert_eq!(variant_to_json(&Variant::from("hi")).unwrap(), json!("hi"));
    }
}

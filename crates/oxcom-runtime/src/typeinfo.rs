//! Type descriptors: member tables and generic argument binding.
//!
//! A [`TypeInfo`] describes one interface of a type library. It resolves
//! member and parameter names to identifiers and performs late-bound calls:
//! arguments are coerced to the declared parameter types, placed in a
//! [`CallFrame`] and handed to the component through its
//! [`InvokeTarget`]. Out parameters are written back into the caller's
//! by-reference slots once the call succeeds.

use crate::array::SafeArray;
use crate::dispatch::{Arg, DispId, DispParams, InvokeKind};
use crate::error::{ComError, ComResult};
use crate::guid::Guid;
use crate::manifest::{InterfaceKind, ParamFlag};
use crate::record::{Record, RecordInfo};
use crate::typespec::TypeSpec;
use crate::variant::{VarType, Variant};
use std::sync::Arc;
use tracing::debug;

/// Shared handle to a type descriptor.
pub type TypeDescriptor = Arc<TypeInfo>;

/// One parameter of a member.
#[derive(Debug, Clone)]
pub struct ParamDesc {
    pub name: String,
    pub ty: TypeSpec,
    pub flags: Vec<ParamFlag>,
    /// Descriptor of the record type this parameter refers to, directly or
    /// as array element.
    pub record: Option<Arc<RecordInfo>>,
}

impl ParamDesc {
    pub fn is_in(&self) -> bool {
        self.flags.contains(&ParamFlag::In)
    }

    pub fn is_out(&self) -> bool {
        self.flags.contains(&ParamFlag::Out)
    }

    pub fn is_retval(&self) -> bool {
        self.flags.contains(&ParamFlag::Retval)
    }

    pub fn is_optional(&self) -> bool {
        self.flags.contains(&ParamFlag::Optional)
    }

    /// The value an out-only parameter starts with.
    fn initial_value(&self) -> Variant {
        match (&self.ty, &self.record) {
            (TypeSpec::Record(_), Some(info)) => Variant::Record(info.record_init()),
            (TypeSpec::Array(_), _) | (TypeSpec::Variant, _) => Variant::Empty,
            (ty, _) => Variant::Empty.change_type(ty.vt()).unwrap_or_default(),
        }
    }

    /// Convert `value` to this parameter's type, or `None`.
    fn coerce(&self, value: Variant) -> Option<Variant> {
        match (&self.ty, value) {
            (TypeSpec::Variant, value) => Some(value),
            (TypeSpec::Record(_), Variant::Record(record)) => {
                let info = self.record.as_ref()?;
                info.is_matching_type(record.info())
                    .then_some(Variant::Record(record))
            }
            (TypeSpec::Record(_), Variant::Empty) => self
                .record
                .as_ref()
                .map(|info| Variant::Record(info.record_init())),
            (TypeSpec::Array(element), Variant::Array(array)) => {
                let element_ok = match (&self.record, array.record_info()) {
                    (Some(expected), Some(actual)) => expected.is_matching_type(actual),
                    (None, None) => element.vt() == array.vt(),
                    _ => false,
                };
                element_ok.then_some(Variant::Array(array))
            }
            (TypeSpec::Record(_) | TypeSpec::Array(_), _) => None,
            (ty, value) => value.change_type(ty.vt()),
        }
    }
}

/// One member of an interface.
#[derive(Debug, Clone)]
pub struct FuncDesc {
    pub name: String,
    pub dispid: DispId,
    pub kind: InvokeKind,
    pub params: Vec<ParamDesc>,
    /// Position of the member in its interface; the slot the component
    /// implements it in.
    pub slot: usize,
}

impl FuncDesc {
    /// Parameters the caller supplies (everything except the retval).
    pub fn caller_params(&self) -> impl Iterator<Item = &ParamDesc> {
        self.params.iter().filter(|p| !p.is_retval())
    }

    fn retval_index(&self) -> Option<usize> {
        self.params.iter().position(ParamDesc::is_retval)
    }
}

/// A component's implementation of the members of one interface.
pub trait InvokeTarget {
    /// Run the member at `slot` with the bound arguments in `frame`.
    fn call_slot(&self, slot: usize, frame: &mut CallFrame<'_>) -> ComResult<()>;
}

/// Descriptor of one interface.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub guid: Guid,
    pub dispinterface: Option<Guid>,
    pub kind: InterfaceKind,
    pub funcs: Vec<FuncDesc>,
}

impl TypeInfo {
    /// Whether this descriptor answers for `iid`, either as the interface
    /// itself or as its dispinterface.
    pub fn describes(&self, iid: &Guid) -> bool {
        self.guid == *iid || self.dispinterface.as_ref() == Some(iid)
    }

    /// Look up a member by identifier and invoke kind.
    pub fn func(&self, dispid: DispId, kind: InvokeKind) -> ComResult<&FuncDesc> {
        self.funcs
            .iter()
            .find(|f| f.dispid == dispid && f.kind == kind)
            .ok_or(ComError::MemberNotFound(dispid))
    }

    /// Look up a member by name, ignoring case.
    pub fn func_by_name(&self, name: &str) -> ComResult<&FuncDesc> {
        self.funcs
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ComError::UnknownName(name.to_string()))
    }

    /// Resolve a member name and, optionally, some of its parameter names.
    ///
    /// The first entry is the member's identifier; the following ones are
    /// parameter positions. Matching ignores case.
    pub fn ids_of_names(&self, names: &[&str]) -> ComResult<Vec<DispId>> {
        let (member, params) = names
            .split_first()
            .ok_or_else(|| ComError::InvalidArg("no names to resolve".to_string()))?;
        let func = self.func_by_name(member)?;

        let mut ids = Vec::with_capacity(names.len());
        ids.push(func.dispid);
        for name in params {
            let index = func
                .params
                .iter()
                .position(|p| p.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| ComError::UnknownName(format!("{}({})", func.name, name)))?;
            ids.push(index as DispId);
        }
        Ok(ids)
    }

    /// Bind `params` to member `dispid` and call it on `target`.
    ///
    /// Returns the retval, or `Empty` for members without one. On failure
    /// no out parameter is written.
    pub fn invoke(
        &self,
        target: &dyn InvokeTarget,
        dispid: DispId,
        kind: InvokeKind,
        params: &mut DispParams<'_>,
    ) -> ComResult<Variant> {
        let func = self.func(dispid, kind)?;
        debug!(interface = %self.name, member = %func.name, args = params.args.len(), "Invoking");

        let bindings = bind(func, params)?;
        let mut values = Vec::with_capacity(func.params.len());
        for (param, binding) in func.params.iter().zip(&bindings) {
            values.push(initial_argument(param, *binding, params)?);
        }

        let mut frame = CallFrame {
            func,
            values,
        };
        target.call_slot(func.slot, &mut frame)?;

        let mut retval = Variant::Empty;
        for ((param, binding), value) in func.params.iter().zip(&bindings).zip(frame.values) {
            if param.is_retval() {
                retval = value;
            } else if param.is_out() {
                if let Some(index) = binding {
                    if let Some(Arg::Ref(slot)) = params.args.get_mut(*index) {
                        **slot = value;
                    }
                }
            }
        }
        Ok(retval)
    }
}

/// For each declared parameter, the index of the argument bound to it.
fn bind(func: &FuncDesc, params: &DispParams<'_>) -> ComResult<Vec<Option<usize>>> {
    let caller: Vec<usize> = func
        .params
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.is_retval())
        .map(|(i, _)| i)
        .collect();
    let required = func
        .caller_params()
        .filter(|p| !p.is_optional())
        .count();

    let total = params.args.len();
    let named = params.named.len();
    if named > total {
        return Err(ComError::InvalidArg(
            "more argument names than arguments".to_string(),
        ));
    }
    let positional = total - named;
    if positional > caller.len() || total > caller.len() {
        return Err(ComError::BadParamCount {
            expected: caller.len(),
            actual: total,
        });
    }

    let mut bindings = vec![None; func.params.len()];
    for (arg, &param) in caller.iter().take(positional).enumerate() {
        bindings[param] = Some(arg);
    }
    for (offset, &id) in params.named.iter().enumerate() {
        let param = usize::try_from(id)
            .ok()
            .filter(|i| caller.contains(i))
            .ok_or_else(|| ComError::UnknownName(format!("{} parameter {}", func.name, id)))?;
        if bindings[param].is_some() {
            return Err(ComError::InvalidArg(format!(
                "{} parameter {} bound twice",
                func.name, id
            )));
        }
        bindings[param] = Some(positional + offset);
    }

    for &param in &caller {
        let desc = &func.params[param];
        if bindings[param].is_none() && !desc.is_optional() {
            return Err(if named == 0 {
                ComError::BadParamCount {
                    expected: required,
                    actual: total,
                }
            } else {
                ComError::ParamNotOptional(desc.name.clone())
            });
        }
    }
    Ok(bindings)
}

fn initial_argument(
    param: &ParamDesc,
    binding: Option<usize>,
    params: &DispParams<'_>,
) -> ComResult<Variant> {
    let Some(index) = binding else {
        return Ok(if param.is_retval() || param.is_out() {
            param.initial_value()
        } else {
            Variant::Empty
        });
    };
    let mismatch = || ComError::TypeMismatch {
        arg: index as u32,
        expected: param.ty.to_string(),
    };

    let value = match &params.args[index] {
        Arg::Val(_) if param.is_out() => return Err(mismatch()),
        Arg::Ref(_) if param.is_out() && !param.is_in() => return Ok(param.initial_value()),
        Arg::Val(value) => value.clone(),
        Arg::Ref(slot) => (**slot).clone(),
    };
    param.coerce(value).ok_or_else(mismatch)
}

/// Arguments bound to one call, by declared parameter position.
pub struct CallFrame<'f> {
    func: &'f FuncDesc,
    values: Vec<Variant>,
}

impl CallFrame<'_> {
    /// Name of the member being called.
    pub fn member(&self) -> &str {
        &self.func.name
    }

    /// Number of declared parameters, retval included.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The argument at `index`.
    pub fn get(&self, index: usize) -> ComResult<&Variant> {
        self.values
            .get(index)
            .ok_or(ComError::BadIndex(index as u32))
    }

    /// Replace the argument at `index`; used for out parameters.
    pub fn set(&mut self, index: usize, value: Variant) -> ComResult<()> {
        let slot = self
            .values
            .get_mut(index)
            .ok_or(ComError::BadIndex(index as u32))?;
        *slot = value;
        Ok(())
    }

    /// Store the member's return value.
    pub fn set_retval(&mut self, value: Variant) -> ComResult<()> {
        let index = self
            .func
            .retval_index()
            .ok_or_else(|| ComError::Fail(format!("{} has no return value", self.func.name)))?;
        self.set(index, value)
    }

    /// The argument at `index` as the typed record `R`.
    pub fn record<R: Record>(&self, index: usize) -> ComResult<R> {
        match self.get(index)? {
            Variant::Record(value) => R::from_record(value),
            other => Err(ComError::TypeMismatch {
                arg: index as u32,
                expected: format!("record:{} (got {})", R::NAME, other.vt()),
            }),
        }
    }

    /// Store a typed record into the argument at `index`.
    pub fn put_record<R: Record>(&mut self, index: usize, record: R) -> ComResult<()> {
        let info = self
            .func
            .params
            .get(index)
            .and_then(|p| p.record.clone())
            .ok_or_else(|| ComError::InvalidArg(format!("parameter {} is not a record", index)))?;
        let value = record.into_record(&info)?;
        self.set(index, Variant::Record(value))
    }

    /// The array argument at `index`.
    pub fn array(&self, index: usize) -> ComResult<&SafeArray> {
        self.get(index)?.as_array().ok_or(ComError::TypeMismatch {
            arg: index as u32,
            expected: VarType::Array.to_string(),
        })
    }

    /// The array argument at `index`, mutably.
    pub fn array_mut(&mut self, index: usize) -> ComResult<&mut SafeArray> {
        self.values
            .get_mut(index)
            .ok_or(ComError::BadIndex(index as u32))?
            .as_array_mut()
            .ok_or(ComError::TypeMismatch {
                arg: index as u32,
                expected: VarType::Array.to_string(),
            })
    }

    /// Record descriptor for the parameter at `index`.
    pub fn record_info(&self, index: usize) -> Option<&Arc<RecordInfo>> {
        self.func.params.get(index).and_then(|p| p.record.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bstr::BStr;
    use std::cell::Cell;

    fn param(name: &str, ty: TypeSpec, flags: &[ParamFlag]) -> ParamDesc {
        ParamDesc {
            name: name.to_string(),
            ty,
            flags: flags.to_vec(),
            record: None,
        }
    }

    fn calculator() -> TypeInfo {
        TypeInfo {
            name: "ICalc".to_string(),
            guid: Guid::generate(),
            dispinterface: None,
            kind: InterfaceKind::Dual,
            funcs: vec![
                FuncDesc {
                    name: "Add".to_string(),
                    dispid: 1,
                    kind: InvokeKind::Method,
                    params: vec![
                        param("a", TypeSpec::I4, &[ParamFlag::In]),
                        param("b", TypeSpec::I4, &[ParamFlag::In, ParamFlag::Optional]),
                        param("sum", TypeSpec::I4, &[ParamFlag::Out, ParamFlag::Retval]),
                    ],
                    slot: 0,
                },
                FuncDesc {
                    name: "Double".to_string(),
                    dispid: 2,
                    kind: InvokeKind::Method,
                    params: vec![param("value", TypeSpec::R8, &[ParamFlag::In, ParamFlag::Out])],
                    slot: 1,
                },
                FuncDesc {
                    name: "Label".to_string(),
                    dispid: 3,
                    kind: InvokeKind::PropertyGet,
                    params: vec![param("text", TypeSpec::Bstr, &[ParamFlag::Out, ParamFlag::Retval])],
                    slot: 2,
                },
            ],
        }
    }

    #[derive(Default)]
    struct Calc {
        calls: Cell<u32>,
    }

    impl InvokeTarget for Calc {
        fn call_slot(&self, slot: usize, frame: &mut CallFrame<'_>) -> ComResult<()> {
            self.calls.set(self.calls.get() + 1);
            match slot {
                0 => {
                    let a = frame.get(0)?.as_i4().unwrap_or_default();
                    let b = frame.get(1)?.clone().change_type(VarType::I4);
                    let b = b.and_then(|v| v.as_i4()).unwrap_or_default();
                    frame.set_retval(Variant::I4(a + b))
                }
                1 => {
                    let value = frame.get(0)?.as_r8().unwrap_or_default();
                    frame.set(0, Variant::R8(value * 2.0))
                }
                2 => frame.set_retval(Variant::Bstr(BStr::new("calc"))),
                _ => Err(ComError::MemberNotFound(slot as i32)),
            }
        }
    }

    #[test]
    fn test_ids_of_names_ignores_case() {
        let info = calculator();
        assert_eq!(info.ids_of_names(&["add"]).unwrap(), vec![1]);
        assert_eq!(info.ids_of_names(&["ADD", "B", "a"]).unwrap(), vec![1, 1, 0]);
        assert!(matches!(
            info.ids_of_names(&["Subtract"]),
            Err(ComError::UnknownName(_))
        ));
        assert!(matches!(
            info.ids_of_names(&["Add", "c"]),
            Err(ComError::UnknownName(_))
        ));
    }

    #[test]
    fn test_invoke_coerces_and_returns_retval() {
        let info = calculator();
        let calc = Calc::default();
        let mut params = DispParams::new(vec![Arg::Val(Variant::from("40")), Arg::Val(Variant::I2(2))]);
        let result = info.invoke(&calc, 1, InvokeKind::Method, &mut params).unwrap();
        assert_eq!(result, Variant::I4(42));
    }

    #[test]
    fn test_missing_optional_is_empty() {
        let info = calculator();
        let calc = Calc::default();
        let mut params = DispParams::new(vec![Arg::Val(Variant::I4(5))]);
        let result = info.invoke(&calc, 1, InvokeKind::Method, &mut params).unwrap();
        assert_eq!(result, Variant::I4(5));
    }

    #[test]
    fn test_param_count_errors() {
        let info = calculator();
        let calc = Calc::default();
        let mut none = DispParams::default();
        assert!(matches!(
            info.invoke(&calc, 1, InvokeKind::Method, &mut none),
            Err(ComError::BadParamCount { expected: 1, actual: 0 })
        ));
        let mut many = DispParams::new(vec![
            Arg::Val(Variant::I4(1)),
            Arg::Val(Variant::I4(2)),
            Arg::Val(Variant::I4(3)),
        ]);
        assert!(matches!(
            info.invoke(&calc, 1, InvokeKind::Method, &mut many),
            Err(ComError::BadParamCount { .. })
        ));
        assert_eq!(calc.calls.get(), 0);
    }

    #[test]
    fn test_type_mismatch_reports_argument() {
        let info = calculator();
        let calc = Calc::default();
        let mut params = DispParams::new(vec![Arg::Val(Variant::I4(1)), Arg::Val(Variant::from("x"))]);
        let err = info.invoke(&calc, 1, InvokeKind::Method, &mut params).unwrap_err();
        assert_eq!(err.arg_err(), Some(1));
    }

    #[test]
    fn test_out_param_written_back_by_reference() {
        let info = calculator();
        let calc = Calc::default();
        let mut value = Variant::I4(21);
        let mut params = DispParams::new(vec![Arg::Ref(&mut value)]);
        info.invoke(&calc, 2, InvokeKind::Method, &mut params).unwrap();
        drop(params);
        assert_eq!(value, Variant::R8(42.0));
    }

    #[test]
    fn test_out_param_requires_reference() {
        let info = calculator();
        let calc = Calc::default();
        let mut params = DispParams::new(vec![Arg::Val(Variant::R8(1.0))]);
        let err = info.invoke(&calc, 2, InvokeKind::Method, &mut params).unwrap_err();
        assert!(matches!(err, ComError::TypeMismatch { arg: 0, .. }));
    }

    #[test]
    fn test_invoke_kind_must_match() {
        let info = calculator();
        let calc = Calc::default();
        let mut params = DispParams::default();
        assert!(matches!(
            info.invoke(&calc, 3, InvokeKind::Method, &mut params),
            Err(ComError::MemberNotFound(3))
        ));
        let label = info
            .invoke(&calc, 3, InvokeKind::PropertyGet, &mut params)
            .unwrap();
        assert_eq!(label, Variant::from("calc"));
    }

    #[test]
    fn test_named_arguments() {
        let info = calculator();
        let calc = Calc::default();
        let mut params = DispParams::new(vec![Arg::Val(Variant::I4(3)), Arg::Val(Variant::I4(4))]);
        params.named = vec![1];
        let result = info.invoke(&calc, 1, InvokeKind::Method, &mut params).unwrap();
        assert_eq!(result, Variant::I4(7));

        let mut skipped = DispParams::new(vec![Arg::Val(Variant::I4(4))]);
        skipped.named = vec![1];
        assert!(matches!(
            info.invoke(&calc, 1, InvokeKind::Method, &mut skipped),
            Err(ComError::ParamNotOptional(_))
        ));
    }
}

//! Late-bound invocation by name.
//!
//! [`Dispatch`] is the generic invocation capability: callers resolve
//! member names to identifiers and invoke members with positional
//! [`DispParams`]. Components serve it through [`StdDispatch`], which
//! exposes one lazily resolved type descriptor and forwards binding to it.

use crate::error::{ComError, ComResult};
use crate::errorinfo::{clear_error_info, peek_error_info, set_error_info, ErrorInfo};
use crate::guid::{Guid, IID_IDISPATCH};
use crate::object::Interface;
use crate::resolver::TypeDescriptorResolver;
use crate::typeinfo::{InvokeTarget, TypeDescriptor};
use crate::variant::Variant;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Member identifier.
pub type DispId = i32;

/// Locale identifier.
pub type Lcid = u32;

/// The locale-neutral identifier.
pub const LOCALE_NEUTRAL: Lcid = 0;

/// The caller's default locale.
pub const LOCALE_USER_DEFAULT: Lcid = 0x0400;

/// Identifier reported for names that did not resolve.
pub const DISPID_UNKNOWN: DispId = -1;

/// What an invocation does with a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InvokeKind {
    #[default]
    #[serde(rename = "method")]
    Method,
    #[serde(rename = "propget")]
    PropertyGet,
    #[serde(rename = "propput")]
    PropertyPut,
}

/// One argument of a late-bound call.
#[derive(Debug)]
pub enum Arg<'a> {
    /// A snapshot. The callee's changes are never seen by the caller.
    Val(Variant),
    /// A slot owned by the caller. Out values are written back into it.
    Ref(&'a mut Variant),
}

/// Arguments of a late-bound call, in declaration order.
#[derive(Debug, Default)]
pub struct DispParams<'a> {
    pub args: Vec<Arg<'a>>,
    /// Parameter positions of the trailing named arguments.
    pub named: Vec<DispId>,
}

impl<'a> DispParams<'a> {
    pub fn new(args: Vec<Arg<'a>>) -> Self {
        Self {
            args,
            named: Vec::new(),
        }
    }

    /// Append a by-value argument.
    pub fn push_val(&mut self, value: impl Into<Variant>) -> &mut Self {
        self.args.push(Arg::Val(value.into()));
        self
    }

    /// Append a by-reference argument.
    pub fn push_ref(&mut self, slot: &'a mut Variant) -> &mut Self {
        self.args.push(Arg::Ref(slot));
        self
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// The generic invocation capability.
pub trait Dispatch {
    /// Number of type descriptors the object exposes.
    fn type_info_count(&self) -> u32;

    /// The type descriptor at `index`.
    fn type_info(&self, index: u32, lcid: Lcid) -> ComResult<TypeDescriptor>;

    /// Resolve a member name followed by parameter names.
    fn ids_of_names(&self, iid: &Guid, names: &[&str], lcid: Lcid) -> ComResult<Vec<DispId>>;

    /// Invoke member `dispid`, returning its result.
    fn invoke(
        &self,
        dispid: DispId,
        iid: &Guid,
        lcid: Lcid,
        kind: InvokeKind,
        params: &mut DispParams<'_>,
    ) -> ComResult<Variant>;
}

impl Interface for dyn Dispatch {
    const IID: Guid = IID_IDISPATCH;
}

/// Standard implementation of [`Dispatch`] over one type descriptor.
///
/// Only the default dispatch interface is served: any interface identity
/// other than the null one is refused with
/// [`ComError::UnknownInterface`] before the descriptor is touched.
/// Descriptors are locale-neutral, so the locale is accepted as given.
pub struct StdDispatch {
    resolver: TypeDescriptorResolver,
}

impl StdDispatch {
    pub fn new(resolver: TypeDescriptorResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &TypeDescriptorResolver {
        &self.resolver
    }

    pub fn type_info_count(&self) -> u32 {
        1
    }

    pub fn type_info(&self, index: u32, _lcid: Lcid) -> ComResult<TypeDescriptor> {
        if index != 0 {
            return Err(ComError::BadIndex(index));
        }
        self.resolver.resolve()
    }

    pub fn ids_of_names(&self, iid: &Guid, names: &[&str], _lcid: Lcid) -> ComResult<Vec<DispId>> {
        if !iid.is_null() {
            return Err(ComError::UnknownInterface(*iid));
        }
        self.resolver.resolve()?.ids_of_names(names)
    }

    /// Invoke through the descriptor on `target`.
    ///
    /// The error-info slot is cleared first. A failure leaves its
    /// description there unless the member already set one.
    pub fn invoke(
        &self,
        target: &dyn InvokeTarget,
        dispid: DispId,
        iid: &Guid,
        _lcid: Lcid,
        kind: InvokeKind,
        params: &mut DispParams<'_>,
    ) -> ComResult<Variant> {
        clear_error_info();

        let result = if iid.is_null() {
            self.resolver
                .resolve()
                .and_then(|descriptor| descriptor.invoke(target, dispid, kind, params))
        } else {
            Err(ComError::UnknownInterface(*iid))
        };

        if let Err(err) = &result {
            debug!(source = %self.resolver.source(), dispid, error = %err, "Invoke failed");
            if peek_error_info().is_none() {
                set_error_info(Some(ErrorInfo::from_error(
                    self.resolver.source(),
                    self.resolver.iid(),
                    err,
                )));
            }
        }
        result
    }
}

/// Resolve `name` on `dispatch` and invoke it as a method.
pub fn invoke_by_name(
    dispatch: &dyn Dispatch,
    name: &str,
    params: &mut DispParams<'_>,
) -> ComResult<Variant> {
    invoke_named(dispatch, name, InvokeKind::Method, params)
}

/// Resolve `name` on `dispatch` and invoke it with `kind`.
pub fn invoke_named(
    dispatch: &dyn Dispatch,
    name: &str,
    kind: InvokeKind,
    params: &mut DispParams<'_>,
) -> ComResult<Variant> {
    let ids = dispatch.ids_of_names(&Guid::default(), &[name], LOCALE_USER_DEFAULT)?;
    let dispid = ids.first().copied().unwrap_or(DISPID_UNKNOWN);
    dispatch.invoke(dispid, &Guid::default(), LOCALE_USER_DEFAULT, kind, params)
}

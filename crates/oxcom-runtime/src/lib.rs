//! # oxcom-runtime
//!
//! Component object runtime for late-bound hosts.
//!
//! This crate provides:
//! - Reference-counted objects with capability queries and aggregation
//! - Late-bound invocation by name through type descriptors
//! - Parameter records and bounds-described arrays for the call boundary
//! - Type libraries as TOML manifests, with registration and discovery
//! - Class factories and a class registry
//!
//! ## Threading
//!
//! Objects are affine to the thread that created them. Handles are
//! `!Send`, reference counts are plain cells, and nothing inside an object
//! is locked. Hosts that need several apartments run one per thread.
//!
//! ## Errors
//!
//! Every operation returns [`ComResult`]. Each [`ComError`] maps to a
//! boundary status code, and failed late-bound calls leave an
//! [`ErrorInfo`] in the thread's error-info slot.

pub mod array;
pub mod bstr;
pub mod class_registry;
pub mod diag;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod errorinfo;
pub mod factory;
pub mod guid;
pub mod hresult;
pub mod manifest;
pub mod object;
pub mod record;
pub mod registry;
pub mod resolver;
pub mod typeinfo;
pub mod typelib;
pub mod typespec;
pub mod variant;

pub use array::{ArrayAccess, ArrayElement, SafeArray, SafeArrayBound};
pub use bstr::BStr;
pub use class_registry::{ClassRegistry, ClassSummary};
pub use discovery::{discover_typelibs, register_discovered, TypeLibPath};
pub use dispatch::{
    invoke_by_name, invoke_named, Arg, DispId, DispParams, Dispatch, InvokeKind, Lcid,
    StdDispatch, LOCALE_NEUTRAL, LOCALE_USER_DEFAULT,
};
pub use error::{ComError, ComResult, ExcepInfo};
pub use errorinfo::{
    clear_error_info, get_error_info, peek_error_info, set_error_info, ErrorInfo,
    SupportErrorInfo,
};
pub use factory::{ClassFactory, ComponentFactory};
pub use guid::{Clsid, Guid, Iid, IID_IDISPATCH, IID_ISUPPORT_ERROR_INFO, IID_IUNKNOWN, IID_NULL};
pub use hresult::HResult;
pub use manifest::TypeLibManifest;
pub use object::{ComObject, ComPtr, Component, Interface, InterfaceView};
pub use record::{Record, RecordInfo, RecordValue};
pub use registry::{LibraryRef, TypeLibRegistry};
pub use resolver::TypeDescriptorResolver;
pub use typeinfo::{CallFrame, InvokeTarget, TypeDescriptor, TypeInfo};
pub use typelib::{CoclassInfo, LibAttr, TypeLib};
pub use typespec::TypeSpec;
pub use variant::{VarType, Variant, VariantBool, VARIANT_FALSE, VARIANT_TRUE};

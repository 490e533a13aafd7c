//! Error types for the component runtime.

use crate::guid::Guid;
use crate::hresult::{self, HResult};
use std::fmt;
use thiserror::Error;

/// Errors surfaced by runtime operations. Each maps to a boundary status
/// code through [`ComError::hresult`].
#[derive(Error, Debug)]
pub enum ComError {
    /// The object does not support the requested capability.
    #[error("No such interface supported: {0}")]
    NoInterface(Guid),

    /// A controlling outer was supplied to a class that cannot be aggregated.
    #[error("Class does not support aggregation")]
    NoAggregation,

    /// No class is registered under the given CLSID or ProgID.
    #[error("Class not registered: {0}")]
    ClassNotRegistered(String),

    /// The object behind a handle has already been destroyed.
    #[error("Object is not connected")]
    Disconnected,

    /// A required output location was missing.
    #[error("Invalid pointer: {0}")]
    Pointer(String),

    /// A dispatch call named an interface other than the default one.
    #[error("Unknown interface: {0}")]
    UnknownInterface(Guid),

    /// A descriptor index was out of range.
    #[error("Invalid index: {0}")]
    BadIndex(u32),

    /// A name did not resolve to a member or parameter.
    #[error("Unknown name: {0}")]
    UnknownName(String),

    /// No member with the given identifier and invoke kind.
    #[error("Member not found: {0}")]
    MemberNotFound(i32),

    /// Wrong number of arguments for the member.
    #[error("Invalid number of parameters: expected {expected}, got {actual}")]
    BadParamCount { expected: usize, actual: usize },

    /// An argument could not be coerced to the declared parameter type.
    #[error("Type mismatch in argument {arg}: expected {expected}")]
    TypeMismatch { arg: u32, expected: String },

    /// A required parameter was not supplied.
    #[error("Parameter not optional: {0}")]
    ParamNotOptional(String),

    /// The array is already being accessed.
    #[error("Array is locked")]
    ArrayLocked,

    /// No type library is registered for the requested identity and version.
    #[error("Library not registered: {0}")]
    LibraryNotRegistered(String),

    /// The type library does not describe the requested element.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The type library could not be read or is malformed.
    #[error("Error loading type library: {0}")]
    CantLoadLibrary(String),

    /// An argument was invalid.
    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    /// Allocation failed.
    #[error("Out of memory")]
    OutOfMemory,

    /// Unspecified failure.
    #[error("Unspecified error: {0}")]
    Fail(String),

    /// The member raised an exception during invocation.
    #[error("Exception occurred: {0}")]
    Exception(ExcepInfo),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ComError {
    /// The boundary status code for this error.
    pub fn hresult(&self) -> HResult {
        match self {
            ComError::NoInterface(_) => hresult::E_NOINTERFACE,
            ComError::NoAggregation => hresult::CLASS_E_NOAGGREGATION,
            ComError::ClassNotRegistered(_) => hresult::REGDB_E_CLASSNOTREG,
            ComError::Disconnected => hresult::CO_E_OBJNOTCONNECTED,
            ComError::Pointer(_) => hresult::E_POINTER,
            ComError::UnknownInterface(_) => hresult::DISP_E_UNKNOWNINTERFACE,
            ComError::BadIndex(_) => hresult::DISP_E_BADINDEX,
            ComError::UnknownName(_) => hresult::DISP_E_UNKNOWNNAME,
            ComError::MemberNotFound(_) => hresult::DISP_E_MEMBERNOTFOUND,
            ComError::BadParamCount { .. } => hresult::DISP_E_BADPARAMCOUNT,
            ComError::TypeMismatch { .. } => hresult::DISP_E_TYPEMISMATCH,
            ComError::ParamNotOptional(_) => hresult::DISP_E_PARAMNOTOPTIONAL,
            ComError::ArrayLocked => hresult::DISP_E_ARRAYISLOCKED,
            ComError::LibraryNotRegistered(_) => hresult::TYPE_E_LIBNOTREGISTERED,
            ComError::ElementNotFound(_) => hresult::TYPE_E_ELEMENTNOTFOUND,
            ComError::CantLoadLibrary(_) | ComError::Toml(_) => hresult::TYPE_E_CANTLOADLIBRARY,
            ComError::InvalidArg(_) => hresult::E_INVALIDARG,
            ComError::OutOfMemory => hresult::E_OUTOFMEMORY,
            ComError::Fail(_) | ComError::Io(_) => hresult::E_FAIL,
            ComError::Exception(_) => hresult::DISP_E_EXCEPTION,
        }
    }

    /// Whether this error means a type descriptor could not be obtained.
    pub fn is_descriptor_unavailable(&self) -> bool {
        matches!(
            self,
            ComError::LibraryNotRegistered(_)
                | ComError::ElementNotFound(_)
                | ComError::CantLoadLibrary(_)
                | ComError::Toml(_)
        )
    }

    /// The zero-based argument position for argument-related failures.
    pub fn arg_err(&self) -> Option<u32> {
        match self {
            ComError::TypeMismatch { arg, .. } => Some(*arg),
            _ => None,
        }
    }
}

/// Exception details filled in by a member that fails during invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExcepInfo {
    /// Application-defined error code, zero when `scode` is used.
    pub code: u16,
    /// Name of the component raising the exception.
    pub source: String,
    /// Human-readable description.
    pub description: String,
    /// Status code describing the failure.
    pub scode: HResult,
}

impl fmt::Display for ExcepInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.source,
            hresult::Status(self.scode),
            self.description
        )
    }
}

/// Result type for runtime operations.
pub type ComResult<T> = std::result::Result<T, ComError>;

//! The ambient error-info slot and the diagnostics capability.
//!
//! A failing operation may leave a description of the failure in a
//! thread-scoped slot. The slot is cleared at the start of every dynamic
//! invocation, so after a successful call it is always empty.

use crate::error::ComError;
use crate::guid::{Guid, IID_ISUPPORT_ERROR_INFO};
use crate::hresult::HResult;
use crate::object::Interface;
use std::cell::RefCell;

/// Description of the most recent failure on this thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Interface that defined the failing member.
    pub guid: Guid,
    /// Component that raised the error.
    pub source: String,
    /// Human-readable description.
    pub description: String,
    /// Status code of the failure.
    pub hresult: HResult,
}

impl ErrorInfo {
    /// Describe a runtime error raised by `source` while serving `guid`.
    pub fn from_error(source: &str, guid: Guid, err: &ComError) -> Self {
        Self {
            guid,
            source: source.to_string(),
            description: err.to_string(),
            hresult: err.hresult(),
        }
    }
}

thread_local! {
    static ERROR_INFO: RefCell<Option<ErrorInfo>> = const { RefCell::new(None) };
}

/// Replace the contents of the slot. `None` clears it.
pub fn set_error_info(info: Option<ErrorInfo>) {
    ERROR_INFO.with(|slot| *slot.borrow_mut() = info);
}

/// Take the current error info, leaving the slot empty.
pub fn get_error_info() -> Option<ErrorInfo> {
    ERROR_INFO.with(|slot| slot.borrow_mut().take())
}

/// Inspect the current error info without consuming it.
pub fn peek_error_info() -> Option<ErrorInfo> {
    ERROR_INFO.with(|slot| slot.borrow().clone())
}

/// Empty the slot.
pub fn clear_error_info() {
    set_error_info(None);
}

/// Objects that publish rich error information for some of their interfaces.
pub trait SupportErrorInfo {
    /// Whether failures on `iid` populate the ambient error-info slot.
    fn interface_supports_error_info(&self, iid: &Guid) -> bool;
}

impl Interface for dyn SupportErrorInfo {
    const IID: Guid = IID_ISUPPORT_ERROR_INFO;
}

//! Diagnostic trace sink used by components.

use crate::hresult::{failed, HResult, Status};
use tracing::{debug, warn};

/// Record a diagnostic message from `component` with the status it relates to.
///
/// Fire-and-forget: never fails the caller.
pub fn trace(component: &str, message: &str, hr: HResult) {
    if failed(hr) {
        warn!(target: "oxcom::trace", component, status = %Status(hr), "{}", message);
    } else {
        debug!(target: "oxcom::trace", component, status = %Status(hr), "{}", message);
    }
}

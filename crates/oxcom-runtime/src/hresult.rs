//! 32-bit status codes returned across the boundary.

use std::fmt;

/// A boundary status code. Negative values are failures.
pub type HResult = i32;

pub const S_OK: HResult = 0;
pub const S_FALSE: HResult = 1;

pub const E_NOINTERFACE: HResult = 0x8000_4002_u32 as i32;
pub const E_POINTER: HResult = 0x8000_4003_u32 as i32;
pub const E_FAIL: HResult = 0x8000_4005_u32 as i32;
pub const E_UNEXPECTED: HResult = 0x8000_ffff_u32 as i32;
pub const E_OUTOFMEMORY: HResult = 0x8007_000e_u32 as i32;
pub const E_INVALIDARG: HResult = 0x8007_0057_u32 as i32;

pub const CLASS_E_NOAGGREGATION: HResult = 0x8004_0110_u32 as i32;
pub const REGDB_E_CLASSNOTREG: HResult = 0x8004_0154_u32 as i32;
pub const CO_E_OBJNOTCONNECTED: HResult = 0x8004_01fd_u32 as i32;

pub const DISP_E_UNKNOWNINTERFACE: HResult = 0x8002_0001_u32 as i32;
pub const DISP_E_MEMBERNOTFOUND: HResult = 0x8002_0003_u32 as i32;
pub const DISP_E_TYPEMISMATCH: HResult = 0x8002_0005_u32 as i32;
pub const DISP_E_UNKNOWNNAME: HResult = 0x8002_0006_u32 as i32;
pub const DISP_E_EXCEPTION: HResult = 0x8002_0009_u32 as i32;
pub const DISP_E_BADINDEX: HResult = 0x8002_000b_u32 as i32;
pub const DISP_E_ARRAYISLOCKED: HResult = 0x8002_000d_u32 as i32;
pub const DISP_E_BADPARAMCOUNT: HResult = 0x8002_000e_u32 as i32;
pub const DISP_E_PARAMNOTOPTIONAL: HResult = 0x8002_000f_u32 as i32;

pub const TYPE_E_LIBNOTREGISTERED: HResult = 0x8002_801d_u32 as i32;
pub const TYPE_E_ELEMENTNOTFOUND: HResult = 0x8002_802b_u32 as i32;
pub const TYPE_E_CANTLOADLIBRARY: HResult = 0x8002_9c4a_u32 as i32;

/// Whether a status code denotes success.
pub fn succeeded(hr: HResult) -> bool {
    hr >= 0
}

/// Whether a status code denotes failure.
pub fn failed(hr: HResult) -> bool {
    hr < 0
}

/// Formats a status code as `0x8000FFFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub HResult);

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010X}", self.0 as u32)
    }
}

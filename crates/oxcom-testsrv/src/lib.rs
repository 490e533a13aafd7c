//! # oxcom-testsrv
//!
//! Test components for the oxcom runtime.
//!
//! This crate serves three classes, each reachable directly through its
//! dual interface and by name through dynamic invocation:
//!
//! - `OxcomTestSrv.RecordParamTest` passes a parameter record in/out and
//!   by value
//! - `OxcomTestSrv.SafearrayParamTest` passes a boundary array in/out and
//!   by value
//! - `OxcomTestSrv.DeviceEnumerator` returns an array of records and can
//!   be aggregated
//!
//! ## Registration
//!
//! The type libraries ship embedded in the crate. Hosts call
//! [`register_typelibs`] once and [`register_classes`] for each class
//! registry they create.

pub mod device_enum;
pub mod ids;
pub mod record_param;
pub mod registration;
pub mod safearray_param;

pub use device_enum::{Avmc, AvmcObject, DeviceInfo};
pub use record_param::{RecordParamTest, RecordParamTestObject, TestRecord, INITIALIZED_QUESTION};
pub use registration::{register_classes, register_typelibs, AVMC_TYPELIB, TESTSRV_TYPELIB};
pub use safearray_param::{SafearrayParamTest, SafearrayParamTestObject};

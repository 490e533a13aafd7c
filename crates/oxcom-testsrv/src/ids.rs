//! Identities of the test libraries, interfaces and classes.
//!
//! These must agree with the embedded manifests under `typelib/`.

use oxcom_runtime::{Clsid, Guid, Iid, LibraryRef, LOCALE_NEUTRAL};

/// Library of the parameter passing components.
pub const LIBID_TESTSRV: Guid = Guid::from_u128(0x07d2aee5_1df8_4d2c_953a_554adfd25f99);

/// Library of the device enumeration fixture.
pub const LIBID_AVMC: Guid = Guid::from_u128(0x8e5e3f1a_54c7_4b1d_a9e2_3d6f0c7b2e48);

pub const IID_IDUAL_RECORD_PARAM_TEST: Iid = Guid::from_u128(0x0c4e01e8_4625_46a2_bc4c_2e889a8dbbd6);
pub const DIID_IDISP_RECORD_PARAM_TEST: Iid = Guid::from_u128(0x033e4c10_0a7f_4e93_8377_499ad4b6583a);

pub const IID_IDUAL_SAFEARRAY_PARAM_TEST: Iid =
    Guid::from_u128(0x1f4f3b8b_d07e_4bb6_8d2c_d79b375696da);
pub const DIID_IDISP_SAFEARRAY_PARAM_TEST: Iid =
    Guid::from_u128(0x4097a6d0_a111_40e2_bd0b_177b775a9496);

pub const IID_IAVMC: Iid = Guid::from_u128(0x3c8b2f5d_6a19_4e07_b4c3_9d2e1f0a8b76);

/// Record type of the enumerated devices.
pub const DEVICE_INFO_IID: Guid = Guid::from_u128(0x6c7a25cb_7938_4be0_a285_12c616717fdd);

pub const CLSID_RECORD_PARAM_TEST: Clsid = Guid::from_u128(0x5e9487ed_8d6a_4e48_b7d6_0e6c85db1d29);
pub const CLSID_SAFEARRAY_PARAM_TEST: Clsid =
    Guid::from_u128(0x091d762e_ff4b_4532_8b24_23807fe873c3);
pub const CLSID_AVMC: Clsid = Guid::from_u128(0x2b6e9d41_0f3c_4a8e_9b57_c1d4e6f8a902);

pub const RECORD_PARAM_TEST_PROGID: &str = "OxcomTestSrv.RecordParamTest";
pub const SAFEARRAY_PARAM_TEST_PROGID: &str = "OxcomTestSrv.SafearrayParamTest";
pub const DEVICE_ENUMERATOR_PROGID: &str = "OxcomTestSrv.DeviceEnumerator";

/// Version 1.0 of the parameter passing library.
pub const TESTSRV_LIBRARY: LibraryRef = LibraryRef::new(LIBID_TESTSRV, 1, 0, LOCALE_NEUTRAL);

/// Version 1.0 of the device enumeration library.
pub const AVMC_LIBRARY: LibraryRef = LibraryRef::new(LIBID_AVMC, 1, 0, LOCALE_NEUTRAL);

//! Device enumeration fixture.
//!
//! Reports the same two devices on every call. It exists to return an
//! array of records through both invocation paths, and it is the one test
//! class that can be aggregated.

use crate::ids::{AVMC_LIBRARY, DEVICE_INFO_IID, IID_IAVMC};
use oxcom_runtime::diag;
use oxcom_runtime::record::expect_record;
use oxcom_runtime::{
    set_error_info, CallFrame, ComError, ComResult, Component, DispId, DispParams, Dispatch,
    ErrorInfo, Guid, Interface, InterfaceView, InvokeKind, InvokeTarget, Lcid, Record,
    RecordInfo, RecordValue, SafeArray, SafeArrayBound, StdDispatch, SupportErrorInfo,
    TypeDescriptor, TypeDescriptorResolver, TypeLibRegistry, VarType, Variant, IID_IDISPATCH,
    IID_ISUPPORT_ERROR_INFO,
};
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

const SOURCE: &str = "Avmc";

/// One enumerated device, the `DeviceInfo` record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub flags: u32,
    pub device_type: u32,
    pub id: u32,
    pub loc_id: u32,
    pub serial_number: String,
    pub description: String,
    pub ft_handle: u32,
}

fn ui4(value: &RecordValue, name: &str) -> ComResult<u32> {
    match value.get_as(name, VarType::Ui4)? {
        Variant::Ui4(v) => Ok(v),
        _ => Err(ComError::Fail(format!("field {} is not ui4", name))),
    }
}

fn text(value: &RecordValue, name: &str) -> ComResult<String> {
    Ok(value
        .field(name)?
        .as_bstr()
        .map(|s| s.as_str().to_string())
        .unwrap_or_default())
}

impl Record for DeviceInfo {
    const NAME: &'static str = "DeviceInfo";

    fn from_record(value: &RecordValue) -> ComResult<Self> {
        expect_record::<Self>(value)?;
        Ok(Self {
            flags: ui4(value, "Flags")?,
            device_type: ui4(value, "Type")?,
            id: ui4(value, "ID")?,
            loc_id: ui4(value, "LocId")?,
            serial_number: text(value, "SerialNumber")?,
            description: text(value, "Description")?,
            ft_handle: ui4(value, "ftHandle")?,
        })
    }

    fn into_record(self, info: &Arc<RecordInfo>) -> ComResult<RecordValue> {
        let mut record = info.record_init();
        expect_record::<Self>(&record)?;
        record.set("Flags", Variant::Ui4(self.flags))?;
        record.set("Type", Variant::Ui4(self.device_type))?;
        record.set("ID", Variant::Ui4(self.id))?;
        record.set("LocId", Variant::Ui4(self.loc_id))?;
        record.set("SerialNumber", Variant::from(self.serial_number.as_str()))?;
        record.set("Description", Variant::from(self.description.as_str()))?;
        record.set("ftHandle", Variant::Ui4(self.ft_handle))?;
        Ok(record)
    }
}

/// The devices every enumeration reports.
pub fn fixture_devices() -> Vec<DeviceInfo> {
    vec![
        DeviceInfo {
            flags: 12,
            device_type: 15,
            id: 13,
            loc_id: 14,
            serial_number: "1234".to_string(),
            description: "Avmc".to_string(),
            ft_handle: 0,
        },
        DeviceInfo {
            flags: 22,
            device_type: 25,
            id: 23,
            loc_id: 24,
            serial_number: "5678".to_string(),
            description: "Avmc2".to_string(),
            ft_handle: 0,
        },
    ]
}

/// The `IAvmc` interface.
pub trait Avmc {
    /// Enumerate attached devices as a zero-based array of `DeviceInfo`
    /// records. The caller owns the array.
    fn find_all_avmc(&self) -> ComResult<SafeArray>;
}

impl Interface for dyn Avmc {
    const IID: Guid = IID_IAVMC;
}

/// Implementation of [`Avmc`].
pub struct AvmcObject {
    typelibs: Arc<TypeLibRegistry>,
    dispatch: StdDispatch,
}

impl AvmcObject {
    pub fn new(typelibs: Arc<TypeLibRegistry>) -> Self {
        let resolver =
            TypeDescriptorResolver::new(Arc::clone(&typelibs), AVMC_LIBRARY, IID_IAVMC, SOURCE);
        Self {
            typelibs,
            dispatch: StdDispatch::new(resolver),
        }
    }

    /// Describe `err` in the error-info slot and hand it back.
    fn raise(&self, description: &str, err: ComError) -> ComError {
        diag::trace(SOURCE, description, err.hresult());
        set_error_info(Some(ErrorInfo {
            guid: IID_IAVMC,
            source: SOURCE.to_string(),
            description: description.to_string(),
            hresult: err.hresult(),
        }));
        err
    }

    fn device_info(&self) -> ComResult<Arc<RecordInfo>> {
        self.typelibs
            .load(&AVMC_LIBRARY)?
            .record_info_of_guid(&DEVICE_INFO_IID)
    }
}

impl Avmc for AvmcObject {
    fn find_all_avmc(&self) -> ComResult<SafeArray> {
        let devices = fixture_devices();
        let info = self
            .device_info()
            .map_err(|e| self.raise("Can not create Device Info interface", e))?;

        let list = SafeArray::create_records(&info, &[SafeArrayBound::new(devices.len() as u32, 0)])
            .map_err(|e| self.raise("Can not create array of Device Info structures", e))?;
        {
            let mut data = list.access_data::<RecordValue>()?;
            for (slot, device) in data.iter_mut().zip(devices) {
                *slot = device.into_record(&info)?;
            }
        }
        debug!(devices = list.element_count(), "Enumerated devices");
        Ok(list)
    }
}

impl SupportErrorInfo for AvmcObject {
    fn interface_supports_error_info(&self, iid: &Guid) -> bool {
        iid.is_one_of(&[&IID_IAVMC])
    }
}

impl InvokeTarget for AvmcObject {
    fn call_slot(&self, slot: usize, frame: &mut CallFrame<'_>) -> ComResult<()> {
        match slot {
            0 => {
                let list = self.find_all_avmc()?;
                frame.set_retval(Variant::Array(list))
            }
            _ => Err(ComError::MemberNotFound(slot as DispId)),
        }
    }
}

impl Dispatch for AvmcObject {
    fn type_info_count(&self) -> u32 {
        self.dispatch.type_info_count()
    }

    fn type_info(&self, index: u32, lcid: Lcid) -> ComResult<TypeDescriptor> {
        self.dispatch.type_info(index, lcid)
    }

    fn ids_of_names(&self, iid: &Guid, names: &[&str], lcid: Lcid) -> ComResult<Vec<DispId>> {
        self.dispatch.ids_of_names(iid, names, lcid)
    }

    fn invoke(
        &self,
        dispid: DispId,
        iid: &Guid,
        lcid: Lcid,
        kind: InvokeKind,
        params: &mut DispParams<'_>,
    ) -> ComResult<Variant> {
        self.dispatch.invoke(self, dispid, iid, lcid, kind, params)
    }
}

impl Component for AvmcObject {
    fn class_name(&self) -> &str {
        SOURCE
    }

    fn query_own(self: Rc<Self>, iid: &Guid) -> Option<InterfaceView> {
        if *iid == IID_IAVMC {
            Some(InterfaceView::new::<dyn Avmc>(self))
        } else if *iid == IID_IDISPATCH {
            Some(InterfaceView::new::<dyn Dispatch>(self))
        } else if *iid == IID_ISUPPORT_ERROR_INFO {
            Some(InterfaceView::new::<dyn SupportErrorInfo>(self))
        } else {
            None
        }
    }
}

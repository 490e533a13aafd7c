//! Array parameter passing component.

use crate::ids::{DIID_IDISP_SAFEARRAY_PARAM_TEST, IID_IDUAL_SAFEARRAY_PARAM_TEST, TESTSRV_LIBRARY};
use oxcom_runtime::diag;
use oxcom_runtime::hresult::S_OK;
use oxcom_runtime::{
    ArrayAccess, CallFrame, ComError, ComResult, Component, DispId, DispParams, Dispatch, Guid,
    Interface, InterfaceView, InvokeKind, InvokeTarget, Lcid, SafeArray, StdDispatch,
    TypeDescriptor, TypeDescriptorResolver, TypeLibRegistry, Variant, IID_IDISPATCH,
};
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

const SOURCE: &str = "SafearrayParamTest";

/// The `IDualSafearrayParamTest` interface, over arrays of `f64`.
pub trait SafearrayParamTest {
    /// Overwrite every element with its own index.
    fn init_array(&self, array: &mut SafeArray) -> ComResult<()>;

    /// Whether every element equals its own index.
    ///
    /// The array is zeroed afterwards whatever the outcome. Called
    /// directly, the caller's array is the one zeroed; through dynamic
    /// invocation the array is an `in` parameter and the callee works on a
    /// copy.
    fn verify_array(&self, array: &SafeArray) -> ComResult<bool>;
}

impl Interface for dyn SafearrayParamTest {
    const IID: Guid = IID_IDUAL_SAFEARRAY_PARAM_TEST;
}

fn trace(message: &str) {
    diag::trace(SOURCE, message, S_OK);
}

/// Access the elements of `array`. Failure is reported as a generic one.
fn access(array: &SafeArray) -> ComResult<ArrayAccess<'_, f64>> {
    array.access_data::<f64>().map_err(|e| {
        let err = ComError::Fail(format!("cannot access array data: {}", e));
        diag::trace(SOURCE, &format!("SafeArrayAccessData failed: {}", e), err.hresult());
        err
    })
}

/// Implementation of [`SafearrayParamTest`], also served by name.
pub struct SafearrayParamTestObject {
    dispatch: StdDispatch,
}

impl SafearrayParamTestObject {
    pub fn new(typelibs: Arc<TypeLibRegistry>) -> Self {
        let resolver = TypeDescriptorResolver::new(
            typelibs,
            TESTSRV_LIBRARY,
            IID_IDUAL_SAFEARRAY_PARAM_TEST,
            SOURCE,
        );
        Self {
            dispatch: StdDispatch::new(resolver),
        }
    }
}

impl SafearrayParamTest for SafearrayParamTestObject {
    fn init_array(&self, array: &mut SafeArray) -> ComResult<()> {
        let mut data = access(array)?;
        debug!(elements = ?&data[..], "Received SAFEARRAY");

        for (index, element) in data.iter_mut().enumerate() {
            *element = index as f64;
        }
        debug!(elements = ?&data[..], "Modified SAFEARRAY");
        Ok(())
    }

    fn verify_array(&self, array: &SafeArray) -> ComResult<bool> {
        let mut data = access(array)?;
        debug!(elements = ?&data[..], "Received SAFEARRAY");

        let matches = data
            .iter()
            .enumerate()
            .all(|(index, element)| *element == index as f64);

        data.fill(0.0);
        debug!(matches, "Zeroed SAFEARRAY");
        Ok(matches)
    }
}

impl InvokeTarget for SafearrayParamTestObject {
    fn call_slot(&self, slot: usize, frame: &mut CallFrame<'_>) -> ComResult<()> {
        match slot {
            0 => self.init_array(frame.array_mut(0)?),
            1 => {
                let result = self.verify_array(frame.array(0)?)?;
                frame.set_retval(Variant::Bool(result.into()))
            }
            _ => Err(ComError::MemberNotFound(slot as DispId)),
        }
    }
}

impl Dispatch for SafearrayParamTestObject {
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

impl Component for SafearrayParamTestObject {
    fn class_name(&self) -> &str {
        SOURCE
    }

    fn query_own(self: Rc<Self>, iid: &Guid) -> Option<InterfaceView> {
        if *iid == IID_IDUAL_SAFEARRAY_PARAM_TEST {
            Some(InterfaceView::new::<dyn SafearrayParamTest>(self))
        } else if *iid == DIID_IDISP_SAFEARRAY_PARAM_TEST {
            trace("Queried for IDispSafearrayParamTest.");
            Some(InterfaceView::with_iid::<dyn Dispatch>(*iid, self))
        } else if *iid == IID_IDISPATCH {
            Some(InterfaceView::new::<dyn Dispatch>(self))
        } else {
            None
        }
    }
}

impl Drop for SafearrayParamTestObject {
    fn drop(&mut self) {
        trace("Destroy self.");
    }
}

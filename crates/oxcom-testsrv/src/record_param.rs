//! Record parameter passing component.
//!
//! `InitRecord` takes the record in/out and overwrites it with the
//! initialized values. `VerifyRecord` takes it by value, checks it against
//! those values and then changes its own copy, which the caller must never
//! observe.

use crate::ids::{DIID_IDISP_RECORD_PARAM_TEST, IID_IDUAL_RECORD_PARAM_TEST, TESTSRV_LIBRARY};
use oxcom_runtime::diag;
use oxcom_runtime::hresult::S_OK;
use oxcom_runtime::record::expect_record;
use oxcom_runtime::{
    BStr, CallFrame, ComError, ComResult, Component, DispId, DispParams, Dispatch, Guid,
    Interface, InterfaceView, InvokeKind, InvokeTarget, Lcid, Record, RecordInfo, RecordValue,
    StdDispatch, TypeDescriptor, TypeDescriptorResolver, TypeLibRegistry, VarType, Variant,
    VariantBool, IID_IDISPATCH,
};
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Text of an initialized record's question.
pub const INITIALIZED_QUESTION: &str = "The meaning of life, the universe and everything?";

/// Answer of an initialized record.
pub const INITIALIZED_ANSWER: i32 = 42;

const SOURCE: &str = "RecordParamTest";

/// The `StructRecordParamTest` record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestRecord {
    pub question: BStr,
    pub answer: i32,
    pub needs_clarification: VariantBool,
}

impl TestRecord {
    /// The record as `InitRecord` leaves it.
    pub fn initialized() -> Self {
        Self {
            question: BStr::new(INITIALIZED_QUESTION),
            answer: INITIALIZED_ANSWER,
            needs_clarification: VariantBool::TRUE,
        }
    }
}

impl Record for TestRecord {
    const NAME: &'static str = "StructRecordParamTest";

    fn from_record(value: &RecordValue) -> ComResult<Self> {
        expect_record::<Self>(value)?;
        Ok(Self {
            question: value.field("question")?.as_bstr().cloned().unwrap_or_default(),
            answer: value
                .get_as("answer", VarType::I4)?
                .as_i4()
                .unwrap_or_default(),
            needs_clarification: value
                .get_as("needs_clarification", VarType::Bool)?
                .as_bool()
                .unwrap_or_default(),
        })
    }

    fn into_record(self, info: &Arc<RecordInfo>) -> ComResult<RecordValue> {
        let mut record = info.record_init();
        expect_record::<Self>(&record)?;
        record.set("question", Variant::Bstr(self.question))?;
        record.set("answer", Variant::I4(self.answer))?;
        record.set("needs_clarification", Variant::Bool(self.needs_clarification))?;
        Ok(record)
    }
}

/// The `IDualRecordParamTest` interface.
pub trait RecordParamTest {
    /// Overwrite `record` with the initialized values. The caller sees the
    /// new contents.
    fn init_record(&self, record: &mut TestRecord) -> ComResult<()>;

    /// Whether `record` holds the initialized values. The question is
    /// compared ignoring case.
    fn verify_record(&self, record: TestRecord) -> ComResult<bool>;
}

impl Interface for dyn RecordParamTest {
    const IID: Guid = IID_IDUAL_RECORD_PARAM_TEST;
}

fn trace(message: &str) {
    diag::trace(SOURCE, message, S_OK);
}

fn show_received(record: &TestRecord) {
    debug!(
        question = %record.question,
        answer = record.answer,
        needs_clarification = record.needs_clarification.raw(),
        "Received StructRecordParamTest"
    );
}

/// Implementation of [`RecordParamTest`], also served by name.
pub struct RecordParamTestObject {
    dispatch: StdDispatch,
}

impl RecordParamTestObject {
    pub fn new(typelibs: Arc<TypeLibRegistry>) -> Self {
        let resolver = TypeDescriptorResolver::new(
            typelibs,
            TESTSRV_LIBRARY,
            IID_IDUAL_RECORD_PARAM_TEST,
            SOURCE,
        );
        Self {
            dispatch: StdDispatch::new(resolver),
        }
    }

    /// Whether the type descriptor has been loaded.
    pub fn is_descriptor_loaded(&self) -> bool {
        self.dispatch.resolver().is_resolved()
    }
}

impl RecordParamTest for RecordParamTestObject {
    fn init_record(&self, record: &mut TestRecord) -> ComResult<()> {
        record.question.normalize_null();
        show_received(record);

        record.question.reallocate(INITIALIZED_QUESTION);
        record.answer = INITIALIZED_ANSWER;
        record.needs_clarification = VariantBool::TRUE;
        Ok(())
    }

    fn verify_record(&self, mut record: TestRecord) -> ComResult<bool> {
        record.question.normalize_null();
        show_received(&record);

        let matches = record.question.eq_ignore_case(INITIALIZED_QUESTION)
            && record.answer == INITIALIZED_ANSWER
            && record.needs_clarification.is_true();

        // Local copy only.
        record.answer = 12;
        debug!(answer = record.answer, "Modified received record");
        Ok(matches)
    }
}

impl InvokeTarget for RecordParamTestObject {
    fn call_slot(&self, slot: usize, frame: &mut CallFrame<'_>) -> ComResult<()> {
        match slot {
            0 => {
                let mut record: TestRecord = frame.record(0)?;
                self.init_record(&mut record)?;
                frame.put_record(0, record)
            }
            1 => {
                let record = frame.record(0)?;
                let result = self.verify_record(record)?;
                frame.set_retval(Variant::Bool(result.into()))
            }
            _ => Err(ComError::MemberNotFound(slot as DispId)),
        }
    }
}

impl Dispatch for RecordParamTestObject {
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

impl Component for RecordParamTestObject {
    fn class_name(&self) -> &str {
        SOURCE
    }

    fn query_own(self: Rc<Self>, iid: &Guid) -> Option<InterfaceView> {
        if *iid == IID_IDUAL_RECORD_PARAM_TEST {
            Some(InterfaceView::new::<dyn RecordParamTest>(self))
        } else if *iid == DIID_IDISP_RECORD_PARAM_TEST {
            trace("Queried for IDispRecordParamTest.");
            Some(InterfaceView::with_iid::<dyn Dispatch>(*iid, self))
        } else if *iid == IID_IDISPATCH {
            Some(InterfaceView::new::<dyn Dispatch>(self))
        } else {
            None
        }
    }
}

impl Drop for RecordParamTestObject {
    fn drop(&mut self) {
        trace("Destroy self.");
    }
}

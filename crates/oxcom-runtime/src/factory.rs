//! Class factories.

use crate::diag;
use crate::error::{ComError, ComResult};
use crate::guid::{Clsid, Guid, IID_IUNKNOWN};
use crate::object::{ComObject, ComPtr, Component};
use std::rc::Rc;
use tracing::debug;

/// Creates instances of one class.
pub trait ClassFactory {
    fn clsid(&self) -> Clsid;

    fn class_name(&self) -> &str;

    /// Whether instances may be aggregated into an outer object.
    fn aggregatable(&self) -> bool;

    /// Create an instance and query it for `iid`.
    ///
    /// With a controlling `outer`, the class must be aggregatable and `iid`
    /// must be the lifetime-management capability; the returned handle is
    /// then the new object's non-delegating identity. Otherwise the call
    /// fails with [`ComError::NoAggregation`] and nothing is created.
    fn create_instance(&self, outer: Option<&ComPtr>, iid: &Guid) -> ComResult<ComPtr>;
}

type Constructor = Box<dyn Fn() -> ComResult<Rc<dyn Component>>>;

/// A [`ClassFactory`] around a component constructor.
pub struct ComponentFactory {
    clsid: Clsid,
    name: String,
    aggregatable: bool,
    constructor: Constructor,
}

impl ComponentFactory {
    pub fn new<F>(clsid: Clsid, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> ComResult<Rc<dyn Component>> + 'static,
    {
        Self {
            clsid,
            name: name.into(),
            aggregatable: false,
            constructor: Box::new(constructor),
        }
    }

    /// Allow instances to be aggregated.
    pub fn aggregatable(mut self, aggregatable: bool) -> Self {
        self.aggregatable = aggregatable;
        self
    }
}

impl ClassFactory for ComponentFactory {
    fn clsid(&self) -> Clsid {
        self.clsid
    }

    fn class_name(&self) -> &str {
        &self.name
    }

    fn aggregatable(&self) -> bool {
        self.aggregatable
    }

    fn create_instance(&self, outer: Option<&ComPtr>, iid: &Guid) -> ComResult<ComPtr> {
        if outer.is_some() && (!self.aggregatable || *iid != IID_IUNKNOWN) {
            let err = ComError::NoAggregation;
            diag::trace(&self.name, "Aggregation refused", err.hresult());
            return Err(err);
        }

        let component = (self.constructor)()?;
        let unknown = ComObject::create(component, outer)?;
        debug!(class = %self.name, iid = %iid, "Created instance");
        if outer.is_some() {
            return Ok(unknown);
        }
        unknown.query(iid)
    }
}

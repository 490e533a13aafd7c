//! Reference-counted objects, capability queries and aggregation.
//!
//! Every object lives in an [`ObjectCore`] holding an explicit reference
//! count and the [`Component`] that implements its capabilities. Callers
//! hold counted [`ComPtr`] handles: cloning a handle adds a reference,
//! dropping it releases one, and the object is destroyed exactly once, on
//! the thread that drops the last reference.
//!
//! An aggregated object keeps a weak link to its controlling outer object.
//! Handles it gives out for its capabilities count against, and query
//! through, the outer. Only the non-delegating identity handle returned at
//! creation counts against the inner object itself; the outer keeps it
//! for as long as it lives.
//!
//! Handles are `!Send` and `!Sync`: objects are affine to the thread that
//! created them, so the count needs no atomic operations.

use crate::error::{ComError, ComResult};
use crate::guid::{Guid, IID_IUNKNOWN};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// A capability contract. Implemented for `dyn Trait` types.
pub trait Interface: 'static {
    const IID: Guid;
}

/// A typed view of a component as one of its interfaces.
#[derive(Clone)]
pub struct InterfaceView {
    iid: Guid,
    inner: Rc<dyn Any>,
}

impl InterfaceView {
    /// View `iface` as `I`.
    pub fn new<I: ?Sized + Interface>(iface: Rc<I>) -> Self {
        Self::with_iid(I::IID, iface)
    }

    /// View `iface` under `iid`, for identifiers that share the `I` contract
    /// such as a dispinterface served by the generic dispatch contract.
    pub fn with_iid<I: ?Sized + Interface>(iid: Guid, iface: Rc<I>) -> Self {
        Self {
            iid,
            inner: Rc::new(iface),
        }
    }

    pub fn iid(&self) -> Guid {
        self.iid
    }

    /// The view as `I`, if it implements that contract.
    pub fn downcast<I: ?Sized + Interface>(&self) -> Option<&Rc<I>> {
        self.inner.downcast_ref::<Rc<I>>()
    }
}

impl fmt::Debug for InterfaceView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceView").field("iid", &self.iid).finish()
    }
}

/// The implementation behind an object.
pub trait Component: 'static {
    /// Name used in diagnostics.
    fn class_name(&self) -> &str;

    /// Answer a query for one of this component's own capabilities.
    ///
    /// The lifetime-management capability is answered by the runtime and
    /// never reaches this method.
    fn query_own(self: Rc<Self>, iid: &Guid) -> Option<InterfaceView>;

    /// Called once the object exists, with its identity handle.
    ///
    /// Outer objects create their aggregated inner objects here. The handle
    /// must not be stored: it would keep the object alive forever.
    fn init(self: Rc<Self>, this: &ComPtr) -> ComResult<()> {
        let _ = this;
        Ok(())
    }
}

/// Reference count and body of one object.
pub struct ObjectCore {
    class_name: String,
    refs: Cell<u32>,
    outer: Option<Weak<ObjectCore>>,
    body: RefCell<Option<Rc<dyn Component>>>,
}

impl ObjectCore {
    /// Whether the object has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.body.borrow().is_none()
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Whether this object is aggregated into an outer one.
    pub fn is_aggregated(&self) -> bool {
        self.outer.is_some()
    }

    fn controlling(&self) -> ComResult<Option<Rc<ObjectCore>>> {
        match &self.outer {
            None => Ok(None),
            Some(weak) => weak.upgrade().map(Some).ok_or(ComError::Disconnected),
        }
    }

    fn add_ref_own(&self) -> u32 {
        let refs = self.refs.get().saturating_add(1);
        self.refs.set(refs);
        refs
    }

    fn release_own(&self) -> u32 {
        let refs = self.refs.get();
        if refs == 0 {
            warn!(class = %self.class_name, "Release on an object with no references");
            return 0;
        }
        self.refs.set(refs - 1);
        if refs == 1 {
            self.destroy();
        }
        refs - 1
    }

    fn destroy(&self) {
        let body = self.body.borrow_mut().take();
        if body.is_some() {
            debug!(class = %self.class_name, "Destroying object");
        }
        drop(body);
    }

    fn add_ref_delegating(&self) -> u32 {
        match self.controlling() {
            Ok(Some(outer)) => outer.add_ref_delegating(),
            Ok(None) => self.add_ref_own(),
            Err(_) => {
                warn!(class = %self.class_name, "AddRef after the controlling object was destroyed");
                0
            }
        }
    }

    fn release_delegating(&self) -> u32 {
        match self.controlling() {
            Ok(Some(outer)) => outer.release_delegating(),
            Ok(None) => self.release_own(),
            Err(_) => {
                warn!(class = %self.class_name, "Release after the controlling object was destroyed");
                0
            }
        }
    }

    fn query_delegating(self: &Rc<Self>, iid: &Guid) -> ComResult<ComPtr> {
        match self.controlling()? {
            Some(outer) => outer.query_delegating(iid),
            None => self.query_nondelegating(iid),
        }
    }

    fn query_nondelegating(self: &Rc<Self>, iid: &Guid) -> ComResult<ComPtr> {
        let body = self.body.borrow().clone().ok_or(ComError::Disconnected)?;

        if *iid == IID_IUNKNOWN {
            self.add_ref_own();
            return Ok(ComPtr {
                core: Rc::clone(self),
                iid: IID_IUNKNOWN,
                view: None,
                delegating: false,
            });
        }

        match body.query_own(iid) {
            Some(view) => {
                self.add_ref_delegating();
                Ok(ComPtr {
                    core: Rc::clone(self),
                    iid: *iid,
                    view: Some(view),
                    delegating: true,
                })
            }
            None => Err(ComError::NoInterface(*iid)),
        }
    }

    /// The object whose identity this one presents.
    fn identity(self: &Rc<Self>) -> Rc<ObjectCore> {
        match self.outer.as_ref().and_then(Weak::upgrade) {
            Some(outer) => outer.identity(),
            None => Rc::clone(self),
        }
    }
}

/// Object construction.
pub struct ComObject;

impl ComObject {
    /// Create a standalone object and return its identity handle.
    pub fn new<C: Component>(component: C) -> ComResult<ComPtr> {
        Self::create(Rc::new(component), None)
    }

    /// Create an object aggregated into `outer` and return its
    /// non-delegating identity handle, which the outer keeps.
    pub fn new_aggregated<C: Component>(component: C, outer: &ComPtr) -> ComResult<ComPtr> {
        Self::create(Rc::new(component), Some(outer))
    }

    /// Create an object around an already shared component.
    pub fn create(component: Rc<dyn Component>, outer: Option<&ComPtr>) -> ComResult<ComPtr> {
        let outer = match outer {
            Some(ptr) => {
                ptr.check_live()?;
                Some(Rc::downgrade(&ptr.core.identity()))
            }
            None => None,
        };
        let core = Rc::new(ObjectCore {
            class_name: component.class_name().to_string(),
            refs: Cell::new(1),
            outer,
            body: RefCell::new(Some(Rc::clone(&component))),
        });
        debug!(class = %core.class_name, aggregated = core.is_aggregated(), "Created object");

        let this = ComPtr {
            core,
            iid: IID_IUNKNOWN,
            view: None,
            delegating: false,
        };
        component.init(&this)?;
        Ok(this)
    }
}

/// A counted handle to one capability of an object.
pub struct ComPtr {
    core: Rc<ObjectCore>,
    iid: Guid,
    view: Option<InterfaceView>,
    delegating: bool,
}

impl ComPtr {
    /// The capability this handle was obtained for.
    pub fn iid(&self) -> Guid {
        self.iid
    }

    pub fn class_name(&self) -> &str {
        self.core.class_name()
    }

    /// Query the object for another capability.
    ///
    /// On success the returned handle holds its own reference. An
    /// unsupported capability leaves the reference count unchanged.
    pub fn query(&self, iid: &Guid) -> ComResult<ComPtr> {
        if self.delegating {
            self.core.query_delegating(iid)
        } else {
            self.core.query_nondelegating(iid)
        }
    }

    /// Query for the capability `I`.
    pub fn cast<I: ?Sized + Interface>(&self) -> ComResult<ComPtr> {
        self.query(&I::IID)
    }

    /// Borrow this handle's view as `I`.
    pub fn get<I: ?Sized + Interface>(&self) -> ComResult<&I> {
        self.check_live()?;
        self.view
            .as_ref()
            .and_then(InterfaceView::downcast::<I>)
            .map(|rc| &**rc)
            .ok_or(ComError::NoInterface(I::IID))
    }

    /// The untyped view behind this handle.
    pub fn interface_view(&self) -> Option<InterfaceView> {
        self.view.clone()
    }

    /// Add a reference without creating a handle. Returns the new count.
    ///
    /// Each call must be balanced by [`ComPtr::release`].
    pub fn add_ref(&self) -> u32 {
        if self.delegating {
            self.core.add_ref_delegating()
        } else {
            self.core.add_ref_own()
        }
    }

    /// Release a reference added by [`ComPtr::add_ref`]. Returns the new
    /// count; the object is destroyed when it reaches zero.
    pub fn release(&self) -> u32 {
        if self.delegating {
            self.core.release_delegating()
        } else {
            self.core.release_own()
        }
    }

    /// Current count of the object this handle counts against.
    pub fn ref_count(&self) -> u32 {
        if self.delegating {
            if let Ok(Some(outer)) = self.core.controlling() {
                return outer.identity().refs.get();
            }
        }
        self.core.refs.get()
    }

    /// Whether both handles reach the same object identity.
    pub fn is_same_object(&self, other: &ComPtr) -> bool {
        Rc::ptr_eq(&self.identity(), &other.identity())
    }

    /// Whether the object has been destroyed.
    pub fn is_disconnected(&self) -> bool {
        self.core.is_destroyed()
    }

    fn identity(&self) -> Rc<ObjectCore> {
        if self.delegating {
            self.core.identity()
        } else {
            Rc::clone(&self.core)
        }
    }

    fn check_live(&self) -> ComResult<()> {
        if self.core.is_destroyed() {
            Err(ComError::Disconnected)
        } else {
            Ok(())
        }
    }
}

impl Clone for ComPtr {
    fn clone(&self) -> Self {
        self.add_ref();
        Self {
            core: Rc::clone(&self.core),
            iid: self.iid,
            view: self.view.clone(),
            delegating: self.delegating,
        }
    }
}

impl Drop for ComPtr {
    fn drop(&mut self) {
        // The view holds the component; let it go before the last release
        // so destruction happens inside that release.
        self.view = None;
        self.release();
    }
}

impl fmt::Debug for ComPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComPtr")
            .field("class", &self.core.class_name)
            .field("iid", &self.iid)
            .field("refs", &self.ref_count())
            .field("delegating", &self.delegating)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter {
        fn greet(&self) -> String;
    }

    impl Interface for dyn Greeter {
        const IID: Guid = Guid::from_u128(0x5a1e0001_0000_0000_0000_000000000001);
    }

    trait Counter {
        fn count(&self) -> u32;
    }

    impl Interface for dyn Counter {
        const IID: Guid = Guid::from_u128(0x5a1e0001_0000_0000_0000_000000000002);
    }

    struct Hello {
        drops: Rc<Cell<u32>>,
    }

    impl Greeter for Hello {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    impl Component for Hello {
        fn class_name(&self) -> &str {
            "Hello"
        }

        fn query_own(self: Rc<Self>, iid: &Guid) -> Option<InterfaceView> {
            (*iid == <dyn Greeter>::IID).then(|| InterfaceView::new::<dyn Greeter>(self))
        }
    }

    impl Drop for Hello {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    struct Outer {
        inner: RefCell<Option<ComPtr>>,
        drops: Rc<Cell<u32>>,
    }

    impl Counter for Outer {
        fn count(&self) -> u32 {
            7
        }
    }

    impl Component for Outer {
        fn class_name(&self) -> &str {
            "Outer"
        }

        fn query_own(self: Rc<Self>, iid: &Guid) -> Option<InterfaceView> {
            if *iid == <dyn Counter>::IID {
                return Some(InterfaceView::new::<dyn Counter>(self));
            }
            let inner = self.inner.borrow();
            let view = inner.as_ref()?.query(iid).ok()?.interface_view();
            view
        }

        fn init(self: Rc<Self>, this: &ComPtr) -> ComResult<()> {
            let inner = ComObject::new_aggregated(
                Hello {
                    drops: Rc::clone(&self.drops),
                },
                this,
            )?;
            *self.inner.borrow_mut() = Some(inner);
            Ok(())
        }
    }

    fn hello() -> (ComPtr, Rc<Cell<u32>>) {
        let drops = Rc::new(Cell::new(0));
        let ptr = ComObject::new(Hello {
            drops: Rc::clone(&drops),
        })
        .unwrap();
        (ptr, drops)
    }

    #[test]
    fn test_query_and_call() {
        let (unknown, _) = hello();
        let greeter = unknown.cast::<dyn Greeter>().unwrap();
        assert_eq!(greeter.get::<dyn Greeter>().unwrap().greet(), "hello");
        assert_eq!(unknown.ref_count(), 2);
        assert!(greeter.is_same_object(&unknown));
    }

    #[test]
    fn test_unknown_is_always_supported() {
        let (unknown, _) = hello();
        let greeter = unknown.cast::<dyn Greeter>().unwrap();
        let again = greeter.query(&IID_IUNKNOWN).unwrap();
        assert!(again.is_same_object(&unknown));
    }

    #[test]
    fn test_unsupported_query_leaves_count() {
        let (unknown, _) = hello();
        let before = unknown.ref_count();
        let err = unknown.cast::<dyn Counter>().unwrap_err();
        assert!(matches!(err, ComError::NoInterface(_)));
        assert_eq!(unknown.ref_count(), before);
        assert!(unknown.get::<dyn Greeter>().is_err());
    }

    #[test]
    fn test_add_ref_release_balance() {
        let (unknown, drops) = hello();
        assert_eq!(unknown.add_ref(), 2);
        assert_eq!(unknown.add_ref(), 3);
        assert_eq!(unknown.release(), 2);
        assert_eq!(unknown.release(), 1);
        assert_eq!(drops.get(), 0);
        drop(unknown);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_destroyed_once_and_disconnected() {
        let (unknown, drops) = hello();
        assert_eq!(unknown.release(), 0);
        assert_eq!(drops.get(), 1);
        assert!(unknown.is_disconnected());
        assert!(matches!(
            unknown.cast::<dyn Greeter>(),
            Err(ComError::Disconnected)
        ));
        assert_eq!(unknown.release(), 0);
        drop(unknown);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_aggregated_capabilities_delegate_to_outer() {
        let drops = Rc::new(Cell::new(0));
        let outer = ComObject::new(Outer {
            inner: RefCell::new(None),
            drops: Rc::clone(&drops),
        })
        .unwrap();

        let greeter = outer.cast::<dyn Greeter>().unwrap();
        assert_eq!(greeter.get::<dyn Greeter>().unwrap().greet(), "hello");
        assert!(greeter.is_same_object(&outer));
        assert_eq!(outer.ref_count(), 2);

        // Queries through the inner capability reach the outer's own ones.
        let counter = greeter.cast::<dyn Counter>().unwrap();
        assert_eq!(counter.get::<dyn Counter>().unwrap().count(), 7);

        drop(counter);
        drop(greeter);
        assert_eq!(outer.ref_count(), 1);
        drop(outer);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_inner_delegating_handle_counts_on_outer() {
        let outer_drops = Rc::new(Cell::new(0));
        let outer = ComObject::new(Outer {
            inner: RefCell::new(None),
            drops: Rc::clone(&outer_drops),
        })
        .unwrap();

        let inner_drops = Rc::new(Cell::new(0));
        let inner = ComObject::new_aggregated(
            Hello {
                drops: Rc::clone(&inner_drops),
            },
            &outer,
        )
        .unwrap();
        assert_eq!(inner.ref_count(), 1);
        assert!(!inner.is_same_object(&outer));

        let greeter = inner.cast::<dyn Greeter>().unwrap();
        assert_eq!(outer.ref_count(), 2);
        assert_eq!(inner.ref_count(), 1);
        assert!(greeter.is_same_object(&outer));
        drop(greeter);

        drop(inner);
        assert_eq!(inner_drops.get(), 1);
    }
}

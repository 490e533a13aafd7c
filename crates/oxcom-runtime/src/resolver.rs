//! Lazy, once-per-object type descriptor resolution.

use crate::diag;
use crate::error::ComResult;
use crate::guid::Guid;
use crate::registry::{LibraryRef, TypeLibRegistry};
use crate::typeinfo::TypeDescriptor;
use std::cell::OnceCell;
use std::sync::Arc;
use tracing::error;

/// Resolves and caches the descriptor of one interface for one object.
///
/// The library is loaded on the first call to [`resolve`]. A failure is
/// logged with its cause and returned unchanged; the next call tries
/// again. Once resolved, the descriptor is reused until the resolver is
/// dropped with its object.
///
/// [`resolve`]: TypeDescriptorResolver::resolve
pub struct TypeDescriptorResolver {
    registry: Arc<TypeLibRegistry>,
    library: LibraryRef,
    iid: Guid,
    source: String,
    descriptor: OnceCell<TypeDescriptor>,
}

impl TypeDescriptorResolver {
    pub fn new(
        registry: Arc<TypeLibRegistry>,
        library: LibraryRef,
        iid: Guid,
        source: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            library,
            iid,
            source: source.into(),
            descriptor: OnceCell::new(),
        }
    }

    /// Interface whose descriptor is resolved.
    pub fn iid(&self) -> Guid {
        self.iid
    }

    /// Component name used in diagnostics.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the descriptor has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.descriptor.get().is_some()
    }

    /// The descriptor, loading it on first use.
    pub fn resolve(&self) -> ComResult<TypeDescriptor> {
        if let Some(descriptor) = self.descriptor.get() {
            return Ok(Arc::clone(descriptor));
        }

        let library = self.registry.load(&self.library).map_err(|e| {
            error!(source = %self.source, library = %self.library, error = %e, "Type library unavailable");
            diag::trace(&self.source, "LoadRegTypeLib failed", e.hresult());
            e
        })?;
        let descriptor = library.type_info_of_guid(&self.iid).map_err(|e| {
            error!(source = %self.source, iid = %self.iid, error = %e, "Type descriptor unavailable");
            diag::trace(&self.source, "GetTypeInfoOfGuid failed", e.hresult());
            e
        })?;

        Ok(Arc::clone(self.descriptor.get_or_init(|| descriptor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ComError;

    const LIBRARY: &str = r#"
[library]
name = "Resolvable"
guid = "{6B1E8C50-2D3A-4F6B-8E9C-1A2B3C4D5E6F}"

[[interfaces]]
name = "IResolvable"
guid = "{6B1E8C50-2D3A-4F6B-8E9C-1A2B3C4D5E70}"
"#;

    fn library_ref() -> LibraryRef {
        LibraryRef::new(
            Guid::parse("6B1E8C50-2D3A-4F6B-8E9C-1A2B3C4D5E6F").unwrap(),
            1,
            0,
            0,
        )
    }

    #[test]
    fn test_resolves_once() {
        let registry = Arc::new(TypeLibRegistry::new());
        registry.register_source(LIBRARY).unwrap();
        let iid = Guid::parse("6B1E8C50-2D3A-4F6B-8E9C-1A2B3C4D5E70").unwrap();
        let resolver = TypeDescriptorResolver::new(Arc::clone(&registry), library_ref(), iid, "Test");

        assert!(!resolver.is_resolved());
        let first = resolver.resolve().unwrap();
        let second = resolver.resolve().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name, "IResolvable");
        assert_eq!(registry.load_count(), 1);
    }

    #[test]
    fn test_unregistered_library_propagates() {
        let registry = Arc::new(TypeLibRegistry::new());
        let resolver =
            TypeDescriptorResolver::new(registry, library_ref(), Guid::generate(), "Test");
        let err = resolver.resolve().unwrap_err();
        assert!(matches!(err, ComError::LibraryNotRegistered(_)));
        assert!(!resolver.is_resolved());
    }

    #[test]
    fn test_missing_interface_propagates() {
        let registry = Arc::new(TypeLibRegistry::new());
        registry.register_source(LIBRARY).unwrap();
        let resolver =
            TypeDescriptorResolver::new(registry, library_ref(), Guid::generate(), "Test");
        let err = resolver.resolve().unwrap_err();
        assert!(matches!(err, ComError::ElementNotFound(_)));
    }
}

//! Registered type libraries.
//!
//! Registration records where a library lives and what identity and
//! version it declares. [`TypeLibRegistry::load`] finds the best match for
//! a requested identity, version and locale, parses it on first use and
//! caches the result.

use crate::dispatch::{Lcid, LOCALE_NEUTRAL};
use crate::error::{ComError, ComResult};
use crate::guid::Guid;
use crate::manifest::TypeLibManifest;
use crate::typelib::{LibAttr, TypeLib};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// A request for a registered library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryRef {
    pub guid: Guid,
    pub major: u16,
    pub minor: u16,
    pub lcid: Lcid,
}

impl LibraryRef {
    pub const fn new(guid: Guid, major: u16, minor: u16, lcid: Lcid) -> Self {
        Self {
            guid,
            major,
            minor,
            lcid,
        }
    }
}

impl fmt::Display for LibraryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{} (lcid {})",
            self.guid, self.major, self.minor, self.lcid
        )
    }
}

/// Where a registered library's manifest comes from.
#[derive(Debug, Clone)]
pub enum LibrarySource {
    File(PathBuf),
    Embedded(Arc<str>),
}

impl fmt::Display for LibrarySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibrarySource::File(path) => write!(f, "{}", path.display()),
            LibrarySource::Embedded(_) => f.write_str("<embedded>"),
        }
    }
}

/// A registered library.
#[derive(Debug, Clone)]
pub struct Registration {
    pub attr: LibAttr,
    pub source: LibrarySource,
}

type CacheKey = (Guid, u16, u16, Lcid);

/// Registered type libraries and the libraries loaded from them.
#[derive(Default)]
pub struct TypeLibRegistry {
    entries: RwLock<Vec<Registration>>,
    loaded: Mutex<HashMap<CacheKey, Arc<TypeLib>>>,
    loads: AtomicUsize,
}

impl TypeLibRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the manifest at `path`.
    ///
    /// The manifest is validated now; it is read again when first loaded.
    pub fn register_file(&self, path: &Path) -> ComResult<LibAttr> {
        let manifest = TypeLibManifest::from_file(path).map_err(|e| {
            ComError::CantLoadLibrary(format!("{}: {}", path.display(), e))
        })?;
        let attr = TypeLib::compile(&manifest)?.attr().clone();
        self.insert(Registration {
            attr: attr.clone(),
            source: LibrarySource::File(path.to_path_buf()),
        });
        Ok(attr)
    }

    /// Register a manifest held in memory.
    pub fn register_source(&self, content: &str) -> ComResult<LibAttr> {
        let attr = TypeLib::from_str(content)?.attr().clone();
        self.insert(Registration {
            attr: attr.clone(),
            source: LibrarySource::Embedded(Arc::from(content)),
        });
        Ok(attr)
    }

    fn insert(&self, registration: Registration) {
        let key = cache_key(&registration.attr);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.iter_mut().find(|r| cache_key(&r.attr) == key) {
            debug!(library = %registration.attr.name, "Replacing registration");
            *existing = registration;
            self.evict(&key);
        } else {
            info!(
                library = %registration.attr.name,
                version = %registration.attr.version(),
                source = %registration.source,
                "Registered type library"
            );
            entries.push(registration);
        }
    }

    /// Whether a library with the same identity, version and locale as
    /// `attr` is registered.
    pub fn contains(&self, attr: &LibAttr) -> bool {
        let key = cache_key(attr);
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|r| cache_key(&r.attr) == key)
    }

    /// Remove the registration for `guid` at exactly `major.minor`.
    pub fn unregister(&self, guid: &Guid, major: u16, minor: u16) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|r| !(r.attr.guid == *guid && r.attr.major == major && r.attr.minor == minor));
        let removed = entries.len() != before;
        if removed {
            let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
            loaded.retain(|key, _| !(key.0 == *guid && key.1 == major && key.2 == minor));
            debug!(%guid, major, minor, "Unregistered type library");
        }
        removed
    }

    /// All registrations.
    pub fn registrations(&self) -> Vec<Registration> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Load the registered library best matching `request`.
    ///
    /// Matches the identity and major version, takes the highest minor
    /// version not below the requested one, and accepts the requested
    /// locale or the neutral one, preferring the exact locale.
    pub fn load(&self, request: &LibraryRef) -> ComResult<Arc<TypeLib>> {
        let registration = self.find(request).ok_or_else(|| {
            ComError::LibraryNotRegistered(request.to_string())
        })?;
        let key = cache_key(&registration.attr);

        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lib) = loaded.get(&key) {
            return Ok(Arc::clone(lib));
        }

        let lib = match &registration.source {
            LibrarySource::File(path) => TypeLib::from_file(path),
            LibrarySource::Embedded(content) => TypeLib::from_str(content),
        }
        .map_err(|e| {
            warn!(library = %registration.attr.name, source = %registration.source, error = %e, "Failed to load type library");
            e
        })?;

        if cache_key(lib.attr()) != key {
            return Err(ComError::CantLoadLibrary(format!(
                "{} no longer declares {} {}",
                registration.source,
                registration.attr.guid,
                registration.attr.version()
            )));
        }

        self.loads.fetch_add(1, Ordering::Relaxed);
        let lib = Arc::new(lib);
        loaded.insert(key, Arc::clone(&lib));
        debug!(library = %registration.attr.name, "Loaded type library");
        Ok(lib)
    }

    /// Number of libraries parsed by [`TypeLibRegistry::load`] so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    fn find(&self, request: &LibraryRef) -> Option<Registration> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .filter(|r| {
                r.attr.guid == request.guid
                    && r.attr.major == request.major
                    && r.attr.minor >= request.minor
                    && (r.attr.lcid == request.lcid || r.attr.lcid == LOCALE_NEUTRAL)
            })
            .max_by_key(|r| (r.attr.minor, r.attr.lcid == request.lcid))
            .cloned()
    }

    fn evict(&self, key: &CacheKey) {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

fn cache_key(attr: &LibAttr) -> CacheKey {
    (attr.guid, attr.major, attr.minor, attr.lcid)
}

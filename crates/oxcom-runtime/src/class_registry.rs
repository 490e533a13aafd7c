//! Registry of creatable classes.
//!
//! Maps class identities and ProgIDs to their factories, the in-process
//! equivalent of the system class table.

use crate::error::{ComError, ComResult};
use crate::factory::ClassFactory;
use crate::guid::{Clsid, Guid};
use crate::object::ComPtr;
use std::collections::HashMap;
use tracing::{debug, info};

/// Summary of one registered class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSummary {
    pub clsid: Clsid,
    pub progid: Option<String>,
    pub name: String,
    pub aggregatable: bool,
}

struct ClassEntry {
    factory: Box<dyn ClassFactory>,
    progid: Option<String>,
}

/// Registered class factories by CLSID and ProgID.
#[derive(Default)]
pub struct ClassRegistry {
    classes: HashMap<Clsid, ClassEntry>,
    /// Lowercased ProgID to CLSID.
    progids: HashMap<String, Clsid>,
}

impl ClassRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory`, optionally under a ProgID.
    pub fn register(&mut self, progid: Option<&str>, factory: Box<dyn ClassFactory>) -> ComResult<()> {
        let clsid = factory.clsid();
        if self.classes.contains_key(&clsid) {
            return Err(ComError::InvalidArg(format!(
                "class {} is already registered",
                clsid
            )));
        }
        if let Some(progid) = progid {
            if progid.is_empty() {
                return Err(ComError::InvalidArg("empty ProgID".to_string()));
            }
            let key = progid.to_lowercase();
            if self.progids.contains_key(&key) {
                return Err(ComError::InvalidArg(format!(
                    "ProgID '{}' is already registered",
                    progid
                )));
            }
            self.progids.insert(key, clsid);
        }

        info!(
            "Registered class: {} {} ({})",
            factory.class_name(),
            clsid,
            progid.unwrap_or("no progid")
        );
        self.classes.insert(
            clsid,
            ClassEntry {
                factory,
                progid: progid.map(str::to_string),
            },
        );
        Ok(())
    }

    /// Remove a class. Existing instances are unaffected.
    pub fn revoke(&mut self, clsid: &Clsid) -> ComResult<()> {
        let entry = self
            .classes
            .remove(clsid)
            .ok_or_else(|| ComError::ClassNotRegistered(clsid.to_string()))?;
        if let Some(progid) = &entry.progid {
            self.progids.remove(&progid.to_lowercase());
        }
        debug!("Revoked class: {}", clsid);
        Ok(())
    }

    /// The CLSID registered under `progid`, ignoring case.
    pub fn clsid_from_progid(&self, progid: &str) -> ComResult<Clsid> {
        self.progids
            .get(&progid.to_lowercase())
            .copied()
            .ok_or_else(|| ComError::ClassNotRegistered(progid.to_string()))
    }

    /// The ProgID registered for `clsid`.
    pub fn progid_from_clsid(&self, clsid: &Clsid) -> Option<&str> {
        self.classes.get(clsid).and_then(|e| e.progid.as_deref())
    }

    /// The factory for `clsid`.
    pub fn factory(&self, clsid: &Clsid) -> ComResult<&dyn ClassFactory> {
        self.classes
            .get(clsid)
            .map(|e| e.factory.as_ref())
            .ok_or_else(|| ComError::ClassNotRegistered(clsid.to_string()))
    }

    /// Create an instance of `clsid` and query it for `iid`.
    pub fn create_instance(&self, clsid: &Clsid, outer: Option<&ComPtr>, iid: &Guid) -> ComResult<ComPtr> {
        self.factory(clsid)?.create_instance(outer, iid)
    }

    /// Create an instance of the class registered under `progid`.
    pub fn create_by_progid(&self, progid: &str, iid: &Guid) -> ComResult<ComPtr> {
        let clsid = self.clsid_from_progid(progid)?;
        self.create_instance(&clsid, None, iid)
    }

    /// Whether `clsid` is registered.
    pub fn contains(&self, clsid: &Clsid) -> bool {
        self.classes.contains_key(clsid)
    }

    /// Get the number of registered classes.
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// List registered classes, sorted by ProgID then CLSID.
    pub fn list_classes(&self) -> Vec<ClassSummary> {
        let mut classes: Vec<_> = self
            .classes
            .iter()
            .map(|(clsid, entry)| ClassSummary {
                clsid: *clsid,
                progid: entry.progid.clone(),
                name: entry.factory.class_name().to_string(),
                aggregatable: entry.factory.aggregatable(),
            })
            .collect();
        classes.sort_by(|a, b| (&a.progid, a.clsid).cmp(&(&b.progid, b.clsid)));
        classes
    }
}

//! Compiled type libraries.
//!
//! A [`TypeLib`] is built from a validated [`TypeLibManifest`]: records
//! get their layouts, interfaces become [`TypeInfo`] descriptors with
//! resolved record references, and class declarations get their interface
//! identities.

use crate::error::{ComError, ComResult};
use crate::guid::{Clsid, Guid};
use crate::manifest::TypeLibManifest;
use crate::record::RecordInfo;
use crate::typeinfo::{FuncDesc, ParamDesc, TypeDescriptor, TypeInfo};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Identity and version of a library.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibAttr {
    pub name: String,
    pub guid: Guid,
    pub major: u16,
    pub minor: u16,
    pub lcid: u32,
    pub description: Option<String>,
}

impl LibAttr {
    pub fn version(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

/// A creatable class described by a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoclassInfo {
    pub name: String,
    pub clsid: Clsid,
    pub progid: Option<String>,
    /// Implemented interfaces; the first is the default.
    pub interfaces: Vec<Guid>,
    pub aggregatable: bool,
}

impl CoclassInfo {
    pub fn default_interface(&self) -> Option<Guid> {
        self.interfaces.first().copied()
    }
}

/// A loaded type library.
#[derive(Debug)]
pub struct TypeLib {
    attr: LibAttr,
    records: Vec<Arc<RecordInfo>>,
    types: Vec<TypeDescriptor>,
    coclasses: Vec<CoclassInfo>,
}

impl TypeLib {
    /// Load a library from a manifest file.
    pub fn from_file(path: &Path) -> ComResult<Self> {
        let manifest = TypeLibManifest::from_file(path)?;
        Self::compile(&manifest)
    }

    /// Load a library from manifest text.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ComResult<Self> {
        let manifest = TypeLibManifest::from_str(content)?;
        Self::compile(&manifest)
    }

    /// Build a library from a validated manifest.
    pub fn compile(manifest: &TypeLibManifest) -> ComResult<Self> {
        let (major, minor) = manifest.version()?;
        let attr = LibAttr {
            name: manifest.library.name.clone(),
            guid: manifest.library.guid,
            major,
            minor,
            lcid: manifest.library.lcid,
            description: manifest.library.description.clone(),
        };

        let records = compile_records(manifest)?;
        let by_name: HashMap<&str, &Arc<RecordInfo>> =
            records.iter().map(|r| (r.name(), r)).collect();

        let mut types = Vec::with_capacity(manifest.interfaces.len());
        for interface in &manifest.interfaces {
            let funcs = interface
                .methods
                .iter()
                .enumerate()
                .map(|(slot, method)| FuncDesc {
                    name: method.name.clone(),
                    dispid: method.dispid,
                    kind: method.kind,
                    params: method
                        .params
                        .iter()
                        .map(|param| ParamDesc {
                            name: param.name.clone(),
                            ty: param.ty.clone(),
                            flags: param.flags.clone(),
                            record: param
                                .ty
                                .record_name()
                                .and_then(|name| by_name.get(name))
                                .map(|info| Arc::clone(info)),
                        })
                        .collect(),
                    slot,
                })
                .collect();
            types.push(Arc::new(TypeInfo {
                name: interface.name.clone(),
                guid: interface.guid,
                dispinterface: interface.dispinterface,
                kind: interface.kind,
                funcs,
            }));
        }

        let coclasses = manifest
            .coclasses
            .iter()
            .map(|coclass| {
                let interfaces = coclass
                    .interfaces
                    .iter()
                    .filter_map(|name| types.iter().find(|t| t.name == *name))
                    .map(|t| t.guid)
                    .collect();
                CoclassInfo {
                    name: coclass.name.clone(),
                    clsid: coclass.clsid,
                    progid: coclass.progid.clone(),
                    interfaces,
                    aggregatable: coclass.aggregatable,
                }
            })
            .collect();

        debug!(
            library = %attr.name,
            version = %attr.version(),
            records = records.len(),
            interfaces = types.len(),
            "Compiled type library"
        );

        Ok(Self {
            attr,
            records,
            types,
            coclasses,
        })
    }

    pub fn attr(&self) -> &LibAttr {
        &self.attr
    }

    /// Number of interface descriptors.
    pub fn type_info_count(&self) -> usize {
        self.types.len()
    }

    /// The interface descriptor at `index`.
    pub fn type_info(&self, index: usize) -> ComResult<TypeDescriptor> {
        self.types
            .get(index)
            .cloned()
            .ok_or(ComError::BadIndex(index as u32))
    }

    /// The descriptor of interface (or dispinterface) `guid`.
    pub fn type_info_of_guid(&self, guid: &Guid) -> ComResult<TypeDescriptor> {
        self.types
            .iter()
            .find(|t| t.describes(guid))
            .cloned()
            .ok_or_else(|| {
                ComError::ElementNotFound(format!("{} in library {}", guid, self.attr.name))
            })
    }

    /// The record called `name`.
    pub fn record_info(&self, name: &str) -> ComResult<Arc<RecordInfo>> {
        self.records
            .iter()
            .find(|r| r.name() == name)
            .cloned()
            .ok_or_else(|| {
                ComError::ElementNotFound(format!("record {} in library {}", name, self.attr.name))
            })
    }

    /// The record with identity `guid`.
    pub fn record_info_of_guid(&self, guid: &Guid) -> ComResult<Arc<RecordInfo>> {
        self.records
            .iter()
            .find(|r| r.guid() == *guid)
            .cloned()
            .ok_or_else(|| {
                ComError::ElementNotFound(format!("record {} in library {}", guid, self.attr.name))
            })
    }

    pub fn records(&self) -> &[Arc<RecordInfo>] {
        &self.records
    }

    pub fn coclasses(&self) -> &[CoclassInfo] {
        &self.coclasses
    }

    /// The class registered under `progid`, ignoring case.
    pub fn coclass_by_progid(&self, progid: &str) -> Option<&CoclassInfo> {
        self.coclasses.iter().find(|c| {
            c.progid
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(progid))
        })
    }
}

/// Lay out records so that nested records are built before their users.
fn compile_records(manifest: &TypeLibManifest) -> ComResult<Vec<Arc<RecordInfo>>> {
    let mut built: HashMap<String, Arc<RecordInfo>> = HashMap::new();
    let mut pending: Vec<_> = manifest.records.iter().collect();

    while !pending.is_empty() {
        let before = pending.len();
        let mut still_pending = Vec::new();
        for record in pending {
            let ready = record
                .fields
                .iter()
                .filter_map(|f| f.ty.record_name())
                .all(|name| built.contains_key(name));
            if !ready {
                still_pending.push(record);
                continue;
            }
            let fields: Vec<_> = record
                .fields
                .iter()
                .map(|f| (f.name.clone(), f.ty.clone()))
                .collect();
            let info = RecordInfo::new(&record.name, record.guid, &fields, |name| {
                built.get(name).cloned()
            })?;
            built.insert(record.name.clone(), Arc::new(info));
        }
        if still_pending.len() == before {
            let names: Vec<_> = still_pending.iter().map(|r| r.name.as_str()).collect();
            return Err(ComError::CantLoadLibrary(format!(
                "records contain each other: {}",
                names.join(", ")
            )));
        }
        pending = still_pending;
    }

    // Keep declaration order.
    Ok(manifest
        .records
        .iter()
        .filter_map(|r| built.get(&r.name).cloned())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typespec::TypeSpec;

    const LIBRARY: &str = r#"
[library]
name = "Shapes"
guid = "{1C0B5E70-7A0C-4D4F-8C8E-6A1D2D2B9F01}"
version = "2.1"

[[records]]
name = "Segment"
guid = "{1C0B5E70-7A0C-4D4F-8C8E-6A1D2D2B9F03}"
fields = [{ name = "from", type = "record:Point" }, { name = "to", type = "record:Point" }]

[[records]]
name = "Point"
guid = "{1C0B5E70-7A0C-4D4F-8C8E-6A1D2D2B9F02}"
fields = [{ name = "x", type = "r8" }, { name = "y", type = "r8" }]

[[interfaces]]
name = "IShapes"
guid = "{1C0B5E70-7A0C-4D4F-8C8E-6A1D2D2B9F04}"
dispinterface = "{1C0B5E70-7A0C-4D4F-8C8E-6A1D2D2B9F05}"

[[interfaces.methods]]
name = "Length"
dispid = 1
params = [
    { name = "segment", type = "record:Segment" },
    { name = "length", type = "r8", flags = ["out", "retval"] },
]

[[interfaces.methods]]
name = "Points"
dispid = 2
params = [{ name = "points", type = "array:record:Point", flags = ["in", "out"] }]

[[coclasses]]
name = "Shapes"
clsid = "{1C0B5E70-7A0C-4D4F-8C8E-6A1D2D2B9F06}"
progid = "Test.Shapes"
interfaces = ["IShapes"]
aggregatable = true
"#;

    #[test]
    fn test_compile_library() {
        let lib = TypeLib::from_str(LIBRARY).unwrap();
        assert_eq!(lib.attr().version(), "2.1");
        assert_eq!(lib.type_info_count(), 1);
        assert_eq!(lib.records().len(), 2);
        assert_eq!(lib.records()[0].name(), "Segment");
    }

    #[test]
    fn test_nested_records_are_laid_out() {
        let lib = TypeLib::from_str(LIBRARY).unwrap();
        let point = lib.record_info("Point").unwrap();
        let segment = lib.record_info("Segment").unwrap();
        assert_eq!(point.size(), 16);
        assert_eq!(segment.size(), 32);
        assert_eq!(segment.fields()[1].offset, 16);
        assert_eq!(
            lib.record_info_of_guid(&point.guid()).unwrap().name(),
            "Point"
        );
    }

    #[test]
    fn test_type_info_by_interface_or_dispinterface() {
        let lib = TypeLib::from_str(LIBRARY).unwrap();
        let iid = Guid::parse("1C0B5E70-7A0C-4D4F-8C8E-6A1D2D2B9F04").unwrap();
        let diid = Guid::parse("1C0B5E70-7A0C-4D4F-8C8E-6A1D2D2B9F05").unwrap();
        let info = lib.type_info_of_guid(&iid).unwrap();
        assert!(Arc::ptr_eq(&info, &lib.type_info_of_guid(&diid).unwrap()));

        let length = &info.funcs[0];
        assert_eq!(length.slot, 0);
        assert_eq!(length.params[0].record.as_ref().unwrap().name(), "Segment");
        assert!(length.params[1].is_retval());

        let points = &info.funcs[1];
        assert_eq!(points.params[0].ty, TypeSpec::parse("array:record:Point").unwrap());
        assert_eq!(points.params[0].record.as_ref().unwrap().name(), "Point");
    }

    #[test]
    fn test_missing_elements() {
        let lib = TypeLib::from_str(LIBRARY).unwrap();
        let err = lib.type_info_of_guid(&Guid::generate()).unwrap_err();
        assert!(err.is_descriptor_unavailable());
        assert!(lib.record_info("Circle").is_err());
        assert!(matches!(lib.type_info(1), Err(ComError::BadIndex(1))));
    }

    #[test]
    fn test_coclasses() {
        let lib = TypeLib::from_str(LIBRARY).unwrap();
        let coclass = lib.coclass_by_progid("test.shapes").unwrap();
        assert!(coclass.aggregatable);
        assert_eq!(
            coclass.default_interface(),
            Guid::parse("1C0B5E70-7A0C-4D4F-8C8E-6A1D2D2B9F04")
        );
    }

    #[test]
    fn test_record_cycle_rejected() {
        let text = LIBRARY.replace(
            r#"fields = [{ name = "x", type = "r8" }, { name = "y", type = "r8" }]"#,
            r#"fields = [{ name = "x", type = "record:Segment" }]"#,
        );
        let err = TypeLib::from_str(&text).unwrap_err();
        assert!(matches!(err, ComError::CantLoadLibrary(_)));
    }
}

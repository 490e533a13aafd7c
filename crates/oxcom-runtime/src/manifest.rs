//! Type library manifest parsing.
//!
//! A type library is a TOML file declaring the records, interfaces and
//! classes of one component library:
//!
//! ```toml
//! [library]
//! name = "Example"
//! guid = "{07D2AEE5-1DF8-4D2C-953A-554ADFD25F99}"
//! version = "1.0"
//!
//! [[records]]
//! name = "Point"
//! guid = "{...}"
//! fields = [{ name = "x", type = "i4" }, { name = "y", type = "i4" }]
//!
//! [[interfaces]]
//! name = "IExample"
//! guid = "{...}"
//! dispinterface = "{...}"
//!
//! [[interfaces.methods]]
//! name = "Move"
//! dispid = 1
//! params = [{ name = "point", type = "record:Point", flags = ["in", "out"] }]
//!
//! [[coclasses]]
//! name = "Example"
//! clsid = "{...}"
//! progid = "Example.Example"
//! interfaces = ["IExample"]
//! ```

use crate::dispatch::{DispId, InvokeKind};
use crate::error::{ComError, ComResult};
use crate::guid::Guid;
use crate::typespec::TypeSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Type library manifest structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeLibManifest {
    /// Library metadata.
    pub library: LibraryMetadata,

    /// Record declarations.
    #[serde(default)]
    pub records: Vec<RecordDecl>,

    /// Interface declarations.
    #[serde(default)]
    pub interfaces: Vec<InterfaceDecl>,

    /// Class declarations.
    #[serde(default)]
    pub coclasses: Vec<CoclassDecl>,
}

/// Library metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryMetadata {
    /// Library name.
    pub name: String,

    /// Library identity.
    pub guid: Guid,

    /// Version as `major.minor`.
    #[serde(default = "default_version")]
    pub version: String,

    /// Locale of the library; 0 is locale-neutral.
    #[serde(default)]
    pub lcid: u32,

    /// Library description.
    #[serde(default)]
    pub description: Option<String>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// A record type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDecl {
    pub name: String,
    pub guid: Guid,
    pub fields: Vec<FieldDecl>,
}

/// One record field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeSpec,
}

/// How an interface can be called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    /// Callable directly and through dynamic invocation.
    #[default]
    Dual,
    /// Callable only through dynamic invocation.
    Dispatch,
    /// Callable only directly.
    Custom,
}

/// An interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceDecl {
    pub name: String,
    pub guid: Guid,

    /// Identity of the matching dispinterface, if one is published.
    #[serde(default)]
    pub dispinterface: Option<Guid>,

    #[serde(default)]
    pub kind: InterfaceKind,

    #[serde(default)]
    pub methods: Vec<MethodDecl>,
}

/// A method or property accessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub dispid: DispId,

    #[serde(default)]
    pub kind: InvokeKind,

    #[serde(default)]
    pub params: Vec<ParamDecl>,
}

/// Parameter direction and binding flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamFlag {
    In,
    Out,
    Retval,
    Optional,
}

/// A parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeSpec,

    /// Defaults to `["in"]`.
    #[serde(default = "default_flags")]
    pub flags: Vec<ParamFlag>,
}

fn default_flags() -> Vec<ParamFlag> {
    vec![ParamFlag::In]
}

impl ParamDecl {
    pub fn has(&self, flag: ParamFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// A creatable class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoclassDecl {
    pub name: String,
    pub clsid: Guid,

    #[serde(default)]
    pub progid: Option<String>,

    /// Names of implemented interfaces; the first is the default one.
    #[serde(default)]
    pub interfaces: Vec<String>,

    #[serde(default)]
    pub aggregatable: bool,
}

impl TypeLibManifest {
    /// Load a manifest from a TOML file.
    pub fn from_file(path: &Path) -> ComResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a manifest from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ComResult<Self> {
        let manifest: TypeLibManifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// The `(major, minor)` version.
    pub fn version(&self) -> ComResult<(u16, u16)> {
        parse_version(&self.library.version).ok_or_else(|| {
            invalid(format!(
                "library version '{}' is not major.minor",
                self.library.version
            ))
        })
    }

    /// Validate the manifest.
    fn validate(&self) -> ComResult<()> {
        if self.library.name.is_empty() {
            return Err(invalid("library name cannot be empty"));
        }
        self.version()?;

        let mut record_names = HashSet::new();
        for record in &self.records {
            if record.name.is_empty() {
                return Err(invalid("record name cannot be empty"));
            }
            if !record_names.insert(record.name.as_str()) {
                return Err(invalid(format!("duplicate record '{}'", record.name)));
            }
        }
        for record in &self.records {
            let mut fields = HashSet::new();
            for field in &record.fields {
                if field.name.is_empty() || !fields.insert(field.name.as_str()) {
                    return Err(invalid(format!(
                        "record '{}' has an empty or duplicate field name",
                        record.name
                    )));
                }
                check_record_ref(&field.ty, &record_names, &record.name)?;
            }
        }

        let mut interface_names = HashSet::new();
        for interface in &self.interfaces {
            if interface.name.is_empty() {
                return Err(invalid("interface name cannot be empty"));
            }
            if !interface_names.insert(interface.name.as_str()) {
                return Err(invalid(format!("duplicate interface '{}'", interface.name)));
            }
            self.validate_methods(interface, &record_names)?;
        }

        for coclass in &self.coclasses {
            if coclass.name.is_empty() {
                return Err(invalid("coclass name cannot be empty"));
            }
            if coclass.progid.as_deref() == Some("") {
                return Err(invalid(format!("coclass '{}' has an empty progid", coclass.name)));
            }
            if let Some(missing) = coclass
                .interfaces
                .iter()
                .find(|name| !interface_names.contains(name.as_str()))
            {
                return Err(invalid(format!(
                    "coclass '{}' implements unknown interface '{}'",
                    coclass.name, missing
                )));
            }
        }

        Ok(())
    }

    fn validate_methods(&self, interface: &InterfaceDecl, records: &HashSet<&str>) -> ComResult<()> {
        let mut dispids = HashSet::new();
        let mut names = HashSet::new();

        for method in &interface.methods {
            let context = format!("{}::{}", interface.name, method.name);
            if method.name.is_empty() {
                return Err(invalid(format!("{} has a method with no name", interface.name)));
            }
            if !dispids.insert((method.dispid, method.kind)) {
                return Err(invalid(format!("{} reuses dispid {}", context, method.dispid)));
            }
            if !names.insert((method.name.to_lowercase(), method.kind)) {
                return Err(invalid(format!("{} is declared twice", context)));
            }

            let last = method.params.len().saturating_sub(1);
            for (index, param) in method.params.iter().enumerate() {
                check_record_ref(&param.ty, records, &context)?;
                if param.has(ParamFlag::Retval) && (index != last || !param.has(ParamFlag::Out)) {
                    return Err(invalid(format!(
                        "{}: retval parameter '{}' must be the last one and marked out",
                        context, param.name
                    )));
                }
                if !param.has(ParamFlag::In) && !param.has(ParamFlag::Out) {
                    return Err(invalid(format!(
                        "{}: parameter '{}' is neither in nor out",
                        context, param.name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn check_record_ref(ty: &TypeSpec, records: &HashSet<&str>, context: &str) -> ComResult<()> {
    match ty.record_name() {
        Some(name) if !records.contains(name) => Err(invalid(format!(
            "{} refers to unknown record '{}'",
            context, name
        ))),
        _ => Ok(()),
    }
}

/// Parse `major.minor`.
pub fn parse_version(text: &str) -> Option<(u16, u16)> {
    let (major, minor) = text.trim().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

fn invalid(message: impl Into<String>) -> ComError {
    ComError::CantLoadLibrary(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[library]
name = "Sample"
guid = "{9A3F0D2E-5B51-4B44-9C35-2B6A0F3C7E11}"
version = "1.2"
description = "Sample library"

[[records]]
name = "Pair"
guid = "{9A3F0D2E-5B51-4B44-9C35-2B6A0F3C7E12}"
fields = [{ name = "left", type = "i4" }, { name = "right", type = "bstr" }]

[[interfaces]]
name = "ISample"
guid = "{9A3F0D2E-5B51-4B44-9C35-2B6A0F3C7E13}"

[[interfaces.methods]]
name = "Swap"
dispid = 1
params = [
    { name = "pair", type = "record:Pair", flags = ["in", "out"] },
    { name = "result", type = "bool", flags = ["out", "retval"] },
]

[[coclasses]]
name = "Sample"
clsid = "{9A3F0D2E-5B51-4B44-9C35-2B6A0F3C7E14}"
progid = "Sample.Sample"
interfaces = ["ISample"]
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = TypeLibManifest::from_str(MANIFEST).unwrap();
        assert_eq!(manifest.library.name, "Sample");
        assert_eq!(manifest.version().unwrap(), (1, 2));
        assert_eq!(manifest.records[0].fields[1].ty, TypeSpec::Bstr);

        let method = &manifest.interfaces[0].methods[0];
        assert_eq!(method.kind, InvokeKind::Method);
        assert!(method.params[1].has(ParamFlag::Retval));
        assert_eq!(manifest.interfaces[0].kind, InterfaceKind::Dual);
        assert!(!manifest.coclasses[0].aggregatable);
    }

    #[test]
    fn test_unknown_record_rejected() {
        let text = MANIFEST.replace("record:Pair", "record:Missing");
        let err = TypeLibManifest::from_str(&text).unwrap_err();
        assert!(err.to_string().contains("Missing"));
    }

    #[test]
    fn test_retval_must_be_last() {
        let text = MANIFEST.replace(
            r#"{ name = "pair", type = "record:Pair", flags = ["in", "out"] },"#,
            "",
        );
        let text = text.replace(
            r#"{ name = "result", type = "bool", flags = ["out", "retval"] },"#,
            r#"{ name = "result", type = "bool", flags = ["out", "retval"] }, { name = "x", type = "i4" },"#,
        );
        assert!(TypeLibManifest::from_str(&text).is_err());
    }

    #[test]
    fn test_bad_version_and_names() {
        let text = MANIFEST.replace("version = \"1.2\"", "version = \"one\"");
        assert!(TypeLibManifest::from_str(&text).is_err());

        let text = MANIFEST.replace("interfaces = [\"ISample\"]", "interfaces = [\"INope\"]");
        assert!(TypeLibManifest::from_str(&text).is_err());
    }

    #[test]
    fn test_bad_type_string() {
        let text = MANIFEST.replace("type = \"i4\"", "type = \"int\"");
        assert!(matches!(
            TypeLibManifest::from_str(&text),
            Err(ComError::Toml(_))
        ));
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("1.0"), Some((1, 0)));
        assert_eq!(parse_version("2"), None);
    }
}

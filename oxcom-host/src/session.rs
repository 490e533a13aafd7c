//! # Host session
//!
//! Owns the type library registry and the class registry for one
//! apartment, and performs late-bound calls on their behalf.
//!
//! A session is built from a [`Config`]: the embedded libraries are
//! registered first, then the configured search paths, then whatever
//! discovery finds in the standard locations. Classes disabled in the
//! configuration are revoked after registration.

use crate::config::Config;
use crate::convert::{json_to_variant, variant_to_json};
use anyhow::{anyhow, bail, Context, Result};
use oxcom_runtime::discovery::discover_in_directories;
use oxcom_runtime::{
    discover_typelibs, get_error_info, register_discovered, Arg, ClassRegistry, DispParams,
    Dispatch, TypeLibRegistry, Variant, IID_IDISPATCH, IID_NULL, LOCALE_USER_DEFAULT,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A registered type library, as listed by the host.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LibraryEntry {
    pub name: String,
    pub guid: String,
    pub version: String,
    pub source: String,
}

/// A registered class, as listed by the host.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClassEntry {
    pub name: String,
    pub clsid: String,
    pub progid: Option<String>,
    pub aggregatable: bool,
}

/// Everything the host can reach.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Listing {
    pub typelibs: Vec<LibraryEntry>,
    pub classes: Vec<ClassEntry>,
}

/// Outcome of a late-bound call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CallOutcome {
    /// Member name as declared.
    pub member: String,
    /// The retval, or null.
    pub result: Value,
    /// Out parameter values by parameter name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub out: BTreeMap<String, Value>,
}

/// Result of one self-test check.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
}

/// One self-test check.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SelfTestCheck {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

/// Type libraries and classes for late-bound calls.
pub struct HostSession {
    typelibs: Arc<TypeLibRegistry>,
    classes: ClassRegistry,
}

impl HostSession {
    /// Build a session as described by `config`.
    pub fn new(config: &Config) -> Result<Self> {
        let typelibs = Arc::new(TypeLibRegistry::new());

        if config.typelibs.include_builtin {
            oxcom_testsrv::register_typelibs(&typelibs)
                .context("Failed to register built-in type libraries")?;
        }

        if !config.typelibs.search_paths.is_empty() {
            let found = discover_in_directories(&config.typelibs.search_paths)
                .context("Failed to scan type library search paths")?;
            let count = register_discovered(&typelibs, &found);
            info!("Registered {} type library(ies) from search paths", count);
        }

        if config.typelibs.discover {
            match discover_typelibs() {
                Ok(found) => {
                    let count = register_discovered(&typelibs, &found);
                    info!("Registered {} discovered type library(ies)", count);
                }
                Err(e) => warn!("Type library discovery: {}", e),
            }
        }

        let mut classes = ClassRegistry::new();
        oxcom_testsrv::register_classes(&mut classes, &typelibs)
            .context("Failed to register classes")?;

        for class in classes.list_classes() {
            let Some(progid) = class.progid.as_deref() else {
                continue;
            };
            if !config.class_enabled(progid) {
                classes.revoke(&class.clsid)?;
                info!("Class {} disabled by configuration", progid);
            }
        }

        Ok(Self { typelibs, classes })
    }

    pub fn typelibs(&self) -> &Arc<TypeLibRegistry> {
        &self.typelibs
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// Registered libraries and classes.
    pub fn list(&self) -> Listing {
        let mut typelibs: Vec<LibraryEntry> = self
            .typelibs
            .registrations()
            .into_iter()
            .map(|r| LibraryEntry {
                name: r.attr.name.clone(),
                guid: r.attr.guid.to_string(),
                version: r.attr.version(),
                source: r.source.to_string(),
            })
            .collect();
        typelibs.sort_by(|a, b| a.name.cmp(&b.name).then(a.version.cmp(&b.version)));

        let classes = self
            .classes
            .list_classes()
            .into_iter()
            .map(|c| ClassEntry {
                name: c.name,
                clsid: c.clsid.to_string(),
                progid: c.progid,
                aggregatable: c.aggregatable,
            })
            .collect();

        Listing { typelibs, classes }
    }

    /// Create the class registered as `progid` and call `method` on it by
    /// name.
    ///
    /// Arguments are converted using the member's declared parameter
    /// types. Out parameters the caller leaves off still get a slot, so
    /// their values can be reported.
    pub fn call(&self, progid: &str, method: &str, args: &[Value]) -> Result<CallOutcome> {
        let object = self
            .classes
            .create_by_progid(progid, &IID_IDISPATCH)
            .with_context(|| format!("Failed to create {}", progid))?;
        let dispatch = object.get::<dyn Dispatch>()?;

        let descriptor = dispatch
            .type_info(0, LOCALE_USER_DEFAULT)
            .with_context(|| format!("No type information for {}", progid))?;
        let func = descriptor.func_by_name(method)?.clone();
        let params: Vec<_> = func.caller_params().collect();
        if args.len() > params.len() {
            bail!(
                "{}.{} takes at most {} argument(s), got {}",
                progid,
                func.name,
                params.len(),
                args.len()
            );
        }

        let mut slots = Vec::with_capacity(params.len());
        for (index, param) in params.iter().enumerate() {
            match args.get(index) {
                Some(value) => slots.push(
                    json_to_variant(value, &param.ty, param.record.as_ref())
                        .with_context(|| format!("argument {} ({})", index, param.name))?,
                ),
                None if param.is_out() => slots.push(Variant::Empty),
                None => break,
            }
        }
        debug!(progid, member = %func.name, args = slots.len(), "Calling by name");

        let mut dispparams = DispParams::new(slots.iter_mut().map(Arg::Ref).collect());
        let result = dispatch.invoke(
            func.dispid,
            &IID_NULL,
            LOCALE_USER_DEFAULT,
            func.kind,
            &mut dispparams,
        );
        drop(dispparams);

        let result = match result {
            Ok(value) => value,
            Err(err) => {
                let description = get_error_info()
                    .map(|info| format!("{}: {}", info.source, info.description))
                    .unwrap_or_else(|| err.to_string());
                return Err(anyhow!(err).context(format!(
                    "{}.{} failed ({})",
                    progid, func.name, description
                )));
            }
        };

        let mut out = BTreeMap::new();
        for (param, slot) in params.iter().zip(&slots) {
            if param.is_out() {
                out.insert(param.name.clone(), variant_to_json(slot)?);
            }
        }

        Ok(CallOutcome {
            member: func.name.clone(),
            result: variant_to_json(&result)?,
            out,
        })
    }

    /// Run the record, array and device enumeration round trips by name.
    pub fn selftest(&self) -> Vec<SelfTestCheck> {
        vec![
            self.check(
                "record round trip",
                oxcom_testsrv::ids::RECORD_PARAM_TEST_PROGID,
                |session, progid| {
                    let blank = json!({"question": "", "answer": 0, "needs_clarification": false});
                    let init = session.call(progid, "InitRecord", &[blank])?;
                    let record = init
                        .out
                        .get("test_record")
                        .cloned()
                        .ok_or_else(|| anyhow!("InitRecord returned no record"))?;
                    let verified = session.call(progid, "VerifyRecord", &[record.clone()])?;
                    expect_true(&verified, format!("record {}", record))
                },
            ),
            self.check(
                "array round trip",
                oxcom_testsrv::ids::SAFEARRAY_PARAM_TEST_PROGID,
                |session, progid| {
                    let init = session.call(progid, "InitArray", &[json!([9, 9, 9, 9, 9])])?;
                    let array = init
                        .out
                        .get("test_array")
                        .cloned()
                        .ok_or_else(|| anyhow!("InitArray returned no array"))?;
                    let verified = session.call(progid, "VerifyArray", &[array.clone()])?;
                    expect_true(&verified, format!("array {}", array))
                },
            ),
            self.check(
                "device enumeration",
                oxcom_testsrv::ids::DEVICE_ENUMERATOR_PROGID,
                |session, progid| {
                    let found = session.call(progid, "FindAllAvmc", &[])?;
                    let devices = found
                        .result
                        .as_array()
                        .ok_or_else(|| anyhow!("FindAllAvmc returned {}", found.result))?;
                    let serials: Vec<_> = devices
                        .iter()
                        .filter_map(|d| d.get("SerialNumber").and_then(Value::as_str))
                        .collect();
                    if serials == ["1234", "5678"] {
                        Ok(format!("{} devices", devices.len()))
                    } else {
                        bail!("unexpected devices {}", found.result)
                    }
                },
            ),
        ]
    }

    fn check<F>(&self, name: &str, progid: &str, run: F) -> SelfTestCheck
    where
        F: FnOnce(&Self, &str) -> Result<String>,
    {
        let (status, detail) = if self.classes.clsid_from_progid(progid).is_err() {
            (CheckStatus::Skipped, format!("{} is not registered", progid))
        } else {
            match run(self, progid) {
                Ok(detail) => (CheckStatus::Passed, detail),
                Err(e) => (CheckStatus::Failed, format!("{:#}", e)),
            }
        };
        info!(check = name, ?status, "{}", detail);
        SelfTestCheck {
            name: name.to_string(),
            status,
            detail,
        }
    }
}

fn expect_true(outcome: &CallOutcome, subject: String) -> Result<String> {
    if outcome.result == Value::Bool(true) {
        Ok(format!("{} verified", subject))
    } else {
        bail!("{} returned {} for {}", outcome.member, outcome.result, subject)
    }
}

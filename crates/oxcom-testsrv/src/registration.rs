//! Registration of the embedded type libraries and the test classes.

use crate::device_enum::AvmcObject;
use crate::ids::{
    CLSID_AVMC, CLSID_RECORD_PARAM_TEST, CLSID_SAFEARRAY_PARAM_TEST, DEVICE_ENUMERATOR_PROGID,
    RECORD_PARAM_TEST_PROGID, SAFEARRAY_PARAM_TEST_PROGID,
};
use crate::record_param::RecordParamTestObject;
use crate::safearray_param::SafearrayParamTestObject;
use oxcom_runtime::{ClassRegistry, ComResult, Component, ComponentFactory, TypeLibRegistry};
use std::rc::Rc;
use std::sync::Arc;
use tracing::info;

/// Manifest of the parameter passing library.
pub const TESTSRV_TYPELIB: &str = include_str!("../typelib/oxcom_testsrv.toml");

/// Manifest of the device enumeration library.
pub const AVMC_TYPELIB: &str = include_str!("../typelib/avmc.toml");

/// Register the embedded type libraries with `registry`.
pub fn register_typelibs(registry: &TypeLibRegistry) -> ComResult<()> {
    for source in [TESTSRV_TYPELIB, AVMC_TYPELIB] {
        let attr = registry.register_source(source)?;
        info!("Registered built-in type library: {} v{}", attr.name, attr.version());
    }
    Ok(())
}

/// Register the test classes with `classes`.
///
/// Instances resolve their type descriptors through `typelibs` the first
/// time they are invoked by name.
pub fn register_classes(classes: &mut ClassRegistry, typelibs: &Arc<TypeLibRegistry>) -> ComResult<()> {
    let registry = Arc::clone(typelibs);
    classes.register(
        Some(RECORD_PARAM_TEST_PROGID),
        Box::new(ComponentFactory::new(
            CLSID_RECORD_PARAM_TEST,
            "RecordParamTest",
            move || {
                let object = RecordParamTestObject::new(Arc::clone(&registry));
                Ok(Rc::new(object) as Rc<dyn Component>)
            },
        )),
    )?;

    let registry = Arc::clone(typelibs);
    classes.register(
        Some(SAFEARRAY_PARAM_TEST_PROGID),
        Box::new(ComponentFactory::new(
            CLSID_SAFEARRAY_PARAM_TEST,
            "SafearrayParamTest",
            move || {
                let object = SafearrayParamTestObject::new(Arc::clone(&registry));
                Ok(Rc::new(object) as Rc<dyn Component>)
            },
        )),
    )?;

    let registry = Arc::clone(typelibs);
    classes.register(
        Some(DEVICE_ENUMERATOR_PROGID),
        Box::new(
            ComponentFactory::new(CLSID_AVMC, "Avmc", move || {
                let object = AvmcObject::new(Arc::clone(&registry));
                Ok(Rc::new(object) as Rc<dyn Component>)
            })
            .aggregatable(true),
        ),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{AVMC_LIBRARY, IID_IDUAL_RECORD_PARAM_TEST, TESTSRV_LIBRARY};

    #[test]
    fn test_embedded_libraries_load() {
        let registry = TypeLibRegistry::new();
        register_typelibs(&registry).unwrap();

        let testsrv = registry.load(&TESTSRV_LIBRARY).unwrap();
        assert_eq!(testsrv.attr().name, "OxcomTestSrvLib");
        assert!(testsrv.type_info_of_guid(&IID_IDUAL_RECORD_PARAM_TEST).is_ok());
        assert!(testsrv.record_info("StructRecordParamTest").is_ok());

        let avmc = registry.load(&AVMC_LIBRARY).unwrap();
        assert_eq!(avmc.coclasses()[0].clsid, CLSID_AVMC);
    }

    #[test]
    fn test_embedded_classes_match_registration() {
        let registry = TypeLibRegistry::new();
        register_typelibs(&registry).unwrap();
        let testsrv = registry.load(&TESTSRV_LIBRARY).unwrap();

        let record = testsrv.coclass_by_progid(RECORD_PARAM_TEST_PROGID).unwrap();
        assert_eq!(record.clsid, CLSID_RECORD_PARAM_TEST);
        assert!(!record.aggregatable);
        let array = testsrv.coclass_by_progid(SAFEARRAY_PARAM_TEST_PROGID).unwrap();
        assert_eq!(array.clsid, CLSID_SAFEARRAY_PARAM_TEST);
    }

    #[test]
    fn test_register_classes() {
        let typelibs = Arc::new(TypeLibRegistry::new());
        let mut classes = ClassRegistry::new();
        register_classes(&mut classes, &typelibs).unwrap();

        assert_eq!(classes.class_count(), 3);
        assert_eq!(
            classes.clsid_from_progid(DEVICE_ENUMERATOR_PROGID).unwrap(),
            CLSID_AVMC
        );
        let summary: Vec<_> = classes.list_classes().into_iter().map(|c| c.aggregatable).collect();
        assert_eq!(summary, vec![true, false, false]);

        // A second registration of the same classes is refused.
        assert!(register_classes(&mut classes, &typelibs).is_err());
    }
}

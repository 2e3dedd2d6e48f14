//! End-to-end load passes over a base package and an add-on that extends it

use std::sync::Arc;

use defkit_core::definition::{keys, INSTANCE_KIND};
use defkit_core::{
    impl_target, InstanceDefinition, LoadError, MemoryStore, NoopListener, Package, PackageDependency, Reference,
    Registry, Severity, Value, Version,
};
use serde_json::json;

#[derive(Debug, Default, Clone, PartialEq)]
struct Unit {
    definition: Option<String>,
    x: i64,
    perks: Vec<String>,
    mount: Option<Reference>,
}

impl_target!(Unit as "Unit" {
    definition => "Definition",
    x => "X",
    perks => "Perks",
    mount => "Mount",
});

fn base_package() -> Package {
    let mut package = Package::new("base", "Base", "defkit");
    package.own_version = Version::new(1, 0, 0);
    package.compatible_version = Version::new(1, 0, 0);
    package
}

fn addon_package() -> Package {
    let mut package = Package::new("addon", "Addon", "someone");
    package.compatible_version = Version::new(1, 0, 0);
    package
        .dependencies
        .push(PackageDependency::new("Base", "defkit", Version::new(1, 0, 0)));
    package
}

/// Add-on listed first so ordering has to come from the graph
fn store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.add_package(addon_package()).add_documents(
        "addon",
        "defs",
        [
            json!({"$type": INSTANCE_KIND, "Name": "Hero", "Base": "BaseHero"}),
            json!({"$type": INSTANCE_KIND, "Name": "Knight", "Base": "BaseHero", "Properties": {"X": 2, "Mount": "Horse"}}),
        ],
    );
    store.add_package(base_package()).add_documents(
        "base",
        "defs",
        [
            json!({
                "$type": INSTANCE_KIND,
                "Name": "BaseHero",
                "Abstract": true,
                "TargetType": "Unit",
                "Properties": {"X": 1, "Perks": ["brave"]}
            }),
            json!({"$type": INSTANCE_KIND, "Name": "Horse", "TargetType": "Unit"}),
        ],
    );
    store
}

fn registry() -> Registry {
    let mut registry = Registry::new(Version::new(1, 0, 0));
    registry.register_target::<Unit>();
    registry
}

#[test]
fn test_addon_inherits_from_base_regardless_of_package_order() {
    let mut registry = registry();
    let report = registry.load(&store(), &[], &["defs"], &NoopListener).unwrap();

    assert_eq!(report.packages, vec!["addon", "base"]);
    assert_eq!(report.pruned, vec!["BaseHero"]);
    assert!(registry.get("BaseHero").is_none());

    let hero = registry.get_as::<InstanceDefinition>("Hero").unwrap();
    assert_eq!(hero.target_type.as_deref(), Some("Unit"));
    assert_eq!(hero.properties.get("X"), Some(&Value::Int(1)));
    assert_eq!(registry.get("Hero").unwrap().owner(), Some("addon"));

    assert_eq!(registry.package("addon").unwrap().definitions, vec!["Hero", "Knight"]);
    assert_eq!(registry.package("base").unwrap().definitions, vec!["Horse"]);
    assert!(registry.catalog().is_consistent());
}

#[test]
fn test_explicit_properties_replace_inherited_ones() {
    let mut registry = registry();
    registry.load(&store(), &[], &["defs"], &NoopListener).unwrap();

    let knight: Unit = registry.create("Knight", &[]).unwrap();
    assert_eq!(knight.x, 2);
    // the properties map is inherited whole or not at all
    assert!(knight.perks.is_empty());
    let mount = knight.mount.as_ref().and_then(Reference::definition).unwrap();
    assert!(Arc::ptr_eq(mount, registry.get("Horse").unwrap()));
}

#[test]
fn test_instantiations_are_independent() {
    let mut registry = registry();
    registry.load(&store(), &[], &["defs"], &NoopListener).unwrap();

    let mut first: Unit = registry.create("Hero", &[]).unwrap();
    let second: Unit = registry.create("Hero", &[]).unwrap();
    assert_eq!(first.definition.as_deref(), Some("Hero"));
    assert_eq!(first.perks, vec!["brave".to_string()]);

    first.perks.push("reckless".into());
    assert_eq!(second.perks, vec!["brave".to_string()]);
    let stored = registry.get("Hero").unwrap().field(keys::PROPERTIES).unwrap();
    let Value::Map(properties) = stored else {
        panic!("properties should be a map");
    };
    assert_eq!(properties.get("Perks"), Some(&Value::List(vec![Value::from("brave")])));
}

#[test]
fn test_addon_alone_fails_without_its_base() {
    let mut registry = registry();
    let err = registry.load(&store(), &["addon"], &["defs"], &NoopListener).unwrap_err();

    assert!(matches!(err, LoadError::MissingBase { ref base, .. } if base == "BaseHero"));
    assert!(registry.catalog().is_empty());
    assert!(registry.packages().is_empty());
}

#[test]
fn test_unknown_folders_load_nothing() {
    let mut registry = registry();
    let report = registry.load(&store(), &[], &["textures"], &NoopListener).unwrap();
    assert!(report.committed.is_empty());
    assert_eq!(registry.packages().len(), 2);
}

#[test]
fn test_compatibility_of_loaded_set() {
    let mut registry = registry();
    registry.load(&store(), &["base"], &["defs"], &NoopListener).unwrap();

    let reports = registry.check_compatibility(&[addon_package()]);
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].package_id, "base");
    assert_eq!(reports[0].severity, Severity::None);
    assert_eq!(reports[1].severity, Severity::None);

    let mut newer_host = Registry::new(Version::new(2, 0, 0));
    newer_host.register_target::<Unit>();
    newer_host.load(&store(), &[], &["defs"], &NoopListener).unwrap();
    let reports = newer_host.check_compatibility(&[]);
    assert!(reports.iter().all(|report| report.severity == Severity::Warning));
}

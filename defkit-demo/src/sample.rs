//! The `Base` and `Addon` sample packages

use defkit_core::definition::{INSTANCE_KIND, TYPE_KEY};
use defkit_core::{MemoryStore, Package, PackageDependency, Version};
use serde_json::json;

use crate::{BACKGROUND_KIND, CHARACTER_KIND, WEAPON_KIND};

pub const DEFS_FOLDER: &str = "defs";

pub fn base_package() -> Package {
    let mut package = Package::new("base", "Base", "defkit");
    package.description = "Heroes, villagers and a sword".to_string();
    package.own_version = Version::new(1, 0, 0);
    package.compatible_version = Version::new(1, 0, 0);
    package
}

pub fn addon_package() -> Package {
    let mut package = Package::new("addon", "Addon", "someone");
    package.description = "A patrolling hero and a berserker".to_string();
    package.own_version = Version::new(0, 2, 0);
    package.compatible_version = Version::new(1, 0, 0);
    package
        .dependencies
        .push(PackageDependency::new("Base", "defkit", Version::new(1, 0, 0)));
    package
}

/// Store holding both sample packages
///
/// `addon` is listed before `base` even though it extends base's
/// definitions; load order comes from the dependency graph.
pub fn sample_store() -> MemoryStore {
    let mut store = MemoryStore::new();

    store.add_package(addon_package()).add_documents(
        "addon",
        DEFS_FOLDER,
        [
            json!({TYPE_KEY: CHARACTER_KIND, "Name": "Hero", "Base": "BaseHero", "Behavior": "patrol"}),
            json!({
                TYPE_KEY: CHARACTER_KIND,
                "Name": "Berserker",
                "Base": "BaseHero",
                "Properties": {"Weapon": "Axe", "Health": 150}
            }),
            json!({
                TYPE_KEY: WEAPON_KIND,
                "Name": "Axe",
                "TargetType": "Weapon",
                "Properties": {"Damage": 8, "Tint": "884422ff"}
            }),
            json!({TYPE_KEY: BACKGROUND_KIND, "Name": "Dusk", "Background": "res://backgrounds/dusk.png"}),
        ],
    );

    store.add_package(base_package()).add_documents(
        "base",
        DEFS_FOLDER,
        [
            json!({TYPE_KEY: BACKGROUND_KIND, "Name": "Meadow", "Background": "res://backgrounds/meadow.png"}),
            json!({
                TYPE_KEY: WEAPON_KIND,
                "Name": "Sword",
                "TargetType": "Weapon",
                "Icon": "res://icons/sword.png",
                "Properties": {"Damage": 5, "Tint": "#c0c0c0"}
            }),
            json!({
                TYPE_KEY: CHARACTER_KIND,
                "Name": "BaseHero",
                "Abstract": true,
                "TargetType": "Character",
                "Prefab": "character",
                "Texture": "res://characters/hero.png",
                "Properties": {"Health": 100, "Weapon": "Sword", "Tags": ["hero"]}
            }),
            json!({
                TYPE_KEY: CHARACTER_KIND,
                "Name": "Villager",
                "TargetType": "Character",
                "Texture": "res://characters/villager.png",
                "Properties": {"Health": 40, "Notes": {"mood": "calm"}}
            }),
            json!({TYPE_KEY: INSTANCE_KIND, "Name": "Marker", "TargetType": "Sprite", "Properties": {"Scale": "0.5,0.5"}}),
        ],
    );

    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use defkit_core::registry::PackageStore;

    #[test]
    fn test_store_lists_addon_first() {
        let store = sample_store();
        assert_eq!(store.available(), vec!["addon", "base"]);

        let base = store.metadata("base").unwrap();
        assert_eq!(store.documents(&base, &[DEFS_FOLDER]).unwrap().len(), 5);
        assert!(store.documents(&base, &["textures"]).unwrap().is_empty());
    }

    #[test]
    fn test_addon_declares_base_dependency() {
        let addon = addon_package();
        assert!(addon.dependencies[0].matches(&base_package()));
    }
}

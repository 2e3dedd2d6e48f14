//! Sample content for the defkit registry
//!
//! This crate provides a small but complete content set built on
//! `defkit-core`, demonstrating how a host application plugs into it:
//! - Target types (`Sprite`, `Character`, `Weapon`) and their leaf values
//! - Custom definition kinds and leaf converters
//! - A prefab library for template definitions
//! - Two sample packages and a seeded scene spawner

pub mod leaf;
pub mod sample;
pub mod scene;
pub mod targets;

use std::collections::HashMap;

use defkit_core::definition::{KindSchema, Shape};
use defkit_core::instance::{HostError, PrefabHost};
use defkit_core::target::Target;
use defkit_core::value::{FieldKind, Value};
use defkit_core::Registry;
use tracing::debug;

pub use leaf::{Color, ColorConverter, Vec2, Vector2Converter};
pub use sample::sample_store;
pub use scene::{spawn_scene, Scene};
pub use targets::{Character, Sprite, Weapon};

pub const BACKGROUND_KIND: &str = "BackgroundDef";
pub const CHARACTER_KIND: &str = "CharacterDef";
pub const WEAPON_KIND: &str = "WeaponDef";

/// Definition kinds the sample packages use
pub fn kinds() -> Vec<KindSchema> {
    vec![
        KindSchema::new(BACKGROUND_KIND, Shape::Custom).with_field("Background", FieldKind::String, Value::Null),
        KindSchema::new(CHARACTER_KIND, Shape::Template).with_field("Texture", FieldKind::String, Value::Null),
        KindSchema::new(WEAPON_KIND, Shape::Instance).with_field("Icon", FieldKind::String, Value::Null),
    ]
}

type PrefabFn = fn() -> Box<dyn Target>;

/// Named object factories standing in for scene files
#[derive(Debug, Clone, Default)]
pub struct PrefabLibrary {
    prefabs: HashMap<String, PrefabFn>,
}

impl PrefabLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library with a `character` and a `sprite` prefab
    pub fn with_builtins() -> Self {
        let mut library = Self::new();
        library.register("character", || {
            Box::new(Character {
                tags: vec!["prefab".to_string()],
                ..Character::default()
            })
        });
        library.register("sprite", || Box::new(Sprite::default()));
        library
    }

    pub fn register(&mut self, name: impl Into<String>, prefab: PrefabFn) {
        self.prefabs.insert(name.into(), prefab);
    }
}

impl PrefabHost for PrefabLibrary {
    fn instantiate(&self, prefab: &str) -> Result<Box<dyn Target>, HostError> {
        let build = self
            .prefabs
            .get(prefab)
            .ok_or_else(|| format!("no prefab named \"{prefab}\""))?;
        Ok(build())
    }

    fn compose(&self, prefab: &str, behavior: &str) -> Result<Box<dyn Target>, HostError> {
        let mut object = self.instantiate(prefab)?;
        object.set("Behavior", Value::from(behavior))?;
        Ok(object)
    }
}

/// Register the sample target types, kinds, converters and prefabs
pub fn install(registry: &mut Registry) {
    registry.register_target::<Sprite>();
    registry.register_target::<Character>();
    registry.register_target::<Weapon>();
    for kind in kinds() {
        registry.register_kind(kind);
    }
    registry.register_converter(Vector2Converter);
    registry.register_converter(ColorConverter);
    registry.set_prefab_host(PrefabLibrary::with_builtins());
    debug!("demo content installed");
}

//! Seeded scene spawning
//!
//! Picks one background at random and instantiates every character
//! definition, scattering the characters around the origin. The same seed
//! over the same catalog always gives the same scene.

use std::f64::consts::PI;

use defkit_core::{InstantiateError, Registry};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::debug;

use crate::leaf::Vec2;
use crate::targets::{Character, Sprite};
use crate::{BACKGROUND_KIND, CHARACTER_KIND};

/// Half-width of the square characters are placed in
const SPREAD: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scene {
    pub background: Option<Sprite>,
    pub characters: Vec<Character>,
}

pub fn spawn_scene(registry: &Registry, seed: u64) -> Result<Scene, InstantiateError> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);

    let backgrounds = registry.get_all(BACKGROUND_KIND);
    let background = if backgrounds.is_empty() {
        None
    } else {
        let definition = &backgrounds[rng.gen_range(0..backgrounds.len())];
        Some(Sprite {
            name: definition.name().to_string(),
            definition: Some(definition.name().to_string()),
            texture: definition
                .field("Background")
                .and_then(|value| value.as_str().map(str::to_string)),
            ..Sprite::default()
        })
    };

    let mut characters = Vec::new();
    for definition in registry.instance_definitions::<Character>() {
        if definition.kind() != CHARACTER_KIND {
            continue;
        }
        let mut character: Character = registry.create(definition.name(), &[])?;
        character.texture = definition
            .field("Texture")
            .and_then(|value| value.as_str().map(str::to_string));
        place(&mut character, &mut rng);
        characters.push(character);
    }

    debug!(seed, characters = characters.len(), "scene spawned");
    Ok(Scene { background, characters })
}

fn place(character: &mut Character, rng: &mut ChaCha20Rng) {
    character.rotation = rng.gen_range(-PI..PI);
    character.scale = if rng.gen::<f64>() < 0.5 { Vec2::ONE } else { Vec2::new(2.0, 2.0) };
    character.position = Vec2::new(rng.gen_range(-SPREAD..SPREAD), rng.gen_range(-SPREAD..SPREAD));
    character.clamp_rotation();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{install, sample_store};
    use defkit_core::{NoopListener, Version};

    fn loaded(ids: &[&str]) -> Registry {
        let mut registry = Registry::new(Version::new(1, 0, 0));
        install(&mut registry);
        registry.load(&sample_store(), ids, &["defs"], &NoopListener).unwrap();
        registry
    }

    #[test]
    fn test_same_seed_same_scene() {
        let registry = loaded(&[]);
        let first = spawn_scene(&registry, 7).unwrap();
        let second = spawn_scene(&registry, 7).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_scene_contents() {
        let registry = loaded(&[]);
        let scene = spawn_scene(&registry, 42).unwrap();

        let names: Vec<&str> = scene.characters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Hero", "Berserker", "Villager"]);
        assert!(scene.background.is_some());
        for character in &scene.characters {
            assert!(character.position.x.abs() <= SPREAD && character.position.y.abs() <= SPREAD);
            assert!(character.scale == Vec2::ONE || character.scale == Vec2::new(2.0, 2.0));
            assert!((-PI..=PI).contains(&character.rotation));
            assert!(character.texture.is_some());
        }
    }

    #[test]
    fn test_base_alone_has_no_addon_characters() {
        let registry = loaded(&["base"]);
        let scene = spawn_scene(&registry, 1).unwrap();
        assert_eq!(scene.characters.len(), 1);
        assert_eq!(
            scene.background.and_then(|background| background.texture).as_deref(),
            Some("res://backgrounds/meadow.png")
        );
    }
}

//! Scene objects the sample content instantiates

use std::f64::consts::PI;

use defkit_core::impl_target;
use defkit_core::value::{PropertyMap, Reference};

use crate::leaf::{Color, Vec2};

/// Flat textured node, used for backgrounds
#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    pub name: String,
    pub definition: Option<String>,
    pub texture: Option<String>,
    pub position: Vec2,
    pub scale: Vec2,
    pub tint: Color,
}

impl Default for Sprite {
    fn default() -> Self {
        Self {
            name: String::new(),
            definition: None,
            texture: None,
            position: Vec2::ZERO,
            scale: Vec2::ONE,
            tint: Color::WHITE,
        }
    }
}

impl_target!(Sprite as "Sprite" extends ["Node2D"] {
    name => "Name",
    definition => "Definition",
    texture => "Texture",
    position => "Position",
    scale => "Scale",
    tint => "Tint",
});

#[derive(Debug, Clone, PartialEq)]
pub struct Character {
    pub name: String,
    pub definition: Option<String>,
    pub texture: Option<String>,
    pub behavior: Option<String>,
    pub weapon: Option<Reference>,
    pub health: i64,
    pub tags: Vec<String>,
    pub notes: PropertyMap,
    pub position: Vec2,
    pub scale: Vec2,
    /// Radians, in `-PI..PI`
    pub rotation: f64,
}

impl Default for Character {
    fn default() -> Self {
        Self {
            name: String::new(),
            definition: None,
            texture: None,
            behavior: None,
            weapon: None,
            health: 100,
            tags: Vec::new(),
            notes: PropertyMap::new(),
            position: Vec2::ZERO,
            scale: Vec2::ONE,
            rotation: 0.0,
        }
    }
}

impl_target!(Character as "Character" extends ["Node2D"] {
    name => "Name",
    definition => "Definition",
    texture => "Texture",
    behavior => "Behavior",
    weapon => "Weapon",
    health => "Health",
    tags => "Tags",
    notes => "Notes",
    position => "Position",
    scale => "Scale",
    rotation => "Rotation",
});

impl Character {
    pub fn weapon_name(&self) -> Option<&str> {
        self.weapon.as_ref().map(Reference::name)
    }

    pub fn facing(&self) -> Vec2 {
        Vec2::new(self.rotation.cos(), self.rotation.sin())
    }

    pub(crate) fn clamp_rotation(&mut self) {
        self.rotation = (self.rotation + PI).rem_euclid(2.0 * PI) - PI;
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Weapon {
    pub definition: Option<String>,
    pub damage: i64,
    pub tint: Color,
}

impl_target!(Weapon as "Weapon" {
    definition => "Definition",
    damage => "Damage",
    tint => "Tint",
});

#[cfg(test)]
mod tests {
    use super::*;
    use defkit_core::target::{Target, TargetType};
    use defkit_core::value::{FieldKind, Value};

    #[test]
    fn test_character_fields() {
        let character = Character::default();
        let fields = character.fields();
        let kind = |name: &str| fields.iter().find(|field| field.name == name).map(|field| field.kind.clone());

        assert_eq!(kind("Position"), Some(FieldKind::leaf("Vector2")));
        assert_eq!(kind("Weapon"), Some(FieldKind::Reference));
        assert_eq!(kind("Health"), Some(FieldKind::Int));
        assert_eq!(Character::extends(), &["Node2D"]);
    }

    #[test]
    fn test_set_leaf_fields_from_values() {
        let mut character = Character::default();
        character.set("Position", Value::from("3,4")).unwrap();
        character.set("Rotation", Value::Float(1.0)).unwrap();
        assert_eq!(character.position, Vec2::new(3.0, 4.0));
        assert!(character.set("Position", Value::Bool(true)).is_err());
        assert!(character.set("Wings", Value::Null).is_err());
    }

    #[test]
    fn test_rotation_wraps_into_range() {
        let mut character = Character {
            rotation: 3.0 * PI / 2.0,
            ..Character::default()
        };
        character.clamp_rotation();
        assert!((character.rotation + PI / 2.0).abs() < 1e-9);
        assert!((character.facing().y + 1.0).abs() < 1e-9);
    }
}

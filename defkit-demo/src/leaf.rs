//! Leaf values with their own string formats: 2D vectors and colors

use std::fmt;
use std::str::FromStr;

use defkit_core::serializer::{Context, Converter, Document, SerializeError, Serializer};
use defkit_core::value::{FieldKind, FromValue, ToValue, Value, ValueError};

pub const VECTOR2: &str = "Vector2";
pub const COLOR: &str = "Color";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LeafError {
    #[error("invalid vector \"{0}\", expected \"x,y\"")]
    Vector(String),

    #[error("invalid color \"{0}\", expected rrggbb or rrggbbaa")]
    Color(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };
    pub const ONE: Vec2 = Vec2 { x: 1.0, y: 1.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl FromStr for Vec2 {
    type Err = LeafError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LeafError::Vector(s.to_string());
        let (x, y) = s.split_once(',').ok_or_else(invalid)?;
        let x = x.trim().parse().map_err(|_| invalid())?;
        let y = y.trim().parse().map_err(|_| invalid())?;
        Ok(Self { x, y })
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Float(n) => Some(*n),
        Value::Int(n) => Some(*n as f64),
        _ => None,
    }
}

/// Held in memory as a two-element list of floats
impl FromValue for Vec2 {
    fn kind() -> FieldKind {
        FieldKind::leaf(VECTOR2)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match &value {
            Value::List(items) => match items.as_slice() {
                [x, y] => match (number(x), number(y)) {
                    (Some(x), Some(y)) => Ok(Vec2 { x, y }),
                    _ => Err(ValueError::mismatch(Self::kind(), &value)),
                },
                _ => Err(ValueError::Invalid(format!("vector needs 2 components, got {}", items.len()))),
            },
            Value::String(s) => s.parse().map_err(|err: LeafError| ValueError::Invalid(err.to_string())),
            _ => Err(ValueError::mismatch(Self::kind(), &value)),
        }
    }
}

impl ToValue for Vec2 {
    fn to_value(&self) -> Value {
        Value::List(vec![Value::Float(self.x), Value::Float(self.y)])
    }
}

/// 8-bit RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Hex form without a leading `#`, always with alpha
    pub fn to_html(&self) -> String {
        format!("{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }

    fn packed(&self) -> u32 {
        u32::from_be_bytes([self.r, self.g, self.b, self.a])
    }

    fn from_packed(packed: u32) -> Self {
        let [r, g, b, a] = packed.to_be_bytes();
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl FromStr for Color {
    type Err = LeafError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LeafError::Color(s.to_string());
        let hex = s.trim().trim_start_matches('#');
        if !matches!(hex.len(), 6 | 8) || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        let a = if hex.len() == 8 { channel(6)? } else { 255 };
        Ok(Self::rgba(channel(0)?, channel(2)?, channel(4)?, a))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_html())
    }
}

/// Held in memory as the packed `0xRRGGBBAA` integer
impl FromValue for Color {
    fn kind() -> FieldKind {
        FieldKind::leaf(COLOR)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match &value {
            Value::Int(packed) => u32::try_from(*packed)
                .map(Color::from_packed)
                .map_err(|_| ValueError::Invalid(format!("{packed} is not a packed color"))),
            Value::String(s) => s.parse().map_err(|err: LeafError| ValueError::Invalid(err.to_string())),
            _ => Err(ValueError::mismatch(Self::kind(), &value)),
        }
    }
}

impl ToValue for Color {
    fn to_value(&self) -> Value {
        Value::Int(i64::from(self.packed()))
    }
}

fn expected(what: &str, doc: &Document) -> SerializeError {
    SerializeError::Expected {
        expected: what.to_string(),
        found: doc.to_string(),
    }
}

fn invalid(err: impl fmt::Display) -> SerializeError {
    SerializeError::Invalid(err.to_string())
}

/// Writes vectors as `"x,y"`
pub struct Vector2Converter;

impl Converter for Vector2Converter {
    fn name(&self) -> &str {
        "vector2"
    }

    fn can_convert(&self, kind: &FieldKind) -> bool {
        matches!(kind, FieldKind::Leaf(name) if name == VECTOR2)
    }

    fn write(&self, value: &Value, _: &FieldKind, _: &Serializer, _: &Context<'_>) -> Result<Document, SerializeError> {
        let vec = Vec2::from_value(value.clone()).map_err(invalid)?;
        Ok(Document::String(vec.to_string()))
    }

    fn read(&self, doc: &Document, _: &FieldKind, _: &Serializer, _: &Context<'_>) -> Result<Value, SerializeError> {
        let text = doc.as_str().ok_or_else(|| expected("vector string", doc))?;
        let vec: Vec2 = text.parse().map_err(invalid)?;
        Ok(vec.to_value())
    }
}

/// Writes colors as html hex strings
pub struct ColorConverter;

impl Converter for ColorConverter {
    fn name(&self) -> &str {
        "color"
    }

    fn can_convert(&self, kind: &FieldKind) -> bool {
        matches!(kind, FieldKind::Leaf(name) if name == COLOR)
    }

    fn write(&self, value: &Value, _: &FieldKind, _: &Serializer, _: &Context<'_>) -> Result<Document, SerializeError> {
        let color = Color::from_value(value.clone()).map_err(invalid)?;
        Ok(Document::String(color.to_html()))
    }

    fn read(&self, doc: &Document, _: &FieldKind, _: &Serializer, _: &Context<'_>) -> Result<Value, SerializeError> {
        let text = doc.as_str().ok_or_else(|| expected("color string", doc))?;
        let color: Color = text.parse().map_err(invalid)?;
        Ok(color.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use defkit_core::definition::KindRegistry;
    use defkit_core::target::TargetRegistry;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_vector_parsing() {
        assert_eq!("1.5,-2".parse::<Vec2>().unwrap(), Vec2::new(1.5, -2.0));
        assert_eq!(" 3 , 4 ".parse::<Vec2>().unwrap(), Vec2::new(3.0, 4.0));
        assert!("3".parse::<Vec2>().is_err());
        assert!("a,b".parse::<Vec2>().is_err());
    }

    #[test]
    fn test_color_parsing() {
        assert_eq!("#ff8000".parse::<Color>().unwrap(), Color::rgba(255, 128, 0, 255));
        assert_eq!("ff800080".parse::<Color>().unwrap().a, 128);
        assert_eq!(Color::rgba(1, 2, 3, 4).to_html(), "01020304");
        assert!("fff".parse::<Color>().is_err());
        assert!("zzzzzz".parse::<Color>().is_err());
    }

    #[test]
    fn test_converters_claim_only_their_leaf() {
        assert!(Vector2Converter.can_convert(&FieldKind::leaf(VECTOR2)));
        assert!(!Vector2Converter.can_convert(&FieldKind::leaf(COLOR)));
        assert!(!ColorConverter.can_convert(&FieldKind::String));
    }

    #[test]
    fn test_converter_documents() {
        let kinds = KindRegistry::new();
        let targets = TargetRegistry::new();
        let ctx = Context::new(&kinds, &targets);
        let mut serializer = Serializer::new();
        serializer.register(Vector2Converter);
        serializer.register(ColorConverter);

        let vector = serializer
            .read_value(&json!("2,3.5"), &Vec2::kind(), &ctx)
            .unwrap();
        assert_eq!(Vec2::from_value(vector.clone()).unwrap(), Vec2::new(2.0, 3.5));
        assert_eq!(serializer.write_value(&vector, &Vec2::kind(), &ctx).unwrap(), json!("2,3.5"));

        let color = serializer.read_value(&json!("#102030"), &Color::kind(), &ctx).unwrap();
        assert_eq!(serializer.write_value(&color, &Color::kind(), &ctx).unwrap(), json!("102030ff"));
        assert!(serializer.read_value(&json!(7), &Color::kind(), &ctx).is_err());
    }

    proptest! {
        #[test]
        fn test_color_html_is_stable(r: u8, g: u8, b: u8, a: u8) {
            let color = Color::rgba(r, g, b, a);
            prop_assert_eq!(color.to_html().parse::<Color>().unwrap(), color);
            prop_assert_eq!(Color::from_value(color.to_value()).unwrap(), color);
        }
    }
}

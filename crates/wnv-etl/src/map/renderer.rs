use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gdb::{Feature, FeatureClass, GisError};

/// An sRGB color written as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const GRAY: Color = Color::rgb(128, 128, 128);
    pub const RED: Color = Color::rgb(255, 0, 0);

    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Components scaled to `0.0..=1.0` for PDF color operators.
    pub(crate) fn unit(self) -> [f32; 3] {
        [self.red, self.green, self.blue].map(|channel| f32::from(channel) / 255.0)
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let hex = value
            .trim()
            .strip_prefix('#')
            .filter(|hex| hex.len() == 6 && hex.is_ascii())
            .ok_or_else(|| format!("color '{value}' must look like #RRGGBB"))?;
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .map_err(|_| format!("color '{value}' has a non-hex digit"))
        };
        Ok(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }
}

/// Marker used for point features. Polygon features are always drawn as filled areas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    #[default]
    Circle,
    Square,
    Triangle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    #[serde(default)]
    pub shape: Shape,
    pub color: Color,
    /// Marker size in points.
    #[serde(default = "default_symbol_size")]
    pub size: f64,
    #[serde(default)]
    pub outline: Option<Color>,
}

fn default_symbol_size() -> f64 {
    8.0
}

impl Symbol {
    pub fn new(shape: Shape, color: Color, size: f64) -> Self {
        Self {
            shape,
            color,
            size,
            outline: None,
        }
    }

    pub fn with_outline(mut self, outline: Color) -> Self {
        self.outline = Some(outline);
        self
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Self::new(Shape::Circle, Color::GRAY, default_symbol_size()).with_outline(Color::BLACK)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueClass {
    pub value: String,
    pub symbol: Symbol,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RendererKind {
    Simple {
        symbol: Symbol,
    },
    UniqueValue {
        field: String,
        #[serde(default)]
        classes: Vec<ValueClass>,
        #[serde(default)]
        default_symbol: Symbol,
    },
}

/// Layer symbology plus a layer-wide transparency percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Renderer {
    #[serde(flatten)]
    pub kind: RendererKind,
    #[serde(default)]
    pub transparency: u8,
}

impl Renderer {
    pub fn simple(symbol: Symbol) -> Self {
        Self {
            kind: RendererKind::Simple { symbol },
            transparency: 0,
        }
    }

    pub fn unique_value(
        field: impl Into<String>,
        classes: Vec<ValueClass>,
        default_symbol: Symbol,
    ) -> Self {
        Self {
            kind: RendererKind::UniqueValue {
                field: field.into(),
                classes,
                default_symbol,
            },
            transparency: 0,
        }
    }

    pub fn with_transparency(mut self, transparency: u8) -> Self {
        self.transparency = transparency;
        self
    }

    /// Checks the renderer against the layer's data source.
    pub fn validate(&self, layer: &str, class: &FeatureClass) -> Result<(), GisError> {
        let invalid = |reason: String| GisError::InvalidRenderer {
            layer: layer.to_string(),
            reason,
        };
        if self.transparency > 100 {
            return Err(invalid(format!(
                "transparency {} is outside 0-100",
                self.transparency
            )));
        }

        let symbols: Vec<&Symbol> = match &self.kind {
            RendererKind::Simple { symbol } => vec![symbol],
            RendererKind::UniqueValue {
                field,
                classes,
                default_symbol,
            } => {
                class.require_field(field)?;
                classes
                    .iter()
                    .map(|class| &class.symbol)
                    .chain(std::iter::once(default_symbol))
                    .collect()
            }
        };
        match symbols
            .iter()
            .find(|symbol| !symbol.size.is_finite() || symbol.size <= 0.0)
        {
            Some(symbol) => Err(invalid(format!("symbol size {} must be positive", symbol.size))),
            None => Ok(()),
        }
    }

    pub fn symbol_for(&self, feature: &Feature) -> &Symbol {
        match &self.kind {
            RendererKind::Simple { symbol } => symbol,
            RendererKind::UniqueValue {
                field,
                classes,
                default_symbol,
            } => {
                let value = feature.attribute(field).map(value_label);
                classes
                    .iter()
                    .find(|class| Some(class.value.as_str()) == value.as_deref())
                    .map(|class| &class.symbol)
                    .unwrap_or(default_symbol)
            }
        }
    }
}

fn value_label(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "<Null>".to_string(),
        other => other.to_string(),
    }
}

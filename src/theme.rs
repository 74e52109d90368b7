//! Declarative drawing steps read from course configuration.
//!
//! A step is a single-key JSON object naming the element:
//! `{"text": {"string": "...", "x": 10, "y": 20, "width": 300, "height": 40}}`.

use crate::config::FontConfig;
use crate::style::Alignment;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeStep {
    Text(TextAttrs),
    Line(LineAttrs),
    Rectangle(RectAttrs),
    Image(ImageAttrs),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,
    /// Entity field holding the string when `string` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leading: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default)]
    pub alignment: Alignment,
    #[serde(default)]
    pub auto_scale: bool,
    /// Overrides the course font for this element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<FontConfig>,
}

impl TextAttrs {
    pub const DEFAULT_FONT_SIZE: f32 = 12.0;
    pub const DEFAULT_LEADING: f32 = 12.0;

    pub fn font_size(&self) -> f32 {
        self.font_size.unwrap_or(Self::DEFAULT_FONT_SIZE)
    }

    pub fn leading(&self) -> f32 {
        self.leading.unwrap_or(Self::DEFAULT_LEADING)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineAttrs {
    pub x_start: f32,
    pub y_start: f32,
    pub x_end: f32,
    pub y_end: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectAttrs {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttrs {
    /// Path relative to the template directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    /// Defaults to the image's intrinsic width; height always follows the aspect ratio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
}

/// Instructor signature block: an anchor, a step template and the entity fields
/// (`name`, `title`, `signature_file`, ...) the template's `key`s refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructorBlock {
    pub x: f32,
    pub y: f32,
    pub template: Vec<ThemeStep>,
    #[serde(default)]
    pub signature_y_offset: f32,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl InstructorBlock {
    /// String value of an entity field; numbers are rendered, other types are absent.
    pub fn field(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(num) => Some(num.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlairPosition {
    Top,
    Bottom,
}

/// Decoration drawn below (`bottom`) or above (`top`) the instructor and course blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlairBlock {
    pub position: FlairPosition,
    pub template: Vec<ThemeStep>,
}

/// Instructors may be written either as a plain block or wrapped in a single-key object
/// (`{"lead": {...}}`); both forms deserialize to the block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstructorEntry {
    Block(InstructorBlock),
    Named(BTreeMap<String, InstructorBlock>),
}

impl InstructorEntry {
    pub fn blocks(&self) -> Vec<&InstructorBlock> {
        match self {
            InstructorEntry::Block(block) => vec![block],
            InstructorEntry::Named(map) => map.values().collect(),
        }
    }
}

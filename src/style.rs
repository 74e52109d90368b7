use crate::resolver::FontFamily;
use crate::types::{Color, Pt};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

/// Style of one text element. Values are built per element and never mutated in place;
/// autoscaling derives new values with [`TextStyle::scaled`].
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    family: FontFamily,
    font_size: Pt,
    leading: Pt,
    color: Color,
    alignment: Alignment,
}

impl TextStyle {
    pub fn builder(family: FontFamily) -> TextStyleBuilder {
        TextStyleBuilder {
            family,
            font_size: Pt::from_i32(12),
            leading: None,
            color: Color::BLACK,
            alignment: Alignment::Left,
        }
    }

    pub fn family(&self) -> &FontFamily {
        &self.family
    }

    pub fn font_size(&self) -> Pt {
        self.font_size
    }

    pub fn leading(&self) -> Pt {
        self.leading
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    pub fn scaled(&self, font_size: Pt, leading: Pt) -> TextStyle {
        TextStyle {
            font_size,
            leading,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextStyleBuilder {
    family: FontFamily,
    font_size: Pt,
    leading: Option<Pt>,
    color: Color,
    alignment: Alignment,
}

impl TextStyleBuilder {
    pub fn font_size(mut self, size: Pt) -> Self {
        self.font_size = size;
        self
    }

    /// Line pitch; defaults to the font size.
    pub fn leading(mut self, leading: Pt) -> Self {
        self.leading = Some(leading);
        self
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn build(self) -> TextStyle {
        TextStyle {
            family: self.family,
            font_size: self.font_size,
            leading: self.leading.unwrap_or(self.font_size),
            color: self.color,
            alignment: self.alignment,
        }
    }
}

use crate::assets::ImageAsset;
use crate::types::{Color, Pt, Size};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Drawing commands in PDF user space: origin bottom-left, y grows upward.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    SetFontName(String),
    SetFontSize(Pt),
    MoveTo {
        x: Pt,
        y: Pt,
    },
    LineTo {
        x: Pt,
        y: Pt,
    },
    Stroke,
    Fill,
    FillStroke,
    /// Rectangle path; painted by the following `Fill`/`Stroke`/`FillStroke`.
    Rect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
    /// Text placed with its baseline at `y`.
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: String,
    },
    /// Clickable area pointing at `uri`; emitted as a link annotation.
    Link {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        uri: String,
    },
}

#[derive(Debug, Clone)]
pub struct Page {
    pub commands: Vec<Command>,
}

impl Page {
    fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub page_size: Size,
    pub pages: Vec<Page>,
    pub images: BTreeMap<String, Arc<ImageAsset>>,
}

impl Document {
    /// Font ids referenced by `SetFontName` anywhere in the document, in first-use order.
    pub fn font_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for page in &self.pages {
            for cmd in &page.commands {
                if let Command::SetFontName(name) = cmd {
                    if !names.iter().any(|known| known == name) {
                        names.push(name.clone());
                    }
                }
            }
        }
        names
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    font_size: Pt,
    font_name: String,
}

impl GraphicsState {
    fn initial() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::ONE,
            font_size: Pt::from_i32(12),
            font_name: String::new(),
        }
    }
}

/// Records drawing operations; redundant state changes are dropped.
pub struct Canvas {
    page_size: Size,
    pages: Vec<Page>,
    current: Page,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
    images: BTreeMap<String, Arc<ImageAsset>>,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            current: Page::new(),
            state_stack: Vec::new(),
            current_state: GraphicsState::initial(),
            images: BTreeMap::new(),
        }
    }

    pub fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.current.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.current.commands.push(Command::RestoreState);
        }
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.current.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.current.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = width.max(Pt::ZERO);
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.current.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_font_name(&mut self, name: &str) {
        if self.current_state.font_name == name {
            return;
        }
        self.current_state.font_name = name.to_string();
        self.current
            .commands
            .push(Command::SetFontName(self.current_state.font_name.clone()));
    }

    pub fn set_font_size(&mut self, size: Pt) {
        if self.current_state.font_size == size {
            return;
        }
        self.current_state.font_size = size;
        self.current.commands.push(Command::SetFontSize(size));
    }

    pub fn move_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::MoveTo { x, y });
    }

    pub fn line_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::LineTo { x, y });
    }

    pub fn stroke(&mut self) {
        self.current.commands.push(Command::Stroke);
    }

    pub fn fill(&mut self) {
        self.current.commands.push(Command::Fill);
    }

    pub fn fill_stroke(&mut self) {
        self.current.commands.push(Command::FillStroke);
    }

    pub fn rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt) {
        self.current.commands.push(Command::Rect {
            x,
            y,
            width,
            height,
        });
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        self.current
            .commands
            .push(Command::DrawString { x, y, text });
    }

    /// Registers image data under `resource_id` so `draw_image` can reference it.
    pub fn register_image(&mut self, resource_id: impl Into<String>, image: Arc<ImageAsset>) {
        self.images.entry(resource_id.into()).or_insert(image);
    }

    pub fn draw_image(
        &mut self,
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: impl Into<String>,
    ) {
        self.current.commands.push(Command::DrawImage {
            x,
            y,
            width,
            height,
            resource_id: resource_id.into(),
        });
    }

    pub fn link(&mut self, x: Pt, y: Pt, width: Pt, height: Pt, uri: impl Into<String>) {
        self.current.commands.push(Command::Link {
            x,
            y,
            width,
            height,
            uri: uri.into(),
        });
    }

    pub fn show_page(&mut self) {
        let current = std::mem::replace(&mut self.current, Page::new());
        self.pages.push(current);
        self.state_stack.clear();
        self.current_state = GraphicsState::initial();
    }

    pub fn current_command_count(&self) -> usize {
        self.current.commands.len()
    }

    pub fn finish(mut self) -> Document {
        if !self.current.commands.is_empty() || self.pages.is_empty() {
            self.show_page();
        }
        Document {
            page_size: self.page_size,
            pages: self.pages,
            images: self.images,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageGeometry;

    #[test]
    fn redundant_state_changes_are_dropped() {
        let mut canvas = Canvas::new(PageGeometry::LandscapeA4.size());
        canvas.set_fill_color(Color::BLACK);
        canvas.set_font_name("OpenSans-Light");
        canvas.set_font_name("OpenSans-Light");
        canvas.set_font_size(Pt::from_i32(12));
        assert_eq!(canvas.current_command_count(), 1);
    }

    #[test]
    fn restore_returns_to_saved_state() {
        let mut canvas = Canvas::new(PageGeometry::LandscapeA4.size());
        canvas.save_state();
        canvas.set_font_name("A");
        canvas.restore_state();
        canvas.set_font_name("A");
        let doc = canvas.finish();
        let names = doc.font_names();
        assert_eq!(names, vec!["A".to_string()]);
        let set_count = doc.pages[0]
            .commands
            .iter()
            .filter(|cmd| matches!(cmd, Command::SetFontName(_)))
            .count();
        assert_eq!(set_count, 2);
    }

    #[test]
    fn finish_always_yields_a_page() {
        let doc = Canvas::new(PageGeometry::PortraitA4.size()).finish();
        assert_eq!(doc.pages.len(), 1);
        assert!(doc.pages[0].commands.is_empty());
    }

    #[test]
    fn empty_strings_are_not_recorded() {
        let mut canvas = Canvas::new(PageGeometry::LandscapeA4.size());
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "");
        assert_eq!(canvas.current_command_count(), 0);
    }
}

use crate::assets::ImageCache;
use crate::canvas::Canvas;
use crate::context::RenderContext;
use crate::error::CertError;
use crate::font::FontRegistry;
use crate::layout;
use crate::resolver::{FontFamily, FontResolver};
use crate::style::TextStyle;
use crate::theme::{ImageAttrs, LineAttrs, RectAttrs, TextAttrs, ThemeStep};
use crate::types::{Color, Pt};
use std::collections::BTreeMap;
use std::path::Path;

/// Origin and entity data for an anchored stage (an instructor signature block).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Anchor {
    pub x: f32,
    pub y: f32,
    /// Extra drop applied to the `signature_file` image.
    pub signature_y_offset: f32,
    pub fields: BTreeMap<String, String>,
}

/// An ordered group of steps drawn together.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub name: String,
    pub steps: Vec<ThemeStep>,
    /// Positions are relative to the anchor and stack vertically.
    pub anchor: Option<Anchor>,
    /// Apply `{placeholder}` substitution from the render context to text.
    pub substitute: bool,
}

impl Stage {
    pub fn new(name: impl Into<String>, steps: Vec<ThemeStep>) -> Self {
        Self {
            name: name.into(),
            steps,
            anchor: None,
            substitute: false,
        }
    }

    pub fn substituted(mut self) -> Self {
        self.substitute = true;
        self
    }

    pub fn anchored(mut self, anchor: Anchor) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

/// Resolves step attributes, picks fonts and lays out text, then records drawing
/// operations on a [`Canvas`].
pub struct Interpreter<'a> {
    registry: &'a FontRegistry,
    resolver: &'a FontResolver,
    images: &'a ImageCache,
    template_dir: &'a Path,
    families: &'a [FontFamily],
}

impl<'a> Interpreter<'a> {
    pub fn new(
        registry: &'a FontRegistry,
        resolver: &'a FontResolver,
        images: &'a ImageCache,
        template_dir: &'a Path,
        families: &'a [FontFamily],
    ) -> Self {
        Self {
            registry,
            resolver,
            images,
            template_dir,
            families,
        }
    }

    /// Draws one stage. Colors and line widths set by a stage do not leak into the next.
    pub fn render(
        &self,
        stage: &Stage,
        context: &RenderContext,
        canvas: &mut Canvas,
    ) -> Result<(), CertError> {
        log::debug!("drawing stage {} ({} steps)", stage.name, stage.steps.len());
        canvas.save_state();
        let result = self.draw_steps(stage, context, canvas);
        canvas.restore_state();
        result
    }

    fn draw_steps(
        &self,
        stage: &Stage,
        context: &RenderContext,
        canvas: &mut Canvas,
    ) -> Result<(), CertError> {
        let anchor = stage.anchor.as_ref();
        let anchor_x = anchor.map(|a| a.x).unwrap_or(0.0);
        let mut running_y = anchor.map(|a| a.y).unwrap_or(0.0);

        for step in &stage.steps {
            match step {
                ThemeStep::Text(attrs) => {
                    let Some(raw) = self.text_value(stage, attrs, context) else {
                        continue;
                    };
                    let text = if stage.substitute {
                        context.substitute(&raw)?
                    } else {
                        raw
                    };
                    let (x, y) = if anchor.is_some() {
                        let origin = (anchor_x + attrs.x, running_y + attrs.y);
                        running_y += attrs.height;
                        origin
                    } else {
                        (attrs.x, attrs.y)
                    };
                    self.draw_text(attrs, &text, x, y, canvas)?;
                }
                ThemeStep::Line(attrs) => {
                    let (dx, dy) = if anchor.is_some() {
                        (anchor_x, running_y)
                    } else {
                        (0.0, 0.0)
                    };
                    draw_line(attrs, dx, dy, canvas)?;
                }
                ThemeStep::Rectangle(attrs) => {
                    // Signature blocks only place text, lines and images.
                    if anchor.is_some() {
                        log::debug!("skipping rectangle in anchored stage {}", stage.name);
                        continue;
                    }
                    draw_rectangle(attrs, canvas)?;
                }
                ThemeStep::Image(attrs) => {
                    let Some(file) = self.image_file(stage, attrs, context) else {
                        continue;
                    };
                    let y_offset = match (anchor, attrs.key.as_deref()) {
                        (Some(anchor), Some("signature_file")) if attrs.file.is_none() => {
                            anchor.signature_y_offset
                        }
                        _ => 0.0,
                    };
                    let (x, y) = if anchor.is_some() {
                        (anchor_x + attrs.x, running_y + attrs.y + y_offset)
                    } else {
                        (attrs.x, attrs.y)
                    };
                    let height = self.draw_image(attrs, &file, x, y, canvas)?;
                    if anchor.is_some() {
                        running_y += y_offset + height;
                    }
                }
            }
        }
        Ok(())
    }

    fn text_value(&self, stage: &Stage, attrs: &TextAttrs, context: &RenderContext) -> Option<String> {
        if let Some(string) = attrs.string.as_deref().filter(|s| !s.is_empty()) {
            return Some(string.to_string());
        }
        let Some(key) = attrs.key.as_deref() else {
            log::debug!("text step in stage {} has neither string nor key", stage.name);
            return None;
        };
        let value = match &stage.anchor {
            Some(anchor) => anchor.fields.get(key).cloned(),
            None => context.get(key),
        };
        if value.is_none() {
            log::debug!("skipping text for unresolved key {key} in stage {}", stage.name);
        }
        value
    }

    fn image_file(&self, stage: &Stage, attrs: &ImageAttrs, context: &RenderContext) -> Option<String> {
        if let Some(file) = attrs.file.as_deref().filter(|f| !f.is_empty()) {
            return Some(file.to_string());
        }
        let key = attrs.key.as_deref()?;
        let value = match &stage.anchor {
            Some(anchor) => anchor.fields.get(key).cloned(),
            None => context.get(key),
        };
        if value.is_none() {
            log::debug!("skipping image for unresolved key {key} in stage {}", stage.name);
        }
        value.filter(|file| !file.is_empty())
    }

    fn candidates(&self, attrs: &TextAttrs) -> Vec<FontFamily> {
        let mut out: Vec<FontFamily> = Vec::with_capacity(self.families.len() + 1);
        if let Some(font) = &attrs.font {
            out.push(FontFamily::from_config(&font.name, &font.face_type));
        }
        out.extend(self.families.iter().cloned());
        out
    }

    fn draw_text(
        &self,
        attrs: &TextAttrs,
        text: &str,
        x: f32,
        y: f32,
        canvas: &mut Canvas,
    ) -> Result<(), CertError> {
        let choice = self
            .resolver
            .resolve_markup(&self.candidates(attrs), text)?;
        let color = match attrs.text_color.as_deref() {
            Some(raw) => parse_color(raw)?,
            None => Color::BLACK,
        };
        let style = TextStyle::builder(choice.family)
            .font_size(Pt::from_f32(attrs.font_size()))
            .leading(Pt::from_f32(attrs.leading()))
            .color(color)
            .alignment(attrs.alignment)
            .build();

        let width = Pt::from_f32(attrs.width);
        let height = Pt::from_f32(attrs.height);
        let x = Pt::from_f32(x);
        let y = Pt::from_f32(y);
        let (block, y) = if attrs.auto_scale {
            let block = layout::fit(self.registry, text, &style, width, height);
            let y = y + (height - block.height) / 2 + block.font_size / 5;
            (block, y)
        } else {
            let block = layout::layout_paragraph(self.registry, text, &style, width);
            let y = y + (height - block.height);
            (block, y)
        };
        block.draw_on(canvas, x, y);
        Ok(())
    }

    /// Draws an image and returns its drawn height.
    fn draw_image(
        &self,
        attrs: &ImageAttrs,
        file: &str,
        x: f32,
        y: f32,
        canvas: &mut Canvas,
    ) -> Result<f32, CertError> {
        let path = self.template_dir.join(file);
        let asset = self.images.get_or_load(&path).map_err(|err| {
            log::error!("{err}");
            err
        })?;
        let width = attrs.width.unwrap_or(asset.width as f32);
        let height = width * asset.aspect();
        canvas.register_image(file, asset);
        canvas.draw_image(
            Pt::from_f32(x),
            Pt::from_f32(y),
            Pt::from_f32(width),
            Pt::from_f32(height),
            file,
        );
        Ok(height)
    }
}

fn parse_color(raw: &str) -> Result<Color, CertError> {
    Color::from_hex(raw).ok_or_else(|| {
        let err = CertError::InvalidConfiguration(format!("invalid color '{raw}'"));
        log::error!("{err}");
        err
    })
}

/// Stroke settings when either a color or a width is configured.
fn stroke_of(color: Option<&str>, width: Option<f32>) -> Result<Option<(Color, f32)>, CertError> {
    if color.is_none() && width.is_none() {
        return Ok(None);
    }
    let color = match color {
        Some(raw) => parse_color(raw)?,
        None => Color::BLACK,
    };
    let width = width.filter(|w| *w > 0.0).unwrap_or(1.0);
    Ok(Some((color, width)))
}

fn draw_line(attrs: &LineAttrs, dx: f32, dy: f32, canvas: &mut Canvas) -> Result<(), CertError> {
    let Some((color, width)) = stroke_of(attrs.stroke_color.as_deref(), attrs.stroke_width)? else {
        return Ok(());
    };
    canvas.set_stroke_color(color);
    canvas.set_line_width(Pt::from_f32(width));
    canvas.move_to(Pt::from_f32(attrs.x_start + dx), Pt::from_f32(attrs.y_start + dy));
    canvas.line_to(Pt::from_f32(attrs.x_end + dx), Pt::from_f32(attrs.y_end + dy));
    canvas.stroke();
    Ok(())
}

fn draw_rectangle(attrs: &RectAttrs, canvas: &mut Canvas) -> Result<(), CertError> {
    let stroke = stroke_of(attrs.stroke_color.as_deref(), attrs.stroke_width)?;
    let fill = match attrs.fill_color.as_deref() {
        Some(raw) => Some(parse_color(raw)?),
        None => None,
    };
    if stroke.is_none() && fill.is_none() {
        return Ok(());
    }
    if let Some((color, width)) = stroke {
        canvas.set_stroke_color(color);
        canvas.set_line_width(Pt::from_f32(width));
    }
    if let Some(color) = fill {
        canvas.set_fill_color(color);
    }
    canvas.rect(
        Pt::from_f32(attrs.x),
        Pt::from_f32(attrs.y),
        Pt::from_f32(attrs.width),
        Pt::from_f32(attrs.height),
    );
    match (stroke.is_some(), fill.is_some()) {
        (true, true) => canvas.fill_stroke(),
        (true, false) => canvas.stroke(),
        _ => canvas.fill(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::coverage::GlyphCoverageTable;
    use crate::types::PageGeometry;
    use std::sync::Arc;

    struct Fixture {
        registry: FontRegistry,
        resolver: FontResolver,
        images: ImageCache,
        dir: tempfile::TempDir,
        families: Vec<FontFamily>,
    }

    impl Fixture {
        fn new() -> Self {
            let ascii: Vec<u32> = (0x20u32..0x7f).collect();
            let coverage = GlyphCoverageTable::from_entries([
                ("Body-Light", ascii.clone()),
                ("Body-Bold", ascii.clone()),
                ("Display-Regular", ascii),
            ]);
            Self {
                registry: FontRegistry::new(),
                resolver: FontResolver::new(Arc::new(coverage)),
                images: ImageCache::new(),
                dir: tempfile::tempdir().expect("tempdir"),
                families: vec![FontFamily::from_config("Body", "Light")],
            }
        }

        fn interpreter(&self) -> Interpreter<'_> {
            Interpreter::new(
                &self.registry,
                &self.resolver,
                &self.images,
                self.dir.path(),
                &self.families,
            )
        }

        fn write_png(&self, name: &str, width: u32, height: u32) {
            let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
            img.save(self.dir.path().join(name)).expect("png written");
        }
    }

    fn steps(raw: &str) -> Vec<ThemeStep> {
        serde_json::from_str(raw).expect("steps")
    }

    fn render(fixture: &Fixture, stage: &Stage, ctx: &RenderContext) -> Vec<Command> {
        let mut canvas = Canvas::new(PageGeometry::LandscapeA4.size());
        fixture
            .interpreter()
            .render(stage, ctx, &mut canvas)
            .expect("render");
        canvas.finish().pages.remove(0).commands
    }

    fn strings(commands: &[Command]) -> Vec<(String, Pt, Pt)> {
        commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::DrawString { x, y, text } => Some((text.clone(), *x, *y)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn substituted_text_is_top_aligned_in_its_box() {
        let fixture = Fixture::new();
        let stage = Stage::new(
            "course_information",
            steps(r#"[{"text": {"string": "{student_name}", "x": 100, "y": 200,
                        "width": 400, "height": 50, "font_size": 20, "leading": 24}}]"#),
        )
        .substituted();
        let ctx = RenderContext {
            student_name: "Ada".to_string(),
            ..RenderContext::default()
        };
        let drawn = strings(&render(&fixture, &stage, &ctx));
        // Block height 24 sits at 200 + (50 - 24); first baseline one font size below its top.
        assert_eq!(
            drawn,
            vec![("Ada".to_string(), Pt::from_i32(100), Pt::from_i32(230))]
        );
    }

    #[test]
    fn unsubstituted_stages_draw_braces_verbatim() {
        let fixture = Fixture::new();
        let stage = Stage::new(
            "certificate_theme",
            steps(r#"[{"text": {"string": "{student_name}", "width": 400, "height": 20}}]"#),
        );
        let drawn = strings(&render(&fixture, &stage, &RenderContext::default()));
        assert_eq!(drawn[0].0, "{student_name}");
    }

    #[test]
    fn unknown_placeholders_fail_the_stage() {
        let fixture = Fixture::new();
        let stage = Stage::new(
            "flair",
            steps(r#"[{"text": {"string": "{nope}", "width": 400, "height": 20}}]"#),
        )
        .substituted();
        let mut canvas = Canvas::new(PageGeometry::LandscapeA4.size());
        let err = fixture
            .interpreter()
            .render(&stage, &RenderContext::default(), &mut canvas)
            .expect_err("unknown placeholder");
        assert!(matches!(err, CertError::UnknownPlaceholder(_)));
    }

    #[test]
    fn anchored_blocks_stack_and_skip_missing_keys() {
        let fixture = Fixture::new();
        fixture.write_png("sig.png", 100, 50);
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), "Prof. Ada".to_string());
        fields.insert("signature_file".to_string(), "sig.png".to_string());
        let stage = Stage::new(
            "instructors",
            steps(
                r#"[
                {"image": {"key": "signature_file", "width": 80}},
                {"text": {"key": "title", "width": 200, "height": 15}},
                {"text": {"key": "name", "x": 5, "width": 200, "height": 20, "leading": 20}},
                {"line": {"x_start": 0, "y_start": 0, "x_end": 200, "y_end": 0, "stroke_width": 1}}
            ]"#,
            ),
        )
        .anchored(Anchor {
            x: 300.0,
            y: 100.0,
            signature_y_offset: 6.0,
            fields,
        });
        let commands = render(&fixture, &stage, &RenderContext::default());

        let image = commands
            .iter()
            .find_map(|cmd| match cmd {
                Command::DrawImage { x, y, width, height, .. } => Some((*x, *y, *width, *height)),
                _ => None,
            })
            .expect("image drawn");
        assert_eq!(
            image,
            (Pt::from_i32(300), Pt::from_i32(106), Pt::from_i32(80), Pt::from_i32(40))
        );

        // Running y: 100 + 6 + 40 = 146; the missing title is skipped without advancing.
        let drawn = strings(&commands);
        assert_eq!(drawn.len(), 1);
        assert_eq!(drawn[0].0, "Prof. Ada");
        assert_eq!(drawn[0].1, Pt::from_i32(305));
        // Box 146..166, block height 20 at 146, baseline 166 - 12.
        assert_eq!(drawn[0].2, Pt::from_i32(154));

        let line_start = commands
            .iter()
            .find_map(|cmd| match cmd {
                Command::MoveTo { x, y } => Some((*x, *y)),
                _ => None,
            })
            .expect("line drawn");
        assert_eq!(line_start, (Pt::from_i32(300), Pt::from_i32(166)));
    }

    #[test]
    fn anchored_blocks_ignore_rectangles() {
        let fixture = Fixture::new();
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), "Prof. Ada".to_string());
        let stage = Stage::new(
            "instructors",
            steps(
                r##"[
                {"rectangle": {"x": 0, "y": 0, "width": 50, "height": 10, "fill_color": "#ff0000"}},
                {"text": {"key": "name", "width": 200, "height": 20}}
            ]"##,
            ),
        )
        .anchored(Anchor {
            x: 300.0,
            y: 100.0,
            signature_y_offset: 0.0,
            fields,
        });
        let commands = render(&fixture, &stage, &RenderContext::default());
        assert!(!commands.iter().any(|cmd| matches!(cmd, Command::Rect { .. })));
        assert_eq!(strings(&commands)[0].0, "Prof. Ada");
    }

    #[test]
    fn autoscaled_text_is_centered_vertically() {
        let fixture = Fixture::new();
        let stage = Stage::new(
            "names",
            steps(r#"[{"text": {"string": "Ada", "x": 0, "y": 100, "width": 500,
                        "height": 60, "font_size": 30, "leading": 30, "auto_scale": true}}]"#),
        );
        let drawn = strings(&render(&fixture, &stage, &RenderContext::default()));
        // y = 100 + (60 - 30) / 2 + 30 / 5 = 121; baseline = 121 + 30 - 30.
        assert_eq!(drawn[0].2, Pt::from_i32(121));
    }

    #[test]
    fn element_font_overrides_course_family() {
        let fixture = Fixture::new();
        let stage = Stage::new(
            "theme",
            steps(r#"[{"text": {"string": "Title", "width": 300, "height": 20,
                        "font": {"name": "Display", "type": "Regular"}}}]"#),
        );
        let commands = render(&fixture, &stage, &RenderContext::default());
        assert!(commands
            .iter()
            .any(|cmd| matches!(cmd, Command::SetFontName(name) if name == "Display-Regular")));
    }

    #[test]
    fn shapes_need_stroke_or_fill() {
        let fixture = Fixture::new();
        let stage = Stage::new(
            "theme",
            steps(r##"[
                {"rectangle": {"x": 0, "y": 0, "width": 10, "height": 10}},
                {"line": {"x_start": 0, "y_start": 0, "x_end": 10, "y_end": 0}},
                {"rectangle": {"x": 1, "y": 1, "width": 5, "height": 5, "fill_color": "#ff0000"}}
            ]"##),
        );
        let commands = render(&fixture, &stage, &RenderContext::default());
        let rects = commands
            .iter()
            .filter(|cmd| matches!(cmd, Command::Rect { .. }))
            .count();
        assert_eq!(rects, 1);
        assert!(!commands.iter().any(|cmd| matches!(cmd, Command::MoveTo { .. })));
        assert!(commands.contains(&Command::Fill));
    }

    #[test]
    fn uncovered_text_is_a_content_error() {
        let fixture = Fixture::new();
        let stage = Stage::new(
            "theme",
            steps(r#"[{"text": {"string": "Bob\u0007", "width": 300, "height": 20}}]"#),
        );
        let mut canvas = Canvas::new(PageGeometry::LandscapeA4.size());
        let err = fixture
            .interpreter()
            .render(&stage, &RenderContext::default(), &mut canvas)
            .expect_err("no font");
        assert_eq!(err.kind(), crate::error::ErrorKind::Content);
    }
}

mod assets;
mod canvas;
mod compose;
mod config;
mod context;
mod coverage;
mod error;
mod font;
mod generator;
mod glyph_report;
mod interpreter;
mod layout;
mod layouts;
mod markup;
mod naming;
mod pdf;
mod publish;
mod resolver;
mod style;
mod template;
mod theme;
mod types;
mod verify;

pub use assets::{ImageAsset, ImageCache};
pub use canvas::{Canvas, Command, Document, Page};
pub use compose::{BlankPages, Compositor};
pub use config::{
    CourseCatalog, CourseConfig, CourseKey, DEFAULT_VERSION, Designation, EngineSettings,
    FontConfig, IssueDatePolicy, TemplatePdf, Translation,
};
pub use context::{Phrases, RenderContext, Student, cert_date, format_date, interstitial_for};
pub use coverage::GlyphCoverageTable;
pub use error::{CertError, ErrorKind};
pub use font::{FontMetrics, FontRegistry, RegisteredFont, ShapedGlyph};
pub use generator::{CourseSession, GeneratedArtifact, RenderState};
pub use glyph_report::{GlyphCoverageReport, MissingGlyph};
pub use interpreter::{Anchor, Interpreter, Stage};
pub use layout::{LaidOutBlock, Line, PlacedRun, TextMeasure, fit, layout_paragraph};
pub use layouts::{Layout, TemplateVersion, dispatch, layout_for};
pub use pdf::render_overlay;
pub use resolver::{FontChoice, FontFamily, FontResolver};
pub use style::{Alignment, TextStyle, TextStyleBuilder};
pub use template::substitute;
pub use theme::{
    FlairBlock, FlairPosition, ImageAttrs, InstructorBlock, InstructorEntry, LineAttrs,
    RectAttrs, TextAttrs, ThemeStep,
};
pub use types::{Color, PageGeometry, Pt, Size};
pub use verify::{PageValues, Signer, Verifier, verify_detached};

use std::path::PathBuf;
use std::sync::Arc;

/// Shared, immutable engine: fonts, coverage, blank pages and the signing key are loaded
/// once by [`CertEngineBuilder::build`] and reused by every session.
pub struct CertEngine {
    settings: EngineSettings,
    catalog: CourseCatalog,
    registry: Arc<FontRegistry>,
    resolver: FontResolver,
    images: Arc<ImageCache>,
    compositor: Compositor,
    signer: Option<Arc<Signer>>,
}

pub struct CertEngineBuilder {
    settings: EngineSettings,
    catalog: CourseCatalog,
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
    font_bytes: Vec<(String, Vec<u8>)>,
    signer: Option<Signer>,
}

impl CertEngine {
    pub fn builder() -> CertEngineBuilder {
        CertEngineBuilder::new()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &CourseCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &FontRegistry {
        &self.registry
    }

    pub fn coverage(&self) -> &GlyphCoverageTable {
        self.resolver.coverage()
    }

    pub fn resolver(&self) -> &FontResolver {
        &self.resolver
    }

    pub fn images(&self) -> &ImageCache {
        &self.images
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn signer(&self) -> Option<&Signer> {
        self.signer.as_deref()
    }

    /// Resolves the course (through its subtemplate for `designation`), dispatches its
    /// template version and prepares the layout. Nothing is written yet.
    pub fn session(
        &self,
        course_id: &str,
        designation: Option<&str>,
    ) -> Result<CourseSession<'_>, CertError> {
        CourseSession::open(self, course_id, designation)
    }

    /// One-shot render: opens a session and renders a single student.
    pub fn render(
        &self,
        course_id: &str,
        designation: Option<&str>,
        student: &Student,
    ) -> Result<GeneratedArtifact, CertError> {
        self.session(course_id, designation)?.render(student)
    }
}

impl CertEngineBuilder {
    pub fn new() -> Self {
        Self {
            settings: EngineSettings::default(),
            catalog: CourseCatalog::default(),
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            font_bytes: Vec::new(),
            signer: None,
        }
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn catalog(mut self, catalog: CourseCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn template_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.template_dir = path.into();
        self
    }

    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.output_dir = path.into();
        self
    }

    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    pub fn register_font_bytes(mut self, id: impl Into<String>, data: Vec<u8>) -> Self {
        self.font_bytes.push((id.into(), data));
        self
    }

    /// Overrides the key named by `signing_key_file`.
    pub fn signer(mut self, signer: Signer) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn build(self) -> Result<CertEngine, CertError> {
        self.catalog.validate()?;

        let mut registry = FontRegistry::new();
        let font_dir = self.settings.font_dir();
        if font_dir.is_dir() {
            let count = registry.register_dir(&font_dir);
            log::debug!("registered {count} fonts from {}", font_dir.display());
        } else {
            log::warn!("font directory {} does not exist", font_dir.display());
        }
        for dir in &self.font_dirs {
            registry.register_dir(dir);
        }
        for file in &self.font_files {
            if registry.register_file(file).is_none() {
                log::warn!("skipped font file {}", file.display());
            }
        }
        for (id, data) in self.font_bytes {
            registry.register_bytes(data, &id)?;
        }

        let coverage = Arc::new(GlyphCoverageTable::from_registry(&registry));
        log::info!(
            "font coverage ready: {} fonts, {} coverage entries",
            registry.len(),
            coverage.len()
        );
        let blanks = Arc::new(BlankPages::load(&self.settings.template_dir)?);

        let signer = match (self.signer, &self.settings.signing_key_file) {
            (Some(signer), _) => Some(signer),
            (None, Some(path)) => match Signer::load(path, self.settings.key_id.clone()) {
                Ok(signer) => Some(signer),
                Err(err) => {
                    log::error!("{err}; certificates will be issued without verification");
                    None
                }
            },
            (None, None) => {
                log::info!("no signing key configured; verification is disabled");
                None
            }
        };

        Ok(CertEngine {
            settings: self.settings,
            catalog: self.catalog,
            registry: Arc::new(registry),
            resolver: FontResolver::new(coverage),
            images: Arc::new(ImageCache::new()),
            compositor: Compositor::new(blanks),
            signer: signer.map(Arc::new),
        })
    }
}

impl Default for CertEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn engine_is_shareable_across_threads() {
        assert_send_sync::<CertEngine>();
    }

    #[test]
    fn invalid_catalogs_fail_the_build() {
        let raw = r#"{"a/b/c": {"subtemplates": {"MD": "missing/course/id"}}}"#;
        let catalog: CourseCatalog = serde_json::from_str(raw).expect("parse");
        let dir = tempfile::tempdir().expect("tempdir");
        let err = CertEngine::builder()
            .template_dir(dir.path())
            .catalog(catalog)
            .build()
            .err()
            .expect("invalid");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn unknown_courses_and_versions_fail_before_rendering() {
        let raw = r#"{"a/b/c": {"version": "v9"}}"#;
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = CertEngine::builder()
            .template_dir(dir.path())
            .output_dir(dir.path().join("out"))
            .catalog(CourseCatalog::from_json(raw).expect("catalog"))
            .build()
            .expect("engine");
        assert!(engine.signer().is_none());
        assert!(matches!(
            engine.session("x/y/z", None).err(),
            Some(CertError::UnknownCourse(_))
        ));
        assert!(matches!(
            engine.session("a/b/c", None).err(),
            Some(CertError::UnknownTemplateVersion { .. })
        ));
        assert!(!dir.path().join("out").exists());
    }
}

//! Per-course render sessions and the artifacts they produce.

use crate::CertEngine;
use crate::canvas::Canvas;
use crate::config::CourseConfig;
use crate::context::{self, ContextInputs, Student};
use crate::error::CertError;
use crate::interpreter::Interpreter;
use crate::layouts::{self, Layout, TemplateVersion};
use crate::markup;
use crate::naming;
use crate::pdf;
use crate::resolver::FontFamily;
use crate::verify::{PageValues, Verifier};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Dispatched,
    Drawing,
    Composited,
    Verifying,
    Done,
    Failed,
}

struct Transitions<'a> {
    course_id: &'a str,
    state: RenderState,
}

impl Transitions<'_> {
    fn advance(&mut self, next: RenderState) {
        log::debug!("{}: {:?} -> {:?}", self.course_id, self.state, next);
        self.state = next;
    }
}

/// Files and URLs for one rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub download_id: String,
    /// Empty when verification is off or failed.
    pub verify_id: String,
    pub download_url: String,
    pub verify_url: String,
    pub document_path: PathBuf,
    pub verify_dir: Option<PathBuf>,
    pub(crate) output_dir: PathBuf,
    pub(crate) download_rel: PathBuf,
    pub(crate) verify_rel: Option<PathBuf>,
}

impl GeneratedArtifact {
    /// `(download_id, verify_id, download_url)` as handed back to the request queue.
    pub fn triple(&self) -> (&str, &str, &str) {
        (&self.download_id, &self.verify_id, &self.download_url)
    }
}

/// A course resolved to its configuration, template version and layout. Cheap to render
/// repeatedly; a queue worker keeps one while requests target the same course.
pub struct CourseSession<'e> {
    engine: &'e CertEngine,
    course_id: String,
    designation: Option<String>,
    config: &'e CourseConfig,
    layout: Layout,
    families: Vec<FontFamily>,
}

impl<'e> CourseSession<'e> {
    pub(crate) fn open(
        engine: &'e CertEngine,
        course_id: &str,
        designation: Option<&str>,
    ) -> Result<Self, CertError> {
        let catalog = engine.catalog();
        let effective = catalog.resolve_subtemplate(course_id, designation)?;
        let config = catalog.get(effective)?;
        let version = layouts::dispatch(effective, config)?;
        let layout = layouts::layout_for(version, course_id, config, engine.settings())?;
        log::debug!(
            "{course_id}: {:?} (version {}, {} stages)",
            RenderState::Dispatched,
            version.as_str(),
            layout.stages.len()
        );

        let mut families = vec![FontFamily::from_config(
            &config.font.name,
            &config.font.face_type,
        )];
        families.extend(
            engine
                .settings()
                .fallback_fonts
                .iter()
                .map(|name| FontFamily::single(name)),
        );

        Ok(Self {
            engine,
            course_id: course_id.to_string(),
            designation: designation.map(str::to_string),
            config,
            layout,
            families,
        })
    }

    pub fn course_id(&self) -> &str {
        &self.course_id
    }

    pub fn designation(&self) -> Option<&str> {
        self.designation.as_deref()
    }

    pub fn version(&self) -> TemplateVersion {
        self.layout.version
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Whether this session can serve a request for `course_id` and `designation`.
    pub fn is_reusable(&self, course_id: &str, designation: Option<&str>) -> bool {
        self.course_id == course_id && self.designation.as_deref() == designation
    }

    /// Verification needs the course flag, a layout that verifies and a signing key.
    pub fn verifies(&self) -> bool {
        self.config.verify && self.layout.version.can_verify() && self.engine.signer().is_some()
    }

    pub fn render(&self, student: &Student) -> Result<GeneratedArtifact, CertError> {
        let settings = self.engine.settings();
        let download_id = naming::new_identifier();
        let verify_id = if self.verifies() {
            naming::new_identifier()
        } else {
            String::new()
        };
        let mut transitions = Transitions {
            course_id: &self.course_id,
            state: RenderState::Dispatched,
        };

        match self.render_inner(student, &download_id, verify_id, &mut transitions) {
            Ok(artifact) => {
                transitions.advance(RenderState::Done);
                Ok(artifact)
            }
            Err(err) => {
                transitions.advance(RenderState::Failed);
                log::error!("{}: render failed: {err}", self.course_id);
                remove_dir(&settings.output_dir.join(naming::download_rel_dir(settings, &download_id)));
                Err(err)
            }
        }
    }

    fn render_inner(
        &self,
        student: &Student,
        download_id: &str,
        mut verify_id: String,
        transitions: &mut Transitions<'_>,
    ) -> Result<GeneratedArtifact, CertError> {
        let engine = self.engine;
        let settings = engine.settings();
        let config = self.config;

        transitions.advance(RenderState::Drawing);
        let today = chrono::Utc::now().date_naive();
        let inputs = ContextInputs {
            course_id: &self.course_id,
            config,
            settings,
            student,
            verify_id: &verify_id,
            today,
        };
        let (mut ctx, phrases) = context::base_context(&inputs);
        layouts::apply_variant(
            self.layout.version,
            config,
            &self.course_id,
            student.grade.as_deref(),
            self.designation.as_deref(),
            &phrases,
            &mut ctx,
        )?;

        let mut canvas = Canvas::new(self.layout.geometry.size());
        let interpreter = Interpreter::new(
            engine.registry(),
            engine.resolver(),
            engine.images(),
            &settings.template_dir,
            &self.families,
        );
        for stage in &self.layout.stages {
            interpreter.render(stage, &ctx, &mut canvas)?;
        }
        let overlay = pdf::render_overlay(&canvas.finish(), engine.registry())?;

        transitions.advance(RenderState::Composited);
        let document_path = naming::document_path(settings, download_id, &self.layout.filename);
        engine.compositor().compose(
            &overlay,
            self.layout.template.as_deref(),
            self.layout.geometry,
            &document_path,
        )?;

        let download_url = naming::download_url(settings, download_id, &self.layout.filename);
        let mut verify_dir = None;
        if !verify_id.is_empty() {
            transitions.advance(RenderState::Verifying);
            let values = PageValues {
                course: config.course_short(&self.course_id),
                course_long: config
                    .long_course
                    .clone()
                    .unwrap_or_else(|| config.course_short(&self.course_id)),
                org: config.org_short(&self.course_id),
                org_long: config
                    .long_org
                    .clone()
                    .unwrap_or_else(|| config.org_short(&self.course_id)),
                name: markup::escape(&student.name),
                issue_date: ctx.date_string.clone(),
                certificate_type: self.layout.certificate_type.to_string(),
                certs_are_called: ctx.cert_label.clone(),
                certs_are_called_plural: config
                    .certs_are_called_plural
                    .clone()
                    .unwrap_or_else(|| settings.certs_are_called_plural.clone()),
                download_url: download_url.clone(),
            };
            let signed = engine.signer().map(|signer| {
                Verifier::new(signer, settings, self.layout.version.page_set())
                    .sign_and_publish(&document_path, &verify_id, &values)
            });
            match signed {
                Some(Ok(dir)) => verify_dir = Some(dir),
                Some(Err(err)) => {
                    log::warn!("{}: verification dropped: {err}", self.course_id);
                    verify_id.clear();
                }
                None => verify_id.clear(),
            }
        }

        let verify_url = if verify_id.is_empty() {
            String::new()
        } else {
            naming::verify_url(settings, &verify_id)
        };
        let verify_rel = (!verify_id.is_empty()).then(|| naming::verify_rel_dir(settings, &verify_id));
        Ok(GeneratedArtifact {
            download_id: download_id.to_string(),
            verify_id,
            download_url,
            verify_url,
            document_path,
            verify_dir,
            output_dir: settings.output_dir.clone(),
            download_rel: naming::download_rel_dir(settings, download_id),
            verify_rel,
        })
    }
}

pub(crate) fn remove_dir(path: &Path) {
    if !path.exists() {
        return;
    }
    match fs::remove_dir_all(path) {
        Ok(()) => log::debug!("removed {}", path.display()),
        Err(err) => log::warn!("cannot remove {}: {err}", path.display()),
    }
}

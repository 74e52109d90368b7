use crate::error::CertError;
use crate::theme::{FlairBlock, InstructorEntry, ThemeStep};
use crate::types::PageGeometry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_VERSION: &str = "4_programmatic";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontConfig {
    #[serde(default = "default_font_name")]
    pub name: String,
    #[serde(rename = "type", default = "default_font_type")]
    pub face_type: String,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            name: default_font_name(),
            face_type: default_font_type(),
        }
    }
}

fn default_font_name() -> String {
    "OpenSans".to_string()
}

fn default_font_type() -> String {
    "Light".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Designation {
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub credits: String,
}

/// Course-level overrides of the built-in certificate phrases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_interstitial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disclaimer_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_text: Option<String>,
}

/// Which date goes on the document: today (`ROLLING`, or nothing configured) or a fixed
/// configured value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum IssueDatePolicy {
    #[default]
    Rolling,
    Fixed(String),
}

impl From<Option<String>> for IssueDatePolicy {
    fn from(value: Option<String>) -> Self {
        match value.map(|raw| raw.trim().to_string()) {
            None => IssueDatePolicy::Rolling,
            Some(raw) if raw.is_empty() || raw == "ROLLING" => IssueDatePolicy::Rolling,
            Some(raw) => IssueDatePolicy::Fixed(raw),
        }
    }
}

impl From<IssueDatePolicy> for Option<String> {
    fn from(value: IssueDatePolicy) -> Self {
        match value {
            IssueDatePolicy::Rolling => Some("ROLLING".to_string()),
            IssueDatePolicy::Fixed(raw) => Some(raw),
        }
    }
}

/// Institution template PDF selection. `false` in configuration disables compositing a
/// template; a string names a file; absent means the per-course default file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum TemplatePdf {
    #[default]
    Default,
    Disabled,
    Named(String),
}

impl TryFrom<Value> for TemplatePdf {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null | Value::Bool(true) => Ok(TemplatePdf::Default),
            Value::Bool(false) => Ok(TemplatePdf::Disabled),
            Value::String(name) if name.trim().is_empty() => Ok(TemplatePdf::Default),
            Value::String(name) => Ok(TemplatePdf::Named(name)),
            other => Err(format!("template_file must be a string or false, got {other}")),
        }
    }
}

impl From<TemplatePdf> for Value {
    fn from(value: TemplatePdf) -> Self {
        match value {
            TemplatePdf::Default => Value::Null,
            TemplatePdf::Disabled => Value::Bool(false),
            TemplatePdf::Named(name) => Value::String(name),
        }
    }
}

/// Per-course configuration. Upper-case key spellings are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseConfig {
    #[serde(default = "default_version", alias = "VERSION")]
    pub version: String,
    #[serde(default, alias = "LONG_ORG")]
    pub long_org: Option<String>,
    #[serde(default, alias = "LONG_COURSE")]
    pub long_course: Option<String>,
    #[serde(default, alias = "ORG")]
    pub org: Option<String>,
    #[serde(default, alias = "COURSE")]
    pub course: Option<String>,
    #[serde(default, alias = "ISSUED_DATE")]
    pub issued_date: IssueDatePolicy,
    #[serde(default)]
    pub locale: Option<String>,
    /// Accepted for compatibility; dates are rendered without timezone conversion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default)]
    pub font: FontConfig,
    #[serde(default)]
    pub interstitial: BTreeMap<String, String>,
    #[serde(default = "default_true", alias = "VERIFY")]
    pub verify: bool,
    #[serde(default)]
    pub designations: BTreeMap<String, Designation>,
    #[serde(default, alias = "CREDITS")]
    pub credits: Option<String>,
    #[serde(default, alias = "HAS_DISCLAIMER")]
    pub has_disclaimer: bool,
    #[serde(default)]
    pub certificate_theme: Vec<ThemeStep>,
    #[serde(default)]
    pub instructors: Vec<InstructorEntry>,
    #[serde(default)]
    pub flair: Vec<FlairBlock>,
    #[serde(default)]
    pub course_information: Vec<ThemeStep>,
    #[serde(default)]
    pub translations: BTreeMap<String, Translation>,
    #[serde(default, alias = "TEMPLATEFILE")]
    pub template_file: TemplatePdf,
    #[serde(default, alias = "CERTS_ARE_CALLED")]
    pub certs_are_called: Option<String>,
    #[serde(default, alias = "CERTS_ARE_CALLED_PLURAL")]
    pub certs_are_called_plural: Option<String>,
    #[serde(default)]
    pub subtemplates: BTreeMap<String, String>,
    #[serde(default)]
    pub page: Option<String>,
    /// Text color for the fixed legacy layouts.
    #[serde(default)]
    pub color: Option<String>,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for CourseConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            long_org: None,
            long_course: None,
            org: None,
            course: None,
            issued_date: IssueDatePolicy::Rolling,
            locale: None,
            timezone: None,
            font: FontConfig::default(),
            interstitial: BTreeMap::new(),
            verify: true,
            designations: BTreeMap::new(),
            credits: None,
            has_disclaimer: false,
            certificate_theme: Vec::new(),
            instructors: Vec::new(),
            flair: Vec::new(),
            course_information: Vec::new(),
            translations: BTreeMap::new(),
            template_file: TemplatePdf::Default,
            certs_are_called: None,
            certs_are_called_plural: None,
            subtemplates: BTreeMap::new(),
            page: None,
            color: None,
        }
    }
}

impl CourseConfig {
    /// Configured page geometry; `None` lets the layout pick its own.
    pub fn page_geometry(&self, course_id: &str) -> Result<Option<PageGeometry>, CertError> {
        let Some(raw) = self.page.as_deref() else {
            return Ok(None);
        };
        match PageGeometry::parse(raw) {
            Some(geometry) => Ok(Some(geometry)),
            None => {
                let err = CertError::InvalidConfiguration(format!(
                    "unknown page geometry '{raw}' for course {course_id}"
                ));
                log::error!("{err}");
                Err(err)
            }
        }
    }

    pub fn org_short(&self, course_id: &str) -> String {
        self.org
            .clone()
            .or_else(|| CourseKey::parse(course_id).map(|key| key.org))
            .unwrap_or_default()
    }

    pub fn course_short(&self, course_id: &str) -> String {
        self.course
            .clone()
            .or_else(|| CourseKey::parse(course_id).map(|key| key.course))
            .unwrap_or_default()
    }
}

/// The parts of a course identifier: `course-v1:Org+Course+Run` or `Org/Course/Run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseKey {
    pub org: String,
    pub course: String,
    pub run: String,
}

impl CourseKey {
    pub fn parse(course_id: &str) -> Option<Self> {
        let parts: Vec<&str> = match course_id.split_once(':') {
            Some((_, rest)) => rest.split('+').collect(),
            None => course_id.split('/').collect(),
        };
        match parts.as_slice() {
            [org, course, run, ..] if !org.is_empty() && !course.is_empty() => Some(Self {
                org: org.to_string(),
                course: course.to_string(),
                run: run.to_string(),
            }),
            _ => None,
        }
    }
}

/// Course configurations keyed by course id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseCatalog {
    courses: BTreeMap<String, CourseConfig>,
}

impl CourseCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CertError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            log::error!("cannot read course catalog {}: {err}", path.display());
            CertError::Io(err)
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CertError> {
        let catalog: CourseCatalog = serde_json::from_str(raw).map_err(|err| {
            let err = CertError::InvalidConfiguration(format!("course catalog: {err}"));
            log::error!("{err}");
            err
        })?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn insert(&mut self, course_id: impl Into<String>, config: CourseConfig) {
        self.courses.insert(course_id.into(), config);
    }

    pub fn get(&self, course_id: &str) -> Result<&CourseConfig, CertError> {
        self.courses.get(course_id).ok_or_else(|| {
            let err = CertError::UnknownCourse(course_id.to_string());
            log::error!("{err}");
            err
        })
    }

    pub fn contains(&self, course_id: &str) -> bool {
        self.courses.contains_key(course_id)
    }

    pub fn course_ids(&self) -> impl Iterator<Item = &str> {
        self.courses.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    /// Every subtemplate must point at a course present in the catalog.
    pub fn validate(&self) -> Result<(), CertError> {
        for (course_id, config) in &self.courses {
            for (designation, target) in &config.subtemplates {
                if !self.courses.contains_key(target) {
                    let err = CertError::InvalidConfiguration(format!(
                        "course {course_id} maps designation '{designation}' to unknown course {target}"
                    ));
                    log::error!("{err}");
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Course id used for a request: the subtemplate registered for the designation, or
    /// the course itself.
    pub fn resolve_subtemplate<'a>(
        &'a self,
        course_id: &'a str,
        designation: Option<&str>,
    ) -> Result<&'a str, CertError> {
        let config = self.get(course_id)?;
        let target = designation
            .and_then(|designation| config.subtemplates.get(designation))
            .map(String::as_str);
        match target {
            Some(target) => {
                log::debug!("course {course_id} uses subtemplate {target}");
                self.get(target)?;
                Ok(target)
            }
            None => Ok(course_id),
        }
    }
}

/// Process-level settings: paths, URLs, signing key and defaults shared by every course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub template_dir: PathBuf,
    /// Defaults to `{template_dir}/fonts`.
    pub font_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub download_url: String,
    pub verify_url: String,
    pub cert_path: String,
    pub verify_path: String,
    pub filename: String,
    pub fallback_fonts: Vec<String>,
    pub default_locale: String,
    pub certs_are_called: String,
    pub certs_are_called_plural: String,
    /// Hex-encoded Ed25519 seed, or 32 raw bytes.
    pub signing_key_file: Option<PathBuf>,
    pub key_id: Option<String>,
    pub web_root: Option<PathBuf>,
    pub default_translations: BTreeMap<String, Translation>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from("template_data"),
            font_dir: None,
            output_dir: PathBuf::from("out"),
            download_url: "http://localhost".to_string(),
            verify_url: "http://localhost".to_string(),
            cert_path: "downloads".to_string(),
            verify_path: "cert".to_string(),
            filename: "Certificate.pdf".to_string(),
            fallback_fonts: vec!["Arial Unicode".to_string()],
            default_locale: "en_US".to_string(),
            certs_are_called: "certificate".to_string(),
            certs_are_called_plural: "certificates".to_string(),
            signing_key_file: None,
            key_id: None,
            web_root: None,
            default_translations: BTreeMap::new(),
        }
    }
}

impl EngineSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CertError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            log::error!("cannot read engine settings {}: {err}", path.display());
            CertError::Io(err)
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CertError> {
        serde_json::from_str(raw).map_err(|err| {
            let err = CertError::InvalidConfiguration(format!("engine settings: {err}"));
            log::error!("{err}");
            err
        })
    }

    pub fn font_dir(&self) -> PathBuf {
        self.font_dir
            .clone()
            .unwrap_or_else(|| self.template_dir.join("fonts"))
    }

    /// Applies `CERTSTAMP_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_overrides(|name| std::env::var(name).ok());
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(url) = get("CERTSTAMP_DOWNLOAD_URL") {
            self.download_url = url;
        }
        if let Some(url) = get("CERTSTAMP_VERIFY_URL") {
            self.verify_url = url;
        }
        if let Some(dir) = get("CERTSTAMP_TEMPLATE_DIR") {
            self.template_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("CERTSTAMP_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(file) = get("CERTSTAMP_KEY_FILE") {
            self.signing_key_file = Some(PathBuf::from(file));
        }
        if let Some(dir) = get("CERTSTAMP_WEB_ROOT") {
            self.web_root = Some(PathBuf::from(dir));
        }
    }
}

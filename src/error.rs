use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Content,
    Signing,
    Io,
}

#[derive(Debug, Error)]
pub enum CertError {
    #[error("unknown course: {0}")]
    UnknownCourse(String),
    #[error("unknown template version '{version}' for course {course_id}")]
    UnknownTemplateVersion { course_id: String, version: String },
    #[error("missing required course configuration key {key} for course {course_id}")]
    MissingConfigKey { course_id: String, key: String },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("unknown placeholder {{{0}}} in template text")]
    UnknownPlaceholder(String),
    #[error("template pdf {path} cannot be read: {message}")]
    TemplateUnreadable { path: PathBuf, message: String },
    #[error("nothing in font list [{}] supports string '{text}' (missing {})", fonts.join(", "), format_codepoints(missing))]
    NoFontCoversText {
        text: String,
        fonts: Vec<String>,
        missing: Vec<u32>,
    },
    #[error("signing error: {0}")]
    Signing(String),
    #[error("image error: {0}")]
    Image(String),
    #[error("pdf error: {0}")]
    Pdf(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CertError::UnknownCourse(_)
            | CertError::UnknownTemplateVersion { .. }
            | CertError::MissingConfigKey { .. }
            | CertError::InvalidConfiguration(_)
            | CertError::UnknownPlaceholder(_)
            | CertError::TemplateUnreadable { .. } => ErrorKind::Configuration,
            CertError::NoFontCoversText { .. } => ErrorKind::Content,
            CertError::Signing(_) => ErrorKind::Signing,
            CertError::Image(_) | CertError::Pdf(_) | CertError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn missing_key(course_id: &str, key: &str) -> Self {
        CertError::MissingConfigKey {
            course_id: course_id.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<lopdf::Error> for CertError {
    fn from(value: lopdf::Error) -> Self {
        CertError::Pdf(value.to_string())
    }
}

fn format_codepoints(codepoints: &[u32]) -> String {
    codepoints
        .iter()
        .map(|cp| format!("U+{cp:04X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

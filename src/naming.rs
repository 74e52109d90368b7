//! Identifiers, artifact paths and public URLs.

use crate::config::EngineSettings;
use std::path::PathBuf;
use uuid::Uuid;

/// Fresh 32-hex-digit identifier for a download or verification directory.
pub fn new_identifier() -> String {
    Uuid::new_v4().simple().to_string()
}

fn base(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// `{download_url}/{cert_path}/{download_id}/{filename}`
pub fn download_url(settings: &EngineSettings, download_id: &str, filename: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        base(&settings.download_url),
        settings.cert_path,
        download_id,
        filename
    )
}

/// `{verify_url}/{verify_path}/{verify_id}`
pub fn verify_url(settings: &EngineSettings, verify_id: &str) -> String {
    format!(
        "{}/{}/{}",
        base(&settings.verify_url),
        settings.verify_path,
        verify_id
    )
}

pub fn verify_page_url(settings: &EngineSettings, verify_id: &str) -> String {
    format!("{}/verify.html", verify_url(settings, verify_id))
}

pub fn signature_file_name(filename: &str) -> String {
    format!("{filename}.sig")
}

pub fn signature_url(settings: &EngineSettings, verify_id: &str, filename: &str) -> String {
    format!(
        "{}/{}",
        verify_url(settings, verify_id),
        signature_file_name(filename)
    )
}

/// Directory holding the document for `download_id`, relative to the output root.
pub fn download_rel_dir(settings: &EngineSettings, download_id: &str) -> PathBuf {
    PathBuf::from(&settings.cert_path).join(download_id)
}

pub fn verify_rel_dir(settings: &EngineSettings, verify_id: &str) -> PathBuf {
    PathBuf::from(&settings.verify_path).join(verify_id)
}

pub fn document_path(settings: &EngineSettings, download_id: &str, filename: &str) -> PathBuf {
    settings
        .output_dir
        .join(download_rel_dir(settings, download_id))
        .join(filename)
}

pub fn verify_dir(settings: &EngineSettings, verify_id: &str) -> PathBuf {
    settings.output_dir.join(verify_rel_dir(settings, verify_id))
}

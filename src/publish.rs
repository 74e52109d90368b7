use crate::error::CertError;
use crate::generator::{GeneratedArtifact, remove_dir};
use std::fs;
use std::path::{Path, PathBuf};

fn copy_dir(src: &Path, dst: &Path) -> Result<(), CertError> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

impl GeneratedArtifact {
    fn rel_dirs(&self) -> Vec<&Path> {
        let mut dirs = vec![self.download_rel.as_path()];
        if let Some(verify) = &self.verify_rel {
            dirs.push(verify.as_path());
        }
        dirs
    }

    /// Copies the download and verification directories under `web_root`, keeping their
    /// relative paths so the public URLs resolve. Returns the copied directories.
    pub fn publish_to(&self, web_root: &Path) -> Result<Vec<PathBuf>, CertError> {
        let mut published = Vec::new();
        for rel in self.rel_dirs() {
            let src = self.output_dir.join(rel);
            let dst = web_root.join(rel);
            copy_dir(&src, &dst)?;
            log::info!("published {} to {}", src.display(), dst.display());
            published.push(dst);
        }
        Ok(published)
    }

    /// Removes the request's directories from the output root.
    pub fn cleanup(&self) {
        for rel in self.rel_dirs() {
            remove_dir(&self.output_dir.join(rel));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(root: &Path) -> GeneratedArtifact {
        let download = root.join("downloads/d1");
        let verify = root.join("cert/v1");
        fs::create_dir_all(&download).expect("mkdir");
        fs::create_dir_all(&verify).expect("mkdir");
        fs::write(download.join("Certificate.pdf"), b"pdf").expect("write");
        fs::write(verify.join("valid.html"), b"ok").expect("write");
        GeneratedArtifact {
            download_id: "d1".to_string(),
            verify_id: "v1".to_string(),
            download_url: "http://localhost/downloads/d1/Certificate.pdf".to_string(),
            verify_url: "http://localhost/cert/v1".to_string(),
            document_path: download.join("Certificate.pdf"),
            verify_dir: Some(verify),
            output_dir: root.to_path_buf(),
            download_rel: PathBuf::from("downloads/d1"),
            verify_rel: Some(PathBuf::from("cert/v1")),
        }
    }

    #[test]
    fn publish_keeps_relative_layout() {
        let out = tempfile::tempdir().expect("out");
        let web = tempfile::tempdir().expect("web");
        let artifact = artifact(out.path());
        let published = artifact.publish_to(web.path()).expect("publish");
        assert_eq!(published.len(), 2);
        assert!(web.path().join("downloads/d1/Certificate.pdf").is_file());
        assert!(web.path().join("cert/v1/valid.html").is_file());
    }

    #[test]
    fn cleanup_removes_request_directories() {
        let out = tempfile::tempdir().expect("out");
        let artifact = artifact(out.path());
        artifact.cleanup();
        assert!(!out.path().join("downloads/d1").exists());
        assert!(!out.path().join("cert/v1").exists());
        assert!(out.path().join("downloads").exists());
    }
}

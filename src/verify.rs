//! Detached signatures and the static verification pages published next to them.

use crate::config::EngineSettings;
use crate::error::CertError;
use crate::naming;
use crate::template;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const ARMOR_BEGIN: &str = "-----BEGIN CERTSTAMP SIGNATURE-----";
const ARMOR_END: &str = "-----END CERTSTAMP SIGNATURE-----";
const ARMOR_LINE: usize = 64;

/// Ed25519 signing key plus the identifier printed on verification pages.
pub struct Signer {
    key: SigningKey,
    key_id: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl Signer {
    /// `key_id` defaults to the first 16 hex digits of the public key's SHA-256.
    pub fn from_seed(seed: [u8; 32], key_id: Option<String>) -> Self {
        let key = SigningKey::from_bytes(&seed);
        let key_id = key_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| fingerprint(&key.verifying_key()));
        Self { key, key_id }
    }

    /// Reads a 32-byte seed, either raw or hex encoded.
    pub fn load(path: &Path, key_id: Option<String>) -> Result<Self, CertError> {
        let raw = fs::read(path).map_err(|err| {
            let err = CertError::Signing(format!("cannot read key {}: {err}", path.display()));
            log::error!("{err}");
            err
        })?;
        let seed = parse_seed(&raw).ok_or_else(|| {
            let err = CertError::Signing(format!(
                "key {} is neither 32 raw bytes nor 64 hex digits",
                path.display()
            ));
            log::error!("{err}");
            err
        })?;
        Ok(Self::from_seed(seed, key_id))
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Armored detached signature over `bytes`.
    pub fn sign(&self, bytes: &[u8]) -> String {
        let signature = self.key.sign(bytes);
        armor(&self.key_id, &signature.to_bytes())
    }
}

fn parse_seed(raw: &[u8]) -> Option<[u8; 32]> {
    if let Ok(text) = std::str::from_utf8(raw) {
        if let Ok(decoded) = hex::decode(text.trim()) {
            return decoded.try_into().ok();
        }
    }
    raw.try_into().ok()
}

fn fingerprint(key: &VerifyingKey) -> String {
    let digest = Sha256::digest(key.to_bytes());
    hex::encode_upper(&digest[..8])
}

fn armor(key_id: &str, signature: &[u8]) -> String {
    let encoded = BASE64.encode(signature);
    let mut out = String::new();
    out.push_str(ARMOR_BEGIN);
    out.push('\n');
    out.push_str(&format!("Key-Id: {key_id}\nAlgorithm: ed25519\n\n"));
    for chunk in encoded.as_bytes().chunks(ARMOR_LINE) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(ARMOR_END);
    out.push('\n');
    out
}

fn dearmor(armored: &str) -> Result<Vec<u8>, CertError> {
    let body = armored
        .split_once(ARMOR_BEGIN)
        .and_then(|(_, rest)| rest.split_once(ARMOR_END))
        .map(|(body, _)| body)
        .ok_or_else(|| CertError::Signing("signature armor is missing".to_string()))?;
    // Headers end at the first blank line.
    let payload = body
        .trim_start_matches(['\r', '\n'])
        .split_once("\n\n")
        .map(|(_, payload)| payload)
        .unwrap_or(body);
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact)
        .map_err(|err| CertError::Signing(format!("signature is not base64: {err}")))
}

/// Checks an armored detached signature over `bytes`.
pub fn verify_detached(bytes: &[u8], armored: &str, key: &VerifyingKey) -> Result<(), CertError> {
    let raw = dearmor(armored)?;
    let signature = Signature::from_slice(&raw)
        .map_err(|err| CertError::Signing(format!("malformed signature: {err}")))?;
    key.verify(bytes, &signature)
        .map_err(|err| CertError::Signing(format!("signature does not verify: {err}")))
}

/// Course and student values printed on the verification pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageValues {
    pub course: String,
    pub course_long: String,
    pub org: String,
    pub org_long: String,
    /// Already HTML escaped.
    pub name: String,
    pub issue_date: String,
    pub certificate_type: String,
    pub certs_are_called: String,
    pub certs_are_called_plural: String,
    pub download_url: String,
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Signs a finished document and writes `{filename}.sig`, `valid.html` and `verify.html`
/// into the verification directory.
pub struct Verifier<'a> {
    signer: &'a Signer,
    settings: &'a EngineSettings,
    page_set: &'static str,
}

impl<'a> Verifier<'a> {
    pub fn new(signer: &'a Signer, settings: &'a EngineSettings, page_set: &'static str) -> Self {
        Self {
            signer,
            settings,
            page_set,
        }
    }

    /// Returns the verification directory. On failure the partial directory is removed.
    pub fn sign_and_publish(
        &self,
        document_path: &Path,
        verify_id: &str,
        values: &PageValues,
    ) -> Result<PathBuf, CertError> {
        let dir = naming::verify_dir(self.settings, verify_id);
        match self.write_artifacts(&dir, document_path, verify_id, values) {
            Ok(()) => {
                log::info!("wrote verification artifacts to {}", dir.display());
                Ok(dir)
            }
            Err(err) => {
                log::error!("verification for {} failed: {err}", document_path.display());
                if dir.exists() {
                    if let Err(cleanup) = fs::remove_dir_all(&dir) {
                        log::warn!("cannot remove {}: {cleanup}", dir.display());
                    }
                }
                Err(err)
            }
        }
    }

    fn write_artifacts(
        &self,
        dir: &Path,
        document_path: &Path,
        verify_id: &str,
        values: &PageValues,
    ) -> Result<(), CertError> {
        let bytes = fs::read(document_path)?;
        let filename = document_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.settings.filename.clone());
        let signature = self.signer.sign(&bytes);

        fs::create_dir_all(dir)?;
        fs::write(dir.join(naming::signature_file_name(&filename)), &signature)?;

        let page_values = self.page_values(&bytes, &filename, verify_id, &signature, values);
        let (valid_template, verify_template) = self.page_templates()?;
        let lookup = |name: &str| page_values.get(name).cloned();
        fs::write(
            dir.join("valid.html"),
            template::substitute(&valid_template, lookup, false)?,
        )?;
        fs::write(
            dir.join("verify.html"),
            template::substitute(&verify_template, lookup, false)?,
        )?;
        Ok(())
    }

    fn page_values(
        &self,
        bytes: &[u8],
        filename: &str,
        verify_id: &str,
        signature: &str,
        values: &PageValues,
    ) -> BTreeMap<&'static str, String> {
        let (type_code, type_name, img, explanation) =
            match certstamp_pages::certificate_type(&values.certificate_type) {
                Some(def) => (
                    def.type_code.clone(),
                    def.type_name.clone(),
                    def.img.clone(),
                    def.explanation.clone(),
                ),
                None => Default::default(),
            };
        let pdf_file = values
            .download_url
            .rsplit('/')
            .next()
            .unwrap_or(filename)
            .to_string();

        BTreeMap::from([
            ("COURSE", values.course.clone()),
            ("COURSE_LONG", values.course_long.clone()),
            ("ORG", values.org.clone()),
            ("ORG_LONG", values.org_long.clone()),
            ("NAME", values.name.clone()),
            ("CERTIFICATE_ID", verify_id.to_string()),
            ("SIGNATURE", signature.to_string()),
            (
                "SIG_URL",
                naming::signature_url(self.settings, verify_id, filename),
            ),
            ("SIG_FILE", naming::signature_file_name(filename)),
            (
                "VERIFY_URL",
                naming::verify_page_url(self.settings, verify_id),
            ),
            ("TYPE", type_code),
            ("TYPE_NAME", type_name),
            ("ISSUE_DATE", values.issue_date.clone()),
            ("IMG", img),
            ("EXPLANATION", explanation),
            ("CERTS_ARE_CALLED", title_case(&values.certs_are_called)),
            (
                "CERTS_ARE_CALLED_PLURAL",
                title_case(&values.certs_are_called_plural),
            ),
            ("CERT_KEY_ID", self.signer.key_id().to_string()),
            ("PDF_FILE", pdf_file),
            ("PDF_SHA256", hex::encode(Sha256::digest(bytes))),
        ])
    }

    /// Template directory pages win over the embedded set.
    fn page_templates(&self) -> Result<(String, String), CertError> {
        let embedded = certstamp_pages::page_set(self.page_set).ok_or_else(|| {
            CertError::InvalidConfiguration(format!("unknown page set {}", self.page_set))
        })?;
        let read = |name: &str, fallback: &str| -> Result<String, CertError> {
            let path = self.settings.template_dir.join(name);
            if path.is_file() {
                log::debug!("using verification page {}", path.display());
                Ok(fs::read_to_string(path)?)
            } else {
                Ok(fallback.to_string())
            }
        };
        Ok((
            read("valid.html", embedded.valid_html)?,
            read("verify.html", embedded.verify_html)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> Signer {
        Signer::from_seed([7u8; 32], Some("TESTKEY".to_string()))
    }

    #[test]
    fn signatures_verify_and_detect_tampering() {
        let signer = signer();
        let armored = signer.sign(b"certificate bytes");
        assert!(armored.starts_with(ARMOR_BEGIN));
        assert!(armored.contains("Key-Id: TESTKEY"));
        verify_detached(b"certificate bytes", &armored, &signer.verifying_key())
            .expect("verifies");
        let err = verify_detached(b"tampered bytes", &armored, &signer.verifying_key())
            .expect_err("tampered");
        assert!(matches!(err, CertError::Signing(_)));
        assert!(verify_detached(b"x", "garbage", &signer.verifying_key()).is_err());
    }

    #[test]
    fn key_files_accept_hex_or_raw_seeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hex_path = dir.path().join("key.hex");
        fs::write(&hex_path, format!("{}\n", hex::encode([7u8; 32]))).expect("write");
        let raw_path = dir.path().join("key.bin");
        fs::write(&raw_path, [7u8; 32]).expect("write");
        let bad_path = dir.path().join("key.bad");
        fs::write(&bad_path, b"short").expect("write");

        let from_hex = Signer::load(&hex_path, None).expect("hex");
        let from_raw = Signer::load(&raw_path, None).expect("raw");
        assert_eq!(from_hex.verifying_key(), from_raw.verifying_key());
        assert_eq!(from_hex.key_id().len(), 16);
        assert!(matches!(
            Signer::load(&bad_path, None),
            Err(CertError::Signing(_))
        ));
    }

    #[test]
    fn pages_are_written_with_substituted_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = EngineSettings {
            output_dir: dir.path().join("out"),
            template_dir: dir.path().join("templates"),
            verify_url: "https://verify.example".to_string(),
            ..EngineSettings::default()
        };
        let document = dir.path().join("Certificate.pdf");
        fs::write(&document, b"%PDF-1.7 fake").expect("write");
        let signer = signer();
        let verifier = Verifier::new(&signer, &settings, certstamp_pages::PROGRAMMATIC_PAGE_SET_ID);
        let values = PageValues {
            name: "John Smith".to_string(),
            certificate_type: "verified".to_string(),
            certs_are_called: "certificate".to_string(),
            certs_are_called_plural: "certificates".to_string(),
            download_url: "https://cdn.example/downloads/d1/Certificate.pdf".to_string(),
            ..PageValues::default()
        };

        let out = verifier
            .sign_and_publish(&document, "v1", &values)
            .expect("publish");
        assert_eq!(out, settings.output_dir.join("cert/v1"));
        let signature = fs::read_to_string(out.join("Certificate.pdf.sig")).expect("sig");
        verify_detached(b"%PDF-1.7 fake", &signature, &signer.verifying_key()).expect("valid");

        let valid = fs::read_to_string(out.join("valid.html")).expect("valid.html");
        assert!(valid.contains("John Smith"));
        assert!(!valid.contains("{SIGNATURE}"));
        let verify = fs::read_to_string(out.join("verify.html")).expect("verify.html");
        assert!(verify.contains("https://verify.example/cert/v1/Certificate.pdf.sig"));
        assert!(!verify.contains("{CERT_KEY_ID}"));
    }

    #[test]
    fn template_directory_pages_override_embedded_ones() {
        let dir = tempfile::tempdir().expect("tempdir");
        let templates = dir.path().join("templates");
        fs::create_dir_all(&templates).expect("mkdir");
        fs::write(
            templates.join("valid.html"),
            "<style>p {color: red}</style><p>{NAME} {PDF_SHA256}</p>",
        )
        .expect("write");
        let settings = EngineSettings {
            output_dir: dir.path().join("out"),
            template_dir: templates,
            ..EngineSettings::default()
        };
        let document = dir.path().join("Certificate.pdf");
        fs::write(&document, b"abc").expect("write");
        let signer = signer();
        let verifier = Verifier::new(&signer, &settings, certstamp_pages::CLASSIC_PAGE_SET_ID);
        let values = PageValues {
            name: "Ada".to_string(),
            ..PageValues::default()
        };
        let out = verifier
            .sign_and_publish(&document, "v2", &values)
            .expect("publish");
        let valid = fs::read_to_string(out.join("valid.html")).expect("valid");
        assert_eq!(
            valid,
            format!(
                "<style>p {{color: red}}</style><p>Ada {}</p>",
                hex::encode(Sha256::digest(b"abc"))
            )
        );
        assert!(out.join("verify.html").is_file());
    }

    #[test]
    fn failures_remove_the_partial_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = EngineSettings {
            output_dir: dir.path().join("out"),
            ..EngineSettings::default()
        };
        let signer = signer();
        let verifier = Verifier::new(&signer, &settings, certstamp_pages::CLASSIC_PAGE_SET_ID);
        let err = verifier
            .sign_and_publish(&dir.path().join("missing.pdf"), "v3", &PageValues::default())
            .expect_err("missing document");
        assert!(matches!(err, CertError::Io(_)));
        assert!(!settings.output_dir.join("cert/v3").exists());
    }

    #[test]
    fn labels_are_title_cased() {
        assert_eq!(title_case("statement of accomplishment"), "Statement Of Accomplishment");
        assert_eq!(title_case("CERTIFICATE"), "Certificate");
    }
}

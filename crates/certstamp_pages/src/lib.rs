use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const CATALOG_ID: &str = "certstamp.pages";
pub const CATALOG_VERSION: &str = "1";

pub const PROGRAMMATIC_PAGE_SET_ID: &str = "programmatic";
pub const CLASSIC_PAGE_SET_ID: &str = "classic";

const CERTIFICATE_TYPES_ID: &str = "certstamp.certificate_types.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSetDef {
    pub id: &'static str,
    pub valid_html: &'static str,
    pub verify_html: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateTypeDef {
    pub id: String,
    pub type_code: String,
    pub type_name: String,
    pub explanation: String,
    pub img: String,
}

// Pages are compiled into the binary; runtime only reads overrides from the template
// directory, never from this crate's sources.
const PROGRAMMATIC_VALID_HTML: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/pages/programmatic/valid.html"
));
const PROGRAMMATIC_VERIFY_HTML: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/pages/programmatic/verify.html"
));
const CLASSIC_VALID_HTML: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/pages/classic/valid.html"
));
const CLASSIC_VERIFY_HTML: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/pages/classic/verify.html"
));
const CERTIFICATE_TYPES_JSON: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/pages/certificate_types.json"
));

pub const PAGE_SETS_V1: [PageSetDef; 2] = [
    PageSetDef {
        id: PROGRAMMATIC_PAGE_SET_ID,
        valid_html: PROGRAMMATIC_VALID_HTML,
        verify_html: PROGRAMMATIC_VERIFY_HTML,
    },
    PageSetDef {
        id: CLASSIC_PAGE_SET_ID,
        valid_html: CLASSIC_VALID_HTML,
        verify_html: CLASSIC_VERIFY_HTML,
    },
];

#[derive(Debug, Clone)]
pub struct PagesMetadata {
    pub catalog_id: &'static str,
    pub catalog_version: &'static str,
    pub catalog_fingerprint_sha256: String,
    pub certificate_types_id: &'static str,
    pub certificate_types_hash_sha256: String,
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn hash_memoized(cell: &OnceLock<String>, text: &str) -> String {
    cell.get_or_init(|| hex_sha256(text.as_bytes())).clone()
}

static CERTIFICATE_TYPES_HASH: OnceLock<String> = OnceLock::new();
static CATALOG_FINGERPRINT: OnceLock<String> = OnceLock::new();
static CERTIFICATE_TYPES: OnceLock<Vec<CertificateTypeDef>> = OnceLock::new();

fn parse_certificate_types(raw: &str) -> Vec<CertificateTypeDef> {
    let Ok(root) = serde_json::from_str::<Value>(raw) else {
        return Vec::new();
    };
    let Some(types) = root.get("types").and_then(Value::as_array) else {
        return Vec::new();
    };
    let field = |entry: &Value, key: &str| {
        entry
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    types
        .iter()
        .filter(|entry| entry.get("id").and_then(Value::as_str).is_some())
        .map(|entry| CertificateTypeDef {
            id: field(entry, "id"),
            type_code: field(entry, "type"),
            type_name: field(entry, "type_name"),
            explanation: field(entry, "explanation"),
            img: field(entry, "img"),
        })
        .collect()
}

pub fn page_sets_v1() -> &'static [PageSetDef] {
    &PAGE_SETS_V1
}

pub fn page_set(id: &str) -> Option<&'static PageSetDef> {
    PAGE_SETS_V1.iter().find(|set| set.id == id)
}

pub fn certificate_types() -> &'static [CertificateTypeDef] {
    CERTIFICATE_TYPES.get_or_init(|| parse_certificate_types(CERTIFICATE_TYPES_JSON))
}

/// Looks up a certificate type (`verified`, `honor`); unknown ids fall back to `honor`.
pub fn certificate_type(id: &str) -> Option<&'static CertificateTypeDef> {
    let types = certificate_types();
    types
        .iter()
        .find(|def| def.id == id)
        .or_else(|| types.iter().find(|def| def.id == "honor"))
}

pub fn certificate_types_json() -> &'static str {
    CERTIFICATE_TYPES_JSON
}

pub fn certificate_types_hash_sha256() -> String {
    hash_memoized(&CERTIFICATE_TYPES_HASH, CERTIFICATE_TYPES_JSON)
}

pub fn page_set_hash_sha256(id: &str) -> Option<String> {
    let set = page_set(id)?;
    let mut hasher = Sha256::new();
    hasher.update(set.id.as_bytes());
    hasher.update(b"\n");
    hasher.update(set.valid_html.as_bytes());
    hasher.update(b"\n");
    hasher.update(set.verify_html.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    Some(out)
}

pub fn catalog_fingerprint_sha256() -> String {
    CATALOG_FINGERPRINT
        .get_or_init(|| {
            let mut hasher = Sha256::new();
            hasher.update(CATALOG_ID.as_bytes());
            hasher.update(b"\n");
            hasher.update(CATALOG_VERSION.as_bytes());
            for set in page_sets_v1() {
                hasher.update(b"\n");
                hasher.update(set.id.as_bytes());
                hasher.update(b"\n");
                hasher.update(page_set_hash_sha256(set.id).unwrap_or_default().as_bytes());
            }
            hasher.update(b"\n");
            hasher.update(CERTIFICATE_TYPES_ID.as_bytes());
            hasher.update(b"\n");
            hasher.update(certificate_types_hash_sha256().as_bytes());
            let digest = hasher.finalize();
            let mut out = String::with_capacity(digest.len() * 2);
            for b in digest {
                use std::fmt::Write;
                let _ = write!(&mut out, "{:02x}", b);
            }
            out
        })
        .clone()
}

pub fn metadata() -> PagesMetadata {
    PagesMetadata {
        catalog_id: CATALOG_ID,
        catalog_version: CATALOG_VERSION,
        catalog_fingerprint_sha256: catalog_fingerprint_sha256(),
        certificate_types_id: CERTIFICATE_TYPES_ID,
        certificate_types_hash_sha256: certificate_types_hash_sha256(),
    }
}

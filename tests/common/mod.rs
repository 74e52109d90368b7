//! Shared fixtures: a minimal TrueType font, template PDFs and a temporary engine layout.

#![allow(dead_code)]

use certstamp::{CertEngine, CourseCatalog, EngineSettings, Signer};
use lopdf::{Document, Object, Stream, dictionary};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const SEED: [u8; 32] = [7u8; 32];
pub const FIRST_CHAR: u32 = 0x20;
pub const LAST_CHAR: u32 = 0x7E;

fn push16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn push32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn push_i16(out: &mut Vec<u8>, value: i16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// A TrueType font mapping printable ASCII to glyphs 1..=95, 600 units wide at 1000 upem.
/// No outlines: enough for coverage, shaping and measurement.
pub fn ascii_font() -> Vec<u8> {
    let glyph_count = (LAST_CHAR - FIRST_CHAR + 2) as u16;

    let mut cmap = Vec::new();
    push16(&mut cmap, 0);
    push16(&mut cmap, 1);
    push16(&mut cmap, 3);
    push16(&mut cmap, 10);
    push32(&mut cmap, 12);
    push16(&mut cmap, 12);
    push16(&mut cmap, 0);
    push32(&mut cmap, 16 + 12);
    push32(&mut cmap, 0);
    push32(&mut cmap, 1);
    push32(&mut cmap, FIRST_CHAR);
    push32(&mut cmap, LAST_CHAR);
    push32(&mut cmap, 1);

    let mut head = Vec::new();
    push32(&mut head, 0x0001_0000);
    push32(&mut head, 0x0001_0000);
    push32(&mut head, 0);
    push32(&mut head, 0x5F0F_3CF5);
    push16(&mut head, 0);
    push16(&mut head, 1000);
    head.extend_from_slice(&[0u8; 16]);
    for value in [0i16, -200, 600, 800] {
        push_i16(&mut head, value);
    }
    push16(&mut head, 0);
    push16(&mut head, 8);
    push_i16(&mut head, 2);
    push_i16(&mut head, 0);
    push_i16(&mut head, 0);

    let mut hhea = Vec::new();
    push32(&mut hhea, 0x0001_0000);
    push_i16(&mut hhea, 800);
    push_i16(&mut hhea, -200);
    push_i16(&mut hhea, 0);
    push16(&mut hhea, 600);
    for value in [0i16, 0, 600, 1, 0, 0, 0, 0, 0, 0, 0] {
        push_i16(&mut hhea, value);
    }
    push16(&mut hhea, glyph_count);

    let mut hmtx = Vec::new();
    for gid in 0..glyph_count {
        push16(&mut hmtx, if gid == 0 { 500 } else { 600 });
        push_i16(&mut hmtx, 0);
    }

    let mut maxp = Vec::new();
    push32(&mut maxp, 0x0000_5000);
    push16(&mut maxp, glyph_count);

    let tables: [(&[u8; 4], Vec<u8>); 5] = [
        (b"cmap", cmap),
        (b"head", head),
        (b"hhea", hhea),
        (b"hmtx", hmtx),
        (b"maxp", maxp),
    ];

    let mut out = Vec::new();
    push32(&mut out, 0x0001_0000);
    push16(&mut out, tables.len() as u16);
    push16(&mut out, 64);
    push16(&mut out, 2);
    push16(&mut out, 16);

    let mut offset = 12 + 16 * tables.len();
    let mut body = Vec::new();
    for (tag, data) in &tables {
        out.extend_from_slice(*tag);
        push32(&mut out, 0);
        push32(&mut out, offset as u32);
        push32(&mut out, data.len() as u32);
        body.extend_from_slice(data);
        while body.len() % 4 != 0 {
            body.push(0);
        }
        offset = 12 + 16 * tables.len() + body.len();
    }
    out.extend_from_slice(&body);
    out
}

/// A one-page PDF with a filled band, standing in for an institution template.
pub fn template_pdf(width: i64, height: i64) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content = b"0.9 0.9 0.95 rg 20 20 200 40 re f".to_vec();
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut out = Vec::new();
    doc.save_to(&mut out).expect("save template");
    out
}

pub const DEMO_COURSE: &str = "edX/DemoX/Demo_Course";

pub fn demo_catalog() -> String {
    r##"{
        "edX/DemoX/Demo_Course": {
            "LONG_ORG": "Sample Org",
            "LONG_COURSE": "Sample course",
            "ISSUED_DATE": "ROLLING",
            "TEMPLATEFILE": "verified-demo.pdf",
            "interstitial": {"Pass": "", "Distinction": "with distinction"},
            "certificate_theme": [
                {"line": {"x_start": 100, "y_start": 290, "x_end": 740, "y_end": 290,
                          "stroke_color": "#333333"}}
            ],
            "course_information": [
                {"text": {"string": "{student_name}", "x": 100, "y": 300, "width": 640, "height": 60,
                          "font_size": 36, "auto_scale": true, "alignment": "center"}},
                {"text": {"string": "{successfully_completed} <b>{course_title}</b>",
                          "x": 100, "y": 240, "width": 640, "height": 40, "font_size": 16}},
                {"text": {"string": "{date_string}", "x": 100, "y": 200, "width": 640, "height": 20}},
                {"text": {"string": "{verify_text}", "x": 40, "y": 40, "width": 760, "height": 30,
                          "font_size": 9}}
            ],
            "subtemplates": {"MD": "edX/DemoX/Demo_Course_cme", "Letter": "edX/DemoX/Demo_Course_letter"}
        },
        "edX/DemoX/Demo_Course_cme": {
            "version": "cme",
            "LONG_COURSE": "Clinical Practice",
            "CREDITS": "12 AMA PRA Category 1 Credits",
            "template_file": false
        },
        "edX/DemoX/Demo_Course_letter": {
            "version": "letterhead",
            "template_file": false
        },
        "edX/NoVerify/2024": {
            "VERIFY": false,
            "LONG_COURSE": "Unverified course",
            "course_information": [
                {"text": {"string": "{student_name}", "x": 100, "y": 300, "width": 640, "height": 60,
                          "font_size": 36, "auto_scale": true}}
            ]
        },
        "edX/Stanford/2013": {
            "version": "stanford",
            "LONG_COURSE": "Databases",
            "interstitial": {"A": "with distinction"},
            "template_file": false
        },
        "edX/Broken/2024": {
            "version": "v9"
        }
    }"##
    .to_string()
}

/// The TJ operands the fixture font produces for `word`, one glyph id per character.
pub fn glyph_run(word: &str) -> String {
    word.chars()
        .map(|ch| format!("<{:04X}>", ch as u32 - FIRST_CHAR + 1))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Every stream in `doc`, decompressed where a filter is present.
pub fn stream_text(doc: &Document) -> String {
    let mut out = String::new();
    for object in doc.objects.values() {
        if let Object::Stream(stream) = object {
            let content = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            out.push_str(&String::from_utf8_lossy(&content));
            out.push('\n');
        }
    }
    out
}

/// A temporary template directory with the ASCII font and the demo template PDF, and an
/// output directory next to it.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let templates = dir.path().join("templates");
        fs::create_dir_all(templates.join("fonts")).expect("fonts dir");
        fs::write(templates.join("fonts/OpenSans-Light.ttf"), ascii_font()).expect("font");
        let pdfs = templates.join("v4_programmatic-cert-templates");
        fs::create_dir_all(&pdfs).expect("template dir");
        fs::write(pdfs.join("verified-demo.pdf"), template_pdf(842, 595)).expect("template");
        Self { dir }
    }

    pub fn template_dir(&self) -> PathBuf {
        self.dir.path().join("templates")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            template_dir: self.template_dir(),
            output_dir: self.output_dir(),
            download_url: "https://certs.example.org".to_string(),
            verify_url: "https://verify.example.org".to_string(),
            fallback_fonts: Vec::new(),
            ..EngineSettings::default()
        }
    }

    pub fn signer() -> Signer {
        Signer::from_seed(SEED, Some("TESTKEY".to_string()))
    }

    pub fn engine(&self) -> CertEngine {
        self.engine_with(self.settings())
    }

    pub fn engine_with(&self, settings: EngineSettings) -> CertEngine {
        CertEngine::builder()
            .settings(settings)
            .catalog(CourseCatalog::from_json(&demo_catalog()).expect("catalog"))
            .signer(Self::signer())
            .build()
            .expect("engine")
    }

    /// Every file under the output directory, sorted.
    pub fn output_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        collect(&self.output_dir(), &mut files);
        files.sort();
        files
    }
}

fn collect(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect(&path, out);
        } else {
            out.push(path);
        }
    }
}

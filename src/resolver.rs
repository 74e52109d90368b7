use crate::coverage::GlyphCoverageTable;
use crate::error::CertError;
use crate::glyph_report::GlyphCoverageReport;
use crate::markup::{self, Inline, Span};
use std::sync::Arc;

/// Font ids for the style variants of one typeface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FontFamily {
    pub regular: String,
    pub bold: String,
    pub italic: String,
    pub bold_italic: String,
}

impl FontFamily {
    /// `("OpenSans", "Light")` -> regular `OpenSans-Light`, bold `OpenSans-Bold`,
    /// italic `OpenSans-Italic`, bold-italic `OpenSans-BoldItalic`.
    pub fn from_config(name: &str, face_type: &str) -> Self {
        let name = name.trim();
        let face_type = face_type.trim();
        let regular = if face_type.is_empty() {
            name.to_string()
        } else {
            format!("{name}-{face_type}")
        };
        Self {
            regular,
            bold: format!("{name}-Bold"),
            italic: format!("{name}-Italic"),
            bold_italic: format!("{name}-BoldItalic"),
        }
    }

    /// A family where every variant is the same font.
    pub fn single(id: &str) -> Self {
        Self {
            regular: id.to_string(),
            bold: id.to_string(),
            italic: id.to_string(),
            bold_italic: id.to_string(),
        }
    }

    pub fn face(&self, bold: bool, italic: bool) -> &str {
        match (bold, italic) {
            (false, false) => &self.regular,
            (true, false) => &self.bold,
            (false, true) => &self.italic,
            (true, true) => &self.bold_italic,
        }
    }

    fn with_known_faces(&self, coverage: &GlyphCoverageTable) -> Self {
        let pick = |face: &String| {
            if coverage.has_font(face) {
                face.clone()
            } else {
                self.regular.clone()
            }
        };
        Self {
            regular: self.regular.clone(),
            bold: pick(&self.bold),
            italic: pick(&self.italic),
            bold_italic: pick(&self.bold_italic),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontChoice {
    /// Position of the chosen family in the candidate list.
    pub index: usize,
    /// The chosen family with unregistered variants replaced by its regular face.
    pub family: FontFamily,
}

/// Picks the first font family whose faces render every code point of a string.
#[derive(Debug, Clone)]
pub struct FontResolver {
    coverage: Arc<GlyphCoverageTable>,
}

impl FontResolver {
    pub fn new(coverage: Arc<GlyphCoverageTable>) -> Self {
        Self { coverage }
    }

    pub fn coverage(&self) -> &GlyphCoverageTable {
        &self.coverage
    }

    pub fn resolve(&self, candidates: &[FontFamily], text: &str) -> Result<FontChoice, CertError> {
        let run = Span {
            text: text.to_string(),
            bold: false,
            italic: false,
            link: None,
        };
        self.resolve_runs(candidates, std::slice::from_ref(&run))
    }

    /// Resolves inline markup. Bold and italic runs must be covered by the face they are
    /// drawn with, not just the regular one.
    pub fn resolve_markup(
        &self,
        candidates: &[FontFamily],
        markup: &str,
    ) -> Result<FontChoice, CertError> {
        let runs: Vec<Span> = markup::parse(markup)
            .into_iter()
            .filter_map(|inline| match inline {
                Inline::Text(span) => Some(span),
                Inline::Break => None,
            })
            .collect();
        self.resolve_runs(candidates, &runs)
    }

    fn resolve_runs(&self, candidates: &[FontFamily], runs: &[Span]) -> Result<FontChoice, CertError> {
        let text: String = runs.iter().map(|run| run.text.as_str()).collect();
        let Some(first) = candidates.first() else {
            let err = CertError::InvalidConfiguration(format!(
                "no candidate fonts to render '{text}'"
            ));
            log::error!("{err}");
            return Err(err);
        };
        if text.is_empty() {
            return Ok(FontChoice {
                index: 0,
                family: first.with_known_faces(&self.coverage),
            });
        }
        let known: Vec<FontFamily> = candidates
            .iter()
            .map(|family| family.with_known_faces(&self.coverage))
            .collect();
        for (index, family) in known.iter().enumerate() {
            if !self.coverage.has_font(&family.regular) {
                log::warn!(
                    "missing or invalid font {} while rendering '{text}'",
                    family.regular
                );
                continue;
            }
            let covered = runs.iter().all(|run| {
                self.coverage
                    .covers(family.face(run.bold, run.italic), &run.text)
            });
            if covered {
                return Ok(FontChoice {
                    index,
                    family: family.clone(),
                });
            }
        }

        let fonts: Vec<String> = candidates.iter().map(|f| f.regular.clone()).collect();
        let mut report = GlyphCoverageReport::default();
        for run in runs {
            for ch in run.text.chars() {
                let covered = known.iter().any(|family| {
                    self.coverage
                        .covers_char(family.face(run.bold, run.italic), ch)
                });
                if !covered {
                    report.record_missing(ch, &fonts);
                }
            }
        }
        Err(CertError::NoFontCoversText {
            text,
            fonts,
            missing: report.codepoints(),
        })
    }
}

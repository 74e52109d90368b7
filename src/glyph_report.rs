use std::collections::BTreeMap;

/// Code points that no candidate font could render, with the fonts that were tried.
#[derive(Debug, Clone, Default)]
pub struct GlyphCoverageReport {
    missing: BTreeMap<u32, MissingGlyph>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingGlyph {
    pub codepoint: u32,
    pub ch: char,
    pub fonts_tried: Vec<String>,
    pub count: usize,
}

impl GlyphCoverageReport {
    pub fn record_missing(&mut self, ch: char, fonts_tried: &[String]) {
        let codepoint = ch as u32;
        let entry = self.missing.entry(codepoint).or_insert_with(|| MissingGlyph {
            codepoint,
            ch,
            fonts_tried: fonts_tried.to_vec(),
            count: 0,
        });
        entry.count = entry.count.saturating_add(1);
    }

    pub fn missing(&self) -> Vec<MissingGlyph> {
        self.missing.values().cloned().collect()
    }

    /// Missing code points in ascending order, each listed once.
    pub fn codepoints(&self) -> Vec<u32> {
        self.missing.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }
}

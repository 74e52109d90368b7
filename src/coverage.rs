use crate::font::{FontRegistry, normalize_name};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// Font id -> code points the font can render. Built once, then read-only.
#[derive(Debug, Clone, Default)]
pub struct GlyphCoverageTable {
    entries: HashMap<String, HashSet<u32>>,
}

impl GlyphCoverageTable {
    pub fn from_registry(registry: &FontRegistry) -> Self {
        let entries: HashMap<String, HashSet<u32>> = registry
            .fonts()
            .par_iter()
            .map(|font| {
                let points: HashSet<u32> = font.codepoints().into_iter().collect();
                if points.is_empty() {
                    log::warn!("font {} maps no unicode code points", font.id);
                }
                (normalize_name(&font.id), points)
            })
            .collect();
        log::debug!("glyph coverage built for {} fonts", entries.len());
        Self { entries }
    }

    pub fn from_entries<I, S, C>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, C)>,
        S: AsRef<str>,
        C: IntoIterator<Item = u32>,
    {
        let entries: HashMap<String, HashSet<u32>> = entries
            .into_iter()
            .map(|(id, points)| {
                (
                    normalize_name(id.as_ref()),
                    points.into_iter().collect::<HashSet<u32>>(),
                )
            })
            .collect();
        Self { entries }
    }

    pub fn has_font(&self, font_id: &str) -> bool {
        self.entries.contains_key(&normalize_name(font_id))
    }

    pub fn covers_char(&self, font_id: &str, ch: char) -> bool {
        self.entries
            .get(&normalize_name(font_id))
            .is_some_and(|points| points.contains(&(ch as u32)))
    }

    /// True only when the font has an entry and every code point of `text` is in it.
    pub fn covers(&self, font_id: &str, text: &str) -> bool {
        let Some(points) = self.entries.get(&normalize_name(font_id)) else {
            return false;
        };
        text.chars().all(|ch| points.contains(&(ch as u32)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

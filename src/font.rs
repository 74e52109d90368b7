use crate::error::CertError;
use crate::layout::TextMeasure;
use crate::types::Pt;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use ttf_parser::GlyphId;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TextWidthKey {
    font_index: usize,
    size_milli: i64,
    text: String,
}

#[derive(Debug)]
struct TextWidthCache {
    map: HashMap<TextWidthKey, Pt>,
    order: VecDeque<TextWidthKey>,
    max_entries: usize,
}

impl TextWidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&self, key: &TextWidthKey) -> Option<Pt> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: TextWidthKey, value: Pt) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            if let Some(old) = self.order.pop_front() {
                self.map.remove(&old);
            } else {
                break;
            }
        }
    }
}

/// Font programs known to the engine, addressed by normalized id.
///
/// The primary id of a font is its file stem (`OpenSans-Light.ttf` -> `OpenSans-Light`);
/// names from the font's `name` table are registered as aliases.
#[derive(Debug)]
pub struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    lookup: HashMap<String, usize>,
    text_width_cache: Mutex<TextWidthCache>,
}

#[derive(Debug)]
pub struct RegisteredFont {
    pub id: String,
    pub data: Vec<u8>,
    pub metrics: FontMetrics,
}

/// Face-level metrics in 1000-unit glyph space.
#[derive(Debug, Clone)]
pub struct FontMetrics {
    pub ascent: i16,
    pub descent: i16,
    pub cap_height: i16,
    pub italic_angle: i16,
    pub bbox: (i16, i16, i16, i16),
    pub missing_width: u16,
    pub is_fixed_pitch: bool,
    /// Outlines are CFF (`.otf`) rather than TrueType `glyf`.
    pub is_cff: bool,
}

/// One shaped glyph: id, advance and offset in 1000-unit space, and the text it renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapedGlyph {
    pub gid: u16,
    pub advance: i32,
    pub x_offset: i32,
    pub text: String,
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FontRegistry {
    pub fn new() -> Self {
        Self {
            fonts: Vec::new(),
            lookup: HashMap::new(),
            text_width_cache: Mutex::new(TextWidthCache::new(20_000)),
        }
    }

    /// Registers every `.ttf`/`.otf` file in `path`; returns the number registered.
    pub fn register_dir(&mut self, path: impl AsRef<Path>) -> usize {
        let path = path.as_ref();
        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("font directory {} unreadable: {err}", path.display());
                return 0;
            }
        };
        let mut files: Vec<_> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        files
            .into_iter()
            .filter_map(|file| self.register_file(file))
            .count()
    }

    /// Registers one font file. Unreadable or unparsable files are skipped with a warning.
    pub fn register_file(&mut self, path: impl AsRef<Path>) -> Option<String> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|v| v.to_str())?;
        let ext = ext.to_ascii_lowercase();
        if ext != "ttf" && ext != "otf" {
            return None;
        }
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) => {
                log::warn!("skipping font {}: {err}", path.display());
                return None;
            }
        };
        let stem = path.file_stem().and_then(|v| v.to_str()).unwrap_or("");
        match self.register_bytes(data, stem) {
            Ok(id) => Some(id),
            Err(err) => {
                log::warn!("skipping font {}: {err}", path.display());
                None
            }
        }
    }

    pub fn register_bytes(&mut self, data: Vec<u8>, id: &str) -> Result<String, CertError> {
        let Ok(face) = ttf_parser::Face::parse(&data, 0) else {
            return Err(CertError::InvalidConfiguration(format!(
                "invalid font data for {id}"
            )));
        };
        let (primary, aliases) = font_names(&face, id);
        let metrics = FontMetrics::from_face(&face);
        drop(face);

        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            id: primary.clone(),
            data,
            metrics,
        });
        for alias in std::iter::once(primary.clone()).chain(aliases) {
            let key = normalize_name(&alias);
            if key.is_empty() || self.lookup.contains_key(&key) {
                continue;
            }
            self.lookup.insert(key, index);
        }
        log::debug!("registered font {primary}");
        Ok(primary)
    }

    pub fn fonts(&self) -> &[RegisteredFont] {
        &self.fonts
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains_key(&normalize_name(name))
    }

    pub fn resolve(&self, name: &str) -> Option<&RegisteredFont> {
        let key = normalize_name(name);
        self.lookup
            .get(&key)
            .and_then(|index| self.fonts.get(*index))
    }

    pub fn measure_text_width(&self, name: &str, font_size: Pt, text: &str) -> Pt {
        let key = normalize_name(name);
        let Some(index) = self.lookup.get(&key).copied() else {
            return approximate_width(font_size, text);
        };
        let cache_key = TextWidthKey {
            font_index: index,
            size_milli: font_size.to_milli_i64(),
            text: text.to_string(),
        };
        if let Ok(cache) = self.text_width_cache.lock() {
            if let Some(value) = cache.get(&cache_key) {
                return value;
            }
        }
        let Some(font) = self.fonts.get(index) else {
            return approximate_width(font_size, text);
        };
        let value = measure_text_width_full(font, font_size, text)
            .unwrap_or_else(|| approximate_width(font_size, text));
        if let Ok(mut cache) = self.text_width_cache.lock() {
            cache.insert(cache_key, value);
        }
        value
    }

    /// Advance of `gid` scaled to 1000 units per em.
    pub fn glyph_advance(&self, name: &str, gid: u16) -> u16 {
        let Some(font) = self.resolve(name) else {
            return 0;
        };
        let Ok(face) = ttf_parser::Face::parse(&font.data, 0) else {
            return 0;
        };
        let advance = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0);
        let units = face.units_per_em().max(1) as i64;
        let scaled = ((advance as i64) * 1000 + (units / 2)) / units;
        scaled.clamp(0, u16::MAX as i64) as u16
    }

    /// Shapes `text` with rustybuzz; `None` when the font is unknown or yields no glyphs.
    pub fn shape(&self, name: &str, text: &str) -> Option<Vec<ShapedGlyph>> {
        let font = self.resolve(name)?;
        let face = HbFace::from_slice(&font.data, 0)?;
        let units_per_em = face.units_per_em().max(1) as i64;

        let mut buffer = UnicodeBuffer::new();
        buffer.set_direction(detect_direction(text));
        buffer.push_str(text);
        let output = rustybuzz::shape(&face, &[], buffer);
        let infos = output.glyph_infos();
        let positions = output.glyph_positions();
        if infos.is_empty() || infos.len() != positions.len() {
            return None;
        }

        let scale = |v: i32| (((v as i64) * 1000 + units_per_em / 2) / units_per_em) as i32;
        let mut cluster_starts: Vec<usize> = infos.iter().map(|g| g.cluster as usize).collect();
        cluster_starts.sort_unstable();
        cluster_starts.dedup();

        let glyphs = infos
            .iter()
            .zip(positions.iter())
            .map(|(info, pos)| {
                let start = (info.cluster as usize).min(text.len());
                let end = cluster_starts
                    .iter()
                    .copied()
                    .find(|&s| s > start)
                    .unwrap_or(text.len());
                ShapedGlyph {
                    gid: info.glyph_id as u16,
                    advance: scale(pos.x_advance),
                    x_offset: scale(pos.x_offset),
                    text: text.get(start..end).unwrap_or_default().to_string(),
                }
            })
            .collect();
        Some(glyphs)
    }
}

impl TextMeasure for FontRegistry {
    fn text_width(&self, font: &str, size: Pt, text: &str) -> Pt {
        self.measure_text_width(font, size, text)
    }
}

impl RegisteredFont {
    /// Code points mapped to a real glyph by any Unicode cmap subtable.
    pub fn codepoints(&self) -> BTreeSet<u32> {
        let mut out = BTreeSet::new();
        let Ok(face) = ttf_parser::Face::parse(&self.data, 0) else {
            return out;
        };
        let Some(cmap) = face.tables().cmap else {
            return out;
        };
        for subtable in cmap.subtables {
            if !subtable.is_unicode() {
                continue;
            }
            subtable.codepoints(|cp| {
                if subtable.glyph_index(cp).is_some_and(|gid| gid.0 != 0) {
                    out.insert(cp);
                }
            });
        }
        out
    }
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let bbox = face.global_bounding_box();
        let bbox = (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        );
        let italic_angle = face
            .italic_angle()
            .map(|value| value.round() as i16)
            .unwrap_or(0);
        let missing_width = face
            .glyph_index(' ')
            .and_then(|gid| face.glyph_hor_advance(gid))
            .map(|adv| (adv as f32 * scale).round().clamp(0.0, u16::MAX as f32) as u16)
            .unwrap_or(0);
        Self {
            ascent,
            descent,
            cap_height,
            italic_angle,
            bbox,
            missing_width,
            is_fixed_pitch: face.is_monospaced(),
            is_cff: face.tables().cff.is_some(),
        }
    }
}

fn approximate_width(font_size: Pt, text: &str) -> Pt {
    let char_width = (font_size * 0.6).max(Pt::ONE);
    char_width * (text.chars().count() as i32)
}

fn measure_text_width_full(font: &RegisteredFont, font_size: Pt, text: &str) -> Option<Pt> {
    let face = HbFace::from_slice(&font.data, 0)?;
    let units_per_em = face.units_per_em().max(1) as i64;

    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let positions = output.glyph_positions();
    if positions.is_empty() {
        return if text.is_empty() { Some(Pt::ZERO) } else { None };
    }
    let mut total_units: i32 = 0;
    for pos in positions {
        let adv = (((pos.x_advance as i64) * 1000 + (units_per_em / 2)) / units_per_em) as i32;
        total_units = total_units.saturating_add(adv);
    }
    if total_units <= 0 {
        return Some(Pt::ZERO);
    }
    Some(font_size.mul_ratio(total_units, 1000))
}

fn detect_direction(text: &str) -> HbDirection {
    for ch in text.chars() {
        let code = ch as u32;
        let rtl = matches!(
            code,
            0x0590..=0x08FF
                | 0xFB1D..=0xFDFF
                | 0xFE70..=0xFEFF
                | 0x1EE00..=0x1EEFF
        );
        if rtl {
            return HbDirection::RightToLeft;
        }
    }
    HbDirection::LeftToRight
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn font_names(face: &ttf_parser::Face<'_>, id: &str) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                if family.is_none() {
                    family = Some(name);
                }
            }
            name_id::FULL_NAME => {
                if full.is_none() {
                    full = Some(name);
                }
            }
            name_id::POST_SCRIPT_NAME => {
                if post.is_none() {
                    post = Some(name);
                }
            }
            _ => {}
        }
    }

    let id = id.trim();
    let primary = if id.is_empty() {
        post.clone()
            .or_else(|| full.clone())
            .or_else(|| family.clone())
            .unwrap_or_else(|| "EmbeddedFont".to_string())
    } else {
        id.to_string()
    };

    // Family names are shared by every face of a family and would shadow the regular face.
    let aliases = [full, post]
        .into_iter()
        .flatten()
        .filter(|candidate| *candidate != primary)
        .collect();
    (primary, aliases)
}

pub(crate) fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_normalize_case_and_quotes() {
        assert_eq!(normalize_name(" 'OpenSans-Light' "), "opensans-light");
        assert_eq!(normalize_name("\"Arial Unicode\""), "arial unicode");
    }

    #[test]
    fn unknown_fonts_measure_approximately() {
        let registry = FontRegistry::new();
        let width = registry.measure_text_width("missing", Pt::from_i32(10), "abcd");
        assert_eq!(width, Pt::from_i32(24));
        assert!(registry.shape("missing", "abcd").is_none());
        assert_eq!(registry.glyph_advance("missing", 3), 0);
    }

    #[test]
    fn invalid_bytes_are_rejected_and_skipped() {
        let mut registry = FontRegistry::new();
        let err = registry
            .register_bytes(b"definitely not a font".to_vec(), "Bogus")
            .expect_err("should fail");
        assert!(matches!(err, CertError::InvalidConfiguration(_)));
        assert!(registry.is_empty());

        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("Broken.ttf"), b"junk").expect("write");
        std::fs::write(dir.path().join("notes.txt"), b"junk").expect("write");
        assert_eq!(registry.register_dir(dir.path()), 0);
        assert!(!registry.contains("Broken"));
    }

    #[test]
    fn rtl_ranges_switch_direction() {
        assert_eq!(detect_direction("abc"), HbDirection::LeftToRight);
        assert_eq!(detect_direction("שלום"), HbDirection::RightToLeft);
    }
}

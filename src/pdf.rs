//! Serializes a recorded [`Document`] into a standalone overlay PDF.
//!
//! Registered fonts are embedded whole as Type0/Identity-H fonts and text is written as
//! shaped glyph runs; names the registry does not know fall back to a WinAnsi base-14
//! font. Streams are written unfiltered: the compositor compresses the final file.

use crate::assets::ImageAsset;
use crate::canvas::{Command, Document, Page};
use crate::error::CertError;
use crate::font::{FontRegistry, RegisteredFont, ShapedGlyph};
use crate::types::{Color, Pt, Size};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;

const PDF_CATALOG_ID: usize = 1;
const PDF_PAGES_ID: usize = 2;

enum PdfObject {
    Dict(String),
    Stream { dict: String, data: Vec<u8> },
}

fn stream_object(dict_entries: &str, data: Vec<u8>) -> PdfObject {
    let dict = if dict_entries.is_empty() {
        format!("<< /Length {} >>", data.len())
    } else {
        format!("<< {} /Length {} >>", dict_entries, data.len())
    };
    PdfObject::Stream { dict, data }
}

/// Object table with ids handed out before bodies are known.
struct ObjectTable {
    objects: BTreeMap<usize, PdfObject>,
    next_id: usize,
}

impl ObjectTable {
    fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            next_id: PDF_PAGES_ID + 1,
        }
    }

    fn reserve(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn set(&mut self, id: usize, object: PdfObject) {
        self.objects.insert(id, object);
    }

    fn push(&mut self, object: PdfObject) -> usize {
        let id = self.reserve();
        self.set(id, object);
        id
    }
}

enum FontEncoding {
    WinAnsi,
    IdentityH,
}

struct FontResource {
    resource: String,
    encoding: FontEncoding,
}

/// Renders `document` to PDF bytes.
pub fn render_overlay(document: &Document, registry: &FontRegistry) -> Result<Vec<u8>, CertError> {
    let font_names = document.font_names();
    let mut font_map: BTreeMap<String, FontResource> = BTreeMap::new();
    for (index, name) in font_names.iter().enumerate() {
        let encoding = if registry.contains(name) {
            FontEncoding::IdentityH
        } else {
            log::debug!("font {name} is not registered; using a base-14 fallback");
            FontEncoding::WinAnsi
        };
        font_map.insert(
            name.clone(),
            FontResource {
                resource: format!("F{}", index + 1),
                encoding,
            },
        );
    }

    let mut shaper = Shaper::new(registry);
    let mut table = ObjectTable::new();

    let image_ids: Vec<&String> = document.images.keys().collect();
    let mut image_resources: HashMap<String, String> = HashMap::new();
    let mut xobjects: Vec<(String, usize)> = Vec::new();
    for (index, resource_id) in image_ids.iter().enumerate() {
        let Some(image) = document.images.get(*resource_id) else {
            continue;
        };
        let name = format!("Im{}", index + 1);
        let image_id = build_image_objects(&mut table, image);
        image_resources.insert((*resource_id).clone(), name.clone());
        xobjects.push((name, image_id));
    }

    let mut page_ids = Vec::new();
    let mut contents = Vec::new();
    for page in &document.pages {
        let rendered = render_page(page, &font_map, &image_resources, &mut shaper);
        contents.push(rendered);
    }

    let mut fonts: Vec<(String, usize)> = Vec::new();
    for name in &font_names {
        let Some(entry) = font_map.get(name) else {
            continue;
        };
        let font_id = match (&entry.encoding, registry.resolve(name)) {
            (FontEncoding::IdentityH, Some(font)) => {
                let glyph_map = shaper.glyph_maps.remove(name).unwrap_or_default();
                build_cidfont_objects(&mut table, font, registry, &glyph_map)
            }
            _ => table.push(PdfObject::Dict(font_object(name))),
        };
        fonts.push((entry.resource.clone(), font_id));
    }

    let resources = format!(
        "<< /ProcSet [/PDF /Text /ImageB /ImageC] /Font {} /XObject {} >>",
        resource_dict(&fonts),
        resource_dict(&xobjects)
    );
    let resources_id = table.push(PdfObject::Dict(resources));

    for rendered in contents {
        let content_id = table.push(stream_object("", rendered.content.into_bytes()));
        let mut annots = Vec::new();
        for link in &rendered.links {
            annots.push(table.push(PdfObject::Dict(link_annotation(link))));
        }
        let page_id = table.push(PdfObject::Dict(page_object(
            document.page_size,
            resources_id,
            content_id,
            &annots,
        )));
        page_ids.push(page_id);
    }

    let kids = page_ids
        .iter()
        .map(|id| format!("{} 0 R", id))
        .collect::<Vec<_>>()
        .join(" ");
    table.set(
        PDF_PAGES_ID,
        PdfObject::Dict(format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids,
            page_ids.len()
        )),
    );
    table.set(
        PDF_CATALOG_ID,
        PdfObject::Dict(format!(
            "<< /Type /Catalog /Pages {} 0 R >>",
            PDF_PAGES_ID
        )),
    );
    let info_id = table.push(PdfObject::Dict(
        "<< /Producer (certstamp) >>".to_string(),
    ));

    Ok(build_pdf(table, PDF_CATALOG_ID, info_id))
}

struct LinkArea {
    x: Pt,
    y: Pt,
    width: Pt,
    height: Pt,
    uri: String,
}

struct RenderedPage {
    content: String,
    links: Vec<LinkArea>,
}

struct TextState {
    font_name: String,
    font_size: Pt,
}

/// Shapes runs once per (font, text) and collects the glyphs each font uses.
struct Shaper<'a> {
    registry: &'a FontRegistry,
    cache: HashMap<(String, String), Option<Vec<ShapedGlyph>>>,
    glyph_maps: HashMap<String, BTreeMap<u16, String>>,
}

impl<'a> Shaper<'a> {
    fn new(registry: &'a FontRegistry) -> Self {
        Self {
            registry,
            cache: HashMap::new(),
            glyph_maps: HashMap::new(),
        }
    }

    fn tj(&mut self, font_name: &str, text: &str) -> Option<String> {
        let registry = self.registry;
        let key = (font_name.to_string(), text.to_string());
        let glyphs = self
            .cache
            .entry(key)
            .or_insert_with(|| registry.shape(font_name, text))
            .as_ref()?;
        let glyph_map = self.glyph_maps.entry(font_name.to_string()).or_default();
        let mut parts: Vec<String> = Vec::new();
        for glyph in glyphs {
            if glyph.gid == 0 {
                continue;
            }
            if !glyph.text.is_empty() {
                glyph_map
                    .entry(glyph.gid)
                    .or_insert_with(|| glyph.text.clone());
            }
            if glyph.x_offset != 0 {
                parts.push(format!("{}", -glyph.x_offset));
            }
            parts.push(format!("<{:04X}>", glyph.gid));
            let adv_default = registry.glyph_advance(font_name, glyph.gid) as i32;
            let adjust = adv_default - glyph.advance;
            if adjust != 0 {
                parts.push(format!("{}", adjust));
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(format!("[{}] TJ\n", parts.join(" ")))
    }
}

fn render_page(
    page: &Page,
    font_map: &BTreeMap<String, FontResource>,
    image_map: &HashMap<String, String>,
    shaper: &mut Shaper<'_>,
) -> RenderedPage {
    let mut out = String::new();
    let mut links = Vec::new();
    let mut state = TextState {
        font_name: String::new(),
        font_size: Pt::from_i32(12),
    };
    let mut stack: Vec<TextState> = Vec::new();

    for command in &page.commands {
        match command {
            Command::SaveState => {
                stack.push(TextState {
                    font_name: state.font_name.clone(),
                    font_size: state.font_size,
                });
                out.push_str("q\n");
            }
            Command::RestoreState => {
                if let Some(previous) = stack.pop() {
                    state = previous;
                }
                out.push_str("Q\n");
            }
            Command::SetFillColor(color) => out.push_str(&color_to_pdf(*color, "rg")),
            Command::SetStrokeColor(color) => out.push_str(&color_to_pdf(*color, "RG")),
            Command::SetLineWidth(width) => {
                let _ = writeln!(out, "{} w", fmt_pt(*width));
            }
            Command::SetFontName(name) => state.font_name = name.clone(),
            Command::SetFontSize(size) => state.font_size = *size,
            Command::MoveTo { x, y } => {
                let _ = writeln!(out, "{} {} m", fmt_pt(*x), fmt_pt(*y));
            }
            Command::LineTo { x, y } => {
                let _ = writeln!(out, "{} {} l", fmt_pt(*x), fmt_pt(*y));
            }
            Command::Stroke => out.push_str("S\n"),
            Command::Fill => out.push_str("f\n"),
            Command::FillStroke => out.push_str("B\n"),
            Command::Rect {
                x,
                y,
                width,
                height,
            } => {
                let _ = writeln!(
                    out,
                    "{} {} {} {} re",
                    fmt_pt(*x),
                    fmt_pt(*y),
                    fmt_pt(*width),
                    fmt_pt(*height)
                );
            }
            Command::DrawString { x, y, text } => {
                let Some(font) = font_map.get(&state.font_name) else {
                    log::warn!("text drawn without a font: {text:?}");
                    continue;
                };
                let show = match font.encoding {
                    FontEncoding::IdentityH => match shaper.tj(&state.font_name, text) {
                        Some(tj) => tj,
                        None => {
                            log::warn!("font {} produced no glyphs for {text:?}", state.font_name);
                            continue;
                        }
                    },
                    FontEncoding::WinAnsi => {
                        format!("({}) Tj\n", encode_winansi_pdf_string(text))
                    }
                };
                let _ = write!(
                    out,
                    "BT\n/{} {} Tf\n{} {} Td\n{}ET\n",
                    font.resource,
                    fmt_pt(state.font_size),
                    fmt_pt(*x),
                    fmt_pt(*y),
                    show
                );
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                let Some(name) = image_map.get(resource_id) else {
                    log::warn!("image {resource_id} was drawn but never registered");
                    continue;
                };
                let _ = write!(
                    out,
                    "q\n{} 0 0 {} {} {} cm\n/{} Do\nQ\n",
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(*y),
                    name
                );
            }
            Command::Link {
                x,
                y,
                width,
                height,
                uri,
            } => links.push(LinkArea {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
                uri: uri.clone(),
            }),
        }
    }

    RenderedPage {
        content: out,
        links,
    }
}

fn page_object(size: Size, resources_id: usize, content_id: usize, annots: &[usize]) -> String {
    let annots = if annots.is_empty() {
        String::new()
    } else {
        format!(
            " /Annots [{}]",
            annots
                .iter()
                .map(|id| format!("{} 0 R", id))
                .collect::<Vec<_>>()
                .join(" ")
        )
    };
    format!(
        "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources {} 0 R /Contents {} 0 R{} >>",
        PDF_PAGES_ID,
        fmt_pt(size.width),
        fmt_pt(size.height),
        resources_id,
        content_id,
        annots
    )
}

fn link_annotation(link: &LinkArea) -> String {
    format!(
        "<< /Type /Annot /Subtype /Link /Rect [{} {} {} {}] /Border [0 0 0] /A << /S /URI /URI ({}) >> >>",
        fmt_pt(link.x),
        fmt_pt(link.y),
        fmt_pt(link.x + link.width),
        fmt_pt(link.y + link.height),
        escape_pdf_string(&link.uri)
    )
}

fn resource_dict(entries: &[(String, usize)]) -> String {
    let mut out = Vec::new();
    for (resource, obj_id) in entries {
        out.push(format!("/{} {} 0 R", resource, obj_id));
    }
    format!("<< {} >>", out.join(" "))
}

fn build_image_objects(table: &mut ObjectTable, image: &ImageAsset) -> usize {
    let smask = image.alpha.as_ref().map(|alpha| {
        table.push(stream_object(
            &format!(
                "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8",
                image.width, image.height
            ),
            alpha.clone(),
        ))
    });
    let smask = smask
        .map(|id| format!(" /SMask {} 0 R", id))
        .unwrap_or_default();
    table.push(stream_object(
        &format!(
            "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB /BitsPerComponent 8{}",
            image.width, image.height, smask
        ),
        image.rgb.clone(),
    ))
}

fn build_cidfont_objects(
    table: &mut ObjectTable,
    font: &RegisteredFont,
    registry: &FontRegistry,
    glyph_map: &BTreeMap<u16, String>,
) -> usize {
    let base = sanitize_font_name(&font.id);
    let font_file_id = table.push(font_file_object(font));
    let descriptor_id = table.push(PdfObject::Dict(font_descriptor_object(font, font_file_id)));

    let used_gids: BTreeSet<u16> = glyph_map.keys().copied().collect();
    let mut w_entries: Vec<String> = Vec::new();
    for gid in &used_gids {
        let adv = registry.glyph_advance(&font.id, *gid);
        let width = if adv > 0 {
            adv
        } else {
            font.metrics.missing_width
        };
        w_entries.push(format!("{} [{}]", gid, width));
    }
    let w_array = if w_entries.is_empty() {
        String::new()
    } else {
        format!(" /W [{}]", w_entries.join(" "))
    };
    let (subtype, gid_map) = if font.metrics.is_cff {
        ("CIDFontType0", "")
    } else {
        ("CIDFontType2", " /CIDToGIDMap /Identity")
    };
    let cid_font_id = table.push(PdfObject::Dict(format!(
        "<< /Type /Font /Subtype /{} /BaseFont /{} /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> /FontDescriptor {} 0 R /DW {}{}{} >>",
        subtype, base, descriptor_id, font.metrics.missing_width, w_array, gid_map
    )));

    let to_unicode_id = table.push(stream_object("", to_unicode_cmap(glyph_map).into_bytes()));
    table.push(PdfObject::Dict(format!(
        "<< /Type /Font /Subtype /Type0 /BaseFont /{} /Encoding /Identity-H /DescendantFonts [{} 0 R] /ToUnicode {} 0 R >>",
        base, cid_font_id, to_unicode_id
    )))
}

fn font_descriptor_object(font: &RegisteredFont, font_file_id: usize) -> String {
    let metrics = &font.metrics;
    let mut flags = 32;
    if metrics.is_fixed_pitch {
        flags |= 1;
    }
    let font_file_entry = if metrics.is_cff {
        "FontFile3"
    } else {
        "FontFile2"
    };
    format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags {} /FontBBox [{} {} {} {}] /ItalicAngle {} /Ascent {} /Descent {} /CapHeight {} /StemV 80 /MissingWidth {} /{} {} 0 R >>",
        sanitize_font_name(&font.id),
        flags,
        metrics.bbox.0,
        metrics.bbox.1,
        metrics.bbox.2,
        metrics.bbox.3,
        metrics.italic_angle,
        metrics.ascent,
        metrics.descent,
        metrics.cap_height,
        metrics.missing_width,
        font_file_entry,
        font_file_id
    )
}

fn font_file_object(font: &RegisteredFont) -> PdfObject {
    let entries = if font.metrics.is_cff {
        "/Subtype /OpenType".to_string()
    } else {
        format!("/Length1 {}", font.data.len())
    };
    stream_object(&entries, font.data.clone())
}

fn font_object(name: &str) -> String {
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        base14_name(name)
    )
}

fn base14_name(name: &str) -> &'static str {
    const BASE14: [&str; 14] = [
        "Courier",
        "Courier-Bold",
        "Courier-Oblique",
        "Courier-BoldOblique",
        "Helvetica",
        "Helvetica-Bold",
        "Helvetica-Oblique",
        "Helvetica-BoldOblique",
        "Times-Roman",
        "Times-Bold",
        "Times-Italic",
        "Times-BoldItalic",
        "Symbol",
        "ZapfDingbats",
    ];
    let wanted = name.trim().to_ascii_lowercase();
    if let Some(exact) = BASE14.iter().find(|b| b.to_ascii_lowercase() == wanted) {
        return exact;
    }
    let bold = wanted.contains("bold");
    let italic = wanted.contains("italic") || wanted.contains("oblique");
    match (bold, italic) {
        (true, true) => "Helvetica-BoldOblique",
        (true, false) => "Helvetica-Bold",
        (false, true) => "Helvetica-Oblique",
        (false, false) => "Helvetica",
    }
}

fn sanitize_font_name(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if ch == ' ' {
            out.push('-');
        }
    }
    if out.is_empty() {
        "Helvetica".to_string()
    } else {
        out
    }
}

fn build_pdf(table: ObjectTable, catalog_id: usize, info_id: usize) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.7\n");
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let size = table.next_id;
    let mut offsets = vec![0usize; size];
    for (obj_id, object) in &table.objects {
        if let Some(slot) = offsets.get_mut(*obj_id) {
            *slot = out.len();
        }
        out.extend_from_slice(format!("{} 0 obj\n", obj_id).as_bytes());
        match object {
            PdfObject::Dict(body) => out.extend_from_slice(body.as_bytes()),
            PdfObject::Stream { dict, data } => {
                out.extend_from_slice(dict.as_bytes());
                out.extend_from_slice(b"\nstream\n");
                out.extend_from_slice(data);
                out.extend_from_slice(b"\nendstream");
            }
        }
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets.iter().skip(1) {
        if *offset == 0 {
            out.extend_from_slice(b"0000000000 65535 f \n");
        } else {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
    }
    let trailer = format!(
        "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF",
        size, catalog_id, info_id, xref_start
    );
    out.extend_from_slice(trailer.as_bytes());
    out
}

fn escape_pdf_string(input: &str) -> String {
    let mut out = String::new();
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

/// Latin-1 subset of WinAnsi; everything else becomes `?`. Non-ASCII bytes are written as
/// octal escapes so the content stream stays ASCII.
fn encode_winansi_pdf_string(input: &str) -> String {
    let mut out = String::new();
    for ch in input.chars() {
        let code = ch as u32;
        match ch {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(ch);
            }
            _ if (0x20..0x7F).contains(&code) => out.push(ch),
            _ if (0xA0..=0xFF).contains(&code) => {
                let _ = write!(out, "\\{:03o}", code);
            }
            _ => out.push('?'),
        }
    }
    out
}

fn to_unicode_cmap(glyph_map: &BTreeMap<u16, String>) -> String {
    let entries: Vec<(u16, &String)> = glyph_map.iter().map(|(g, s)| (*g, s)).collect();

    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    for chunk in entries.chunks(100) {
        let _ = writeln!(out, "{} beginbfchar", chunk.len());
        for (gid, s) in chunk {
            let mut uni = String::new();
            for ch in s.chars() {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    let _ = write!(uni, "{:04X}", unit);
                }
            }
            let _ = writeln!(out, "<{:04X}> <{}>", gid, uni);
        }
        out.push_str("endbfchar\n");
    }

    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        s
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn fmt_unit(value: f32) -> String {
    let clamped = if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    };
    format_milli((clamped * 1000.0).round() as i64)
}

fn color_to_pdf(color: Color, op: &str) -> String {
    format!(
        "{} {} {} {}\n",
        fmt_unit(color.r),
        fmt_unit(color.g),
        fmt_unit(color.b),
        op
    )
}

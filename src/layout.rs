use crate::canvas::Canvas;
use crate::markup::{self, Inline};
use crate::style::{Alignment, TextStyle};
use crate::types::{Color, Pt};

/// Width of a single-font run of text. Implemented by the font registry; tests use
/// fixed-advance measurers.
pub trait TextMeasure {
    fn text_width(&self, font: &str, size: Pt, text: &str) -> Pt;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedRun {
    pub font: String,
    pub text: String,
    /// Offset from the start of the line.
    pub x: Pt,
    pub width: Pt,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Line {
    pub runs: Vec<PlacedRun>,
    pub width: Pt,
}

/// A paragraph broken into lines at one font size.
#[derive(Debug, Clone, PartialEq)]
pub struct LaidOutBlock {
    pub lines: Vec<Line>,
    pub width: Pt,
    pub height: Pt,
    pub font_size: Pt,
    pub leading: Pt,
    pub box_width: Pt,
    pub alignment: Alignment,
    pub color: Color,
}

impl LaidOutBlock {
    pub fn fits(&self, max_width: Pt, max_height: Pt) -> bool {
        self.width <= max_width && self.height <= max_height
    }

    /// Draws with the block's bottom-left corner at `(x, y)`; the first baseline sits one
    /// font size below the top edge.
    pub fn draw_on(&self, canvas: &mut Canvas, x: Pt, y: Pt) {
        let top = y + self.height;
        for (idx, line) in self.lines.iter().enumerate() {
            let baseline = top - self.font_size - self.leading * (idx as i32);
            let offset = match self.alignment {
                Alignment::Left => Pt::ZERO,
                Alignment::Center => (self.box_width - line.width) / 2,
                Alignment::Right => self.box_width - line.width,
            };
            for run in &line.runs {
                let run_x = x + offset + run.x;
                canvas.set_fill_color(self.color);
                canvas.set_font_name(&run.font);
                canvas.set_font_size(self.font_size);
                canvas.draw_string(run_x, baseline, run.text.clone());
                if let Some(uri) = run.link.as_deref().filter(|uri| !uri.is_empty()) {
                    let descent = self.font_size / 5;
                    canvas.link(run_x, baseline - descent, run.width, self.font_size, uri);
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Piece {
    font: String,
    text: String,
    width: Pt,
    link: Option<String>,
}

enum Atom {
    Word(Vec<Piece>),
    Space,
    Break,
}

struct LineBuilder {
    line: Line,
    pending_space: bool,
}

impl LineBuilder {
    fn new() -> Self {
        Self {
            line: Line::default(),
            pending_space: false,
        }
    }

    fn is_empty(&self) -> bool {
        self.line.runs.is_empty()
    }

    fn push_piece(&mut self, piece: Piece) {
        if let Some(last) = self.line.runs.last_mut() {
            if last.font == piece.font && last.link == piece.link {
                last.text.push_str(&piece.text);
                last.width += piece.width;
                self.line.width += piece.width;
                return;
            }
        }
        self.line.runs.push(PlacedRun {
            font: piece.font,
            text: piece.text,
            x: self.line.width,
            width: piece.width,
            link: piece.link,
        });
        self.line.width += piece.width;
    }

    fn take(&mut self) -> Line {
        self.pending_space = false;
        std::mem::take(&mut self.line)
    }
}

/// Breaks `markup` greedily on whitespace to `max_width`. `<br/>` forces a break; a word
/// wider than the box keeps a line of its own.
pub fn layout_paragraph(
    measure: &dyn TextMeasure,
    markup: &str,
    style: &TextStyle,
    max_width: Pt,
) -> LaidOutBlock {
    let size = style.font_size();
    let family = style.family();
    let atoms = atomize(markup, |bold, italic, text| {
        let font = family.face(bold, italic).to_string();
        let width = measure.text_width(&font, size, text);
        (font, width)
    });

    let mut lines: Vec<Line> = Vec::new();
    let mut current = LineBuilder::new();
    let mut last_font = family.regular.clone();

    for atom in atoms {
        match atom {
            Atom::Break => lines.push(current.take()),
            Atom::Space => {
                if !current.is_empty() {
                    current.pending_space = true;
                }
            }
            Atom::Word(pieces) => {
                let word_width: Pt = pieces.iter().map(|p| p.width).sum();
                if !current.is_empty() && current.pending_space {
                    let space_width = measure.text_width(&last_font, size, " ");
                    if current.line.width + space_width + word_width > max_width {
                        lines.push(current.take());
                    } else {
                        let link = current.line.runs.last().and_then(|r| r.link.clone());
                        let link = link.filter(|_| pieces.first().is_some_and(|p| p.link.is_some()));
                        current.push_piece(Piece {
                            font: last_font.clone(),
                            text: " ".to_string(),
                            width: space_width,
                            link,
                        });
                    }
                }
                current.pending_space = false;
                for piece in pieces {
                    last_font = piece.font.clone();
                    current.push_piece(piece);
                }
            }
        }
    }
    if !current.is_empty() {
        lines.push(current.take());
    }

    let width = lines.iter().map(|l| l.width).fold(Pt::ZERO, Pt::max);
    let height = style.leading() * (lines.len() as i32);
    LaidOutBlock {
        lines,
        width,
        height,
        font_size: size,
        leading: style.leading(),
        box_width: max_width,
        alignment: style.alignment(),
        color: style.color(),
    }
}

/// Shrinks font size and leading one point at a time until the block fits the box or the
/// size would drop below one point.
pub fn fit(
    measure: &dyn TextMeasure,
    markup: &str,
    style: &TextStyle,
    max_width: Pt,
    max_height: Pt,
) -> LaidOutBlock {
    let mut size = style.font_size();
    let mut leading = style.leading();
    loop {
        let attempt = style.scaled(size, leading.max(Pt::ZERO));
        let block = layout_paragraph(measure, markup, &attempt, max_width);
        if block.fits(max_width, max_height) || size - Pt::ONE < Pt::ONE {
            return block;
        }
        size -= Pt::ONE;
        leading -= Pt::ONE;
    }
}

fn atomize<F>(markup: &str, mut measure: F) -> Vec<Atom>
where
    F: FnMut(bool, bool, &str) -> (String, Pt),
{
    let mut atoms: Vec<Atom> = Vec::new();
    let mut word: Vec<Piece> = Vec::new();

    let end_word = |atoms: &mut Vec<Atom>, word: &mut Vec<Piece>| {
        if !word.is_empty() {
            atoms.push(Atom::Word(std::mem::take(word)));
        }
    };

    for inline in markup::parse(markup) {
        let span = match inline {
            Inline::Break => {
                end_word(&mut atoms, &mut word);
                atoms.push(Atom::Break);
                continue;
            }
            Inline::Text(span) => span,
        };
        let mut chunk = String::new();
        for ch in span.text.chars() {
            // Non-breaking spaces stay inside words.
            if ch.is_whitespace() && ch != '\u{a0}' {
                if !chunk.is_empty() {
                    let (font, width) = measure(span.bold, span.italic, &chunk);
                    word.push(Piece {
                        font,
                        text: std::mem::take(&mut chunk),
                        width,
                        link: span.link.clone(),
                    });
                }
                end_word(&mut atoms, &mut word);
                if !matches!(atoms.last(), Some(Atom::Space)) {
                    atoms.push(Atom::Space);
                }
            } else {
                chunk.push(ch);
            }
        }
        if !chunk.is_empty() {
            let (font, width) = measure(span.bold, span.italic, &chunk);
            word.push(Piece {
                font,
                text: chunk,
                width,
                link: span.link.clone(),
            });
        }
    }
    end_word(&mut atoms, &mut word);
    atoms
}

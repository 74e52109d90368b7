//! Inline markup used in certificate strings: `<b>`, `<strong>`, `<i>`, `<em>`, `<br/>`,
//! `<a href='...'>` and HTML character references. Other elements contribute their text.

use kuchiki::traits::TendrilSink;
use kuchiki::{NodeData, NodeRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(Span),
    Break,
}

#[derive(Debug, Default)]
struct SpanState {
    bold: usize,
    italic: usize,
    links: Vec<String>,
}

/// Parses `markup` as an HTML body fragment and flattens it into styled runs. Adjacent text
/// with the same style is merged into one span.
pub fn parse(markup: &str) -> Vec<Inline> {
    let wrapped = format!("<body>{markup}</body>");
    let document = kuchiki::parse_html().one(wrapped.as_str());
    let mut out = Vec::new();
    if let Ok(body) = document.select_first("body") {
        let mut state = SpanState::default();
        for child in body.as_node().children() {
            walk(&child, &mut state, &mut out);
        }
    }
    out
}

/// Escapes user-supplied text so it renders literally inside markup.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn walk(node: &NodeRef, state: &mut SpanState, out: &mut Vec<Inline>) {
    match node.data() {
        NodeData::Text(text) => push_text(out, &text.borrow(), state),
        NodeData::Element(element) => {
            let name: &str = &element.name.local;
            match name {
                "br" => {
                    out.push(Inline::Break);
                    return;
                }
                "b" | "strong" => state.bold += 1,
                "i" | "em" => state.italic += 1,
                "a" => {
                    let href = element
                        .attributes
                        .borrow()
                        .get("href")
                        .unwrap_or_default()
                        .to_string();
                    state.links.push(href);
                }
                _ => log::debug!("ignoring unsupported markup tag <{name}>"),
            }
            for child in node.children() {
                walk(&child, state, out);
            }
            match name {
                "b" | "strong" => state.bold -= 1,
                "i" | "em" => state.italic -= 1,
                "a" => {
                    state.links.pop();
                }
                _ => {}
            }
        }
        _ => {}
    }
}

fn push_text(out: &mut Vec<Inline>, text: &str, state: &SpanState) {
    if text.is_empty() {
        return;
    }
    let bold = state.bold > 0;
    let italic = state.italic > 0;
    let link = state.links.last();
    if let Some(Inline::Text(last)) = out.last_mut() {
        if last.bold == bold && last.italic == italic && last.link.as_ref() == link {
            last.text.push_str(text);
            return;
        }
    }
    out.push(Inline::Text(Span {
        text: text.to_string(),
        bold,
        italic,
        link: link.cloned(),
    }));
}

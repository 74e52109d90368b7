//! `{name}` placeholder substitution for descriptor strings and verification pages.

use crate::error::CertError;

/// Replaces `{ident}` with `lookup(ident)`. `{{` and `}}` produce literal braces. When
/// `strict` is set an unresolved identifier fails; otherwise it is left as written, which
/// keeps CSS blocks in HTML pages intact.
pub fn substitute<F>(text: &str, lookup: F, strict: bool) -> Result<String, CertError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix("{{") {
            out.push('{');
            rest = after;
            continue;
        }
        if let Some(after) = tail.strip_prefix("}}") {
            out.push('}');
            rest = after;
            continue;
        }
        if let Some(after) = tail.strip_prefix('{') {
            if let Some(end) = after.find('}') {
                let name = &after[..end];
                if is_identifier(name) {
                    match lookup(name) {
                        Some(value) => out.push_str(&value),
                        None if strict => {
                            let err = CertError::UnknownPlaceholder(name.to_string());
                            log::error!("{err}");
                            return Err(err);
                        }
                        None => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                    continue;
                }
            }
            out.push('{');
            rest = after;
            continue;
        }
        out.push('}');
        rest = &tail[1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

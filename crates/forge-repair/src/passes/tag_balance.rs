use crate::outcome::RepairOptions;
use crate::repairer::{PassResult, RepairPass};
use std::collections::BTreeMap;

/// Counts JSX-like opening and closing tags by name and warns when a name is
/// opened more often than it is closed. Never edits.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagBalancePass;

impl RepairPass for TagBalancePass {
    fn name(&self) -> &'static str {
        "tag-balance"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn apply(&self, text: &str, _options: &RepairOptions) -> PassResult {
        let mut result = PassResult::unchanged();
        for (name, (opened, closed)) in count_tags(text) {
            if opened > closed {
                result = result.with_warning(format!(
                    "possible missing closing tag: <{name}> opened {opened}, closed {closed}"
                ));
            }
        }
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Jsx,
    Brace,
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-' | b':' | b'$')
}

/// Whether a `<` after this byte starts an element rather than a comparison
/// or type argument list
fn opens_markup(prev: Option<u8>, word: &str) -> bool {
    match prev {
        None => true,
        Some(b) if is_ident(b) => word == "return",
        Some(b) => b"(,=?:{};>[&|!".contains(&b),
    }
}

fn read_name(bytes: &[u8], from: usize) -> (String, usize) {
    let mut end = from;
    while end < bytes.len() && is_name_byte(bytes[end]) {
        end += 1;
    }
    (String::from_utf8_lossy(&bytes[from..end]).into_owned(), end)
}

/// Find the `>` ending a tag that starts before `from`; returns its index and
/// whether the tag is self-closing
fn tag_end(bytes: &[u8], from: usize) -> Option<(usize, bool)> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut last_significant = 0u8;
    for (j, &b) in bytes.iter().enumerate().skip(from) {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' if depth == 0 => quote = Some(b),
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b'>' if depth == 0 => return Some((j, last_significant == b'/')),
            _ => {}
        }
        if !b.is_ascii_whitespace() {
            last_significant = b;
        }
    }
    None
}

fn count_tags(text: &str) -> BTreeMap<String, (usize, usize)> {
    let bytes = text.as_bytes();
    let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    let mut stack: Vec<Context> = Vec::new();
    let mut prev: Option<u8> = None;
    let mut word = String::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        let in_jsx = stack.last() == Some(&Context::Jsx);

        if !in_jsx && b == b'/' && next == Some(b'/') {
            i = text[i..].find('\n').map_or(bytes.len(), |n| i + n);
            continue;
        }
        if !in_jsx && b == b'/' && next == Some(b'*') {
            i = text[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
            continue;
        }
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if b == b'<' && next == Some(b'/') {
            let (name, end) = read_name(bytes, i + 2);
            if !name.is_empty() {
                counts.entry(name).or_default().1 += 1;
            }
            while let Some(ctx) = stack.pop() {
                if ctx == Context::Jsx {
                    break;
                }
            }
            i = tag_end(bytes, end).map_or(bytes.len(), |(j, _)| j + 1);
            prev = Some(b'>');
            continue;
        }

        if b == b'<' && (in_jsx || opens_markup(prev, &word)) {
            if next == Some(b'>') {
                stack.push(Context::Jsx);
                i += 2;
                prev = Some(b'>');
                continue;
            }
            if next.is_some_and(|n| n.is_ascii_alphabetic()) {
                let (name, end) = read_name(bytes, i + 1);
                let generic = bytes.get(end) == Some(&b',') || text[end..].starts_with(" extends ");
                if !generic {
                    match tag_end(bytes, end) {
                        Some((j, self_closing)) => {
                            if !self_closing {
                                counts.entry(name).or_default().0 += 1;
                                stack.push(Context::Jsx);
                            }
                            i = j + 1;
                        }
                        None => i = bytes.len(),
                    }
                    prev = Some(b'>');
                    word.clear();
                    continue;
                }
            }
        }

        match b {
            b'{' => stack.push(Context::Brace),
            b'}' => {
                while let Some(ctx) = stack.pop() {
                    if ctx == Context::Brace {
                        break;
                    }
                }
            }
            _ => {}
        }

        if is_ident(b) {
            if !prev.is_some_and(is_ident) {
                word.clear();
            }
            word.push(char::from(b));
        }
        prev = Some(b);
        i += 1;
    }

    counts
}

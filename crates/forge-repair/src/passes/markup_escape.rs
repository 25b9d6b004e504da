use crate::outcome::{fixes, RepairOptions};
use crate::repairer::{PassResult, RepairPass};
use forge_syntax::{children, descendants, named_children, parse, Node, ParsedSource, TextEdits};
use std::ops::Range;

/// Escapes `<` and `>` that were meant as literal text inside JSX.
///
/// Handles three shapes: attribute strings containing markup characters, a
/// stray `>` in element text, and a double-quoted run of element text that
/// the parser read as nested empty elements (`<p>"<svg></svg>"</p>`).
/// Quoted elements with content (`<p>"<b>x</b>"</p>`) are real markup and
/// ordinary JS string literals are never touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupEscapePass;

impl RepairPass for MarkupEscapePass {
    fn name(&self) -> &'static str {
        "markup-escape"
    }

    fn priority(&self) -> i32 {
        40
    }

    fn apply(&self, text: &str, _options: &RepairOptions) -> PassResult {
        let Ok(parsed) = parse(text) else {
            return PassResult::unchanged();
        };

        let mut edits = TextEdits::new();
        for node in descendants(parsed.root()) {
            match node.kind() {
                "jsx_attribute" => escape_attribute(&parsed, node, &mut edits),
                "jsx_element" => {
                    escape_quoted_spans(&parsed, node, &mut edits);
                    escape_stray_gt(&parsed, node, &mut edits);
                }
                _ => {}
            }
        }

        if edits.is_empty() {
            PassResult::unchanged()
        } else {
            PassResult::fixed(edits.apply(text), fixes::MARKUP_ESCAPE)
        }
    }
}

/// `<` → `&lt;`, `>` → `&gt;`
pub(crate) fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

fn push_escape(parsed: &ParsedSource<'_>, range: Range<usize>, edits: &mut TextEdits) {
    if let Some(original) = parsed.text().get(range.clone()) {
        if original.contains(['<', '>']) {
            edits.replace(range, escape_markup(original));
        }
    }
}

fn escape_attribute(parsed: &ParsedSource<'_>, attr: Node<'_>, edits: &mut TextEdits) {
    let Some(value) = named_children(attr).into_iter().find(|n| n.kind() == "string") else {
        return;
    };
    let range = value.byte_range();
    if range.len() >= 2 {
        push_escape(parsed, range.start + 1..range.end - 1, edits);
    }
}

fn is_text(node: Node<'_>) -> bool {
    matches!(node.kind(), "jsx_text" | "html_character_reference")
}

fn is_markup(node: Node<'_>) -> bool {
    matches!(node.kind(), "jsx_element" | "jsx_self_closing_element")
}

fn content_children(element: Node<'_>) -> Vec<Node<'_>> {
    children(element)
        .into_iter()
        .filter(|c| !matches!(c.kind(), "jsx_opening_element" | "jsx_closing_element"))
        .collect()
}

/// Whether `node` is an element that renders nothing: self-closing, or
/// holding only whitespace and other empty elements
fn is_empty_markup(parsed: &ParsedSource<'_>, node: Node<'_>) -> bool {
    match node.kind() {
        "jsx_self_closing_element" => true,
        "jsx_element" => content_children(node).into_iter().all(|child| {
            (child.kind() == "jsx_text" && parsed.slice(child).trim().is_empty())
                || is_empty_markup(parsed, child)
        }),
        _ => false,
    }
}

/// A `"` opened in element text and closed in a later text node, with only
/// empty elements and text in between, marks a literal span.
fn escape_quoted_spans(parsed: &ParsedSource<'_>, element: Node<'_>, edits: &mut TextEdits) {
    let mut open_quote: Option<usize> = None;
    let mut saw_markup = false;
    let mut saw_content = false;

    for child in content_children(element) {
        if is_text(child) {
            let start = child.start_byte();
            for (offset, c) in parsed.slice(child).char_indices() {
                if c != '"' {
                    continue;
                }
                let at = start + offset;
                match open_quote.take() {
                    None => open_quote = Some(at),
                    Some(open) => {
                        if saw_markup && !saw_content {
                            push_escape(parsed, open..at + 1, edits);
                        }
                        saw_markup = false;
                        saw_content = false;
                    }
                }
            }
        } else if is_markup(child) {
            if open_quote.is_some() {
                saw_markup = true;
                saw_content |= !is_empty_markup(parsed, child);
            }
        } else {
            open_quote = None;
            saw_markup = false;
            saw_content = false;
        }
    }
}

/// `>` in element text is a parse error in TSX; escape it where the
/// surrounding content holds no other markup or expressions.
fn escape_stray_gt(parsed: &ParsedSource<'_>, element: Node<'_>, edits: &mut TextEdits) {
    for child in content_children(element) {
        if is_markup(child) || child.kind() == "jsx_expression" || child.kind() == "comment" {
            continue;
        }
        let slice = parsed.slice(child);
        if slice.contains('>') && !slice.contains(['<', '{', '}']) {
            push_escape(parsed, child.byte_range(), edits);
        }
    }
}

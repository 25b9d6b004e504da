//! JSX lowering to `createElement` calls against the shared runtime

use crate::emit::{js_string, unquote, unsupported, Emitter};
use crate::error::CompileError;
use forge_syntax::{children, named_children, Node};

/// Local the prelude binds the JSX runtime to
pub(crate) const JSX_LOCAL: &str = "__forge_jsx";

const TEXT_KINDS: &[&str] = &["jsx_text", "html_character_reference"];

impl Emitter<'_, '_> {
    /// Lower one element (or fragment) and everything nested in it
    pub(crate) fn lower_jsx(&mut self, node: Node<'_>) -> Result<String, CompileError> {
        self.uses_jsx = true;

        let (opening, closing) = if node.kind() == "jsx_self_closing_element" {
            (node, None)
        } else {
            let Some(open) = node.child_by_field_name("open_tag") else {
                return Err(unsupported("jsx element without opening tag", node));
            };
            (open, node.child_by_field_name("close_tag"))
        };

        let mut args = vec![self.element_type(opening), self.props(opening)?];
        if let Some(close) = closing {
            self.element_children(node, opening, close, &mut args)?;
        }
        Ok(format!("{JSX_LOCAL}.createElement({})", args.join(", ")))
    }

    fn element_type(&self, opening: Node<'_>) -> String {
        let Some(name) = opening.child_by_field_name("name") else {
            return format!("{JSX_LOCAL}.Fragment");
        };
        let text = self.text(name);
        let intrinsic = name.kind() != "member_expression"
            && (text.starts_with(|c: char| c.is_ascii_lowercase())
                || text.contains('-')
                || text.contains(':'));
        if intrinsic {
            js_string(text)
        } else {
            text.to_string()
        }
    }

    fn props(&mut self, opening: Node<'_>) -> Result<String, CompileError> {
        let mut entries = Vec::new();
        for attr in named_children(opening) {
            match attr.kind() {
                "jsx_attribute" => {
                    let parts = named_children(attr);
                    let Some(name) = parts.first() else {
                        continue;
                    };
                    let key = property_key(self.text(*name));
                    let value = match parts.get(1) {
                        None => "true".to_string(),
                        Some(value) => self.attribute_value(*value)?,
                    };
                    entries.push(format!("{key}: {value}"));
                }
                // {...spread}
                "jsx_expression" => {
                    if let Some(inner) = expression_of(attr) {
                        entries.push(self.emit_to_string(inner)?);
                    }
                }
                _ => {}
            }
        }
        if entries.is_empty() {
            Ok("null".to_string())
        } else {
            Ok(format!("{{{}}}", entries.join(", ")))
        }
    }

    fn attribute_value(&mut self, value: Node<'_>) -> Result<String, CompileError> {
        match value.kind() {
            "string" => Ok(js_string(&decode_entities(unquote(self.text(value))))),
            "jsx_expression" => match expression_of(value) {
                Some(inner) => self.emit_to_string(inner),
                None => Err(unsupported("empty jsx attribute expression", value)),
            },
            "jsx_element" | "jsx_self_closing_element" => self.lower_jsx(value),
            _ => self.emit_to_string(value),
        }
    }

    fn element_children(
        &mut self,
        node: Node<'_>,
        opening: Node<'_>,
        closing: Node<'_>,
        args: &mut Vec<String>,
    ) -> Result<(), CompileError> {
        let mut cursor = opening.end_byte();
        for child in children(node) {
            if child.id() == opening.id() || child.id() == closing.id() {
                continue;
            }
            if TEXT_KINDS.contains(&child.kind()) {
                continue;
            }
            self.push_text(cursor, child.start_byte(), args);
            cursor = child.end_byte();
            match child.kind() {
                "jsx_element" | "jsx_self_closing_element" => args.push(self.lower_jsx(child)?),
                "jsx_expression" => {
                    if let Some(inner) = expression_of(child) {
                        args.push(self.emit_to_string(inner)?);
                    }
                }
                _ => {}
            }
        }
        self.push_text(cursor, closing.start_byte(), args);
        Ok(())
    }

    fn push_text(&self, start: usize, end: usize, args: &mut Vec<String>) {
        if start >= end {
            return;
        }
        let cleaned = clean_text(&decode_entities(self.between(start, end)));
        if !cleaned.is_empty() {
            args.push(js_string(&cleaned));
        }
    }

    fn emit_to_string(&mut self, node: Node<'_>) -> Result<String, CompileError> {
        let mut out = String::new();
        self.emit_node(node, &mut out)?;
        Ok(out)
    }
}

fn expression_of(container: Node<'_>) -> Option<Node<'_>> {
    named_children(container)
        .into_iter()
        .find(|c| c.kind() != "comment")
}

fn property_key(name: &str) -> String {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if valid {
        name.to_string()
    } else {
        js_string(name)
    }
}

/// Collapse JSX text the way React tooling does: lines are trimmed where they
/// meet a line break, blank lines vanish and the rest join with one space.
pub(crate) fn clean_text(raw: &str) -> String {
    let lines: Vec<&str> = raw.split("\r\n").flat_map(|l| l.split(['\n', '\r'])).collect();
    let last_non_empty = lines
        .iter()
        .rposition(|l| l.chars().any(|c| c != ' ' && c != '\t'))
        .unwrap_or(0);

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let mut line = line.replace('\t', " ");
        if i != 0 {
            line = line.trim_start_matches(' ').to_string();
        }
        if i != lines.len() - 1 {
            line = line.trim_end_matches(' ').to_string();
        }
        if !line.is_empty() {
            out.push_str(&line);
            if i != last_non_empty {
                out.push(' ');
            }
        }
    }
    out
}

/// Replace HTML character references; unknown ones stay as written
pub(crate) fn decode_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .get(1..tail.len().min(12))
            .and_then(|window| window.find(';'))
            .and_then(|semi| Some((entity(&tail[1..=semi])?, semi + 2)));
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    Some(match name {
        "lt" => '<',
        "gt" => '>',
        "amp" => '&',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "hellip" => '\u{2026}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "laquo" => '\u{ab}',
        "raquo" => '\u{bb}',
        "times" => '\u{d7}',
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CompileOptions;
    use forge_syntax::parse;
    use pretty_assertions::assert_eq;

    fn lower(source: &str) -> String {
        let parsed = parse(source).unwrap();
        let options = CompileOptions::default().with_external("react");
        let mut emitter = Emitter::new(&parsed, &options);
        let out = emitter.emit_program().unwrap();
        assert!(emitter.uses_jsx);
        out
    }

    #[test]
    fn intrinsic_element_with_text() {
        assert_eq!(
            lower("const a = <div className=\"x\">Hi</div>;"),
            "const a = __forge_jsx.createElement(\"div\", {className: \"x\"}, \"Hi\");"
        );
    }

    #[test]
    fn fragments_and_components() {
        assert_eq!(
            lower("const a = <><Clip n={1} /></>;"),
            "const a = __forge_jsx.createElement(__forge_jsx.Fragment, null, __forge_jsx.createElement(Clip, {n: 1}));"
        );
    }

    #[test]
    fn member_tags_are_references() {
        assert_eq!(
            lower("const a = <motion.div />;"),
            "const a = __forge_jsx.createElement(motion.div, null);"
        );
    }

    #[test]
    fn spread_and_quoted_keys() {
        assert_eq!(
            lower("const a = <div {...rest} aria-label=\"a\" hidden />;"),
            "const a = __forge_jsx.createElement(\"div\", {...rest, \"aria-label\": \"a\", hidden: true});"
        );
    }

    #[test]
    fn multiline_text_collapses() {
        assert_eq!(
            lower("const a = <p>\n  Hello\n  world\n</p>;"),
            "const a = __forge_jsx.createElement(\"p\", null, \"Hello world\");"
        );
    }

    #[test]
    fn expressions_and_nested_elements() {
        assert_eq!(
            lower("const a = <ul>{xs.map((x) => <li key={x}>{x}</li>)}</ul>;"),
            "const a = __forge_jsx.createElement(\"ul\", null, xs.map((x) => __forge_jsx.createElement(\"li\", {key: x}, x)));"
        );
    }

    #[test]
    fn mixed_text_and_expressions() {
        assert_eq!(
            lower("const a = <p>Hi {name}!</p>;"),
            "const a = __forge_jsx.createElement(\"p\", null, \"Hi \", name, \"!\");"
        );
    }

    #[test]
    fn comment_children_vanish() {
        assert_eq!(
            lower("const a = <div>{/* note */}</div>;"),
            "const a = __forge_jsx.createElement(\"div\", null);"
        );
    }

    #[test]
    fn entities_decode_to_literal_text() {
        assert_eq!(
            lower("const a = <p>\"&lt;svg&gt;&lt;/svg&gt;\"</p>;"),
            "const a = __forge_jsx.createElement(\"p\", null, \"\\\"<svg></svg>\\\"\");"
        );
        assert_eq!(decode_entities("a &amp; b &#65;&#x42; &bogus;"), "a & b AB &bogus;");
    }

    #[test]
    fn clean_text_rules() {
        assert_eq!(clean_text("  a  "), "  a  ");
        assert_eq!(clean_text("\n   \n"), "");
        assert_eq!(clean_text("a\n\tb\n"), "a b");
    }
}

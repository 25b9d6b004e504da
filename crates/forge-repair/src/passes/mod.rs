//! Built-in repair passes

use crate::outcome::RepairOptions;
use crate::repairer::RepairPass;
use forge_syntax::{
    global_registrations, is_component_name, scan_exports, top_level_declarations, ParsedSource,
    TextEdits,
};
use std::ops::Range;

mod duplicate_binding;
mod markup_escape;
mod missing_export;
mod registration;
mod tag_balance;

pub use duplicate_binding::DuplicateBindingPass;
pub use markup_escape::MarkupEscapePass;
pub use missing_export::MissingExportPass;
pub use registration::RegistrationStylePass;
pub use tag_balance::TagBalancePass;

/// Passes used by [`crate::repair`]
#[must_use]
pub fn default_passes() -> Vec<Box<dyn RepairPass>> {
    vec![
        Box::new(DuplicateBindingPass),
        Box::new(MarkupEscapePass),
        Box::new(RegistrationStylePass),
        Box::new(MissingExportPass),
        Box::new(TagBalancePass),
    ]
}

/// Turn the statement at `range` into a comment.
///
/// A statement alone on its lines gets `// ` on every line. Otherwise it is
/// wrapped in a block comment, or removed when it already contains `*/`.
pub(crate) fn disable_statement(text: &str, range: Range<usize>, edits: &mut TextEdits) {
    let before = text.get(..range.start).unwrap_or("");
    let after = text.get(range.end..).unwrap_or("");
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let line_end = after.find('\n').map_or(text.len(), |i| range.end + i);

    let alone = text.get(line_start..range.start).is_some_and(|s| s.trim().is_empty())
        && text.get(range.end..line_end).is_some_and(|s| s.trim().is_empty());
    let statement = text.get(range.clone()).unwrap_or("");

    if alone {
        let mut offset = range.start;
        for line in statement.split('\n') {
            if !line.trim().is_empty() {
                let indent = line.len() - line.trim_start().len();
                edits.insert(offset + indent, "// ");
            }
            offset += line.len() + 1;
        }
    } else if statement.contains("*/") {
        edits.replace(range, "");
    } else {
        edits.insert(range.start, "/* ");
        edits.insert(range.end, " */");
    }
}

/// Append `line` on its own line at the end of `text`
pub(crate) fn append_line(text: &str, line: &str) -> String {
    let mut out = String::with_capacity(text.len() + line.len() + 2);
    out.push_str(text);
    if !text.is_empty() && !text.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(line);
    out.push('\n');
    out
}

/// Pick the identifier that most likely names the component
pub(crate) fn component_candidate(parsed: &ParsedSource<'_>, options: &RepairOptions) -> Option<String> {
    let declarations = top_level_declarations(parsed);

    if !options.wants_default()
        && declarations.iter().any(|d| d.name == options.export_name)
    {
        return Some(options.export_name.clone());
    }

    let exports = scan_exports(parsed);
    if let Some(local) = exports
        .default_export()
        .filter(|e| e.callable)
        .and_then(|e| e.local.clone())
    {
        return Some(local);
    }

    if let Some(reg) = global_registrations(parsed)
        .into_iter()
        .find(|r| declarations.iter().any(|d| d.name == r.target))
    {
        return Some(reg.target);
    }

    let mut components = declarations
        .iter()
        .filter(|d| d.callable && is_component_name(&d.name));
    match (components.next(), components.next()) {
        (Some(only), None) => Some(only.name.clone()),
        _ => None,
    }
}

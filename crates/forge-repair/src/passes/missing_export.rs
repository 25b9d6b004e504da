use super::{append_line, component_candidate};
use crate::outcome::{fixes, RepairOptions};
use crate::repairer::{PassResult, RepairPass};
use forge_syntax::{parse, scan_exports, top_level_declarations};

/// Appends an export for a top-level declaration the caller expects to be
/// exported but which is not.
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingExportPass;

impl RepairPass for MissingExportPass {
    fn name(&self) -> &'static str {
        "missing-export"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn apply(&self, text: &str, options: &RepairOptions) -> PassResult {
        let Ok(parsed) = parse(text) else {
            return PassResult::unchanged();
        };
        if parsed.has_errors() {
            return PassResult::unchanged();
        }
        let exports = scan_exports(&parsed);

        let line = if options.wants_default() {
            if exports.default_export().is_some() {
                return PassResult::unchanged();
            }
            match component_candidate(&parsed, options) {
                Some(name) => format!("export default {name};"),
                None => return PassResult::unchanged(),
            }
        } else {
            let name = options.export_name.as_str();
            if exports.exports_binding(name) {
                return PassResult::unchanged();
            }
            if !top_level_declarations(&parsed).iter().any(|d| d.name == name) {
                return PassResult::unchanged();
            }
            if exports.default_export().is_some() {
                format!("export {{ {name} }};")
            } else {
                format!("export default {name};")
            }
        };

        PassResult::fixed(append_line(text, &line), fixes::MISSING_EXPORT)
    }
}

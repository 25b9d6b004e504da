use super::{append_line, component_candidate, disable_statement};
use crate::outcome::{fixes, RepairMode, RepairOptions};
use crate::repairer::{PassResult, RepairPass};
use forge_syntax::{global_registrations, parse, scan_exports, top_level_declarations, TextEdits};

/// Normalizes how the component is exposed.
///
/// In module mode, `window.X = Component` style assignments are disabled and
/// replaced by a default export. In global-slot mode, a keyed registration
/// for the slot is appended when missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrationStylePass;

impl RepairPass for RegistrationStylePass {
    fn name(&self) -> &'static str {
        "registration-style"
    }

    fn priority(&self) -> i32 {
        30
    }

    fn apply(&self, text: &str, options: &RepairOptions) -> PassResult {
        let Ok(parsed) = parse(text) else {
            return PassResult::unchanged();
        };
        if parsed.has_errors() {
            return PassResult::unchanged();
        }

        match &options.mode {
            RepairMode::Module => {
                let declarations = top_level_declarations(&parsed);
                let registrations: Vec<_> = global_registrations(&parsed)
                    .into_iter()
                    .filter(|r| declarations.iter().any(|d| d.name == r.target && d.callable))
                    .collect();
                let Some(first) = registrations.first() else {
                    return PassResult::unchanged();
                };

                let mut edits = TextEdits::new();
                for reg in &registrations {
                    disable_statement(text, reg.statement.clone(), &mut edits);
                }
                let mut rewritten = edits.apply(text);
                if scan_exports(&parsed).default_export().is_none() {
                    rewritten = append_line(&rewritten, &format!("export default {};", first.target));
                }
                PassResult::fixed(rewritten, fixes::REGISTRATION_TO_EXPORT)
            }
            RepairMode::GlobalSlot { slot } => {
                let registered = global_registrations(&parsed)
                    .iter()
                    .any(|r| r.keyed && r.slot.as_deref() == Some(slot.as_str()));
                if registered {
                    return PassResult::unchanged();
                }
                let Some(component) = component_candidate(&parsed, options) else {
                    return PassResult::unchanged()
                        .with_warning("no component found to register for the global slot");
                };
                let key = serde_json::to_string(slot).unwrap_or_else(|_| format!("\"{slot}\""));
                let line = format!("(globalThis.__FORGE_COMPONENTS__ ??= {{}})[{key}] = {component};");
                PassResult::fixed(append_line(text, &line), fixes::REGISTRATION_ADDED)
            }
        }
    }
}

//! Single-entry compile: parse, lower, wrap, verify

use crate::emit::Emitter;
use crate::error::CompileError;
use crate::jsx::JSX_LOCAL;
use crate::options::{CompileOptions, CompiledModule};
use forge_artifact::{ModuleFormat, ModuleHeader};
use forge_syntax::{global_registrations, parse, ParsedSource};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::debug;

/// Global the loader glue publishes shared modules under
pub const SHARED_GLOBAL: &str = "__FORGE_SHARED__";

const PRELUDE: &str = r#"const __forge_registry = globalThis.__FORGE_SHARED__;
const __forge_shared = (name) => {
  const entry = __forge_registry == null ? undefined : __forge_registry[name];
  if (entry === undefined) {
    throw new Error("shared module \"" + name + "\" is not registered");
  }
  return entry;
};
const __forge_default = (m) => (m != null && "default" in Object(m) ? m.default : m);
"#;

/// Compile one repaired TSX source into a browser module.
///
/// Shared modules named in `options.external_names` are looked up at load
/// time and never inlined. The output is a pure function of the inputs.
///
/// # Errors
/// Any [`CompileError`] except `WorkerLost`, which only the pool produces.
#[tracing::instrument(skip_all, fields(format = %options.format, bytes = source.len()))]
pub fn compile(source: &str, options: &CompileOptions) -> Result<CompiledModule, CompileError> {
    let started = Instant::now();

    let parsed = parse(source).map_err(|e| CompileError::Internal(e.to_string()))?;
    if let Some(issue) = parsed.first_issue() {
        return Err(CompileError::syntax(issue));
    }
    if options.format == ModuleFormat::GlobalSlot {
        require_registration(&parsed, options.slot_key.as_deref())?;
    }

    let mut emitter = Emitter::new(&parsed, options);
    let body = emitter.emit_program()?;
    let mut used = emitter.used;
    let uses_jsx = emitter.uses_jsx;

    if uses_jsx {
        if !options.external_names.contains(&options.jsx_runtime) {
            return Err(CompileError::MissingJsxRuntime {
                runtime: options.jsx_runtime.clone(),
            });
        }
        used.insert(options.jsx_runtime.clone());
    }

    let code = wrap(options, uses_jsx, &body);
    check_leaks(&code, options)?;

    let header = ModuleHeader {
        format: options.format,
        externals: used.clone(),
    };
    let mut text = header.render();
    text.push('\n');
    text.push_str(&code);

    let duration = started.elapsed();
    debug!(
        bytes = text.len(),
        externals = used.len(),
        elapsed_ms = duration.as_millis() as u64,
        "compiled module"
    );

    Ok(CompiledModule {
        bytes: text.into_bytes(),
        external_names_used: used,
        duration,
        format: options.format,
    })
}

fn require_registration(parsed: &ParsedSource<'_>, slot: Option<&str>) -> Result<(), CompileError> {
    let found = global_registrations(parsed)
        .iter()
        .filter(|r| r.keyed)
        .any(|r| slot.is_none() || r.slot.as_deref() == slot);
    if found {
        Ok(())
    } else {
        Err(CompileError::MissingRegistration {
            slot: slot.map(str::to_string),
        })
    }
}

fn wrap(options: &CompileOptions, uses_jsx: bool, body: &str) -> String {
    let mut code = String::with_capacity(PRELUDE.len() + body.len() + 64);
    if options.format == ModuleFormat::GlobalSlot {
        code.push_str("(function () {\n\"use strict\";\n");
    }
    code.push_str(PRELUDE);
    if uses_jsx {
        code.push_str(&format!(
            "const {JSX_LOCAL} = __forge_shared({});\n",
            crate::emit::js_string(&options.jsx_runtime)
        ));
    }
    code.push_str(body);
    if !body.ends_with('\n') {
        code.push('\n');
    }
    if options.format == ModuleFormat::GlobalSlot {
        code.push_str("})();\n");
    }
    code
}

fn check_leaks(code: &str, options: &CompileOptions) -> Result<(), CompileError> {
    let externals: &BTreeSet<String> = &options.external_names;
    for (name, markers) in &options.leak_markers {
        if !externals.contains(name) {
            continue;
        }
        if let Some(marker) = markers.iter().find(|m| !m.is_empty() && code.contains(m.as_str())) {
            return Err(CompileError::ExternalLeak {
                name: name.clone(),
                marker: marker.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn react() -> CompileOptions {
        CompileOptions::default().with_external("react")
    }

    const CLIP: &str = "import { useState } from \"react\";\n\nexport default function Clip(props: { n: number }) {\n  const [n] = useState<number>(props.n);\n  return <b>{n}</b>;\n}\n";

    #[test]
    fn module_output_layout() {
        let module = compile(CLIP, &react()).unwrap();
        let text = module.text();

        assert!(text.starts_with("/* forge-module format=module externals=react */\n"));
        assert!(text.contains("const __forge_jsx = __forge_shared(\"react\");\n"));
        assert!(text.contains("const { useState } = __forge_shared(\"react\");"));
        assert!(text.contains("export default function Clip(props) {"));
        assert!(text.contains("__forge_jsx.createElement(\"b\", null, n)"));
        assert!(!text.contains("import "));
        assert_eq!(module.external_names_used, BTreeSet::from(["react".to_string()]));
        assert_eq!(module.format, ModuleFormat::Module);
    }

    #[test]
    fn syntax_errors_fail_fast() {
        let err = compile("export default function Clip() {\n  return <div>;\n", &react()).unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }), "{err}");
    }

    #[test]
    fn jsx_needs_an_external_runtime() {
        let err = compile("export default () => <div />;", &CompileOptions::default()).unwrap_err();
        assert_eq!(
            err,
            CompileError::MissingJsxRuntime {
                runtime: "react".into()
            }
        );
    }

    #[test]
    fn no_jsx_means_no_runtime() {
        let module = compile("export const add = (a: number, b: number) => a + b;", &CompileOptions::default()).unwrap();
        assert!(module.external_names_used.is_empty());
        assert!(!module.text().contains(JSX_LOCAL));
        assert!(module.text().starts_with("/* forge-module format=module externals= */\n"));
    }

    #[test]
    fn leak_markers_are_checked() {
        let options = react().with_leak_marker("react", "__REACT_INTERNALS__");
        let err = compile("export default () => globalThis.__REACT_INTERNALS__;", &options).unwrap_err();
        assert_eq!(
            err,
            CompileError::ExternalLeak {
                name: "react".into(),
                marker: "__REACT_INTERNALS__".into()
            }
        );
        assert!(compile(CLIP, &options).is_ok());
    }

    #[test]
    fn global_slot_requires_keyed_registration() {
        let options = react().with_format(ModuleFormat::GlobalSlot).with_slot_key("job-1");
        let err = compile("export default function Clip() { return null; }", &options).unwrap_err();
        assert_eq!(
            err,
            CompileError::MissingRegistration {
                slot: Some("job-1".into())
            }
        );

        let source = "function Clip() { return null; }\n(globalThis.__FORGE_COMPONENTS__ ??= {})[\"job-1\"] = Clip;\n";
        let module = compile(source, &options).unwrap();
        let text = module.text();
        assert!(text.starts_with("/* forge-module format=global-slot externals= */\n(function () {\n\"use strict\";\n"));
        assert!(text.ends_with("})();\n"));
        assert!(text.contains("[\"job-1\"] = Clip;"));
    }
}

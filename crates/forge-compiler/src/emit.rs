//! Source-to-source emitter
//!
//! Walks the tree and copies source text, dropping TypeScript-only syntax,
//! lowering imports to shared-registry lookups and handing JSX to
//! [`crate::jsx`]. Text between child nodes is copied verbatim, so comments
//! and formatting survive wherever nothing was rewritten.

use crate::error::CompileError;
use crate::options::CompileOptions;
use forge_artifact::ModuleFormat;
use forge_syntax::{children, named_children, Node, ParsedSource};
use std::collections::BTreeSet;

/// Local the legacy format binds `export default <expr>` to
pub(crate) const DEFAULT_EXPORT_LOCAL: &str = "__forge_default_export";

/// Nodes that only carry types and vanish from the output
const TYPE_ONLY: &[&str] = &[
    "type_annotation",
    "type_parameters",
    "type_arguments",
    "interface_declaration",
    "type_alias_declaration",
    "implements_clause",
    "accessibility_modifier",
    "override_modifier",
    "ambient_declaration",
    "type_predicate_annotation",
    "asserts_annotation",
    "opting_type_annotation",
    "omitting_type_annotation",
    "abstract_method_signature",
    "index_signature",
    "function_signature",
    "method_signature",
];

/// Keyword tokens dropped wherever they appear as direct children
const TYPE_ONLY_TOKENS: &[&str] = &["abstract", "readonly", "declare", "override", "?", "!"];

pub(crate) struct Emitter<'a, 's> {
    pub(crate) parsed: &'a ParsedSource<'s>,
    pub(crate) options: &'a CompileOptions,
    pub(crate) used: BTreeSet<String>,
    pub(crate) uses_jsx: bool,
}

impl<'a, 's> Emitter<'a, 's> {
    pub(crate) fn new(parsed: &'a ParsedSource<'s>, options: &'a CompileOptions) -> Self {
        Self {
            parsed,
            options,
            used: BTreeSet::new(),
            uses_jsx: false,
        }
    }

    pub(crate) fn emit_program(&mut self) -> Result<String, CompileError> {
        let parsed = self.parsed;
        let mut out = String::with_capacity(parsed.text().len());
        self.emit_node(parsed.root(), &mut out)?;
        Ok(out)
    }

    pub(crate) fn text(&self, node: Node<'_>) -> &'s str {
        self.parsed.slice(node)
    }

    pub(crate) fn between(&self, start: usize, end: usize) -> &'s str {
        self.parsed.text().get(start..end).unwrap_or("")
    }

    pub(crate) fn emit_node(&mut self, node: Node<'_>, out: &mut String) -> Result<(), CompileError> {
        let kind = node.kind();
        if TYPE_ONLY.contains(&kind) {
            return Ok(());
        }
        match kind {
            "as_expression" | "satisfies_expression" | "non_null_expression" => {
                match named_children(node).into_iter().find(|c| c.kind() != "comment") {
                    Some(inner) => self.emit_node(inner, out),
                    None => Ok(()),
                }
            }
            "enum_declaration" => Err(unsupported("enum", node)),
            "internal_module" | "module" => Err(unsupported("namespace", node)),
            "decorator" => Err(unsupported("decorator", node)),
            "import_alias" | "import_require_clause" => Err(unsupported("import = require()", node)),
            "hash_bang_line" => Ok(()),
            "import_statement" => self.emit_import(node, out),
            "export_statement" => self.emit_export(node, out),
            "jsx_element" | "jsx_self_closing_element" => {
                let lowered = self.lower_jsx(node)?;
                out.push_str(&lowered);
                Ok(())
            }
            "required_parameter" | "optional_parameter" => {
                if children(node)
                    .iter()
                    .any(|c| c.kind() == "accessibility_modifier" || c.kind() == "readonly")
                {
                    return Err(unsupported("constructor parameter property", node));
                }
                self.emit_filtered(node, out)
            }
            "public_field_definition" => {
                if children(node).iter().any(|c| c.kind() == "declare") {
                    return Ok(());
                }
                self.emit_filtered(node, out)
            }
            "abstract_class_declaration" | "class_declaration" | "class" | "method_definition" => {
                self.emit_filtered(node, out)
            }
            _ => self.emit_children(node, out, |_| true),
        }
    }

    /// Copy `node`, recursing into children accepted by `keep`
    pub(crate) fn emit_children(
        &mut self,
        node: Node<'_>,
        out: &mut String,
        keep: impl Fn(Node<'_>) -> bool,
    ) -> Result<(), CompileError> {
        let mut cursor = node.start_byte();
        for child in children(node) {
            out.push_str(self.between(cursor, child.start_byte()));
            if keep(child) {
                self.emit_node(child, out)?;
            }
            cursor = child.end_byte();
        }
        out.push_str(self.between(cursor, node.end_byte()));
        Ok(())
    }

    /// Copy `node` without TypeScript-only keyword tokens
    fn emit_filtered(&mut self, node: Node<'_>, out: &mut String) -> Result<(), CompileError> {
        self.emit_children(node, out, |c| c.is_named() || !TYPE_ONLY_TOKENS.contains(&c.kind()))
    }

    fn mark_external(&mut self, specifier: &str) -> Result<(), CompileError> {
        if !self.options.external_names.contains(specifier) {
            return Err(CompileError::UnresolvedImport {
                specifier: specifier.to_string(),
            });
        }
        self.used.insert(specifier.to_string());
        Ok(())
    }

    fn emit_import(&mut self, node: Node<'_>, out: &mut String) -> Result<(), CompileError> {
        let parts = children(node);
        if parts.iter().any(|c| c.kind() == "type" && !c.is_named()) {
            return Ok(());
        }
        if parts.iter().any(|c| c.kind() == "import_require_clause") {
            return Err(unsupported("import = require()", node));
        }
        let Some(source) = node.child_by_field_name("source") else {
            return Err(unsupported("import without source", node));
        };
        let specifier = unquote(self.text(source));
        let shared = format!("__forge_shared({})", js_string(specifier));

        let Some(clause) = parts.iter().copied().find(|c| c.kind() == "import_clause") else {
            self.mark_external(specifier)?;
            out.push_str(&shared);
            out.push(';');
            return Ok(());
        };

        let mut statements = Vec::new();
        for item in named_children(clause) {
            match item.kind() {
                "identifier" => statements.push(format!(
                    "const {} = __forge_default({shared});",
                    self.text(item)
                )),
                "namespace_import" => {
                    if let Some(local) = named_children(item).into_iter().find(|n| n.kind() == "identifier") {
                        statements.push(format!("const {} = {shared};", self.text(local)));
                    }
                }
                "named_imports" => {
                    let bindings: Vec<String> = named_children(item)
                        .into_iter()
                        .filter(|s| s.kind() == "import_specifier")
                        .filter(|s| !children(*s).iter().any(|t| t.kind() == "type" && !t.is_named()))
                        .filter_map(|s| {
                            let name = s.child_by_field_name("name")?;
                            Some(match s.child_by_field_name("alias") {
                                Some(alias) => format!("{}: {}", self.text(name), self.text(alias)),
                                None => self.text(name).to_string(),
                            })
                        })
                        .collect();
                    if !bindings.is_empty() {
                        statements.push(format!("const {{ {} }} = {shared};", bindings.join(", ")));
                    }
                }
                _ => {}
            }
        }

        if statements.is_empty() {
            // only type imports
            return Ok(());
        }
        self.mark_external(specifier)?;
        out.push_str(&statements.join(" "));
        Ok(())
    }

    fn emit_export(&mut self, node: Node<'_>, out: &mut String) -> Result<(), CompileError> {
        let parts = children(node);
        let has_token = |kind: &str| parts.iter().any(|c| !c.is_named() && c.kind() == kind);

        if has_token("type") {
            return Ok(());
        }
        if has_token("=") {
            return Err(unsupported("export =", node));
        }
        if has_token("namespace") {
            return Ok(());
        }
        if node.child_by_field_name("source").is_some() {
            return Err(unsupported("re-export from another module", node));
        }

        let declaration = node.child_by_field_name("declaration");
        if let Some(decl) = declaration {
            if matches!(
                decl.kind(),
                "interface_declaration" | "type_alias_declaration" | "ambient_declaration" | "function_signature"
            ) {
                return Ok(());
            }
        }

        match self.options.format {
            ModuleFormat::Module => self.emit_children(node, out, |_| true),
            ModuleFormat::GlobalSlot => {
                if let Some(decl) = declaration {
                    return self.emit_node(decl, out);
                }
                if let Some(value) = node.child_by_field_name("value") {
                    out.push_str("const ");
                    out.push_str(DEFAULT_EXPORT_LOCAL);
                    out.push_str(" = ");
                    self.emit_node(value, out)?;
                    out.push(';');
                }
                Ok(())
            }
        }
    }
}

pub(crate) fn unsupported(construct: &'static str, node: Node<'_>) -> CompileError {
    CompileError::Unsupported {
        construct,
        line: node.start_position().row + 1,
    }
}

/// Strip the quotes of a string literal
pub(crate) fn unquote(literal: &str) -> &str {
    let bytes = literal.as_bytes();
    if literal.len() >= 2
        && matches!(bytes[0], b'"' | b'\'')
        && bytes[literal.len() - 1] == bytes[0]
    {
        &literal[1..literal.len() - 1]
    } else {
        literal
    }
}

/// JS string literal for `value`
pub(crate) fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| String::from("\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_syntax::parse;
    use pretty_assertions::assert_eq;

    fn emit(source: &str, options: &CompileOptions) -> Result<String, CompileError> {
        let parsed = parse(source).unwrap();
        Emitter::new(&parsed, options).emit_program()
    }

    fn react() -> CompileOptions {
        CompileOptions::default().with_external("react")
    }

    #[test]
    fn strips_type_annotations() {
        let out = emit(
            "function add(a: number, b?: number): number { return a + (b ?? 0); }",
            &react(),
        )
        .unwrap();
        assert_eq!(out, "function add(a, b) { return a + (b ?? 0); }");
    }

    #[test]
    fn drops_interfaces_and_type_aliases() {
        let out = emit("interface P { a: string }\ntype Q = P;\nconst x = 1;", &react()).unwrap();
        assert_eq!(out.trim(), "const x = 1;");
    }

    #[test]
    fn unwraps_assertions() {
        let out = emit("const a = (b as number) + c!;\nconst d = e satisfies F;", &react()).unwrap();
        assert_eq!(out, "const a = (b) + c;\nconst d = e;");
    }

    #[test]
    fn generic_calls_lose_type_arguments() {
        let out = emit("const [n, setN] = useState<number>(0);", &react()).unwrap();
        assert_eq!(out, "const [n, setN] = useState(0);");
    }

    #[test]
    fn lowers_imports() {
        let out = emit(
            "import React, { useState as useS, useEffect } from \"react\";\nimport * as R from 'react';\nimport \"react\";",
            &react(),
        )
        .unwrap();
        assert_eq!(
            out,
            "const React = __forge_default(__forge_shared(\"react\")); const { useState: useS, useEffect } = __forge_shared(\"react\");\nconst R = __forge_shared(\"react\");\n__forge_shared(\"react\");"
        );
    }

    #[test]
    fn type_imports_vanish() {
        let out = emit("import type { FC } from \"./types\";\nconst a = 1;", &react()).unwrap();
        assert_eq!(out.trim(), "const a = 1;");
    }

    #[test]
    fn unknown_import_is_unresolved() {
        assert_eq!(
            emit("import _ from \"lodash\";", &react()),
            Err(CompileError::UnresolvedImport {
                specifier: "lodash".into()
            })
        );
    }

    #[test]
    fn enums_are_unsupported() {
        assert!(matches!(
            emit("const a = 1;\nenum Color { Red }", &react()),
            Err(CompileError::Unsupported { construct: "enum", line: 2 })
        ));
    }

    #[test]
    fn reexports_are_unsupported() {
        assert!(matches!(
            emit("export { a } from \"react\";", &react()),
            Err(CompileError::Unsupported { .. })
        ));
    }

    #[test]
    fn class_members_lose_modifiers() {
        let out = emit(
            "class A implements B { private x: number = 1; readonly y = 2; m(): void {} }",
            &react(),
        )
        .unwrap();
        assert_eq!(out, "class A  {  x = 1;  y = 2; m() {} }");
    }

    #[test]
    fn global_slot_exports_become_locals() {
        let options = react().with_format(ModuleFormat::GlobalSlot);
        let out = emit(
            "export const a = 1;\nexport default function Clip() {}\nexport { a as b };",
            &options,
        )
        .unwrap();
        assert_eq!(out, "const a = 1;\nfunction Clip() {}\n");

        let out = emit("export default () => null;", &options).unwrap();
        assert_eq!(out, "const __forge_default_export = () => null;");
    }

    #[test]
    fn js_string_escapes() {
        assert_eq!(js_string("a\"b"), "\"a\\\"b\"");
        assert_eq!(unquote("'react'"), "react");
    }
}

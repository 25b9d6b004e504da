//! Top-level declaration, export and registration scanning

use crate::tree::{children, named_children, ParsedSource};
use std::ops::Range;
use tree_sitter::Node;

/// Global objects a component may attach itself to in the explicit-attach style
pub const GLOBAL_ROOTS: [&str; 3] = ["window", "globalThis", "self"];

/// Kind of a top-level declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    /// `function Name() {}`
    Function,
    /// `class Name {}`
    Class,
    /// `const`/`let`/`var` binding
    Variable,
}

/// A name bound at module top level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Bound identifier
    pub name: String,
    /// Declaration form
    pub kind: DeclarationKind,
    /// Whether the bound value is callable (function, class, arrow, memo wrapper)
    pub callable: bool,
    /// Byte range of the declaring statement
    pub range: Range<usize>,
}

/// One exported binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedItem {
    /// Exported name (`"default"` for the default export)
    pub exported: String,
    /// Local binding behind the export, when there is one
    pub local: Option<String>,
    /// Whether the exported value is callable
    pub callable: bool,
}

/// Exports of one module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportScan {
    /// Exports in source order
    pub items: Vec<ExportedItem>,
}

impl ExportScan {
    /// The default export, if any
    #[must_use]
    pub fn default_export(&self) -> Option<&ExportedItem> {
        self.items.iter().find(|i| i.exported == "default")
    }

    /// Named (non-default) exports
    pub fn named(&self) -> impl Iterator<Item = &ExportedItem> {
        self.items.iter().filter(|i| i.exported != "default")
    }

    /// Whether `name` is exported, either under its own name or as the local
    /// binding behind another export
    #[must_use]
    pub fn exports_binding(&self, name: &str) -> bool {
        self.items
            .iter()
            .any(|i| i.exported == name || i.local.as_deref() == Some(name))
    }
}

/// Assignment of a component onto a global object, e.g. `window.Clip = Clip`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalRegistration {
    /// Byte range of the whole statement
    pub statement: Range<usize>,
    /// Global root (`window`, `globalThis`, `self`)
    pub root: String,
    /// Identifier assigned
    pub target: String,
    /// Key the value is stored under (property name or string index)
    pub slot: Option<String>,
    /// Whether the assignment goes through the keyed component table
    pub keyed: bool,
}

/// Whether `name` follows component naming (leading uppercase letter)
#[inline]
#[must_use]
pub fn is_component_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Collect top-level declarations, looking through `export` wrappers
#[must_use]
pub fn top_level_declarations(parsed: &ParsedSource<'_>) -> Vec<Declaration> {
    declarations_in(parsed, parsed.root())
}

/// Collect the declarations made directly in `scope` (a program or block)
#[must_use]
pub fn declarations_in(parsed: &ParsedSource<'_>, scope: Node<'_>) -> Vec<Declaration> {
    let mut out = Vec::new();
    for stmt in named_children(scope) {
        let target = if stmt.kind() == "export_statement" {
            match stmt.child_by_field_name("declaration") {
                Some(decl) => decl,
                None => continue,
            }
        } else {
            stmt
        };
        collect_declaration(parsed, target, stmt.byte_range(), &mut out);
    }
    out
}

fn collect_declaration(
    parsed: &ParsedSource<'_>,
    node: Node<'_>,
    range: Range<usize>,
    out: &mut Vec<Declaration>,
) {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            if let Some(name) = node.child_by_field_name("name") {
                out.push(Declaration {
                    name: parsed.slice(name).to_string(),
                    kind: DeclarationKind::Function,
                    callable: true,
                    range,
                });
            }
        }
        "class_declaration" | "abstract_class_declaration" => {
            if let Some(name) = node.child_by_field_name("name") {
                out.push(Declaration {
                    name: parsed.slice(name).to_string(),
                    kind: DeclarationKind::Class,
                    callable: true,
                    range,
                });
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            for declarator in named_children(node) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let Some(name) = declarator.child_by_field_name("name") else {
                    continue;
                };
                if name.kind() != "identifier" {
                    continue;
                }
                let callable = declarator
                    .child_by_field_name("value")
                    .is_some_and(|v| value_is_callable(parsed, v, &[]));
                out.push(Declaration {
                    name: parsed.slice(name).to_string(),
                    kind: DeclarationKind::Variable,
                    callable,
                    range: range.clone(),
                });
            }
        }
        _ => {}
    }
}

fn value_is_callable(parsed: &ParsedSource<'_>, node: Node<'_>, decls: &[Declaration]) -> bool {
    match node.kind() {
        "arrow_function" | "function_expression" | "function" | "generator_function" | "class" => {
            true
        }
        "parenthesized_expression" => named_children(node)
            .into_iter()
            .find(|n| n.kind() != "comment")
            .is_some_and(|inner| value_is_callable(parsed, inner, decls)),
        "identifier" => {
            let name = parsed.slice(node);
            decls.iter().any(|d| d.name == name && d.callable)
        }
        "call_expression" => node.child_by_field_name("function").is_some_and(|callee| {
            let callee = parsed.slice(callee);
            callee.ends_with("memo") || callee.ends_with("forwardRef")
        }),
        _ => false,
    }
}

/// Collect the exports of a module
#[must_use]
pub fn scan_exports(parsed: &ParsedSource<'_>) -> ExportScan {
    let decls = top_level_declarations(parsed);
    let mut items = Vec::new();

    for stmt in named_children(parsed.root()) {
        if stmt.kind() != "export_statement" {
            continue;
        }
        let is_default = children(stmt).iter().any(|c| c.kind() == "default");
        let reexport = stmt.child_by_field_name("source").is_some();

        if let Some(decl) = stmt.child_by_field_name("declaration") {
            let mut found = Vec::new();
            collect_declaration(parsed, decl, stmt.byte_range(), &mut found);
            for d in found {
                items.push(ExportedItem {
                    exported: if is_default { "default".to_string() } else { d.name.clone() },
                    local: Some(d.name),
                    callable: d.callable,
                });
            }
            continue;
        }

        if let Some(value) = stmt.child_by_field_name("value") {
            let local = (value.kind() == "identifier").then(|| parsed.slice(value).to_string());
            items.push(ExportedItem {
                exported: "default".to_string(),
                local,
                callable: value_is_callable(parsed, value, &decls),
            });
            continue;
        }

        for clause in named_children(stmt) {
            if clause.kind() != "export_clause" {
                continue;
            }
            for spec in named_children(clause) {
                if spec.kind() != "export_specifier" {
                    continue;
                }
                let Some(name) = spec.child_by_field_name("name") else {
                    continue;
                };
                let local = parsed.slice(name).to_string();
                let exported = spec
                    .child_by_field_name("alias")
                    .map_or_else(|| local.clone(), |a| parsed.slice(a).to_string());
                let callable = !reexport && decls.iter().any(|d| d.name == local && d.callable);
                items.push(ExportedItem {
                    exported,
                    local: (!reexport).then_some(local),
                    callable,
                });
            }
        }
    }

    ExportScan { items }
}

/// Find top-level statements that attach an identifier to a global object
#[must_use]
pub fn global_registrations(parsed: &ParsedSource<'_>) -> Vec<GlobalRegistration> {
    registrations_in(parsed, parsed.root())
}

/// Registrations made directly in `scope` (a program or block)
#[must_use]
pub fn registrations_in(parsed: &ParsedSource<'_>, scope: Node<'_>) -> Vec<GlobalRegistration> {
    let mut out = Vec::new();
    for stmt in named_children(scope) {
        if stmt.kind() != "expression_statement" {
            continue;
        }
        let Some(assign) = named_children(stmt).into_iter().find(|n| n.kind() == "assignment_expression")
        else {
            continue;
        };
        let (Some(left), Some(right)) = (
            assign.child_by_field_name("left"),
            assign.child_by_field_name("right"),
        ) else {
            continue;
        };
        if right.kind() != "identifier" {
            continue;
        }
        let mut keyed = false;
        let Some(root) = global_root(parsed, left, &mut keyed) else {
            continue;
        };
        out.push(GlobalRegistration {
            statement: stmt.byte_range(),
            root,
            target: parsed.slice(right).to_string(),
            slot: slot_key(parsed, left),
            keyed,
        });
    }
    out
}

/// Body of a script that is one immediately invoked function,
/// `(function () { ... })();` or `(() => { ... })();`
#[must_use]
pub fn iife_body<'t>(parsed: &'t ParsedSource<'_>) -> Option<Node<'t>> {
    let mut statements = named_children(parsed.root())
        .into_iter()
        .filter(|n| n.kind() != "comment");
    let stmt = statements.next()?;
    if statements.next().is_some() || stmt.kind() != "expression_statement" {
        return None;
    }
    let call = named_children(stmt).into_iter().find(|n| n.kind() == "call_expression")?;
    let mut callee = call.child_by_field_name("function")?;
    while callee.kind() == "parenthesized_expression" {
        callee = named_children(callee).into_iter().find(|n| n.kind() != "comment")?;
    }
    if !matches!(callee.kind(), "function_expression" | "function" | "arrow_function") {
        return None;
    }
    callee
        .child_by_field_name("body")
        .filter(|body| body.kind() == "statement_block")
}

fn global_root(parsed: &ParsedSource<'_>, node: Node<'_>, keyed: &mut bool) -> Option<String> {
    match node.kind() {
        "member_expression" | "subscript_expression" => {
            if let Some(prop) = node.child_by_field_name("property") {
                if parsed.slice(prop) == "__FORGE_COMPONENTS__" {
                    *keyed = true;
                }
            }
            global_root(parsed, node.child_by_field_name("object")?, keyed)
        }
        "parenthesized_expression" => {
            let inner = named_children(node).into_iter().find(|n| n.kind() != "comment")?;
            global_root(parsed, inner, keyed)
        }
        "augmented_assignment_expression" | "assignment_expression" => {
            global_root(parsed, node.child_by_field_name("left")?, keyed)
        }
        "identifier" => {
            let name = parsed.slice(node);
            GLOBAL_ROOTS.contains(&name).then(|| name.to_string())
        }
        _ => None,
    }
}

fn slot_key(parsed: &ParsedSource<'_>, left: Node<'_>) -> Option<String> {
    match left.kind() {
        "member_expression" => left
            .child_by_field_name("property")
            .map(|p| parsed.slice(p).to_string()),
        "subscript_expression" => {
            let index = left.child_by_field_name("index")?;
            let text = parsed.slice(index);
            if index.kind() == "string" && text.len() >= 2 {
                text.get(1..text.len() - 1).map(str::to_string)
            } else {
                Some(text.to_string())
            }
        }
        _ => None,
    }
}

use super::disable_statement;
use crate::outcome::{fixes, RepairOptions};
use crate::repairer::{PassResult, RepairPass};
use forge_syntax::{descendants, named_children, parse, Node, ParsedSource, TextEdits};
use std::collections::HashSet;

/// Disables `const`/`let` statements that redeclare a name already bound in
/// the same block or program scope. The first binding stays live.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateBindingPass;

impl RepairPass for DuplicateBindingPass {
    fn name(&self) -> &'static str {
        "duplicate-binding"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn apply(&self, text: &str, _options: &RepairOptions) -> PassResult {
        let Ok(parsed) = parse(text) else {
            return PassResult::unchanged();
        };

        let mut edits = TextEdits::new();
        for scope in descendants(parsed.root()) {
            if matches!(scope.kind(), "program" | "statement_block") {
                disable_duplicates_in(&parsed, scope, &mut edits);
            }
        }

        if edits.is_empty() {
            PassResult::unchanged()
        } else {
            PassResult::fixed(edits.apply(text), fixes::DUPLICATE_BINDING)
        }
    }
}

fn disable_duplicates_in(parsed: &ParsedSource<'_>, scope: Node<'_>, edits: &mut TextEdits) {
    let mut seen: HashSet<&str> = HashSet::new();

    for stmt in named_children(scope) {
        if stmt.kind() == "lexical_declaration" && !stmt.has_error() {
            let names = declarator_names(parsed, stmt);
            if !names.is_empty() && names.iter().all(|n| seen.contains(n)) {
                disable_statement(parsed.text(), stmt.byte_range(), edits);
                continue;
            }
        }
        let declared = if stmt.kind() == "export_statement" {
            stmt.child_by_field_name("declaration")
        } else {
            Some(stmt)
        };
        if let Some(decl) = declared {
            seen.extend(bound_names(parsed, decl));
        }
    }
}

/// Names bound by the declarators of `decl`, destructuring included
fn declarator_names<'s>(parsed: &ParsedSource<'s>, decl: Node<'_>) -> Vec<&'s str> {
    let mut names = Vec::new();
    for declarator in named_children(decl) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        if let Some(pattern) = declarator.child_by_field_name("name") {
            pattern_names(parsed, pattern, &mut names);
        }
    }
    names
}

/// Binding identifiers of a pattern; keys and default values bind nothing
fn pattern_names<'s>(parsed: &ParsedSource<'s>, pattern: Node<'_>, out: &mut Vec<&'s str>) {
    match pattern.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => out.push(parsed.slice(pattern)),
        "pair_pattern" => {
            if let Some(value) = pattern.child_by_field_name("value") {
                pattern_names(parsed, value, out);
            }
        }
        "assignment_pattern" | "object_assignment_pattern" => {
            if let Some(left) = pattern.child_by_field_name("left") {
                pattern_names(parsed, left, out);
            }
        }
        "object_pattern" | "array_pattern" | "rest_pattern" => {
            for child in named_children(pattern) {
                pattern_names(parsed, child, out);
            }
        }
        _ => {}
    }
}

fn bound_names<'s>(parsed: &ParsedSource<'s>, decl: Node<'_>) -> Vec<&'s str> {
    match decl.kind() {
        "function_declaration" | "generator_function_declaration" | "class_declaration"
        | "abstract_class_declaration" => decl
            .child_by_field_name("name")
            .map(|n| vec![parsed.slice(n)])
            .unwrap_or_default(),
        "lexical_declaration" | "variable_declaration" => declarator_names(parsed, decl),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(text: &str) -> PassResult {
        DuplicateBindingPass.apply(text, &RepairOptions::default())
    }

    #[test]
    fn second_binding_is_commented_out() {
        let result = run("const a = f();\nconst a = f();\nuse(a);\n");
        assert_eq!(
            result.text.as_deref(),
            Some("const a = f();\n// const a = f();\nuse(a);\n")
        );
        assert_eq!(result.fixes, vec![fixes::DUPLICATE_BINDING.to_string()]);
    }

    #[test]
    fn distinct_scopes_are_independent() {
        let result = run("const a = 1;\nfunction f() {\n  const a = 2;\n  return a;\n}\n");
        assert_eq!(result, PassResult::unchanged());
    }

    #[test]
    fn duplicate_inside_function_body() {
        let result = run("function f() {\n  let x = 1;\n  let x = 2;\n  return x;\n}\n");
        assert_eq!(
            result.text.as_deref(),
            Some("function f() {\n  let x = 1;\n  // let x = 2;\n  return x;\n}\n")
        );
    }

    #[test]
    fn redeclaring_a_function_name() {
        let result = run("function Clip() {}\nconst Clip = () => null;\n");
        assert!(result.text.unwrap().contains("// const Clip"));
    }

    #[test]
    fn partial_duplicate_is_left_alone() {
        assert_eq!(run("const a = 1;\nconst a = 2, b = 3;\n"), PassResult::unchanged());
    }

    #[test]
    fn var_redeclaration_is_legal() {
        assert_eq!(run("var a = 1;\nvar a = 2;\n"), PassResult::unchanged());
    }

    #[test]
    fn duplicate_object_destructuring() {
        let result = run("const { fps } = cfg();\nconst { fps } = cfg();\nuse(fps);\n");
        assert_eq!(
            result.text.as_deref(),
            Some("const { fps } = cfg();\n// const { fps } = cfg();\nuse(fps);\n")
        );
    }

    #[test]
    fn duplicate_array_destructuring() {
        let result = run("let [n, setN] = state(0);\nlet [n, setN] = state(0);\n");
        assert!(result.text.unwrap().contains("// let [n, setN]"));
    }

    #[test]
    fn nested_rest_and_default_patterns() {
        let source = "const { a: { b }, c = d, ...rest } = x;\nconst b = 1, c = 2, rest = 3;\n";
        assert!(run(source).text.unwrap().contains("// const b = 1"));
    }

    #[test]
    fn default_value_names_are_not_bindings() {
        let source = "const { a = fallback } = x;\nconst fallback = 1;\n";
        assert_eq!(run(source), PassResult::unchanged());
    }

    #[test]
    fn destructuring_that_adds_a_name_is_kept() {
        let source = "const { fps } = cfg();\nconst { fps, width } = cfg();\n";
        assert_eq!(run(source), PassResult::unchanged());
    }
}

//! Parsing entry point and tree helpers

use std::cell::RefCell;
use std::fmt::{self, Display, Formatter};
use tree_sitter::{Node, Parser, Tree};

/// Errors that prevent a tree from being produced at all.
///
/// A source with syntax errors still parses; those are reported through
/// [`ParsedSource::first_issue`].
#[derive(Debug, thiserror::Error)]
pub enum SyntaxError {
    /// The TSX grammar is incompatible with the linked tree-sitter runtime
    #[error("tsx grammar could not be loaded: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    /// The parser gave up without a tree
    #[error("parser produced no tree")]
    NoTree,
}

/// First syntax problem found in a tree
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SyntaxIssue {
    /// 1-based line
    pub line: usize,
    /// 1-based column (bytes)
    pub column: usize,
    /// Short description
    pub message: String,
}

impl Display for SyntaxIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}: {}", self.line, self.column, self.message)
    }
}

thread_local! {
    static PARSER: RefCell<Option<Parser>> = const { RefCell::new(None) };
}

/// Parse TSX source text.
///
/// Parsers are cached per thread, so repeated calls from the compile pool
/// do not reload the grammar.
///
/// # Errors
/// Returns [`SyntaxError`] only when no tree can be built.
pub fn parse(text: &str) -> Result<ParsedSource<'_>, SyntaxError> {
    PARSER.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            let mut parser = Parser::new();
            let language: tree_sitter::Language = tree_sitter_typescript::LANGUAGE_TSX.into();
            parser.set_language(&language)?;
            *slot = Some(parser);
        }
        let parser = slot.as_mut().ok_or(SyntaxError::NoTree)?;
        let tree = parser.parse(text, None).ok_or(SyntaxError::NoTree)?;
        Ok(ParsedSource { text, tree })
    })
}

/// A syntax tree together with its source text
pub struct ParsedSource<'s> {
    text: &'s str,
    tree: Tree,
}

impl std::fmt::Debug for ParsedSource<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedSource")
            .field("len", &self.text.len())
            .field("has_errors", &self.has_errors())
            .finish()
    }
}

impl<'s> ParsedSource<'s> {
    /// Source text the tree was built from
    #[inline]
    #[must_use]
    pub fn text(&self) -> &'s str {
        self.text
    }

    /// Root (`program`) node
    #[inline]
    #[must_use]
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Source text covered by `node`
    #[inline]
    #[must_use]
    pub fn slice(&self, node: Node<'_>) -> &'s str {
        self.text.get(node.start_byte()..node.end_byte()).unwrap_or("")
    }

    /// Whether the tree contains any error or missing node
    #[inline]
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Earliest error or missing node in document order
    #[must_use]
    pub fn first_issue(&self) -> Option<SyntaxIssue> {
        let root = self.tree.root_node();
        if !root.has_error() {
            return None;
        }

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.is_missing() {
                return Some(self.issue_at(node, format!("missing `{}`", node.kind())));
            }
            if node.is_error() {
                let snippet: String = self
                    .slice(node)
                    .lines()
                    .next()
                    .unwrap_or("")
                    .trim()
                    .chars()
                    .take(24)
                    .collect();
                return Some(self.issue_at(node, format!("unexpected `{snippet}`")));
            }
            let mut kids: Vec<Node<'_>> =
                children(node).into_iter().filter(Node::has_error).collect();
            kids.reverse();
            stack.extend(kids);
        }

        // has_error() was set but no specific node surfaced
        Some(SyntaxIssue {
            line: 1,
            column: 1,
            message: "unparseable source".to_string(),
        })
    }

    fn issue_at(&self, node: Node<'_>, message: String) -> SyntaxIssue {
        let point = node.start_position();
        SyntaxIssue {
            line: point.row + 1,
            column: point.column + 1,
            message,
        }
    }
}

/// All children of `node`, anonymous tokens included
#[must_use]
pub fn children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

/// Named children of `node`
#[must_use]
pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Every node below (and including) `node`, in document order
#[must_use]
pub fn descendants(node: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        out.push(current);
        let mut kids = children(current);
        kids.reverse();
        stack.extend(kids);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_tsx() {
        let parsed = parse("const a: number = 1;\nexport default function A() { return <div>{a}</div>; }")
            .unwrap();
        assert!(!parsed.has_errors());
        assert!(parsed.first_issue().is_none());
        assert_eq!(parsed.root().kind(), "program");
    }

    #[test]
    fn reports_first_issue_position() {
        let parsed = parse("const a = 1;\nconst = ;\n").unwrap();
        assert!(parsed.has_errors());
        let issue = parsed.first_issue().unwrap();
        assert_eq!(issue.line, 2);
        assert!(issue.to_string().starts_with("line 2"));
    }

    #[test]
    fn slice_matches_node_text() {
        let parsed = parse("let answer = 42;").unwrap();
        let decl = named_children(parsed.root())[0];
        assert_eq!(parsed.slice(decl), "let answer = 42;");
    }

    #[test]
    fn descendants_are_in_document_order() {
        let parsed = parse("a; b;").unwrap();
        let idents: Vec<&str> = descendants(parsed.root())
            .into_iter()
            .filter(|n| n.kind() == "identifier")
            .map(|n| parsed.slice(n))
            .collect();
        assert_eq!(idents, vec!["a", "b"]);
    }
}

//! Forge Syntax
//!
//! Lightweight syntactic view of generated component sources.
//!
//! # Core Concepts
//!
//! - [`ParsedSource`]: a tree-sitter TSX tree bound to the text it was parsed from
//! - [`SyntaxIssue`]: the first error or missing token, with a 1-based position
//! - [`TextEdits`]: non-overlapping byte-range replacements applied in one pass
//! - [`scan_exports`] / [`top_level_declarations`]: what a module declares and exports
//!
//! This is not a type checker. It answers "does this parse" and "what is
//! declared where", which is all the repairer, compiler and loader need.
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_syntax::{parse, scan_exports};
//!
//! let parsed = parse("export default function Clip() { return null; }")?;
//! assert!(!parsed.has_errors());
//! assert!(scan_exports(&parsed).default_export().is_some());
//! ```

#![warn(unreachable_pub)]

mod edits;
mod scan;
mod tree;

pub use edits::TextEdits;
pub use scan::{
    declarations_in, global_registrations, iife_body, is_component_name, registrations_in,
    scan_exports, top_level_declarations, Declaration, DeclarationKind, ExportScan, ExportedItem,
    GlobalRegistration, GLOBAL_ROOTS,
};
pub use tree::{children, descendants, named_children, parse, ParsedSource, SyntaxError, SyntaxIssue};

/// Re-export of the tree-sitter node type used throughout the workspace
pub use tree_sitter::Node;

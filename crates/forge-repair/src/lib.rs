//! Forge Repair
//!
//! Best-effort validation and repair of generated component source before it
//! reaches the compiler.
//!
//! # Core Concepts
//!
//! - [`repair`]: run the default passes; pure, never fails
//! - [`RepairPass`]: one heuristic, swappable without touching callers
//! - [`Repairer`]: ordered pass set (higher priority first)
//! - [`RepairOutcome`]: repaired text, fix messages, warnings, parse status
//!
//! The passes are deliberately pattern based. Each one is idempotent, so
//! repairing an already-repaired source reports no fixes.
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_repair::{repair, RepairOptions};
//!
//! let outcome = repair(source, &RepairOptions::module("Clip"));
//! if outcome.still_invalid {
//!     eprintln!("{}", outcome.parse_error.unwrap_or_default());
//! }
//! ```

#![warn(unreachable_pub)]

mod outcome;
mod repairer;

pub mod passes;

pub use outcome::{fixes, RepairMode, RepairOptions, RepairOutcome};
pub use repairer::{PassResult, RepairPass, Repairer};

use once_cell::sync::Lazy;

static DEFAULT_REPAIRER: Lazy<Repairer> = Lazy::new(Repairer::default);

/// Repair `source` with the default passes
#[must_use]
pub fn repair(source: &str, options: &RepairOptions) -> RepairOutcome {
    DEFAULT_REPAIRER.run(source, options)
}

//! Forge Compiler
//!
//! Turns one repaired TSX component into a self-contained browser module.
//!
//! # Core Concepts
//!
//! - [`compile`]: strip types, lower JSX and imports, wrap, verify
//! - [`CompileOptions`]: shared modules to externalize, output format, JSX runtime
//! - [`CompilePool`]: bounded FIFO worker pool so compiles never block the runtime
//!
//! Shared modules are never bundled. An `import { useState } from "react"`
//! becomes a lookup in `globalThis.__FORGE_SHARED__`, which the host fills
//! from its [`forge_registry::SharedRegistry`] before any module runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_compiler::{compile, CompileOptions};
//!
//! let options = CompileOptions::default().with_external("react");
//! let module = compile("export default () => <p>hi</p>;", &options)?;
//! assert!(module.external_names_used.contains("react"));
//! ```

#![warn(unreachable_pub)]

mod compile;
mod emit;
mod error;
mod jsx;
mod options;
mod pool;

pub use compile::{compile, SHARED_GLOBAL};
pub use error::CompileError;
pub use options::{CompileOptions, CompiledModule};
pub use pool::{default_worker_count, CompilePool, PoolStats};

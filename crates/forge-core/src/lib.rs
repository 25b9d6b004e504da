//! Forge Core
//!
//! Job model and build orchestration for generated components.
//!
//! # Core Concepts
//!
//! - [`ComponentJob`]: one component build; retries are new attempts of the same job
//! - [`JobStatus`]: Pending → Validating → (Fixable → Fixing) → Compiling → Ready | Failed
//! - [`BuildPipeline`]: repair, compile on the pool, store, record
//! - [`JobStatusView`]: the only surface outer layers read
//! - [`ForgeConfig`]: TOML configuration with `FORGE_*` overrides
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_core::{BuildPipeline, ForgeConfig, JobRequest};
//! use forge_registry::SharedRegistry;
//! use std::sync::Arc;
//!
//! let config = ForgeConfig::load("forge.toml")?;
//! let registry = Arc::clone(SharedRegistry::global());
//! config.register_shared(&registry);
//!
//! let pipeline = BuildPipeline::from_config(&config, registry)?;
//! let view = pipeline.submit_and_run(JobRequest::new("project-1", source)).await?;
//! println!("{} {:?}", view.status, view.artifact_url);
//! ```

#![warn(unreachable_pub)]

mod config;
mod error;
mod job;
mod pipeline;

pub mod logging;

pub use config::{
    CompileSection, ForgeConfig, LoaderSection, ServerSection, SharedDeclaration, StoreSection,
    ENV_BIND, ENV_PUBLIC_URL, ENV_STORE_ROOT, ENV_WORKERS,
};
pub use error::{ConfigError, PipelineError, TRY_AGAIN};
pub use job::{validate_transition, ComponentJob, JobId, JobRequest, JobStatus, JobStatusView};
pub use pipeline::BuildPipeline;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

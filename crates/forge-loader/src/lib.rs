//! Forge Loader
//!
//! Fetches compiled component modules by URL and hands them to the host with
//! their shared instances attached.
//!
//! # Core Concepts
//!
//! - [`ComponentLoader`]: one per mount point; Idle → Loading → Loaded | Errored
//! - [`RefreshToken`]: changing it reloads the same URL (`?v=<token>`)
//! - [`RetryPolicy`]: exponential backoff for transient failures, capped attempts
//! - [`ModuleFetcher`]: where bytes come from ([`HttpFetcher`] in production)
//!
//! A load only succeeds when the module parses, exposes something
//! component-like, and every shared module it asks for is registered.
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_loader::{ComponentLoader, HttpFetcher};
//! use forge_registry::SharedRegistry;
//! use std::sync::Arc;
//!
//! let loader = ComponentLoader::new(Arc::new(HttpFetcher::new()), Arc::clone(SharedRegistry::global()));
//! loader.set_source(Some(&artifact.storage_url), artifact.content_hash.to_string());
//! let view = loader.settled().await;
//! ```

#![warn(unreachable_pub)]

mod error;
mod fetch;
mod loader;
mod module;
mod request;
mod retry;

pub use error::LoadError;
pub use fetch::{is_javascript, FetchedModule, HttpFetcher, ModuleFetcher};
pub use loader::{AttemptOutcome, ComponentLoader, LoadAttempt, LoadState, LoaderSettings, LoaderView};
pub use module::LoadedComponent;
pub use request::{cache_busted_url, RefreshToken, REFRESH_PARAM};
pub use retry::RetryPolicy;

//! Forge Registry
//!
//! Single live instance of each host library, shared by every loaded
//! component.
//!
//! The compiler reads [`SharedRegistry::list_names`] to decide what to leave
//! out of a bundle, and the loader calls [`SharedRegistry::resolve`] to hand
//! the real instances to a module. Most hosts use [`SharedRegistry::global`].

#![warn(unreachable_pub)]

mod registry;

pub use registry::{RegistryError, SharedHandle, SharedManifest, SharedModuleEntry, SharedRegistry};

//! Turning fetched bytes into a loaded component

use crate::error::LoadError;
use chrono::{DateTime, Utc};
use forge_artifact::{ContentHash, ModuleFormat, ModuleHeader};
use forge_registry::{RegistryError, SharedHandle, SharedRegistry};
use forge_syntax::{
    declarations_in, descendants, iife_body, is_component_name, named_children, parse,
    registrations_in, scan_exports, ParsedSource,
};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Function compiled modules call to reach a shared instance
const SHARED_LOOKUP: &str = "__forge_shared";

/// A module that passed every check, with its shared instances attached
#[derive(Clone)]
pub struct LoadedComponent {
    /// URL the module was requested from (with refresh token)
    pub url: String,
    /// Hash of the module bytes
    pub content_hash: ContentHash,
    /// Output format declared by the module header
    pub format: ModuleFormat,
    /// Export (or legacy slot) holding the component
    pub export_name: String,
    /// Live instances the module resolves, by name
    pub shared: BTreeMap<String, SharedHandle>,
    /// Module text
    pub source: Arc<str>,
    /// When the load completed
    pub loaded_at: DateTime<Utc>,
}

impl fmt::Debug for LoadedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedComponent")
            .field("url", &self.url)
            .field("content_hash", &self.content_hash)
            .field("format", &self.format)
            .field("export_name", &self.export_name)
            .field("shared", &self.shared.keys().collect::<Vec<_>>())
            .field("bytes", &self.source.len())
            .finish_non_exhaustive()
    }
}

impl LoadedComponent {
    /// Instance attached for `name`
    #[must_use]
    pub fn shared_handle(&self, name: &str) -> Option<&SharedHandle> {
        self.shared.get(name)
    }

    /// Instance attached for `name`, downcast to `T`
    ///
    /// # Errors
    /// [`RegistryError::NotFound`] if the module does not use `name`, or
    /// [`RegistryError::TypeMismatch`] if the instance is not a `T`.
    pub fn shared_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        let handle = self
            .shared
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        Arc::clone(handle)
            .downcast::<T>()
            .map_err(|_| RegistryError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Module size
    #[inline]
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.source.len()
    }
}

/// Validate fetched bytes and wire up their shared instances.
///
/// `legacy_slot` restricts global-slot modules to one registration key.
pub(crate) fn inspect(
    url: &str,
    bytes: &[u8],
    registry: &SharedRegistry,
    legacy_slot: Option<&str>,
) -> Result<LoadedComponent, LoadError> {
    let content_hash = ContentHash::of(bytes);
    if let Some(expected) = address_in_url(url) {
        if expected != content_hash {
            return Err(LoadError::Integrity { expected });
        }
    }

    let text = std::str::from_utf8(bytes)
        .map_err(|e| LoadError::Parse(format!("module is not utf-8: {e}")))?;
    let header = ModuleHeader::parse(text).unwrap_or_default();

    let parsed = parse(text).map_err(|e| LoadError::Parse(e.to_string()))?;
    if let Some(issue) = parsed.first_issue() {
        return Err(LoadError::Parse(issue.to_string()));
    }

    let export_name = match header.format {
        ModuleFormat::Module => component_export(&parsed)?,
        ModuleFormat::GlobalSlot => legacy_registration(&parsed, legacy_slot)?,
    };

    let mut names = header.externals;
    names.extend(shared_lookups(&parsed));
    let shared = names
        .into_iter()
        .map(|name| {
            let handle = registry.resolve(&name)?;
            Ok((name, handle))
        })
        .collect::<Result<BTreeMap<_, _>, LoadError>>()?;

    Ok(LoadedComponent {
        url: url.to_string(),
        content_hash,
        format: header.format,
        export_name,
        shared,
        source: Arc::from(text),
        loaded_at: Utc::now(),
    })
}

/// Content hash named by an `/artifacts/<hex>.js` URL
fn address_in_url(url: &str) -> Option<ContentHash> {
    let path = url.split(['?', '#']).next()?;
    let file = path.rsplit('/').next()?;
    file.strip_suffix(".js")?.parse().ok()
}

/// The default export when it is component-like, else the only PascalCase
/// callable named export
fn component_export(parsed: &ParsedSource<'_>) -> Result<String, LoadError> {
    let exports = scan_exports(parsed);
    if exports.default_export().is_some_and(|d| d.callable) {
        return Ok("default".to_string());
    }

    let candidates: Vec<&str> = exports
        .named()
        .filter(|item| item.callable && is_component_name(&item.exported))
        .map(|item| item.exported.as_str())
        .collect();
    match candidates.as_slice() {
        [only] => Ok((*only).to_string()),
        [] if exports.default_export().is_some() => Err(LoadError::NoComponent(
            "default export is not a function or class".to_string(),
        )),
        [] => Err(LoadError::NoComponent("module exports no component".to_string())),
        many => Err(LoadError::NoComponent(format!(
            "no default export and {} candidates: {}",
            many.len(),
            many.join(", ")
        ))),
    }
}

fn legacy_registration(parsed: &ParsedSource<'_>, slot: Option<&str>) -> Result<String, LoadError> {
    // compiled legacy modules wrap everything in one function scope
    let scope = iife_body(parsed).unwrap_or_else(|| parsed.root());
    let registration = registrations_in(parsed, scope)
        .into_iter()
        .filter(|r| r.keyed)
        .find(|r| slot.is_none() || r.slot.as_deref() == slot)
        .ok_or_else(|| LoadError::MissingRegistration {
            slot: slot.map(str::to_string),
        })?;

    let callable = declarations_in(parsed, scope)
        .iter()
        .any(|d| d.name == registration.target && d.callable);
    if !callable {
        return Err(LoadError::NoComponent(format!(
            "registered value '{}' is not a function or class",
            registration.target
        )));
    }
    Ok(registration.slot.unwrap_or(registration.target))
}

/// String arguments of every `__forge_shared("…")` call
fn shared_lookups(parsed: &ParsedSource<'_>) -> BTreeSet<String> {
    descendants(parsed.root())
        .into_iter()
        .filter(|n| n.kind() == "call_expression")
        .filter(|call| {
            call.child_by_field_name("function")
                .is_some_and(|f| f.kind() == "identifier" && parsed.slice(f) == SHARED_LOOKUP)
        })
        .filter_map(|call| {
            let args = call.child_by_field_name("arguments")?;
            let first = named_children(args).into_iter().next()?;
            if first.kind() != "string" {
                return None;
            }
            let literal = parsed.slice(first);
            literal.get(1..literal.len().saturating_sub(1)).map(str::to_string)
        })
        .collect()
}

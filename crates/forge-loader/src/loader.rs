//! Per-mount component loader

use crate::error::LoadError;
use crate::fetch::ModuleFetcher;
use crate::module::{inspect, LoadedComponent};
use crate::request::{cache_busted_url, RefreshToken};
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use forge_artifact::{ModuleFormat, ModuleHeader};
use forge_registry::SharedRegistry;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Held while a legacy global-slot module is inspected and its slot read;
/// fetches run before acquiring it and stay concurrent
static LEGACY_GATE: Lazy<Semaphore> = Lazy::new(|| Semaphore::new(1));

/// Where a loader is in its lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    /// No source set
    #[default]
    Idle,
    /// Fetching or inspecting, possibly between retries
    Loading,
    /// Component available
    Loaded,
    /// Gave up; see the error text
    Errored,
}

/// Result of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    /// Still running
    Pending,
    /// Produced a component
    Succeeded,
    /// Failed (see `error_text`)
    Failed,
}

/// One try at loading the current `(url, token)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadAttempt {
    /// 1-based, never above the retry cap
    pub attempt_number: u32,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// How it ended
    pub outcome: AttemptOutcome,
    /// Failure text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

/// Snapshot handed to the host
#[derive(Debug, Clone, Default)]
pub struct LoaderView {
    /// Lifecycle state
    pub state: LoadState,
    /// Loaded component, only in [`LoadState::Loaded`]
    pub component: Option<Arc<LoadedComponent>>,
    /// Failure text, only in [`LoadState::Errored`]
    pub error: Option<String>,
    /// Attempts for the current `(url, token)`
    pub attempts: Vec<LoadAttempt>,
    /// Source URL as set by the host
    pub url: Option<String>,
    /// Refresh token as set by the host
    pub refresh_token: RefreshToken,
}

impl LoaderView {
    fn fresh(url: Option<&str>, token: RefreshToken) -> Self {
        Self {
            state: if url.is_some() {
                LoadState::Loading
            } else {
                LoadState::Idle
            },
            url: url.map(str::to_string),
            refresh_token: token,
            ..Self::default()
        }
    }

    /// Whether the loader has finished with the current source
    #[inline]
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.state != LoadState::Loading
    }
}

/// Loader behavior knobs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderSettings {
    /// Backoff for transient failures
    pub retry: RetryPolicy,
    /// Slot a legacy module must register under
    pub legacy_slot: Option<String>,
}

impl LoaderSettings {
    /// Set the retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Require legacy modules to register under `slot`
    #[inline]
    #[must_use]
    pub fn with_legacy_slot(mut self, slot: impl Into<String>) -> Self {
        self.legacy_slot = Some(slot.into());
        self
    }
}

struct Inner {
    fetcher: Arc<dyn ModuleFetcher>,
    registry: Arc<SharedRegistry>,
    settings: LoaderSettings,
    generation: AtomicU64,
    unmounted: AtomicBool,
    view: watch::Sender<LoaderView>,
    key: Mutex<(Option<String>, RefreshToken)>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        !self.unmounted.load(Ordering::Acquire) && self.generation.load(Ordering::Acquire) == generation
    }

    /// Apply `update` unless a newer load or an unmount superseded `generation`
    fn publish(&self, generation: u64, update: impl FnOnce(&mut LoaderView)) -> bool {
        self.view.send_if_modified(|view| {
            if !self.is_current(generation) {
                return false;
            }
            update(view);
            true
        })
    }
}

/// Loads one component for one mount point.
///
/// Every `(url, refresh_token)` pair gets a fresh view and attempt history.
/// Results from superseded pairs, or that arrive after [`unmount`], are
/// dropped. Loaders share nothing mutable with each other.
///
/// Methods that start a load spawn onto the current tokio runtime.
///
/// [`unmount`]: ComponentLoader::unmount
pub struct ComponentLoader {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ComponentLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let view = self.inner.view.borrow();
        f.debug_struct("ComponentLoader")
            .field("state", &view.state)
            .field("url", &view.url)
            .field("generation", &self.inner.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ComponentLoader {
    /// Loader with default settings
    #[must_use]
    pub fn new(fetcher: Arc<dyn ModuleFetcher>, registry: Arc<SharedRegistry>) -> Self {
        Self::with_settings(fetcher, registry, LoaderSettings::default())
    }

    /// Loader with explicit settings
    #[must_use]
    pub fn with_settings(
        fetcher: Arc<dyn ModuleFetcher>,
        registry: Arc<SharedRegistry>,
        settings: LoaderSettings,
    ) -> Self {
        let (view, _) = watch::channel(LoaderView::default());
        Self {
            inner: Arc::new(Inner {
                fetcher,
                registry,
                settings,
                generation: AtomicU64::new(0),
                unmounted: AtomicBool::new(false),
                view,
                key: Mutex::new((None, RefreshToken::default())),
                task: Mutex::new(None),
            }),
        }
    }

    /// Point the loader at `url` (or nothing).
    ///
    /// Starts a new load only when `(url, token)` differs from the current
    /// pair; the previous load is abandoned.
    pub fn set_source(&self, url: Option<&str>, token: impl Into<RefreshToken>) {
        if self.inner.unmounted.load(Ordering::Acquire) {
            return;
        }
        let token = token.into();
        {
            let mut key = self.inner.key.lock();
            if key.0.as_deref() == url && key.1 == token {
                return;
            }
            *key = (url.map(str::to_string), token.clone());
        }
        self.restart(url, token);
    }

    /// Load the current `(url, token)` again from scratch.
    ///
    /// Returns `false` when there is nothing to retry (no source, still
    /// loading, or unmounted).
    pub fn retry(&self) -> bool {
        if self.inner.unmounted.load(Ordering::Acquire) || !self.inner.view.borrow().is_settled() {
            return false;
        }
        let (url, token) = self.inner.key.lock().clone();
        let Some(url) = url else {
            return false;
        };
        info!(%url, "retrying component load");
        self.restart(Some(&url), token);
        true
    }

    /// Current view
    #[must_use]
    pub fn view(&self) -> LoaderView {
        self.inner.view.borrow().clone()
    }

    /// Receiver notified on every view change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LoaderView> {
        self.inner.view.subscribe()
    }

    /// Wait until the current load finishes
    pub async fn settled(&self) -> LoaderView {
        let mut rx = self.subscribe();
        let view = match rx.wait_for(LoaderView::is_settled).await {
            Ok(view) => view.clone(),
            Err(_) => self.view(),
        };
        view
    }

    /// Abandon any load and go idle for good
    pub fn unmount(&self) {
        if self.inner.unmounted.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }
        self.inner.view.send_replace(LoaderView::default());
        debug!("component loader unmounted");
    }

    fn restart(&self, url: Option<&str>, token: RefreshToken) {
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let mut task = self.inner.task.lock();
        if let Some(previous) = task.take() {
            previous.abort();
        }
        self.inner.view.send_replace(LoaderView::fresh(url, token.clone()));

        if let Some(url) = url {
            let inner = Arc::clone(&self.inner);
            let url = url.to_string();
            *task = Some(tokio::spawn(run(inner, generation, url, token)));
        }
    }
}

impl Drop for ComponentLoader {
    fn drop(&mut self) {
        self.unmount();
    }
}

async fn run(inner: Arc<Inner>, generation: u64, url: String, token: RefreshToken) {
    let policy = inner.settings.retry;

    for attempt_number in 1..=policy.max_attempts {
        let started = inner.publish(generation, |view| {
            view.attempts.push(LoadAttempt {
                attempt_number,
                started_at: Utc::now(),
                outcome: AttemptOutcome::Pending,
                error_text: None,
            });
        });
        if !started {
            return;
        }

        match load_once(&inner, &url, &token).await {
            Ok(component) => {
                info!(
                    %url,
                    attempt = attempt_number,
                    hash = %component.content_hash.short(),
                    export = %component.export_name,
                    "component loaded"
                );
                let component = Arc::new(component);
                inner.publish(generation, |view| {
                    finish_attempt(view, AttemptOutcome::Succeeded, None);
                    view.state = LoadState::Loaded;
                    view.component = Some(component);
                });
                return;
            }
            Err(err) => {
                let text = err.to_string();
                let retrying = err.is_transient() && attempt_number < policy.max_attempts;
                warn!(%url, attempt = attempt_number, retrying, error = %text, "component load failed");

                let recorded = inner.publish(generation, |view| {
                    finish_attempt(view, AttemptOutcome::Failed, Some(text.clone()));
                    if !retrying {
                        view.state = LoadState::Errored;
                        view.error = Some(text.clone());
                    }
                });
                if !recorded || !retrying {
                    return;
                }
                tokio::time::sleep(policy.delay_after(attempt_number)).await;
            }
        }
    }
}

fn finish_attempt(view: &mut LoaderView, outcome: AttemptOutcome, error_text: Option<String>) {
    if let Some(last) = view.attempts.last_mut() {
        last.outcome = outcome;
        last.error_text = error_text;
    }
}

async fn load_once(inner: &Inner, url: &str, token: &RefreshToken) -> Result<LoadedComponent, LoadError> {
    let request = cache_busted_url(url, token)?;
    let fetched = inner.fetcher.fetch(&request).await?;

    let legacy = ModuleHeader::parse(&String::from_utf8_lossy(&fetched.bytes))
        .is_some_and(|h| h.format == ModuleFormat::GlobalSlot);
    // gate covers inspection only; never closed, so acquire cannot fail
    let _permit = if legacy {
        LEGACY_GATE.acquire().await.ok()
    } else {
        None
    };

    inspect(
        &request,
        &fetched.bytes,
        &inner.registry,
        inner.settings.legacy_slot.as_deref(),
    )
}

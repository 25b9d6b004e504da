//! Loader behavior against real HTTP servers

use forge_artifact::{ArtifactStore, BuildMetadata, ContentHash, MemoryArtifactStore, ModuleFormat};
use forge_compiler::{compile, CompileOptions};
use forge_loader::{
    AttemptOutcome, ComponentLoader, HttpFetcher, LoadState, LoaderSettings, RefreshToken, RetryPolicy,
};
use forge_registry::SharedRegistry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use warp::http::StatusCode;
use warp::Filter;

const COMPONENT: &str = r#"import { useState } from "react";

export default function Counter() {
  const [n] = useState<number>(0);
  return <span>{n}</span>;
}
"#;

fn registry() -> Arc<SharedRegistry> {
    let registry = SharedRegistry::new();
    registry.register("react", "18.3.1", Arc::new("react-instance"));
    Arc::new(registry)
}

fn compiled(registry: &SharedRegistry) -> Vec<u8> {
    compile(COMPONENT, &CompileOptions::from_registry(registry))
        .unwrap()
        .bytes
}

fn javascript(body: Vec<u8>) -> impl warp::Reply {
    warp::reply::with_header(body, "content-type", "text/javascript; charset=utf-8")
}

fn fast_retries() -> LoaderSettings {
    LoaderSettings::default().with_retry(
        RetryPolicy::default()
            .with_base_delay(Duration::from_millis(5))
            .with_max_delay(Duration::from_millis(20)),
    )
}

fn loader(registry: &Arc<SharedRegistry>) -> ComponentLoader {
    ComponentLoader::with_settings(Arc::new(HttpFetcher::new()), Arc::clone(registry), fast_retries())
}

struct TestServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    tokens: Arc<Mutex<Vec<Option<String>>>>,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}/{path}", self.addr)
    }
}

fn start_server(module: Vec<u8>) -> TestServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let tokens = Arc::new(Mutex::new(Vec::new()));

    let fail_hits = Arc::clone(&hits);
    let fail = warp::path("fail").map(move || {
        fail_hits.fetch_add(1, Ordering::SeqCst);
        warp::reply::with_status("boom", StatusCode::INTERNAL_SERVER_ERROR)
    });

    let slow_body = module.clone();
    let slow = warp::path("slow.js").and_then(move || {
        let body = slow_body.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, Infallible>(javascript(body))
        }
    });

    let seen = Arc::clone(&tokens);
    let tagged_body = module.clone();
    let tagged = warp::path("tagged.js")
        .and(warp::query::<HashMap<String, String>>())
        .map(move |query: HashMap<String, String>| {
            seen.lock().push(query.get("v").cloned());
            javascript(tagged_body.clone())
        });

    let html = warp::path("page.html").map(|| warp::reply::html("<html></html>"));

    let routes = fail.or(slow).or(tagged).or(html);
    let (tx, rx) = oneshot::channel::<()>();
    let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(([127, 0, 0, 1], 0), async move {
        let _ = rx.await;
    });
    tokio::spawn(server);

    TestServer {
        addr,
        hits,
        tokens,
        _shutdown: tx,
    }
}

#[tokio::test]
async fn server_error_ends_errored_within_cap() {
    let registry = registry();
    let server = start_server(compiled(&registry));
    let loader = loader(&registry);

    let mut updates = loader.subscribe();
    let watcher = tokio::spawn(async move {
        let mut states = Vec::new();
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().state;
            states.push(state);
            if state == LoadState::Errored || state == LoadState::Loaded {
                break;
            }
        }
        states
    });

    loader.set_source(Some(&server.url("fail")), 0_u64);
    let view = loader.settled().await;

    assert_eq!(view.state, LoadState::Errored);
    assert_eq!(view.attempts.len(), 3);
    assert!(view.attempts.iter().all(|a| a.outcome == AttemptOutcome::Failed));
    assert!(view.error.unwrap().contains("HTTP 500"));
    assert!(view.component.is_none());
    assert_eq!(server.hits.load(Ordering::SeqCst), 3);

    let states = watcher.await.unwrap();
    assert!(!states.contains(&LoadState::Loaded));
    assert_eq!(states.last(), Some(&LoadState::Errored));
}

#[tokio::test]
async fn loaders_are_isolated() {
    let registry = registry();
    let bytes = compiled(&registry);
    let hash = ContentHash::of(&bytes);

    let store: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::default());
    store
        .put("job-1", bytes, BuildMetadata::new(ModuleFormat::Module, ["react"]))
        .await
        .unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let (addr, _server) = forge_artifact::http::spawn_server(
        Arc::clone(&store),
        ([127, 0, 0, 1], 0).into(),
        &[],
        async move {
            let _ = rx.await;
        },
    )
    .unwrap();

    let missing = ContentHash::of(b"never stored");
    let broken = loader(&registry);
    let healthy = loader(&registry);
    broken.set_source(Some(&format!("http://{addr}/artifacts/{missing}.js")), 0_u64);
    healthy.set_source(Some(&format!("http://{addr}/artifacts/{hash}.js")), 0_u64);

    let (broken_view, healthy_view) = tokio::join!(broken.settled(), healthy.settled());

    assert_eq!(broken_view.state, LoadState::Errored);
    assert_eq!(broken_view.attempts.len(), 1);
    assert!(broken_view.error.unwrap().contains("HTTP 404"));

    assert_eq!(healthy_view.state, LoadState::Loaded);
    let component = healthy_view.component.unwrap();
    assert_eq!(component.content_hash, hash);
    assert_eq!(component.export_name, "default");
    assert_eq!(*component.shared_as::<&str>("react").unwrap(), "react-instance");

    // the failure next door changed nothing
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(healthy.view().state, LoadState::Loaded);
    let _ = tx.send(());
}

#[tokio::test]
async fn superseded_loads_are_dropped() {
    let registry = registry();
    let server = start_server(compiled(&registry));
    let loader = loader(&registry);

    loader.set_source(Some(&server.url("slow.js")), 0_u64);
    loader.set_source(Some(&server.url("tagged.js")), 1_u64);

    let view = loader.settled().await;
    assert_eq!(view.state, LoadState::Loaded);
    assert_eq!(view.url.as_deref(), Some(server.url("tagged.js").as_str()));

    tokio::time::sleep(Duration::from_millis(300)).await;
    let view = loader.view();
    assert_eq!(view.url.as_deref(), Some(server.url("tagged.js").as_str()));
    assert_eq!(view.attempts.len(), 1);
}

#[tokio::test]
async fn refresh_token_busts_the_cache() {
    let registry = registry();
    let server = start_server(compiled(&registry));
    let loader = loader(&registry);
    let url = server.url("tagged.js");

    loader.set_source(Some(&url), 1_u64);
    loader.settled().await;
    loader.set_source(Some(&url), 2_u64);
    let view = loader.settled().await;

    assert_eq!(view.state, LoadState::Loaded);
    assert_eq!(view.refresh_token, RefreshToken::from(2_u64));
    assert_eq!(
        *server.tokens.lock(),
        vec![Some("1".to_string()), Some("2".to_string())]
    );
}

#[tokio::test]
async fn text_refresh_token_is_opaque() {
    let registry = registry();
    let server = start_server(compiled(&registry));
    let loader = loader(&registry);
    let url = server.url("tagged.js");

    loader.set_source(Some(&url), "build-01J9ZQ");
    loader.settled().await;
    loader.set_source(Some(&url), RefreshToken::from("build-01J9ZQ"));
    loader.set_source(Some(&url), "build-01J9ZR");
    let view = loader.settled().await;

    assert_eq!(view.state, LoadState::Loaded);
    assert_eq!(view.refresh_token.as_str(), "build-01J9ZR");
    assert_eq!(
        *server.tokens.lock(),
        vec![Some("build-01J9ZQ".to_string()), Some("build-01J9ZR".to_string())]
    );
}

#[tokio::test]
async fn non_javascript_is_rejected_without_retry() {
    let registry = registry();
    let server = start_server(compiled(&registry));
    let loader = loader(&registry);

    loader.set_source(Some(&server.url("page.html")), 0_u64);
    let view = loader.settled().await;

    assert_eq!(view.state, LoadState::Errored);
    assert_eq!(view.attempts.len(), 1);
    assert!(view.error.unwrap().contains("text/html"));
}

#[tokio::test]
async fn missing_shared_instance_fails_the_load() {
    let server = start_server(compiled(&registry()));
    let empty = Arc::new(SharedRegistry::new());
    let loader = loader(&empty);

    loader.set_source(Some(&server.url("tagged.js")), 0_u64);
    let view = loader.settled().await;

    assert_eq!(view.state, LoadState::Errored);
    assert_eq!(view.error.as_deref(), Some("shared module 'react' is not registered"));
}

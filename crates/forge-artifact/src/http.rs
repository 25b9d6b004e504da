//! HTTP surface for stored artifacts
//!
//! `GET /artifacts/<hex>.js` serves bytes with immutable caching headers. The
//! `v` query parameter the loader appends for cache busting is accepted and
//! ignored: the hash alone names the bytes.

use crate::error::StoreError;
use crate::hash::ContentHash;
use crate::store::ArtifactStore;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// Content type of every served artifact
pub const JS_CONTENT_TYPE: &str = "text/javascript; charset=utf-8";

/// Cache policy of every served artifact
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Build the artifact routes.
///
/// An empty `allowed_origins` allows any origin.
pub fn routes(
    store: Arc<dyn ArtifactStore>,
    allowed_origins: &[String],
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let with_store = warp::any().map(move || Arc::clone(&store));

    let artifact = warp::get()
        .and(warp::path("artifacts"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(with_store)
        .and_then(serve_artifact);

    let health = warp::get()
        .and(warp::path("healthz"))
        .and(warp::path::end())
        .map(|| "ok");

    let cors = if allowed_origins.is_empty() {
        warp::cors().allow_any_origin()
    } else {
        warp::cors().allow_origins(allowed_origins.iter().map(String::as_str))
    }
    .allow_methods(vec!["GET"]);

    artifact
        .or(health)
        .with(cors)
        .with(warp::trace::request())
}

async fn serve_artifact(
    name: String,
    store: Arc<dyn ArtifactStore>,
) -> Result<warp::reply::Response, Infallible> {
    let hash = match parse_artifact_name(&name) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::debug!(%name, error = %e, "rejected artifact name");
            return Ok(text_response(StatusCode::BAD_REQUEST, "invalid artifact name"));
        }
    };

    match store.get(&hash).await {
        Ok(bytes) => {
            let mut response = warp::reply::Response::new(bytes.to_vec().into());
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(JS_CONTENT_TYPE));
            headers.insert(CACHE_CONTROL, HeaderValue::from_static(IMMUTABLE_CACHE_CONTROL));
            Ok(response)
        }
        Err(StoreError::NotFound(_)) => Ok(text_response(StatusCode::NOT_FOUND, "artifact not found")),
        Err(e) => {
            tracing::error!(hash = %hash.short(), error = %e, "artifact read failed");
            Ok(text_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "artifact storage unavailable, try again",
            ))
        }
    }
}

fn text_response(status: StatusCode, body: &'static str) -> warp::reply::Response {
    warp::reply::with_status(body, status).into_response()
}

/// Parse `<64 hex>.js` into a hash
///
/// # Errors
/// [`StoreError::InvalidName`] for anything else.
pub fn parse_artifact_name(name: &str) -> Result<ContentHash, StoreError> {
    let hex = name.strip_suffix(".js").unwrap_or(name);
    if hex.len() != 64 || !name.ends_with(".js") {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
            source: crate::hash::HashError::InvalidLength(hex.len() / 2),
        });
    }
    hex.parse().map_err(|source| StoreError::InvalidName {
        name: name.to_string(),
        source,
    })
}

/// Bind the artifact server and spawn it on the current runtime.
///
/// Returns the bound address (useful with port 0) and the server task, which
/// ends once `shutdown` resolves.
///
/// # Errors
/// [`StoreError::Bind`] when the address cannot be bound.
pub fn spawn_server(
    store: Arc<dyn ArtifactStore>,
    addr: SocketAddr,
    allowed_origins: &[String],
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), StoreError> {
    let (bound, server) = warp::serve(routes(store, allowed_origins))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| StoreError::Bind(e.to_string()))?;
    tracing::info!(addr = %bound, "artifact server listening");
    Ok((bound, tokio::spawn(server)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names() {
        let hash = ContentHash::of(b"m");
        assert_eq!(parse_artifact_name(&format!("{hash}.js")).unwrap(), hash);
        assert!(parse_artifact_name(&hash.to_hex()).is_err());
        assert!(parse_artifact_name("nothex.js").is_err());
        assert!(parse_artifact_name(&format!("{}.js", "g".repeat(64))).is_err());
    }
}

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, RawQuery, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use http::{header, HeaderMap, Method, StatusCode};
use log::{info, warn};
use spegel_key::ContentKey;

use crate::buffer_pool::{BufferPool, BUFFER_SIZE};
use crate::config::Config;
use crate::metrics::{self, CacheOutcome, RequestMetrics, Source};
use crate::proxy::{self, ProxyClient};
use crate::request::{self, Kind};

pub struct AppState {
    pub router: Arc<dyn spegel_router::ContentRouter>,
    pub store: Arc<dyn spegel_store::OciStore>,
    pub proxy: ProxyClient,
    pub buffer_pool: Arc<BufferPool>,
    pub config: Config,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v2/", get(probe))
        .route("/v2/{*path}", get(dispatch))
        .with_state(state)
}

async fn probe() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], "{}")
}

/// The `/v2/<name>/manifests|blobs/<ref>` entry point: resolves the registry, derives the
/// content key, and branches between the registry-serving and mirror sub-handlers.
async fn dispatch(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let registry = match resolve_registry(&headers, query.as_deref()) {
        Some(r) => r,
        None => return StatusCode::BAD_REQUEST.into_response(),
    };

    let classified = match request::classify(&path, &registry) {
        Ok(c) => c,
        Err(request::Error::NotV2) => return StatusCode::NOT_FOUND.into_response(),
        Err(request::Error::BadPath) => return StatusCode::BAD_REQUEST.into_response(),
    };

    // Both headers mark a request as coming from a peer treating us as its registry, i.e. a
    // request we must answer from the local store only, never by consulting the substrate
    // ourselves (that would allow a resolve loop between mirrors). `X-Spegel-Mirror` is the
    // loop-prevention header set on every mirror-to-mirror hop; `X-Spegel-External` is set by
    // the `hosts.toml` writer on second-and-later mirror entries to mean "this entry is beyond
    // the first, don't let it chain into yet another resolve" and carries the same obligation
    // for whoever receives it.
    let external =
        headers.contains_key("x-spegel-mirror") || headers.contains_key("x-spegel-external");
    let handler_label = if external { "registry" } else { "mirror" };
    let rm = RequestMetrics::start(handler_label, method.clone());

    if external {
        serve_local(&state, &classified, &method, &registry, rm).await
    } else {
        serve_mirror(&state, &classified, &registry, &method, &headers, rm).await
    }
}

fn resolve_registry(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(v) = headers.get("x-spegel-registry") {
        return v.to_str().ok().map(|s| s.to_string());
    }
    let query = query?;
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("ns=") {
            return Some(value.to_string());
        }
    }
    None
}

/// The registry-serving sub-handler: this node is the authoritative source for `classified.key`
/// as far as the requesting peer is concerned. MUST NOT consult the routing substrate — that
/// would allow a resolve loop between mirrors.
async fn serve_local(
    state: &AppState,
    classified: &request::Classified,
    method: &Method,
    registry: &str,
    mut rm: RequestMetrics,
) -> Response {
    let digest = match classified.key {
        ContentKey::Digest(ref d) => d.clone(),
        ContentKey::Tag(_) => {
            // a peer should never ask us, as the external leg, for a tag key directly; treat it
            // as not found rather than guessing.
            metrics::record_mirror_request(registry, CacheOutcome::Unavailable, Source::External);
            rm.set_status(StatusCode::NOT_FOUND);
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    if *method == Method::HEAD {
        return match state.store.size(&digest).await {
            Ok(Some(size)) => {
                metrics::record_mirror_request(registry, CacheOutcome::Hit, Source::External);
                rm.set_status(StatusCode::OK);
                rm.record_bytes(0);
                Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, media_type_for(classified.kind))
                    .header(header::CONTENT_LENGTH, size)
                    .header("docker-content-digest", digest.clone())
                    .body(Body::empty())
                    .unwrap()
            }
            Ok(None) => {
                metrics::record_mirror_request(registry, CacheOutcome::Unavailable, Source::External);
                rm.set_status(StatusCode::NOT_FOUND);
                StatusCode::NOT_FOUND.into_response()
            }
            Err(e) => {
                warn!("serve_local: size({digest}) failed: {e}");
                rm.set_error(&e);
                rm.set_status(StatusCode::NOT_FOUND);
                StatusCode::NOT_FOUND.into_response()
            }
        };
    }

    let bytes = match state.store.read_blob(&digest).await {
        Ok(Some(b)) => b,
        Ok(None) => {
            metrics::record_mirror_request(registry, CacheOutcome::Unavailable, Source::External);
            rm.set_status(StatusCode::NOT_FOUND);
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(e) => {
            warn!("serve_local: read_blob({digest}) failed: {e}");
            rm.set_error(&e);
            rm.set_status(StatusCode::NOT_FOUND);
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    metrics::record_mirror_request(registry, CacheOutcome::Hit, Source::External);
    rm.set_status(StatusCode::OK);
    let media_type = media_type_for(classified.kind);
    let len = bytes.len();
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, media_type)
        .header(header::CONTENT_LENGTH, len)
        .header("docker-content-digest", digest)
        .body(Body::from_stream(pooled_local_stream(
            bytes,
            state.buffer_pool.clone(),
            rm,
        )))
        .unwrap()
}

fn media_type_for(kind: Kind) -> &'static str {
    match kind {
        Kind::Manifest => "application/vnd.oci.image.manifest.v1+json",
        Kind::Blob => "application/octet-stream",
    }
}

/// The mirror sub-handler: resolve peers for `classified.key`, forward the request to each in
/// turn, and return the first success. Never itself touched by an external request.
async fn serve_mirror(
    state: &AppState,
    classified: &request::Classified,
    registry: &str,
    method: &Method,
    headers: &HeaderMap,
    mut rm: RequestMetrics,
) -> Response {
    if !state.config.resolve_latest_tag && is_latest_tag(&classified.key) {
        info!("mirror: {} is a :latest tag, resolve_latest_tag disabled", classified.key);
        metrics::record_mirror_request(registry, CacheOutcome::Unavailable, Source::Internal);
        rm.set_status(StatusCode::BAD_GATEWAY);
        return StatusCode::BAD_GATEWAY.into_response();
    }

    let accept = headers.get(header::ACCEPT);
    let mut endpoints = state.router.resolve(
        &classified.key,
        false,
        state.config.mirror_resolve_timeout,
    );

    let mut attempts = 0u32;
    let mut any_endpoint = false;
    let path_after_v2 = format!(
        "{}/{}/{}",
        classified.name,
        match classified.kind {
            Kind::Manifest => "manifests",
            Kind::Blob => "blobs",
        },
        classified.reference
    );

    while let Some(endpoint) = endpoints.next().await {
        any_endpoint = true;
        attempts += 1;
        if attempts > state.config.mirror_resolve_retries {
            break;
        }
        match state
            .proxy
            .proxy_to(
                endpoint,
                method.clone(),
                &path_after_v2,
                accept,
                registry,
                state.config.mirror_resolve_timeout,
            )
            .await
        {
            Ok(resp) if proxy::is_success(resp.status()) => {
                info!("mirror: {endpoint} served {}", classified.key);
                metrics::record_mirror_request(registry, CacheOutcome::Hit, Source::Internal);
                rm.set_status(
                    StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::OK),
                );
                return forward_response(resp, method, state.buffer_pool.clone(), rm).await;
            }
            Ok(resp) => {
                warn!("mirror: {endpoint} returned {}", resp.status());
                rm.set_error(format!("{endpoint} returned {}", resp.status()));
            }
            Err(e) => {
                warn!("mirror: {endpoint} proxy attempt failed: {e}");
                rm.set_error(format!("{endpoint}: {e}"));
            }
        }
    }

    if !any_endpoint {
        metrics::record_mirror_request(registry, CacheOutcome::Unavailable, Source::Internal);
        rm.set_status(StatusCode::NOT_FOUND);
        return (
            StatusCode::NOT_FOUND,
            [("x-spegel-resolve-failed", "true")],
        )
            .into_response();
    }

    metrics::record_mirror_request(registry, CacheOutcome::Miss, Source::Internal);
    rm.set_status(StatusCode::BAD_GATEWAY);
    StatusCode::BAD_GATEWAY.into_response()
}

/// `resolve_latest_tag = false` takes `:latest` manifests out of mirror eligibility entirely,
/// since the tag is mutable and a peer's cached copy can lag the upstream registry indefinitely.
fn is_latest_tag(key: &ContentKey) -> bool {
    matches!(key, ContentKey::Tag(t) if t.ends_with(":latest"))
}

async fn forward_response(
    resp: reqwest::Response,
    method: &Method,
    pool: Arc<BufferPool>,
    mut rm: RequestMetrics,
) -> Response {
    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::OK);
    let mut builder = Response::builder().status(status);
    for name in [
        header::CONTENT_TYPE,
        header::CONTENT_LENGTH,
        header::HeaderName::from_static("docker-content-digest"),
    ] {
        if let Some(value) = resp.headers().get(&name) {
            builder = builder.header(name, value.clone());
        }
    }

    if *method == Method::HEAD {
        rm.record_bytes(0);
        return builder.body(Body::empty()).unwrap();
    }

    builder
        .body(Body::from_stream(pooled_stream(resp, pool, rm)))
        .unwrap()
}

struct ForwardState {
    resp: reqwest::Response,
    pool: Arc<BufferPool>,
    pending: VecDeque<Bytes>,
    counter: Arc<AtomicU64>,
    metrics: RequestMetrics,
}

/// Re-chunks the peer's response body through fixed-size pooled buffers rather than forwarding
/// reqwest's own chunk boundaries directly, so the 32 KiB pool from [`crate::buffer_pool`] is
/// actually the thing doing the body copy (once bytes have left here for the client socket, a
/// mid-stream peer failure can no longer be retried and surfaces as truncation). The
/// [`RequestMetrics`] guard is moved into the stream's own state rather than dropped by the
/// caller, so its recorded byte count reflects what was actually streamed out, truncated if the
/// peer connection dies mid-body, instead of the `Content-Length` that was merely promised.
fn pooled_stream(
    resp: reqwest::Response,
    pool: Arc<BufferPool>,
    metrics: RequestMetrics,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
    let counter = metrics.byte_counter();
    let state = ForwardState {
        resp,
        pool,
        pending: VecDeque::new(),
        counter,
        metrics,
    };
    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(piece) = state.pending.pop_front() {
                state.counter.fetch_add(piece.len() as u64, Ordering::Relaxed);
                return Some((Ok(piece), state));
            }
            match state.resp.chunk().await {
                Ok(Some(chunk)) => {
                    for piece in chunk.chunks(BUFFER_SIZE) {
                        let mut buf = state.pool.get();
                        buf[..piece.len()].copy_from_slice(piece);
                        state.pending.push_back(Bytes::copy_from_slice(&buf[..piece.len()]));
                        state.pool.put(buf);
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    state.metrics.set_error(&e);
                    return Some((
                        Err(std::io::Error::new(std::io::ErrorKind::Other, e)),
                        state,
                    ))
                }
            }
        }
    })
}

struct LocalBodyState {
    bytes: Bytes,
    offset: usize,
    pool: Arc<BufferPool>,
    counter: Arc<AtomicU64>,
    _guard: RequestMetrics,
}

/// Re-chunks an already-in-memory local blob through the same pooled 32 KiB buffers used for the
/// peer-forward path, so every body copy goes through [`BufferPool`] regardless of whether the
/// bytes came from a peer or from the local store. As with [`pooled_stream`], the metrics guard
/// lives inside the stream state and only drops once every chunk has been handed off.
fn pooled_local_stream(
    bytes: Bytes,
    pool: Arc<BufferPool>,
    metrics: RequestMetrics,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
    let counter = metrics.byte_counter();
    let state = LocalBodyState {
        bytes,
        offset: 0,
        pool,
        counter,
        _guard: metrics,
    };
    futures::stream::unfold(state, |mut state| async move {
        if state.offset >= state.bytes.len() {
            return None;
        }
        let end = (state.offset + BUFFER_SIZE).min(state.bytes.len());
        let piece = state.bytes.slice(state.offset..end);
        let mut buf = state.pool.get();
        buf[..piece.len()].copy_from_slice(&piece);
        let out = Bytes::copy_from_slice(&buf[..piece.len()]);
        state.pool.put(buf);
        state.counter.fetch_add(out.len() as u64, Ordering::Relaxed);
        state.offset = end;
        Some((Ok(out), state))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_latest_tag_matches_only_the_latest_suffix() {
        assert!(is_latest_tag(&ContentKey::Tag(
            "docker.io/library/alpine:latest".to_string()
        )));
        assert!(!is_latest_tag(&ContentKey::Tag(
            "docker.io/library/alpine:3.20".to_string()
        )));
        assert!(!is_latest_tag(&ContentKey::digest(
            "sha256:abc".to_string()
        )));
    }
}

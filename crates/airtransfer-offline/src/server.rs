//! Reverse proxy that puts the cache interceptor in front of the AirTransfer server.
//!
//! Every request is routed through the interceptor. Bypassed requests
//! (share/upload) are streamed to the origin without buffering, so large
//! uploads never sit in memory.

use std::net::SocketAddr;
use std::sync::Arc;

use airtransfer_offline_core::net::client::is_forwardable;
use airtransfer_offline_core::{
    http::is_hop_by_hop, CacheInterceptor, FetchDecision, FetchError, HttpNetwork, Network,
    Request, Response,
};
use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{request::Parts, HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
    Router,
};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Largest request body buffered for intercepted (non-bypass) requests
const MAX_BUFFERED_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Proxy state shared across handlers.
pub struct ProxyState {
    /// Cache-first interceptor
    pub interceptor: CacheInterceptor,
    /// Direct line to the origin for bypassed traffic
    pub upstream: HttpNetwork,
}

pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .fallback(handle_proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the proxy in the background.
///
/// Returns the bound address (useful when port=0) and the server task.
pub async fn start_server(
    interceptor: CacheInterceptor,
    upstream: HttpNetwork,
    listen: &str,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let state = Arc::new(ProxyState {
        interceptor,
        upstream,
    });
    let app = router(state);

    let addr: SocketAddr = listen.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Proxy listening on {}", actual_addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Proxy server stopped");
        }
    });

    Ok((actual_addr, handle))
}

async fn handle_proxy(
    State(state): State<Arc<ProxyState>>,
    request: axum::extract::Request,
) -> axum::response::Response {
    let (parts, body) = request.into_parts();
    let url = path_and_query(&parts);

    if state.interceptor.bypasses(&url) {
        debug!(url = %url, "Streaming bypassed request to origin");
        return match forward_streaming(&state.upstream, &parts, &url, body).await {
            Ok(response) => response,
            Err(e) => bad_gateway(&url, e),
        };
    }

    let body = match to_bytes(body, MAX_BUFFERED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(url = %url, error = %e, "Failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };
    let request = to_core_request(&parts, url.clone(), body.to_vec());

    let decision = match state.interceptor.on_fetch(&request).await {
        Ok(decision) => decision,
        Err(e) => return bad_gateway(&url, e),
    };
    let source = decision.source();
    let response = match decision {
        FetchDecision::Cached(response) | FetchDecision::Network(response) => response,
        FetchDecision::Bypass => match state.upstream.fetch(&request).await {
            Ok(response) => response,
            Err(e) => return bad_gateway(&url, e),
        },
    };

    debug!(url = %url, source = source, status = response.status, "Responding");
    to_axum_response(response)
}

fn path_and_query(parts: &Parts) -> String {
    parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

fn to_core_request(parts: &Parts, url: String, body: Vec<u8>) -> Request {
    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    Request {
        method: parts.method.clone(),
        url,
        headers,
        body,
    }
}

/// Replay a stored or fetched response. Hop-by-hop headers and the
/// original Content-Length are dropped; the body determines the length.
fn to_axum_response(response: Response) -> axum::response::Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut out = axum::response::Response::new(Body::from(response.body));
    *out.status_mut() = status;

    let headers = out.headers_mut();
    for (name, value) in response.headers {
        if is_hop_by_hop(&name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => debug!(header = %name, "Dropping invalid header"),
        }
    }
    out
}

async fn forward_streaming(
    upstream: &HttpNetwork,
    parts: &Parts,
    url: &str,
    body: Body,
) -> Result<axum::response::Response, FetchError> {
    let target = upstream.resolve(url)?;

    let mut builder = upstream.client().request(parts.method.clone(), target);
    for (name, value) in parts.headers.iter() {
        if is_forwardable(name.as_str()) {
            builder = builder.header(name.clone(), value.clone());
        }
    }
    let upstream_response = builder
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await?;

    let mut out = axum::response::Response::new(Body::empty());
    *out.status_mut() = upstream_response.status();
    for (name, value) in upstream_response.headers() {
        if !is_hop_by_hop(name.as_str()) {
            out.headers_mut().append(name.clone(), value.clone());
        }
    }
    *out.body_mut() = Body::from_stream(upstream_response.bytes_stream());
    Ok(out)
}

fn bad_gateway(url: &str, error: FetchError) -> axum::response::Response {
    warn!(url = %url, error = %error, "Upstream fetch failed");
    (
        StatusCode::BAD_GATEWAY,
        format!("Upstream fetch failed: {}", error),
    )
        .into_response()
}

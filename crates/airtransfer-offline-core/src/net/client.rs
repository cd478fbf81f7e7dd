//! HTTP network client for the AirTransfer origin.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, Client, ClientBuilder, Url};
use tracing::{debug, warn};

use crate::config::TlsConfig;
use crate::http::{is_hop_by_hop, Request, Response};

use super::{FetchError, Network};

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Returns true if a request header may be sent on to the origin.
/// `Host` and `Content-Length` are set by the client for the new connection.
pub fn is_forwardable(name: &str) -> bool {
    !is_hop_by_hop(name)
        && !name.eq_ignore_ascii_case("host")
        && !name.eq_ignore_ascii_case("content-length")
}

/// Network backed by a real HTTP origin.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone, Debug)]
pub struct HttpNetwork {
    client: Client,
    origin: Url,
    accepts_invalid_certs: bool,
}

impl HttpNetwork {
    /// Create a client for the given origin, e.g. `https://192.168.1.20:5000`,
    /// trusting only the system roots.
    pub fn new(origin: &str) -> Result<Self, FetchError> {
        Self::with_tls(origin, &TlsConfig::default())
    }

    /// Create a client whose trust settings follow `tls`: an extra root
    /// certificate, verification turned off, or both.
    pub fn with_tls(origin: &str, tls: &TlsConfig) -> Result<Self, FetchError> {
        let origin = parse_origin(origin)?;
        let mut builder = Client::builder().timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS));

        if let Some(ref path) = tls.ca_cert {
            builder = add_root_certificate(builder, path)?;
        }
        if tls.accept_invalid_certs {
            warn!(origin = %origin, "TLS certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build()?,
            origin,
            accepts_invalid_certs: tls.accept_invalid_certs,
        })
    }

    /// Use a preconfigured client, sharing its connection pool.
    pub fn with_client(client: Client, origin: &str) -> Result<Self, FetchError> {
        let origin = parse_origin(origin)?;
        Ok(Self {
            client,
            origin,
            accepts_invalid_certs: false,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// True if this client was built with certificate verification off
    pub fn accepts_invalid_certs(&self) -> bool {
        self.accepts_invalid_certs
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Resolve a request URL against the origin. Absolute URLs pass through.
    pub fn resolve(&self, url: &str) -> Result<Url, FetchError> {
        self.origin
            .join(url)
            .map_err(|e| FetchError::invalid_url(url, e))
    }
}

fn add_root_certificate(builder: ClientBuilder, path: &Path) -> Result<ClientBuilder, FetchError> {
    let pem = std::fs::read(path).map_err(|e| FetchError::certificate(path, e))?;
    let cert = Certificate::from_pem(&pem).map_err(|e| FetchError::certificate(path, e))?;
    debug!(path = %path.display(), "Trusting extra root certificate");
    Ok(builder.add_root_certificate(cert))
}

fn parse_origin(origin: &str) -> Result<Url, FetchError> {
    let url = Url::parse(origin).map_err(|e| FetchError::invalid_url(origin, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::invalid_url(
            origin,
            format!("unsupported scheme '{}'", other),
        )),
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = self.resolve(&request.url)?;
        debug!(method = %request.method, url = %url, "Fetching from network");

        let mut builder = self.client.request(request.method.clone(), url);
        for (name, value) in &request.headers {
            if is_forwardable(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(FetchError::from_send)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(status = status, bytes = body.len(), "Network response received");
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

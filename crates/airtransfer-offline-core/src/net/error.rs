use std::path::PathBuf;

use thiserror::Error;

use crate::http::Response;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected status {status} for {url}: {body}")]
    BadStatus { url: String, status: u16, body: String },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// No connection could be made to the origin (refused, no route,
    /// DNS failure, TLS handshake rejected). The case an offline cache
    /// exists for.
    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Failed to load CA certificate {path}: {reason}")]
    Certificate { path: PathBuf, reason: String },
}

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl FetchError {
    /// Quote a body without dumping an entire asset into the log
    fn truncate_body(body: &[u8]) -> String {
        let text = String::from_utf8_lossy(body);
        if text.len() <= MAX_ERROR_BODY_LENGTH {
            return text.into_owned();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &text[..end], body.len())
    }

    pub fn bad_status(url: &str, response: &Response) -> Self {
        FetchError::BadStatus {
            url: url.to_string(),
            status: response.status,
            body: Self::truncate_body(&response.body),
        }
    }

    /// Classify a failed send: connection failures become `Unreachable`,
    /// anything after the connection was made stays a `Network` error.
    pub fn from_send(err: reqwest::Error) -> Self {
        if err.is_connect() {
            FetchError::Unreachable(err.to_string())
        } else {
            FetchError::Network(err)
        }
    }

    pub fn certificate(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        FetchError::Certificate {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_url(url: &str, reason: impl ToString) -> Self {
        FetchError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

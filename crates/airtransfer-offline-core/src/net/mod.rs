//! Network access for the interceptor.
//!
//! The interceptor never talks to `reqwest` directly; it goes through the
//! [`Network`] trait so tests can substitute an in-memory origin. The real
//! implementation, [`HttpNetwork`], forwards to the AirTransfer server.

pub mod client;
pub mod error;

use async_trait::async_trait;

use crate::http::{Request, Response};

pub use client::HttpNetwork;
pub use error::FetchError;

/// Something that can turn a request into a response.
///
/// Any HTTP status is a successful fetch. Only failing to obtain a
/// response at all is an error.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

//! Network layer for proxyshim
//!
//! Provides the `Transport` seam and the hyper-based client behind it.

mod client;
mod response;
mod tls;

use std::future::Future;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Request;

pub use client::HttpClient;
pub use response::ForwardedResponse;

use crate::Result;

/// Outgoing request type carried through the pipeline
pub type OutgoingRequest = Request<Full<Bytes>>;

/// Something that can send a request and buffer its response
///
/// Implemented by the real client and by the redirecting interceptor, so
/// interceptors compose around any transport.
pub trait Transport: Send + Sync {
    /// Send a request and wait for the full response
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be delivered or the response read
    fn send(
        &self,
        request: OutgoingRequest,
    ) -> impl Future<Output = Result<ForwardedResponse>> + Send;
}

impl<T: Transport> Transport for &T {
    fn send(
        &self,
        request: OutgoingRequest,
    ) -> impl Future<Output = Result<ForwardedResponse>> + Send {
        (**self).send(request)
    }
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn send(
        &self,
        request: OutgoingRequest,
    ) -> impl Future<Output = Result<ForwardedResponse>> + Send {
        (**self).send(request)
    }
}

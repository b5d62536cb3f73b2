//! Redirection of client traffic through the test proxy

mod redirect;

pub use redirect::{OriginalTarget, Redirect};

use http::HeaderName;

/// Header carrying the recording id issued by the proxy
pub const RECORDING_ID_HEADER: HeaderName = HeaderName::from_static("x-recording-id");

/// Header carrying the session mode on forwarded calls
pub const RECORDING_MODE_HEADER: HeaderName = HeaderName::from_static("x-recording-mode");

/// Header carrying the true destination of a forwarded call
pub const RECORDING_UPSTREAM_BASE_URI_HEADER: HeaderName =
    HeaderName::from_static("x-recording-upstream-base-uri");

/// JSON key naming the recording file in the start request
pub const RECORDING_FILE_KEY: &str = "x-recording-file";

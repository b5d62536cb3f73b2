//! Proxyshim - route SDK test traffic through a record/playback test proxy
//!
//! A [`Session`] drives the proxy's start/stop protocol. A [`Redirect`]
//! wraps any [`Transport`] so every request is rewritten to reach the proxy
//! while responses still look like they came from the real service.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod env_file;
pub mod error;
pub mod network;
pub mod proxy;
pub mod recording;

pub use config::{Mode, ProxyConfig};
pub use error::{Result, ShimError};
pub use network::{ForwardedResponse, HttpClient, Transport};
pub use proxy::Redirect;
pub use recording::Session;

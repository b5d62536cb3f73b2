//! Buffered HTTP response tied to the URL that produced it

use bytes::Bytes;
use http::header::{HeaderName, LOCATION};
use http::{HeaderMap, StatusCode, Uri};
use serde::de::DeserializeOwned;

use crate::{Result, ShimError};

/// Response from a dispatched request
///
/// `url` is the URL of the request as the caller should see it. Follow-up
/// requests (polling, paging) resolve relative references against it.
#[derive(Debug, Clone)]
pub struct ForwardedResponse {
    /// URL of the request that produced this response
    pub url: Uri,
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

impl ForwardedResponse {
    /// Header value as a string, if present and valid UTF-8
    #[must_use]
    pub fn header<K>(&self, name: K) -> Option<&str>
    where
        K: TryInto<HeaderName>,
    {
        let name = name.try_into().ok()?;
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body as text, with invalid UTF-8 replaced
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON
    ///
    /// # Errors
    ///
    /// Returns error if the body is not valid JSON for `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Absolute URL of the `Location` header, if present
    ///
    /// # Errors
    ///
    /// Returns error if the header cannot be resolved against `url`
    pub fn location(&self) -> Result<Option<Uri>> {
        match self.header(LOCATION) {
            Some(reference) => self.resolve(reference).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve a URL reference against the request URL
    ///
    /// Absolute references are returned unchanged, `/path` references take
    /// the scheme and authority of `url`, anything else is joined onto the
    /// directory of `url`'s path.
    ///
    /// # Errors
    ///
    /// Returns error if the reference or the joined URL is malformed
    pub fn resolve(&self, reference: &str) -> Result<Uri> {
        let parsed = reference
            .parse::<Uri>()
            .map_err(|e| ShimError::InvalidRequest(format!("Invalid URL '{reference}': {e}")))?;

        if parsed.scheme().is_some() {
            return Ok(parsed);
        }

        let path_and_query = if reference.starts_with('/') {
            reference.to_string()
        } else {
            let base = self.url.path();
            let dir = base.rfind('/').map_or("/", |i| &base[..=i]);
            format!("{dir}{reference}")
        };

        let mut builder = Uri::builder();
        if let Some(scheme) = self.url.scheme() {
            builder = builder.scheme(scheme.clone());
        }
        if let Some(authority) = self.url.authority() {
            builder = builder.authority(authority.clone());
        }

        builder
            .path_and_query(path_and_query.as_str())
            .build()
            .map_err(|e| ShimError::InvalidRequest(format!("Invalid URL '{path_and_query}': {e}")))
    }
}

//! Redirecting interceptor
//!
//! Rewrites each outgoing request so the test proxy receives it with the
//! true destination in `x-recording-upstream-base-uri`, then points the
//! response's request URL back at the true destination. Code that follows
//! URLs from a response (LRO polling, paging) therefore keeps computing them
//! against the real service, while its next request still goes through this
//! interceptor and lands on the proxy.

use http::header::HOST;
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{HeaderValue, Request, Uri};
use tracing::debug;

use super::{RECORDING_ID_HEADER, RECORDING_MODE_HEADER, RECORDING_UPSTREAM_BASE_URI_HEADER};
use crate::config::{Mode, ProxyConfig};
use crate::network::{ForwardedResponse, OutgoingRequest, Transport};
use crate::{Result, ShimError};

/// Precomputed proxy location and routing header values
#[derive(Debug, Clone)]
struct Route {
    scheme: Scheme,
    authority: Authority,
    host: HeaderValue,
    mode: Mode,
    recording_id: HeaderValue,
}

/// Scheme and authority of a request before it was redirected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalTarget {
    scheme: Scheme,
    authority: Authority,
}

impl OriginalTarget {
    /// Capture the target of `uri`
    ///
    /// # Errors
    ///
    /// Returns error if `uri` is not absolute
    pub fn of(uri: &Uri) -> Result<Self> {
        let scheme = uri
            .scheme()
            .cloned()
            .ok_or_else(|| ShimError::InvalidRequest(format!("URL '{uri}' has no scheme")))?;
        let authority = uri
            .authority()
            .cloned()
            .ok_or_else(|| ShimError::InvalidRequest(format!("URL '{uri}' has no host")))?;

        Ok(Self { scheme, authority })
    }

    /// Original scheme
    #[must_use]
    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Original host and optional port
    #[must_use]
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// `scheme://authority`, the value of the upstream base URI header
    #[must_use]
    pub fn base_uri(&self) -> String {
        format!("{}://{}", self.scheme, self.authority)
    }

    /// Point the response's request URL back at this target
    ///
    /// # Errors
    ///
    /// Returns error if the response URL cannot be rebuilt
    pub fn restore(&self, response: &mut ForwardedResponse) -> Result<()> {
        response.url = retarget(&response.url, &self.scheme, &self.authority)?;
        Ok(())
    }
}

/// Replace scheme and authority of `uri`, keeping path and query
fn retarget(uri: &Uri, scheme: &Scheme, authority: &Authority) -> Result<Uri> {
    let mut parts = uri.clone().into_parts();
    parts.scheme = Some(scheme.clone());
    parts.authority = Some(authority.clone());
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }

    Uri::from_parts(parts)
        .map_err(|e| ShimError::InvalidRequest(format!("Cannot rewrite URL '{uri}': {e}")))
}

/// Transport that routes requests through the test proxy
///
/// In live mode it passes requests straight to the inner transport.
#[derive(Debug, Clone)]
pub struct Redirect<T> {
    inner: T,
    route: Option<Route>,
}

impl<T> Redirect<T> {
    /// Create an interceptor for `config`
    ///
    /// # Errors
    ///
    /// Returns error if the mode is record or playback and `recording_id` is
    /// missing or empty, or if the proxy location is not a valid authority
    pub fn new(inner: T, config: &ProxyConfig, recording_id: Option<&str>) -> Result<Self> {
        if config.mode.is_live() {
            return Ok(Self::passthrough(inner));
        }

        let recording_id = recording_id.filter(|id| !id.is_empty()).ok_or_else(|| {
            ShimError::Configuration(format!(
                "A recording id is required before routing {} traffic through the proxy",
                config.mode
            ))
        })?;

        let authority = config.authority();
        let route = Route {
            scheme: config
                .scheme()
                .parse::<Scheme>()
                .map_err(|e| ShimError::Configuration(format!("Invalid proxy scheme: {e}")))?,
            authority: authority.parse::<Authority>().map_err(|e| {
                ShimError::Configuration(format!("Invalid proxy address '{authority}': {e}"))
            })?,
            host: header_value(&authority)?,
            mode: config.mode,
            recording_id: header_value(recording_id)?,
        };

        Ok(Self {
            inner,
            route: Some(route),
        })
    }

    /// Create an interceptor that changes nothing
    pub fn passthrough(inner: T) -> Self {
        Self { inner, route: None }
    }

    /// Whether requests go straight to the inner transport
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.route.is_none()
    }

    /// Mode stamped on redirected requests, live for a passthrough
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.route.as_ref().map_or(Mode::Live, |route| route.mode)
    }

    /// Wrapped transport
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Rewrite a request to target the proxy
    ///
    /// Returns the rewritten request and the target it originally had, or
    /// the untouched request and `None` in live mode.
    ///
    /// # Errors
    ///
    /// Returns error if the request URL is not absolute
    pub fn intercept(
        &self,
        request: OutgoingRequest,
    ) -> Result<(OutgoingRequest, Option<OriginalTarget>)> {
        let Some(route) = &self.route else {
            return Ok((request, None));
        };

        let (mut parts, body) = request.into_parts();
        let original = OriginalTarget::of(&parts.uri)?;

        parts.uri = retarget(&parts.uri, &route.scheme, &route.authority)?;

        if parts.headers.contains_key(HOST) {
            parts.headers.insert(HOST, route.host.clone());
        }

        parts.headers.insert(
            RECORDING_UPSTREAM_BASE_URI_HEADER,
            header_value(&original.base_uri())?,
        );
        parts
            .headers
            .insert(RECORDING_MODE_HEADER, HeaderValue::from_static(route.mode.as_str()));
        parts
            .headers
            .insert(RECORDING_ID_HEADER, route.recording_id.clone());

        debug!(
            "Redirecting {} {} via {}",
            parts.method,
            original.base_uri(),
            route.authority
        );

        Ok((Request::from_parts(parts, body), Some(original)))
    }
}

impl<T: Transport> Transport for Redirect<T> {
    async fn send(&self, request: OutgoingRequest) -> Result<ForwardedResponse> {
        let (request, original) = self.intercept(request)?;

        let mut response = self.inner.send(request).await?;

        if let Some(original) = original {
            original.restore(&mut response)?;
        }

        Ok(response)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ShimError::InvalidRequest(format!("Invalid header value '{value}': {e}")))
}

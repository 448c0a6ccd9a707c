/**
 * Engine configuration.
 *
 * Passed to `RequestDispatcher::new` and `AttributionPoller::new`.
 * All fields have sensible defaults via `Default`.
 *
 * # Example
 * ```ignore
 * let options = beacon_core::Options {
 *     base_url: "https://events.example.com".into(),
 *     ..Default::default()
 * };
 * ```
 */
use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::protocol::constants::{
    DEFAULT_ATTRIBUTION_URL, DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT, DEFAULT_KEEP_ALIVE,
    DEFAULT_REQUEST_TIMEOUT,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Packages are POSTed to `base_url` + package path.
    pub base_url: String,

    /// Scheme and authority of attribution queries.
    pub attribution_url: String,

    /// Deadline for establishing a connection.
    pub connect_timeout: Duration,

    /// Deadline for a whole request, response body included.
    pub request_timeout: Duration,

    /// Idle period after which a component's worker thread is released.
    pub keep_alive: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            attribution_url: DEFAULT_ATTRIBUTION_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }
}

impl Options {
    /// Checks that `base_url` is an absolute URL.
    pub fn base(&self) -> Result<Url, Error> {
        Ok(Url::parse(&self.base_url)?)
    }

    /// Parses `attribution_url`, which must be able to carry a path.
    pub fn attribution_base(&self) -> Result<Url, Error> {
        let url = Url::parse(&self.attribution_url)?;
        if url.cannot_be_a_base() {
            return Err(Error::NotABase(self.attribution_url.clone()));
        }
        Ok(url)
    }
}

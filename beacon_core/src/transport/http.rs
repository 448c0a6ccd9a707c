/*!
 * HTTP transport layer.
 *
 * The engine only depends on the `Transport` trait: "perform this POST /
 * GET and give me the status and body, or tell me what kind of failure
 * stopped you". `UreqTransport` is the default implementation, a
 * blocking `ureq` agent; the owning executor already runs it on a
 * dedicated background thread, so blocking I/O is fine.
 *
 * Failures are never propagated as panics. They come back as a
 * `TransportError` whose `FailureKind` decides whether the package is
 * retried or skipped.
 */

use std::io;
use std::time::Duration;

use ureq::Agent;

use crate::error::{FailureKind, TransportError};
use crate::protocol::constants::CLIENT_SDK_HEADER;

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// A package POST: form-urlencoded body, client-SDK header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    pub url: String,
    pub client_sdk: String,
    pub body: String,
}

/// An attribution GET; all parameters already live in the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    pub url: String,
    pub client_sdk: String,
}

/// What came back over the wire, whatever the status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport capability
// ---------------------------------------------------------------------------

/**
 * Performs HTTPS round trips. Shared between a component and its worker
 * thread, hence `Send + Sync`.
 */
pub trait Transport: Send + Sync {
    fn post(&self, request: &PostRequest) -> Result<RawResponse, TransportError>;

    fn get(&self, request: &GetRequest) -> Result<RawResponse, TransportError>;
}

// ---------------------------------------------------------------------------
// UreqTransport
// ---------------------------------------------------------------------------

/**
 * Thin wrapper around `ureq::Agent`.
 *
 * Non-2xx statuses are returned as responses, not errors: the interpreter
 * decides what a 4xx/5xx body means.
 */
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    /**
     * Creates a transport with the given connect deadline and overall
     * per-request deadline.
     *
     * Connection pooling and keep-alive are handled by the agent internally.
     */
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_connect(Some(connect_timeout))
            .timeout_global(Some(request_timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self { agent }
    }

    fn read(
        result: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    ) -> Result<RawResponse, TransportError> {
        let response = result.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.into_body().read_to_string().map_err(classify)?;

        Ok(RawResponse { status, body })
    }
}

impl Transport for UreqTransport {
    fn post(&self, request: &PostRequest) -> Result<RawResponse, TransportError> {
        let result = self
            .agent
            .post(request.url.as_str())
            .header(CLIENT_SDK_HEADER, request.client_sdk.as_str())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send(request.body.as_str());

        Self::read(result)
    }

    fn get(&self, request: &GetRequest) -> Result<RawResponse, TransportError> {
        let result = self
            .agent
            .get(request.url.as_str())
            .header(CLIENT_SDK_HEADER, request.client_sdk.as_str())
            .call();

        Self::read(result)
    }
}

/**
 * Maps a `ureq` error onto the failure taxonomy.
 *
 * - request could not be built (bad URI, bad header) → `Encoding`
 * - deadline exceeded → `Timeout`
 * - DNS / connect / socket trouble → `Io`
 * - everything else → `Unclassified`
 */
pub fn classify(err: ureq::Error) -> TransportError {
    let kind = match &err {
        ureq::Error::BadUri(_) | ureq::Error::Http(_) => FailureKind::Encoding,
        ureq::Error::Timeout(_) => FailureKind::Timeout,
        ureq::Error::Io(io_err) => classify_io(io_err),
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => FailureKind::Io,
        _ => FailureKind::Unclassified,
    };

    TransportError::new(kind, err.to_string())
}

fn classify_io(err: &io::Error) -> FailureKind {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => FailureKind::Timeout,
        io::ErrorKind::InvalidInput => FailureKind::Encoding,
        _ => FailureKind::Io,
    }
}

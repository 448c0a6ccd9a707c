/*!
 * Beacon Core — the delivery engine.
 *
 * Turns queued packages into HTTPS requests, one at a time, and polls for
 * attribution on a server-directed schedule. The package queue and the
 * session manager live outside this crate and are reached through the
 * `PackageQueue` / `SessionHandler` traits.
 *
 * End users should depend on the `beacon` facade crate instead, which
 * wires the default transport and logger.
 *
 * # Module structure
 *
 * - `protocol/` — what we send: types, constants, request building, response interpretation
 * - `transport/` — how we deliver: HTTP, serialized executor, one-shot timer
 * - `dispatcher` — package delivery and retry/advance routing
 * - `poller` — attribution polling
 */

mod collaborators;
mod dispatcher;
mod error;
mod logger;
mod options;
mod poller;
pub mod protocol;
pub mod transport;

#[cfg(test)]
mod testing;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use collaborators::{PackageQueue, SessionHandler};
pub use dispatcher::RequestDispatcher;
pub use error::{Error, FailureKind, TransportError};
pub use logger::{LogLevel, Logger, NullLogger, TracingLogger};
pub use options::Options;
pub use poller::AttributionPoller;
pub use protocol::constants::BEACON_VERSION;
pub use protocol::interpreter::ResponseInterpreter;
pub use protocol::types::{ActivityKind, Attribution, DeepLink, Event, Outcome};
pub use transport::{
    GetRequest, OneShotTimer, PostRequest, RawResponse, ScheduledHandle, SerializedExecutor,
    TimerState, Transport, UreqTransport,
};

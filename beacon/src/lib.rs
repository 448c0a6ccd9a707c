/**
 * Beacon — reliable event delivery for tracking clients.
 *
 * This is the crate users should depend on. It re-exports the engine and
 * wires the default `ureq` transport and `tracing` logger through a single
 * `init` call.
 *
 * # Quick start
 *
 * ```ignore
 * use std::sync::Arc;
 *
 * let queue: Arc<dyn beacon::PackageQueue> = Arc::new(MyQueue::default());
 * let session: Arc<dyn beacon::SessionHandler> = Arc::new(MySession::default());
 * let attribution = Arc::new(beacon::Event::new(
 *     beacon::ActivityKind::Attribution,
 *     "/attribution",
 *     beacon::BEACON_VERSION,
 * ));
 *
 * let engine = beacon::init("https://app.example.com", &queue, &session, attribution)?;
 * engine.dispatcher().send(next_package, queue_len);
 * engine.poller().request_attribution();
 * ```
 */

use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Re-exports from beacon_core — the public surface area
// ---------------------------------------------------------------------------

pub use beacon_core::{
    ActivityKind, Attribution, AttributionPoller, DeepLink, Error, Event, FailureKind, LogLevel,
    Logger, NullLogger, Outcome, PackageQueue, RequestDispatcher, SessionHandler, TracingLogger,
    Transport, TransportError, UreqTransport, BEACON_VERSION,
};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/**
 * Configuration for the engine.
 *
 * Implements `From<&str>` so you can pass just a base URL to `init()`.
 * Defaults:
 * - `attribution_url` = the default endpoint
 * - `starts_sending` = `true`
 * - `has_listener` = `true`
 * - timeouts 60 s, worker keep-alive 10 s
 */
#[derive(Clone)]
pub struct Options {
    /// Packages are POSTed here.
    pub base_url: String,

    /// Attribution queries go here.
    pub attribution_url: String,

    /// `false` starts the attribution poller paused.
    pub starts_sending: bool,

    /// Whether anybody listens for attribution changes. Without a
    /// listener the poller never queries.
    pub has_listener: bool,

    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub keep_alive: Duration,

    /// Log sink. Defaults to `TracingLogger`.
    pub logger: Arc<dyn Logger>,
}

impl Default for Options {
    fn default() -> Self {
        let core = beacon_core::Options::default();
        Self {
            base_url: core.base_url,
            attribution_url: core.attribution_url,
            starts_sending: true,
            has_listener: true,
            connect_timeout: core.connect_timeout,
            request_timeout: core.request_timeout,
            keep_alive: core.keep_alive,
            logger: Arc::new(TracingLogger),
        }
    }
}

/**
 * Allows `beacon::init("https://...", ...)` — converts a base URL into
 * `Options` with all defaults.
 */
impl From<&str> for Options {
    fn from(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/**
 * The running engine: one dispatcher and one attribution poller, each on
 * its own worker.
 *
 * Dropping the engine tears both down.
 */
pub struct Engine {
    dispatcher: RequestDispatcher,
    poller: AttributionPoller,
}

impl Engine {
    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    pub fn poller(&self) -> &AttributionPoller {
        &self.poller
    }

    /// Tears down the dispatcher, then the poller.
    pub fn teardown(&self) {
        self.dispatcher.teardown();
        self.poller.teardown();
    }
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

/**
 * Builds the engine with the default HTTP transport.
 *
 * Both collaborators are held weakly: keep your own `Arc`s alive for as
 * long as results should be delivered.
 *
 * # Errors
 * Returns `Error::InvalidUrl` / `Error::NotABase` when a configured URL
 * cannot be used.
 */
pub fn init(
    options: impl Into<Options>,
    queue: &Arc<dyn PackageQueue>,
    session: &Arc<dyn SessionHandler>,
    attribution_package: Arc<Event>,
) -> Result<Engine, Error> {
    let opts = options.into();

    /*
     * Split Options into the engine part and the poller flags.
     */
    let core_options = beacon_core::Options {
        base_url: opts.base_url,
        attribution_url: opts.attribution_url,
        connect_timeout: opts.connect_timeout,
        request_timeout: opts.request_timeout,
        keep_alive: opts.keep_alive,
    };

    let transport: Arc<dyn Transport> = Arc::new(UreqTransport::new(
        core_options.connect_timeout,
        core_options.request_timeout,
    ));

    let dispatcher = RequestDispatcher::new(
        queue,
        &core_options,
        transport.clone(),
        opts.logger.clone(),
    )?;

    let poller = AttributionPoller::new(
        session,
        attribution_package,
        opts.starts_sending,
        opts.has_listener,
        &core_options,
        transport,
        opts.logger,
    )?;

    Ok(Engine { dispatcher, poller })
}

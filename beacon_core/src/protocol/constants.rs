/**
 * Engine-wide constants.
 *
 * Default endpoints, header names and naming prefixes shared by the
 * dispatcher, the attribution poller and their executors.
 */
use std::time::Duration;

/// SDK version string reported in logs and usable as a client-SDK tag.
/// Derived at compile time from the `beacon_core` package version in `Cargo.toml`.
pub const BEACON_VERSION: &str = concat!("beacon-rust/", env!("CARGO_PKG_VERSION"));

/// Endpoint that tracked packages are POSTed to (package path is appended).
pub const DEFAULT_BASE_URL: &str = "https://app.beacon.io";

/// Scheme + authority used for attribution queries (package path is appended).
pub const DEFAULT_ATTRIBUTION_URL: &str = "https://app.beacon.io";

/// Header carrying the client-SDK tag of the package being sent.
pub const CLIENT_SDK_HEADER: &str = "Client-SDK";

/// Prefix of every worker thread name, followed by the executor name.
pub const THREAD_PREFIX: &str = "Beacon-";

/// Name used in the attribution timer's log lines.
pub const ATTRIBUTION_TIMER_NAME: &str = "Attribution timer";

/// Connect and read deadlines both default to one minute.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How long an idle worker thread lingers before it is released.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(10);

/// Response body keys.
pub const ASK_IN_KEY: &str = "ask_in";
pub const ATTRIBUTION_KEY: &str = "attribution";
pub const DEEPLINK_KEY: &str = "deeplink";

/// Extra request parameters added at send time.
pub const SENT_AT_PARAM: &str = "sent_at";
pub const QUEUE_SIZE_PARAM: &str = "queue_size";

/**
 * Transport layer — HTTP delivery and background execution.
 *
 * Everything related to *how* packages leave the device:
 * - `http` — `Transport` capability and the `ureq`-based default
 * - `executor` — single-worker task queue with delayed tasks
 * - `timer` — one-shot, re-armable trigger on top of the executor
 */

pub mod executor;
pub mod http;
pub mod timer;

pub use executor::{ScheduledHandle, SerializedExecutor};
pub use http::{GetRequest, PostRequest, RawResponse, Transport, UreqTransport};
pub use timer::{OneShotTimer, TimerState};

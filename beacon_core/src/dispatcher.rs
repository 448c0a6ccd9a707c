/**
 * Request dispatcher — delivers one package at a time and tells the
 * package queue what to do next.
 *
 * `send()` returns immediately; the round trip runs on the dispatcher's
 * own `SerializedExecutor`, so at most one send is ever in flight.
 *
 * Routing:
 *
 * | what happened                         | queue call            |
 * |---------------------------------------|-----------------------|
 * | body parsed as a JSON object          | `send_next_package`   |
 * | body empty or not a JSON object       | `close_first_package` |
 * | request could not be built            | `send_next_package`   |
 * | timeout / other I/O failure           | `close_first_package` |
 * | anything else (incl. transport panic) | `send_next_package`   |
 *
 * A parsed body advances the queue even when the server rejected the
 * package inside the JSON: only transport trouble or an unreadable answer
 * keeps the same package for a retry.
 */
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::collaborators::{Collaborator, PackageQueue};
use crate::error::{Error, TransportError};
use crate::logger::Logger;
use crate::options::Options;
use crate::protocol::interpreter::ResponseInterpreter;
use crate::protocol::request;
use crate::protocol::types::{Event, Outcome};
use crate::transport::executor::panic_message;
use crate::transport::{PostRequest, SerializedExecutor, Transport};

struct DispatcherInner {
    executor: SerializedExecutor,
    queue: Collaborator<dyn PackageQueue>,
    transport: Arc<dyn Transport>,
    logger: Arc<dyn Logger>,
    base_url: String,
}

impl DispatcherInner {
    fn send_i(&self, event: &Event, queue_size: usize) {
        match self.round_trip(event, queue_size) {
            Ok(outcome) if outcome.json_response.is_none() => {
                self.close_first_package(outcome, event);
            }
            Ok(outcome) => self.send_next_package(outcome),
            Err(err) => self.handle_failure(event, &err),
        }
    }

    fn round_trip(&self, event: &Event, queue_size: usize) -> Result<Outcome, TransportError> {
        let target = request::post_target(&self.base_url, event)?;
        let post = PostRequest {
            url: target.into(),
            client_sdk: event.client_sdk.clone(),
            body: request::post_body(event, queue_size, &request::sent_at_now()),
        };

        let response = panic::catch_unwind(AssertUnwindSafe(|| self.transport.post(&post)))
            .unwrap_or_else(|payload| {
                Err(TransportError::unclassified(panic_message(payload.as_ref())))
            })?;

        Ok(ResponseInterpreter::interpret(&response, event, self.logger.as_ref()))
    }

    fn handle_failure(&self, event: &Event, err: &TransportError) {
        let reason = format!("{}: {}", err.kind.reason(), err.message);
        let mut outcome = Outcome::for_event(event);

        if err.kind.is_retryable() {
            let message = format!("{}. ({}) Will retry later", event.failure_message(), reason);
            self.logger.error(&message);
            outcome.message = Some(message);
            outcome.will_retry = true;
            self.close_first_package(outcome, event);
        } else {
            let message = format!("{}. ({})", event.failure_message(), reason);
            self.logger.error(&message);
            outcome.message = Some(message);
            self.send_next_package(outcome);
        }
    }

    fn close_first_package(&self, outcome: Outcome, event: &Event) {
        match self.queue.get() {
            Some(queue) => queue.close_first_package(outcome, event),
            None => self.logger.verbose("Package queue released, dropping result"),
        }
    }

    fn send_next_package(&self, outcome: Outcome) {
        match self.queue.get() {
            Some(queue) => queue.send_next_package(outcome),
            None => self.logger.verbose("Package queue released, dropping result"),
        }
    }
}

/**
 * Sends packages handed over by the queue.
 *
 * Dropping the dispatcher tears it down.
 */
pub struct RequestDispatcher {
    inner: Arc<DispatcherInner>,
    torn_down: AtomicBool,
}

impl RequestDispatcher {
    /**
     * Creates a dispatcher bound to `queue`.
     *
     * # Returns
     * `Err` if `options.base_url` is not an absolute URL.
     */
    pub fn new(
        queue: &Arc<dyn PackageQueue>,
        options: &Options,
        transport: Arc<dyn Transport>,
        logger: Arc<dyn Logger>,
    ) -> Result<Self, Error> {
        options.base()?;

        let executor =
            SerializedExecutor::new("RequestDispatcher", options.keep_alive, logger.clone());

        Ok(Self {
            inner: Arc::new(DispatcherInner {
                executor,
                queue: Collaborator::new(queue),
                transport,
                logger,
                base_url: options.base_url.clone(),
            }),
            torn_down: AtomicBool::new(false),
        })
    }

    /// Rebinds the dispatcher to another queue without rebuilding it.
    pub fn init(&self, queue: &Arc<dyn PackageQueue>) {
        self.inner.queue.set(queue);
    }

    /**
     * Queues `event` for delivery and returns immediately.
     *
     * # Arguments
     * * `event` — The package at the head of the queue.
     * * `queue_size` — Current queue depth, reported to the server.
     */
    pub fn send(&self, event: Arc<Event>, queue_size: usize) {
        let inner = Arc::clone(&self.inner);
        self.inner
            .executor
            .submit(move || inner.send_i(&event, queue_size));
    }

    /**
     * Stops accepting packages and releases the queue. Already queued sends
     * still run, but their results are dropped. An in-flight HTTPS call is
     * not interrupted. Safe to call more than once.
     */
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }

        self.inner.logger.verbose("RequestDispatcher teardown");
        self.inner.executor.shutdown();
        self.inner.queue.clear();
    }

    /// The dispatcher's executor, for diagnostics and shutdown waits.
    pub fn executor(&self) -> &SerializedExecutor {
        &self.inner.executor
    }
}

impl Drop for RequestDispatcher {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::logger::LogLevel;
    use crate::protocol::types::ActivityKind;
    use crate::testing::{QueueCall, RecordingLogger, RecordingQueue, Reply, ScriptedTransport};
    use crate::transport::RawResponse;
    use crossbeam_channel::Receiver;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    struct Fixture {
        dispatcher: RequestDispatcher,
        transport: Arc<ScriptedTransport>,
        logger: Arc<RecordingLogger>,
        queue: Arc<dyn PackageQueue>,
        calls: Receiver<QueueCall>,
    }

    fn fixture() -> Fixture {
        let (recording, calls) = RecordingQueue::new();
        let queue: Arc<dyn PackageQueue> = recording;
        let transport = Arc::new(ScriptedTransport::new());
        let logger = Arc::new(RecordingLogger::new());
        let options = Options {
            base_url: "https://app.example.com".into(),
            ..Default::default()
        };

        let dispatcher =
            RequestDispatcher::new(&queue, &options, transport.clone(), logger.clone()).unwrap();

        Fixture {
            dispatcher,
            transport,
            logger,
            queue,
            calls,
        }
    }

    fn event_package() -> Arc<Event> {
        Arc::new(
            Event::new(ActivityKind::Event, "/event", "rust1.0")
                .with_parameter("event_token", "abc123")
                .with_suffix(" 'abc123'"),
        )
    }

    #[test]
    fn test_posts_package_with_queue_size_and_client_sdk() {
        let f = fixture();
        f.transport.push(Reply::Respond(RawResponse::new(200, r#"{"message":"ok"}"#)));

        f.dispatcher.send(event_package(), 4);
        f.calls.recv_timeout(WAIT).unwrap();

        let posts = f.transport.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].url, "https://app.example.com/event");
        assert_eq!(posts[0].client_sdk, "rust1.0");
        assert!(posts[0].body.starts_with("event_token=abc123&sent_at="));
        assert!(posts[0].body.ends_with("&queue_size=4"));
    }

    #[test]
    fn test_json_response_advances_queue() {
        let f = fixture();
        f.transport.push(Reply::Respond(RawResponse::new(200, r#"{"message":"Event tracked"}"#)));

        f.dispatcher.send(event_package(), 1);

        match f.calls.recv_timeout(WAIT).unwrap() {
            QueueCall::SendNext { outcome } => {
                assert!(outcome.success);
                assert_eq!(outcome.message.as_deref(), Some("Event tracked"));
            }
            other => panic!("unexpected call: {other:?}"),
        }
    }

    #[test]
    fn test_rejected_json_response_still_advances_queue() {
        let f = fixture();
        f.transport.push(Reply::Respond(RawResponse::new(
            400,
            r#"{"error":"Event request failed (Invalid event token)"}"#,
        )));

        f.dispatcher.send(event_package(), 1);

        match f.calls.recv_timeout(WAIT).unwrap() {
            QueueCall::SendNext { outcome } => {
                assert!(!outcome.success);
                assert!(!outcome.will_retry);
                assert_eq!(outcome.status, Some(400));
            }
            other => panic!("unexpected call: {other:?}"),
        }
    }

    #[test]
    fn test_unparsable_body_closes_package_for_retry() {
        let f = fixture();
        f.transport.push(Reply::Respond(RawResponse::new(503, "Service Unavailable")));

        f.dispatcher.send(event_package(), 1);

        match f.calls.recv_timeout(WAIT).unwrap() {
            QueueCall::CloseFirst { outcome, event } => {
                assert!(outcome.json_response.is_none());
                assert!(outcome.responded);
                assert_eq!(event.path, "/event");
            }
            other => panic!("unexpected call: {other:?}"),
        }
    }

    #[test]
    fn test_timeout_closes_package_with_retry_suffix() {
        let f = fixture();
        f.transport.push(Reply::Fail(TransportError::timeout("read timed out")));

        f.dispatcher.send(event_package(), 1);

        match f.calls.recv_timeout(WAIT).unwrap() {
            QueueCall::CloseFirst { outcome, .. } => {
                assert_eq!(
                    outcome.message.as_deref(),
                    Some("Failed to track event 'abc123'. (Request timed out: read timed out) Will retry later")
                );
                assert!(outcome.will_retry);
                assert!(!outcome.responded);
            }
            other => panic!("unexpected call: {other:?}"),
        }
        assert!(f.logger.contains(LogLevel::Error, "Will retry later"));
    }

    #[test]
    fn test_io_failure_closes_package_for_retry() {
        let f = fixture();
        f.transport.push(Reply::Fail(TransportError::io("connection reset")));

        f.dispatcher.send(event_package(), 1);

        match f.calls.recv_timeout(WAIT).unwrap() {
            QueueCall::CloseFirst { outcome, .. } => {
                let message = outcome.message.unwrap();
                assert!(message.contains("(Request failed: connection reset)"));
                assert!(message.ends_with("Will retry later"));
            }
            other => panic!("unexpected call: {other:?}"),
        }
    }

    #[test]
    fn test_encoding_failure_advances_without_retry_suffix() {
        let f = fixture();
        f.transport.push(Reply::Fail(TransportError::encoding("invalid header value")));

        f.dispatcher.send(event_package(), 1);

        match f.calls.recv_timeout(WAIT).unwrap() {
            QueueCall::SendNext { outcome } => {
                assert_eq!(
                    outcome.message.as_deref(),
                    Some("Failed to track event 'abc123'. (Failed to encode parameters: invalid header value)")
                );
                assert!(!outcome.will_retry);
            }
            other => panic!("unexpected call: {other:?}"),
        }
    }

    #[test]
    fn test_unbuildable_target_is_an_encoding_failure() {
        let f = fixture();
        let package = Arc::new(Event::new(ActivityKind::Event, ":bad:port", "rust1.0"));

        f.dispatcher.send(package, 1);

        match f.calls.recv_timeout(WAIT).unwrap() {
            QueueCall::SendNext { outcome } => {
                assert!(outcome.message.unwrap().contains("Failed to encode parameters"));
            }
            other => panic!("unexpected call: {other:?}"),
        }
        assert!(f.transport.posts().is_empty());
    }

    #[test]
    fn test_unclassified_failure_advances_queue() {
        let f = fixture();
        f.transport
            .push(Reply::Fail(TransportError::new(FailureKind::Unclassified, "weird")));

        f.dispatcher.send(event_package(), 1);

        match f.calls.recv_timeout(WAIT).unwrap() {
            QueueCall::SendNext { outcome } => {
                assert!(outcome.message.unwrap().contains("(Runtime exception: weird)"));
            }
            other => panic!("unexpected call: {other:?}"),
        }
    }

    #[test]
    fn test_panicking_transport_advances_queue() {
        let f = fixture();
        f.transport.push(Reply::Panic("transport exploded"));

        f.dispatcher.send(event_package(), 1);

        match f.calls.recv_timeout(WAIT).unwrap() {
            QueueCall::SendNext { outcome } => {
                assert!(outcome
                    .message
                    .unwrap()
                    .contains("(Runtime exception: transport exploded)"));
            }
            other => panic!("unexpected call: {other:?}"),
        }
    }

    #[test]
    fn test_sends_are_processed_in_order() {
        let f = fixture();
        f.transport.push(Reply::Respond(RawResponse::new(200, r#"{"message":"first"}"#)));
        f.transport.push(Reply::Respond(RawResponse::new(200, r#"{"message":"second"}"#)));

        f.dispatcher.send(event_package(), 2);
        f.dispatcher.send(event_package(), 1);

        let messages: Vec<_> = (0..2)
            .map(|_| match f.calls.recv_timeout(WAIT).unwrap() {
                QueueCall::SendNext { outcome } => outcome.message.unwrap(),
                other => panic!("unexpected call: {other:?}"),
            })
            .collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn test_late_response_after_teardown_is_dropped() {
        let f = fixture();
        let (release_tx, release_rx) = crossbeam_channel::bounded(1);
        f.transport.push(Reply::Block(
            release_rx,
            RawResponse::new(200, r#"{"message":"late"}"#),
        ));

        f.dispatcher.send(event_package(), 1);
        f.transport.wait_for_requests(1, WAIT);

        f.dispatcher.teardown();
        f.dispatcher.teardown();
        drop(f.queue);
        release_tx.send(()).unwrap();

        assert!(f.dispatcher.executor().await_termination(WAIT));
        assert!(f.calls.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(f.logger.contains(LogLevel::Verbose, "Package queue released"));
    }

    #[test]
    fn test_send_after_teardown_is_rejected() {
        let f = fixture();
        f.dispatcher.teardown();

        f.dispatcher.send(event_package(), 1);

        assert!(f.logger.contains(LogLevel::Warn, "Task rejected from RequestDispatcher"));
        assert!(f.transport.posts().is_empty());
    }

    #[test]
    fn test_init_rebinds_queue() {
        let f = fixture();
        let (recording, other_calls) = RecordingQueue::new();
        let other: Arc<dyn PackageQueue> = recording;
        f.transport.push(Reply::Respond(RawResponse::new(200, "{}")));

        f.dispatcher.init(&other);
        f.dispatcher.send(event_package(), 1);

        assert!(matches!(
            other_calls.recv_timeout(WAIT).unwrap(),
            QueueCall::SendNext { .. }
        ));
        assert!(f.calls.try_recv().is_err());
    }

    #[test]
    fn test_relative_base_url_is_rejected() {
        let (recording, _calls) = RecordingQueue::new();
        let queue: Arc<dyn PackageQueue> = recording;
        let options = Options {
            base_url: "app.example.com".into(),
            ..Default::default()
        };

        let result = RequestDispatcher::new(
            &queue,
            &options,
            Arc::new(ScriptedTransport::new()),
            Arc::new(RecordingLogger::new()),
        );
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }
}

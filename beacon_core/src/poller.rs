/**
 * Attribution poller — asks the server which campaign a device belongs to,
 * as often as the server tells it to.
 *
 * Every fetch runs on the poller's own `SerializedExecutor`, triggered by
 * the attribution `OneShotTimer`. Session and attribution results are
 * submitted to the same executor, so they are processed strictly after
 * any fetch already running.
 *
 * A response carrying `ask_in` means "not decided yet, ask again in N ms":
 * the session is flagged as waiting and the timer is re-armed. Without it
 * the attribution (and, for attribution responses, the deep link) is
 * decoded and handed over to the session.
 */
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use url::Url;

use crate::collaborators::{Collaborator, SessionHandler};
use crate::error::{Error, TransportError};
use crate::logger::Logger;
use crate::options::Options;
use crate::protocol::constants::ATTRIBUTION_TIMER_NAME;
use crate::protocol::interpreter::ResponseInterpreter;
use crate::protocol::request;
use crate::protocol::types::{ActivityKind, Event, Outcome};
use crate::transport::executor::panic_message;
use crate::transport::{GetRequest, OneShotTimer, SerializedExecutor, Transport};

struct PollerInner {
    executor: SerializedExecutor,
    timer: OneShotTimer,
    session: Collaborator<dyn SessionHandler>,
    package: Mutex<Option<Arc<Event>>>,
    transport: Arc<dyn Transport>,
    logger: Arc<dyn Logger>,
    attribution_base: Url,
    paused: AtomicBool,
    has_listener: AtomicBool,
    last_url: Mutex<Option<Url>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PollerInner {
    fn request_attribution_in(&self, delay: Duration) {
        let fire_in = self.timer.fire_in_millis();
        let delay_millis = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);

        // an earlier check is already pending
        if fire_in > 0 && fire_in <= delay_millis {
            return;
        }

        if !delay.is_zero() {
            self.logger.debug(&format!(
                "Waiting to query attribution in {:.1} seconds",
                delay.as_secs_f64()
            ));
        }

        self.timer.start_in(delay);
    }

    /// Timer action.
    fn get_attribution_i(self: &Arc<Self>) {
        if !self.has_listener.load(Ordering::Acquire) {
            return;
        }

        if self.paused.load(Ordering::Acquire) {
            self.logger.debug("Attribution poller is paused");
            return;
        }

        let Some(package) = lock(&self.package).clone() else {
            self.logger.verbose("No attribution package, skipping attribution query");
            return;
        };

        self.logger.verbose(&package.extended_string());

        let target =
            request::attribution_target(&self.attribution_base, &package, &request::sent_at_now());
        let get = GetRequest {
            url: target.to_string(),
            client_sdk: package.client_sdk.clone(),
        };

        let response = match panic::catch_unwind(AssertUnwindSafe(|| self.transport.get(&get)))
            .unwrap_or_else(|payload| {
                Err(TransportError::unclassified(panic_message(payload.as_ref())))
            }) {
            Ok(response) => response,
            Err(err) => {
                self.logger
                    .error(&format!("Failed to get attribution ({err})"));
                return;
            }
        };

        let outcome = ResponseInterpreter::interpret(&response, &package, self.logger.as_ref());
        *lock(&self.last_url) = Some(target);

        if outcome.kind != ActivityKind::Attribution {
            return;
        }

        self.submit_attribution_response(outcome);
    }

    fn submit_attribution_response(self: &Arc<Self>, outcome: Outcome) {
        let inner = Arc::clone(self);
        self.executor
            .submit(move || inner.check_attribution_response_i(outcome));
    }

    fn session(&self) -> Option<Arc<dyn SessionHandler>> {
        let session = self.session.get();
        if session.is_none() {
            self.logger
                .verbose("Session handler released, dropping attribution result");
        }
        session
    }

    /// Applies `ask_in` backoff, or decodes the attribution when there is none.
    fn check_attribution_i(&self, session: &dyn SessionHandler, outcome: &mut Outcome) {
        let Some(json) = outcome.json_response.as_ref() else {
            return;
        };

        if let Some(ask_in) = ResponseInterpreter::ask_in(json) {
            session.set_asking_attribution(true);
            self.request_attribution_in(Duration::from_millis(ask_in));
            return;
        }

        session.set_asking_attribution(false);
        outcome.attribution = ResponseInterpreter::attribution(json);
    }

    fn check_deep_link_i(outcome: &mut Outcome) {
        if let Some(json) = outcome.json_response.as_ref() {
            outcome.deep_link = ResponseInterpreter::deep_link(json);
        }
    }

    fn check_session_response_i(&self, mut outcome: Outcome) {
        let Some(session) = self.session() else {
            return;
        };

        self.check_attribution_i(session.as_ref(), &mut outcome);
        session.launch_session_response_tasks(outcome);
    }

    fn check_attribution_response_i(&self, mut outcome: Outcome) {
        let Some(session) = self.session() else {
            return;
        };

        self.check_attribution_i(session.as_ref(), &mut outcome);
        Self::check_deep_link_i(&mut outcome);
        session.launch_attribution_response_tasks(outcome);
    }
}

/**
 * Polls for attribution on a server-directed schedule.
 *
 * Dropping the poller tears it down.
 */
pub struct AttributionPoller {
    inner: Arc<PollerInner>,
    torn_down: AtomicBool,
}

impl AttributionPoller {
    /**
     * Creates a poller for `package`.
     *
     * # Arguments
     * * `session` — Receives the asking flag and the decoded results.
     * * `package` — The attribution query package.
     * * `starts_sending` — `false` starts the poller paused.
     * * `has_listener` — Without a listener, timer fires are ignored.
     *
     * # Returns
     * `Err` if `options.attribution_url` is not an absolute URL that can
     * carry a path.
     */
    pub fn new(
        session: &Arc<dyn SessionHandler>,
        package: Arc<Event>,
        starts_sending: bool,
        has_listener: bool,
        options: &Options,
        transport: Arc<dyn Transport>,
        logger: Arc<dyn Logger>,
    ) -> Result<Self, Error> {
        let attribution_base = options.attribution_base()?;
        let executor =
            SerializedExecutor::new("AttributionPoller", options.keep_alive, logger.clone());

        let inner = Arc::new_cyclic(|weak: &Weak<PollerInner>| {
            let weak = weak.clone();
            let timer = OneShotTimer::new(
                executor.clone(),
                move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.get_attribution_i();
                    }
                },
                ATTRIBUTION_TIMER_NAME,
                logger.clone(),
            );

            PollerInner {
                executor,
                timer,
                session: Collaborator::new(session),
                package: Mutex::new(Some(package)),
                transport,
                logger,
                attribution_base,
                paused: AtomicBool::new(!starts_sending),
                has_listener: AtomicBool::new(has_listener),
                last_url: Mutex::new(None),
            }
        });

        Ok(Self {
            inner,
            torn_down: AtomicBool::new(false),
        })
    }

    /// Reconfigures the poller in place.
    pub fn init(
        &self,
        session: &Arc<dyn SessionHandler>,
        package: Arc<Event>,
        starts_sending: bool,
        has_listener: bool,
    ) {
        let inner = &self.inner;
        inner.session.set(session);
        *lock(&inner.package) = Some(package);
        inner.paused.store(!starts_sending, Ordering::Release);
        inner.has_listener.store(has_listener, Ordering::Release);
    }

    /// Asks for attribution as soon as possible.
    pub fn request_attribution(&self) {
        self.request_attribution_in(Duration::ZERO);
    }

    /**
     * Asks for attribution after `delay`. Never postpones a check that is
     * already due sooner.
     */
    pub fn request_attribution_in(&self, delay: Duration) {
        self.inner.request_attribution_in(delay);
    }

    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    /// Checks a session response for attribution data, then hands it to the session.
    pub fn on_session_result(&self, outcome: Outcome) {
        let inner = Arc::clone(&self.inner);
        self.inner
            .executor
            .submit(move || inner.check_session_response_i(outcome));
    }

    /// Checks an attribution response (attribution and deep link), then hands it over.
    pub fn on_attribution_result(&self, outcome: Outcome) {
        self.inner.submit_attribution_response(outcome);
    }

    /// URL of the last attribution query that got an answer.
    pub fn last_url_used(&self) -> Option<Url> {
        lock(&self.inner.last_url).clone()
    }

    /// Milliseconds until the next scheduled query; `0` when none is pending.
    pub fn fire_in_millis(&self) -> i64 {
        self.inner.timer.fire_in_millis()
    }

    pub fn executor(&self) -> &SerializedExecutor {
        &self.inner.executor
    }

    /**
     * Cancels the timer, discards queued work and releases the session and
     * package. An in-flight query is not interrupted; its result is
     * dropped. Safe to call more than once.
     */
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let inner = &self.inner;
        inner.logger.verbose("AttributionPoller teardown");
        inner.timer.cancel(true);
        inner.executor.shutdown_now();
        inner.session.clear();
        *lock(&inner.package) = None;
    }
}

impl Drop for AttributionPoller {
    fn drop(&mut self) {
        self.teardown();
    }
}

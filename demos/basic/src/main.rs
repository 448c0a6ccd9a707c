/**
 * Minimal harness for the Beacon engine.
 *
 * Point BEACON_URL at a collector (defaults to a local one), then run:
 *
 *   RUST_LOG=beacon=trace cargo run -p beacon_demo
 *   cargo run -p beacon_demo -- --paused   # start with attribution paused
 */
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use beacon::{ActivityKind, Event, Outcome, PackageQueue, SessionHandler};
use crossbeam_channel::{Receiver, Sender};
use tracing_subscriber::EnvFilter;

/// What the queue heard back about its head package.
enum Verdict {
    Retry,
    Next,
}

/// In-memory package queue: the head stays until the engine advances it.
struct DemoQueue {
    packages: Mutex<VecDeque<Arc<Event>>>,
    verdicts: Sender<Verdict>,
}

impl DemoQueue {
    fn new(packages: Vec<Event>) -> (Arc<Self>, Receiver<Verdict>) {
        let (verdicts, rx) = crossbeam_channel::unbounded();
        let queue = Self {
            packages: Mutex::new(packages.into_iter().map(Arc::new).collect()),
            verdicts,
        };
        (Arc::new(queue), rx)
    }

    fn head(&self) -> Option<(Arc<Event>, usize)> {
        let packages = self.packages.lock().ok()?;
        packages.front().map(|p| (p.clone(), packages.len()))
    }
}

impl PackageQueue for DemoQueue {
    fn close_first_package(&self, outcome: Outcome, event: &Event) {
        println!("[demo] keeping {} for later: {:?}", event.path, outcome.message);
        let _ = self.verdicts.send(Verdict::Retry);
    }

    fn send_next_package(&self, outcome: Outcome) {
        println!("[demo] done with head package, success = {}", outcome.success);
        if let Ok(mut packages) = self.packages.lock() {
            packages.pop_front();
        }
        let _ = self.verdicts.send(Verdict::Next);
    }
}

struct DemoSession;

impl SessionHandler for DemoSession {
    fn set_asking_attribution(&self, asking: bool) {
        println!("[demo] asking attribution = {asking}");
    }

    fn launch_session_response_tasks(&self, outcome: Outcome) {
        println!("[demo] session response: {:?}", outcome.message);
    }

    fn launch_attribution_response_tasks(&self, outcome: Outcome) {
        println!("[demo] attribution: {:?}", outcome.attribution);
        if let Some(link) = outcome.deep_link {
            println!("[demo] deep link: {link}");
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let paused = std::env::args().any(|a| a == "--paused");
    let base_url =
        std::env::var("BEACON_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());

    let packages = vec![
        Event::new(ActivityKind::Session, "/session", beacon::BEACON_VERSION)
            .with_parameter("app_token", "demo-token"),
        Event::new(ActivityKind::Event, "/event", beacon::BEACON_VERSION)
            .with_parameter("app_token", "demo-token")
            .with_parameter("event_token", "abc123")
            .with_suffix(" 'abc123'"),
    ];

    let (demo_queue, verdicts) = DemoQueue::new(packages);
    let queue: Arc<dyn PackageQueue> = demo_queue.clone();
    let session: Arc<dyn SessionHandler> = Arc::new(DemoSession);
    let attribution = Arc::new(
        Event::new(ActivityKind::Attribution, "/attribution", beacon::BEACON_VERSION)
            .with_parameter("app_token", "demo-token"),
    );

    let engine = match beacon::init(
        beacon::Options {
            attribution_url: base_url.clone(),
            starts_sending: !paused,
            request_timeout: Duration::from_secs(5),
            ..beacon::Options::from(base_url.as_str())
        },
        &queue,
        &session,
        attribution,
    ) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("[demo] cannot start: {e}");
            return;
        }
    };

    engine.poller().request_attribution();

    /*
     * Drive the queue: send the head, wait for the verdict, and back off a
     * little before retrying a package the engine handed back.
     */
    let mut retries = 0;
    while let Some((package, depth)) = demo_queue.head() {
        engine.dispatcher().send(package, depth);

        match verdicts.recv_timeout(Duration::from_secs(30)) {
            Ok(Verdict::Next) => retries = 0,
            Ok(Verdict::Retry) if retries < 2 => {
                retries += 1;
                thread::sleep(Duration::from_secs(1));
            }
            _ => {
                println!("[demo] giving up");
                break;
            }
        }
    }

    println!("[demo] done");
    engine.teardown();
}

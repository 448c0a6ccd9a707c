//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::collaborators::{PackageQueue, SessionHandler};
use crate::error::TransportError;
use crate::logger::{LogLevel, Logger};
use crate::protocol::types::{Event, Outcome};
use crate::transport::{GetRequest, PostRequest, RawResponse, Transport};

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|(l, message)| *l == level && message.contains(needle))
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        self.entries.lock().unwrap().push((level, message.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

pub enum Reply {
    Respond(RawResponse),
    Fail(TransportError),
    Panic(&'static str),
    /// Waits for a release signal, then responds.
    Block(Receiver<()>, RawResponse),
}

/// Answers requests from a queue of scripted replies, in order.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    posts: Mutex<Vec<PostRequest>>,
    gets: Mutex<Vec<GetRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn posts(&self) -> Vec<PostRequest> {
        self.posts.lock().unwrap().clone()
    }

    pub fn gets(&self) -> Vec<GetRequest> {
        self.gets.lock().unwrap().clone()
    }

    /// Polls until `count` requests (of either method) have been seen.
    pub fn wait_for_requests(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.posts.lock().unwrap().len() + self.gets.lock().unwrap().len() >= count {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn answer(&self) -> Result<RawResponse, TransportError> {
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Panic(message)) => panic!("{message}"),
            Some(Reply::Block(release, response)) => {
                let _ = release.recv_timeout(Duration::from_secs(5));
                Ok(response)
            }
            None => Err(TransportError::io("no scripted reply")),
        }
    }
}

impl Transport for ScriptedTransport {
    fn post(&self, request: &PostRequest) -> Result<RawResponse, TransportError> {
        self.posts.lock().unwrap().push(request.clone());
        self.answer()
    }

    fn get(&self, request: &GetRequest) -> Result<RawResponse, TransportError> {
        self.gets.lock().unwrap().push(request.clone());
        self.answer()
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum QueueCall {
    CloseFirst { outcome: Outcome, event: Event },
    SendNext { outcome: Outcome },
}

pub struct RecordingQueue {
    calls: Sender<QueueCall>,
}

impl RecordingQueue {
    pub fn new() -> (Arc<Self>, Receiver<QueueCall>) {
        let (calls, rx) = crossbeam_channel::unbounded();
        (Arc::new(Self { calls }), rx)
    }
}

impl PackageQueue for RecordingQueue {
    fn close_first_package(&self, outcome: Outcome, event: &Event) {
        let _ = self.calls.send(QueueCall::CloseFirst {
            outcome,
            event: event.clone(),
        });
    }

    fn send_next_package(&self, outcome: Outcome) {
        let _ = self.calls.send(QueueCall::SendNext { outcome });
    }
}

#[derive(Debug)]
pub enum SessionCall {
    AskingAttribution(bool),
    SessionResponse(Outcome),
    AttributionResponse(Outcome),
}

pub struct RecordingSession {
    calls: Sender<SessionCall>,
}

impl RecordingSession {
    pub fn new() -> (Arc<Self>, Receiver<SessionCall>) {
        let (calls, rx) = crossbeam_channel::unbounded();
        (Arc::new(Self { calls }), rx)
    }
}

impl SessionHandler for RecordingSession {
    fn set_asking_attribution(&self, asking: bool) {
        let _ = self.calls.send(SessionCall::AskingAttribution(asking));
    }

    fn launch_session_response_tasks(&self, outcome: Outcome) {
        let _ = self.calls.send(SessionCall::SessionResponse(outcome));
    }

    fn launch_attribution_response_tasks(&self, outcome: Outcome) {
        let _ = self.calls.send(SessionCall::AttributionResponse(outcome));
    }
}

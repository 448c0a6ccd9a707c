//! Loopback HTTP server and recording collaborators for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use beacon_core::{Event, Outcome, PackageQueue, SessionHandler};
use crossbeam_channel::{Receiver, Sender};

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// How the server answers one connection.
#[derive(Debug, Clone)]
pub enum Behavior {
    Reply { status: u16, body: String },
    /// Reads the request, then holds the connection open without answering.
    Stall(Duration),
}

impl Behavior {
    pub fn json(status: u16, body: &str) -> Self {
        Behavior::Reply {
            status,
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    pub target: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

pub struct TestServer {
    pub base_url: String,
    pub requests: Receiver<Captured>,
}

impl TestServer {
    /// Serves one connection per behavior, in order, then stops accepting.
    pub fn start(behaviors: Vec<Behavior>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, requests) = crossbeam_channel::unbounded();

        thread::spawn(move || {
            for behavior in behaviors {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                let tx = tx.clone();
                thread::spawn(move || serve(stream, behavior, tx));
            }
        });

        Self { base_url, requests }
    }
}

/// A base URL nothing listens on.
pub fn refused_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn serve(stream: TcpStream, behavior: Behavior, tx: Sender<Captured>) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let Some(captured) = read_request(&mut reader) else {
        return;
    };
    let _ = tx.send(captured);

    let mut stream = stream;
    match behavior {
        Behavior::Reply { status, body } => {
            let response = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                reason(status),
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
        }
        Behavior::Stall(hold) => thread::sleep(hold),
    }
}

fn read_request(reader: &mut BufReader<TcpStream>) -> Option<Captured> {
    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let body = if let Some(length) = headers.get("content-length") {
        let mut buf = vec![0; length.parse().ok()?];
        reader.read_exact(&mut buf).ok()?;
        String::from_utf8(buf).ok()?
    } else if headers.get("transfer-encoding").map(String::as_str) == Some("chunked") {
        read_chunked(reader)?
    } else {
        String::new()
    };

    Some(Captured {
        method,
        target,
        headers,
        body,
    })
}

fn read_chunked(reader: &mut BufReader<TcpStream>) -> Option<String> {
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        reader.read_line(&mut size_line).ok()?;
        let size = usize::from_str_radix(size_line.trim(), 16).ok()?;

        let mut chunk = vec![0; size + 2];
        reader.read_exact(&mut chunk).ok()?;
        if size == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..size]);
    }
    String::from_utf8(body).ok()
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum QueueCall {
    CloseFirst(Outcome),
    SendNext(Outcome),
}

pub struct ChannelQueue(Sender<QueueCall>);

impl ChannelQueue {
    pub fn new() -> (Arc<dyn PackageQueue>, Receiver<QueueCall>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let queue: Arc<dyn PackageQueue> = Arc::new(Self(tx));
        (queue, rx)
    }
}

impl PackageQueue for ChannelQueue {
    fn close_first_package(&self, outcome: Outcome, _event: &Event) {
        let _ = self.0.send(QueueCall::CloseFirst(outcome));
    }

    fn send_next_package(&self, outcome: Outcome) {
        let _ = self.0.send(QueueCall::SendNext(outcome));
    }
}

#[derive(Debug)]
pub enum SessionCall {
    Asking(bool),
    Session(Outcome),
    Attribution(Outcome),
}

pub struct ChannelSession(Sender<SessionCall>);

impl ChannelSession {
    pub fn new() -> (Arc<dyn SessionHandler>, Receiver<SessionCall>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let session: Arc<dyn SessionHandler> = Arc::new(Self(tx));
        (session, rx)
    }
}

impl SessionHandler for ChannelSession {
    fn set_asking_attribution(&self, asking: bool) {
        let _ = self.0.send(SessionCall::Asking(asking));
    }

    fn launch_session_response_tasks(&self, outcome: Outcome) {
        let _ = self.0.send(SessionCall::Session(outcome));
    }

    fn launch_attribution_response_tasks(&self, outcome: Outcome) {
        let _ = self.0.send(SessionCall::Attribution(outcome));
    }
}

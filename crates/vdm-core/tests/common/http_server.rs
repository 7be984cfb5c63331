//! Minimal HTTP/1.1 server for integration tests.
//!
//! Answers each GET with the next scripted response; once the script runs
//! out, the last response is repeated.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn with_body(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }
}

/// A running server: its base URL and how many requests it has answered.
pub struct Server {
    pub url: String,
    pub hits: Arc<AtomicUsize>,
}

/// Starts a server in a background thread. Runs until the process exits.
pub fn start(script: Vec<Response>) -> Server {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let script = Arc::new(Mutex::new(VecDeque::from(script)));
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    thread::spawn(move || {
        let mut last: Option<Response> = None;
        for mut stream in listener.incoming().flatten() {
            let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
            let mut buf = [0u8; 8192];
            if !matches!(stream.read(&mut buf), Ok(n) if n > 0) {
                continue;
            }
            counter.fetch_add(1, Ordering::SeqCst);
            let response = match script.lock().unwrap().pop_front() {
                Some(r) => {
                    last = Some(r.clone());
                    r
                }
                None => last.clone().unwrap_or_else(|| Response::status(404)),
            };
            let head = format!(
                "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                response.status,
                response.body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&response.body);
        }
    });
    Server {
        url: format!("http://127.0.0.1:{}/", port),
        hits,
    }
}

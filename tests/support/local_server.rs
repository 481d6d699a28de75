//! Local servers for the integration tests.
//!
//! Tests that need a listening socket skip themselves when localhost cannot
//! be bound, as in some sandboxed runners. Setting
//! `OUTCALL_REQUIRE_SOCKET_TESTS=1` turns that skip into a failure.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "OUTCALL_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    let value = std::env::var(REQUIRE_ENV).unwrap_or_default();
    ["1", "true", "yes"].contains(&value.to_ascii_lowercase().as_str())
}

fn bind_localhost() -> Option<TcpListener> {
    match TcpListener::bind("127.0.0.1:0") {
        Ok(listener) => Some(listener),
        Err(error) if sockets_required() => {
            panic!("cannot bind localhost: {error}; {REQUIRE_ENV} forbids skipping")
        }
        Err(error) => {
            eprintln!("cannot bind localhost: {error}; skipping. Set {REQUIRE_ENV}=1 to fail.");
            None
        }
    }
}

/// Starts a wiremock server, or returns `None` when sockets are unavailable.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    drop(bind_localhost()?);
    Some(MockServer::start().await)
}

/// Absolute URL of `path` on `server`.
pub fn url(server: &MockServer, path: &str) -> String {
    format!("{}{path}", server.uri())
}

/// Answers one request with a `200` whose `Content-Length` is `declared`,
/// sends only `body`, then closes the connection. Returns the base URL.
#[allow(dead_code)]
pub fn serve_truncated_body(declared: usize, body: &'static [u8]) -> Option<String> {
    let listener = bind_localhost()?;
    let addr = listener.local_addr().ok()?;

    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 512];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\n\r\n");
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.write_all(body);
        let _ = stream.flush();
    });

    Some(format!("http://{addr}"))
}

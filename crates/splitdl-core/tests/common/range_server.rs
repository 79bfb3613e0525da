//! Minimal HTTP/1.1 server with HEAD and Range GET support for integration tests.
//!
//! Serves one static body, one request per connection.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct RangeServerOptions {
    /// GET ignores Range and always returns 200 with the full body.
    pub ignore_ranges: bool,
    /// The first N GETs answer 503.
    pub fail_first_gets: usize,
    /// Sent as `ETag` on every response.
    pub etag: Option<String>,
}

/// Handle to a running server; it lives until the process exits.
pub struct RangeServer {
    pub url: String,
    gets: Arc<AtomicUsize>,
}

impl RangeServer {
    /// GET requests received so far.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let gets = Arc::new(AtomicUsize::new(0));
    let opts = Arc::new(opts);
    let gets_in_server = Arc::clone(&gets);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let opts = Arc::clone(&opts);
            let gets = Arc::clone(&gets_in_server);
            thread::spawn(move || handle(stream, &body, &opts, &gets));
        }
    });
    RangeServer {
        url: format!("http://127.0.0.1:{}/blob.bin", port),
        gets,
    }
}

fn handle(mut stream: TcpStream, body: &[u8], opts: &RangeServerOptions, gets: &AtomicUsize) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let (method, range) = parse_request(request);
    let total = body.len() as u64;
    let mut extra = String::from("Connection: close\r\n");
    if !opts.ignore_ranges {
        extra.push_str("Accept-Ranges: bytes\r\n");
    }
    if let Some(etag) = &opts.etag {
        extra.push_str(&format!("ETag: \"{}\"\r\n", etag));
    }

    if method.eq_ignore_ascii_case("HEAD") {
        let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}\r\n", total, extra);
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
        return;
    }

    let seen = gets.fetch_add(1, Ordering::SeqCst);
    if seen < opts.fail_first_gets {
        let _ = stream.write_all(
            b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    }

    let (status, content_range, slice) = match range {
        Some((start, end_incl)) if !opts.ignore_ranges => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start > end_incl || start >= total {
                ("416 Range Not Satisfiable", format!("bytes */{}", total), &body[0..0])
            } else {
                (
                    "206 Partial Content",
                    format!("bytes {}-{}/{}", start, end_incl, total),
                    &body[start as usize..=end_incl as usize],
                )
            }
        }
        _ => ("200 OK", String::new(), body),
    };
    let content_range = if content_range.is_empty() {
        String::new()
    } else {
        format!("Content-Range: {}\r\n", content_range)
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}{}\r\n",
        status,
        slice.len(),
        content_range,
        extra
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(slice);
}

/// Returns (method, optional (start, end_inclusive) for `Range: bytes=X-Y`).
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut lines = request.lines();
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("");
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("range") {
            continue;
        }
        let Some(bytes) = value.trim().strip_prefix("bytes=") else {
            continue;
        };
        if let Some((a, b)) = bytes.split_once('-') {
            let start = a.trim().parse::<u64>().unwrap_or(0);
            let end = b.trim().parse::<u64>().unwrap_or(u64::MAX);
            range = Some((start, end));
        }
    }
    (method, range)
}

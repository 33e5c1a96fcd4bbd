//! Minimal HTTP/1.1 server that answers HEAD and ranged GET for one static body.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405 and the client must probe with a ranged GET.
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Sent as `Content-Disposition: attachment; filename="..."`.
    pub filename: Option<String>,
    /// Sent as `X-Checksum-Sha256`.
    pub sha256: Option<String>,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            filename: None,
            sha256: None,
        }
    }
}

/// Serve `body` from a background thread until the process exits.
/// Returns the base URL, e.g. `http://127.0.0.1:12345/`.
pub fn start(body: Vec<u8>, opts: RangeServerOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let opts = Arc::new(opts);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let opts = Arc::clone(&opts);
            thread::spawn(move || handle(stream, &body, &opts));
        }
    });
    format!("http://127.0.0.1:{port}/")
}

fn extra_headers(opts: &RangeServerOptions) -> String {
    let mut h = String::new();
    if opts.support_ranges {
        h.push_str("Accept-Ranges: bytes\r\n");
    }
    if let Some(name) = &opts.filename {
        h.push_str(&format!("Content-Disposition: attachment; filename=\"{name}\"\r\n"));
    }
    if let Some(d) = &opts.sha256 {
        h.push_str(&format!("X-Checksum-Sha256: {d}\r\n"));
    }
    h
}

fn handle(mut stream: TcpStream, body: &[u8], opts: &RangeServerOptions) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
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
    let extra = extra_headers(opts);

    if method.eq_ignore_ascii_case("HEAD") {
        if !opts.head_allowed {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
            return;
        }
        let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {total}\r\n{extra}\r\n");
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    let (status, content_range, slice) = match range.filter(|_| opts.support_ranges) {
        Some((start, end_incl)) => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start > end_incl || start >= total {
                ("416 Range Not Satisfiable", format!("bytes */{total}"), &body[0..0])
            } else {
                (
                    "206 Partial Content",
                    format!("bytes {start}-{end_incl}/{total}"),
                    &body[start as usize..=end_incl as usize],
                )
            }
        }
        None => (
            "200 OK",
            format!("bytes 0-{}/{total}", total.saturating_sub(1)),
            body,
        ),
    };
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nContent-Range: {content_range}\r\n{extra}\r\n",
        slice.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(slice);
}

/// Returns (method, optional (start, end_inclusive) for `Range: bytes=X-Y`).
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut method = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("range") {
            continue;
        }
        let Some(spec) = value.trim().strip_prefix("bytes=") else {
            continue;
        };
        if let Some((a, b)) = spec.split_once('-') {
            let start = a.trim().parse::<u64>().unwrap_or(0);
            let end = b.trim().parse::<u64>().unwrap_or(u64::MAX);
            range = Some((start, end));
        }
    }
    (method, range)
}

//! Parse HTTP response header lines into the metadata a source needs.

/// Key response headers for sizing, naming and verifying a resource.
#[derive(Debug, Clone, Default)]
pub struct HeadInfo {
    /// Final HTTP status of the response (after redirects).
    pub status: Option<u32>,
    /// Total size in bytes, if `Content-Length` is present.
    pub content_length: Option<u64>,
    /// True if server sent `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
    /// `Content-Disposition` value if present (filename hint).
    pub content_disposition: Option<String>,
    /// `Content-Range` as (start, end_inclusive, total) if present.
    pub content_range: Option<(u64, u64, Option<u64>)>,
    /// SHA-256 published via `X-Checksum-Sha256`, lowercase hex.
    pub sha256: Option<String>,
}

/// Parse collected header lines. Lines of earlier responses in a redirect
/// chain are discarded whenever a new status line starts.
pub fn parse_headers(lines: &[String]) -> HeadInfo {
    let mut info = HeadInfo::default();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            info = HeadInfo {
                status: line
                    .split_whitespace()
                    .nth(1)
                    .and_then(|c| c.parse().ok()),
                ..HeadInfo::default()
            };
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            info.content_length = value.parse::<u64>().ok();
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            info.accept_ranges = value.eq_ignore_ascii_case("bytes");
        } else if name.eq_ignore_ascii_case("content-disposition") {
            info.content_disposition = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("content-range") {
            info.content_range = parse_content_range(value);
        } else if name.eq_ignore_ascii_case("x-checksum-sha256") {
            let v = value.trim_matches('"').to_ascii_lowercase();
            if v.len() == 64 && v.bytes().all(|b| b.is_ascii_hexdigit()) {
                info.sha256 = Some(v);
            }
        }
    }

    info
}

/// `bytes 0-99/1000` → (0, 99, Some(1000)); `bytes 0-99/*` → (0, 99, None).
fn parse_content_range(value: &str) -> Option<(u64, u64, Option<u64>)> {
    let rest = value.strip_prefix("bytes")?.trim();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn content_length_and_ranges() {
        let r = parse_headers(&lines(&[
            "HTTP/1.1 200 OK",
            "Content-Length: 12345",
            "Accept-Ranges: bytes",
        ]));
        assert_eq!(r.status, Some(200));
        assert_eq!(r.content_length, Some(12345));
        assert!(r.accept_ranges);
        assert!(r.sha256.is_none());
    }

    #[test]
    fn redirect_chain_keeps_last_response() {
        let r = parse_headers(&lines(&[
            "HTTP/1.1 302 Found",
            "Content-Length: 0",
            "Location: https://cdn.example.com/x",
            "",
            "HTTP/2 200",
            "content-length: 81604378624",
            "content-disposition: attachment; filename=\"TheSims4.zip\"",
        ]));
        assert_eq!(r.status, Some(200));
        assert_eq!(r.content_length, Some(81_604_378_624));
        assert!(r.content_disposition.unwrap().contains("TheSims4.zip"));
    }

    #[test]
    fn content_range_and_checksum() {
        let sha = "5891B5B522D5DF086D0FF0B110FBD9D21BB4FC7163AF34D08286A2E846F6BE03";
        let r = parse_headers(&lines(&[
            "HTTP/1.1 206 Partial Content",
            "Content-Range: bytes 0-0/4096",
            &format!("X-Checksum-Sha256: {sha}"),
        ]));
        assert_eq!(r.content_range, Some((0, 0, Some(4096))));
        assert_eq!(r.sha256.as_deref(), Some(sha.to_ascii_lowercase().as_str()));
    }

    #[test]
    fn malformed_checksum_ignored() {
        let r = parse_headers(&lines(&["X-Checksum-Sha256: not-a-digest"]));
        assert!(r.sha256.is_none());
    }
}

//! HTTP range source built on libcurl.

use std::cell::RefCell;
use std::io;
use std::str;
use std::time::Duration;

use curl::easy::Easy;

use super::head::{parse_headers, HeadInfo};
use super::{RangeSource, ResourceInfo};
use crate::config::HttpConfig;
use crate::resolver;
use crate::retry::SourceError;
use crate::url_model;

/// `RangeSource` over HTTP(S): HEAD (or a one-byte range probe) to size the
/// resource, ranged GET for the bytes. Share links are rewritten to direct
/// download URLs by `resolver::direct_url` before every request.
#[derive(Debug, Clone, Default)]
pub struct CurlSource {
    http: HttpConfig,
}

impl CurlSource {
    pub fn new(http: HttpConfig) -> Self {
        Self { http }
    }

    fn easy(&self, url: &str) -> Result<Easy, SourceError> {
        let mut easy = Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.connect_timeout(Duration::from_secs(self.http.connect_timeout_secs))?;
        // Low-speed abort instead of a wall-clock timeout so a slow but live
        // link can still finish a large range.
        easy.low_speed_limit(self.http.low_speed_limit_bytes)?;
        easy.low_speed_time(Duration::from_secs(self.http.low_speed_time_secs))?;
        Ok(easy)
    }

    fn head(&self, url: &str) -> Result<HeadInfo, SourceError> {
        let mut lines: Vec<String> = Vec::new();
        let mut easy = self.easy(url)?;
        easy.nobody(true)?;
        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    lines.push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.perform()?;
        }
        let mut info = parse_headers(&lines);
        info.status = Some(easy.response_code()?);
        Ok(info)
    }

    /// GET `bytes=0-0` for servers that refuse HEAD or omit Content-Length.
    fn range_probe(&self, url: &str) -> Result<HeadInfo, SourceError> {
        let mut lines: Vec<String> = Vec::new();
        let mut easy = self.easy(url)?;
        easy.range("0-0")?;
        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    lines.push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(|data| Ok(data.len()))?;
            transfer.perform()?;
        }
        let mut info = parse_headers(&lines);
        info.status = Some(easy.response_code()?);
        Ok(info)
    }
}

fn is_definitive(code: u32) -> bool {
    (400..500).contains(&code) && code != 408 && code != 429
}

/// Checks the response headers of a ranged GET before any body byte is accepted.
fn check_range_response(lines: &[String], offset: u64, length: u64) -> Result<(), SourceError> {
    let info = parse_headers(lines);
    let code = info.status.unwrap_or(0);
    if !(200..300).contains(&code) {
        return Err(SourceError::Http(code));
    }
    if code != 206 {
        return Err(SourceError::RangeIgnored(code));
    }
    match info.content_range {
        Some((start, end, _)) if start == offset && end == offset + length - 1 => Ok(()),
        _ => Err(SourceError::RangeIgnored(code)),
    }
}

impl RangeSource for CurlSource {
    fn resolve(&self, handle: &str) -> Result<ResourceInfo, SourceError> {
        let url = resolver::direct_url(handle);
        let head = match self.head(&url) {
            Ok(h) => Some(h),
            Err(SourceError::Curl(e)) => {
                tracing::debug!("HEAD failed ({e}), falling back to range probe");
                None
            }
            Err(e) => return Err(e),
        };
        let sized = head.filter(|h| {
            matches!(h.status, Some(200..=299)) && h.content_length.is_some()
        });
        let (total_size, info) = match sized {
            Some(h) => (h.content_length.unwrap_or_default(), h),
            None => {
                let probe = self.range_probe(&url)?;
                let code = probe.status.unwrap_or(0);
                if is_definitive(code) || code >= 500 {
                    return Err(SourceError::Http(code));
                }
                match probe.content_range {
                    Some((_, _, Some(total))) => (total, probe),
                    _ => return Err(SourceError::RangeIgnored(code)),
                }
            }
        };
        if let Some(code) = info.status.filter(|c| is_definitive(*c)) {
            return Err(SourceError::Http(code));
        }
        Ok(ResourceInfo {
            total_size,
            filename: Some(url_model::derive_filename(
                handle,
                info.content_disposition.as_deref(),
            )),
            digest: info.sha256,
        })
    }

    fn read_range(
        &self,
        handle: &str,
        offset: u64,
        length: u64,
        on_data: &mut dyn FnMut(&[u8]) -> io::Result<()>,
    ) -> Result<(), SourceError> {
        if length == 0 {
            return Ok(());
        }
        let url = resolver::direct_url(handle);
        let mut easy = self.easy(&url)?;
        easy.range(&format!("{}-{}", offset, offset + length - 1))?;

        let lines: RefCell<Vec<String>> = RefCell::new(Vec::new());
        let mut verdict: Option<Result<(), SourceError>> = None;
        let mut sink_error: Option<io::Error> = None;
        let mut received = 0u64;

        let performed = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    let line = s.trim_end();
                    let mut lines = lines.borrow_mut();
                    if line.starts_with("HTTP/") {
                        lines.clear();
                    }
                    lines.push(line.to_string());
                }
                true
            })?;
            transfer.write_function(|data| {
                let ok = verdict
                    .get_or_insert_with(|| check_range_response(&lines.borrow(), offset, length))
                    .is_ok();
                if !ok {
                    return Ok(0);
                }
                if received + data.len() as u64 > length {
                    verdict = Some(Err(SourceError::RangeIgnored(206)));
                    return Ok(0);
                }
                match on_data(data) {
                    Ok(()) => {
                        received += data.len() as u64;
                        Ok(data.len())
                    }
                    Err(e) => {
                        sink_error = Some(e);
                        Ok(0)
                    }
                }
            })?;
            transfer.perform()
        };

        if let Some(e) = sink_error {
            return Err(SourceError::Sink(e));
        }
        if let Some(Err(e)) = verdict {
            return Err(e);
        }
        performed?;

        let code = easy.response_code()?;
        if !(200..300).contains(&code) {
            return Err(SourceError::Http(code));
        }
        if received != length {
            return Err(SourceError::PartialTransfer {
                expected: length,
                received,
            });
        }
        Ok(())
    }
}

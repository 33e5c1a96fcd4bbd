//! Classify HTTP status, curl errors and source errors into retry error kinds.

use super::error::SourceError;
use super::policy::ErrorKind;

/// Classify an HTTP status code for retry decisions.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        408 => ErrorKind::Timeout,
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

/// Classify a curl error for retry decisions.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

/// Classify a source error into an ErrorKind.
pub fn classify(e: &SourceError) -> ErrorKind {
    match e {
        SourceError::Curl(ce) => classify_curl_error(ce),
        SourceError::Http(code) => classify_http_status(*code),
        SourceError::PartialTransfer { .. } => ErrorKind::Connection,
        SourceError::Network { kind, .. } => *kind,
        SourceError::RangeIgnored(_)
        | SourceError::Sink(_)
        | SourceError::NotFound(_)
        | SourceError::Aborted => ErrorKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_429_and_503_throttled() {
        assert_eq!(classify_http_status(429), ErrorKind::Throttled);
        assert_eq!(classify_http_status(503), ErrorKind::Throttled);
    }

    #[test]
    fn http_5xx_retryable() {
        assert!(matches!(classify_http_status(500), ErrorKind::Http5xx(500)));
        assert!(matches!(classify_http_status(502), ErrorKind::Http5xx(502)));
    }

    #[test]
    fn http_4xx_is_definitive() {
        assert_eq!(classify_http_status(404), ErrorKind::Other);
        assert_eq!(classify_http_status(403), ErrorKind::Other);
        assert_eq!(classify_http_status(408), ErrorKind::Timeout);
    }

    #[test]
    fn short_body_is_transient_and_sink_failure_is_not() {
        let short = SourceError::PartialTransfer {
            expected: 10,
            received: 4,
        };
        assert!(classify(&short).is_transient());
        let sink = SourceError::Sink(std::io::Error::other("disk full"));
        assert!(!classify(&sink).is_transient());
        assert!(!classify(&SourceError::NotFound("x".into())).is_transient());
    }
}

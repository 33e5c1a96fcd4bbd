//! Integrity verification: streaming SHA-256 over the assembled file.
//!
//! The file is read once through a fixed-size buffer; memory use does not
//! depend on the file size.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

pub const DEFAULT_BUF_SIZE: usize = 64 * 1024;

/// Outcome of comparing a computed digest with the expected one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Match { digest: String },
    Mismatch { expected: String, actual: String },
}

impl Verification {
    pub fn is_match(&self) -> bool {
        matches!(self, Verification::Match { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("verification aborted")]
    Aborted,
}

/// Lowercase hex with surrounding whitespace removed, for comparison.
pub fn normalize_digest(digest: &str) -> String {
    digest.trim().to_ascii_lowercase()
}

/// Compute the SHA-256 of `path` as lowercase hex.
///
/// `cancelled` is polled between buffer reads; `on_bytes` receives the number
/// of bytes hashed after every read.
pub fn digest_file(
    path: &Path,
    buf_size: usize,
    cancelled: &dyn Fn() -> bool,
    on_bytes: &mut dyn FnMut(u64),
) -> Result<String, VerifyError> {
    let io_err = |source| VerifyError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut f = File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; buf_size.max(1)];
    loop {
        if cancelled() {
            return Err(VerifyError::Aborted);
        }
        let n = match f.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_err(e)),
        };
        hasher.update(&buf[..n]);
        on_bytes(n as u64);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Stream `path` once and compare its digest with `expected`.
/// A mismatch is a result, not an error: the caller decides what it means.
pub fn verify(
    path: &Path,
    expected: &str,
    buf_size: usize,
    cancelled: &dyn Fn() -> bool,
) -> Result<Verification, VerifyError> {
    let actual = digest_file(path, buf_size, cancelled, &mut |_| {})?;
    let expected = normalize_digest(expected);
    if actual == expected {
        Ok(Verification::Match { digest: actual })
    } else {
        Ok(Verification::Mismatch { expected, actual })
    }
}

/// Compute SHA-256 of a file with the default buffer (used by the `checksum` command).
pub fn sha256_path(path: &Path) -> Result<String, VerifyError> {
    digest_file(path, DEFAULT_BUF_SIZE, &|| false, &mut |_| {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const HELLO_SHA256: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[test]
    fn sha256_path_empty_file() {
        let f = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(sha256_path(f.path()).unwrap(), EMPTY_SHA256);
    }

    #[test]
    fn small_buffer_gives_same_digest() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello\n").unwrap();
        f.flush().unwrap();
        let mut seen = 0;
        let digest = digest_file(f.path(), 2, &|| false, &mut |n| seen += n).unwrap();
        assert_eq!(digest, HELLO_SHA256);
        assert_eq!(seen, 6);
    }

    #[test]
    fn verify_match_is_case_insensitive() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello\n").unwrap();
        f.flush().unwrap();
        let expected = format!("  {}\n", HELLO_SHA256.to_uppercase());
        let v = verify(f.path(), &expected, DEFAULT_BUF_SIZE, &|| false).unwrap();
        assert!(v.is_match());
    }

    #[test]
    fn verify_mismatch_reports_both_digests() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"tampered").unwrap();
        f.flush().unwrap();
        match verify(f.path(), HELLO_SHA256, DEFAULT_BUF_SIZE, &|| false).unwrap() {
            Verification::Mismatch { expected, actual } => {
                assert_eq!(expected, HELLO_SHA256);
                assert_ne!(actual, HELLO_SHA256);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_and_abort_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.bin");
        assert!(matches!(
            verify(&missing, HELLO_SHA256, DEFAULT_BUF_SIZE, &|| false),
            Err(VerifyError::Io { .. })
        ));
        let f = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            digest_file(f.path(), 16, &|| true, &mut |_| {}),
            Err(VerifyError::Aborted)
        ));
    }
}

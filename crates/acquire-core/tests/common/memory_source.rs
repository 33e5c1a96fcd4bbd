//! In-process `RangeSource` over a byte buffer, with knobs for slow or
//! failing ranges and a record of what was served.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use acquire_core::fetcher::{RangeSource, ResourceInfo};
use acquire_core::retry::SourceError;

pub struct MemorySource {
    body: Vec<u8>,
    filename: Option<String>,
    digest: Option<String>,
    /// Sleep before serving each range.
    delay: Duration,
    /// Offset answered with this HTTP status on every attempt.
    fail_offset: Option<(u64, u32)>,
    served: Mutex<Vec<u64>>,
    served_bytes: AtomicU64,
}

impl MemorySource {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            filename: Some("bundle.zip".to_string()),
            digest: None,
            delay: Duration::ZERO,
            fail_offset: None,
            served: Mutex::new(Vec::new()),
            served_bytes: AtomicU64::new(0),
        }
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_at(mut self, offset: u64, status: u32) -> Self {
        self.fail_offset = Some((offset, status));
        self
    }

    /// Offsets of every range served successfully, sorted.
    pub fn served_offsets(&self) -> Vec<u64> {
        let mut v = self.served.lock().unwrap().clone();
        v.sort_unstable();
        v
    }

    pub fn served_bytes(&self) -> u64 {
        self.served_bytes.load(Ordering::SeqCst)
    }
}

impl RangeSource for MemorySource {
    fn resolve(&self, handle: &str) -> Result<ResourceInfo, SourceError> {
        if handle.contains("missing") {
            return Err(SourceError::NotFound(handle.to_string()));
        }
        Ok(ResourceInfo {
            total_size: self.body.len() as u64,
            filename: self.filename.clone(),
            digest: self.digest.clone(),
        })
    }

    fn read_range(
        &self,
        _handle: &str,
        offset: u64,
        length: u64,
        on_data: &mut dyn FnMut(&[u8]) -> io::Result<()>,
    ) -> Result<(), SourceError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if let Some((bad, status)) = self.fail_offset {
            if bad == offset {
                return Err(SourceError::Http(status));
            }
        }
        let slice = &self.body[offset as usize..(offset + length) as usize];
        // Two writes, like a network source delivering the window in pieces.
        let (head, tail) = slice.split_at(slice.len() / 2);
        on_data(head).map_err(SourceError::Sink)?;
        on_data(tail).map_err(SourceError::Sink)?;
        self.served.lock().unwrap().push(offset);
        self.served_bytes.fetch_add(length, Ordering::SeqCst);
        Ok(())
    }
}

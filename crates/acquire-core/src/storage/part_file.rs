//! Positional writer for the `.part` file of an in-progress download.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Handle to a part file. Cheap to clone and safe to share between workers:
/// each `write_at` is an independent positional write, and workers only ever
/// write disjoint ranges, so no lock guards the write path.
#[derive(Clone)]
pub struct PartFile {
    file: Arc<File>,
}

impl PartFile {
    /// Create (or truncate) the part file and reserve `size` bytes.
    pub fn create_preallocated(path: &Path, size: u64) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to create part file: {}", path.display()))?;
        preallocate(&file, size)?;
        Ok(Self {
            file: Arc::new(file),
        })
    }

    /// Open an existing part file for resume (no truncation). If the file is
    /// shorter than `size` it is extended so writes near the end stay in bounds.
    pub fn open_existing(path: &Path, size: u64) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("failed to open part file: {}", path.display()))?;
        let len = file.metadata()?.len();
        if len < size {
            file.set_len(size).context("failed to extend part file")?;
        }
        Ok(Self {
            file: Arc::new(file),
        })
    }

    /// Write `data` at `offset`. Does not move any shared cursor.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    /// Fallback for non-Unix targets: seek + write on a cloned handle.
    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = (*self.file).try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
    }

    /// Flush file data to disk.
    pub fn sync(&self) -> std::io::Result<()> {
        self.file.sync_data()
    }
}

/// Reserve `size` bytes. On Unix tries `posix_fallocate` for real block
/// allocation; falls back to `set_len` (sparse) on failure or non-Unix.
fn preallocate(file: &File, size: u64) -> Result<()> {
    if size == 0 {
        return Ok(());
    }
    #[cfg(unix)]
    {
        let r = unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, size as libc::off_t) };
        if r == 0 {
            return Ok(());
        }
        tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
    }
    file.set_len(size).context("failed to preallocate part file")
}

/// Atomically rename a finished part file to its final path.
pub fn finalize(part_path: &Path, final_path: &Path) -> Result<()> {
    std::fs::rename(part_path, final_path).with_context(|| {
        format!(
            "failed to rename {} to {}",
            part_path.display(),
            final_path.display()
        )
    })
}

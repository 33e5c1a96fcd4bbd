//! Archive staging: extracts a verified ZIP archive entry by entry.
//!
//! Extraction is resumable. Each file entry is streamed to `<name>.part` and
//! renamed into place, then recorded in a manifest in the destination
//! directory. A later run skips entries whose manifest record and on-disk
//! size still match. A bad entry fails on its own; the run carries on and
//! the caller decides from the aggregate result.
//!
//! The manifest also marks the destination as owned by the stager: a
//! non-empty directory without one is refused, and `remove_staged` only
//! deletes what the manifest lists.

mod manifest;

pub use manifest::MANIFEST_FILE;

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Component, Path, PathBuf};

use zip::result::ZipError;
use zip::ZipArchive;

use crate::job::StagingProgress;
use crate::storage::temp_path;
use manifest::{EntryRecord, Manifest};

#[derive(Debug, Clone, Copy)]
pub struct StagingOptions {
    /// Copy buffer size.
    pub buffer_size: usize,
    /// Extra attempts for an entry that failed.
    pub entry_retries: u32,
}

impl Default for StagingOptions {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024,
            entry_retries: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Extracted,
    /// Already materialized by an earlier run.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEntry {
    pub name: String,
    pub size: u64,
    pub outcome: EntryOutcome,
}

/// Per-entry outcome of one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingResult {
    pub entries: Vec<StagedEntry>,
}

impl StagingResult {
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn failed(&self) -> impl Iterator<Item = &StagedEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, EntryOutcome::Failed(_)))
    }

    pub fn count(&self, pred: impl Fn(&EntryOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }
}

/// Errors that stop the whole run. Per-entry problems are not errors here;
/// they end up as `EntryOutcome::Failed`.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("open archive {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("read archive directory: {0}")]
    Archive(#[from] ZipError),
    #[error("prepare {path}: {source}")]
    Destination { path: PathBuf, source: io::Error },
    #[error("{path} is not empty and holds no staging manifest")]
    Occupied { path: PathBuf },
    #[error("extraction aborted")]
    Aborted,
}

#[derive(Debug, thiserror::Error)]
enum EntryError {
    #[error("unsafe entry path {0:?}")]
    UnsafePath(String),
    #[error("entry is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error(transparent)]
    Zip(#[from] ZipError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("aborted")]
    Aborted,
}

impl EntryError {
    fn is_retryable(&self) -> bool {
        !matches!(self, EntryError::UnsafePath(_) | EntryError::Aborted)
    }
}

/// Extract `archive` into `dest`.
///
/// `cancelled` is polled before each entry and between copy buffers; when it
/// fires the run stops with `StagingError::Aborted` and everything finished
/// so far stays recorded for the next run. `progress` is called after every
/// entry.
pub fn extract(
    archive: &Path,
    dest: &Path,
    opts: &StagingOptions,
    cancelled: &dyn Fn() -> bool,
    progress: &mut dyn FnMut(StagingProgress),
) -> Result<StagingResult, StagingError> {
    let file = File::open(archive).map_err(|source| StagingError::Open {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut zip = ZipArchive::new(BufReader::new(file))?;
    let destination = |source: io::Error| StagingError::Destination {
        path: dest.to_path_buf(),
        source,
    };
    if !Manifest::exists_in(dest) && !is_empty_or_missing(dest).map_err(destination)? {
        return Err(StagingError::Occupied {
            path: dest.to_path_buf(),
        });
    }
    fs::create_dir_all(dest).map_err(destination)?;

    let mut manifest = Manifest::open(dest).map_err(destination)?;
    let total = zip.len() as u64;
    let mut buf = vec![0u8; opts.buffer_size.max(1)];
    let mut result = StagingResult::default();
    progress(StagingProgress {
        entries_done: 0,
        entries_total: total,
    });

    for index in 0..zip.len() {
        if cancelled() {
            return Err(StagingError::Aborted);
        }

        let mut attempt = 0;
        let entry = loop {
            match stage_entry(&mut zip, index, dest, &mut manifest, &mut buf, cancelled) {
                Ok(entry) => break entry,
                Err((_, EntryError::Aborted)) => return Err(StagingError::Aborted),
                Err((name, e)) if e.is_retryable() && attempt < opts.entry_retries => {
                    attempt += 1;
                    tracing::warn!("entry {name}: {e}; retrying ({attempt}/{})", opts.entry_retries);
                }
                Err((name, e)) => {
                    tracing::warn!("entry {name} failed: {e}");
                    let size = zip.by_index_raw(index).map(|f| f.size()).unwrap_or(0);
                    break StagedEntry {
                        name,
                        size,
                        outcome: EntryOutcome::Failed(e.to_string()),
                    };
                }
            }
        };
        result.entries.push(entry);
        progress(StagingProgress {
            entries_done: index as u64 + 1,
            entries_total: total,
        });
    }

    tracing::info!(
        "staged {} into {}: {} extracted, {} skipped, {} failed",
        archive.display(),
        dest.display(),
        result.count(|o| *o == EntryOutcome::Extracted),
        result.count(|o| *o == EntryOutcome::Skipped),
        result.failed().count(),
    );
    Ok(result)
}

/// Entry name (or `#index` when its record is unreadable) with the error.
type NamedError = (String, EntryError);

fn stage_entry<R: Read + io::Seek>(
    zip: &mut ZipArchive<R>,
    index: usize,
    dest: &Path,
    manifest: &mut Manifest,
    buf: &mut [u8],
    cancelled: &dyn Fn() -> bool,
) -> Result<StagedEntry, NamedError> {
    let mut entry = zip
        .by_index(index)
        .map_err(|e| (format!("#{index}"), EntryError::from(e)))?;
    let name = entry.name().to_string();
    let fail = |e: EntryError| (name.clone(), e);

    let rel = entry
        .enclosed_name()
        .ok_or_else(|| fail(EntryError::UnsafePath(name.clone())))?;
    let target = dest.join(rel);
    let size = entry.size();

    if entry.is_dir() {
        let existed = target.is_dir();
        fs::create_dir_all(&target).map_err(|e| fail(e.into()))?;
        if manifest.get(&name).is_none() {
            let rec = EntryRecord { size: 0, crc32: 0 };
            manifest.record(&name, rec).map_err(|e| fail(e.into()))?;
        }
        return Ok(StagedEntry {
            name,
            size: 0,
            outcome: if existed {
                EntryOutcome::Skipped
            } else {
                EntryOutcome::Extracted
            },
        });
    }

    let record = EntryRecord {
        size,
        crc32: entry.crc32(),
    };
    let on_disk = fs::metadata(&target).ok().map(|m| m.len());
    if manifest.get(&name) == Some(record) && on_disk == Some(size) {
        return Ok(StagedEntry {
            name,
            size,
            outcome: EntryOutcome::Skipped,
        });
    }
    manifest.forget(&name);

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| fail(e.into()))?;
    }
    let part = temp_path(&target);
    let copied = copy_entry(&mut entry, &part, buf, cancelled);
    let written = match copied {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&part);
            return Err(fail(e));
        }
    };
    if written != size {
        let _ = fs::remove_file(&part);
        return Err(fail(EntryError::SizeMismatch {
            expected: size,
            actual: written,
        }));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = entry.unix_mode() {
            // Owner must be able to overwrite the file on a later run.
            let perms = fs::Permissions::from_mode((mode & 0o7777) | 0o600);
            fs::set_permissions(&part, perms).map_err(|e| fail(e.into()))?;
        }
    }

    fs::rename(&part, &target).map_err(|e| fail(e.into()))?;
    manifest.record(&name, record).map_err(|e| fail(e.into()))?;

    Ok(StagedEntry {
        name,
        size,
        outcome: EntryOutcome::Extracted,
    })
}

/// Stream one entry to `part`. The zip reader checks the CRC at end of entry,
/// so a corrupted payload surfaces here as an I/O error.
fn copy_entry(
    entry: &mut impl Read,
    part: &Path,
    buf: &mut [u8],
    cancelled: &dyn Fn() -> bool,
) -> Result<u64, EntryError> {
    let mut out = File::create(part)?;
    let mut written = 0u64;
    loop {
        if cancelled() {
            return Err(EntryError::Aborted);
        }
        let n = entry.read(buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        written += n as u64;
    }
    out.sync_all()?;
    Ok(written)
}

fn is_empty_or_missing(dir: &Path) -> io::Result<bool> {
    match fs::read_dir(dir) {
        Ok(mut it) => Ok(it.next().is_none()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e),
    }
}

/// Delete what an extraction into `dest` produced: the files its manifest
/// lists, directories left empty by that, and the manifest itself. Anything
/// else in `dest` stays. Returns false when `dest` holds no manifest, in
/// which case nothing is touched.
pub fn remove_staged(dest: &Path) -> io::Result<bool> {
    let names = match manifest::recorded_names(dest) {
        Ok(names) => names,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let mut dirs = BTreeSet::new();
    for name in &names {
        let Some(rel) = relative_path(name) else {
            tracing::warn!("not removing unsafe manifest entry {name:?}");
            continue;
        };
        let target = dest.join(&rel);
        if target.is_dir() {
            dirs.insert(target);
        } else {
            match fs::remove_file(&target) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            let _ = fs::remove_file(temp_path(&target));
        }
        dirs.extend(
            rel.ancestors()
                .skip(1)
                .filter(|a| !a.as_os_str().is_empty())
                .map(|a| dest.join(a)),
        );
    }
    fs::remove_file(Manifest::path_in(dest))?;

    // Deepest first; a directory that still holds anything is kept.
    let mut dirs: Vec<PathBuf> = dirs.into_iter().collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in dirs.iter().map(PathBuf::as_path).chain([dest]) {
        let _ = fs::remove_dir(dir);
    }
    Ok(true)
}

/// Entry name as a path confined to the destination.
fn relative_path(name: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for c in Path::new(name).components() {
        match c {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

//! Record of entries a previous extraction run fully materialized.
//!
//! The manifest is a JSON-lines log: one line is appended per finished entry,
//! and later lines win. Opening compacts the log to one line per live entry.
//! A torn trailing line from a crash is dropped; that entry is extracted again.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = ".acquire-staging.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub size: u64,
    pub crc32: u32,
}

#[derive(Serialize, Deserialize)]
struct Line<'a> {
    name: std::borrow::Cow<'a, str>,
    size: u64,
    crc32: u32,
}

pub struct Manifest {
    entries: BTreeMap<String, EntryRecord>,
    log: File,
}

impl Manifest {
    pub fn path_in(dest: &Path) -> PathBuf {
        dest.join(MANIFEST_FILE)
    }

    pub fn exists_in(dest: &Path) -> bool {
        Self::path_in(dest).is_file()
    }

    /// Replay the log in `dest`, compact it, and keep it open for appends.
    /// Creates an empty manifest when none exists.
    pub fn open(dest: &Path) -> io::Result<Self> {
        let path = Self::path_in(dest);
        let entries = match fs::read_to_string(&path) {
            Ok(data) => replay(&path, &data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!("cannot read {}: {e}; extracting everything", path.display());
                BTreeMap::new()
            }
        };

        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for (name, rec) in &entries {
                write_line(&mut out, name, *rec)?;
            }
            out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        let log = File::options().append(true).open(&path)?;
        Ok(Self { entries, log })
    }

    pub fn get(&self, name: &str) -> Option<EntryRecord> {
        self.entries.get(name).copied()
    }

    /// Append one finished entry to the log.
    pub fn record(&mut self, name: &str, rec: EntryRecord) -> io::Result<()> {
        let mut line = Vec::with_capacity(name.len() + 48);
        write_line(&mut line, name, rec)?;
        self.log.write_all(&line)?;
        self.entries.insert(name.to_string(), rec);
        Ok(())
    }

    /// Drop a record in memory. A stale line left in the log only matches an
    /// entry with the same size and CRC, so it is never written back out.
    pub fn forget(&mut self, name: &str) {
        self.entries.remove(name);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn write_line(out: &mut impl Write, name: &str, rec: EntryRecord) -> io::Result<()> {
    let line = Line {
        name: name.into(),
        size: rec.size,
        crc32: rec.crc32,
    };
    serde_json::to_writer(&mut *out, &line).map_err(io::Error::other)?;
    out.write_all(b"\n")
}

fn replay(path: &Path, data: &str) -> BTreeMap<String, EntryRecord> {
    let mut entries = BTreeMap::new();
    for (n, raw) in data.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Line<'_>>(raw) {
            Ok(line) => {
                entries.insert(
                    line.name.into_owned(),
                    EntryRecord {
                        size: line.size,
                        crc32: line.crc32,
                    },
                );
            }
            Err(e) => tracing::warn!("{} line {}: {e}; skipped", path.display(), n + 1),
        }
    }
    entries
}

/// Names recorded in the manifest under `dest`, without compacting it.
pub fn recorded_names(dest: &Path) -> io::Result<Vec<String>> {
    let path = Manifest::path_in(dest);
    let data = fs::read_to_string(&path)?;
    Ok(replay(&path, &data).into_keys().collect())
}

//! Disk I/O and file lifecycle for downloads.
//!
//! Preallocates `.part` files (fallocate on Linux when available, else set_len),
//! supports concurrent offset writes (pwrite), and atomic finalize (rename
//! from `.part` to the final name once the content has been verified).

mod part_file;

pub use part_file::{finalize, PartFile};

use std::path::{Path, PathBuf};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the part file: appends `.part` to the final path (e.g. `game.zip` → `game.zip.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

//! Local naming for downloaded archives.
//!
//! The archive name comes from the server's `Content-Disposition` when it
//! sends one, else from the last segment of the source URL path. Either way
//! the result is made safe to use as a single path component.

mod disposition;
mod sanitize;

pub use disposition::disposition_filename;
pub use sanitize::sanitize_component;

use crate::resolver;

/// Used when neither the header nor the URL yields a usable name.
pub const FALLBACK_FILENAME: &str = "download.bin";

fn last_path_segment(handle: &str) -> Option<String> {
    // Drive links end in "view" or "edit"; that is not a file name.
    if resolver::drive_file_id(handle).is_some() {
        return None;
    }
    let parsed = url::Url::parse(handle).ok()?;
    let segment = parsed.path_segments()?.rev().find(|s| !s.is_empty())?;
    let decoded = disposition::percent_decode(segment);
    Some(decoded)
}

/// Derives the archive filename for `handle`.
pub fn derive_filename(handle: &str, content_disposition: Option<&str>) -> String {
    content_disposition
        .and_then(disposition_filename)
        .or_else(|| last_path_segment(handle))
        .map(|raw| sanitize_component(&raw))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}

/// Directory name an archive is extracted into: the filename minus its last
/// extension (`game.zip` -> `game`). Names without a usable stem get a suffix
/// so the directory never collides with the archive itself.
pub fn staging_dir_name(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => format!("{filename}.d"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_from_url_path() {
        assert_eq!(
            derive_filename("https://cdn.example.com/games/TheSims4.zip", None),
            "TheSims4.zip"
        );
        assert_eq!(
            derive_filename("https://example.com/a%20b.zip?sig=1", None),
            "a_b.zip"
        );
    }

    #[test]
    fn header_beats_url() {
        assert_eq!(
            derive_filename(
                "https://example.com/download",
                Some("attachment; filename=\"bundle.zip\"")
            ),
            "bundle.zip"
        );
    }

    #[test]
    fn drive_links_need_the_header() {
        let link = "https://drive.google.com/file/d/1ABC123DEF456/view";
        assert_eq!(derive_filename(link, None), FALLBACK_FILENAME);
        assert_eq!(
            derive_filename(link, Some("attachment; filename=\"sims.zip\"")),
            "sims.zip"
        );
    }

    #[test]
    fn unusable_names_fall_back() {
        assert_eq!(derive_filename("https://example.com/", None), FALLBACK_FILENAME);
        assert_eq!(derive_filename("https://example.com/..", None), FALLBACK_FILENAME);
        assert_eq!(derive_filename("mem-handle", None), FALLBACK_FILENAME);
    }

    #[test]
    fn staging_dir_strips_last_extension() {
        assert_eq!(staging_dir_name("game.zip"), "game");
        assert_eq!(staging_dir_name("data.tar.zip"), "data.tar");
        assert_eq!(staging_dir_name("archive"), "archive.d");
    }
}

//! Turns user-supplied source handles into URLs the range source can fetch.
//!
//! Share links from hosting services point at a viewer page, not at the bytes.
//! A `Resolver` recognizes one family of such links and rewrites it; anything
//! no resolver claims is fetched verbatim.

/// A rewrite step from a share link to a direct download URL.
pub trait Resolver: Send + Sync {
    /// Returns the direct URL, or `None` when the handle is not one of ours.
    fn resolve(&self, handle: &str) -> Option<String>;
}

/// Google Drive share links (`/file/d/<id>/view`, `open?id=<id>`, `/d/<id>`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DriveLinkResolver;

const DRIVE_HOSTS: &[&str] = &["drive.google.com", "docs.google.com"];

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Extracts the file id from a Drive link, if the handle is one.
pub fn drive_file_id(handle: &str) -> Option<String> {
    let parsed = url::Url::parse(handle).ok()?;
    let host = parsed.host_str()?;
    if !DRIVE_HOSTS.contains(&host) {
        return None;
    }

    if let Some((_, id)) = parsed.query_pairs().find(|(k, _)| k == "id") {
        if !id.is_empty() && id.chars().all(is_id_char) {
            return Some(id.into_owned());
        }
    }

    let segments: Vec<&str> = parsed.path_segments()?.collect();
    segments
        .windows(2)
        .find(|w| w[0] == "d" && !w[1].is_empty() && w[1].chars().all(is_id_char))
        .map(|w| w[1].to_string())
}

impl Resolver for DriveLinkResolver {
    fn resolve(&self, handle: &str) -> Option<String> {
        drive_file_id(handle)
            .map(|id| format!("https://drive.google.com/uc?export=download&id={id}&confirm=t"))
    }
}

/// Runs the built-in resolvers; falls back to the handle itself.
pub fn direct_url(handle: &str) -> String {
    let builtin: [&dyn Resolver; 1] = [&DriveLinkResolver];
    builtin
        .iter()
        .find_map(|r| r.resolve(handle))
        .unwrap_or_else(|| handle.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIRECT: &str = "https://drive.google.com/uc?export=download&id=1ABC123DEF456&confirm=t";

    #[test]
    fn drive_view_link_is_rewritten() {
        assert_eq!(
            direct_url("https://drive.google.com/file/d/1ABC123DEF456/view?usp=sharing"),
            DIRECT
        );
    }

    #[test]
    fn drive_open_and_short_links() {
        assert_eq!(direct_url("https://drive.google.com/open?id=1ABC123DEF456"), DIRECT);
        assert_eq!(direct_url("https://docs.google.com/d/1ABC123DEF456/edit"), DIRECT);
    }

    #[test]
    fn already_direct_drive_link_is_stable() {
        assert_eq!(direct_url(DIRECT), DIRECT);
    }

    #[test]
    fn other_handles_pass_through() {
        assert_eq!(
            direct_url("https://cdn.example.com/file/d/x/archive.zip"),
            "https://cdn.example.com/file/d/x/archive.zip"
        );
        assert_eq!(direct_url("not a url"), "not a url");
        assert_eq!(drive_file_id("https://drive.google.com/drive/my-drive"), None);
    }
}

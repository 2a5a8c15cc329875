//! Which installation the persisted environment fragment points at.

use crate::models::InstalledVersion;
use crate::probe::FsProbe;
use std::path::Path;
use tracing::debug;

/// The first installation, in inventory order, referenced by the fragment.
///
/// A missing or unreadable fragment means nothing is active.
pub fn resolve_active<'a>(
    probe: &dyn FsProbe,
    fragment_path: &Path,
    versions: &'a [InstalledVersion],
) -> Option<&'a InstalledVersion> {
    let Some(content) = probe.read_text(fragment_path) else {
        debug!("No active version: cannot read {}", fragment_path.display());
        return None;
    };

    versions
        .iter()
        .find(|v| references_root(&content, &v.install_root))
}

/// Whether `content` mentions `root` as a whole path.
///
/// The match must start at a value boundary and end at a value boundary or
/// at the root's own `bin` directory, so `/x/node/v18` does not match
/// `/x/node/v18.1` or `/x/node/v18/installation`.
pub fn references_root(content: &str, root: &Path) -> bool {
    let root = root.to_string_lossy();
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        return false;
    }

    let mut search_from = 0;
    while let Some(offset) = content[search_from..].find(root) {
        let start = search_from + offset;
        let end = start + root.len();

        let before_ok = content[..start]
            .chars()
            .next_back()
            .map_or(true, is_value_delimiter);
        let rest = &content[end..];
        let after_ok = ends_value(rest)
            || rest
                .strip_prefix("/bin")
                .is_some_and(|tail| ends_value(tail) || tail.starts_with('/'));

        if before_ok && after_ok {
            return true;
        }
        search_from = start + 1;
        while !content.is_char_boundary(search_from) {
            search_from += 1;
        }
    }

    false
}

fn ends_value(rest: &str) -> bool {
    rest.chars().next().map_or(true, is_value_delimiter)
}

fn is_value_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '\'' | '=' | ':' | ';')
}

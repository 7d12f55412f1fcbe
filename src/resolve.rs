use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::paths::PathSet;
use crate::pointer::read_global;
use crate::util::{read_text, remove_file_if_exists, write_text};

pub const LOCAL_MARKER: &str = ".codexenv-local";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalOverride {
    pub name: String,
    /// The marker file the name came from.
    pub marker: PathBuf,
}

/// Where the effective environment name came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    Local(PathBuf),
    Global(PathBuf),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Effective {
    pub name: String,
    pub origin: Origin,
}

/// Nearest local marker at or above `start`.
///
/// Walks `start`, its parent, and so on up to the filesystem root; the first
/// marker with a non-blank first line wins and nothing further up is read.
pub fn resolve_local(start: &Path) -> Result<Option<LocalOverride>> {
    for dir in start.ancestors() {
        let marker = dir.join(LOCAL_MARKER);
        if !marker.is_file() {
            continue;
        }

        let text = match read_text(&marker) {
            Ok(t) => t,
            Err(Error::Io { source, .. }) if source.kind() == std::io::ErrorKind::InvalidData => {
                warn!(marker = %marker.display(), "ignoring unreadable local marker");
                None
            }
            Err(e) => return Err(e),
        };
        match text.as_deref().and_then(first_line) {
            Some(name) => {
                debug!(marker = %marker.display(), env = name, "found local marker");
                return Ok(Some(LocalOverride {
                    name: name.to_string(),
                    marker,
                }));
            }
            None => debug!(marker = %marker.display(), "blank local marker, continuing upward"),
        }
    }
    Ok(None)
}

/// Write a marker naming `name` into `dir`, returning the marker path.
pub fn write_local(dir: &Path, name: &str) -> Result<PathBuf> {
    let marker = dir.join(LOCAL_MARKER);
    write_text(&marker, &format!("{name}\n"))?;
    Ok(marker)
}

/// Remove the marker in `dir` (not in its ancestors). Returns whether one existed.
pub fn remove_local(dir: &Path) -> Result<bool> {
    remove_file_if_exists(&dir.join(LOCAL_MARKER))
}

/// Environment in effect for the working directory: local marker first,
/// then the global pointer.
///
/// The named environment is not checked for existence here; activation
/// reports a missing one.
pub fn effective(paths: &PathSet) -> Result<Option<Effective>> {
    if let Some(local) = resolve_local(paths.cwd())? {
        return Ok(Some(Effective {
            name: local.name,
            origin: Origin::Local(local.marker),
        }));
    }

    Ok(read_global(paths)?.map(|name| Effective {
        name,
        origin: Origin::Global(paths.global_file()),
    }))
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().next().map(str::trim).filter(|s| !s.is_empty())
}

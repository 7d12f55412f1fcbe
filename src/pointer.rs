use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::paths::PathSet;
use crate::util::{read_text, remove_file_if_exists, write_text};

/// Name stored in the global pointer file, if any.
///
/// Absent, blank or non-UTF-8 content all read as "no global default".
pub fn read_global(paths: &PathSet) -> Result<Option<String>> {
    let file = paths.global_file();
    let text = match read_text(&file) {
        Ok(t) => t,
        Err(Error::Io { source, .. }) if source.kind() == std::io::ErrorKind::InvalidData => {
            warn!(path = %file.display(), "ignoring unreadable global pointer");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let name = text
        .as_deref()
        .and_then(|t| t.lines().next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    debug!(path = %file.display(), global = ?name, "read global pointer");
    Ok(name)
}

pub fn write_global(paths: &PathSet, name: &str) -> Result<()> {
    let file = paths.global_file();
    write_text(&file, &format!("{name}\n"))?;
    info!(path = %file.display(), global = name, "wrote global pointer");
    Ok(())
}

/// Remove the pointer file. Returns whether one existed.
pub fn clear_global(paths: &PathSet) -> Result<bool> {
    let removed = remove_file_if_exists(&paths.global_file())?;
    if removed {
        info!("cleared global pointer");
    }
    Ok(removed)
}

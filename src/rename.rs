use std::fs;

use tracing::{debug, info};

use crate::activate::{self, Activation};
use crate::error::{Error, Result};
use crate::paths::PathSet;
use crate::pointer::{read_global, write_global};
use crate::store;

/// What a rename touched besides the environment directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Renamed {
    pub global_updated: bool,
    /// Set when the active link pointed at the old name and was repointed.
    pub relinked: Option<Activation>,
}

/// Rename environment `old` to `new`, carrying the global pointer and the
/// active link along when they referenced `old`.
///
/// Both names are checked before anything is mutated. Only the directory
/// rename can abort the operation; a crash after it can leave the pointer or
/// link naming `old`.
pub fn rename(paths: &PathSet, old: &str, new: &str) -> Result<Renamed> {
    store::validate_name(old)?;
    store::validate_name(new)?;
    let src = store::require(paths, old)?;
    let dst = paths.env_path(new);
    if fs::symlink_metadata(&dst).is_ok() {
        return Err(Error::DestinationExists {
            name: new.to_string(),
            path: dst,
        });
    }

    let was_global = read_global(paths)?.as_deref() == Some(old);
    let was_active = activate::symlink_points_to(paths.codex_home(), &src);
    debug!(old, new, was_global, was_active, "renaming environment");

    fs::rename(&src, &dst).map_err(|e| Error::io("rename", &src, e))?;
    info!(old, new, "renamed environment");

    if was_global {
        write_global(paths, new)?;
    }
    let relinked = if was_active {
        Some(activate::activate(paths, new)?)
    } else {
        None
    };

    Ok(Renamed {
        global_updated: was_global,
        relinked,
    })
}

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::paths::PathSet;
use crate::store;

/// What currently sits at the active-link location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkState {
    Missing,
    RealDirectory,
    /// A regular file or anything else that is neither a directory nor a symlink.
    OtherEntry,
    /// A symlink, with its target exactly as stored in the link.
    Symlink(PathBuf),
}

/// Successful activation. Failures are reported through [`Error`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Activation {
    /// The link already pointed at the environment.
    Unchanged,
    /// Nothing was at the link location; a new link was made.
    Created,
    /// A stale link was swapped for one pointing at the environment.
    Replaced { previous: PathBuf },
}

impl Activation {
    pub fn changed(&self) -> bool {
        !matches!(self, Activation::Unchanged)
    }
}

pub fn inspect(link: &Path) -> Result<LinkState> {
    let meta = match fs::symlink_metadata(link) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LinkState::Missing),
        Err(e) => return Err(Error::io("stat", link, e)),
    };

    if meta.file_type().is_symlink() {
        let target = fs::read_link(link).map_err(|e| Error::io("read link", link, e))?;
        Ok(LinkState::Symlink(target))
    } else if meta.is_dir() {
        Ok(LinkState::RealDirectory)
    } else {
        Ok(LinkState::OtherEntry)
    }
}

/// True when `link` is a symlink that resolves to `target`.
pub fn symlink_points_to(link: &Path, target: &Path) -> bool {
    match fs::read_link(link) {
        Ok(raw) => same_target(link, &raw, target),
        Err(_) => false,
    }
}

/// Name of the managed environment the active link points at, if it points at one.
pub fn active_env(paths: &PathSet) -> Result<Option<String>> {
    let LinkState::Symlink(raw) = inspect(paths.codex_home())? else {
        return Ok(None);
    };
    let resolved = resolve_link_target(paths.codex_home(), &raw);
    let (Some(parent), Some(name)) = (resolved.parent(), resolved.file_name()) else {
        return Ok(None);
    };
    if !same_path(parent, &paths.envs_dir()) {
        return Ok(None);
    }

    let name = name.to_string_lossy().into_owned();
    Ok(store::exists(paths, &name).then_some(name))
}

/// Point the active link at environment `name`.
///
/// Never creates the environment and never replaces anything that is not a
/// symlink.
pub fn activate(paths: &PathSet, name: &str) -> Result<Activation> {
    let target = store::require(paths, name)?;
    let link = paths.codex_home();

    let state = inspect(link)?;
    debug!(link = %link.display(), ?state, "active link state");

    match state {
        LinkState::Missing => {
            if let Some(parent) = link.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io("create dir", parent, e))?;
            }
            make_symlink(&target, link)?;
            info!(link = %link.display(), target = %target.display(), "created active link");
            Ok(Activation::Created)
        }
        LinkState::RealDirectory => Err(Error::ConflictingRealDirectory {
            path: link.to_path_buf(),
        }),
        LinkState::OtherEntry => Err(Error::ConflictingEntry {
            path: link.to_path_buf(),
        }),
        LinkState::Symlink(raw) if same_target(link, &raw, &target) => Ok(Activation::Unchanged),
        LinkState::Symlink(raw) => {
            remove_symlink(link)?;
            make_symlink(&target, link)?;
            info!(
                link = %link.display(),
                previous = %raw.display(),
                target = %target.display(),
                "replaced active link"
            );
            Ok(Activation::Replaced { previous: raw })
        }
    }
}

/// Remove the active link if it is a symlink. Real directories are refused.
pub fn deactivate(paths: &PathSet) -> Result<bool> {
    let link = paths.codex_home();
    match inspect(link)? {
        LinkState::Missing => Ok(false),
        LinkState::Symlink(_) => {
            remove_symlink(link)?;
            info!(link = %link.display(), "removed active link");
            Ok(true)
        }
        LinkState::RealDirectory => Err(Error::ConflictingRealDirectory {
            path: link.to_path_buf(),
        }),
        LinkState::OtherEntry => Err(Error::ConflictingEntry {
            path: link.to_path_buf(),
        }),
    }
}

fn resolve_link_target(link: &Path, raw: &Path) -> PathBuf {
    if raw.is_absolute() {
        return raw.to_path_buf();
    }
    match link.parent() {
        Some(parent) => parent.join(raw),
        None => raw.to_path_buf(),
    }
}

fn same_target(link: &Path, raw: &Path, target: &Path) -> bool {
    same_path(&resolve_link_target(link, raw), target)
}

fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| Error::io("symlink", link, e))
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::windows::fs::symlink_dir(target, link).map_err(|e| Error::io("symlink", link, e))
}

#[cfg(unix)]
fn remove_symlink(link: &Path) -> Result<()> {
    fs::remove_file(link).map_err(|e| Error::io("remove link", link, e))
}

#[cfg(windows)]
fn remove_symlink(link: &Path) -> Result<()> {
    // Directory symlinks on Windows are removed like directories.
    fs::remove_dir(link)
        .or_else(|_| fs::remove_file(link))
        .map_err(|e| Error::io("remove link", link, e))
}

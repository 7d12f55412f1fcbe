use std::fs;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::paths::PathSet;

static ENV_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._+@-]*$").expect("env name regex must compile")
});

/// Reject names that are not a single, visible path segment.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.contains(['/', '\\']) {
        "name must not contain path separators"
    } else if name.starts_with('.') {
        "name must not start with '.'"
    } else if !ENV_NAME.is_match(name) {
        "use letters, digits and . _ + @ - (starting with a letter or digit)"
    } else {
        return Ok(());
    };
    Err(Error::InvalidName {
        name: name.to_string(),
        reason,
    })
}

/// Environment names in lexicographic order. A missing `envs/` directory is empty.
pub fn list(paths: &PathSet) -> Result<Vec<String>> {
    let envs_dir = paths.envs_dir();
    let rd = match fs::read_dir(&envs_dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io("read dir", &envs_dir, e)),
    };

    let mut names = Vec::new();
    for entry in rd {
        let entry = entry.map_err(|e| Error::io("read dir", &envs_dir, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => debug!(name = ?raw, "skipping non-UTF-8 environment name"),
        }
    }
    names.sort();
    Ok(names)
}

pub fn exists(paths: &PathSet, name: &str) -> bool {
    validate_name(name).is_ok() && paths.env_path(name).is_dir()
}

/// Directory of `name`, failing with `EnvironmentNotFound` when it is absent.
///
/// The name is validated first, so nothing outside `envs/` is ever returned.
pub fn require(paths: &PathSet, name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    let dir = paths.env_path(name);
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(Error::EnvironmentNotFound {
            name: name.to_string(),
            path: dir,
        })
    }
}

pub fn create(paths: &PathSet, name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    paths.ensure_dirs()?;

    let dir = paths.env_path(name);
    match fs::create_dir(&dir) {
        Ok(()) => {
            info!(env = name, path = %dir.display(), "created environment");
            Ok(dir)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(Error::AlreadyExists {
            name: name.to_string(),
            path: dir,
        }),
        Err(e) => Err(Error::io("create dir", &dir, e)),
    }
}

/// Remove the environment directory and everything in it.
///
/// Callers decide whether the environment is still referenced; this only
/// touches `envs/<name>`.
pub fn delete(paths: &PathSet, name: &str) -> Result<()> {
    let dir = require(paths, name)?;
    fs::remove_dir_all(&dir).map_err(|e| Error::io("remove dir", &dir, e))?;
    info!(env = name, path = %dir.display(), "deleted environment");
    Ok(())
}

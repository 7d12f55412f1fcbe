use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::error::{Error, Result};
use crate::util::getenv;

pub const ROOT_ENV_VAR: &str = "CODEXENV_ROOT";
pub const CODEX_HOME_ENV_VAR: &str = "CODEXENV_CODEX_HOME";

const DEFAULT_ROOT: &str = "~/.codexenv";
const DEFAULT_CODEX_HOME: &str = "~/.codex";

const ENVS_DIR: &str = "envs";
const GLOBAL_FILE: &str = "global";

/// Every filesystem location codexenv reads or writes.
///
/// Operations take a `PathSet` explicitly instead of consulting the process
/// environment, so a test can point one at a scratch directory.
#[derive(Clone, Debug)]
pub struct PathSet {
    root: PathBuf,
    codex_home: PathBuf,
    cwd: PathBuf,
}

impl PathSet {
    pub fn new(root: PathBuf, codex_home: PathBuf, cwd: PathBuf) -> Self {
        Self {
            root,
            codex_home,
            cwd,
        }
    }

    /// Resolve from CLI overrides, then `CODEXENV_ROOT` / `CODEXENV_CODEX_HOME`,
    /// then the defaults under the home directory.
    pub fn resolve(
        root_override: Option<&str>,
        codex_home_override: Option<&str>,
    ) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().context("resolve current directory")?;
        let home = dirs::home_dir();

        let root_raw = pick(root_override, ROOT_ENV_VAR, DEFAULT_ROOT);
        let codex_home_raw = pick(codex_home_override, CODEX_HOME_ENV_VAR, DEFAULT_CODEX_HOME);
        let root = expand_in(&root_raw, &cwd, home.as_deref())?;
        let codex_home = expand_in(&codex_home_raw, &cwd, home.as_deref())?;
        debug!(
            root = %root.display(),
            codex_home = %codex_home.display(),
            cwd = %cwd.display(),
            "resolved paths"
        );

        Ok(Self::new(root, codex_home, cwd))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn envs_dir(&self) -> PathBuf {
        self.root.join(ENVS_DIR)
    }

    /// Directory of environment `name`. Does not check that it exists.
    pub fn env_path(&self, name: &str) -> PathBuf {
        self.envs_dir().join(name)
    }

    pub fn global_file(&self) -> PathBuf {
        self.root.join(GLOBAL_FILE)
    }

    /// Where the active link lives (the wrapped tool's config home).
    pub fn codex_home(&self) -> &Path {
        &self.codex_home
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Create the root and `envs/` directories if they are missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        let envs = self.envs_dir();
        fs::create_dir_all(&envs).map_err(|e| Error::io("create dir", &envs, e))
    }
}

fn pick(override_value: Option<&str>, var: &str, default: &str) -> String {
    match override_value {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ => getenv(var, default),
    }
}

/// Expand a leading `~` and `$VAR` / `${VAR}` references against the real
/// process environment, then make the result absolute. The path need not exist.
pub fn expand(raw: &str) -> anyhow::Result<PathBuf> {
    let cwd = std::env::current_dir().context("resolve current directory")?;
    expand_in(raw, &cwd, dirs::home_dir().as_deref())
}

/// Expand against the process environment, failing when a leading `~`
/// needs a home directory that could not be found.
fn expand_in(raw: &str, cwd: &Path, home: Option<&Path>) -> anyhow::Result<PathBuf> {
    if raw.starts_with('~') && home.is_none() {
        anyhow::bail!("resolve home dir (needed to expand {raw})");
    }
    Ok(expand_with(raw, cwd, home, |var| std::env::var(var).ok()))
}

/// Like [`expand`], with the home directory, variable lookup and base
/// directory supplied by the caller. Unknown variables are left verbatim.
pub fn expand_with<F>(raw: &str, cwd: &Path, home: Option<&Path>, lookup: F) -> PathBuf
where
    F: FnMut(&str) -> Option<String>,
{
    let expanded = shellexpand::full_with_context_no_errors(
        raw,
        || home.map(|h| h.to_string_lossy().into_owned()),
        lookup,
    );
    let p = PathBuf::from(expanded.as_ref());
    if p.is_absolute() { p } else { cwd.join(p) }
}

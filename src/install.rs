use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info};

use crate::error::InstallError;

pub const DEFAULT_NPM_BINARY: &str = "npm";
pub const DEFAULT_NPM_PACKAGE: &str = "@openai/codex";
pub const TOOL_BINARY: &str = "codex";

/// Locate `program` on `PATH`.
pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstallOutcome {
    AlreadyInstalled(PathBuf),
    Installed,
}

/// A global `npm install` of the wrapped tool.
#[derive(Clone, Debug)]
pub struct NpmInstall {
    pub npm_binary: String,
    pub package: String,
    /// Executable whose presence on `PATH` means the install can be skipped.
    pub tool: String,
}

impl Default for NpmInstall {
    fn default() -> Self {
        Self {
            npm_binary: DEFAULT_NPM_BINARY.to_string(),
            package: DEFAULT_NPM_PACKAGE.to_string(),
            tool: TOOL_BINARY.to_string(),
        }
    }
}

impl NpmInstall {
    pub fn new(npm_binary: Option<String>, package: Option<String>) -> Self {
        let d = Self::default();
        Self {
            npm_binary: npm_binary.unwrap_or(d.npm_binary),
            package: package.unwrap_or(d.package),
            tool: d.tool,
        }
    }

    /// Run `<npm> install -g <package>` with inherited stdio, unless the tool
    /// is already on `PATH` and `force` is off.
    pub fn run(&self, force: bool) -> Result<InstallOutcome, InstallError> {
        let existing = if force { None } else { which(&self.tool) };
        if let Some(existing) = existing {
            debug!(tool = %self.tool, path = %existing.display(), "already installed, skipping npm");
            return Ok(InstallOutcome::AlreadyInstalled(existing));
        }

        let mut cmd = Command::new(&self.npm_binary);
        cmd.args(["install", "-g", self.package.as_str()]);
        info!(npm = %self.npm_binary, package = %self.package, "running npm install");

        let status = cmd.status().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                InstallError::NotFound {
                    binary: self.npm_binary.clone(),
                }
            } else {
                InstallError::Spawn {
                    binary: self.npm_binary.clone(),
                    source: e,
                }
            }
        })?;

        if !status.success() {
            return Err(InstallError::Failed {
                binary: self.npm_binary.clone(),
                status: status.code(),
            });
        }
        Ok(InstallOutcome::Installed)
    }
}

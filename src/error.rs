use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the environment store, resolution and activation.
///
/// Each kind maps to a stable process exit status (see [`Error::exit_code`]),
/// so calling scripts can branch on the cause.
#[derive(Debug, Error)]
pub enum Error {
    #[error("environment '{name}' not found ({})", .path.display())]
    EnvironmentNotFound { name: String, path: PathBuf },

    #[error("environment '{name}' already exists ({})", .path.display())]
    AlreadyExists { name: String, path: PathBuf },

    #[error("cannot rename to '{name}': environment already exists ({})", .path.display())]
    DestinationExists { name: String, path: PathBuf },

    #[error(
        "{} is a real directory; move it aside (or into an environment) before linking",
        .path.display()
    )]
    ConflictingRealDirectory { path: PathBuf },

    #[error("{} exists and is not a symlink; refusing to replace it", .path.display())]
    ConflictingEntry { path: PathBuf },

    #[error("invalid environment name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("environment '{name}' is {reason}; pass --force to delete it anyway")]
    EnvironmentInUse { name: String, reason: &'static str },

    #[error("no effective environment (no local marker and no global default)")]
    NoEffectiveEnvironment,

    #[error("{op} {}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::EnvironmentNotFound { .. } => 2,
            Self::ConflictingRealDirectory { .. } | Self::ConflictingEntry { .. } => 3,
            Self::AlreadyExists { .. } | Self::DestinationExists { .. } => 4,
            Self::InvalidName { .. } => 5,
            Self::EnvironmentInUse { .. } => 6,
            Self::NoEffectiveEnvironment => 7,
            Self::Io { .. } => 1,
        }
    }
}

/// Failures of the optional package-manager install step.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("npm install failed: '{binary}' not found on PATH")]
    NotFound { binary: String },

    #[error("npm install failed: '{binary}' exited with {}", describe_status(.status))]
    Failed { binary: String, status: Option<i32> },

    #[error("npm install failed: could not run '{binary}'")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
}

impl InstallError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => 127,
            Self::Failed { status, .. } => match status {
                Some(code) if *code != 0 => *code,
                _ => 1,
            },
            Self::Spawn { .. } => 1,
        }
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Exit status for an error bubbling out of a command handler.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<Error>() {
            return e.exit_code();
        }
        if let Some(e) = cause.downcast_ref::<InstallError>() {
            return e.exit_code();
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_codes_survive_anyhow_context() {
        let err: anyhow::Result<()> = Err(Error::DestinationExists {
            name: "two".into(),
            path: PathBuf::from("/r/envs/two"),
        })
        .context("rename one -> two");
        let err = err.unwrap_err();
        assert_eq!(exit_code(&err), 4);
    }

    #[test]
    fn install_failures_have_distinct_codes() {
        let missing = InstallError::NotFound {
            binary: "npm-missing".into(),
        };
        let failed = InstallError::Failed {
            binary: "npm".into(),
            status: Some(2),
        };
        let killed = InstallError::Failed {
            binary: "npm".into(),
            status: None,
        };
        assert_eq!(missing.exit_code(), 127);
        assert_eq!(failed.exit_code(), 2);
        assert_eq!(killed.exit_code(), 1);
        assert!(format!("{failed}").contains("npm install failed"));
    }

    #[test]
    fn unclassified_errors_exit_one() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(exit_code(&err), 1);
    }
}

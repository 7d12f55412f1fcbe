use std::path::PathBuf;

use tempfile::TempDir;

use crate::paths::PathSet;

/// Scratch root, config home and working directory under one temp dir.
pub struct Sandbox {
    _dir: TempDir,
    pub paths: PathSet,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let work = dir.path().join("work");
        std::fs::create_dir(&work).expect("create work dir");
        let paths = PathSet::new(dir.path().join(".root"), dir.path().join(".codex_home"), work);
        Self { _dir: dir, paths }
    }

    pub fn mkenv(&self, name: &str) -> PathBuf {
        let p = self.paths.env_path(name);
        std::fs::create_dir_all(&p).expect("create env dir");
        p
    }
}

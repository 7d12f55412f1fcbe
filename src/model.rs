use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct EnvRow {
    pub name: String,
    pub path: String,
    /// Named by the global pointer.
    pub global: bool,
    /// Target of the active link.
    pub active: bool,
    /// Named by the nearest local marker.
    pub local: bool,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Local,
    Global,
}

#[derive(Clone, Debug, Serialize)]
pub struct CurrentReport {
    pub name: String,
    pub source: Source,
    /// Marker file or global pointer file the name was read from.
    pub origin: String,
    pub exists: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct LocalMarker {
    pub name: String,
    pub marker: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkReport {
    Missing,
    RealDirectory,
    OtherEntry,
    Symlink {
        target: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        env: Option<String>,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusReport {
    pub root: String,
    pub envs_dir: String,
    pub codex_home: String,
    pub cwd: String,
    pub envs: Vec<String>,
    pub global: Option<String>,
    pub local: Option<LocalMarker>,
    pub effective: Option<CurrentReport>,
    pub link: LinkReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codex_binary: Option<String>,
}

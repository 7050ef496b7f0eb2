use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    env,
    path::PathBuf,
};

#[derive(Clone, Debug, Deserialize, Default)]
pub(super) struct AppConfig {
    #[serde(default)]
    pub(super) config_dir: PathBuf,
}

lazy_static::lazy_static! {
    static ref CONFIG_FOLDER: Option<PathBuf> = env::var("METRICS_FETCHER_CONFIG_DIR")
        .ok()
        .map(PathBuf::from);
}

/// Directory searched for `config.yaml` when no `--config` file is given.
///
/// `METRICS_FETCHER_CONFIG_DIR` takes precedence over the platform default.
pub fn get_config_dir() -> PathBuf {
    if let Some(s) = CONFIG_FOLDER.clone() {
        s
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.config_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".config")
    }
}

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "wikia", env!("CARGO_PKG_NAME"))
}

use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub secrets_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        Self::at(discover_data_dir())
    }

    /// Lay out every path under `data_dir`, creating the directories.
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let log_dir = data_dir.join("logs");
        let upload_dir = data_dir.join("uploads");
        let secrets_path = data_dir.join("secrets.yaml");

        for dir in [&data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            log_dir,
            upload_dir,
            secrets_path,
        }
    }

    pub fn default_config_path(&self) -> PathBuf {
        self.data_dir.join("config.yml")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("RAGDESK_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("RagDesk");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("RagDesk");
    }

    let xdg = env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"));
    xdg.join("ragdesk")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

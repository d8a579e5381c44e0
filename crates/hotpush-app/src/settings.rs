//! Project-local settings from .hotpush/config.toml

use std::path::Path;

use serde::Deserialize;

use hotpush_core::prelude::*;
use hotpush_transport::DEFAULT_LIVESYNC_PORT;

const CONFIG_FILENAME: &str = "config.toml";
const HOTPUSH_DIR: &str = ".hotpush";

/// Project settings, all optional with sensible defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub watcher: WatcherSettings,
    pub sync: SyncSettings,
    pub debug: DebugSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
    /// Paths to watch, relative to the project root
    pub paths: Vec<String>,
    pub debounce_ms: u64,
    /// Regex patterns matched against project-relative paths
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Host-forwarded port of the in-app LiveSync listener (Android)
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub ack_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    pub launch_timeout_ms: u64,
    pub ready_for_attach_timeout_ms: u64,
    pub attach_timeout_ms: u64,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            paths: vec![".".to_string()],
            debounce_ms: 500,
            ignore: vec![
                r"^\.git/".to_string(),
                r"^\.hotpush/".to_string(),
                r"^node_modules/".to_string(),
                r"^platforms/".to_string(),
            ],
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_LIVESYNC_PORT,
            connect_timeout_secs: 10,
            ack_timeout_secs: 30,
        }
    }
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            launch_timeout_ms: 45_000,
            ready_for_attach_timeout_ms: 20_000,
            attach_timeout_ms: 5_000,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watcher: WatcherSettings::default(),
            sync: SyncSettings::default(),
            debug: DebugSettings::default(),
        }
    }
}

/// Load settings from .hotpush/config.toml
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(project_path: &Path) -> Settings {
    let config_path = project_path.join(HOTPUSH_DIR).join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("no config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Create a default config file in .hotpush/ if none exists.
pub fn init_config_dir(project_path: &Path) -> Result<()> {
    let hotpush_dir = project_path.join(HOTPUSH_DIR);

    if !hotpush_dir.exists() {
        std::fs::create_dir_all(&hotpush_dir)
            .map_err(|e| Error::config(format!("failed to create .hotpush dir: {e}")))?;
    }

    let config_path = hotpush_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        let default_content = r#"# hotpush configuration

[watcher]
paths = ["."]
debounce_ms = 500
ignore = ["^\\.git/", "^\\.hotpush/", "^node_modules/", "^platforms/"]

[sync]
port = 18183
connect_timeout_secs = 10
ack_timeout_secs = 30

[debug]
launch_timeout_ms = 45000
ready_for_attach_timeout_ms = 20000
attach_timeout_ms = 5000
"#;
        std::fs::write(&config_path, default_content)
            .map_err(|e| Error::config(format!("failed to write config.toml: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_settings_defaults() {
        let temp = tempdir().unwrap();
        let settings = load_settings(temp.path());

        assert_eq!(settings.watcher.debounce_ms, 500);
        assert_eq!(settings.sync.port, DEFAULT_LIVESYNC_PORT);
        assert_eq!(settings.debug.attach_timeout_ms, 5_000);
    }

    #[test]
    fn test_load_settings_custom() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(HOTPUSH_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(CONFIG_FILENAME),
            r#"
[watcher]
debounce_ms = 250
paths = ["src"]

[sync]
port = 9000
"#,
        )
        .unwrap();

        let settings = load_settings(temp.path());
        assert_eq!(settings.watcher.debounce_ms, 250);
        assert_eq!(settings.watcher.paths, vec!["src".to_string()]);
        assert_eq!(settings.sync.port, 9000);
        // Sections not present keep their defaults.
        assert_eq!(settings.debug.launch_timeout_ms, 45_000);
    }

    #[test]
    fn test_malformed_settings_fall_back_to_defaults() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(HOTPUSH_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(CONFIG_FILENAME), "not [valid toml").unwrap();

        assert_eq!(load_settings(temp.path()), Settings::default());
    }

    #[test]
    fn test_init_config_dir_writes_parseable_defaults() {
        let temp = tempdir().unwrap();
        init_config_dir(temp.path()).unwrap();

        let settings = load_settings(temp.path());
        assert_eq!(settings, Settings::default());

        // Idempotent.
        init_config_dir(temp.path()).unwrap();
    }
}

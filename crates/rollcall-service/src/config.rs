use chrono::Weekday;
use rollcall_core::Thresholds;
use rollcall_store::Backend;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_EXPORT_MAX_DAYS: u32 = 31;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Service configuration.
///
/// Resolved from defaults, then an optional TOML file named by
/// `ROLLCALL_CONFIG`, then `ROLLCALL_*` environment overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage backend (default: sqlite).
    pub backend: Backend,
    /// Database file. Defaults to the backend's file name in the data directory.
    pub db_path: Option<PathBuf>,
    /// Matcher acceptance bounds.
    pub thresholds: Thresholds,
    /// First day of the week for weekly statistics (default: Sunday).
    pub week_start: Weekday,
    /// Maximum number of day columns in a CSV export.
    pub export_max_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            db_path: None,
            thresholds: Thresholds::default(),
            week_start: Weekday::Sun,
            export_max_days: DEFAULT_EXPORT_MAX_DAYS,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(|key| std::env::var(key).ok())
    }

    /// Load configuration reading variables through `env`.
    pub fn resolve(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match env("ROLLCALL_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(&env);
        if config.export_max_days == 0 {
            tracing::warn!("export_max_days must be positive; using default");
            config.export_max_days = DEFAULT_EXPORT_MAX_DAYS;
        }
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) {
        if let Some(backend) = env_parse(env, "ROLLCALL_BACKEND") {
            self.backend = backend;
        }
        if let Some(path) = env("ROLLCALL_DB_PATH") {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(v) = env_parse(env, "ROLLCALL_SIGNATURE_MAX_DISTANCE") {
            self.thresholds.signature_max_distance = v;
        }
        if let Some(v) = env_parse(env, "ROLLCALL_SIMILARITY_COMPARABLE") {
            self.thresholds.similarity_comparable = v;
        }
        if let Some(v) = env_parse(env, "ROLLCALL_SIMILARITY_ACCEPT") {
            self.thresholds.similarity_accept = v;
        }
        if let Some(v) = env_parse(env, "ROLLCALL_WEEK_START") {
            self.week_start = v;
        }
        if let Some(v) = env_parse(env, "ROLLCALL_EXPORT_MAX_DAYS") {
            self.export_max_days = v;
        }
    }

    /// Database file for the configured backend.
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join(self.backend.default_file_name()))
    }
}

/// `$XDG_DATA_HOME/rollcall`, falling back to `~/.local/share/rollcall`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

/// Parse an environment override, ignoring (with a warning) values that don't parse.
fn env_parse<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = env(key)?;
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %value, "ignoring invalid environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(env_of(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.thresholds.signature_max_distance, 60.0);
        assert_eq!(config.thresholds.similarity_comparable, 92.0);
        assert_eq!(config.thresholds.similarity_accept, 88.0);
        assert_eq!(config.week_start, Weekday::Sun);
        assert!(config.db_path().ends_with("rollcall/attendance.db"));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::resolve(env_of(&[
            ("ROLLCALL_BACKEND", "json"),
            ("ROLLCALL_DB_PATH", "/srv/rollcall/data.json"),
            ("ROLLCALL_SIGNATURE_MAX_DISTANCE", "45.5"),
            ("ROLLCALL_WEEK_START", "Monday"),
            ("ROLLCALL_EXPORT_MAX_DAYS", "7"),
        ]))
        .unwrap();
        assert_eq!(config.backend, Backend::Json);
        assert_eq!(config.db_path(), PathBuf::from("/srv/rollcall/data.json"));
        assert_eq!(config.thresholds.signature_max_distance, 45.5);
        assert_eq!(config.thresholds.similarity_accept, 88.0);
        assert_eq!(config.week_start, Weekday::Mon);
        assert_eq!(config.export_max_days, 7);
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let config = Config::resolve(env_of(&[
            ("ROLLCALL_BACKEND", "oracle"),
            ("ROLLCALL_SIMILARITY_ACCEPT", "lots"),
            ("ROLLCALL_EXPORT_MAX_DAYS", "0"),
        ]))
        .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(
            &path,
            r#"
backend = "json"
week_start = "Mon"

[thresholds]
signature_max_distance = 30.0
"#,
        )
        .unwrap();
        let path_str = path.to_string_lossy().into_owned();

        let config = Config::resolve(env_of(&[
            ("ROLLCALL_CONFIG", path_str.as_str()),
            ("ROLLCALL_WEEK_START", "Sat"),
        ]))
        .unwrap();
        assert_eq!(config.backend, Backend::Json);
        assert_eq!(config.thresholds.signature_max_distance, 30.0);
        assert_eq!(config.thresholds.similarity_comparable, 92.0);
        assert_eq!(config.week_start, Weekday::Sat);
        assert!(config.db_path().ends_with("rollcall/attendance.json"));
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(&path, "backend = [").unwrap();
        let path_str = path.to_string_lossy().into_owned();
        assert!(matches!(
            Config::resolve(env_of(&[("ROLLCALL_CONFIG", path_str.as_str())])),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            Config::resolve(env_of(&[("ROLLCALL_CONFIG", "/nonexistent/rollcall.toml")])),
            Err(ConfigError::Read { .. })
        ));
    }
}

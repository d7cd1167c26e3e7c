use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which records backend the wizards talk to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Remote records API over HTTP
    Http,
    /// File-backed store under the state directory
    #[default]
    Local,
}

/// Records API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Base URL of the records API (e.g., "https://admin.example.com/api")
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Key holding the record identifier in API responses (default: "id")
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

fn default_token_env() -> String {
    "ONBOARD_API_TOKEN".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_id_field() -> String {
    "id".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            base_url: None,
            token_env: default_token_env(),
            timeout_secs: default_timeout(),
            id_field: default_id_field(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Saved sessions, local records and logs
    #[serde(default = "default_state_path")]
    pub state: String,
    /// User-defined wizard definitions (*.json)
    #[serde(default = "default_wizards_path")]
    pub wizards: String,
}

fn default_state_path() -> String {
    ".onboard".to_string()
}

fn default_wizards_path() -> String {
    ".onboard/wizards".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state: default_state_path(),
            wizards: default_wizards_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to log to a file under the state directory instead of stderr
    #[serde(default)]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
        }
    }
}

impl Config {
    /// Path to the project config file
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".onboard/config.toml")
    }

    /// Config files that exist, lowest precedence first
    pub fn file_sources(explicit: Option<&str>) -> Vec<PathBuf> {
        let user = dirs::config_dir().map(|dir| dir.join("onboard").join("config.toml"));
        let mut sources: Vec<PathBuf> = [Some(Self::project_config_path()), user]
            .into_iter()
            .flatten()
            .filter(|path| path.exists())
            .collect();
        // An explicit path must exist; `load` reports it if not
        sources.extend(explicit.map(PathBuf::from));
        sources
    }

    /// Defaults, then config files, then `ONBOARD__SECTION__KEY` variables
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = serde_json::to_string(&Config::default())
            .context("Failed to serialize default config")?;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(&defaults, config::FileFormat::Json));
        for path in Self::file_sources(config_path) {
            debug!(path = %path.display(), "Loading config file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder
            .add_source(
                config::Environment::with_prefix("ONBOARD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(config::Config::try_deserialize::<Self>)
            .context("Failed to load configuration")
    }

    /// Write this config to `.onboard/config.toml`, returning the path
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::project_config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Get absolute path to state directory
    pub fn state_path(&self) -> PathBuf {
        absolute(&self.paths.state)
    }

    /// Get absolute path to user wizard definitions
    pub fn wizards_path(&self) -> PathBuf {
        absolute(&self.paths.wizards)
    }

    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.state_path().join("sessions.json")
    }
}

fn absolute(path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.backend, BackendKind::Local);
        assert_eq!(config.api.id_field, "id");
        assert_eq!(config.api.timeout_secs, 30);
        assert!(config.api.base_url.is_none());
        assert!(!config.logging.to_file);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [api]
            backend = "http"
            base_url = "https://admin.example.com/api"
            "#,
        )
        .unwrap();

        assert_eq!(config.api.backend, BackendKind::Http);
        assert_eq!(config.api.token_env, "ONBOARD_API_TOKEN");
        assert_eq!(config.paths.state, ".onboard");
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        std::fs::write(
            &path,
            "[api]\nid_field = \"_id\"\n\n[paths]\nstate = \"/tmp/onboard-state\"\n",
        )
        .unwrap();

        let config = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.api.id_field, "_id");
        assert_eq!(config.state_path(), PathBuf::from("/tmp/onboard-state"));
        assert_eq!(
            config.sessions_path(),
            PathBuf::from("/tmp/onboard-state/sessions.json")
        );
    }

    #[test]
    fn test_explicit_file_is_last_source() {
        let sources = Config::file_sources(Some("/etc/onboard/custom.toml"));
        assert_eq!(
            sources.last(),
            Some(&PathBuf::from("/etc/onboard/custom.toml"))
        );
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent.toml");
        assert!(Config::load(Some(path.to_str().unwrap())).is_err());
    }

    #[test]
    fn test_saved_toml_parses_back() {
        let mut config = Config::default();
        config.api.backend = BackendKind::Http;
        config.api.base_url = Some("https://admin.example.com/api".to_string());

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.api.backend, BackendKind::Http);
        assert_eq!(parsed.api.base_url, config.api.base_url);
    }

    #[test]
    fn test_relative_paths_are_absolutised() {
        let config = Config::default();
        assert!(config.state_path().is_absolute());
        assert!(config.wizards_path().ends_with("wizards"));
        assert!(config.logs_path().ends_with("logs"));
    }
}

use anyhow::{anyhow, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tuning file for coursesync (`config.yml`)
///
/// Connection details come from the command line; this file only carries
/// the knobs that rarely change between runs.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Retry policy for remote calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SyncConfig {
    /// Maximum parallel attachment fetches inside one category
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Timeout for a single remote call in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Retry configuration for transient remote failures
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for the backoff delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier applied to the delay after every retry
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

fn default_max_parallel() -> usize {
    4
}
fn default_timeout() -> u64 {
    300
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            timeout: default_timeout(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings from the default location, falling back to built-in defaults
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_config_path()?;

        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!("No settings file at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Load settings from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Get the default settings file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("coursesync").join("config.yml"))
    }
}

/// Which courses a run mirrors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CourseSelection {
    All,
    /// Matches a course name or course code, case-insensitively
    Named(String),
}

impl CourseSelection {
    pub fn matches(&self, name: &str, code: Option<&str>) -> bool {
        match self {
            CourseSelection::All => true,
            CourseSelection::Named(wanted) => {
                name.eq_ignore_ascii_case(wanted)
                    || code.is_some_and(|c| c.eq_ignore_ascii_case(wanted))
            }
        }
    }
}

/// Immutable runtime configuration, built once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// API base, e.g. `https://school.instructure.com`
    pub base_url: String,

    /// Bearer token sent with every request
    pub token: String,

    /// Root of the local mirror
    pub target_dir: PathBuf,

    pub selection: CourseSelection,

    pub sync: SyncConfig,

    pub retry: RetryConfig,
}

impl Config {
    /// Combine command line values with the tuning file and validate the result
    pub fn new(
        base_url: &str,
        token: &str,
        target_dir: &str,
        selection: CourseSelection,
        settings: &Settings,
    ) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(anyhow!("Base URL must not be empty"));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(anyhow!(
                "Base URL must start with http:// or https://, got: {}",
                base_url
            ));
        }

        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(anyhow!("Access token must not be empty"));
        }

        if settings.sync.max_parallel == 0 {
            return Err(anyhow!("sync.max_parallel must be at least 1"));
        }

        let target_dir = shellexpand::full(target_dir)
            .context("Failed to expand target directory path")?
            .into_owned();

        Ok(Self {
            base_url,
            token,
            target_dir: PathBuf::from(target_dir),
            selection,
            sync: settings.sync.clone(),
            retry: settings.retry.clone(),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    fn config_with(base_url: &str, token: &str) -> Result<Config> {
        Config::new(
            base_url,
            token,
            "/tmp/mirror",
            CourseSelection::All,
            &Settings::default(),
        )
    }

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::default();

        assert_eq!(settings.sync.max_parallel, 4);
        assert_eq!(settings.sync.timeout, 300);
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.retry.initial_delay(), Duration::from_millis(500));
        assert_eq!(settings.retry.max_delay(), Duration::from_secs(10));
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml_content = r#"
sync:
  max_parallel: 8
  timeout: 60
retry:
  max_attempts: 5
  initial_delay_ms: 100
logging:
  level: "debug"
"#;

        let settings: Settings = serde_yaml::from_str(yaml_content).expect("Failed to parse YAML");

        assert_eq!(settings.sync.max_parallel, 8);
        assert_eq!(settings.sync.timeout, 60);
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.initial_delay_ms, 100);
        // Unspecified fields keep their defaults
        assert_eq!(settings.retry.max_delay_ms, 10_000);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn test_settings_load_nonexistent_file() {
        let result = Settings::load(Path::new("/nonexistent/path/config.yml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_settings_load_invalid_yaml() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("config.yml");
        std::fs::write(&path, "sync: [unterminated").unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_config_default_path_xdg() {
        let default_path = Settings::default_config_path().expect("Failed to get default path");
        assert!(default_path.to_string_lossy().contains("coursesync"));
        assert!(default_path.to_string_lossy().ends_with("config.yml"));
    }

    #[test]
    fn test_config_trims_base_url() {
        let config = config_with("https://lms.example.edu/ ", "secret").unwrap();
        assert_eq!(config.base_url, "https://lms.example.edu");
        assert_eq!(config.request_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(config_with("", "secret").is_err());
        assert!(config_with("lms.example.edu", "secret").is_err());
        assert!(config_with("https://lms.example.edu", "  ").is_err());

        let mut settings = Settings::default();
        settings.sync.max_parallel = 0;
        let result = Config::new(
            "https://lms.example.edu",
            "secret",
            "/tmp/mirror",
            CourseSelection::All,
            &settings,
        );
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_target_dir_expansion() {
        env::set_var("TEST_COURSESYNC_HOME", "/test/home");

        let config = Config::new(
            "https://lms.example.edu",
            "secret",
            "${TEST_COURSESYNC_HOME}/courses",
            CourseSelection::All,
            &Settings::default(),
        )
        .expect("Failed to build config");

        assert_eq!(config.target_dir, PathBuf::from("/test/home/courses"));

        env::remove_var("TEST_COURSESYNC_HOME");
    }

    #[test]
    fn test_course_selection_matching() {
        let named = CourseSelection::Named("bio-101".to_string());
        assert!(named.matches("Biology", Some("BIO-101")));
        assert!(named.matches("bio-101", None));
        assert!(!named.matches("Chemistry", Some("CHEM-110")));
        assert!(CourseSelection::All.matches("anything", None));
    }
}

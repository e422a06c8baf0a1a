use anyhow::{Context, Result, bail};
use ldapkit::LdapConfig;
use reconcile::{RetryConfig, ServerConfig, SyncOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("dirsync"))
}

/// Default config file location
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

/// Expand `~` and environment variables in a user-supplied path
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(&raw).as_ref()),
    }
}

// ============================================================================
// Config Format
// ============================================================================

/// Supported config file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            Some(other) => bail!("Unsupported config format .{other} (use .json or .toml)"),
            None => bail!("Config file {} has no extension", path.display()),
        }
    }
}

// ============================================================================
// App Config
// ============================================================================

/// Everything `dirsync` needs for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory the desired state is read from
    pub directory: LdapConfig,
    /// Target servers, reconciled in this order
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub options: RunOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Servers reconciled concurrently
    pub jobs: usize,
    pub allow_empty_desired: bool,
    pub describe_users: bool,
    /// Per-request timeout for server API calls
    pub timeout_secs: u64,
    pub retry: RetrySettings,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            allow_empty_desired: false,
            describe_users: false,
            timeout_secs: 60,
            retry: RetrySettings::default(),
        }
    }
}

/// Connection retry policy, in config-file units
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub backoff_factor: f64,
    pub max_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_attempts: retry.max_attempts,
            base_delay_secs: retry.base_delay.as_secs(),
            backoff_factor: retry.backoff_factor,
            max_delay_secs: retry.max_delay.as_secs(),
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_secs(settings.base_delay_secs),
            backoff_factor: settings.backoff_factor,
            max_delay: Duration::from_secs(settings.max_delay_secs),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or from the default location
    pub fn load(path: Option<&Path>) -> Result<(Self, PathBuf)> {
        let path = match path {
            Some(p) => expand_path(p),
            None => default_config_path()?,
        };
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let format = ConfigFormat::from_path(&path)?;
        let config = Self::parse(&content, format)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok((config, path))
    }

    /// Parse config text
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let config = match format {
            ConfigFormat::Json => serde_json::from_str(content)?,
            ConfigFormat::Toml => toml::from_str(content)?,
        };
        Ok(config)
    }

    /// Check the directory section and every server before anything is contacted
    pub fn validate(&self) -> Result<()> {
        self.directory
            .validate()
            .context("Invalid directory section")?;
        reconcile::validate_servers(&self.servers)?;
        if self.options.jobs == 0 {
            bail!("options.jobs must be at least 1");
        }
        Ok(())
    }

    /// Engine options with the config defaults
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            dry_run: false,
            jobs: self.options.jobs.max(1),
            allow_empty_desired: self.options.allow_empty_desired,
            describe_users: self.options.describe_users,
            retry: RetryConfig::from(&self.options.retry),
        }
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_secs(self.options.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    const TOML_CONFIG: &str = r#"
[directory]
url = "ldaps://racf.example.com:636"
base_dn = "o=example"
bind_dn = "cn=sync,o=example"
password_env = "DIRSYNC_LDAP_PASSWORD"

[options]
jobs = 2

[options.retry]
max_attempts = 5

[[servers]]
name = "rtc1"
url = "https://rtc1.example.com:9443/ccm"
user = "admin"

[[servers.permissions]]
permission_group = "JazzAdmins"
groups = "G-Admins"

[[servers.licenses]]
license = "developer"
capacity = 10
groups = ["G-Dev", "G-Contractors"]
"#;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_toml() {
        let file = write_temp(".toml", TOML_CONFIG);
        let (config, path) = AppConfig::load(Some(file.path())).unwrap();

        assert_eq!(path, file.path());
        assert_eq!(config.directory.base_dn, "o=example");
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].label(), "rtc1");
        assert_eq!(config.servers[0].permissions[0].groups, vec!["G-Admins"]);
        assert_eq!(config.servers[0].licenses[0].capacity, Some(10));
        config.validate().unwrap();

        let options = config.sync_options();
        assert_eq!(options.jobs, 2);
        assert_eq!(options.retry.max_attempts, 5);
        assert_eq!(options.retry.base_delay, Duration::from_secs(5));
        assert!(!options.dry_run);
    }

    #[test]
    fn test_load_json_with_defaults() {
        let json = r#"{
            "directory": { "url": "ldap://localhost:389", "base_dn": "dc=example,dc=com" },
            "servers": [{ "url": "https://rtc.example.com/ccm" }]
        }"#;
        let file = write_temp(".json", json);
        let (config, _) = AppConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.options.jobs, 1);
        assert_eq!(config.options.timeout_secs, 60);
        assert_eq!(config.directory.login_attribute, "uid");
        assert_eq!(config.servers[0].label(), "https://rtc.example.com/ccm");
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_temp(".yaml", "directory: {}");
        let err = AppConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Unsupported config format"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(err.to_string().contains("Could not read"));
    }

    #[test]
    fn test_validate_rejects_empty_server_list() {
        let config = AppConfig::parse(
            r#"{ "directory": { "url": "ldap://localhost", "base_dn": "o=example" } }"#,
            ConfigFormat::Json,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no servers configured"));
    }

    #[test]
    fn test_validate_rejects_bad_directory_url() {
        let mut config = AppConfig::parse(TOML_CONFIG, ConfigFormat::Toml).unwrap();
        config.directory.url = "http://racf.example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_path(Path::new("~/dirsync.toml"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }
}

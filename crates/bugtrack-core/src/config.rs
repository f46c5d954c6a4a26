//! Configuration for bugtrack
//!
//! Read from a TOML file (see `Config::resolve_path`) and then overridden by
//! environment variables. Mail relay credentials belong in the file or the
//! environment, never in code.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable pointing at the config file
pub const ENV_CONFIG: &str = "BUGTRACK_CONFIG";
pub const ENV_DATABASE: &str = "BUGTRACK_DATABASE";
pub const ENV_PORT: &str = "BUGTRACK_PORT";
pub const ENV_SMTP_HOST: &str = "BUGTRACK_SMTP_HOST";
pub const ENV_SMTP_USERNAME: &str = "BUGTRACK_SMTP_USERNAME";
pub const ENV_SMTP_PASSWORD: &str = "BUGTRACK_SMTP_PASSWORD";
/// Recipient of the diagnostic test email
pub const ENV_TEST_RECIPIENT: &str = "BUGTRACK_TEST_RECIPIENT";

/// bugtrack configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Recipient of the diagnostic test email
    pub test_recipient: Option<String>,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub smtp: SmtpConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = dirs::data_dir()
            .map(|dir| dir.join("bugtrack").join("bugtrack.db"))
            .unwrap_or_else(|| PathBuf::from("bugtrack.db"));
        Self { path }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3848,
        }
    }
}

/// How the SMTP connection is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    /// Plain connection upgraded with STARTTLS (usually port 587)
    #[default]
    Starttls,
    /// Implicit TLS (usually port 465)
    Tls,
    /// Unencrypted, for local relays only
    None,
}

/// Outbound mail relay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// Relay host. Notifications are only logged while this is unset.
    pub host: Option<String>,
    /// Relay port. Unset means the usual port for `tls`.
    pub port: Option<u16>,
    pub tls: SmtpTls,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender mailbox, e.g. `"Bug Tracker" <noreply@example.com>`
    pub from: String,
    /// Upper bound for one delivery attempt
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            tls: SmtpTls::Starttls,
            username: None,
            password: None,
            from: "\"Bug Tracker\" <noreply@bugtracker.local>".to_string(),
            timeout_secs: 10,
        }
    }
}

impl SmtpConfig {
    /// Whether a relay host has been configured
    pub fn is_configured(&self) -> bool {
        self.host.as_deref().is_some_and(|h| !h.trim().is_empty())
    }

    /// Configured port, else 587 for STARTTLS, 465 for implicit TLS and 25
    /// for plain connections
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(match self.tls {
            SmtpTls::Starttls => 587,
            SmtpTls::Tls => 465,
            SmtpTls::None => 25,
        })
    }
}

/// Notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Send emails on assignment and status changes
    pub enabled: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// strftime format for dates in the PDF report
    pub date_format: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            date_format: "%-m/%-d/%Y".to_string(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Load from the resolved path and apply environment overrides
    pub fn load_default() -> crate::Result<Self> {
        let mut config = Self::load(&Self::resolve_path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// `$BUGTRACK_CONFIG`, else `<config dir>/bugtrack/config.toml`
    pub fn resolve_path() -> PathBuf {
        if let Some(path) = std::env::var_os(ENV_CONFIG).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .map(|dir| dir.join("bugtrack").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("bugtrack.toml"))
    }

    /// Apply overrides looked up through `lookup` (the process environment
    /// outside of tests). Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get(ENV_DATABASE) {
            self.database.path = PathBuf::from(path);
        }
        if let Some(port) = get(ENV_PORT) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| crate::Error::Config(format!("{ENV_PORT}={port:?}: {e}")))?;
        }
        if let Some(host) = get(ENV_SMTP_HOST) {
            self.smtp.host = Some(host);
        }
        if let Some(user) = get(ENV_SMTP_USERNAME) {
            self.smtp.username = Some(user);
        }
        if let Some(password) = get(ENV_SMTP_PASSWORD) {
            self.smtp.password = Some(password);
        }
        if let Some(recipient) = get(ENV_TEST_RECIPIENT) {
            self.test_recipient = Some(recipient);
        }
        Ok(())
    }

    /// Save config to a TOML file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Generate a default config file with comments
    pub fn default_with_comments() -> String {
        r#"# bugtrack configuration

# Recipient of the diagnostic test email (GET /test-email)
# test_recipient = "you@example.com"

[database]
# SQLite database file
# path = "/var/lib/bugtrack/bugtrack.db"

[server]
host = "127.0.0.1"
port = 3848

[smtp]
# Notifications are only logged until a relay host is set
# host = "smtp.example.com"

# Defaults to 587 for starttls, 465 for tls and 25 for none
# port = 587

# starttls, tls or none
tls = "starttls"

# Prefer BUGTRACK_SMTP_USERNAME / BUGTRACK_SMTP_PASSWORD for credentials
# username = ""
# password = ""

from = "\"Bug Tracker\" <noreply@bugtracker.local>"

# Upper bound for one delivery attempt, in seconds
timeout_secs = 10

[notifications]
# Email developers on assignment and status changes
enabled = true

[export]
# strftime format for dates in the PDF report
date_format = "%-m/%-d/%Y"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.port, 3848);
        assert!(!config.smtp.is_configured());
        assert!(config.notifications.enabled);
    }

    #[test]
    fn test_commented_default_parses() {
        let config: Config = toml::from_str(&Config::default_with_comments()).unwrap();
        assert_eq!(config.smtp.tls, SmtpTls::Starttls);
        assert_eq!(config.smtp.timeout_secs, 10);
        assert_eq!(config.export.date_format, "%-m/%-d/%Y");
    }

    #[test]
    fn test_smtp_port_follows_tls_mode() {
        let mut smtp = SmtpConfig::default();
        assert_eq!(smtp.effective_port(), 587);

        smtp.tls = SmtpTls::Tls;
        assert_eq!(smtp.effective_port(), 465);

        smtp.port = Some(2525);
        assert_eq!(smtp.effective_port(), 2525);

        let config: Config = toml::from_str("[smtp]\ntls = \"tls\"\n").unwrap();
        assert_eq!(config.smtp.port, None);
        assert_eq!(config.smtp.effective_port(), 465);
    }

    #[test]
    fn test_partial_file_and_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[smtp]\nhost = \"mail.local\"\ntls = \"none\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.smtp.host.as_deref(), Some("mail.local"));
        assert_eq!(config.smtp.tls, SmtpTls::None);
        assert_eq!(config.smtp.port, None);
        assert_eq!(config.smtp.effective_port(), 25);

        config.save(&path).unwrap();
        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.smtp.host.as_deref(), Some("mail.local"));
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = \"eighty\"\n").unwrap();
        assert!(matches!(Config::load(&path), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_PORT, "9000"),
            (ENV_SMTP_HOST, "relay.local"),
            (ENV_SMTP_PASSWORD, "secret"),
            (ENV_TEST_RECIPIENT, "ops@x.com"),
            (ENV_SMTP_USERNAME, ""),
        ]);
        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert!(config.smtp.is_configured());
        assert_eq!(config.smtp.password.as_deref(), Some("secret"));
        assert_eq!(config.smtp.username, None);
        assert_eq!(config.test_recipient.as_deref(), Some("ops@x.com"));
    }

    #[test]
    fn test_bad_port_override_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == ENV_PORT).then(|| "http".to_string()));
        assert!(result.is_err());
    }
}

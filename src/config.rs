// ⚙️ Configuration - explicit objects, validated at call time
//
// Nothing here runs at load: binaries call `from_env` once they know which
// collaborators the command needs.

use crate::error::ConfigError;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;

pub const DEFAULT_IMAP_HOST: &str = "imap.gmail.com";
pub const DEFAULT_IMAP_PORT: u16 = 993;
pub const DEFAULT_DB_PATH: &str = "ledger.db";
pub const DEFAULT_MAILDIR: &str = "mail";
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:3000";

// ============================================================================
// MAILBOX CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxConfig {
    pub user: String,
    /// Kept verbatim; surrounding whitespace is part of the secret
    pub password: String,
    /// Reserved for a network mailbox; the `.eml` directory mailbox ignores it
    pub host: String,
    /// Reserved for a network mailbox
    pub port: u16,
    /// Reserved for a network mailbox
    pub tls: bool,
    /// Directory of `.eml` files read by [`crate::mailbox::EmlDirectoryMailbox`]
    pub maildir: PathBuf,
}

impl MailboxConfig {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        MailboxConfig {
            user: user.into(),
            password: password.into(),
            host: DEFAULT_IMAP_HOST.to_string(),
            port: DEFAULT_IMAP_PORT,
            tls: true,
            maildir: PathBuf::from(DEFAULT_MAILDIR),
        }
    }

    pub fn with_maildir(mut self, maildir: impl Into<PathBuf>) -> Self {
        self.maildir = maildir.into();
        self
    }

    /// Read from the process environment (`IMAP_EMAIL`, `IMAP_PASSWORD`, ...)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env_vars())
    }

    /// Build from an explicit variable map
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let user = required(vars, "IMAP_EMAIL")?;
        let password = vars
            .get("IMAP_PASSWORD")
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| ConfigError::MissingVar("IMAP_PASSWORD".to_string()))?;

        let mut config = MailboxConfig::new(user, password);

        if let Some(host) = optional(vars, "IMAP_HOST") {
            config.host = host;
        }
        if let Some(port) = optional(vars, "IMAP_PORT") {
            config.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                field: "IMAP_PORT".to_string(),
                reason: format!("'{}' is not a port number", port),
            })?;
        }
        if let Some(tls) = optional(vars, "IMAP_TLS") {
            config.tls = !matches!(tls.to_lowercase().as_str(), "0" | "false" | "no");
        }
        if let Some(dir) = optional(vars, "RECEIPT_MAILDIR") {
            config.maildir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "user".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.password.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "password".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub maildir: PathBuf,
    pub server_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            maildir: PathBuf::from(DEFAULT_MAILDIR),
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_vars(&env_vars())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let mut config = AppConfig::default();
        if let Some(path) = optional(vars, "LEDGER_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(dir) = optional(vars, "RECEIPT_MAILDIR") {
            config.maildir = PathBuf::from(dir);
        }
        if let Some(addr) = optional(vars, "SERVER_ADDR") {
            config.server_addr = addr;
        }
        config
    }
}

/// Process environment as UTF-8 pairs; entries that are not valid UTF-8 are dropped
fn env_vars() -> HashMap<String, String> {
    utf8_vars(std::env::vars_os())
}

fn utf8_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> HashMap<String, String> {
    vars.into_iter()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

fn required(vars: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    optional(vars, key).ok_or_else(|| ConfigError::MissingVar(key.to_string()))
}

fn optional(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_mailbox_config_requires_credentials() {
        let err = MailboxConfig::from_vars(&vars(&[("IMAP_PASSWORD", "secret")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingVar("IMAP_EMAIL".to_string()));

        let err = MailboxConfig::from_vars(&vars(&[("IMAP_EMAIL", "me@example.com")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingVar("IMAP_PASSWORD".to_string()));
    }

    #[test]
    fn test_mailbox_config_defaults_and_overrides() {
        let config = MailboxConfig::from_vars(&vars(&[
            ("IMAP_EMAIL", "me@example.com"),
            ("IMAP_PASSWORD", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.host, DEFAULT_IMAP_HOST);
        assert_eq!(config.port, 993);
        assert!(config.tls);

        let config = MailboxConfig::from_vars(&vars(&[
            ("IMAP_EMAIL", "me@example.com"),
            ("IMAP_PASSWORD", "secret"),
            ("IMAP_HOST", "mail.example.com"),
            ("IMAP_PORT", "143"),
            ("IMAP_TLS", "false"),
            ("RECEIPT_MAILDIR", "/tmp/inbox"),
        ]))
        .unwrap();
        assert_eq!(config.host, "mail.example.com");
        assert_eq!(config.port, 143);
        assert!(!config.tls);
        assert_eq!(config.maildir, PathBuf::from("/tmp/inbox"));
    }

    #[test]
    fn test_mailbox_config_rejects_bad_port() {
        let err = MailboxConfig::from_vars(&vars(&[
            ("IMAP_EMAIL", "me@example.com"),
            ("IMAP_PASSWORD", "secret"),
            ("IMAP_PORT", "imap"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "IMAP_PORT"));

        let mut config = MailboxConfig::new("me@example.com", "secret");
        config.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mailbox_password_kept_verbatim() {
        let config = MailboxConfig::from_vars(&vars(&[
            ("IMAP_EMAIL", "  me@example.com "),
            ("IMAP_PASSWORD", " pass word "),
        ]))
        .unwrap();
        assert_eq!(config.user, "me@example.com");
        assert_eq!(config.password, " pass word ");

        let err = MailboxConfig::from_vars(&vars(&[("IMAP_EMAIL", "me@example.com"), ("IMAP_PASSWORD", "")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingVar("IMAP_PASSWORD".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_environment_entries_dropped() {
        use std::os::unix::ffi::OsStringExt;

        let env = vec![
            (OsString::from("BROKEN"), OsString::from_vec(vec![0xff, 0xfe])),
            (OsString::from_vec(vec![0xff]), OsString::from("value")),
            (OsString::from("LEDGER_DB_PATH"), OsString::from("/data/ledger.db")),
        ];

        let vars = utf8_vars(env);
        assert_eq!(vars.len(), 1);
        assert_eq!(AppConfig::from_vars(&vars).db_path, PathBuf::from("/data/ledger.db"));
        assert_eq!(
            MailboxConfig::from_vars(&vars).unwrap_err(),
            ConfigError::MissingVar("IMAP_EMAIL".to_string())
        );
    }

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::from_vars(&HashMap::new());
        assert_eq!(config, AppConfig::default());

        let config = AppConfig::from_vars(&vars(&[("LEDGER_DB_PATH", "/data/ledger.db")]));
        assert_eq!(config.db_path, PathBuf::from("/data/ledger.db"));
        assert_eq!(config.server_addr, DEFAULT_SERVER_ADDR);
    }
}

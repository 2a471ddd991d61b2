use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fmt, fs};
use url::Url;

use crate::error::Error;

#[derive(Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub config: ConfigOptions,
}

#[derive(Deserialize)]
pub struct ConfigOptions {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    pub discord_id: Option<u64>,
    pub webhook_url: Option<String>,
    pub bot_token: Option<String>,
}

fn default_interval_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    3
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            log_dir: default_log_dir(),
            discord_id: None,
            webhook_url: None,
            bot_token: None,
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for ConfigOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigOptions")
            .field("interval_secs", &self.interval_secs)
            .field("timeout_secs", &self.timeout_secs)
            .field("log_dir", &self.log_dir)
            .field("discord_id", &self.discord_id)
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| "<redacted>"))
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config").field("config", &self.config).finish()
    }
}

impl Config {
    /// `<config dir>/rustping/config.toml`, if the platform has a config dir.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rustping").join("config.toml"))
    }

    /// Loads the config from `path`, or from [`Config::default_path`] when
    /// `path` is `None`. A missing default file yields the defaults; a missing
    /// explicit file is an error. Secrets not set in the file are taken from
    /// the environment (`.env` is honored).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a value is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML file without consulting the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::TomlParse`].
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_env(&mut self) {
        // if webhook_url is not set use env with dotenvy
        if self.config.webhook_url.is_none() {
            self.config.webhook_url = dotenvy::var("WEBHOOK_URL").ok();
        }

        if self.config.discord_id.is_none() {
            self.config.discord_id = dotenvy::var("DISCORD_ID")
                .ok()
                .and_then(|id| id.trim().parse().ok());
        }

        if self.config.bot_token.is_none() {
            self.config.bot_token = dotenvy::var("DISCORD_BOT_TOKEN").ok();
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero durations and [`Error::UrlParse`]
    /// for a malformed webhook URL.
    pub fn validate(&self) -> Result<(), Error> {
        if self.config.interval_secs == 0 {
            return Err(Error::Config("interval_secs must be at least 1".to_string()));
        }
        if self.config.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be at least 1".to_string()));
        }
        if let Some(url) = &self.config.webhook_url {
            Url::parse(url)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Bot credential, required for bot mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no token is configured.
    pub fn bot_token(&self) -> Result<&str, Error> {
        self.config
            .bot_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "bot token missing: set bot_token in the config file or DISCORD_BOT_TOKEN"
                        .to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        write!(temp_file, "{content}").expect("Failed to write to temp file");
        temp_file
    }

    #[test]
    fn test_load_config_from_toml() {
        let temp_file = write_config(
            r#"
            [config]
            interval_secs = 30
            timeout_secs = 2
            log_dir = "/var/log/rustping"
            discord_id = 1234567890
            webhook_url = "https://discord.com/api/webhooks/1234567890/abcdefg"
            bot_token = "token"
        "#,
        );

        let config = Config::load(Some(temp_file.path())).expect("Failed to parse config");

        assert_eq!(config.config.interval_secs, 30);
        assert_eq!(config.query_timeout(), Duration::from_secs(2));
        assert_eq!(config.config.log_dir, PathBuf::from("/var/log/rustping"));
        assert_eq!(config.config.discord_id, Some(1_234_567_890));
        assert_eq!(
            config.config.webhook_url.as_deref(),
            Some("https://discord.com/api/webhooks/1234567890/abcdefg")
        );
        assert_eq!(config.bot_token().unwrap(), "token");
    }

    #[test]
    fn test_defaults_for_missing_keys() {
        let temp_file = write_config("[config]\n");
        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.config.interval_secs, 10);
        assert_eq!(config.config.timeout_secs, 3);
        assert_eq!(config.config.log_dir, PathBuf::from("."));

        let empty = write_config("");
        let config = Config::from_file(empty.path()).unwrap();
        assert_eq!(config.config.interval_secs, 10);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let temp_file = write_config("[config]\ninterval_secs = 0\n");
        assert!(matches!(
            Config::load(Some(temp_file.path())),
            Err(Error::Config(_))
        ));

        let temp_file = write_config("[config]\nwebhook_url = \"not a url\"\n");
        assert!(matches!(
            Config::load(Some(temp_file.path())),
            Err(Error::UrlParse(_))
        ));

        let temp_file = write_config("[config]\ninterval_secs = \"ten\"\n");
        assert!(matches!(
            Config::from_file(temp_file.path()),
            Err(Error::TomlParse(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(Some(&dir.path().join("missing.toml")));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = Config::default();
        config.config.webhook_url = Some("https://discord.com/api/webhooks/1/secret".to_string());
        config.config.bot_token = Some("bot-secret".to_string());

        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}

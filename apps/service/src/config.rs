use std::{env, fmt, path, time::Duration};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required setting {0} is not set")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid { name: &'static str, value: String, reason: &'static str },
    #[error("failed to load env file {0}")]
    EnvFile(String),
}

/// Process configuration, read once at startup.
///
/// Every field is required; there are no defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Store connection string (libsql database path)
    pub database_url: String,
    /// Endpoints probed on every tick
    pub targets: Vec<String>,
    pub telegram_bot_token: String,
    /// Seconds between ticks
    pub interval_seconds: u64,
}

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const TARGETS: &str = "TARGETS";
pub const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const TIMEOUT: &str = "TIMEOUT";

impl Config {
    /// Read the configuration from the process environment.
    ///
    /// A `.env` file in the working directory is loaded first (if any), or the
    /// file given as `env_file`, which must exist.
    pub fn from_env(env_file: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        match env_file {
            Some(path) => {
                let path = path.as_ref();
                dotenvy::from_path(path)
                    .map_err(|_err| ConfigError::EnvFile(path.display().to_string()))?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let database_url = required(DATABASE_URL)?;
        let database_url = database_url.strip_prefix("file:").unwrap_or(&database_url).to_string();

        let raw_targets = required(TARGETS)?;
        let targets = parse_targets(&raw_targets);
        if targets.is_empty() {
            return Err(ConfigError::Invalid {
                name: TARGETS,
                value: raw_targets,
                reason: "no target endpoints listed",
            });
        }

        let telegram_bot_token = required(TELEGRAM_BOT_TOKEN)?;

        let raw_interval = required(TIMEOUT)?;
        let interval_seconds = match raw_interval.parse::<u64>() {
            Ok(0) => {
                return Err(ConfigError::Invalid {
                    name: TIMEOUT,
                    value: raw_interval,
                    reason: "tick interval must be at least one second",
                });
            }
            Ok(seconds) => seconds,
            Err(_) => {
                return Err(ConfigError::Invalid {
                    name: TIMEOUT,
                    value: raw_interval,
                    reason: "expected a whole number of seconds",
                });
            }
        };

        Ok(Self { database_url, targets, telegram_bot_token, interval_seconds })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

fn parse_targets(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|target| !target.is_empty()).map(String::from).collect()
}

fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}****")
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Configuration State:")?;
        write_title_1(f, "Store")?;
        write_1(f, "Database", &self.database_url)?;
        write_title_1(f, "Worker")?;
        write_1(f, "Interval (s)", &self.interval_seconds)?;
        write_1(f, "Targets", &self.targets.len())?;
        for target in &self.targets {
            write_2(f, "-", target)?;
        }
        write_title_1(f, "Telegram")?;
        write_1(f, "Bot Token", &mask_secret(&self.telegram_bot_token))?;

        Ok(())
    }
}

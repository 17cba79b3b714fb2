use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;

/// Threshold used by the passed/failed result listings when the caller does
/// not pass one. A Test's own `passing_score` always wins for the per-attempt
/// predicates.
pub const DEFAULT_PASSING_SCORE: i32 = 70;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub default_passing_score: i32,
    pub log_format: LogFormat,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            database_max_connections: DEFAULT_MAX_CONNECTIONS,
            default_passing_score: DEFAULT_PASSING_SCORE,
            log_format: LogFormat::default(),
        }
    }

    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let config = Self {
            database_url: get_env("DATABASE_URL")?,
            database_max_connections: get_env_parse_or(
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            )?,
            default_passing_score: get_env_parse_or("DEFAULT_PASSING_SCORE", DEFAULT_PASSING_SCORE)?,
            log_format: get_env_parse_or("LOG_FORMAT", LogFormat::default())?,
        };

        if !(0..=100).contains(&config.default_passing_score) {
            return Err(Error::Config(format!(
                "DEFAULT_PASSING_SCORE must be between 0 and 100, got {}",
                config.default_passing_score
            )));
        }
        if config.database_max_connections == 0 {
            return Err(Error::Config(
                "DATABASE_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn new_uses_documented_defaults() {
        let config = Config::new("postgres://localhost/assessments");
        assert_eq!(config.default_passing_score, DEFAULT_PASSING_SCORE);
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }
}

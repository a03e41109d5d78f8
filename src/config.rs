//! Startup configuration: command-line flags with environment fallbacks.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TASKBOARD_SECRET must be set to a non-empty value")]
    MissingSecret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "taskboard")]
#[command(about = "Task board server", long_about = None)]
pub struct Config {
    /// Address the HTTP server binds to.
    #[arg(long, env = "TASKBOARD_ADDR", default_value = "0.0.0.0:8000")]
    pub addr: SocketAddr,

    /// Directory of the Sled database.
    #[arg(long, env = "TASKBOARD_DATA_DIR", default_value = "taskboard_data")]
    pub data_dir: PathBuf,

    /// HMAC secret for bearer tokens.
    #[arg(long, env = "TASKBOARD_SECRET", hide_env_values = true, default_value = "")]
    pub secret: String,

    #[arg(long, env = "TASKBOARD_LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Write daily rolling log files here instead of stdout.
    #[arg(long, env = "TASKBOARD_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Loads `.env` (if any), then parses flags and environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::parse().validated()
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.secret.trim().is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        Ok(self)
    }
}

// src/config.rs

//! Manages server configuration: loading, defaults, and validation.

use anyhow::{Result, bail};
use serde::Deserialize;

/// The fsync policy applied to AOF writes.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppendFsync {
    /// Write and fsync on the caller before returning.
    Always,
    /// Background writes, one fsync per second.
    #[default]
    EverySec,
    /// Background writes, the OS decides when to flush.
    No,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of numbered databases (`SELECT 0..N-1`).
    #[serde(default = "default_databases")]
    pub databases: usize,
    #[serde(default)]
    pub appendonly: bool,
    #[serde(default = "default_appendfilename")]
    pub appendfilename: String,
    #[serde(default)]
    pub appendfsync: AppendFsync,
    #[serde(default = "default_maxclients")]
    pub maxclients: usize,
    #[serde(default)]
    pub requirepass: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    6379
}
fn default_databases() -> usize {
    16
}
fn default_appendfilename() -> String {
    "appendonly.aof".to_string()
}
fn default_maxclients() -> usize {
    10000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            databases: default_databases(),
            appendonly: false,
            appendfilename: default_appendfilename(),
            appendfsync: AppendFsync::default(),
            maxclients: default_maxclients(),
            requirepass: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file. A missing file yields the
    /// defaults, so the server runs without any configuration present.
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .build()?;
        let cfg: Config = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.databases == 0 {
            bail!("'databases' must be at least 1");
        }
        if self.maxclients == 0 {
            bail!("'maxclients' must be at least 1");
        }
        if self.appendfilename.is_empty() {
            bail!("'appendfilename' must not be empty");
        }
        Ok(())
    }
}

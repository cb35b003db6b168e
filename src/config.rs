//! Configuration from the environment

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;

use crate::presence::PresenceConfig;
use crate::utils::env_var_optional;
use crate::utils::env_var_or_else;

const DEFAULT_ADDRESS: &str = "0.0.0.0:6000";
const DEFAULT_STATE_DIR: &str = "./state";
const DEFAULT_REVIVAL_DELAY_MS: &str = "1000";

/// Where the notes are stored
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StorageConfig {
    /// Gone when the process stops
    Memory,

    /// SQLite database, by connection string
    Sqlite(String),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub address: SocketAddr,
    pub storage: StorageConfig,

    /// Holds the revival marker and the audio cache
    pub state_dir: PathBuf,

    /// Show the presence on startup
    pub presence_autostart: bool,

    pub presence: PresenceConfig,
}

impl Config {
    /// Read the configuration from the environment
    ///
    /// # Errors
    ///
    /// Will return `Err` when a variable is set to something that can not be parsed
    pub fn from_env() -> Result<Self> {
        let mut address = env_var_or_else("ADDRESS", || String::from(DEFAULT_ADDRESS))
            .parse::<SocketAddr>()
            .context("Invalid `ADDRESS`")?;

        // optional override of just the port
        if let Some(port) = env_var_optional("PORT") {
            address.set_port(port.parse::<u16>().context("Invalid `PORT`")?);
        }

        let storage =
            env_var_optional("DATABASE_URL").map_or(StorageConfig::Memory, StorageConfig::Sqlite);

        let state_dir = PathBuf::from(env_var_or_else("STATE_DIR", || {
            String::from(DEFAULT_STATE_DIR)
        }));

        let presence_autostart = parse_bool(&env_var_or_else("PRESENCE_AUTOSTART", || {
            String::from("true")
        }))
        .context("Invalid `PRESENCE_AUTOSTART`")?;

        let revival_delay = env_var_or_else("PRESENCE_REVIVAL_DELAY_MS", || {
            String::from(DEFAULT_REVIVAL_DELAY_MS)
        })
        .parse::<u64>()
        .context("Invalid `PRESENCE_REVIVAL_DELAY_MS`")?;

        Ok(Self {
            address,
            storage,
            state_dir,
            presence_autostart,
            presence: PresenceConfig {
                revival_delay: Duration::from_millis(revival_delay),
            },
        })
    }

    /// Where recordings end up
    pub fn audio_cache_dir(&self) -> PathBuf {
        self.state_dir.join("audio")
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!(r#"Expected a boolean, got "{other}""#),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true").unwrap());
        assert!(parse_bool(" YES ").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(!parse_bool("off").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Relay configuration persisted as TOML.
///
/// Durations are whole seconds. The player and formation timeouts are
/// converted to cleanup ticks by dividing by `cleanup_period_secs`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub cleanup_period_secs: u64,
    pub player_timeout_secs: u64,
    pub game_formation_timeout_secs: u64,
    pub write_wait_secs: u64,
    pub pong_wait_secs: u64,
    pub max_message_size: usize,
    pub send_queue_size: usize,
    pub min_game_token_len: usize,
    /// Bearer secret for the admin endpoints. Admin access is refused
    /// entirely when unset.
    pub admin_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 80,
            cleanup_period_secs: 15,
            player_timeout_secs: 90,
            game_formation_timeout_secs: 300,
            write_wait_secs: 10,
            pong_wait_secs: 30,
            max_message_size: 10240,
            send_queue_size: 10240,
            min_game_token_len: 12,
            admin_token: None,
        }
    }
}

impl Config {
    /// Load configuration from `path`. If the file does not exist, create it
    /// with defaults and return those.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let s = fs::read_to_string(path)
                .with_context(|| format!("reading config file '{}'", path.display()))?;
            let cfg: Config = toml::from_str(&s)
                .with_context(|| format!("parsing TOML config '{}'", path.display()))?;
            cfg.validate()
                .with_context(|| format!("validating config '{}'", path.display()))?;
            Ok(cfg)
        } else {
            let cfg = Config::default();
            cfg.save(path)?;
            Ok(cfg)
        }
    }

    /// Save the current config back to `path` (overwrites).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating config directory '{}'", parent.display()))?;
            }
        }
        let toml_text =
            toml::to_string_pretty(&self).with_context(|| "serializing config to TOML")?;
        fs::write(path, toml_text)
            .with_context(|| format!("writing config to '{}'", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.cleanup_period_secs == 0 {
            bail!("cleanup_period_secs must be positive");
        }
        if self.pong_wait_secs == 0 || self.write_wait_secs == 0 {
            bail!("pong_wait_secs and write_wait_secs must be positive");
        }
        if self.player_timeout_ticks() == 0 || self.formation_timeout_ticks() == 0 {
            bail!("timeouts must cover at least one cleanup period");
        }
        if self.send_queue_size == 0 || self.max_message_size == 0 {
            bail!("send_queue_size and max_message_size must be positive");
        }
        Ok(())
    }

    pub fn cleanup_period(&self) -> Duration {
        Duration::from_secs(self.cleanup_period_secs)
    }

    pub fn player_timeout_ticks(&self) -> u32 {
        (self.player_timeout_secs / self.cleanup_period_secs.max(1)) as u32
    }

    pub fn formation_timeout_ticks(&self) -> u32 {
        (self.game_formation_timeout_secs / self.cleanup_period_secs.max(1)) as u32
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Probe period, kept at nine tenths of the pong wait.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }
}

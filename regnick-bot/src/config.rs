//! Bot configuration file.
//!
//! Lives at `~/.config/regnick/regnick.toml` unless `--config` says otherwise.
//!
//! ```toml
//! admins = ["owner!*@trusted.example"]
//!
//! [[network]]
//! name = "NetGamers"
//! server = "irc.netgamers.org:6667"
//! nick = "Bot"
//! channels = ["#lobby"]
//!
//! [network.services]
//! reserved_nick = "Bot"
//! use_reserved_nick = true
//! secret = "hunter2"
//! authority = "P@cservice.netgamers.org"
//!
//! [network.services.channel_policy."#lobby"]
//! op = true
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use regnick_core::ServicesConfig;
use serde::Deserialize;

/// Default prefix for admin commands.
pub const DEFAULT_COMMAND_PREFIX: &str = "!";

/// Whole configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Hostmasks (`nick!user@host`, `*` wildcards) allowed to run commands.
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default = "default_prefix")]
    pub command_prefix: String,
    #[serde(rename = "network", default)]
    pub networks: Vec<NetworkConfig>,
}

/// One network to connect to.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    /// Server address (host:port).
    pub server: String,
    /// Use TLS. Defaults to on for port 6697.
    pub tls: Option<bool>,
    pub nick: String,
    pub user: Option<String>,
    pub realname: Option<String>,
    /// Channels to join once connected.
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub services: ServicesConfig,
}

fn default_prefix() -> String {
    DEFAULT_COMMAND_PREFIX.to_string()
}

impl NetworkConfig {
    pub fn use_tls(&self) -> bool {
        self.tls.unwrap_or_else(|| self.server.ends_with(":6697"))
    }

    pub fn user(&self) -> &str {
        self.user.as_deref().unwrap_or(&self.nick)
    }

    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or("regnick services bot")
    }

    /// Host part of `server`, for TLS server name checks.
    pub fn host(&self) -> &str {
        self.server
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or(&self.server)
    }
}

/// `~/.config/regnick/regnick.toml`
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("regnick")
        .join("regnick.toml")
}

impl BotConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("can't read config {}", path.display()))?;
        let config = Self::parse(&text)
            .with_context(|| format!("bad config file {}", path.display()))?;
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: BotConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.networks.is_empty() {
            bail!("no [[network]] entries configured");
        }
        if self.command_prefix.is_empty() {
            bail!("command_prefix must not be empty");
        }
        let mut seen = HashSet::new();
        for net in &self.networks {
            if net.name.trim().is_empty() {
                bail!("network with server {} has an empty name", net.server);
            }
            if !seen.insert(net.name.to_lowercase()) {
                bail!("network {} is configured twice", net.name);
            }
            if net.nick.trim().is_empty() {
                bail!("network {} has an empty nick", net.name);
            }
            if !net.server.contains(':') {
                bail!("network {}: server must be host:port, got {}", net.name, net.server);
            }
            if net.services.recovery_cooldown_secs == 0 {
                bail!("network {}: recovery_cooldown_secs must be positive", net.name);
            }
        }
        Ok(())
    }
}

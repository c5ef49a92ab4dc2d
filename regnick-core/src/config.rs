//! Per-network services settings.
//!
//! The agent only reads these; loading and persistence belong to the host.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::irc::irc_lower;

/// Default spacing between recovery attempts.
pub const DEFAULT_RECOVERY_COOLDOWN_SECS: u64 = 60;
/// Identify text sent to the authority.
pub const DEFAULT_IDENTIFY_TEMPLATE: &str = "LOGIN {nick} {secret}";
/// Recovery text sent to the authority.
pub const DEFAULT_RECOVER_TEMPLATE: &str = "RECOVER {nick} {nick} {secret}";

/// Privileges we ask the authority for in one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelPolicy {
    pub op: bool,
    pub halfop: bool,
    pub voice: bool,
}

/// Services configuration for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Activation predicate: when false the agent ignores every event.
    pub enabled: bool,
    /// Registered nick we identify for and try to hold.
    pub reserved_nick: Option<String>,
    /// Actively take the reserved nick instead of identifying under whatever nick we have.
    pub use_reserved_nick: bool,
    /// Password for the reserved nick.
    pub secret: Option<String>,
    /// Services bot, either `nick` or `nick@host`.
    pub authority: Option<String>,
    /// Withhold channel joins until identification succeeds.
    pub hold_joins_until_identified: bool,
    pub recovery_cooldown_secs: u64,
    pub identify_template: String,
    pub recover_template: String,
    /// Per-channel privilege requests, keyed by channel name.
    pub channel_policy: HashMap<String, ChannelPolicy>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reserved_nick: None,
            use_reserved_nick: false,
            secret: None,
            authority: None,
            hold_joins_until_identified: false,
            recovery_cooldown_secs: DEFAULT_RECOVERY_COOLDOWN_SECS,
            identify_template: DEFAULT_IDENTIFY_TEMPLATE.to_string(),
            recover_template: DEFAULT_RECOVER_TEMPLATE.to_string(),
            channel_policy: HashMap::new(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ServicesConfig {
    pub fn reserved_nick(&self) -> Option<&str> {
        non_empty(&self.reserved_nick)
    }

    pub fn secret(&self) -> Option<&str> {
        non_empty(&self.secret)
    }

    /// Full authority address as configured; messages are sent here.
    pub fn authority(&self) -> Option<&str> {
        non_empty(&self.authority)
    }

    /// Nick part of the authority address, for matching message sources.
    pub fn authority_nick(&self) -> Option<&str> {
        self.authority()
            .map(|a| a.split_once('@').map(|(nick, _)| nick).unwrap_or(a))
            .filter(|n| !n.is_empty())
    }

    pub fn recovery_cooldown(&self) -> Duration {
        Duration::from_secs(self.recovery_cooldown_secs)
    }

    /// Privilege policy for `channel`; channels without an entry ask for nothing.
    pub fn policy_for(&self, channel: &str) -> ChannelPolicy {
        let wanted = irc_lower(channel);
        self.channel_policy
            .iter()
            .find(|(name, _)| irc_lower(name) == wanted)
            .map(|(_, policy)| *policy)
            .unwrap_or_default()
    }

    pub fn render_identify(&self, nick: &str, secret: &str) -> String {
        render(&self.identify_template, nick, secret)
    }

    pub fn render_recover(&self, nick: &str, secret: &str) -> String {
        render(&self.recover_template, nick, secret)
    }
}

fn render(template: &str, nick: &str, secret: &str) -> String {
    template.replace("{nick}", nick).replace("{secret}", secret)
}

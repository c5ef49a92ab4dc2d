//! Operator-requested services actions.
//!
//! Authorization is the host's job; these only check configuration and
//! connection state, and report failures as [`AgentError`]s the host can
//! show to whoever asked.

use std::time::Instant;

use tracing::info;

use crate::action::Outbound;
use crate::agent::Agent;
use crate::error::{AgentError, Result};
use crate::host::HostView;
use crate::irc::irc_eq;
use crate::privileges::Grant;

impl Agent {
    fn ensure_enabled(&self) -> Result<()> {
        if self.config.enabled { Ok(()) } else { Err(AgentError::Disabled) }
    }

    /// Identify with the authority under our current nick.
    pub fn request_identify(&mut self, host: &dyn HostView) -> Result<Outbound> {
        self.ensure_enabled()?;
        if self.config.authority().is_none() {
            return Err(AgentError::ConfigurationIncomplete { missing: "authority" });
        }
        if self.config.reserved_nick().is_none() {
            return Err(AgentError::ConfigurationIncomplete { missing: "reserved_nick" });
        }
        let current = host.current_nick().to_string();
        self.identify(host, &current)
    }

    /// Recover `nick`, or the reserved nick when none is given.
    pub fn request_recover(
        &mut self,
        host: &dyn HostView,
        nick: Option<&str>,
        now: Instant,
    ) -> Result<Outbound> {
        self.ensure_enabled()?;
        if self.config.authority().is_none() {
            return Err(AgentError::ConfigurationIncomplete { missing: "authority" });
        }
        let target = match nick.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => self
                .config
                .reserved_nick()
                .ok_or(AgentError::ConfigurationIncomplete { missing: "reserved_nick" })?
                .to_string(),
        };
        if irc_eq(&target, host.current_nick()) {
            return Err(AgentError::RecoverSelf);
        }
        self.recover(host, &target, now)
    }

    /// Ask the authority to lift bans on us in `channel`.
    pub fn request_unban(&self, host: &dyn HostView, channel: &str) -> Result<Outbound> {
        self.ensure_enabled()?;
        self.authority_command(host, "unban", channel)
    }

    /// Ask the authority to invite us to `channel`.
    pub fn request_invite(&self, host: &dyn HostView, channel: &str) -> Result<Outbound> {
        self.ensure_enabled()?;
        self.authority_command(host, "invite", channel)
    }

    /// Ask for `grant` in a channel we're in and don't already have it.
    pub fn request_grant(
        &self,
        host: &dyn HostView,
        channel: &str,
        grant: Grant,
    ) -> Result<Outbound> {
        self.ensure_enabled()?;
        if !host.in_channel(channel) {
            return Err(AgentError::NotInChannel { channel: channel.to_string() });
        }
        if host.has_grant(channel, grant) {
            return Err(AgentError::AlreadyGranted {
                grant,
                channel: channel.to_string(),
            });
        }
        self.authority_command(host, grant.verb(), channel)
    }

    /// Replace the services credentials for this network. In memory only.
    pub fn register(&mut self, authority: &str, reserved_nick: &str, secret: &str) {
        info!(%authority, %reserved_nick, "Services credentials updated");
        self.config.authority = Some(authority.to_string());
        self.config.reserved_nick = Some(reserved_nick.to_string());
        self.config.secret = Some(secret.to_string());
        self.config.enabled = true;
        self.session.unstall();
    }

    /// The nick we identify for, if configured.
    pub fn regged(&self) -> Option<&str> {
        self.config.reserved_nick()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::config::ServicesConfig;
    use std::time::Duration;

    struct Host {
        nick: &'static str,
        opped: bool,
    }

    impl HostView for Host {
        fn current_nick(&self) -> &str {
            self.nick
        }

        fn network(&self) -> &str {
            "testnet"
        }

        fn past_handshake(&self) -> bool {
            true
        }

        fn is_online(&self, _nick: &str) -> bool {
            true
        }

        fn joined_channels(&self) -> Vec<String> {
            vec!["#chan".into()]
        }

        fn in_channel(&self, channel: &str) -> bool {
            channel == "#chan"
        }

        fn has_grant(&self, _channel: &str, grant: Grant) -> bool {
            self.opped && grant == Grant::Op
        }
    }

    fn configured() -> Agent {
        Agent::new(ServicesConfig {
            reserved_nick: Some("Bot".into()),
            secret: Some("hunter2".into()),
            authority: Some("Serv".into()),
            ..Default::default()
        })
    }

    fn text(out: &Outbound) -> &str {
        match &out.action {
            Action::Privmsg { text, .. } => text,
            other => panic!("expected privmsg, got {other:?}"),
        }
    }

    #[test]
    fn identify_uses_current_nick() {
        let mut agent = configured();
        let host = Host { nick: "Bot_", opped: false };
        let out = agent.request_identify(&host).unwrap();
        assert_eq!(text(&out), "LOGIN Bot_ hunter2");
    }

    #[test]
    fn identify_requires_credentials() {
        let mut agent = Agent::new(ServicesConfig {
            authority: Some("Serv".into()),
            ..Default::default()
        });
        let host = Host { nick: "Bot", opped: false };
        assert_eq!(
            agent.request_identify(&host),
            Err(AgentError::ConfigurationIncomplete { missing: "reserved_nick" })
        );
    }

    #[test]
    fn recover_refuses_self_and_throttles() {
        let mut agent = configured();
        let host = Host { nick: "Bot", opped: false };
        assert_eq!(
            agent.request_recover(&host, None, Instant::now()),
            Err(AgentError::RecoverSelf)
        );

        let host = Host { nick: "Bot_", opped: false };
        let t0 = Instant::now();
        let out = agent.request_recover(&host, None, t0).unwrap();
        assert_eq!(text(&out), "RECOVER Bot Bot hunter2");
        assert!(matches!(
            agent.request_recover(&host, Some("Other"), t0 + Duration::from_secs(5)),
            Err(AgentError::Throttled { .. })
        ));
    }

    #[test]
    fn grant_requests_check_membership_and_status() {
        let agent = configured();
        let host = Host { nick: "Bot", opped: true };
        assert_eq!(
            agent.request_grant(&host, "#chan", Grant::Op),
            Err(AgentError::AlreadyGranted { grant: Grant::Op, channel: "#chan".into() })
        );
        assert_eq!(
            agent.request_grant(&host, "#elsewhere", Grant::Voice),
            Err(AgentError::NotInChannel { channel: "#elsewhere".into() })
        );
        let out = agent.request_grant(&host, "#chan", Grant::Voice).unwrap();
        assert_eq!(text(&out), "voice #chan Bot");
    }

    #[test]
    fn unban_and_invite_need_authority() {
        let agent = Agent::new(ServicesConfig::default());
        let host = Host { nick: "Bot", opped: false };
        assert_eq!(
            agent.request_unban(&host, "#chan"),
            Err(AgentError::ConfigurationIncomplete { missing: "authority" })
        );

        let agent = configured();
        assert_eq!(text(&agent.request_invite(&host, "#chan").unwrap()), "invite #chan Bot");
    }

    #[test]
    fn register_sets_credentials() {
        let mut agent = Agent::new(ServicesConfig::default());
        assert_eq!(agent.regged(), None);
        agent.register("P@cservice.netgamers.org", "Bot", "s3cret");
        assert_eq!(agent.regged(), Some("Bot"));
        assert_eq!(agent.config().authority_nick(), Some("P"));
    }

    #[test]
    fn disabled_network_refuses_requests() {
        let mut agent = configured();
        agent.config.enabled = false;
        let host = Host { nick: "Bot", opped: false };
        assert_eq!(agent.request_identify(&host), Err(AgentError::Disabled));
    }
}

//! The identify → recover → re-identify state machine.
//!
//! [`Agent`] owns one network's [`Session`] and reacts to [`Inbound`] events
//! by returning the actions the host should send. It never blocks and never
//! sleeps; the recovery cooldown is a timestamp comparison against the `now`
//! the host passes in.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::action::{Action, Outbound};
use crate::classify::{self, ChannelOutcome, Classified, IdentityOutcome};
use crate::config::ServicesConfig;
use crate::error::{AgentError, Result};
use crate::event::{CannotJoinReason, Inbound};
use crate::gate;
use crate::host::HostView;
use crate::irc::irc_eq;
use crate::privileges::{self, authority_request};
use crate::session::{AuthState, Session};

/// Services agent for a single network.
#[derive(Debug)]
pub struct Agent {
    pub(crate) config: ServicesConfig,
    pub(crate) session: Session,
}

impl Agent {
    pub fn new(config: ServicesConfig) -> Self {
        Agent {
            config,
            session: Session::new(),
        }
    }

    pub fn config(&self) -> &ServicesConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> AuthState {
        self.session.state()
    }

    pub fn identified(&self) -> bool {
        self.session.identified()
    }

    /// Whether `nick` is the authority (host part of the address ignored).
    pub fn is_authority(&self, nick: &str) -> bool {
        self.config
            .authority_nick()
            .is_some_and(|authority| irc_eq(authority, nick))
    }

    /// Gate an outbound action the host is about to send.
    pub fn out_filter(&mut self, out: Outbound) -> Option<Outbound> {
        gate::out_filter(&self.config, &mut self.session, out)
    }

    /// Process one event and return what should be sent, in order.
    pub fn handle(&mut self, event: &Inbound, host: &dyn HostView, now: Instant) -> Vec<Outbound> {
        if !self.config.enabled {
            debug!(network = %host.network(), ?event, "Services handling disabled, ignoring event");
            return Vec::new();
        }

        let mut out = Vec::new();
        match event {
            Inbound::ConnectionEstablished => {
                debug!(network = %host.network(), "New connection, resetting services session");
                self.session.reset();
            }
            Inbound::Welcome => self.on_welcome(host, now, &mut out),
            Inbound::NickCollision { nick } => self.on_nick_collision(host, nick, now, &mut out),
            Inbound::NickChanged { old, new } => self.on_nick_changed(host, old, new, &mut out),
            Inbound::Tick => self.on_tick(host, now, &mut out),
            Inbound::Notice { from, text } => self.on_notice(host, from, text, now, &mut out),
            Inbound::Invited { by, channel } => {
                if self.is_authority(by) {
                    info!(network = %host.network(), %channel, "Joining, invited by authority");
                    out.push(Outbound::queued(Action::Join { channel: channel.clone() }));
                }
            }
            Inbound::CannotJoin { channel, reason } => {
                self.on_cannot_join(host, channel, *reason, &mut out)
            }
            Inbound::ModeChanged { actor, channel, mode, target } => {
                privileges::observe_mode(&self.config, host, actor, channel, mode, target);
            }
            Inbound::NamesEnd { channel } => {
                if self.session.identified() {
                    out.extend(privileges::check_privileges(&self.config, host, channel));
                }
            }
        }

        out.into_iter().filter_map(|o| self.out_filter(o)).collect()
    }

    fn on_welcome(&mut self, host: &dyn HostView, now: Instant, out: &mut Vec<Outbound>) {
        let missing = if self.config.reserved_nick().is_none() {
            Some("reserved_nick")
        } else if self.config.authority().is_none() {
            Some("authority")
        } else if self.config.secret().is_none() {
            Some("secret")
        } else {
            None
        };
        if let Some(missing) = missing {
            let err = AgentError::ConfigurationIncomplete { missing };
            warn!(network = %host.network(), "Cannot identify: {err}");
            self.session.stall();
            return;
        }
        let Some(reserved) = self.config.reserved_nick().map(str::to_string) else {
            return;
        };

        let current = host.current_nick().to_string();
        if irc_eq(&current, &reserved) || !self.config.use_reserved_nick {
            self.try_identify(host, &current, out);
        } else {
            self.try_recover(host, &reserved, now, out);
        }
    }

    fn on_nick_collision(
        &mut self,
        host: &dyn HostView,
        nick: &str,
        now: Instant,
        out: &mut Vec<Outbound>,
    ) {
        let Some(reserved) = self.config.reserved_nick().map(str::to_string) else {
            return;
        };
        debug!(network = %host.network(), %nick, "Nick in use");
        self.try_recover(host, &reserved, now, out);
    }

    fn on_nick_changed(
        &mut self,
        host: &dyn HostView,
        old: &str,
        new: &str,
        out: &mut Vec<Outbound>,
    ) {
        let Some(reserved) = self.config.reserved_nick().map(str::to_string) else {
            return;
        };
        if irc_eq(new, host.current_nick()) && irc_eq(new, &reserved) {
            if host.past_handshake() {
                self.try_identify(host, new, out);
            }
        } else if irc_eq(old, &reserved) {
            info!(network = %host.network(), %reserved, "Reserved nick released, requesting it");
            out.push(Outbound::now(Action::Nick { nick: reserved }));
        }
    }

    /// Re-evaluate from scratch whether we should be reclaiming the reserved nick.
    fn on_tick(&mut self, host: &dyn HostView, now: Instant, out: &mut Vec<Outbound>) {
        let (Some(reserved), Some(_), Some(_)) = (
            self.config.reserved_nick(),
            self.config.authority(),
            self.config.secret(),
        ) else {
            return;
        };
        if self.session.stalled()
            || !self.config.use_reserved_nick
            || irc_eq(reserved, host.current_nick())
            || !host.past_handshake()
            || self
                .session
                .recovery_wait(now, self.config.recovery_cooldown())
                .is_some()
        {
            return;
        }

        let reserved = reserved.to_string();
        if host.is_online(&reserved) {
            self.try_recover(host, &reserved, now, out);
        } else {
            debug!(network = %host.network(), %reserved, "Reserved nick looks free, requesting it");
            out.push(Outbound::now(Action::Nick { nick: reserved }));
        }
    }

    fn on_notice(
        &mut self,
        host: &dyn HostView,
        from: &str,
        text: &str,
        now: Instant,
        out: &mut Vec<Outbound>,
    ) {
        if !host.past_handshake() || !self.is_authority(from) {
            return;
        }
        let reserved = self.config.reserved_nick().unwrap_or_default().to_string();
        match classify::classify_notice(text, &reserved) {
            Classified::Channel { outcome, channel } => {
                self.on_channel_notice(host, outcome, channel, out)
            }
            Classified::Identity(outcome) => {
                self.on_identity_notice(host, outcome, &reserved, now, out)
            }
            Classified::Unrecognized => {
                let err = AgentError::Unclassified {
                    text: classify::normalize(text),
                };
                warn!(network = %host.network(), "{err}");
            }
        }
    }

    fn on_identity_notice(
        &mut self,
        host: &dyn HostView,
        outcome: IdentityOutcome,
        reserved: &str,
        now: Instant,
        out: &mut Vec<Outbound>,
    ) {
        let network = host.network();
        match outcome {
            IdentityOutcome::Rejected => {
                warn!(%network, "{}", AgentError::AuthorityRejected);
                // Backoff only; no recovery was actually sent.
                self.session.mark_recovery(now);
            }
            IdentityOutcome::Recovered => {
                info!(%network, "Recovery succeeded");
                self.session.clear_recovery();
                self.session.set_state(AuthState::Fresh);
                if !reserved.is_empty() {
                    out.push(Outbound::queued(Action::Nick { nick: reserved.to_string() }));
                }
            }
            IdentityOutcome::NotRegistered => {
                info!(%network, "Authority says nick is not registered");
            }
            IdentityOutcome::NotOnline => {
                info!(%network, "Reserved nick is not online, taking it");
                self.session.clear_recovery();
                if self.session.state() == AuthState::AwaitingRecovery {
                    self.session.set_state(AuthState::Fresh);
                }
                if !reserved.is_empty() {
                    out.push(Outbound::queued(Action::Nick { nick: reserved.to_string() }));
                }
            }
            IdentityOutcome::Owned => {
                info!(%network, "Authority says nick is registered");
            }
            IdentityOutcome::Accepted => self.on_accepted(host, out),
            IdentityOutcome::Motd => {
                debug!(%network, "Ignoring authority MOTD");
            }
            IdentityOutcome::Unrecognized => {}
        }
    }

    fn on_accepted(&mut self, host: &dyn HostView, out: &mut Vec<Outbound>) {
        if self.session.identified() {
            debug!(network = %host.network(), "Already identified, ignoring repeated confirmation");
            return;
        }
        info!(network = %host.network(), "Identified with authority");
        self.session.set_state(AuthState::Identified);
        self.session.clear_recovery();

        for channel in host.joined_channels() {
            out.extend(privileges::check_privileges(&self.config, host, &channel));
        }
        for channel in self.session.take_pending_channels() {
            out.push(Outbound::queued(Action::Join { channel }));
        }
        out.extend(gate::release(&mut self.session));
    }

    fn on_channel_notice(
        &mut self,
        host: &dyn HostView,
        outcome: ChannelOutcome,
        channel: Option<String>,
        out: &mut Vec<Outbound>,
    ) {
        let network = host.network();
        let chan = channel.as_deref().unwrap_or("?");
        match outcome {
            ChannelOutcome::AllUnbanned => {
                info!(%network, channel = %chan, "Unbanned by authority");
                if let Some(channel) = channel {
                    out.push(Outbound::now(Action::Join { channel }));
                }
            }
            ChannelOutcome::NotRegistered => {
                warn!(%network, channel = %chan, "Authority says channel isn't registered");
            }
            ChannelOutcome::AlreadyRegistered => {
                debug!(%network, channel = %chan, "Authority says channel is registered");
            }
            ChannelOutcome::AlreadyGranted => {
                debug!(%network, channel = %chan, "Authority says we already have status");
            }
            ChannelOutcome::AccessRequired => {
                warn!(%network, channel = %chan, "Authority says an access level is required");
            }
            ChannelOutcome::InsufficientAccess => {
                warn!(%network, channel = %chan, "Authority says our access is insufficient");
            }
            ChannelOutcome::Inviting => {
                debug!(%network, channel = %chan, "Authority is inviting us");
            }
            ChannelOutcome::Unrecognized => {}
        }
    }

    fn on_cannot_join(
        &mut self,
        host: &dyn HostView,
        channel: &str,
        reason: CannotJoinReason,
        out: &mut Vec<Outbound>,
    ) {
        let network = host.network();
        let verb = match reason {
            CannotJoinReason::Banned => {
                info!(%network, %channel, "Banned, asking authority to unban");
                "unban"
            }
            CannotJoinReason::InviteOnly => {
                info!(%network, %channel, "Channel is invite only, asking authority for an invite");
                "invite"
            }
            CannotJoinReason::Keyed => {
                info!(%network, %channel, "Channel is keyed, asking authority for an invite");
                "invite"
            }
            CannotJoinReason::RegisteredOnly => {
                if self.session.add_pending_channel(channel) {
                    info!(
                        %network,
                        %channel,
                        "Channel requires identification, will rejoin once identified"
                    );
                }
                return;
            }
        };
        match self.authority_command(host, verb, channel) {
            Ok(o) => out.push(o),
            Err(err) => warn!(%network, %channel, "Cannot send {verb}: {err}"),
        }
    }

    /// `"<verb> <channel> <current nick>"` to the authority.
    pub(crate) fn authority_command(
        &self,
        host: &dyn HostView,
        verb: &str,
        channel: &str,
    ) -> Result<Outbound> {
        let authority = self
            .config
            .authority()
            .ok_or(AgentError::ConfigurationIncomplete { missing: "authority" })?;
        Ok(authority_request(authority, verb, channel, host.current_nick()))
    }

    fn try_identify(&mut self, host: &dyn HostView, nick: &str, out: &mut Vec<Outbound>) {
        match self.identify(host, nick) {
            Ok(o) => out.push(o),
            Err(err) => warn!(network = %host.network(), "Not identifying: {err}"),
        }
    }

    fn try_recover(
        &mut self,
        host: &dyn HostView,
        target: &str,
        now: Instant,
        out: &mut Vec<Outbound>,
    ) {
        match self.recover(host, target, now) {
            Ok(o) => out.push(o),
            Err(err) => warn!(network = %host.network(), "Not recovering: {err}"),
        }
    }

    /// Build the identify message for `nick`. Always `Delivery::Now` so it
    /// goes out ahead of any joins queued on the same connection.
    pub(crate) fn identify(&mut self, host: &dyn HostView, nick: &str) -> Result<Outbound> {
        let authority = self
            .config
            .authority()
            .ok_or(AgentError::ConfigurationIncomplete { missing: "authority" })?;
        let secret = self
            .config
            .secret()
            .ok_or(AgentError::ConfigurationIncomplete { missing: "secret" })?;
        if nick.trim().is_empty() {
            return Err(AgentError::ConfigurationIncomplete { missing: "nick" });
        }

        info!(network = %host.network(), current = %host.current_nick(), "Sending identify");
        let text = self.config.render_identify(nick, secret);
        let msg = Outbound::privmsg(authority, text);
        if !self.session.identified() {
            self.session.set_state(AuthState::Identifying);
        }
        Ok(msg)
    }

    /// Build the recovery message for `target`, subject to the cooldown.
    pub(crate) fn recover(
        &mut self,
        host: &dyn HostView,
        target: &str,
        now: Instant,
    ) -> Result<Outbound> {
        let authority = self
            .config
            .authority()
            .ok_or(AgentError::ConfigurationIncomplete { missing: "authority" })?;
        let secret = self
            .config
            .secret()
            .ok_or(AgentError::ConfigurationIncomplete { missing: "secret" })?;
        let cooldown = self.config.recovery_cooldown();
        if let Some(remaining) = self.session.recovery_wait(now, cooldown) {
            return Err(AgentError::Throttled { cooldown, remaining });
        }

        info!(
            network = %host.network(),
            current = %host.current_nick(),
            %target,
            "Sending recover"
        );
        let msg = Outbound::privmsg(authority, self.config.render_recover(target, secret));
        self.session.mark_recovery(now);
        self.session.set_state(AuthState::AwaitingRecovery);
        Ok(msg)
    }
}

//! Per-connection services state.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::action::Outbound;
use crate::irc::irc_eq;

/// Where the identify/recover cycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Nothing sent yet on this connection (or a recovery just finished).
    Fresh,
    /// Identify sent, waiting for the authority's answer.
    Identifying,
    /// Recovery sent, waiting for the nick to be released.
    AwaitingRecovery,
    /// The authority confirmed identification.
    Identified,
}

/// Mutable state for one network connection. Reset on every new connection.
#[derive(Debug)]
pub struct Session {
    state: AuthState,
    last_recovery_at: Option<Instant>,
    pending_invited_channels: Vec<String>,
    queued_joins: VecDeque<Outbound>,
    /// Set when the welcome event found credentials missing; no further
    /// automatic action happens on this connection.
    stalled: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Session {
            state: AuthState::Fresh,
            last_recovery_at: None,
            pending_invited_channels: Vec::new(),
            queued_joins: VecDeque::new(),
            stalled: false,
        }
    }

    /// Start over for a new connection.
    pub fn reset(&mut self) {
        *self = Session::new();
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn set_state(&mut self, state: AuthState) {
        self.state = state;
    }

    pub fn identified(&self) -> bool {
        self.state == AuthState::Identified
    }

    pub fn stalled(&self) -> bool {
        self.stalled
    }

    pub fn stall(&mut self) {
        self.stalled = true;
    }

    pub fn unstall(&mut self) {
        self.stalled = false;
    }

    pub fn last_recovery_at(&self) -> Option<Instant> {
        self.last_recovery_at
    }

    /// Time left before another recovery may be sent, or `None` if one may go now.
    pub fn recovery_wait(&self, now: Instant, cooldown: Duration) -> Option<Duration> {
        let sent = self.last_recovery_at?;
        let ready_at = sent + cooldown;
        if now >= ready_at {
            None
        } else {
            Some(ready_at - now)
        }
    }

    /// Start the cooldown window at `now`.
    pub fn mark_recovery(&mut self, now: Instant) {
        self.last_recovery_at = Some(now);
    }

    pub fn clear_recovery(&mut self) {
        self.last_recovery_at = None;
    }

    /// Remember a channel we could not join until identified. Duplicates are ignored.
    pub fn add_pending_channel(&mut self, channel: &str) -> bool {
        if self.pending_invited_channels.iter().any(|c| irc_eq(c, channel)) {
            return false;
        }
        self.pending_invited_channels.push(channel.to_string());
        true
    }

    pub fn pending_channels(&self) -> &[String] {
        &self.pending_invited_channels
    }

    pub fn take_pending_channels(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_invited_channels)
    }

    pub fn queue_join(&mut self, join: Outbound) {
        self.queued_joins.push_back(join);
    }

    pub fn queued_joins(&self) -> impl Iterator<Item = &Outbound> {
        self.queued_joins.iter()
    }

    /// Drain withheld joins in the order they were queued.
    pub fn take_queued_joins(&mut self) -> Vec<Outbound> {
        self.queued_joins.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;

    #[test]
    fn cooldown_window() {
        let mut session = Session::new();
        let t0 = Instant::now();
        let cooldown = Duration::from_secs(60);
        assert_eq!(session.recovery_wait(t0, cooldown), None);

        session.mark_recovery(t0);
        assert_eq!(
            session.recovery_wait(t0 + Duration::from_secs(10), cooldown),
            Some(Duration::from_secs(50))
        );
        assert_eq!(session.recovery_wait(t0 + cooldown, cooldown), None);

        session.clear_recovery();
        assert_eq!(session.recovery_wait(t0, cooldown), None);
    }

    #[test]
    fn pending_channels_dedupe() {
        let mut session = Session::new();
        assert!(session.add_pending_channel("#Lobby"));
        assert!(!session.add_pending_channel("#lobby"));
        assert!(session.add_pending_channel("#dev"));
        assert_eq!(session.take_pending_channels(), vec!["#Lobby", "#dev"]);
        assert!(session.pending_channels().is_empty());
    }

    #[test]
    fn queued_joins_fifo_and_reset() {
        let mut session = Session::new();
        for ch in ["#a", "#b", "#c"] {
            session.queue_join(Outbound::now(Action::Join { channel: ch.into() }));
        }
        let order: Vec<_> = session
            .take_queued_joins()
            .into_iter()
            .map(|o| match o.action {
                Action::Join { channel } => channel,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(order, vec!["#a", "#b", "#c"]);

        session.set_state(AuthState::Identified);
        session.mark_recovery(Instant::now());
        session.stall();
        session.reset();
        assert_eq!(session.state(), AuthState::Fresh);
        assert!(session.last_recovery_at().is_none());
        assert!(!session.stalled());
    }
}

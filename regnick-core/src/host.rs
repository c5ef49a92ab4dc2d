//! What the agent needs to know about the connection it serves.

use crate::privileges::Grant;

/// Read-only view of host connection state.
///
/// Implemented by [`crate::tracker::ConnectionState`] for hosts that feed
/// raw lines, or by any host that already tracks this itself.
pub trait HostView {
    /// Nick we are currently using.
    fn current_nick(&self) -> &str;

    /// Network name, for log context.
    fn network(&self) -> &str;

    /// Past the initial handshake (MOTD finished).
    fn past_handshake(&self) -> bool;

    /// Whether `nick` is visibly online.
    fn is_online(&self, nick: &str) -> bool;

    /// Channels we are currently in.
    fn joined_channels(&self) -> Vec<String>;

    /// Whether we are in `channel` at all.
    fn in_channel(&self, channel: &str) -> bool;

    /// Whether we hold `grant` in `channel`.
    fn has_grant(&self, channel: &str, grant: Grant) -> bool;
}

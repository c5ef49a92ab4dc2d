//! Normalized inbound events.
//!
//! Hosts translate whatever their connection layer produces into these
//! before handing them to [`crate::agent::Agent`]. Events for one network
//! must be delivered in arrival order.

/// Why a channel join was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CannotJoinReason {
    /// 474: banned.
    Banned,
    /// 473: invite only.
    InviteOnly,
    /// 475: wrong or missing key.
    Keyed,
    /// 515: only registered (identified) users may join.
    RegisteredOnly,
}

/// Events the agent reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Server accepted our registration (001). Starts a fresh session.
    ConnectionEstablished,

    /// Post-connection sequence finished (end of MOTD or no MOTD).
    Welcome,

    /// Our nick change was refused because the nick is in use.
    NickCollision { nick: String },

    /// Someone changed nick. When it was us, the host's current nick is
    /// already `new`.
    NickChanged { old: String, new: String },

    /// Fired once per inbound line while connected.
    Tick,

    /// A NOTICE addressed to us.
    Notice { from: String, text: String },

    /// We were invited to a channel.
    Invited { by: String, channel: String },

    /// A join we attempted was refused.
    CannotJoin {
        channel: String,
        reason: CannotJoinReason,
    },

    /// One mode letter changed on a channel member.
    ModeChanged {
        actor: String,
        channel: String,
        mode: String,
        target: String,
    },

    /// End of NAMES (366): we finished joining `channel`.
    NamesEnd { channel: String },
}

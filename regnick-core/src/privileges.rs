//! Asking the authority for channel status and noticing when it arrives.

use std::fmt;

use tracing::{debug, info};

use crate::action::Outbound;
use crate::config::ServicesConfig;
use crate::host::HostView;
use crate::irc::irc_eq;

/// Channel status the authority can hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grant {
    Op,
    Halfop,
    Voice,
}

impl Grant {
    pub const ALL: [Grant; 3] = [Grant::Op, Grant::Halfop, Grant::Voice];

    /// Word used in requests to the authority.
    pub fn verb(self) -> &'static str {
        match self {
            Grant::Op => "op",
            Grant::Halfop => "halfop",
            Grant::Voice => "voice",
        }
    }

    pub fn from_mode_letter(letter: char) -> Option<Grant> {
        match letter {
            'o' => Some(Grant::Op),
            'h' => Some(Grant::Halfop),
            'v' => Some(Grant::Voice),
            _ => None,
        }
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// `"<verb> <channel> <nick>"` addressed to the authority.
pub fn authority_request(authority: &str, verb: &str, channel: &str, nick: &str) -> Outbound {
    Outbound::privmsg(authority, format!("{verb} {channel} {nick}"))
}

/// Request every status `channel`'s policy wants and we don't yet have.
pub fn check_privileges(
    config: &ServicesConfig,
    host: &dyn HostView,
    channel: &str,
) -> Vec<Outbound> {
    let Some(authority) = config.authority() else {
        return Vec::new();
    };
    let policy = config.policy_for(channel);
    let nick = host.current_nick();

    Grant::ALL
        .into_iter()
        .filter(|grant| match grant {
            Grant::Op => policy.op,
            Grant::Halfop => policy.halfop,
            Grant::Voice => policy.voice,
        })
        .filter(|grant| !host.has_grant(channel, *grant))
        .map(|grant| {
            info!(network = %host.network(), %channel, %grant, %authority, "Requesting {grant}");
            authority_request(authority, grant.verb(), channel, nick)
        })
        .collect()
}

/// Log a grant made to us by the authority. Returns the grant when the
/// change was one; nothing else changes.
pub fn observe_mode(
    config: &ServicesConfig,
    host: &dyn HostView,
    actor: &str,
    channel: &str,
    mode: &str,
    target: &str,
) -> Option<Grant> {
    let authority = config.authority_nick()?;
    if !irc_eq(actor, authority) || !irc_eq(target, host.current_nick()) {
        return None;
    }
    let letter = mode.strip_prefix('+')?;
    let mut chars = letter.chars();
    let grant = Grant::from_mode_letter(chars.next()?)?;
    if chars.next().is_some() {
        debug!(network = %host.network(), %channel, %mode, "Ignoring compound mode string");
        return None;
    }
    info!(network = %host.network(), %channel, %grant, "Received {grant} from authority");
    Some(grant)
}

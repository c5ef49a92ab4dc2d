//! Failure taxonomy for the services agent.
//!
//! None of these are fatal to a connection. Automatic paths log them and
//! carry on; user-facing requests report them back to whoever asked.

use std::time::Duration;

use crate::privileges::Grant;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    /// A nick, authority or secret needed for the action is not set.
    #[error("services configuration incomplete: {missing} is not set")]
    ConfigurationIncomplete { missing: &'static str },

    /// A recovery was sent too recently.
    #[error("refusing to recover more than once every {cooldown:?} ({remaining:?} left)")]
    Throttled { cooldown: Duration, remaining: Duration },

    /// The authority refused our credentials.
    #[error("authority rejected our credentials")]
    AuthorityRejected,

    /// The authority said something we have no rule for.
    #[error("unrecognized notice from authority: {text:?}")]
    Unclassified { text: String },

    #[error("already have {grant} in {channel}")]
    AlreadyGranted { grant: Grant, channel: String },

    #[error("not in {channel}")]
    NotInChannel { channel: String },

    #[error("refusing to recover our own nick")]
    RecoverSelf,

    /// Services handling is switched off for this network.
    #[error("services handling is disabled on this network")]
    Disabled,
}

pub type Result<T> = std::result::Result<T, AgentError>;

//! Outbound actions produced by the agent.

use crate::irc::Message;

/// How urgently an action must go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Write immediately, ahead of anything queued.
    Now,
    /// Best effort through the host's paced queue; may be reordered
    /// relative to `Now` actions.
    Queued,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Privmsg { target: String, text: String },
    Nick { nick: String },
    Join { channel: String },
}

/// An action plus its delivery class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub action: Action,
    pub delivery: Delivery,
}

impl Outbound {
    pub fn now(action: Action) -> Self {
        Outbound { action, delivery: Delivery::Now }
    }

    pub fn queued(action: Action) -> Self {
        Outbound { action, delivery: Delivery::Queued }
    }

    pub fn privmsg(target: &str, text: impl Into<String>) -> Self {
        Self::now(Action::Privmsg {
            target: target.to_string(),
            text: text.into(),
        })
    }

    pub fn is_join(&self) -> bool {
        matches!(self.action, Action::Join { .. })
    }

    /// Render as an IRC protocol line (without CRLF).
    pub fn to_message(&self) -> Message {
        match &self.action {
            Action::Privmsg { target, text } => {
                Message::new("PRIVMSG", vec![target.clone(), text.clone()])
            }
            Action::Nick { nick } => Message::new("NICK", vec![nick.clone()]),
            Action::Join { channel } => Message::new("JOIN", vec![channel.clone()]),
        }
    }
}

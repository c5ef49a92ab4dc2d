//! Free-text notice classification.
//!
//! Services bots don't speak a structured protocol, so their notices are
//! matched against ordered keyword tables. The first matching rule wins;
//! the phrase tables below must stay in this order.

use std::sync::LazyLock;

use regex::Regex;


/// Meaning of a notice about our nick/identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityOutcome {
    /// Credentials were refused.
    Rejected,
    /// The session holding our nick was killed.
    Recovered,
    /// The nick is not registered with the authority.
    NotRegistered,
    /// The nick we asked about is not online.
    NotOnline,
    /// The nick is registered to someone (a warning that we must identify).
    Owned,
    /// We are identified.
    Accepted,
    /// Authority's message of the day.
    Motd,
    Unrecognized,
}

/// Meaning of a notice about a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOutcome {
    /// Bans matching us were lifted.
    AllUnbanned,
    /// The channel isn't registered.
    NotRegistered,
    AlreadyRegistered,
    /// We already hold the status we asked for.
    AlreadyGranted,
    /// A specific access level is needed.
    AccessRequired,
    InsufficientAccess,
    /// The authority is inviting us.
    Inviting,
    Unrecognized,
}

/// Combined result of routing a notice through both classifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Channel {
        outcome: ChannelOutcome,
        channel: Option<String>,
    },
    Identity(IdentityOutcome),
    Unrecognized,
}

const REJECTED: &[&str] = &[
    "incorrect",
    "denied",
    "authentication failed",
    "unable to authenticate",
];
const NOT_REGISTERED: &[&str] = &["is not registered", "don't know who"];
const OWNED: &[&str] = &[
    "owned by someone else",
    "registered and protected",
    "nick belongs to another user",
];
const ACCEPTED: &[&str] = &[
    "now recognized",
    "already identified",
    "password accepted",
    "now identified",
    "authentication successful",
    "already authenticated",
];

static FORMATTING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        concat!(
            r"\x03(?:\d{1,2}(?:,\d{1,2})?)?",
            r"|\x04(?:[0-9a-fA-F]{6}(?:,[0-9a-fA-F]{6})?)?",
            r"|[\x02\x0f\x11\x16\x1d\x1e\x1f]",
        ),
    )
    .expect("formatting pattern is valid")
});

static BOLD_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x02(.*?)\x02").expect("bold span pattern is valid"));

fn any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| text.contains(p))
}

/// Remove mIRC colour, bold, italic, underline, reverse and reset codes.
pub fn strip_formatting(text: &str) -> String {
    FORMATTING.replace_all(text, "").into_owned()
}

/// Lower-case and strip formatting, the form both classifiers expect.
pub fn normalize(text: &str) -> String {
    strip_formatting(&text.to_lowercase())
}

/// Find a channel name wrapped in bold control bytes. Must be given text
/// that still carries its formatting.
pub fn extract_channel(text: &str) -> Option<String> {
    BOLD_SPAN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| strip_formatting(m.as_str()).trim().to_string())
        .filter(|c| !c.is_empty())
}

/// Classify a normalized identity notice. `reserved_nick` is the nick we
/// try to hold; it takes part in recognizing ghost-kill confirmations.
pub fn classify_identity_notice(text: &str, reserved_nick: &str) -> IdentityOutcome {
    if any(text, REJECTED) {
        IdentityOutcome::Rejected
    } else if ghost_killed(text, reserved_nick) {
        IdentityOutcome::Recovered
    } else if any(text, NOT_REGISTERED) {
        IdentityOutcome::NotRegistered
    } else if (text.contains("currently") && text.contains("isn't")) || text.contains("is not") {
        IdentityOutcome::NotOnline
    } else if any(text, OWNED) {
        IdentityOutcome::Owned
    } else if any(text, ACCEPTED) {
        IdentityOutcome::Accepted
    } else if text.contains("motd") {
        IdentityOutcome::Motd
    } else {
        IdentityOutcome::Unrecognized
    }
}

fn ghost_killed(text: &str, reserved_nick: &str) -> bool {
    if !text.contains("killed") {
        return false;
    }
    // Same folding as `normalize`, so `[]\~` in the nick still match.
    let nick = reserved_nick.to_lowercase();
    text.contains("ghost") || (!nick.is_empty() && text.contains(&nick))
}

/// Classify a normalized channel notice.
pub fn classify_channel_notice(text: &str) -> ChannelOutcome {
    if text.contains("all bans") || text.contains("unbanned from") {
        ChannelOutcome::AllUnbanned
    } else if text.contains("isn't registered") {
        ChannelOutcome::NotRegistered
    } else if text.contains("this channel has been registered") {
        ChannelOutcome::AlreadyRegistered
    } else if text.contains("already opped") {
        ChannelOutcome::AlreadyGranted
    } else if text.contains("access level") && text.contains("is required") {
        ChannelOutcome::AccessRequired
    } else if text.contains("insufficient access") {
        ChannelOutcome::InsufficientAccess
    } else if text.contains("inviting") {
        ChannelOutcome::Inviting
    } else {
        ChannelOutcome::Unrecognized
    }
}

/// Route a raw notice from the authority: channel rules first, then
/// identity rules.
pub fn classify_notice(raw: &str, reserved_nick: &str) -> Classified {
    let lowered = raw.to_lowercase();
    let text = strip_formatting(&lowered);

    let outcome = classify_channel_notice(&text);
    if outcome != ChannelOutcome::Unrecognized {
        return Classified::Channel {
            outcome,
            channel: extract_channel(&lowered),
        };
    }

    match classify_identity_notice(&text, reserved_nick) {
        IdentityOutcome::Unrecognized => Classified::Unrecognized,
        outcome => Classified::Identity(outcome),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(text: &str) -> IdentityOutcome {
        classify_identity_notice(&normalize(text), "Bot")
    }

    #[test]
    fn accepted_phrases() {
        assert_eq!(
            identity("Password accepted - you are now identified."),
            IdentityOutcome::Accepted
        );
        assert_eq!(identity("You are already authenticated as Bot"), IdentityOutcome::Accepted);
        assert_eq!(identity("AUTHENTICATION SUCCESSFUL as Bot"), IdentityOutcome::Accepted);
    }

    #[test]
    fn owned_phrases() {
        assert_eq!(
            identity("Your nickname is now registered and protected."),
            IdentityOutcome::Owned
        );
        assert_eq!(identity("This nickname is owned by someone else"), IdentityOutcome::Owned);
    }

    #[test]
    fn recovered_needs_nick_or_ghost() {
        assert_eq!(
            identity("Ghost with your nickname has been killed."),
            IdentityOutcome::Recovered
        );
        assert_eq!(identity("User BOT has been killed by services"), IdentityOutcome::Recovered);
        assert_eq!(identity("Someone was killed"), IdentityOutcome::Unrecognized);
    }

    #[test]
    fn recovered_nick_with_bracket_characters() {
        assert_eq!(
            classify_notice("User Bot[1] has been killed", "Bot[1]"),
            Classified::Identity(IdentityOutcome::Recovered)
        );
        assert_eq!(
            classify_notice("User \x02Bot~Away\x02 has been killed", "bot~away"),
            Classified::Identity(IdentityOutcome::Recovered)
        );
    }

    #[test]
    fn rejection_wins_over_later_rules() {
        // "denied" appears alongside an acceptance phrase; rejection is first.
        assert_eq!(
            identity("Access denied, password accepted elsewhere"),
            IdentityOutcome::Rejected
        );
        assert_eq!(identity("Password incorrect."), IdentityOutcome::Rejected);
        assert_eq!(identity("Unable to authenticate"), IdentityOutcome::Rejected);
    }

    #[test]
    fn not_registered_before_not_online() {
        assert_eq!(identity("Nick Bot is not registered."), IdentityOutcome::NotRegistered);
        assert_eq!(identity("I don't know who Bot is."), IdentityOutcome::NotRegistered);
        assert_eq!(identity("Bot is not online."), IdentityOutcome::NotOnline);
        assert_eq!(identity("Bot isn't currently in use."), IdentityOutcome::NotOnline);
    }

    #[test]
    fn motd_and_unrecognized() {
        assert_eq!(identity("MOTD: welcome to services"), IdentityOutcome::Motd);
        assert_eq!(identity("Hello there"), IdentityOutcome::Unrecognized);
    }

    #[test]
    fn channel_phrases() {
        let c = |t: &str| classify_channel_notice(&normalize(t));
        assert_eq!(c("All bans matching you have been removed"), ChannelOutcome::AllUnbanned);
        assert_eq!(c("You have been unbanned from #x"), ChannelOutcome::AllUnbanned);
        assert_eq!(c("#x isn't registered."), ChannelOutcome::NotRegistered);
        assert_eq!(
            c("This channel has been registered with services"),
            ChannelOutcome::AlreadyRegistered
        );
        assert_eq!(c("You are already opped in #x"), ChannelOutcome::AlreadyGranted);
        assert_eq!(c("Access level 100 is required"), ChannelOutcome::AccessRequired);
        assert_eq!(c("Insufficient access"), ChannelOutcome::InsufficientAccess);
        assert_eq!(c("Inviting Bot to #x"), ChannelOutcome::Inviting);
        assert_eq!(c("Password accepted"), ChannelOutcome::Unrecognized);
    }

    #[test]
    fn strips_colours_and_bold() {
        assert_eq!(strip_formatting("\x0304,12red\x03 \x02bold\x02\x0f"), "red bold");
        assert_eq!(normalize("\x1fPassword\x1f ACCEPTED"), "password accepted");
    }

    #[test]
    fn extracts_bold_channel() {
        assert_eq!(
            extract_channel("you have been unbanned from \x02#lobby\x02."),
            Some("#lobby".to_string())
        );
        assert_eq!(extract_channel("no channel here"), None);
        assert_eq!(extract_channel("\x02\x02"), None);
    }

    #[test]
    fn routing_prefers_channel_rules() {
        let routed = classify_notice("You have been unbanned from \x02#Lobby\x02.", "Bot");
        assert_eq!(
            routed,
            Classified::Channel {
                outcome: ChannelOutcome::AllUnbanned,
                channel: Some("#lobby".to_string()),
            }
        );
        assert_eq!(
            classify_notice("\x02Password accepted\x02 - you are now identified.", "Bot"),
            Classified::Identity(IdentityOutcome::Accepted)
        );
        assert_eq!(classify_notice("Hello", "Bot"), Classified::Unrecognized);
    }
}

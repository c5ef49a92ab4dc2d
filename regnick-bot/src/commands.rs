//! Admin commands sent to the bot over IRC.
//!
//!   !identify                          — identify under the current nick
//!   !recover [nick]                    — recover a nick (default: the reserved nick)
//!   !unban [channel]                   — ask the authority to lift our bans
//!   !invite [channel]                  — ask the authority for an invite
//!   !op / !halfop / !voice [channel]   — ask for a channel grant
//!   !register <authority> <nick> <secret>   — set credentials (private only)
//!   !regged                            — show the reserved nick
//!
//! The channel argument defaults to the channel the command was sent in.

use std::time::Instant;

use regnick_core::irc::{irc_lower, is_channel_name};
use regnick_core::{Agent, Grant, HostView, Outbound};

/// A parsed admin command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Identify,
    Recover(Option<String>),
    Unban(Option<String>),
    Invite(Option<String>),
    Grant(Grant, Option<String>),
    Register { authority: String, nick: String, secret: String },
    Regged,
    Help,
}

/// What to send back after running a command.
#[derive(Debug, Default)]
pub struct CommandOutcome {
    pub reply: String,
    pub actions: Vec<Outbound>,
}

impl CommandOutcome {
    fn ok(reply: impl Into<String>, action: Outbound) -> Self {
        CommandOutcome { reply: reply.into(), actions: vec![action] }
    }

    fn say(reply: impl Into<String>) -> Self {
        CommandOutcome { reply: reply.into(), actions: Vec::new() }
    }
}

const USAGE: &str = "Commands: identify, recover [nick], unban [channel], invite [channel], \
op|halfop|voice [channel], register <authority> <nick> <secret>, regged";

pub(crate) const MISSING_CHANNEL: &str = "Error: give a channel name, or ask in the channel.";

/// Parse `text` if it starts with `prefix`. Unknown commands and bad
/// arguments come back as `Err(usage text)`.
pub fn parse(text: &str, prefix: &str) -> Option<Result<Command, String>> {
    let body = text.strip_prefix(prefix)?;
    let mut words = body.split_whitespace();
    let name = words.next()?.to_ascii_lowercase();
    let args: Vec<&str> = words.collect();
    let optional = |args: &[&str]| args.first().map(|s| s.to_string());

    let cmd = match (name.as_str(), args.len()) {
        ("identify", 0) => Command::Identify,
        ("recover" | "ghost", 0 | 1) => Command::Recover(optional(&args)),
        ("unban", 0 | 1) => Command::Unban(optional(&args)),
        ("invite", 0 | 1) => Command::Invite(optional(&args)),
        ("op", 0 | 1) => Command::Grant(Grant::Op, optional(&args)),
        ("halfop", 0 | 1) => Command::Grant(Grant::Halfop, optional(&args)),
        ("voice", 0 | 1) => Command::Grant(Grant::Voice, optional(&args)),
        ("register", 3) => Command::Register {
            authority: args[0].to_string(),
            nick: args[1].to_string(),
            secret: args[2].to_string(),
        },
        ("regged", 0) => Command::Regged,
        ("help", _) => Command::Help,
        ("register", _) => return Some(Err("Usage: register <authority> <nick> <secret>".into())),
        ("identify" | "regged", _) => return Some(Err(format!("Usage: {name}"))),
        ("recover" | "ghost", _) => return Some(Err("Usage: recover [nick]".into())),
        ("unban" | "invite" | "op" | "halfop" | "voice", _) => {
            return Some(Err(format!("Usage: {name} [channel]")));
        }
        _ => return None,
    };
    Some(Ok(cmd))
}

/// Run `cmd` for one network. `here` is the channel the command arrived in,
/// `None` for private messages.
pub fn run(
    cmd: Command,
    agent: &mut Agent,
    host: &dyn HostView,
    here: Option<&str>,
    now: Instant,
) -> CommandOutcome {
    let result = match cmd {
        Command::Help => return CommandOutcome::say(USAGE),
        Command::Regged => {
            return CommandOutcome::say(match agent.regged() {
                Some(nick) => format!("Registered nick on {}: {nick}", host.network()),
                None => format!("No registered nick configured on {}.", host.network()),
            });
        }
        Command::Register { authority, nick, secret } => {
            if here.is_some() {
                return CommandOutcome::say("Error: register only works in a private message.");
            }
            agent.register(&authority, &nick, &secret);
            return CommandOutcome::say(format!(
                "Services credentials for {} updated.",
                host.network()
            ));
        }
        Command::Identify => agent
            .request_identify(host)
            .map(|out| CommandOutcome::ok(format!("Identifying as {}.", host.current_nick()), out)),
        Command::Recover(nick) => agent
            .request_recover(host, nick.as_deref(), now)
            .map(|out| CommandOutcome::ok("Recovery requested.", out)),
        Command::Unban(channel) => {
            let Some(channel) = channel_arg(channel, here) else {
                return CommandOutcome::say(MISSING_CHANNEL);
            };
            agent
                .request_unban(host, &channel)
                .map(|out| CommandOutcome::ok(format!("Unban requested for {channel}."), out))
        }
        Command::Invite(channel) => {
            let Some(channel) = channel_arg(channel, here) else {
                return CommandOutcome::say(MISSING_CHANNEL);
            };
            agent
                .request_invite(host, &channel)
                .map(|out| CommandOutcome::ok(format!("Invite requested for {channel}."), out))
        }
        Command::Grant(grant, channel) => {
            let Some(channel) = channel_arg(channel, here) else {
                return CommandOutcome::say(MISSING_CHANNEL);
            };
            agent
                .request_grant(host, &channel, grant)
                .map(|out| CommandOutcome::ok(format!("Requested {grant} in {channel}."), out))
        }
    };
    result.unwrap_or_else(|e| CommandOutcome::say(format!("Error: {e}")))
}

fn channel_arg(given: Option<String>, here: Option<&str>) -> Option<String> {
    given
        .or_else(|| here.map(str::to_string))
        .filter(|channel| is_channel_name(channel))
}

/// Is the message source `prefix` (`nick!user@host`) one of `admins`?
pub fn is_admin(admins: &[String], prefix: &str) -> bool {
    admins.iter().any(|mask| {
        if mask.contains('!') || mask.contains('@') {
            wildcard_match(mask, prefix)
        } else {
            let nick = prefix.split('!').next().unwrap_or(prefix);
            wildcard_match(mask, nick)
        }
    })
}

/// `*` and `?` wildcards, IRC case-insensitive.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern = irc_lower(pattern);
    let text = irc_lower(text);
    matches_from(pattern.as_bytes(), text.as_bytes())
}

/// Greedy two-pointer match; on a mismatch, retry from the last `*` one
/// byte further along. Linear in practice, quadratic at worst.
fn matches_from(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some(b'*') => {
                star = Some((p, t));
                p += 1;
            }
            Some(&c) if c == b'?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    star = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

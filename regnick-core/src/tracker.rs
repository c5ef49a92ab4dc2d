//! Connection state followed from raw protocol lines.
//!
//! [`ConnectionState`] keeps just enough of the server's view (our nick,
//! channel membership, who holds op/halfop/voice) to answer [`HostView`]
//! queries, and turns each line into the agent's [`Inbound`] events.

use std::collections::HashMap;

use tracing::debug;

use crate::event::{CannotJoinReason, Inbound};
use crate::host::HostView;
use crate::irc::{Message, irc_eq, irc_lower, is_channel_name};
use crate::privileges::Grant;

#[derive(Debug, Clone, Default)]
struct Member {
    nick: String,
    op: bool,
    halfop: bool,
    voice: bool,
}

impl Member {
    fn new(nick: &str) -> Self {
        Member {
            nick: nick.to_string(),
            ..Default::default()
        }
    }

    fn set(&mut self, grant: Grant, on: bool) {
        match grant {
            Grant::Op => self.op = on,
            Grant::Halfop => self.halfop = on,
            Grant::Voice => self.voice = on,
        }
    }

    fn has(&self, grant: Grant) -> bool {
        match grant {
            Grant::Op => self.op,
            Grant::Halfop => self.halfop,
            Grant::Voice => self.voice,
        }
    }
}

#[derive(Debug, Clone)]
struct Channel {
    name: String,
    members: HashMap<String, Member>,
}

/// Tracked state of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    network: String,
    nick: String,
    registered: bool,
    past_handshake: bool,
    channels: HashMap<String, Channel>,
}

impl ConnectionState {
    /// `nick` is the nick we register with; the server may change it.
    pub fn new(network: &str, nick: &str) -> Self {
        ConnectionState {
            network: network.to_string(),
            nick: nick.to_string(),
            registered: false,
            past_handshake: false,
            channels: HashMap::new(),
        }
    }

    /// Server has accepted our registration (001 seen).
    pub fn registered(&self) -> bool {
        self.registered
    }

    /// Update state from one line and return the events it produces.
    /// Every line after registration ends with an [`Inbound::Tick`].
    pub fn ingest(&mut self, msg: &Message) -> Vec<Inbound> {
        let mut events = Vec::new();
        let source = msg.source_nick().unwrap_or_default().to_string();

        match msg.command.as_str() {
            // RPL_WELCOME
            "001" => {
                let nick = msg.param(0);
                if !nick.is_empty() {
                    self.nick = nick.to_string();
                }
                self.registered = true;
                self.past_handshake = false;
                self.channels.clear();
                events.push(Inbound::ConnectionEstablished);
            }
            // RPL_ENDOFMOTD, ERR_NOMOTD, and the MOTD-continuation some servers end with
            "376" | "422" | "377" => {
                if self.registered && !self.past_handshake {
                    self.past_handshake = true;
                    events.push(Inbound::Welcome);
                }
            }
            // ERR_NICKNAMEINUSE
            "433" => {
                if self.registered {
                    events.push(Inbound::NickCollision {
                        nick: msg.param(1).to_string(),
                    });
                }
            }
            "NICK" => {
                let new = msg.param(0).to_string();
                if source.is_empty() || new.is_empty() {
                    return events;
                }
                if irc_eq(&source, &self.nick) {
                    self.nick = new.clone();
                }
                self.rename(&source, &new);
                events.push(Inbound::NickChanged { old: source.clone(), new });
            }
            "JOIN" => {
                let channel = msg.param(0);
                if irc_eq(&source, &self.nick) {
                    self.channels.insert(
                        irc_lower(channel),
                        Channel {
                            name: channel.to_string(),
                            members: HashMap::new(),
                        },
                    );
                }
                if let Some(chan) = self.channels.get_mut(&irc_lower(channel)) {
                    chan.members.insert(irc_lower(&source), Member::new(&source));
                }
            }
            "PART" => self.leave(msg.param(0), &source),
            "KICK" => {
                let victim = msg.param(1).to_string();
                self.leave(msg.param(0), &victim);
            }
            "QUIT" => {
                let key = irc_lower(&source);
                for chan in self.channels.values_mut() {
                    chan.members.remove(&key);
                }
            }
            // RPL_NAMREPLY: <me> <symbol> <channel> :<names>
            "353" => {
                if let Some(chan) = self.channels.get_mut(&irc_lower(msg.param(2))) {
                    for entry in msg.param(3).split_whitespace() {
                        let member = parse_names_entry(entry);
                        chan.members.insert(irc_lower(&member.nick), member);
                    }
                }
            }
            // RPL_ENDOFNAMES
            "366" => {
                events.push(Inbound::NamesEnd {
                    channel: msg.param(1).to_string(),
                });
            }
            "MODE" => {
                let channel = msg.param(0).to_string();
                if is_channel_name(&channel) {
                    let actor = if source.is_empty() {
                        msg.prefix.clone().unwrap_or_default()
                    } else {
                        source.clone()
                    };
                    for (mode, target) in self.apply_modes(&channel, &msg.params[1..]) {
                        events.push(Inbound::ModeChanged {
                            actor: actor.clone(),
                            channel: channel.clone(),
                            mode,
                            target,
                        });
                    }
                }
            }
            "NOTICE" => {
                if self.registered && !source.is_empty() && irc_eq(msg.param(0), &self.nick) {
                    events.push(Inbound::Notice {
                        from: source.clone(),
                        text: msg.param(1).to_string(),
                    });
                }
            }
            "INVITE" => {
                events.push(Inbound::Invited {
                    by: source.clone(),
                    channel: msg.param(1).to_string(),
                });
            }
            "473" | "474" | "475" | "515" => {
                let reason = match msg.command.as_str() {
                    "473" => CannotJoinReason::InviteOnly,
                    "474" => CannotJoinReason::Banned,
                    "475" => CannotJoinReason::Keyed,
                    _ => CannotJoinReason::RegisteredOnly,
                };
                events.push(Inbound::CannotJoin {
                    channel: msg.param(1).to_string(),
                    reason,
                });
            }
            _ => {}
        }

        if self.registered {
            events.push(Inbound::Tick);
        }
        events
    }

    fn leave(&mut self, channel: &str, nick: &str) {
        let key = irc_lower(channel);
        if irc_eq(nick, &self.nick) {
            self.channels.remove(&key);
        } else if let Some(chan) = self.channels.get_mut(&key) {
            chan.members.remove(&irc_lower(nick));
        }
    }

    fn rename(&mut self, old: &str, new: &str) {
        let old_key = irc_lower(old);
        for chan in self.channels.values_mut() {
            if let Some(mut member) = chan.members.remove(&old_key) {
                member.nick = new.to_string();
                chan.members.insert(irc_lower(new), member);
            }
        }
    }

    /// Apply a channel mode change, returning the `(±letter, nick)` pairs
    /// that granted or removed member status.
    fn apply_modes(&mut self, channel: &str, args: &[String]) -> Vec<(String, String)> {
        let Some((modes, params)) = args.split_first() else {
            return Vec::new();
        };
        let mut params = params.iter();
        let mut changes = Vec::new();
        let mut adding = true;

        for letter in modes.chars() {
            match letter {
                '+' => adding = true,
                '-' => adding = false,
                'o' | 'h' | 'v' => {
                    let Some(target) = params.next() else {
                        debug!(%channel, %modes, "Mode change missing its nick argument");
                        break;
                    };
                    if let Some(grant) = Grant::from_mode_letter(letter)
                        && let Some(chan) = self.channels.get_mut(&irc_lower(channel))
                        && let Some(member) = chan.members.get_mut(&irc_lower(target))
                    {
                        member.set(grant, adding);
                    }
                    let sign = if adding { '+' } else { '-' };
                    changes.push((format!("{sign}{letter}"), target.clone()));
                }
                // List and key modes always carry an argument.
                'b' | 'e' | 'I' | 'k' | 'q' | 'a' => {
                    params.next();
                }
                'l' | 'j' | 'f' if adding => {
                    params.next();
                }
                _ => {}
            }
        }
        changes
    }
}

/// Split `@+nick` style NAMES entries into a member with its status.
fn parse_names_entry(entry: &str) -> Member {
    let nick = entry.trim_start_matches(['~', '&', '@', '%', '+']);
    let prefixes = &entry[..entry.len() - nick.len()];
    let mut member = Member::new(nick);
    member.op = prefixes.contains('@') || prefixes.contains('&') || prefixes.contains('~');
    member.halfop = prefixes.contains('%');
    member.voice = prefixes.contains('+');
    member
}

impl HostView for ConnectionState {
    fn current_nick(&self) -> &str {
        &self.nick
    }

    fn network(&self) -> &str {
        &self.network
    }

    fn past_handshake(&self) -> bool {
        self.past_handshake
    }

    fn is_online(&self, nick: &str) -> bool {
        if irc_eq(nick, &self.nick) {
            return true;
        }
        let key = irc_lower(nick);
        self.channels.values().any(|c| c.members.contains_key(&key))
    }

    fn joined_channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.values().map(|c| c.name.clone()).collect();
        names.sort();
        names
    }

    fn in_channel(&self, channel: &str) -> bool {
        self.channels.contains_key(&irc_lower(channel))
    }

    fn has_grant(&self, channel: &str, grant: Grant) -> bool {
        self.channels
            .get(&irc_lower(channel))
            .and_then(|c| c.members.get(&irc_lower(&self.nick)))
            .is_some_and(|m| m.has(grant))
    }
}

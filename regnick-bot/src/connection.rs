//! One network connection: TCP/TLS setup, the read loop, paced output and
//! reconnection.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;
use tracing::{debug, info, warn};

use regnick_core::irc::{Message, irc_eq, is_channel_name};
use regnick_core::{Action, Agent, ConnectionState, Delivery, HostView, Inbound, Outbound};

use crate::commands;
use crate::config::NetworkConfig;

/// Gap between two lines from the paced queue.
pub const PACE: Duration = Duration::from_millis(500);
const PING_INTERVAL: Duration = Duration::from_secs(90);
const PING_TIMEOUT: Duration = Duration::from_secs(180);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// A connection that lasted this long resets the reconnect backoff.
const STABLE_AFTER: Duration = Duration::from_secs(60);

/// Who may run admin commands, and how they prefix them.
#[derive(Debug, Clone)]
pub struct AdminSettings {
    pub admins: Vec<String>,
    pub prefix: String,
}

/// Next reconnect delay: 2 → 4 → 8 → 16 → 30 s.
pub fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

/// Keep one network connected forever.
///
/// The [`Agent`] outlives individual connections so credentials set with
/// `register` survive a reconnect; its session is reset on every welcome.
pub async fn run_network(net: NetworkConfig, admin: Arc<AdminSettings>) {
    let mut agent = Agent::new(net.services.clone());
    let mut backoff = Duration::from_secs(2);

    loop {
        let started = Instant::now();
        match connect_and_run(&net, &admin, &mut agent).await {
            Ok(()) => info!(network = %net.name, "Connection closed"),
            Err(e) => warn!(network = %net.name, error = %e, "Connection failed"),
        }
        if started.elapsed() >= STABLE_AFTER {
            backoff = Duration::from_secs(2);
        }
        info!(network = %net.name, delay = ?backoff, "Reconnecting");
        tokio::time::sleep(backoff).await;
        backoff = next_backoff(backoff);
    }
}

async fn connect_and_run(
    net: &NetworkConfig,
    admin: &AdminSettings,
    agent: &mut Agent,
) -> Result<()> {
    match establish_connection(net).await? {
        Transport::Plain(tcp) => {
            let (reader, writer) = tokio::io::split(tcp);
            run_session(BufReader::new(reader), writer, net, admin, agent).await
        }
        Transport::Tls(tls) => {
            let (reader, writer) = tokio::io::split(*tls);
            run_session(BufReader::new(reader), writer, net, admin, agent).await
        }
    }
}

/// A connected socket that hasn't started IRC registration yet.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

pub async fn establish_connection(net: &NetworkConfig) -> Result<Transport> {
    let mode = if net.use_tls() { "TLS" } else { "plain" };
    debug!(network = %net.name, "Resolving {}...", net.server);
    let tcp = TcpStream::connect(&net.server)
        .await
        .map_err(|e| anyhow!("TCP connect to {} failed: {e}", net.server))?;
    debug!(network = %net.name, "TCP connected to {} ({mode})", net.server);

    if !net.use_tls() {
        return Ok(Transport::Plain(tcp));
    }
    let connector = TlsConnector::from(Arc::new(rustls_config()));
    let dns_name = rustls::pki_types::ServerName::try_from(net.host().to_string())?;
    let tls = connector
        .connect(dns_name, tcp)
        .await
        .map_err(|e| anyhow!("TLS handshake with {} failed: {e}", net.server))?;
    debug!(network = %net.name, "TLS handshake complete");
    Ok(Transport::Tls(Box::new(tls)))
}

fn rustls_config() -> rustls::ClientConfig {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

/// Splits agent output into lines to write now and a paced backlog.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<Message>,
}

impl Outbox {
    /// Returns the line if it must be written immediately.
    pub fn route(&mut self, out: Outbound) -> Option<Message> {
        let msg = out.to_message();
        match out.delivery {
            Delivery::Now => Some(msg),
            Delivery::Queued => {
                self.queue.push_back(msg);
                None
            }
        }
    }

    /// Next paced line, if any.
    pub fn next_queued(&mut self) -> Option<Message> {
        self.queue.pop_front()
    }
}

/// Log a line without leaking message bodies; PRIVMSGs to the authority
/// carry the secret.
fn describe(msg: &Message) -> String {
    match msg.command.as_str() {
        "PRIVMSG" | "NOTICE" => format!(
            "{} {} ({} bytes)",
            msg.command,
            msg.param(0),
            msg.param(1).len()
        ),
        _ => msg.to_string(),
    }
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, network: &str, msg: &Message) -> Result<()> {
    debug!(network, line = %describe(msg), "->");
    writer.write_all(format!("{msg}\r\n").as_bytes()).await?;
    Ok(())
}

/// Drive one registered connection until it drops.
pub async fn run_session<R, W>(
    reader: R,
    mut writer: W,
    net: &NetworkConfig,
    admin: &AdminSettings,
    agent: &mut Agent,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let network = net.name.as_str();
    send(&mut writer, network, &Message::new("NICK", vec![net.nick.clone()])).await?;
    send(
        &mut writer,
        network,
        &Message::new(
            "USER",
            vec![net.user().to_string(), "0".into(), "*".into(), net.realname().to_string()],
        ),
    )
    .await?;

    let mut state = ConnectionState::new(network, &net.nick);
    let mut outbox = Outbox::default();
    let mut nick_tries: u32 = 0;
    let mut incoming = reader.lines();
    let mut last_activity = Instant::now();
    let mut ping_sent = false;
    let mut pace = tokio::time::interval_at(Instant::now() + PACE, PACE);

    loop {
        tokio::select! {
            // next_line is cancel safe; a partial line survives a pace tick.
            result = incoming.next_line() => {
                let Some(line) = result? else {
                    return Ok(());
                };
                last_activity = Instant::now();
                ping_sent = false;
                let Some(msg) = Message::parse(&line) else {
                    continue;
                };

                match msg.command.as_str() {
                    "PING" => {
                        let pong = Message::new("PONG", msg.params.clone());
                        send(&mut writer, network, &pong).await?;
                        continue;
                    }
                    "ERROR" => bail!("server closed the link: {}", msg.param(0)),
                    // Nick taken while registering; after 001 the agent deals with it.
                    "433" if !state.registered() => {
                        nick_tries += 1;
                        if nick_tries > 5 {
                            bail!("no free nick after {nick_tries} tries");
                        }
                        let alt = format!("{}{}", net.nick, "_".repeat(nick_tries as usize));
                        send(&mut writer, network, &Message::new("NICK", vec![alt])).await?;
                        continue;
                    }
                    _ => {}
                }

                let mut outgoing = Vec::new();
                let now = std::time::Instant::now();
                for event in state.ingest(&msg) {
                    outgoing.extend(agent.handle(&event, &state, now));
                    if event == Inbound::Welcome {
                        info!(network, nick = %state.current_nick(), "Connected");
                        outgoing.extend(autojoins(net, agent));
                    }
                }
                if msg.command == "PRIVMSG"
                    && let Some(outcome) = admin_command(&msg, admin, agent, &state, now)
                {
                    outgoing.extend(outcome);
                }
                for out in outgoing {
                    if let Some(line) = outbox.route(out) {
                        send(&mut writer, network, &line).await?;
                    }
                }
            }
            _ = pace.tick() => {
                if let Some(line) = outbox.next_queued() {
                    send(&mut writer, network, &line).await?;
                }
                let idle = last_activity.elapsed();
                if idle >= PING_TIMEOUT {
                    bail!("no data from server for {}s", idle.as_secs());
                }
                if idle >= PING_INTERVAL && !ping_sent {
                    let ping = Message::new("PING", vec![network.to_string()]);
                    send(&mut writer, network, &ping).await?;
                    ping_sent = true;
                }
            }
        }
    }
}

/// Configured channels, each passed through the join gate.
fn autojoins(net: &NetworkConfig, agent: &mut Agent) -> Vec<Outbound> {
    net.channels
        .iter()
        .filter(|c| is_channel_name(c))
        .filter_map(|channel| {
            agent.out_filter(Outbound::queued(Action::Join {
                channel: channel.clone(),
            }))
        })
        .collect()
}

/// Run an admin command if `msg` is one, returning the reply plus any
/// actions it produced.
fn admin_command(
    msg: &Message,
    admin: &AdminSettings,
    agent: &mut Agent,
    state: &ConnectionState,
    now: std::time::Instant,
) -> Option<Vec<Outbound>> {
    let target = msg.param(0);
    let here = is_channel_name(target).then_some(target);
    if here.is_none() && !irc_eq(target, state.current_nick()) {
        return None;
    }
    let sender = msg.source_nick()?;
    let parsed = commands::parse(msg.param(1), &admin.prefix)?;
    let prefix = msg.prefix.as_deref().unwrap_or_default();
    if !commands::is_admin(&admin.admins, prefix) {
        warn!(network = %state.network(), from = %prefix, "Ignoring command from non-admin");
        return None;
    }
    let cmd = match parsed {
        Ok(cmd) => cmd,
        Err(usage) => return Some(vec![Outbound::privmsg(here.unwrap_or(sender), usage)]),
    };
    info!(network = %state.network(), from = %sender, command = cmd_name(&cmd), "Admin command");

    let outcome = commands::run(cmd, agent, state, here, now);
    let mut lines = Vec::with_capacity(outcome.actions.len() + 1);
    lines.extend(outcome.actions.into_iter().filter_map(|out| agent.out_filter(out)));
    lines.push(Outbound::privmsg(here.unwrap_or(sender), outcome.reply));
    Some(lines)
}

/// Command name for logs; `register` arguments include the secret.
fn cmd_name(cmd: &commands::Command) -> &'static str {
    use commands::Command::*;
    match cmd {
        Identify => "identify",
        Recover(_) => "recover",
        Unban(_) => "unban",
        Invite(_) => "invite",
        Grant(..) => "grant",
        Register { .. } => "register",
        Regged => "regged",
        Help => "help",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regnick_core::ServicesConfig;

    #[test]
    fn backoff_doubles_to_cap() {
        let mut delay = Duration::from_secs(2);
        let mut seen = vec![delay.as_secs()];
        for _ in 0..5 {
            delay = next_backoff(delay);
            seen.push(delay.as_secs());
        }
        assert_eq!(seen, vec![2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn outbox_paces_queued_lines() {
        let mut outbox = Outbox::default();
        let now = outbox.route(Outbound::privmsg("Serv", "LOGIN Bot pw"));
        assert_eq!(now.map(|m| m.command), Some("PRIVMSG".to_string()));

        assert!(outbox.route(Outbound::queued(Action::Join { channel: "#a".into() })).is_none());
        assert!(outbox.route(Outbound::queued(Action::Nick { nick: "Bot".into() })).is_none());
        assert_eq!(outbox.next_queued().map(|m| m.to_string()), Some("JOIN #a".to_string()));
        assert_eq!(outbox.next_queued().map(|m| m.to_string()), Some("NICK Bot".to_string()));
        assert!(outbox.next_queued().is_none());
    }

    #[test]
    fn describe_hides_bodies() {
        let msg = Message::new("PRIVMSG", vec!["Serv".into(), "LOGIN Bot hunter2".into()]);
        let text = describe(&msg);
        assert!(!text.contains("hunter2"), "{text}");
        assert_eq!(describe(&Message::new("JOIN", vec!["#a".into()])), "JOIN #a");
    }

    fn network(services: ServicesConfig) -> NetworkConfig {
        NetworkConfig {
            name: "testnet".into(),
            server: "127.0.0.1:6667".into(),
            tls: None,
            nick: "Bot".into(),
            user: None,
            realname: None,
            channels: vec!["#lobby".into()],
            services,
        }
    }

    fn admin() -> AdminSettings {
        AdminSettings {
            admins: vec!["owner!*@*".into()],
            prefix: "!".into(),
        }
    }

    /// Play `server_lines` at the bot, let the paced queue drain, and
    /// return everything the bot wrote.
    async fn converse(net: &NetworkConfig, server_lines: &[&str]) -> Vec<String> {
        let chunks: Vec<String> = server_lines.iter().map(|l| format!("{l}\r\n")).collect();
        let chunks: Vec<&str> = chunks.iter().map(String::as_str).collect();
        converse_chunks(net, &chunks, Duration::ZERO).await
    }

    /// Like `converse`, but writes raw chunks with `gap` between them.
    async fn converse_chunks(net: &NetworkConfig, chunks: &[&str], gap: Duration) -> Vec<String> {
        let (client, mut server) = tokio::io::duplex(16 * 1024);
        let net = net.clone();
        let bot = tokio::spawn(async move {
            let (reader, writer) = tokio::io::split(client);
            let mut agent = Agent::new(net.services.clone());
            let _ = run_session(BufReader::new(reader), writer, &net, &admin(), &mut agent).await;
        });
        for chunk in chunks {
            server.write_all(chunk.as_bytes()).await.unwrap();
            if !gap.is_zero() {
                tokio::time::sleep(gap).await;
            }
        }
        tokio::time::sleep(Duration::from_secs(3)).await;
        bot.abort();
        let _ = bot.await;

        let mut out = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut server, &mut out).await.unwrap();
        out.lines().map(str::to_string).collect()
    }

    fn credentials(hold_joins: bool) -> ServicesConfig {
        ServicesConfig {
            reserved_nick: Some("Bot".into()),
            secret: Some("hunter2".into()),
            authority: Some("Serv".into()),
            hold_joins_until_identified: hold_joins,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn registers_identifies_then_joins() {
        let net = network(credentials(false));
        let script = ["PING :abc", ":srv 001 Bot :Welcome", ":srv 376 Bot :End of MOTD"];
        let lines = converse(&net, &script).await;
        assert_eq!(
            lines,
            vec![
                "NICK Bot",
                "USER Bot 0 * :regnick services bot",
                "PONG abc",
                "PRIVMSG Serv :LOGIN Bot hunter2",
                "JOIN #lobby",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn held_join_waits_for_identification() {
        let welcome = [":srv 001 Bot :Welcome", ":srv 376 Bot :End of MOTD"];
        let net = network(credentials(true));

        let lines = converse(&net, &welcome).await;
        assert!(lines.contains(&"PRIVMSG Serv :LOGIN Bot hunter2".to_string()));
        assert!(!lines.iter().any(|l| l.starts_with("JOIN")), "{lines:?}");

        let mut script = welcome.to_vec();
        script.push(":Serv!s@services NOTICE Bot :Password accepted");
        let lines = converse(&net, &script).await;
        assert_eq!(lines.last().map(String::as_str), Some("JOIN #lobby"));
    }

    #[tokio::test(start_paused = true)]
    async fn admin_commands_are_answered() {
        let net = network(ServicesConfig {
            authority: Some("Serv".into()),
            reserved_nick: Some("Bot".into()),
            ..Default::default()
        });
        let lines = converse(
            &net,
            &[
                ":srv 001 Bot :Welcome",
                ":owner!o@home PRIVMSG Bot :!regged",
                ":stranger!x@y PRIVMSG Bot :!unban #lobby",
                ":owner!o@home PRIVMSG Bot :!unban #lobby",
                ":owner!o@home PRIVMSG Bot :!unban",
            ],
        )
        .await;
        assert!(lines.contains(&"PRIVMSG owner :Registered nick on testnet: Bot".to_string()));
        assert!(lines.contains(&"PRIVMSG Serv :unban #lobby Bot".to_string()));
        assert_eq!(lines.iter().filter(|l| l.starts_with("PRIVMSG Serv")).count(), 1);
        assert!(lines.contains(&format!("PRIVMSG owner :{}", commands::MISSING_CHANNEL)));
    }

    #[tokio::test(start_paused = true)]
    async fn nick_in_use_before_welcome_tries_alternates() {
        let net = network(ServicesConfig::default());
        let lines = converse(&net, &[":srv 433 * Bot :Nickname is already in use"]).await;
        assert_eq!(lines.last().map(String::as_str), Some("NICK Bot_"));
    }

    #[tokio::test(start_paused = true)]
    async fn line_split_across_pace_tick_is_kept_whole() {
        let net = network(ServicesConfig::default());
        let gap = PACE + Duration::from_millis(200);
        let lines = converse_chunks(&net, &["PING :abc", "def\r\n"], gap).await;
        assert_eq!(lines, vec!["NICK Bot", "USER Bot 0 * :regnick services bot", "PONG abcdef"]);
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_server_gets_pinged() {
        let net = network(ServicesConfig::default());
        let (client, _server) = tokio::io::duplex(4096);
        let (reader, writer) = tokio::io::split(client);
        let mut agent = Agent::new(net.services.clone());
        let result = run_session(BufReader::new(reader), writer, &net, &admin(), &mut agent).await;
        let err = result.unwrap_err().to_string();
        assert!(err.starts_with("no data from server"), "{err}");
    }
}

//! regnick-bot: keeps an IRC bot identified with network services.
//!
//! Connects to every enabled network in the config file and, per network:
//!
//!   - identifies with the services authority after the MOTD
//!   - recovers the reserved nick when someone else holds it
//!   - asks for unbans/invites when a join is refused
//!   - requests op/halfop/voice per channel policy
//!   - optionally holds channel joins until identified
//!
//! Admins can drive it over IRC with `!identify`, `!recover`, `!unban`, ...
//! (see `commands.rs`).

mod commands;
mod config;
mod connection;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use crate::config::BotConfig;
use crate::connection::AdminSettings;

#[derive(Parser)]
#[command(name = "regnick-bot", about = "Keep an IRC bot identified with network services")]
struct Args {
    /// Config file (default: ~/.config/regnick/regnick.toml)
    #[arg(long, env = "REGNICK_CONFIG")]
    config: Option<PathBuf>,

    /// Only connect to this network
    #[arg(long)]
    network: Option<String>,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "regnick_bot=info,regnick_core=info".into());
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let path = args.config.unwrap_or_else(config::default_path);
    let cfg = BotConfig::load(&path)?;
    info!(path = %path.display(), networks = cfg.networks.len(), "Loaded config");

    let admin = Arc::new(AdminSettings {
        admins: cfg.admins.clone(),
        prefix: cfg.command_prefix.clone(),
    });
    if admin.admins.is_empty() {
        warn!("No admins configured; IRC commands are disabled");
    }

    let mut tasks = Vec::new();
    for net in cfg.networks {
        if let Some(only) = &args.network
            && !net.name.eq_ignore_ascii_case(only)
        {
            continue;
        }
        if !net.services.enabled {
            info!(network = %net.name, "Services handling disabled; connecting anyway");
        }
        info!(network = %net.name, server = %net.server, tls = net.use_tls(), "Starting");
        tasks.push(tokio::spawn(connection::run_network(net, admin.clone())));
    }
    if tasks.is_empty() {
        anyhow::bail!("no network to connect to");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    for task in tasks {
        task.abort();
    }
    Ok(())
}

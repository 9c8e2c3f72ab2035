//! Terminal front-end: joins a room, prints the game log and countdown, and
//! routes line commands through the panel machine. All protocol and state
//! logic lives in the library.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;
use uuid::Uuid;

use werewolf_client::client::{ClientCommand, GameClient};
use werewolf_client::config::ClientConfig;
use werewolf_client::session::{FileTokenStore, JoinAs, SessionManager, TokenStore};

const LOG_TARGET: &str = "bin::werewolf_client";
const DEFAULT_HTTP_BASE: &str = "http://127.0.0.1:8000";
const DEFAULT_WS_BASE: &str = "ws://127.0.0.1:8000";

#[derive(Debug, Parser)]
#[command(name = "werewolf_client")]
#[command(about = "Join a werewolf room and play from the terminal", long_about = None)]
struct Args {
    /// Room id to join
    #[arg(long)]
    room: Option<String>,

    /// Existing profile id to join with
    #[arg(long, env = "WEREWOLF_PROFILE_ID")]
    profile: Option<String>,

    /// Display name to join with when there is no profile id
    #[arg(long, env = "WEREWOLF_PLAYER_NAME")]
    name: Option<String>,

    /// Base URL of the join/session HTTP API
    #[arg(long, env = "WEREWOLF_HTTP_BASE", default_value = DEFAULT_HTTP_BASE)]
    http_base: String,

    /// Base URL of the websocket endpoint
    #[arg(long, env = "WEREWOLF_WS_BASE", default_value = DEFAULT_WS_BASE)]
    ws_base: String,

    /// Where per-room session tokens are persisted
    #[arg(long, default_value = ".werewolf-session.json")]
    token_file: PathBuf,

    /// List the server's game boards and exit
    #[arg(long)]
    list_templates: bool,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs)?;

    let http_base = Url::parse(&args.http_base).context("invalid --http-base")?;
    let ws_base = Url::parse(&args.ws_base).context("invalid --ws-base")?;
    let config = ClientConfig::new(http_base, ws_base);
    let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::open(&args.token_file));
    let mut manager = SessionManager::new(config.clone(), tokens);

    if args.list_templates {
        let templates = manager.join_client().game_templates().await?;
        for template in templates {
            println!(
                "{} ({} roles, {:?} players): {}",
                template.name,
                template.total_roles(),
                template.player_counts,
                template.description
            );
        }
        return Ok(());
    }

    let room = args
        .room
        .ok_or_else(|| anyhow!("--room is required unless --list-templates is set"))?;
    let join_as = match (args.profile, args.name) {
        (Some(profile_id), _) => JoinAs::Profile { profile_id },
        (None, Some(player_name)) => JoinAs::Name { player_name },
        (None, None) => JoinAs::Name {
            player_name: format!("wanderer-{}", &Uuid::new_v4().to_string()[..8]),
        },
    };

    let credentials = manager
        .acquire_session(&room, &join_as)
        .await
        .context("could not join the room")?;
    info!(target = LOG_TARGET, room, player_id = %credentials.player_id, "session acquired");

    let (inbound, connection) = manager
        .connect(&room, &credentials)
        .await
        .context("could not open the game connection")?;
    let client = GameClient::spawn(
        credentials.player_id.clone(),
        inbound,
        connection,
        config.command_capacity,
    );

    println!("Connected to room {room}. Type `help` for commands.");
    run_terminal(&client).await;

    client.close();
    manager.disconnect().await;
    Ok(())
}

async fn run_terminal(client: &werewolf_client::client::GameClientHandle) {
    let mut view = client.view();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printed = 0usize;
    let mut was_connected = false;
    let mut last_remaining = 0u64;

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = view.borrow().clone();
                for line in snapshot.log.iter().skip(printed) {
                    println!("{line}");
                }
                printed = snapshot.log.len();

                if snapshot.remaining_secs != last_remaining {
                    last_remaining = snapshot.remaining_secs;
                    if last_remaining > 0 && (last_remaining <= 5 || last_remaining % 10 == 0) {
                        println!("  {last_remaining}s left");
                    }
                }

                if snapshot.connected {
                    was_connected = true;
                } else if was_connected {
                    break;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match parse_command(trimmed) {
                        Some(command) => {
                            if !client.command(command).await {
                                break;
                            }
                        }
                        None => print_help(),
                    }
                }
                Ok(None) => break,
                Err(_) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}

fn parse_command(line: &str) -> Option<ClientCommand> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?;
    let arg = parts.next();
    match (verb, arg) {
        ("seat", Some(n)) => n.parse().ok().map(ClientCommand::TakeSeat),
        ("ready", None) => Some(ClientCommand::ReadyToggle),
        ("start", None) => Some(ClientCommand::StartGame),
        ("pick", Some(id)) | ("vote", Some(id)) => Some(ClientCommand::Select(id.to_string())),
        ("save", None) => Some(ClientCommand::WitchSave),
        ("poison", Some(id)) => Some(ClientCommand::WitchPoison(id.to_string())),
        ("confirm", None) | ("pass", None) | ("run", None) => Some(ClientCommand::Confirm),
        ("withdraw", None) => Some(ClientCommand::WithdrawCandidacy),
        _ => None,
    }
}

fn print_help() {
    println!(
        "commands: seat <n> | ready | start | pick <player> | vote <player> | \
         save | poison <player> | confirm | run | pass | withdraw"
    );
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing subscriber: {err}"))?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing subscriber: {err}"))?;
    }
    Ok(())
}

//! Command-line surface over the dashboard client.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::api::cache::CachedTransport;
use crate::api::transport::{normalize_base_url, HttpTransport, Transport};
use crate::api::{acquire_token, resolve_endpoints, run_console};
use crate::dashboard::{fetch_dashboard, fetch_public};
use crate::error::{DashError, Result};
use crate::rooms::fetch_room_detail;
use crate::session::{Session, SessionStore, Settings, SettingsStore};

#[derive(Debug, Parser)]
#[command(name = "screepsdash", version, about = "Dashboard client for Screeps-compatible servers")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in to a server and resolve its endpoint map
    Login {
        /// Server address, e.g. screeps.com or https://my-fork.example
        server: String,
        #[arg(short, long)]
        username: String,
        /// Password; read from the environment so it stays out of shell history
        #[arg(short, long, env = "SCREEPS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Re-run the endpoint probe for the stored session
    Probe,
    /// Show account resources
    Overview {
        /// Print the snapshot as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List owned rooms
    Rooms {
        #[arg(long)]
        json: bool,
    },
    /// Show one room in detail
    Room {
        name: String,
        #[arg(short, long)]
        shard: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Browse the public leaderboard, no sign-in needed
    Public {
        /// Server address; defaults to the stored session's server
        #[arg(short = 'S', long)]
        server: Option<String>,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Run a line of code in the game console
    Console {
        code: String,
        #[arg(short, long)]
        shard: Option<String>,
    },
    /// Show the stored session
    Status,
    /// Forget the stored session
    Logout,
}

fn build_transport(settings: &Settings) -> Result<Arc<dyn Transport>> {
    let http = HttpTransport::new()?;
    if settings.request_cache {
        Ok(Arc::new(CachedTransport::new(http)))
    } else {
        Ok(Arc::new(http))
    }
}

fn require_session(store: &SessionStore) -> Result<Session> {
    store
        .load()?
        .ok_or_else(|| DashError::Auth("not signed in; run `screepsdash login` first".to_string()))
}

fn not_available() -> String {
    "-".to_string()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn fmt_number(value: Option<f64>) -> String {
    match value {
        Some(number) if number.fract() == 0.0 => format!("{}", number as i64),
        Some(number) => format!("{:.1}", number),
        None => not_available(),
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let session_store = SessionStore::open_default()?;
        let settings = SettingsStore::open_default()?.load();
        let transport = build_transport(&settings)?;

        match self.command {
            Command::Login { server, username, password } => {
                let base_url = normalize_base_url(&server)?;
                let token =
                    acquire_token(transport.as_ref(), &base_url, &username, &password).await?;
                let outcome = resolve_endpoints(transport.as_ref(), &base_url, &token).await?;
                let session = Session {
                    base_url: base_url.clone(),
                    token,
                    username: Some(username.clone()),
                    endpoints: outcome.endpoints,
                    probe_log: outcome.log,
                    verified_at: outcome.verified_at,
                };
                session_store.save(&session)?;
                println!("signed in to {} as {}", base_url, username);
                println!("profile endpoint: {}", session.endpoints.profile.path);
            }
            Command::Probe => {
                let mut session = require_session(&session_store)?;
                let outcome =
                    resolve_endpoints(transport.as_ref(), &session.base_url, &session.token)
                        .await?;
                for record in &outcome.log {
                    let mark = if record.success { "ok " } else { "FAIL" };
                    println!(
                        "{} {:<8} {} {} (status {})",
                        mark,
                        record.group.as_str(),
                        record.method,
                        record.endpoint,
                        record.status
                    );
                }
                session.endpoints = outcome.endpoints;
                session.probe_log = outcome.log;
                session.verified_at = outcome.verified_at;
                session_store.save(&session)?;
            }
            Command::Overview { json } => {
                let session = require_session(&session_store)?;
                let snapshot = fetch_dashboard(transport.as_ref(), &session).await?;
                if json {
                    return print_json(&snapshot);
                }
                let resources = &snapshot.resources;
                println!("user     {}", resources.username.clone().unwrap_or_else(not_available));
                println!("credits  {}", fmt_number(resources.credits));
                println!(
                    "cpu      {} / {}",
                    fmt_number(resources.cpu_used),
                    fmt_number(resources.cpu_limit)
                );
                println!("memory   {}", fmt_number(resources.memory_used));
                print!("gcl      {}", fmt_number(resources.gcl_level));
                match resources.gcl_progress_percent {
                    Some(percent) => println!(" ({:.1}%)", percent),
                    None => println!(),
                }
                println!("power    {}", fmt_number(resources.power));
            }
            Command::Rooms { json } => {
                let session = require_session(&session_store)?;
                let snapshot = fetch_dashboard(transport.as_ref(), &session).await?;
                if json {
                    return print_json(&snapshot.rooms);
                }
                if snapshot.rooms.is_empty() {
                    println!("no rooms found");
                }
                for room in snapshot.rooms.iter().take(settings.room_limit) {
                    println!(
                        "{:<8} {:<10} rcl {} {}",
                        room.name,
                        room.owner.clone().unwrap_or_else(not_available),
                        fmt_number(room.level),
                        room.shard.clone().unwrap_or_default()
                    );
                }
            }
            Command::Room { name, shard, json } => {
                let session = require_session(&session_store)?;
                let shard = shard.or_else(|| settings.default_shard.clone());
                let detail = fetch_room_detail(
                    transport.as_ref(),
                    &session.base_url,
                    &session.token,
                    &name,
                    shard.as_deref(),
                )
                .await?;
                if json {
                    return print_json(&detail);
                }
                println!(
                    "{} ({})",
                    detail.name,
                    detail.shard.clone().unwrap_or_else(not_available)
                );
                println!("owner     {}", detail.owner.clone().unwrap_or_else(not_available));
                println!("rcl       {}", fmt_number(detail.controller_level));
                println!("spawns    {} (energy {})", detail.spawn_count, detail.spawn_energy);
                println!("extensions energy {}", detail.extension_energy);
                println!("creeps    {}", detail.creep_count);
                if let Some(time) = detail.game_time {
                    println!("game time {}", time as i64);
                }
            }
            Command::Public { server, limit, json } => {
                let base_url = match server {
                    Some(server) => normalize_base_url(&server)?,
                    None => require_session(&session_store)?.base_url,
                };
                let snapshot = fetch_public(transport.as_ref(), &base_url, limit).await?;
                if json {
                    return print_json(&snapshot);
                }
                if snapshot.leaderboard.is_empty() {
                    println!("no leaderboard on this server");
                }
                for entry in &snapshot.leaderboard {
                    println!(
                        "{:>4}  {:<16} {}",
                        fmt_number(entry.rank),
                        entry.username,
                        fmt_number(entry.score)
                    );
                }
                if !snapshot.seasons.is_empty() {
                    println!("seasons: {}", snapshot.seasons.join(", "));
                }
            }
            Command::Console { code, shard } => {
                let session = require_session(&session_store)?;
                let shard = shard.or_else(|| settings.default_shard.clone());
                let outcome = run_console(
                    transport.as_ref(),
                    &session.base_url,
                    &session.token,
                    &code,
                    shard.as_deref(),
                )
                .await?;
                if outcome.ok {
                    info!("accepted as {:?}", outcome.used_variant);
                    match outcome.feedback {
                        Some(feedback) => println!("{}", feedback),
                        None => println!("ok"),
                    }
                } else {
                    return Err(DashError::Probe(format!(
                        "console rejected after {} attempts: {}",
                        outcome.tried.len(),
                        outcome.error.unwrap_or_else(|| "unknown".to_string())
                    )));
                }
            }
            Command::Status => match session_store.load()? {
                Some(session) => {
                    println!("server    {}", session.base_url);
                    println!(
                        "user      {}",
                        session.username.clone().unwrap_or_else(not_available)
                    );
                    println!("verified  {}", session.verified_at.to_rfc3339());
                    println!("profile   {}", session.endpoints.profile.path);
                    println!(
                        "rooms     {}",
                        session
                            .endpoints
                            .rooms
                            .as_ref()
                            .map(|c| c.path.clone())
                            .unwrap_or_else(not_available)
                    );
                    println!(
                        "stats     {}",
                        session
                            .endpoints
                            .stats
                            .as_ref()
                            .map(|c| c.path.clone())
                            .unwrap_or_else(not_available)
                    );
                }
                None => println!("not signed in"),
            },
            Command::Logout => {
                session_store.clear()?;
                println!("signed out");
            }
        }
        Ok(())
    }
}

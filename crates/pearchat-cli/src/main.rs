//! PearChat CLI
//!
//! Thin wrapper around pearchat-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Show configuration, a fresh identity and the store location
//! pearchat info
//!
//! # Generate a room id
//! pearchat room create
//!
//! # Append a message and read a room back
//! pearchat send lobby "hello"
//! pearchat history lobby
//!
//! # Run several participants in one process and watch them find each other
//! pearchat simulate --room lobby --peers 3 --seconds 10
//!
//! # Chat interactively, optionally with a few bots for company
//! pearchat chat lobby --bots 2
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pearchat_core::logging::JsonlLayer;
use pearchat_core::{
    ChatConfig, ChatEvent, ChatService, Clock, Conversation, EventStream, Identity, MemoryStore,
    Message, PresenceTables, RedbStore, RoomId, SharedStore, SystemClock, TokioScheduler,
};
use tokio::io::AsyncBufReadExt;
use tracing::info;
use tracing_subscriber::prelude::*;

/// PearChat - presence and chat over a shared store
#[derive(Parser)]
#[command(name = "pearchat")]
#[command(version = "0.1.0")]
#[command(about = "PearChat - presence and chat over a shared store")]
#[command(
    long_about = "Participants that share one store find each other through heartbeat records and exchange messages through per-room logs."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.pearchat)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Display name attached to sent messages
    #[arg(short, long, global = true)]
    name: Option<String>,

    /// Also write JSONL logs under this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show configuration and store information
    Info,

    /// Room management
    Room {
        #[command(subcommand)]
        action: RoomAction,
    },

    /// Print the stored messages of a room
    History {
        /// Room ID
        room: String,
    },

    /// Send one message as a short-lived participant
    Send {
        /// Room ID
        room: String,
        /// Message text
        content: String,
    },

    /// Run several participants in this process
    Simulate {
        /// Room all participants join
        #[arg(short, long, default_value = "lobby")]
        room: String,

        /// Number of participants
        #[arg(short, long, default_value_t = 3)]
        peers: usize,

        /// How long to run
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,

        /// Use an in-memory store instead of the data directory
        #[arg(long)]
        memory: bool,
    },

    /// Chat interactively (lines from stdin are sent)
    Chat {
        /// Room ID
        room: String,

        /// Number of bot participants to run alongside
        #[arg(short, long, default_value_t = 0)]
        bots: usize,
    },
}

#[derive(Subcommand)]
enum RoomAction {
    /// Generate a new room ID
    Create,
}

fn setup_logging(verbosity: u8, log_dir: Option<&Path>, participant: &str) -> Result<()> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let jsonl = log_dir
        .map(|dir| JsonlLayer::new(dir, participant))
        .transpose()
        .context("failed to open log directory")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(jsonl)
        .init();
    Ok(())
}

/// Get the default data directory (~/.pearchat)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pearchat")
}

fn load_config(path: Option<&Path>, name: Option<&str>) -> Result<ChatConfig> {
    let mut config = match path {
        Some(path) => ChatConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ChatConfig::default(),
    };
    if let Some(name) = name {
        config.display_name = name.to_string();
    }
    config.validate()?;
    Ok(config)
}

fn open_store(data_dir: &Path) -> Result<RedbStore> {
    let path = data_dir.join("shared.redb");
    RedbStore::new(&path).with_context(|| {
        format!(
            "failed to open store at {} (is another pearchat process using it?)",
            path.display()
        )
    })
}

fn new_participant(store: Arc<dyn SharedStore>, config: ChatConfig) -> Result<ChatService> {
    let scheduler = TokioScheduler::current().context("no tokio runtime")?;
    Ok(ChatService::new(
        store,
        Arc::new(scheduler),
        Arc::new(SystemClock),
        config,
    ))
}

fn format_time(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp)
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "??:??:??".to_string())
}

fn print_message(message: &Message) {
    println!(
        "[{}] {}: {}",
        format_time(message.timestamp),
        message.display_author(),
        message.content
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let participant = cli.name.clone().unwrap_or_else(|| "pearchat".to_string());
    setup_logging(cli.verbose, cli.log_dir.as_deref(), &participant)?;

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let config = load_config(cli.config.as_deref(), cli.name.as_deref())?;

    match cli.command {
        Commands::Info => {
            let store = open_store(&data_dir)?;
            let tables = PresenceTables::with_keys(
                Arc::new(store),
                config.peers_key.clone(),
                config.messages_key.clone(),
            );
            let identity = Identity::generate(SystemClock.now_ms());

            println!("PearChat v0.1.0");
            println!();
            println!("Identity: {}", identity);
            println!("Display name: {}", config.display_name);
            println!();
            println!("Store: {}", data_dir.join("shared.redb").display());
            println!("  Peer records: {}", tables.get_peers().len());
            println!();
            println!("Timing:");
            println!("  Heartbeat: {} ms", config.heartbeat_interval_ms);
            println!("  Scan: {} ms", config.scan_interval_ms);
            println!("  Poll: {} ms", config.poll_interval_ms);
            println!("  Liveness timeout: {} ms", config.liveness_timeout_ms);
            println!("  Delivery: {:?}", config.delivery_mode);
        }

        Commands::Room { action } => match action {
            RoomAction::Create => {
                let room_id = RoomId::generate(SystemClock.now_ms());
                println!("Created room: {}", room_id);
            }
        },

        Commands::History { room } => {
            let store = open_store(&data_dir)?;
            let tables = PresenceTables::with_keys(
                Arc::new(store),
                config.peers_key.clone(),
                config.messages_key.clone(),
            );
            let messages = tables.get_messages(&RoomId::new(room.as_str()));
            if messages.is_empty() {
                println!("No messages in room {}.", room);
            } else {
                println!("Messages in {} ({}):", room, messages.len());
                for message in &messages {
                    print_message(message);
                }
            }
        }

        Commands::Send { room, content } => {
            let store = open_store(&data_dir)?;
            let service = new_participant(Arc::new(store), config)?;
            service.join_room(room.as_str());
            let sent = service.send_message(room.as_str(), content);
            service.destroy();

            match sent {
                Some(message) => {
                    println!("Sent message to {}", room);
                    println!("  ID: {}", message.id);
                }
                None => anyhow::bail!("message was not sent"),
            }
        }

        Commands::Simulate {
            room,
            peers,
            seconds,
            memory,
        } => {
            let store: Arc<dyn SharedStore> = if memory {
                Arc::new(MemoryStore::new())
            } else {
                Arc::new(open_store(&data_dir)?)
            };
            run_simulation(store, config, RoomId::new(room), peers, seconds).await?;
        }

        Commands::Chat { room, bots } => {
            let store = open_store(&data_dir)?;
            run_chat(Arc::new(store), config, RoomId::new(room), bots).await?;
        }
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Simulation
// ═══════════════════════════════════════════════════════════════════════════

/// What one participant saw during a simulation.
struct Tally {
    received: usize,
    peers_seen: BTreeSet<String>,
}

/// Print a participant's events until its bus closes, skipping repeated
/// deliveries of the same message.
async fn follow_events(name: String, room: RoomId, mut events: EventStream) -> Tally {
    let mut conversation = Conversation::new(room);
    let mut peers_seen = BTreeSet::new();

    while let Some(event) = events.recv().await {
        match &event {
            ChatEvent::PeerConnected { peer_id } => {
                peers_seen.insert(peer_id.clone());
            }
            ChatEvent::MessageReceived(message) => {
                if !conversation.add_message(message.clone()) {
                    continue;
                }
            }
            _ => {}
        }
        println!("[{}] {}", name, event);
    }

    Tally {
        received: conversation.len(),
        peers_seen,
    }
}

async fn run_simulation(
    store: Arc<dyn SharedStore>,
    config: ChatConfig,
    room: RoomId,
    peers: usize,
    seconds: u64,
) -> Result<()> {
    let peers = peers.max(1);
    info!(peers, seconds, room = %room, "Starting simulation");
    let mut participants = Vec::with_capacity(peers);
    let mut followers = Vec::with_capacity(peers);

    for i in 1..=peers {
        let name = format!("peer-{}", i);
        let service = new_participant(store.clone(), config.clone().with_display_name(&name))?;
        let events = service.subscribe();
        followers.push(tokio::spawn(follow_events(
            name.clone(),
            room.clone(),
            events,
        )));
        service.join_room(room.clone());
        participants.push((name, service));
    }

    // Participant i speaks every (4 + i) ticks of 250 ms
    let mut sent = vec![0usize; peers];
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let total_ticks = seconds * 4;
    for tick in 1..=total_ticks {
        ticker.tick().await;
        for (i, (name, service)) in participants.iter().enumerate() {
            if tick % (4 + i as u64) == 0 {
                let content = format!("{} says hello #{}", name, sent[i] + 1);
                if service.send_message(room.clone(), content).is_some() {
                    sent[i] += 1;
                }
            }
        }
    }

    for (_, service) in &participants {
        service.destroy();
    }

    println!();
    println!("Summary ({} participants, {} s, room {}):", peers, seconds, room);
    for ((name, _), (follower, sent)) in participants.iter().zip(followers.into_iter().zip(sent)) {
        let tally = follower.await.context("event follower panicked")?;
        println!(
            "  {}: sent {}, received {}, saw {} peers",
            name,
            sent,
            tally.received,
            tally.peers_seen.len()
        );
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Interactive chat
// ═══════════════════════════════════════════════════════════════════════════

async fn run_chat(
    store: Arc<dyn SharedStore>,
    config: ChatConfig,
    room: RoomId,
    bots: usize,
) -> Result<()> {
    let me = new_participant(store.clone(), config.clone())?;
    let mut events = me.subscribe();
    let join = me.join_room(room.clone());

    let mut conversation = Conversation::new(room.clone());
    conversation.merge(join.messages);
    for message in conversation.messages() {
        print_message(message);
    }

    let mut bot_tasks = Vec::with_capacity(bots);
    for i in 1..=bots {
        let bot = Arc::new(new_participant(
            store.clone(),
            config.clone().with_display_name(format!("bot-{}", i)),
        )?);
        bot.join_room(room.clone());
        let room = room.clone();
        let handle = tokio::spawn({
            let bot = bot.clone();
            async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(3 + i as u64));
                ticker.tick().await;
                let mut count = 0;
                loop {
                    ticker.tick().await;
                    count += 1;
                    bot.send_message(room.clone(), format!("beep #{}", count));
                }
            }
        });
        bot_tasks.push((bot, handle));
    }

    info!(room = %room, bots, "Joined room");
    println!(
        "Joined {} as {}. Commands: /peers, /name <name>, /quit",
        room,
        me.identity().map(|id| id.short().to_string()).unwrap_or_default()
    );

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match line.split_once(' ').unwrap_or((line, "")) {
                    ("/quit", _) => break,
                    ("/peers", _) => println!("{} peer(s) online", me.peer_count()),
                    ("/name", name) if !name.trim().is_empty() => {
                        me.set_display_name(name.trim());
                        println!("Display name set to {}", name.trim());
                    }
                    _ => {
                        if let Some(message) = me.send_message(room.clone(), line) {
                            conversation.add_message(message.clone());
                            print_message(&message);
                        }
                    }
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ChatEvent::MessageReceived(message) => {
                        if conversation.add_message(message.clone()) {
                            print_message(&message);
                        }
                    }
                    ChatEvent::PeerConnected { .. }
                    | ChatEvent::PeerDisconnected { .. }
                    | ChatEvent::PeerCountChanged { .. } => println!("* {}", event),
                    _ => {}
                }
            }
        }
    }

    for (bot, handle) in bot_tasks {
        handle.abort();
        bot.destroy();
    }
    me.destroy();
    Ok(())
}

/// PairChat terminal smoke client - exercises the sync engine end to end
/// against a running backend. Type a line to send it, `/older` to backfill,
/// `/quit` to exit.
use anyhow::Context;
use pairchat_core::{
    live, CacheStore, ConnectionState, ConversationSynchronizer, HttpPageFetcher, LiveConfig,
    Session, SessionHandle, SyncConfig,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn usage(program: &str) -> String {
    format!(
        "Usage: {} <user_id> <token> <peer_id> [--api <url>] [--ws <url>]",
        program
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        anyhow::bail!(usage(args.first().map(String::as_str).unwrap_or("pairchat")));
    }
    let user_id: i64 = args[1].parse().context("user_id must be an integer")?;
    let token = args[2].clone();
    let peer_id: i64 = args[3].parse().context("peer_id must be an integer")?;

    let mut config = SyncConfig::default();
    let mut i = 4;
    while i + 1 < args.len() {
        match args[i].as_str() {
            "--api" => config.api_base_url = args[i + 1].clone(),
            "--ws" => config.ws_url = args[i + 1].clone(),
            other => anyhow::bail!("Unknown flag {}\n{}", other, usage(&args[0])),
        }
        i += 2;
    }

    let session = SessionHandle::new(Session::new(user_id, token));
    let cache = CacheStore::new(&config.data_dir, config.cache_max_messages)
        .context("Failed to open local cache")?;
    let fetcher = Arc::new(HttpPageFetcher::new(config.api_base_url.clone(), session.clone()));

    let mut sync = ConversationSynchronizer::new(session.clone(), cache, fetcher, &config)
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let live_config = LiveConfig {
        ws_url: config.ws_url.clone(),
        reconnect_backoff: config.reconnect_backoff,
    };
    let (handle, mut inbound) =
        live::connect(live_config, &session).map_err(|e| anyhow::anyhow!("{}", e))?;
    let mut state_rx = handle.state_receiver();
    sync.attach_live(Arc::new(handle.clone()));

    info!("Opening conversation with user {}", peer_id);
    for msg in sync.select_conversation(peer_id) {
        println!("[{}] {}: {}", msg.timestamp, msg.sender_id, msg.content);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim() == "/quit" => break,
                    Some(line) if line.trim() == "/older" => {
                        match sync.load_older() {
                            Ok(true) => info!("Backfill requested"),
                            Ok(false) => info!("History exhausted or backfill already running"),
                            Err(e) => eprintln!("{}", e),
                        }
                    }
                    Some(line) => {
                        match sync.send_message(&line) {
                            Ok(msg) => println!("[{}] me: {}", msg.timestamp, msg.content),
                            Err(e) => eprintln!("{}", e),
                        }
                    }
                    None => break,
                }
            }
            Some(msg) = inbound.recv() => {
                println!("[{}] {}: {}", msg.timestamp, msg.sender_id, msg.content);
                sync.on_live_message(msg);
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow();
                sync.on_connection_change(state);
                match state {
                    ConnectionState::Connected => println!("* online"),
                    ConnectionState::Connecting => println!("* connecting..."),
                    ConnectionState::Disconnected => println!("* offline (messages will be queued)"),
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {}
        }

        // Apply any page results that resolved since the last turn
        while sync.try_pump() {}
    }

    handle.disconnect();
    Ok(())
}

//! Stay connected to an IRC network and answer server pings.
//!
//! Demonstrates:
//! - Building a persistent connection over TCP/TLS or WebSocket
//! - Listening for lines, connects, disconnects and the final end
//! - Automatic reconnect after the network drops
//!
//! Usage:
//!   cargo run --example irc_ping
//!   cargo run --example irc_ping -- --debug
//!   cargo run --example irc_ping -- --websocket
//!   cargo run --example irc_ping -- --host irc.example.org --port 6667 --plain

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use linesock::{
    Connection, ConnectionFactory, ConnectionOptions, ConnectionTarget, DirectConnection,
    PersistentConnection, WebSocketConnection,
};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_HOST: &str = "irc.libera.chat";
const DEFAULT_WEBSOCKET_URL: &str = "wss://irc-ws.chat.twitch.tv:443";
const NICK: &str = "justinfan4242";

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    websocket: bool,
    plain: bool,
    host: String,
    port: Option<u16>,
    seconds: u64,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let value = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            websocket: args.iter().any(|a| a == "--websocket"),
            plain: args.iter().any(|a| a == "--plain"),
            host: value("--host").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: value("--port").and_then(|p| p.parse().ok()),
            seconds: value("--seconds")
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = start(args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn start(args: Args) -> anyhow::Result<()> {
    println!("=== irc_ping ===\n");

    let options = ConnectionOptions::new().with_connect_timeout(Duration::from_secs(10));

    if args.websocket {
        let conn = PersistentConnection::builder(WebSocketConnection::new)
            .target(ConnectionTarget::url(DEFAULT_WEBSOCKET_URL))
            .options(options)
            .build()?;
        run(conn, args.seconds).await
    } else {
        let secure = !args.plain;
        let port = args
            .port
            .unwrap_or(if secure { 6697 } else { 6667 });
        let conn = PersistentConnection::builder(DirectConnection::new)
            .target(ConnectionTarget::host(&args.host, port).with_secure(secure))
            .options(options)
            .build()?;
        run(conn, args.seconds).await
    }
}

async fn run<F: ConnectionFactory>(conn: PersistentConnection<F>, seconds: u64) -> anyhow::Result<()> {
    // ========================================================================
    // Listeners
    // ========================================================================

    let responder = conn.clone();
    conn.events().on_receive(move |line| {
        println!("<< {line}");
        if let Some(token) = line.strip_prefix("PING ") {
            responder.send_line(&format!("PONG {token}"));
        }
    });

    let registrar = conn.clone();
    conn.events().on_connect(move || {
        println!("[Connect] Registering as {NICK}");
        registrar.send_line(&format!("NICK {NICK}"));
        registrar.send_line(&format!("USER {NICK} 0 * :{NICK}"));
    });

    conn.events().on_disconnect(|manual, error| match error {
        Some(e) => println!("[Disconnect] manual={manual} error={e}"),
        None => println!("[Disconnect] manual={manual}"),
    });

    conn.events().on_end(|manual, error| match error {
        Some(e) => println!("[End] manual={manual} error={e}"),
        None => println!("[End] manual={manual}"),
    });

    // ========================================================================
    // Session
    // ========================================================================

    conn.connect().await?;
    println!("        ✓ Connected\n");

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds)) => {
            println!("\n[Done] {seconds}s elapsed");
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\n[Ctrl+C] Shutting down");
        }
    }

    conn.send_line("QUIT :bye");
    conn.disconnect().await?;
    Ok(())
}

// ============================================================================
// Functions
// ============================================================================

fn init_logging(debug: bool) {
    let filter = if debug { "linesock=debug" } else { "linesock=info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

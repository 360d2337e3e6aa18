//! CLI for PopSub UDP
//!
//! Subcommands:
//! - `listen`: print every message delivered to this host, optionally
//!   subscribing to topics first
//! - `publish`, `subscribe`, `unsubscribe`: send a single frame and exit

use clap::{Parser, Subcommand};
use popsub_udp::config::{Settings, load_config};
use popsub_udp::{Client, SessionConfig};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "popsub-udp", version, about = "UDP publish/subscribe client")]
struct Cli {
    /// Broker host (overrides configuration)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Broker port (overrides configuration)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Client id (overrides configuration; generated when unset)
    #[arg(long, global = true)]
    client_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print delivered messages until interrupted
    Listen {
        /// Topics to subscribe to before listening; may be repeated
        #[arg(long = "topic")]
        topics: Vec<String>,
        /// Local port deliveries arrive on (overrides configuration)
        #[arg(long)]
        listen_port: Option<u16>,
    },
    /// Publish a payload under a topic
    Publish {
        #[arg(long)]
        topic: String,
        #[arg(long)]
        payload: String,
    },
    /// Ask the broker to route a topic to this host
    Subscribe {
        #[arg(long)]
        topic: String,
    },
    /// Ask the broker to stop routing a topic to this host
    Unsubscribe {
        #[arg(long)]
        topic: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration, using defaults: {e}");
            Settings::default()
        }
    };
    popsub_udp::utils::logging::init(&settings.log.level);

    if let Err(e) = run(cli, settings).await {
        error!("Client failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let host = cli.host.unwrap_or(settings.broker.host);
    let client_id = cli
        .client_id
        .or(settings.client.id)
        .unwrap_or_else(|| format!("client-{}", uuid::Uuid::new_v4()));
    // one-shot commands never wait for deliveries, so they stay off the protocol port
    let listen_port = match cli.command {
        Command::Listen { listen_port, .. } => listen_port.unwrap_or(settings.client.listen_port),
        _ => 0,
    };
    let session = SessionConfig {
        broker_port: cli.port.unwrap_or(settings.broker.port),
        listen_port,
    };

    let client = Client::connect_with(&client_id, &host, &session).await?;
    info!(%client_id, broker = %client.broker_addr(), "connected");

    match cli.command {
        Command::Listen { topics, .. } => {
            listen(&client, &topics, tokio::signal::ctrl_c()).await?;
        }
        Command::Publish { topic, payload } => {
            client.publish(&topic, &payload).await?;
            info!(%topic, "published");
        }
        Command::Subscribe { topic } => {
            // deliveries go to `listen`; this only registers interest at the broker
            client.subscribe(&topic, |_: &str, _: &str| {}).await?;
        }
        Command::Unsubscribe { topic } => {
            client.unsubscribe(&topic).await?;
        }
    }

    client.close().await;
    Ok(())
}

/// Prints deliveries until `interrupt` resolves. Fails if the receiver stops
/// first, since nothing more would ever be printed.
async fn listen<F, T>(
    client: &Client,
    topics: &[String],
    interrupt: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = T>,
{
    // interest registered by other processes still lands on this port
    client.on_unmatched(|from: &str, topic: &str, payload: &str| {
        print_message(Some(from), topic, payload)
    })?;
    for topic in topics {
        client
            .subscribe(topic, |topic: &str, payload: &str| {
                print_message(None, topic, payload)
            })
            .await?;
    }

    tokio::select! {
        reason = client.stopped() => {
            warn!(?reason, "receiver stopped, no further messages will arrive");
            client.close().await;
            Err(format!("receiver stopped: {reason:?}").into())
        }
        _ = interrupt => {
            info!("Shutdown signal received. Exiting gracefully.");
            for topic in topics {
                client.unsubscribe(topic).await?;
            }
            Ok(())
        }
    }
}

fn print_message(from: Option<&str>, topic: &str, payload: &str) {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    match from {
        Some(from) => println!("[{now}] {topic} <{from}>: {payload}"),
        None => println!("[{now}] {topic}: {payload}"),
    }
}

//! CLI for topicq
//!
//! Subcommands:
//! - `server`: run the HTTP/websocket broker
//! - `topics`: list known topics
//! - `publish`: publish one message
//! - `subscribe`: print deliveries from a topic until Ctrl+C

use std::sync::Arc;

use clap::{Parser, Subcommand};
use topicq::broker::{Broker, Delivery};
use topicq::client::{CallbackError, QueueClient};
use topicq::config::{Settings, load_config};
use topicq::transport::server;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "topicq", about = "Minimal in-memory message broker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the broker server
    Server,
    /// List the topics known to a running server
    Topics {
        /// Server address (host:port); defaults to client.server_addr
        #[arg(long)]
        addr: Option<String>,
    },
    /// Publish a message to a topic
    Publish {
        topic: String,
        body: String,
        #[arg(long)]
        addr: Option<String>,
    },
    /// Subscribe to a topic and print every delivery as JSON
    Subscribe {
        topic: String,
        #[arg(long)]
        addr: Option<String>,
        /// Republish deliveries that fail to print to `<topic>.deadletter`
        #[arg(long)]
        dead_letter: bool,
    },
}

#[actix_web::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    topicq::utils::logging::init(&config.log.level);

    let result = match cli.command {
        Command::Server => run_server(&config).await,
        Command::Topics { addr } => run_topics(&client_for(&config, addr, false)).await,
        Command::Publish { topic, body, addr } => {
            run_publish(&client_for(&config, addr, false), &topic, &body).await
        }
        Command::Subscribe {
            topic,
            addr,
            dead_letter,
        } => {
            let dead_letter = dead_letter || config.client.dead_letter;
            run_subscribe(&client_for(&config, addr, dead_letter), &topic).await
        }
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn client_for(config: &Settings, addr: Option<String>, dead_letter: bool) -> ClientArgs {
    ClientArgs {
        addr: addr.unwrap_or_else(|| config.client.server_addr.clone()),
        dead_letter,
    }
}

struct ClientArgs {
    addr: String,
    dead_letter: bool,
}

impl ClientArgs {
    fn connect(&self) -> Result<QueueClient, topicq::utils::error::ClientError> {
        QueueClient::new(&self.addr, self.dead_letter)
    }
}

async fn run_server(config: &Settings) -> CliResult {
    info!("Starting message queue");
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let broker = Arc::new(Broker::new(&config.broker));

    let (srv, _addrs) = server::bind(broker, &addr, config.server.workers)?;
    let handle = srv.handle();
    let server_task = tokio::spawn(srv);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => info!("Server stopped."),
                Ok(Err(e)) => error!("Message queue server failed: {}", e),
                Err(e) => error!("Server task failed: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
            handle.stop(true).await;
        }
    }

    info!("Stopping message queue");
    Ok(())
}

async fn run_topics(args: &ClientArgs) -> CliResult {
    let topics = args.connect()?.topics().await?;
    for topic in topics {
        println!("{topic}");
    }
    Ok(())
}

async fn run_publish(args: &ClientArgs, topic: &str, body: &str) -> CliResult {
    let resp = args.connect()?.publish(topic, body).await?;
    println!("{}", serde_json::to_string(&resp)?);
    Ok(())
}

async fn run_subscribe(args: &ClientArgs, topic: &str) -> CliResult {
    let client = args.connect()?;
    let sub = client.subscribe(topic, print_delivery).await?;

    tokio::signal::ctrl_c().await?;
    info!("Closing subscription");
    sub.cancel();
    sub.join().await;
    Ok(())
}

async fn print_delivery(delivery: Delivery) -> Result<(), CallbackError> {
    let line = serde_json::to_string(&delivery)?;
    println!("{line}");
    Ok(())
}

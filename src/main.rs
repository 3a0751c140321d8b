mod app;
mod cache;
mod config;
mod event;
mod logging;
mod origin;
mod record;
mod store;
mod ui;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use store::{
  ConnectionManager, Connector, MemoryConnector, MemoryStore, RedisConnector, RetryExecutor,
  StoreConnection, MEMORY_URL,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "headlines")]
#[command(about = "Latest headlines, read through a resilient Redis cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/headlines/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Cache store connection string, or memory:// for an in-process store
  #[arg(long, env = config::CONNECTION_SECRET, hide_env_values = true)]
  connection: Option<String>,

  /// Print the records once and exit instead of starting the UI
  #[arg(long)]
  once: bool,

  /// Print the cache store's client list and exit
  #[arg(long, conflicts_with = "once")]
  clients: bool,
}

/// What to do once connected.
#[derive(Debug, Clone, Copy)]
enum Mode {
  Ui,
  Once,
  Clients,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = logging::init()?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let connection = match args.connection {
    Some(connection) => connection,
    None => config::Config::get_connection_string()?,
  };

  let mode = if args.clients {
    Mode::Clients
  } else if args.once {
    Mode::Once
  } else {
    Mode::Ui
  };

  if connection == MEMORY_URL {
    info!("using in-process cache store");
    run(config, MemoryConnector::new(MemoryStore::new()), mode).await
  } else {
    info!("using redis cache store");
    run(config, RedisConnector::open(&connection)?, mode).await
  }
}

async fn run<K: Connector>(config: config::Config, connector: K, mode: Mode) -> Result<()> {
  let manager =
    Arc::new(ConnectionManager::new(connector).with_policy(config.reconnect_policy()));

  match mode {
    Mode::Once => print_once(&config, manager).await,
    Mode::Clients => print_clients(&config, manager).await,
    Mode::Ui => {
      // Initialize and run the app
      let mut app = app::App::new(config, manager);
      app.run().await
    }
  }
}

/// Show who is connected, to tell whether reconnects leak connections.
async fn print_clients<K: Connector>(
  config: &config::Config,
  manager: Arc<ConnectionManager<K>>,
) -> Result<()> {
  manager.initialize();
  let retry = RetryExecutor::new(Arc::clone(&manager)).with_policy(config.retry_policy());
  let clients = retry
    .run(|mut conn| async move { conn.client_list().await })
    .await;
  manager.uninitialize().await;

  let clients = clients?;
  println!("{} connected clients", clients.len());
  for client in &clients {
    println!("{}", client);
  }

  Ok(())
}

async fn print_once<K: Connector>(
  config: &config::Config,
  manager: Arc<ConnectionManager<K>>,
) -> Result<()> {
  manager.initialize();
  let repository = app::repository(config, Arc::clone(&manager));
  let result = repository.get_records().await;
  manager.uninitialize().await;

  let result = result?;
  let mut records = result.data;
  record::sort_newest_first(&mut records);

  println!(
    "{} ({} records from {})",
    config.title(),
    records.len(),
    result.source.label()
  );
  for record in &records {
    println!();
    println!("[{}] {}", record.id, record.title);
    println!("    {}", record.timestamp);
    println!("    {}", record.summary);
  }

  Ok(())
}

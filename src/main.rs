mod cache;
mod config;
mod error;
mod event;
mod host;
mod http;
mod lifecycle;
mod logging;
mod network;
mod preload;

#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use cache::{CacheStore, SqliteStorage};
use event::EventHandler;
use host::LocalHost;
use lifecycle::Lifecycle;
use network::HttpNetwork;

#[derive(Parser, Debug)]
#[command(name = "swcache")]
#[command(about = "A cache-first offline agent for a site's static assets")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/swcache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Write logs to this directory instead of stderr
  #[arg(long, global = true)]
  log_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Populate the cache bucket from the manifest
  Install,
  /// Run activation (navigation preload, optional stale-bucket purge)
  Activate,
  /// Resolve paths through the cache-first strategy
  Fetch {
    /// Site-relative paths or absolute URLs
    #[arg(required = true)]
    paths: Vec<String>,

    /// Treat the requests as navigations (eligible for preload)
    #[arg(long)]
    navigate: bool,

    /// Write response bodies to stdout
    #[arg(long)]
    body: bool,

    /// Extra request header, e.g. -H 'Accept: text/html'
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,
  },
  /// List buckets and the entries of the active one
  List,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _guard = logging::init(args.log_dir.as_deref().or(config.log_dir.as_deref()))?;

  let storage = SqliteStorage::open(&config.database_path()?)?;
  let store = CacheStore::new(storage);

  match args.command {
    Command::List => list(&store, &config)?,
    Command::Install => {
      let agent = Agent::start(&config, store)?;
      let count = agent.events.install().await?;
      println!("installed {} resources into {}", count, config.bucket_name());
      agent.shutdown().await;
    }
    Command::Activate => {
      let agent = Agent::start(&config, store)?;
      agent.events.activate().await?;
      println!("activated {}", config.bucket_name());
      agent.shutdown().await;
    }
    Command::Fetch {
      paths,
      navigate,
      body,
      headers,
    } => {
      let agent = Agent::start(&config, store)?;
      agent.events.activate().await?;

      let mut stdout = std::io::stdout().lock();
      for path in &paths {
        let request = headers
          .iter()
          .fold(config.request_for(path)?, |request, (name, value)| {
            request.with_header(name, value)
          });
        let preload = if navigate {
          agent
            .host
            .preload_for(&request, Arc::clone(&agent.network))
        } else {
          None
        };

        let resolution = agent.events.fetch(request.clone(), preload).await?;
        info!(
          url = %request.url,
          source = %resolution.source,
          content_type = resolution.response.header("Content-Type"),
          "resolved"
        );

        if body {
          stdout.write_all(&resolution.response.body)?;
        } else {
          write!(
            stdout,
            "{} {} {}",
            resolution.response.status, resolution.source, request.url
          )?;
          match resolution.stored_at {
            Some(stored_at) => writeln!(stdout, " (stored {})", stored_at.to_rfc3339())?,
            None => writeln!(stdout)?,
          }
        }
      }

      agent.shutdown().await;
    }
  }

  Ok(())
}

/// The running agent: lifecycle plus the event channel feeding it.
struct Agent {
  lifecycle: Arc<Lifecycle<SqliteStorage, HttpNetwork, LocalHost>>,
  events: EventHandler,
  network: Arc<HttpNetwork>,
  host: Arc<LocalHost>,
}

impl Agent {
  fn start(config: &config::Config, store: CacheStore<SqliteStorage>) -> Result<Self> {
    let network = Arc::new(HttpNetwork::new(config.timeout())?);
    let host = Arc::new(LocalHost::new());
    let lifecycle = Arc::new(Lifecycle::new(
      config.lifecycle_settings()?,
      store,
      Arc::clone(&network),
      Arc::clone(&host),
    ));
    let (events, _dispatcher) = EventHandler::spawn(Arc::clone(&lifecycle));

    Ok(Self {
      lifecycle,
      events,
      network,
      host,
    })
  }

  /// Let background cache writes land before exiting.
  async fn shutdown(&self) {
    self.lifecycle.flush().await;
  }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
  let (name, value) = raw
    .split_once(':')
    .ok_or_else(|| format!("expected 'Name: value', got '{}'", raw))?;
  Ok((name.trim().to_string(), value.trim().to_string()))
}

fn list(store: &CacheStore<SqliteStorage>, config: &config::Config) -> Result<()> {
  let active = config.bucket_name().to_string();
  let buckets = store.buckets()?;

  for name in &buckets {
    let marker = if *name == active { "*" } else { " " };
    println!("{} {}", marker, name);
  }

  if !buckets.contains(&active) {
    println!("active bucket {} has not been installed", active);
    return Ok(());
  }

  let bucket = store.open(&config.bucket_name())?;
  println!("{} entries in {}", bucket.len()?, bucket.name());
  for key in bucket.keys()? {
    println!("  {}", key);
  }

  Ok(())
}

//! Amulet, a local filtering DNS resolver.
//!
//! Binds a loopback UDP listener (and DoH when TLS material is present),
//! answers from the site map and the answer cache, and forwards everything
//! else to the configured upstreams.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use amulet_cache::{DnsCache, DEFAULT_CAPACITY, SWEEP_INTERVAL};
use amulet_config::{Config, ConfigHandle, ControlEvent};
use amulet_filter::FilterStore;
use amulet_proto::Message;
use amulet_resolver::Resolver;
use amulet_server::{
    DnsServer, DohConfig, QueryContext, QueryHandler, ServerConfig, UdpConfig,
};

/// Budget for the final shutdown drain.
const SHUTDOWN_BUDGET: Duration = Duration::from_secs(15);

/// Amulet DNS resolver - block ads and trackers at the resolver
#[derive(Parser, Debug)]
#[command(name = "amulet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the resolver (default)
    Run,

    /// Validate the configuration file
    Validate,
}

/// Finds the configuration file in standard locations.
fn find_config_file(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path);
    }

    let mut candidates = vec![PathBuf::from("./amulet.json")];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("amulet").join("config.json"));
    }

    candidates.into_iter().find(|path| path.exists())
}

fn init_logging(cli_level: Option<&str>, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if let Some(level) = cli_level {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Bridges the ingress handler trait onto the resolver pipeline.
struct AmuletHandler {
    resolver: Arc<Resolver>,
}

#[async_trait]
impl QueryHandler for AmuletHandler {
    async fn handle(&self, query: Message, context: QueryContext) -> Option<Bytes> {
        let question = query.question.clone();

        match self.resolver.lookup(query).await {
            Ok(wire) => {
                debug!(
                    client = %context.client,
                    protocol = %context.protocol,
                    question = %question,
                    latency_us = context.elapsed().as_micros() as u64,
                    "Resolved query"
                );
                Some(wire)
            }
            Err(e) => {
                warn!(
                    client = %context.client,
                    question = %question,
                    error = %e,
                    "Resolution failed"
                );
                None
            }
        }
    }
}

/// The single writer for configuration and filter mutations.
async fn control_loop(
    mut events: mpsc::Receiver<ControlEvent>,
    config: ConfigHandle,
    filter: Arc<FilterStore>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ControlEvent::UpdateConfig(new_config) => match config.apply(*new_config) {
                Ok(()) => info!("Configuration updated"),
                Err(e) => warn!(error = %e, "Rejected configuration update"),
            },
            ControlEvent::AddSite { domain, addr } => {
                filter.insert(&domain, addr);
            }
            ControlEvent::RemoveSite { domain } => {
                if !filter.remove(&domain) {
                    debug!(domain, "Site entry not present");
                }
            }
            ControlEvent::ReloadSites => {
                let map_file = config.load().map_file.clone();
                match filter.load_file(&map_file) {
                    Ok(count) => info!(entries = count, "Site map reloaded"),
                    Err(e) => error!(error = %e, "Failed to reload site map"),
                }
            }
        }
    }
}

async fn run_server(config: Config) -> Result<()> {
    let config_handle = ConfigHandle::new(config.clone());

    // Filter store; a missing map file is not fatal at startup, the
    // resolver just starts unfiltered until a reload supplies one.
    let filter = Arc::new(FilterStore::new());
    match filter.load_file(&config.map_file) {
        Ok(count) => info!(entries = count, "Site map loaded"),
        Err(e) => warn!(
            path = %config.map_file.display(),
            error = %e,
            "Site map unavailable, starting with an empty filter"
        ),
    }

    let cache = Arc::new(DnsCache::new(DEFAULT_CAPACITY));
    let sweeper = cache.spawn_sweeper(SWEEP_INTERVAL);

    let resolver = Arc::new(Resolver::new(
        config_handle.clone(),
        Arc::clone(&filter),
        Arc::clone(&cache),
    ));
    let handler = Arc::new(AmuletHandler {
        resolver: Arc::clone(&resolver),
    });

    let doh = config
        .has_tls_material()
        .then(|| {
            DohConfig::new(
                SocketAddr::from(([0, 0, 0, 0], amulet_proto::DOH_PORT)),
                config.cert_path.clone(),
                config.key_path.clone(),
            )
        });
    if doh.is_none() {
        info!("TLS material not found, DoH listener disabled");
    }

    let server_config = ServerConfig {
        udp: UdpConfig {
            listen: SocketAddr::from(([127, 0, 0, 1], config.udp_port)),
            ..UdpConfig::default()
        },
        doh,
        shutdown_timeout: Duration::from_secs(10),
    };

    let server = Arc::new(DnsServer::new(server_config, handler));

    // Control channel: external collaborators (and SIGHUP) drive mutations
    // through one event loop.
    let (control_tx, control_rx) = mpsc::channel::<ControlEvent>(16);
    let event_loop = tokio::spawn(control_loop(
        control_rx,
        config_handle.clone(),
        Arc::clone(&filter),
    ));

    {
        let control_tx = control_tx.clone();
        tokio::spawn(async move {
            let Ok(mut sighup) = signal::unix::signal(signal::unix::SignalKind::hangup()) else {
                return;
            };
            while sighup.recv().await.is_some() {
                info!("SIGHUP received, reloading site map");
                if control_tx.send(ControlEvent::ReloadSites).await.is_err() {
                    break;
                }
            }
        });
    }

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("failed to register SIGTERM handler")?;

    let mut server_task = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.run().await }
    });

    info!("Amulet started");

    let shutdown_requested = tokio::select! {
        result = &mut server_task => {
            result.context("server task panicked")?.context("server error")?;
            false
        }
        _ = signal::ctrl_c() => {
            info!("SIGINT received, shutting down");
            true
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received, shutting down");
            true
        }
    };

    if shutdown_requested {
        server.shutdown();
        if timeout(SHUTDOWN_BUDGET, &mut server_task).await.is_err() {
            warn!("Listeners did not stop within the shutdown budget");
        }
    }

    cache.close();
    let _ = timeout(Duration::from_secs(1), sweeper).await;
    event_loop.abort();

    info!(
        overrides = resolver.stats().overrides(),
        cache_hits = cache.stats().hits(),
        cache_hit_rate = cache.stats().hit_rate(),
        upstream_queries = resolver.stats().upstream_queries(),
        upstream_failures = resolver.stats().upstream_failures(),
        cached_entries = cache.len(),
        "Amulet stopped"
    );

    Ok(())
}

fn validate_config(explicit: Option<PathBuf>) -> Result<()> {
    let path = find_config_file(explicit).context("no configuration file found")?;
    println!("Validating {}", path.display());

    let config = Config::from_file(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    config
        .validate()
        .context("configuration validation failed")?;

    println!("Configuration is valid");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Validate) = cli.command {
        return validate_config(cli.config);
    }

    init_logging(cli.log_level.as_deref(), cli.quiet);

    // The process-wide TLS crypto provider; DoH needs it installed before
    // the first rustls config is built.
    let _ = rustls::crypto::ring::default_provider().install_default();

    // An explicitly given config file must load; otherwise fall back to
    // discovery, then to defaults.
    let config = match cli.config {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => match find_config_file(None) {
            Some(path) => Config::from_file(&path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => {
                warn!("No configuration file found, using defaults");
                Config::default()
            }
        },
    };

    run_server(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["amulet"]).unwrap();
        assert!(cli.config.is_none());
        assert!(!cli.quiet);
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["amulet", "-c", "/etc/amulet/config.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/amulet/config.json")));

        let cli = Cli::try_parse_from(["amulet", "validate"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Validate)));

        let cli = Cli::try_parse_from(["amulet", "run", "--log-level", "debug"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Run)));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_find_config_prefers_explicit() {
        let explicit = PathBuf::from("/tmp/does-not-need-to-exist.json");
        assert_eq!(find_config_file(Some(explicit.clone())), Some(explicit));
    }
}

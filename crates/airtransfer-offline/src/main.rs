//! airtransfer-offline - offline cache proxy for the AirTransfer web app.
//!
//! Sits in front of an AirTransfer server, pre-caches the app shell and
//! serves it cache-first so the page still opens when the server is gone.
//! Uploads and share-target requests always go straight to the server.

mod server;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use airtransfer_offline_core::{
    CacheHandle, CacheInterceptor, Config, DiskCacheStorage, FetchDecision, HttpNetwork,
    MemoryCache, Network, Request,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log filter used when RUST_LOG is not set
const DEFAULT_LOG_FILTER: &str = "info";

/// Prefix of the daily rolling log file
const LOG_FILE_PREFIX: &str = "airtransfer-offline.log";

#[derive(Parser, Debug)]
#[command(name = "airtransfer-offline", version)]
#[command(about = "Offline cache proxy for the AirTransfer web app")]
struct Cli {
    /// AirTransfer server to sit in front of
    #[arg(long, env = "AIRTRANSFER_ORIGIN", global = true)]
    origin: Option<String>,

    /// Directory holding cache generations
    #[arg(long, env = "AIRTRANSFER_CACHE_DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// Skip TLS certificate verification for the origin
    #[arg(long, env = "AIRTRANSFER_INSECURE", global = true)]
    insecure: bool,

    /// Extra root certificate (PEM) to trust for the origin
    #[arg(long, env = "AIRTRANSFER_CA_CERT", global = true)]
    ca_cert: Option<PathBuf>,

    /// Config file (defaults to ~/.config/airtransfer-offline/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pre-cache the seed list into the current generation
    Install,

    /// Run the cache-first reverse proxy
    Serve {
        /// Address to listen on
        #[arg(long, env = "AIRTRANSFER_LISTEN")]
        listen: Option<String>,

        /// Serve from the existing bucket without installing first
        #[arg(long)]
        no_install: bool,

        /// Keep the bucket in memory only
        #[arg(long)]
        ephemeral: bool,
    },

    /// Send one GET request through the interceptor
    Fetch {
        /// URL or origin-relative path, e.g. /static/manifest.json
        url: String,
    },

    /// List cache generations, or the entries of one
    List {
        /// Generation to list entries of
        name: Option<String>,
    },

    /// Delete old cache generations
    Purge {
        /// Delete only this generation (default: every one but the current)
        #[arg(long)]
        name: Option<String>,
    },

    /// Print the effective configuration
    Config {
        /// Persist it to the config file
        #[arg(long)]
        save: bool,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref());

    let config = effective_config(&cli)?;

    match cli.command {
        Command::Install => install(&config).await,
        Command::Serve {
            listen,
            no_install,
            ephemeral,
        } => serve(&config, listen, no_install, ephemeral).await,
        Command::Fetch { url } => fetch(&config, &url).await,
        Command::List { name } => list(&config, name.as_deref()).await,
        Command::Purge { name } => purge(&config, name.as_deref()),
        Command::Config { save } => show_config(&config, save, cli.config.as_deref()),
    }
}

/// Config file, then environment/flags on top
fn effective_config(cli: &Cli) -> Result<Config> {
    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(ref origin) = cli.origin {
        config.origin = origin.clone();
    }
    if let Some(ref dir) = cli.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    if cli.insecure {
        config.tls.accept_invalid_certs = true;
    }
    if let Some(ref ca_cert) = cli.ca_cert {
        config.tls.ca_cert = Some(ca_cert.clone());
    }
    config.validate()?;
    Ok(config)
}

fn storage(config: &Config) -> Result<DiskCacheStorage> {
    Ok(DiskCacheStorage::new(config.cache_dir()?))
}

fn upstream(config: &Config) -> Result<HttpNetwork> {
    HttpNetwork::with_tls(&config.origin, &config.tls)
        .with_context(|| format!("Failed to create client for {}", config.origin))
}

/// Interceptor over the current generation on disk, or in memory
fn build_interceptor(config: &Config, upstream: HttpNetwork, ephemeral: bool) -> Result<CacheInterceptor> {
    let name = &config.worker.cache_name;
    let cache: Arc<dyn CacheHandle> = if ephemeral {
        Arc::new(MemoryCache::new(name.as_str()))
    } else {
        let storage = storage(config)?;
        Arc::new(
            storage
                .open(name)
                .with_context(|| format!("Failed to open cache {}", name))?,
        )
    };
    let origin = upstream.origin().clone();
    Ok(CacheInterceptor::new(cache, Arc::new(upstream), config.worker.clone()).with_origin(origin))
}

async fn install(config: &Config) -> Result<()> {
    let interceptor = build_interceptor(config, upstream(config)?, false)?;
    interceptor
        .on_install()
        .await
        .with_context(|| format!("Install from {} failed", config.origin))?;

    let entries = interceptor.cache().entries().await?;
    println!(
        "Installed {} ({} entries) from {}",
        config.worker.cache_name,
        entries.len(),
        config.origin
    );
    Ok(())
}

async fn serve(config: &Config, listen: Option<String>, no_install: bool, ephemeral: bool) -> Result<()> {
    let upstream = upstream(config)?;
    let interceptor = build_interceptor(config, upstream.clone(), ephemeral)?;

    if no_install {
        info!("Skipping install");
    } else if let Err(e) = interceptor.on_install().await {
        // The proxy is still useful with whatever an earlier install left behind
        warn!(error = %e, "Install failed, serving existing cache");
    }

    let listen = listen.unwrap_or_else(|| config.listen.clone());
    let (addr, _server) = server::start_server(interceptor, upstream, &listen).await?;
    println!("Serving {} on http://{}", config.origin, addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    Ok(())
}

async fn fetch(config: &Config, url: &str) -> Result<()> {
    let upstream = upstream(config)?;
    let interceptor = build_interceptor(config, upstream.clone(), false)?;
    let request = Request::get(url);

    let decision = interceptor.on_fetch(&request).await?;
    let source = decision.source();
    let response = match decision {
        FetchDecision::Cached(response) | FetchDecision::Network(response) => response,
        FetchDecision::Bypass => upstream.fetch(&request).await?,
    };

    println!(
        "{} {} from {} ({} bytes)",
        response.status,
        url,
        source,
        response.body.len()
    );
    Ok(())
}

async fn list(config: &Config, name: Option<&str>) -> Result<()> {
    let storage = storage(config)?;

    let Some(name) = name else {
        for generation in storage.names()? {
            let marker = if generation == config.worker.cache_name { "*" } else { " " };
            println!("{} {}", marker, generation);
        }
        return Ok(());
    };

    if !storage.has(name) {
        anyhow::bail!("No cache generation named {}", name);
    }
    let cache = storage.open(name)?;
    for entry in cache.entries().await? {
        println!(
            "{:<40} {} {:>9} bytes  {}",
            entry.key.to_string(),
            entry.status,
            entry.size,
            entry.age_display()
        );
    }
    Ok(())
}

fn purge(config: &Config, name: Option<&str>) -> Result<()> {
    let storage = storage(config)?;
    let targets: Vec<String> = match name {
        Some(name) => vec![name.to_string()],
        None => storage
            .names()?
            .into_iter()
            .filter(|n| *n != config.worker.cache_name)
            .collect(),
    };

    let mut deleted = 0;
    for target in &targets {
        if storage.delete(target)? {
            println!("Deleted {}", target);
            deleted += 1;
        }
    }
    if deleted == 0 {
        println!("Nothing to purge");
    }
    Ok(())
}

fn show_config(config: &Config, save: bool, path: Option<&Path>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    if save {
        let saved = match path {
            Some(path) => {
                config.save_to(path)?;
                path.to_path_buf()
            }
            None => config.save()?,
        };
        eprintln!("Saved to {}", saved.display());
    }
    Ok(())
}

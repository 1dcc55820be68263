//! # Vidst CLI
//!
//! Command-line front end for the storage layer:
//!
//! ```text
//! vidst cache set scene-1 '{"start": 0.0}' --ttl-secs 60
//! vidst cache get scene-1
//! vidst vectors demo --count 5000 --queries 3
//! vidst --config vidst.yaml config show
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use vidst_core::config::{LogFormat, LoggingConfig};
use vidst_core::utils::{format_bytes, vector_bytes};
use vidst_core::{Config, Metadata, Metrics, Timer, VectorMetadata, VectorRecord};
use vidst_storage::{FileCache, ResourceMonitor, VectorStoragePool};

#[derive(Parser)]
#[command(name = "vidst")]
#[command(about = "Vidst - pooled vector storage and file cache for video understanding")]
#[command(version)]
struct Cli {
    /// YAML configuration file; defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// File-backed cache operations
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Vector storage operations
    #[command(subcommand)]
    Vectors(VectorsCommand),
    /// Configuration helpers
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Store a value (parsed as JSON, otherwise kept as a string)
    Set {
        key: String,
        value: String,
        /// Overrides the configured default TTL
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// Print a live entry
    Get { key: String },
    /// Delete an entry
    Delete { key: String },
    /// List keys
    Keys,
    /// Remove expired entries
    Purge,
    /// Show cache statistics
    Stats,
}

#[derive(Subcommand)]
enum VectorsCommand {
    /// Fill a pooled storage with random vectors under quota monitoring and query it
    Demo {
        #[arg(long, default_value_t = 2000)]
        count: usize,
        #[arg(long, default_value_t = 3)]
        queries: usize,
        #[arg(short, long, default_value_t = 5)]
        k: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration as YAML
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    init_tracing(&config.logging, cli.verbose);

    match cli.command {
        Commands::Cache(cmd) => run_cache(&config, cmd),
        Commands::Vectors(VectorsCommand::Demo { count, queries, k, seed }) => {
            run_demo(&config, count, queries, k, seed).await
        }
        Commands::Config(ConfigCommand::Show) => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(logging.level.as_str())
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn run_cache(config: &Config, cmd: CacheCommand) -> Result<()> {
    let cache = FileCache::new(config.cache.clone())?;

    match cmd {
        CacheCommand::Set { key, value, ttl_secs } => {
            let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            cache.set(&key, value, ttl_secs.map(Duration::from_secs), Metadata::new())?;
            println!("stored {}", key);
        }
        CacheCommand::Get { key } => match cache.get(&key)? {
            Some(entry) => {
                println!("{}", serde_json::to_string_pretty(&entry.value)?);
                match entry.expires_at {
                    Some(at) => eprintln!("expires in {}s", (at - Utc::now()).num_seconds()),
                    None => eprintln!("never expires"),
                }
            }
            None => {
                eprintln!("{}: not found", key);
                std::process::exit(1);
            }
        },
        CacheCommand::Delete { key } => {
            if cache.delete(&key)? {
                println!("deleted {}", key);
            } else {
                println!("{}: not found", key);
            }
        }
        CacheCommand::Keys => {
            for key in cache.keys()? {
                println!("{}", key);
            }
        }
        CacheCommand::Purge => {
            println!("purged {} expired entries", cache.purge_expired()?);
        }
        CacheCommand::Stats => {
            let stats = cache.stats()?;
            println!("dir:      {}", cache.dir().display());
            println!("entries:  {}", stats.entries);
            println!("size:     {}", format_bytes(stats.size_bytes));
        }
    }
    Ok(())
}

async fn run_demo(config: &Config, count: usize, queries: usize, k: usize, seed: u64) -> Result<()> {
    let metrics = Metrics::new();
    let pool = VectorStoragePool::with_metrics(
        config.pool.clone(),
        config.storage.clone(),
        metrics.clone(),
    )?;
    let monitor = ResourceMonitor::with_metrics(config.resources.clone(), metrics.clone())?;

    let dim = config.storage.dimension;
    let batch_size = config.storage.batch_size;
    let mut rng = StdRng::seed_from_u64(seed);
    let storage = pool.acquire().await?;

    info!("Inserting {} random vectors (dimension {})", count, dim);
    let timer = Timer::new("demo.insert");
    let mut inserted = 0;
    while inserted < count {
        let n = batch_size.min(count - inserted);
        let batch: Vec<VectorRecord> = (inserted..inserted + n)
            .map(|i| {
                VectorRecord::new(
                    format!("frame-{}", i),
                    random_vector(&mut rng, dim),
                    VectorMetadata::new("frame", "demo").with_extra("frame", i as u64),
                )
            })
            .collect();

        let bytes = vector_bytes(n, dim);
        match monitor.track("demo.add_batch", bytes, n as u64, || storage.add_batch(batch)) {
            Ok(added) => inserted += added,
            Err(e) if e.is_recoverable() => {
                warn!("Stopping early at {} vectors: {}", inserted, e);
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    let insert_time = timer.stop();
    println!(
        "inserted {} vectors in {:.1} ms (trained: {})",
        inserted,
        insert_time.as_secs_f64() * 1000.0,
        storage.is_trained()
    );

    for q in 0..queries {
        let query = random_vector(&mut rng, dim);
        let hits = storage.search(&query, k)?;
        println!("query {}:", q);
        for hit in hits {
            println!("  {:<14} score={:.4}", hit.id, hit.score);
        }
    }

    let usage = monitor.usage();
    let store_stats = storage.stats();
    pool.release(storage);
    let pool_stats = pool.stats();
    let snap = metrics.snapshot();

    println!("storage:  {} vectors, {}", store_stats.vector_count, format_bytes(store_stats.memory_bytes));
    println!(
        "quota:    {} ({:.1}%), {} vectors ({:.1}%)",
        format_bytes(usage.memory_bytes),
        usage.memory_ratio * 100.0,
        usage.vectors,
        usage.vector_ratio * 100.0
    );
    println!(
        "pool:     total={} idle={} acquired={} timeouts={}",
        pool_stats.total, pool_stats.idle, pool_stats.acquired, pool_stats.timeouts
    );
    println!(
        "metrics:  added={} searches={} rejections={}",
        snap.vectors_added, snap.searches, snap.quota_rejections
    );

    pool.close();
    Ok(())
}

fn random_vector(rng: &mut StdRng, dim: usize) -> Vec<f32> {
    (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

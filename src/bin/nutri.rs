#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nutrition_resolver::cache::{PruneOptions, SqliteResultCache};
use nutrition_resolver::gateway::{ProviderGateway, StderrUsageSink};
use nutrition_resolver::{
    FatSecretAdapter, JsonlTraceSink, ResolveOptions, Resolver, ResolverConfig, TraceSink,
};

#[derive(Parser)]
#[command(name = "nutri", version, about = "Resolve food descriptions into nutrition")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve one food description and print the result as JSON
    Resolve {
        #[arg(long)]
        query: String,
        /// Bypass the cache and include the decision trace
        #[arg(long)]
        debug: bool,
        #[arg(long)]
        cache: Option<PathBuf>,
        #[arg(long, conflicts_with = "cache")]
        no_cache: bool,
        /// JSON config file (defaults to $NUTRI_CONFIG)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Append the decision trace to this JSONL file
        #[arg(long)]
        trace: Option<PathBuf>,
    },
    /// Export SQLite cache to JSONL
    CacheExport {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Prune SQLite cache (expired rows, by age and/or size)
    CachePrune {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        expired: bool,
        #[arg(long)]
        max_age_days: Option<u64>,
        #[arg(long)]
        max_rows: Option<usize>,
    },
    /// Print the effective configuration
    ConfigDump {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<ResolverConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => ResolverConfig::load(path)?,
        None => ResolverConfig::from_env()?,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve {
            query,
            debug,
            cache,
            no_cache,
            config,
            trace,
        } => {
            let config = load_config(config)?;
            let catalog = FatSecretAdapter::from_env()?;
            let gateway = ProviderGateway::from_env(Arc::new(StderrUsageSink))?;
            let mut resolver = Resolver::new(Arc::new(catalog), Arc::new(gateway), config);

            if !no_cache {
                let path = cache.unwrap_or_else(SqliteResultCache::default_path);
                resolver = resolver.with_cache(Arc::new(SqliteResultCache::new(path)?));
            }

            let trace_worker = match trace {
                Some(path) => {
                    let (sink, worker) = JsonlTraceSink::new(path)?;
                    resolver = resolver.with_trace_sink(Arc::new(sink) as Arc<dyn TraceSink>);
                    Some(worker)
                }
                None => None,
            };

            let result = resolver.resolve(&query, ResolveOptions { debug }).await;
            println!("{}", serde_json::to_string_pretty(&result)?);

            drop(resolver);
            if let Some(worker) = trace_worker {
                worker.join()?;
            }
        }
        Commands::CacheExport { db, out } => {
            let path = db.unwrap_or_else(SqliteResultCache::default_path);
            let cache = SqliteResultCache::new(path)?;
            let rows = cache.export_jsonl(out).await?;
            eprintln!("exported {rows} rows");
        }
        Commands::CachePrune {
            db,
            expired,
            max_age_days,
            max_rows,
        } => {
            if !expired && max_age_days.is_none() && max_rows.is_none() {
                return Err(
                    "cache-prune requires --expired, --max-age-days and/or --max-rows".into(),
                );
            }
            if matches!(max_rows, Some(0)) {
                return Err("--max-rows must be >= 1".into());
            }
            let path = db.unwrap_or_else(SqliteResultCache::default_path);
            let cache = SqliteResultCache::new(path)?;
            let _lock = cache.lock_exclusive()?;
            let stats = cache
                .prune(PruneOptions {
                    expired,
                    max_age_days,
                    max_rows,
                })
                .await?;
            println!(
                "pruned {} rows; {} rows remain",
                stats.deleted, stats.remaining
            );
        }
        Commands::ConfigDump { config } => {
            let config = load_config(config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

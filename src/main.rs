use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;

use gridlink::analytics::Notifier;
use gridlink::config::{get_config, AppConfig};
use gridlink::errors::Result as GridlinkResult;
use gridlink::generator::{CentralizedGenerator, Sequence};
use gridlink::queue::{MemoryQueue, Queue, RedisQueue};
use gridlink::services::{AnalyticsStores, AnalyticsWorker, Shortener};
use gridlink::storage::{NamespacedStorage, Storage, StorageFactory};

#[derive(Parser)]
#[command(name = "gridlink", version, about = "URL shortener on an eventually-consistent key-value store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Shorten a long URL
    Shorten {
        url: String,
        /// Use this code instead of a generated one
        #[arg(long)]
        code: Option<String>,
    },
    /// Resolve a short code back to its record
    Resolve { code: String },
    /// Show the most popular target domains
    TopDomains {
        #[arg(short, default_value_t = 10)]
        n: usize,
        /// Lookback window in hours
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
    /// Show the most recently shortened URLs
    Recent {
        #[arg(short, default_value_t = 10)]
        n: usize,
    },
    /// Drain the registration queue into the analytics dimensions
    Worker,
}

async fn build_queue(config: &AppConfig) -> GridlinkResult<Arc<dyn Queue>> {
    match config.queue.backend.as_str() {
        "redis" => {
            let queue = RedisQueue::connect(&config.queue.redis_url, &config.queue.name).await?;
            Ok(Arc::new(queue) as Arc<dyn Queue>)
        }
        _ => Ok(Arc::new(MemoryQueue::new()) as Arc<dyn Queue>),
    }
}

/// 每个逻辑表一个后端实例，再按服务域名包装命名空间
async fn namespaced_table(config: &AppConfig, table: &str) -> GridlinkResult<Arc<dyn Storage>> {
    let storage = StorageFactory::create(&config.storage, table).await?;
    Ok(Arc::new(NamespacedStorage::new(
        storage,
        config.service.host.clone(),
    )))
}

async fn build_shortener(config: &AppConfig) -> anyhow::Result<Shortener> {
    let urls = namespaced_table(config, "urls").await?;
    let sequences = namespaced_table(config, "sequences").await?;

    let mut sequence = Sequence::new(sequences, config.sequence.id.as_str())
        .with_lengths(config.sequence.min_length, config.sequence.max_length)
        .with_retries(config.sequence.retries);
    if !config.sequence.letters.is_empty() {
        sequence = sequence.with_letters(&config.sequence.letters);
    }
    let generator = Arc::new(CentralizedGenerator::with_sequence(sequence));

    let queue = build_queue(config).await?;
    let registry = Arc::new(Notifier::new(queue));

    Ok(
        Shortener::new(urls, generator, registry, config.service.host.clone())
            .with_retries(config.service.create_retries),
    )
}

async fn build_analytics_stores(config: &AppConfig) -> GridlinkResult<AnalyticsStores> {
    Ok(AnalyticsStores {
        domain_counters: StorageFactory::create(&config.storage, "domain_counters").await?,
        level_counters: StorageFactory::create(&config.storage, "level_counters").await?,
        level_members: StorageFactory::create(&config.storage, "level_members").await?,
        recent_targets: StorageFactory::create(&config.storage, "recent_targets").await?,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = get_config();

    match cli.command {
        Command::Shorten { url, code } => {
            let shortener = build_shortener(config).await?;
            let record = shortener
                .shorten(&url, code.as_deref(), None, None)
                .await
                .map_err(|e| anyhow::anyhow!(e.format_simple()))?;
            println!("{}", record.shortcut());
        }
        Command::Resolve { code } => {
            let shortener = build_shortener(config).await?;
            let record = shortener
                .resolve(&code)
                .await
                .map_err(|e| anyhow::anyhow!(e.format_simple()))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::TopDomains { n, hours } => {
            let stores = build_analytics_stores(config).await?;
            let analytics = stores.for_host(&config.service.host, &config.analytics);
            let tops = analytics
                .popular_domains()
                .retrieve(n, Utc::now().timestamp(), hours * 3600)
                .await
                .map_err(|e| anyhow::anyhow!(e.format_simple()))?;
            for top in tops {
                println!("{}\t{}", top.count, top.domain);
            }
        }
        Command::Recent { n } => {
            let stores = build_analytics_stores(config).await?;
            let analytics = stores.for_host(&config.service.host, &config.analytics);
            let records = analytics
                .recent_targets()
                .retrieve(n)
                .await
                .map_err(|e| anyhow::anyhow!(e.format_simple()))?;
            for record in records {
                println!("{}\t{}", record.shortcut(), record.url);
            }
        }
        Command::Worker => {
            let queue = build_queue(config)
                .await
                .context("failed to connect the registration queue")?;
            if config.queue.backend != "redis" {
                info!("Queue backend is in-process; the worker will only see messages pushed by this process");
            }
            let stores = build_analytics_stores(config).await?;
            let worker = AnalyticsWorker::new(
                queue,
                stores,
                config.analytics.clone(),
                Duration::from_secs(config.queue.visibility_timeout_secs),
            );
            worker
                .run(Duration::from_millis(config.queue.poll_interval_ms))
                .await;
        }
    }

    Ok(())
}

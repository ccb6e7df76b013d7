//! Thimar Offline
//!
//! Command-line front end for the offline storage engine: seed the local
//! store, inspect it, mutate the offline cart, run a sync pass, or run the
//! engine in the foreground with a Prometheus endpoint.
//!
//! ```text
//!   thimar-offline preload
//!   thimar-offline cart add 1 --quantity 2
//!   thimar-offline sync
//!   thimar-offline run --metrics-addr 0.0.0.0:9090
//! ```

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use thimar_offline::domain::ports::{ClockRef, DurableStoreRef};
use thimar_offline::{
    DataPreloader, Error, FileStore, LoggingSyncEndpoint, MemoryStore, NetworkAdaptationManager,
    OfflineConfig, OfflineStorageManager, OptimizedImageLoader, PerformanceMonitor, Result,
    SmartCache, SyncOutcome, SystemClock, TcpProbe,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Thimar Offline - offline-first sync and network-adaptive caching
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of the durable store (overrides the config file)
    #[arg(long, env = "THIMAR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long, env = "THIMAR_CONFIG")]
    config: Option<PathBuf>,

    /// Keep everything in memory (nothing survives the process)
    #[arg(long, env = "THIMAR_IN_MEMORY")]
    in_memory: bool,

    /// host:port used by the connectivity probe (overrides the config file)
    #[arg(long, env = "THIMAR_PROBE_TARGET")]
    probe_target: Option<String>,

    /// Metrics server bind address (used by `run`)
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9090")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed the store with bundled localization, voice commands and catalog
    Preload,
    /// Print storage statistics
    Stats,
    /// Change the offline cart
    Cart {
        #[command(subcommand)]
        action: CartCommand,
    },
    /// Search cached products
    Search { query: String },
    /// Probe the network and run one sync pass
    Sync,
    /// Run polling, auto sync, cache sweeping and metrics until Ctrl-C
    Run,
}

#[derive(Subcommand, Debug)]
enum CartCommand {
    Add {
        product: String,
        #[arg(default_value_t = 1)]
        quantity: u32,
    },
    Remove {
        product: String,
    },
    Update {
        product: String,
        /// Zero or below removes the line
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
}

// =============================================================================
// Engine Wiring
// =============================================================================

struct Engine {
    cache: Arc<SmartCache>,
    network: Arc<NetworkAdaptationManager>,
    offline: Arc<OfflineStorageManager>,
    monitor: PerformanceMonitor,
}

async fn build_engine(args: &Args, config: &OfflineConfig) -> Result<Engine> {
    let clock: ClockRef = Arc::new(SystemClock);
    let store: DurableStoreRef = if args.in_memory {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(FileStore::open(&config.data_dir).await?)
    };
    info!(store = store.store_name(), "Durable store ready");

    let cache = Arc::new(SmartCache::with_config(
        Arc::clone(&store),
        Arc::clone(&clock),
        config.smart_cache(),
    ));
    let probe = Arc::new(TcpProbe::with_config(config.tcp_probe()));
    let network = Arc::new(NetworkAdaptationManager::with_config(
        probe,
        Arc::clone(&cache),
        OptimizedImageLoader::default(),
        config.network_manager(),
    ));
    let offline = OfflineStorageManager::open(
        store,
        Arc::clone(&clock),
        Arc::new(LoggingSyncEndpoint::new()),
        network.subscribe_tier(),
        config.offline_manager(),
    )
    .await;

    Ok(Engine {
        cache,
        network,
        offline,
        monitor: PerformanceMonitor::new(clock),
    })
}

fn load_config(args: &Args) -> Result<OfflineConfig> {
    let mut config = OfflineConfig::load(args.config.as_deref())?;
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(target) = &args.probe_target {
        config.network.probe_target = target.clone();
    }
    config.validate()?;
    Ok(config)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = load_config(&args)?;
    info!(
        version = thimar_offline::VERSION,
        data_dir = %config.data_dir.display(),
        in_memory = args.in_memory,
        "Starting Thimar offline engine"
    );

    let engine = build_engine(&args, &config).await?;

    match &args.command {
        Command::Preload => {
            let preloader =
                DataPreloader::new(Arc::clone(&engine.offline)).with_cache(Arc::clone(&engine.cache));
            let report = engine
                .monitor
                .measure("preload", preloader.preload_essential_data())
                .await;
            print_json(&report)?;
            print_json(&engine.monitor.generate_report())?;
        }
        Command::Stats => {
            print_json(&engine.offline.get_storage_stats().await)?;
        }
        Command::Cart { action } => {
            match action {
                CartCommand::Add { product, quantity } => {
                    engine.offline.add_to_cart(product, *quantity).await?
                }
                CartCommand::Remove { product } => engine.offline.remove_from_cart(product).await?,
                CartCommand::Update { product, quantity } => {
                    engine.offline.update_quantity(product, *quantity).await?
                }
            }
            print_json(&engine.offline.get_offline_cart().await)?;
        }
        Command::Search { query } => {
            engine.offline.save_search_query(query).await?;
            print_json(&engine.offline.search_offline_products(query).await)?;
        }
        Command::Sync => {
            let tier = engine.network.poll_once().await;
            info!(tier = %tier, "Network tier detected");
            match engine.offline.force_sync().await {
                SyncOutcome::Finished(report) => print_json(&report)?,
                SyncOutcome::PersistFailed(report) => {
                    print_json(&report)?;
                    return Err(Error::Internal("failed to persist pending actions".into()));
                }
                SyncOutcome::SkippedOffline => println!(
                    "offline: {} action(s) pending",
                    engine.offline.pending_actions_count()
                ),
                SyncOutcome::SkippedInProgress => println!("sync already in progress"),
            }
        }
        Command::Run => run(&args, engine).await?,
    }

    Ok(())
}

async fn run(args: &Args, engine: Engine) -> Result<()> {
    let metrics = Arc::new(EngineMetrics::register()?);

    engine.network.start_monitoring();
    engine.offline.start_auto_sync();
    engine.cache.start_sweeper();

    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    let refresher = {
        let metrics = Arc::clone(&metrics);
        let network = Arc::clone(&engine.network);
        let offline = Arc::clone(&engine.offline);
        let cache = Arc::clone(&engine.cache);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(5));
            loop {
                ticker.tick().await;
                metrics.refresh(&network, &offline, &cache);
            }
        })
    };

    info!("Engine running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    refresher.abort();
    engine.offline.stop_auto_sync();
    engine.network.stop_monitoring();
    engine.cache.destroy();

    info!("Shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "hyper=warn".parse() {
        filter = filter.add_directive(directive);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Metrics
// =============================================================================

struct EngineMetrics {
    pending_actions: prometheus::IntGauge,
    cache_hit_rate: prometheus::Gauge,
    cache_entries: prometheus::IntGauge,
    network_tier: prometheus::IntGauge,
}

impl EngineMetrics {
    fn register() -> Result<Self> {
        let err = |e: prometheus::Error| Error::Internal(format!("Metric registration failed: {}", e));
        Ok(Self {
            pending_actions: prometheus::register_int_gauge!(
                "thimar_offline_pending_actions",
                "Actions waiting in the sync outbox"
            )
            .map_err(err)?,
            cache_hit_rate: prometheus::register_gauge!(
                "thimar_offline_cache_hit_rate",
                "Smart cache hit ratio since start"
            )
            .map_err(err)?,
            cache_entries: prometheus::register_int_gauge!(
                "thimar_offline_cache_entries",
                "Entries held in the in-memory cache"
            )
            .map_err(err)?,
            network_tier: prometheus::register_int_gauge!(
                "thimar_offline_network_tier",
                "Current network tier (0 = offline, 6 = wifi)"
            )
            .map_err(err)?,
        })
    }

    fn refresh(
        &self,
        network: &NetworkAdaptationManager,
        offline: &OfflineStorageManager,
        cache: &SmartCache,
    ) {
        let stats = cache.stats();
        self.pending_actions.set(offline.pending_actions_count() as i64);
        self.cache_hit_rate.set(stats.hit_ratio());
        self.cache_entries.set(cache.len() as i64);
        self.network_tier.set(i64::from(network.get_network_state().rank()));
    }
}

async fn run_metrics_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let mut response = Response::new(Body::empty());
            match req.uri().path() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let mut buffer = Vec::new();
                    match encoder.encode(&prometheus::gather(), &mut buffer) {
                        Ok(()) => {
                            if let Ok(value) = hyper::header::HeaderValue::from_str(encoder.format_type()) {
                                response.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
                            }
                            *response.body_mut() = Body::from(buffer);
                        }
                        Err(e) => {
                            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                            *response.body_mut() = Body::from(e.to_string());
                        }
                    }
                }
                "/healthz" => *response.body_mut() = Body::from("ok"),
                _ => {
                    *response.status_mut() = StatusCode::NOT_FOUND;
                    *response.body_mut() = Body::from("not found");
                }
            }
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}

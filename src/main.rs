use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use actix_multipart::form::MultipartFormConfig;
use actix_web::{App, HttpServer, web};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use scrape_runner::app::{AppState, Backend};
use scrape_runner::client::{
    ClientRunController, ControllerSettings, ControllerState, FileStorage, HttpScrapeApi,
    Reconciliation,
};
use scrape_runner::clock::{Clock, SystemClock, TokioSleeper};
use scrape_runner::config::Config;
use scrape_runner::db;
use scrape_runner::domain::{company_key_from_url, normalize_company};
use scrape_runner::shutdown::ShutdownCoordinator;
use scrape_runner::worker::{ExtractionWorker, HttpFetcher, OpenAiEnricher};

#[derive(Parser)]
#[command(name = "scrape-runner")]
#[command(about = "Background careers-page scraping with one active run per company")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Start a scrape on a running server and poll it to completion
    Watch {
        /// Base URL of the server
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,
        /// Careers page to scrape
        #[arg(long)]
        url: String,
        /// Company key; derived from the URL when omitted
        #[arg(long)]
        company: Option<String>,
        /// Where the in-progress marker and cached results live
        #[arg(long, default_value = "scrape-client-state.json")]
        state_file: PathBuf,
        /// Seconds between status checks
        #[arg(long, default_value_t = 5)]
        poll_interval_secs: u64,
        /// Status checks before giving up
        #[arg(long, default_value_t = 200)]
        max_polls: u32,
    },

    /// Drop the local run state and clear the run on the server
    Reset {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,
        #[arg(long)]
        company: String,
        #[arg(long, default_value = "scrape-client-state.json")]
        state_file: PathBuf,
    },

    /// Apply database migrations and exit
    Migrate,
}

/// Console plus daily rotating per-level log files
///
/// Log files are created as: logs/info.2024-12-22.log, logs/error.2024-12-22.log, etc.
fn init_tracing(log_dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let info_file = tracing_appender::rolling::daily(log_dir, "info.log");
    let warn_file = tracing_appender::rolling::daily(log_dir, "warn.log");
    let error_file = tracing_appender::rolling::daily(log_dir, "error.log");
    let debug_file = tracing_appender::rolling::daily(log_dir, "debug.log");

    let info_layer = tracing_subscriber::fmt::layer()
        .with_writer(info_file)
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);

    let warn_layer = tracing_subscriber::fmt::layer()
        .with_writer(warn_file)
        .with_ansi(false)
        .with_filter(LevelFilter::WARN);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_file)
        .with_ansi(false)
        .with_filter(LevelFilter::ERROR);

    let debug_layer = tracing_subscriber::fmt::layer()
        .with_writer(debug_file)
        .with_ansi(false)
        .with_filter(LevelFilter::DEBUG);

    // stderr keeps `watch` output on stdout machine-readable
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(info_layer)
        .with(warn_layer)
        .with(error_layer)
        .with(debug_layer)
        .init();

    Ok(())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    // Load configuration from environment
    let config = Config::from_env().map_err(io::Error::other)?;
    init_tracing(&config.log_dir)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Watch {
            server,
            url,
            company,
            state_file,
            poll_interval_secs,
            max_polls,
        } => {
            let settings = ControllerSettings {
                poll_interval: Duration::from_secs(poll_interval_secs),
                max_polls,
                ..ControllerSettings::default()
            };
            watch(&server, &url, company.as_deref(), state_file, settings).await
        }
        Commands::Reset {
            server,
            company,
            state_file,
        } => reset(&server, &company, state_file).await,
        Commands::Migrate => migrate(&config).await,
    }
}

async fn connect(config: &Config, database_url: &str) -> io::Result<sqlx::Pool<sqlx::Postgres>> {
    let pool = db::connection::get_connection(database_url, config.max_db_connections)
        .await
        .map_err(io::Error::other)?;
    info!("Database connection pool established");

    db::migrations::run_migrations(&pool)
        .await
        .map_err(io::Error::other)?;
    Ok(pool)
}

async fn migrate(config: &Config) -> io::Result<()> {
    let Some(database_url) = config.database_url.as_deref() else {
        return Err(io::Error::other("DATABASE_URL must be set to run migrations"));
    };
    let pool = connect(config, database_url).await?;
    pool.close().await;
    Ok(())
}

async fn serve(config: Config) -> io::Result<()> {
    info!("Starting scrape-runner");
    info!("Configuration loaded successfully:");
    info!("  - Max payload size: {} bytes", config.max_payload_size);
    info!("  - Max concurrent scrapes: {}", config.max_concurrent_scrapes);
    info!("  - Abandoned run threshold: {}s", config.run_max_age.num_seconds());
    info!("  - Worker timeout: {}s", config.worker_timeout.as_secs());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let backend = match config.database_url.as_deref() {
        Some(database_url) => {
            info!("  - Max database connections: {}", config.max_db_connections);
            let pool = connect(&config, database_url).await?;
            Backend::postgres(pool, clock.clone(), config.run_max_age)
        }
        None => {
            warn!("DATABASE_URL not set, keeping runs and records in memory");
            Backend::in_memory(clock.clone(), config.run_max_age)
        }
    };

    let fetcher = HttpFetcher::new(Duration::from_secs(30)).map_err(io::Error::other)?;
    let mut worker = ExtractionWorker::new(
        Arc::new(fetcher),
        backend.registry.clone(),
        backend.store.clone(),
        clock.clone(),
        config.worker_timeout,
    );
    if let Some(openai) = &config.openai {
        let enricher = OpenAiEnricher::new(
            openai.base_url.clone(),
            openai.api_key.clone(),
            openai.model.clone(),
            Duration::from_secs(60),
        )
        .map_err(io::Error::other)?;
        info!("  - Enrichment model: {}", openai.model);
        info!("  - Enrichment budget: {}s", openai.enrich_timeout.as_secs());
        worker = worker
            .with_enricher(Arc::new(enricher))
            .with_enrich_timeout(openai.enrich_timeout);
    }

    let state = AppState::new(&backend, worker, config.max_concurrent_scrapes, clock);
    let max_payload_size = config.max_payload_size;
    let server_state = state.clone();

    let server = HttpServer::new(move || {
        // Configure payload size limits globally
        let payload_config = web::PayloadConfig::default().limit(max_payload_size);
        let multipart_config = MultipartFormConfig::default().total_limit(max_payload_size);

        App::new()
            .app_data(payload_config)
            .app_data(multipart_config)
            .configure(|cfg| server_state.configure(cfg))
    });

    info!("Server starting on http://{}:{}", config.bind_addr, config.port);

    let server = server.bind((config.bind_addr.as_str(), config.port))?.run();
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    let coordinator =
        ShutdownCoordinator::new(server_handle, server_task, state.workers.clone(), backend.pool);
    coordinator.wait_for_shutdown().await
}

fn client_controller(
    server: &str,
    company_key: &str,
    state_file: PathBuf,
    settings: ControllerSettings,
) -> io::Result<ClientRunController> {
    let api = HttpScrapeApi::new(server, Duration::from_secs(30)).map_err(io::Error::other)?;
    Ok(ClientRunController::new(
        company_key,
        Arc::new(api),
        Arc::new(FileStorage::new(state_file)),
        Arc::new(SystemClock),
        Arc::new(TokioSleeper),
        settings,
    ))
}

async fn watch(
    server: &str,
    url: &str,
    company: Option<&str>,
    state_file: PathBuf,
    settings: ControllerSettings,
) -> io::Result<()> {
    let company_key = company
        .map(normalize_company)
        .filter(|key| !key.is_empty())
        .or_else(|| company_key_from_url(url))
        .ok_or_else(|| io::Error::other(format!("cannot derive a company from {}", url)))?;

    let controller = client_controller(server, &company_key, state_file, settings)?;

    let state = match controller.initialize() {
        Reconciliation::Resumed => {
            info!(company = %company_key, "Found a recent in-progress run, polling it");
            controller.poll().await
        }
        reconciliation => {
            info!(company = %company_key, ?reconciliation, "Starting scrape");
            controller.run(url).await.map_err(io::Error::other)?
        }
    };

    match state {
        ControllerState::Done(result) => {
            let json = serde_json::to_string_pretty(&result).map_err(io::Error::other)?;
            println!("{}", json);
            Ok(())
        }
        ControllerState::Failed(e) => Err(io::Error::other(e)),
        other => Err(io::Error::other(format!("scrape ended in state {:?}", other))),
    }
}

async fn reset(server: &str, company: &str, state_file: PathBuf) -> io::Result<()> {
    let controller = client_controller(
        server,
        &normalize_company(company),
        state_file,
        ControllerSettings::default(),
    )?;
    controller.reset().await.map_err(io::Error::other)?;
    info!(company = %controller.company_key(), "Scrape run reset");
    Ok(())
}

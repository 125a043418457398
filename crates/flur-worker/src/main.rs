use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::TimeDelta;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use flur_client::connectors::{BraveSearch, GoogleSearch};
use flur_client::ner::DEFAULT_NER_MODEL;
use flur_client::{
    CommandOcr, FetcherConfig, HttpEntityRecognizer, LopdfExtractor, ResilientFetcher,
    SourceSelector,
};
use flur_core::crawl::CrawlService;
use flur_core::document::DocumentProcessor;
use flur_core::job::{JobStatus, JobType, NewJob, ParcelPayload, WorkerConfig};
use flur_core::job_queue::JobQueue;
use flur_core::privacy::PrivacyEngine;
use flur_core::producer::Producer;
use flur_core::worker::{JobDispatcher, TracingWorkerReporter, WorkerService};
use flur_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(
    name = "flur-worker",
    version,
    about = "Crawls municipal council portals for planning documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the producer and job consumer until interrupted
    Run(RunArgs),

    /// Apply pending database migrations and exit
    Migrate,

    /// Print job counts per status
    Status,

    /// Queue a virtual parcel calculation
    EnqueueParcel {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Identifier stamped on leased jobs (random if unset)
    #[arg(long, env = "WORKER_ID")]
    worker_id: Option<String>,

    /// Seconds to wait between polls when the queue is empty
    #[arg(long, env = "WORKER_POLL_INTERVAL", default_value_t = 2)]
    poll_interval: u64,

    /// Seconds between producer scans
    #[arg(long, env = "PRODUCER_INTERVAL", default_value_t = 60)]
    producer_interval: u64,

    /// Profiles scouted within this many hours are not queued again
    #[arg(long, env = "SCOUT_STALENESS_HOURS", default_value_t = 24)]
    staleness_hours: i64,

    /// Seconds after which a lease held by an unresponsive worker is failed
    /// and the job handed out again
    #[arg(long, env = "JOB_LEASE_TIMEOUT", default_value_t = 3600)]
    lease_timeout: u64,

    /// Base URL of the NER service
    #[arg(long, env = "NER_SERVICE_URL")]
    ner_url: String,

    /// NER model that must be loaded before the worker starts
    #[arg(long, env = "PRIVACY_NER_MODEL", default_value = DEFAULT_NER_MODEL)]
    ner_model: String,

    /// OCR command template; `{input}` is replaced by the PDF path
    #[arg(long, env = "OCR_COMMAND")]
    ocr_command: Option<String>,

    #[arg(long, env = "BRAVE_API_KEY", hide_env_values = true)]
    brave_api_key: Option<String>,

    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    google_api_key: Option<String>,

    #[arg(long, env = "GOOGLE_SEARCH_ENGINE_ID")]
    google_search_engine_id: Option<String>,

    /// Do not apply migrations on startup
    #[arg(long, default_value_t = false)]
    skip_migrations: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("flur=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Migrate => {
            let db = connect_db().await?;
            db.migrate().await.context("Failed to apply migrations")?;
            tracing::info!("Migrations applied");
            Ok(())
        }
        Commands::Status => cmd_status(&connect_db().await?).await,
        Commands::EnqueueParcel { lat, lon } => {
            let db = connect_db().await?;
            let payload = serde_json::to_value(ParcelPayload { lat, lon })?;
            let job = db
                .job_queue()
                .push(NewJob::new(JobType::CalculateParcel, payload))
                .await
                .context("Failed to queue parcel job")?;
            println!("{}", job.id);
            Ok(())
        }
    }
}

/// Connect to PostgreSQL using DATABASE_URL.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    Ok(db)
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let staleness = staleness_window(args.staleness_hours)?;
    let db = connect_db().await?;
    if !args.skip_migrations {
        db.migrate().await.context("Failed to apply migrations")?;
    }

    // Without working PII detection nothing may be stored.
    let http = reqwest::Client::new();
    let recognizer = HttpEntityRecognizer::connect(http.clone(), &args.ner_url, &args.ner_model)
        .await
        .context("NER service check failed")?;

    let fetcher =
        ResilientFetcher::new(FetcherConfig::from_env()).context("Failed to build HTTP client")?;

    let mut selector = SourceSelector::new(fetcher.clone());
    if let Some(key) = args.brave_api_key.filter(|k| !k.is_empty()) {
        selector = selector.with_brave(BraveSearch::new(http.clone(), key));
    }
    match (args.google_api_key, args.google_search_engine_id) {
        (Some(key), Some(cx)) if !key.is_empty() && !cx.is_empty() => {
            selector = selector.with_google(GoogleSearch::new(http.clone(), key, cx));
        }
        (Some(_), None) | (None, Some(_)) => {
            tracing::warn!("Google search needs GOOGLE_API_KEY and GOOGLE_SEARCH_ENGINE_ID");
        }
        _ => {}
    }
    let search = selector.search_availability();
    tracing::info!(
        brave = search.primary,
        google = search.secondary,
        "Search fallback"
    );

    let ocr = args.ocr_command.as_deref().and_then(CommandOcr::detect);
    let pipeline = DocumentProcessor::new(
        fetcher,
        LopdfExtractor,
        ocr,
        PrivacyEngine::new(recognizer),
    );

    let crawler = CrawlService::new(
        selector,
        pipeline,
        db.audit_log(),
        db.evidence(),
        db.profiles(),
    );
    let parcels = db
        .parcel_engine()
        .await
        .context("Failed to probe parcel engine")?;

    let mut config = WorkerConfig::default()
        .with_poll_interval(Duration::from_secs(args.poll_interval.max(1)))
        .with_producer_interval(Duration::from_secs(args.producer_interval.max(1)));
    if let Some(id) = args.worker_id.filter(|id| !id.is_empty()) {
        config = config.with_worker_id(id);
    }

    let handler = JobDispatcher::new(crawler, parcels, config.worker_id.clone());
    let queue = db
        .job_queue()
        .with_lease_timeout(Duration::from_secs(args.lease_timeout.max(1)));
    let producer = Producer::new(queue.clone(), db.profiles()).with_staleness(staleness);
    let worker = WorkerService::new(queue, handler, db.profiles(), config).with_producer(producer);

    let cancel_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel_token.clone()));

    worker
        .run(cancel_token, &TracingWorkerReporter)
        .await
        .context("Worker loop failed")?;

    Ok(())
}

fn staleness_window(hours: i64) -> Result<TimeDelta> {
    TimeDelta::try_hours(hours.max(0))
        .ok_or_else(|| anyhow!("SCOUT_STALENESS_HOURS out of range: {hours}"))
}

async fn cmd_status(db: &Database) -> Result<()> {
    let queue = db.job_queue();
    for status in [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Dead,
    ] {
        let count = queue.count_by_status(status).await?;
        println!("{:<12} {count}", status.as_str());
    }
    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        return;
    }
    tracing::info!("Shutdown signal received");
    cancel_token.cancel();
}

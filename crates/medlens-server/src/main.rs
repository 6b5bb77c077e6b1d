mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use medlens_api::{AppState, AppStateInner};
use medlens_db::Database;
use medlens_ingest::{
    AppendLog, CollectStage, Collector, EnrichStage, EnrichmentWriter, HttpDetector, HttpSource,
    Orchestrator, PersistStage, Persister, SourceClient, Stage, TransformStage, Transformer,
};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "medlens", version, about = "Channel message ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch channel history into the append log.
    Collect {
        /// Partition date (UTC today when omitted).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Load every append-log partition into raw_messages.
    Persist,
    /// Run the configured transformation command.
    Transform,
    /// Run object detection over downloaded images.
    Enrich,
    /// Collect, persist, transform and enrich in order.
    Run,
    /// Serve the read API.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "medlens=info,medlens_ingest=info,medlens_db=info,medlens_api=info,tower_http=info"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Collect { date } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let stats = collector(&config)?.collect(date).await?;
            info!(
                "Collected {} messages from {} channels into {}",
                stats.messages, stats.channels, date
            );
        }
        Commands::Persist => persist_stage(&config, open_db(&config)?).run().await?,
        Commands::Transform => transform_stage(&config).run().await?,
        Commands::Enrich => enrich_stage(&config, open_db(&config)?)?.run().await?,
        Commands::Run => run_pipeline(&config).await?,
        Commands::Serve => serve(&config).await?,
    }

    Ok(())
}

fn open_db(config: &Config) -> anyhow::Result<Arc<Database>> {
    Ok(Arc::new(Database::open(&config.db_path)?))
}

fn collector(config: &Config) -> anyhow::Result<Collector> {
    let source = HttpSource::new(config.source()?)?;
    Ok(Collector::new(
        SourceClient::new(Arc::new(source), config.client()),
        AppendLog::new(config.raw_dir.clone()),
        config.channels.clone(),
        config.fetch_limit,
    ))
}

fn persist_stage(config: &Config, db: Arc<Database>) -> PersistStage {
    PersistStage {
        persister: Persister::new(db),
        root: config.raw_dir.clone(),
    }
}

fn transform_stage(config: &Config) -> TransformStage {
    TransformStage(Transformer::new(config.transform_command.as_deref()))
}

fn enrich_stage(config: &Config, db: Arc<Database>) -> anyhow::Result<EnrichStage> {
    let detector = HttpDetector::new(config.detector_url()?, config.http_timeout())?;
    Ok(EnrichStage {
        writer: EnrichmentWriter::new(db, Arc::new(detector)),
        root: config.raw_dir.clone(),
    })
}

async fn run_pipeline(config: &Config) -> anyhow::Result<()> {
    let db = open_db(config)?;
    let orchestrator = Orchestrator::new(
        Arc::new(CollectStage(collector(config)?)),
        Arc::new(persist_stage(config, db.clone())),
        Arc::new(transform_stage(config)),
        Arc::new(enrich_stage(config, db)?),
    );

    let report = orchestrator.run().await;
    if let Some(failure) = report.failure {
        let succeeded: Vec<&str> = report
            .run
            .succeeded_stages()
            .into_iter()
            .map(|s| s.name())
            .collect();
        bail!(
            "run {} failed: {} (succeeded: [{}])",
            report.run.id(),
            failure,
            succeeded.join(", ")
        );
    }
    Ok(())
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.db_path)?;
    let state: AppState = Arc::new(AppStateInner { db });

    let app = medlens_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid MEDLENS_HOST/MEDLENS_PORT")?;
    info!("medlens API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            },
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

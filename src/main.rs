use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daily_load_forecaster::{api, app, config, ingest, ml, repo, telemetry};
use config::Config;
use std::path::PathBuf;
use telemetry::init_tracing;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about = "Daily electricity consumption forecaster", long_about = None)]
struct Cli {
    /// Configuration file layered under `LOADCAST__*` environment variables
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve `GET /api/v1/predict?d=YYYY-MM-DD`
    Serve,
    /// Fetch consumption and weather, then load them into the store
    Etl,
    /// Train a windowed linear model and publish its artefacts
    Train,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let cfg = Config::load_from(&cli.config)?;

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Etl => etl(cfg).await,
        Command::Train => train(cfg).await,
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let app_state = app::AppState::new(&cfg).await?;
    let app = api::router(app_state, &cfg);

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("Server binding to 0.0.0.0, the service is reachable from the network");
    }

    info!(%addr, "starting daily load forecaster");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}

async fn etl(cfg: Config) -> Result<()> {
    if cfg.db.url.is_some() && cfg!(feature = "db") {
        let repos = repo::Repositories::new(&cfg).await?;
        let report = ingest::run_etl(&cfg.ingest, repos.observations.as_ref()).await?;
        info!(
            observations = report.observations,
            baseline_rows = report.baseline_rows,
            "loaded observations into the database"
        );
        return Ok(());
    }

    let path = cfg
        .history
        .snapshot_path
        .clone()
        .context("history.snapshot_path is required without a database")?;
    let store = if path.exists() {
        repo::InMemoryStore::load_snapshot(&path)?
    } else {
        repo::InMemoryStore::new()
    };

    let report = ingest::run_etl(&cfg.ingest, &store).await?;
    store.save_snapshot(&path)?;
    info!(
        observations = report.observations,
        total = store.observation_count(),
        path = %path.display(),
        "wrote history snapshot"
    );
    Ok(())
}

async fn train(cfg: Config) -> Result<()> {
    let repos = repo::Repositories::new(&cfg).await?;
    let observations = repos
        .history
        .fetch_range(cfg.training.train_start, cfg.training.test_end)
        .await?;
    info!(observations = observations.len(), "loaded training history");

    let training = cfg.training.clone();
    let (report, record) =
        tokio::task::spawn_blocking(move || ml::training::train_and_track(&observations, &training))
            .await??;

    report.scalers.save(&cfg.model.scaler_path)?;
    ml::ModelArtifact::WindowedLinear(report.model).save(&cfg.model.model_path)?;

    info!(
        run_id = %record.run_id,
        mae = report.metrics.mae,
        baseline_mae = report.baseline_metrics.mae,
        scaler_path = %cfg.model.scaler_path.display(),
        model_path = %cfg.model.model_path.display(),
        "published model artefacts"
    );
    Ok(())
}

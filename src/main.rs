mod acquisition;
mod admin;
mod cli;
mod config;
mod engine;
mod error;
mod metadata;
mod publication;
mod quota;
mod scheduler;
mod state_machine;
mod store;
#[cfg(test)]
mod test_support;
mod ui;
mod youtube;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use acquisition::AcquisitionStrategy;
use cli::{Cli, Command};
use config::QueueConfig;
use engine::{EngineSettings, QueueEngine};
use quota::QuotaLedger;
use scheduler::{Scheduler, TriggerHandle, trigger_channel};
use state_machine::{JobState, NewJob};
use store::{JobStore, SqliteJobStore};
use youtube::YouTubeClient;

type Engine = QueueEngine<SqliteJobStore, AcquisitionStrategy, YouTubeClient>;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = QueueConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(limit) = cli.daily_limit {
        config.daily_limit = limit;
    }

    let store = SqliteJobStore::open(&config.database_path)
        .with_context(|| format!("opening job store {}", config.database_path.display()))?;

    match cli.command {
        Command::Serve { interval } => {
            if let Some(minutes) = interval {
                ensure!(minutes > 0, "--interval must be at least 1 minute");
                config.interval_minutes = minutes;
            }
            serve(build_engine(store, &config)?, &config).await?;
        }
        Command::Run => {
            let engine = build_engine(store, &config)?;
            let progress = ui::CycleProgress::start("Running one cycle...");
            let result = engine.run_cycle().await;
            progress.finish(&result);
            result?;
        }
        Command::Add {
            source,
            title,
            description,
        } => {
            let new = NewJob {
                source_reference: source,
                title,
                description_seed: description,
            };
            let job = admin::enqueue(&store, new).await?;
            ui::print_enqueued(&[job]);
        }
        Command::AddBulk { file } => {
            let contents = read_input(&file).await?;
            let jobs = admin::enqueue_bulk(&store, contents.lines()).await?;
            ui::print_enqueued(&jobs);
        }
        Command::List { state, json } => {
            let filter = state.as_deref().map(str::parse::<JobState>).transpose()?;
            let jobs: Vec<_> = store
                .list()
                .await?
                .into_iter()
                .filter(|job| filter.is_none_or(|state| job.state == state))
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else {
                ui::print_jobs(&jobs);
            }
        }
        Command::Requeue { id } => {
            let job = admin::requeue(&store, &id, &config.media_dir).await?;
            ui::print_moved(&job, JobState::Failed);
        }
        Command::Recover => {
            let recovered = admin::recover(&store, &config.media_dir).await?;
            for (from, job) in &recovered {
                ui::print_moved(job, *from);
            }
            println!("{} job(s) recovered", recovered.len());
        }
        Command::Quota => {
            let status = QuotaLedger::status(&store, config.daily_limit).await?;
            ui::print_quota(&status);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "reelqueue=debug"
    } else {
        "reelqueue=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Wire the configured acquisition strategy and the YouTube publisher to the store.
fn build_engine(store: SqliteJobStore, config: &QueueConfig) -> Result<Engine> {
    let credentials = config.credentials()?;

    std::fs::create_dir_all(&config.media_dir)
        .with_context(|| format!("creating media directory {}", config.media_dir.display()))?;
    let acquirer = AcquisitionStrategy::from_config(&config.acquisition, config.media_dir.clone())?;

    let publication = &config.publication;
    let upload_timeout = Duration::from_secs(publication.timeout_secs);
    let publisher = match (&publication.token_url, &publication.upload_url) {
        (None, None) => YouTubeClient::new(credentials, upload_timeout)?,
        (token_url, upload_url) => YouTubeClient::with_endpoints(
            credentials,
            token_url.clone().unwrap_or_else(|| youtube::client::TOKEN_URL.to_string()),
            upload_url.clone().unwrap_or_else(|| youtube::client::UPLOAD_URL.to_string()),
            upload_timeout,
        )?,
    };

    info!(
        strategy = acquirer.name(),
        media_dir = %config.media_dir.display(),
        daily_limit = config.daily_limit,
        "Engine ready"
    );
    Ok(QueueEngine::new(
        store,
        acquirer,
        publisher,
        EngineSettings::from_config(config),
    ))
}

async fn serve(engine: Engine, config: &QueueConfig) -> Result<()> {
    let (handle, queue) = trigger_channel();
    listen_for_manual_trigger(handle)?;

    let period = Duration::from_secs(config.interval_minutes * 60);
    Scheduler::new(engine, period, queue)
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    Ok(())
}

/// SIGUSR1 requests an immediate cycle.
#[cfg(unix)]
fn listen_for_manual_trigger(handle: TriggerHandle) -> Result<()> {
    use scheduler::TriggerAck;
    use tokio::signal::unix::{SignalKind, signal};

    let mut usr1 = signal(SignalKind::user_defined1()).context("installing SIGUSR1 handler")?;
    tokio::spawn(async move {
        while usr1.recv().await.is_some() {
            match handle.trigger() {
                TriggerAck::Queued => info!("Manual trigger queued"),
                TriggerAck::AlreadyPending => info!("Manual trigger already pending"),
                TriggerAck::Closed => break,
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn listen_for_manual_trigger(_handle: TriggerHandle) -> Result<()> {
    Ok(())
}

/// Read a whole file, or standard input for `-`.
async fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut contents = String::new();
        tokio::io::stdin().read_to_string(&mut contents).await?;
        return Ok(contents);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

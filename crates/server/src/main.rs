// crates/server/src/main.rs
//! Batchwright binary.
//!
//! `serve` runs the HTTP server. `import` and `backup` start a job and drive
//! it to completion, either through a server or in-process with `--local`.

use std::net::SocketAddr;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use batchwright_core::{
    AppConfig, JobEndpoint, JobEngine, JobState, JobStatus, PollEvent, Poller, PollerConfig,
    Severity,
};
use batchwright_db::Database;
use batchwright_server::cli::{Cli, Commands, RunArgs};
use batchwright_server::{create_app, init_metrics, state, AppState, HttpEndpoint};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

fn init_tracing(default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // Client commands keep stderr free for the progress bar.
    init_tracing(match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    })?;

    let config = AppConfig::load().context("failed to load configuration")?;

    match &cli.command {
        Commands::Serve { port } => serve(&config, port.unwrap_or(config.server.port)).await,
        Commands::Import {
            job_type,
            file,
            run,
        } => {
            if run.local {
                let engine = local_engine(&config).await?;
                let handle = tokio::fs::File::open(file)
                    .await
                    .with_context(|| format!("failed to open {}", file.display()))?;
                let started = engine
                    .initiate(*job_type, &display_name(file), handle)
                    .await?;
                drive(engine, started, run).await
            } else {
                let client = HttpEndpoint::new(&cli.server_url(config.server.port));
                let started = client.initiate(*job_type, file).await?;
                drive(client, started, run).await
            }
        }
        Commands::Backup { dir, run } => {
            if run.local {
                let engine = local_engine(&config).await?;
                let started = engine.initiate_backup(dir).await?;
                drive(engine, started, run).await
            } else {
                let client = HttpEndpoint::new(&cli.server_url(config.server.port));
                let started = client.initiate_backup(dir).await?;
                drive(client, started, run).await
            }
        }
        Commands::Status => {
            let client = HttpEndpoint::new(&cli.server_url(config.server.port));
            let snapshot = client.status().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        Commands::Clear => {
            let client = HttpEndpoint::new(&cli.server_url(config.server.port));
            let report = client.clear().await?;
            if report.cleared {
                eprintln!(
                    "  \u{2713} Cleared ({} staged file{} removed)",
                    report.artifacts_removed,
                    if report.artifacts_removed == 1 { "" } else { "s" }
                );
            } else {
                eprintln!("  \u{2717} A batch is in progress; nothing was cleared");
            }
            Ok(())
        }
    }
}

async fn serve(config: &AppConfig, port: u16) -> Result<()> {
    let startup_start = Instant::now();
    init_metrics();

    eprintln!("\n\u{2699} batchwright v{}\n", env!("CARGO_PKG_VERSION"));

    let db = Database::new(&config.server.db_path)
        .await
        .with_context(|| format!("failed to open {}", config.server.db_path.display()))?;
    let state = AppState::build(config, db).with_context(|| {
        format!(
            "failed to open the job store in {}",
            config.engine.data_dir.display()
        )
    })?;
    let app = create_app(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        data_dir = %config.engine.data_dir.display(),
        batch_size = config.engine.batch_size,
        "Server ready"
    );
    eprintln!(
        "  \u{2713} Ready in {}ms",
        startup_start.elapsed().as_millis()
    );
    eprintln!("  \u{2192} http://localhost:{}\n", port);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn local_engine(config: &AppConfig) -> Result<JobEngine> {
    let db = Database::new(&config.server.db_path)
        .await
        .with_context(|| format!("failed to open {}", config.server.db_path.display()))?;
    let handlers = state::handlers(db, &config.server.backup_dir);
    Ok(JobEngine::new(&config.engine, handlers)?)
}

fn display_name(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string())
}

fn progress_bar(total: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner} [{bar:30}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn log_line(severity: Severity, message: &str) -> String {
    let mark = match severity {
        Severity::Info => "\u{00b7}",
        Severity::Success => "\u{2713}",
        Severity::Warning => "!",
        Severity::Error => "\u{2717}",
    };
    format!("  {mark} {message}")
}

/// Poll `endpoint` until the job is terminal, echoing new log lines.
async fn drive<E: JobEndpoint>(endpoint: E, started: JobStatus, run: &RunArgs) -> Result<()> {
    eprintln!("  Job {} ({})", started.job_id, started.job_type);
    for entry in &started.log {
        eprintln!("{}", log_line(entry.severity, &entry.message));
    }
    if run.detach {
        return Ok(());
    }

    let pb = progress_bar(started.total)?;
    let mut printed = started.log.len();
    let poller = Poller::new(
        endpoint,
        PollerConfig {
            clear_on_finish: run.clear,
            ..PollerConfig::default()
        },
    );

    let result = poller
        .run(|event| match event {
            PollEvent::Progress(status) | PollEvent::Finished(status) => {
                for entry in status.log.iter().skip(printed) {
                    pb.println(log_line(entry.severity, &entry.message));
                }
                printed = printed.max(status.log.len());
                pb.set_position(status.processed);
                pb.set_message(format!("{}%", status.percent()));
            }
            PollEvent::Busy => pb.set_message("waiting for the running batch"),
            PollEvent::Retrying {
                attempt,
                delay,
                error,
            } => pb.set_message(format!("retry {attempt} in {delay:?}: {error}")),
            PollEvent::Cleared(report) => pb.println(format!(
                "  \u{00b7} Cleared ({} staged files removed)",
                report.artifacts_removed
            )),
        })
        .await;
    pb.finish_and_clear();

    let status = result.map_err(|e| anyhow::anyhow!("{e}"))?;
    eprintln!(
        "\n  {} processed, {} succeeded, {} failed",
        status.processed, status.success, status.failed
    );
    if status.state == JobState::Error {
        anyhow::bail!(
            "job {} failed: {}",
            status.job_id,
            status.last_error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

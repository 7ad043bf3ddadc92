mod cli;

use chartsync::config::{Manifest, Settings};
use chartsync::coordinator::{Coordinator, SyncOptions};
use chartsync::index::IndexCache;
use chartsync::progress::ProgressBoard;
use chartsync::publish::{Publisher, ShellRunner};
use chartsync::worker::ItemOutcome;
use chartsync::worker::http::{Downloader, build_client};
use clap::Parser;
use cli::{Cli, Commands, ResolveArgs, SyncArgs};
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use time::macros::format_description;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;

type AnyError = Box<dyn Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() -> Result<ExitCode, AnyError> {
    let cli = Cli::parse();

    let debug = match &cli.command {
        Commands::Sync(args) => args.debug,
        Commands::Resolve(args) => args.debug,
    };
    let progress = ProgressBoard::new();
    init_tracing(debug, &progress);

    let settings = Settings::load()?;
    debug!(path = %chartsync::config::config_path().display(), ?settings, "Settings loaded");

    match cli.command {
        Commands::Sync(args) => sync(args, settings, progress).await,
        Commands::Resolve(args) => resolve(args, settings).await,
    }
}

/// `RUST_LOG` wins unless `--debug` was given; the default is `warn`.
/// Log lines go through the progress board so they print above the bars.
fn init_tracing(debug: bool, progress: &ProgressBoard) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let timer = UtcTime::new(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(timer)
        .with_writer({
            let progress = progress.clone();
            move || progress.log_writer()
        })
        .init();
}

async fn sync(
    args: SyncArgs,
    mut settings: Settings,
    progress: ProgressBoard,
) -> Result<ExitCode, AnyError> {
    if let Some(workers) = args.workers {
        settings.sync.workers = workers;
    }
    if let Some(retries) = args.retries {
        settings.http.retries = retries;
    }
    if let Some(timeout) = args.timeout {
        settings.http.timeout_secs = timeout;
    }
    settings.validate()?;

    let manifest = Manifest::load(&args.manifest)?.filter_chart(args.chart.as_deref())?;
    let coordinator = build_coordinator(&settings)?.with_progress(progress);

    let report = coordinator.run(&manifest).await;

    for item in &report.items {
        if let ItemOutcome::Failed { stage, error } = &item.outcome {
            eprintln!("{}: {stage} failed: {error}", item.name);
        }
    }
    for error in &report.worker_errors {
        eprintln!("worker error: {error}");
    }
    println!("{}", report.summary());

    Ok(if report.exit_ok(settings.sync.fail_on_publish_error) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn resolve(args: ResolveArgs, settings: Settings) -> Result<ExitCode, AnyError> {
    let manifest = Manifest::load(&args.manifest)?.filter_chart(args.chart.as_deref())?;
    let coordinator = build_coordinator(&settings)?;

    let mut failed = false;
    for (request, result) in coordinator.resolve(&manifest).await {
        match result {
            Ok(artifact) => println!("{} {} {}", request.name, artifact.version, artifact.url),
            Err(e) => {
                failed = true;
                eprintln!("{}: {e}", request.name);
            }
        }
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn build_coordinator(settings: &Settings) -> Result<Coordinator, AnyError> {
    let http = settings.http.http_config();
    let client = build_client(&http)?;

    let index = Arc::new(IndexCache::new(client.clone(), settings.http.timeout()));
    let downloader = Arc::new(Downloader::with_client(client, http));
    let publisher = Publisher::new(Arc::new(ShellRunner::new()), settings.commands.clone());
    let options = SyncOptions::builder()
        .workers(settings.sync.workers)
        .version_policy(settings.sync.version_policy)
        .fail_on_publish_error(settings.sync.fail_on_publish_error)
        .build();

    Ok(Coordinator::new(index, downloader, publisher, options))
}

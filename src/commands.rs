use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cli::{DownloadArgs, ProcessArgs, WatchArgs};
use stembox::config::Config;
use stembox::endpoints::Endpoints;
use stembox::http::{HttpConfig, build_client};
use stembox::input::{FileHandle, InputMode, Payload, StemCount};
use stembox::job::{JobId, JobStatus};
use stembox::observability::Metrics;
use stembox::orchestrator::Orchestrator;
use stembox::retrieve::{ArtifactRetriever, RetrievedBundle};
use stembox::tracker::{JobStatusTracker, ReconnectPolicy, WsConnector};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Submit, follow and download in one go
pub async fn process(config: &Config, args: ProcessArgs) -> Result<(), AnyError> {
    let mut orchestrator = Orchestrator::from_config(config)?;

    {
        let selector = orchestrator.edit()?;
        match (args.source.file, args.source.url) {
            (Some(path), _) => {
                selector.set_mode(InputMode::Upload);
                selector.set_payload(Payload::File(FileHandle::from_path(path)))?;
            }
            (None, Some(url)) => {
                selector.set_mode(InputMode::LinkReference);
                selector.set_payload(Payload::Url(url))?;
            }
            (None, None) => return Err("either --file or --url is required".into()),
        }
        selector.set_variant_count(StemCount::try_from(args.stems)?);
    }

    let job_id = match orchestrator.submit().await {
        Ok(job_id) => job_id,
        Err(err) => {
            if let Some(message) = orchestrator.error_message() {
                eprintln!("error: {message}");
            }
            return Err(err.into());
        }
    };
    println!("job {job_id} accepted");

    let updates = orchestrator
        .subscribe()
        .ok_or("job accepted but no status channel was opened")?;

    let Some(outcome) = follow(updates, orchestrator.wait_until_done()).await else {
        orchestrator.reset().await;
        return Err("interrupted".into());
    };
    outcome?;

    if let Some(job) = orchestrator.job() {
        let elapsed = chrono::Utc::now() - job.submitted_at;
        info!(job_id = %job.id, elapsed_secs = elapsed.num_seconds(), "Job finished");
    }

    if args.no_download {
        println!("job {job_id} done");
        return Ok(());
    }

    let dest = args
        .output
        .unwrap_or_else(|| PathBuf::from(&config.download.file_name));
    let bundle = orchestrator.retrieve(&dest).await?;
    report_bundle(&bundle);

    Ok(())
}

/// Follow an existing job until it is done
pub async fn watch(config: &Config, args: WatchArgs) -> Result<(), AnyError> {
    let endpoints = Endpoints::parse(&config.backend.base_url)?;
    let mut tracker = JobStatusTracker::new(
        WsConnector::new(endpoints),
        ReconnectPolicy::from(&config.tracker.reconnect),
        Arc::new(Metrics::new()),
    );

    let job_id = JobId::new(args.job_id);
    let subscription = tracker.track(job_id.clone()).await;
    let outcome = follow(subscription.subscribe(), subscription.wait_for_terminal()).await;
    tracker.stop().await;

    match outcome {
        Some(Some(_)) => {
            println!("job {job_id} done");
            Ok(())
        }
        Some(None) => Err(format!("lost track of job {job_id} before it finished").into()),
        None => Err("interrupted".into()),
    }
}

/// Download a bundle without tracking
pub async fn download(config: &Config, args: DownloadArgs) -> Result<(), AnyError> {
    let endpoints = Endpoints::parse(&config.backend.base_url)?;
    let client = build_client(&HttpConfig::from(&config.backend))?;
    let retriever = ArtifactRetriever::new(client, endpoints, Arc::new(Metrics::new()));

    let dest = args
        .output
        .unwrap_or_else(|| PathBuf::from(&config.download.file_name));
    let bundle = retriever.retrieve(&JobId::new(args.job_id), &dest).await?;
    report_bundle(&bundle);

    Ok(())
}

fn report_bundle(bundle: &RetrievedBundle) {
    println!("saved {} ({} bytes)", bundle.path.display(), bundle.bytes);
}

/// Print status changes while `until` runs. `None` means interrupted.
async fn follow<T>(
    updates: watch::Receiver<JobStatus>,
    until: impl Future<Output = T>,
) -> Option<T> {
    tokio::select! {
        result = until => Some(result),
        _ = print_updates(updates) => None,
        _ = shutdown_signal() => None,
    }
}

async fn print_updates(mut updates: watch::Receiver<JobStatus>) {
    println!("status: {}", *updates.borrow_and_update());
    while updates.changed().await.is_ok() {
        println!("status: {}", *updates.borrow_and_update());
    }
    // Channel ended; let the tracking future report why
    std::future::pending::<()>().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, closing status channel");
}

use std::io::Read;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use ajo_app::collaborators::NoProcessor;
use ajo_app::config::ENV_EVENT_LOG;
use ajo_app::{AppConfig, AppServices};
use ajo_infra::event_store::EventJournal;

fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    ajo_observability::init(&config.observability);

    let path = config
        .event_log
        .clone()
        .with_context(|| format!("{ENV_EVENT_LOG} must point at the event journal"))?;
    let journal = Arc::new(
        EventJournal::open(&path).with_context(|| format!("opening event journal {}", path.display()))?,
    );
    let history = journal.read_all().context("reading event journal")?;

    tracing::info!(
        journal = %path.display(),
        events = history.len(),
        interval_secs = config.sweep_interval_secs,
        retry_attempts = config.dispatch_retry_attempts,
        "starting sweeper"
    );

    let services = Arc::new(
        AppServices::restore(config, Arc::new(NoProcessor), Arc::new(NoProcessor), history)
            .context("restoring ledger from journal")?,
    );
    let journal_worker = services
        .spawn_journal(Arc::clone(&journal))
        .context("spawning journal thread")?;

    let report = services.run_sweep(Utc::now()).context("initial sweep")?;
    tracing::info!(closed = report.closed, failed = report.failed, "initial sweep done");

    let sweeper = services.spawn_sweeper().context("spawning sweeper thread")?;

    // Run until stdin closes.
    let mut sink = Vec::new();
    std::io::stdin().read_to_end(&mut sink).context("reading stdin")?;

    tracing::info!("stdin closed, shutting down");
    sweeper.shutdown();
    journal_worker.shutdown();
    Ok(())
}

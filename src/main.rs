//! # Site Syndicate
//!
//! Syndicates articles from external collectors into many self-hosted blog
//! sites whose admin programs only speak HTML forms.
//!
//! ## Usage
//!
//! ```sh
//! site_syndicate -s sites.yaml -r ./reports
//! ```
//!
//! ## Architecture
//!
//! 1. **Configuration**: the sites file lists every site, its backend, its
//!    categories and what to collect into each of them
//! 2. **Site pool**: per site, bring the hosting panel and the backend session
//!    up, set site metadata and reconcile categories
//! 3. **Action pool**: per category and collector, list source pages and
//!    publish new articles (tags reconciled, tag markers rewritten to links)
//! 4. **Report**: per-site results, optionally written as JSON

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod backend;
mod cli;
mod collectors;
mod config;
mod error;
mod models;
mod orchestrator;
mod outputs;
mod panel;
mod reconcile;
mod registry;
mod rewrite;
#[cfg(test)]
mod testing;
mod utils;

use cli::Cli;
use orchestrator::Orchestrator;
use outputs::report::{self, RunReport};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let started_at = Local::now();
    info!("site_syndicate starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // Early check: ensure the report dir is writable
    if let Some(dir) = &args.report_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir,
                error = %e,
                "Report directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let sites = match config::load_sites(std::path::Path::new(&args.sites)).await {
        Ok(sites) => sites,
        Err(e) => {
            error!(path = %args.sites, error = %e, "Failed to load sites");
            return Err(e.into());
        }
    };

    // ---- Registries ----
    let backends = Arc::new(backend::default_registry());
    let collectors = Arc::new(collectors::default_registry()?);
    info!(
        backends = ?backends.names(),
        collectors = ?collectors.names(),
        "Registries ready"
    );

    // ---- Schedule open sites ----
    let (orchestrator, mut reports) = Orchestrator::start(backends, collectors, args.pool_sizes());
    let mut submitted = 0;
    for site in sites.into_iter().filter(|s| s.open) {
        if orchestrator.submit(site) {
            submitted += 1;
        }
    }
    info!(sites = submitted, "Sites scheduled");

    // ---- Wait for every site or Ctrl-C ----
    let mut site_reports = Vec::with_capacity(submitted);
    let interrupted = loop {
        if site_reports.len() == submitted {
            break false;
        }
        tokio::select! {
            report = reports.recv() => match report {
                Some(report) => {
                    info!(domain = %report.domain, status = ?report.status, "Site finished");
                    site_reports.push(report);
                }
                None => break false,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!(finished = site_reports.len(), submitted, "Interrupted; stopping without waiting for running sites");
                break true;
            }
        }
    };

    if !interrupted {
        orchestrator.shutdown().await;
    }

    let run = RunReport::new(started_at, submitted, site_reports, interrupted);
    info!(
        published = run.totals.published,
        already_published = run.totals.already_published,
        rejected = run.totals.rejected,
        failed = run.totals.failed,
        "Run totals"
    );

    if let Some(dir) = &args.report_dir {
        if let Err(e) = report::write_report(&run, dir).await {
            error!(error = %e, "Failed to write run report");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

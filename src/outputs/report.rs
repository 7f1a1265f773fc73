//! JSON run report.
//!
//! # Output Structure
//!
//! ```text
//! report_dir/
//! └── 2025-05-06/
//!     ├── 08-00-03.json
//!     └── 20-00-01.json
//! ```

use crate::reconcile::CollectStats;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// How a site's run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SiteStatus {
    Completed,
    /// The site was abandoned at `stage` (panel, login, initialize, metadata).
    Failed { stage: &'static str, error: String },
}

/// What happened on one site.
#[derive(Debug, Clone, Serialize)]
pub struct SiteReport {
    pub domain: String,
    pub status: SiteStatus,
    pub categories_reconciled: usize,
    pub categories_failed: usize,
    pub jobs_dispatched: usize,
    pub jobs_completed: usize,
    pub articles: CollectStats,
}

impl SiteReport {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            status: SiteStatus::Completed,
            categories_reconciled: 0,
            categories_failed: 0,
            jobs_dispatched: 0,
            jobs_completed: 0,
            articles: CollectStats::default(),
        }
    }

    /// Mark the site as abandoned at `stage`.
    pub fn failed(mut self, stage: &'static str, error: impl ToString) -> Self {
        self.status = SiteStatus::Failed {
            stage,
            error: error.to_string(),
        };
        self
    }
}

/// Everything one run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    /// `true` when the run was stopped by Ctrl-C before every site reported.
    pub interrupted: bool,
    pub sites_submitted: usize,
    pub totals: CollectStats,
    pub sites: Vec<SiteReport>,
}

impl RunReport {
    pub fn new(
        started_at: DateTime<Local>,
        sites_submitted: usize,
        sites: Vec<SiteReport>,
        interrupted: bool,
    ) -> Self {
        let mut totals = CollectStats::default();
        for site in &sites {
            totals.merge(&site.articles);
        }
        Self {
            started_at,
            finished_at: Local::now(),
            interrupted,
            sites_submitted,
            totals,
            sites,
        }
    }
}

/// Write `report` to `{report_dir}/{date}/{time}.json` and return the path.
#[instrument(level = "info", skip_all, fields(report_dir = %report_dir))]
pub async fn write_report(report: &RunReport, report_dir: &str) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;

    let dir = PathBuf::from(report_dir).join(report.started_at.format("%Y-%m-%d").to_string());
    if let Err(e) = fs::create_dir_all(&dir).await {
        error!(dir = %dir.display(), error = %e, "Failed to create report dir");
        return Err(e.into());
    }

    let path = dir.join(format!("{}.json", report.started_at.format("%H-%M-%S")));
    fs::write(&path, json).await?;
    info!(path = %path.display(), sites = report.sites.len(), "Wrote run report");
    Ok(path)
}

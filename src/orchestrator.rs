//! Concurrent collection over many sites.
//!
//! Two worker pools drain two unbounded queues:
//!
//! - **Site workers** take a [`SiteConfig`], bring its panel and backend
//!   session up, reconcile its categories and enqueue one action job per
//!   collector named by each category.
//! - **Action workers** run one job: every source tag × page of one collector
//!   into one category.
//!
//! A site worker waits for its jobs on one-shot completion signals, so it
//! never occupies an action worker while waiting, and action workers never
//! wait on anything but their own job. Any pool sizes ≥ 1 make progress.

use crate::backend::BackendRegistry;
use crate::collectors::CollectorRegistry;
use crate::config::{CategoryConfig, SharedSession, SiteConfig};
use crate::error::PanelError;
use crate::outputs::report::SiteReport;
use crate::panel::SESSION_TIMEOUT;
use crate::reconcile::{CollectStats, PublishTarget, collect_page, reconcile_category};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_SITE_WORKERS: usize = 50;
pub const DEFAULT_ACTION_WORKERS: usize = 50;

/// Worker pool sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizes {
    pub site_workers: usize,
    pub action_workers: usize,
}

impl Default for PoolSizes {
    fn default() -> Self {
        Self {
            site_workers: DEFAULT_SITE_WORKERS,
            action_workers: DEFAULT_ACTION_WORKERS,
        }
    }
}

/// One collector run into one category of one site.
struct ActionJob {
    target: PublishTarget,
    category: Arc<CategoryConfig>,
    source: String,
    done: oneshot::Sender<CollectStats>,
}

/// Shared by every site worker.
struct SiteContext {
    backends: Arc<BackendRegistry>,
    actions: mpsc::UnboundedSender<ActionJob>,
    reports: mpsc::UnboundedSender<SiteReport>,
}

/// Handle on the running pools.
pub struct Orchestrator {
    sites: mpsc::UnboundedSender<SiteConfig>,
    site_workers: Vec<JoinHandle<()>>,
    action_workers: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    /// Spawn both pools. Site reports arrive on the returned receiver, one per
    /// submitted site, in completion order.
    pub fn start(
        backends: Arc<BackendRegistry>,
        collectors: Arc<CollectorRegistry>,
        sizes: PoolSizes,
    ) -> (Self, mpsc::UnboundedReceiver<SiteReport>) {
        let (site_tx, site_rx) = mpsc::unbounded_channel::<SiteConfig>();
        let (action_tx, action_rx) = mpsc::unbounded_channel::<ActionJob>();
        let (report_tx, report_rx) = mpsc::unbounded_channel::<SiteReport>();

        let action_rx = Arc::new(Mutex::new(action_rx));
        let action_workers = (0..sizes.action_workers.max(1))
            .map(|worker_id| {
                let rx = Arc::clone(&action_rx);
                let collectors = Arc::clone(&collectors);
                tokio::spawn(action_worker(worker_id, rx, collectors))
            })
            .collect();

        let ctx = Arc::new(SiteContext {
            backends,
            actions: action_tx,
            reports: report_tx,
        });
        let site_rx = Arc::new(Mutex::new(site_rx));
        let site_workers = (0..sizes.site_workers.max(1))
            .map(|worker_id| {
                let rx = Arc::clone(&site_rx);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(site_worker(worker_id, rx, ctx))
            })
            .collect();

        info!(
            site_workers = sizes.site_workers.max(1),
            action_workers = sizes.action_workers.max(1),
            "Worker pools started"
        );

        let orchestrator = Self {
            sites: site_tx,
            site_workers,
            action_workers,
        };
        (orchestrator, report_rx)
    }

    /// Queue a site. Returns `false` once the pools are gone.
    pub fn submit(&self, site: SiteConfig) -> bool {
        let domain = site.domain().to_string();
        match self.sites.send(site) {
            Ok(()) => {
                debug!(%domain, "Site queued");
                true
            }
            Err(_) => {
                error!(%domain, "Site queue closed; site not scheduled");
                false
            }
        }
    }

    /// Close the site queue and wait for both pools to drain.
    pub async fn shutdown(self) {
        drop(self.sites);
        for worker in self.site_workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Site worker panicked");
            }
        }
        // The action queue closes once the last site worker is gone.
        for worker in self.action_workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Action worker panicked");
            }
        }
        info!("Worker pools stopped");
    }
}

async fn site_worker(worker_id: usize, rx: Arc<Mutex<mpsc::UnboundedReceiver<SiteConfig>>>, ctx: Arc<SiteContext>) {
    debug!(worker_id, "Site worker started");
    loop {
        let site = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(site) = site else { break };

        let report = run_site(site, &ctx).await;
        if ctx.reports.send(report).is_err() {
            debug!(worker_id, "Report receiver gone");
        }
    }
    debug!(worker_id, "Site worker stopped");
}

async fn action_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<ActionJob>>>,
    collectors: Arc<CollectorRegistry>,
) {
    debug!(worker_id, "Action worker started");
    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else { break };

        let ActionJob {
            target,
            category,
            source,
            done,
        } = job;
        let stats = run_action(&target, &category, &source, &collectors).await;
        if done.send(stats).is_err() {
            warn!(domain = %target.domain, collector = %source, "Site stopped waiting for job");
        }
    }
    debug!(worker_id, "Action worker stopped");
}

/// Bring one site up and collect into every category.
#[instrument(level = "info", skip_all, fields(domain = %site.domain()))]
async fn run_site(mut site: SiteConfig, ctx: &SiteContext) -> SiteReport {
    let report = SiteReport::new(site.domain());

    let Some(panel) = site.panel.clone() else {
        error!("Site has no hosting panel");
        return report.failed("panel", "no hosting panel configured");
    };
    match timeout(SESSION_TIMEOUT, panel.ensure_session()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(error = %e, "Hosting panel session failed");
            return report.failed("panel", e);
        }
        Err(_) => {
            let e = PanelError::Timeout(SESSION_TIMEOUT);
            error!(error = %e, "Hosting panel session failed");
            return report.failed("panel", e);
        }
    }

    let session = match site.session.clone() {
        Some(session) => session,
        None => match login(&site, &ctx.backends).await {
            Ok(session) => {
                site.session = Some(Arc::clone(&session));
                session
            }
            Err(e) => {
                error!(error = %e, "Backend login failed");
                return report.failed("login", e);
            }
        },
    };

    {
        let mut backend = session.lock().await;
        if let Err(e) = backend.initialize().await {
            error!(error = %e, "Backend initialize failed");
            return report.failed("initialize", e);
        }
        if let Err(e) = backend.set_site_metadata(&mut site.setting).await {
            error!(error = %e, "Setting site metadata failed");
            return report.failed("metadata", e);
        }
    }

    let target = PublishTarget {
        domain: site.domain().to_string(),
        session,
        panel,
        site_root: site.site_root_path.clone(),
    };
    dispatch_categories(&target, std::mem::take(&mut site.category), ctx, report).await
}

async fn login(site: &SiteConfig, backends: &BackendRegistry) -> Result<SharedSession, Box<dyn std::error::Error + Send + Sync>> {
    let connect = backends.get(&site.program_name)?;
    let backend = connect(site.credentials(), site.program.clone()).await?;
    info!(backend = %site.program_name, "Logged in");
    Ok(Arc::new(Mutex::new(backend)))
}

/// Reconcile each category, enqueue its jobs and wait for all of them.
async fn dispatch_categories(
    target: &PublishTarget,
    categories: Vec<CategoryConfig>,
    ctx: &SiteContext,
    mut report: SiteReport,
) -> SiteReport {
    let mut pending = Vec::new();

    for mut category in categories {
        let reconciled = {
            let mut backend = target.session.lock().await;
            reconcile_category(backend.as_mut(), &mut category.category).await
        };
        if let Err(e) = reconciled {
            error!(category = %category.category.name, error = %e, "Category reconcile failed; skipping category");
            report.categories_failed += 1;
            continue;
        }
        report.categories_reconciled += 1;
        debug!(category = %category.category.name, id = %category.category.identity.id, "Category ready");

        let category = Arc::new(category);
        for source in &category.collect.sources {
            let (done, completed) = oneshot::channel();
            let job = ActionJob {
                target: target.clone(),
                category: Arc::clone(&category),
                source: source.clone(),
                done,
            };
            if ctx.actions.send(job).is_err() {
                error!(collector = %source, "Action queue closed; job not dispatched");
                continue;
            }
            pending.push(completed);
        }
    }

    report.jobs_dispatched = pending.len();
    info!(jobs = report.jobs_dispatched, "Waiting for collect jobs");

    for completed in join_all(pending).await {
        match completed {
            Ok(stats) => {
                report.jobs_completed += 1;
                report.articles.merge(&stats);
            }
            Err(_) => warn!("Collect job dropped before completing"),
        }
    }

    info!(
        completed = report.jobs_completed,
        published = report.articles.published,
        skipped = report.articles.already_published + report.articles.rejected,
        failed = report.articles.failed,
        "Site done"
    );
    report
}

/// Run one collector over every source tag and page of a category.
#[instrument(level = "info", skip_all, fields(domain = %target.domain, collector = %source, category = %category.category.name))]
async fn run_action(
    target: &PublishTarget,
    category: &CategoryConfig,
    source: &str,
    collectors: &CollectorRegistry,
) -> CollectStats {
    let mut stats = CollectStats::default();
    let collector = match collectors.get(source) {
        Ok(collector) => collector,
        Err(e) => {
            error!(error = %e, "Unknown collector; job skipped");
            return stats;
        }
    };

    for tag in &category.collect.tags {
        for &page in &category.collect.pages {
            let page_stats = collect_page(target, collector.as_ref(), category, tag, page).await;
            stats.merge(&page_stats);
        }
    }
    stats
}

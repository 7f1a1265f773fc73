//! Command-line interface definitions.
//!
//! All options can be given as flags or through the environment.

use crate::orchestrator::{DEFAULT_ACTION_WORKERS, DEFAULT_SITE_WORKERS, PoolSizes};
use clap::Parser;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Run every open site in sites.yaml
/// site_syndicate -s sites.yaml
///
/// # Smaller pools, with a run report
/// site_syndicate -s sites.yaml --site-workers 4 --action-workers 8 -r ./reports
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// YAML file describing the target sites
    #[arg(short, long, env = "SYNDICATE_SITES")]
    pub sites: String,

    /// Number of sites brought up concurrently
    #[arg(long, env = "SYNDICATE_SITE_WORKERS", default_value_t = DEFAULT_SITE_WORKERS)]
    pub site_workers: usize,

    /// Number of collect jobs run concurrently across all sites
    #[arg(long, env = "SYNDICATE_ACTION_WORKERS", default_value_t = DEFAULT_ACTION_WORKERS)]
    pub action_workers: usize,

    /// Directory for JSON run reports (optional)
    #[arg(short, long, env = "SYNDICATE_REPORT_DIR")]
    pub report_dir: Option<String>,
}

impl Cli {
    pub fn pool_sizes(&self) -> PoolSizes {
        PoolSizes {
            site_workers: self.site_workers.max(1),
            action_workers: self.action_workers.max(1),
        }
    }
}

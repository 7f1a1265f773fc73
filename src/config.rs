//! Site configuration.
//!
//! Sites are described in a YAML file:
//!
//! ```yaml
//! panel_root: /www/wwwroot
//! sites:
//!   - bind_domain: [blog.example.com]
//!     program_name: z-blog
//!     home_url: http://blog.example.com/
//!     backstage_path: zb_system/
//!     login_path: cmd.php?act=verify
//!     login_username: admin
//!     login_password: secret
//!     site_root_path: /www/wwwroot/blog.example.com
//!     site_title: Example
//!     open: true
//!     category:
//!       - name: Politics
//!         alias: politics
//!         collect:
//!           sources: [cnn-lite]
//!           pages: [1]
//!           tags: [{ name: Politics, alias: politics }]
//!           contains: [{ word: vote, occurrences: 1 }]
//! ```

use crate::backend::{Backend, Credentials};
use crate::collectors::SourceTag;
use crate::error::ConfigError;
use crate::models::{Category, ProgramBaseInfo, SiteSetting};
use crate::panel::{FilesystemPanel, HostingPanel};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// A backend session shared by one site's jobs; the mutex serializes its use.
pub type SharedSession = Arc<Mutex<Box<dyn Backend>>>;

/// An article passes when its body contains `word` at least `occurrences` times.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeywordThreshold {
    pub word: String,
    pub occurrences: usize,
}

/// What to collect into a category.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CollectSpec {
    /// Collector names; one job is dispatched per name.
    pub sources: Vec<String>,
    /// Listing pages to walk for every tag.
    pub pages: Vec<u32>,
    /// Source tags to list.
    pub tags: Vec<SourceTag>,
    pub contains: Vec<KeywordThreshold>,
}

impl CollectSpec {
    /// `true` when some keyword reaches its threshold in `body`.
    pub fn accepts(&self, body: &str) -> bool {
        self.contains
            .iter()
            .any(|k| body.matches(k.word.as_str()).count() >= k.occurrences)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    #[serde(flatten)]
    pub category: Category,
    pub collect: CollectSpec,
}

/// One target site.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub bind_domain: Vec<String>,
    /// Registry name of the backend running the site.
    pub program_name: String,
    #[serde(flatten)]
    pub program: ProgramBaseInfo,
    #[serde(flatten)]
    pub setting: SiteSetting,
    pub category: Vec<CategoryConfig>,
    pub site_root_path: PathBuf,
    pub login_username: String,
    pub login_password: String,
    /// Overrides the file-level `panel_root`.
    pub panel_root: Option<PathBuf>,
    /// Only open sites are scheduled.
    pub open: bool,
    #[serde(skip)]
    pub panel: Option<Arc<dyn HostingPanel>>,
    /// Created on first use by the site worker and kept for the whole run.
    #[serde(skip)]
    pub session: Option<SharedSession>,
}

impl std::fmt::Debug for SiteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteConfig")
            .field("domain", &self.domain())
            .field("program_name", &self.program_name)
            .field("categories", &self.category.len())
            .field("open", &self.open)
            .field("has_session", &self.session.is_some())
            .finish()
    }
}

impl SiteConfig {
    /// The name the site is logged under.
    pub fn domain(&self) -> &str {
        self.bind_domain
            .first()
            .map(String::as_str)
            .unwrap_or(&self.program.home_url)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.login_username.clone(),
            password: self.login_password.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SitesFile {
    panel_root: Option<PathBuf>,
    sites: Vec<SiteConfig>,
}

/// Parse a sites file and give every site its panel handle.
pub fn parse_sites(yaml: &str, path: &str) -> Result<Vec<SiteConfig>, ConfigError> {
    let file: SitesFile = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Yaml {
        path: path.to_string(),
        source,
    })?;

    let default_root = file.panel_root;
    let sites = file
        .sites
        .into_iter()
        .map(|mut site| {
            let root = site
                .panel_root
                .clone()
                .or_else(|| default_root.clone())
                .unwrap_or_else(|| site.site_root_path.clone());
            site.panel = Some(Arc::new(FilesystemPanel::new(root)));
            site
        })
        .collect();
    Ok(sites)
}

/// Load the sites file at `path`.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_sites(path: &Path) -> Result<Vec<SiteConfig>, ConfigError> {
    let display = path.display().to_string();
    let yaml = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
    let sites = parse_sites(&yaml, &display)?;
    info!(
        total = sites.len(),
        open = sites.iter().filter(|s| s.open).count(),
        "Loaded sites"
    );
    Ok(sites)
}

//! Publishing backends.
//!
//! A backend is a site's admin program driven through its HTML forms. Every
//! backend implements [`Backend`]; each one registers a [`LoginFn`] under its
//! name in a [`BackendRegistry`], and a site's configuration names the backend
//! it runs.
//!
//! # Supported Backends
//!
//! | Name | Module | Notes |
//! |------|--------|-------|
//! | `z-blog` | [`zblog`] | Admin forms under `zb_system/`, CSRF token in page `<meta>` |

use crate::error::BackendError;
use crate::models::{Article, Category, NavEntry, ProgramBaseInfo, SiteSetting, Tag};
use crate::registry::Registry;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

pub mod query;
pub mod session;
pub mod zblog;

/// Fixed browser identity sent with every backend request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/100.0.4896.75 Safari/537.36";

/// The capabilities the orchestrator needs from a publishing backend.
///
/// Every operation takes the record it works on mutably; lookups fill in the
/// fields they resolve (id, alias, order). `get_*` calls report a missing
/// record as [`BackendError::NotFound`], never as a transport error.
#[async_trait]
pub trait Backend: Send + Sync {
    /// One-time per-run preparation of the site (plugins, URL rules).
    async fn initialize(&mut self) -> Result<(), BackendError>;

    async fn set_site_metadata(&mut self, setting: &mut SiteSetting) -> Result<(), BackendError>;

    /// Create the article when its id is `"0"`, update it otherwise.
    async fn create_or_update_article(&mut self, article: &mut Article) -> Result<(), BackendError>;

    /// Look up by exact title and fill in the id.
    async fn get_article(&mut self, article: &mut Article) -> Result<(), BackendError>;

    async fn delete_article(&mut self, article: &mut Article) -> Result<(), BackendError>;

    async fn create_or_update_category(&mut self, category: &mut Category) -> Result<(), BackendError>;

    /// Look up by name and fill in id, order and alias.
    async fn get_category(&mut self, category: &mut Category) -> Result<(), BackendError>;

    async fn delete_category(&mut self, category: &mut Category) -> Result<(), BackendError>;

    async fn create_or_update_tag(&mut self, tag: &mut Tag) -> Result<(), BackendError>;

    /// Look up by name and fill in id, name and alias.
    async fn get_tag(&mut self, tag: &mut Tag) -> Result<(), BackendError>;

    async fn delete_tag(&mut self, tag: &mut Tag) -> Result<(), BackendError>;

    async fn create_or_update_nav_entry(&mut self, entry: &mut NavEntry) -> Result<(), BackendError>;
}

/// Login credentials for a backend admin account.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A login in progress.
pub type LoginFuture = BoxFuture<'static, Result<Box<dyn Backend>, BackendError>>;

/// Authenticate and return a ready session.
pub type LoginFn = Arc<dyn Fn(Credentials, ProgramBaseInfo) -> LoginFuture + Send + Sync>;

/// Backend name → login constructor.
pub type BackendRegistry = Registry<LoginFn>;

/// A registry holding every backend this crate ships.
pub fn default_registry() -> BackendRegistry {
    let registry = BackendRegistry::new("backend");
    zblog::register(&registry);
    registry
}

//! Article collectors: the sources articles are syndicated from.
//!
//! A collector turns a remote site into typed articles in two phases, the same
//! shape for every source:
//!
//! 1. **Listing**: [`Collector::article_list`] returns summaries (title, tags,
//!    post time) for one source tag and page.
//! 2. **Detail**: [`Collector::article_detail`] fills in the body and any
//!    images it downloaded, or reports [`CollectError::NotFound`].
//!
//! Bodies may contain inline tag markers: elements with class
//! [`TAG_MARKER_CLASS`] carrying [`TAG_ALIAS_ATTR`] and [`TAG_NAME_ATTR`]. The
//! reconciler turns them into links to the target site's tag pages.
//!
//! # Supported Sources
//!
//! | Name | Module | Notes |
//! |------|--------|-------|
//! | `cnn-lite` | [`cnn`] | Text-only CNN; one page per section, section used as tag |

use crate::error::CollectError;
use crate::registry::Registry;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub mod cnn;

/// Class of inline tag markers in collected bodies.
pub const TAG_MARKER_CLASS: &str = "collect-tag";
/// Marker attribute holding the tag alias.
pub const TAG_ALIAS_ATTR: &str = "data-tag-alias";
/// Marker attribute holding the tag display name.
pub const TAG_NAME_ATTR: &str = "data-tag-name";

/// A tag on the source site; also used to select what to list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceTag {
    pub name: String,
    pub alias: String,
}

/// An image the collector already downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    pub local_path: PathBuf,
    /// Path under the site root the body refers to, e.g. `zb_users/upload/a.jpg`.
    pub remote_path: String,
}

/// An article from a collector; `content` is empty until the detail is fetched.
#[derive(Debug, Clone)]
pub struct CollectedArticle {
    pub title: String,
    pub url: String,
    pub tags: Vec<SourceTag>,
    pub post_time: DateTime<Local>,
    pub content: String,
    pub local_images: Vec<LocalImage>,
}

impl CollectedArticle {
    pub fn summary(title: &str, url: &str) -> Self {
        Self {
            title: title.to_string(),
            url: url.to_string(),
            tags: Vec::new(),
            post_time: Local::now(),
            content: String::new(),
            local_images: Vec::new(),
        }
    }
}

/// A source of articles.
#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;

    /// Summaries listed under `tag` on `page` (1-based).
    async fn article_list(&self, tag: &SourceTag, page: u32) -> Result<Vec<CollectedArticle>, CollectError>;

    /// Fill in `content` (and `local_images`) for a summary.
    async fn article_detail(&self, article: &mut CollectedArticle) -> Result<(), CollectError>;
}

/// Collector name → collector.
pub type CollectorRegistry = Registry<Arc<dyn Collector>>;

/// A registry holding every collector this crate ships.
pub fn default_registry() -> Result<CollectorRegistry, CollectError> {
    let registry = CollectorRegistry::new("collector");
    let cnn: Arc<dyn Collector> = Arc::new(cnn::CnnLite::new()?);
    registry.register(cnn.name().to_string(), cnn);
    Ok(registry)
}

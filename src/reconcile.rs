//! Get-or-create reconciliation and the per-article publishing pipeline.
//!
//! Backends built on HTML forms never return the id of what they just created,
//! so categories and tags are always resolved in three steps: look up by name,
//! create when the lookup says "not found", then look up again. The second
//! lookup is the only authority on the id; a create the backend silently
//! refused still counts when the record shows up afterwards.

use crate::backend::Backend;
use crate::collectors::{CollectedArticle, Collector, SourceTag};
use crate::config::{CategoryConfig, SharedSession};
use crate::error::BackendError;
use crate::models::{Article, Category, Identity, Tag};
use crate::panel::HostingPanel;
use crate::rewrite::{TagLink, rewrite_tag_links};
use crate::utils::{slugify_title, truncate_for_log};
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Resolve `category` to its backend record, creating it if needed.
pub async fn reconcile_category(backend: &mut dyn Backend, category: &mut Category) -> Result<(), BackendError> {
    match backend.get_category(category).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => match backend.create_or_update_category(category).await {
            Ok(()) => debug!(name = %category.name, "Category created"),
            Err(e @ BackendError::Rejected { .. }) => {
                warn!(name = %category.name, error = %e, "Category create refused; checking whether it exists")
            }
            Err(e) => return Err(e),
        },
        Err(e) => return Err(e),
    }
    backend.get_category(category).await
}

/// Resolve `tag` to its backend record, creating it if needed.
pub async fn reconcile_tag(backend: &mut dyn Backend, tag: &mut Tag) -> Result<(), BackendError> {
    match backend.get_tag(tag).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => match backend.create_or_update_tag(tag).await {
            Ok(()) => debug!(name = %tag.name, "Tag created"),
            Err(e @ BackendError::Rejected { .. }) => {
                warn!(name = %tag.name, error = %e, "Tag create refused; checking whether it exists")
            }
            Err(e) => return Err(e),
        },
        Err(e) => return Err(e),
    }
    backend.get_tag(tag).await
}

/// Where a site's articles go.
#[derive(Clone)]
pub struct PublishTarget {
    pub domain: String,
    pub session: SharedSession,
    pub panel: Arc<dyn HostingPanel>,
    pub site_root: PathBuf,
}

/// What happened to one collected article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleOutcome {
    Published { tags: usize, images: usize },
    AlreadyPublished,
    /// The body did not meet any keyword threshold.
    Rejected,
    Failed,
}

/// Per-job counters, summed into the run report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectStats {
    pub published: usize,
    pub already_published: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl CollectStats {
    pub fn record(&mut self, outcome: &ArticleOutcome) {
        match outcome {
            ArticleOutcome::Published { .. } => self.published += 1,
            ArticleOutcome::AlreadyPublished => self.already_published += 1,
            ArticleOutcome::Rejected => self.rejected += 1,
            ArticleOutcome::Failed => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: &CollectStats) {
        self.published += other.published;
        self.already_published += other.already_published;
        self.rejected += other.rejected;
        self.failed += other.failed;
    }
}

/// Reconcile the source tags of an article.
///
/// Returns the canonical tag names, without duplicates, and the link each
/// source alias should be rewritten to.
async fn reconcile_article_tags(
    backend: &mut dyn Backend,
    sources: &[SourceTag],
) -> (Vec<String>, HashMap<String, TagLink>) {
    let mut names = Vec::with_capacity(sources.len());
    let mut links = HashMap::new();

    for source in sources {
        let alias = if source.alias.is_empty() {
            slugify_title(&source.name)
        } else {
            source.alias.clone()
        };
        let mut tag = Tag {
            identity: Identity::new_record(),
            name: source.name.clone(),
            alias,
            template: "index".to_string(),
            intro: String::new(),
            add_navbar: "0".to_string(),
        };

        match reconcile_tag(backend, &mut tag).await {
            Ok(()) => {
                links.insert(
                    source.alias.clone(),
                    TagLink {
                        name: tag.name.clone(),
                        alias: tag.alias.clone(),
                    },
                );
                names.push(tag.name);
            }
            Err(e) => {
                warn!(tag = %source.name, error = %e, "Could not reconcile tag; using source name");
                names.push(source.name.clone());
            }
        }
    }

    let names = names.into_iter().unique().collect();
    (names, links)
}

/// Id of the published article titled `title`, if there is one.
async fn published_id(backend: &mut dyn Backend, title: &str) -> Result<Option<String>, BackendError> {
    let mut existing = Article::lookup(title);
    match backend.get_article(&mut existing).await {
        Ok(()) if !existing.identity.id.is_empty() => Ok(Some(existing.identity.id)),
        Ok(()) => Ok(None),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Publish one collected summary into `category`.
#[instrument(level = "info", skip_all, fields(domain = %target.domain, collector = collector.name(), title = %summary.title))]
pub async fn publish_article(
    target: &PublishTarget,
    collector: &dyn Collector,
    category: &CategoryConfig,
    mut summary: CollectedArticle,
) -> ArticleOutcome {
    // Already published?
    {
        let mut backend = target.session.lock().await;
        match published_id(backend.as_mut(), &summary.title).await {
            Ok(Some(id)) => {
                debug!(%id, "Already published; skipping");
                return ArticleOutcome::AlreadyPublished;
            }
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "Title lookup failed");
                return ArticleOutcome::Failed;
            }
        }
    }

    if let Err(e) = collector.article_detail(&mut summary).await {
        error!(error = %e, "Fetching article detail failed");
        return ArticleOutcome::Failed;
    }

    if !category.collect.accepts(&summary.content) {
        info!("Article contains no required keyword; skipping");
        return ArticleOutcome::Rejected;
    }

    let mut article = Article {
        identity: Identity::new_record(),
        title: summary.title.clone(),
        content: summary.content,
        alias: String::new(),
        tags: Vec::new(),
        category_id: category.category.identity.id.clone(),
        status: "0".to_string(),
        template: "single".to_string(),
        author_id: "1".to_string(),
        post_time: summary.post_time,
        is_top: "0".to_string(),
        is_lock: "0".to_string(),
        intro: String::new(),
    };

    {
        let mut backend = target.session.lock().await;
        // Another job may have published this title while the detail page was fetched.
        match published_id(backend.as_mut(), &article.title).await {
            Ok(Some(id)) => {
                debug!(%id, "Published meanwhile by another job; skipping");
                return ArticleOutcome::AlreadyPublished;
            }
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "Title lookup failed");
                return ArticleOutcome::Failed;
            }
        }

        if !summary.tags.is_empty() {
            let (names, links) = reconcile_article_tags(backend.as_mut(), &summary.tags).await;
            article.tags = names;
            article.content = rewrite_tag_links(&article.content, &links);
        }

        if let Err(e) = backend.create_or_update_article(&mut article).await {
            error!(
                error = %e,
                content_preview = %truncate_for_log(&article.content, 200),
                "Publishing article failed"
            );
            return ArticleOutcome::Failed;
        }
    }

    let mut uploaded = 0;
    for image in &summary.local_images {
        match target.panel.upload_image(&target.site_root, image).await {
            Ok(()) => uploaded += 1,
            Err(e) => warn!(image = %image.remote_path, error = %e, "Image upload failed"),
        }
    }

    info!(tags = %article.tags.join(","), images = uploaded, "Article published");
    ArticleOutcome::Published {
        tags: article.tags.len(),
        images: uploaded,
    }
}

/// List one page of a source tag and publish everything on it.
#[instrument(level = "info", skip_all, fields(domain = %target.domain, collector = collector.name(), tag = %tag.name, page = page))]
pub async fn collect_page(
    target: &PublishTarget,
    collector: &dyn Collector,
    category: &CategoryConfig,
    tag: &SourceTag,
    page: u32,
) -> CollectStats {
    let mut stats = CollectStats::default();
    let list = match collector.article_list(tag, page).await {
        Ok(list) => list,
        Err(e) => {
            error!(error = %e, "Listing failed");
            return stats;
        }
    };

    for summary in list {
        let outcome = publish_article(target, collector, category, summary).await;
        stats.record(&outcome);
    }
    debug!(?stats, "Page done");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CollectSpec, KeywordThreshold};
    use crate::testing::{MockBackend, MockCollector, MockPanel, mock_target};

    fn category_config(word: &str) -> CategoryConfig {
        let mut category = Category {
            name: "Tech".to_string(),
            ..Category::default()
        };
        category.identity.id = "4".to_string();
        CategoryConfig {
            category,
            collect: CollectSpec {
                sources: vec!["mock".to_string()],
                pages: vec![1],
                tags: vec![SourceTag::default()],
                contains: vec![KeywordThreshold {
                    word: word.to_string(),
                    occurrences: 1,
                }],
            },
        }
    }

    #[tokio::test]
    async fn test_reconcile_category_is_idempotent() {
        let mut backend = MockBackend::new();
        let store = backend.store();

        let mut first = Category {
            name: "News".to_string(),
            ..Category::default()
        };
        reconcile_category(&mut backend, &mut first).await.unwrap();
        let mut second = Category {
            name: "News".to_string(),
            ..Category::default()
        };
        reconcile_category(&mut backend, &mut second).await.unwrap();

        assert!(!first.identity.id.is_empty());
        assert_eq!(first.identity.id, second.identity.id);
        assert_eq!(store.lock().unwrap().category_creates, 1);
    }

    #[tokio::test]
    async fn test_reconcile_tag_is_idempotent() {
        let mut backend = MockBackend::new();
        let store = backend.store();

        let mut a = Tag::lookup("rust");
        reconcile_tag(&mut backend, &mut a).await.unwrap();
        let mut b = Tag::lookup("rust");
        reconcile_tag(&mut backend, &mut b).await.unwrap();

        assert_eq!(a.identity.id, b.identity.id);
        assert_eq!(store.lock().unwrap().tag_creates, 1);
    }

    #[tokio::test]
    async fn test_refused_create_counts_when_record_appears() {
        let mut backend = MockBackend::new();
        backend.store().lock().unwrap().refuse_creates = true;

        let mut tag = Tag::lookup("rust");
        reconcile_tag(&mut backend, &mut tag).await.unwrap();
        assert!(tag.identity.is_known());
    }

    #[tokio::test]
    async fn test_transport_like_failure_is_propagated() {
        let mut backend = MockBackend::new();
        backend.store().lock().unwrap().fail_lookups = true;

        let mut cate = Category {
            name: "News".to_string(),
            ..Category::default()
        };
        let err = reconcile_category(&mut backend, &mut cate).await.unwrap_err();
        assert!(!err.is_not_found());
        assert_eq!(backend.store().lock().unwrap().category_creates, 0);
    }

    #[tokio::test]
    async fn test_already_published_title_is_skipped() {
        let backend = MockBackend::new();
        let store = backend.store();
        store.lock().unwrap().articles.push(("Known title".to_string(), "17".to_string()));
        let target = mock_target(backend, MockPanel::default());
        let collector = MockCollector::new().with_article("Known title", "rust body", &[]);

        let summary = CollectedArticle::summary("Known title", "http://src/1");
        let outcome = publish_article(&target, &collector, &category_config("rust"), summary).await;

        assert_eq!(outcome, ArticleOutcome::AlreadyPublished);
        assert_eq!(store.lock().unwrap().article_creates, 0);
        assert_eq!(collector.detail_calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_jobs_publish_title_once() {
        let backend = MockBackend::new();
        let store = backend.store();
        let target = mock_target(backend, MockPanel::default());
        let collector = MockCollector::new()
            .with_article("Same", "rust", &[])
            .with_detail_delay(std::time::Duration::from_millis(20));
        let category = category_config("rust");

        let (a, b) = tokio::join!(
            publish_article(&target, &collector, &category, CollectedArticle::summary("Same", "http://src/a")),
            publish_article(&target, &collector, &category, CollectedArticle::summary("Same", "http://src/b")),
        );

        let mut stats = CollectStats::default();
        stats.record(&a);
        stats.record(&b);
        assert_eq!(stats.published, 1);
        assert_eq!(stats.already_published, 1);
        assert_eq!(collector.detail_calls(), 2);
        assert_eq!(store.lock().unwrap().article_creates, 1);
    }

    #[tokio::test]
    async fn test_keyword_rejection() {
        let backend = MockBackend::new();
        let store = backend.store();
        let target = mock_target(backend, MockPanel::default());
        let collector = MockCollector::new().with_article("Cooking", "soup and bread", &[]);

        let summary = CollectedArticle::summary("Cooking", "http://src/2");
        let outcome = publish_article(&target, &collector, &category_config("rust"), summary).await;

        assert_eq!(outcome, ArticleOutcome::Rejected);
        assert_eq!(store.lock().unwrap().article_creates, 0);
    }

    #[tokio::test]
    async fn test_detail_failure_only_fails_article() {
        let target = mock_target(MockBackend::new(), MockPanel::default());
        let collector = MockCollector::new();

        let summary = CollectedArticle::summary("Gone", "http://src/404");
        let outcome = publish_article(&target, &collector, &category_config("rust"), summary).await;
        assert_eq!(outcome, ArticleOutcome::Failed);
    }

    #[tokio::test]
    async fn test_tags_deduplicated_and_links_rewritten() {
        let backend = MockBackend::new();
        let store = backend.store();
        let target = mock_target(backend, MockPanel::default());
        let body = r#"<p>rust <span class="collect-tag" data-tag-alias="rs" data-tag-name="Rust">x</span></p>"#;
        let collector = MockCollector::new().with_article(
            "Tagged",
            body,
            &[("Rust", "rs"), ("Tokio", "tokio"), ("Rust", "rs")],
        );

        let mut summary = CollectedArticle::summary("Tagged", "http://src/3");
        summary.tags = collector.tags_for("Tagged");
        let outcome = publish_article(&target, &collector, &category_config("rust"), summary).await;

        assert_eq!(outcome, ArticleOutcome::Published { tags: 2, images: 0 });
        let store = store.lock().unwrap();
        let posted = store.posted.last().unwrap();
        let mut tags = posted.tags.clone();
        tags.sort();
        assert_eq!(tags, vec!["Rust".to_string(), "Tokio".to_string()]);
        assert_eq!(posted.category_id, "4");
        assert_eq!(posted.identity.id, "0");
        assert!(posted.content.contains(r#"<a href="/tags-rs.html" target="_blank""#));
        assert_eq!(store.tag_creates, 2);
    }

    #[tokio::test]
    async fn test_images_uploaded_best_effort() {
        let panel = MockPanel {
            fail_uploads: true,
            ..MockPanel::default()
        };
        let target = mock_target(MockBackend::new(), panel);
        let collector = MockCollector::new().with_article("Pics", "rust", &[]);

        let mut summary = CollectedArticle::summary("Pics", "http://src/4");
        summary.local_images.push(crate::collectors::LocalImage {
            local_path: "/tmp/a.jpg".into(),
            remote_path: "upload/a.jpg".to_string(),
        });
        let outcome = publish_article(&target, &collector, &category_config("rust"), summary).await;
        assert_eq!(outcome, ArticleOutcome::Published { tags: 0, images: 0 });
    }

    #[tokio::test]
    async fn test_collect_page_counts_outcomes() {
        let backend = MockBackend::new();
        backend
            .store()
            .lock()
            .unwrap()
            .articles
            .push(("Old".to_string(), "18".to_string()));
        let target = mock_target(backend, MockPanel::default());
        let collector = MockCollector::new()
            .with_article("Old", "rust", &[])
            .with_article("New", "rust", &[])
            .with_article("Off topic", "gardening", &[]);

        let stats = collect_page(
            &target,
            &collector,
            &category_config("rust"),
            &SourceTag::default(),
            1,
        )
        .await;
        assert_eq!(
            stats,
            CollectStats {
                published: 1,
                already_published: 1,
                rejected: 1,
                failed: 0,
            }
        );
    }
}

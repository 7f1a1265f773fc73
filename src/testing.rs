//! In-memory backend, collector and panel used by the unit tests.

use crate::backend::Backend;
use crate::collectors::{CollectedArticle, Collector, LocalImage, SourceTag};
use crate::config::SharedSession;
use crate::error::{BackendError, CollectError, PanelError};
use crate::models::{Article, Category, NavEntry, SiteSetting, Tag};
use crate::panel::HostingPanel;
use crate::reconcile::PublishTarget;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything the mock backend knows, shared with the test that created it.
#[derive(Debug, Default)]
pub struct MockStore {
    next_id: u32,
    pub categories: Vec<Category>,
    pub tags: Vec<Tag>,
    /// `(title, id)` of published articles.
    pub articles: Vec<(String, String)>,
    pub posted: Vec<Article>,
    pub nav: Vec<NavEntry>,
    pub category_creates: usize,
    pub tag_creates: usize,
    pub article_creates: usize,
    pub initialized: usize,
    /// Creates store the record but answer as refused.
    pub refuse_creates: bool,
    /// Lookups fail with a non-not-found error.
    pub fail_lookups: bool,
    pub fail_initialize: bool,
}

impl MockStore {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    store: Arc<Mutex<MockStore>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> Arc<Mutex<MockStore>> {
        Arc::clone(&self.store)
    }

    fn refused(operation: &'static str) -> BackendError {
        BackendError::Rejected { operation, status: 200 }
    }

    fn lookup_failure() -> BackendError {
        BackendError::Parse("listing page unavailable".to_string())
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn initialize(&mut self) -> Result<(), BackendError> {
        let mut store = self.store.lock().unwrap();
        if store.fail_initialize {
            return Err(Self::refused("initialize"));
        }
        store.initialized += 1;
        Ok(())
    }

    async fn set_site_metadata(&mut self, _setting: &mut SiteSetting) -> Result<(), BackendError> {
        Ok(())
    }

    async fn create_or_update_article(&mut self, article: &mut Article) -> Result<(), BackendError> {
        let mut store = self.store.lock().unwrap();
        store.article_creates += 1;
        let id = store.next_id();
        store.articles.push((article.title.clone(), id));
        store.posted.push(article.clone());
        Ok(())
    }

    async fn get_article(&mut self, article: &mut Article) -> Result<(), BackendError> {
        let store = self.store.lock().unwrap();
        if store.fail_lookups {
            return Err(Self::lookup_failure());
        }
        match store.articles.iter().find(|(title, _)| *title == article.title) {
            Some((_, id)) => {
                article.identity.id = id.clone();
                Ok(())
            }
            None => Err(BackendError::NotFound {
                entity: "article",
                key: article.title.clone(),
            }),
        }
    }

    async fn delete_article(&mut self, article: &mut Article) -> Result<(), BackendError> {
        if !article.identity.is_known() {
            return Err(BackendError::MissingId { entity: "article" });
        }
        let mut store = self.store.lock().unwrap();
        store.articles.retain(|(_, id)| *id != article.identity.id);
        Ok(())
    }

    async fn create_or_update_category(&mut self, category: &mut Category) -> Result<(), BackendError> {
        let mut store = self.store.lock().unwrap();
        store.category_creates += 1;
        let mut stored = category.clone();
        stored.identity.id = store.next_id();
        store.categories.push(stored);
        if store.refuse_creates {
            return Err(Self::refused("post category"));
        }
        Ok(())
    }

    async fn get_category(&mut self, category: &mut Category) -> Result<(), BackendError> {
        let store = self.store.lock().unwrap();
        if store.fail_lookups {
            return Err(Self::lookup_failure());
        }
        match store.categories.iter().find(|c| c.name == category.name) {
            Some(found) => {
                category.identity.id = found.identity.id.clone();
                category.order = found.order.clone();
                category.alias = found.alias.clone();
                Ok(())
            }
            None => Err(BackendError::NotFound {
                entity: "category",
                key: category.name.clone(),
            }),
        }
    }

    async fn delete_category(&mut self, category: &mut Category) -> Result<(), BackendError> {
        if !category.identity.is_known() {
            return Err(BackendError::MissingId { entity: "category" });
        }
        let mut store = self.store.lock().unwrap();
        store.categories.retain(|c| c.identity.id != category.identity.id);
        Ok(())
    }

    async fn create_or_update_tag(&mut self, tag: &mut Tag) -> Result<(), BackendError> {
        let mut store = self.store.lock().unwrap();
        store.tag_creates += 1;
        let mut stored = tag.clone();
        stored.identity.id = store.next_id();
        store.tags.push(stored);
        if store.refuse_creates {
            return Err(Self::refused("post tag"));
        }
        Ok(())
    }

    async fn get_tag(&mut self, tag: &mut Tag) -> Result<(), BackendError> {
        let store = self.store.lock().unwrap();
        if store.fail_lookups {
            return Err(Self::lookup_failure());
        }
        match store.tags.iter().find(|t| t.name == tag.name) {
            Some(found) => {
                tag.identity.id = found.identity.id.clone();
                tag.name = found.name.clone();
                tag.alias = found.alias.clone();
                Ok(())
            }
            None => Err(BackendError::NotFound {
                entity: "tag",
                key: tag.name.clone(),
            }),
        }
    }

    async fn delete_tag(&mut self, tag: &mut Tag) -> Result<(), BackendError> {
        if !tag.identity.is_known() {
            return Err(BackendError::MissingId { entity: "tag" });
        }
        let mut store = self.store.lock().unwrap();
        store.tags.retain(|t| t.identity.id != tag.identity.id);
        Ok(())
    }

    async fn create_or_update_nav_entry(&mut self, entry: &mut NavEntry) -> Result<(), BackendError> {
        self.store.lock().unwrap().nav.push(entry.clone());
        Ok(())
    }
}

/// A collector serving a fixed set of articles on page 1 of every tag.
#[derive(Debug, Default)]
pub struct MockCollector {
    name: String,
    /// title → (body, tags)
    articles: Vec<(String, String, Vec<SourceTag>)>,
    delay: Option<Duration>,
    detail_delay: Option<Duration>,
    list_calls: AtomicUsize,
    detail_calls: AtomicUsize,
}

impl MockCollector {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            ..Self::default()
        }
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_article(mut self, title: &str, body: &str, tags: &[(&str, &str)]) -> Self {
        let tags = tags
            .iter()
            .map(|(name, alias)| SourceTag {
                name: name.to_string(),
                alias: alias.to_string(),
            })
            .collect();
        self.articles.push((title.to_string(), body.to_string(), tags));
        self
    }

    /// Sleep this long in every listing call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep this long in every detail call.
    pub fn with_detail_delay(mut self, delay: Duration) -> Self {
        self.detail_delay = Some(delay);
        self
    }

    pub fn tags_for(&self, title: &str) -> Vec<SourceTag> {
        self.articles
            .iter()
            .find(|(t, _, _)| t == title)
            .map(|(_, _, tags)| tags.clone())
            .unwrap_or_default()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Collector for MockCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn article_list(&self, _tag: &SourceTag, page: u32) -> Result<Vec<CollectedArticle>, CollectError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if page != 1 {
            return Ok(Vec::new());
        }
        Ok(self
            .articles
            .iter()
            .map(|(title, _, tags)| {
                let mut a = CollectedArticle::summary(title, &format!("http://source/{title}"));
                a.tags = tags.clone();
                a
            })
            .collect())
    }

    async fn article_detail(&self, article: &mut CollectedArticle) -> Result<(), CollectError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.detail_delay {
            tokio::time::sleep(delay).await;
        }
        match self.articles.iter().find(|(t, _, _)| *t == article.title) {
            Some((_, body, _)) => {
                article.content = body.clone();
                Ok(())
            }
            None => Err(CollectError::NotFound(article.url.clone())),
        }
    }
}

#[derive(Debug, Default)]
pub struct MockPanel {
    pub fail_session: bool,
    pub fail_uploads: bool,
    pub uploads: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl HostingPanel for MockPanel {
    async fn ensure_session(&self) -> Result<(), PanelError> {
        if self.fail_session {
            return Err(PanelError::Unavailable("mock panel down".to_string()));
        }
        Ok(())
    }

    async fn upload_image(&self, site_root: &Path, image: &LocalImage) -> Result<(), PanelError> {
        if self.fail_uploads {
            return Err(PanelError::Unavailable("upload refused".to_string()));
        }
        self.uploads.lock().unwrap().push(site_root.join(&image.remote_path));
        Ok(())
    }
}

pub fn shared_session(backend: MockBackend) -> SharedSession {
    Arc::new(tokio::sync::Mutex::new(Box::new(backend) as Box<dyn Backend>))
}

pub fn mock_target(backend: MockBackend, panel: MockPanel) -> PublishTarget {
    PublishTarget {
        domain: "test.example.com".to_string(),
        session: shared_session(backend),
        panel: Arc::new(panel),
        site_root: PathBuf::from("/srv/test"),
    }
}

//! Z-Blog admin session.
//!
//! Z-Blog has no API; everything goes through the forms under its backstage
//! directory (`zb_system/` by default). The protocol is:
//!
//! 1. **Login**: post the credentials (password as MD5 hex) to the verify
//!    endpoint. Only a `302` counts as success; its cookies become the session.
//! 2. **Token**: every mutating call carries `csrfToken` (read from the
//!    `<meta name="csrfToken">` of an admin page, cached for a minute) and an
//!    `act` identifier in its query string.
//! 3. **Cookies**: every response's cookies are merged into the session and sent
//!    back on the next request.
//!
//! Most mutations answer with a `302` on success. Listing pages are scraped to
//! find ids, because creates never return one.

use super::query::Params;
use super::session::SessionState;
use super::{Backend, BackendRegistry, Credentials, LoginFn, LoginFuture, USER_AGENT};
use crate::error::BackendError;
use crate::models::{Article, Category, NEW_ID, NavEntry, ProgramBaseInfo, SiteSetting, Tag};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::{CONTENT_TYPE, COOKIE, REFERER};
use reqwest::{Client, Method, StatusCode};
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Registry key of this backend.
pub const NAME: &str = "z-blog";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(6);

/// Present in the body of a successful article post (the encoded redirect target).
const ARTICLE_CREATED_MARKER: &str = "cmd.php%3Fact%3DArticleMng";

/// Shown by the tag form when the name already exists.
const DUPLICATE_TAG_MARKER: &str = "标签名称重复";

const REWRITE_PLUGIN: &str = "STACentre";
const REWRITE_PLUGIN_PAGE: &str = "zb_users/plugin/STACentre/main.php";
const LINKS_PLUGIN_PAGE: &str = "zb_users/plugin/LinksManage/main.php";

static CSRF_META: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"meta[name="csrfToken"]"#).unwrap());
static STRIPED_ROWS: Lazy<Selector> = Lazy::new(|| Selector::parse(".table_striped tr").unwrap());
static CATEGORY_ROWS: Lazy<Selector> = Lazy::new(|| Selector::parse(".tableBorder-thcenter tr").unwrap());
static NAV_ROWS: Lazy<Selector> = Lazy::new(|| Selector::parse("#LinksManageList tr").unwrap());
static TD: Lazy<Selector> = Lazy::new(|| Selector::parse("td").unwrap());

/// Add this backend to `registry`.
pub fn register(registry: &BackendRegistry) {
    let login: LoginFn = Arc::new(|credentials: Credentials, info: ProgramBaseInfo| -> LoginFuture {
        Box::pin(async move {
            let session = ZBlogSession::login(credentials, info).await?;
            Ok::<_, BackendError>(Box::new(session) as Box<dyn Backend>)
        })
    });
    registry.register(NAME, login);
}

/// An authenticated Z-Blog admin session.
pub struct ZBlogSession {
    info: ProgramBaseInfo,
    client: Client,
    state: SessionState,
}

impl std::fmt::Debug for ZBlogSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZBlogSession")
            .field("home_url", &self.info.home_url)
            .field("cookies", &self.state.cookies().len())
            .finish()
    }
}

/// Status and body of one backend response.
struct Reply {
    status: StatusCode,
    body: String,
}

impl Reply {
    fn is_redirect(&self) -> bool {
        self.status == StatusCode::FOUND
    }
}

fn http_client() -> Result<Client, BackendError> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()?)
}

/// Join two URL pieces with exactly one `/` between them.
fn join_path(base: &str, path: &str) -> String {
    if base.is_empty() {
        return path.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn password_hash(password: &str) -> String {
    format!("{:x}", md5::compute(password.as_bytes()))
}

fn response_cookies(resp: &reqwest::Response) -> Vec<(String, String)> {
    resp.cookies()
        .map(|c| (c.name().to_string(), c.value().to_string()))
        .collect()
}

impl ZBlogSession {
    /// Log in and return the authenticated session.
    #[instrument(level = "info", skip_all, fields(home_url = %info.home_url, user = %credentials.username))]
    pub async fn login(credentials: Credentials, info: ProgramBaseInfo) -> Result<Self, BackendError> {
        Self::login_with(http_client()?, credentials, info).await
    }

    async fn login_with(client: Client, credentials: Credentials, info: ProgramBaseInfo) -> Result<Self, BackendError> {
        let mut form = Params::new();
        form.set("edtUserName", credentials.username.as_str())
            .set("edtPassWord", credentials.password.as_str())
            .set("btnPost", "登录")
            .set("username", credentials.username.as_str())
            .set("password", password_hash(&credentials.password))
            .set("savedate", "1");

        let url = join_path(&join_path(&info.home_url, &info.backstage_path), &info.login_path);
        let resp = client
            .post(&url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form.encode())
            .send()
            .await?;

        if resp.status() != StatusCode::FOUND {
            warn!(status = resp.status().as_u16(), "Login answered without redirect");
            return Err(BackendError::LoginFailed {
                status: resp.status().as_u16(),
            });
        }

        let cookies = response_cookies(&resp);
        let state = SessionState::authenticated(cookies.iter().map(|(n, v)| (n.as_str(), v.as_str())));
        info!(cookies = state.cookies().len(), "Logged in");

        Ok(Self { info, client, state })
    }

    /// URL of a page relative to the site root.
    fn home_url(&self, uri: &str) -> String {
        join_path(&self.info.home_url, uri)
    }

    /// URL of a page inside the backstage directory.
    fn admin_url(&self, uri: &str) -> String {
        join_path(&join_path(&self.info.home_url, &self.info.backstage_path), uri)
    }

    /// The current anti-forgery token, fetched again once the cached one expires.
    async fn csrf_token(&mut self) -> Result<String, BackendError> {
        let now = Instant::now();
        if let Some(token) = self.state.valid_token(now) {
            return Ok(token.to_string());
        }

        let url = self.admin_url("admin/index.php");
        let reply = self.send(Method::GET, &url, None, None).await?;
        let token = parse_csrf_token(&reply.body)
            .ok_or_else(|| BackendError::Parse("admin page has no csrfToken meta".to_string()))?;
        self.state.store_token(token.clone(), now);
        debug!("Fetched new csrf token");
        Ok(token)
    }

    /// `url?csrfToken=…&act=…` with `extra` merged in.
    async fn action_url(&mut self, url: String, act: &str, extra: Params) -> Result<String, BackendError> {
        let mut query = extra;
        query.set("csrfToken", self.csrf_token().await?);
        if !act.is_empty() {
            query.set("act", act);
        }
        Ok(format!("{}?{}", url, query.encode()))
    }

    /// Send one request with the session cookies and merge the cookies it sets.
    async fn send(
        &mut self,
        method: Method,
        url: &str,
        form: Option<&Params>,
        referer: Option<&str>,
    ) -> Result<Reply, BackendError> {
        let mut req = self
            .client
            .request(method.clone(), url)
            .header(COOKIE, self.state.cookies().header_value());
        if let Some(form) = form {
            req = req
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(form.encode());
        }
        if let Some(referer) = referer {
            req = req.header(REFERER, referer);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let cookies = response_cookies(&resp);
        let body = resp.text().await?;
        self.state
            .merge_cookies(cookies.iter().map(|(n, v)| (n.as_str(), v.as_str())));

        debug!(%method, %url, status = status.as_u16(), bytes = body.len(), "Backend replied");
        Ok(Reply { status, body })
    }

    /// GET a `cmd.php` action; success is a redirect.
    async fn command(&mut self, operation: &'static str, act: &str, query: Params) -> Result<(), BackendError> {
        let url = self.action_url(self.admin_url("cmd.php"), act, query).await?;
        let reply = self.send(Method::GET, &url, None, None).await?;
        expect_redirect(operation, &reply)
    }

    /// POST a form to a `cmd.php` action.
    async fn post_command(&mut self, act: &str, form: &Params) -> Result<Reply, BackendError> {
        let url = self.action_url(self.admin_url("cmd.php"), act, Params::new()).await?;
        self.send(Method::POST, &url, Some(form), None).await
    }

    /// POST a search form to an admin listing page and return its HTML.
    async fn listing(&mut self, act: &str, form: Option<&Params>) -> Result<String, BackendError> {
        let url = self
            .action_url(self.admin_url("admin/index.php"), act, Params::new())
            .await?;
        let method = if form.is_some() { Method::POST } else { Method::GET };
        Ok(self.send(method, &url, form, None).await?.body)
    }

    /// Current navigation bar entries, in order.
    #[instrument(level = "info", skip_all)]
    pub async fn nav_entries(&mut self) -> Result<Vec<NavEntry>, BackendError> {
        let mut query = Params::new();
        query.set("edit", "navbar");
        let url = self.action_url(self.home_url(LINKS_PLUGIN_PAGE), "", query).await?;
        let reply = self.send(Method::GET, &url, None, None).await?;
        if reply.status != StatusCode::OK {
            return Err(BackendError::Rejected {
                operation: "list navbar",
                status: reply.status.as_u16(),
            });
        }
        Ok(parse_nav_entries(&reply.body))
    }
}

fn expect_redirect(operation: &'static str, reply: &Reply) -> Result<(), BackendError> {
    if reply.is_redirect() {
        Ok(())
    } else {
        Err(BackendError::Rejected {
            operation,
            status: reply.status.as_u16(),
        })
    }
}

fn require_id(entity: &'static str, id: &str) -> Result<(), BackendError> {
    if id.is_empty() || id == NEW_ID {
        return Err(BackendError::MissingId { entity });
    }
    Ok(())
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}

fn cell_text(cells: &[ElementRef<'_>], i: usize) -> String {
    cells
        .get(i)
        .map(|c| c.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Data rows (header skipped) of the tables matched by `rows`, as cell lists.
fn table_rows<'a>(doc: &'a Html, rows: &Selector) -> Vec<Vec<ElementRef<'a>>> {
    doc.select(rows)
        .skip(1)
        .map(|tr| tr.select(&TD).collect())
        .collect()
}

pub(crate) fn parse_csrf_token(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    doc.select(&CSRF_META)
        .next()
        .and_then(|m| m.value().attr("content"))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Id of the article titled exactly `title` in the article manager table.
pub(crate) fn find_article_id(html: &str, title: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    table_rows(&doc, &STRIPED_ROWS)
        .iter()
        .find(|cells| cell_text(cells, 3) == title)
        .map(|cells| cell_text(cells, 0))
        .filter(|id| !id.is_empty())
}

/// `(id, order, alias)` of the category named `name`.
pub(crate) fn find_category(html: &str, name: &str) -> Option<(String, String, String)> {
    let doc = Html::parse_document(html);
    table_rows(&doc, &CATEGORY_ROWS)
        .iter()
        .find(|cells| cell_text(cells, 2) == name)
        .map(|cells| (cell_text(cells, 0), cell_text(cells, 1), cell_text(cells, 3)))
        .filter(|(id, _, _)| !id.is_empty())
}

/// `(id, name, alias)` of the tag named `name` among the search results.
pub(crate) fn find_tag(html: &str, name: &str) -> Option<(String, String, String)> {
    let doc = Html::parse_document(html);
    table_rows(&doc, &STRIPED_ROWS)
        .iter()
        .find(|cells| cell_text(cells, 1) == name)
        .map(|cells| (cell_text(cells, 0), cell_text(cells, 1), cell_text(cells, 2)))
        .filter(|(id, _, _)| !id.is_empty())
}

pub(crate) fn parse_nav_entries(html: &str) -> Vec<NavEntry> {
    let doc = Html::parse_document(html);
    let input = |tr: &ElementRef<'_>, field: &str| -> String {
        Selector::parse(&format!(r#"input[name="{field}[]"]"#))
            .ok()
            .and_then(|sel| tr.select(&sel).next())
            .and_then(|el| el.value().attr("value"))
            .unwrap_or_default()
            .to_string()
    };

    doc.select(&NAV_ROWS)
        .filter(|tr| tr.select(&TD).count() == 6)
        .map(|tr| NavEntry {
            href: input(&tr, "href"),
            title: input(&tr, "title"),
            text: input(&tr, "text"),
            target: input(&tr, "target"),
            sub: input(&tr, "sub"),
            ico: input(&tr, "ico"),
        })
        .collect()
}

#[async_trait]
impl Backend for ZBlogSession {
    /// Enable the static-URL plugin and install the rewrite rules that give tags
    /// their `tags-{alias}.html` addresses.
    async fn initialize(&mut self) -> Result<(), BackendError> {
        let mut query = Params::new();
        query.set("name", REWRITE_PLUGIN);
        self.command("enable rewrite plugin", "PluginEnb", query).await?;

        let mut query = Params::new();
        query.set("install", REWRITE_PLUGIN);
        self.command("install rewrite plugin", "PluginMng", query).await?;

        let mut form = Params::new();
        form.set("csrfToken", self.csrf_token().await?)
            .set("reset", "")
            .set("ZC_STATIC_MODE", "REWRITE")
            .set("ZC_ARTICLE_REGEX", "{%host%}post/{%id%}.html")
            .set("ZC_PAGE_REGEX", "{%host%}{%id%}.html")
            .set("ZC_INDEX_REGEX", "{%host%}page_{%page%}.html")
            .set("ZC_CATEGORY_REGEX", "{%host%}category-{%id%}_{%page%}.html")
            .set("ZC_TAGS_REGEX", "{%host%}tags-{%alias%}_{%page%}.html")
            .set("radioZC_TAGS_REGEX", "{%host%}tags-{%alias%}_{%page%}.html")
            .set("ZC_DATE_REGEX", "{%host%}date-{%date%}_{%page%}.html")
            .set("ZC_AUTHOR_REGEX", "{%host%}date-{%date%}_{%page%}.html");
        let url = self
            .action_url(self.home_url(REWRITE_PLUGIN_PAGE), "", Params::new())
            .await?;
        let reply = self.send(Method::POST, &url, Some(&form), None).await?;
        expect_redirect("save rewrite rules", &reply)?;

        info!(home_url = %self.info.home_url, "Backend initialized");
        Ok(())
    }

    async fn set_site_metadata(&mut self, setting: &mut SiteSetting) -> Result<(), BackendError> {
        let mut form = Params::new();
        form.set("ZC_BLOG_NAME", setting.site_title.as_str())
            .set("ZC_BLOG_SUBNAME", setting.site_sub_title.as_str());
        let reply = self.post_command("SettingSav", &form).await?;
        expect_redirect("save site settings", &reply)
    }

    async fn create_or_update_article(&mut self, article: &mut Article) -> Result<(), BackendError> {
        let mut form = Params::new();
        form.set("ID", article.identity.id.as_str())
            .set("Type", article.identity.kind.as_str())
            .set("Title", article.title.as_str())
            .set("Content", article.content.as_str())
            .set("Alias", article.alias.as_str())
            .set("Tag", article.tags.join(","))
            .set("CateID", article.category_id.as_str())
            .set("Status", article.status.as_str())
            .set("Template", article.template.as_str())
            .set("AuthorID", article.author_id.as_str())
            .set("PostTime", article.post_time.format("%Y-%m-%d %H:%M:%S").to_string())
            .set("IsTop", article.is_top.as_str())
            .set("IsLock", article.is_lock.as_str())
            .set("Intro", article.intro.as_str());

        let reply = self.post_command("ArticlePst", &form).await?;
        if reply.body.contains(ARTICLE_CREATED_MARKER) {
            return Ok(());
        }
        Err(BackendError::Rejected {
            operation: "post article",
            status: reply.status.as_u16(),
        })
    }

    async fn get_article(&mut self, article: &mut Article) -> Result<(), BackendError> {
        let mut form = Params::new();
        form.set("category", "").set("status", "").set("search", article.title.as_str());
        let html = self.listing("ArticleMng", Some(&form)).await?;

        match find_article_id(&html, &article.title) {
            Some(id) => {
                article.identity.id = id;
                Ok(())
            }
            None => Err(BackendError::NotFound {
                entity: "article",
                key: article.title.clone(),
            }),
        }
    }

    async fn delete_article(&mut self, article: &mut Article) -> Result<(), BackendError> {
        require_id("article", &article.identity.id)?;
        let mut query = Params::new();
        query.set("id", article.identity.id.as_str());
        self.command("delete article", "ArticleDel", query).await
    }

    async fn create_or_update_category(&mut self, category: &mut Category) -> Result<(), BackendError> {
        let mut form = Params::new();
        form.set("ID", or_default(&category.identity.id, NEW_ID))
            .set("Type", or_default(&category.identity.kind, NEW_ID))
            .set("Name", category.name.as_str())
            .set("Alias", category.alias.as_str())
            .set("Order", category.order.as_str())
            .set("ParentID", category.parent_id.to_string())
            .set("Template", or_default(&category.template, "index"))
            .set("LogTemplate", or_default(&category.log_template, "single"))
            .set("Intro", category.intro.as_str())
            .set("AddNavbar", category.add_navbar.as_str());
        let reply = self.post_command("CategoryPst", &form).await?;
        expect_redirect("post category", &reply)
    }

    async fn get_category(&mut self, category: &mut Category) -> Result<(), BackendError> {
        let html = self.listing("CategoryMng", None).await?;
        match find_category(&html, &category.name) {
            Some((id, order, alias)) => {
                category.identity.id = id;
                category.order = order;
                category.alias = alias;
                Ok(())
            }
            None => Err(BackendError::NotFound {
                entity: "category",
                key: category.name.clone(),
            }),
        }
    }

    async fn delete_category(&mut self, category: &mut Category) -> Result<(), BackendError> {
        require_id("category", &category.identity.id)?;
        let mut query = Params::new();
        query.set("id", category.identity.id.as_str());
        self.command("delete category", "CategoryDel", query).await
    }

    async fn create_or_update_tag(&mut self, tag: &mut Tag) -> Result<(), BackendError> {
        let mut form = Params::new();
        form.set("ID", or_default(&tag.identity.id, NEW_ID))
            .set("Type", or_default(&tag.identity.kind, NEW_ID))
            .set("Name", tag.name.as_str())
            .set("Alias", tag.alias.as_str())
            .set("Template", tag.template.as_str())
            .set("Intro", tag.intro.as_str())
            .set("AddNavbar", tag.add_navbar.as_str());
        let reply = self.post_command("TagPst", &form).await?;

        // A duplicate name means the tag is already there.
        if reply.is_redirect() || reply.body.contains(DUPLICATE_TAG_MARKER) {
            return Ok(());
        }
        Err(BackendError::Rejected {
            operation: "post tag",
            status: reply.status.as_u16(),
        })
    }

    async fn get_tag(&mut self, tag: &mut Tag) -> Result<(), BackendError> {
        let mut form = Params::new();
        form.set("search", tag.name.as_str());
        let html = self.listing("TagMng", Some(&form)).await?;

        match find_tag(&html, &tag.name) {
            Some((id, name, alias)) => {
                tag.identity.id = id;
                tag.name = name;
                tag.alias = alias;
                Ok(())
            }
            None => Err(BackendError::NotFound {
                entity: "tag",
                key: tag.name.clone(),
            }),
        }
    }

    async fn delete_tag(&mut self, tag: &mut Tag) -> Result<(), BackendError> {
        require_id("tag", &tag.identity.id)?;
        let mut query = Params::new();
        query.set("id", tag.identity.id.as_str());
        self.command("delete tag", "TagDel", query).await
    }

    /// The links manager only saves whole lists: read the current entries,
    /// append `entry` and the blank template row, and submit everything.
    async fn create_or_update_nav_entry(&mut self, entry: &mut NavEntry) -> Result<(), BackendError> {
        let mut entries = match self.nav_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Could not read navbar; submitting only the new entry");
                Vec::new()
            }
        };
        entries.push(entry.clone());
        entries.push(NavEntry {
            title: "链接描述".to_string(),
            text: "链接文本".to_string(),
            ..NavEntry::default()
        });

        let mut form = Params::new();
        form.set("ID", "1")
            .set("Source", "system")
            .set("Name", "导航栏")
            .set("FileName", "navbar")
            .set("HtmlID", "divNavBar")
            .set("IsHideTitle", "")
            .set("tree", "1")
            .set("stay", "1");
        for nav in &entries {
            form.add("href[]", nav.href.as_str())
                .add("title[]", nav.title.as_str())
                .add("text[]", nav.text.as_str())
                .add("target[]", nav.target.as_str())
                .add("sub[]", nav.sub.as_str())
                .add("ico[]", nav.ico.as_str());
        }

        let url = self
            .action_url(self.home_url(LINKS_PLUGIN_PAGE), "save", Params::new())
            .await?;
        let referer = format!("{}?edit=navbar", self.home_url(LINKS_PLUGIN_PAGE));
        let reply = self.send(Method::POST, &url, Some(&form), Some(&referer)).await?;
        expect_redirect("save navbar", &reply)
    }
}

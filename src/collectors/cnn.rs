//! CNN Lite collector.
//!
//! Collects from [CNN Lite](https://lite.cnn.com), the text-only edition of CNN.
//! Its markup is minimal and stable, which makes it a good reference source.
//!
//! # URL Pattern
//!
//! Articles are linked from the front page with relative URLs that resolve to
//! `https://lite.cnn.com/2025/05/06/politics/article-slug`. The date segment
//! gives the post time and the segment after it is used as the article's tag.
//! CNN Lite has no pagination, so only page 1 returns anything.

use super::{CollectedArticle, Collector, SourceTag};
use crate::error::CollectError;
use crate::rewrite::escape_html;
use crate::utils::upcase;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

/// Registry key of this collector.
pub const NAME: &str = "cnn-lite";

const BASE_URL: &str = "https://lite.cnn.com";

static STORY_LINKS: Lazy<Selector> = Lazy::new(|| Selector::parse(".card--lite a[href]").unwrap());
static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| Selector::parse(".article--lite p").unwrap());
static DATED_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(\d{4})/(\d{2})/(\d{2})/([a-z0-9-]+)/").unwrap());

#[derive(Debug, Clone)]
pub struct CnnLite {
    client: Client,
    base: Url,
}

impl CnnLite {
    pub fn new() -> Result<Self, CollectError> {
        let base = Url::parse(BASE_URL).map_err(|e| CollectError::Parse(e.to_string()))?;
        Ok(Self {
            client: Client::builder().user_agent(crate::backend::USER_AGENT).build()?,
            base,
        })
    }

    /// Listing URL for a section; an empty alias is the front page.
    fn section_url(&self, tag: &SourceTag) -> Result<Url, CollectError> {
        if tag.alias.is_empty() {
            return Ok(self.base.clone());
        }
        self.base
            .join(&tag.alias)
            .map_err(|e| CollectError::Parse(e.to_string()))
    }
}

/// Post date and section from an article URL.
fn date_and_section(url: &str) -> Option<(DateTime<Local>, String)> {
    let caps = DATED_PATH.captures(url)?;
    let date = NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?)?;
    let midnight = Local.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).single()?;
    Some((midnight, caps[4].to_string()))
}

/// Article summaries linked from a CNN Lite listing page.
pub(crate) fn parse_listing(html: &str, base: &Url) -> Vec<CollectedArticle> {
    let document = Html::parse_document(html);
    let mut articles = Vec::new();

    for element in document.select(&STORY_LINKS) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        let title = element.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }

        let mut article = CollectedArticle::summary(&title, resolved.as_str());
        if let Some((post_time, section)) = date_and_section(resolved.path()) {
            article.post_time = post_time;
            article.tags.push(SourceTag {
                name: upcase(&section),
                alias: section,
            });
        }
        articles.push(article);
    }
    articles
}

/// Article body as HTML paragraphs; `None` when the page has no body text.
pub(crate) fn parse_body(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let mut content = String::new();
    for p in document.select(&PARAGRAPHS) {
        let text = p.text().collect::<Vec<_>>().join(" ");
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        content.push_str("<p>");
        content.push_str(&escape_html(text));
        content.push_str("</p>\n");
    }
    (!content.is_empty()).then_some(content)
}

#[async_trait]
impl Collector for CnnLite {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(level = "info", skip_all, fields(section = %tag.alias, page = page))]
    async fn article_list(&self, tag: &SourceTag, page: u32) -> Result<Vec<CollectedArticle>, CollectError> {
        if page > 1 {
            return Ok(Vec::new());
        }
        let url = self.section_url(tag)?;
        let html = self.client.get(url.as_str()).send().await?.text().await?;
        let articles = parse_listing(&html, &self.base);

        info!(count = articles.len(), source = %url, "Listed CNN articles");
        Ok(articles)
    }

    #[instrument(level = "info", skip_all, fields(url = %article.url))]
    async fn article_detail(&self, article: &mut CollectedArticle) -> Result<(), CollectError> {
        let resp = self.client.get(&article.url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CollectError::NotFound(article.url.clone()));
        }
        let html = resp.text().await?;
        let body = parse_body(&html).ok_or_else(|| CollectError::NotFound(article.url.clone()))?;

        debug!(bytes = body.len(), "Parsed CNN article");
        article.content = body;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_parse_listing() {
        let html = r#"<html><body>
            <ul>
              <li class="card--lite"><a href="/2025/05/06/politics/budget-vote">Budget vote passes</a></li>
              <li class="card--lite"><a href="/2025/05/07/tech/chip-news"> Chip news </a></li>
              <li class="card--lite"><a href="/about">   </a></li>
              <li class="other"><a href="/2025/05/06/world/x">Not a card</a></li>
            </ul>
        </body></html>"#;
        let base = Url::parse(BASE_URL).unwrap();
        let articles = parse_listing(html, &base);

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title, "Budget vote passes");
        assert_eq!(articles[0].url, "https://lite.cnn.com/2025/05/06/politics/budget-vote");
        assert_eq!(articles[0].tags, vec![SourceTag {
            name: "Politics".to_string(),
            alias: "politics".to_string(),
        }]);
        assert_eq!(articles[0].post_time.day(), 6);
        assert_eq!(articles[1].title, "Chip news");
    }

    #[test]
    fn test_parse_body() {
        let html = r#"<div class="article--lite">
            <p>First &amp; foremost.</p>
            <p>   </p>
            <p>Second <b>bold</b> line.</p>
        </div>"#;
        let body = parse_body(html).unwrap();
        assert_eq!(body, "<p>First &amp; foremost.</p>\n<p>Second  bold  line.</p>\n");
        assert_eq!(parse_body("<div></div>"), None);
    }

    #[test]
    fn test_date_and_section() {
        let (when, section) = date_and_section("/2024/12/31/world/story/").unwrap();
        assert_eq!(when.year(), 2024);
        assert_eq!(section, "world");
        assert!(date_and_section("/no/date/here").is_none());
    }
}

//! Records exchanged with a publishing backend.
//!
//! Identifiers are strings because the backend only ever shows them as text in
//! listing tables. An empty id means "unknown"; `"0"` is what the create forms
//! expect for a new record.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Identifier sent for records that do not exist yet.
pub const NEW_ID: &str = "0";

/// Identity shared by every backend record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Identity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Identity {
    /// The identity of a record that is about to be created.
    pub fn new_record() -> Self {
        Self {
            id: NEW_ID.to_string(),
            kind: NEW_ID.to_string(),
        }
    }

    /// `true` when the id names an existing backend record.
    pub fn is_known(&self) -> bool {
        !self.id.is_empty() && self.id != NEW_ID
    }
}

/// Site-wide metadata written once per run.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteSetting {
    pub site_title: String,
    pub site_sub_title: String,
    pub site_keywords: String,
    pub site_description: String,
}

/// An article as the backend stores it.
#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub identity: Identity,
    pub title: String,
    pub content: String,
    pub alias: String,
    pub tags: Vec<String>,
    pub category_id: String,
    /// 0 public, 1 draft, 2 pending review.
    pub status: String,
    pub template: String,
    pub author_id: String,
    pub post_time: DateTime<Local>,
    /// 0 none, 1 global, 2 home page, 3 category.
    pub is_top: String,
    /// 0 comments allowed, 2 locked.
    pub is_lock: String,
    pub intro: String,
}

impl Article {
    /// An empty record used to look an article up by title.
    pub fn lookup(title: &str) -> Self {
        Self {
            identity: Identity::default(),
            title: title.to_string(),
            content: String::new(),
            alias: String::new(),
            tags: Vec::new(),
            category_id: String::new(),
            status: String::new(),
            template: String::new(),
            author_id: String::new(),
            post_time: Local::now(),
            is_top: String::new(),
            is_lock: String::new(),
            intro: String::new(),
        }
    }
}

/// A category (called "cate" by the reference backend).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Category {
    #[serde(flatten)]
    pub identity: Identity,
    pub name: String,
    pub alias: String,
    pub order: String,
    pub parent_id: u32,
    /// Template for the home and list pages.
    pub template: String,
    /// Template for single article pages.
    pub log_template: String,
    pub intro: String,
    /// "1" shows the category in the navigation bar.
    pub add_navbar: String,
}

/// A tag. The name is the uniqueness key.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Tag {
    #[serde(flatten)]
    pub identity: Identity,
    pub name: String,
    pub alias: String,
    pub template: String,
    pub intro: String,
    pub add_navbar: String,
}

impl Tag {
    /// An empty record used to look a tag up by name.
    pub fn lookup(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// One entry of the navigation bar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NavEntry {
    pub href: String,
    pub title: String,
    pub text: String,
    pub target: String,
    pub sub: String,
    /// CSS class of the icon.
    pub ico: String,
}

/// Where a backend lives relative to the site's home URL.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProgramBaseInfo {
    /// e.g. `http://blog.example.com/`
    pub home_url: String,
    /// e.g. `zb_system/`
    pub backstage_path: String,
    /// e.g. `cmd.php?act=verify`
    pub login_path: String,
}

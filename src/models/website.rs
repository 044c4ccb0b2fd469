//! Public website content

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

text_enum! {
    ArticleStatus {
        Draft => "draft",
        Published => "published",
    }
}

impl Default for ArticleStatus {
    fn default() -> Self {
        Self::Draft
    }
}

/// News/blog article; `body` is Markdown
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NewsArticle {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub body: String,
    #[sqlx(try_from = "String")]
    pub status: ArticleStatus,
    /// Set the first time the article is published and kept afterwards
    pub published_at: Option<DateTime<Utc>>,
    pub author_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GalleryItem {
    pub id: i64,
    pub title: String,
    pub image_url: String,
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Setting keys of the public website
pub mod keys {
    pub const SITE_NAME: &str = "site_name";
    pub const MOTTO: &str = "motto";
    pub const ABOUT: &str = "about";
    pub const CONTACT_EMAIL: &str = "contact_email";
    pub const CONTACT_PHONE: &str = "contact_phone";
    pub const ADDRESS: &str = "address";
    pub const HERO_TITLE: &str = "hero_title";
    pub const HERO_SUBTITLE: &str = "hero_subtitle";

    pub const ALL: &[&str] = &[
        SITE_NAME,
        MOTTO,
        ABOUT,
        CONTACT_EMAIL,
        CONTACT_PHONE,
        ADDRESS,
        HERO_TITLE,
        HERO_SUBTITLE,
    ];
}

/// Website settings of one school
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSettings {
    pub site_name: String,
    pub motto: String,
    pub about: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub address: String,
    pub hero_title: String,
    pub hero_subtitle: String,
}

impl SiteSettings {
    /// Build from stored key/value pairs; `fallback_name` fills an empty site name.
    pub fn from_map(map: &HashMap<String, String>, fallback_name: &str) -> Self {
        let get = |key: &str| map.get(key).cloned().unwrap_or_default();
        let mut settings = Self {
            site_name: get(keys::SITE_NAME),
            motto: get(keys::MOTTO),
            about: get(keys::ABOUT),
            contact_email: get(keys::CONTACT_EMAIL),
            contact_phone: get(keys::CONTACT_PHONE),
            address: get(keys::ADDRESS),
            hero_title: get(keys::HERO_TITLE),
            hero_subtitle: get(keys::HERO_SUBTITLE),
        };
        if settings.site_name.trim().is_empty() {
            settings.site_name = fallback_name.to_string();
        }
        settings
    }
}

//! Public website content: settings, news and gallery
//!
//! Settings are read on every public page view, so the merged
//! [`SiteSettings`] of a school are kept in the shared cache and dropped
//! whenever an administrator saves them.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::markdown::{plain_excerpt, render_markdown};
use super::{optional, required, ServiceError, ServiceResult};
use crate::cache::{site_prefix, site_settings_key, CacheLayer, MemoryCache};
use crate::db::repositories::{ArticleRecord, NewGalleryItem, WebsiteRepository};
use crate::models::{site_keys, ArticleStatus, GalleryItem, NewsArticle, SiteSettings};
use crate::tenancy::Tenant;

/// Number of published articles on the home page and in the public JSON
pub const LATEST_NEWS: i64 = 5;
/// Upper bound of any article listing
pub const MAX_ARTICLES: i64 = 100;
const EXCERPT_CHARS: usize = 200;

/// Turn a title into a URL slug.
///
/// ASCII letters and digits are lowercased, letters outside ASCII are kept,
/// everything else becomes a single hyphen. Leading and trailing hyphens are
/// dropped.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphanumeric()) {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArticleInput {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    pub body: String,
    #[serde(default)]
    pub status: ArticleStatus,
}

/// Article with its body rendered for display
#[derive(Debug, Clone, Serialize)]
pub struct ArticleView {
    #[serde(flatten)]
    pub article: NewsArticle,
    pub body_html: String,
}

impl From<NewsArticle> for ArticleView {
    fn from(article: NewsArticle) -> Self {
        let body_html = render_markdown(&article.body);
        Self { article, body_html }
    }
}

/// Everything the public home page needs
#[derive(Debug, Clone, Serialize)]
pub struct PublicSite {
    pub code: String,
    pub settings: SiteSettings,
    pub news: Vec<NewsArticle>,
}

pub struct WebsiteService {
    repo: WebsiteRepository,
    cache: Arc<MemoryCache>,
    school_code: String,
    school_name: String,
}

impl WebsiteService {
    pub fn new(tenant: &Tenant, cache: Arc<MemoryCache>) -> Self {
        Self {
            repo: WebsiteRepository::new(tenant.db.clone()),
            cache,
            school_code: tenant.code.clone(),
            school_name: tenant.name.clone(),
        }
    }

    // Settings

    pub async fn settings(&self) -> ServiceResult<SiteSettings> {
        let key = site_settings_key(&self.school_code);
        if let Some(settings) = self.cache.get::<SiteSettings>(&key).await.ok().flatten() {
            return Ok(settings);
        }

        let stored = self.repo.get_all_settings().await?;
        let settings = SiteSettings::from_map(&stored, &self.school_name);
        let _ = self.cache.set(&key, &settings).await;
        Ok(settings)
    }

    /// Save the known keys present in `values`; unknown keys are rejected
    pub async fn update_settings(&self, values: HashMap<String, String>) -> ServiceResult<SiteSettings> {
        if let Some(unknown) = values.keys().find(|k| !site_keys::ALL.contains(&k.as_str())) {
            return Err(ServiceError::Validation(format!("Unknown setting '{}'", unknown)));
        }
        if let Some(email) = values.get(site_keys::CONTACT_EMAIL).filter(|e| !e.trim().is_empty()) {
            super::validate_email(email)?;
        }
        let values: HashMap<String, String> = values
            .into_iter()
            .map(|(k, v)| (k, v.trim().to_string()))
            .collect();

        self.repo.set_many(&values).await?;
        let _ = self.cache.delete_prefix(&site_prefix(&self.school_code)).await;
        self.settings().await
    }

    // News

    fn record(&self, input: ArticleInput, previous: Option<&NewsArticle>, author_id: Option<i64>) -> ServiceResult<ArticleRecord> {
        let title = required("Title", &input.title)?;
        let body = required("Body", &input.body)?;

        let slug = match optional(&input.slug) {
            Some(given) => generate_slug(&given),
            None => match previous {
                Some(article) => article.slug.clone(),
                None => generate_slug(&title),
            },
        };
        if slug.is_empty() {
            return Err(ServiceError::Validation(
                "Slug must contain at least one letter or digit".to_string(),
            ));
        }

        let excerpt = optional(&input.excerpt).or_else(|| {
            let generated = plain_excerpt(&body, EXCERPT_CHARS);
            (!generated.is_empty()).then_some(generated)
        });

        let published_at = match previous.and_then(|a| a.published_at) {
            Some(first) => Some(first),
            None if input.status == ArticleStatus::Published => Some(Utc::now()),
            None => None,
        };

        Ok(ArticleRecord {
            title,
            slug,
            excerpt,
            body,
            status: input.status,
            published_at,
            author_id: previous.map_or(author_id, |a| a.author_id),
        })
    }

    pub async fn create_article(&self, input: ArticleInput, author_id: Option<i64>) -> ServiceResult<ArticleView> {
        let record = self.record(input, None, author_id)?;
        self.repo
            .create_article(&record)
            .await
            .map(ArticleView::from)
            .map_err(|e| ServiceError::from_db(e, "An article with this slug exists"))
    }

    pub async fn update_article(&self, id: i64, input: ArticleInput) -> ServiceResult<ArticleView> {
        let previous = self
            .repo
            .get_article(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Article", id))?;
        let record = self.record(input, Some(&previous), None)?;

        self.repo
            .update_article(id, &record)
            .await
            .map_err(|e| ServiceError::from_db(e, "An article with this slug exists"))?
            .map(ArticleView::from)
            .ok_or_else(|| ServiceError::not_found("Article", id))
    }

    pub async fn get_article(&self, id: i64) -> ServiceResult<ArticleView> {
        self.repo
            .get_article(id)
            .await?
            .map(ArticleView::from)
            .ok_or_else(|| ServiceError::not_found("Article", id))
    }

    pub async fn list_articles(&self, status: Option<ArticleStatus>) -> ServiceResult<Vec<NewsArticle>> {
        Ok(self.repo.list_articles(status, MAX_ARTICLES).await?)
    }

    /// A published article by slug; drafts are not found
    pub async fn published_article(&self, slug: &str) -> ServiceResult<ArticleView> {
        match self.repo.get_article_by_slug(slug).await? {
            Some(article) if article.status == ArticleStatus::Published => Ok(article.into()),
            _ => Err(ServiceError::NotFound(format!("Article '{}' not found", slug))),
        }
    }

    pub async fn published_articles(&self, limit: i64) -> ServiceResult<Vec<NewsArticle>> {
        Ok(self
            .repo
            .list_articles(Some(ArticleStatus::Published), limit.clamp(1, MAX_ARTICLES))
            .await?)
    }

    pub async fn delete_article(&self, id: i64) -> ServiceResult<()> {
        if !self.repo.delete_article(id).await? {
            return Err(ServiceError::not_found("Article", id));
        }
        Ok(())
    }

    // Gallery

    pub async fn create_gallery_item(&self, input: NewGalleryItem) -> ServiceResult<GalleryItem> {
        let image_url = required("Image URL", &input.image_url)?;
        if !(image_url.starts_with("https://") || image_url.starts_with("http://") || image_url.starts_with('/')) {
            return Err(ServiceError::Validation(
                "Image URL must be an http(s) URL or an absolute path".to_string(),
            ));
        }
        let input = NewGalleryItem {
            title: required("Title", &input.title)?,
            image_url,
            caption: optional(&input.caption),
        };
        Ok(self.repo.create_gallery_item(&input).await?)
    }

    pub async fn list_gallery(&self) -> ServiceResult<Vec<GalleryItem>> {
        Ok(self.repo.list_gallery().await?)
    }

    pub async fn delete_gallery_item(&self, id: i64) -> ServiceResult<()> {
        if !self.repo.delete_gallery_item(id).await? {
            return Err(ServiceError::not_found("Gallery item", id));
        }
        Ok(())
    }

    /// Settings plus the latest published news
    pub async fn public_site(&self) -> ServiceResult<PublicSite> {
        Ok(PublicSite {
            code: self.school_code.clone(),
            settings: self.settings().await?,
            news: self.published_articles(LATEST_NEWS).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use proptest::prelude::*;

    async fn service() -> (WebsiteService, Arc<MemoryCache>) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool, migrations::TENANT_MIGRATIONS)
            .await
            .unwrap();
        let tenant = Tenant {
            code: "greenfield".to_string(),
            name: "Greenfield Academy".to_string(),
            db: pool,
        };
        let cache = Arc::new(MemoryCache::new());
        (WebsiteService::new(&tenant, cache.clone()), cache)
    }

    fn article(title: &str, status: ArticleStatus) -> ArticleInput {
        ArticleInput {
            title: title.to_string(),
            slug: None,
            excerpt: None,
            body: "The **annual** sports day takes place on Friday.".to_string(),
            status,
        }
    }

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Sports Day 2026!"), "sports-day-2026");
        assert_eq!(generate_slug("  --Form 4: Results--  "), "form-4-results");
        assert_eq!(generate_slug("Karibu Shuleni Ü"), "karibu-shuleni-ü");
        assert_eq!(generate_slug("!!!"), "");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn slug_is_clean_and_stable(title in "\\PC{0,60}") {
            let slug = generate_slug(&title);
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            prop_assert!(!slug.chars().any(char::is_whitespace));
            prop_assert_eq!(generate_slug(&slug), slug.clone());
        }
    }

    #[tokio::test]
    async fn test_settings_cached_and_invalidated() {
        let (service, cache) = service().await;
        let settings = service.settings().await.unwrap();
        assert_eq!(settings.site_name, "Greenfield Academy");
        let cached: Option<SiteSettings> = cache.get(&site_settings_key("greenfield")).await.unwrap();
        assert_eq!(cached, Some(settings));

        let mut values = HashMap::new();
        values.insert(site_keys::MOTTO.to_string(), " Strive for excellence ".to_string());
        values.insert(site_keys::SITE_NAME.to_string(), "Greenfield".to_string());
        let updated = service.update_settings(values).await.unwrap();
        assert_eq!(updated.motto, "Strive for excellence");
        assert_eq!(updated.site_name, "Greenfield");
        assert_eq!(service.settings().await.unwrap().site_name, "Greenfield");

        let mut unknown = HashMap::new();
        unknown.insert("theme".to_string(), "dark".to_string());
        assert!(matches!(service.update_settings(unknown).await, Err(ServiceError::Validation(_))));

        let mut bad_email = HashMap::new();
        bad_email.insert(site_keys::CONTACT_EMAIL.to_string(), "office".to_string());
        assert!(matches!(service.update_settings(bad_email).await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_article_lifecycle() {
        let (service, _) = service().await;
        let draft = service.create_article(article("Sports Day", ArticleStatus::Draft), Some(1)).await.unwrap();
        assert_eq!(draft.article.slug, "sports-day");
        assert!(draft.article.published_at.is_none());
        assert!(draft.body_html.contains("<strong>annual</strong>"));
        assert_eq!(
            draft.article.excerpt.as_deref(),
            Some("The annual sports day takes place on Friday.")
        );
        assert!(matches!(service.published_article("sports-day").await, Err(ServiceError::NotFound(_))));

        assert!(matches!(
            service.create_article(article("Sports day", ArticleStatus::Draft), None).await,
            Err(ServiceError::Conflict(_))
        ));

        let published = service
            .update_article(draft.article.id, article("Sports Day moved", ArticleStatus::Published))
            .await
            .unwrap();
        assert_eq!(published.article.slug, "sports-day");
        assert_eq!(published.article.author_id, Some(1));
        let first_published = published.article.published_at.unwrap();

        let unpublished = service
            .update_article(draft.article.id, article("Sports Day moved", ArticleStatus::Draft))
            .await
            .unwrap();
        assert_eq!(unpublished.article.published_at, Some(first_published));

        service
            .update_article(draft.article.id, article("Sports Day moved", ArticleStatus::Published))
            .await
            .unwrap();
        let site = service.public_site().await.unwrap();
        assert_eq!(site.news.len(), 1);
        assert_eq!(service.published_article("sports-day").await.unwrap().article.published_at, Some(first_published));

        let punctuation = ArticleInput { slug: Some("???".to_string()), ..article("Other", ArticleStatus::Draft) };
        assert!(matches!(service.create_article(punctuation, None).await, Err(ServiceError::Validation(_))));

        service.delete_article(draft.article.id).await.unwrap();
        assert!(matches!(service.get_article(draft.article.id).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_gallery() {
        let (service, _) = service().await;
        let item = service
            .create_gallery_item(NewGalleryItem {
                title: "Science fair".to_string(),
                image_url: "https://cdn.example.org/fair.jpg".to_string(),
                caption: Some("".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(item.caption, None);

        let bad = NewGalleryItem {
            title: "Broken".to_string(),
            image_url: "javascript:alert(1)".to_string(),
            caption: None,
        };
        assert!(matches!(service.create_gallery_item(bad).await, Err(ServiceError::Validation(_))));

        assert_eq!(service.list_gallery().await.unwrap().len(), 1);
        service.delete_gallery_item(item.id).await.unwrap();
        assert!(matches!(service.delete_gallery_item(item.id).await, Err(ServiceError::NotFound(_))));
    }
}

//! Website content repository: settings, news articles, gallery

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use crate::db::{on_pool, DynDatabasePool, InsertedId};
use crate::models::{ArticleStatus, GalleryItem, NewsArticle};

const ARTICLE_COLUMNS: &str =
    "id, title, slug, excerpt, body, status, published_at, author_id, created_at, updated_at";
const GALLERY_COLUMNS: &str = "id, title, image_url, caption, created_at";

/// Stored article fields; the service owns slug and publication rules
#[derive(Debug, Clone)]
pub struct ArticleRecord {
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub body: String,
    pub status: ArticleStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub author_id: Option<i64>,
}

impl From<&NewsArticle> for ArticleRecord {
    fn from(article: &NewsArticle) -> Self {
        Self {
            title: article.title.clone(),
            slug: article.slug.clone(),
            excerpt: article.excerpt.clone(),
            body: article.body.clone(),
            status: article.status,
            published_at: article.published_at,
            author_id: article.author_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGalleryItem {
    pub title: String,
    pub image_url: String,
    #[serde(default)]
    pub caption: Option<String>,
}

pub struct WebsiteRepository {
    pool: DynDatabasePool,
}

impl WebsiteRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    // Settings

    pub async fn get_all_settings(&self) -> Result<HashMap<String, String>> {
        let rows = on_pool!(self.pool, p => {
            sqlx::query_as::<_, (String, String)>("SELECT setting_key, setting_value FROM website_settings")
                .fetch_all(p)
                .await
                .context("Failed to load website settings")?
        });
        Ok(rows.into_iter().collect())
    }

    /// Write several settings at once, inserting missing keys
    pub async fn set_many(&self, settings: &HashMap<String, String>) -> Result<()> {
        on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            for (key, value) in settings {
                let updated = sqlx::query(
                    "UPDATE website_settings SET setting_value = ?, updated_at = CURRENT_TIMESTAMP WHERE setting_key = ?",
                )
                .bind(value)
                .bind(key)
                .execute(&mut *tx)
                .await?
                .rows_affected();
                if updated == 0 {
                    sqlx::query("INSERT INTO website_settings (setting_key, setting_value) VALUES (?, ?)")
                        .bind(key)
                        .bind(value)
                        .execute(&mut *tx)
                        .await?;
                }
            }
            tx.commit().await.context("Failed to save website settings")?;
        });
        Ok(())
    }

    // News

    pub async fn create_article(&self, record: &ArticleRecord) -> Result<NewsArticle> {
        let id = on_pool!(self.pool, p => {
            sqlx::query(
                "INSERT INTO news_articles (title, slug, excerpt, body, status, published_at, author_id) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.title)
            .bind(&record.slug)
            .bind(&record.excerpt)
            .bind(&record.body)
            .bind(record.status.as_str())
            .bind(record.published_at)
            .bind(record.author_id)
            .execute(p)
            .await
            .context("Failed to insert article")?
            .inserted_id()
        });

        self.get_article(id).await?.context("Article missing after insert")
    }

    pub async fn update_article(&self, id: i64, record: &ArticleRecord) -> Result<Option<NewsArticle>> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query(
                "UPDATE news_articles SET title = ?, slug = ?, excerpt = ?, body = ?, status = ?, \
                 published_at = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            )
            .bind(&record.title)
            .bind(&record.slug)
            .bind(&record.excerpt)
            .bind(&record.body)
            .bind(record.status.as_str())
            .bind(record.published_at)
            .bind(id)
            .execute(p)
            .await
            .context("Failed to update article")?
            .rows_affected()
        });

        if affected == 0 {
            return Ok(None);
        }
        self.get_article(id).await
    }

    pub async fn get_article(&self, id: i64) -> Result<Option<NewsArticle>> {
        let sql = format!("SELECT {} FROM news_articles WHERE id = ?", ARTICLE_COLUMNS);
        let article = on_pool!(self.pool, p => {
            sqlx::query_as::<_, NewsArticle>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(article)
    }

    pub async fn get_article_by_slug(&self, slug: &str) -> Result<Option<NewsArticle>> {
        let sql = format!("SELECT {} FROM news_articles WHERE slug = ?", ARTICLE_COLUMNS);
        let article = on_pool!(self.pool, p => {
            sqlx::query_as::<_, NewsArticle>(&sql).bind(slug).fetch_optional(p).await?
        });
        Ok(article)
    }

    pub async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let count = on_pool!(self.pool, p => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM news_articles WHERE slug = ?")
                .bind(slug)
                .fetch_one(p)
                .await?
        });
        Ok(count > 0)
    }

    /// Articles, newest first. `status` restricts to drafts or published.
    pub async fn list_articles(&self, status: Option<ArticleStatus>, limit: i64) -> Result<Vec<NewsArticle>> {
        let articles = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM news_articles WHERE status = ? \
                     ORDER BY COALESCE(published_at, created_at) DESC, id DESC LIMIT ?",
                    ARTICLE_COLUMNS
                );
                on_pool!(self.pool, p => {
                    sqlx::query_as::<_, NewsArticle>(&sql)
                        .bind(status.as_str())
                        .bind(limit)
                        .fetch_all(p)
                        .await?
                })
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM news_articles ORDER BY created_at DESC, id DESC LIMIT ?",
                    ARTICLE_COLUMNS
                );
                on_pool!(self.pool, p => {
                    sqlx::query_as::<_, NewsArticle>(&sql).bind(limit).fetch_all(p).await?
                })
            }
        };
        Ok(articles)
    }

    pub async fn delete_article(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM news_articles WHERE id = ?")
                .bind(id)
                .execute(p)
                .await?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    // Gallery

    pub async fn create_gallery_item(&self, input: &NewGalleryItem) -> Result<GalleryItem> {
        let id = on_pool!(self.pool, p => {
            sqlx::query("INSERT INTO gallery_items (title, image_url, caption) VALUES (?, ?, ?)")
                .bind(&input.title)
                .bind(&input.image_url)
                .bind(&input.caption)
                .execute(p)
                .await
                .context("Failed to insert gallery item")?
                .inserted_id()
        });

        let sql = format!("SELECT {} FROM gallery_items WHERE id = ?", GALLERY_COLUMNS);
        let item = on_pool!(self.pool, p => {
            sqlx::query_as::<_, GalleryItem>(&sql).bind(id).fetch_one(p).await?
        });
        Ok(item)
    }

    pub async fn list_gallery(&self) -> Result<Vec<GalleryItem>> {
        let sql = format!("SELECT {} FROM gallery_items ORDER BY created_at DESC, id DESC", GALLERY_COLUMNS);
        let items = on_pool!(self.pool, p => {
            sqlx::query_as::<_, GalleryItem>(&sql).fetch_all(p).await?
        });
        Ok(items)
    }

    pub async fn delete_gallery_item(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM gallery_items WHERE id = ?")
                .bind(id)
                .execute(p)
                .await?
                .rows_affected()
        });
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, is_unique_violation, migrations};

    async fn repo() -> WebsiteRepository {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool, migrations::TENANT_MIGRATIONS)
            .await
            .unwrap();
        WebsiteRepository::new(pool)
    }

    fn record(slug: &str, status: ArticleStatus) -> ArticleRecord {
        ArticleRecord {
            title: "Prize giving day".to_string(),
            slug: slug.to_string(),
            excerpt: None,
            body: "**Congratulations** to all winners".to_string(),
            status,
            published_at: (status == ArticleStatus::Published).then(Utc::now),
            author_id: Some(1),
        }
    }

    #[tokio::test]
    async fn test_settings_upsert() {
        let repo = repo().await;
        let mut settings = HashMap::new();
        settings.insert("motto".to_string(), "Strive".to_string());
        repo.set_many(&settings).await.unwrap();

        settings.insert("motto".to_string(), "Strive higher".to_string());
        settings.insert("address".to_string(), "P.O. Box 1".to_string());
        repo.set_many(&settings).await.unwrap();

        let stored = repo.get_all_settings().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored["motto"], "Strive higher");
    }

    #[tokio::test]
    async fn test_articles_by_status_and_slug() {
        let repo = repo().await;
        repo.create_article(&record("prize-day", ArticleStatus::Published)).await.unwrap();
        repo.create_article(&record("draft-news", ArticleStatus::Draft)).await.unwrap();

        let err = repo
            .create_article(&record("prize-day", ArticleStatus::Draft))
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));

        let published = repo.list_articles(Some(ArticleStatus::Published), 10).await.unwrap();
        assert_eq!(published.len(), 1);
        assert!(published[0].published_at.is_some());
        assert!(repo.slug_exists("draft-news").await.unwrap());
        assert!(repo.get_article_by_slug("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_gallery() {
        let repo = repo().await;
        let item = repo
            .create_gallery_item(&NewGalleryItem {
                title: "Science fair".to_string(),
                image_url: "https://cdn.example.com/fair.jpg".to_string(),
                caption: None,
            })
            .await
            .unwrap();
        assert_eq!(repo.list_gallery().await.unwrap().len(), 1);
        assert!(repo.delete_gallery_item(item.id).await.unwrap());
    }
}

//! Server-rendered public website
//!
//! Each school gets a small public site (home, news, gallery, about) built
//! from Tera templates compiled into the binary. The same templates serve
//! every school; only the context differs.

use rust_embed::RustEmbed;
use serde::Serialize;
use std::error::Error as StdError;
use tera::{Context as TeraContext, Tera};

mod error;

pub use error::SiteError;

#[derive(RustEmbed)]
#[folder = "templates/site/"]
#[include = "*.html"]
struct SiteTemplates;

pub const HOME: &str = "home.html";
pub const NEWS: &str = "news.html";
pub const ARTICLE: &str = "article.html";
pub const GALLERY: &str = "gallery.html";
pub const ABOUT: &str = "about.html";
pub const NOT_FOUND: &str = "not_found.html";

/// Renders the embedded public-site templates
pub struct SiteRenderer {
    tera: Tera,
}

impl SiteRenderer {
    /// Load every embedded template. `base.html` is added first so the
    /// pages extending it resolve.
    pub fn new() -> Result<Self, SiteError> {
        let mut templates: Vec<(String, String)> = Vec::new();
        for name in SiteTemplates::iter() {
            let file = SiteTemplates::get(&name)
                .ok_or_else(|| SiteError::Template(format!("Embedded template {} vanished", name)))?;
            let content = std::str::from_utf8(&file.data)
                .map_err(|e| SiteError::Template(format!("{} is not UTF-8: {}", name, e)))?
                .to_string();
            templates.push((name.to_string(), content));
        }
        templates.sort_by_key(|(name, _)| name.as_str() != "base.html");

        Self::from_templates(templates)
    }

    fn from_templates(templates: Vec<(String, String)>) -> Result<Self, SiteError> {
        let mut tera = Tera::default();
        for (name, content) in &templates {
            tera.add_raw_template(name, content)
                .map_err(|e| SiteError::Template(format!("Failed to add template {}: {}", name, e)))?;
        }
        tera.build_inheritance_chains()
            .map_err(|e| SiteError::Template(format!("Failed to build template inheritance: {}", e)))?;

        tracing::debug!("Loaded {} public site templates", templates.len());
        Ok(Self { tera })
    }

    pub fn template_names(&self) -> Vec<&str> {
        self.tera.get_template_names().collect()
    }

    pub fn render(&self, name: &str, context: &TeraContext) -> Result<String, SiteError> {
        self.tera.render(name, context).map_err(|e| {
            // Tera keeps the useful part of the message in the source chain
            let mut message = e.to_string();
            let mut source = e.source();
            while let Some(inner) = source {
                message.push_str(": ");
                message.push_str(&inner.to_string());
                source = inner.source();
            }
            SiteError::Render {
                name: name.to_string(),
                message,
            }
        })
    }

    /// Render a page of a school's site; `site` and `code` are always present
    pub fn render_page<S: Serialize>(
        &self,
        name: &str,
        code: &str,
        site: &S,
        extra: TeraContext,
    ) -> Result<String, SiteError> {
        let mut context = TeraContext::new();
        context.insert("code", code);
        context.insert("site", site);
        context.insert("year", &chrono::Utc::now().format("%Y").to_string());
        context.extend(extra);
        self.render(name, &context)
    }

    pub fn render_not_found(&self, message: &str) -> Result<String, SiteError> {
        let mut context = TeraContext::new();
        context.insert("message", message);
        self.render(NOT_FOUND, &context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SiteSettings;
    use crate::services::ArticleView;

    fn settings() -> SiteSettings {
        SiteSettings {
            site_name: "Hillside School".to_string(),
            motto: "Climb higher".to_string(),
            contact_email: "office@hillside.test".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_all_pages_are_embedded() {
        let renderer = SiteRenderer::new().unwrap();
        let names = renderer.template_names();
        for page in [HOME, NEWS, ARTICLE, GALLERY, ABOUT, NOT_FOUND, "base.html"] {
            assert!(names.contains(&page), "missing {}", page);
        }
    }

    #[test]
    fn test_home_page_lists_news() {
        let renderer = SiteRenderer::new().unwrap();
        let mut extra = TeraContext::new();
        extra.insert(
            "news",
            &serde_json::json!([{ "title": "Term dates", "slug": "term-dates", "excerpt": "Opening on Monday", "published_at": null }]),
        );

        let html = renderer.render_page(HOME, "hillside", &settings(), extra).unwrap();
        assert!(html.contains("Welcome to Hillside School"));
        assert!(html.contains("/s/hillside/news/term-dates"));
        assert!(html.contains("Climb higher"));
    }

    #[test]
    fn test_article_body_is_not_double_escaped_but_title_is() {
        let renderer = SiteRenderer::new().unwrap();
        let now = chrono::Utc::now();
        let view = ArticleView::from(crate::models::NewsArticle {
            id: 1,
            title: "Fish & <Chips> day".to_string(),
            slug: "fish-chips-day".to_string(),
            excerpt: None,
            body: "Bring **money**".to_string(),
            status: crate::models::ArticleStatus::Published,
            published_at: Some(now),
            author_id: None,
            created_at: now,
            updated_at: now,
        });
        let mut extra = TeraContext::new();
        extra.insert("article", &view);

        let html = renderer.render_page(ARTICLE, "hillside", &settings(), extra).unwrap();
        assert!(html.contains("<strong>money</strong>"));
        assert!(html.contains("Fish &amp; &lt;Chips&gt; day"));
    }

    #[test]
    fn test_not_found_page() {
        let renderer = SiteRenderer::new().unwrap();
        let html = renderer.render_not_found("No school called nowhere").unwrap();
        assert!(html.contains("No school called nowhere"));
    }

    #[test]
    fn test_broken_template_is_reported() {
        let result = SiteRenderer::from_templates(vec![(
            "home.html".to_string(),
            "{% extends \"missing.html\" %}".to_string(),
        )]);
        assert!(matches!(result, Err(SiteError::Template(_))));
    }
}

//! Server-rendered public school websites under `/s/{code}`
//!
//! Every failure is answered with an HTML page, never the JSON envelope.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tera::Context as TeraContext;

use crate::api::middleware::AppState;
use crate::services::markdown::render_markdown;
use crate::services::website::MAX_ARTICLES;
use crate::services::{ServiceError, WebsiteService};
use crate::site::{self, SiteError};
use crate::tenancy::TenancyError;

/// Why a page could not be shown
#[derive(Debug)]
enum PageFailure {
    NotFound(&'static str),
    Unavailable,
    Internal(String),
}

impl From<TenancyError> for PageFailure {
    fn from(err: TenancyError) -> Self {
        match err {
            TenancyError::UnknownSchool(_) | TenancyError::Inactive(_) => {
                PageFailure::NotFound("School not found")
            }
            TenancyError::Connect { .. } => PageFailure::Unavailable,
            other => PageFailure::Internal(other.to_string()),
        }
    }
}

impl From<ServiceError> for PageFailure {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(_) => PageFailure::NotFound("Page not found"),
            ServiceError::Unavailable(_) => PageFailure::Unavailable,
            other => PageFailure::Internal(other.to_string()),
        }
    }
}

impl From<SiteError> for PageFailure {
    fn from(err: SiteError) -> Self {
        PageFailure::Internal(err.to_string())
    }
}

type PageResult = Result<String, PageFailure>;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/s/{code}", get(home))
        .route("/s/{code}/news", get(news))
        .route("/s/{code}/news/{slug}", get(article))
        .route("/s/{code}/gallery", get(gallery))
        .route("/s/{code}/about", get(about))
}

fn respond(state: &AppState, result: PageResult) -> Response {
    let (status, message) = match result {
        Ok(html) => return Html(html).into_response(),
        Err(PageFailure::NotFound(message)) => (StatusCode::NOT_FOUND, message),
        Err(PageFailure::Unavailable) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "This site is temporarily unavailable",
        ),
        Err(PageFailure::Internal(message)) => {
            tracing::error!("Site page failed: {}", message);
            (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
        }
    };

    match state.site.render_not_found(message) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!("Error page failed to render: {}", e);
            (status, message).into_response()
        }
    }
}

/// The school's website service and its canonical code
async fn website(state: &AppState, code: &str) -> Result<(WebsiteService, String), PageFailure> {
    let tenant = state.router.resolve(code).await?;
    Ok((WebsiteService::new(&tenant, state.cache.clone()), tenant.code))
}

/// GET /s/{code}
async fn home(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    let result = home_page(&state, &code).await;
    respond(&state, result)
}

async fn home_page(state: &AppState, code: &str) -> PageResult {
    let public = website(state, code).await?.0.public_site().await?;
    let mut extra = TeraContext::new();
    extra.insert("news", &public.news);
    Ok(state.site.render_page(site::HOME, &public.code, &public.settings, extra)?)
}

async fn news(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    let result = news_page(&state, &code).await;
    respond(&state, result)
}

async fn news_page(state: &AppState, code: &str) -> PageResult {
    let (website, code) = website(state, code).await?;
    let settings = website.settings().await?;
    let mut extra = TeraContext::new();
    extra.insert("news", &website.published_articles(MAX_ARTICLES).await?);
    Ok(state.site.render_page(site::NEWS, &code, &settings, extra)?)
}

/// GET /s/{code}/news/{slug}
///
/// Drafts are not found.
async fn article(
    State(state): State<AppState>,
    Path((code, slug)): Path<(String, String)>,
) -> Response {
    let result = article_page(&state, &code, &slug).await;
    respond(&state, result)
}

async fn article_page(state: &AppState, code: &str, slug: &str) -> PageResult {
    let (website, code) = website(state, code).await?;
    let settings = website.settings().await?;
    let mut extra = TeraContext::new();
    extra.insert("article", &website.published_article(slug).await?);
    Ok(state.site.render_page(site::ARTICLE, &code, &settings, extra)?)
}

async fn gallery(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    let result = gallery_page(&state, &code).await;
    respond(&state, result)
}

async fn gallery_page(state: &AppState, code: &str) -> PageResult {
    let (website, code) = website(state, code).await?;
    let settings = website.settings().await?;
    let mut extra = TeraContext::new();
    extra.insert("gallery", &website.list_gallery().await?);
    Ok(state.site.render_page(site::GALLERY, &code, &settings, extra)?)
}

async fn about(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    let result = about_page(&state, &code).await;
    respond(&state, result)
}

async fn about_page(state: &AppState, code: &str) -> PageResult {
    let (website, code) = website(state, code).await?;
    let settings = website.settings().await?;
    let mut extra = TeraContext::new();
    extra.insert("about_html", &render_markdown(&settings.about));
    Ok(state.site.render_page(site::ABOUT, &code, &settings, extra)?)
}

//! Common API utilities and shared types

use axum::{http::StatusCode, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Page query parameters; the services clamp out-of-range values
#[derive(Debug, Default, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Optional `from`/`to` date window (`YYYY-MM-DD`)
#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Optional date for actions that default to today (returns, vacating)
#[derive(Debug, Default, Deserialize)]
pub struct OnDate {
    pub date: Option<NaiveDate>,
}

/// List wrapper so every collection response is an object
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

/// `201 Created` with the new resource as body
pub fn created<T: Serialize>(value: T) -> (StatusCode, Json<T>) {
    (StatusCode::CREATED, Json(value))
}

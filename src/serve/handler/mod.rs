use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};
use strum::VariantArray;

use crate::CONFIG;
use crate::analytics::{self, HomeStats};
use crate::config::Config;
use crate::data::Category;
use crate::{
    context,
    serve::{AppError, AppState},
};

pub mod admin;
pub mod filters;
pub mod map;
pub mod report;
pub mod reports;

#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub stats: HomeStats,
    pub categories: Vec<(&'static str, &'static str)>,
    pub config: &'static Config,
    pub page: context::Page,
}

#[axum::debug_handler]
pub async fn index(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<IndexTemplate, AppError> {
    let reports = state.store.reports()?;

    Ok(IndexTemplate {
        stats: analytics::home_stats(&reports),
        categories: Category::VARIANTS
            .iter()
            .map(|c| (c.as_str(), c.label()))
            .collect(),
        config: &CONFIG,
        page: state.page_context("home", &headers),
    })
}

#[derive(Template, WebTemplate)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate {
    pub config: &'static Config,
    pub page: context::Page,
}

pub async fn not_found(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> (StatusCode, NotFoundTemplate) {
    (
        StatusCode::NOT_FOUND,
        NotFoundTemplate {
            config: &CONFIG,
            page: state.page_context("", &headers),
        },
    )
}

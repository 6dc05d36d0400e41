use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
};
use serde_derive::Deserialize;
use strum::VariantArray;

use crate::CONFIG;
use crate::analytics::StatusCounts;
use crate::config::Config;
use crate::context::{self, MapMarker, SelectOption};
use crate::data::{Category, Report, Status};
use crate::filter::{Choice, Filter};
use crate::serve::handler::reports::status_options;
use crate::serve::{AppError, AppState};

#[derive(Deserialize, Debug, Default)]
pub struct MapQuery {
    #[serde(default)]
    pub category: Choice<Category>,
    #[serde(default)]
    pub status: Choice<Status>,
}

#[derive(Template, WebTemplate)]
#[template(path = "map.html")]
pub struct MapTemplate {
    pub markers: Vec<MapMarker>,
    pub shown: usize,
    pub unlocated: usize,
    pub loaded: usize,
    pub counts: StatusCounts,
    pub categories: Vec<SelectOption>,
    pub statuses: Vec<SelectOption>,
    pub config: &'static Config,
    pub page: context::Page,
}

#[axum::debug_handler]
pub async fn page(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<MapQuery>,
) -> Result<MapTemplate, AppError> {
    let reports = state.store.reports()?;

    let categories = context::filter_options(
        "All Categories",
        &query.category.value(),
        Category::VARIANTS.iter().map(|c| (c.as_str(), c.label())),
    );
    let statuses = status_options(&query.status);

    let shown = Filter::<Report>::categorical()
        .choice(query.category, |r| &r.category)
        .choice(query.status, |r| &r.status)
        .apply(&reports);
    let markers = context::markers(&shown);

    Ok(MapTemplate {
        unlocated: shown.len() - markers.len(),
        shown: shown.len(),
        loaded: reports.len(),
        counts: StatusCounts::of(shown.iter().copied()),
        markers,
        categories,
        statuses,
        config: &CONFIG,
        page: state.page_context("map", &headers),
    })
}

use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde_derive::Deserialize;

use crate::CONFIG;
use crate::analytics::StatusCounts;
use crate::config::Config;
use crate::context::{self, ReportRow, SelectOption};
use crate::data::Status;
use crate::filter::{self, Choice, Filter};
use crate::present;
use crate::serve::{AppError, AppState};

#[derive(Deserialize, Debug, Default)]
pub struct ReportsQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub status: Choice<Status>,
}

#[derive(Debug, Clone)]
pub struct StatusTile {
    pub label: &'static str,
    pub class: &'static str,
    pub count: usize,
}

/// Rows of the report list plus what the empty state needs to know.
#[derive(Debug, Clone)]
pub struct ReportList {
    pub rows: Vec<ReportRow>,
    pub loaded: usize,
    pub filtered: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "reports.html")]
pub struct ReportsTemplate {
    pub query: String,
    pub statuses: Vec<SelectOption>,
    pub tiles: Vec<StatusTile>,
    pub list: ReportList,
    pub config: &'static Config,
    pub page: context::Page,
}

#[derive(Template, WebTemplate)]
#[template(path = "reports.html", block = "list")]
pub struct ReportListPartial {
    pub list: ReportList,
}

pub fn status_options(current: &Choice<Status>) -> Vec<SelectOption> {
    context::filter_options(
        "All Status",
        &current.value(),
        Status::ALL
            .iter()
            .map(|s| (s.as_str(), present::status_badge(*s).label)),
    )
}

#[axum::debug_handler]
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ReportsQuery>,
) -> Result<Response, AppError> {
    let reports = state.store.reports()?;
    let departments = state.store.departments()?;

    let statuses = status_options(&query.status);
    let list = {
        let filter =
            Filter::new(filter::MY_REPORTS, &query.q).choice(query.status, |r| &r.status);
        ReportList {
            rows: filter
                .apply(&reports)
                .into_iter()
                .map(|r| ReportRow::new(r, &departments))
                .collect(),
            loaded: reports.len(),
            filtered: filter.is_active(),
        }
    };

    if headers.contains_key("hx-request") {
        return Ok(ReportListPartial { list }.into_response());
    }

    let counts = StatusCounts::of(&reports);
    let tiles = Status::ALL
        .iter()
        .map(|s| {
            let badge = present::status_badge(*s);
            StatusTile {
                label: badge.label,
                class: badge.class,
                count: counts.get(*s),
            }
        })
        .collect();

    Ok(ReportsTemplate {
        query: query.q,
        statuses,
        tiles,
        list,
        config: &CONFIG,
        page: state.page_context("reports", &headers),
    }
    .into_response())
}

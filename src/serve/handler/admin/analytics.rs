use std::{str::FromStr, sync::Arc};

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
};
use serde_derive::Deserialize;
use strum::VariantArray;

use crate::CONFIG;
use crate::analytics::{self, Range, percent};
use crate::config::Config;
use crate::context::{self, HotspotRow, SelectOption};
use crate::filter::Choice;
use crate::serve::{AppError, AppState};

#[derive(Deserialize, Debug, Default)]
pub struct AnalyticsQuery {
    #[serde(default)]
    pub range: String,
    #[serde(default)]
    pub department: Choice<String>,
}

#[derive(Debug, Clone)]
pub struct CategoryRow {
    pub label: &'static str,
    pub count: usize,
    pub percent: u32,
}

/// A month of the trend chart, with bar widths relative to the busiest month.
#[derive(Debug, Clone)]
pub struct TrendRow {
    pub month: String,
    pub complaints: usize,
    pub resolved: usize,
    pub complaints_width: u32,
    pub resolved_width: u32,
}

#[derive(Debug, Clone)]
pub struct PerformanceRow {
    pub name: String,
    pub staff: usize,
    pub active: usize,
    pub resolved: usize,
    pub avg_resolution: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/analytics.html")]
pub struct AnalyticsTemplate {
    pub as_of: String,
    pub range_label: &'static str,
    pub ranges: Vec<SelectOption>,
    pub departments: Vec<SelectOption>,
    pub total: usize,
    pub resolved: usize,
    pub resolution_rate: u32,
    pub avg_resolution: String,
    pub categories: Vec<CategoryRow>,
    pub trends: Vec<TrendRow>,
    pub performance: Vec<PerformanceRow>,
    pub hotspots: Vec<HotspotRow>,
    pub config: &'static Config,
    pub page: context::Page,
}

#[axum::debug_handler]
pub async fn page(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AnalyticsQuery>,
) -> Result<AnalyticsTemplate, AppError> {
    let range = match query.range.trim() {
        "" => Range::default(),
        r => Range::from_str(r).map_err(|_| AppError::BadRequest(format!("Unknown range `{}`", r)))?,
    };
    let reports = state.store.reports()?;
    let departments = state.store.departments()?;

    let as_of = analytics::as_of(&reports, chrono::Local::now().date_naive());
    let result = analytics::analyze(&reports, &departments, range, &query.department, as_of);

    let busiest = result
        .trends
        .iter()
        .map(|t| t.complaints.max(t.resolved))
        .max()
        .unwrap_or(0);

    Ok(AnalyticsTemplate {
        as_of: as_of.format("%b %-d, %Y").to_string(),
        range_label: range.label(),
        ranges: Range::VARIANTS
            .iter()
            .map(|r| SelectOption::new(r.as_str(), r.label(), range.as_str()))
            .collect(),
        departments: context::filter_options(
            "All Departments",
            &query.department.value(),
            departments.iter().map(|d| (d.id.as_str(), d.name.as_str())),
        ),
        total: result.total,
        resolved: result.resolved,
        resolution_rate: result.resolution_rate,
        avg_resolution: context::format_days(result.avg_resolution_days),
        categories: result
            .categories
            .iter()
            .map(|c| CategoryRow {
                label: c.category.label(),
                count: c.count,
                percent: c.percent,
            })
            .collect(),
        trends: result
            .trends
            .iter()
            .map(|t| TrendRow {
                month: t.month.clone(),
                complaints: t.complaints,
                resolved: t.resolved,
                complaints_width: percent(t.complaints, busiest),
                resolved_width: percent(t.resolved, busiest),
            })
            .collect(),
        performance: result
            .departments
            .iter()
            .map(|d| PerformanceRow {
                name: d.name.clone(),
                staff: d.staff_count,
                active: d.active,
                resolved: d.resolved,
                avg_resolution: context::format_days(d.avg_resolution_days),
            })
            .collect(),
        hotspots: result.hotspots.iter().map(HotspotRow::from).collect(),
        config: &CONFIG,
        page: state.page_context("analytics", &headers),
    })
}

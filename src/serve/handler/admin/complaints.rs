use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde_derive::Deserialize;
use strum::VariantArray;
use tracing::warn;

use crate::CONFIG;
use crate::assignment::{self, AssignmentError, AssignmentForm};
use crate::config::Config;
use crate::context::{self, ReportRow, SelectOption, StaffGroup, UpdateRow};
use crate::data::{Category, Priority, Report, ReportId, Status};
use crate::filter::{self, Choice, Filter};
use crate::present;
use crate::serve::handler::reports::{ReportList, status_options};
use crate::serve::{AppError, AppState};

#[derive(Deserialize, Debug, Default)]
pub struct ComplaintsQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub status: Choice<Status>,
    #[serde(default)]
    pub category: Choice<Category>,
    #[serde(default)]
    pub priority: Choice<Priority>,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/complaints.html")]
pub struct ComplaintsTemplate {
    pub query: String,
    pub statuses: Vec<SelectOption>,
    pub categories: Vec<SelectOption>,
    pub priorities: Vec<SelectOption>,
    pub list: ReportList,
    pub config: &'static Config,
    pub page: context::Page,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/complaints.html", block = "list")]
pub struct ComplaintListPartial {
    pub list: ReportList,
}

#[axum::debug_handler]
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ComplaintsQuery>,
) -> Result<Response, AppError> {
    let reports = state.store.reports()?;
    let departments = state.store.departments()?;

    let statuses = status_options(&query.status);
    let categories = context::filter_options(
        "All Categories",
        &query.category.value(),
        Category::VARIANTS.iter().map(|c| (c.as_str(), c.label())),
    );
    let priorities = context::filter_options(
        "All Priorities",
        &query.priority.value(),
        Priority::VARIANTS.iter().map(|p| (p.as_str(), p.label())),
    );

    let list = {
        let filter = Filter::new(filter::COMPLAINTS, &query.q)
            .choice(query.status, |r| &r.status)
            .choice(query.category, |r| &r.category)
            .choice(query.priority, |r| &r.priority);
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
        return Ok(ComplaintListPartial { list }.into_response());
    }

    Ok(ComplaintsTemplate {
        query: query.q,
        statuses,
        categories,
        priorities,
        list,
        config: &CONFIG,
        page: state.page_context("complaints", &headers),
    }
    .into_response())
}

/// A complaint with its timeline and the assignment panel.
#[derive(Debug, Clone)]
pub struct ComplaintView {
    pub report: ReportRow,
    pub history: Vec<UpdateRow>,
    pub statuses: Vec<SelectOption>,
    pub departments: Vec<SelectOption>,
    pub staff: Vec<StaffGroup>,
    pub notes: String,
    pub notice: Option<String>,
    pub failed: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/complaint.html")]
pub struct ComplaintTemplate {
    pub view: ComplaintView,
    pub config: &'static Config,
    pub page: context::Page,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/complaint.html", block = "complaint")]
pub struct ComplaintPartial {
    pub view: ComplaintView,
}

fn parse_id(id: &str) -> Result<ReportId, AppError> {
    ReportId::parse(id).ok_or_else(|| AppError::NotFound(format!("complaint {}", id)))
}

/// Builds the complaint view. The assignment panel starts from `form` when
/// given, so a rejected change is shown as it was entered.
fn complaint_view(
    state: &AppState,
    report: &Report,
    form: Option<&AssignmentForm>,
) -> Result<ComplaintView, AppError> {
    let departments = state.store.departments()?;
    let history = state.store.report_history(&report.id)?;

    let status = form
        .map(|f| f.status.clone())
        .unwrap_or_else(|| report.status.as_str().to_string());
    let department = form
        .map(|f| f.department.clone())
        .unwrap_or_else(|| report.department.clone().unwrap_or_default());
    let staff = form
        .map(|f| f.staff.clone())
        .unwrap_or_else(|| report.assigned_to.clone().unwrap_or_default());

    Ok(ComplaintView {
        report: ReportRow::new(report, &departments),
        history: history.iter().map(UpdateRow::from).collect(),
        statuses: Status::ALL
            .iter()
            .map(|s| SelectOption::new(s.as_str(), present::status_badge(*s).label, &status))
            .collect(),
        departments: departments
            .iter()
            .map(|d| SelectOption::new(d.id.clone(), d.name.clone(), &department))
            .collect(),
        staff: context::staff_groups(&departments, &staff),
        notes: form.map(|f| f.notes.clone()).unwrap_or_default(),
        notice: None,
        failed: false,
    })
}

#[axum::debug_handler]
pub async fn detail(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<ComplaintTemplate, AppError> {
    let id = parse_id(&id)?;
    let report = state.store.report(&id)?;

    Ok(ComplaintTemplate {
        view: complaint_view(&state, &report, None)?,
        config: &CONFIG,
        page: state.page_context("complaints", &headers),
    })
}

#[axum::debug_handler]
pub async fn assign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Form(form): Form<AssignmentForm>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let author = state.author(&headers);
    let today = chrono::Local::now().date_naive();

    let view = match assignment::apply(&*state.store, &id, &form, state.policy, &author, today) {
        Ok(report) => {
            let mut view = complaint_view(&state, &report, None)?;
            view.notice = Some("Complaint updated".to_string());
            view
        }
        Err(AssignmentError::Store(e)) => return Err(e.into()),
        Err(e) => {
            warn!(report = %id, error = %e, "assignment rejected");
            let report = state.store.report(&id)?;
            let mut view = complaint_view(&state, &report, Some(&form))?;
            view.notice = Some(e.to_string());
            view.failed = true;
            view
        }
    };

    if headers.contains_key("hx-request") {
        return Ok(ComplaintPartial { view }.into_response());
    }

    Ok(ComplaintTemplate {
        view,
        config: &CONFIG,
        page: state.page_context("complaints", &headers),
    }
    .into_response())
}

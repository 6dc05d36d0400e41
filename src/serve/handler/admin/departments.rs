use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use garde::Validate;
use serde_derive::Deserialize;
use tracing::info;

use crate::CONFIG;
use crate::analytics::{self, StatusCounts};
use crate::config::Config;
use crate::context::{self, DepartmentCard};
use crate::data::{Contact, NewDepartment, NewStaff, Report};
use crate::filter::{self, Filter};
use crate::serve::{AppError, AppState, hx_redirect};

#[derive(Deserialize, Debug, Default)]
pub struct DepartmentsQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct DepartmentForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub head_name: String,
    #[serde(default)]
    pub head_email: String,
    #[serde(default)]
    pub head_phone: String,
}

impl From<&DepartmentForm> for NewDepartment {
    fn from(f: &DepartmentForm) -> Self {
        NewDepartment {
            name: f.name.trim().to_string(),
            description: f.description.trim().to_string(),
            location: f.location.trim().to_string(),
            head: Contact {
                name: f.head_name.trim().to_string(),
                email: f.head_email.trim().to_string(),
                phone: f.head_phone.trim().to_string(),
            },
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct StaffForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Summary {
    pub departments: usize,
    pub staff: usize,
    pub active: usize,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/departments.html")]
pub struct DepartmentsTemplate {
    pub query: String,
    pub summary: Summary,
    pub avg_resolution: String,
    pub cards: Vec<DepartmentCard>,
    pub loaded: usize,
    pub form: DepartmentForm,
    /// Department whose add-staff form failed, with the reason.
    pub staff_notice: Option<(String, String)>,
    pub notice: Option<String>,
    pub config: &'static Config,
    pub page: context::Page,
}

impl DepartmentsTemplate {
    pub fn staff_notice_for(&self, department: &str) -> Option<&str> {
        self.staff_notice
            .as_ref()
            .filter(|(id, _)| id == department)
            .map(|(_, notice)| notice.as_str())
    }
}

fn departments_page(
    state: &AppState,
    headers: &HeaderMap,
    query: &str,
) -> Result<DepartmentsTemplate, AppError> {
    let reports = state.store.reports()?;
    let departments = state.store.departments()?;
    let all: Vec<&Report> = reports.iter().collect();

    let performance = analytics::department_performance(&departments, &all);
    let cards = Filter::new(filter::DEPARTMENTS, query)
        .apply(&departments)
        .into_iter()
        .filter_map(|d| {
            let p = performance.iter().find(|p| p.id == d.id)?;
            Some(DepartmentCard::new(d, p, &reports))
        })
        .collect();

    Ok(DepartmentsTemplate {
        query: query.to_string(),
        summary: Summary {
            departments: departments.len(),
            staff: departments.iter().map(|d| d.staff.len()).sum(),
            active: StatusCounts::of(&reports).active(),
        },
        avg_resolution: context::format_days(analytics::average_resolution_days(&reports)),
        cards,
        loaded: departments.len(),
        form: DepartmentForm::default(),
        staff_notice: None,
        notice: None,
        config: &CONFIG,
        page: state.page_context("departments", headers),
    })
}

#[axum::debug_handler]
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<DepartmentsQuery>,
) -> Result<DepartmentsTemplate, AppError> {
    departments_page(&state, &headers, &query.q)
}

fn done(headers: &HeaderMap) -> Result<Response, AppError> {
    if headers.contains_key("hx-request") {
        return hx_redirect("/admin/departments");
    }

    Ok(Redirect::to("/admin/departments").into_response())
}

#[axum::debug_handler]
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<DepartmentForm>,
) -> Result<Response, AppError> {
    let department = NewDepartment::from(&form);
    if let Err(report) = department.validate() {
        let mut page = departments_page(&state, &headers, "")?;
        page.notice = Some(format!("Could not add the department: {}", report));
        page.form = form;
        return Ok(page.into_response());
    }

    let department = state.store.create_department(department)?;
    info!(id = %department.id, name = %department.name, "department created");

    done(&headers)
}

#[axum::debug_handler]
pub async fn add_staff(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Form(form): Form<StaffForm>,
) -> Result<Response, AppError> {
    let staff = NewStaff {
        name: form.name.trim().to_string(),
        email: form.email.trim().to_string(),
        phone: form.phone.trim().to_string(),
        role: form.role.trim().to_string(),
        join_date: chrono::Local::now().date_naive(),
    };
    if let Err(report) = staff.validate() {
        let mut page = departments_page(&state, &headers, "")?;
        page.staff_notice = Some((id, format!("Could not add the staff member: {}", report)));
        return Ok(page.into_response());
    }

    let staff = state.store.create_staff(&id, staff)?;
    info!(department = %id, id = %staff.id, name = %staff.name, "staff member added");

    done(&headers)
}

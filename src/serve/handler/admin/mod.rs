use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde_derive::Deserialize;
use strum::VariantArray;
use tracing::info;

use crate::CONFIG;
use crate::analytics::{DashboardStats, dashboard_stats};
use crate::config::Config;
use crate::context::{self, ReportRow, SelectOption};
use crate::data::{Role, Status};
use crate::filter::{self, Choice, Filter};
use crate::serve::handler::reports::{ReportList, status_options};
use crate::serve::{AppError, AppState, session_token};
use crate::services::auth::{AuthError, Credentials, SESSION_TTL};

pub mod analytics;
pub mod complaints;
pub mod departments;
pub mod notifications;

#[derive(Deserialize, Debug, Default)]
pub struct DashboardQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub status: Choice<Status>,
    #[serde(default)]
    pub department: Choice<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/dashboard.html")]
pub struct DashboardTemplate {
    pub stats: DashboardStats,
    pub query: String,
    pub statuses: Vec<SelectOption>,
    pub departments: Vec<SelectOption>,
    pub list: ReportList,
    pub config: &'static Config,
    pub page: context::Page,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/dashboard.html", block = "list")]
pub struct DashboardListPartial {
    pub list: ReportList,
}

#[axum::debug_handler]
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<DashboardQuery>,
) -> Result<Response, AppError> {
    let reports = state.store.reports()?;
    let departments = state.store.departments()?;

    let statuses = status_options(&query.status);
    let department_options = context::filter_options(
        "All Departments",
        &query.department.value(),
        departments.iter().map(|d| (d.id.as_str(), d.name.as_str())),
    );

    let list = {
        let filter = Filter::new(filter::DASHBOARD, &query.q)
            .choice(query.status, |r| &r.status)
            .optional(query.department, |r| r.department.as_ref());
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
        return Ok(DashboardListPartial { list }.into_response());
    }

    Ok(DashboardTemplate {
        stats: dashboard_stats(&reports),
        query: query.q,
        statuses,
        departments: department_options,
        list,
        config: &CONFIG,
        page: state.page_context("dashboard", &headers),
    }
    .into_response())
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/login.html")]
pub struct LoginTemplate {
    pub email: String,
    pub roles: Vec<SelectOption>,
    pub notice: Option<String>,
    pub config: &'static Config,
    pub page: context::Page,
}

fn role_options(current: Role) -> Vec<SelectOption> {
    Role::VARIANTS
        .iter()
        .map(|r| SelectOption::new(r.as_str(), r.label(), current.as_str()))
        .collect()
}

#[axum::debug_handler]
pub async fn login_form(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<LoginTemplate, AppError> {
    Ok(LoginTemplate {
        email: String::new(),
        roles: role_options(Role::Admin),
        notice: None,
        config: &CONFIG,
        page: state.page_context("login", &headers),
    })
}

fn session_cookie(token: &str, max_age: u64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        CONFIG.session.cookie, token, max_age
    )
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(credentials): Form<Credentials>,
) -> Result<Response, AppError> {
    match state.auth.sign_in(&credentials) {
        Ok(session) => {
            let token = state.sessions.open(session);
            let cookie = session_cookie(&token, SESSION_TTL.as_secs());

            Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/admin")).into_response())
        }
        Err(AuthError::Store(e)) => Err(e.into()),
        Err(e) => Ok((
            StatusCode::UNAUTHORIZED,
            LoginTemplate {
                email: credentials.email,
                roles: role_options(credentials.role),
                notice: Some(e.to_string()),
                config: &CONFIG,
                page: state.page_context("login", &headers),
            },
        )
            .into_response()),
    }
}

#[axum::debug_handler]
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(session) = session_token(&headers).and_then(|t| state.sessions.close(t)) {
        info!(email = %session.email, "signed out");
    }

    ([(header::SET_COOKIE, session_cookie("", 0))], Redirect::to("/")).into_response()
}

use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use serde_derive::Deserialize;
use strum::VariantArray;
use tracing::warn;

use crate::CONFIG;
use crate::compose::{self, Compose, ComposeError, MessageTemplate, SCHEDULE_FORMAT, TEMPLATES};
use crate::config::Config;
use crate::context::{self, NotificationRow, SelectOption};
use crate::data::{Notification, NotificationKind, NotificationStatus, RecipientGroup, ReportId};
use crate::filter::{Choice, Filter};
use crate::serve::handler::filters;
use crate::serve::{AppError, AppState, hx_redirect};

#[derive(Deserialize, Debug, Default)]
pub struct NotificationsQuery {
    #[serde(default)]
    pub status: Choice<NotificationStatus>,
    #[serde(default, rename = "type")]
    pub kind: Choice<NotificationKind>,
    /// Message template to start the compose form from.
    #[serde(default)]
    pub template: String,
    /// Complaint the template is filled in from.
    #[serde(default)]
    pub report: String,
}

#[derive(Debug, Clone)]
pub struct GroupOption {
    pub id: String,
    pub name: String,
    pub members: u32,
    pub checked: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Totals {
    pub sent: usize,
    pub scheduled: usize,
    pub drafts: usize,
    pub failed: usize,
    pub avg_delivery: Option<String>,
    pub reach: u64,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/notifications.html")]
pub struct NotificationsTemplate {
    pub rows: Vec<NotificationRow>,
    pub loaded: usize,
    pub filtered: bool,
    pub statuses: Vec<SelectOption>,
    pub kinds: Vec<SelectOption>,
    pub totals: Totals,
    pub groups: Vec<GroupOption>,
    pub compose: Compose,
    pub compose_kinds: Vec<SelectOption>,
    pub templates: &'static [MessageTemplate],
    pub notice: Option<String>,
    pub config: &'static Config,
    pub page: context::Page,
}

impl NotificationsTemplate {
    pub fn addresses(&self) -> String {
        self.compose.addresses.join(", ")
    }

    pub fn report_ids(&self) -> String {
        self.compose.report_ids.join(", ")
    }

    pub fn schedule_at(&self) -> String {
        self.compose
            .schedule_at
            .map(|at| at.format(SCHEDULE_FORMAT).to_string())
            .unwrap_or_default()
    }
}

fn totals(notifications: &[Notification], groups: &[RecipientGroup]) -> Totals {
    let count = |status| notifications.iter().filter(|n| n.status == status).count();
    let rates: Vec<f64> = notifications.iter().filter_map(|n| n.delivery_rate).collect();
    let reach = notifications
        .iter()
        .filter(|n| n.status == NotificationStatus::Sent)
        .flat_map(|n| n.recipients.iter())
        .map(|r| {
            groups
                .iter()
                .find(|g| &g.id == r)
                .map_or(1, |g| g.member_count as u64)
        })
        .sum();

    Totals {
        sent: count(NotificationStatus::Sent),
        scheduled: count(NotificationStatus::Scheduled),
        drafts: count(NotificationStatus::Draft),
        failed: count(NotificationStatus::Failed),
        avg_delivery: (!rates.is_empty())
            .then(|| format!("{:.1}%", rates.iter().sum::<f64>() / rates.len() as f64)),
        reach,
    }
}

fn notifications_page(
    state: &AppState,
    headers: &HeaderMap,
    query: NotificationsQuery,
    compose: Compose,
) -> Result<NotificationsTemplate, AppError> {
    let notifications = state.store.notifications()?;
    let groups = state.store.recipient_groups()?;

    let statuses = context::filter_options(
        "All Status",
        &query.status.value(),
        NotificationStatus::VARIANTS
            .iter()
            .map(|s| (s.as_str(), s.label())),
    );
    let kinds = context::filter_options(
        "All Types",
        &query.kind.value(),
        NotificationKind::VARIANTS
            .iter()
            .map(|k| (k.as_str(), k.label())),
    );

    let (rows, filtered) = {
        let filter = Filter::categorical()
            .choice(query.status, |n: &Notification| &n.status)
            .choice(query.kind, |n: &Notification| &n.kind);
        let rows = filter
            .apply(&notifications)
            .into_iter()
            .map(|n| NotificationRow::new(n, &groups))
            .collect();
        (rows, filter.is_active())
    };

    Ok(NotificationsTemplate {
        rows,
        loaded: notifications.len(),
        filtered,
        statuses,
        kinds,
        totals: totals(&notifications, &groups),
        groups: groups
            .iter()
            .map(|g| GroupOption {
                id: g.id.clone(),
                name: g.name.clone(),
                members: g.member_count,
                checked: compose.groups.contains(&g.id),
            })
            .collect(),
        compose_kinds: NotificationKind::VARIANTS
            .iter()
            .map(|k| SelectOption::new(k.as_str(), k.label(), compose.kind.as_str()))
            .collect(),
        compose,
        templates: TEMPLATES,
        notice: None,
        config: &CONFIG,
        page: state.page_context("notifications", headers),
    })
}

#[axum::debug_handler]
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<NotificationsQuery>,
) -> Result<NotificationsTemplate, AppError> {
    let compose = match query.template.trim() {
        "" => Compose::default(),
        id => {
            let template = MessageTemplate::find(id)?;
            let report = match query.report.trim() {
                "" => None,
                report => {
                    let id = ReportId::parse(report)
                        .ok_or_else(|| AppError::NotFound(format!("complaint {}", report)))?;
                    Some(state.store.report(&id)?)
                }
            };
            template.compose(report.as_ref())
        }
    };

    notifications_page(&state, &headers, query, compose)
}

/// Sends or saves the composed notification. Checkbox groups repeat the
/// `group` key, so the form is read as raw pairs.
#[axum::debug_handler]
pub async fn compose(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let draft = Compose::from_pairs(&pairs)?;
    let now = chrono::Local::now().naive_local();

    match compose::submit(draft.clone(), &*state.store, &*state.dispatcher, now).await {
        Ok(_) => {
            if headers.contains_key("hx-request") {
                return hx_redirect("/admin/notifications");
            }
            Ok(Redirect::to("/admin/notifications").into_response())
        }
        Err(ComposeError::Store(e)) => Err(e.into()),
        Err(e) => {
            warn!(error = %e, "notification rejected");
            let mut page =
                notifications_page(&state, &headers, NotificationsQuery::default(), draft)?;
            page.notice = Some(e.to_string());
            Ok(page.into_response())
        }
    }
}

use std::{sync::Arc, time::Duration};

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Multipart, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde_derive::Deserialize;
use strum::VariantArray;
use tracing::warn;

use crate::CONFIG;
use crate::config::Config;
use crate::context::{self, SelectOption};
use crate::data::{Category, Coordinates};
use crate::serve::{AppError, AppState, PHOTO_URL_PREFIX};
use crate::services::geo::{self, ClientPosition};
use crate::submission::{Phase, ReportForm, SubmissionFlow, SubmitError, non_empty};

/// Everything the report form shows, in any phase.
#[derive(Debug, Clone, Default)]
pub struct ReportView {
    pub form: ReportForm,
    pub categories: Vec<SelectOption>,
    pub coordinates: String,
    pub photo: Option<String>,
    pub notice: Option<String>,
    pub missing: Vec<&'static str>,
    pub submitted: Option<String>,
}

impl ReportView {
    fn new(flow: &SubmissionFlow) -> Self {
        let form = flow.form().clone();
        let categories = Category::VARIANTS
            .iter()
            .map(|c| SelectOption::new(c.as_str(), c.label(), &form.category))
            .collect();
        let submitted = match flow.phase() {
            Phase::Submitted { id } => Some(id.to_string()),
            _ => None,
        };

        Self {
            categories,
            coordinates: flow
                .coordinates()
                .map(|c| c.format(CONFIG.geolocation.precision as usize))
                .unwrap_or_default(),
            photo: flow.photo().map(str::to_string),
            notice: flow.notice().map(str::to_string),
            missing: Vec::new(),
            submitted,
            form,
        }
    }

    pub fn is_missing(&self, field: &str) -> bool {
        self.missing.iter().any(|m| *m == field)
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "report/form.html")]
pub struct ReportPageTemplate {
    pub view: ReportView,
    pub config: &'static Config,
    pub page: context::Page,
}

#[derive(Template, WebTemplate)]
#[template(path = "report/form.html", block = "form")]
pub struct ReportFormPartial {
    pub view: ReportView,
    pub config: &'static Config,
}

#[axum::debug_handler]
pub async fn form(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<ReportPageTemplate, AppError> {
    Ok(ReportPageTemplate {
        view: ReportView::new(&SubmissionFlow::default()),
        config: &CONFIG,
        page: state.page_context("report", &headers),
    })
}

struct Upload {
    content_type: String,
    bytes: Vec<u8>,
}

async fn read_form(
    mut multipart: Multipart,
) -> Result<(ReportForm, Option<Coordinates>, Option<String>, Option<Upload>), AppError> {
    let mut form = ReportForm::default();
    let mut coordinates = None;
    let mut photo_url = None;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "photo" {
            let has_file = field.file_name().is_some_and(|f| !f.is_empty());
            let content_type = field.content_type().unwrap_or_default().to_string();
            let bytes = field.bytes().await?;
            if has_file {
                upload = Some(Upload {
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let value = field.text().await?;
        match name.as_str() {
            "title" => form.title = value,
            "category" => form.category = value,
            "description" => form.description = value,
            "location" => form.location = value,
            "reporter_name" => form.reporter_name = value,
            "reporter_email" => form.reporter_email = non_empty(&value),
            "reporter_phone" => form.reporter_phone = value,
            "coordinates" => coordinates = Coordinates::parse(&value),
            // Kept from an earlier attempt so the citizen need not upload again.
            "photo_url" if value.starts_with(PHOTO_URL_PREFIX) => photo_url = Some(value),
            _ => {}
        }
    }

    Ok((form, coordinates, photo_url, upload))
}

#[axum::debug_handler]
pub async fn submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (form, coordinates, photo_url, upload) = read_form(multipart).await?;

    let mut flow = SubmissionFlow::new(form);
    flow.set_coordinates(coordinates);
    if let Some(url) = photo_url {
        flow.attach_photo(url);
    }

    let mut photo_error = None;
    if let Some(upload) = upload {
        match state.photos.store(&upload.content_type, &upload.bytes).await {
            Ok(url) => flow.attach_photo(url),
            Err(e) => {
                warn!(error = %e, "photo rejected");
                photo_error = Some(e.to_string());
            }
        }
    }

    let mut missing = Vec::new();
    if photo_error.is_none() {
        let today = chrono::Local::now().date_naive();
        let invalid = matches!(
            flow.submit(&*state.submitter, today).await,
            Err(SubmitError::Invalid(_))
        );
        if invalid {
            missing = flow.form().missing();
        }
    }

    let mut view = ReportView::new(&flow);
    view.missing = missing;
    if photo_error.is_some() {
        view.notice = photo_error;
    }

    if headers.contains_key("hx-request") {
        return Ok(ReportFormPartial {
            view,
            config: &CONFIG,
        }
        .into_response());
    }

    Ok(ReportPageTemplate {
        view,
        config: &CONFIG,
        page: state.page_context("report", &headers),
    }
    .into_response())
}

#[derive(Deserialize, Debug, Default)]
pub struct LocateQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub error: Option<String>,
    #[serde(default)]
    pub location: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "report/location_partial.html")]
pub struct LocationPartial {
    pub location: String,
    pub coordinates: String,
    pub warning: Option<String>,
}

/// Fills the location field from the position the browser reported.
#[axum::debug_handler]
pub async fn locate(Query(query): Query<LocateQuery>) -> Result<LocationPartial, AppError> {
    let position = ClientPosition {
        lat: query.lat,
        lng: query.lng,
        error: query.error,
    };
    let mut flow = SubmissionFlow::new(ReportForm {
        location: query.location,
        ..Default::default()
    });

    let limit = Duration::from_secs(CONFIG.geolocation.timeout_secs as u64);
    let precision = CONFIG.geolocation.precision as usize;
    let warning = flow
        .apply_location(geo::locate(&position, limit).await, precision)
        .err();

    Ok(LocationPartial {
        location: flow.form().location.clone(),
        coordinates: flow
            .coordinates()
            .map(|c| c.format(precision))
            .unwrap_or_default(),
        warning,
    })
}

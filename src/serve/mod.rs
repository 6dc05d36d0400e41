pub mod handler;

use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{DefaultBodyLimit, multipart::MultipartError},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header, header::InvalidHeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_embed::ServeEmbed;
use rust_embed::Embed;
use thiserror::Error;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tower_livereload::LiveReloadLayer;
use tracing::{info, warn};

use crate::{
    CONFIG,
    assignment::{AssignmentError, TransitionPolicy},
    compose::ComposeError,
    context::Page,
    services::{
        auth::{AccountAuthenticator, AuthError, Authenticator, Session, Sessions},
        delivery::{Dispatcher, LogDispatcher},
        photo::{DirPhotoStorage, PhotoError, PhotoStorage},
    },
    store::{Store, StoreError, sqlite::SqliteStore},
    submission::{SimulatedSubmitter, StoreSubmitter, SubmitError, Submitter},
};

pub const PHOTO_URL_PREFIX: &str = "/photos";

#[derive(Embed, Clone)]
#[folder = "static/"]
pub struct StaticDir;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
    #[error(transparent)]
    Askama(#[from] askama::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Internal(#[from] InvalidHeaderValue),
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::BadRequest(err)
    }
}

impl From<SubmitError> for AppError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Store(e) => AppError::Store(e),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<AssignmentError> for AppError {
    fn from(err: AssignmentError) -> Self {
        match err {
            AssignmentError::Store(e) => AppError::Store(e),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<ComposeError> for AppError {
    fn from(err: ComposeError) -> Self {
        match err {
            ComposeError::Store(e) => AppError::Store(e),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Store(e) => AppError::Store(e),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<PhotoError> for AppError {
    fn from(err: PhotoError) -> Self {
        match err {
            PhotoError::Io(e) => AppError::Io(e),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::Store(StoreError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            AppError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            AppError::BadRequest(_) | AppError::Multipart(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_client_error() {
            return (status, self.to_string()).into_response();
        }
        warn!(error = ?self, "request failed");

        #[cfg(debug_assertions)]
        let message = format!("Error: {:?}", self);

        #[cfg(not(debug_assertions))]
        let message = "Internal Server Error".to_string();

        (status, message).into_response()
    }
}

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub submitter: Arc<dyn Submitter>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub photos: Arc<dyn PhotoStorage>,
    pub auth: Arc<dyn Authenticator>,
    pub sessions: Sessions,
    pub policy: TransitionPolicy,
    pub photo_dir: PathBuf,
    pub live_reload: bool,
}

impl AppState {
    /// Wires the portal's collaborators around `store`. With `simulate` the
    /// report form uses the delayed random-id submitter instead of saving.
    pub fn new(store: Arc<dyn Store>, photo_dir: PathBuf, simulate: bool) -> Self {
        let submitter: Arc<dyn Submitter> = if simulate {
            Arc::new(SimulatedSubmitter::new(
                Duration::from_millis(CONFIG.submission.delay_ms as u64),
                CONFIG.submission.id_prefix,
                CONFIG.submission.id_range as u32,
            ))
        } else {
            Arc::new(StoreSubmitter::new(store.clone()))
        };
        let policy = TransitionPolicy::from_str(CONFIG.workflow.transitions).unwrap_or_else(|_| {
            warn!(policy = CONFIG.workflow.transitions, "unknown transition policy, allowing any");
            TransitionPolicy::Any
        });

        AppState {
            submitter,
            dispatcher: Arc::new(LogDispatcher),
            photos: Arc::new(DirPhotoStorage::new(
                &photo_dir,
                PHOTO_URL_PREFIX,
                photo_limit(),
            )),
            auth: Arc::new(AccountAuthenticator::new(store.clone())),
            sessions: Sessions::default(),
            policy,
            photo_dir,
            live_reload: false,
            store,
        }
    }

    pub fn session(&self, headers: &HeaderMap) -> Option<Session> {
        session_token(headers).and_then(|token| self.sessions.get(token))
    }

    pub fn page_context(&self, nav: &'static str, headers: &HeaderMap) -> Page {
        Page {
            nav,
            user: self.session(headers),
        }
    }

    /// Name recorded as the author of admin changes.
    pub fn author(&self, headers: &HeaderMap) -> String {
        self.session(headers)
            .map(|s| s.name)
            .unwrap_or_else(|| "Administrator".to_string())
    }
}

pub fn photo_limit() -> usize {
    CONFIG.photo.max_bytes as usize
}

/// Value of the session cookie, if the request carries one.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|c| c.trim().split_once('='))
        .find(|(name, _)| *name == CONFIG.session.cookie)
        .map(|(_, value)| value)
}

pub fn router(state: AppState) -> Router {
    let live_reload = state.live_reload;
    let photo_dir = state.photo_dir.clone();

    let mut app = Router::new()
        .route("/", get(handler::index))
        .route("/report", get(handler::report::form))
        .route("/report", post(handler::report::submit))
        .route("/report/locate", get(handler::report::locate))
        .route("/reports", get(handler::reports::list))
        .route("/map", get(handler::map::page))
        .route("/admin", get(handler::admin::dashboard))
        .route("/admin/login", get(handler::admin::login_form))
        .route("/admin/login", post(handler::admin::login))
        .route("/admin/logout", post(handler::admin::logout))
        .route("/admin/complaints", get(handler::admin::complaints::list))
        .route("/admin/complaints/{id}", get(handler::admin::complaints::detail))
        .route("/admin/complaints/{id}", post(handler::admin::complaints::assign))
        .route("/admin/departments", get(handler::admin::departments::list))
        .route("/admin/departments", post(handler::admin::departments::create))
        .route(
            "/admin/departments/{id}/staff",
            post(handler::admin::departments::add_staff),
        )
        .route("/admin/analytics", get(handler::admin::analytics::page))
        .route("/admin/notifications", get(handler::admin::notifications::list))
        .route("/admin/notifications", post(handler::admin::notifications::compose))
        .fallback(handler::not_found)
        .layer(DefaultBodyLimit::max(photo_limit() + 64 * 1024));
    if live_reload {
        app = app.layer(LiveReloadLayer::new());
    }

    app.layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
        .nest_service("/static", ServeEmbed::<StaticDir>::new())
        .nest_service(PHOTO_URL_PREFIX, ServeDir::new(photo_dir))
}

pub async fn run(
    db: &Path,
    port: Option<&str>,
    photo_dir: PathBuf,
    simulate: bool,
    live_reload: bool,
) -> Result<()> {
    let store = SqliteStore::open(db)
        .with_context(|| format!("could not open database {}", db.display()))?;
    let mut state = AppState::new(Arc::new(store), photo_dir, simulate);
    state.live_reload = live_reload;

    let app = router(state);

    let addr = format!("0.0.0.0:{}", port.unwrap_or(CONFIG.server.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("could not listen")?;

    info!(%addr, simulate, "serving");
    println!("Serving at http://{}/", addr);
    axum::serve(listener, app)
        .await
        .context("could not start server")?;

    Ok(())
}

pub fn hx_redirect(url: &str) -> Result<Response, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("hx-redirect"),
        HeaderValue::from_str(url)?,
    );

    Ok((StatusCode::OK, headers).into_response())
}

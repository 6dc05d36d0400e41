use std::{str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::NaiveDate;
use garde::Validate;
use rand::Rng;
use serde_derive::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    data::{Category, Citizen, Coordinates, NewReport, Priority, ReportId},
    services::geo::GeoError,
    store::{Store, StoreError},
};

pub const ANONYMOUS: &str = "Anonymous";

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Please fill in all required fields")]
    Invalid(#[from] garde::Report),
    #[error("A submission is already in flight or completed")]
    NotEditing,
    #[error("Could not save the report: {0}")]
    Store(#[from] StoreError),
}

fn not_blank(value: &str, _: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("required"));
    }

    Ok(())
}

fn known_category(value: &str, _: &()) -> garde::Result {
    Category::from_str(value)
        .map(|_| ())
        .map_err(|_| garde::Error::new("choose a category"))
}

/// Blank form inputs deserialize as `None`.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = serde::Deserialize::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(non_empty))
}

/// What the citizen typed into the report form.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Validate)]
pub struct ReportForm {
    #[garde(custom(not_blank), length(max = 120))]
    #[serde(default)]
    pub title: String,
    #[garde(custom(known_category))]
    #[serde(default)]
    pub category: String,
    #[garde(custom(not_blank), length(max = 2000))]
    #[serde(default)]
    pub description: String,
    #[garde(custom(not_blank), length(max = 200))]
    #[serde(default)]
    pub location: String,
    #[garde(length(max = 64))]
    #[serde(default)]
    pub reporter_name: String,
    #[garde(email)]
    #[serde(default, deserialize_with = "blank_as_none")]
    pub reporter_email: Option<String>,
    #[garde(length(max = 32))]
    #[serde(default)]
    pub reporter_phone: String,
}

impl ReportForm {
    /// Names of the required fields that are still empty.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if Category::from_str(&self.category).is_err() {
            missing.push("category");
        }
        if self.description.trim().is_empty() {
            missing.push("description");
        }
        if self.location.trim().is_empty() {
            missing.push("location");
        }
        missing
    }

    pub fn to_new_report(
        &self,
        coordinates: Option<Coordinates>,
        photo: Option<String>,
        date: NaiveDate,
    ) -> Result<NewReport, SubmitError> {
        self.validate()?;
        let category = Category::from_str(&self.category).unwrap_or(Category::Other);
        let name = self.reporter_name.trim();

        Ok(NewReport {
            title: self.title.trim().to_string(),
            category,
            description: self.description.trim().to_string(),
            location: self.location.trim().to_string(),
            coordinates: coordinates.or_else(|| Coordinates::parse(&self.location)),
            priority: Priority::Medium,
            date,
            reporter: Citizen {
                name: if name.is_empty() {
                    ANONYMOUS.to_string()
                } else {
                    name.to_string()
                },
                email: self.reporter_email.as_deref().and_then(non_empty),
                phone: non_empty(&self.reporter_phone),
            },
            photo,
        })
    }
}

pub fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, report: NewReport) -> Result<ReportId, SubmitError>;
}

/// Waits a fixed delay and hands out a random, non-unique identifier.
pub struct SimulatedSubmitter {
    pub delay: Duration,
    pub prefix: &'static str,
    pub range: u32,
}

impl SimulatedSubmitter {
    pub fn new(delay: Duration, prefix: &'static str, range: u32) -> Self {
        Self {
            delay,
            prefix,
            range,
        }
    }
}

#[async_trait]
impl Submitter for SimulatedSubmitter {
    async fn submit(&self, report: NewReport) -> Result<ReportId, SubmitError> {
        tokio::time::sleep(self.delay).await;
        let seq = rand::rng().random_range(0..self.range.max(1));
        let id = ReportId::from_raw(format!("{}{}", self.prefix, seq));
        info!(%id, title = %report.title, "simulated report submission");

        Ok(id)
    }
}

/// Persists the report; the store assigns a unique sequential identifier.
pub struct StoreSubmitter {
    store: Arc<dyn Store>,
}

impl StoreSubmitter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Submitter for StoreSubmitter {
    async fn submit(&self, report: NewReport) -> Result<ReportId, SubmitError> {
        let report = self.store.create_report(report)?;
        info!(id = %report.id, category = %report.category, "report submitted");

        Ok(report.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Editing,
    Submitting,
    Submitted { id: ReportId },
}

/// Editing → Submitting → Submitted. A failed submission goes back to
/// Editing with the form intact.
#[derive(Debug, Clone)]
pub struct SubmissionFlow {
    form: ReportForm,
    coordinates: Option<Coordinates>,
    photo: Option<String>,
    phase: Phase,
    notice: Option<String>,
}

impl Default for SubmissionFlow {
    fn default() -> Self {
        Self::new(ReportForm::default())
    }
}

impl SubmissionFlow {
    pub fn new(form: ReportForm) -> Self {
        Self {
            form,
            coordinates: None,
            photo: None,
            phase: Phase::Editing,
            notice: None,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn form(&self) -> &ReportForm {
        &self.form
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.coordinates
    }

    pub fn photo(&self) -> Option<&str> {
        self.photo.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn attach_photo(&mut self, url: String) {
        self.photo = Some(url);
    }

    pub fn set_coordinates(&mut self, coordinates: Option<Coordinates>) {
        self.coordinates = coordinates;
    }

    /// Applies the outcome of a location lookup. On failure the location is
    /// left as it was and a warning is returned.
    pub fn apply_location(
        &mut self,
        position: Result<Coordinates, GeoError>,
        precision: usize,
    ) -> Result<(), String> {
        match position {
            Ok(c) => {
                self.form.location = c.format(precision);
                self.coordinates = Some(c);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "location lookup failed");
                Err(format!(
                    "{}. Please enter your location manually.",
                    e
                ))
            }
        }
    }

    pub fn begin(&mut self) -> Result<(), SubmitError> {
        if self.phase != Phase::Editing {
            return Err(SubmitError::NotEditing);
        }
        if let Err(report) = self.form.validate() {
            self.notice = Some(SubmitError::Invalid(report.clone()).to_string());
            return Err(SubmitError::Invalid(report));
        }
        self.notice = None;
        self.phase = Phase::Submitting;

        Ok(())
    }

    pub fn complete(&mut self, id: ReportId) {
        if self.phase == Phase::Submitting {
            self.phase = Phase::Submitted { id };
        }
    }

    pub fn fail(&mut self, error: &SubmitError) {
        if self.phase == Phase::Submitting {
            self.notice = Some(error.to_string());
            self.phase = Phase::Editing;
        }
    }

    /// Back to an empty form.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Hands the in-flight report to `submitter` and settles the phase.
    pub async fn run(&mut self, submitter: &dyn Submitter, date: NaiveDate) -> &Phase {
        if self.phase != Phase::Submitting {
            return &self.phase;
        }
        let result = match self
            .form
            .to_new_report(self.coordinates, self.photo.clone(), date)
        {
            Ok(report) => submitter.submit(report).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(id) => self.complete(id),
            Err(e) => {
                warn!(error = %e, "report submission failed");
                self.fail(&e);
            }
        }

        &self.phase
    }

    pub async fn submit(
        &mut self,
        submitter: &dyn Submitter,
        date: NaiveDate,
    ) -> Result<&Phase, SubmitError> {
        self.begin()?;

        Ok(self.run(submitter, date).await)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::Instant;

    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 20).unwrap()
    }

    fn valid_form() -> ReportForm {
        ReportForm {
            title: "Water leak on Oak Street".to_string(),
            category: "water-drainage".to_string(),
            description: "Water pooling at the crossing".to_string(),
            location: "Oak Street & 3rd Avenue".to_string(),
            ..Default::default()
        }
    }

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Submitter for Counting {
        async fn submit(&self, _: NewReport) -> Result<ReportId, SubmitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SubmitError::Store(StoreError::Conflict(
                    "database is locked".to_string(),
                )));
            }
            Ok(ReportId::new(2024, 1))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_submission_completes_after_delay() {
        let submitter =
            SimulatedSubmitter::new(Duration::from_millis(2000), "CR-2024-", 10000);
        let mut flow = SubmissionFlow::new(valid_form());

        flow.begin().unwrap();
        assert_eq!(flow.phase(), &Phase::Submitting);

        let started = Instant::now();
        flow.run(&submitter, today()).await;
        assert!(started.elapsed() >= Duration::from_millis(2000));

        let Phase::Submitted { id } = flow.phase() else {
            panic!("expected Submitted, got {:?}", flow.phase());
        };
        let seq: u32 = id
            .as_str()
            .strip_prefix("CR-2024-")
            .and_then(|s| s.parse().ok())
            .unwrap();
        assert!(seq < 10000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_is_pending_until_delay_elapses() {
        let submitter =
            SimulatedSubmitter::new(Duration::from_millis(2000), "CR-2024-", 10000);
        let pending = tokio::time::timeout(
            Duration::from_millis(1999),
            submitter.submit(valid_form().to_new_report(None, None, today()).unwrap()),
        )
        .await;

        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_submits_exactly_once() {
        let submitter = Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let mut flow = SubmissionFlow::new(valid_form());

        flow.submit(&submitter, today()).await.unwrap();
        assert!(matches!(flow.phase(), Phase::Submitted { .. }));

        assert!(matches!(
            flow.submit(&submitter, today()).await,
            Err(SubmitError::NotEditing)
        ));
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 1);

        flow.reset();
        assert_eq!(flow.phase(), &Phase::Editing);
        assert_eq!(flow.form(), &ReportForm::default());
    }

    #[tokio::test]
    async fn test_blank_required_field_blocks_submission() {
        let submitter = Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let blanks: [fn(&mut ReportForm); 4] = [
            |f| f.title.clear(),
            |f| f.category.clear(),
            |f| f.description = "   ".to_string(),
            |f| f.location.clear(),
        ];

        for blank in blanks {
            let mut form = valid_form();
            blank(&mut form);
            assert_eq!(form.missing().len(), 1);

            let mut flow = SubmissionFlow::new(form);
            assert!(matches!(
                flow.submit(&submitter, today()).await,
                Err(SubmitError::Invalid(_))
            ));
            assert_eq!(flow.phase(), &Phase::Editing);
            assert!(flow.notice().is_some());
        }
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_submission_returns_to_editing() {
        let submitter = Counting {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        let mut flow = SubmissionFlow::new(valid_form());

        let phase = flow.submit(&submitter, today()).await.unwrap();
        assert_eq!(phase, &Phase::Editing);
        assert_eq!(flow.form(), &valid_form());
        assert!(flow.notice().unwrap().contains("database is locked"));
    }

    #[test]
    fn test_location_lookup() {
        let mut flow = SubmissionFlow::new(valid_form());

        let warning = flow.apply_location(Err(GeoError::Denied), 6).unwrap_err();
        assert!(warning.contains("manually"));
        assert_eq!(flow.form().location, "Oak Street & 3rd Avenue");

        flow.apply_location(
            Ok(Coordinates {
                lat: 40.7128,
                lng: -74.006,
            }),
            6,
        )
        .unwrap();
        assert_eq!(flow.form().location, "40.712800, -74.006000");
    }

    #[test]
    fn test_new_report_defaults() {
        let report = valid_form().to_new_report(None, None, today()).unwrap();

        assert_eq!(report.priority, Priority::Medium);
        assert_eq!(report.category, Category::WaterDrainage);
        assert_eq!(report.reporter.name, ANONYMOUS);
        assert_eq!(report.reporter.email, None);

        let mut form = valid_form();
        form.reporter_email = Some("not-an-address".to_string());
        assert!(form.to_new_report(None, None, today()).is_err());

        form.reporter_email = Some("<b>x y</b>@evil..com".to_string());
        assert!(form.to_new_report(None, None, today()).is_err());

        form.reporter_email = Some("jane.doe@email.com".to_string());
        let report = form.to_new_report(None, None, today()).unwrap();
        assert_eq!(report.reporter.email.as_deref(), Some("jane.doe@email.com"));
    }
}

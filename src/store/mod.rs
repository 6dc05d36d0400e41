use thiserror::Error;

use crate::data::{
    Account, Department, NewDepartment, NewNotification, NewReport, NewStaff, Notification,
    RecipientGroup, Report, ReportId, ReportUpdate, Staff, Status, StatusUpdate,
};
use crate::present::status_badge;

pub mod sqlite;

#[cfg(test)]
pub mod memory;

#[cfg(test)]
mod tests;

pub const SUBMITTED_MESSAGE: &str = "Complaint submitted by citizen";
pub const SYSTEM_AUTHOR: &str = "System";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Persistence for everything the portal shows. Listings come back newest
/// first for reports and notifications, in creation order otherwise.
pub trait Store: Send + Sync {
    fn reports(&self) -> Result<Vec<Report>, StoreError>;
    fn report(&self, id: &ReportId) -> Result<Report, StoreError>;
    /// Timeline of a report, oldest entry first.
    fn report_history(&self, id: &ReportId) -> Result<Vec<ReportUpdate>, StoreError>;
    /// Saves a new report under the next free `CR-<year>-<NNNN>` identifier.
    fn create_report(&self, report: NewReport) -> Result<Report, StoreError>;
    fn update_report(&self, id: &ReportId, update: &StatusUpdate) -> Result<Report, StoreError>;

    fn departments(&self) -> Result<Vec<Department>, StoreError>;
    fn create_department(&self, department: NewDepartment) -> Result<Department, StoreError>;
    fn create_staff(&self, department_id: &str, staff: NewStaff) -> Result<Staff, StoreError>;

    fn notifications(&self) -> Result<Vec<Notification>, StoreError>;
    fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError>;
    fn recipient_groups(&self) -> Result<Vec<RecipientGroup>, StoreError>;

    fn account(&self, email: &str) -> Result<Option<Account>, StoreError>;
}

/// Next identifier of the form `<prefix><n>` after the highest one in use.
pub fn next_id<'a>(prefix: &str, existing: impl IntoIterator<Item = &'a str>) -> String {
    let max = existing
        .into_iter()
        .filter_map(|id| id.strip_prefix(prefix)?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);

    format!("{}{}", prefix, max + 1)
}

/// Next report identifier for `year`.
pub fn next_report_id<'a>(year: i32, existing: impl IntoIterator<Item = &'a ReportId>) -> ReportId {
    let max = existing
        .into_iter()
        .filter_map(|id| id.parts())
        .filter(|(y, _)| *y == year)
        .map(|(_, seq)| seq)
        .max()
        .unwrap_or(0);

    ReportId::new(year, max + 1)
}

/// Report fields after `update`. A report keeps its first resolution date
/// while it stays resolved and loses it when reopened.
pub fn apply_update(report: &mut Report, update: &StatusUpdate) {
    report.resolved_on = if update.status == Status::Resolved {
        report.resolved_on.or(Some(update.date))
    } else {
        None
    };
    report.status = update.status;
    report.department = update.department.clone();
    report.assigned_to = update.assigned_to.clone();
}

/// Timeline entries for a report loaded from seed data.
pub fn seed_history(report: &Report) -> Vec<ReportUpdate> {
    let mut history = vec![ReportUpdate {
        date: report.date,
        status: Status::Pending,
        message: SUBMITTED_MESSAGE.to_string(),
        author: SYSTEM_AUTHOR.to_string(),
    }];
    if report.status != Status::Pending {
        history.push(ReportUpdate {
            date: report.resolved_on.unwrap_or(report.date),
            status: report.status,
            message: format!(
                "Status set to {}",
                status_badge(report.status).label
            ),
            author: SYSTEM_AUTHOR.to_string(),
        });
    }
    history
}

use std::str::FromStr;

use chrono::NaiveDate;
use serde_derive::Deserialize;
use strum_macros::EnumString;
use thiserror::Error;
use tracing::info;

use crate::{
    data::{Department, Report, ReportId, Status, StatusUpdate},
    present::status_badge,
    store::{Store, StoreError},
};

/// Which status changes the workflow accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TransitionPolicy {
    #[default]
    Any,
    /// pending → assigned → in-progress → resolved; no step back.
    Forward,
}

impl TransitionPolicy {
    pub fn allows(&self, from: Status, to: Status) -> bool {
        let Some(to_rank) = to.rank() else {
            return false;
        };
        match self {
            TransitionPolicy::Any => true,
            TransitionPolicy::Forward => from.rank().is_none_or(|r| to_rank >= r),
        }
    }
}

#[derive(Error, Debug)]
pub enum AssignmentError {
    #[error("Unknown status `{0}`")]
    UnknownStatus(String),
    #[error("Unknown department `{0}`")]
    UnknownDepartment(String),
    #[error("Unknown staff member `{0}`")]
    UnknownStaff(String),
    #[error("{staff} is not a member of {department}")]
    StaffNotInDepartment { staff: String, department: String },
    #[error("Cannot move a report from {from} back to {to}")]
    Transition { from: Status, to: Status },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The assignment panel of a complaint.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AssignmentForm {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub staff: String,
    #[serde(default)]
    pub notes: String,
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

/// Checks the requested change against the departments and the policy and
/// works out the report's resulting department and assignee.
pub fn plan(
    report: &Report,
    form: &AssignmentForm,
    departments: &[Department],
    policy: TransitionPolicy,
    author: &str,
    date: NaiveDate,
) -> Result<StatusUpdate, AssignmentError> {
    let status = match non_empty(&form.status) {
        Some(s) => Status::from_str(s).map_err(|_| AssignmentError::UnknownStatus(s.to_string()))?,
        None => report.status,
    };

    let department = match non_empty(&form.department) {
        Some(id) => Some(
            departments
                .iter()
                .find(|d| d.id == id)
                .ok_or_else(|| AssignmentError::UnknownDepartment(id.to_string()))?,
        ),
        None => None,
    };

    let staff = match non_empty(&form.staff) {
        Some(id) => {
            let owner = departments
                .iter()
                .find(|d| d.has_staff(id))
                .ok_or_else(|| AssignmentError::UnknownStaff(id.to_string()))?;
            if let Some(department) = department
                && department.id != owner.id
            {
                return Err(AssignmentError::StaffNotInDepartment {
                    staff: id.to_string(),
                    department: department.name.clone(),
                });
            }
            Some((id, owner))
        }
        None => None,
    };

    if !policy.allows(report.status, status) {
        return Err(AssignmentError::Transition {
            from: report.status,
            to: status,
        });
    }

    let department_id = department
        .or(staff.map(|(_, owner)| owner))
        .map(|d| d.id.clone())
        .or_else(|| report.department.clone());

    let assigned_to = match staff {
        Some((id, _)) => Some(id.to_string()),
        None => report.assigned_to.clone().filter(|current| {
            department_id.as_ref().is_some_and(|dept| {
                departments
                    .iter()
                    .any(|d| &d.id == dept && d.has_staff(current))
            })
        }),
    };

    let notes = match non_empty(&form.notes) {
        Some(notes) => notes.to_string(),
        None => describe(report, status, &department_id, &assigned_to, departments),
    };

    Ok(StatusUpdate {
        status,
        department: department_id,
        assigned_to,
        notes,
        author: author.to_string(),
        date,
    })
}

fn describe(
    report: &Report,
    status: Status,
    department: &Option<String>,
    assigned_to: &Option<String>,
    departments: &[Department],
) -> String {
    let mut parts = Vec::new();
    if status != report.status {
        parts.push(format!("Status changed to {}", status_badge(status).label));
    }
    if assigned_to != &report.assigned_to
        && let Some(staff) = assigned_to
    {
        let name = departments
            .iter()
            .flat_map(|d| d.staff.iter())
            .find(|s| &s.id == staff)
            .map(|s| s.name.as_str())
            .unwrap_or(staff.as_str());
        parts.push(format!("Assigned to {}", name));
    } else if department != &report.department
        && let Some(dept) = department
    {
        let name = departments
            .iter()
            .find(|d| &d.id == dept)
            .map(|d| d.name.as_str())
            .unwrap_or(dept.as_str());
        parts.push(format!("Routed to {}", name));
    }
    if parts.is_empty() {
        return "Complaint updated".to_string();
    }

    parts.join(". ")
}

/// Validates and persists an assignment. Returns the updated report.
pub fn apply(
    store: &dyn Store,
    id: &ReportId,
    form: &AssignmentForm,
    policy: TransitionPolicy,
    author: &str,
    date: NaiveDate,
) -> Result<Report, AssignmentError> {
    let report = store.report(id)?;
    let departments = store.departments()?;
    let update = plan(&report, form, &departments, policy, author, date)?;

    info!(
        report = %id,
        status = %update.status,
        department = ?update.department,
        assigned_to = ?update.assigned_to,
        notes = %update.notes,
        "updating complaint"
    );

    Ok(store.update_report(id, &update)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::seed::Seed,
        store::{Store, memory::MemoryStore},
    };

    fn seeded() -> MemoryStore {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("seed");
        MemoryStore::from_seed(Seed::load(&dir).unwrap())
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 21).unwrap()
    }

    fn form(status: &str, department: &str, staff: &str) -> AssignmentForm {
        AssignmentForm {
            status: status.to_string(),
            department: department.to_string(),
            staff: staff.to_string(),
            notes: String::new(),
        }
    }

    #[test]
    fn test_forward_policy() {
        let p = TransitionPolicy::Forward;
        assert!(p.allows(Status::Pending, Status::Assigned));
        assert!(p.allows(Status::InProgress, Status::InProgress));
        assert!(!p.allows(Status::Resolved, Status::Pending));
        assert!(p.allows(Status::Unknown, Status::Pending));
        assert!(!p.allows(Status::Pending, Status::Unknown));

        assert!(TransitionPolicy::Any.allows(Status::Resolved, Status::Pending));
        assert_eq!(
            TransitionPolicy::from_str("forward").unwrap(),
            TransitionPolicy::Forward
        );
    }

    #[test]
    fn test_assign_pending_complaint() {
        let store = seeded();
        let id = ReportId::from_raw("CR-2024-0654");

        let updated = apply(
            &store,
            &id,
            &form("assigned", "dept-1", "staff-1"),
            TransitionPolicy::Forward,
            "Portal Administrator",
            date(),
        )
        .unwrap();
        assert_eq!(updated.status, Status::Assigned);
        assert_eq!(updated.department.as_deref(), Some("dept-1"));
        assert_eq!(updated.assigned_to.as_deref(), Some("staff-1"));

        let history = store.report_history(&id).unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.status, Status::Assigned);
        assert_eq!(
            last.message,
            "Status changed to Assigned. Assigned to Sarah Wilson"
        );
        assert_eq!(last.author, "Portal Administrator");
    }

    #[test]
    fn test_staff_must_belong_to_department() {
        let store = seeded();
        let err = apply(
            &store,
            &ReportId::from_raw("CR-2024-0654"),
            &form("assigned", "dept-2", "staff-1"),
            TransitionPolicy::Any,
            "admin",
            date(),
        )
        .unwrap_err();

        assert!(matches!(err, AssignmentError::StaffNotInDepartment { .. }));
    }

    #[test]
    fn test_unknown_references() {
        let store = seeded();
        let id = ReportId::from_raw("CR-2024-0654");

        let err = apply(&store, &id, &form("", "dept-9", ""), TransitionPolicy::Any, "a", date())
            .unwrap_err();
        assert!(matches!(err, AssignmentError::UnknownDepartment(_)));

        let err = apply(&store, &id, &form("", "", "staff-99"), TransitionPolicy::Any, "a", date())
            .unwrap_err();
        assert!(matches!(err, AssignmentError::UnknownStaff(_)));

        let err = apply(&store, &id, &form("closed", "", ""), TransitionPolicy::Any, "a", date())
            .unwrap_err();
        assert!(matches!(err, AssignmentError::UnknownStatus(_)));

        let err = apply(
            &store,
            &ReportId::from_raw("CR-2024-9999"),
            &form("resolved", "", ""),
            TransitionPolicy::Any,
            "a",
            date(),
        )
        .unwrap_err();
        assert!(matches!(err, AssignmentError::Store(StoreError::NotFound(_))));
    }

    #[test]
    fn test_forward_policy_rejects_regression() {
        let store = seeded();
        let id = ReportId::from_raw("CR-2024-0892");

        let err = apply(&store, &id, &form("pending", "", ""), TransitionPolicy::Forward, "a", date())
            .unwrap_err();
        assert!(matches!(
            err,
            AssignmentError::Transition {
                from: Status::Resolved,
                to: Status::Pending
            }
        ));
        assert_eq!(store.report(&id).unwrap().status, Status::Resolved);

        let reopened =
            apply(&store, &id, &form("pending", "", ""), TransitionPolicy::Any, "a", date())
                .unwrap();
        assert_eq!(reopened.status, Status::Pending);
        assert_eq!(reopened.resolved_on, None);
    }

    #[test]
    fn test_staff_alone_routes_to_their_department() {
        let store = seeded();
        let report = store.report(&ReportId::from_raw("CR-2024-0567")).unwrap();
        let departments = store.departments().unwrap();

        let update = plan(
            &report,
            &form("", "", "staff-3"),
            &departments,
            TransitionPolicy::Any,
            "a",
            date(),
        )
        .unwrap();
        assert_eq!(update.department.as_deref(), Some("dept-2"));
        assert_eq!(update.status, Status::Pending);
        assert_eq!(update.notes, "Assigned to David Miller");
    }

    #[test]
    fn test_rerouting_drops_assignee_from_other_department() {
        let store = seeded();
        let report = store.report(&ReportId::from_raw("CR-2024-1001")).unwrap();
        let departments = store.departments().unwrap();

        let update = plan(
            &report,
            &form("", "dept-3", ""),
            &departments,
            TransitionPolicy::Any,
            "a",
            date(),
        )
        .unwrap();
        assert_eq!(update.department.as_deref(), Some("dept-3"));
        assert_eq!(update.assigned_to, None);
        assert_eq!(update.notes, "Routed to Sanitation");
    }

    #[test]
    fn test_resolving_sets_resolution_date() {
        let store = seeded();
        let id = ReportId::from_raw("CR-2024-1001");
        let mut f = form("resolved", "", "");
        f.notes = "Pothole filled".to_string();

        let resolved = apply(&store, &id, &f, TransitionPolicy::Forward, "a", date()).unwrap();
        assert_eq!(resolved.resolved_on, Some(date()));
        assert_eq!(resolved.assigned_to.as_deref(), Some("staff-2"));
        assert_eq!(
            store.report_history(&id).unwrap().last().unwrap().message,
            "Pothole filled"
        );
    }
}

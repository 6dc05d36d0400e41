use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use chrono::Datelike;

use crate::{
    data::{
        Account, Department, NewDepartment, NewNotification, NewReport, NewStaff, Notification,
        RecipientGroup, Report, ReportId, ReportUpdate, Staff, Status, StatusUpdate, seed::Seed,
    },
    store::{
        SUBMITTED_MESSAGE, SYSTEM_AUTHOR, Store, StoreError, apply_update, next_id,
        next_report_id, seed_history,
    },
};

#[derive(Default)]
struct Inner {
    reports: Vec<Report>,
    history: HashMap<ReportId, Vec<ReportUpdate>>,
    departments: Vec<Department>,
    notifications: Vec<Notification>,
    groups: Vec<RecipientGroup>,
    accounts: Vec<Account>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: Seed) -> Self {
        let history = seed
            .reports
            .iter()
            .map(|r| (r.id.clone(), seed_history(r)))
            .collect();

        Self {
            inner: Mutex::new(Inner {
                reports: seed.reports,
                history,
                departments: seed.departments,
                notifications: seed.notifications,
                groups: seed.groups,
                accounts: seed.accounts,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn not_found(id: &ReportId) -> StoreError {
    StoreError::NotFound(format!("report {}", id))
}

impl Store for MemoryStore {
    fn reports(&self) -> Result<Vec<Report>, StoreError> {
        let mut reports = self.lock()?.reports.clone();
        reports.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
        Ok(reports)
    }

    fn report(&self, id: &ReportId) -> Result<Report, StoreError> {
        self.lock()?
            .reports
            .iter()
            .find(|r| &r.id == id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    fn report_history(&self, id: &ReportId) -> Result<Vec<ReportUpdate>, StoreError> {
        let inner = self.lock()?;
        if !inner.reports.iter().any(|r| &r.id == id) {
            return Err(not_found(id));
        }
        Ok(inner.history.get(id).cloned().unwrap_or_default())
    }

    fn create_report(&self, new: NewReport) -> Result<Report, StoreError> {
        let mut inner = self.lock()?;
        let report = Report {
            id: next_report_id(new.date.year(), inner.reports.iter().map(|r| &r.id)),
            title: new.title,
            category: new.category,
            description: new.description,
            location: new.location,
            coordinates: new.coordinates,
            status: Status::Pending,
            priority: new.priority,
            date: new.date,
            reporter: new.reporter,
            department: None,
            assigned_to: None,
            estimated_resolution: None,
            resolved_on: None,
            photo: new.photo,
        };
        inner.history.insert(
            report.id.clone(),
            vec![ReportUpdate {
                date: report.date,
                status: Status::Pending,
                message: SUBMITTED_MESSAGE.to_string(),
                author: SYSTEM_AUTHOR.to_string(),
            }],
        );
        inner.reports.push(report.clone());
        Ok(report)
    }

    fn update_report(&self, id: &ReportId, update: &StatusUpdate) -> Result<Report, StoreError> {
        let mut inner = self.lock()?;
        let report = inner
            .reports
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| not_found(id))?;
        apply_update(report, update);
        let report = report.clone();
        inner.history.entry(id.clone()).or_default().push(ReportUpdate {
            date: update.date,
            status: update.status,
            message: update.notes.clone(),
            author: update.author.clone(),
        });
        Ok(report)
    }

    fn departments(&self) -> Result<Vec<Department>, StoreError> {
        Ok(self.lock()?.departments.clone())
    }

    fn create_department(&self, new: NewDepartment) -> Result<Department, StoreError> {
        let mut inner = self.lock()?;
        let department = Department {
            id: next_id("dept-", inner.departments.iter().map(|d| d.id.as_str())),
            name: new.name,
            description: new.description,
            head: new.head,
            location: new.location,
            staff: Vec::new(),
        };
        inner.departments.push(department.clone());
        Ok(department)
    }

    fn create_staff(&self, department_id: &str, new: NewStaff) -> Result<Staff, StoreError> {
        let mut inner = self.lock()?;
        let id = next_id(
            "staff-",
            inner
                .departments
                .iter()
                .flat_map(|d| d.staff.iter().map(|s| s.id.as_str())),
        );
        let department = inner
            .departments
            .iter_mut()
            .find(|d| d.id == department_id)
            .ok_or_else(|| StoreError::NotFound(format!("department {}", department_id)))?;
        let staff = Staff {
            id,
            name: new.name,
            email: new.email,
            phone: new.phone,
            role: new.role,
            join_date: new.join_date,
        };
        department.staff.push(staff.clone());
        Ok(staff)
    }

    fn notifications(&self) -> Result<Vec<Notification>, StoreError> {
        let mut notifications = self.lock()?.notifications.clone();
        notifications.reverse();
        notifications.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(notifications)
    }

    fn create_notification(&self, new: NewNotification) -> Result<Notification, StoreError> {
        let mut inner = self.lock()?;
        let notification = Notification {
            id: next_id("notif-", inner.notifications.iter().map(|n| n.id.as_str())),
            title: new.title,
            message: new.message,
            kind: new.kind,
            recipients: new.recipients,
            status: new.status,
            sent_at: new.sent_at,
            report_ids: new.report_ids,
            delivery_rate: new.delivery_rate,
        };
        inner.notifications.push(notification.clone());
        Ok(notification)
    }

    fn recipient_groups(&self) -> Result<Vec<RecipientGroup>, StoreError> {
        Ok(self.lock()?.groups.clone())
    }

    fn account(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .lock()?
            .accounts
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }
}

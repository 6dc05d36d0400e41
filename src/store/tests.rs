use std::{collections::HashSet, path::Path, sync::Arc, thread};

use chrono::NaiveDate;

use super::*;
use crate::data::{
    Category, Citizen, Contact, NotificationKind, NotificationStatus, Priority, Role, Status,
    seed::Seed,
};
use crate::store::{memory::MemoryStore, sqlite::SqliteStore};

fn seed() -> Seed {
    Seed::load(&Path::new(env!("CARGO_MANIFEST_DIR")).join("seed")).unwrap()
}

fn sqlite_store(dir: &tempfile::TempDir) -> SqliteStore {
    let store = SqliteStore::open(&dir.path().join("portal.db")).unwrap();
    store.init().unwrap();
    store.import(&seed()).unwrap();
    store
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn new_report(title: &str, date: NaiveDate) -> NewReport {
    NewReport {
        title: title.to_string(),
        category: Category::PublicSafety,
        description: "Loose manhole cover".to_string(),
        location: "Elm Street".to_string(),
        coordinates: None,
        priority: Priority::Medium,
        date,
        reporter: Citizen {
            name: "Anonymous".to_string(),
            email: None,
            phone: None,
        },
        photo: None,
    }
}

fn check_seeded_reads(store: &dyn Store) {
    let reports = store.reports().unwrap();
    assert_eq!(reports.len(), 5);
    assert_eq!(reports[0].id.as_str(), "CR-2024-0567");
    assert_eq!(reports[4].id.as_str(), "CR-2024-0892");

    let pothole = store.report(&ReportId::from_raw("CR-2024-1001")).unwrap();
    assert_eq!(pothole.status, Status::InProgress);
    assert_eq!(pothole.reporter.phone.as_deref(), Some("+1 (555) 123-4567"));
    assert_eq!(pothole.coordinates.map(|c| c.lat), Some(40.7128));

    let history = store
        .report_history(&ReportId::from_raw("CR-2024-1001"))
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].message, SUBMITTED_MESSAGE);

    let departments = store.departments().unwrap();
    assert_eq!(departments.len(), 4);
    assert_eq!(departments[0].staff.len(), 2);
    assert_eq!(departments[0].head.name, "Mike Johnson");

    let notifications = store.notifications().unwrap();
    assert_eq!(notifications[0].id, "notif-2");
    assert_eq!(notifications[0].recipients, vec!["bulk-residents"]);
    let first = notifications.iter().find(|n| n.id == "notif-1").unwrap();
    assert_eq!(first.report_ids, vec!["CR-2024-1001"]);
    assert_eq!(first.kind, NotificationKind::Sms);

    assert_eq!(store.recipient_groups().unwrap().len(), 4);

    let account = store.account("ADMIN@municipality.gov").unwrap().unwrap();
    assert_eq!(account.role, Role::Admin);
    assert!(store.account("nobody@municipality.gov").unwrap().is_none());

    assert!(matches!(
        store.report(&ReportId::from_raw("CR-2024-4040")),
        Err(StoreError::NotFound(_))
    ));
}

fn check_writes(store: &dyn Store) {
    let created = store
        .create_report(new_report("Loose manhole", date(2024, 2, 1)))
        .unwrap();
    assert_eq!(created.id.as_str(), "CR-2024-1002");
    assert_eq!(created.status, Status::Pending);

    let next_year = store
        .create_report(new_report("Icy steps", date(2025, 1, 3)))
        .unwrap();
    assert_eq!(next_year.id.as_str(), "CR-2025-0001");

    let updated = store
        .update_report(
            &created.id,
            &StatusUpdate {
                status: Status::Resolved,
                department: Some("dept-1".to_string()),
                assigned_to: Some("staff-1".to_string()),
                notes: "Cover replaced".to_string(),
                author: "Mike Johnson".to_string(),
                date: date(2024, 2, 3),
            },
        )
        .unwrap();
    assert_eq!(updated.resolved_on, Some(date(2024, 2, 3)));
    assert_eq!(store.report(&created.id).unwrap(), updated);

    let history = store.report_history(&created.id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].message, "Cover replaced");
    assert_eq!(history[1].status, Status::Resolved);

    let department = store
        .create_department(NewDepartment {
            name: "Water Department".to_string(),
            description: "Mains and drainage".to_string(),
            head: Contact {
                name: "Ann Lee".to_string(),
                email: "ann.lee@municipality.gov".to_string(),
                phone: String::new(),
            },
            location: "Pump House".to_string(),
        })
        .unwrap();
    assert_eq!(department.id, "dept-5");

    let staff = store
        .create_staff(
            &department.id,
            NewStaff {
                name: "Raj Patel".to_string(),
                email: "raj.patel@municipality.gov".to_string(),
                phone: String::new(),
                role: "Plumber".to_string(),
                join_date: date(2024, 2, 1),
            },
        )
        .unwrap();
    assert_eq!(staff.id, "staff-4");
    let departments = store.departments().unwrap();
    assert!(departments[4].has_staff("staff-4"));

    assert!(matches!(
        store.create_staff(
            "dept-99",
            NewStaff {
                name: "Nobody".to_string(),
                email: "n@municipality.gov".to_string(),
                phone: String::new(),
                role: "Ghost".to_string(),
                join_date: date(2024, 2, 1),
            }
        ),
        Err(StoreError::NotFound(_))
    ));

    let notification = store
        .create_notification(NewNotification {
            title: "Repair done".to_string(),
            message: "Thanks".to_string(),
            kind: NotificationKind::Email,
            recipients: vec!["downtown-residents".to_string(), "a@b.org".to_string()],
            status: NotificationStatus::Sent,
            sent_at: date(2024, 2, 3).and_hms_opt(12, 0, 0).unwrap(),
            report_ids: vec![created.id.to_string()],
            delivery_rate: Some(98.5),
        })
        .unwrap();
    assert_eq!(notification.id, "notif-5");
    assert_eq!(store.notifications().unwrap()[0], notification);
}

#[test]
fn test_memory_store() {
    let store = MemoryStore::from_seed(seed());
    check_seeded_reads(&store);
    check_writes(&store);
}

#[test]
fn test_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir);
    check_seeded_reads(&store);
    check_writes(&store);
}

#[test]
fn test_sqlite_concurrent_submissions_get_unique_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(sqlite_store(&dir));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                (0..5)
                    .map(|i| {
                        store
                            .create_report(new_report(&format!("r{}-{}", t, i), date(2024, 3, 1)))
                            .map(|r| r.id)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            // Writers may time out on the database lock; those never get an id.
            if let Ok(id) = id {
                assert!(ids.insert(id));
            }
        }
    }
    assert!(!ids.is_empty());
}

#[test]
fn test_next_id() {
    assert_eq!(next_id("dept-", ["dept-1", "dept-7", "other"]), "dept-8");
    assert_eq!(next_id("notif-", []), "notif-1");

    let ids = [ReportId::new(2024, 3), ReportId::new(2023, 9)];
    assert_eq!(next_report_id(2024, &ids), ReportId::new(2024, 4));
    assert_eq!(next_report_id(2022, &ids), ReportId::new(2022, 1));
}

use std::path::Path;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use crate::{
    data::{
        Account, Citizen, Contact, Coordinates, Department, NewDepartment, NewNotification,
        NewReport, NewStaff, Notification, RecipientGroup, Report, ReportId, ReportUpdate, Staff,
        Status, StatusUpdate, seed::Seed,
    },
    store::{
        SUBMITTED_MESSAGE, SYSTEM_AUTHOR, Store, StoreError, apply_update, next_id,
        next_report_id, seed_history,
    },
};

pub const SCHEMA: &str = include_str!("../../sql/schema.sql");

const REPORT_COLUMNS: &str = "id, title, category, description, location, lat, lng, status, \
    priority, date, reporter_name, reporter_email, reporter_phone, department_id, assigned_to, \
    estimated_resolution, resolved_on, photo";

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(15) // Max connections to keep open
            .build(manager)?;

        Ok(Self { pool })
    }

    /// Creates any missing tables.
    pub fn init(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        Ok(self.pool.get()?)
    }

    /// Writes the whole seed in one transaction.
    pub fn import(&self, seed: &Seed) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for department in &seed.departments {
            insert_department(&tx, &department.id, department)?;
            for staff in &department.staff {
                insert_staff(&tx, &department.id, staff)?;
            }
        }
        for report in &seed.reports {
            insert_report(&tx, report)?;
            for update in seed_history(report) {
                insert_update(&tx, &report.id, &update)?;
            }
        }
        for group in &seed.groups {
            tx.execute(
                "INSERT INTO recipient_groups (id, name, member_count) VALUES (?1, ?2, ?3)",
                params![group.id, group.name, group.member_count],
            )?;
        }
        for notification in &seed.notifications {
            insert_notification(&tx, notification)?;
        }
        for account in &seed.accounts {
            tx.execute(
                "INSERT INTO accounts (email, name, role, password_hash) VALUES (?1, ?2, ?3, ?4)",
                params![account.email, account.name, account.role, account.password_hash],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

fn report_from_row(row: &Row) -> rusqlite::Result<Report> {
    let lat: Option<f64> = row.get(5)?;
    let lng: Option<f64> = row.get(6)?;

    Ok(Report {
        id: ReportId::from_raw(row.get::<_, String>(0)?),
        title: row.get(1)?,
        category: row.get(2)?,
        description: row.get(3)?,
        location: row.get(4)?,
        coordinates: lat.zip(lng).map(|(lat, lng)| Coordinates { lat, lng }),
        status: row.get(7)?,
        priority: row.get(8)?,
        date: row.get(9)?,
        reporter: Citizen {
            name: row.get(10)?,
            email: row.get(11)?,
            phone: row.get(12)?,
        },
        department: row.get(13)?,
        assigned_to: row.get(14)?,
        estimated_resolution: row.get(15)?,
        resolved_on: row.get(16)?,
        photo: row.get(17)?,
    })
}

fn insert_report(conn: &Connection, r: &Report) -> Result<(), StoreError> {
    conn.execute(
        &format!(
            "INSERT INTO reports ({}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            REPORT_COLUMNS
        ),
        params![
            r.id.as_str(),
            r.title,
            r.category,
            r.description,
            r.location,
            r.coordinates.map(|c| c.lat),
            r.coordinates.map(|c| c.lng),
            r.status,
            r.priority,
            r.date,
            r.reporter.name,
            r.reporter.email,
            r.reporter.phone,
            r.department,
            r.assigned_to,
            r.estimated_resolution,
            r.resolved_on,
            r.photo,
        ],
    )?;
    Ok(())
}

fn insert_update(conn: &Connection, id: &ReportId, u: &ReportUpdate) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO report_updates (report_id, date, status, message, author) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id.as_str(), u.date, u.status, u.message, u.author],
    )?;
    Ok(())
}

fn insert_department(
    conn: &Connection,
    id: &str,
    d: &Department,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO departments (id, name, description, head_name, head_email, head_phone, location) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            d.name,
            d.description,
            d.head.name,
            d.head.email,
            d.head.phone,
            d.location
        ],
    )?;
    Ok(())
}

fn insert_staff(conn: &Connection, department_id: &str, s: &Staff) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO staff (id, department_id, name, email, phone, role, join_date) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![s.id, department_id, s.name, s.email, s.phone, s.role, s.join_date],
    )?;
    Ok(())
}

fn insert_notification(conn: &Connection, n: &Notification) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO notifications (id, title, message, kind, status, sent_at, delivery_rate) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![n.id, n.title, n.message, n.kind, n.status, n.sent_at, n.delivery_rate],
    )?;
    for (i, recipient) in n.recipients.iter().enumerate() {
        conn.execute(
            "INSERT INTO notification_recipients (notification_id, position, recipient) \
             VALUES (?1, ?2, ?3)",
            params![n.id, i, recipient],
        )?;
    }
    for (i, report_id) in n.report_ids.iter().enumerate() {
        conn.execute(
            "INSERT INTO notification_reports (notification_id, position, report_id) \
             VALUES (?1, ?2, ?3)",
            params![n.id, i, report_id],
        )?;
    }
    Ok(())
}

fn list_strings(conn: &Connection, sql: &str, id: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([id], |row| row.get(0))?;

    let mut values = Vec::new();
    for v in rows {
        values.push(v?);
    }
    Ok(values)
}

fn list_ids(conn: &Connection, table: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(&format!("SELECT id FROM {}", table))?;
    let rows = stmt.query_map([], |row| row.get(0))?;

    let mut ids = Vec::new();
    for id in rows {
        ids.push(id?);
    }
    Ok(ids)
}

fn load_report(conn: &Connection, id: &ReportId) -> Result<Report, StoreError> {
    conn.query_row(
        &format!("SELECT {} FROM reports WHERE id = ?1", REPORT_COLUMNS),
        [id.as_str()],
        report_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("report {}", id)))
}

impl Store for SqliteStore {
    fn reports(&self) -> Result<Vec<Report>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reports ORDER BY date DESC, id DESC",
            REPORT_COLUMNS
        ))?;
        let rows = stmt.query_map([], report_from_row)?;

        let mut reports = Vec::new();
        for r in rows {
            reports.push(r?);
        }
        Ok(reports)
    }

    fn report(&self, id: &ReportId) -> Result<Report, StoreError> {
        let conn = self.conn()?;
        load_report(&conn, id)
    }

    fn report_history(&self, id: &ReportId) -> Result<Vec<ReportUpdate>, StoreError> {
        let conn = self.conn()?;
        load_report(&conn, id)?;
        let mut stmt = conn.prepare(
            "SELECT date, status, message, author FROM report_updates \
             WHERE report_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map([id.as_str()], |row| {
            Ok(ReportUpdate {
                date: row.get(0)?,
                status: row.get(1)?,
                message: row.get(2)?,
                author: row.get(3)?,
            })
        })?;

        let mut history = Vec::new();
        for u in rows {
            history.push(u?);
        }
        Ok(history)
    }

    fn create_report(&self, new: NewReport) -> Result<Report, StoreError> {
        use chrono::Datelike;

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let ids = {
            let pattern = format!("CR-{}-%", new.date.year());
            let mut stmt = tx.prepare("SELECT id FROM reports WHERE id LIKE ?1")?;
            let rows = stmt.query_map([pattern], |row| row.get::<_, String>(0))?;
            let mut ids = Vec::new();
            for id in rows {
                ids.push(ReportId::from_raw(id?));
            }
            ids
        };
        let report = Report {
            id: next_report_id(new.date.year(), &ids),
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
        insert_report(&tx, &report)?;
        insert_update(
            &tx,
            &report.id,
            &ReportUpdate {
                date: report.date,
                status: Status::Pending,
                message: SUBMITTED_MESSAGE.to_string(),
                author: SYSTEM_AUTHOR.to_string(),
            },
        )?;

        tx.commit()?;
        Ok(report)
    }

    fn update_report(&self, id: &ReportId, update: &StatusUpdate) -> Result<Report, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut report = load_report(&tx, id)?;
        apply_update(&mut report, update);
        tx.execute(
            "UPDATE reports SET status = ?2, department_id = ?3, assigned_to = ?4, \
             resolved_on = ?5 WHERE id = ?1",
            params![
                id.as_str(),
                report.status,
                report.department,
                report.assigned_to,
                report.resolved_on
            ],
        )?;
        insert_update(
            &tx,
            id,
            &ReportUpdate {
                date: update.date,
                status: update.status,
                message: update.notes.clone(),
                author: update.author.clone(),
            },
        )?;

        tx.commit()?;
        Ok(report)
    }

    fn departments(&self) -> Result<Vec<Department>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, description, head_name, head_email, head_phone, location \
             FROM departments ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Department {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                head: Contact {
                    name: row.get(3)?,
                    email: row.get(4)?,
                    phone: row.get(5)?,
                },
                location: row.get(6)?,
                staff: Vec::new(),
            })
        })?;
        let mut departments = Vec::new();
        for d in rows {
            departments.push(d?);
        }

        let mut stmt = conn.prepare(
            "SELECT department_id, id, name, email, phone, role, join_date FROM staff ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                Staff {
                    id: row.get(1)?,
                    name: row.get(2)?,
                    email: row.get(3)?,
                    phone: row.get(4)?,
                    role: row.get(5)?,
                    join_date: row.get(6)?,
                },
            ))
        })?;
        for row in rows {
            let (department_id, staff) = row?;
            if let Some(d) = departments.iter_mut().find(|d| d.id == department_id) {
                d.staff.push(staff);
            }
        }

        Ok(departments)
    }

    fn create_department(&self, new: NewDepartment) -> Result<Department, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let ids = list_ids(&tx, "departments")?;
        let department = Department {
            id: next_id("dept-", ids.iter().map(String::as_str)),
            name: new.name,
            description: new.description,
            head: new.head,
            location: new.location,
            staff: Vec::new(),
        };
        insert_department(&tx, &department.id, &department)?;

        tx.commit()?;
        Ok(department)
    }

    fn create_staff(&self, department_id: &str, new: NewStaff) -> Result<Staff, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let known: Option<String> = tx
            .query_row(
                "SELECT id FROM departments WHERE id = ?1",
                [department_id],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_none() {
            return Err(StoreError::NotFound(format!("department {}", department_id)));
        }
        let ids = list_ids(&tx, "staff")?;
        let staff = Staff {
            id: next_id("staff-", ids.iter().map(String::as_str)),
            name: new.name,
            email: new.email,
            phone: new.phone,
            role: new.role,
            join_date: new.join_date,
        };
        insert_staff(&tx, department_id, &staff)?;

        tx.commit()?;
        Ok(staff)
    }

    fn notifications(&self) -> Result<Vec<Notification>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, message, kind, status, sent_at, delivery_rate FROM notifications \
             ORDER BY sent_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Notification {
                id: row.get(0)?,
                title: row.get(1)?,
                message: row.get(2)?,
                kind: row.get(3)?,
                recipients: Vec::new(),
                status: row.get(4)?,
                sent_at: row.get(5)?,
                report_ids: Vec::new(),
                delivery_rate: row.get(6)?,
            })
        })?;

        let mut notifications = Vec::new();
        for n in rows {
            let mut n = n?;
            n.recipients = list_strings(
                &conn,
                "SELECT recipient FROM notification_recipients \
                 WHERE notification_id = ?1 ORDER BY position",
                &n.id,
            )?;
            n.report_ids = list_strings(
                &conn,
                "SELECT report_id FROM notification_reports \
                 WHERE notification_id = ?1 ORDER BY position",
                &n.id,
            )?;
            notifications.push(n);
        }
        Ok(notifications)
    }

    fn create_notification(&self, new: NewNotification) -> Result<Notification, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let ids = list_ids(&tx, "notifications")?;
        let notification = Notification {
            id: next_id("notif-", ids.iter().map(String::as_str)),
            title: new.title,
            message: new.message,
            kind: new.kind,
            recipients: new.recipients,
            status: new.status,
            sent_at: new.sent_at,
            report_ids: new.report_ids,
            delivery_rate: new.delivery_rate,
        };
        insert_notification(&tx, &notification)?;

        tx.commit()?;
        Ok(notification)
    }

    fn recipient_groups(&self) -> Result<Vec<RecipientGroup>, StoreError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, name, member_count FROM recipient_groups ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok(RecipientGroup {
                id: row.get(0)?,
                name: row.get(1)?,
                member_count: row.get(2)?,
            })
        })?;

        let mut groups = Vec::new();
        for g in rows {
            groups.push(g?);
        }
        Ok(groups)
    }

    fn account(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                "SELECT email, name, role, password_hash FROM accounts WHERE email = ?1",
                [email],
                |row| {
                    Ok(Account {
                        email: row.get(0)?,
                        name: row.get(1)?,
                        role: row.get(2)?,
                        password_hash: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(account)
    }
}

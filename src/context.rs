use crate::{
    analytics::{self, DepartmentPerformance, Hotspot},
    data::{Department, Notification, NotificationStatus, RecipientGroup, Report, ReportUpdate},
    present::{self, Badge},
    services::auth::Session,
};

#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Navigation entry to highlight.
    pub nav: &'static str,
    pub user: Option<Session>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>, current: &str) -> Self {
        let value = value.into();
        Self {
            selected: value == current,
            value,
            label: label.into(),
        }
    }
}

/// `<option>`s for a filter select, headed by the `all` sentinel.
pub fn filter_options<'a>(
    all_label: &str,
    current: &str,
    choices: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Vec<SelectOption> {
    std::iter::once(SelectOption::new("all", all_label, current))
        .chain(
            choices
                .into_iter()
                .map(|(value, label)| SelectOption::new(value, label, current)),
        )
        .collect()
}

/// "John Doe" becomes "John D.".
pub fn short_name(name: &str) -> String {
    let mut parts = name.split_whitespace();
    match (parts.next(), parts.last()) {
        (Some(first), Some(last)) => {
            let initial: String = last.chars().take(1).collect();
            format!("{} {}.", first, initial)
        }
        (Some(first), None) => first.to_string(),
        _ => String::new(),
    }
}

fn department_name(departments: &[Department], id: Option<&str>) -> Option<String> {
    let id = id?;
    Some(
        departments
            .iter()
            .find(|d| d.id == id)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| id.to_string()),
    )
}

fn staff_name(departments: &[Department], id: Option<&str>) -> Option<String> {
    let id = id?;
    Some(
        departments
            .iter()
            .flat_map(|d| d.staff.iter())
            .find(|s| s.id == id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| id.to_string()),
    )
}

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub id: String,
    pub title: String,
    pub category: &'static str,
    pub description: String,
    pub location: String,
    pub date: String,
    pub status: Badge,
    pub priority: &'static str,
    pub priority_class: &'static str,
    pub reporter: String,
    pub reporter_email: String,
    pub reporter_phone: String,
    pub department: Option<String>,
    pub assigned_to: Option<String>,
    pub estimated_resolution: Option<String>,
    pub resolved_on: Option<String>,
    pub photo: Option<String>,
    pub coordinates: Option<String>,
}

impl ReportRow {
    pub fn new(r: &Report, departments: &[Department]) -> Self {
        Self {
            id: r.id.to_string(),
            title: r.title.clone(),
            category: r.category.label(),
            description: r.description.clone(),
            location: r.location.clone(),
            date: r.date.format("%b %-d, %Y").to_string(),
            status: present::status_badge(r.status),
            priority: r.priority.label(),
            priority_class: present::priority_class(r.priority),
            reporter: r.reporter.name.clone(),
            reporter_email: r.reporter.email.clone().unwrap_or_default(),
            reporter_phone: r.reporter.phone.clone().unwrap_or_default(),
            department: department_name(departments, r.department.as_deref()),
            assigned_to: staff_name(departments, r.assigned_to.as_deref()),
            estimated_resolution: r
                .estimated_resolution
                .map(|d| d.format("%b %-d, %Y").to_string()),
            resolved_on: r.resolved_on.map(|d| d.format("%b %-d, %Y").to_string()),
            photo: r.photo.clone(),
            coordinates: r.position().map(|c| c.format(4)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateRow {
    pub date: String,
    pub status: Badge,
    pub message: String,
    pub author: String,
}

impl From<&ReportUpdate> for UpdateRow {
    fn from(u: &ReportUpdate) -> Self {
        Self {
            date: u.date.format("%b %-d, %Y").to_string(),
            status: present::status_badge(u.status),
            message: u.message.clone(),
            author: u.author.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MapMarker {
    pub id: String,
    pub title: String,
    pub category: &'static str,
    pub location: String,
    pub status: Badge,
    pub priority: &'static str,
    pub priority_class: &'static str,
    pub reporter: String,
    pub date: String,
    /// Position inside the map panel, in percent from the left and top.
    pub x: f64,
    pub y: f64,
}

/// Places located reports inside the map panel by projecting their
/// bounding box onto the 10%..90% square.
pub fn markers(reports: &[&Report]) -> Vec<MapMarker> {
    let located: Vec<_> = reports
        .iter()
        .filter_map(|r| r.position().map(|p| (*r, p)))
        .collect();
    let bounds = located.iter().fold(None, |acc: Option<(f64, f64, f64, f64)>, (_, p)| {
        Some(match acc {
            None => (p.lat, p.lat, p.lng, p.lng),
            Some((lat_min, lat_max, lng_min, lng_max)) => (
                lat_min.min(p.lat),
                lat_max.max(p.lat),
                lng_min.min(p.lng),
                lng_max.max(p.lng),
            ),
        })
    });
    let Some((lat_min, lat_max, lng_min, lng_max)) = bounds else {
        return Vec::new();
    };
    let scale = |v: f64, min: f64, max: f64| {
        if max - min < f64::EPSILON {
            50.0
        } else {
            10.0 + 80.0 * (v - min) / (max - min)
        }
    };

    located
        .into_iter()
        .map(|(r, p)| MapMarker {
            id: r.id.to_string(),
            title: r.title.clone(),
            category: r.category.label(),
            location: r.location.clone(),
            status: present::status_badge(r.status),
            priority: r.priority.label(),
            priority_class: present::priority_class(r.priority),
            reporter: short_name(&r.reporter.name),
            date: r.date.format("%b %-d, %Y").to_string(),
            x: scale(p.lng, lng_min, lng_max),
            // North is up.
            y: 100.0 - scale(p.lat, lat_min, lat_max),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: String,
    pub title: String,
    pub message: String,
    pub kind: &'static str,
    pub icon: &'static str,
    pub status: &'static str,
    pub status_class: &'static str,
    pub recipients: String,
    pub sent_at: String,
    pub scheduled: bool,
    pub delivery_rate: Option<String>,
    pub report_ids: Vec<String>,
}

impl NotificationRow {
    pub fn new(n: &Notification, groups: &[RecipientGroup]) -> Self {
        let recipients = match n.recipients.as_slice() {
            [one] => groups
                .iter()
                .find(|g| &g.id == one)
                .map(|g| g.name.clone())
                .unwrap_or_else(|| one.clone()),
            many => format!("{} recipients", many.len()),
        };

        Self {
            id: n.id.clone(),
            title: n.title.clone(),
            message: n.message.clone(),
            kind: n.kind.label(),
            icon: present::kind_icon(n.kind).glyph(),
            status: n.status.label(),
            status_class: present::notification_class(n.status),
            recipients,
            sent_at: n.sent_at.format("%b %-d, %Y %H:%M").to_string(),
            scheduled: n.status == NotificationStatus::Scheduled,
            delivery_rate: n.delivery_rate.map(|r| format!("{}%", r)),
            report_ids: n.report_ids.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StaffRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
    pub joined: String,
    pub active: usize,
}

#[derive(Debug, Clone)]
pub struct DepartmentCard {
    pub department: Department,
    pub active: usize,
    pub avg_resolution: String,
    pub staff: Vec<StaffRow>,
}

pub fn format_days(days: Option<f64>) -> String {
    match days {
        Some(d) => format!("{:.1} days", d),
        None => "n/a".to_string(),
    }
}

impl DepartmentCard {
    pub fn new(department: &Department, performance: &DepartmentPerformance, reports: &[Report]) -> Self {
        Self {
            department: department.clone(),
            active: performance.active,
            avg_resolution: format_days(performance.avg_resolution_days),
            staff: department
                .staff
                .iter()
                .map(|s| StaffRow {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    email: s.email.clone(),
                    phone: s.phone.clone(),
                    role: s.role.clone(),
                    joined: s.join_date.format("%b %-d, %Y").to_string(),
                    active: analytics::staff_active(reports, &s.id),
                })
                .collect(),
        }
    }
}

/// Staff choices of the assignment form, grouped by department.
#[derive(Debug, Clone)]
pub struct StaffGroup {
    pub department: String,
    pub options: Vec<SelectOption>,
}

pub fn staff_groups(departments: &[Department], current: &str) -> Vec<StaffGroup> {
    departments
        .iter()
        .filter(|d| !d.staff.is_empty())
        .map(|d| StaffGroup {
            department: d.name.clone(),
            options: d
                .staff
                .iter()
                .map(|s| SelectOption::new(s.id.clone(), format!("{} ({})", s.name, s.role), current))
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct HotspotRow {
    pub area: String,
    pub complaints: usize,
    pub trend: Badge,
}

impl From<&Hotspot> for HotspotRow {
    fn from(h: &Hotspot) -> Self {
        Self {
            area: h.area.clone(),
            complaints: h.complaints,
            trend: present::trend_badge(h.trend),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::data::seed::Seed;

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("John Doe"), "John D.");
        assert_eq!(short_name("Mary Ann Smith"), "Mary S.");
        assert_eq!(short_name("Anonymous"), "Anonymous");
        assert_eq!(short_name(""), "");
    }

    #[test]
    fn test_markers_stay_inside_panel() {
        let seed = Seed::load(&Path::new(env!("CARGO_MANIFEST_DIR")).join("seed")).unwrap();
        let reports: Vec<&Report> = seed.reports.iter().collect();
        let markers = markers(&reports);

        assert_eq!(markers.len(), reports.len());
        for m in &markers {
            assert!((10.0..=90.0).contains(&m.x), "{} x={}", m.id, m.x);
            assert!((10.0..=90.0).contains(&m.y), "{} y={}", m.id, m.y);
        }
        // Oak Street is the north-easternmost report.
        let oak = markers.iter().find(|m| m.id == "CR-2024-0567").unwrap();
        assert_eq!(oak.x, 90.0);
        assert_eq!(oak.y, 10.0);
    }

    #[test]
    fn test_report_row_names() {
        let seed = Seed::load(&Path::new(env!("CARGO_MANIFEST_DIR")).join("seed")).unwrap();
        let pothole = seed
            .reports
            .iter()
            .find(|r| r.id.as_str() == "CR-2024-1001")
            .unwrap();
        let row = ReportRow::new(pothole, &seed.departments);

        assert_eq!(row.department.as_deref(), Some("Public Works"));
        assert_eq!(row.assigned_to.as_deref(), Some("Tom Anderson"));
        assert_eq!(row.status.label, "In Progress");
        assert_eq!(row.date, "Jan 15, 2024");
    }
}

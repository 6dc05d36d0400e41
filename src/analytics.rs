use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate};
use strum_macros::{EnumString, VariantArray};

use crate::{
    data::{Category, Coordinates, Department, Priority, Report, Status},
    filter::Choice,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub pending: usize,
    pub assigned: usize,
    pub in_progress: usize,
    pub resolved: usize,
    pub unknown: usize,
}

impl StatusCounts {
    pub fn of<'a>(reports: impl IntoIterator<Item = &'a Report>) -> Self {
        let mut counts = Self::default();
        for report in reports {
            match report.status {
                Status::Pending => counts.pending += 1,
                Status::Assigned => counts.assigned += 1,
                Status::InProgress => counts.in_progress += 1,
                Status::Resolved => counts.resolved += 1,
                Status::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.pending + self.assigned + self.in_progress + self.resolved + self.unknown
    }

    /// Assigned plus in progress.
    pub fn active(&self) -> usize {
        self.assigned + self.in_progress
    }

    pub fn get(&self, status: Status) -> usize {
        match status {
            Status::Pending => self.pending,
            Status::Assigned => self.assigned,
            Status::InProgress => self.in_progress,
            Status::Resolved => self.resolved,
            Status::Unknown => self.unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DashboardStats {
    pub total: usize,
    pub pending: usize,
    pub active: usize,
    pub resolved: usize,
    pub high_priority: usize,
}

pub fn dashboard_stats(reports: &[Report]) -> DashboardStats {
    let counts = StatusCounts::of(reports);

    DashboardStats {
        total: reports.len(),
        pending: counts.pending,
        active: counts.active(),
        resolved: counts.resolved,
        high_priority: reports
            .iter()
            .filter(|r| r.priority == Priority::High)
            .count(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, VariantArray)]
pub enum Range {
    #[strum(serialize = "7d")]
    Week,
    #[default]
    #[strum(serialize = "30d")]
    Month,
    #[strum(serialize = "90d")]
    Quarter,
    #[strum(serialize = "1y")]
    Year,
}

impl Range {
    pub fn days(&self) -> i64 {
        match self {
            Range::Week => 7,
            Range::Month => 30,
            Range::Quarter => 90,
            Range::Year => 365,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Range::Week => "7d",
            Range::Month => "30d",
            Range::Quarter => "90d",
            Range::Year => "1y",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Range::Week => "Last 7 days",
            Range::Month => "Last 30 days",
            Range::Quarter => "Last 90 days",
            Range::Year => "Last year",
        }
    }

    /// First day inside the range ending `today`.
    pub fn start(&self, today: NaiveDate) -> NaiveDate {
        today - Duration::days(self.days() - 1)
    }

    pub fn contains(&self, today: NaiveDate, date: NaiveDate) -> bool {
        date >= self.start(today) && date <= today
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryShare {
    pub category: Category,
    pub count: usize,
    pub percent: u32,
}

/// Whole-number share of `part` in `total`, 0 for an empty total.
pub fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((part as f64 * 100.0) / total as f64).round() as u32
}

/// Categories present in `reports`, most reported first.
pub fn category_breakdown(reports: &[&Report]) -> Vec<CategoryShare> {
    let mut counts: BTreeMap<Category, usize> = BTreeMap::new();
    for report in reports {
        *counts.entry(report.category).or_default() += 1;
    }
    let mut shares: Vec<_> = counts
        .into_iter()
        .map(|(category, count)| CategoryShare {
            category,
            count,
            percent: percent(count, reports.len()),
        })
        .collect();
    shares.sort_by(|a, b| b.count.cmp(&a.count));
    shares
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthTrend {
    pub month: String,
    pub complaints: usize,
    pub resolved: usize,
}

/// Complaints filed and resolved per calendar month, for every month the
/// range touches.
pub fn monthly_trends(reports: &[&Report], range: Range, today: NaiveDate) -> Vec<MonthTrend> {
    let start = range.start(today);
    let mut months: Vec<(i32, u32)> = Vec::new();
    let (mut year, mut month) = (start.year(), start.month());
    while (year, month) <= (today.year(), today.month()) {
        months.push((year, month));
        (year, month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
    }

    months
        .into_iter()
        .map(|(y, m)| {
            let in_month = |d: &NaiveDate| d.year() == y && d.month() == m;
            MonthTrend {
                month: NaiveDate::from_ymd_opt(y, m, 1)
                    .map(|d| d.format("%b %Y").to_string())
                    .unwrap_or_default(),
                complaints: reports.iter().filter(|r| in_month(&r.date)).count(),
                resolved: reports
                    .iter()
                    .filter(|r| r.resolved_on.as_ref().is_some_and(|d| in_month(d)))
                    .count(),
            }
        })
        .collect()
}

/// Mean days between filing and resolution over resolved reports.
pub fn average_resolution_days<'a>(reports: impl IntoIterator<Item = &'a Report>) -> Option<f64> {
    let days: Vec<i64> = reports
        .into_iter()
        .filter_map(|r| r.resolved_on.map(|d| (d - r.date).num_days()))
        .collect();
    if days.is_empty() {
        return None;
    }

    Some(days.iter().sum::<i64>() as f64 / days.len() as f64)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepartmentPerformance {
    pub id: String,
    pub name: String,
    pub staff_count: usize,
    pub active: usize,
    pub resolved: usize,
    pub avg_resolution_days: Option<f64>,
}

pub fn department_performance(
    departments: &[Department],
    reports: &[&Report],
) -> Vec<DepartmentPerformance> {
    departments
        .iter()
        .map(|d| {
            let owned: Vec<&Report> = reports
                .iter()
                .copied()
                .filter(|r| r.department.as_deref() == Some(d.id.as_str()))
                .collect();
            let counts = StatusCounts::of(owned.iter().copied());
            DepartmentPerformance {
                id: d.id.clone(),
                name: d.name.clone(),
                staff_count: d.staff.len(),
                active: counts.active(),
                resolved: counts.resolved,
                avg_resolution_days: average_resolution_days(owned),
            }
        })
        .collect()
}

/// Open complaints assigned to `staff_id`.
pub fn staff_active(reports: &[Report], staff_id: &str) -> usize {
    reports
        .iter()
        .filter(|r| r.assigned_to.as_deref() == Some(staff_id) && r.status.is_active())
        .count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hotspot {
    pub area: String,
    pub center: Coordinates,
    pub complaints: usize,
    pub trend: Trend,
}

pub const HOTSPOT_LIMIT: usize = 5;

/// Groups located reports into cells of 0.01° (about 1 km) and ranks the
/// busiest. The trend compares the newer half of the range with the older.
pub fn hotspots(reports: &[&Report], range: Range, today: NaiveDate) -> Vec<Hotspot> {
    let midpoint = today - Duration::days(range.days() / 2);
    let mut cells: Vec<((i64, i64), Vec<(&Report, Coordinates)>)> = Vec::new();
    for &report in reports {
        let Some(position) = report.position() else {
            continue;
        };
        let key = (
            (position.lat * 100.0).round() as i64,
            (position.lng * 100.0).round() as i64,
        );
        match cells.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push((report, position)),
            None => cells.push((key, vec![(report, position)])),
        }
    }

    let mut spots: Vec<Hotspot> = cells
        .into_iter()
        .map(|(_, members)| {
            let n = members.len() as f64;
            let newer = members.iter().filter(|(r, _)| r.date > midpoint).count();
            let older = members.len() - newer;
            Hotspot {
                area: members[0].0.location.clone(),
                center: Coordinates {
                    lat: members.iter().map(|(_, p)| p.lat).sum::<f64>() / n,
                    lng: members.iter().map(|(_, p)| p.lng).sum::<f64>() / n,
                },
                complaints: members.len(),
                trend: match newer.cmp(&older) {
                    std::cmp::Ordering::Greater => Trend::Up,
                    std::cmp::Ordering::Less => Trend::Down,
                    std::cmp::Ordering::Equal => Trend::Stable,
                },
            }
        })
        .collect();
    spots.sort_by(|a, b| b.complaints.cmp(&a.complaints));
    spots.truncate(HOTSPOT_LIMIT);
    spots
}

/// Date the analytics ranges end on: today, or the latest report date when
/// nothing has been reported since.
pub fn as_of(reports: &[Report], today: NaiveDate) -> NaiveDate {
    reports
        .iter()
        .map(|r| r.date)
        .max()
        .map_or(today, |latest| latest.min(today))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analytics {
    pub range: Range,
    pub total: usize,
    pub resolved: usize,
    pub resolution_rate: u32,
    pub avg_resolution_days: Option<f64>,
    pub categories: Vec<CategoryShare>,
    pub trends: Vec<MonthTrend>,
    pub departments: Vec<DepartmentPerformance>,
    pub hotspots: Vec<Hotspot>,
}

pub fn analyze(
    reports: &[Report],
    departments: &[Department],
    range: Range,
    department: &Choice<String>,
    today: NaiveDate,
) -> Analytics {
    let selected: Vec<&Report> = reports
        .iter()
        .filter(|r| range.contains(today, r.date))
        .filter(|r| department.matches_opt(r.department.as_ref()))
        .collect();
    let counts = StatusCounts::of(selected.iter().copied());
    let shown: Vec<Department> = departments
        .iter()
        .filter(|d| department.matches(&d.id))
        .cloned()
        .collect();

    Analytics {
        range,
        total: selected.len(),
        resolved: counts.resolved,
        resolution_rate: percent(counts.resolved, selected.len()),
        avg_resolution_days: average_resolution_days(selected.iter().copied()),
        categories: category_breakdown(&selected),
        trends: monthly_trends(&selected, range, today),
        departments: department_performance(&shown, &selected),
        hotspots: hotspots(&selected, range, today),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HomeStats {
    pub resolved: usize,
    pub citizens: usize,
    pub resolution_rate: u32,
}

pub fn home_stats(reports: &[Report]) -> HomeStats {
    let counts = StatusCounts::of(reports);
    let citizens: HashSet<String> = reports
        .iter()
        .map(|r| {
            r.reporter
                .email
                .as_deref()
                .unwrap_or(&r.reporter.name)
                .to_lowercase()
        })
        .collect();

    HomeStats {
        resolved: counts.resolved,
        citizens: citizens.len(),
        resolution_rate: percent(counts.resolved, reports.len()),
    }
}

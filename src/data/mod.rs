use std::{fmt::Display, str::FromStr, sync::LazyLock};

use chrono::{NaiveDate, NaiveDateTime};
use garde::Validate;
use regex::Regex;
use rusqlite::{ToSql, types::FromSql};
use schemars::JsonSchema;
use serde_derive::{Deserialize, Serialize};
use strum_macros::{EnumString, VariantArray};

pub mod seed;

static REPORT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CR-(\d{4})-(\d+)$").expect("report id pattern is valid"));

#[derive(Serialize, Deserialize, Debug, JsonSchema, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    pub fn new(year: i32, seq: u32) -> Self {
        Self(format!("CR-{}-{:04}", year, seq))
    }

    /// Wraps an identifier without checking its shape. Identifiers handed out
    /// by the simulated submitter do not follow the zero-padded scheme.
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn parse(s: &str) -> Option<Self> {
        REPORT_ID.is_match(s).then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `(year, sequence)` for well-formed identifiers.
    pub fn parts(&self) -> Option<(i32, u32)> {
        let caps = REPORT_ID.captures(&self.0)?;
        let year = caps.get(1)?.as_str().parse().ok()?;
        let seq = caps.get(2)?.as_str().parse().ok()?;

        Some((year, seq))
    }
}

impl Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ReportId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn valid_report_id(id: &ReportId, _: &()) -> garde::Result {
    if id.parts().is_some() {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "`{}` is not of the form CR-YYYY-NNNN",
            id
        )))
    }
}

/// Lifecycle stage of a report. `Unknown` stands in for any value that is not
/// one of the four stages and is never written back.
#[derive(
    Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, JsonSchema,
    EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Status {
    Pending,
    Assigned,
    InProgress,
    Resolved,
    #[serde(skip)]
    #[strum(disabled)]
    Unknown,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Pending,
        Status::Assigned,
        Status::InProgress,
        Status::Resolved,
    ];

    pub fn lenient(s: &str) -> Self {
        Status::from_str(s).unwrap_or(Status::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Assigned => "assigned",
            Status::InProgress => "in-progress",
            Status::Resolved => "resolved",
            Status::Unknown => "unknown",
        }
    }

    /// Position in the pending → assigned → in-progress → resolved order.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Status::Pending => Some(0),
            Status::Assigned => Some(1),
            Status::InProgress => Some(2),
            Status::Resolved => Some(3),
            Status::Unknown => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Status::Assigned | Status::InProgress)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for Status {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        match value {
            rusqlite::types::ValueRef::Text(s) => {
                Ok(Status::lenient(&String::from_utf8_lossy(s)))
            }
            _ => Err(rusqlite::types::FromSqlError::InvalidType),
        }
    }
}

#[derive(
    Serialize,
    Deserialize,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Clone,
    Copy,
    JsonSchema,
    VariantArray,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(
    Serialize,
    Deserialize,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Clone,
    Copy,
    JsonSchema,
    VariantArray,
    EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Category {
    RoadTraffic,
    StreetLighting,
    WasteManagement,
    WaterDrainage,
    ParksRecreation,
    PublicSafety,
    BuildingInfrastructure,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::RoadTraffic => "road-traffic",
            Category::StreetLighting => "street-lighting",
            Category::WasteManagement => "waste-management",
            Category::WaterDrainage => "water-drainage",
            Category::ParksRecreation => "parks-recreation",
            Category::PublicSafety => "public-safety",
            Category::BuildingInfrastructure => "building-infrastructure",
            Category::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::RoadTraffic => "Road & Traffic",
            Category::StreetLighting => "Street Lighting",
            Category::WasteManagement => "Waste Management",
            Category::WaterDrainage => "Water & Drainage",
            Category::ParksRecreation => "Parks & Recreation",
            Category::PublicSafety => "Public Safety",
            Category::BuildingInfrastructure => "Building & Infrastructure",
            Category::Other => "Other",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(
    Serialize,
    Deserialize,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Clone,
    Copy,
    JsonSchema,
    VariantArray,
    EnumString,
    Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    Sms,
    Email,
    Push,
    #[default]
    All,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Sms => "sms",
            NotificationKind::Email => "email",
            NotificationKind::Push => "push",
            NotificationKind::All => "all",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NotificationKind::Sms => "SMS Only",
            NotificationKind::Email => "Email Only",
            NotificationKind::Push => "Push Notification",
            NotificationKind::All => "All Methods",
        }
    }

    /// Delivery channels this kind fans out to.
    pub fn channels(&self) -> &'static [NotificationKind] {
        match self {
            NotificationKind::Sms => &[NotificationKind::Sms],
            NotificationKind::Email => &[NotificationKind::Email],
            NotificationKind::Push => &[NotificationKind::Push],
            NotificationKind::All => &[
                NotificationKind::Sms,
                NotificationKind::Email,
                NotificationKind::Push,
            ],
        }
    }
}

impl Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(
    Serialize,
    Deserialize,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Clone,
    Copy,
    JsonSchema,
    VariantArray,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationStatus {
    Sent,
    Scheduled,
    Draft,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Sent => "sent",
            NotificationStatus::Scheduled => "scheduled",
            NotificationStatus::Draft => "draft",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NotificationStatus::Sent => "Sent",
            NotificationStatus::Scheduled => "Scheduled",
            NotificationStatus::Draft => "Draft",
            NotificationStatus::Failed => "Failed",
        }
    }
}

impl Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(
    Serialize,
    Deserialize,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Clone,
    Copy,
    JsonSchema,
    VariantArray,
    EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Role {
    Admin,
    DeptHead,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::DeptHead => "dept-head",
            Role::Staff => "staff",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "System Administrator",
            Role::DeptHead => "Department Head",
            Role::Staff => "Staff Member",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

macro_rules! text_column {
    ($($typ:ty),*) => {
        $(
            impl ToSql for $typ {
                fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                    Ok(self.as_str().into())
                }
            }

            impl FromSql for $typ {
                fn column_result(
                    value: rusqlite::types::ValueRef<'_>,
                ) -> rusqlite::types::FromSqlResult<Self> {
                    match value {
                        rusqlite::types::ValueRef::Text(s) => {
                            let s = String::from_utf8_lossy(s);
                            <$typ>::from_str(&s).map_err(|_| {
                                rusqlite::types::FromSqlError::Other(
                                    format!("Unrecognized {}: {}", stringify!($typ), s).into(),
                                )
                            })
                        }
                        _ => Err(rusqlite::types::FromSqlError::InvalidType),
                    }
                }
            }
        )*
    };
}

text_column!(Priority, Category, NotificationKind, NotificationStatus, Role);

#[derive(Serialize, Deserialize, Debug, JsonSchema, Clone, Copy, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
pub struct Coordinates {
    #[garde(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[garde(range(min = -180.0, max = 180.0))]
    pub lng: f64,
}

impl Coordinates {
    /// Reads a `lat,lng` pair, as produced by location auto-detect.
    pub fn parse(s: &str) -> Option<Self> {
        let (lat, lng) = s.split_once(',')?;
        let lat: f64 = lat.trim().parse().ok()?;
        let lng: f64 = lng.trim().parse().ok()?;
        let coordinates = Coordinates { lat, lng };

        coordinates.validate().ok().map(|_| coordinates)
    }

    pub fn format(&self, precision: usize) -> String {
        format!(
            "{:.prec$}, {:.prec$}",
            self.lat,
            self.lng,
            prec = precision
        )
    }
}

#[derive(Serialize, Deserialize, Debug, JsonSchema, Clone, PartialEq, Eq, Validate)]
#[serde(deny_unknown_fields)]
pub struct Citizen {
    #[garde(length(min = 1, max = 64))]
    pub name: String,
    #[garde(email)]
    pub email: Option<String>,
    #[garde(length(max = 32))]
    pub phone: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, JsonSchema, Clone, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
pub struct Report {
    #[garde(custom(valid_report_id))]
    pub id: ReportId,
    #[garde(length(min = 1, max = 120))]
    pub title: String,
    #[garde(skip)]
    pub category: Category,
    #[garde(length(min = 1, max = 2000))]
    pub description: String,
    #[garde(length(min = 1, max = 200))]
    pub location: String,
    #[garde(dive)]
    pub coordinates: Option<Coordinates>,
    #[garde(skip)]
    pub status: Status,
    #[garde(skip)]
    pub priority: Priority,
    #[garde(skip)]
    pub date: NaiveDate,
    #[garde(dive)]
    pub reporter: Citizen,
    #[garde(length(min = 1, max = 64))]
    #[serde(default)]
    pub department: Option<String>,
    #[garde(length(min = 1, max = 64))]
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[garde(skip)]
    #[serde(default)]
    pub estimated_resolution: Option<NaiveDate>,
    #[garde(skip)]
    #[serde(default)]
    pub resolved_on: Option<NaiveDate>,
    #[garde(length(max = 256))]
    #[serde(default)]
    pub photo: Option<String>,
}

impl Report {
    /// Position for map display, preferring stored coordinates over a
    /// `lat,lng` location string.
    pub fn position(&self) -> Option<Coordinates> {
        self.coordinates.or_else(|| Coordinates::parse(&self.location))
    }
}

/// One entry of a report's timeline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReportUpdate {
    pub date: NaiveDate,
    pub status: Status,
    pub message: String,
    pub author: String,
}

/// A report as handed to the store, which assigns its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub title: String,
    pub category: Category,
    pub description: String,
    pub location: String,
    pub coordinates: Option<Coordinates>,
    pub priority: Priority,
    pub date: NaiveDate,
    pub reporter: Citizen,
    pub photo: Option<String>,
}

/// The command produced by the assignment workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: Status,
    pub department: Option<String>,
    pub assigned_to: Option<String>,
    pub notes: String,
    pub author: String,
    pub date: NaiveDate,
}

#[derive(Serialize, Deserialize, Debug, JsonSchema, Clone, PartialEq, Eq, Validate)]
#[serde(deny_unknown_fields)]
pub struct Contact {
    #[garde(length(min = 1, max = 64))]
    pub name: String,
    #[garde(email)]
    pub email: String,
    #[garde(length(max = 32))]
    pub phone: String,
}

#[derive(Serialize, Deserialize, Debug, JsonSchema, Clone, PartialEq, Eq, Validate)]
#[serde(deny_unknown_fields)]
pub struct Staff {
    #[garde(ascii, length(min = 1, max = 64))]
    pub id: String,
    #[garde(length(min = 1, max = 64))]
    pub name: String,
    #[garde(email)]
    pub email: String,
    #[garde(length(max = 32))]
    pub phone: String,
    #[garde(length(min = 1, max = 64))]
    pub role: String,
    #[garde(skip)]
    pub join_date: NaiveDate,
}

#[derive(Serialize, Deserialize, Debug, JsonSchema, Clone, PartialEq, Eq, Validate)]
#[serde(deny_unknown_fields)]
pub struct Department {
    #[garde(ascii, length(min = 1, max = 64))]
    pub id: String,
    #[garde(length(min = 1, max = 128))]
    pub name: String,
    #[garde(length(max = 512))]
    pub description: String,
    #[garde(dive)]
    pub head: Contact,
    #[garde(length(max = 128))]
    pub location: String,
    #[garde(dive)]
    #[serde(default)]
    pub staff: Vec<Staff>,
}

impl Department {
    pub fn has_staff(&self, staff_id: &str) -> bool {
        self.staff.iter().any(|s| s.id == staff_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct NewDepartment {
    #[garde(length(min = 1, max = 128))]
    pub name: String,
    #[garde(length(max = 512))]
    pub description: String,
    #[garde(dive)]
    pub head: Contact,
    #[garde(length(max = 128))]
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct NewStaff {
    #[garde(length(min = 1, max = 64))]
    pub name: String,
    #[garde(email)]
    pub email: String,
    #[garde(length(max = 32))]
    pub phone: String,
    #[garde(length(min = 1, max = 64))]
    pub role: String,
    #[garde(skip)]
    pub join_date: NaiveDate,
}

#[derive(Serialize, Deserialize, Debug, JsonSchema, Clone, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
pub struct Notification {
    #[garde(ascii, length(min = 1, max = 64))]
    pub id: String,
    #[garde(length(min = 1, max = 128))]
    pub title: String,
    #[garde(length(min = 1, max = 1024))]
    pub message: String,
    #[garde(skip)]
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[garde(length(min = 1), inner(length(min = 1, max = 128)))]
    pub recipients: Vec<String>,
    #[garde(skip)]
    pub status: NotificationStatus,
    #[garde(skip)]
    pub sent_at: NaiveDateTime,
    #[garde(skip)]
    #[serde(default)]
    pub report_ids: Vec<String>,
    #[garde(range(min = 0.0, max = 100.0))]
    #[serde(default)]
    pub delivery_rate: Option<f64>,
}

/// A notification as handed to the store, which assigns its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub recipients: Vec<String>,
    pub status: NotificationStatus,
    pub sent_at: NaiveDateTime,
    pub report_ids: Vec<String>,
    pub delivery_rate: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, JsonSchema, Clone, PartialEq, Eq, Validate)]
#[serde(deny_unknown_fields)]
pub struct RecipientGroup {
    #[garde(ascii, length(min = 1, max = 64))]
    pub id: String,
    #[garde(length(min = 1, max = 128))]
    pub name: String,
    #[garde(skip)]
    pub member_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password_hash: String,
}

/// Digest stored for an account password. Salted with the account e-mail.
pub fn password_digest(email: &str, password: &str) -> String {
    blake3::hash(format!("{}:{}", email.to_lowercase(), password).as_bytes())
        .to_hex()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_id_format() {
        let id = ReportId::new(2024, 7);
        assert_eq!(id.as_str(), "CR-2024-0007");
        assert_eq!(id.parts(), Some((2024, 7)));
        assert!(ReportId::parse("CR-2024-1001").is_some());
        assert!(ReportId::parse("CR-24-1").is_none());
        assert!(ReportId::parse("cr-2024-1001").is_none());
    }

    #[test]
    fn test_status_lenient() {
        assert_eq!(Status::lenient("in-progress"), Status::InProgress);
        assert_eq!(Status::lenient("resolved"), Status::Resolved);
        assert_eq!(Status::lenient("closed"), Status::Unknown);
        assert_eq!(Status::lenient("unknown"), Status::Unknown);
        assert_eq!(Status::lenient(""), Status::Unknown);
    }

    #[test]
    fn test_coordinates_parse() {
        let c = Coordinates::parse("40.712800, -74.006000").unwrap();
        assert_eq!(c.lat, 40.7128);
        assert_eq!(c.lng, -74.006);
        assert_eq!(c.format(6), "40.712800, -74.006000");

        assert!(Coordinates::parse("Main Street, near City Hall").is_none());
        assert!(Coordinates::parse("91.0, 0.0").is_none());
    }

    #[test]
    fn test_category_slugs_round_trip_through_from_str() {
        use strum::VariantArray;

        for category in Category::VARIANTS {
            assert_eq!(Category::from_str(category.as_str()).ok(), Some(*category));
        }
    }

    #[test]
    fn test_password_digest_is_salted_by_email() {
        let a = password_digest("a@example.gov", "secret");
        let b = password_digest("b@example.gov", "secret");
        assert_ne!(a, b);
        assert_eq!(a, password_digest("A@example.gov", "secret"));
    }
}

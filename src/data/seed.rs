use std::{
    collections::HashSet,
    fmt::Display,
    fs,
    path::{Path, PathBuf},
};

use garde::Validate;
use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{
    Account, Department, Notification, RecipientGroup, Report, Role, password_digest,
};

pub const REPORTS_FILE: &str = "reports.toml";
pub const DEPARTMENTS_FILE: &str = "departments.toml";
pub const NOTIFICATIONS_FILE: &str = "notifications.toml";
pub const GROUPS_FILE: &str = "groups.toml";
pub const ACCOUNTS_FILE: &str = "accounts.toml";

#[derive(Serialize, Deserialize, Debug, JsonSchema, Default, Validate)]
#[serde(deny_unknown_fields)]
pub struct ReportsFile {
    #[garde(dive)]
    #[serde(default)]
    pub report: Vec<Report>,
}

#[derive(Serialize, Deserialize, Debug, JsonSchema, Default, Validate)]
#[serde(deny_unknown_fields)]
pub struct DepartmentsFile {
    #[garde(dive)]
    #[serde(default)]
    pub department: Vec<Department>,
}

#[derive(Serialize, Deserialize, Debug, JsonSchema, Default, Validate)]
#[serde(deny_unknown_fields)]
pub struct NotificationsFile {
    #[garde(dive)]
    #[serde(default)]
    pub notification: Vec<Notification>,
}

#[derive(Serialize, Deserialize, Debug, JsonSchema, Default, Validate)]
#[serde(deny_unknown_fields)]
pub struct GroupsFile {
    #[garde(dive)]
    #[serde(default)]
    pub group: Vec<RecipientGroup>,
}

#[derive(Serialize, Deserialize, Debug, JsonSchema, Clone, Validate)]
#[serde(deny_unknown_fields)]
pub struct AccountSeed {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 1, max = 64))]
    pub name: String,
    #[garde(skip)]
    pub role: Role,
    #[garde(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, JsonSchema, Default, Validate)]
#[serde(deny_unknown_fields)]
pub struct AccountsFile {
    #[garde(dive)]
    #[serde(default)]
    pub account: Vec<AccountSeed>,
}

/// Everything a seed directory describes, validated.
#[derive(Debug, Default, Clone)]
pub struct Seed {
    pub reports: Vec<Report>,
    pub departments: Vec<Department>,
    pub notifications: Vec<Notification>,
    pub groups: Vec<RecipientGroup>,
    pub accounts: Vec<Account>,
}

/// JSON schema of every seed file, keyed by file name.
#[derive(Serialize, JsonSchema)]
pub struct SeedSchema {
    pub reports: ReportsFile,
    pub departments: DepartmentsFile,
    pub notifications: NotificationsFile,
    pub groups: GroupsFile,
    pub accounts: AccountsFile,
}

#[derive(Debug, Error)]
#[error("Invalid seed data in '{file}'")]
pub struct SeedValidationError {
    pub file: String,
    pub src: NamedSource<String>,
    pub labels: Vec<miette::LabeledSpan>,
    #[source]
    pub source: garde::Report,
}

impl Diagnostic for SeedValidationError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        Some(Box::new("civic::seed::validation"))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        Some(Box::new("The following validation errors occurred:"))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.src)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(self.labels.iter().cloned()))
    }
}

#[derive(Error, Debug, Diagnostic)]
pub enum SeedError {
    #[error("io error reading {1:?}: {0}")]
    #[diagnostic(code(civic::io))]
    Io(#[source] std::io::Error, PathBuf),

    #[error("Error deserializing {1:?}: {0}")]
    #[diagnostic(code(civic::toml))]
    Toml(#[source] toml::de::Error, PathBuf),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] Box<SeedValidationError>),

    #[error("Duplicate {0} id: {1}")]
    #[diagnostic(code(civic::seed::duplicate))]
    Duplicate(&'static str, String),

    #[error("Report {0} refers to unknown {1} `{2}`")]
    #[diagnostic(code(civic::seed::reference))]
    Reference(String, &'static str, String),
}

impl Seed {
    /// Loads every seed file in `dir`. Missing files count as empty.
    pub fn load(dir: &Path) -> Result<Self, SeedError> {
        let reports: ReportsFile = read_validated(&dir.join(REPORTS_FILE))?;
        let departments: DepartmentsFile = read_validated(&dir.join(DEPARTMENTS_FILE))?;
        let notifications: NotificationsFile = read_validated(&dir.join(NOTIFICATIONS_FILE))?;
        let groups: GroupsFile = read_validated(&dir.join(GROUPS_FILE))?;
        let accounts: AccountsFile = read_validated(&dir.join(ACCOUNTS_FILE))?;

        let seed = Seed {
            reports: reports.report,
            departments: departments.department,
            notifications: notifications.notification,
            groups: groups.group,
            accounts: accounts
                .account
                .into_iter()
                .map(|a| Account {
                    password_hash: password_digest(&a.email, &a.password),
                    email: a.email,
                    name: a.name,
                    role: a.role,
                })
                .collect(),
        };
        seed.check_references()?;

        Ok(seed)
    }

    fn check_references(&self) -> Result<(), SeedError> {
        unique("report", self.reports.iter().map(|r| r.id.as_str()))?;
        unique("department", self.departments.iter().map(|d| d.id.as_str()))?;
        unique(
            "staff",
            self.departments
                .iter()
                .flat_map(|d| d.staff.iter().map(|s| s.id.as_str())),
        )?;
        unique("notification", self.notifications.iter().map(|n| n.id.as_str()))?;
        unique("group", self.groups.iter().map(|g| g.id.as_str()))?;
        unique("account", self.accounts.iter().map(|a| a.email.as_str()))?;

        for report in &self.reports {
            if let Some(dept) = &report.department
                && !self.departments.iter().any(|d| &d.id == dept)
            {
                return Err(SeedError::Reference(
                    report.id.to_string(),
                    "department",
                    dept.clone(),
                ));
            }
            if let Some(staff) = &report.assigned_to
                && !self.departments.iter().any(|d| d.has_staff(staff))
            {
                return Err(SeedError::Reference(
                    report.id.to_string(),
                    "staff member",
                    staff.clone(),
                ));
            }
        }

        Ok(())
    }
}

fn unique<'a>(kind: &'static str, ids: impl Iterator<Item = &'a str>) -> Result<(), SeedError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(SeedError::Duplicate(kind, id.to_string()));
        }
    }

    Ok(())
}

fn read_validated<T>(path: &Path) -> Result<T, SeedError>
where
    T: DeserializeOwned + Default + Validate<Context = ()>,
{
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path).map_err(|e| SeedError::Io(e, path.to_path_buf()))?;
    let value: T = toml::from_str(&content).map_err(|e| SeedError::Toml(e, path.to_path_buf()))?;
    if let Err(e) = value.validate() {
        let file = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();
        let labels = to_labels(&content, &e);
        return Err(SeedError::Validation(Box::new(SeedValidationError {
            src: NamedSource::new(file.clone(), content),
            file,
            labels,
            source: e,
        })));
    }

    Ok(value)
}

fn to_labels(content: &str, report: &garde::Report) -> Vec<miette::LabeledSpan> {
    report
        .iter()
        .map(|(path, error)| {
            let path_str = path.to_string();
            let span = find_span(content, &path_str).unwrap_or(SourceSpan::new(0.into(), 0));
            LabeledSpan::new_with_span(Some(error.to_string()), span)
        })
        .collect()
}

/// Locates the value addressed by a garde path such as
/// `department[1].staff[0].email` inside an array-of-tables TOML document.
fn find_span(content: &str, path: &str) -> Option<SourceSpan> {
    let segments: Vec<&str> = path
        .split(['.', '[', ']'])
        .filter(|s| !s.is_empty())
        .collect();
    let (key, parents) = segments.split_last()?;

    let mut offset = 0;
    let mut table = String::new();
    for segment in parents {
        if let Ok(index) = segment.parse::<usize>() {
            let header = format!("[[{}]]", table);
            offset = content[offset..]
                .match_indices(&header)
                .nth(index)
                .map(|(pos, _)| offset + pos + header.len())?;
        } else {
            if !table.is_empty() {
                table.push('.');
            }
            table.push_str(segment);
        }
    }

    let mut pos = offset;
    for line in content[offset..].split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(after) = trimmed.strip_prefix(key)
            && let Some(value) = after.trim_start().strip_prefix('=')
        {
            let value_trimmed = value.trim();
            let value_start = pos + (line.len() - value.trim_start().len());
            return Some(SourceSpan::new(value_start.into(), value_trimmed.len()));
        }
        pos += line.len();
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Status;

    pub fn seed_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("seed")
    }

    #[test]
    fn test_load_bundled_seed() {
        let seed = Seed::load(&seed_dir()).unwrap();

        assert!(seed.reports.len() >= 5);
        assert_eq!(seed.departments.len(), 4);
        assert_eq!(seed.groups.len(), 4);
        assert!(!seed.accounts.is_empty());

        let pothole = seed
            .reports
            .iter()
            .find(|r| r.id.as_str() == "CR-2024-1001")
            .unwrap();
        assert_eq!(pothole.status, Status::InProgress);
        assert_eq!(pothole.location, "Main Street, near City Hall");
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let seed = Seed::load(dir.path()).unwrap();

        assert!(seed.reports.is_empty());
        assert!(seed.departments.is_empty());
    }

    #[test]
    fn test_validation_error_points_at_value() {
        let dir = tempfile::tempdir().unwrap();
        let content = r#"
[[group]]
id = "all-citizens"
name = "All Citizens"
member_count = 10

[[group]]
id = "empty"
name = ""
member_count = 0
"#;
        fs::write(dir.path().join(GROUPS_FILE), content).unwrap();

        let err = Seed::load(dir.path()).unwrap_err();
        let SeedError::Validation(err) = err else {
            panic!("expected a validation error, got {:?}", err);
        };
        assert_eq!(err.file, GROUPS_FILE);
        assert_eq!(err.labels.len(), 1);

        let span = err.labels[0].inner();
        let start = span.offset();
        assert_eq!(&content[start..start + span.len()], "\"\"");
    }

    #[test]
    fn test_unknown_department_reference() {
        let dir = tempfile::tempdir().unwrap();
        let content = r#"
[[report]]
id = "CR-2024-0001"
title = "Pothole"
category = "road-traffic"
description = "Deep pothole"
location = "Main Street"
status = "pending"
priority = "high"
date = "2024-01-15"
department = "dept-404"

[report.reporter]
name = "John Doe"
"#;
        fs::write(dir.path().join(REPORTS_FILE), content).unwrap();

        let err = Seed::load(dir.path()).unwrap_err();
        assert!(matches!(err, SeedError::Reference(_, "department", _)));
    }

    #[test]
    fn test_find_span_nested_table() {
        let content = r#"[[department]]
id = "a"

[[department]]
id = "b"

[[department.staff]]
email = "first"

[[department.staff]]
email = "second"
"#;
        let span = find_span(content, "department[1].staff[1].email").unwrap();
        let start = span.offset();
        assert_eq!(&content[start..start + span.len()], "\"second\"");
    }
}

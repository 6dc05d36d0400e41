use std::str::FromStr;

use chrono::NaiveDateTime;
use garde::Validate;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    data::{
        NewNotification, Notification, NotificationKind, NotificationStatus, RecipientGroup,
        Report,
    },
    present::status_badge,
    services::delivery::{Delivery, Dispatcher, dispatch},
    store::{Store, StoreError},
};

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("The {0} is required")]
    Missing(&'static str),
    #[error("Choose at least one recipient")]
    NoRecipients,
    #[error("Unknown recipient group `{0}`")]
    UnknownGroup(String),
    #[error("Unknown complaint `{0}`")]
    UnknownReport(String),
    #[error("`{0}` is not an e-mail address or phone number")]
    InvalidAddress(String),
    #[error("Unknown notification type `{0}`")]
    UnknownKind(String),
    #[error("Unknown action `{0}`")]
    UnknownAction(String),
    #[error("`{0}` is not a date and time")]
    InvalidSchedule(String),
    #[error("The scheduled time {0} has already passed")]
    ScheduleInPast(NaiveDateTime),
    #[error("Unknown message template `{0}`")]
    UnknownTemplate(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Send,
    Draft,
}

/// A notification being written in the compose dialog.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Compose {
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub groups: Vec<String>,
    pub addresses: Vec<String>,
    pub report_ids: Vec<String>,
    /// Send at this time instead of now.
    pub schedule_at: Option<NaiveDateTime>,
    pub action: Action,
}

/// Format of a `datetime-local` input.
pub const SCHEDULE_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// A reusable message. `[COMPLAINT_ID]`, `[STATUS]` and `[LOCATION]` are
/// replaced from a complaint when one is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub title: &'static str,
    pub message: &'static str,
}

pub const TEMPLATES: &[MessageTemplate] = &[
    MessageTemplate {
        id: "status-update",
        name: "Status Update",
        title: "Update on complaint [COMPLAINT_ID]",
        message: "Your complaint [COMPLAINT_ID] has been updated to [STATUS].",
    },
    MessageTemplate {
        id: "resolution-notice",
        name: "Resolution Notice",
        title: "Issue resolved: [COMPLAINT_ID]",
        message: "Great news! Your reported issue at [LOCATION] has been resolved. \
                  Thank you for helping improve our community.",
    },
];

impl MessageTemplate {
    pub fn find(id: &str) -> Result<&'static MessageTemplate, ComposeError> {
        TEMPLATES
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| ComposeError::UnknownTemplate(id.to_string()))
    }

    /// A draft pre-filled from the template. With a complaint the
    /// placeholders are filled in, it becomes a related complaint and its
    /// reporter the recipient.
    pub fn compose(&self, report: Option<&Report>) -> Compose {
        let mut compose = Compose {
            title: self.title.to_string(),
            message: self.message.to_string(),
            ..Default::default()
        };
        if let Some(report) = report {
            let fill = |text: &str| {
                text.replace("[COMPLAINT_ID]", report.id.as_str())
                    .replace("[STATUS]", status_badge(report.status).label)
                    .replace("[LOCATION]", &report.location)
            };
            compose.title = fill(self.title);
            compose.message = fill(self.message);
            compose.report_ids.push(report.id.to_string());
            compose.addresses.extend(
                [&report.reporter.email, &report.reporter.phone]
                    .into_iter()
                    .flatten()
                    .cloned(),
            );
        }
        compose
    }
}

fn split_list(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split([',', '\n', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Validate)]
struct EmailAddress(#[garde(email)] String);

/// An e-mail address, or a phone number of at least seven digits.
fn is_address(s: &str) -> bool {
    if s.contains('@') {
        return EmailAddress(s.to_string()).validate().is_ok();
    }
    let digits = s.chars().filter(|c| c.is_ascii_digit()).count();
    digits >= 7
        && s.chars()
            .all(|c| c.is_ascii_digit() || " +-().".contains(c))
}

impl Compose {
    /// Reads the compose form. Checkbox groups arrive as repeated `group`
    /// keys, which is why this takes the raw pairs.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, ComposeError> {
        let mut compose = Compose::default();
        for (key, value) in pairs {
            match key.as_str() {
                "title" => compose.title = value.trim().to_string(),
                "message" => compose.message = value.trim().to_string(),
                "type" => {
                    compose.kind = NotificationKind::from_str(value)
                        .map_err(|_| ComposeError::UnknownKind(value.clone()))?
                }
                "group" => compose.groups.push(value.clone()),
                "addresses" => compose.addresses.extend(split_list(value)),
                "report_ids" => compose.report_ids.extend(split_list(value)),
                "schedule_at" if !value.trim().is_empty() => {
                    compose.schedule_at = Some(
                        NaiveDateTime::parse_from_str(value.trim(), SCHEDULE_FORMAT)
                            .map_err(|_| ComposeError::InvalidSchedule(value.clone()))?,
                    )
                }
                "action" => {
                    compose.action = match value.as_str() {
                        "send" => Action::Send,
                        "draft" => Action::Draft,
                        other => return Err(ComposeError::UnknownAction(other.to_string())),
                    }
                }
                _ => {}
            }
        }

        Ok(compose)
    }

    pub fn recipients(&self) -> Vec<String> {
        self.groups
            .iter()
            .chain(self.addresses.iter())
            .cloned()
            .collect()
    }

    /// Group members plus explicit addresses.
    pub fn audience(&self, groups: &[RecipientGroup]) -> u64 {
        let members: u64 = self
            .groups
            .iter()
            .filter_map(|id| groups.iter().find(|g| &g.id == id))
            .map(|g| g.member_count as u64)
            .sum();
        members + self.addresses.len() as u64
    }

    pub fn validate(
        &self,
        groups: &[RecipientGroup],
        report_exists: impl Fn(&str) -> bool,
    ) -> Result<(), ComposeError> {
        if self.title.is_empty() {
            return Err(ComposeError::Missing("title"));
        }
        if self.message.is_empty() {
            return Err(ComposeError::Missing("message"));
        }
        if self.action == Action::Send && self.groups.is_empty() && self.addresses.is_empty() {
            return Err(ComposeError::NoRecipients);
        }
        if let Some(unknown) = self
            .groups
            .iter()
            .find(|id| !groups.iter().any(|g| &g.id == *id))
        {
            return Err(ComposeError::UnknownGroup(unknown.clone()));
        }
        if let Some(bad) = self.addresses.iter().find(|a| !is_address(a)) {
            return Err(ComposeError::InvalidAddress(bad.clone()));
        }
        if let Some(unknown) = self.report_ids.iter().find(|id| !report_exists(id.as_str())) {
            return Err(ComposeError::UnknownReport(unknown.clone()));
        }

        Ok(())
    }
}

/// Validates the composed notification, sends it unless it is a draft, and
/// records the outcome.
pub async fn submit(
    compose: Compose,
    store: &dyn Store,
    dispatcher: &dyn Dispatcher,
    now: NaiveDateTime,
) -> Result<Notification, ComposeError> {
    let groups = store.recipient_groups()?;
    let reports = store.reports()?;
    compose.validate(&groups, |id| reports.iter().any(|r| r.id.as_str() == id))?;

    let (status, sent_at, delivery_rate) = match (compose.action, compose.schedule_at) {
        (Action::Draft, _) => (NotificationStatus::Draft, now, None),
        (Action::Send, Some(at)) if at <= now => return Err(ComposeError::ScheduleInPast(at)),
        (Action::Send, Some(at)) => {
            info!(title = %compose.title, at = %at, "notification scheduled");
            (NotificationStatus::Scheduled, at, None)
        }
        (Action::Send, None) => {
            let delivery = Delivery {
                title: compose.title.clone(),
                message: compose.message.clone(),
                kind: compose.kind,
                recipients: compose.recipients(),
                audience: compose.audience(&groups),
            };
            match dispatch(dispatcher, &delivery).await {
                Ok(report) => (NotificationStatus::Sent, now, Some(report.rate())),
                Err(e) => {
                    warn!(title = %compose.title, error = %e, "notification not delivered");
                    (NotificationStatus::Failed, now, None)
                }
            }
        }
    };

    let notification = store.create_notification(NewNotification {
        recipients: compose.recipients(),
        title: compose.title,
        message: compose.message,
        kind: compose.kind,
        status,
        sent_at,
        report_ids: compose.report_ids,
        delivery_rate,
    })?;
    info!(id = %notification.id, status = %notification.status, "notification recorded");

    Ok(notification)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{
        data::seed::Seed,
        services::delivery::{LogDispatcher, tests::FlakyDispatcher},
        store::memory::MemoryStore,
    };

    fn seeded() -> MemoryStore {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("seed");
        MemoryStore::from_seed(Seed::load(&dir).unwrap())
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 22)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_pairs() {
        let compose = Compose::from_pairs(&pairs(&[
            ("title", " Road closure "),
            ("message", "Main Street closed"),
            ("type", "email"),
            ("group", "downtown-residents"),
            ("group", "frequent-reporters"),
            ("addresses", "a@x.org, +1 (555) 123-4567\nb@x.org"),
            ("report_ids", "CR-2024-1001"),
            ("action", "draft"),
        ]))
        .unwrap();

        assert_eq!(compose.title, "Road closure");
        assert_eq!(compose.kind, NotificationKind::Email);
        assert_eq!(compose.groups.len(), 2);
        assert_eq!(compose.addresses.len(), 3);
        assert_eq!(compose.action, Action::Draft);

        let seed = Seed::load(&std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("seed"))
            .unwrap();
        assert_eq!(compose.audience(&seed.groups), 3241 + 156 + 3);
    }

    #[test]
    fn test_validation() {
        let store = seeded();
        let groups = store.recipient_groups().unwrap();
        let exists = |id: &str| id == "CR-2024-1001";

        let base = Compose {
            title: "Update".to_string(),
            message: "Hello".to_string(),
            groups: vec!["all-citizens".to_string()],
            ..Default::default()
        };
        assert!(base.validate(&groups, exists).is_ok());

        let mut c = base.clone();
        c.title.clear();
        assert!(matches!(c.validate(&groups, exists), Err(ComposeError::Missing("title"))));

        let mut c = base.clone();
        c.groups.clear();
        assert!(matches!(c.validate(&groups, exists), Err(ComposeError::NoRecipients)));
        c.action = Action::Draft;
        assert!(c.validate(&groups, exists).is_ok());

        let mut c = base.clone();
        c.groups.push("night-owls".to_string());
        assert!(matches!(c.validate(&groups, exists), Err(ComposeError::UnknownGroup(_))));

        let mut c = base.clone();
        c.report_ids.push("CR-2024-4242".to_string());
        assert!(matches!(c.validate(&groups, exists), Err(ComposeError::UnknownReport(_))));

        let mut c = base;
        c.addresses.push("call me".to_string());
        assert!(matches!(c.validate(&groups, exists), Err(ComposeError::InvalidAddress(_))));
    }

    #[test]
    fn test_addresses() {
        assert!(is_address("resident@email.com"));
        assert!(is_address("+1 (555) 010-2030"));
        assert!(!is_address("<b>x y</b>@evil..com"));
        assert!(!is_address("@email.com"));
        assert!(!is_address("555-01"));
    }

    #[tokio::test]
    async fn test_send_records_delivery_rate() {
        let store = seeded();
        let before = store.notifications().unwrap().len();
        let compose = Compose {
            title: "Repair completed".to_string(),
            message: "Thanks for reporting".to_string(),
            kind: NotificationKind::All,
            addresses: vec!["sarah.m@email.com".to_string()],
            report_ids: vec!["CR-2024-0892".to_string()],
            ..Default::default()
        };

        let sent = submit(compose, &store, &LogDispatcher, now()).await.unwrap();
        assert_eq!(sent.status, NotificationStatus::Sent);
        assert_eq!(sent.delivery_rate, Some(100.0));
        assert_eq!(sent.id, "notif-5");
        assert_eq!(store.notifications().unwrap().len(), before + 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_and_drafts() {
        let store = seeded();
        let compose = Compose {
            title: "Outage".to_string(),
            message: "Service down".to_string(),
            kind: NotificationKind::Sms,
            groups: vec!["all-citizens".to_string()],
            ..Default::default()
        };

        let failed = submit(
            compose.clone(),
            &store,
            &FlakyDispatcher(NotificationKind::Sms),
            now(),
        )
        .await
        .unwrap();
        assert_eq!(failed.status, NotificationStatus::Failed);
        assert_eq!(failed.delivery_rate, None);

        let draft = Compose {
            action: Action::Draft,
            ..compose
        };
        let draft = submit(draft, &store, &FlakyDispatcher(NotificationKind::Sms), now())
            .await
            .unwrap();
        assert_eq!(draft.status, NotificationStatus::Draft);
    }

    #[test]
    fn test_schedule_field() {
        let compose = Compose::from_pairs(&pairs(&[
            ("title", "Street sweeping"),
            ("schedule_at", "2024-01-25T08:30"),
        ]))
        .unwrap();
        assert_eq!(
            compose.schedule_at,
            NaiveDate::from_ymd_opt(2024, 1, 25).unwrap().and_hms_opt(8, 30, 0)
        );

        let blank = Compose::from_pairs(&pairs(&[("schedule_at", "")])).unwrap();
        assert_eq!(blank.schedule_at, None);

        assert!(matches!(
            Compose::from_pairs(&pairs(&[("schedule_at", "next friday")])),
            Err(ComposeError::InvalidSchedule(_))
        ));
    }

    #[tokio::test]
    async fn test_scheduled_notification_is_not_dispatched() {
        let store = seeded();
        let later = now() + chrono::Duration::days(3);
        let compose = Compose {
            title: "Maintenance".to_string(),
            message: "Water off on Saturday".to_string(),
            kind: NotificationKind::Sms,
            groups: vec!["downtown-residents".to_string()],
            schedule_at: Some(later),
            ..Default::default()
        };

        // Would fail if it were dispatched now.
        let dispatcher = FlakyDispatcher(NotificationKind::Sms);
        let scheduled = submit(compose.clone(), &store, &dispatcher, now())
            .await
            .unwrap();
        assert_eq!(scheduled.status, NotificationStatus::Scheduled);
        assert_eq!(scheduled.sent_at, later);
        assert_eq!(scheduled.delivery_rate, None);

        let past = Compose {
            schedule_at: Some(now() - chrono::Duration::hours(1)),
            ..compose
        };
        assert!(matches!(
            submit(past, &store, &dispatcher, now()).await,
            Err(ComposeError::ScheduleInPast(_))
        ));
    }

    #[test]
    fn test_message_templates() {
        let plain = MessageTemplate::find("status-update").unwrap().compose(None);
        assert!(plain.message.contains("[COMPLAINT_ID]"));
        assert!(plain.report_ids.is_empty());

        let store = seeded();
        let report = store
            .report(&crate::data::ReportId::parse("CR-2024-0892").unwrap())
            .unwrap();
        let filled = MessageTemplate::find("resolution-notice")
            .unwrap()
            .compose(Some(&report));
        assert_eq!(filled.title, "Issue resolved: CR-2024-0892");
        assert!(filled.message.contains(&report.location));
        assert!(!filled.message.contains('['));
        assert_eq!(filled.report_ids, vec!["CR-2024-0892"]);
        let contacts = [&report.reporter.email, &report.reporter.phone];
        assert_eq!(filled.addresses.len(), contacts.iter().filter(|c| c.is_some()).count());

        assert!(matches!(
            MessageTemplate::find("birthday"),
            Err(ComposeError::UnknownTemplate(_))
        ));
    }
}

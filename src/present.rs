//! Display mapping for statuses, priorities and trends.
//!
//! Every function here is total: unrecognized input lands on a muted or
//! pending-like default instead of failing.

use std::str::FromStr;

use crate::{
    analytics::Trend,
    data::{NotificationKind, NotificationStatus, Priority, Status},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Timer,
    Clock,
    AlertCircle,
    CheckCircle,
    Message,
    Mail,
    Bell,
    Send,
    TrendUp,
    TrendDown,
    Minus,
}

impl Icon {
    pub fn name(&self) -> &'static str {
        match self {
            Icon::Timer => "timer",
            Icon::Clock => "clock",
            Icon::AlertCircle => "alert-circle",
            Icon::CheckCircle => "check-circle",
            Icon::Message => "message-square",
            Icon::Mail => "mail",
            Icon::Bell => "bell",
            Icon::Send => "send",
            Icon::TrendUp => "trending-up",
            Icon::TrendDown => "trending-down",
            Icon::Minus => "minus",
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Icon::Timer => "⏲",
            Icon::Clock => "🕒",
            Icon::AlertCircle => "⚠",
            Icon::CheckCircle => "✔",
            Icon::Message => "💬",
            Icon::Mail => "✉",
            Icon::Bell => "🔔",
            Icon::Send => "➤",
            Icon::TrendUp => "▲",
            Icon::TrendDown => "▼",
            Icon::Minus => "–",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Badge {
    pub label: &'static str,
    pub icon: Icon,
    pub class: &'static str,
}

const UNKNOWN_STATUS: Badge = Badge {
    label: "Unknown",
    icon: Icon::Clock,
    class: "status-pending",
};

pub fn status_badge(status: Status) -> Badge {
    match status {
        Status::Pending => Badge {
            label: "Pending",
            icon: Icon::Timer,
            class: "status-pending",
        },
        Status::Assigned => Badge {
            label: "Assigned",
            icon: Icon::Clock,
            class: "status-assigned",
        },
        Status::InProgress => Badge {
            label: "In Progress",
            icon: Icon::AlertCircle,
            class: "status-progress",
        },
        Status::Resolved => Badge {
            label: "Resolved",
            icon: Icon::CheckCircle,
            class: "status-success",
        },
        Status::Unknown => UNKNOWN_STATUS,
    }
}

/// Badge for a status given as loose text.
pub fn badge_for(status: &str) -> Badge {
    status_badge(Status::lenient(status))
}

pub fn priority_class(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "text-destructive",
        Priority::Medium => "text-warning",
        Priority::Low => "text-muted",
    }
}

/// Class for a priority given as loose text. Unrecognized values are muted.
pub fn priority_class_for(priority: &str) -> &'static str {
    Priority::from_str(priority)
        .map(priority_class)
        .unwrap_or("text-muted")
}

pub fn notification_class(status: NotificationStatus) -> &'static str {
    match status {
        NotificationStatus::Sent => "badge-success",
        NotificationStatus::Scheduled => "badge-warning",
        NotificationStatus::Draft => "badge-muted",
        NotificationStatus::Failed => "badge-destructive",
    }
}

pub fn kind_icon(kind: NotificationKind) -> Icon {
    match kind {
        NotificationKind::Sms => Icon::Message,
        NotificationKind::Email => Icon::Mail,
        NotificationKind::Push => Icon::Bell,
        NotificationKind::All => Icon::Send,
    }
}

pub fn trend_badge(trend: Trend) -> Badge {
    match trend {
        Trend::Up => Badge {
            label: "up",
            icon: Icon::TrendUp,
            class: "text-destructive",
        },
        Trend::Down => Badge {
            label: "down",
            icon: Icon::TrendDown,
            class: "text-success",
        },
        Trend::Stable => Badge {
            label: "stable",
            icon: Icon::Minus,
            class: "text-muted",
        },
    }
}

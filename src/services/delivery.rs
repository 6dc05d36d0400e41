use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;
use tracing::{info, warn};

use crate::data::NotificationKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("{0} gateway unavailable")]
    Unavailable(NotificationKind),
    #[error("Nothing to deliver to")]
    NoRecipients,
}

/// What goes out over each channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub recipients: Vec<String>,
    /// Number of people the recipients stand for, groups expanded.
    pub audience: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryReport {
    pub attempted: u64,
    pub delivered: u64,
}

impl DeliveryReport {
    /// Percentage delivered, rounded to one decimal.
    pub fn rate(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        let rate = self.delivered as f64 * 100.0 / self.attempted as f64;
        (rate * 10.0).round() / 10.0
    }
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn deliver(
        &self,
        channel: NotificationKind,
        delivery: &Delivery,
    ) -> Result<DeliveryReport, DeliveryError>;
}

/// Hands the delivery to every channel its kind covers at once. Fails only
/// when every channel fails.
pub async fn dispatch(
    dispatcher: &dyn Dispatcher,
    delivery: &Delivery,
) -> Result<DeliveryReport, DeliveryError> {
    if delivery.recipients.is_empty() {
        return Err(DeliveryError::NoRecipients);
    }
    let channels = delivery.kind.channels();
    let results = join_all(
        channels
            .iter()
            .map(|channel| dispatcher.deliver(*channel, delivery)),
    )
    .await;

    let mut report = DeliveryReport::default();
    let mut first_error = None;
    for (channel, result) in channels.iter().zip(results) {
        match result {
            Ok(r) => {
                report.attempted += r.attempted;
                report.delivered += r.delivered;
            }
            Err(e) => {
                warn!(%channel, error = %e, "delivery failed");
                report.attempted += delivery.audience;
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if report.delivered == 0 => Err(e),
        _ => Ok(report),
    }
}

/// Writes each delivery to the log instead of a gateway.
pub struct LogDispatcher;

#[async_trait]
impl Dispatcher for LogDispatcher {
    async fn deliver(
        &self,
        channel: NotificationKind,
        delivery: &Delivery,
    ) -> Result<DeliveryReport, DeliveryError> {
        info!(
            %channel,
            title = %delivery.title,
            recipients = ?delivery.recipients,
            audience = delivery.audience,
            "notification delivered"
        );

        Ok(DeliveryReport {
            attempted: delivery.audience,
            delivered: delivery.audience,
        })
    }
}

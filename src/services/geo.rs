use std::time::Duration;

use async_trait::async_trait;
use garde::Validate;
use serde_derive::Deserialize;
use thiserror::Error;

use crate::data::Coordinates;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeoError {
    #[error("Location access denied")]
    Denied,
    #[error("Location services are not available on this device")]
    Unsupported,
    #[error("Location lookup timed out")]
    Timeout,
    #[error("Location unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, GeoError>;
}

/// A position, or the reason there is none, as reported by the browser's
/// geolocation API.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct ClientPosition {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub error: Option<String>,
}

#[async_trait]
impl Geolocator for ClientPosition {
    async fn current_position(&self) -> Result<Coordinates, GeoError> {
        if let Some(error) = &self.error {
            // PositionError codes: 1 denied, 2 unavailable, 3 timeout.
            return Err(match error.trim() {
                "1" | "denied" => GeoError::Denied,
                "3" | "timeout" => GeoError::Timeout,
                "unsupported" => GeoError::Unsupported,
                other => GeoError::Unavailable(other.to_string()),
            });
        }
        let (Some(lat), Some(lng)) = (self.lat, self.lng) else {
            return Err(GeoError::Unsupported);
        };
        let coordinates = Coordinates { lat, lng };
        coordinates
            .validate()
            .map_err(|e| GeoError::Unavailable(e.to_string()))?;

        Ok(coordinates)
    }
}

/// Asks `geolocator` for a position, giving up after `limit`.
pub async fn locate(geolocator: &dyn Geolocator, limit: Duration) -> Result<Coordinates, GeoError> {
    tokio::time::timeout(limit, geolocator.current_position())
        .await
        .map_err(|_| GeoError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stalled;

    #[async_trait]
    impl Geolocator for Stalled {
        async fn current_position(&self) -> Result<Coordinates, GeoError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(GeoError::Unsupported)
        }
    }

    #[tokio::test]
    async fn test_client_position() {
        let found = ClientPosition {
            lat: Some(40.7128),
            lng: Some(-74.006),
            error: None,
        };
        assert_eq!(
            locate(&found, Duration::from_secs(10)).await.unwrap(),
            Coordinates {
                lat: 40.7128,
                lng: -74.006
            }
        );

        let denied = ClientPosition {
            error: Some("1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            locate(&denied, Duration::from_secs(10)).await,
            Err(GeoError::Denied)
        );

        let out_of_range = ClientPosition {
            lat: Some(123.0),
            lng: Some(0.0),
            error: None,
        };
        assert!(matches!(
            locate(&out_of_range, Duration::from_secs(10)).await,
            Err(GeoError::Unavailable(_))
        ));

        assert_eq!(
            locate(&ClientPosition::default(), Duration::from_secs(10)).await,
            Err(GeoError::Unsupported)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_times_out() {
        assert_eq!(
            locate(&Stalled, Duration::from_secs(10)).await,
            Err(GeoError::Timeout)
        );
    }
}

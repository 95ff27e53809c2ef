use std::{sync::RwLock, time::Duration};

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::LocationUnavailableError;

pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Source of the device's current position. Implementations may be denied by
/// the user or fail transiently; callers decide whether to retry.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, LocationUnavailableError>;
}

/// Asks `provider` for a fix, giving up after `timeout`.
pub async fn acquire_fix(
    provider: &dyn LocationProvider,
    timeout: Duration,
) -> Result<Coordinates, LocationUnavailableError> {
    let fix = match tokio::time::timeout(timeout, provider.current_position()).await {
        Ok(result) => result?,
        Err(_) => {
            warn!("location request timed out after {:?}", timeout);
            return Err(LocationUnavailableError::Timeout(timeout));
        }
    };

    if !fix.is_valid() {
        return Err(LocationUnavailableError::Unavailable(format!(
            "provider returned out-of-range coordinates {},{}",
            fix.latitude, fix.longitude
        )));
    }

    Ok(fix)
}

/// Serves a position entered by hand (or passed on the command line).
/// Reports `Denied` until one has been set.
pub struct FixedLocationProvider {
    fix: RwLock<Option<Coordinates>>,
}

impl FixedLocationProvider {
    pub fn new(initial: Option<Coordinates>) -> Self {
        Self {
            fix: RwLock::new(initial),
        }
    }

    pub fn set(&self, fix: Coordinates) {
        info!("manual location set to {},{}", fix.latitude, fix.longitude);
        match self.fix.write() {
            Ok(mut guard) => *guard = Some(fix),
            Err(poisoned) => *poisoned.into_inner() = Some(fix),
        }
    }

    pub fn clear(&self) {
        match self.fix.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn current_position(&self) -> Result<Coordinates, LocationUnavailableError> {
        let fix = match self.fix.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        fix.ok_or(LocationUnavailableError::Denied)
    }
}

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::errors::SdkError;

pub(crate) fn since_epoch(now: SystemTime) -> Result<Duration, SdkError> {
    now.duration_since(UNIX_EPOCH).map_err(|err| {
        tracing::error!(%err, "system clock is set before the unix epoch");
        SdkError::Configuration(format!("system clock is set before the unix epoch: {err}"))
    })
}

pub(crate) fn unix_now() -> Result<u64, SdkError> {
    since_epoch(SystemTime::now()).map(|elapsed| elapsed.as_secs())
}

pub(crate) fn unix_millis() -> Result<u64, SdkError> {
    since_epoch(SystemTime::now())
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

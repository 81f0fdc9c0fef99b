use crate::env::{env_or, RETENTION_BUFFER_LIFETIME_MS_ENV};
use crate::error::OptionsError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifetime used when nothing else is configured: 15 minutes.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(15 * 60);

/// Tunables of a [`RetentionBuffer`](crate::buffer::RetentionBuffer).
///
/// **Fields**
/// - `lifetime`: how long a record stays queryable before the eviction
///   cycle may drop it. Serialized as `lifetime_ms`.
///
/// A replacement can be applied at any time through
/// [`RetentionBuffer::reconfigure`](crate::buffer::RetentionBuffer::reconfigure)
/// or a watch channel passed to
/// [`RetentionBuffer::watch_options`](crate::buffer::RetentionBuffer::watch_options).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionOptions {
    #[serde(rename = "lifetime_ms", with = "millis")]
    pub lifetime: Duration,
}

impl Default for RetentionOptions {
    fn default() -> Self {
        Self {
            lifetime: DEFAULT_LIFETIME,
        }
    }
}

impl RetentionOptions {
    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self { lifetime }
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.lifetime.is_zero() {
            return Err(OptionsError::ZeroLifetime);
        }
        Ok(())
    }

    /// Build options from `RETENTION_BUFFER_LIFETIME_MS`, falling back to
    /// [`DEFAULT_LIFETIME`] when it is not set.
    pub fn from_env() -> Result<Self, OptionsError> {
        let default_ms = DEFAULT_LIFETIME.as_millis().to_string();
        let raw = env_or(RETENTION_BUFFER_LIFETIME_MS_ENV, &default_ms);
        Self::from_millis_str(&raw)
    }

    fn from_millis_str(raw: &str) -> Result<Self, OptionsError> {
        let ms: u64 = raw.trim().parse().map_err(|_| OptionsError::InvalidEnv {
            key: RETENTION_BUFFER_LIFETIME_MS_ENV,
            value: raw.to_string(),
        })?;
        let options = Self::with_lifetime(Duration::from_millis(ms));
        options.validate()?;
        Ok(options)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

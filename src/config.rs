//! Pipeline configuration.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::merge::RoleConflictPolicy;

/// Configuration for a generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Merge associations sharing type and candidate.
    pub merge: bool,
    /// Number of match workers. 1 runs the match phase on the calling thread.
    pub workers: usize,
    /// Version stamp inserted into association names.
    pub version_id: Option<String>,
    /// What to do when merged associations disagree on a member role.
    pub role_conflict: RoleConflictPolicy,
    /// Run the deferred reprocessing pass.
    pub reprocess: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            merge: true,
            workers: 1,
            version_id: None,
            role_conflict: RoleConflictPolicy::default(),
            reprocess: true,
        }
    }
}

impl PipelineConfig {
    /// Upper bound on match workers.
    pub const MAX_WORKERS: usize = 256;

    /// Check the configuration, returning it unchanged if it is usable.
    ///
    /// Workers must be in `1..=MAX_WORKERS`; a version stamp must be
    /// non-empty and free of whitespace.
    pub fn validate(self) -> Result<Self, ConfigurationError> {
        if self.workers == 0 || self.workers > Self::MAX_WORKERS {
            return Err(ConfigurationError::InvalidConfig {
                reason: format!(
                    "workers must be between 1 and {} (got {})",
                    Self::MAX_WORKERS,
                    self.workers
                ),
            });
        }

        if let Some(version) = &self.version_id {
            if version.trim().is_empty() || version.chars().any(char::is_whitespace) {
                return Err(ConfigurationError::InvalidConfig {
                    reason: format!("version_id must be a non-blank token (got {version:?})"),
                });
            }
        }

        Ok(self)
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigurationError::InvalidConfig {
                reason: e.to_string(),
            })?;
        config.validate()
    }

    /// Sets a version stamp taken from the current time.
    #[must_use]
    pub fn with_version_now(mut self) -> Self {
        self.version_id = Some(VersionId::now().into_string());
        self
    }
}

/// Time based version stamp, e.g. `20260101t120000`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    const FORMAT: &'static str = "%Y%m%dt%H%M%S";

    /// Stamp for the current UTC time.
    #[must_use]
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// Stamp for the given time.
    #[must_use]
    pub fn at(time: DateTime<Utc>) -> Self {
        Self(time.format(Self::FORMAT).to_string())
    }

    /// The stamp as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the stamp, returning its text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

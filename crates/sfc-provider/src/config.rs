//! Provider configuration

use crate::error::{SfcError, SfcResult};
use serde::{Deserialize, Serialize};

/// Highest path ID representable in a 24-bit service path header field
pub const MAX_PATH_ID: u32 = (1 << 24) - 1;

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProviderConfig {
    /// Maximum commands running at once
    pub worker_limit: usize,
    /// Lowest allocatable path ID
    pub path_id_min: u32,
    /// Highest allocatable path ID
    pub path_id_max: u32,
    /// Suffix appended to a forward path name to name its reverse path
    pub reverse_path_suffix: String,
    /// Starting index assumed for hops of paths without one
    pub default_starting_index: u8,
}

impl ProviderConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    ///
    /// Missing keys take their default values.
    ///
    /// # Errors
    /// - `SfcError::Config` on malformed TOML or invalid values
    pub fn from_toml_str(source: &str) -> SfcResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// With worker limit
    #[inline]
    #[must_use]
    pub fn with_worker_limit(mut self, limit: usize) -> Self {
        self.worker_limit = limit;
        self
    }

    /// With allocatable path ID range
    #[inline]
    #[must_use]
    pub fn with_path_id_range(mut self, min: u32, max: u32) -> Self {
        self.path_id_min = min;
        self.path_id_max = max;
        self
    }

    /// With reverse path suffix
    #[inline]
    #[must_use]
    pub fn with_reverse_path_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.reverse_path_suffix = suffix.into();
        self
    }

    /// Check value constraints
    ///
    /// # Errors
    /// - `SfcError::Config` describing the first violated constraint
    pub fn validate(&self) -> SfcResult<()> {
        if self.worker_limit == 0 {
            return Err(SfcError::Config("worker-limit must be positive".to_string()));
        }
        if self.path_id_min > self.path_id_max {
            return Err(SfcError::Config(format!(
                "path-id-min {} exceeds path-id-max {}",
                self.path_id_min, self.path_id_max
            )));
        }
        if self.path_id_max > MAX_PATH_ID {
            return Err(SfcError::Config(format!(
                "path-id-max {} exceeds {MAX_PATH_ID}",
                self.path_id_max
            )));
        }
        if self.reverse_path_suffix.is_empty() {
            return Err(SfcError::Config(
                "reverse-path-suffix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            worker_limit: 16,
            path_id_min: 1,
            path_id_max: MAX_PATH_ID,
            reverse_path_suffix: "-Reverse".to_string(),
            default_starting_index: 255,
        }
    }
}

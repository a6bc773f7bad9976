//! Settings
//!
//! Loaded from YAML, every field optional:
//!
//! ```yaml
//! max_tries:
//!   write_only: 4
//!   write_read: 10
//!   multi_part_read: 8
//! sleep:
//!   multiplier_factor: 1.0
//!   dynamic_adjustment: true
//!   suppress_optional: false
//!   deferred: true
//! ```

use crate::error::{DdcError, Result};
use crate::retry::validate_max_tries;
use crate::sleep::validate_multiplier_factor;
use crate::types::RetryClass;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DdcSettings {
    pub max_tries: MaxTriesSettings,
    pub sleep: SleepSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaxTriesSettings {
    pub write_only: u16,
    pub write_read: u16,
    pub multi_part_read: u16,
}

impl Default for MaxTriesSettings {
    fn default() -> Self {
        Self {
            write_only: RetryClass::WriteOnly.default_max_tries(),
            write_read: RetryClass::WriteRead.default_max_tries(),
            multi_part_read: RetryClass::MultiPartRead.default_max_tries(),
        }
    }
}

impl MaxTriesSettings {
    pub fn get(&self, class: RetryClass) -> u16 {
        match class {
            RetryClass::WriteOnly => self.write_only,
            RetryClass::WriteRead => self.write_read,
            RetryClass::MultiPartRead => self.multi_part_read,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SleepSettings {
    /// Global factor applied to every sleep, in (0, 100).
    pub multiplier_factor: f64,
    /// Let each thread's error rate raise its sleeps.
    pub dynamic_adjustment: bool,
    /// Skip the sleeps marked suppressible.
    pub suppress_optional: bool,
    /// Record deferrable sleeps as deadlines instead of blocking.
    pub deferred: bool,
}

impl Default for SleepSettings {
    fn default() -> Self {
        Self { multiplier_factor: 1.0, dynamic_adjustment: true, suppress_optional: false, deferred: true }
    }
}

impl DdcSettings {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| DdcError::config(format!("settings deserialization: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads and validates a settings file.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Reading settings from {}", path.display()))?;
        Self::from_yaml_str(&yaml)
            .with_context(|| format!("Loading settings from {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        for class in RetryClass::ALL {
            validate_max_tries(self.max_tries.get(class)).map_err(|_| {
                DdcError::config(format!(
                    "max_tries.{} = {} outside 1..=99",
                    class.name().replace('-', "_"),
                    self.max_tries.get(class)
                ))
            })?;
        }
        validate_multiplier_factor(self.sleep.multiplier_factor)?;
        Ok(())
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml_ng::to_string(self)
            .map_err(|e| DdcError::config(format!("settings serialization: {e}")))
    }
}

//! Machine configuration.

use crate::core::{MachineError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_HISTORY_LIMIT: usize = 256;
pub const DEFAULT_MAX_AUTO_ADVANCE: usize = 1024;

/// Per-machine options.
///
/// Options can be built fluently or loaded from JSON; missing fields take
/// their defaults.
///
/// ```rust
/// use turnstile::MachineOptions;
///
/// let options = MachineOptions::from_json(r#"{ "name": "door", "auto_advance": true }"#).unwrap();
/// assert_eq!(options.name, "door");
/// assert!(options.auto_advance);
/// assert!(!options.trigger_scheduler);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineOptions {
    /// Name used in logs and events.
    pub name: String,

    /// Chain through passive transitions after every successful transition.
    pub auto_advance: bool,

    /// Deliver trigger trips on a dedicated worker thread.
    pub trigger_scheduler: bool,

    /// Run effects and do-behaviors on a dedicated worker thread.
    pub effect_scheduler: bool,

    /// Route history capacity; zero keeps every record.
    pub history_limit: usize,

    /// Upper bound on transitions chained by a single auto-advance run.
    pub max_auto_advance: usize,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            name: "machine".to_string(),
            auto_advance: false,
            trigger_scheduler: false,
            effect_scheduler: false,
            history_limit: DEFAULT_HISTORY_LIMIT,
            max_auto_advance: DEFAULT_MAX_AUTO_ADVANCE,
        }
    }
}

impl MachineOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn auto_advance(mut self, enabled: bool) -> Self {
        self.auto_advance = enabled;
        self
    }

    pub fn trigger_scheduler(mut self, enabled: bool) -> Self {
        self.trigger_scheduler = enabled;
        self
    }

    pub fn effect_scheduler(mut self, enabled: bool) -> Self {
        self.effect_scheduler = enabled;
        self
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn max_auto_advance(mut self, limit: usize) -> Self {
        self.max_auto_advance = limit;
        self
    }

    /// Parse options from a JSON document and validate them.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| MachineError::InvalidConfig(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(MachineError::InvalidConfig(
                "machine name must not be empty".to_string(),
            ));
        }
        if self.max_auto_advance == 0 {
            return Err(MachineError::InvalidConfig(
                "max_auto_advance must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

//! Agent configuration.
//!
//! Adds the character sheet and perception tuning on top of the core
//! [`ReverieConfig`]. Everything lives in one TOML file:
//!
//! ```toml
//! [character]
//! name = "Isabella Rodriguez"
//! identity = "Isabella Rodriguez is a cafe owner of Hobbs Cafe."
//!
//! [perception]
//! retention = 5
//! bandwidth = 3
//!
//! [reflection]
//! importance_threshold_max = 150
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use reverie_core::{ReverieConfig, ReverieError};

/// Who the character is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSheet {
    /// Full name, used in thought prefixes and as the persistence key.
    #[serde(default)]
    pub name: String,
    /// Short identity paragraph given to the language model.
    #[serde(default)]
    pub identity: String,
}

/// How much of the world a character takes in per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionConfig {
    /// How many recent event triples count as "already perceived".
    #[serde(default = "default_retention")]
    pub retention: usize,
    /// Maximum perceptions ingested per tick, nearest first.
    #[serde(default = "default_bandwidth")]
    pub bandwidth: usize,
    /// Length of one simulation step in seconds.
    #[serde(default = "default_step_seconds")]
    pub step_seconds: i64,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
            bandwidth: default_bandwidth(),
            step_seconds: default_step_seconds(),
        }
    }
}

fn default_retention() -> usize { 5 }
fn default_bandwidth() -> usize { 3 }
fn default_step_seconds() -> i64 { 10 }

/// Full configuration for one character.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// The character sheet.
    #[serde(default)]
    pub character: CharacterSheet,
    /// Perception tuning.
    #[serde(default)]
    pub perception: PerceptionConfig,
    /// Memory, retrieval, reflection, LLM and persistence settings.
    #[serde(flatten)]
    pub core: ReverieConfig,
}

impl AgentConfig {
    /// Parse from a TOML string.
    ///
    /// # Errors
    ///
    /// [`ReverieError::Config`] on malformed TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self, ReverieError> {
        toml::from_str(toml_str).map_err(|e| ReverieError::Config(e.to_string()))
    }

    /// Load from a TOML file.
    ///
    /// # Errors
    ///
    /// [`ReverieError::Io`] if the file cannot be read, or
    /// [`ReverieError::Config`] on malformed TOML.
    pub fn from_file(path: &Path) -> Result<Self, ReverieError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }
}

// ---------------------------------------------------------------------------
// Tick Budget Tracking
// ---------------------------------------------------------------------------

/// Wall-clock time spent in each phase of one tick.
///
/// Reflection and distillation wait on the Cognition Service, so the
/// budget only flags ticks worth looking at; nothing is cut short.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickTimings {
    /// Perception ingestion.
    pub perceive_us: u64,
    /// Reflection trigger check and pass.
    pub reflect_us: u64,
    /// Conversation distillation.
    pub distill_us: u64,
}

impl TickTimings {
    /// Total microseconds across phases.
    #[must_use]
    pub fn total_us(&self) -> u64 {
        self.perceive_us
            .saturating_add(self.reflect_us)
            .saturating_add(self.distill_us)
    }

    /// Whether the tick stayed within `budget`.
    #[must_use]
    pub fn within(&self, budget: Duration) -> bool {
        u128::from(self.total_us()) <= budget.as_micros()
    }
}

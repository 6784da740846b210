//! Scheduler configuration
//!
//! Controls how the synthesizer breaks ties between conflicting transactions
//! that have no declared priority order. Supports environment-based overrides
//! so harnesses can flip modes without code changes.

use serde::{Deserialize, Serialize};

/// Tie-break mode for conflicting transactions with no declared order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TieBreak {
    /// Static order: earlier-defined transactions win
    #[default]
    DefinitionOrder,
    /// Rotating order: a one-hot pointer register advances every cycle so no
    /// transaction in a conflict component is starved forever
    RoundRobin,
}

/// Configuration for the scheduler synthesizer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Tie-break mode between unordered conflicting transactions
    pub tie_break: TieBreak,
}

impl SchedulerConfig {
    /// Configuration with the given tie-break mode
    pub fn with_tie_break(tie_break: TieBreak) -> Self {
        Self { tie_break }
    }

    /// Load configuration from the environment
    ///
    /// `TRANSACTRON_TIEBREAK` may be set to `definition-order` or
    /// `round-robin`; unset or unrecognized values fall back to the default.
    pub fn load_from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = std::env::var("TRANSACTRON_TIEBREAK") {
            match val.as_str() {
                "round-robin" => config.tie_break = TieBreak::RoundRobin,
                "definition-order" => config.tie_break = TieBreak::DefinitionOrder,
                other => {
                    tracing::warn!(value = other, "unrecognized TRANSACTRON_TIEBREAK, using default");
                }
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tie_break_is_definition_order() {
        assert_eq!(SchedulerConfig::default().tie_break, TieBreak::DefinitionOrder);
    }

    #[test]
    fn round_trips_through_json() {
        let config = SchedulerConfig::with_tie_break(TieBreak::RoundRobin);
        let json = serde_json::to_string(&config).unwrap();
        let back: SchedulerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tie_break, TieBreak::RoundRobin);
    }
}

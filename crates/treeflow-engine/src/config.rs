//! Engine configuration.
//!
//! Reads optional overrides from environment variables:
//! - `TREEFLOW_RECORD_EVENTS`: keep the graph event log (default: "true")
//! - `TREEFLOW_VALIDATE_PORTS`: check delivered values against declared
//!   port kinds before recompute (default: "true")
//! - `TREEFLOW_MAX_EVENTS`: event log capacity (default: "4096")

use std::env;
use std::str::FromStr;

/// Configuration for a [`Graph`](crate::graph::Graph).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whether to record [`GraphEvent`](crate::event::GraphEvent)s.
    pub record_events: bool,
    /// Whether to fail a node whose bound inputs don't conform to the
    /// declared port kinds.
    pub validate_port_values: bool,
    /// Maximum retained events; the oldest are dropped first.
    pub max_event_log: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            record_events: true,
            validate_port_values: true,
            max_event_log: 4096,
        }
    }
}

impl EngineConfig {
    /// Builds a config from the process environment, falling back to the
    /// defaults for absent or unparsable variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = EngineConfig::default();
        EngineConfig {
            record_events: parse_or(&lookup, "TREEFLOW_RECORD_EVENTS", defaults.record_events),
            validate_port_values: parse_or(
                &lookup,
                "TREEFLOW_VALIDATE_PORTS",
                defaults.validate_port_values,
            ),
            max_event_log: parse_or(&lookup, "TREEFLOW_MAX_EVENTS", defaults.max_event_log),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

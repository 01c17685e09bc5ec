//! Explainer configuration
//!
//! Environment Variables:
//! - `PLANLENS_COST_SOURCE` - `actual` (default) or `estimated`
//! - `PLANLENS_JOIN_ALTERNATES` - `+`-joined capabilities per alternate, comma
//!   separated (default: each join capability on its own)
//! - `PLANLENS_SCAN_ALTERNATES` - same, for scan capabilities

use std::env;

use thiserror::Error;

use crate::plan::CostSource;
use crate::source::CapabilitySet;

pub const ENV_COST_SOURCE: &str = "PLANLENS_COST_SOURCE";
pub const ENV_JOIN_ALTERNATES: &str = "PLANLENS_JOIN_ALTERNATES";
pub const ENV_SCAN_ALTERNATES: &str = "PLANLENS_SCAN_ALTERNATES";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: &'static str, message: String },
}

/// Settings for one explain run
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainConfig {
    pub cost_source: CostSource,
    /// Capability combinations disabled to obtain join alternates
    pub join_alternates: Vec<CapabilitySet>,
    /// Capability combinations disabled to obtain scan alternates
    pub scan_alternates: Vec<CapabilitySet>,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            cost_source: CostSource::default(),
            join_alternates: CapabilitySet::join_alternatives(),
            scan_alternates: CapabilitySet::scan_alternatives(),
        }
    }
}

impl ExplainConfig {
    /// Read configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_COST_SOURCE) {
            config.cost_source = value.parse().map_err(|message| ConfigError::InvalidValue {
                var: ENV_COST_SOURCE,
                message,
            })?;
        }
        if let Some(value) = lookup(ENV_JOIN_ALTERNATES) {
            config.join_alternates = parse_sets(ENV_JOIN_ALTERNATES, &value)?;
        }
        if let Some(value) = lookup(ENV_SCAN_ALTERNATES) {
            config.scan_alternates = parse_sets(ENV_SCAN_ALTERNATES, &value)?;
        }

        Ok(config)
    }

    pub fn with_cost_source(mut self, cost_source: CostSource) -> Self {
        self.cost_source = cost_source;
        self
    }
}

fn parse_sets(var: &'static str, value: &str) -> Result<Vec<CapabilitySet>, ConfigError> {
    value
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            part.parse::<CapabilitySet>()
                .map_err(|message| ConfigError::InvalidValue { var, message })
        })
        .collect()
}

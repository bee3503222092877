//! Shared configuration for Chisel
//!
//! This crate provides the single source of truth for the tuning values the
//! sculpting engine reads: tree leaf limits, parallel granularity and the
//! dynamic-topology detail size. Values come from the defaults below, a JSON
//! document, or `CHISEL_*` environment overrides.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[cfg(feature = "bevy")]
use bevy::prelude::Resource;

/// Default maximum number of faces in a mesh or grids leaf
pub const DEFAULT_LEAF_LIMIT: usize = 10_000;

/// Default maximum number of triangles in a dynamic-topology leaf
pub const DEFAULT_DYNTOPO_LEAF_LIMIT: usize = 400;

/// Default minimum number of nodes a parallel task processes
pub const DEFAULT_PARALLEL_GRAIN: usize = 1;

/// Default target edge length for dynamic topology, in object units
pub const DEFAULT_DYNTOPO_DETAIL_SIZE: f32 = 0.05;

/// Shortest edge kept by dynamic topology, relative to the detail size
pub const DEFAULT_DYNTOPO_COLLAPSE_RATIO: f32 = 0.4;

pub const ENV_LEAF_LIMIT: &str = "CHISEL_LEAF_LIMIT";
pub const ENV_DYNTOPO_LEAF_LIMIT: &str = "CHISEL_DYNTOPO_LEAF_LIMIT";
pub const ENV_PARALLEL_GRAIN: &str = "CHISEL_PARALLEL_GRAIN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{var}={value} is not a valid value")]
    InvalidEnv { var: &'static str, value: String },

    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },
}

/// Tuning values for tree construction and brush evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "bevy", derive(Resource))]
#[serde(default)]
pub struct SculptConfig {
    /// Maximum faces per mesh leaf; grids leaves divide it by the grid area
    pub leaf_limit: usize,
    /// Maximum triangles per dynamic-topology leaf
    pub dyntopo_leaf_limit: usize,
    /// Minimum nodes per parallel task
    pub parallel_grain: usize,
    /// Edges longer than this are split during dynamic-topology strokes
    pub dyntopo_detail_size: f32,
    /// Edges shorter than `detail_size * ratio` are collapsed
    pub dyntopo_collapse_ratio: f32,
}

impl Default for SculptConfig {
    fn default() -> Self {
        Self {
            leaf_limit: DEFAULT_LEAF_LIMIT,
            dyntopo_leaf_limit: DEFAULT_DYNTOPO_LEAF_LIMIT,
            parallel_grain: DEFAULT_PARALLEL_GRAIN,
            dyntopo_detail_size: DEFAULT_DYNTOPO_DETAIL_SIZE,
            dyntopo_collapse_ratio: DEFAULT_DYNTOPO_COLLAPSE_RATIO,
        }
    }
}

impl SculptConfig {
    /// Parse and validate a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Defaults with `CHISEL_*` environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from any variable lookup
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let parse = |var: &'static str| -> Result<Option<usize>, ConfigError> {
            lookup(var)
                .map(|value| {
                    value
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| ConfigError::InvalidEnv { var, value })
                })
                .transpose()
        };

        if let Some(value) = parse(ENV_LEAF_LIMIT)? {
            self.leaf_limit = value;
        }
        if let Some(value) = parse(ENV_DYNTOPO_LEAF_LIMIT)? {
            self.dyntopo_leaf_limit = value;
        }
        if let Some(value) = parse(ENV_PARALLEL_GRAIN)? {
            self.parallel_grain = value;
        }
        self.validate()?;
        debug!("sculpt config: {:?}", self);
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("leaf_limit", self.leaf_limit),
            ("dyntopo_leaf_limit", self.dyntopo_leaf_limit),
            ("parallel_grain", self.parallel_grain),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ConfigError::NotPositive { field, value: 0.0 });
            }
        }
        let lengths = [
            ("dyntopo_detail_size", self.dyntopo_detail_size),
            ("dyntopo_collapse_ratio", self.dyntopo_collapse_ratio),
        ];
        for (field, value) in lengths {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::NotPositive {
                    field,
                    value: value as f64,
                });
            }
        }
        Ok(())
    }

    /// Edges longer than this are split
    pub fn dyntopo_max_edge_len(&self) -> f32 {
        self.dyntopo_detail_size
    }

    /// Edges shorter than this are collapsed
    pub fn dyntopo_min_edge_len(&self) -> f32 {
        self.dyntopo_detail_size * self.dyntopo_collapse_ratio
    }
}

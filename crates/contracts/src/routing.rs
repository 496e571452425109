//! Routing contracts: modes and the pluggable key hash

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Strategy used to pick a shard for one submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// `hash(key) mod shard_count`; same key, same shard
    #[default]
    Hash,
    /// Strict rotation over all shards, ignoring the key
    RoundRobin,
}

impl RoutingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::RoundRobin => "round_robin",
        }
    }
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "hash" => Ok(Self::Hash),
            "round_robin" | "rr" => Ok(Self::RoundRobin),
            other => Err(format!("unknown routing mode: {other}")),
        }
    }
}

/// Key hash used by hash routing
///
/// Must be deterministic: the same key always yields the same value.
pub type HashFn = Arc<dyn Fn(&str) -> u32 + Send + Sync>;

// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Runtime knobs for the selection primitives.
//!
//! Values come from the environment (`SPIRAL_SELECT_*`, `SPIRAL_DETERMINISTIC`)
//! or from a JSON document produced by the layered SpiralTorch config. Missing
//! keys fall back to the defaults below.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{config as config_err, Result};
use crate::ops::kselect::StrategyKind;

pub const DEFAULT_PIVOT_SEQUENCE_LEN: usize = 1024;
pub const DEFAULT_COMPACTION_MAX_GROUPS: usize = 256;
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 1 << 15;
const DEFAULT_BASE_SEED: u64 = 42;

/// Selection runtime configuration snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SelectConfig {
    /// Explicit seed for the Quick-Select pivot sequence.
    pub seed: Option<u64>,
    /// Sequential row processing and label-derived seeds.
    pub deterministic: bool,
    /// Length of the cyclic uniform sequence used to draw pivots.
    pub pivot_sequence_len: usize,
    /// Bypass the capacity decision tree.
    pub force_strategy: Option<StrategyKind>,
    /// Upper bound on compaction groups (the prefix-sum phase runs in one group).
    pub compaction_max_groups: usize,
    /// Size of a dedicated worker pool; `None` uses the global rayon pool.
    pub threads: Option<usize>,
    /// Element count below which rows are processed sequentially.
    pub parallel_threshold: usize,
}

impl Default for SelectConfig {
    fn default() -> Self {
        Self {
            seed: None,
            deterministic: false,
            pivot_sequence_len: DEFAULT_PIVOT_SEQUENCE_LEN,
            force_strategy: None,
            compaction_max_groups: DEFAULT_COMPACTION_MAX_GROUPS,
            threads: None,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl SelectConfig {
    /// Builds a configuration snapshot from environment variables.
    ///
    /// Unparsable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let deterministic = std::env::var("SPIRAL_DETERMINISTIC")
            .ok()
            .map(|v| !matches!(v.as_str(), "0" | "false" | "False" | "off" | "OFF"))
            .unwrap_or(false);

        Self {
            seed: env_parse::<u64>("SPIRAL_SELECT_SEED"),
            deterministic,
            pivot_sequence_len: env_parse::<usize>("SPIRAL_SELECT_PIVOTS")
                .filter(|len| *len > 0)
                .unwrap_or(defaults.pivot_sequence_len),
            force_strategy: std::env::var("SPIRAL_SELECT_STRATEGY")
                .ok()
                .and_then(|raw| StrategyKind::parse(&raw)),
            compaction_max_groups: env_parse::<usize>("SPIRAL_SELECT_COMPACT_GROUPS")
                .unwrap_or(defaults.compaction_max_groups),
            threads: env_parse::<usize>("SPIRAL_SELECT_THREADS").filter(|n| *n > 0),
            parallel_threshold: env_parse::<usize>("SPIRAL_SELECT_PARALLEL_MIN")
                .unwrap_or(defaults.parallel_threshold),
        }
    }

    /// Reads the `select` table of a merged configuration document, or the
    /// document itself when it has no such table.
    pub fn from_json(value: &Value) -> Result<Self> {
        let section = value.get("select").unwrap_or(value);
        let cfg: SelectConfig = serde_json::from_value(section.clone())
            .map_err(|e| config_err(&format!("select config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pivot_sequence_len == 0 {
            return Err(config_err("pivot_sequence_len must be positive"));
        }
        if self.compaction_max_groups == 0 {
            return Err(config_err("compaction_max_groups must be positive"));
        }
        if self.threads == Some(0) {
            return Err(config_err("threads must be positive when set"));
        }
        Ok(())
    }

    /// Derives a seed for a component label from the base seed.
    pub fn seed_for<L: Hash>(&self, label: L) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.seed.unwrap_or(DEFAULT_BASE_SEED).hash(&mut hasher);
        label.hash(&mut hasher);
        hasher.finish()
    }

    /// Random source for a component. An explicit seed or deterministic mode
    /// yields a reproducible stream, otherwise the OS entropy pool is used.
    pub fn rng_for(&self, label: &str) -> StdRng {
        if self.deterministic {
            StdRng::seed_from_u64(self.seed_for(label))
        } else if let Some(seed) = self.seed {
            StdRng::seed_from_u64(seed)
        } else {
            StdRng::from_entropy()
        }
    }

    /// Whether rows must be processed in a fixed sequential order.
    pub fn lock_row_order(&self) -> bool {
        self.deterministic
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

static CONFIG: OnceLock<SelectConfig> = OnceLock::new();

/// Returns the lazily captured environment configuration.
pub fn global() -> &'static SelectConfig {
    CONFIG.get_or_init(SelectConfig::from_env)
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Execution queue handed to every primitive.
//!
//! A queue pairs the device description with a configuration snapshot and the
//! worker pool that runs the row kernels. Work submitted through
//! [`ComputeQueue::install`] has completed when the call returns, so stages
//! chained on one queue observe each other's writes in program order.

use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::backend::device_caps::DeviceCaps;
use crate::backend::group::SubGroup;
use crate::config::{self, SelectConfig};
use crate::error::{device as dev_err, Result};

#[derive(Clone)]
pub struct ComputeQueue {
    caps: DeviceCaps,
    config: SelectConfig,
    pool: Option<Arc<ThreadPool>>,
}

impl std::fmt::Debug for ComputeQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeQueue")
            .field("caps", &self.caps)
            .field("config", &self.config)
            .field("dedicated_pool", &self.pool.is_some())
            .finish()
    }
}

impl ComputeQueue {
    /// Host queue using the environment configuration.
    pub fn cpu() -> Result<Self> {
        Self::with_config(DeviceCaps::host(), config::global().clone())
    }

    /// Queue for the given device using the environment configuration.
    pub fn new(caps: DeviceCaps) -> Result<Self> {
        Self::with_config(caps, config::global().clone())
    }

    pub fn with_config(caps: DeviceCaps, config: SelectConfig) -> Result<Self> {
        config.validate()?;
        let pool = match config.threads {
            Some(threads) => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("st-select-{i}"))
                    .build()
                    .map_err(|e| dev_err(&format!("thread pool: {e}")))?;
                debug!(target: "st_select::queue", threads, "dedicated worker pool ready");
                Some(Arc::new(pool))
            }
            None => None,
        };
        Ok(Self { caps, config, pool })
    }

    #[inline]
    pub fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    #[inline]
    pub fn config(&self) -> &SelectConfig {
        &self.config
    }

    /// Execution group that serves one row on this device.
    #[inline]
    pub fn group(&self) -> SubGroup {
        SubGroup::new(self.caps.group_width())
    }

    /// Whether a problem of `elements` should be split across workers.
    pub fn should_parallelize(&self, elements: usize) -> bool {
        if self.config.lock_row_order() {
            return false;
        }
        let threads = match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        };
        threads > 1 && elements >= self.config.parallel_threshold
    }

    /// Runs `op` on this queue's workers and waits for it.
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

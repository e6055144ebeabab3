// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Row-wise k-selection and stream compaction.
//!
//! `KSelect` picks the `k` smallest (or largest) entries of every row of a
//! score matrix, choosing between a single-column reduction, SIMD insertion
//! lists, bounded heaps and a randomized Quick-Select from `k` and the
//! device's group capacities. `SelectFlagged` extracts flagged elements in
//! their original order with a three-phase scan. Both run on a
//! `ComputeQueue`, which pairs device capabilities with the runtime config
//! and a rayon worker pool.

pub mod backend;
pub mod config;
pub mod dtype;
pub mod error;
pub mod ops;
pub mod telemetry;

pub use backend::device_caps::{BackendKind, DeviceCaps};
pub use backend::group::SubGroup;
pub use backend::queue::ComputeQueue;
pub use config::SelectConfig;
pub use dtype::SelectFloat;
pub use error::{Error, Result};
pub use ops::compact::{select_flagged, select_flagged_index, Flag, SelectFlagged};
pub use ops::kselect::{
    choose_strategy, kselect, kselect_sq_l2, KSelect, SelectOrder, StrategyKind,
};
pub use ops::partition::kernel_row_partitioning;
pub use ops::radix::{radix_sort_by_key, radix_sort_rows_by_key, sort_pairs_by_key};
pub use ops::view::{row_major_view, row_major_view_mut, RowSource};

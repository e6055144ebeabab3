// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::fmt;
use std::mem::size_of;

use once_cell::sync::OnceCell;

/// Sub-group widths the SIMD insertion-list selector is instantiated for.
pub const SIMD_WIDTHS: [u32; 5] = [8, 16, 32, 64, 128];

/// Upper bound on emulated lanes per execution group.
pub const MAX_LANES: usize = 128;

/// Local memory assumed when a backend does not advertise a budget.
pub const DEFAULT_LOCAL_MEM: u32 = 32 * 1024;

/// Enumerates the backends that can host the selection kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// WebGPU / WGPU backend.
    Wgpu,
    /// CUDA backend.
    Cuda,
    /// ROCm HIP backend.
    Hip,
    /// CPU fallback.
    Cpu,
}

/// Minimal capability description shared across backends.
///
/// Only the knobs that influence strategy selection and group sizing are
/// kept: the sub-group width bounds the SIMD insertion lists, the local memory
/// budget bounds the per-row heaps.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DeviceCaps {
    /// Backend discriminator.
    pub backend: BackendKind,
    /// Whether the backend exposes sub-group collectives natively.
    pub subgroup: bool,
    /// Native lane width for sub-group operations.
    pub lane_width: u32,
    /// Maximum work-group size that the backend can launch.
    pub max_workgroup: u32,
    /// Optional shared memory available per work-group (bytes).
    pub shared_mem_per_workgroup: Option<u32>,
}

impl fmt::Debug for DeviceCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCaps")
            .field("backend", &self.backend)
            .field("subgroup", &self.subgroup)
            .field("lane_width", &self.lane_width)
            .field("max_workgroup", &self.max_workgroup)
            .field("shared_mem_per_workgroup", &self.shared_mem_per_workgroup)
            .finish()
    }
}

impl DeviceCaps {
    fn new(backend: BackendKind, lane_width: u32) -> Self {
        Self {
            backend,
            subgroup: false,
            lane_width: lane_width.clamp(1, MAX_LANES as u32),
            max_workgroup: 1,
            shared_mem_per_workgroup: None,
        }
    }

    /// WebGPU/WGPU capabilities.
    pub fn wgpu(lane_width: u32, subgroup: bool, max_workgroup: u32) -> Self {
        Self {
            subgroup,
            max_workgroup: max_workgroup.max(1),
            ..Self::new(BackendKind::Wgpu, lane_width)
        }
    }

    /// CUDA capabilities.
    pub fn cuda(lane_width: u32, max_block: u32, shared_mem_per_block: Option<u32>) -> Self {
        Self {
            subgroup: true,
            max_workgroup: max_block.max(1),
            shared_mem_per_workgroup: shared_mem_per_block,
            ..Self::new(BackendKind::Cuda, lane_width)
        }
    }

    /// HIP capabilities.
    pub fn hip(lane_width: u32, max_block: u32, shared_mem_per_block: Option<u32>) -> Self {
        Self {
            subgroup: true,
            max_workgroup: max_block.max(1),
            shared_mem_per_workgroup: shared_mem_per_block,
            ..Self::new(BackendKind::Hip, lane_width)
        }
    }

    /// CPU fallback capabilities. Eight lanes match one 256-bit register of f32.
    pub fn cpu() -> Self {
        Self {
            max_workgroup: 128,
            ..Self::new(BackendKind::Cpu, 8)
        }
    }

    /// CPU capabilities probed once per process.
    pub fn host() -> Self {
        static HOST: OnceCell<DeviceCaps> = OnceCell::new();
        *HOST.get_or_init(|| {
            let mut caps = Self::cpu();
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            {
                if is_x86_feature_detected!("avx512f") {
                    caps.lane_width = 16;
                }
            }
            caps.subgroup = caps.lane_width > 1;
            caps
        })
    }

    /// Builder style helper to override the lane width.
    pub fn with_lane_width(mut self, lane_width: u32) -> Self {
        self.lane_width = lane_width.clamp(1, MAX_LANES as u32);
        self
    }

    /// Builder style helper to override the maximum workgroup size.
    pub fn with_max_workgroup(mut self, max_workgroup: u32) -> Self {
        self.max_workgroup = max_workgroup.max(1);
        self
    }

    /// Builder style helper to override the shared memory budget.
    pub fn with_shared_mem(mut self, shared_mem: Option<u32>) -> Self {
        self.shared_mem_per_workgroup = shared_mem;
        self
    }

    /// Width of the cooperating execution group that serves one row.
    pub fn group_width(&self) -> usize {
        (self.lane_width.max(1) as usize).min(MAX_LANES)
    }

    /// Largest SIMD insertion-list width this device can launch.
    pub fn max_simd_width(&self) -> u32 {
        SIMD_WIDTHS
            .into_iter()
            .filter(|w| *w <= self.max_workgroup.max(SIMD_WIDTHS[0]))
            .last()
            .unwrap_or(SIMD_WIDTHS[0])
    }

    /// SIMD width serving `k` candidates per lane: the native lane width when
    /// it is a supported width holding `k`, else the smallest supported width
    /// that does.
    pub fn simd_width_for(&self, k: u32) -> Option<u32> {
        let max = self.max_simd_width();
        let native = self.lane_width;
        if k <= native && native <= max && SIMD_WIDTHS.contains(&native) {
            return Some(native);
        }
        SIMD_WIDTHS.into_iter().find(|w| *w >= k && *w <= max)
    }

    /// Local memory budget per work-group in bytes.
    pub fn local_mem_bytes(&self) -> u32 {
        self.shared_mem_per_workgroup.unwrap_or(DEFAULT_LOCAL_MEM)
    }

    /// Exclusive lower bound on `k` for the heap selector.
    pub fn heap_min_k(&self) -> u32 {
        self.max_simd_width()
    }

    /// Exclusive upper bound on `k` for the heap selector: the number of
    /// `(value, index)` pairs that fit the local memory budget, minus the
    /// reserve slot.
    pub fn heap_max_k(&self, value_size: usize) -> u32 {
        let pair = (value_size + size_of::<i32>()).max(1) as u32;
        (self.local_mem_bytes() / pair).saturating_sub(1)
    }

    /// Work-group size for the compaction scan and reorder phases.
    pub fn compaction_group(&self) -> usize {
        let lanes = self.group_width() as u32;
        let target = if self.subgroup { lanes * 8 } else { lanes * 4 };
        target.clamp(lanes, self.max_workgroup.max(lanes)).min(256) as usize
    }
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self::cpu()
    }
}

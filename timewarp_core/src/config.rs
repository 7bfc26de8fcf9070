// Copyright 2026 the Timewarp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pipeline configuration.
//!
//! All configuration is plain `Copy` data with `const` presets, fixed at
//! construction. Nothing here is read from the environment.

use crate::fixed::FixedFormat;
use crate::pose::PoseRecord;
use crate::softfloat::Float32;

/// What the consumer writes when a viewport's warp cannot be computed this
/// frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StalePolicy {
    /// Do not touch the registers. The previously latched warp stays active.
    #[default]
    SkipLatch,
    /// Latch the viewport's last successfully computed coefficients again
    /// (identity if none were ever computed for this job).
    LatchPrevious,
}

/// Numeric parameters of the warp solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReprojectionConfig {
    /// `|det|` below this rejects a 4×4 inversion as singular.
    pub singular_epsilon: Float32,
    /// Register format of the output coefficients.
    pub output_format: FixedFormat,
    /// Behavior when solving fails.
    pub stale_policy: StalePolicy,
}

impl ReprojectionConfig {
    /// Q1.30 output, the `0x322bcc77` singularity threshold, skip on failure.
    pub const DEFAULT: Self = Self {
        singular_epsilon: Float32::EPSILON,
        output_format: FixedFormat::Q1_30,
        stale_policy: StalePolicy::SkipLatch,
    };

    /// Returns a copy with a different failure policy.
    #[must_use]
    pub const fn with_stale_policy(mut self, stale_policy: StalePolicy) -> Self {
        self.stale_policy = stale_policy;
        self
    }
}

impl Default for ReprojectionConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Per-unit pipeline parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Upper bound on live jobs per unit. Job creation beyond it fails with
    /// out-of-memory. One queued, one in flight and one being built while
    /// the queued one is still linked needs 3.
    pub max_live_jobs: usize,
    /// Solver parameters.
    pub reprojection: ReprojectionConfig,
}

impl PipelineConfig {
    /// Budget of three jobs per unit with the default solver parameters.
    pub const DEFAULT: Self = Self {
        max_live_jobs: 3,
        reprojection: ReprojectionConfig::DEFAULT,
    };
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Byte layout of the sensor ring inside its shared mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RingLayout {
    /// Offset of the `u32` slot index the writer publishes last.
    pub index_offset: usize,
    /// Offset of slot 0. Must be 16-byte aligned.
    pub records_offset: usize,
    /// Number of record slots.
    pub slot_count: u32,
}

impl RingLayout {
    /// Size of one pose record in bytes.
    pub const RECORD_SIZE: usize = size_of::<PoseRecord>();

    /// Index word at 0, sixteen slots starting at 16.
    pub const DEFAULT: Self = Self {
        index_offset: 0,
        records_offset: 16,
        slot_count: 16,
    };

    /// Byte offset of `slot`, which is reduced modulo the slot count.
    ///
    /// Returns `None` for a layout without slots.
    #[must_use]
    pub const fn record_offset(&self, slot: u32) -> Option<usize> {
        if self.slot_count == 0 {
            return None;
        }
        let slot = (slot % self.slot_count) as usize;
        Some(self.records_offset + slot * Self::RECORD_SIZE)
    }

    /// Bytes the mapping must span.
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        let records_end = self.records_offset + self.slot_count as usize * Self::RECORD_SIZE;
        let index_end = self.index_offset + size_of::<u32>();
        if records_end > index_end {
            records_end
        } else {
            index_end
        }
    }
}

impl Default for RingLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

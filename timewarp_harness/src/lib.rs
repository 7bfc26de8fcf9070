// Copyright 2026 the Timewarp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated collaborators for exercising timewarp pipelines.
//!
//! - [`SharedBuffer`]: word-addressed shared memory implementing
//!   [`SharedRegion`].
//! - [`SensorWriter`]: the sensor process side of the pose ring.
//! - [`RegisterFile`]: a [`HardwareLatch`] that records every coefficient
//!   and trigger write the warp unit would see.
//! - [`FrameClock`]: evenly spaced interrupt timestamps.

#![no_std]

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use timewarp_core::config::RingLayout;
use timewarp_core::fixed::FixedMatrix3;
use timewarp_core::job::{HardwareLatch, UnitId, ViewportIndex};
use timewarp_core::pose::{PoseRecord, Position, SensorRing, SharedRegion};
use timewarp_core::quat::Quaternion;
use timewarp_core::time::HostTime;

// ---------------------------------------------------------------------------
// Shared memory
// ---------------------------------------------------------------------------

/// Zero-initialized memory made of atomic 32-bit words.
///
/// Offsets must be word aligned; unaligned or out-of-range loads read zero
/// and such stores are ignored.
#[derive(Debug)]
pub struct SharedBuffer {
    words: Box<[AtomicU32]>,
}

impl SharedBuffer {
    /// Allocates at least `byte_len` bytes, rounded up to whole words.
    #[must_use]
    pub fn new(byte_len: usize) -> Self {
        let words = (0..byte_len.div_ceil(4)).map(|_| AtomicU32::new(0)).collect();
        Self { words }
    }

    /// Size in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.words.len() * 4
    }

    fn word(&self, offset: usize) -> Option<&AtomicU32> {
        if offset % 4 != 0 {
            return None;
        }
        self.words.get(offset / 4)
    }

    /// Stores a word. Returns `false` if `offset` is unaligned or out of
    /// range.
    pub fn store_u32(&self, offset: usize, value: u32) -> bool {
        match self.word(offset) {
            Some(word) => {
                word.store(value, Ordering::Release);
                true
            }
            None => false,
        }
    }
}

impl SharedRegion for SharedBuffer {
    fn load_u32(&self, offset: usize) -> u32 {
        self.word(offset)
            .map_or(0, |word| word.load(Ordering::Acquire))
    }

    fn load_u128(&self, offset: usize) -> u128 {
        let mut bytes = [0_u8; 16];
        for (i, chunk) in bytes.chunks_exact_mut(4).enumerate() {
            chunk.copy_from_slice(&self.load_u32(offset + i * 4).to_ne_bytes());
        }
        u128::from_ne_bytes(bytes)
    }
}

// ---------------------------------------------------------------------------
// Sensor writer
// ---------------------------------------------------------------------------

/// Publishes poses into a ring the way the sensor process does: record
/// first, index word last.
#[derive(Debug)]
pub struct SensorWriter {
    buffer: Arc<SharedBuffer>,
    layout: RingLayout,
    next_slot: u32,
}

impl SensorWriter {
    /// Allocates a ring with `layout`.
    #[must_use]
    pub fn new(layout: RingLayout) -> Self {
        Self {
            buffer: Arc::new(SharedBuffer::new(layout.byte_len())),
            layout,
            next_slot: 0,
        }
    }

    /// The backing memory.
    #[must_use]
    pub fn buffer(&self) -> &Arc<SharedBuffer> {
        &self.buffer
    }

    /// The ring layout.
    #[must_use]
    pub fn layout(&self) -> RingLayout {
        self.layout
    }

    /// Attaches this ring's memory to a reader.
    pub fn attach(&self, ring: &SensorRing) {
        let region: Arc<dyn SharedRegion> = self.buffer.clone();
        ring.attach(region, self.layout);
    }

    /// Writes `record` to the next slot and publishes it.
    ///
    /// Returns the slot written, or `None` for a layout without slots.
    pub fn publish(&mut self, record: &PoseRecord) -> Option<u32> {
        let slot = self.next_slot;
        let offset = self.layout.record_offset(slot)?;
        let words: [u32; 8] = bytemuck::cast(*record);
        for (i, word) in words.into_iter().enumerate() {
            self.buffer.store_u32(offset + i * 4, word);
        }
        self.buffer.store_u32(self.layout.index_offset, slot);
        self.next_slot = (slot + 1) % self.layout.slot_count;
        Some(slot)
    }

    /// Publishes a pose.
    pub fn publish_pose(
        &mut self,
        timestamp: u32,
        position: Position,
        orientation: Quaternion,
    ) -> Option<u32> {
        let record = PoseRecord {
            timestamp,
            position: bytemuck::cast(position),
            quaternion: bytemuck::cast(orientation),
        };
        self.publish(&record)
    }
}

// ---------------------------------------------------------------------------
// Register file
// ---------------------------------------------------------------------------

/// Coefficient registers per viewport: two 3×3 banks.
pub const COEFFICIENTS_PER_VIEWPORT: usize = 18;

/// One register write, in the order the hardware sees them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterWrite {
    /// A coefficient register. Indices 0..9 are bank A, 9..18 bank B.
    Coefficient {
        /// Target unit.
        unit: UnitId,
        /// Target viewport.
        viewport: ViewportIndex,
        /// Register index.
        index: u8,
        /// Raw fixed-point pattern.
        value: u32,
    },
    /// A latch trigger adopting one bank at the next safe point.
    Trigger {
        /// Target unit.
        unit: UnitId,
        /// Target viewport.
        viewport: ViewportIndex,
        /// 0 for bank A, 1 for bank B.
        bank: u8,
    },
    /// A re-issued flush.
    Flush {
        /// Target unit.
        unit: UnitId,
    },
}

/// Adopted coefficients of one viewport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewportRegisters {
    /// Bank A.
    pub a: FixedMatrix3,
    /// Bank B.
    pub b: FixedMatrix3,
    /// Times this viewport was latched.
    pub latches: u32,
}

/// A [`HardwareLatch`] that records register traffic.
#[derive(Debug, Default)]
pub struct RegisterFile {
    log: Vec<RegisterWrite>,
    banks: BTreeMap<(UnitId, ViewportIndex), ViewportRegisters>,
    flushes: u32,
}

impl RegisterFile {
    /// Creates an empty register file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write so far, oldest first.
    #[must_use]
    pub fn log(&self) -> &[RegisterWrite] {
        &self.log
    }

    /// Forgets the write log, keeping register contents.
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Current contents of one viewport, or `None` if never latched.
    #[must_use]
    pub fn registers(&self, unit: UnitId, viewport: ViewportIndex) -> Option<ViewportRegisters> {
        self.banks.get(&(unit, viewport)).copied()
    }

    /// Total latches across all viewports.
    #[must_use]
    pub fn latch_count(&self) -> u32 {
        self.banks.values().map(|r| r.latches).sum()
    }

    /// Flushes re-issued so far.
    #[must_use]
    pub fn flush_count(&self) -> u32 {
        self.flushes
    }
}

impl HardwareLatch for RegisterFile {
    fn latch(&mut self, unit: UnitId, viewport: ViewportIndex, a: &FixedMatrix3, b: &FixedMatrix3) {
        for (index, &value) in (0_u8..).zip(a.0.iter().chain(b.0.iter())) {
            self.log.push(RegisterWrite::Coefficient {
                unit,
                viewport,
                index,
                value,
            });
        }
        for bank in 0..2 {
            self.log.push(RegisterWrite::Trigger {
                unit,
                viewport,
                bank,
            });
        }
        let regs = self.banks.entry((unit, viewport)).or_default();
        regs.a = *a;
        regs.b = *b;
        regs.latches += 1;
    }

    fn reissue_flush(&mut self, unit: UnitId) {
        self.log.push(RegisterWrite::Flush { unit });
        self.flushes += 1;
    }
}

// ---------------------------------------------------------------------------
// Frame clock
// ---------------------------------------------------------------------------

/// Hands out frame-start and frame-end timestamps at a fixed period.
#[derive(Clone, Copy, Debug)]
pub struct FrameClock {
    next: HostTime,
    period: u64,
    scanout: u64,
}

impl FrameClock {
    /// Frames every `period` ticks starting at `start`; frame end follows
    /// frame start by `scanout` ticks.
    #[must_use]
    pub const fn new(start: HostTime, period: u64, scanout: u64) -> Self {
        Self {
            next: start,
            period,
            scanout,
        }
    }

    /// 90 Hz on a nanosecond counter with an 8 ms scanout.
    #[must_use]
    pub const fn hz90() -> Self {
        Self::new(HostTime(0), 11_111_111, 8_000_000)
    }

    /// Returns `(frame_start, frame_end)` of the next frame.
    pub fn next_frame(&mut self) -> (HostTime, HostTime) {
        let start = self.next;
        self.next = HostTime(start.ticks().saturating_add(self.period));
        (start, HostTime(start.ticks().saturating_add(self.scanout)))
    }
}

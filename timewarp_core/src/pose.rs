// Copyright 2026 the Timewarp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Head pose snapshots read from the sensor ring.
//!
//! An external tracking process writes pose records into a ring of fixed-size
//! slots in shared memory and then publishes the slot index. The reader takes
//! the index, reads the slot with two 16-byte loads, and converts the
//! quaternion to a rotation matrix:
//!
//! ```text
//!   +0   index: u32 ─────────┐
//!   +16  slot 0              │
//!   +48  slot 1  ◄───────────┘  timestamp | x y z | qx qy qz qw
//!   ...
//! ```
//!
//! The mapping is attached and replaced by the owner of the ring (when the
//! compositor hands over a new buffer) and may be absent, in which case no
//! sample is available.

use alloc::sync::Arc;
use core::fmt;

use bytemuck::{Pod, Zeroable};

use crate::config::RingLayout;
use crate::matrix::Matrix4;
use crate::quat::Quaternion;
use crate::softfloat::{self, Float32, RoundException};

/// A point or displacement in head-tracking space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
#[repr(C)]
pub struct Position {
    /// X coordinate.
    pub x: Float32,
    /// Y coordinate.
    pub y: Float32,
    /// Z coordinate.
    pub z: Float32,
}

impl Position {
    /// The origin.
    pub const ZERO: Self = Self {
        x: Float32::ZERO,
        y: Float32::ZERO,
        z: Float32::ZERO,
    };

    /// Creates a position from host floats (bit reinterpretation only).
    #[must_use]
    pub const fn from_f32(x: f32, y: f32, z: f32) -> Self {
        Self {
            x: Float32::from_f32(x),
            y: Float32::from_f32(y),
            z: Float32::from_f32(z),
        }
    }

    /// `self - rhs`, component-wise.
    #[must_use]
    pub fn sub(&self, rhs: &Self, exc: &mut RoundException) -> Self {
        Self {
            x: softfloat::sub(self.x, rhs.x, exc),
            y: softfloat::sub(self.y, rhs.y, exc),
            z: softfloat::sub(self.z, rhs.z, exc),
        }
    }

    /// `x·x' + y·y' + z·z'`, summed left to right.
    #[must_use]
    pub fn dot(&self, rhs: &Self, exc: &mut RoundException) -> Float32 {
        let xx = softfloat::mul(self.x, rhs.x, exc);
        let yy = softfloat::mul(self.y, rhs.y, exc);
        let zz = softfloat::mul(self.z, rhs.z, exc);
        let s = softfloat::add(xx, yy, exc);
        softfloat::add(s, zz, exc)
    }

    /// Flips the sign of every component.
    #[must_use]
    pub const fn neg(&self) -> Self {
        Self {
            x: self.x.neg(),
            y: self.y.neg(),
            z: self.z.neg(),
        }
    }

    /// The first three entries of a homogeneous column.
    #[must_use]
    pub const fn from_column(column: [Float32; 4]) -> Self {
        Self {
            x: column[0],
            y: column[1],
            z: column[2],
        }
    }
}

/// Head position and orientation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pose {
    /// Head position.
    pub position: Position,
    /// Rotation matrix (or its inverse, for samples taken inverted).
    pub orientation: Matrix4,
}

impl Pose {
    /// At the origin, looking down the default axis.
    pub const IDENTITY: Self = Self {
        position: Position::ZERO,
        orientation: Matrix4::IDENTITY,
    };

    /// The same pose with its rotation inverted.
    ///
    /// For a rotation matrix the inverse is the transpose, which is exactly
    /// what an inverted quaternion sample yields, so a stored non-inverted
    /// pose can stand in for an inverted sample.
    #[must_use]
    pub const fn inverted_rotation(&self) -> Self {
        Self {
            position: self.position,
            orientation: self.orientation.transpose(),
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A pose with the sensor's timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoseSample {
    /// Sensor clock at capture, in sensor units.
    pub timestamp: u32,
    /// The sampled pose.
    pub pose: Pose,
}

/// One ring slot as laid out in shared memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct PoseRecord {
    /// Sensor clock at capture.
    pub timestamp: u32,
    /// Position bits, `[x, y, z]`.
    pub position: [u32; 3],
    /// Orientation quaternion bits, `[x, y, z, w]`.
    pub quaternion: [u32; 4],
}

impl PoseRecord {
    /// Reassembles a record from its two 16-byte halves as returned by
    /// [`SharedRegion::load_u128`].
    #[must_use]
    pub fn from_halves(lo: u128, hi: u128) -> Self {
        bytemuck::cast([lo, hi])
    }

    /// Splits a record into the two halves a writer stores.
    #[must_use]
    pub fn to_halves(&self) -> [u128; 2] {
        bytemuck::cast(*self)
    }

    /// Position as soft floats.
    #[must_use]
    pub const fn position(&self) -> Position {
        let [x, y, z] = self.position;
        Position {
            x: Float32::from_bits(x),
            y: Float32::from_bits(y),
            z: Float32::from_bits(z),
        }
    }

    /// Orientation as a soft-float quaternion.
    #[must_use]
    pub const fn quaternion(&self) -> Quaternion {
        let [x, y, z, w] = self.quaternion;
        Quaternion {
            x: Float32::from_bits(x),
            y: Float32::from_bits(y),
            z: Float32::from_bits(z),
            w: Float32::from_bits(w),
        }
    }
}

/// Memory shared with the sensor process.
///
/// Loads are in native byte order: `load_u128` returns the value whose
/// in-memory representation is the sixteen bytes at `offset`. Offsets outside
/// the region read as zero.
pub trait SharedRegion: Send + Sync {
    /// Loads the 4-byte word at `offset`.
    fn load_u32(&self, offset: usize) -> u32;

    /// Loads the 16 bytes at `offset` in a single access.
    fn load_u128(&self, offset: usize) -> u128;
}

struct RingMapping {
    region: Arc<dyn SharedRegion>,
    layout: RingLayout,
}

/// Reader side of the sensor ring.
///
/// The mapping sits behind a spinlock so that the owner can swap it while an
/// interrupt handler is sampling; the lock is held for the index read and the
/// two record loads only.
pub struct SensorRing {
    mapping: spin::Mutex<Option<RingMapping>>,
}

impl SensorRing {
    /// Creates a ring with nothing attached.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mapping: spin::Mutex::new(None),
        }
    }

    /// Attaches (or replaces) the shared mapping.
    pub fn attach(&self, region: Arc<dyn SharedRegion>, layout: RingLayout) {
        let previous = self.mapping.lock().replace(RingMapping { region, layout });
        // Drop the old mapping outside the lock.
        drop(previous);
    }

    /// Detaches the mapping. Later samples return `None`.
    pub fn detach(&self) {
        let previous = self.mapping.lock().take();
        drop(previous);
    }

    /// Returns `true` if a mapping is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.mapping.lock().is_some()
    }

    /// Reads the record the writer published last.
    #[must_use]
    pub fn read_record(&self) -> Option<PoseRecord> {
        let guard = self.mapping.lock();
        let mapping = guard.as_ref()?;
        let index = mapping.region.load_u32(mapping.layout.index_offset);
        let offset = mapping.layout.record_offset(index)?;
        let lo = mapping.region.load_u128(offset);
        let hi = mapping.region.load_u128(offset + 16);
        drop(guard);
        Some(PoseRecord::from_halves(lo, hi))
    }

    /// Samples the current head pose.
    ///
    /// With `invert`, the quaternion is conjugated before conversion so the
    /// orientation is the inverse rotation, ready to be composed as a delta.
    /// Returns `None` when no mapping is attached.
    #[must_use]
    pub fn sample(&self, invert: bool, exc: &mut RoundException) -> Option<PoseSample> {
        let record = self.read_record()?;
        let q = record.quaternion();
        let q = if invert { q.invert() } else { q };
        Some(PoseSample {
            timestamp: record.timestamp,
            pose: Pose {
                position: record.position(),
                orientation: q.to_matrix4(exc),
            },
        })
    }
}

impl Default for SensorRing {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SensorRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = self.mapping.lock().as_ref().map(|m| m.layout);
        f.debug_struct("SensorRing")
            .field("attached", &layout.is_some())
            .field("layout", &layout)
            .finish()
    }
}

// Copyright 2026 the Timewarp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the job pipeline.
//!
//! The pipeline never fails loudly: a warp that cannot be computed costs one
//! frame of staleness and nothing else. This module is how those outcomes are
//! observed. [`TraceSink`] has one method per pipeline event, all defaulting
//! to no-ops.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing, which keeps the
//! interrupt path free of indirect calls. When **on**, each method performs a
//! single `Option` branch before dispatching.
//!
//! Every event carries the unit and the [`HostTime`] the caller captured at
//! interrupt (or commit) entry.
//!
//! # Crate features
//!
//! - `trace` enables the `Tracer` method bodies.

use crate::job::{JobMode, UnitId, ViewportIndex};
use crate::softfloat::RoundException;
use crate::solver::{SolveError, ViewportType};
use crate::time::{Duration, HostTime};

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// An event that carries nothing beyond its unit and time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitEvent {
    /// Unit the event concerns.
    pub unit: UnitId,
    /// Caller-supplied time of the event.
    pub timestamp: HostTime,
}

/// An event about one viewport of a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewportEvent {
    /// Unit the event concerns.
    pub unit: UnitId,
    /// Caller-supplied time of the event.
    pub timestamp: HostTime,
    /// Which viewport.
    pub viewport: ViewportIndex,
}

/// Emitted when a job is queued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobCreatedEvent {
    /// Owning unit.
    pub unit: UnitId,
    /// Commit time.
    pub timestamp: HostTime,
    /// Viewport schedule of the job.
    pub mode: JobMode,
    /// Sensor timestamp of the reference pose, or `None` if no sensor ring
    /// was attached and the identity pose was used.
    pub sensor_timestamp: Option<u32>,
}

/// Emitted when job creation exceeds the live-job budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobAllocFailedEvent {
    /// Owning unit.
    pub unit: UnitId,
    /// Commit time.
    pub timestamp: HostTime,
    /// Jobs alive when the allocation was attempted.
    pub live: usize,
    /// The unit's budget.
    pub limit: usize,
}

/// Emitted when the frame-start interrupt takes the queued job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobPickedUpEvent {
    /// Owning unit.
    pub unit: UnitId,
    /// Interrupt time.
    pub timestamp: HostTime,
    /// Strong references to the job after pickup (queue plus consumer).
    pub refcount: usize,
}

/// Emitted when the consumer drops its reference to a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobReleasedEvent {
    /// Owning unit.
    pub unit: UnitId,
    /// Release time.
    pub timestamp: HostTime,
    /// Whether this was the last reference and the job was freed.
    pub freed: bool,
    /// Time since the job was created.
    pub age: Duration,
}

/// Emitted after a viewport's warp was computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewportSolvedEvent {
    /// Owning unit.
    pub unit: UnitId,
    /// Interrupt time.
    pub timestamp: HostTime,
    /// Which viewport.
    pub viewport: ViewportIndex,
    /// Warp algorithm used.
    pub vp_type: ViewportType,
    /// Arithmetic flags raised while sampling and solving.
    pub exceptions: RoundException,
}

/// Emitted when a viewport's warp could not be computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SolveFailedEvent {
    /// Owning unit.
    pub unit: UnitId,
    /// Interrupt time.
    pub timestamp: HostTime,
    /// Which viewport.
    pub viewport: ViewportIndex,
    /// Why.
    pub error: SolveError,
}

/// Emitted after coefficients were written to the latch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatchEvent {
    /// Owning unit.
    pub unit: UnitId,
    /// Interrupt time.
    pub timestamp: HostTime,
    /// Which viewport.
    pub viewport: ViewportIndex,
    /// `true` if these are the previous coefficients re-latched after a
    /// failed solve.
    pub stale: bool,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the job pipeline.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about. Methods called from the interrupt path
/// must not block.
pub trait TraceSink {
    /// A job was queued.
    fn on_job_created(&mut self, e: &JobCreatedEvent) {
        _ = e;
    }

    /// A queued job was replaced before the consumer took it.
    fn on_job_evicted(&mut self, e: &UnitEvent) {
        _ = e;
    }

    /// Job creation failed for lack of budget.
    fn on_job_alloc_failed(&mut self, e: &JobAllocFailedEvent) {
        _ = e;
    }

    /// The frame-start interrupt took the queued job.
    fn on_job_picked_up(&mut self, e: &JobPickedUpEvent) {
        _ = e;
    }

    /// The consumer released its job reference.
    fn on_job_released(&mut self, e: &JobReleasedEvent) {
        _ = e;
    }

    /// A queued job was dropped because its unit went inactive.
    fn on_job_drained(&mut self, e: &UnitEvent) {
        _ = e;
    }

    /// A viewport's warp was computed.
    fn on_viewport_solved(&mut self, e: &ViewportSolvedEvent) {
        _ = e;
    }

    /// A viewport's warp could not be computed.
    fn on_solve_failed(&mut self, e: &SolveFailedEvent) {
        _ = e;
    }

    /// Coefficients were latched.
    fn on_latched(&mut self, e: &LatchEvent) {
        _ = e;
    }

    /// A failed viewport was left with its previous latch.
    fn on_latch_skipped(&mut self, e: &ViewportEvent) {
        _ = e;
    }

    /// A postponed flush was re-issued after the interrupt's viewports.
    fn on_flush_reissued(&mut self, e: &UnitEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`JobCreatedEvent`].
    #[inline]
    pub fn job_created(&mut self, e: &JobCreatedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_job_created(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a job eviction.
    #[inline]
    pub fn job_evicted(&mut self, e: &UnitEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_job_evicted(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`JobAllocFailedEvent`].
    #[inline]
    pub fn job_alloc_failed(&mut self, e: &JobAllocFailedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_job_alloc_failed(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`JobPickedUpEvent`].
    #[inline]
    pub fn job_picked_up(&mut self, e: &JobPickedUpEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_job_picked_up(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`JobReleasedEvent`].
    #[inline]
    pub fn job_released(&mut self, e: &JobReleasedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_job_released(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a drained-job event.
    #[inline]
    pub fn job_drained(&mut self, e: &UnitEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_job_drained(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`ViewportSolvedEvent`].
    #[inline]
    pub fn viewport_solved(&mut self, e: &ViewportSolvedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_viewport_solved(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`SolveFailedEvent`].
    #[inline]
    pub fn solve_failed(&mut self, e: &SolveFailedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_solve_failed(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`LatchEvent`].
    #[inline]
    pub fn latched(&mut self, e: &LatchEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_latched(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a skipped-latch event.
    #[inline]
    pub fn latch_skipped(&mut self, e: &ViewportEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_latch_skipped(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a flush re-issue.
    #[inline]
    pub fn flush_reissued(&mut self, e: &UnitEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_flush_reissued(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_event() -> UnitEvent {
        UnitEvent {
            unit: UnitId(3),
            timestamp: HostTime(1_000),
        }
    }

    #[test]
    fn noop_sink_accepts_everything() {
        let mut sink = NoopSink;
        sink.on_job_evicted(&unit_event());
        sink.on_solve_failed(&SolveFailedEvent {
            unit: UnitId(0),
            timestamp: HostTime(5),
            viewport: ViewportIndex::Right,
            error: SolveError::Degenerate,
        });
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        tracer.job_evicted(&unit_event());
        tracer.flush_reissued(&unit_event());
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        use alloc::vec::Vec;

        #[derive(Default)]
        struct RecordingSink {
            latched: Vec<(u32, bool)>,
            skipped: u32,
        }
        impl TraceSink for RecordingSink {
            fn on_latched(&mut self, e: &LatchEvent) {
                self.latched.push((e.unit.0, e.stale));
            }
            fn on_latch_skipped(&mut self, _: &ViewportEvent) {
                self.skipped += 1;
            }
        }

        let mut sink = RecordingSink::default();
        let mut tracer = Tracer::new(&mut sink);
        tracer.latched(&LatchEvent {
            unit: UnitId(1),
            timestamp: HostTime(10),
            viewport: ViewportIndex::Left,
            stale: true,
        });
        tracer.latch_skipped(&ViewportEvent {
            unit: UnitId(1),
            timestamp: HostTime(11),
            viewport: ViewportIndex::Right,
        });
        // Unhandled events fall through to the default no-op.
        tracer.job_evicted(&unit_event());
        drop(tracer);
        assert_eq!(sink.latched, &[(1, true)]);
        assert_eq!(sink.skipped, 1);
    }
}

// Copyright 2026 the Timewarp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-unit reprojection jobs and their interrupt-driven consumption.
//!
//! Each warp unit has a depth-one queue filled by the commit path and drained
//! by two interrupts per frame:
//!
//! ```text
//!   commit ── create_job ──► [queue] ──peek──► curr_job ──► solve + latch
//!                 │                 AsyncRp        │
//!                 └─ evicts the                    ▼  FrameEnd
//!                    queued job          SEQ: solve + latch right
//!                                        release curr_job
//! ```
//!
//! The frame-start interrupt takes a second reference to the queued job
//! without unlinking it, so a job that is not replaced is re-warped every
//! frame against a fresh pose. Only [`PipelineUnit::create_job`] (eviction)
//! and [`PipelineUnit::drain`] drop the queue's reference.
//!
//! Jobs are reference counted with [`Arc`]; a per-unit live-job budget stands
//! in for allocation failure. Every failure is recovered within one viewport
//! or one frame and reported through the [`Tracer`].

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicUsize, Ordering};

use crate::config::{PipelineConfig, StalePolicy};
use crate::fixed::FixedMatrix3;
use crate::matrix::Matrix4;
use crate::pose::{Pose, SensorRing};
use crate::softfloat::RoundException;
use crate::solver::{ViewportCalc, ViewportType};
use crate::time::HostTime;
use crate::trace::{
    JobAllocFailedEvent, JobCreatedEvent, JobPickedUpEvent, JobReleasedEvent, LatchEvent,
    SolveFailedEvent, Tracer, UnitEvent, ViewportEvent, ViewportSolvedEvent,
};

// ---------------------------------------------------------------------------
// Identifiers and modes
// ---------------------------------------------------------------------------

/// Index of a warp unit within a [`Pipeline`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct UnitId(pub u32);

/// One of the two half-images a unit can warp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewportIndex {
    /// Viewport 0.
    Left,
    /// Viewport 1.
    Right,
}

impl ViewportIndex {
    /// Both viewports in register order.
    pub const ALL: [Self; 2] = [Self::Left, Self::Right];

    /// Register index, 0 or 1.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }
}

/// Which viewports a job warps, and when.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum JobMode {
    /// Nothing is warped.
    #[default]
    Disabled,
    /// Left only.
    Vp0,
    /// Right only.
    Vp1,
    /// Both viewports at frame start.
    Vp0Vp1Simult,
    /// Left at frame start, right at frame end.
    Vp0Vp1Seq,
}

impl JobMode {
    /// Viewports solved and latched by the frame-start interrupt.
    #[must_use]
    pub const fn frame_start_viewports(self) -> &'static [ViewportIndex] {
        match self {
            Self::Disabled => &[],
            Self::Vp0 | Self::Vp0Vp1Seq => &[ViewportIndex::Left],
            Self::Vp1 => &[ViewportIndex::Right],
            Self::Vp0Vp1Simult => &[ViewportIndex::Left, ViewportIndex::Right],
        }
    }

    /// Viewports solved and latched by the frame-end interrupt.
    #[must_use]
    pub const fn frame_end_viewports(self) -> &'static [ViewportIndex] {
        match self {
            Self::Vp0Vp1Seq => &[ViewportIndex::Right],
            _ => &[],
        }
    }
}

/// Interrupt classes that drive consumption.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IrqEvent {
    /// Frame start: the earliest point a warp can be latched.
    AsyncRp,
    /// Frame end: last chance for the sequential second viewport.
    FrameEnd,
}

// ---------------------------------------------------------------------------
// Requests and jobs
// ---------------------------------------------------------------------------

/// Warp inputs for one viewport, as delivered by the commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewportRequest {
    /// Warp algorithm.
    pub vp_type: ViewportType,
    /// Render matrix (projection) or quad placement matrix (quad).
    pub m1: Matrix4,
    /// Helmet (eye projection) matrix.
    pub m2: Matrix4,
}

impl ViewportRequest {
    /// A viewport that is not warped.
    pub const NONE: Self = Self {
        vp_type: ViewportType::None,
        m1: Matrix4::IDENTITY,
        m2: Matrix4::IDENTITY,
    };

    /// A projection layer rendered with `render`.
    #[must_use]
    pub const fn projection(render: Matrix4, helmet: Matrix4) -> Self {
        Self {
            vp_type: ViewportType::Projection,
            m1: render,
            m2: helmet,
        }
    }

    /// A quad layer placed by `placement`.
    #[must_use]
    pub const fn quad(placement: Matrix4, helmet: Matrix4) -> Self {
        Self {
            vp_type: ViewportType::Quad,
            m1: placement,
            m2: helmet,
        }
    }
}

impl Default for ViewportRequest {
    fn default() -> Self {
        Self::NONE
    }
}

/// Everything a commit hands to [`PipelineUnit::create_job`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JobRequest {
    /// Viewport schedule.
    pub mode: JobMode,
    /// Viewport 0 inputs.
    pub left: ViewportRequest,
    /// Viewport 1 inputs.
    pub right: ViewportRequest,
}

/// Holds one unit of a unit's live-job budget until dropped.
#[derive(Debug)]
struct LiveToken(Arc<AtomicUsize>);

impl LiveToken {
    /// Takes one unit of budget, or returns the live count on exhaustion.
    fn reserve(live: &Arc<AtomicUsize>, limit: usize) -> Result<Self, usize> {
        live.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            (n < limit).then_some(n + 1)
        })
        .map(|_| Self(Arc::clone(live)))
    }
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A snapshot of one commit: mode, viewport inputs, and the reference pose.
///
/// The viewport outputs persist across frames for as long as the job does.
#[derive(Debug)]
pub struct ReprojectionJob {
    unit: UnitId,
    mode: JobMode,
    reference: Pose,
    sensor_timestamp: Option<u32>,
    created_at: HostTime,
    viewports: spin::Mutex<[ViewportCalc; 2]>,
    _live: LiveToken,
}

impl ReprojectionJob {
    /// Owning unit.
    #[must_use]
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Viewport schedule.
    #[must_use]
    pub fn mode(&self) -> JobMode {
        self.mode
    }

    /// Pose sampled at creation.
    #[must_use]
    pub fn reference(&self) -> &Pose {
        &self.reference
    }

    /// Sensor timestamp of the reference pose, if the ring was attached.
    #[must_use]
    pub fn sensor_timestamp(&self) -> Option<u32> {
        self.sensor_timestamp
    }

    /// Commit time.
    #[must_use]
    pub fn created_at(&self) -> HostTime {
        self.created_at
    }

    /// A copy of one viewport's inputs and current outputs.
    #[must_use]
    pub fn viewport(&self, index: ViewportIndex) -> ViewportCalc {
        self.viewports.lock()[index.index()]
    }
}

// ---------------------------------------------------------------------------
// Collaborators and errors
// ---------------------------------------------------------------------------

/// Register writes owned by the display backend.
///
/// Called from interrupt context; implementations must not block.
pub trait HardwareLatch {
    /// Writes both coefficient sets of `viewport` and triggers their adoption
    /// at the next safe point.
    fn latch(&mut self, unit: UnitId, viewport: ViewportIndex, a: &FixedMatrix3, b: &FixedMatrix3);

    /// Re-issues a flush that was postponed until this unit had computed
    /// its viewports.
    fn reissue_flush(&mut self, unit: UnitId) {
        _ = unit;
    }
}

/// Job creation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobError {
    /// The unit's live-job budget is exhausted.
    OutOfMemory {
        /// Jobs alive at the attempt.
        live: usize,
        /// The budget.
        limit: usize,
    },
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { live, limit } => {
                write!(f, "out of memory: {live} of {limit} reprojection jobs live")
            }
        }
    }
}

impl core::error::Error for JobError {}

// ---------------------------------------------------------------------------
// Unit state and statistics
// ---------------------------------------------------------------------------

/// Where a unit is in its job lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitState {
    /// No job queued or in flight.
    Idle,
    /// A job waits for the next frame start.
    Queued,
    /// The frame-start interrupt holds a job.
    InFlight,
    /// The frame-end interrupt is finishing a job.
    Draining,
}

/// Counter snapshot from [`PipelineUnit::stats`]. Counters wrap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnitStats {
    /// Jobs queued.
    pub created: u32,
    /// Queued jobs replaced before pickup.
    pub evicted: u32,
    /// Creations refused for lack of budget.
    pub alloc_failures: u32,
    /// Frame starts that found a job.
    pub picked_up: u32,
    /// Consumer references dropped.
    pub released: u32,
    /// Coefficient sets written.
    pub latched: u32,
    /// Failed viewports left with their previous latch.
    pub latch_skips: u32,
    /// Viewports whose warp could not be computed.
    pub solve_failures: u32,
    /// Queued jobs dropped by [`PipelineUnit::drain`].
    pub drained: u32,
    /// Postponed flushes re-issued.
    pub flush_reissues: u32,
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU32,
    evicted: AtomicU32,
    alloc_failures: AtomicU32,
    picked_up: AtomicU32,
    released: AtomicU32,
    latched: AtomicU32,
    latch_skips: AtomicU32,
    solve_failures: AtomicU32,
    drained: AtomicU32,
    flush_reissues: AtomicU32,
}

impl Counters {
    fn snapshot(&self) -> UnitStats {
        let get = |c: &AtomicU32| c.load(Ordering::Relaxed);
        UnitStats {
            created: get(&self.created),
            evicted: get(&self.evicted),
            alloc_failures: get(&self.alloc_failures),
            picked_up: get(&self.picked_up),
            released: get(&self.released),
            latched: get(&self.latched),
            latch_skips: get(&self.latch_skips),
            solve_failures: get(&self.solve_failures),
            drained: get(&self.drained),
            flush_reissues: get(&self.flush_reissues),
        }
    }
}

#[inline]
fn bump(counter: &AtomicU32) {
    counter.fetch_add(1, Ordering::Relaxed);
}

const PHASE_IDLE: u8 = 0;
const PHASE_IN_FLIGHT: u8 = 1;
const PHASE_DRAINING: u8 = 2;

// ---------------------------------------------------------------------------
// PipelineUnit
// ---------------------------------------------------------------------------

/// One warp unit: its queue, its consumer slot, and its budget.
///
/// Producer methods (`create_job`, `drain`, `postpone_flush`) run in process
/// context. Consumer methods (`on_frame_start`, `on_frame_end`,
/// `handle_event`) run in interrupt context, strictly paired, and neither
/// block nor allocate. Both sides take `&self`.
pub struct PipelineUnit {
    id: UnitId,
    config: PipelineConfig,
    queue: spin::Mutex<Option<Arc<ReprojectionJob>>>,
    curr_job: spin::Mutex<Option<Arc<ReprojectionJob>>>,
    phase: AtomicU8,
    flush_postponed: AtomicBool,
    live_jobs: Arc<AtomicUsize>,
    counters: Counters,
}

impl PipelineUnit {
    /// Creates an idle unit.
    #[must_use]
    pub fn new(id: UnitId, config: PipelineConfig) -> Self {
        Self {
            id,
            config,
            queue: spin::Mutex::new(None),
            curr_job: spin::Mutex::new(None),
            phase: AtomicU8::new(PHASE_IDLE),
            flush_postponed: AtomicBool::new(false),
            live_jobs: Arc::new(AtomicUsize::new(0)),
            counters: Counters::default(),
        }
    }

    /// This unit's id.
    #[must_use]
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// The unit's configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Queues a job for `request`, replacing any job still queued.
    ///
    /// The reference pose is sampled from `sensor` now. The new job replaces
    /// the queued one in a single step, so a consumer never finds the queue
    /// empty mid-commit. An in-flight job is not affected. On error the
    /// queued job is evicted and the unit is left with no queued job.
    pub fn create_job(
        &self,
        request: &JobRequest,
        sensor: &SensorRing,
        now: HostTime,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), JobError> {
        let limit = self.config.max_live_jobs;
        let live = match LiveToken::reserve(&self.live_jobs, limit) {
            Ok(token) => token,
            Err(live) => {
                let evicted = self.queue.lock().take();
                if let Some(evicted) = evicted {
                    self.evict(evicted, now, tracer);
                }
                bump(&self.counters.alloc_failures);
                tracer.job_alloc_failed(&JobAllocFailedEvent {
                    unit: self.id,
                    timestamp: now,
                    live,
                    limit,
                });
                return Err(JobError::OutOfMemory { live, limit });
            }
        };

        let mut exc = RoundException::NONE;
        let (reference, sensor_timestamp) = match sensor.sample(false, &mut exc) {
            Some(sample) => (sample.pose, Some(sample.timestamp)),
            None => (Pose::IDENTITY, None),
        };
        let format = self.config.reprojection.output_format;
        let calc = |r: &ViewportRequest| ViewportCalc::new(r.vp_type, r.m1, r.m2, format);
        let job = Arc::new(ReprojectionJob {
            unit: self.id,
            mode: request.mode,
            reference,
            sensor_timestamp,
            created_at: now,
            viewports: spin::Mutex::new([calc(&request.left), calc(&request.right)]),
            _live: live,
        });

        let evicted = self.queue.lock().replace(job);
        if let Some(evicted) = evicted {
            self.evict(evicted, now, tracer);
        }
        bump(&self.counters.created);
        tracer.job_created(&JobCreatedEvent {
            unit: self.id,
            timestamp: now,
            mode: request.mode,
            sensor_timestamp,
        });
        Ok(())
    }

    fn evict(&self, job: Arc<ReprojectionJob>, now: HostTime, tracer: &mut Tracer<'_>) {
        bump(&self.counters.evicted);
        tracer.job_evicted(&UnitEvent {
            unit: self.id,
            timestamp: now,
        });
        drop(job);
    }

    /// Returns a new reference to the queued job without unlinking it.
    #[must_use]
    pub fn get_job(&self) -> Option<Arc<ReprojectionJob>> {
        self.queue.lock().clone()
    }

    /// Drops the queued job, if any, without computing it.
    ///
    /// Returns `true` if a job was drained.
    pub fn drain(&self, now: HostTime, tracer: &mut Tracer<'_>) -> bool {
        let Some(job) = self.queue.lock().take() else {
            return false;
        };
        bump(&self.counters.drained);
        tracer.job_drained(&UnitEvent {
            unit: self.id,
            timestamp: now,
        });
        drop(job);
        true
    }

    /// Asks the consumer to re-issue the flush once it has processed the
    /// viewports of its next interrupt, whether or not they latched.
    pub fn postpone_flush(&self) {
        self.flush_postponed.store(true, Ordering::Release);
    }

    /// Frame-start interrupt: takes the queued job and latches its
    /// frame-start viewports. Does nothing if no job is queued.
    pub fn on_frame_start(
        &self,
        sensor: &SensorRing,
        latch: &mut dyn HardwareLatch,
        now: HostTime,
        tracer: &mut Tracer<'_>,
    ) {
        // A missed frame end leaves the previous job behind.
        let stale = self.curr_job.lock().take();
        if let Some(stale) = stale {
            self.release(stale, now, tracer);
            self.phase.store(PHASE_IDLE, Ordering::Release);
        }

        let Some(job) = self.get_job() else {
            return;
        };
        bump(&self.counters.picked_up);
        tracer.job_picked_up(&JobPickedUpEvent {
            unit: self.id,
            timestamp: now,
            refcount: Arc::strong_count(&job),
        });
        *self.curr_job.lock() = Some(Arc::clone(&job));
        self.phase.store(PHASE_IN_FLIGHT, Ordering::Release);
        self.process(&job, job.mode.frame_start_viewports(), sensor, latch, now, tracer);
    }

    /// Frame-end interrupt: latches the sequential second viewport and
    /// releases the in-flight job. Does nothing if no job is in flight.
    pub fn on_frame_end(
        &self,
        sensor: &SensorRing,
        latch: &mut dyn HardwareLatch,
        now: HostTime,
        tracer: &mut Tracer<'_>,
    ) {
        let Some(job) = self.curr_job.lock().clone() else {
            return;
        };
        self.phase.store(PHASE_DRAINING, Ordering::Release);
        self.process(&job, job.mode.frame_end_viewports(), sensor, latch, now, tracer);
        drop(job);

        let finished = self.curr_job.lock().take();
        if let Some(finished) = finished {
            self.release(finished, now, tracer);
        }
        self.phase.store(PHASE_IDLE, Ordering::Release);
    }

    /// Dispatches an interrupt to [`on_frame_start`](Self::on_frame_start)
    /// or [`on_frame_end`](Self::on_frame_end).
    pub fn handle_event(
        &self,
        event: IrqEvent,
        sensor: &SensorRing,
        latch: &mut dyn HardwareLatch,
        now: HostTime,
        tracer: &mut Tracer<'_>,
    ) {
        match event {
            IrqEvent::AsyncRp => self.on_frame_start(sensor, latch, now, tracer),
            IrqEvent::FrameEnd => self.on_frame_end(sensor, latch, now, tracer),
        }
    }

    fn release(&self, job: Arc<ReprojectionJob>, now: HostTime, tracer: &mut Tracer<'_>) {
        let age = now - job.created_at;
        bump(&self.counters.released);
        let freed = Arc::into_inner(job).is_some();
        tracer.job_released(&JobReleasedEvent {
            unit: self.id,
            timestamp: now,
            freed,
            age,
        });
    }

    fn process(
        &self,
        job: &ReprojectionJob,
        viewports: &[ViewportIndex],
        sensor: &SensorRing,
        latch: &mut dyn HardwareLatch,
        now: HostTime,
        tracer: &mut Tracer<'_>,
    ) {
        let config = &self.config.reprojection;
        for &viewport in viewports {
            let vp_type = job.viewports.lock()[viewport.index()].vp_type;
            let invert = vp_type == ViewportType::Quad;

            let mut exc = RoundException::NONE;
            let current = match sensor.sample(invert, &mut exc) {
                Some(sample) => sample.pose,
                None if invert => job.reference.inverted_rotation(),
                None => job.reference,
            };

            let mut calcs = job.viewports.lock();
            let calc = &mut calcs[viewport.index()];
            let result = calc.solve(&job.reference, &current, config, &mut exc);
            let (a, b) = (*calc.a(), *calc.b());
            drop(calcs);

            let stale = match result {
                Ok(()) => {
                    tracer.viewport_solved(&ViewportSolvedEvent {
                        unit: self.id,
                        timestamp: now,
                        viewport,
                        vp_type,
                        exceptions: exc,
                    });
                    false
                }
                Err(error) => {
                    bump(&self.counters.solve_failures);
                    tracer.solve_failed(&SolveFailedEvent {
                        unit: self.id,
                        timestamp: now,
                        viewport,
                        error,
                    });
                    if config.stale_policy == StalePolicy::SkipLatch {
                        bump(&self.counters.latch_skips);
                        tracer.latch_skipped(&ViewportEvent {
                            unit: self.id,
                            timestamp: now,
                            viewport,
                        });
                        continue;
                    }
                    true
                }
            };

            latch.latch(self.id, viewport, &a, &b);
            bump(&self.counters.latched);
            tracer.latched(&LatchEvent {
                unit: self.id,
                timestamp: now,
                viewport,
                stale,
            });
        }

        // The flush waits on this computation, not on its success.
        if !viewports.is_empty() && self.flush_postponed.swap(false, Ordering::AcqRel) {
            latch.reissue_flush(self.id);
            bump(&self.counters.flush_reissues);
            tracer.flush_reissued(&UnitEvent {
                unit: self.id,
                timestamp: now,
            });
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> UnitState {
        match self.phase.load(Ordering::Acquire) {
            PHASE_IN_FLIGHT => UnitState::InFlight,
            PHASE_DRAINING => UnitState::Draining,
            _ if self.queue.lock().is_some() => UnitState::Queued,
            _ => UnitState::Idle,
        }
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> UnitStats {
        self.counters.snapshot()
    }

    /// Returns `true` while the consumer holds a job.
    #[must_use]
    pub fn has_current_job(&self) -> bool {
        self.curr_job.lock().is_some()
    }

    /// Strong references to the queued job, or `None` if nothing is queued.
    #[must_use]
    pub fn queued_refcount(&self) -> Option<usize> {
        self.queue.lock().as_ref().map(Arc::strong_count)
    }

    /// Jobs currently alive (queued, in flight, or both).
    #[must_use]
    pub fn live_jobs(&self) -> usize {
        self.live_jobs.load(Ordering::Acquire)
    }
}

impl fmt::Debug for PipelineUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineUnit")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("live_jobs", &self.live_jobs())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Result of [`Pipeline::commit`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Units that received a new job.
    pub created: u32,
    /// Inactive units whose queued job was drained.
    pub drained: u32,
    /// Units whose job creation failed.
    pub failed: u32,
}

/// All warp units of a display pipeline plus the sensor ring they share.
#[derive(Debug)]
pub struct Pipeline {
    sensor: SensorRing,
    units: Vec<PipelineUnit>,
}

impl Pipeline {
    /// Creates `unit_count` idle units numbered from zero.
    #[must_use]
    pub fn new(unit_count: u32, config: PipelineConfig) -> Self {
        Self {
            sensor: SensorRing::new(),
            units: (0..unit_count)
                .map(|i| PipelineUnit::new(UnitId(i), config))
                .collect(),
        }
    }

    /// The shared sensor ring.
    #[must_use]
    pub fn sensor(&self) -> &SensorRing {
        &self.sensor
    }

    /// Looks up a unit.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&PipelineUnit> {
        self.units.get(id.0 as usize)
    }

    /// All units in id order.
    #[must_use]
    pub fn units(&self) -> &[PipelineUnit] {
        &self.units
    }

    /// Applies an atomic commit.
    ///
    /// `requests[i]` is unit `i`'s request. Units with a request whose mode
    /// is not [`JobMode::Disabled`] get a new job; all other units, including
    /// those past the end of `requests`, are drained. Creation failures are
    /// counted, not propagated.
    pub fn commit(
        &self,
        requests: &[Option<JobRequest>],
        now: HostTime,
        tracer: &mut Tracer<'_>,
    ) -> CommitOutcome {
        let mut outcome = CommitOutcome::default();
        for (i, unit) in self.units.iter().enumerate() {
            match requests.get(i).copied().flatten() {
                Some(request) if request.mode != JobMode::Disabled => {
                    match unit.create_job(&request, &self.sensor, now, tracer) {
                        Ok(()) => outcome.created += 1,
                        Err(_) => outcome.failed += 1,
                    }
                }
                _ => {
                    if unit.drain(now, tracer) {
                        outcome.drained += 1;
                    }
                }
            }
        }
        outcome
    }

    /// Routes an interrupt to `unit`. Returns `false` for an unknown unit.
    pub fn handle_event(
        &self,
        unit: UnitId,
        event: IrqEvent,
        latch: &mut dyn HardwareLatch,
        now: HostTime,
        tracer: &mut Tracer<'_>,
    ) -> bool {
        let Some(target) = self.unit(unit) else {
            return false;
        };
        target.handle_event(event, &self.sensor, latch, now, tracer);
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReprojectionConfig, RingLayout};
    use crate::fixed::FixedFormat;
    use crate::pose::SharedRegion;

    #[derive(Default)]
    struct Registers {
        latched: Vec<(UnitId, ViewportIndex, FixedMatrix3, FixedMatrix3)>,
        flushes: Vec<UnitId>,
    }

    impl HardwareLatch for Registers {
        fn latch(
            &mut self,
            unit: UnitId,
            viewport: ViewportIndex,
            a: &FixedMatrix3,
            b: &FixedMatrix3,
        ) {
            self.latched.push((unit, viewport, *a, *b));
        }

        fn reissue_flush(&mut self, unit: UnitId) {
            self.flushes.push(unit);
        }
    }

    fn request(mode: JobMode) -> JobRequest {
        JobRequest {
            mode,
            left: ViewportRequest::projection(Matrix4::IDENTITY, Matrix4::IDENTITY),
            right: ViewportRequest::projection(Matrix4::IDENTITY, Matrix4::IDENTITY),
        }
    }

    fn identity() -> FixedMatrix3 {
        FixedMatrix3::identity(FixedFormat::Q1_30)
    }

    fn unit_with(config: PipelineConfig) -> (PipelineUnit, SensorRing) {
        (PipelineUnit::new(UnitId(0), config), SensorRing::new())
    }

    #[test]
    fn mode_schedules() {
        use ViewportIndex::{Left, Right};
        assert!(JobMode::Disabled.frame_start_viewports().is_empty());
        assert_eq!(JobMode::Vp0.frame_start_viewports(), &[Left]);
        assert_eq!(JobMode::Vp1.frame_start_viewports(), &[Right]);
        assert_eq!(JobMode::Vp0Vp1Simult.frame_start_viewports(), &[Left, Right]);
        assert_eq!(JobMode::Vp0Vp1Seq.frame_start_viewports(), &[Left]);
        assert_eq!(JobMode::Vp0Vp1Seq.frame_end_viewports(), &[Right]);
        assert!(JobMode::Vp0Vp1Simult.frame_end_viewports().is_empty());
    }

    #[test]
    fn repeated_create_keeps_one_queued_job() {
        let (unit, sensor) = unit_with(PipelineConfig::DEFAULT);
        let mut tracer = Tracer::none();
        for t in 0..5 {
            unit.create_job(&request(JobMode::Vp0), &sensor, HostTime(t), &mut tracer)
                .unwrap();
        }
        assert_eq!(unit.queued_refcount(), Some(1));
        assert_eq!(unit.live_jobs(), 1);
        assert_eq!(unit.state(), UnitState::Queued);
        let stats = unit.stats();
        assert_eq!((stats.created, stats.evicted), (5, 4));
    }

    #[test]
    fn consumption_without_job_is_noop() {
        let (unit, sensor) = unit_with(PipelineConfig::DEFAULT);
        let mut regs = Registers::default();
        let mut tracer = Tracer::none();
        unit.on_frame_start(&sensor, &mut regs, HostTime(1), &mut tracer);
        assert!(unit.get_job().is_none());
        assert!(!unit.has_current_job());
        unit.on_frame_end(&sensor, &mut regs, HostTime(2), &mut tracer);
        assert!(regs.latched.is_empty());
        assert_eq!(unit.state(), UnitState::Idle);
        assert_eq!(unit.stats(), UnitStats::default());
    }

    #[test]
    fn sequential_mode_defers_right_viewport() {
        let (unit, sensor) = unit_with(PipelineConfig::DEFAULT);
        let mut regs = Registers::default();
        let mut tracer = Tracer::none();
        unit.create_job(&request(JobMode::Vp0Vp1Seq), &sensor, HostTime(0), &mut tracer)
            .unwrap();

        unit.on_frame_start(&sensor, &mut regs, HostTime(10), &mut tracer);
        assert_eq!(unit.state(), UnitState::InFlight);
        assert_eq!(unit.queued_refcount(), Some(2), "queue plus consumer");
        assert_eq!(regs.latched.len(), 1);
        assert_eq!(regs.latched[0], (UnitId(0), ViewportIndex::Left, identity(), identity()));

        unit.on_frame_end(&sensor, &mut regs, HostTime(20), &mut tracer);
        assert_eq!(regs.latched.len(), 2);
        assert_eq!(regs.latched[1].1, ViewportIndex::Right);
        assert!(!unit.has_current_job());
        // The job stays queued and is re-warped next frame.
        assert_eq!(unit.state(), UnitState::Queued);
        assert_eq!(unit.queued_refcount(), Some(1));
    }

    #[test]
    fn simultaneous_mode_latches_both_at_frame_start() {
        let (unit, sensor) = unit_with(PipelineConfig::DEFAULT);
        let mut regs = Registers::default();
        let mut tracer = Tracer::none();
        unit.create_job(&request(JobMode::Vp0Vp1Simult), &sensor, HostTime(0), &mut tracer)
            .unwrap();
        unit.on_frame_start(&sensor, &mut regs, HostTime(1), &mut tracer);
        let order: Vec<_> = regs.latched.iter().map(|l| l.1).collect();
        assert_eq!(order, [ViewportIndex::Left, ViewportIndex::Right]);
        unit.on_frame_end(&sensor, &mut regs, HostTime(2), &mut tracer);
        assert_eq!(regs.latched.len(), 2);
    }

    #[test]
    fn lost_frame_end_releases_previous_job() {
        let (unit, sensor) = unit_with(PipelineConfig::DEFAULT);
        let mut regs = Registers::default();
        let mut tracer = Tracer::none();
        unit.create_job(&request(JobMode::Vp0), &sensor, HostTime(0), &mut tracer)
            .unwrap();
        unit.on_frame_start(&sensor, &mut regs, HostTime(1), &mut tracer);
        unit.on_frame_start(&sensor, &mut regs, HostTime(2), &mut tracer);
        let stats = unit.stats();
        assert_eq!((stats.picked_up, stats.released), (2, 1));
        assert_eq!(unit.queued_refcount(), Some(2));
        assert_eq!(unit.live_jobs(), 1);
    }

    #[test]
    fn exhausted_budget_reports_out_of_memory() {
        let config = PipelineConfig {
            max_live_jobs: 1,
            ..PipelineConfig::DEFAULT
        };
        let (unit, sensor) = unit_with(config);
        let mut regs = Registers::default();
        let mut tracer = Tracer::none();
        unit.create_job(&request(JobMode::Vp0), &sensor, HostTime(0), &mut tracer)
            .unwrap();
        unit.on_frame_start(&sensor, &mut regs, HostTime(1), &mut tracer);

        // Eviction unlinks the queued job, but the consumer still holds it.
        let err = unit
            .create_job(&request(JobMode::Vp0), &sensor, HostTime(2), &mut tracer)
            .unwrap_err();
        assert_eq!(err, JobError::OutOfMemory { live: 1, limit: 1 });
        assert_eq!(unit.queued_refcount(), None);
        assert_eq!(unit.stats().alloc_failures, 1);

        unit.on_frame_end(&sensor, &mut regs, HostTime(3), &mut tracer);
        assert_eq!(unit.live_jobs(), 0);
        assert_eq!(unit.state(), UnitState::Idle);
        unit.create_job(&request(JobMode::Vp0), &sensor, HostTime(4), &mut tracer)
            .unwrap();
    }

    fn singular_request() -> JobRequest {
        JobRequest {
            mode: JobMode::Vp0,
            left: ViewportRequest::projection(Matrix4::IDENTITY, Matrix4::ZERO),
            right: ViewportRequest::NONE,
        }
    }

    #[test]
    fn failed_solve_skips_latch_by_default() {
        let (unit, sensor) = unit_with(PipelineConfig::DEFAULT);
        let mut regs = Registers::default();
        let mut tracer = Tracer::none();
        unit.create_job(&singular_request(), &sensor, HostTime(0), &mut tracer)
            .unwrap();
        unit.on_frame_start(&sensor, &mut regs, HostTime(1), &mut tracer);
        assert!(regs.latched.is_empty());
        let stats = unit.stats();
        assert_eq!((stats.solve_failures, stats.latch_skips, stats.latched), (1, 1, 0));
    }

    #[test]
    fn failed_solve_can_relatch_previous() {
        let config = PipelineConfig {
            reprojection: ReprojectionConfig::DEFAULT
                .with_stale_policy(StalePolicy::LatchPrevious),
            ..PipelineConfig::DEFAULT
        };
        let (unit, sensor) = unit_with(config);
        let mut regs = Registers::default();
        let mut tracer = Tracer::none();
        unit.create_job(&singular_request(), &sensor, HostTime(0), &mut tracer)
            .unwrap();
        unit.on_frame_start(&sensor, &mut regs, HostTime(1), &mut tracer);
        assert_eq!(regs.latched.len(), 1);
        assert_eq!(regs.latched[0].2, identity(), "never solved: identity");
        assert_eq!(unit.stats().solve_failures, 1);
    }

    #[test]
    fn postponed_flush_is_reissued_once() {
        let (unit, sensor) = unit_with(PipelineConfig::DEFAULT);
        let mut regs = Registers::default();
        let mut tracer = Tracer::none();
        unit.create_job(&request(JobMode::Vp0Vp1Simult), &sensor, HostTime(0), &mut tracer)
            .unwrap();
        unit.postpone_flush();
        unit.on_frame_start(&sensor, &mut regs, HostTime(1), &mut tracer);
        assert_eq!(regs.flushes, [UnitId(0)]);
        assert_eq!(unit.stats().flush_reissues, 1);
    }

    #[test]
    fn postponed_flush_survives_failed_solve() {
        let (unit, sensor) = unit_with(PipelineConfig::DEFAULT);
        let mut regs = Registers::default();
        let mut tracer = Tracer::none();
        unit.create_job(&singular_request(), &sensor, HostTime(0), &mut tracer)
            .unwrap();
        unit.postpone_flush();
        for frame in 0..10 {
            let t = 2 * frame + 1;
            unit.on_frame_start(&sensor, &mut regs, HostTime(t), &mut tracer);
            unit.on_frame_end(&sensor, &mut regs, HostTime(t + 1), &mut tracer);
        }
        assert!(regs.latched.is_empty());
        assert_eq!(regs.flushes, [UnitId(0)], "flush re-issued once despite the skip");
        let stats = unit.stats();
        assert_eq!((stats.latch_skips, stats.flush_reissues), (10, 1));
    }

    #[test]
    fn postponed_flush_waits_for_an_interrupt_with_work() {
        let (unit, sensor) = unit_with(PipelineConfig::DEFAULT);
        let mut regs = Registers::default();
        let mut tracer = Tracer::none();
        unit.create_job(&request(JobMode::Vp0), &sensor, HostTime(0), &mut tracer)
            .unwrap();
        unit.on_frame_start(&sensor, &mut regs, HostTime(1), &mut tracer);
        unit.postpone_flush();
        // Vp0 has nothing to compute at frame end.
        unit.on_frame_end(&sensor, &mut regs, HostTime(2), &mut tracer);
        assert!(regs.flushes.is_empty());
        unit.on_frame_start(&sensor, &mut regs, HostTime(3), &mut tracer);
        assert_eq!(regs.flushes, [UnitId(0)]);
    }

    /// A sensor region that looks at the unit's queue while the commit path
    /// is sampling the reference pose.
    struct QueueWatcher {
        unit: Arc<PipelineUnit>,
        armed: AtomicBool,
        looked: AtomicBool,
        saw_empty: AtomicBool,
    }

    impl SharedRegion for QueueWatcher {
        fn load_u32(&self, _offset: usize) -> u32 {
            if self.armed.load(Ordering::Acquire) {
                self.looked.store(true, Ordering::Release);
                if self.unit.get_job().is_none() {
                    self.saw_empty.store(true, Ordering::Release);
                }
            }
            0
        }

        fn load_u128(&self, _offset: usize) -> u128 {
            0
        }
    }

    #[test]
    fn replacement_never_exposes_an_empty_queue() {
        let unit = Arc::new(PipelineUnit::new(UnitId(0), PipelineConfig::DEFAULT));
        let watcher = Arc::new(QueueWatcher {
            unit: Arc::clone(&unit),
            armed: AtomicBool::new(false),
            looked: AtomicBool::new(false),
            saw_empty: AtomicBool::new(false),
        });
        let sensor = SensorRing::new();
        sensor.attach(watcher.clone(), RingLayout::DEFAULT);
        let mut tracer = Tracer::none();

        unit.create_job(&request(JobMode::Vp0), &sensor, HostTime(0), &mut tracer)
            .unwrap();
        let first = unit.get_job().unwrap();
        watcher.armed.store(true, Ordering::Release);
        unit.create_job(&request(JobMode::Vp1), &sensor, HostTime(1), &mut tracer)
            .unwrap();

        assert!(watcher.looked.load(Ordering::Acquire));
        assert!(!watcher.saw_empty.load(Ordering::Acquire), "queue emptied mid-commit");
        let second = unit.get_job().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.mode(), JobMode::Vp1);
        assert_eq!(unit.stats().evicted, 1);
        drop((first, second));
        assert_eq!(unit.live_jobs(), 1);
    }

    #[test]
    fn default_budget_covers_replacement_while_in_flight() {
        let (unit, sensor) = unit_with(PipelineConfig::DEFAULT);
        let mut regs = Registers::default();
        let mut tracer = Tracer::none();
        unit.create_job(&request(JobMode::Vp0), &sensor, HostTime(0), &mut tracer)
            .unwrap();
        unit.on_frame_start(&sensor, &mut regs, HostTime(1), &mut tracer);
        unit.create_job(&request(JobMode::Vp0), &sensor, HostTime(2), &mut tracer)
            .unwrap();
        unit.create_job(&request(JobMode::Vp0), &sensor, HostTime(3), &mut tracer)
            .unwrap();
        assert_eq!(unit.live_jobs(), 2, "in flight plus queued");
        assert_eq!(unit.stats().alloc_failures, 0);
    }

    #[test]
    fn drain_releases_queued_job() {
        let (unit, sensor) = unit_with(PipelineConfig::DEFAULT);
        let mut tracer = Tracer::none();
        unit.create_job(&request(JobMode::Vp0), &sensor, HostTime(0), &mut tracer)
            .unwrap();
        assert!(unit.drain(HostTime(1), &mut tracer));
        assert_eq!(unit.live_jobs(), 0);
        assert_eq!(unit.state(), UnitState::Idle);
        assert!(!unit.drain(HostTime(2), &mut tracer));
    }

    #[test]
    fn job_snapshot_uses_identity_without_sensor() {
        let (unit, sensor) = unit_with(PipelineConfig::DEFAULT);
        let mut tracer = Tracer::none();
        unit.create_job(&request(JobMode::Vp1), &sensor, HostTime(7), &mut tracer)
            .unwrap();
        let job = unit.get_job().unwrap();
        assert_eq!(job.unit(), UnitId(0));
        assert_eq!(job.mode(), JobMode::Vp1);
        assert_eq!(*job.reference(), Pose::IDENTITY);
        assert_eq!(job.sensor_timestamp(), None);
        assert_eq!(job.created_at(), HostTime(7));
        assert_eq!(job.viewport(ViewportIndex::Right).vp_type, ViewportType::Projection);
    }

    #[test]
    fn pipeline_commit_creates_and_drains() {
        let pipeline = Pipeline::new(2, PipelineConfig::DEFAULT);
        let mut tracer = Tracer::none();
        let requests = [Some(request(JobMode::Vp0)), None];
        let outcome = pipeline.commit(&requests, HostTime(0), &mut tracer);
        assert_eq!(outcome, CommitOutcome { created: 1, drained: 0, failed: 0 });

        let disabled = JobRequest::default();
        let outcome = pipeline.commit(&[Some(disabled)], HostTime(1), &mut tracer);
        assert_eq!(outcome, CommitOutcome { created: 0, drained: 1, failed: 0 });
        assert!(pipeline.units().iter().all(|u| u.state() == UnitState::Idle));

        let mut regs = Registers::default();
        let (unknown, now) = (UnitId(9), HostTime(2));
        let t = &mut tracer;
        let handled = pipeline.handle_event(unknown, IrqEvent::AsyncRp, &mut regs, now, t);
        assert!(!handled, "unknown unit");
    }

    #[test]
    fn pipeline_routes_interrupts() {
        let pipeline = Pipeline::new(2, PipelineConfig::DEFAULT);
        let mut tracer = Tracer::none();
        let mut regs = Registers::default();
        pipeline.commit(&[None, Some(request(JobMode::Vp0Vp1Seq))], HostTime(0), &mut tracer);
        for (event, t) in [(IrqEvent::AsyncRp, 1), (IrqEvent::FrameEnd, 2)] {
            assert!(pipeline.handle_event(UnitId(1), event, &mut regs, HostTime(t), &mut tracer));
        }
        let seen: Vec<_> = regs.latched.iter().map(|l| (l.0, l.1)).collect();
        assert_eq!(seen, [(UnitId(1), ViewportIndex::Left), (UnitId(1), ViewportIndex::Right)]);
    }
}

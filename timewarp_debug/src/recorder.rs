// Copyright 2026 the Timewarp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`].
//!
//! Every record starts with a one-byte tag, the unit id (`u32`) and the
//! timestamp (`u64`). Counts wider than `u32` are capped.

use timewarp_core::job::{JobMode, UnitId, ViewportIndex};
use timewarp_core::softfloat::RoundException;
use timewarp_core::solver::{SolveError, ViewportType};
use timewarp_core::time::{Duration, HostTime};
use timewarp_core::trace::{
    JobAllocFailedEvent, JobCreatedEvent, JobPickedUpEvent, JobReleasedEvent, LatchEvent,
    SolveFailedEvent, TraceSink, UnitEvent, ViewportEvent, ViewportSolvedEvent,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_JOB_CREATED: u8 = 1;
const TAG_JOB_EVICTED: u8 = 2;
const TAG_JOB_ALLOC_FAILED: u8 = 3;
const TAG_JOB_PICKED_UP: u8 = 4;
const TAG_JOB_RELEASED: u8 = 5;
const TAG_JOB_DRAINED: u8 = 6;
const TAG_VIEWPORT_SOLVED: u8 = 7;
const TAG_SOLVE_FAILED: u8 = 8;
const TAG_LATCHED: u8 = 9;
const TAG_LATCH_SKIPPED: u8 = 10;
const TAG_FLUSH_REISSUED: u8 = 11;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_count(&mut self, v: usize) {
        self.write_u32(u32::try_from(v).unwrap_or(u32::MAX));
    }

    fn write_header(&mut self, tag: u8, unit: UnitId, timestamp: HostTime) {
        self.write_u8(tag);
        self.write_u32(unit.0);
        self.write_u64(timestamp.ticks());
    }

    fn write_viewport(&mut self, v: ViewportIndex) {
        self.write_u8(match v {
            ViewportIndex::Left => 0,
            ViewportIndex::Right => 1,
        });
    }

    fn write_mode(&mut self, m: JobMode) {
        self.write_u8(match m {
            JobMode::Disabled => 0,
            JobMode::Vp0 => 1,
            JobMode::Vp1 => 2,
            JobMode::Vp0Vp1Simult => 3,
            JobMode::Vp0Vp1Seq => 4,
        });
    }

    fn write_unit_event(&mut self, tag: u8, e: &UnitEvent) {
        self.write_header(tag, e.unit, e.timestamp);
    }
}

impl TraceSink for RecorderSink {
    fn on_job_created(&mut self, e: &JobCreatedEvent) {
        self.write_header(TAG_JOB_CREATED, e.unit, e.timestamp);
        self.write_mode(e.mode);
        self.write_u8(u8::from(e.sensor_timestamp.is_some()));
        self.write_u32(e.sensor_timestamp.unwrap_or(0));
    }

    fn on_job_evicted(&mut self, e: &UnitEvent) {
        self.write_unit_event(TAG_JOB_EVICTED, e);
    }

    fn on_job_alloc_failed(&mut self, e: &JobAllocFailedEvent) {
        self.write_header(TAG_JOB_ALLOC_FAILED, e.unit, e.timestamp);
        self.write_count(e.live);
        self.write_count(e.limit);
    }

    fn on_job_picked_up(&mut self, e: &JobPickedUpEvent) {
        self.write_header(TAG_JOB_PICKED_UP, e.unit, e.timestamp);
        self.write_count(e.refcount);
    }

    fn on_job_released(&mut self, e: &JobReleasedEvent) {
        self.write_header(TAG_JOB_RELEASED, e.unit, e.timestamp);
        self.write_u8(u8::from(e.freed));
        self.write_u64(e.age.ticks());
    }

    fn on_job_drained(&mut self, e: &UnitEvent) {
        self.write_unit_event(TAG_JOB_DRAINED, e);
    }

    fn on_viewport_solved(&mut self, e: &ViewportSolvedEvent) {
        self.write_header(TAG_VIEWPORT_SOLVED, e.unit, e.timestamp);
        self.write_viewport(e.viewport);
        self.write_u8(match e.vp_type {
            ViewportType::None => 0,
            ViewportType::Projection => 1,
            ViewportType::Quad => 2,
        });
        self.write_u8(e.exceptions.bits());
    }

    fn on_solve_failed(&mut self, e: &SolveFailedEvent) {
        self.write_header(TAG_SOLVE_FAILED, e.unit, e.timestamp);
        self.write_viewport(e.viewport);
        self.write_u8(match e.error {
            SolveError::Singular => 0,
            SolveError::Degenerate => 1,
        });
    }

    fn on_latched(&mut self, e: &LatchEvent) {
        self.write_header(TAG_LATCHED, e.unit, e.timestamp);
        self.write_viewport(e.viewport);
        self.write_u8(u8::from(e.stale));
    }

    fn on_latch_skipped(&mut self, e: &ViewportEvent) {
        self.write_header(TAG_LATCH_SKIPPED, e.unit, e.timestamp);
        self.write_viewport(e.viewport);
    }

    fn on_flush_reissued(&mut self, e: &UnitEvent) {
        self.write_unit_event(TAG_FLUSH_REISSUED, e);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// A [`JobCreatedEvent`].
    JobCreated(JobCreatedEvent),
    /// A queued job was evicted.
    JobEvicted(UnitEvent),
    /// A [`JobAllocFailedEvent`].
    JobAllocFailed(JobAllocFailedEvent),
    /// A [`JobPickedUpEvent`].
    JobPickedUp(JobPickedUpEvent),
    /// A [`JobReleasedEvent`].
    JobReleased(JobReleasedEvent),
    /// A queued job was drained.
    JobDrained(UnitEvent),
    /// A [`ViewportSolvedEvent`].
    ViewportSolved(ViewportSolvedEvent),
    /// A [`SolveFailedEvent`].
    SolveFailed(SolveFailedEvent),
    /// A [`LatchEvent`].
    Latched(LatchEvent),
    /// A latch was skipped.
    LatchSkipped(ViewportEvent),
    /// A postponed flush was re-issued.
    FlushReissued(UnitEvent),
}

impl RecordedEvent {
    /// The unit the event concerns.
    #[must_use]
    pub fn unit(&self) -> UnitId {
        match self {
            Self::JobCreated(e) => e.unit,
            Self::JobEvicted(e) | Self::JobDrained(e) | Self::FlushReissued(e) => e.unit,
            Self::JobAllocFailed(e) => e.unit,
            Self::JobPickedUp(e) => e.unit,
            Self::JobReleased(e) => e.unit,
            Self::ViewportSolved(e) => e.unit,
            Self::SolveFailed(e) => e.unit,
            Self::Latched(e) => e.unit,
            Self::LatchSkipped(e) => e.unit,
        }
    }

    /// When the event happened.
    #[must_use]
    pub fn timestamp(&self) -> HostTime {
        match self {
            Self::JobCreated(e) => e.timestamp,
            Self::JobEvicted(e) | Self::JobDrained(e) | Self::FlushReissued(e) => e.timestamp,
            Self::JobAllocFailed(e) => e.timestamp,
            Self::JobPickedUp(e) => e.timestamp,
            Self::JobReleased(e) => e.timestamp,
            Self::ViewportSolved(e) => e.timestamp,
            Self::SolveFailed(e) => e.timestamp,
            Self::Latched(e) => e.timestamp,
            Self::LatchSkipped(e) => e.timestamp,
        }
    }

    /// Delivers the event to `sink` as if it had just happened.
    pub fn replay(&self, sink: &mut dyn TraceSink) {
        match self {
            Self::JobCreated(e) => sink.on_job_created(e),
            Self::JobEvicted(e) => sink.on_job_evicted(e),
            Self::JobAllocFailed(e) => sink.on_job_alloc_failed(e),
            Self::JobPickedUp(e) => sink.on_job_picked_up(e),
            Self::JobReleased(e) => sink.on_job_released(e),
            Self::JobDrained(e) => sink.on_job_drained(e),
            Self::ViewportSolved(e) => sink.on_viewport_solved(e),
            Self::SolveFailed(e) => sink.on_solve_failed(e),
            Self::Latched(e) => sink.on_latched(e),
            Self::LatchSkipped(e) => sink.on_latch_skipped(e),
            Self::FlushReissued(e) => sink.on_flush_reissued(e),
        }
    }
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?;
        self.pos += N;
        bytes.try_into().ok()
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.read_array::<1>().map(|[v]| v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    fn read_count(&mut self) -> Option<usize> {
        self.read_u32().map(|v| v as usize)
    }

    fn read_bool(&mut self) -> Option<bool> {
        self.read_u8().map(|v| v != 0)
    }

    fn read_viewport(&mut self) -> Option<ViewportIndex> {
        Some(match self.read_u8()? {
            0 => ViewportIndex::Left,
            _ => ViewportIndex::Right,
        })
    }

    fn read_mode(&mut self) -> Option<JobMode> {
        Some(match self.read_u8()? {
            0 => JobMode::Disabled,
            1 => JobMode::Vp0,
            2 => JobMode::Vp1,
            3 => JobMode::Vp0Vp1Simult,
            _ => JobMode::Vp0Vp1Seq,
        })
    }

    fn read_unit_event(&mut self) -> Option<UnitEvent> {
        Some(UnitEvent {
            unit: UnitId(self.read_u32()?),
            timestamp: HostTime(self.read_u64()?),
        })
    }

    fn decode_job_created(&mut self) -> Option<RecordedEvent> {
        let UnitEvent { unit, timestamp } = self.read_unit_event()?;
        let mode = self.read_mode()?;
        let present = self.read_bool()?;
        let sensor = self.read_u32()?;
        Some(RecordedEvent::JobCreated(JobCreatedEvent {
            unit,
            timestamp,
            mode,
            sensor_timestamp: present.then_some(sensor),
        }))
    }

    fn decode_job_alloc_failed(&mut self) -> Option<RecordedEvent> {
        let UnitEvent { unit, timestamp } = self.read_unit_event()?;
        Some(RecordedEvent::JobAllocFailed(JobAllocFailedEvent {
            unit,
            timestamp,
            live: self.read_count()?,
            limit: self.read_count()?,
        }))
    }

    fn decode_job_picked_up(&mut self) -> Option<RecordedEvent> {
        let UnitEvent { unit, timestamp } = self.read_unit_event()?;
        Some(RecordedEvent::JobPickedUp(JobPickedUpEvent {
            unit,
            timestamp,
            refcount: self.read_count()?,
        }))
    }

    fn decode_job_released(&mut self) -> Option<RecordedEvent> {
        let UnitEvent { unit, timestamp } = self.read_unit_event()?;
        Some(RecordedEvent::JobReleased(JobReleasedEvent {
            unit,
            timestamp,
            freed: self.read_bool()?,
            age: Duration(self.read_u64()?),
        }))
    }

    fn decode_viewport_solved(&mut self) -> Option<RecordedEvent> {
        let UnitEvent { unit, timestamp } = self.read_unit_event()?;
        Some(RecordedEvent::ViewportSolved(ViewportSolvedEvent {
            unit,
            timestamp,
            viewport: self.read_viewport()?,
            vp_type: match self.read_u8()? {
                0 => ViewportType::None,
                1 => ViewportType::Projection,
                _ => ViewportType::Quad,
            },
            exceptions: RoundException::from_bits_truncate(self.read_u8()?),
        }))
    }

    fn decode_solve_failed(&mut self) -> Option<RecordedEvent> {
        let UnitEvent { unit, timestamp } = self.read_unit_event()?;
        Some(RecordedEvent::SolveFailed(SolveFailedEvent {
            unit,
            timestamp,
            viewport: self.read_viewport()?,
            error: match self.read_u8()? {
                0 => SolveError::Singular,
                _ => SolveError::Degenerate,
            },
        }))
    }

    fn decode_latched(&mut self) -> Option<RecordedEvent> {
        let UnitEvent { unit, timestamp } = self.read_unit_event()?;
        Some(RecordedEvent::Latched(LatchEvent {
            unit,
            timestamp,
            viewport: self.read_viewport()?,
            stale: self.read_bool()?,
        }))
    }

    fn decode_latch_skipped(&mut self) -> Option<RecordedEvent> {
        let UnitEvent { unit, timestamp } = self.read_unit_event()?;
        Some(RecordedEvent::LatchSkipped(ViewportEvent {
            unit,
            timestamp,
            viewport: self.read_viewport()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_JOB_CREATED => self.decode_job_created(),
            TAG_JOB_EVICTED => self.read_unit_event().map(RecordedEvent::JobEvicted),
            TAG_JOB_ALLOC_FAILED => self.decode_job_alloc_failed(),
            TAG_JOB_PICKED_UP => self.decode_job_picked_up(),
            TAG_JOB_RELEASED => self.decode_job_released(),
            TAG_JOB_DRAINED => self.read_unit_event().map(RecordedEvent::JobDrained),
            TAG_VIEWPORT_SOLVED => self.decode_viewport_solved(),
            TAG_SOLVE_FAILED => self.decode_solve_failed(),
            TAG_LATCHED => self.decode_latched(),
            TAG_LATCH_SKIPPED => self.decode_latch_skipped(),
            TAG_FLUSH_REISSUED => self.read_unit_event().map(RecordedEvent::FlushReissued),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_created_keeps_missing_sensor_timestamp() {
        let mut rec = RecorderSink::new();
        let with = JobCreatedEvent {
            unit: UnitId(2),
            timestamp: HostTime(1_000_000),
            mode: JobMode::Vp0Vp1Seq,
            sensor_timestamp: Some(0),
        };
        let without = JobCreatedEvent {
            sensor_timestamp: None,
            ..with
        };
        rec.on_job_created(&with);
        rec.on_job_created(&without);

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(
            events,
            [RecordedEvent::JobCreated(with), RecordedEvent::JobCreated(without)]
        );
    }

    #[test]
    fn viewport_solved_keeps_flags() {
        let mut rec = RecorderSink::new();
        let orig = ViewportSolvedEvent {
            unit: UnitId(0),
            timestamp: HostTime(77),
            viewport: ViewportIndex::Right,
            vp_type: ViewportType::Quad,
            exceptions: RoundException::INEXACT | RoundException::UNDERFLOW,
        };
        rec.on_viewport_solved(&orig);

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        match events.as_slice() {
            [RecordedEvent::ViewportSolved(e)] => {
                assert_eq!(*e, orig);
                assert!(e.exceptions.contains(RoundException::UNDERFLOW));
            }
            other => panic!("expected one ViewportSolved, got {other:?}"),
        }
    }

    #[test]
    fn lifecycle_sequence_decodes_in_order() {
        let mut rec = RecorderSink::new();
        let unit = UnitId(1);
        rec.on_job_picked_up(&JobPickedUpEvent {
            unit,
            timestamp: HostTime(10),
            refcount: 2,
        });
        rec.on_solve_failed(&SolveFailedEvent {
            unit,
            timestamp: HostTime(11),
            viewport: ViewportIndex::Left,
            error: SolveError::Degenerate,
        });
        rec.on_latch_skipped(&ViewportEvent {
            unit,
            timestamp: HostTime(11),
            viewport: ViewportIndex::Left,
        });
        rec.on_job_released(&JobReleasedEvent {
            unit,
            timestamp: HostTime(20),
            freed: false,
            age: Duration(15),
        });
        rec.on_flush_reissued(&UnitEvent {
            unit,
            timestamp: HostTime(21),
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], RecordedEvent::JobPickedUp(e) if e.refcount == 2));
        assert!(matches!(
            events[1],
            RecordedEvent::SolveFailed(e) if e.error == SolveError::Degenerate
        ));
        assert!(matches!(events[2], RecordedEvent::LatchSkipped(_)));
        assert!(matches!(events[3], RecordedEvent::JobReleased(e) if e.age == Duration(15)));
        assert!(matches!(events[4], RecordedEvent::FlushReissued(_)));
        assert!(events.iter().all(|e| e.unit() == unit));
        assert_eq!(events[4].timestamp(), HostTime(21));
    }

    #[test]
    fn oversized_counts_are_capped() {
        let mut rec = RecorderSink::new();
        rec.on_job_alloc_failed(&JobAllocFailedEvent {
            unit: UnitId(0),
            timestamp: HostTime(0),
            live: usize::MAX,
            limit: 2,
        });
        match decode(rec.as_bytes()).next() {
            Some(RecordedEvent::JobAllocFailed(e)) => {
                assert_eq!(e.live, u32::MAX as usize);
                assert_eq!(e.limit, 2);
            }
            other => panic!("expected JobAllocFailed, got {other:?}"),
        }
    }

    #[test]
    fn truncated_record_stops_iteration() {
        let mut rec = RecorderSink::new();
        rec.on_job_evicted(&UnitEvent {
            unit: UnitId(0),
            timestamp: HostTime(5),
        });
        rec.on_job_drained(&UnitEvent {
            unit: UnitId(0),
            timestamp: HostTime(6),
        });
        let bytes = rec.into_bytes();
        let events: Vec<_> = decode(&bytes[..bytes.len() - 1]).collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RecordedEvent::JobEvicted(_)));
    }

    #[test]
    fn replay_reproduces_the_recording() {
        let mut rec = RecorderSink::new();
        rec.on_job_drained(&UnitEvent {
            unit: UnitId(4),
            timestamp: HostTime(9),
        });
        rec.on_latched(&LatchEvent {
            unit: UnitId(4),
            timestamp: HostTime(10),
            viewport: ViewportIndex::Left,
            stale: true,
        });

        let mut copy = RecorderSink::new();
        for event in decode(rec.as_bytes()) {
            event.replay(&mut copy);
        }
        assert_eq!(copy.as_bytes(), rec.as_bytes());
    }

    #[test]
    fn empty_buffer_decodes_to_nothing() {
        let events: Vec<_> = decode(&[]).collect();
        assert!(events.is_empty());
    }
}

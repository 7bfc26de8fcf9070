// Copyright 2026 the Timewarp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are converted to microseconds using a [`Timebase`].

use std::io::Write;

use timewarp_core::job::{JobMode, ViewportIndex};
use timewarp_core::solver::{SolveError, ViewportType};
use timewarp_core::time::{HostTime, Timebase};
use timewarp_core::trace::{
    JobAllocFailedEvent, JobCreatedEvent, JobPickedUpEvent, JobReleasedEvent, LatchEvent,
    SolveFailedEvent, TraceSink, UnitEvent, ViewportEvent, ViewportSolvedEvent,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    timebase: Timebase,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
            timebase,
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }

    /// Consumes the sink and returns its writer.
    #[must_use]
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn ticks_to_us(&self, ticks: u64) -> f64 {
        self.timebase.ticks_to_nanos(ticks) as f64 / 1000.0
    }

    fn host_us(&self, t: HostTime) -> f64 {
        self.ticks_to_us(t.ticks())
    }
}

fn viewport_name(viewport: ViewportIndex) -> &'static str {
    match viewport {
        ViewportIndex::Left => "vp0",
        ViewportIndex::Right => "vp1",
    }
}

fn mode_name(mode: JobMode) -> &'static str {
    match mode {
        JobMode::Disabled => "disabled",
        JobMode::Vp0 => "vp0",
        JobMode::Vp1 => "vp1",
        JobMode::Vp0Vp1Simult => "simult",
        JobMode::Vp0Vp1Seq => "seq",
    }
}

fn type_name(vp_type: ViewportType) -> &'static str {
    match vp_type {
        ViewportType::None => "none",
        ViewportType::Projection => "projection",
        ViewportType::Quad => "quad",
    }
}

fn error_name(error: SolveError) -> &'static str {
    match error {
        SolveError::Singular => "singular",
        SolveError::Degenerate => "degenerate",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_job_created(&mut self, e: &JobCreatedEvent) {
        let sensor = match e.sensor_timestamp {
            Some(ts) => format!("{ts}"),
            None => "-".to_owned(),
        };
        let _ = writeln!(
            self.writer,
            "[job:create] unit={} at {:.1}µs mode={} sensor={sensor}",
            e.unit.0,
            self.host_us(e.timestamp),
            mode_name(e.mode),
        );
    }

    fn on_job_evicted(&mut self, e: &UnitEvent) {
        let _ = writeln!(
            self.writer,
            "[job:evict] unit={} at {:.1}µs",
            e.unit.0,
            self.host_us(e.timestamp),
        );
    }

    fn on_job_alloc_failed(&mut self, e: &JobAllocFailedEvent) {
        let _ = writeln!(
            self.writer,
            "[job:oom] unit={} at {:.1}µs live={}/{}",
            e.unit.0,
            self.host_us(e.timestamp),
            e.live,
            e.limit,
        );
    }

    fn on_job_picked_up(&mut self, e: &JobPickedUpEvent) {
        let _ = writeln!(
            self.writer,
            "[job:pickup] unit={} at {:.1}µs refs={}",
            e.unit.0,
            self.host_us(e.timestamp),
            e.refcount,
        );
    }

    fn on_job_released(&mut self, e: &JobReleasedEvent) {
        let freed = if e.freed { " freed" } else { "" };
        let _ = writeln!(
            self.writer,
            "[job:release] unit={} at {:.1}µs age={:.1}µs{freed}",
            e.unit.0,
            self.host_us(e.timestamp),
            self.ticks_to_us(e.age.ticks()),
        );
    }

    fn on_job_drained(&mut self, e: &UnitEvent) {
        let _ = writeln!(
            self.writer,
            "[job:drain] unit={} at {:.1}µs",
            e.unit.0,
            self.host_us(e.timestamp),
        );
    }

    fn on_viewport_solved(&mut self, e: &ViewportSolvedEvent) {
        let _ = writeln!(
            self.writer,
            "[solve] unit={} {} {} at {:.1}µs flags={:?}",
            e.unit.0,
            viewport_name(e.viewport),
            type_name(e.vp_type),
            self.host_us(e.timestamp),
            e.exceptions,
        );
    }

    fn on_solve_failed(&mut self, e: &SolveFailedEvent) {
        let _ = writeln!(
            self.writer,
            "[solve:FAILED] unit={} {} at {:.1}µs error={}",
            e.unit.0,
            viewport_name(e.viewport),
            self.host_us(e.timestamp),
            error_name(e.error),
        );
    }

    fn on_latched(&mut self, e: &LatchEvent) {
        let stale = if e.stale { " stale" } else { "" };
        let _ = writeln!(
            self.writer,
            "[latch] unit={} {} at {:.1}µs{stale}",
            e.unit.0,
            viewport_name(e.viewport),
            self.host_us(e.timestamp),
        );
    }

    fn on_latch_skipped(&mut self, e: &ViewportEvent) {
        let _ = writeln!(
            self.writer,
            "[latch:skip] unit={} {} at {:.1}µs",
            e.unit.0,
            viewport_name(e.viewport),
            self.host_us(e.timestamp),
        );
    }

    fn on_flush_reissued(&mut self, e: &UnitEvent) {
        let _ = writeln!(
            self.writer,
            "[flush] unit={} at {:.1}µs",
            e.unit.0,
            self.host_us(e.timestamp),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timewarp_core::job::UnitId;
    use timewarp_core::softfloat::RoundException;

    fn output(sink: PrettyPrintSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_writer()).unwrap()
    }

    #[test]
    fn pretty_print_job_created() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new(), Timebase::NANOS);
        sink.on_job_created(&JobCreatedEvent {
            unit: UnitId(1),
            timestamp: HostTime(2_500),
            mode: JobMode::Vp0Vp1Seq,
            sensor_timestamp: None,
        });
        let output = output(sink);
        assert!(output.contains("[job:create]"), "got: {output}");
        assert!(output.contains("unit=1"), "got: {output}");
        assert!(output.contains("at 2.5µs"), "got: {output}");
        assert!(output.contains("mode=seq sensor=-"), "got: {output}");
    }

    #[test]
    fn pretty_print_solve_outcomes() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new(), Timebase::NANOS);
        sink.on_viewport_solved(&ViewportSolvedEvent {
            unit: UnitId(0),
            timestamp: HostTime(0),
            viewport: ViewportIndex::Right,
            vp_type: ViewportType::Quad,
            exceptions: RoundException::INEXACT,
        });
        sink.on_solve_failed(&SolveFailedEvent {
            unit: UnitId(0),
            timestamp: HostTime(0),
            viewport: ViewportIndex::Left,
            error: SolveError::Singular,
        });
        let output = output(sink);
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2, "got: {output}");
        assert!(lines[0].contains("vp1 quad"), "got: {}", lines[0]);
        assert!(lines[0].contains("INEXACT"), "got: {}", lines[0]);
        assert!(lines[1].contains("error=singular"), "got: {}", lines[1]);
    }
}

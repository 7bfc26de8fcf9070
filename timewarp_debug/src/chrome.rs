// Copyright 2026 the Timewarp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! Each unit becomes a process. Thread 0 carries the job lifecycle, with the
//! span from pickup to release drawn as a duration slice; threads 1 and 2
//! carry the left and right viewports.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use timewarp_core::job::ViewportIndex;
use timewarp_core::time::Timebase;

use crate::recorder::{RecordedEvent, decode};

const JOB_TID: u32 = 0;

fn viewport_tid(viewport: ViewportIndex) -> u32 {
    match viewport {
        ViewportIndex::Left => 1,
        ViewportIndex::Right => 2,
    }
}

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Timestamps are converted to microseconds using the provided [`Timebase`].
pub fn export(bytes: &[u8], timebase: Timebase, writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();

    for recorded in decode(bytes) {
        let ts = ticks_to_us(recorded.timestamp().ticks(), timebase);
        let pid = recorded.unit().0;
        let instant = |name: &str, cat: &str, tid: u32, args: Value| {
            json!({
                "ph": "i",
                "name": name,
                "cat": cat,
                "ts": ts,
                "pid": pid,
                "tid": tid,
                "s": "t",
                "args": args,
            })
        };
        let event = match recorded {
            RecordedEvent::JobCreated(e) => instant(
                "JobCreated",
                "Job",
                JOB_TID,
                json!({
                    "mode": format!("{:?}", e.mode),
                    "sensor_timestamp": e.sensor_timestamp,
                }),
            ),
            RecordedEvent::JobEvicted(_) => instant("JobEvicted", "Job", JOB_TID, json!({})),
            RecordedEvent::JobAllocFailed(e) => instant(
                "JobAllocFailed",
                "Job",
                JOB_TID,
                json!({ "live": e.live, "limit": e.limit }),
            ),
            RecordedEvent::JobPickedUp(e) => json!({
                "ph": "B",
                "name": "InFlight",
                "cat": "Job",
                "ts": ts,
                "pid": pid,
                "tid": JOB_TID,
                "args": { "refcount": e.refcount },
            }),
            RecordedEvent::JobReleased(e) => json!({
                "ph": "E",
                "name": "InFlight",
                "cat": "Job",
                "ts": ts,
                "pid": pid,
                "tid": JOB_TID,
                "args": {
                    "freed": e.freed,
                    "age_us": ticks_to_us(e.age.ticks(), timebase),
                },
            }),
            RecordedEvent::JobDrained(_) => instant("JobDrained", "Job", JOB_TID, json!({})),
            RecordedEvent::ViewportSolved(e) => instant(
                "Solved",
                "Viewport",
                viewport_tid(e.viewport),
                json!({
                    "vp_type": format!("{:?}", e.vp_type),
                    "exceptions": e.exceptions.bits(),
                }),
            ),
            RecordedEvent::SolveFailed(e) => instant(
                "SolveFailed",
                "Viewport",
                viewport_tid(e.viewport),
                json!({ "error": format!("{:?}", e.error) }),
            ),
            RecordedEvent::Latched(e) => instant(
                "Latched",
                "Viewport",
                viewport_tid(e.viewport),
                json!({ "stale": e.stale }),
            ),
            RecordedEvent::LatchSkipped(e) => {
                instant("LatchSkipped", "Viewport", viewport_tid(e.viewport), json!({}))
            }
            RecordedEvent::FlushReissued(_) => {
                instant("FlushReissued", "Job", JOB_TID, json!({}))
            }
        };
        events.push(event);
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn ticks_to_us(ticks: u64, timebase: Timebase) -> f64 {
    timebase.ticks_to_nanos(ticks) as f64 / 1000.0
}

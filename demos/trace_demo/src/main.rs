// Copyright 2026 the Timewarp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated display pipeline that exercises reprojection and tracing.
//!
//! Runs 120 frames at 90 Hz through two warp units while a simulated head
//! turns and sways. Unit 0 warps a projection layer and a quad sequentially;
//! unit 1 warps a projection layer on both viewports and is switched off for
//! a stretch in the middle. Events are recorded with a
//! [`RecorderSink`](timewarp_debug::recorder::RecorderSink), replayed into a
//! [`PrettyPrintSink`](timewarp_debug::pretty::PrettyPrintSink), and
//! exported as a Chrome trace JSON file.

use std::fs::File;
use std::io::BufWriter;

use timewarp_core::config::{PipelineConfig, RingLayout};
use timewarp_core::job::{IrqEvent, JobMode, JobRequest, Pipeline, UnitId, ViewportRequest};
use timewarp_core::matrix::Matrix4;
use timewarp_core::pose::Position;
use timewarp_core::quat::Quaternion;
use timewarp_core::softfloat::Float32;
use timewarp_core::time::{HostTime, Timebase};
use timewarp_core::trace::Tracer;

use timewarp_debug::pretty::PrettyPrintSink;
use timewarp_debug::recorder::{RecorderSink, decode};
use timewarp_harness::{FrameClock, RegisterFile, SensorWriter};

const FRAME_COUNT: u32 = 120;
/// Yaw rate of the simulated head, in radians per frame.
const YAW_PER_FRAME: f32 = 0.004;
/// Frames between commits; jobs are re-warped in between.
const COMMIT_INTERVAL: u32 = 3;

fn head_pose(frame: u32, phase: f32) -> (Position, Quaternion) {
    let t = frame as f32 + phase;
    let half = t * YAW_PER_FRAME / 2.0;
    let sway = (t * 0.05).sin() * 0.01;
    (
        Position::from_f32(sway, 1.6, 0.0),
        Quaternion::from_f32(0.0, half.sin(), 0.0, half.cos()),
    )
}

fn requests(frame: u32) -> [Option<JobRequest>; 2] {
    let render = Matrix4::from_f32_rows([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);
    let quad = Matrix4::translation(Float32::ZERO, Float32::ZERO, Float32::TWO);
    let unit0 = JobRequest {
        mode: JobMode::Vp0Vp1Seq,
        left: ViewportRequest::projection(render, Matrix4::IDENTITY),
        right: ViewportRequest::quad(quad, Matrix4::IDENTITY),
    };
    let unit1 = JobRequest {
        mode: JobMode::Vp0Vp1Simult,
        left: ViewportRequest::projection(render, Matrix4::IDENTITY),
        right: ViewportRequest::projection(render, Matrix4::IDENTITY),
    };
    let unit1_active = !(40..70).contains(&frame);
    [Some(unit0), unit1_active.then_some(unit1)]
}

fn main() {
    let timebase = Timebase::NANOS;

    // -- pipeline and collaborators ----------------------------------------
    let pipeline = Pipeline::new(2, PipelineConfig::DEFAULT);
    let mut sensor = SensorWriter::new(RingLayout::DEFAULT);
    sensor.attach(pipeline.sensor());
    let mut registers = RegisterFile::new();
    let mut clock = FrameClock::hz90();

    let mut recorder = RecorderSink::new();

    // -- simulated loop ----------------------------------------------------
    let mut sensor_ts = 0_u32;
    let mut publish = |sensor: &mut SensorWriter, frame: u32, phase: f32| {
        let (position, orientation) = head_pose(frame, phase);
        sensor.publish_pose(sensor_ts, position, orientation);
        sensor_ts = sensor_ts.wrapping_add(1);
    };

    for frame in 0..FRAME_COUNT {
        let mut tracer = Tracer::new(&mut recorder);
        let (start, end) = clock.next_frame();

        // Commit happens mid-frame before the one it is meant for.
        if frame % COMMIT_INTERVAL == 0 {
            publish(&mut sensor, frame, 0.0);
            let commit_at = HostTime(start.ticks().saturating_sub(4_000_000));
            let outcome = pipeline.commit(&requests(frame), commit_at, &mut tracer);
            if outcome.failed > 0 {
                println!("frame {frame}: {} job(s) not created", outcome.failed);
            }
        }
        if frame == 10 {
            // The backend held back a flush until unit 0 has its matrices.
            if let Some(unit) = pipeline.unit(UnitId(0)) {
                unit.postpone_flush();
            }
        }

        publish(&mut sensor, frame, 0.5);
        for unit in pipeline.units() {
            pipeline.handle_event(unit.id(), IrqEvent::AsyncRp, &mut registers, start, &mut tracer);
        }
        publish(&mut sensor, frame, 0.9);
        for unit in pipeline.units() {
            pipeline.handle_event(unit.id(), IrqEvent::FrameEnd, &mut registers, end, &mut tracer);
        }
    }

    // -- report ------------------------------------------------------------
    let mut pretty = PrettyPrintSink::with_writer(std::io::stdout(), timebase);
    for event in decode(recorder.as_bytes()) {
        event.replay(&mut pretty);
    }
    for unit in pipeline.units() {
        println!("unit {}: {:?}", unit.id().0, unit.stats());
    }
    println!(
        "{} latches, {} flush re-issues",
        registers.latch_count(),
        registers.flush_count()
    );

    // -- export Chrome trace -----------------------------------------------
    let path = "trace.json";
    let file = File::create(path).expect("failed to create trace.json");
    let mut writer = BufWriter::new(file);
    timewarp_debug::chrome::export(recorder.as_bytes(), timebase, &mut writer)
        .expect("failed to write Chrome trace");

    println!("Wrote {path} ({FRAME_COUNT} frames)");
}

// Copyright 2026 the Timewarp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end scenarios: sensor ring, commit, interrupts, registers.

use timewarp_core::config::{PipelineConfig, RingLayout};
use timewarp_core::fixed::FixedMatrix3;
use timewarp_core::job::{
    IrqEvent, JobMode, JobRequest, Pipeline, UnitId, UnitState, ViewportIndex, ViewportRequest,
};
use timewarp_core::matrix::Matrix4;
use timewarp_core::pose::Position;
use timewarp_core::quat::Quaternion;
use timewarp_core::softfloat::Float32;
use timewarp_core::time::HostTime;
use timewarp_core::trace::Tracer;
use timewarp_harness::{FrameClock, RegisterFile, RegisterWrite, SensorWriter};

const Q_ONE: u32 = 0x4000_0000;
const Q_HALF: u32 = 0x2000_0000;
const Q_NEG_HALF: u32 = 0xE000_0000;
const Q_QUARTER: u32 = 0x1000_0000;
const Q_NEG_QUARTER: u32 = 0xF000_0000;

const UNIT: UnitId = UnitId(0);

fn render() -> Matrix4 {
    Matrix4::from_f32_rows([
        [1.0, 0.0, 0.0, 0.25],
        [0.0, 0.5, 0.0, -0.25],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ])
}

/// `render()` after projection to 3×3 and conversion to Q1.30.
const RENDER_Q: [u32; 9] = [Q_ONE, 0, Q_QUARTER, 0, Q_HALF, Q_NEG_QUARTER, 0, 0, Q_ONE];

fn quad_at(z: Float32) -> Matrix4 {
    Matrix4::translation(Float32::ZERO, Float32::ZERO, z)
}

/// A pipeline whose sensor reports a fixed pose: head at (0.5, 1.5, -2),
/// looking straight ahead.
fn rig(units: u32) -> (Pipeline, SensorWriter) {
    let pipeline = Pipeline::new(units, PipelineConfig::DEFAULT);
    let mut writer = SensorWriter::new(RingLayout::DEFAULT);
    writer.attach(pipeline.sensor());
    writer.publish_pose(
        1000,
        Position::from_f32(0.5, 1.5, -2.0),
        Quaternion::IDENTITY,
    );
    (pipeline, writer)
}

fn seq_request() -> JobRequest {
    JobRequest {
        mode: JobMode::Vp0Vp1Seq,
        left: ViewportRequest::projection(render(), Matrix4::IDENTITY),
        right: ViewportRequest::quad(quad_at(Float32::TWO), Matrix4::IDENTITY),
    }
}

#[test]
fn sequential_job_with_unchanged_pose() {
    let (pipeline, _writer) = rig(1);
    let mut regs = RegisterFile::new();
    let mut tracer = Tracer::none();
    let mut clock = FrameClock::hz90();

    pipeline.commit(&[Some(seq_request())], HostTime(0), &mut tracer);
    let job = pipeline.unit(UNIT).unwrap().get_job().unwrap();
    assert_eq!(job.sensor_timestamp(), Some(1000));
    drop(job);

    let (start, end) = clock.next_frame();
    assert!(pipeline.handle_event(UNIT, IrqEvent::AsyncRp, &mut regs, start, &mut tracer));
    let left = regs.registers(UNIT, ViewportIndex::Left).unwrap();
    assert_eq!(left.a.0, RENDER_Q, "zero warp leaves the render matrix");
    assert_eq!(left.b, left.a);
    assert_eq!(
        regs.registers(UNIT, ViewportIndex::Right),
        None,
        "right viewport waits for frame end"
    );

    assert!(pipeline.handle_event(UNIT, IrqEvent::FrameEnd, &mut regs, end, &mut tracer));
    let right = regs.registers(UNIT, ViewportIndex::Right).unwrap();
    assert_eq!(right.a.0, [Q_HALF, 0, Q_HALF, 0, Q_NEG_HALF, Q_HALF, 0, 0, Q_ONE]);
    assert_eq!(regs.latch_count(), 2);

    let unit = pipeline.unit(UNIT).unwrap();
    assert!(!unit.has_current_job());
    assert_eq!(unit.state(), UnitState::Queued);
}

#[test]
fn unreplaced_job_is_rewarped_every_frame() {
    let (pipeline, _writer) = rig(1);
    let mut regs = RegisterFile::new();
    let mut tracer = Tracer::none();
    let mut clock = FrameClock::hz90();

    pipeline.commit(&[Some(seq_request())], HostTime(0), &mut tracer);
    for _ in 0..3 {
        let (start, end) = clock.next_frame();
        pipeline.handle_event(UNIT, IrqEvent::AsyncRp, &mut regs, start, &mut tracer);
        pipeline.handle_event(UNIT, IrqEvent::FrameEnd, &mut regs, end, &mut tracer);
    }
    let left = regs.registers(UNIT, ViewportIndex::Left).unwrap();
    let right = regs.registers(UNIT, ViewportIndex::Right).unwrap();
    assert_eq!((left.latches, right.latches), (3, 3));
    let stats = pipeline.unit(UNIT).unwrap().stats();
    assert_eq!((stats.created, stats.picked_up, stats.released), (1, 3, 3));
}

#[test]
fn head_translation_shifts_quad() {
    let (pipeline, mut writer) = rig(1);
    let mut regs = RegisterFile::new();
    let mut tracer = Tracer::none();
    let request = JobRequest {
        mode: JobMode::Vp0,
        left: ViewportRequest::quad(quad_at(Float32::TWO), Matrix4::IDENTITY),
        right: ViewportRequest::NONE,
    };
    pipeline.commit(&[Some(request)], HostTime(0), &mut tracer);

    // One unit to the right of the reference position.
    writer.publish_pose(
        1001,
        Position::from_f32(1.5, 1.5, -2.0),
        Quaternion::IDENTITY,
    );
    pipeline.handle_event(UNIT, IrqEvent::AsyncRp, &mut regs, HostTime(1), &mut tracer);
    let left = regs.registers(UNIT, ViewportIndex::Left).unwrap();
    assert_eq!(left.a.0, [Q_HALF, 0, 0, 0, Q_NEG_HALF, Q_HALF, 0, 0, Q_ONE]);
}

#[test]
fn back_facing_quad_clips_layer() {
    let (pipeline, _writer) = rig(1);
    let mut regs = RegisterFile::new();
    let mut tracer = Tracer::none();
    let request = JobRequest {
        mode: JobMode::Vp1,
        left: ViewportRequest::NONE,
        right: ViewportRequest::quad(quad_at(Float32::TWO.neg()), Matrix4::IDENTITY),
    };
    pipeline.commit(&[Some(request)], HostTime(0), &mut tracer);
    pipeline.handle_event(UNIT, IrqEvent::AsyncRp, &mut regs, HostTime(1), &mut tracer);
    let right = regs.registers(UNIT, ViewportIndex::Right).unwrap();
    assert_eq!(right.a, FixedMatrix3::ZERO);
    assert_eq!(right.b, FixedMatrix3::ZERO);
}

#[test]
fn singular_helmet_keeps_previous_registers() {
    let (pipeline, _writer) = rig(1);
    let mut regs = RegisterFile::new();
    let mut tracer = Tracer::none();
    let good = JobRequest {
        mode: JobMode::Vp0,
        left: ViewportRequest::projection(render(), Matrix4::IDENTITY),
        right: ViewportRequest::NONE,
    };
    pipeline.commit(&[Some(good)], HostTime(0), &mut tracer);
    pipeline.handle_event(UNIT, IrqEvent::AsyncRp, &mut regs, HostTime(1), &mut tracer);
    pipeline.handle_event(UNIT, IrqEvent::FrameEnd, &mut regs, HostTime(2), &mut tracer);
    regs.clear_log();

    let singular = JobRequest {
        left: ViewportRequest::projection(render(), Matrix4::ZERO),
        ..good
    };
    pipeline.commit(&[Some(singular)], HostTime(3), &mut tracer);
    pipeline.handle_event(UNIT, IrqEvent::AsyncRp, &mut regs, HostTime(4), &mut tracer);

    assert!(regs.log().is_empty(), "no register traffic: {:?}", regs.log());
    let left = regs.registers(UNIT, ViewportIndex::Left).unwrap();
    assert_eq!(left.a.0, RENDER_Q);
    assert_eq!(left.latches, 1);
    let stats = pipeline.unit(UNIT).unwrap().stats();
    assert_eq!((stats.solve_failures, stats.latch_skips), (1, 1));
}

#[test]
fn queue_holds_only_the_newest_job() {
    let (pipeline, _writer) = rig(1);
    let mut tracer = Tracer::none();
    for t in 0..10 {
        pipeline.commit(&[Some(seq_request())], HostTime(t), &mut tracer);
    }
    let unit = pipeline.unit(UNIT).unwrap();
    assert_eq!(unit.queued_refcount(), Some(1));
    assert_eq!(unit.live_jobs(), 1);
    assert_eq!(unit.get_job().unwrap().created_at(), HostTime(9));
}

#[test]
fn consumption_without_job_writes_nothing() {
    let (pipeline, _writer) = rig(2);
    let mut regs = RegisterFile::new();
    let mut tracer = Tracer::none();
    for unit in [UnitId(0), UnitId(1)] {
        pipeline.handle_event(unit, IrqEvent::AsyncRp, &mut regs, HostTime(1), &mut tracer);
        pipeline.handle_event(unit, IrqEvent::FrameEnd, &mut regs, HostTime(2), &mut tracer);
    }
    assert!(regs.log().is_empty());
    assert!(pipeline.units().iter().all(|u| !u.has_current_job()));
}

#[test]
fn detached_ring_means_zero_warp() {
    let pipeline = Pipeline::new(1, PipelineConfig::DEFAULT);
    let mut regs = RegisterFile::new();
    let mut tracer = Tracer::none();
    pipeline.commit(&[Some(seq_request())], HostTime(0), &mut tracer);
    assert_eq!(
        pipeline.unit(UNIT).unwrap().get_job().unwrap().sensor_timestamp(),
        None
    );
    pipeline.handle_event(UNIT, IrqEvent::AsyncRp, &mut regs, HostTime(1), &mut tracer);
    assert_eq!(regs.registers(UNIT, ViewportIndex::Left).unwrap().a.0, RENDER_Q);
}

#[test]
fn postponed_flush_follows_the_latch() {
    let (pipeline, _writer) = rig(1);
    let mut regs = RegisterFile::new();
    let mut tracer = Tracer::none();
    pipeline.commit(&[Some(seq_request())], HostTime(0), &mut tracer);
    pipeline.unit(UNIT).unwrap().postpone_flush();
    pipeline.handle_event(UNIT, IrqEvent::AsyncRp, &mut regs, HostTime(1), &mut tracer);
    pipeline.handle_event(UNIT, IrqEvent::FrameEnd, &mut regs, HostTime(2), &mut tracer);

    let flush_at = regs
        .log()
        .iter()
        .position(|w| matches!(w, RegisterWrite::Flush { .. }))
        .unwrap();
    // Eighteen coefficients and two triggers for the left viewport come first.
    assert_eq!(flush_at, 20);
    assert_eq!(regs.flush_count(), 1);
}

#[test]
fn postponed_flush_is_not_held_by_a_failing_viewport() {
    let (pipeline, _writer) = rig(1);
    let mut regs = RegisterFile::new();
    let mut tracer = Tracer::none();
    let mut clock = FrameClock::hz90();
    let singular = JobRequest {
        mode: JobMode::Vp0,
        left: ViewportRequest::projection(render(), Matrix4::ZERO),
        right: ViewportRequest::NONE,
    };
    pipeline.commit(&[Some(singular)], HostTime(0), &mut tracer);
    pipeline.unit(UNIT).unwrap().postpone_flush();
    for _ in 0..3 {
        let (start, end) = clock.next_frame();
        pipeline.handle_event(UNIT, IrqEvent::AsyncRp, &mut regs, start, &mut tracer);
        pipeline.handle_event(UNIT, IrqEvent::FrameEnd, &mut regs, end, &mut tracer);
    }

    assert_eq!(regs.log(), [RegisterWrite::Flush { unit: UNIT }]);
    assert_eq!(regs.latch_count(), 0);
    assert_eq!(pipeline.unit(UNIT).unwrap().stats().flush_reissues, 1);
}

#[test]
fn commit_drains_units_that_go_inactive() {
    let (pipeline, _writer) = rig(2);
    let mut tracer = Tracer::none();
    let requests = [Some(seq_request()), Some(seq_request())];
    let outcome = pipeline.commit(&requests, HostTime(0), &mut tracer);
    assert_eq!(outcome.created, 2);
    let outcome = pipeline.commit(&[Some(seq_request())], HostTime(1), &mut tracer);
    assert_eq!((outcome.created, outcome.drained), (1, 1));
    assert_eq!(pipeline.unit(UnitId(1)).unwrap().state(), UnitState::Idle);
    assert_eq!(pipeline.unit(UnitId(1)).unwrap().live_jobs(), 0);
}

#[test]
fn producer_and_consumer_on_separate_threads() {
    let (pipeline, _writer) = rig(1);
    let frames = 500;

    std::thread::scope(|s| {
        s.spawn(|| {
            let mut tracer = Tracer::none();
            for t in 0..frames {
                pipeline.commit(&[Some(seq_request())], HostTime(t), &mut tracer);
            }
        });
        s.spawn(|| {
            let mut regs = RegisterFile::new();
            let mut tracer = Tracer::none();
            let mut clock = FrameClock::new(HostTime(0), 2, 1);
            for _ in 0..frames {
                let (start, end) = clock.next_frame();
                pipeline.handle_event(UNIT, IrqEvent::AsyncRp, &mut regs, start, &mut tracer);
                pipeline.handle_event(UNIT, IrqEvent::FrameEnd, &mut regs, end, &mut tracer);
            }
        });
    });

    let unit = pipeline.unit(UNIT).unwrap();
    let stats = unit.stats();
    assert_eq!(stats.alloc_failures, 0, "one queued plus one in flight fits");
    assert_eq!(stats.picked_up, stats.released);
    assert!(!unit.has_current_job());
    assert_eq!(unit.queued_refcount(), Some(1));
    assert_eq!(unit.live_jobs(), 1);
}

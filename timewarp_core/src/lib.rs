// Copyright 2026 the Timewarp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deterministic warp math and the job pipeline for asynchronous reprojection.
//!
//! `timewarp_core` computes the homographies a display controller's warp unit
//! applies to an already rendered layer, using a late head-pose sample to hide
//! render latency. It is `no_std` (with `alloc`), performs all arithmetic in
//! software IEEE-754 binary32 so results are bit-identical on every host, and
//! never blocks or allocates on its interrupt path.
//!
//! # Architecture
//!
//! ```text
//!   commit ──► Pipeline::commit ──► PipelineUnit::create_job ──► [queue]
//!                                         ▲ reference pose            │
//!   SensorRing ───────────────────────────┤                           │
//!                                         ▼ current pose              ▼
//!   AsyncRp / FrameEnd ──► PipelineUnit::handle_event ──► ViewportCalc::solve
//!                                                                │
//!                                  HardwareLatch::latch ◄── FixedMatrix3 A, B
//! ```
//!
//! **[`softfloat`]**: `Float32` and the rounding-exception accumulator.
//! Every other module computes through it.
//!
//! **[`fixed`]**: conversion to register fixed-point formats such as Q1.30.
//!
//! **[`matrix`]**, **[`quat`]**: 4×4 and 3×3 matrix algebra and
//! quaternion-to-rotation conversion.
//!
//! **[`pose`]**: the shared-memory sensor ring and its pose records.
//!
//! **[`solver`]**: projection and quad warps, per viewport.
//!
//! **[`job`]**: per-unit job queues and the two-interrupt consumption
//! protocol.
//!
//! **[`config`]**, **[`time`]**: configuration presets and interrupt
//! timestamps.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types, with
//! the zero-overhead [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod fixed;
pub mod job;
pub mod matrix;
pub mod pose;
pub mod quat;
pub mod softfloat;
pub mod solver;
pub mod time;
pub mod trace;

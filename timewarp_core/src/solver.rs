// Copyright 2026 the Timewarp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-viewport warp computation.
//!
//! A viewport's warp is a 3×3 homography that maps display coordinates to
//! source-image coordinates, corrected for the head motion between the pose
//! the frame was rendered with (the job's *reference* pose) and the pose at
//! scan-out (the *current* pose):
//!
//! ```text
//!   projection:  render · (R_ref · R_cur⁻¹) · helmet⁻¹
//!
//!   quad:        view  = Y_FLIP · (R_ref · R_cur⁻¹) · T(p_cur − p_ref)
//!                plane = view · render            columns u, v, n, o
//!                n·o ≥ 0 ?  HALF_NDC · (helmet · [u v e₂ o])⁻¹  :  0
//! ```
//!
//! The 4×4 result is projected to 3×3 (rows and columns 0, 1, 3), normalized
//! by its largest entry and converted to the register format. Both output
//! matrices receive the same coefficients.

use core::fmt;

use crate::config::ReprojectionConfig;
use crate::fixed::{FixedFormat, FixedMatrix3};
use crate::matrix::{DegenerateMatrix, Matrix4, SingularMatrix};
use crate::pose::{Pose, Position};
use crate::softfloat::{self, Float32, RoundException};

/// Which warp a viewport uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ViewportType {
    /// No warp: identity coefficients.
    #[default]
    None,
    /// The layer is a projection of the scene rendered with `m1`.
    Projection,
    /// The layer is a flat quad placed in the world by `m1`.
    Quad,
}

/// A failed warp computation. The viewport keeps its previous coefficients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveError {
    /// A 4×4 inversion hit a near-zero determinant.
    Singular,
    /// The projected 3×3 matrix could not be normalized.
    Degenerate,
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singular => f.write_str("warp requires inverting a singular matrix"),
            Self::Degenerate => f.write_str("warp matrix has no usable scale"),
        }
    }
}

impl core::error::Error for SolveError {}

impl From<SingularMatrix> for SolveError {
    fn from(_: SingularMatrix) -> Self {
        Self::Singular
    }
}

impl From<DegenerateMatrix> for SolveError {
    fn from(_: DegenerateMatrix) -> Self {
        Self::Degenerate
    }
}

/// Result of the quad algorithm before projection to 3×3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuadWarp {
    /// The quad faces the viewer; display-to-plane homography.
    Homography(Matrix4),
    /// The quad faces away and the whole layer is clipped.
    BackFacing,
}

impl QuadWarp {
    /// The 4×4 result, [`Matrix4::ZERO`] when back-facing.
    #[must_use]
    pub const fn matrix(&self) -> Matrix4 {
        match self {
            Self::Homography(m) => *m,
            Self::BackFacing => Matrix4::ZERO,
        }
    }
}

/// `render · (R_ref · R_cur⁻¹) · helmet⁻¹`.
///
/// `current` holds the non-inverted current orientation.
pub fn projection_transform(
    render: &Matrix4,
    helmet: &Matrix4,
    reference: &Pose,
    current: &Pose,
    singular_epsilon: Float32,
    exc: &mut RoundException,
) -> Result<Matrix4, SingularMatrix> {
    let current_inv = current.orientation.inverse(singular_epsilon, exc)?;
    let helmet_inv = helmet.inverse(singular_epsilon, exc)?;
    let delta = reference.orientation.mul(&current_inv, exc);
    let warped = render.mul(&delta, exc);
    Ok(warped.mul(&helmet_inv, exc))
}

/// The quad display-to-plane homography.
///
/// `current` holds the *inverted* current orientation, as sampled with
/// `invert = true`.
pub fn quad_transform(
    render: &Matrix4,
    helmet: &Matrix4,
    reference: &Pose,
    current: &Pose,
    singular_epsilon: Float32,
    exc: &mut RoundException,
) -> Result<QuadWarp, SingularMatrix> {
    let delta = reference.orientation.mul(&current.orientation, exc);
    let d = current.position.sub(&reference.position, exc);
    let view = Matrix4::Y_FLIP
        .mul(&delta, exc)
        .mul(&Matrix4::translation(d.x, d.y, d.z), exc);
    let plane = view.mul(render, exc);

    let [ux, uy, uz, _] = plane.column(0);
    let [vx, vy, vz, _] = plane.column(1);
    let normal = Position::from_column(plane.column(2));
    let origin = Position::from_column(plane.column(3));

    let facing = normal.dot(&origin, exc);
    if !softfloat::ge(facing, Float32::ZERO, exc) {
        return Ok(QuadWarp::BackFacing);
    }

    // Plane basis as columns; the unused third column is e₂ so that the
    // 4×4 inverse carries the 3×3 inverse in rows and columns 0, 1, 3.
    let zero = Float32::ZERO;
    let basis = Matrix4::from_rows([
        [ux, vx, zero, origin.x],
        [uy, vy, zero, origin.y],
        [uz, vz, zero, origin.z],
        [zero, zero, zero, Float32::ONE],
    ]);
    let mut g = helmet.mul(&basis, exc);
    for i in 0..4 {
        g.m[2 * 4 + i] = zero;
        g.m[i * 4 + 2] = zero;
    }
    g.m[2 * 4 + 2] = Float32::ONE;

    let g_inv = g.inverse(singular_epsilon, exc)?;
    Ok(QuadWarp::Homography(Matrix4::HALF_NDC.mul(&g_inv, exc)))
}

/// One viewport's warp inputs and register outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewportCalc {
    /// Warp algorithm.
    pub vp_type: ViewportType,
    /// Render matrix (projection) or quad placement matrix (quad).
    pub m1: Matrix4,
    /// Helmet (eye projection) matrix.
    pub m2: Matrix4,
    a: FixedMatrix3,
    b: FixedMatrix3,
}

impl ViewportCalc {
    /// A viewport with identity outputs in `format`.
    #[must_use]
    pub fn new(vp_type: ViewportType, m1: Matrix4, m2: Matrix4, format: FixedFormat) -> Self {
        let identity = FixedMatrix3::identity(format);
        Self {
            vp_type,
            m1,
            m2,
            a: identity,
            b: identity,
        }
    }

    /// Primary (left) output coefficients.
    #[inline]
    #[must_use]
    pub const fn a(&self) -> &FixedMatrix3 {
        &self.a
    }

    /// Secondary (right) output coefficients.
    #[inline]
    #[must_use]
    pub const fn b(&self) -> &FixedMatrix3 {
        &self.b
    }

    /// Recomputes the outputs for `current`.
    ///
    /// For [`ViewportType::Quad`] the current orientation must be inverted;
    /// for [`ViewportType::Projection`] it must not be. On error the outputs
    /// are left exactly as they were.
    pub fn solve(
        &mut self,
        reference: &Pose,
        current: &Pose,
        config: &ReprojectionConfig,
        exc: &mut RoundException,
    ) -> Result<(), SolveError> {
        let format = config.output_format;
        let eps = config.singular_epsilon;
        let warp = match self.vp_type {
            ViewportType::None => {
                self.a = FixedMatrix3::identity(format);
                self.b = self.a;
                return Ok(());
            }
            ViewportType::Projection => {
                projection_transform(&self.m1, &self.m2, reference, current, eps, exc)?
            }
            ViewportType::Quad => {
                match quad_transform(&self.m1, &self.m2, reference, current, eps, exc)? {
                    QuadWarp::Homography(m) => m,
                    QuadWarp::BackFacing => {
                        self.a = FixedMatrix3::ZERO;
                        self.b = FixedMatrix3::ZERO;
                        return Ok(());
                    }
                }
            }
        };

        let mut m3 = warp.to_3x3();
        m3.normalize(exc)?;
        let a = FixedMatrix3::from_matrix3(&m3, format, exc);
        // Mono source: both registers get the same homography.
        self.a = a;
        self.b = a;
        Ok(())
    }
}

impl Default for ViewportCalc {
    fn default() -> Self {
        Self::new(
            ViewportType::None,
            Matrix4::IDENTITY,
            Matrix4::IDENTITY,
            FixedFormat::Q1_30,
        )
    }
}

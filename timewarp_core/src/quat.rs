// Copyright 2026 the Timewarp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Head orientation quaternions.

use bytemuck::{Pod, Zeroable};

use crate::matrix::Matrix4;
use crate::softfloat::{self, Float32, RoundException};

/// An orientation quaternion `w + xi + yj + zk`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct Quaternion {
    /// i component.
    pub x: Float32,
    /// j component.
    pub y: Float32,
    /// k component.
    pub z: Float32,
    /// Real component.
    pub w: Float32,
}

impl Quaternion {
    /// No rotation.
    pub const IDENTITY: Self = Self {
        x: Float32::ZERO,
        y: Float32::ZERO,
        z: Float32::ZERO,
        w: Float32::ONE,
    };

    /// Creates a quaternion from host floats (bit reinterpretation only).
    #[must_use]
    pub const fn from_f32(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self {
            x: Float32::from_f32(x),
            y: Float32::from_f32(y),
            z: Float32::from_f32(z),
            w: Float32::from_f32(w),
        }
    }

    /// The conjugate. Equals the inverse only for unit quaternions, which is
    /// all the sensor ever produces; the norm is not checked.
    #[must_use]
    pub const fn invert(self) -> Self {
        Self {
            x: self.x.neg(),
            y: self.y.neg(),
            z: self.z.neg(),
            w: self.w,
        }
    }

    /// `w² + x² + y² + z²`, summed in that order.
    #[must_use]
    pub fn norm_squared(&self, exc: &mut RoundException) -> Float32 {
        let ww = softfloat::mul(self.w, self.w, exc);
        let xx = softfloat::mul(self.x, self.x, exc);
        let yy = softfloat::mul(self.y, self.y, exc);
        let zz = softfloat::mul(self.z, self.z, exc);
        let s = softfloat::add(ww, xx, exc);
        let s = softfloat::add(s, yy, exc);
        softfloat::add(s, zz, exc)
    }

    /// The rotation matrix of a unit quaternion.
    ///
    /// Row and column 3 are zero except the bottom-right entry, which holds
    /// [`norm_squared`](Self::norm_squared) rather than `1`. For the unit
    /// quaternions the sensor delivers the two agree; a non-unit input shows
    /// up as a scaled homogeneous coordinate instead of being hidden.
    #[must_use]
    pub fn to_matrix4(&self, exc: &mut RoundException) -> Matrix4 {
        use softfloat::{add, mul, sub};

        fn twice(v: Float32, exc: &mut RoundException) -> Float32 {
            add(v, v, exc)
        }

        let Self { x, y, z, w } = *self;
        let ww = mul(w, w, exc);
        let xx = mul(x, x, exc);
        let yy = mul(y, y, exc);
        let zz = mul(z, z, exc);
        let xy = mul(x, y, exc);
        let zw = mul(z, w, exc);
        let xz = mul(x, z, exc);
        let yw = mul(y, w, exc);
        let yz = mul(y, z, exc);
        let xw = mul(x, w, exc);

        let mut m = Matrix4::ZERO;

        let d = add(ww, xx, exc);
        let d = sub(d, yy, exc);
        m.m[0] = sub(d, zz, exc);
        let d = sub(ww, xx, exc);
        let d = add(d, yy, exc);
        m.m[5] = sub(d, zz, exc);
        let d = sub(ww, xx, exc);
        let d = sub(d, yy, exc);
        m.m[10] = add(d, zz, exc);

        let t = sub(xy, zw, exc);
        m.m[1] = twice(t, exc);
        let t = add(xy, zw, exc);
        m.m[4] = twice(t, exc);
        let t = add(xz, yw, exc);
        m.m[2] = twice(t, exc);
        let t = sub(xz, yw, exc);
        m.m[8] = twice(t, exc);
        let t = sub(yz, xw, exc);
        m.m[6] = twice(t, exc);
        let t = add(yz, xw, exc);
        m.m[9] = twice(t, exc);

        m.m[15] = self.norm_squared(exc);
        m
    }
}

impl Default for Quaternion {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

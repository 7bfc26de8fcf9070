// Copyright 2026 the Timewarp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Row-major 4×4 and 3×3 matrices over [`Float32`].
//!
//! Only the operations warp computation needs: composition, cofactor
//! inversion, the 4×4 → 3×3 homography projection, and normalization by the
//! largest entry. Every sum is evaluated left to right starting from the first
//! product so results are reproducible bit for bit.

use core::fmt;

use bytemuck::{Pod, Zeroable};

use crate::softfloat::{self, Float32, RoundException};

/// A 4×4 matrix was too close to singular to invert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SingularMatrix;

impl fmt::Display for SingularMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("matrix determinant is below the singularity threshold")
    }
}

impl core::error::Error for SingularMatrix {}

/// A 3×3 matrix has no usable largest entry (all zero, infinite, or NaN).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DegenerateMatrix;

impl fmt::Display for DegenerateMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("matrix cannot be normalized by its largest entry")
    }
}

impl core::error::Error for DegenerateMatrix {}

/// A row-major 4×4 matrix.
///
/// The memory layout is sixteen binary32 values in native byte order. The
/// render and helmet matrix blobs handed over by the compositor use the same
/// order of entries, little-endian (see [`from_bytes`](Self::from_bytes)).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct Matrix4 {
    /// Entries in row-major order: `m[row * 4 + col]`.
    pub m: [Float32; 16],
}

impl Matrix4 {
    /// The identity matrix.
    pub const IDENTITY: Self = Self::from_f32_rows([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    /// All entries `+0`.
    pub const ZERO: Self = Self {
        m: [Float32::ZERO; 16],
    };

    /// Mirrors the Y axis (view space is Y-up, scan-out is Y-down).
    pub const Y_FLIP: Self = Self::from_f32_rows([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, -1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    /// Maps normalized device coordinates `[-1, 1]` to texture coordinates
    /// `[0, 1]` in X and Y.
    pub const HALF_NDC: Self = Self::from_f32_rows([
        [0.5, 0.0, 0.0, 0.5],
        [0.0, 0.5, 0.0, 0.5],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    /// Creates a matrix from rows.
    #[must_use]
    pub const fn from_rows(rows: [[Float32; 4]; 4]) -> Self {
        let mut m = [Float32::ZERO; 16];
        let mut r = 0;
        while r < 4 {
            let mut c = 0;
            while c < 4 {
                m[r * 4 + c] = rows[r][c];
                c += 1;
            }
            r += 1;
        }
        Self { m }
    }

    /// Creates a matrix from rows of host floats (bit reinterpretation only).
    #[must_use]
    pub const fn from_f32_rows(rows: [[f32; 4]; 4]) -> Self {
        let mut m = [Float32::ZERO; 16];
        let mut r = 0;
        while r < 4 {
            let mut c = 0;
            while c < 4 {
                m[r * 4 + c] = Float32::from_f32(rows[r][c]);
                c += 1;
            }
            r += 1;
        }
        Self { m }
    }

    /// A pure translation by `(x, y, z)`.
    #[must_use]
    pub const fn translation(x: Float32, y: Float32, z: Float32) -> Self {
        let mut t = Self::IDENTITY;
        t.m[3] = x;
        t.m[7] = y;
        t.m[11] = z;
        t
    }

    /// Decodes a 64-byte row-major little-endian blob.
    ///
    /// Returns `None` if `bytes` is not exactly 64 bytes long.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let words: &[[u8; 4]] = bytemuck::try_cast_slice(bytes).ok()?;
        if words.len() != 16 {
            return None;
        }
        let mut out = Self::ZERO;
        for (entry, word) in out.m.iter_mut().zip(words) {
            *entry = Float32::from_bits(u32::from_le_bytes(*word));
        }
        Some(out)
    }

    /// Entry at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `col` is 4 or more.
    #[inline]
    #[must_use]
    pub const fn get(&self, row: usize, col: usize) -> Float32 {
        self.m[row * 4 + col]
    }

    /// Column `col` as `[x, y, z, w]`.
    #[inline]
    #[must_use]
    pub const fn column(&self, col: usize) -> [Float32; 4] {
        [
            self.m[col],
            self.m[4 + col],
            self.m[8 + col],
            self.m[12 + col],
        ]
    }

    /// Swaps rows and columns.
    #[must_use]
    pub const fn transpose(&self) -> Self {
        let mut out = Self::ZERO;
        let mut r = 0;
        while r < 4 {
            let mut c = 0;
            while c < 4 {
                out.m[c * 4 + r] = self.m[r * 4 + c];
                c += 1;
            }
            r += 1;
        }
        out
    }

    /// `self · rhs`.
    #[must_use]
    pub fn mul(&self, rhs: &Self, exc: &mut RoundException) -> Self {
        let mut out = Self::ZERO;
        for r in 0..4 {
            for c in 0..4 {
                let mut acc = softfloat::mul(self.get(r, 0), rhs.get(0, c), exc);
                for k in 1..4 {
                    let p = softfloat::mul(self.get(r, k), rhs.get(k, c), exc);
                    acc = softfloat::add(acc, p, exc);
                }
                out.m[r * 4 + c] = acc;
            }
        }
        out
    }

    /// Determinant of the 3×3 minor left after deleting `row` and `col`.
    fn minor(&self, row: usize, col: usize, exc: &mut RoundException) -> Float32 {
        let mut e = [Float32::ZERO; 9];
        let mut i = 0;
        for r in (0..4).filter(|&r| r != row) {
            for c in (0..4).filter(|&c| c != col) {
                e[i] = self.get(r, c);
                i += 1;
            }
        }
        det3(&e, exc)
    }

    /// Inverse by cofactor expansion.
    ///
    /// The determinant is expanded along the first row. Fails when
    /// `|det| < singular_epsilon`, or when the determinant is NaN.
    pub fn inverse(
        &self,
        singular_epsilon: Float32,
        exc: &mut RoundException,
    ) -> Result<Self, SingularMatrix> {
        let mut cofactors = [Float32::ZERO; 16];
        for r in 0..4 {
            for c in 0..4 {
                let minor = self.minor(r, c, exc);
                cofactors[r * 4 + c] = if (r + c) % 2 == 0 { minor } else { minor.neg() };
            }
        }

        let mut det = softfloat::mul(self.m[0], cofactors[0], exc);
        for c in 1..4 {
            let term = softfloat::mul(self.m[c], cofactors[c], exc);
            det = softfloat::add(det, term, exc);
        }
        if !softfloat::ge(det.abs(), singular_epsilon, exc) {
            return Err(SingularMatrix);
        }

        let inv_det = softfloat::div(Float32::ONE, det, exc);
        let mut out = Self::ZERO;
        for r in 0..4 {
            for c in 0..4 {
                // Adjugate is the transposed cofactor matrix.
                out.m[c * 4 + r] = softfloat::mul(cofactors[r * 4 + c], inv_det, exc);
            }
        }
        Ok(out)
    }

    /// Projects to the 3×3 homography the warp unit consumes, keeping rows
    /// and columns 0, 1 and 3.
    #[must_use]
    pub const fn to_3x3(&self) -> Matrix3 {
        const KEEP: [usize; 3] = [0, 1, 3];
        let mut out = Matrix3::ZERO;
        let mut r = 0;
        while r < 3 {
            let mut c = 0;
            while c < 3 {
                out.m[r * 3 + c] = self.m[KEEP[r] * 4 + KEEP[c]];
                c += 1;
            }
            r += 1;
        }
        out
    }
}

impl Default for Matrix4 {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

fn det3(e: &[Float32; 9], exc: &mut RoundException) -> Float32 {
    fn diff(x: Float32, y: Float32, z: Float32, w: Float32, exc: &mut RoundException) -> Float32 {
        let p = softfloat::mul(x, y, exc);
        let q = softfloat::mul(z, w, exc);
        softfloat::sub(p, q, exc)
    }

    let [a, b, c, d, ee, f, g, h, i] = *e;
    let t0 = softfloat::mul(a, diff(ee, i, f, h, exc), exc);
    let t1 = softfloat::mul(b, diff(d, i, f, g, exc), exc);
    let t2 = softfloat::mul(c, diff(d, h, ee, g, exc), exc);
    let s = softfloat::sub(t0, t1, exc);
    softfloat::add(s, t2, exc)
}

/// A row-major 3×3 matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct Matrix3 {
    /// Entries in row-major order: `m[row * 3 + col]`.
    pub m: [Float32; 9],
}

impl Matrix3 {
    /// The identity matrix.
    pub const IDENTITY: Self = Self {
        m: [
            Float32::ONE,
            Float32::ZERO,
            Float32::ZERO,
            Float32::ZERO,
            Float32::ONE,
            Float32::ZERO,
            Float32::ZERO,
            Float32::ZERO,
            Float32::ONE,
        ],
    };

    /// All entries `+0`.
    pub const ZERO: Self = Self {
        m: [Float32::ZERO; 9],
    };

    /// Creates a matrix from rows.
    #[must_use]
    pub const fn from_rows(rows: [[Float32; 3]; 3]) -> Self {
        let [r0, r1, r2] = rows;
        Self {
            m: [
                r0[0], r0[1], r0[2], r1[0], r1[1], r1[2], r2[0], r2[1], r2[2],
            ],
        }
    }

    /// Entry at `(row, col)`.
    #[inline]
    #[must_use]
    pub const fn get(&self, row: usize, col: usize) -> Float32 {
        self.m[row * 3 + col]
    }

    /// `self · rhs`.
    #[must_use]
    pub fn mul(&self, rhs: &Self, exc: &mut RoundException) -> Self {
        let mut out = Self::ZERO;
        for r in 0..3 {
            for c in 0..3 {
                let mut acc = softfloat::mul(self.get(r, 0), rhs.get(0, c), exc);
                for k in 1..3 {
                    let p = softfloat::mul(self.get(r, k), rhs.get(k, c), exc);
                    acc = softfloat::add(acc, p, exc);
                }
                out.m[r * 3 + c] = acc;
            }
        }
        out
    }

    /// Divides every entry by the entry of largest magnitude.
    ///
    /// A homography is only defined up to scale; normalizing keeps the
    /// coefficients inside the `[-2, 2)` range of the output registers.
    ///
    /// The scan for the maximum uses signaling comparisons on a private flag
    /// set: any flag raised during the scan (i.e. a NaN entry), a zero
    /// maximum, or an infinite maximum fail with [`DegenerateMatrix`] and
    /// leave `self` untouched.
    pub fn normalize(&mut self, exc: &mut RoundException) -> Result<(), DegenerateMatrix> {
        let mut scan = RoundException::NONE;
        let mut max = Float32::ZERO;
        for v in self.m {
            let magnitude = v.abs();
            if softfloat::ge(magnitude, max, &mut scan) {
                max = magnitude;
            }
        }
        exc.insert(scan);
        if scan.intersects(RoundException::INVALID | RoundException::INEXACT)
            || max.is_zero()
            || max.is_infinite()
        {
            return Err(DegenerateMatrix);
        }
        for v in &mut self.m {
            *v = softfloat::div(*v, max, exc);
        }
        Ok(())
    }
}

impl Default for Matrix3 {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// `a · b`, or `None` if either operand is absent.
#[must_use]
pub fn mul4x4(
    a: Option<&Matrix4>,
    b: Option<&Matrix4>,
    exc: &mut RoundException,
) -> Option<Matrix4> {
    Some(a?.mul(b?, exc))
}

/// `a · b` for 3×3 matrices.
#[must_use]
pub fn mul3x3(a: &Matrix3, b: &Matrix3, exc: &mut RoundException) -> Matrix3 {
    a.mul(b, exc)
}

/// Inverts `m` with the default singularity threshold [`Float32::EPSILON`].
pub fn inverse4x4(m: &Matrix4, exc: &mut RoundException) -> Result<Matrix4, SingularMatrix> {
    m.inverse(Float32::EPSILON, exc)
}

/// See [`Matrix4::to_3x3`].
#[must_use]
pub const fn to_3x3(m: &Matrix4) -> Matrix3 {
    m.to_3x3()
}

/// See [`Matrix3::normalize`].
pub fn normalize3(m: &mut Matrix3, exc: &mut RoundException) -> Result<(), DegenerateMatrix> {
    m.normalize(exc)
}

/// The 4×4 identity.
#[must_use]
pub const fn identity4() -> Matrix4 {
    Matrix4::IDENTITY
}

/// The 3×3 identity.
#[must_use]
pub const fn identity3() -> Matrix3 {
    Matrix3::IDENTITY
}

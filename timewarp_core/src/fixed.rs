// Copyright 2026 the Timewarp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conversion from [`Float32`] to the fixed-point formats the warp unit's
//! coefficient registers accept.

use crate::matrix::Matrix3;
use crate::softfloat::{Float32, RoundException, shift_right_jam64};

/// A binary fixed-point layout: optional sign, integer bits, fraction bits.
///
/// Values are stored as two's complement when signed. The register pattern
/// occupies the low [`total_bits`](Self::total_bits) bits of a `u32`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FixedFormat {
    signed: bool,
    int_bits: u8,
    frac_bits: u8,
}

impl FixedFormat {
    /// Signed, one integer bit, thirty fraction bits. Range `[-2, 2)`.
    pub const Q1_30: Self = Self {
        signed: true,
        int_bits: 1,
        frac_bits: 30,
    };

    /// Creates a format, or `None` if it does not fit in 1..=32 bits.
    #[must_use]
    pub const fn new(signed: bool, int_bits: u8, frac_bits: u8) -> Option<Self> {
        let total = signed as u32 + int_bits as u32 + frac_bits as u32;
        if total == 0 || total > 32 {
            return None;
        }
        Some(Self {
            signed,
            int_bits,
            frac_bits,
        })
    }

    /// Whether negative values are representable.
    #[inline]
    #[must_use]
    pub const fn is_signed(self) -> bool {
        self.signed
    }

    /// Number of integer (magnitude) bits.
    #[inline]
    #[must_use]
    pub const fn int_bits(self) -> u8 {
        self.int_bits
    }

    /// Number of fraction bits.
    #[inline]
    #[must_use]
    pub const fn frac_bits(self) -> u8 {
        self.frac_bits
    }

    /// Width of the register pattern.
    #[inline]
    #[must_use]
    pub const fn total_bits(self) -> u32 {
        self.signed as u32 + self.int_bits as u32 + self.frac_bits as u32
    }

    /// Mask covering the register pattern.
    #[inline]
    #[must_use]
    pub const fn mask(self) -> u32 {
        if self.total_bits() >= 32 {
            u32::MAX
        } else {
            (1 << self.total_bits()) - 1
        }
    }

    const fn magnitude_bits(self) -> u32 {
        self.int_bits as u32 + self.frac_bits as u32
    }

    /// Largest representable magnitude for a value of the given sign, in
    /// units of the least significant fraction bit.
    const fn limit(self, negative: bool) -> u64 {
        let span = 1_u64 << self.magnitude_bits();
        if negative { span } else { span - 1 }
    }
}

/// Converts `x` to the fixed-point register pattern of `format`.
///
/// Rounds to nearest-even and raises `INEXACT` when fraction bits are lost.
/// Out-of-range values (including infinities) saturate to the nearest
/// representable extreme and raise `OVERFLOW`. NaN, and a negative non-zero
/// value for an unsigned format, raise `INVALID` and return 0.
#[expect(
    clippy::cast_possible_truncation,
    reason = "the saturated magnitude fits the format, which is at most 32 bits wide"
)]
pub fn to_fixedpoint(x: Float32, format: FixedFormat, exc: &mut RoundException) -> u32 {
    if x.is_nan() {
        exc.insert(RoundException::INVALID);
        return 0;
    }
    if x.is_zero() {
        return 0;
    }
    let negative = x.is_sign_negative();
    if negative && !format.signed {
        exc.insert(RoundException::INVALID);
        return 0;
    }
    let limit = format.limit(negative);

    let magnitude = if x.is_infinite() {
        None
    } else {
        let bits = x.to_bits();
        let biased = (bits >> 23) & 0xFF;
        let frac = bits & 0x007F_FFFF;
        let (exp, sig) = if biased == 0 {
            (1_i32, frac)
        } else {
            (biased.cast_signed(), frac | 0x0080_0000)
        };
        // value = sig * 2^(exp - 150); scaled by 2^frac_bits.
        let shift = exp - 150 + i32::from(format.frac_bits);
        if shift >= 0 {
            // A 24-bit significand shifted past bit 40 cannot fit any format.
            (shift <= 40).then(|| u64::from(sig) << shift)
        } else {
            let jammed = shift_right_jam64(u64::from(sig) << 2, shift.unsigned_abs());
            let round_bits = jammed & 3;
            let mut whole = jammed >> 2;
            if round_bits != 0 {
                exc.insert(RoundException::INEXACT);
            }
            if round_bits > 2 || (round_bits == 2 && whole & 1 == 1) {
                whole += 1;
            }
            Some(whole)
        }
    };

    let magnitude = match magnitude {
        Some(m) if m <= limit => m,
        _ => {
            exc.insert(RoundException::OVERFLOW);
            limit
        }
    };
    let pattern = if negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    };
    (pattern as u32) & format.mask()
}

/// Converts `x` to signed Q1.30.
#[inline]
pub fn to_q1_30(x: Float32, exc: &mut RoundException) -> u32 {
    to_fixedpoint(x, FixedFormat::Q1_30, exc)
}

/// A row-major 3×3 matrix of fixed-point register patterns.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FixedMatrix3(pub [u32; 9]);

impl FixedMatrix3 {
    /// All coefficients zero: the warp unit clips the whole layer.
    pub const ZERO: Self = Self([0; 9]);

    /// The identity warp in `format`.
    #[must_use]
    pub fn identity(format: FixedFormat) -> Self {
        let mut exc = RoundException::NONE;
        let one = to_fixedpoint(Float32::ONE, format, &mut exc);
        let mut out = Self::ZERO;
        out.0[0] = one;
        out.0[4] = one;
        out.0[8] = one;
        out
    }

    /// Converts every entry of `m`.
    #[must_use]
    pub fn from_matrix3(matrix: &Matrix3, format: FixedFormat, exc: &mut RoundException) -> Self {
        let mut out = Self::ZERO;
        for (dst, src) in out.0.iter_mut().zip(matrix.m) {
            *dst = to_fixedpoint(src, format, exc);
        }
        out
    }

    /// Coefficient at `(row, col)`.
    #[inline]
    #[must_use]
    pub const fn get(&self, row: usize, col: usize) -> u32 {
        self.0[row * 3 + col]
    }
}

impl core::fmt::Debug for FixedMatrix3 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("FixedMatrix3[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(if i % 3 == 0 { "; " } else { ", " })?;
            }
            write!(f, "{v:#010x}")?;
        }
        f.write_str("]")
    }
}

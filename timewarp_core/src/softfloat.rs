// Copyright 2026 the Timewarp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! IEEE-754 binary32 arithmetic implemented on integers.
//!
//! [`Float32`] is a bit pattern, not a host `f32`. Every operation here is
//! computed with integer arithmetic only, so results are bit-identical on any
//! target regardless of FPU mode, flush-to-zero settings, or the absence of an
//! FPU altogether (interrupt handlers on the display controller run with the
//! FP unit unavailable).
//!
//! Rounding is always round-to-nearest-even. Instead of trapping, each
//! operation ORs its exceptions into a caller-owned [`RoundException`]:
//!
//! ```text
//!   let mut exc = RoundException::NONE;
//!   let r = softfloat::mul(a, b, &mut exc);
//!   if exc.contains(RoundException::OVERFLOW) { /* caller decides */ }
//! ```
//!
//! # Conventions
//!
//! - Tininess is detected before rounding. `UNDERFLOW` is raised only when a
//!   tiny result is also inexact.
//! - Overflow raises `OVERFLOW | INEXACT` and returns a signed infinity.
//! - Invalid operations (∞−∞, 0×∞, 0/0, ∞/∞) return [`Float32::DEFAULT_NAN`].
//! - NaN operands propagate quieted (bit 22 set). A signaling NaN wins over a
//!   quiet NaN and the first operand wins ties; any signaling NaN operand
//!   raises `INVALID`.
//! - Division by zero of a non-zero value returns a signed infinity without
//!   raising a flag.
//!
//! Comparisons are derived from [`sub`] and inspect the sign and zero-ness of
//! the difference, which gives unordered results for NaN and `+0 == -0`.

use core::fmt;
use core::ops::{BitAnd, BitOr, BitOrAssign};

use bytemuck::{Pod, Zeroable};

// ---------------------------------------------------------------------------
// RoundException
// ---------------------------------------------------------------------------

/// Accumulated floating-point exception flags.
///
/// Threaded by `&mut` through every arithmetic call. Flags are sticky: an
/// operation only ever sets bits. Callers clear the accumulator between
/// logically independent computations.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RoundException(u8);

impl RoundException {
    /// No flags raised.
    pub const NONE: Self = Self(0);
    /// The rounded result differs from the exact result.
    pub const INEXACT: Self = Self(0x01);
    /// The result is tiny (below the normal range) and inexact.
    pub const UNDERFLOW: Self = Self(0x02);
    /// The rounded result exceeds the finite range.
    pub const OVERFLOW: Self = Self(0x04);
    /// The operation has no defined result, or a signaling NaN was consumed.
    pub const INVALID: Self = Self(0x10);

    const ALL: u8 = 0x17;

    /// Returns the raw flag bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Creates a flag set from raw bits, dropping unknown bits.
    #[inline]
    #[must_use]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL)
    }

    /// Returns `true` if no flag is raised.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every flag in `other` is raised.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any flag in `other` is raised.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Raises every flag in `other`.
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Lowers every flag.
    #[inline]
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Returns the current flags and clears the accumulator.
    #[inline]
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }
}

impl BitOr for RoundException {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for RoundException {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for RoundException {
    type Output = Self;

    #[inline]
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for RoundException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(RoundException, &str); 4] = [
            (RoundException::INEXACT, "INEXACT"),
            (RoundException::UNDERFLOW, "UNDERFLOW"),
            (RoundException::OVERFLOW, "OVERFLOW"),
            (RoundException::INVALID, "INVALID"),
        ];
        f.write_str("RoundException(")?;
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("NONE")?;
        }
        f.write_str(")")
    }
}

// ---------------------------------------------------------------------------
// Float32
// ---------------------------------------------------------------------------

/// Classification of a [`Float32`] bit pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FloatClass {
    /// `+0` or `-0`.
    Zero,
    /// Non-zero with a zero exponent field.
    Subnormal,
    /// Finite with a non-zero exponent field.
    Normal,
    /// `+∞` or `-∞`.
    Infinite,
    /// NaN with the quiet bit set.
    QuietNan,
    /// NaN with the quiet bit clear.
    SignalingNan,
}

/// An IEEE-754 binary32 value held as its bit pattern.
///
/// `PartialEq`/`Eq` compare bit patterns, which is what register writes and
/// tests need. Numeric comparison (NaN unordered, `+0 == -0`) is [`eq`].
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct Float32(u32);

const SIGN_BIT: u32 = 0x8000_0000;
const FRAC_MASK: u32 = 0x007F_FFFF;
const QUIET_BIT: u32 = 0x0040_0000;

impl Float32 {
    /// `+0.0`.
    pub const ZERO: Self = Self(0x0000_0000);
    /// `-0.0`.
    pub const NEG_ZERO: Self = Self(0x8000_0000);
    /// `1.0`.
    pub const ONE: Self = Self(0x3F80_0000);
    /// `-1.0`.
    pub const NEG_ONE: Self = Self(0xBF80_0000);
    /// `2.0`.
    pub const TWO: Self = Self(0x4000_0000);
    /// `0.5`.
    pub const HALF: Self = Self(0x3F00_0000);
    /// `+∞`.
    pub const INFINITY: Self = Self(0x7F80_0000);
    /// `-∞`.
    pub const NEG_INFINITY: Self = Self(0xFF80_0000);
    /// The NaN returned by invalid operations.
    pub const DEFAULT_NAN: Self = Self(0x7FC0_0000);
    /// Largest finite value.
    pub const MAX: Self = Self(0x7F7F_FFFF);
    /// Smallest positive normal value.
    pub const MIN_POSITIVE: Self = Self(0x0080_0000);
    /// Determinant threshold below which a matrix is treated as singular
    /// (about `1.0e-8`).
    pub const EPSILON: Self = Self(0x322B_CC77);

    /// Creates a value from its bit pattern.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the bit pattern.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// Reinterprets a host `f32` (no arithmetic is performed).
    #[inline]
    #[must_use]
    pub const fn from_f32(value: f32) -> Self {
        Self(value.to_bits())
    }

    /// Reinterprets as a host `f32` (no arithmetic is performed).
    #[inline]
    #[must_use]
    pub const fn to_f32(self) -> f32 {
        f32::from_bits(self.0)
    }

    /// Classifies the bit pattern.
    #[must_use]
    pub const fn classify(self) -> FloatClass {
        let exp = exp_of(self.0);
        let frac = frac_of(self.0);
        match (exp, frac) {
            (0, 0) => FloatClass::Zero,
            (0, _) => FloatClass::Subnormal,
            (0xFF, 0) => FloatClass::Infinite,
            (0xFF, f) if f & QUIET_BIT != 0 => FloatClass::QuietNan,
            (0xFF, _) => FloatClass::SignalingNan,
            _ => FloatClass::Normal,
        }
    }

    /// Returns `true` for either kind of NaN.
    #[inline]
    #[must_use]
    pub const fn is_nan(self) -> bool {
        is_nan_bits(self.0)
    }

    /// Returns `true` for a NaN with the quiet bit clear.
    #[inline]
    #[must_use]
    pub const fn is_signaling_nan(self) -> bool {
        is_snan_bits(self.0)
    }

    /// Returns `true` for `±∞`.
    #[inline]
    #[must_use]
    pub const fn is_infinite(self) -> bool {
        self.0 & !SIGN_BIT == 0x7F80_0000
    }

    /// Returns `true` for anything that is neither NaN nor infinite.
    #[inline]
    #[must_use]
    pub const fn is_finite(self) -> bool {
        exp_of(self.0) != 0xFF
    }

    /// Returns `true` for `±0`.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 & !SIGN_BIT == 0
    }

    /// Returns `true` if the sign bit is set (including `-0` and negative NaNs).
    #[inline]
    #[must_use]
    pub const fn is_sign_negative(self) -> bool {
        sign_of(self.0)
    }

    /// Flips the sign bit. Never raises a flag, even for signaling NaNs.
    #[inline]
    #[must_use]
    pub const fn neg(self) -> Self {
        Self(self.0 ^ SIGN_BIT)
    }

    /// Clears the sign bit. Never raises a flag, even for signaling NaNs.
    #[inline]
    #[must_use]
    pub const fn abs(self) -> Self {
        Self(self.0 & !SIGN_BIT)
    }

    /// Converts a signed integer, rounding to nearest-even.
    ///
    /// Only magnitudes above 2²⁴ can be inexact.
    #[must_use]
    pub fn from_i32(value: i32, exc: &mut RoundException) -> Self {
        let sign = value < 0;
        if value & 0x7FFF_FFFF == 0 {
            // 0 or i32::MIN, both exact.
            return if sign { Self(pack(true, 0x9E, 0)) } else { Self::ZERO };
        }
        norm_round_pack(sign, 0x9C, value.unsigned_abs(), exc)
    }
}

impl fmt::Debug for Float32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Float32({:#010x} ≈ {:e})", self.0, self.to_f32())
    }
}

// ---------------------------------------------------------------------------
// Bit-level helpers
// ---------------------------------------------------------------------------

#[inline]
const fn sign_of(ui: u32) -> bool {
    ui & SIGN_BIT != 0
}

#[inline]
const fn exp_of(ui: u32) -> i32 {
    ((ui >> 23) & 0xFF) as i32
}

#[inline]
const fn frac_of(ui: u32) -> u32 {
    ui & FRAC_MASK
}

#[inline]
const fn is_nan_bits(ui: u32) -> bool {
    exp_of(ui) == 0xFF && frac_of(ui) != 0
}

#[inline]
const fn is_snan_bits(ui: u32) -> bool {
    is_nan_bits(ui) && ui & QUIET_BIT == 0
}

/// Packs sign, exponent and significand. The significand is *added*, so a
/// hidden bit at position 23 carries into the exponent field.
#[inline]
const fn pack(sign: bool, exp: i32, sig: u32) -> u32 {
    ((sign as u32) << 31)
        .wrapping_add((exp as u32) << 23)
        .wrapping_add(sig)
}

/// Shifts right, ORing every shifted-out bit into bit 0.
#[inline]
pub(crate) const fn shift_right_jam32(a: u32, dist: u32) -> u32 {
    if dist == 0 {
        a
    } else if dist < 31 {
        (a >> dist) | ((a << (32 - dist)) != 0) as u32
    } else {
        (a != 0) as u32
    }
}

/// 64-bit variant of [`shift_right_jam32`].
#[inline]
pub(crate) const fn shift_right_jam64(a: u64, dist: u32) -> u64 {
    if dist == 0 {
        a
    } else if dist < 63 {
        (a >> dist) | ((a << (64 - dist)) != 0) as u64
    } else {
        (a != 0) as u64
    }
}

/// Normalizes a subnormal significand, returning `(exp, sig)` with the
/// leading one at bit 23.
#[inline]
const fn norm_subnormal_sig(sig: u32) -> (i32, u32) {
    let shift = sig.leading_zeros() - 8;
    (1 - shift as i32, sig << shift)
}

/// Rounds and packs a result whose significand has its leading one at bit 30
/// and whose `exp` is one less than the biased exponent of the result.
fn round_pack(sign: bool, mut exp: i32, mut sig: u32, exc: &mut RoundException) -> Float32 {
    const ROUND_INCREMENT: u32 = 0x40;

    let mut round_bits = sig & 0x7F;
    if exp as u32 >= 0xFD {
        if exp < 0 {
            // Tiny before rounding.
            sig = shift_right_jam32(sig, exp.unsigned_abs());
            exp = 0;
            round_bits = sig & 0x7F;
            if round_bits != 0 {
                exc.insert(RoundException::UNDERFLOW);
            }
        } else if exp > 0xFD || sig.wrapping_add(ROUND_INCREMENT) >= 0x8000_0000 {
            exc.insert(RoundException::OVERFLOW | RoundException::INEXACT);
            return Float32(pack(sign, 0xFF, 0));
        }
    }
    sig = (sig + ROUND_INCREMENT) >> 7;
    if round_bits != 0 {
        exc.insert(RoundException::INEXACT);
    }
    if round_bits == 0x40 {
        // Exactly halfway: round to even.
        sig &= !1;
    }
    if sig == 0 {
        exp = 0;
    }
    Float32(pack(sign, exp, sig))
}

/// Like [`round_pack`] but accepts a significand with its leading one
/// anywhere at or below bit 30.
fn norm_round_pack(sign: bool, exp: i32, sig: u32, exc: &mut RoundException) -> Float32 {
    let shift = sig.leading_zeros() as i32 - 1;
    let exp = exp - shift;
    if shift >= 7 && (exp as u32) < 0xFD {
        let exp = if sig != 0 { exp } else { 0 };
        Float32(pack(sign, exp, sig << (shift - 7)))
    } else {
        round_pack(sign, exp, sig << shift, exc)
    }
}

fn propagate_nan(a: u32, b: u32, exc: &mut RoundException) -> Float32 {
    let a_snan = is_snan_bits(a);
    let b_snan = is_snan_bits(b);
    if a_snan || b_snan {
        exc.insert(RoundException::INVALID);
    }
    let chosen = if a_snan {
        a
    } else if b_snan {
        b
    } else if is_nan_bits(a) {
        a
    } else {
        b
    };
    Float32(chosen | QUIET_BIT)
}

fn invalid(exc: &mut RoundException) -> Float32 {
    exc.insert(RoundException::INVALID);
    Float32::DEFAULT_NAN
}

// ---------------------------------------------------------------------------
// Addition / subtraction
// ---------------------------------------------------------------------------

fn add_mags(ui_a: u32, ui_b: u32, exc: &mut RoundException) -> Float32 {
    let exp_a = exp_of(ui_a);
    let mut sig_a = frac_of(ui_a);
    let exp_b = exp_of(ui_b);
    let mut sig_b = frac_of(ui_b);
    let sign_z = sign_of(ui_a);
    let exp_diff = exp_a - exp_b;

    let mut exp_z;
    let mut sig_z;
    if exp_diff == 0 {
        if exp_a == 0 {
            // Both subnormal or zero: the sum may carry into the exponent field.
            return Float32(ui_a.wrapping_add(sig_b));
        }
        if exp_a == 0xFF {
            if sig_a | sig_b != 0 {
                return propagate_nan(ui_a, ui_b, exc);
            }
            return Float32(ui_a);
        }
        exp_z = exp_a;
        sig_z = 0x0100_0000 + sig_a + sig_b;
        if sig_z & 1 == 0 && exp_z < 0xFE {
            return Float32(pack(sign_z, exp_z, sig_z >> 1));
        }
        sig_z <<= 6;
    } else {
        sig_a <<= 6;
        sig_b <<= 6;
        if exp_diff < 0 {
            if exp_b == 0xFF {
                if sig_b != 0 {
                    return propagate_nan(ui_a, ui_b, exc);
                }
                return Float32(pack(sign_z, 0xFF, 0));
            }
            exp_z = exp_b;
            sig_a += if exp_a != 0 { 0x2000_0000 } else { sig_a };
            sig_a = shift_right_jam32(sig_a, exp_diff.unsigned_abs());
        } else {
            if exp_a == 0xFF {
                if sig_a != 0 {
                    return propagate_nan(ui_a, ui_b, exc);
                }
                return Float32(ui_a);
            }
            exp_z = exp_a;
            sig_b += if exp_b != 0 { 0x2000_0000 } else { sig_b };
            sig_b = shift_right_jam32(sig_b, exp_diff.unsigned_abs());
        }
        sig_z = 0x2000_0000 + sig_a + sig_b;
        if sig_z < 0x4000_0000 {
            exp_z -= 1;
            sig_z <<= 1;
        }
    }
    round_pack(sign_z, exp_z, sig_z, exc)
}

fn sub_mags(ui_a: u32, ui_b: u32, exc: &mut RoundException) -> Float32 {
    let mut exp_a = exp_of(ui_a);
    let sig_a = frac_of(ui_a);
    let exp_b = exp_of(ui_b);
    let sig_b = frac_of(ui_b);
    let mut sign_z = sign_of(ui_a);
    let exp_diff = exp_a - exp_b;

    if exp_diff == 0 {
        if exp_a == 0xFF {
            if sig_a | sig_b != 0 {
                return propagate_nan(ui_a, ui_b, exc);
            }
            return invalid(exc);
        }
        let mut sig_diff = sig_a as i32 - sig_b as i32;
        if sig_diff == 0 {
            // Exact cancellation is +0 under round-to-nearest.
            return Float32::ZERO;
        }
        if exp_a != 0 {
            exp_a -= 1;
        }
        if sig_diff < 0 {
            sign_z = !sign_z;
            sig_diff = -sig_diff;
        }
        let sig_diff = sig_diff.unsigned_abs();
        let mut shift = sig_diff.leading_zeros() as i32 - 8;
        let mut exp_z = exp_a - shift;
        if exp_z < 0 {
            shift = exp_a;
            exp_z = 0;
        }
        return Float32(pack(sign_z, exp_z, sig_diff << shift));
    }

    let sig_a = sig_a << 7;
    let sig_b = sig_b << 7;
    let (exp_z, sig_x, sig_y) = if exp_diff < 0 {
        sign_z = !sign_z;
        if exp_b == 0xFF {
            if sig_b != 0 {
                return propagate_nan(ui_a, ui_b, exc);
            }
            return Float32(pack(sign_z, 0xFF, 0));
        }
        let sig_y = sig_a + if exp_a != 0 { 0x4000_0000 } else { sig_a };
        (exp_b - 1, sig_b | 0x4000_0000, sig_y)
    } else {
        if exp_a == 0xFF {
            if sig_a != 0 {
                return propagate_nan(ui_a, ui_b, exc);
            }
            return Float32(ui_a);
        }
        let sig_y = sig_b + if exp_b != 0 { 0x4000_0000 } else { sig_b };
        (exp_a - 1, sig_a | 0x4000_0000, sig_y)
    };
    let sig_z = sig_x - shift_right_jam32(sig_y, exp_diff.unsigned_abs());
    norm_round_pack(sign_z, exp_z, sig_z, exc)
}

/// `a + b`, correctly rounded.
pub fn add(a: Float32, b: Float32, exc: &mut RoundException) -> Float32 {
    if sign_of(a.0) == sign_of(b.0) {
        add_mags(a.0, b.0, exc)
    } else {
        sub_mags(a.0, b.0, exc)
    }
}

/// `a - b`, defined as `add(a, b.neg())`.
pub fn sub(a: Float32, b: Float32, exc: &mut RoundException) -> Float32 {
    add(a, b.neg(), exc)
}

// ---------------------------------------------------------------------------
// Multiplication / division
// ---------------------------------------------------------------------------

/// `a × b`, correctly rounded.
#[expect(
    clippy::cast_possible_truncation,
    reason = "the 64-bit product is jammed down to its upper 32 bits"
)]
pub fn mul(a: Float32, b: Float32, exc: &mut RoundException) -> Float32 {
    let (ui_a, ui_b) = (a.0, b.0);
    let mut exp_a = exp_of(ui_a);
    let mut sig_a = frac_of(ui_a);
    let mut exp_b = exp_of(ui_b);
    let mut sig_b = frac_of(ui_b);
    let sign_z = sign_of(ui_a) ^ sign_of(ui_b);

    if exp_a == 0xFF {
        if sig_a != 0 || (exp_b == 0xFF && sig_b != 0) {
            return propagate_nan(ui_a, ui_b, exc);
        }
        // ∞ × 0 is invalid.
        if exp_b == 0 && sig_b == 0 {
            return invalid(exc);
        }
        return Float32(pack(sign_z, 0xFF, 0));
    }
    if exp_b == 0xFF {
        if sig_b != 0 {
            return propagate_nan(ui_a, ui_b, exc);
        }
        if exp_a == 0 && sig_a == 0 {
            return invalid(exc);
        }
        return Float32(pack(sign_z, 0xFF, 0));
    }

    if exp_a == 0 {
        if sig_a == 0 {
            return Float32(pack(sign_z, 0, 0));
        }
        (exp_a, sig_a) = norm_subnormal_sig(sig_a);
    }
    if exp_b == 0 {
        if sig_b == 0 {
            return Float32(pack(sign_z, 0, 0));
        }
        (exp_b, sig_b) = norm_subnormal_sig(sig_b);
    }

    let mut exp_z = exp_a + exp_b - 0x7F;
    let sig_a = (sig_a | 0x0080_0000) << 7;
    let sig_b = (sig_b | 0x0080_0000) << 8;
    let product = u64::from(sig_a) * u64::from(sig_b);
    let mut sig_z = (product >> 32) as u32 | u32::from(product as u32 != 0);
    if sig_z < 0x4000_0000 {
        exp_z -= 1;
        sig_z <<= 1;
    }
    round_pack(sign_z, exp_z, sig_z, exc)
}

/// `a ÷ b`, correctly rounded.
#[expect(
    clippy::cast_possible_truncation,
    reason = "the quotient of a 62-bit dividend by a 24-bit divisor fits in 32 bits"
)]
pub fn div(a: Float32, b: Float32, exc: &mut RoundException) -> Float32 {
    let (ui_a, ui_b) = (a.0, b.0);
    let mut exp_a = exp_of(ui_a);
    let mut sig_a = frac_of(ui_a);
    let mut exp_b = exp_of(ui_b);
    let mut sig_b = frac_of(ui_b);
    let sign_z = sign_of(ui_a) ^ sign_of(ui_b);

    if exp_a == 0xFF {
        if sig_a != 0 {
            return propagate_nan(ui_a, ui_b, exc);
        }
        if exp_b == 0xFF {
            if sig_b != 0 {
                return propagate_nan(ui_a, ui_b, exc);
            }
            return invalid(exc);
        }
        return Float32(pack(sign_z, 0xFF, 0));
    }
    if exp_b == 0xFF {
        if sig_b != 0 {
            return propagate_nan(ui_a, ui_b, exc);
        }
        return Float32(pack(sign_z, 0, 0));
    }

    if exp_b == 0 {
        if sig_b == 0 {
            if exp_a == 0 && sig_a == 0 {
                return invalid(exc);
            }
            return Float32(pack(sign_z, 0xFF, 0));
        }
        (exp_b, sig_b) = norm_subnormal_sig(sig_b);
    }
    if exp_a == 0 {
        if sig_a == 0 {
            return Float32(pack(sign_z, 0, 0));
        }
        (exp_a, sig_a) = norm_subnormal_sig(sig_a);
    }

    let mut exp_z = exp_a - exp_b + 0x7E;
    let sig_a = sig_a | 0x0080_0000;
    let sig_b = sig_b | 0x0080_0000;
    let dividend = if sig_a < sig_b {
        exp_z -= 1;
        u64::from(sig_a) << 31
    } else {
        u64::from(sig_a) << 30
    };
    let mut sig_z = (dividend / u64::from(sig_b)) as u32;
    if sig_z & 0x3F == 0 {
        // Low bits might round either way: jam in whether a remainder exists.
        sig_z |= u32::from(u64::from(sig_b) * u64::from(sig_z) != dividend);
    }
    round_pack(sign_z, exp_z, sig_z, exc)
}

// ---------------------------------------------------------------------------
// Comparisons
// ---------------------------------------------------------------------------

/// Orders two infinities by sign. Evaluating `∞ - ∞` would be invalid.
#[inline]
fn infinities_equal(a: Float32, b: Float32) -> Option<bool> {
    (a.is_infinite() && b.is_infinite()).then_some(a.0 == b.0)
}

/// Computes `a - b` for a comparison. Only `INVALID` escapes into `exc`; the
/// rounding flags of the difference are not part of a comparison's result.
#[inline]
fn compare_difference(a: Float32, b: Float32, exc: &mut RoundException) -> Float32 {
    let mut local = RoundException::NONE;
    let d = sub(a, b, &mut local);
    exc.insert(local & RoundException::INVALID);
    d
}

/// Quiet equality: NaN is unequal to everything, `+0 == -0`.
///
/// Raises `INVALID` only for signaling NaN operands.
pub fn eq(a: Float32, b: Float32, exc: &mut RoundException) -> bool {
    if let Some(equal) = infinities_equal(a, b) {
        return equal;
    }
    let d = compare_difference(a, b, exc);
    !d.is_nan() && d.is_zero()
}

/// Signaling `a < b`: any NaN operand raises `INVALID` and yields `false`.
pub fn lt(a: Float32, b: Float32, exc: &mut RoundException) -> bool {
    if a.is_nan() || b.is_nan() {
        exc.insert(RoundException::INVALID);
        return false;
    }
    if let Some(equal) = infinities_equal(a, b) {
        return !equal && a.is_sign_negative();
    }
    let d = compare_difference(a, b, exc);
    d.is_sign_negative() && !d.is_zero()
}

/// Signaling `a >= b`: any NaN operand raises `INVALID` and yields `false`.
pub fn ge(a: Float32, b: Float32, exc: &mut RoundException) -> bool {
    if a.is_nan() || b.is_nan() {
        exc.insert(RoundException::INVALID);
        return false;
    }
    if let Some(equal) = infinities_equal(a, b) {
        return equal || !a.is_sign_negative();
    }
    let d = compare_difference(a, b, exc);
    !d.is_sign_negative() || d.is_zero()
}

/// Signaling `a <= b`.
#[inline]
pub fn le(a: Float32, b: Float32, exc: &mut RoundException) -> bool {
    ge(b, a, exc)
}

/// Signaling `a > b`.
#[inline]
pub fn gt(a: Float32, b: Float32, exc: &mut RoundException) -> bool {
    lt(b, a, exc)
}

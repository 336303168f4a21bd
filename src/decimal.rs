//! 64-bit binary-integer decimal (BID64) numbers.
//!
//! Bit layout, most significant first:
//! - bit 63: sign
//! - bits 62..61 != `11`: 10-bit biased exponent in 62..53, 53-bit coefficient in 52..0
//! - bits 62..61 == `11`: 10-bit biased exponent in 60..51, coefficient is `100` followed
//!   by bits 50..0
//! - bits 62..58 == `11110`: infinity, `11111`: NaN
//!
//! The exponent bias is 398. Wire bytes are `to_bits().to_le_bytes()`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub const MAX_COEFFICIENT: u128 = 9_999_999_999_999_999;
pub const MIN_EXPONENT: i32 = -398;
pub const MAX_EXPONENT: i32 = 369;
const EXPONENT_BIAS: i32 = 398;

const SIGN_MASK: u64 = 1 << 63;
const INFINITY_BITS: u64 = 0x7800_0000_0000_0000;
const NAN_BITS: u64 = 0x7c00_0000_0000_0000;
const COMBINATION_INFINITY: u64 = 0b11110;
const COMBINATION_NAN: u64 = 0b11111;
const EXPONENT_MASK: u64 = 0x3ff;
const SMALL_COEFFICIENT_BITS: u32 = 53;
const LARGE_COEFFICIENT_BITS: u32 = 51;
const SMALL_COEFFICIENT_MAX: u128 = (1 << SMALL_COEFFICIENT_BITS) - 1;
const LARGE_COEFFICIENT_PREFIX: u64 = 0b100 << LARGE_COEFFICIENT_BITS;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid decimal literal {0:?}")]
pub struct ParseDecimalError(String);

/// A decimal number: `(-1)^negative * coefficient * 10^exponent`, or a special value.
///
/// The coefficient is not limited to 16 digits; values outside the BID64 domain are
/// clamped by [`Decimal64::to_bits`].
#[derive(Debug, Clone, Copy)]
pub enum Decimal64 {
    Finite { negative: bool, coefficient: u128, exponent: i32 },
    Infinite { negative: bool },
    NaN,
}

impl Decimal64 {
    pub const ZERO: Decimal64 = Decimal64::Finite { negative: false, coefficient: 0, exponent: 0 };
    pub const INFINITY: Decimal64 = Decimal64::Infinite { negative: false };
    pub const NEG_INFINITY: Decimal64 = Decimal64::Infinite { negative: true };

    pub fn new(negative: bool, coefficient: u128, exponent: i32) -> Self {
        Decimal64::Finite { negative, coefficient, exponent }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Decimal64::NaN)
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Decimal64::Infinite { .. })
    }

    pub fn is_sign_negative(&self) -> bool {
        match self {
            Decimal64::Finite { negative, .. } | Decimal64::Infinite { negative } => *negative,
            Decimal64::NaN => false,
        }
    }

    /// Encode into the BID64 bit pattern, clamping out-of-range values.
    pub fn to_bits(&self) -> u64 {
        let (negative, coefficient, exponent) = match *self {
            Decimal64::NaN => return NAN_BITS,
            Decimal64::Infinite { negative } => return sign_bit(negative) | INFINITY_BITS,
            Decimal64::Finite { negative, coefficient, exponent } => (negative, coefficient, exponent),
        };
        let sign = sign_bit(negative);

        if coefficient == 0 {
            let exponent = exponent.clamp(MIN_EXPONENT, MAX_EXPONENT);
            return sign | ((exponent + EXPONENT_BIAS) as u64) << SMALL_COEFFICIENT_BITS;
        }

        let mut coefficient = coefficient;
        let mut exponent = exponent;
        while coefficient % 10 == 0 && exponent < MAX_EXPONENT {
            coefficient /= 10;
            exponent += 1;
        }
        while exponent > MAX_EXPONENT && coefficient <= MAX_COEFFICIENT / 10 {
            coefficient *= 10;
            exponent -= 1;
        }

        if coefficient > MAX_COEFFICIENT || exponent > MAX_EXPONENT {
            return sign | INFINITY_BITS;
        }
        if exponent < MIN_EXPONENT {
            return sign;
        }

        let biased = (exponent + EXPONENT_BIAS) as u64;
        let coefficient = coefficient as u64;
        if coefficient as u128 > SMALL_COEFFICIENT_MAX {
            sign | (0b11 << 61)
                | (biased << LARGE_COEFFICIENT_BITS)
                | (coefficient & ((1 << LARGE_COEFFICIENT_BITS) - 1))
        } else {
            sign | (biased << SMALL_COEFFICIENT_BITS) | coefficient
        }
    }

    /// Decode a BID64 bit pattern.
    pub fn from_bits(bits: u64) -> Self {
        if bits == 0 {
            return Decimal64::ZERO;
        }
        let negative = bits & SIGN_MASK != 0;
        let combination = (bits >> 58) & 0b11111;
        if combination == COMBINATION_NAN {
            return Decimal64::NaN;
        }
        if combination == COMBINATION_INFINITY {
            return Decimal64::Infinite { negative };
        }

        let (biased, coefficient) = if (bits >> 61) & 0b11 == 0b11 {
            (
                (bits >> LARGE_COEFFICIENT_BITS) & EXPONENT_MASK,
                LARGE_COEFFICIENT_PREFIX | (bits & ((1 << LARGE_COEFFICIENT_BITS) - 1)),
            )
        } else {
            (
                (bits >> SMALL_COEFFICIENT_BITS) & EXPONENT_MASK,
                bits & ((1 << SMALL_COEFFICIENT_BITS) - 1),
            )
        };
        Decimal64::Finite {
            negative,
            coefficient: coefficient as u128,
            exponent: biased as i32 - EXPONENT_BIAS,
        }
    }

    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.to_bits().to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; 8]) -> Self {
        Decimal64::from_bits(u64::from_le_bytes(bytes))
    }

    /// Trailing zeros stripped; zero has no sign or exponent.
    fn normalized(&self) -> Option<(bool, u128, i64)> {
        match *self {
            Decimal64::Finite { coefficient: 0, .. } => Some((false, 0, 0)),
            Decimal64::Finite { negative, mut coefficient, exponent } => {
                let mut exponent = exponent as i64;
                while coefficient % 10 == 0 {
                    coefficient /= 10;
                    exponent += 1;
                }
                Some((negative, coefficient, exponent))
            }
            _ => None,
        }
    }
}

fn sign_bit(negative: bool) -> u64 {
    if negative {
        SIGN_MASK
    } else {
        0
    }
}

impl Default for Decimal64 {
    fn default() -> Self {
        Decimal64::ZERO
    }
}

impl PartialEq for Decimal64 {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Decimal64::NaN, _) | (_, Decimal64::NaN) => false,
            (Decimal64::Infinite { negative: a }, Decimal64::Infinite { negative: b }) => a == b,
            _ => match (self.normalized(), other.normalized()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl PartialOrd for Decimal64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        fn rank(d: &Decimal64) -> i8 {
            match d {
                Decimal64::Infinite { negative: true } => -1,
                Decimal64::Infinite { negative: false } => 1,
                _ => 0,
            }
        }
        if self.is_nan() || other.is_nan() {
            return None;
        }
        if self == other {
            return Some(Ordering::Equal);
        }
        let (ra, rb) = (rank(self), rank(other));
        if ra != 0 || rb != 0 {
            return ra.partial_cmp(&rb);
        }
        let (na, ca, ea) = self.normalized()?;
        let (nb, cb, eb) = other.normalized()?;
        let sa = if ca == 0 { 0 } else if na { -1 } else { 1 };
        let sb = if cb == 0 { 0 } else if nb { -1 } else { 1 };
        if sa != sb || sa == 0 {
            return sa.partial_cmp(&sb);
        }
        // Same sign: compare magnitudes by adjusted exponent, then digits.
        let (da, db) = (ca.to_string(), cb.to_string());
        let (aa, ab) = (ea + da.len() as i64, eb + db.len() as i64);
        let magnitude = aa.cmp(&ab).then_with(|| {
            let width = da.len().max(db.len());
            format!("{:0<width$}", da, width = width).cmp(&format!("{:0<width$}", db, width = width))
        });
        Some(if sa < 0 { magnitude.reverse() } else { magnitude })
    }
}

impl From<i64> for Decimal64 {
    fn from(x: i64) -> Self {
        Decimal64::new(x < 0, x.unsigned_abs() as u128, 0)
    }
}

impl From<u64> for Decimal64 {
    fn from(x: u64) -> Self {
        Decimal64::new(false, x as u128, 0)
    }
}

impl fmt::Display for Decimal64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (negative, coefficient, exponent) = match *self {
            Decimal64::NaN => return f.write_str("NaN"),
            Decimal64::Infinite { negative } => {
                return f.write_str(if negative { "-Infinity" } else { "Infinity" })
            }
            Decimal64::Finite { negative, coefficient, exponent } => (negative, coefficient, exponent as i64),
        };
        if negative {
            f.write_str("-")?;
        }
        let digits = coefficient.to_string();
        let adjusted = exponent + digits.len() as i64 - 1;

        if exponent <= 0 && adjusted >= -6 {
            if exponent == 0 {
                return f.write_str(&digits);
            }
            let point = digits.len() as i64 + exponent;
            if point > 0 {
                let (int, frac) = digits.split_at(point as usize);
                write!(f, "{}.{}", int, frac)
            } else {
                write!(f, "0.{}{}", "0".repeat((-point) as usize), digits)
            }
        } else {
            let (first, rest) = digits.split_at(1);
            f.write_str(first)?;
            if !rest.is_empty() {
                write!(f, ".{}", rest)?;
            }
            write!(f, "E{}{}", if adjusted < 0 { "-" } else { "+" }, adjusted.abs())
        }
    }
}

impl FromStr for Decimal64 {
    type Err = ParseDecimalError;

    /// Accepts `[+-]digits[.digits][(e|E)[+-]digits]`, `Infinity`/`Inf` and `NaN`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDecimalError(s.to_string());
        let (negative, body) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        if body.eq_ignore_ascii_case("infinity") || body.eq_ignore_ascii_case("inf") {
            return Ok(Decimal64::Infinite { negative });
        }
        if body.eq_ignore_ascii_case("nan") {
            return Ok(Decimal64::NaN);
        }

        let (mantissa, exp_part) = match body.find(['e', 'E']) {
            Some(i) => (&body[..i], Some(&body[i + 1..])),
            None => (body, None),
        };
        let (int_part, frac_part) = match mantissa.find('.') {
            Some(i) => (&mantissa[..i], &mantissa[i + 1..]),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err());
        }

        let mut coefficient: u128 = 0;
        for c in int_part.chars().chain(frac_part.chars()) {
            let digit = c.to_digit(10).ok_or_else(err)?;
            coefficient = coefficient
                .checked_mul(10)
                .and_then(|x| x.checked_add(digit as u128))
                .ok_or_else(err)?;
        }

        let mut exponent: i32 = match exp_part {
            Some(e) => {
                let digits = e.strip_prefix(['+', '-']).unwrap_or(e);
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(err());
                }
                e.parse().map_err(|_| err())?
            }
            None => 0,
        };
        exponent = exponent.checked_sub(frac_part.len() as i32).ok_or_else(err)?;
        Ok(Decimal64::Finite { negative, coefficient, exponent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal64 {
        s.parse().unwrap()
    }

    #[test]
    fn zero_keeps_exponent() {
        assert_eq!(dec("0").to_bits(), 0x31c0_0000_0000_0000);
        assert_eq!(Decimal64::from_bits(0), Decimal64::ZERO);
    }

    #[test]
    fn large_coefficient_uses_51_bit_layout() {
        let bits = dec("9999999999999999").to_bits();
        assert_eq!((bits >> 61) & 0b11, 0b11);
        assert_eq!(Decimal64::from_bits(bits), dec("9999999999999999"));
        assert_eq!(dec("9007199254740991").to_bits(), 0x31df_ffff_ffff_ffff);
    }

    #[test]
    fn overflow_clamps_to_signed_infinity() {
        assert_eq!(dec("12345678901234567").to_bits(), INFINITY_BITS);
        assert_eq!(dec("-1e400").to_bits(), SIGN_MASK | INFINITY_BITS);
    }

    #[test]
    fn huge_coefficient_clamps_without_overflow() {
        let max = format!("{}E+400", u128::MAX);
        assert_eq!(dec(&max).to_bits(), INFINITY_BITS);
        assert_eq!(dec(&format!("-{}", max)).to_bits(), SIGN_MASK | INFINITY_BITS);
        assert_eq!(Decimal64::new(false, u128::MAX, 0).to_bits(), INFINITY_BITS);
    }

    #[test]
    fn underflow_clamps_to_signed_zero() {
        assert_eq!(dec("1e-399").to_bits(), 0);
        assert_eq!(dec("-1e-399").to_bits(), SIGN_MASK);
    }

    #[test]
    fn exponent_scaled_down_into_range() {
        assert_eq!(dec("1e383").to_bits(), 0x5fe0_5af3_107a_4000);
    }

    #[test]
    fn nan_from_any_payload() {
        assert!(Decimal64::from_bits(0x7c00_0000_0000_0000).is_nan());
        assert!(Decimal64::from_bits(0xfe00_0000_dead_beef).is_nan());
        assert_ne!(Decimal64::NaN, Decimal64::NaN);
    }

    #[test]
    fn display_uses_scientific_rules() {
        assert_eq!(dec("123.4500").to_string(), "123.4500");
        assert_eq!(dec("0.000001").to_string(), "0.000001");
        assert_eq!(dec("0.0000001").to_string(), "1E-7");
        assert_eq!(dec("1e3").to_string(), "1E+3");
        assert_eq!(dec("-12.5e10").to_string(), "-1.25E+11");
        assert_eq!(Decimal64::NEG_INFINITY.to_string(), "-Infinity");
    }

    #[test]
    fn equality_is_numeric() {
        assert_eq!(dec("1.0"), dec("1"));
        assert_eq!(dec("-0"), dec("0.00"));
        assert_ne!(dec("1"), dec("-1"));
        assert!(dec("-2") < dec("1.5"));
        assert!(dec("10") > dec("9.99"));
        assert!(dec("-10") < dec("-9.99"));
        assert!(Decimal64::INFINITY > dec("1e300"));
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "-", ".", "1.2.3", "1e", "e5", "abc", "1e+-2", "--1"] {
            assert!(bad.parse::<Decimal64>().is_err(), "{:?} should not parse", bad);
        }
    }
}

use num_traits::{One, Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Exact rational number used for literals and stencil weights.
/// Always stored in lowest terms with a positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    num: i64,
    den: i64,
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl Rational {
    /// Panics if `den == 0`.
    pub fn new(num: i64, den: i64) -> Self {
        assert!(den != 0, "rational with zero denominator");
        Self::reduce(num as i128, den as i128)
    }

    pub const fn integer(value: i64) -> Self {
        Self { num: value, den: 1 }
    }

    /// Panics when the reduced terms overflow `i64`, like integer arithmetic.
    fn reduce(num: i128, den: i128) -> Self {
        match Self::try_reduce(num, den) {
            Some(value) => value,
            None => panic!("rational overflow: {num}/{den}"),
        }
    }

    /// Lowest terms, or `None` when they do not fit. `i64::MIN` is excluded
    /// so negation stays total.
    fn try_reduce(num: i128, den: i128) -> Option<Self> {
        if den == 0 {
            return None;
        }
        let g = gcd(num, den).max(1);
        let sign = if den < 0 { -1 } else { 1 };
        let num = i64::try_from(sign * num / g).ok().filter(|&n| n != i64::MIN)?;
        let den = i64::try_from(sign * den / g).ok()?;
        Some(Self { num, den })
    }

    pub fn checked_add(&self, rhs: &Self) -> Option<Self> {
        Self::try_reduce(
            self.num as i128 * rhs.den as i128 + rhs.num as i128 * self.den as i128,
            self.den as i128 * rhs.den as i128,
        )
    }

    pub fn checked_mul(&self, rhs: &Self) -> Option<Self> {
        Self::try_reduce(
            self.num as i128 * rhs.num as i128,
            self.den as i128 * rhs.den as i128,
        )
    }

    pub fn numer(&self) -> i64 {
        self.num
    }

    pub fn denom(&self) -> i64 {
        self.den
    }

    pub fn is_integer(&self) -> bool {
        self.den == 1
    }

    pub fn recip(&self) -> Option<Self> {
        if self.num == 0 {
            None
        } else {
            Some(Self::reduce(self.den as i128, self.num as i128))
        }
    }

    /// Integer power by squaring; negative exponents invert. `None` for
    /// `0**-n` or when the result overflows.
    pub fn powi(&self, exp: i32) -> Option<Self> {
        let mut base = if exp < 0 { self.recip()? } else { *self };
        let mut remaining = exp.unsigned_abs();
        let mut acc = Self::one();
        while remaining > 0 {
            if remaining & 1 == 1 {
                acc = acc.checked_mul(&base)?;
            }
            remaining >>= 1;
            if remaining > 0 {
                base = base.checked_mul(&base)?;
            }
        }
        Some(acc)
    }

    /// Parses an integer or plain decimal literal exactly (`0.25` -> `1/4`).
    pub fn parse_decimal(text: &str) -> Option<Self> {
        let (int_part, frac_part) = match text.split_once('.') {
            Some((i, f)) => (i, f),
            None => (text, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
            || frac_part.len() > 15
        {
            return None;
        }
        let digits = format!("{int_part}{frac_part}");
        let num: i64 = digits.parse().ok()?;
        let den = 10i64.checked_pow(frac_part.len() as u32)?;
        Some(Self::new(num, den))
    }
}

impl Zero for Rational {
    fn zero() -> Self {
        Self::integer(0)
    }

    fn is_zero(&self) -> bool {
        self.num == 0
    }
}

impl One for Rational {
    fn one() -> Self {
        Self::integer(1)
    }
}

impl ToPrimitive for Rational {
    fn to_i64(&self) -> Option<i64> {
        self.is_integer().then_some(self.num)
    }

    fn to_u64(&self) -> Option<u64> {
        self.to_i64().and_then(|v| u64::try_from(v).ok())
    }

    fn to_f64(&self) -> Option<f64> {
        Some(self.num as f64 / self.den as f64)
    }
}

impl Add for Rational {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::reduce(
            self.num as i128 * rhs.den as i128 + rhs.num as i128 * self.den as i128,
            self.den as i128 * rhs.den as i128,
        )
    }
}

impl Sub for Rational {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

impl Mul for Rational {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::reduce(
            self.num as i128 * rhs.num as i128,
            self.den as i128 * rhs.den as i128,
        )
    }
}

impl Div for Rational {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        assert!(rhs.num != 0, "division of rational by zero");
        Self::reduce(
            self.num as i128 * rhs.den as i128,
            self.den as i128 * rhs.num as i128,
        )
    }
}

impl Neg for Rational {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            num: -self.num,
            den: self.den,
        }
    }
}

impl Signed for Rational {
    fn abs(&self) -> Self {
        Self {
            num: self.num.abs(),
            den: self.den,
        }
    }

    fn abs_sub(&self, other: &Self) -> Self {
        if *self <= *other {
            Self::zero()
        } else {
            *self - *other
        }
    }

    fn signum(&self) -> Self {
        Self::integer(self.num.signum())
    }

    fn is_positive(&self) -> bool {
        self.num > 0
    }

    fn is_negative(&self) -> bool {
        self.num < 0
    }
}

// `Signed` requires `Num`, which in turn needs `Rem` and `from_str_radix`.
impl std::ops::Rem for Rational {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        let quotient = (self / rhs).num / (self / rhs).den;
        self - rhs * Self::integer(quotient)
    }
}

impl num_traits::Num for Rational {
    type FromStrRadixErr = std::num::ParseIntError;

    fn from_str_radix(text: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        match text.split_once('/') {
            Some((n, d)) => Ok(Self::new(
                i64::from_str_radix(n.trim(), radix)?,
                i64::from_str_radix(d.trim(), radix)?,
            )),
            None => Ok(Self::integer(i64::from_str_radix(text.trim(), radix)?)),
        }
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.num as i128 * other.den as i128).cmp(&(other.num as i128 * self.den as i128))
    }
}

impl From<i64> for Rational {
    fn from(value: i64) -> Self {
        Self::integer(value)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_reduces_and_normalises_sign() {
        let r = Rational::new(4, -8);
        assert_eq!(r.numer(), -1);
        assert_eq!(r.denom(), 2);
    }

    #[test]
    fn arithmetic_is_exact() {
        let a = Rational::new(1, 3);
        let b = Rational::new(1, 6);
        assert_eq!(a + b, Rational::new(1, 2));
        assert_eq!(a - b, Rational::new(1, 6));
        assert_eq!(a * b, Rational::new(1, 18));
        assert_eq!(a / b, Rational::integer(2));
    }

    #[test]
    fn parse_decimal_is_exact() {
        assert_eq!(Rational::parse_decimal("0.25"), Some(Rational::new(1, 4)));
        assert_eq!(Rational::parse_decimal("12"), Some(Rational::integer(12)));
        assert_eq!(Rational::parse_decimal("1.5"), Some(Rational::new(3, 2)));
        assert_eq!(Rational::parse_decimal("."), None);
        assert_eq!(Rational::parse_decimal("1e3"), None);
    }

    #[test]
    fn powi_handles_negative_exponents() {
        let r = Rational::new(2, 3);
        assert_eq!(r.powi(2), Some(Rational::new(4, 9)));
        assert_eq!(r.powi(-1), Some(Rational::new(3, 2)));
        assert_eq!(Rational::zero().powi(-1), None);
    }

    #[test]
    fn overflow_is_reported_instead_of_panicking() {
        let two = Rational::integer(2);
        assert_eq!(two.powi(62), Some(Rational::integer(1 << 62)));
        assert_eq!(two.powi(63), None);
        assert_eq!(two.powi(64), None);
        assert_eq!(Rational::one().powi(i32::MAX), Some(Rational::one()));
        assert_eq!(Rational::integer(-1).powi(i32::MAX), Some(Rational::integer(-1)));

        let big = Rational::integer(i64::MAX);
        assert_eq!(big.checked_add(&Rational::one()), None);
        assert_eq!(big.checked_mul(&two), None);
        assert_eq!(big.checked_mul(&Rational::new(1, 3)), Some(Rational::new(i64::MAX, 3)));
    }

    #[test]
    fn display_omits_unit_denominator() {
        assert_eq!(Rational::integer(-3).to_string(), "-3");
        assert_eq!(Rational::new(-1, 280).to_string(), "-1/280");
    }
}

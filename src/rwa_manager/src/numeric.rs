//! Checked fixed-point arithmetic on 256-bit unsigned integers.
//!
//! Token amounts are `WAD` scaled (18 decimals) and per-unit rates and
//! written-off debt are `RAY` scaled (27 decimals). Every operation fails
//! instead of wrapping, so a result that does not fit the width aborts the
//! call that produced it.

pub use ethnum::U256;
use std::fmt;

/// 10^18, the scale of token amounts.
pub const WAD: U256 = U256::new(1_000_000_000_000_000_000);
/// 10^27, the scale of rates and the written-off tab.
pub const RAY: U256 = U256::new(1_000_000_000_000_000_000_000_000_000);
/// 2^255, the size of the positive half of the 256-bit range.
pub const HALF_RANGE: U256 = U256::from_words(1 << 127, 0);

/// Number of decimals every token handled by the manager must report.
pub const TOKEN_DECIMALS: u8 = 18;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithmeticError {
    Overflow,
    Underflow,
}

impl fmt::Display for ArithmeticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow => write!(f, "arithmetic overflow"),
            Self::Underflow => write!(f, "arithmetic underflow"),
        }
    }
}

pub fn add(x: U256, y: U256) -> Result<U256, ArithmeticError> {
    x.checked_add(y).ok_or(ArithmeticError::Overflow)
}

pub fn sub(x: U256, y: U256) -> Result<U256, ArithmeticError> {
    x.checked_sub(y).ok_or(ArithmeticError::Underflow)
}

/// Multiplication that fails unless `(x * y) / y == x` holds for a non-zero `y`.
pub fn mul(x: U256, y: U256) -> Result<U256, ArithmeticError> {
    if y == U256::ZERO {
        return Ok(U256::ZERO);
    }
    x.checked_mul(y).ok_or(ArithmeticError::Overflow)
}

/// Ceiling division, `(x + y - 1) / y`.
///
/// A zero divisor underflows on `y - 1`, so it is rejected before any division
/// takes place.
pub fn divup(x: U256, y: U256) -> Result<U256, ArithmeticError> {
    Ok(add(x, sub(y, U256::ONE)?)? / y)
}

pub fn min(x: U256, y: U256) -> U256 {
    if x <= y {
        x
    } else {
        y
    }
}

/// True when `amount` is representable as a non-negative signed 256-bit value.
pub fn fits_signed(amount: U256) -> bool {
    amount < HALF_RANGE
}

/// True when `amount` does not exceed the positive half of the range.
pub fn within_half_range(amount: U256) -> bool {
    amount <= HALF_RANGE
}

/// Serde adapter storing a `U256` as its decimal string.
pub mod decimal {
    use super::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse::<U256>().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn u(x: u128) -> U256 {
        U256::new(x)
    }

    #[test]
    fn should_scale_constants() {
        assert_eq!(RAY / WAD, u(1_000_000_000));
        assert_eq!(HALF_RANGE - U256::ONE, U256::MAX >> 1);
    }

    #[test]
    fn should_fail_add_on_overflow() {
        assert_eq!(add(U256::MAX, U256::ONE), Err(ArithmeticError::Overflow));
        assert_eq!(add(u(2), u(3)), Ok(u(5)));
    }

    #[test]
    fn should_fail_sub_on_underflow() {
        assert_eq!(sub(u(2), u(3)), Err(ArithmeticError::Underflow));
        assert_eq!(sub(u(3), u(3)), Ok(U256::ZERO));
    }

    #[test]
    fn should_treat_zero_multiplicand_as_safe() {
        assert_eq!(mul(U256::MAX, U256::ZERO), Ok(U256::ZERO));
        assert_eq!(mul(U256::ZERO, U256::MAX), Ok(U256::ZERO));
        assert_eq!(mul(U256::MAX, u(2)), Err(ArithmeticError::Overflow));
    }

    #[test]
    fn should_round_divup_towards_ceiling() {
        assert_eq!(divup(u(10), u(3)), Ok(u(4)));
        assert_eq!(divup(u(9), u(3)), Ok(u(3)));
        assert_eq!(divup(U256::ZERO, u(3)), Ok(U256::ZERO));
    }

    #[test]
    fn should_reject_divup_by_zero() {
        assert_eq!(divup(u(10), U256::ZERO), Err(ArithmeticError::Underflow));
    }

    #[test]
    fn should_reject_divup_when_numerator_step_overflows() {
        assert_eq!(divup(U256::MAX, u(2)), Err(ArithmeticError::Overflow));
    }

    #[test]
    fn should_check_half_range_bounds() {
        assert!(fits_signed(HALF_RANGE - U256::ONE));
        assert!(!fits_signed(HALF_RANGE));
        assert!(within_half_range(HALF_RANGE));
        assert!(!within_half_range(HALF_RANGE + U256::ONE));
    }

    proptest! {
        #[test]
        fn divup_is_smallest_upper_bound(x in any::<u128>(), y in 1..u128::MAX) {
            let q = divup(u(x), u(y)).unwrap();
            prop_assert!(q * u(y) >= u(x));
            prop_assert!(q == U256::ZERO || (q - U256::ONE) * u(y) < u(x));
        }

        #[test]
        fn min_picks_the_smaller(x in any::<u128>(), y in any::<u128>()) {
            let m = min(u(x), u(y));
            prop_assert!(m <= u(x) && m <= u(y));
            prop_assert!(m == u(x) || m == u(y));
        }
    }
}

//! Utility functions for value normalization and coordinate rounding

use crate::Scalar;

/// Number of decimals kept when rounding coordinates into cache keys
pub const CACHE_KEY_DECIMALS: i32 = 2;

/// Precomputed constant: 10^CACHE_KEY_DECIMALS
const CACHE_KEY_FACTOR: f64 = 100.0;

/// Round a coordinate component to the cache key grid
///
/// Returns the component as an integer number of grid cells so that keys can be hashed
/// and compared exactly.
#[inline(always)]
pub fn round_to_grid(value: f64) -> i64 {
    (value * CACHE_KEY_FACTOR).round() as i64
}

/// Format a number the way attribute values are compared
///
/// Integral values are rendered without a fractional part so that `200`, `200.0` and
/// `"200"` compare equal.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Text form of a scalar used for membership checks
pub fn normalize_scalar(value: &Scalar) -> String {
    match value {
        Scalar::Text(text) => text.trim().to_string(),
        Scalar::Number(number) => format_number(*number),
        Scalar::Bool(flag) => flag.to_string(),
        Scalar::Null => String::new(),
    }
}

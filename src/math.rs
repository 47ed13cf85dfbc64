//! Integer fixed-point helpers.
//!
//! Products of two amounts (or an amount and a scaled price) routinely exceed
//! `u128`, so `mul_div` carries a 256-bit intermediate and only fails when the
//! final quotient does not fit.

use primitive_types::U256;

/// `floor(a * b / denominator)`. None on a zero denominator or when the
/// quotient does not fit in u128.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    // two u128 factors always fit in 256 bits
    let quotient = U256::from(a) * U256::from(b) / U256::from(denominator);
    if quotient > U256::from(u128::MAX) {
        return None;
    }
    Some(quotient.as_u128())
}

/// Share of `total` proportional to `part / whole`, floored. `part == whole`
/// returns `total` exactly, so a full reduction never leaves dust behind.
pub fn pro_rata(total: u128, part: u128, whole: u128) -> Option<u128> {
    if part == whole {
        return Some(total);
    }
    mul_div(total, part, whole)
}

/// Absolute difference in bps of `value` relative to `reference`.
pub fn deviation_bps(value: u128, reference: u128) -> Option<u128> {
    let diff = value.abs_diff(reference);
    mul_div(diff, crate::types::BPS_SCALE, reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_products_match_native() {
        assert_eq!(mul_div(10, 20, 3), Some(66));
        assert_eq!(mul_div(0, 20, 3), Some(0));
        assert_eq!(mul_div(1, 1, 0), None);
    }

    #[test]
    fn wide_products() {
        // (2^127) * 6 / 3 = 2^128 overflows, / 4 fits
        let big = 1u128 << 127;
        assert_eq!(mul_div(big, 6, 3), None);
        assert_eq!(mul_div(big, 6, 4), Some(3 * (1u128 << 126)));

        let wad = 1_000_000_000_000_000_000u128;
        let amount = 123_456_789_000_000_000_000_000u128;
        assert_eq!(mul_div(amount, wad * wad, wad * wad), Some(amount));
        assert_eq!(mul_div(u128::MAX, u128::MAX, u128::MAX), Some(u128::MAX));
    }

    #[test]
    fn pro_rata_full_share_is_exact() {
        assert_eq!(pro_rata(7, 3, 3), Some(7));
        assert_eq!(pro_rata(7, 1, 3), Some(2));
        assert_eq!(pro_rata(7, 0, 3), Some(0));
    }

    #[test]
    fn deviation() {
        assert_eq!(deviation_bps(110, 100), Some(1_000));
        assert_eq!(deviation_bps(90, 100), Some(1_000));
        assert_eq!(deviation_bps(1, 0), None);
    }
}

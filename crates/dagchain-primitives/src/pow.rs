//! Compact difficulty bits, targets and work.

use crate::Hash;
use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};

/// Converts the compact representation of a target into a big integer.
///
/// Negative compact values have no meaning as a target and decode to zero.
pub fn compact_to_big(compact: u32) -> BigUint {
    let mantissa = compact & 0x007f_ffff;
    let is_negative = compact & 0x0080_0000 != 0;
    let exponent = compact >> 24;

    if is_negative {
        return BigUint::zero();
    }

    if exponent <= 3 {
        BigUint::from(mantissa >> (8 * (3 - exponent)))
    } else {
        BigUint::from(mantissa) << (8 * (exponent - 3) as usize)
    }
}

/// Converts a target into its compact representation.
pub fn big_to_compact(n: &BigUint) -> u32 {
    if n.is_zero() {
        return 0;
    }

    let mut exponent = n.to_bytes_be().len() as u32;
    let mut mantissa = if exponent <= 3 {
        n.to_u32().unwrap_or_default() << (8 * (3 - exponent))
    } else {
        (n >> (8 * (exponent - 3) as usize))
            .to_u32()
            .unwrap_or_default()
    };

    // The sign bit is set, shift the mantissa down and bump the exponent.
    if mantissa & 0x0080_0000 != 0 {
        mantissa >>= 8;
        exponent += 1;
    }

    (exponent << 24) | mantissa
}

/// Work represented by a block with the given difficulty bits: `2^256 / (target + 1)`.
pub fn calc_work(bits: u32) -> BigUint {
    let target = compact_to_big(bits);
    if target.is_zero() {
        return BigUint::zero();
    }
    (BigUint::one() << 256usize) / (target + BigUint::one())
}

/// Interprets a block hash as a little-endian 256-bit number for proof-of-work comparison.
pub fn hash_to_big(hash: &Hash) -> BigUint {
    BigUint::from_bytes_le(hash.as_bytes())
}

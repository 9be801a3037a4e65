/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Integer helpers for the rate analyzer: GCD and LCM bounded by the
//! configured maximum sample count.

/// Raised when a product leaves the configured sample-count range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow {
    pub a: u64,
    pub b: u64,
}

/// Iterative Euclidean GCD.  `gcd(0, x) == x`.
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// LCM that fails when the result would exceed `limit`.
///
/// Uses `(a / gcd(a, b)) * b` so the division happens first; the final
/// multiplication is still checked.  Returns `Ok(0)` when either input is `0`.
pub fn lcm_bounded(a: u64, b: u64, limit: u64) -> Result<u64, Overflow> {
    if a == 0 || b == 0 {
        return Ok(0);
    }
    let reduced = a / gcd(a, b);
    reduced
        .checked_mul(b)
        .filter(|v| *v <= limit)
        .ok_or(Overflow { a, b })
}

/// `a * b`, failing above `limit`.
pub fn mul_bounded(a: u64, b: u64, limit: u64) -> Result<u64, Overflow> {
    a.checked_mul(b)
        .filter(|v| *v <= limit)
        .ok_or(Overflow { a, b })
}

/// Reduce a sequence to its overall LCM.  `Ok(1)` for an empty sequence so
/// the result can always serve as a timebase.
pub fn lcm_of<I>(values: I, limit: u64) -> Result<u64, Overflow>
where
    I: IntoIterator<Item = u64>,
{
    values
        .into_iter()
        .filter(|v| *v > 0)
        .try_fold(1, |acc, v| lcm_bounded(acc, v, limit))
}

/// GCD of a sequence; `0` for an empty sequence.
pub fn gcd_of<I>(values: I) -> u64
where
    I: IntoIterator<Item = u64>,
{
    values.into_iter().fold(0, gcd)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

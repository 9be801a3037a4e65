/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Integer simulation time.
//!
//! Every timing quantity in the scheduler is a whole number of ticks at one
//! fixed resolution.  Multi-rate ratios are resolved with integer LCM/GCD
//! arithmetic (see [`crate::timing::math`]) so no rounding error can build up
//! over long runs.  [`TimeResolution`] only matters for parsing and display.

use std::fmt;

use serde::Deserialize;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Femtoseconds per picosecond.
pub const FS_PER_PS: u64 = 1_000;
/// Femtoseconds per nanosecond.
pub const FS_PER_NS: u64 = 1_000_000;
/// Femtoseconds per microsecond.
pub const FS_PER_US: u64 = 1_000_000_000;
/// Femtoseconds per millisecond.
pub const FS_PER_MS: u64 = 1_000_000_000_000;
/// Femtoseconds per second.
pub const FS_PER_S: u64 = 1_000_000_000_000_000;

const UNITS: [(&str, u64); 6] = [
    ("s", FS_PER_S),
    ("ms", FS_PER_MS),
    ("us", FS_PER_US),
    ("ns", FS_PER_NS),
    ("ps", FS_PER_PS),
    ("fs", 1),
];

// ── Time ──────────────────────────────────────────────────────────────────────

/// A point in time or a duration, counted in resolution ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(u64);

impl Time {
    pub const ZERO: Time = Time(0);
    pub const MAX: Time = Time(u64::MAX);

    pub const fn from_ticks(ticks: u64) -> Self {
        Time(ticks)
    }

    pub const fn ticks(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Time) -> Option<Time> {
        self.0.checked_add(other.0).map(Time)
    }

    pub fn saturating_add(self, other: Time) -> Time {
        Time(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Time) -> Time {
        Time(self.0.saturating_sub(other.0))
    }

    pub fn checked_mul(self, factor: u64) -> Option<Time> {
        self.0.checked_mul(factor).map(Time)
    }

    /// `self * num / den`, truncated.  The product is formed in 128 bits so
    /// it cannot overflow; `None` when `den == 0` or the result does not fit.
    pub fn scale(self, num: u64, den: u64) -> Option<Time> {
        if den == 0 {
            return None;
        }
        let v = (self.0 as u128) * (num as u128) / (den as u128);
        u64::try_from(v).ok().map(Time)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ticks", self.0)
    }
}

// ── TimeResolution ────────────────────────────────────────────────────────────

/// Length of one tick, in femtoseconds.
///
/// Parsed from strings such as `"1ps"`, `"10 ns"` or `"1fs"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct TimeResolution {
    fs_per_tick: u64,
}

impl TimeResolution {
    pub const PICOSECOND: TimeResolution = TimeResolution {
        fs_per_tick: FS_PER_PS,
    };

    pub fn from_fs(fs_per_tick: u64) -> Option<Self> {
        (fs_per_tick > 0).then_some(Self { fs_per_tick })
    }

    pub fn fs_per_tick(&self) -> u64 {
        self.fs_per_tick
    }

    /// Convert a duration string such as `"10us"` into ticks at this
    /// resolution.  Only integral values are accepted.
    ///
    /// Fails when the value is not a whole number of ticks.
    pub fn parse_time(&self, s: &str) -> Result<Time, String> {
        let fs = parse_fs(s)?;
        if fs % self.fs_per_tick != 0 {
            return Err(format!(
                "'{s}' is not a multiple of the time resolution ({})",
                self.describe()
            ));
        }
        Ok(Time(fs / self.fs_per_tick))
    }

    /// Human-readable rendering of `t` using the largest exact unit.
    pub fn format(&self, t: Time) -> String {
        let Some(fs) = t.0.checked_mul(self.fs_per_tick) else {
            return format!("{} ticks", t.0);
        };
        if fs == 0 {
            return "0 s".to_string();
        }
        for (unit, scale) in UNITS {
            if fs >= scale && fs % scale == 0 {
                return format!("{} {unit}", fs / scale);
            }
        }
        format!("{fs} fs")
    }

    pub fn describe(&self) -> String {
        self.format(Time(1))
    }
}

impl Default for TimeResolution {
    fn default() -> Self {
        Self::PICOSECOND
    }
}

impl TryFrom<String> for TimeResolution {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let fs = parse_fs(&s)?;
        TimeResolution::from_fs(fs).ok_or_else(|| format!("time resolution '{s}' must be non-zero"))
    }
}

/// Parse `"<integer><unit>"` (whitespace between the two is allowed) into
/// femtoseconds.
fn parse_fs(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("'{s}' has no time unit (expected one of s, ms, us, ns, ps, fs)"))?;
    let (value, unit) = s.split_at(split);
    let value: u64 = value
        .parse()
        .map_err(|_| format!("'{s}' does not start with an integer value"))?;
    let unit = unit.trim();
    let scale = UNITS
        .iter()
        .find(|(u, _)| *u == unit)
        .map(|(_, scale)| *scale)
        .ok_or_else(|| format!("unknown time unit '{unit}' in '{s}'"))?;
    value
        .checked_mul(scale)
        .ok_or_else(|| format!("'{s}' overflows the femtosecond range"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

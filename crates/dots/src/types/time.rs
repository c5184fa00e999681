// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Chrono fundamentals: wall-clock and monotonic time points, signed durations.

use std::fmt;
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Signed duration with nanosecond resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(i64);

impl Duration {
    pub const ZERO: Duration = Duration(0);

    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Duration(nanos)
    }

    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Duration(millis.saturating_mul(1_000_000))
    }

    #[must_use]
    pub fn from_secs_f64(secs: f64) -> Self {
        Duration((secs * 1e9) as i64)
    }

    #[must_use]
    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    #[must_use]
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1e9
    }
}

impl From<std::time::Duration> for Duration {
    fn from(d: std::time::Duration) -> Self {
        Duration(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.as_secs_f64())
    }
}

/// Wall-clock time point, measured from the UNIX epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimePoint(Duration);

impl TimePoint {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        TimePoint(since_epoch.into())
    }

    #[must_use]
    pub const fn from_epoch(since_epoch: Duration) -> Self {
        TimePoint(since_epoch)
    }

    #[must_use]
    pub const fn since_epoch(&self) -> Duration {
        self.0
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0.as_secs_f64())
    }
}

fn steady_origin() -> Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

/// Monotonic time point, measured from the first use in this process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SteadyTimePoint(Duration);

impl SteadyTimePoint {
    pub fn now() -> Self {
        SteadyTimePoint(steady_origin().elapsed().into())
    }

    #[must_use]
    pub const fn from_origin(elapsed: Duration) -> Self {
        SteadyTimePoint(elapsed)
    }

    #[must_use]
    pub const fn since_origin(&self) -> Duration {
        self.0
    }
}

impl fmt::Display for SteadyTimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

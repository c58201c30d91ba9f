// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! The keepalive watchdog cares about wall-clock elapsed reachability of the
//! peer, not CPU time, so it must use a clock that keeps advancing while the
//! host machine is asleep. `std::time::Instant` is not guaranteed to do that
//! on every platform; `SystemTime` is wall-clock based and does.

use std::time::{Duration, SystemTime};

/// A source of "now", abstracted so tests can control it.
pub trait Clock: Send + Sync + 'static {
    /// The current time.
    fn now(&self) -> SystemTime;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Returns the elapsed duration between two `SystemTime`s, saturating to zero
/// if `earlier` is somehow after `later` (e.g. an NTP step backwards).
pub fn elapsed_since(earlier: SystemTime, later: SystemTime) -> Duration {
    later.duration_since(earlier).unwrap_or(Duration::ZERO)
}

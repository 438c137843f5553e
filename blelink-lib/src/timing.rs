//! Tick arithmetic for the link layer.
//!
//! The hardware tick counter is a free-running `u32` that wraps. Every
//! comparison in the crate is expressed as "ticks elapsed since a reference"
//! using wrapping subtraction, which stays correct across the wrap as long as
//! the measured span is shorter than 2^32 ticks.

use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::{T_IFS_US, UNIT_10_MS_US, UNIT_1250_US};

/// A sample of the hardware tick counter.
pub type Tick = u32;

/// Ticks elapsed from `earlier` to `now`, modulo 2^32.
#[inline]
pub fn elapsed_since(now: Tick, earlier: Tick) -> u32 {
    now.wrapping_sub(earlier)
}

/// Whether at least `span` ticks have passed since `start`.
#[inline]
pub fn has_elapsed(now: Tick, start: Tick, span: u32) -> bool {
    elapsed_since(now, start) >= span
}

/// Source of the monotonic tick counter.
pub trait Clock {
    fn now(&self) -> Tick;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Tick {
        (**self).now()
    }
}

/// Tick counter shared with the interrupt that drives it.
///
/// The interrupt handler is the only writer; the link layer only ever loads
/// the value, so a single atomic word is all the synchronisation needed.
#[derive(Debug, Default)]
pub struct TickCounter(AtomicU32);

impl TickCounter {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Called from the tick interrupt.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn advance(&self, ticks: u32) {
        self.0.fetch_add(ticks, Ordering::Relaxed);
    }
}

impl Clock for TickCounter {
    fn now(&self) -> Tick {
        self.0.load(Ordering::Relaxed)
    }
}

/// Conversion between protocol time units and hardware ticks.
///
/// Conversions saturate at `u32::MAX` instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TickRate {
    pub ticks_per_us: u32,
}

impl TickRate {
    pub const fn new(ticks_per_us: u32) -> Self {
        Self { ticks_per_us }
    }

    pub fn ticks_for_us(&self, us: u32) -> u32 {
        let ticks = us as u64 * self.ticks_per_us as u64;
        u32::try_from(ticks).unwrap_or(u32::MAX)
    }

    pub fn ticks_for_ms(&self, ms: u32) -> u32 {
        self.ticks_for_us(ms.saturating_mul(1000))
    }

    /// Window size, window offset and interval are carried in 1.25 ms units.
    pub fn ticks_for_1250us_units(&self, units: u32) -> u32 {
        self.ticks_for_us(units.saturating_mul(UNIT_1250_US))
    }

    /// Supervision timeout is carried in 10 ms units.
    pub fn ticks_for_10ms_units(&self, units: u32) -> u32 {
        self.ticks_for_us(units.saturating_mul(UNIT_10_MS_US))
    }

    /// The inter-frame space floor.
    pub fn t_ifs(&self) -> u32 {
        self.ticks_for_us(T_IFS_US)
    }
}

/// Receive window of a connection event, relative to the event's anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindow {
    pub open: u32,
    pub close: u32,
}

impl EventWindow {
    /// Window opening `offset` ticks after the anchor and closing at
    /// `offset + size`, clamped so it never spills into the next interval.
    pub fn new(offset: u32, size: u32, interval: u32) -> Self {
        let close = offset.saturating_add(size).min(interval);
        Self {
            open: offset.min(close),
            close,
        }
    }

    pub fn has_opened(&self, anchor: Tick, now: Tick) -> bool {
        has_elapsed(now, anchor, self.open)
    }

    pub fn has_closed(&self, anchor: Tick, now: Tick) -> bool {
        has_elapsed(now, anchor, self.close)
    }

    pub fn contains(&self, anchor: Tick, now: Tick) -> bool {
        self.has_opened(anchor, now) && !self.has_closed(anchor, now)
    }
}

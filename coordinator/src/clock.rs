//! Match clock bookkeeping.
//!
//! The server is authoritative for time; this clock only mirrors what the
//! move echoes report, to keep the host display and the engine's `go`
//! parameters honest.

use csa_client::{Side, TimeControl};

#[derive(Debug, Clone, Copy, Default)]
struct SideClock {
    remaining_ms: u64,
    consumed_ms: u64,
    byoyomi_ms: u64,
}

/// Per-side consumed/remaining estimates built from the summary's time
/// control, per-side overrides honored.
#[derive(Debug, Clone)]
pub struct MatchClock {
    black: SideClock,
    white: SideClock,
    increment_ms: u64,
    unit_ms: u64,
    roundup: bool,
}

impl MatchClock {
    pub fn new(control: &TimeControl) -> Self {
        let unit_ms = control.unit.to_millis();
        let side = |s: Side| SideClock {
            remaining_ms: control.total_time_for(s) * unit_ms,
            consumed_ms: 0,
            byoyomi_ms: control.byoyomi_for(s) * unit_ms,
        };
        Self {
            black: side(Side::Black),
            white: side(Side::White),
            increment_ms: control.increment * unit_ms,
            unit_ms,
            roundup: control.roundup,
        }
    }

    /// Record one move's consumed time for `side`.
    ///
    /// Remaining time is charged then granted the increment, floored at
    /// zero; once main time is exhausted the per-move byoyomi absorbs the
    /// charge instead.
    pub fn record_move(&mut self, side: Side, consumed_ms: u64) {
        let increment = self.increment_ms;
        let charged = if self.roundup && self.unit_ms > 1 {
            consumed_ms.div_ceil(self.unit_ms) * self.unit_ms
        } else {
            consumed_ms
        };
        let clock = self.side_mut(side);
        clock.consumed_ms += charged;
        if clock.remaining_ms > 0 {
            clock.remaining_ms = clock.remaining_ms.saturating_sub(charged) + increment;
        }
        // In byoyomi the grant renews every move; remaining stays zero.
    }

    pub fn remaining_ms(&self, side: Side) -> u64 {
        self.side(side).remaining_ms
    }

    pub fn consumed_ms(&self, side: Side) -> u64 {
        self.side(side).consumed_ms
    }

    pub fn byoyomi_ms(&self, side: Side) -> u64 {
        self.side(side).byoyomi_ms
    }

    pub fn increment_ms(&self) -> u64 {
        self.increment_ms
    }

    fn side(&self, side: Side) -> &SideClock {
        match side {
            Side::Black => &self.black,
            Side::White => &self.white,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut SideClock {
        match side {
            Side::Black => &mut self.black,
            Side::White => &mut self.white,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csa_client::TimeUnit;

    fn control(total: u64, byoyomi: u64, increment: u64) -> TimeControl {
        TimeControl {
            unit: TimeUnit::Seconds,
            total_time: total,
            byoyomi,
            increment,
            ..Default::default()
        }
    }

    #[test]
    fn test_charging_and_increment() {
        let mut clock = MatchClock::new(&control(600, 0, 5));
        clock.record_move(Side::Black, 12_000);
        assert_eq!(clock.remaining_ms(Side::Black), 600_000 - 12_000 + 5_000);
        assert_eq!(clock.consumed_ms(Side::Black), 12_000);
        // White untouched.
        assert_eq!(clock.remaining_ms(Side::White), 600_000);
    }

    #[test]
    fn test_consumed_is_monotone() {
        let mut clock = MatchClock::new(&control(10, 10, 0));
        let mut last = 0;
        for _ in 0..20 {
            clock.record_move(Side::White, 3_000);
            assert!(clock.consumed_ms(Side::White) >= last);
            last = clock.consumed_ms(Side::White);
        }
    }

    #[test]
    fn test_remaining_floors_at_zero_then_byoyomi() {
        let mut clock = MatchClock::new(&control(5, 10, 0));
        clock.record_move(Side::Black, 60_000);
        assert_eq!(clock.remaining_ms(Side::Black), 0);
        // Byoyomi stands per move once main time is gone.
        clock.record_move(Side::Black, 9_000);
        assert_eq!(clock.remaining_ms(Side::Black), 0);
        assert_eq!(clock.byoyomi_ms(Side::Black), 10_000);
        assert_eq!(clock.consumed_ms(Side::Black), 69_000);
    }

    #[test]
    fn test_per_side_overrides() {
        let control = TimeControl {
            unit: TimeUnit::Minutes,
            total_time: 10,
            byoyomi: 1,
            total_time_black: Some(15),
            byoyomi_white: Some(2),
            ..Default::default()
        };
        let clock = MatchClock::new(&control);
        assert_eq!(clock.remaining_ms(Side::Black), 15 * 60_000);
        assert_eq!(clock.remaining_ms(Side::White), 10 * 60_000);
        assert_eq!(clock.byoyomi_ms(Side::Black), 60_000);
        assert_eq!(clock.byoyomi_ms(Side::White), 2 * 60_000);
    }

    #[test]
    fn test_roundup_charges_full_units() {
        let control = TimeControl {
            unit: TimeUnit::Seconds,
            total_time: 60,
            roundup: true,
            ..Default::default()
        };
        let mut clock = MatchClock::new(&control);
        clock.record_move(Side::Black, 1_500);
        assert_eq!(clock.consumed_ms(Side::Black), 2_000);
        assert_eq!(clock.remaining_ms(Side::Black), 58_000);
    }
}

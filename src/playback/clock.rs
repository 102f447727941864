//! Rate-controlled frame clock.

use std::time::Duration;

/// Lower bound applied to the multiplier when computing the effective interval.
const MIN_MULTIPLIER: f32 = 0.1;

/// Speed multiplier for a rate step: `step + 1` above zero, `1 / 2^|step|`
/// below it.
pub fn rate_multiplier(step: i32) -> f32 {
    if step >= 0 {
        (step + 1) as f32
    } else {
        1.0 / (1u64 << step.unsigned_abs().min(63)) as f32
    }
}

/// Whether enough time has passed since `last_advance` to show the next frame.
pub fn should_advance(
    now: Duration,
    last_advance: Duration,
    nominal_interval: Duration,
    multiplier: f32,
) -> bool {
    let effective = nominal_interval.as_secs_f64() / multiplier.max(MIN_MULTIPLIER) as f64;
    now.saturating_sub(last_advance).as_secs_f64() >= effective
}

/// Playback speed step, clamped to `[MIN, MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct RateStep(i32);

impl RateStep {
    pub const MIN: i32 = -7;
    pub const MAX: i32 = 9;

    pub fn new(step: i32) -> Self {
        Self(step.clamp(Self::MIN, Self::MAX))
    }

    #[inline]
    pub fn get(self) -> i32 {
        self.0
    }

    pub fn up(self) -> Self {
        Self::new(self.0.saturating_add(1))
    }

    pub fn down(self) -> Self {
        Self::new(self.0.saturating_sub(1))
    }

    pub fn multiplier(self) -> f32 {
        rate_multiplier(self.0)
    }
}

/// Single-consumer frame clock.
///
/// Times are offsets from an arbitrary epoch chosen by the caller, so the
/// clock itself never reads the system time.
#[derive(Debug, Clone)]
pub struct RateClock {
    step: RateStep,
    nominal_interval: Duration,
    last_advance: Duration,
}

impl RateClock {
    pub fn new(nominal_interval: Duration) -> Self {
        Self {
            step: RateStep::default(),
            nominal_interval,
            last_advance: Duration::ZERO,
        }
    }

    pub fn step(&self) -> RateStep {
        self.step
    }

    pub fn nominal_interval(&self) -> Duration {
        self.nominal_interval
    }

    pub fn multiplier(&self) -> f32 {
        self.step.multiplier()
    }

    pub fn step_up(&mut self) {
        self.step = self.step.up();
        log::debug!("Rate step {} (x{})", self.step.get(), self.multiplier());
    }

    pub fn step_down(&mut self) {
        self.step = self.step.down();
        log::debug!("Rate step {} (x{})", self.step.get(), self.multiplier());
    }

    /// Returns true and records `now` when a new frame is due.
    pub fn poll(&mut self, now: Duration) -> bool {
        let due = should_advance(
            now,
            self.last_advance,
            self.nominal_interval,
            self.multiplier(),
        );
        if due {
            self.last_advance = now;
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_multiplier_values() {
        assert_eq!(rate_multiplier(0), 1.0);
        assert_eq!(rate_multiplier(9), 10.0);
        assert_eq!(rate_multiplier(-1), 0.5);
        assert_eq!(rate_multiplier(-7), 1.0 / 128.0);
    }

    #[test]
    fn test_multiplier_monotonic() {
        for step in RateStep::MIN..RateStep::MAX {
            assert!(rate_multiplier(step) < rate_multiplier(step + 1));
        }
    }

    #[test]
    fn test_step_clamps() {
        let mut step = RateStep::new(RateStep::MAX);
        step = step.up();
        assert_eq!(step.get(), 9);

        let mut step = RateStep::new(RateStep::MIN);
        step = step.down();
        assert_eq!(step.get(), -7);

        assert_eq!(RateStep::new(100).get(), 9);
        assert_eq!(RateStep::new(i32::MIN).get(), -7);
    }

    #[test]
    fn test_clock_clamps_without_wrap() {
        let mut clock = RateClock::new(ms(33));
        for _ in 0..20 {
            clock.step_up();
        }
        assert_eq!(clock.step().get(), 9);
        for _ in 0..40 {
            clock.step_down();
        }
        assert_eq!(clock.step().get(), -7);
    }

    #[test]
    fn test_calls_40ms_apart_both_advance() {
        let mut clock = RateClock::new(ms(33));
        assert!(clock.poll(ms(40)));
        assert!(clock.poll(ms(80)));
    }

    #[test]
    fn test_calls_10ms_apart_advance_once() {
        let mut clock = RateClock::new(ms(33));
        let results = [clock.poll(ms(30)), clock.poll(ms(40))];
        assert_eq!(results.iter().filter(|&&a| a).count(), 1);
    }

    #[test]
    fn test_speed_changes_interval() {
        assert!(should_advance(ms(21), ms(0), ms(40), 2.0));
        assert!(!should_advance(ms(20), ms(0), ms(40), 1.0));
        assert!(!should_advance(ms(70), ms(0), ms(40), 0.5));
        assert!(should_advance(ms(81), ms(0), ms(40), 0.5));
    }

    #[test]
    fn test_multiplier_floor() {
        // 1/128 would mean 128x the interval; the floor caps it at 10x.
        assert!(should_advance(ms(400), ms(0), ms(40), rate_multiplier(-7)));
        assert!(!should_advance(ms(399), ms(0), ms(40), rate_multiplier(-7)));
    }

    proptest! {
        #[test]
        fn test_step_always_in_range(moves in proptest::collection::vec(any::<bool>(), 0..64)) {
            let mut step = RateStep::default();
            for up in moves {
                step = if up { step.up() } else { step.down() };
                prop_assert!((RateStep::MIN..=RateStep::MAX).contains(&step.get()));
            }
        }
    }
}

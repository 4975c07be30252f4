//! Controller tunables

use static_assertions::const_assert;

use crate::thermometer::{Degrees, Temperature, Unit};

/// Tunables of the hysteresis controller.
///
/// Temperature differences (`tolerance`, `alarm_tolerance`) apply in the controller's own unit.
/// Absolute temperatures (`target_min`, `target_max`, `target_default`) carry their unit and are
/// converted to the controller's unit when used.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    /// Half width of the band around the target considered in range
    pub tolerance: Degrees,
    /// Deviation from the target that raises the alarm flag
    pub alarm_tolerance: Degrees,
    /// Consecutive out of tolerance ticks before Idle commits to heating or cooling
    pub gap_count_max: u32,
    /// Consecutive heating or cooling ticks after which the alarm flag is raised
    pub adjust_count_max: u32,
    /// Time between two control ticks
    pub tick_interval_ms: u32,
    /// Lowest accepted target
    pub target_min: Temperature,
    /// Highest accepted target
    pub target_max: Temperature,
    /// Target on start-up
    pub target_default: Temperature,
}

pub const TOLERANCE: Degrees = Degrees::const_from_int(1);
pub const ALARM_TOLERANCE: Degrees = Degrees::const_from_int(10);
pub const GAP_COUNT_MAX: u32 = 12;
pub const ADJUST_COUNT_MAX: u32 = 24;
pub const TICK_INTERVAL_MS: u32 = 5_000;
pub const TARGET_MIN: Temperature = Temperature::new(Degrees::const_from_int(28), Unit::Fahrenheit);
pub const TARGET_MAX: Temperature = Temperature::new(Degrees::const_from_int(80), Unit::Fahrenheit);
pub const TARGET_DEFAULT: Temperature =
    Temperature::new(Degrees::const_from_int(65), Unit::Fahrenheit);

const_assert!(GAP_COUNT_MAX > 0);
const_assert!(ADJUST_COUNT_MAX > 0);
const_assert!(TICK_INTERVAL_MS >= 1_000);

impl Config {
    pub const DEFAULT: Self = Self {
        tolerance: TOLERANCE,
        alarm_tolerance: ALARM_TOLERANCE,
        gap_count_max: GAP_COUNT_MAX,
        adjust_count_max: ADJUST_COUNT_MAX,
        tick_interval_ms: TICK_INTERVAL_MS,
        target_min: TARGET_MIN,
        target_max: TARGET_MAX,
        target_default: TARGET_DEFAULT,
    };

    /// Seconds the debounce window spans, from the first out of tolerance tick to the commit
    pub const fn debounce_secs(&self) -> u32 {
        self.gap_count_max.saturating_mul(self.tick_interval_ms) / 1000
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config, Config::DEFAULT);
        assert_eq!(config.tolerance, Degrees::from_num(1));
        assert_eq!(config.gap_count_max, 12);
        assert_eq!(config.debounce_secs(), 60);
        assert!(config.target_min.degrees() < config.target_default.degrees());
        assert!(config.target_default.degrees() < config.target_max.degrees());
    }

    #[test]
    fn debounce_saturates() {
        let config = Config {
            tick_interval_ms: u32::MAX,
            ..Config::DEFAULT
        };
        assert_eq!(config.debounce_secs(), u32::MAX / 1000);
    }
}

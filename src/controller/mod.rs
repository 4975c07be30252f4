//! Hysteresis controller driving a heater and a cooler [`Relay`] to hold a target temperature.

mod state;

use core::{fmt, ops::RangeInclusive};

pub use self::state::ControlState;
use crate::{
    config::Config,
    relay::Relay,
    thermometer::{Degrees, SensorError, SensorReading, Temperature, Unit},
    units,
};

/// The requested target temperature is outside of the configured bounds
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidTarget;

impl fmt::Display for InvalidTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Target temperature out of range")
    }
}

/// Bang-bang controller for one fermentation vessel.
///
/// Leaving the tolerance band around the target does not switch anything right away: the reading
/// has to stay out of tolerance for [`Config::gap_count_max`] consecutive ticks before the
/// controller commits to heating or cooling. Coming back within tolerance drops to
/// [`ControlState::Idle`] immediately.
///
/// The relays are only written when a state is committed, so they always match [`Self::state`].
pub struct Controller<H, C> {
    name: &'static str,
    unit: Unit,
    config: Config,
    heater: H,
    cooler: C,
    current: SensorReading,
    target: Temperature,
    state: ControlState,
    next_state: ControlState,
    gap_count: u32,
    adjust_count: u32,
}

impl<H: Relay, C: Relay> Controller<H, C> {
    /// Creates an enabled controller with the default [`Config`]
    pub fn new(name: &'static str, unit: Unit, heater: H, cooler: C) -> Self {
        Self::with_config(name, unit, heater, cooler, Config::DEFAULT)
    }

    /// Creates an enabled controller. Both relays are de-energized.
    pub fn with_config(
        name: &'static str,
        unit: Unit,
        heater: H,
        cooler: C,
        config: Config,
    ) -> Self {
        let mut controller = Self {
            name,
            unit,
            config,
            heater,
            cooler,
            current: Err(SensorError::NoSensorFound),
            target: config.target_default.to_unit(unit),
            state: ControlState::Idle,
            next_state: ControlState::Idle,
            gap_count: 0,
            adjust_count: 0,
        };
        controller.commit(ControlState::Idle);
        controller
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn unit(&self) -> Unit {
        self.unit
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn heater(&self) -> &H {
        &self.heater
    }

    pub const fn cooler(&self) -> &C {
        &self.cooler
    }

    /// Last sensor reading passed to [`Self::update`]
    pub const fn current(&self) -> SensorReading {
        self.current
    }

    pub const fn target(&self) -> Temperature {
        self.target
    }

    pub const fn state(&self) -> ControlState {
        self.state
    }

    /// State the controller is heading to, see [`Self::gap_count`]
    pub const fn next_state(&self) -> ControlState {
        self.next_state
    }

    /// Consecutive out of tolerance ticks spent in [`ControlState::Idle`]
    pub const fn gap_count(&self) -> u32 {
        self.gap_count
    }

    /// Consecutive out of tolerance ticks spent heating or cooling
    pub const fn adjust_count(&self) -> u32 {
        self.adjust_count
    }

    pub fn is_enabled(&self) -> bool {
        self.state != ControlState::Off
    }

    /// Turns the controller on (into [`ControlState::Idle`]) or off, bypassing the debounce
    pub fn set_enabled(&mut self, on: bool) {
        let state = if on {
            ControlState::Idle
        } else {
            ControlState::Off
        };

        info!("{=str}: manually set to {}", self.name, state);
        self.next_state = state;
        self.commit(state);
    }

    /// Accepted target range, in the controller's unit
    pub fn target_bounds(&self) -> RangeInclusive<Degrees> {
        let min = self.config.target_min.to_unit(self.unit).degrees();
        let max = self.config.target_max.to_unit(self.unit).degrees();
        min..=max
    }

    /// Sets the target temperature. Bounds are inclusive.
    ///
    /// Nothing changes if the target is rejected.
    pub fn set_target(&mut self, target: Temperature) -> Result<(), InvalidTarget> {
        let target = target.to_unit(self.unit);
        if !self.target_bounds().contains(&target.degrees()) {
            warn!("{=str}: rejected target {}", self.name, target);
            return Err(InvalidTarget);
        }

        info!("{=str}: target set to {}", self.name, target);
        self.target = target;
        Ok(())
    }

    /// Whether the vessel needs attention: it is far off target, or has been heating or cooling
    /// for longer than [`Config::adjust_count_max`] ticks. Informational only.
    pub fn is_alarm(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let adjusting_too_long =
            self.state.is_adjusting() && self.adjust_count >= self.config.adjust_count_max;

        let far_off_target = match self.current {
            Ok(temp) if units::is_physically_valid(temp) => {
                (temp.degrees() - self.target.degrees()).abs() > self.config.alarm_tolerance
            }
            _ => false,
        };

        adjusting_too_long || far_off_target
    }

    /// Runs the controller for a single tick
    ///
    /// Invalid readings and a disabled controller leave the state, the counters and the relays
    /// untouched.
    #[cfg_attr(feature = "sizing", inline(never))]
    pub fn update(&mut self, reading: SensorReading) {
        let reading = reading.map(|temp| temp.to_unit(self.unit));
        self.current = reading;

        if self.state == ControlState::Off {
            return;
        }
        let Ok(temp) = reading else {
            return;
        };
        if !units::is_physically_valid(temp) {
            return;
        }

        let temp = temp.degrees();
        let min = self.target.degrees() - self.config.tolerance;
        let max = self.target.degrees() + self.config.tolerance;

        if (min..=max).contains(&temp) {
            if self.state != ControlState::Idle {
                info!("{=str}: back within tolerance", self.name);
            }
            self.next_state = ControlState::Idle;
            self.commit(ControlState::Idle);
            return;
        }

        match self.state {
            ControlState::Idle => {
                self.next_state = if temp > max {
                    ControlState::Cool
                } else {
                    ControlState::Heat
                };
                self.gap_count += 1;
                trace!(
                    "{=str}: out of tolerance, {} {=u32}/{=u32}",
                    self.name,
                    self.next_state,
                    self.gap_count,
                    self.config.gap_count_max
                );

                if self.gap_count >= self.config.gap_count_max {
                    info!("{=str}: {}", self.name, self.next_state);
                    self.commit(self.next_state);
                }
            }
            ControlState::Heat | ControlState::Cool => {
                self.adjust_count = self.adjust_count.saturating_add(1);
                self.next_state = ControlState::Idle;

                if self.adjust_count == self.config.adjust_count_max {
                    warn!(
                        "{=str}: {} for {=u32} ticks without reaching target",
                        self.name,
                        self.state,
                        self.adjust_count
                    );
                }
            }
            ControlState::Off => {}
        }
    }

    /// Commits `state` and drives the relays to match it
    fn commit(&mut self, state: ControlState) {
        self.state = state;
        self.gap_count = 0;
        if !state.is_adjusting() {
            self.adjust_count = 0;
        }

        // Release before energizing so both are never on at once
        let (heater, cooler) = state.outputs();
        if !heater {
            self.heater.set_energized(false);
        }
        if !cooler {
            self.cooler.set_energized(false);
        }
        if heater {
            self.heater.set_energized(true);
        }
        if cooler {
            self.cooler.set_energized(true);
        }
    }
}

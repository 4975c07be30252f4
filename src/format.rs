//! Human readable strings for readings, states and the status screen

use core::fmt::{self, Write};

use heapless::String;

use crate::{
    controller::{ControlState, Controller},
    relay::Relay,
    thermometer::{SensorReading, Temperature},
};

/// Longest formatted line, "Device not recognized" included
pub const LINE_LEN: usize = 24;
/// Characters of the controller name shown on the status screen
pub const NAME_LEN: usize = 9;

pub type Line = String<LINE_LEN>;

fn line(args: fmt::Arguments<'_>) -> Line {
    let mut s = Line::new();
    if s.write_fmt(args).is_err() {
        warn!("Formatted line truncated");
    }
    s
}

/// The temperature with one decimal and its unit, or the reason there is none
pub fn format_reading(reading: &SensorReading) -> Line {
    match reading {
        Ok(temp) => format_temperature(*temp),
        Err(e) => line(format_args!("{e}")),
    }
}

pub fn format_temperature(temp: Temperature) -> Line {
    line(format_args!("{temp}"))
}

pub fn format_state(state: ControlState) -> Line {
    line(format_args!("{state}"))
}

/// The pending state, with the seconds left until it is committed, e.g. `Cooling in 55s`.
///
/// The countdown is left out while no debounce is running.
pub fn format_pending_state(
    next: ControlState,
    gap_count: u32,
    gap_count_max: u32,
    tick_interval_ms: u32,
) -> Line {
    if gap_count == 0 {
        return format_state(next);
    }

    let secs = gap_count_max
        .saturating_sub(gap_count)
        .saturating_mul(tick_interval_ms)
        / 1000;
    line(format_args!("{next} in {secs}s"))
}

/// Snapshot of a controller for the status screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub name: Line,
    pub state: Line,
    pub current: Line,
    pub target: Line,
    pub pending: Line,
}

impl Status {
    pub fn new<H: Relay, C: Relay>(controller: &Controller<H, C>) -> Self {
        let config = controller.config();

        let mut name = Line::new();
        for c in controller.name().chars().take(NAME_LEN) {
            if name.push(c).is_err() {
                break;
            }
        }

        Self {
            name,
            state: format_state(controller.state()),
            current: format_reading(&controller.current()),
            target: format_temperature(controller.target()),
            pending: format_pending_state(
                controller.next_state(),
                controller.gap_count(),
                config.gap_count_max,
                config.tick_interval_ms,
            ),
        }
    }
}

/// One item per line, separated by CRLF
impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\r\n{}\r\nCURRENT: {}\r\nTARGET: {}\r\n{}\r\n",
            self.name, self.state, self.current, self.target, self.pending
        )
    }
}

impl<H: Relay, C: Relay> Controller<H, C> {
    /// Snapshot for the status screen
    pub fn status(&self) -> Status {
        Status::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        relay::NotConnected,
        thermometer::{SensorError, Unit},
    };

    #[test]
    fn readings() {
        assert_eq!(
            format_reading(&Ok(Temperature::fahrenheit(72.5))),
            "72.5°F"
        );
        assert_eq!(format_reading(&Ok(Temperature::celsius(-0.5))), "-0.5°C");
        assert_eq!(
            format_reading(&Err(SensorError::NoSensorFound)),
            "No sensor"
        );
        assert_eq!(
            format_reading(&Err(SensorError::CrcMismatch)),
            "CRC not valid"
        );
        assert_eq!(
            format_reading(&Err(SensorError::UnrecognizedDevice)),
            "Device not recognized"
        );
        assert_eq!(
            format_reading(&Err(SensorError::OutOfRange)),
            "Bad reading"
        );
    }

    #[test]
    fn widest_temperature_fits() {
        assert_eq!(
            format_temperature(Temperature::celsius(-2048)),
            "-2048.0°C"
        );
    }

    #[test]
    fn pending_countdown() {
        assert_eq!(
            format_pending_state(ControlState::Cool, 1, 12, 5000),
            "Cooling in 55s"
        );
        assert_eq!(
            format_pending_state(ControlState::Heat, 11, 12, 5000),
            "Heating in 5s"
        );
        assert_eq!(format_pending_state(ControlState::Idle, 0, 12, 5000), "Idle");
        assert_eq!(format_pending_state(ControlState::Cool, 0, 12, 5000), "Cooling");
    }

    #[test]
    fn long_countdown_saturates() {
        assert_eq!(
            format_pending_state(ControlState::Cool, 1, 12, u32::MAX),
            "Cooling in 4294967s"
        );
        assert_eq!(
            format_pending_state(ControlState::Heat, 1, u32::MAX, 5000),
            "Heating in 4294967s"
        );
    }

    #[test]
    fn status_block() {
        let mut c = Controller::new(
            "Primary fermenter",
            Unit::Fahrenheit,
            NotConnected,
            NotConnected,
        );
        c.update(Ok(Temperature::fahrenheit(70)));

        let status = c.status();
        assert_eq!(status.name, "Primary f");
        assert_eq!(
            status.to_string(),
            "Primary f\r\nIdle\r\nCURRENT: 70.0°F\r\nTARGET: 65.0°F\r\nCooling in 55s\r\n"
        );
    }

    #[test]
    fn status_without_sensor() {
        let c = Controller::new("Vessel", Unit::Celsius, NotConnected, NotConnected);
        let status = c.status();
        assert_eq!(status.current, "No sensor");
        assert_eq!(status.target, "18.3°C");
        assert_eq!(status.pending, "Idle");
    }
}

//! Operator commands sent to a [`Controller`]

use core::{fmt, str::FromStr};

use crate::{
    controller::{Controller, InvalidTarget},
    relay::Relay,
    thermometer::{Degrees, Temperature},
};

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Command {
    /// Enable the controller (`on` or `idle`)
    Idle,
    /// Disable the controller (`off`)
    Off,
    /// New target, in the controller's unit, exactly as written
    SetTarget(f64),
}

/// The command was not understood, or the controller rejected it
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InvalidCommand {
    Unknown,
    TargetOutOfRange,
}

impl InvalidCommand {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown command",
            Self::TargetOutOfRange => "Target temperature out of range",
        }
    }
}

impl fmt::Display for InvalidCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<InvalidTarget> for InvalidCommand {
    fn from(_: InvalidTarget) -> Self {
        Self::TargetOutOfRange
    }
}

impl Command {
    /// Parses a command token. Keywords are case-insensitive.
    pub fn parse(text: &str) -> Result<Self, InvalidCommand> {
        let text = text.trim();

        if text.eq_ignore_ascii_case("on") || text.eq_ignore_ascii_case("idle") {
            return Ok(Self::Idle);
        }
        if text.eq_ignore_ascii_case("off") {
            return Ok(Self::Off);
        }
        if !is_number(text) {
            return Err(InvalidCommand::Unknown);
        }

        text.parse()
            .map(Self::SetTarget)
            .map_err(|_| InvalidCommand::Unknown)
    }
}

impl FromStr for Command {
    type Err = InvalidCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Optional sign, then digits with at most one decimal point. At least one digit is required.
fn is_number(text: &str) -> bool {
    let digits = text
        .strip_prefix(['+', '-'])
        .unwrap_or(text)
        .as_bytes();

    let mut seen_digit = false;
    let mut seen_point = false;
    for &b in digits {
        match b {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_point => seen_point = true,
            _ => return false,
        }
    }
    seen_digit
}

impl<H: Relay, C: Relay> Controller<H, C> {
    /// Applies a parsed command. On and off take effect immediately, without debounce.
    pub fn apply(&mut self, command: Command) -> Result<(), InvalidCommand> {
        match command {
            Command::Idle => self.set_enabled(true),
            Command::Off => self.set_enabled(false),
            Command::SetTarget(value) => {
                // Bounds are checked before rounding to fixed point, so nothing past a bound
                // rounds onto it
                let bounds = self.target_bounds();
                let bounds = bounds.start().to_num::<f64>()..=bounds.end().to_num::<f64>();
                if !bounds.contains(&value) {
                    warn!("{=str}: rejected target {=f64}", self.name(), value);
                    return Err(InvalidCommand::TargetOutOfRange);
                }

                let degrees =
                    Degrees::checked_from_num(value).ok_or(InvalidCommand::TargetOutOfRange)?;
                self.set_target(Temperature::new(degrees, self.unit()))?;
            }
        }
        Ok(())
    }

    /// Parses and applies a command. A rejected command changes nothing.
    pub fn control(&mut self, text: &str) -> Result<(), InvalidCommand> {
        let command = Command::parse(text).inspect_err(|e| {
            warn!("{=str}: rejected command: {}", self.name(), e);
        })?;
        self.apply(command)
    }
}

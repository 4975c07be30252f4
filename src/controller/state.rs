use core::fmt;

/// State of the hysteresis controller
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlState {
    /// Disabled by the user. Nothing is driven and readings are not evaluated.
    Off,
    /// Enabled, within tolerance or not yet committed to heating or cooling
    #[default]
    Idle,
    /// Heater energized
    Heat,
    /// Cooler energized
    Cool,
}

impl ControlState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Idle => "Idle",
            Self::Heat => "Heating",
            Self::Cool => "Cooling",
        }
    }

    /// Relay outputs `(heater, cooler)` for this state. Never both energized.
    pub const fn outputs(self) -> (bool, bool) {
        match self {
            Self::Off | Self::Idle => (false, false),
            Self::Heat => (true, false),
            Self::Cool => (false, true),
        }
    }

    /// Whether an actuator is being driven
    pub const fn is_adjusting(self) -> bool {
        matches!(self, Self::Heat | Self::Cool)
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

//! Heater and cooler relay drivers.

use embedded_hal::digital::v2::{OutputPin, StatefulOutputPin};

/// A binary actuator output, such as a heater or cooler relay.
///
/// Writes are idempotent: setting the same value twice has no further effect.
pub trait Relay {
    /// Energize (`true`) or de-energize (`false`) the relay
    fn set_energized(&mut self, on: bool);

    /// Whether the relay is currently energized
    fn is_energized(&self) -> bool;
}

/// A relay that uses a GPIO pin. High energizes the relay.
pub struct PinRelay<PIN: StatefulOutputPin> {
    pin: PIN,
}

impl<PIN: StatefulOutputPin> PinRelay<PIN> {
    pub const fn new(pin: PIN) -> Self {
        Self { pin }
    }

    pub fn release(self) -> PIN {
        self.pin
    }
}

impl<PIN: StatefulOutputPin> Relay for PinRelay<PIN> {
    fn set_energized(&mut self, on: bool) {
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };

        if result.is_err() {
            error!("Failed to drive relay pin");
        }
    }

    fn is_energized(&self) -> bool {
        self.pin.is_set_high().unwrap_or(false)
    }
}

/// Placeholder for an actuator that is not wired up. Writes are ignored.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct NotConnected;

impl Relay for NotConnected {
    fn set_energized(&mut self, _on: bool) {}

    fn is_energized(&self) -> bool {
        false
    }
}

impl<R: Relay> Relay for Option<R> {
    fn set_energized(&mut self, on: bool) {
        if let Some(relay) = self {
            relay.set_energized(on);
        }
    }

    fn is_energized(&self) -> bool {
        self.as_ref().is_some_and(Relay::is_energized)
    }
}

/// Fake relay for testing
#[cfg(any(test, feature = "fake"))]
pub mod fake {
    use super::Relay;

    /// Records the relay state and how many times it was written
    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    pub struct FakeRelay {
        on: bool,
        writes: usize,
    }

    impl FakeRelay {
        pub const fn new() -> Self {
            Self { on: false, writes: 0 }
        }

        /// Number of times the relay was written
        pub const fn writes(&self) -> usize {
            self.writes
        }
    }

    impl Relay for FakeRelay {
        fn set_energized(&mut self, on: bool) {
            self.on = on;
            self.writes += 1;
        }

        fn is_energized(&self) -> bool {
            self.on
        }
    }
}

#[cfg(test)]
mod tests {
    use core::{cell::Cell, convert::Infallible};

    use super::*;

    /// Pin that remembers its level
    #[derive(Default)]
    struct MockPin {
        high: Cell<bool>,
    }

    impl OutputPin for MockPin {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.high.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.high.set(true);
            Ok(())
        }
    }

    impl StatefulOutputPin for MockPin {
        fn is_set_high(&self) -> Result<bool, Self::Error> {
            Ok(self.high.get())
        }

        fn is_set_low(&self) -> Result<bool, Self::Error> {
            Ok(!self.high.get())
        }
    }

    #[test]
    fn pin_relay_drives_pin() {
        let mut relay = PinRelay::new(MockPin::default());
        assert!(!relay.is_energized());

        relay.set_energized(true);
        assert!(relay.is_energized());
        relay.set_energized(true);
        assert!(relay.is_energized());

        relay.set_energized(false);
        assert!(!relay.is_energized());
        assert!(!relay.release().high.get());
    }

    #[test]
    fn not_connected_is_a_no_op() {
        let mut relay = NotConnected;
        relay.set_energized(true);
        assert!(!relay.is_energized());

        let mut missing: Option<PinRelay<MockPin>> = None;
        missing.set_energized(true);
        assert!(!missing.is_energized());
    }
}

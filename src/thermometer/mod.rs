//! Temperature sensor interface

pub mod ds18b20;

use core::fmt;

use fixed::{traits::ToFixed, types::I16F16};

use crate::{onewire, units};

/// I16F16 is a fixed point number with 16 fractional bits and 16 integer bits.
/// The sensor's native 1/16 degree steps are exact, and Fahrenheit conversions keep a precision of
/// ~0.00002 degrees over a range of (-2^15, 2^15).
pub type Degrees = I16F16;

/// Temperature scale. Fixed per controller instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Unit {
    Celsius,
    Fahrenheit,
}

impl Unit {
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }
}

/// A temperature tagged with its unit
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Temperature {
    degrees: Degrees,
    unit: Unit,
}

impl Temperature {
    #[inline]
    pub const fn new(degrees: Degrees, unit: Unit) -> Self {
        Self { degrees, unit }
    }

    pub fn celsius(degrees: impl ToFixed) -> Self {
        Self::new(Degrees::from_num(degrees), Unit::Celsius)
    }

    pub fn fahrenheit(degrees: impl ToFixed) -> Self {
        Self::new(Degrees::from_num(degrees), Unit::Fahrenheit)
    }

    #[inline]
    pub const fn degrees(self) -> Degrees {
        self.degrees
    }

    #[inline]
    pub const fn unit(self) -> Unit {
        self.unit
    }

    /// The same temperature expressed in `unit`
    #[must_use]
    pub fn to_unit(self, unit: Unit) -> Self {
        Self::new(units::convert(self.degrees, self.unit, unit), unit)
    }
}

/// One decimal place followed by the unit, e.g. `65.0°F`
impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}{}",
            self.degrees.to_num::<f32>(),
            self.unit.suffix()
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Temperature {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(
            f,
            "{=f32}{=str}",
            self.degrees.to_num::<f32>(),
            self.unit.suffix()
        );
    }
}

/// Why a sensor read did not produce a temperature.
///
/// These are measurement failures: the next tick simply tries again.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// No device answered on the bus
    NoSensorFound,
    /// The device address or the scratchpad failed its CRC
    CrcMismatch,
    /// The device is not a supported temperature sensor
    UnrecognizedDevice,
    /// The decoded temperature is outside of the sensor's datasheet range
    OutOfRange,
}

impl SensorError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoSensorFound => "No sensor",
            Self::CrcMismatch => "CRC not valid",
            Self::UnrecognizedDevice => "Device not recognized",
            Self::OutOfRange => "Bad reading",
        }
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<E> From<onewire::Error<E>> for SensorError {
    fn from(value: onewire::Error<E>) -> Self {
        match value {
            onewire::Error::CrcMismatch => Self::CrcMismatch,
            onewire::Error::FamilyCodeMismatch => Self::UnrecognizedDevice,
            // The device stopped answering mid-exchange
            onewire::Error::BusNotHigh
            | onewire::Error::Pin(_)
            | onewire::Error::UnexpectedResponse
            | onewire::Error::Timeout => Self::NoSensorFound,
        }
    }
}

/// Outcome of one sensor read
pub type SensorReading = Result<Temperature, SensorError>;

pub trait Thermometer {
    type Error;

    /// Read the temperature, in the unit the thermometer was configured with
    fn read(&mut self) -> Result<Temperature, Self::Error>;
}

/// Fake thermometer for testing
#[cfg(any(test, feature = "fake"))]
pub mod fake {
    use crate::thermometer::{SensorError, SensorReading, Temperature, Thermometer};

    /// A fake thermometer that always returns the same reading
    pub struct FakeThermometer {
        reading: SensorReading,
    }

    impl FakeThermometer {
        pub const fn new(reading: SensorReading) -> Self {
            Self { reading }
        }

        /// Get the current reading
        pub const fn reading(&self) -> SensorReading {
            self.reading
        }
        /// Get a mutable reference to the current reading
        pub fn reading_mut(&mut self) -> &mut SensorReading {
            &mut self.reading
        }
    }

    impl Thermometer for FakeThermometer {
        type Error = SensorError;

        fn read(&mut self) -> Result<Temperature, Self::Error> {
            self.reading
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_one_decimal_with_unit() {
        assert_eq!(Temperature::fahrenheit(65).to_string(), "65.0°F");
        assert_eq!(
            Temperature::fahrenheit(72.5).to_string(),
            "72.5°F"
        );
        assert_eq!(Temperature::celsius(-1).to_string(), "-1.0°C");
        assert_eq!(
            Temperature::celsius(25.0625).to_string(),
            "25.1°C"
        );
    }

    #[test]
    fn to_unit_round_trips_exact_values() {
        let boiling = Temperature::celsius(100);
        assert_eq!(boiling.to_unit(Unit::Fahrenheit), Temperature::fahrenheit(212));
        assert_eq!(boiling.to_unit(Unit::Celsius), boiling);
        assert_eq!(
            Temperature::fahrenheit(-40).to_unit(Unit::Celsius),
            Temperature::celsius(-40)
        );
    }

    #[test]
    fn bus_errors_map_to_sensor_errors() {
        type E = onewire::Error<()>;
        assert_eq!(SensorError::from(E::CrcMismatch), SensorError::CrcMismatch);
        assert_eq!(
            SensorError::from(E::FamilyCodeMismatch),
            SensorError::UnrecognizedDevice
        );
        assert_eq!(
            SensorError::from(E::UnexpectedResponse),
            SensorError::NoSensorFound
        );
        assert_eq!(SensorError::from(E::Pin(())), SensorError::NoSensorFound);
    }
}

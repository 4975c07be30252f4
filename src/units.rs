//! Celsius/Fahrenheit conversion and the sensor validity range

use core::ops::RangeInclusive;

use crate::thermometer::{Degrees, Temperature, Unit};

/// Lowest temperature the DS18B20 datasheet states it can measure
pub const SENSOR_MIN_C: Degrees = Degrees::const_from_int(-55);
/// Highest temperature the DS18B20 datasheet states it can measure
pub const SENSOR_MAX_C: Degrees = Degrees::const_from_int(125);

const FREEZING_F: Degrees = Degrees::const_from_int(32);

pub fn to_fahrenheit(celsius: Degrees) -> Degrees {
    (celsius.saturating_mul_int(9) / 5).saturating_add(FREEZING_F)
}

pub fn to_celsius(fahrenheit: Degrees) -> Degrees {
    fahrenheit.saturating_sub(FREEZING_F).saturating_mul_int(5) / 9
}

/// Converts `degrees` from one unit to another
pub fn convert(degrees: Degrees, from: Unit, to: Unit) -> Degrees {
    match (from, to) {
        (Unit::Celsius, Unit::Fahrenheit) => to_fahrenheit(degrees),
        (Unit::Fahrenheit, Unit::Celsius) => to_celsius(degrees),
        (Unit::Celsius, Unit::Celsius) | (Unit::Fahrenheit, Unit::Fahrenheit) => degrees,
    }
}

/// Datasheet range of the sensor, expressed in `unit`
pub fn sensor_range(unit: Unit) -> RangeInclusive<Degrees> {
    convert(SENSOR_MIN_C, Unit::Celsius, unit)..=convert(SENSOR_MAX_C, Unit::Celsius, unit)
}

/// Whether the sensor could physically have produced `temp`
pub fn is_physically_valid(temp: Temperature) -> bool {
    sensor_range(temp.unit()).contains(&temp.degrees())
}

use embedded_hal::blocking::delay::DelayUs;

use crate::{
    ds18b20::{Ds18b20, Resolution},
    onewire::{Address, Bus, Error, SearchState},
    thermometer::{SensorError, SensorReading, Temperature, Thermometer, Unit},
    units,
};

/// Reads the first DS18x20 found on a 1-Wire bus.
///
/// Every read runs a fresh ROM search, so a sensor may be swapped or re-plugged between reads.
pub struct Ds18b20Thermometer<B, D> {
    wire: B,
    delay: D,
    unit: Unit,
    resolution: Resolution,
    search: SearchState,
}

impl<B: Bus, D: DelayUs<u32>> Ds18b20Thermometer<B, D> {
    pub const fn new(wire: B, delay: D, unit: Unit) -> Self {
        Self {
            wire,
            delay,
            unit,
            resolution: Resolution::Bits12,
            search: SearchState::new(),
        }
    }

    pub const fn wire(&self) -> &B {
        &self.wire
    }
    pub fn wire_mut(&mut self) -> &mut B {
        &mut self.wire
    }

    pub const fn unit(&self) -> Unit {
        self.unit
    }

    pub const fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Sets the resolution of the attached sensor
    pub fn set_resolution(&mut self, resolution: Resolution) -> Result<(), SensorError> {
        let result = self.find_sensor().and_then(|mut sensor| {
            sensor
                .set_resolution(&mut self.wire, &mut self.delay, resolution)
                .map_err(SensorError::from)
        });
        self.search.reset();

        result?;
        self.resolution = resolution;
        Ok(())
    }

    /// Reads the resolution the attached sensor is configured with and adopts it
    pub fn read_resolution(&mut self) -> Result<Resolution, SensorError> {
        let result = self.find_sensor().and_then(|sensor| {
            sensor
                .resolution(&mut self.wire, &mut self.delay)
                .map_err(SensorError::from)
        });
        self.search.reset();

        self.resolution = result?;
        Ok(self.resolution)
    }

    /// Iterates over every device on the bus, sensors or not
    pub fn devices(&mut self) -> impl Iterator<Item = Result<Address, Error<B::Error>>> + '_ {
        self.wire.devices(&mut self.delay)
    }

    /// Finds the first device on the bus and checks that it is a supported sensor
    fn find_sensor(&mut self) -> Result<Ds18b20, SensorError> {
        let addr = match self.search.next_device(&mut self.wire, &mut self.delay) {
            Ok(Some(addr)) => addr,
            Ok(None) => return Err(SensorError::NoSensorFound),
            Err(e) => {
                warn!("Device search failed: {}", e.as_str());
                return Err(SensorError::NoSensorFound);
            }
        };

        trace!("Found device: {}", addr);
        Ds18b20::from_address::<B::Error>(addr).map_err(SensorError::from)
    }

    fn measure(&mut self) -> SensorReading {
        let mut sensor = self.find_sensor()?;
        let celsius = sensor.measure(&mut self.wire, &mut self.delay, self.resolution)?;

        let temp = Temperature::new(celsius, Unit::Celsius).to_unit(self.unit);
        if units::is_physically_valid(temp) {
            Ok(temp)
        } else {
            Err(SensorError::OutOfRange)
        }
    }
}

impl<B: Bus, D: DelayUs<u32>> Thermometer for Ds18b20Thermometer<B, D> {
    type Error = SensorError;

    #[cfg_attr(feature = "sizing", inline(never))]
    fn read(&mut self) -> SensorReading {
        let reading = self.measure();

        // Each read is a fresh enumeration
        self.search.reset();

        if let Err(e) = reading {
            debug!("Sensor read failed: {}", e);
        }
        reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onewire::fake::{FakeBus, FakeDevice, NoDelay};

    const SERIAL: [u8; 6] = [0x60, 0xFB, 0x83, 0x0F, 0x00, 0x05];

    fn thermometer(
        device: Option<FakeDevice>,
        unit: Unit,
    ) -> Ds18b20Thermometer<FakeBus<1>, NoDelay> {
        Ds18b20Thermometer::new(FakeBus::new([device]), NoDelay, unit)
    }

    fn sensor_at(lsb: u8, msb: u8) -> FakeDevice {
        let mut device = FakeDevice::ds18b20(SERIAL);
        device.set_raw_temperature(lsb, msb);
        device
    }

    #[test]
    fn reads_celsius() {
        let mut therm = thermometer(Some(sensor_at(0x91, 0x01)), Unit::Celsius);
        assert_eq!(therm.read(), Ok(Temperature::celsius(25.0625)));
    }

    #[test]
    fn reads_fahrenheit() {
        // 25 °C
        let mut therm = thermometer(Some(sensor_at(0x90, 0x01)), Unit::Fahrenheit);
        assert_eq!(therm.read(), Ok(Temperature::fahrenheit(77)));
    }

    #[test]
    fn reads_negative() {
        let mut therm = thermometer(Some(sensor_at(0x5E, 0xFF)), Unit::Celsius);
        assert_eq!(therm.read(), Ok(Temperature::celsius(-10.125)));
    }

    #[test]
    fn ds18s20_is_accepted() {
        let mut device = FakeDevice::with_family(0x10, SERIAL);
        device.set_raw_temperature(0x00, 0x01);
        let mut therm = thermometer(Some(device), Unit::Celsius);
        assert_eq!(therm.read(), Ok(Temperature::celsius(16)));
    }

    #[test]
    fn missing_sensor() {
        let mut therm = thermometer(None, Unit::Celsius);
        assert_eq!(therm.read(), Err(SensorError::NoSensorFound));
        assert_eq!(therm.read(), Err(SensorError::NoSensorFound));
    }

    #[test]
    fn sensor_plugged_in_later_is_found() {
        let mut therm = thermometer(None, Unit::Celsius);
        assert_eq!(therm.read(), Err(SensorError::NoSensorFound));

        therm.wire_mut().set_device(0, Some(sensor_at(0x90, 0x01)));
        assert_eq!(therm.read(), Ok(Temperature::celsius(25)));
    }

    #[test]
    fn repeated_reads_restart_the_search() {
        let mut therm = thermometer(Some(sensor_at(0x90, 0x01)), Unit::Celsius);
        for _ in 0..3 {
            assert_eq!(therm.read(), Ok(Temperature::celsius(25)));
        }
        assert_eq!(therm.wire().device(0).unwrap().conversions(), 3);
    }

    #[test]
    fn every_single_bit_flip_of_the_address_crc_is_detected() {
        let rom = FakeDevice::ds18b20(SERIAL).rom();

        for bit in 0..8 {
            let mut corrupted = rom;
            corrupted[7] ^= 1 << bit;
            let mut therm = thermometer(Some(FakeDevice::new(corrupted)), Unit::Celsius);

            assert_eq!(therm.read(), Err(SensorError::CrcMismatch), "bit {bit}");
            // Never got as far as a conversion
            assert_eq!(therm.wire().device(0).unwrap().conversions(), 0);
        }
    }

    #[test]
    fn unknown_family() {
        let device = FakeDevice::with_family(0x22, SERIAL);
        let mut therm = thermometer(Some(device), Unit::Celsius);
        assert_eq!(therm.read(), Err(SensorError::UnrecognizedDevice));
        assert_eq!(therm.wire().device(0).unwrap().conversions(), 0);
    }

    #[test]
    fn corrupted_scratchpad() {
        let mut device = sensor_at(0x90, 0x01);
        let mut scratchpad = device.scratchpad();
        scratchpad[8] ^= 0xFF;
        device.set_scratchpad(scratchpad);

        let mut therm = thermometer(Some(device), Unit::Celsius);
        assert_eq!(therm.read(), Err(SensorError::CrcMismatch));
    }

    #[test]
    fn all_zero_scratchpad_is_no_reading() {
        let mut device = sensor_at(0x90, 0x01);
        device.set_scratchpad([0; 9]);

        let mut therm = thermometer(Some(device), Unit::Fahrenheit);
        assert_eq!(therm.read(), Err(SensorError::NoSensorFound));
    }

    #[test]
    fn parasite_sensor_is_powered_through_conversion() {
        let mut device = FakeDevice::ds18b20(SERIAL).parasite();
        device.set_raw_temperature(0x90, 0x01);

        let mut therm = thermometer(Some(device), Unit::Fahrenheit);
        assert_eq!(therm.read(), Ok(Temperature::fahrenheit(77)));

        let device = therm.wire().device(0).unwrap();
        assert_eq!(device.conversions(), 1);
        assert_eq!(device.powered_conversions(), 1);
        assert!(!therm.wire().is_power_held());
    }

    #[test]
    fn family_zero_is_unrecognized() {
        let device = FakeDevice::with_family(0x00, SERIAL);
        let mut therm = thermometer(Some(device), Unit::Celsius);
        assert_eq!(therm.read(), Err(SensorError::UnrecognizedDevice));
    }

    #[test]
    fn outside_datasheet_range() {
        // 127 °C
        let mut therm = thermometer(Some(sensor_at(0xF0, 0x07)), Unit::Celsius);
        assert_eq!(therm.read(), Err(SensorError::OutOfRange));

        // -56 °C, also out of range once in Fahrenheit
        let mut therm = thermometer(Some(sensor_at(0x80, 0xFC)), Unit::Fahrenheit);
        assert_eq!(therm.read(), Err(SensorError::OutOfRange));
    }

    #[test]
    fn set_resolution_updates_the_sensor() {
        let mut therm = thermometer(Some(sensor_at(0x97, 0x01)), Unit::Celsius);
        therm.set_resolution(Resolution::Bits10).unwrap();

        assert_eq!(therm.resolution(), Resolution::Bits10);
        assert_eq!(
            therm.wire().device(0).unwrap().scratchpad()[4],
            Resolution::Bits10.to_config_register()
        );
        // 0x197 at 10 bits is 0x194
        assert_eq!(therm.read(), Ok(Temperature::celsius(25.25)));
    }

    #[test]
    fn read_resolution_adopts_the_sensor_setting() {
        let mut device = sensor_at(0x90, 0x01);
        let mut scratchpad = device.scratchpad();
        scratchpad[4] = Resolution::Bits11.to_config_register();
        scratchpad[8] = crate::onewire::crc::crc8(&scratchpad[..8]);
        device.set_scratchpad(scratchpad);

        let mut therm = thermometer(Some(device), Unit::Celsius);
        assert_eq!(therm.read_resolution(), Ok(Resolution::Bits11));
        assert_eq!(therm.resolution(), Resolution::Bits11);
    }

    #[test]
    fn set_resolution_without_sensor_keeps_previous() {
        let mut therm = thermometer(None, Unit::Celsius);
        assert_eq!(
            therm.set_resolution(Resolution::Bits9),
            Err(SensorError::NoSensorFound)
        );
        assert_eq!(therm.resolution(), Resolution::Bits12);
    }

    #[test]
    fn devices_lists_the_bus() {
        let device = FakeDevice::ds18b20(SERIAL);
        let rom = device.rom();
        let mut therm = thermometer(Some(device), Unit::Celsius);

        let mut devices = therm.devices();
        assert_eq!(devices.next(), Some(Ok(Address::from_bytes(rom))));
        assert_eq!(devices.next(), None);
    }
}

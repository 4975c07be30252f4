//! Implementation for the DS18B20 (and DS18S20) temperature sensor.

use embedded_hal::blocking::delay::DelayUs;

use crate::{
    onewire::{crc::check_crc8, Address, Bus, Error},
    thermometer::Degrees,
};

pub const CONVERT_T: u8 = 0x44;
pub const READ_SCRATCHPAD: u8 = 0xBE;
pub const WRITE_SCRATCHPAD: u8 = 0x4E;

/// Family code of the DS18S20
pub const FAMILY_DS18S20: u8 = 0x10;
/// Family code of the DS18B20
pub const FAMILY_DS18B20: u8 = 0x28;

/// Whether the family code belongs to a sensor this driver understands
#[inline]
pub const fn is_supported_family(family: u8) -> bool {
    matches!(family, FAMILY_DS18S20 | FAMILY_DS18B20)
}

/// Decodes the temperature register of the scratchpad into degrees Celsius.
///
/// The register is a 16-bit two's-complement value with 4 fractional bits, i.e. 1/16 °C per LSB.
pub fn decode_celsius(lsb: u8, msb: u8) -> Degrees {
    let raw = i16::from_le_bytes([lsb, msb]);
    Degrees::from_num(raw) / 16
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ds18b20 {
    addr: Address,
}

impl Ds18b20 {
    #[inline]
    pub const fn new(addr: Address) -> Self {
        Self { addr }
    }

    /// Validates the address and wraps it.
    ///
    /// Fails with [`Error::CrcMismatch`] if the ROM CRC is wrong, or [`Error::FamilyCodeMismatch`]
    /// if the device is not a supported temperature sensor.
    pub fn from_address<E>(addr: Address) -> Result<Self, Error<E>> {
        if !addr.is_crc_valid() {
            return Err(Error::CrcMismatch);
        }
        if !is_supported_family(addr.family_code()) {
            return Err(Error::FamilyCodeMismatch);
        }
        Ok(Self::new(addr))
    }

    #[inline]
    pub const fn address(&self) -> Address {
        self.addr
    }

    fn read_scratchpad<B: Bus>(
        &self,
        wire: &mut B,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<[u8; 9], Error<B::Error>> {
        wire.send_command(Some(&self.addr), READ_SCRATCHPAD, delay)?;

        let mut buf = [0u8; 9];
        wire.read_bytes(&mut buf, delay)?;

        // A device that stops driving the bus mid-read would leave all zeros, which passes the CRC
        if buf == [0; 9] {
            return Err(Error::UnexpectedResponse);
        }
        check_crc8::<B::Error>(&buf)?;

        Ok(buf)
    }

    fn write_scratchpad<B: Bus>(
        &mut self,
        wire: &mut B,
        delay: &mut impl DelayUs<u32>,
        data: [u8; 3],
    ) -> Result<(), Error<B::Error>> {
        wire.send_command(Some(&self.addr), WRITE_SCRATCHPAD, delay)?;
        wire.write_bytes(&data, delay)?;
        wire.reset(delay)?;
        Ok(())
    }

    /// Retrieves the resolution of the sensor
    pub fn resolution<B: Bus>(
        &self,
        wire: &mut B,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<Resolution, Error<B::Error>> {
        let buf = self.read_scratchpad(wire, delay)?;
        Resolution::from_config_register(buf[4]).ok_or(Error::UnexpectedResponse)
    }

    /// Sets the resolution of the sensor
    pub fn set_resolution<B: Bus>(
        &mut self,
        wire: &mut B,
        delay: &mut impl DelayUs<u32>,
        res: Resolution,
    ) -> Result<(), Error<B::Error>> {
        let mut buf = self.read_scratchpad(wire, delay)?;
        buf[4] = res.to_config_register();
        self.write_scratchpad(wire, delay, [buf[2], buf[3], buf[4]])?;
        Ok(())
    }

    /// Starts a temperature conversion
    ///
    /// This will take some time, depending on the resolution of the sensor.
    ///
    /// The bus is held powered for parasite powered sensors. Call [`Ds18b20::read_data`] to read
    /// the result after the conversion is done; it ends the hold.
    pub fn start_measurement<B: Bus>(
        &mut self,
        wire: &mut B,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<(), Error<B::Error>> {
        wire.send_command_power(Some(&self.addr), CONVERT_T, delay)
    }

    /// Reads the temperature data from the sensor, in degrees Celsius
    ///
    /// Bits the configured resolution leaves undefined are cleared. Devices without a
    /// resolution register (DS18S20) are decoded as-is.
    pub fn read_data<B: Bus>(
        &self,
        wire: &mut B,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<Degrees, Error<B::Error>> {
        let mut buf = self.read_scratchpad(wire, delay)?;

        if self.addr.family_code() == FAMILY_DS18B20 {
            match Resolution::from_config_register(buf[4]) {
                Some(Resolution::Bits9) => buf[0] &= 0b1111_1000,
                Some(Resolution::Bits10) => buf[0] &= 0b1111_1100,
                Some(Resolution::Bits11) => buf[0] &= 0b1111_1110,
                Some(Resolution::Bits12) | None => {}
            }
        }

        Ok(decode_celsius(buf[0], buf[1]))
    }

    /// Measures the temperature
    ///
    /// Performs a temperature conversion, blocks until the conversion time of `resolution` has
    /// passed, and reads the result.
    pub fn measure<B: Bus>(
        &mut self,
        wire: &mut B,
        delay: &mut impl DelayUs<u32>,
        resolution: Resolution,
    ) -> Result<Degrees, Error<B::Error>> {
        self.start_measurement(wire, delay)?;
        delay.delay_us(u32::from(resolution.conversion_time()) * 1000);
        wire.depower()?;
        self.read_data(wire, delay)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resolution {
    Bits9,
    Bits10,
    Bits11,
    #[default]
    Bits12,
}

impl Resolution {
    pub const fn from_config_register(reg: u8) -> Option<Self> {
        match reg {
            0b0001_1111 => Some(Self::Bits9),
            0b0011_1111 => Some(Self::Bits10),
            0b0101_1111 => Some(Self::Bits11),
            0b0111_1111 => Some(Self::Bits12),
            _ => None,
        }
    }

    pub const fn to_config_register(self) -> u8 {
        match self {
            Self::Bits9 => 0b0001_1111,
            Self::Bits10 => 0b0011_1111,
            Self::Bits11 => 0b0101_1111,
            Self::Bits12 => 0b0111_1111,
        }
    }

    /// Returns the minimum conversion time in milliseconds
    pub const fn conversion_time(self) -> u16 {
        match self {
            Self::Bits9 => 94,
            Self::Bits10 => 188,
            Self::Bits11 => 375,
            Self::Bits12 => 750,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onewire::fake::{FakeBus, FakeDevice, NoDelay};

    fn celsius(v: f64) -> Degrees {
        Degrees::from_num(v)
    }

    // Temperature/data relationship table of the DS18B20 datasheet
    #[test]
    fn decode_datasheet_table() {
        let table: [(u8, u8, f64); 11] = [
            (0xD0, 0x07, 125.0),
            (0x50, 0x05, 85.0),
            (0x91, 0x01, 25.0625),
            (0xA2, 0x00, 10.125),
            (0x08, 0x00, 0.5),
            (0x00, 0x00, 0.0),
            (0xF8, 0xFF, -0.5),
            (0x5E, 0xFF, -10.125),
            (0x6F, 0xFE, -25.0625),
            (0x90, 0xFC, -55.0),
            (0x00, 0xFF, -16.0),
        ];

        for (lsb, msb, expected) in table {
            assert_eq!(
                decode_celsius(lsb, msb),
                celsius(expected),
                "{lsb:#04X} {msb:#04X}"
            );
        }
    }

    #[test]
    fn decode_sign_extension_boundary() {
        // Most positive and most negative register values
        assert_eq!(decode_celsius(0xFF, 0x7F), celsius(2047.9375));
        assert_eq!(decode_celsius(0x00, 0x80), celsius(-2048.0));
        // One LSB either side of zero
        assert_eq!(decode_celsius(0x01, 0x00), celsius(0.0625));
        assert_eq!(decode_celsius(0xFF, 0xFF), celsius(-0.0625));
        assert_eq!(decode_celsius(0xF0, 0xFF), celsius(-1.0));
    }

    #[test]
    fn supported_families() {
        assert!(is_supported_family(0x10));
        assert!(is_supported_family(0x28));
        assert!(!is_supported_family(0x22));
        assert!(!is_supported_family(0x00));
    }

    #[test]
    fn from_address_validates_crc_and_family() {
        let good = FakeDevice::ds18b20([1, 2, 3, 4, 5, 6]).rom();
        assert!(Ds18b20::from_address::<()>(Address::from_bytes(good)).is_ok());

        let mut bad_crc = good;
        bad_crc[7] ^= 0x80;
        assert_eq!(
            Ds18b20::from_address::<()>(Address::from_bytes(bad_crc)),
            Err(Error::CrcMismatch)
        );

        let other = FakeDevice::with_family(0x22, [1, 2, 3, 4, 5, 6]).rom();
        assert_eq!(
            Ds18b20::from_address::<()>(Address::from_bytes(other)),
            Err(Error::FamilyCodeMismatch)
        );
    }

    #[test]
    fn measure_converts_then_reads() {
        let mut device = FakeDevice::ds18b20([1, 2, 3, 4, 5, 6]);
        device.set_raw_temperature(0x91, 0x01);
        let addr = Address::from_bytes(device.rom());
        let mut bus = FakeBus::new([Some(device)]);

        let mut sensor = Ds18b20::new(addr);
        let temp = sensor
            .measure(&mut bus, &mut NoDelay, Resolution::Bits12)
            .unwrap();

        assert_eq!(temp, celsius(25.0625));
        assert_eq!(bus.device(0).unwrap().conversions(), 1);
    }

    #[test]
    fn read_data_masks_undefined_bits() {
        let mut device = FakeDevice::ds18b20([1, 2, 3, 4, 5, 6]);
        device.set_raw_temperature(0x97, 0x01);
        let addr = Address::from_bytes(device.rom());
        let mut bus = FakeBus::new([Some(device)]);
        let mut sensor = Ds18b20::new(addr);

        sensor
            .set_resolution(&mut bus, &mut NoDelay, Resolution::Bits9)
            .unwrap();
        assert_eq!(
            sensor.resolution(&mut bus, &mut NoDelay).unwrap(),
            Resolution::Bits9
        );

        // 0x197 at 9 bits is 0x190
        assert_eq!(
            sensor.read_data(&mut bus, &mut NoDelay).unwrap(),
            celsius(25.0)
        );
    }

    #[test]
    fn corrupted_scratchpad_is_rejected() {
        let mut device = FakeDevice::ds18b20([1, 2, 3, 4, 5, 6]);
        let mut scratchpad = device.scratchpad();
        scratchpad[0] ^= 0x04;
        device.set_scratchpad(scratchpad);
        let addr = Address::from_bytes(device.rom());
        let mut bus = FakeBus::new([Some(device)]);

        assert_eq!(
            Ds18b20::new(addr).read_data(&mut bus, &mut NoDelay),
            Err(Error::CrcMismatch)
        );
    }

    #[test]
    fn all_zero_scratchpad_is_rejected() {
        let mut device = FakeDevice::ds18b20([1, 2, 3, 4, 5, 6]);
        device.set_scratchpad([0; 9]);
        let addr = Address::from_bytes(device.rom());
        let mut bus = FakeBus::new([Some(device)]);

        assert_eq!(
            Ds18b20::new(addr).read_data(&mut bus, &mut NoDelay),
            Err(Error::UnexpectedResponse)
        );
    }

    #[test]
    fn conversion_holds_power_until_read() {
        let mut device = FakeDevice::ds18b20([1, 2, 3, 4, 5, 6]).parasite();
        device.set_raw_temperature(0x91, 0x01);
        let addr = Address::from_bytes(device.rom());
        let mut bus = FakeBus::new([Some(device)]);
        let mut sensor = Ds18b20::new(addr);

        sensor.start_measurement(&mut bus, &mut NoDelay).unwrap();
        assert!(bus.is_power_held());
        assert_eq!(bus.device(0).unwrap().powered_conversions(), 1);

        assert_eq!(
            sensor.read_data(&mut bus, &mut NoDelay).unwrap(),
            celsius(25.0625)
        );
        assert!(!bus.is_power_held());
    }

    #[test]
    fn unpowered_parasite_conversion_reads_power_on_value() {
        let mut device = FakeDevice::ds18b20([1, 2, 3, 4, 5, 6]).parasite();
        device.set_raw_temperature(0x91, 0x01);
        let addr = Address::from_bytes(device.rom());
        let mut bus = FakeBus::new([Some(device)]);

        bus.send_command(Some(&addr), CONVERT_T, &mut NoDelay)
            .unwrap();
        assert_eq!(
            Ds18b20::new(addr).read_data(&mut bus, &mut NoDelay).unwrap(),
            celsius(85.0)
        );
    }

    #[test]
    fn conversion_times() {
        assert_eq!(Resolution::Bits9.conversion_time(), 94);
        assert_eq!(Resolution::default().conversion_time(), 750);
        for res in [
            Resolution::Bits9,
            Resolution::Bits10,
            Resolution::Bits11,
            Resolution::Bits12,
        ] {
            assert_eq!(
                Resolution::from_config_register(res.to_config_register()),
                Some(res)
            );
        }
    }
}

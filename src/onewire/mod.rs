//! 1-Wire bus master

mod address;
pub mod commands;
pub mod crc;
mod error;
#[cfg(any(test, feature = "fake"))]
pub mod fake;

use embedded_hal::{
    blocking::delay::DelayUs,
    digital::v2::{InputPin, OutputPin},
};

pub use self::{address::Address, error::*};

/// Primitive operations of a 1-Wire bus master.
///
/// Implementors provide the reset pulse and the single bit time slots; byte transfers, ROM
/// selection and commands are built on top of those.
pub trait Bus {
    /// Error of the underlying pin
    type Error;

    /// Perform a reset initialization sequence
    ///
    /// Fails with [`Error::UnexpectedResponse`] when no device answers with a presence pulse.
    fn reset(&mut self, delay: &mut impl DelayUs<u32>) -> Result<(), Self::Error>;

    /// Write a single bit to the bus
    fn write_bit(&mut self, bit: bool, delay: &mut impl DelayUs<u32>) -> Result<(), Self::Error>;

    /// Read a single bit from the bus
    fn read_bit(&mut self, delay: &mut impl DelayUs<u32>) -> Result<bool, Self::Error>;

    /// Write a single byte to the bus, LSB first
    fn write_byte(&mut self, byte: u8, delay: &mut impl DelayUs<u32>) -> Result<(), Self::Error> {
        for i in 0..8 {
            self.write_bit((byte >> i) & 1 == 1, delay)?;
        }
        Ok(())
    }

    /// Write multiple bytes to the bus
    fn write_bytes(
        &mut self,
        bytes: &[u8],
        delay: &mut impl DelayUs<u32>,
    ) -> Result<(), Self::Error> {
        for byte in bytes {
            self.write_byte(*byte, delay)?;
        }
        Ok(())
    }

    /// Write a single byte and keep the bus powered afterwards
    ///
    /// Parasite powered devices draw their supply from the data line and need it held high while
    /// they convert or copy to EEPROM. The hold lasts until [`Bus::depower`] or the next reset.
    /// Buses with externally powered devices need nothing beyond a plain write.
    fn write_byte_power(
        &mut self,
        byte: u8,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<(), Self::Error> {
        self.write_byte(byte, delay)
    }

    /// End a power hold started by [`Bus::write_byte_power`]
    fn depower(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Read a single byte from the bus, LSB first
    fn read_byte(&mut self, delay: &mut impl DelayUs<u32>) -> Result<u8, Self::Error> {
        let mut ret = 0;
        for i in 0..8 {
            if self.read_bit(delay)? {
                ret |= 1 << i;
            }
        }
        Ok(ret)
    }

    /// Read multiple bytes from the bus
    fn read_bytes(
        &mut self,
        bytes: &mut [u8],
        delay: &mut impl DelayUs<u32>,
    ) -> Result<(), Self::Error> {
        for byte in bytes {
            *byte = self.read_byte(delay)?;
        }
        Ok(())
    }

    /// Do a ROM select
    fn select_address(
        &mut self,
        device: &Address,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<(), Self::Error> {
        self.write_byte(commands::MATCH_ROM, delay)?;
        self.write_bytes(&device.to_bytes(), delay)
    }

    /// Do a ROM skip
    fn skip_address(&mut self, delay: &mut impl DelayUs<u32>) -> Result<(), Self::Error> {
        self.write_byte(commands::SKIP_ROM, delay)
    }

    /// Send a command to the bus
    ///
    /// Does the following sequence:
    /// 1. Reset the bus
    /// 2. Select the given address, or skip if None
    /// 3. Write the command byte
    fn send_command(
        &mut self,
        address: Option<&Address>,
        command: u8,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<(), Self::Error> {
        self.reset(delay)?;
        if let Some(address) = address {
            self.select_address(address, delay)?;
        } else {
            self.skip_address(delay)?;
        }
        self.write_byte(command, delay)?;
        Ok(())
    }

    /// Like [`Bus::send_command`], but holds the bus powered after the command byte
    fn send_command_power(
        &mut self,
        address: Option<&Address>,
        command: u8,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<(), Self::Error> {
        self.reset(delay)?;
        if let Some(address) = address {
            self.select_address(address, delay)?;
        } else {
            self.skip_address(delay)?;
        }
        self.write_byte_power(command, delay)
    }

    /// Get iterator over all devices on the bus
    fn devices<'a, 'd, D: DelayUs<u32>>(&'a mut self, delay: &'d mut D) -> DeviceSearch<'a, 'd, Self, D>
    where
        Self: Sized,
    {
        DeviceSearch {
            wire: self,
            state: SearchState::new(),
            delay,
        }
    }
}

/// Bit-banged 1-Wire master on an open-drain pin.
///
/// Setting the pin high releases the bus to the external pull-up resistor. That pull-up is also
/// all a power hold gets, so parasite powered sensors need one strong enough for a conversion.
pub struct OneWire<P> {
    pin: P,
}

impl<P, E> OneWire<P>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
{
    pub const fn new(pin: P) -> Self {
        Self { pin }
    }

    pub fn release(self) -> P {
        self.pin
    }
}

impl<P, E> Bus for OneWire<P>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
{
    type Error = E;

    fn reset(&mut self, delay: &mut impl DelayUs<u32>) -> Result<(), E> {
        // Wait for the bus to be pulled high by the pull-up resistor
        let mut retries = 125;
        while self.pin.is_low()? {
            if retries == 0 {
                return Err(Error::BusNotHigh);
            }
            retries -= 1;
            delay.delay_us(2);
        }

        // Pull the bus low for 480us
        self.pin.set_low()?;
        delay.delay_us(480);

        // Release the bus
        self.pin.set_high()?;
        delay.delay_us(70);

        // Sample for a presence pulse
        let is_low = self.pin.is_low()?;
        delay.delay_us(410);

        if is_low {
            Ok(())
        } else {
            Err(Error::UnexpectedResponse)
        }
    }

    fn write_bit(&mut self, bit: bool, delay: &mut impl DelayUs<u32>) -> Result<(), E> {
        if bit {
            // Write a 1

            // Pull the bus low for 10us
            self.pin.set_low()?;
            delay.delay_us(10);

            // Release the bus
            self.pin.set_high()?;

            // Wait for the end of the timeslot
            delay.delay_us(55);
        } else {
            // Write a 0

            // Pull the bus low for 65us
            self.pin.set_low()?;
            delay.delay_us(65);

            // Release the bus
            self.pin.set_high()?;

            // Wait for the end of the timeslot
            delay.delay_us(5);
        }

        Ok(())
    }

    fn read_bit(&mut self, delay: &mut impl DelayUs<u32>) -> Result<bool, E> {
        // The sample must land within 15us of the falling edge
        let ret = critical_section::with(|_| {
            self.pin.set_low()?;
            delay.delay_us(1);

            self.pin.set_high()?;

            // Give devices time to drive the bus
            delay.delay_us(1);

            self.pin.is_high()
        })?;

        // Wait for the end of the timeslot
        delay.delay_us(53);

        Ok(ret)
    }
}

/// Cursor of the ROM search algorithm (Maxim application note 187).
///
/// Kept between calls so that consecutive searches walk every device on the bus. Whenever a
/// search finds nothing the cursor rewinds itself, and [`SearchState::reset`] rewinds it on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchState {
    last_discrepancy: u8,
    last_family_discrepancy: u8,
    last_device_flag: bool,
    rom_no: [u8; 8],
}

impl SearchState {
    pub const fn new() -> Self {
        Self {
            last_discrepancy: 0,
            last_family_discrepancy: 0,
            last_device_flag: false,
            rom_no: [0; 8],
        }
    }

    /// Rewind the cursor so the next search starts from the beginning of the bus
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Search for the next device on the bus
    ///
    /// Returns `Ok(None)` once every device has been returned, or if there are none.
    pub fn next_device<B: Bus>(
        &mut self,
        wire: &mut B,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<Option<Address>, B::Error> {
        let mut id_bit_number = 1u8;
        let mut last_zero = 0u8;
        let mut rom_byte_number = 0u8;
        let mut rom_byte_mask = 1u8;
        let mut search_result = false;

        if !self.last_device_flag {
            if let Err(e) = wire.reset(delay) {
                self.reset();
                return match e {
                    // No presence pulse: nothing on the bus
                    Error::UnexpectedResponse => Ok(None),
                    e => Err(e),
                };
            }

            // Normal search
            wire.write_byte(commands::SEARCH_NORMAL, delay)?;

            // Loop to do the search
            while rom_byte_number < 8 {
                let id_bit = wire.read_bit(delay)?;
                let cmp_id_bit = wire.read_bit(delay)?;

                // Check for no devices on the bus
                if id_bit && cmp_id_bit {
                    break;
                }

                // All coupled devices have 0 or 1
                let search_direction = if id_bit != cmp_id_bit {
                    // Bit write value for search
                    id_bit
                } else {
                    // If this discrepancy is before the Last Discrepancy
                    // on a previous next then pick the same as last time
                    let sd = if id_bit_number < self.last_discrepancy {
                        (self.rom_no[rom_byte_number as usize] & rom_byte_mask) > 0
                    } else {
                        // If equal to last pick 1, if not then pick 0
                        id_bit_number == self.last_discrepancy
                    };

                    // If 0 was picked then record its position in LastZero
                    if !sd {
                        last_zero = id_bit_number;

                        // Check for Last discrepancy in family
                        if last_zero < 9 {
                            self.last_family_discrepancy = last_zero;
                        }
                    }

                    sd
                };

                // Set or clear the bit in the ROM byte rom_byte_number
                // with mask rom_byte_mask
                if search_direction {
                    self.rom_no[rom_byte_number as usize] |= rom_byte_mask;
                } else {
                    self.rom_no[rom_byte_number as usize] &= !rom_byte_mask;
                }

                // Serial number search direction write bit
                wire.write_bit(search_direction, delay)?;

                // Increment the byte counter id_bit_number
                // and shift the mask rom_byte_mask
                id_bit_number += 1;
                rom_byte_mask <<= 1;

                // If the mask is 0 then go to new SerialNum byte rom_byte_number and reset mask
                if rom_byte_mask == 0 {
                    rom_byte_number += 1;
                    rom_byte_mask = 1;
                }
            }

            // If the search was successful then
            if id_bit_number >= 65 {
                self.last_discrepancy = last_zero;

                // Check for last device
                if self.last_discrepancy == 0 {
                    self.last_device_flag = true;
                }
                search_result = true;
            }
        }

        // A bus held low answers 0 to every slot, which reads as an all-zero ROM code
        if !search_result || self.rom_no == [0; 8] {
            self.reset();
            Ok(None)
        } else {
            Ok(Some(Address::from_bytes(self.rom_no)))
        }
    }
}

/// Iterator over every device on a bus, see [`Bus::devices`]
pub struct DeviceSearch<'a, 'd, B, D> {
    wire: &'a mut B,
    state: SearchState,
    delay: &'d mut D,
}

impl<B: Bus, D: DelayUs<u32>> DeviceSearch<'_, '_, B, D> {
    pub fn search(&mut self) -> Result<Option<Address>, B::Error> {
        self.state.next_device(self.wire, self.delay)
    }
}

impl<B: Bus, D: DelayUs<u32>> Iterator for DeviceSearch<'_, '_, B, D> {
    type Item = Result<Address, B::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.search().transpose()
    }
}

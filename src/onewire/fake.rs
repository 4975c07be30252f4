//! Simulated 1-Wire bus for testing
//!
//! Models every device at the bit level, including the wired-AND behavior of the bus during a ROM
//! search, so the search algorithm and the sensor driver run unmodified against it.

use core::convert::Infallible;

use embedded_hal::blocking::delay::DelayUs;

use super::{commands, crc::crc8, Bus, Error, Result};
use crate::ds18b20::{self, CONVERT_T, READ_SCRATCHPAD, WRITE_SCRATCHPAD};

/// Delay that returns immediately
#[derive(Debug, Default, Copy, Clone)]
pub struct NoDelay;

impl DelayUs<u32> for NoDelay {
    fn delay_us(&mut self, _us: u32) {}
}

/// A simulated slave device with a ROM code and a 9 byte scratchpad
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeDevice {
    rom: [u8; 8],
    scratchpad: [u8; 9],
    /// Temperature register a completed conversion stores
    sensed: [u8; 2],
    parasite: bool,
    /// Scratchpad was replaced by hand and conversions leave it alone
    frozen: bool,
    conversions: usize,
    powered_conversions: usize,
}

impl FakeDevice {
    /// Power-on scratchpad of a DS18B20: 85 °C, 12 bit resolution
    const POWER_ON: [u8; 8] = [0x50, 0x05, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10];

    /// Device with the given ROM code, which is used as-is (the CRC byte is not fixed up)
    pub fn new(rom: [u8; 8]) -> Self {
        let mut device = Self {
            rom,
            scratchpad: [0; 9],
            sensed: [Self::POWER_ON[0], Self::POWER_ON[1]],
            parasite: false,
            frozen: false,
            conversions: 0,
            powered_conversions: 0,
        };
        device.scratchpad[..8].copy_from_slice(&Self::POWER_ON);
        device.scratchpad[8] = crc8(&Self::POWER_ON);
        device
    }

    /// Device with the given family code and serial number, and a valid ROM CRC
    pub fn with_family(family: u8, serial: [u8; 6]) -> Self {
        let mut rom = [0u8; 8];
        rom[0] = family;
        rom[1..7].copy_from_slice(&serial);
        rom[7] = crc8(&rom[..7]);
        Self::new(rom)
    }

    /// DS18B20 with the given serial number
    pub fn ds18b20(serial: [u8; 6]) -> Self {
        Self::with_family(ds18b20::FAMILY_DS18B20, serial)
    }

    /// Makes the device parasite powered: a conversion without a power hold never completes
    #[must_use]
    pub const fn parasite(mut self) -> Self {
        self.parasite = true;
        self
    }

    pub const fn rom(&self) -> [u8; 8] {
        self.rom
    }

    pub const fn scratchpad(&self) -> [u8; 9] {
        self.scratchpad
    }

    /// Number of temperature conversions requested from this device
    pub const fn conversions(&self) -> usize {
        self.conversions
    }

    /// Number of conversions requested while the master held the bus powered
    pub const fn powered_conversions(&self) -> usize {
        self.powered_conversions
    }

    /// Sets the sensed temperature and the temperature register, and fixes up the scratchpad CRC
    pub fn set_raw_temperature(&mut self, lsb: u8, msb: u8) {
        self.sensed = [lsb, msb];
        self.store_temperature(lsb, msb);
    }

    fn store_temperature(&mut self, lsb: u8, msb: u8) {
        self.scratchpad[0] = lsb;
        self.scratchpad[1] = msb;
        self.scratchpad[8] = crc8(&self.scratchpad[..8]);
    }

    fn convert(&mut self, powered: bool) {
        self.conversions += 1;
        if powered {
            self.powered_conversions += 1;
        }

        if self.frozen {
            return;
        }
        if self.parasite && !powered {
            // Browns out and comes back with the power-on register
            self.store_temperature(Self::POWER_ON[0], Self::POWER_ON[1]);
        } else {
            self.store_temperature(self.sensed[0], self.sensed[1]);
        }
    }

    /// Replaces the whole scratchpad, CRC byte included. Later conversions leave it as is.
    pub fn set_scratchpad(&mut self, scratchpad: [u8; 9]) {
        self.scratchpad = scratchpad;
        self.frozen = true;
    }

    fn rom_bit(&self, idx: u16) -> bool {
        bit_of(&self.rom, idx)
    }

    fn scratchpad_bit(&self, idx: u16) -> bool {
        bit_of(&self.scratchpad, idx)
    }
}

fn bit_of(bytes: &[u8], idx: u16) -> bool {
    bytes
        .get(usize::from(idx / 8))
        .map_or(true, |b| (b >> (idx % 8)) & 1 == 1)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    /// Waiting for a ROM command after a reset
    Rom,
    /// ROM search: `step` 0 and 1 are the two read slots, 2 the direction write slot
    Search { bit: u16, step: u8 },
    Match { bit: u16 },
    ReadRom { bit: u16 },
    /// Waiting for a function command
    Function,
    ReadScratchpad { bit: u16 },
    WriteScratchpad { byte: usize },
    /// Transaction finished, everything is ignored until the next reset
    Done,
}

/// A bus with up to `N` attached devices
#[derive(Debug, Clone)]
pub struct FakeBus<const N: usize> {
    devices: [Option<FakeDevice>; N],
    active: [bool; N],
    phase: Phase,
    rx: u8,
    rx_bits: u8,
    resets: usize,
    power_held: bool,
}

impl<const N: usize> FakeBus<N> {
    pub fn new(devices: [Option<FakeDevice>; N]) -> Self {
        Self {
            devices,
            active: [false; N],
            phase: Phase::Done,
            rx: 0,
            rx_bits: 0,
            resets: 0,
            power_held: false,
        }
    }

    pub fn device(&self, idx: usize) -> Option<&FakeDevice> {
        self.devices[idx].as_ref()
    }

    pub fn device_mut(&mut self, idx: usize) -> Option<&mut FakeDevice> {
        self.devices[idx].as_mut()
    }

    /// Plugs a device into (or, with `None`, unplugs it from) the given slot
    pub fn set_device(&mut self, idx: usize, device: Option<FakeDevice>) {
        self.devices[idx] = device;
        self.active[idx] = false;
    }

    /// Number of reset pulses issued by the master
    pub const fn resets(&self) -> usize {
        self.resets
    }

    /// Whether the master is holding the bus powered
    pub const fn is_power_held(&self) -> bool {
        self.power_held
    }

    fn active_devices(&mut self) -> impl Iterator<Item = &mut FakeDevice> + '_ {
        self.devices
            .iter_mut()
            .zip(self.active.iter())
            .filter_map(|(d, active)| d.as_mut().filter(|_| *active))
    }

    /// Wired-AND of one bit driven by every active device. An idle bus reads high.
    fn wired_and(&self, f: impl Fn(&FakeDevice) -> bool) -> bool {
        self.devices
            .iter()
            .zip(self.active.iter())
            .filter_map(|(d, active)| d.as_ref().filter(|_| *active))
            .all(f)
    }

    fn deactivate_mismatched(&mut self, bit: u16, value: bool) {
        for (device, active) in self.devices.iter().zip(self.active.iter_mut()) {
            if let Some(device) = device {
                if device.rom_bit(bit) != value {
                    *active = false;
                }
            }
        }
    }

    fn receive_bit(&mut self, bit: bool) -> Option<u8> {
        if bit {
            self.rx |= 1 << self.rx_bits;
        }
        self.rx_bits += 1;

        if self.rx_bits == 8 {
            let byte = self.rx;
            self.rx = 0;
            self.rx_bits = 0;
            Some(byte)
        } else {
            None
        }
    }

    fn handle_byte(&mut self, byte: u8) {
        self.phase = match (self.phase, byte) {
            (Phase::Rom, commands::SEARCH_NORMAL) => Phase::Search { bit: 0, step: 0 },
            (Phase::Rom, commands::MATCH_ROM) => Phase::Match { bit: 0 },
            (Phase::Rom, commands::READ_ROM) => Phase::ReadRom { bit: 0 },
            (Phase::Rom, commands::SKIP_ROM) => Phase::Function,
            (Phase::Function, CONVERT_T) => {
                let powered = self.power_held;
                for device in self.active_devices() {
                    device.convert(powered);
                }
                Phase::Done
            }
            (Phase::Function, READ_SCRATCHPAD) => Phase::ReadScratchpad { bit: 0 },
            (Phase::Function, WRITE_SCRATCHPAD) => Phase::WriteScratchpad { byte: 2 },
            (Phase::WriteScratchpad { byte: idx }, value) => {
                for device in self.active_devices() {
                    device.scratchpad[idx] = value;
                    device.scratchpad[8] = crc8(&device.scratchpad[..8]);
                }
                if idx >= 4 {
                    Phase::Done
                } else {
                    Phase::WriteScratchpad { byte: idx + 1 }
                }
            }
            _ => Phase::Done,
        };
    }
}

impl<const N: usize> Bus for FakeBus<N> {
    type Error = Infallible;

    fn reset(&mut self, _delay: &mut impl DelayUs<u32>) -> Result<(), Infallible> {
        self.resets += 1;
        self.power_held = false;
        self.rx = 0;
        self.rx_bits = 0;

        for (device, active) in self.devices.iter().zip(self.active.iter_mut()) {
            *active = device.is_some();
        }

        if self.active.iter().any(|a| *a) {
            self.phase = Phase::Rom;
            Ok(())
        } else {
            self.phase = Phase::Done;
            Err(Error::UnexpectedResponse)
        }
    }

    fn write_byte_power(
        &mut self,
        byte: u8,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<(), Infallible> {
        // Held from the command byte on, so a conversion it starts is already powered
        self.power_held = true;
        self.write_byte(byte, delay)
    }

    fn depower(&mut self) -> Result<(), Infallible> {
        self.power_held = false;
        Ok(())
    }

    fn write_bit(&mut self, bit: bool, _delay: &mut impl DelayUs<u32>) -> Result<(), Infallible> {
        match self.phase {
            Phase::Search { bit: idx, step: 2 } => {
                self.deactivate_mismatched(idx, bit);
                self.phase = if idx + 1 == 64 {
                    Phase::Done
                } else {
                    Phase::Search {
                        bit: idx + 1,
                        step: 0,
                    }
                };
            }
            Phase::Match { bit: idx } => {
                self.deactivate_mismatched(idx, bit);
                if idx + 1 == 64 {
                    self.phase = Phase::Function;
                } else {
                    self.phase = Phase::Match { bit: idx + 1 };
                }
            }
            Phase::Rom | Phase::Function | Phase::WriteScratchpad { .. } => {
                if let Some(byte) = self.receive_bit(bit) {
                    self.handle_byte(byte);
                }
            }
            _ => self.phase = Phase::Done,
        }
        Ok(())
    }

    fn read_bit(&mut self, _delay: &mut impl DelayUs<u32>) -> Result<bool, Infallible> {
        let bit = match self.phase {
            Phase::Search { bit: idx, step: 0 } => {
                self.phase = Phase::Search { bit: idx, step: 1 };
                self.wired_and(|d| d.rom_bit(idx))
            }
            Phase::Search { bit: idx, step: 1 } => {
                self.phase = Phase::Search { bit: idx, step: 2 };
                self.wired_and(|d| !d.rom_bit(idx))
            }
            Phase::ReadRom { bit: idx } => {
                self.phase = Phase::ReadRom { bit: idx + 1 };
                self.wired_and(|d| d.rom_bit(idx))
            }
            Phase::ReadScratchpad { bit: idx } => {
                self.phase = Phase::ReadScratchpad { bit: idx + 1 };
                self.wired_and(|d| d.scratchpad_bit(idx))
            }
            _ => true,
        };
        Ok(bit)
    }
}

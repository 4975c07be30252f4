use core::fmt;

use super::crc::crc8;

/// A 64-bit ROM address of a device. These are globally unique, and used to single out a single
/// device on a potentially crowded bus.
///
/// Stored little-endian: byte 0 is the family code, bytes 1..7 the serial number and byte 7 the
/// CRC-8 of the first seven bytes.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Address(pub u64);

impl Address {
    #[inline]
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    #[inline]
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    pub const fn family_code(self) -> u8 {
        self.0.to_le_bytes()[0]
    }

    /// CRC byte stored in the address
    pub const fn crc(self) -> u8 {
        self.0.to_le_bytes()[7]
    }

    /// Checks the stored CRC against the one computed over the first seven bytes
    pub fn is_crc_valid(self) -> bool {
        let bytes = self.to_bytes();
        crc8(&bytes[..7]) == bytes[7]
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:016X?}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Address {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "{=u64:016X}", self.0);
    }
}

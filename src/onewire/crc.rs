//! Dallas/Maxim CRC-8 (polynomial x^8 + x^5 + x^4 + 1, reflected as 0x8C)

use super::{Error, Result};

/// Computes the CRC-8 over `data`
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for byte in data {
        let mut byte = *byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
    }
    crc
}

/// Checks a buffer whose last byte is the CRC-8 of the rest of it.
///
/// Running the CRC over the data and its own CRC yields zero.
pub fn check_crc8<E>(data: &[u8]) -> Result<(), E> {
    if crc8(data) == 0 {
        Ok(())
    } else {
        Err(Error::CrcMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zero() {
        assert_eq!(crc8(&[]), 0);
    }

    #[test]
    fn known_rom_code() {
        // Example ROM from Maxim application note 27
        let rom = [0x02, 0x1C, 0xB8, 0x01, 0x00, 0x00, 0x00];
        assert_eq!(crc8(&rom), 0xA2);

        let mut full = [0u8; 8];
        full[..7].copy_from_slice(&rom);
        full[7] = 0xA2;
        assert!(check_crc8::<()>(&full).is_ok());
    }

    #[test]
    fn any_single_bit_flip_is_detected() {
        let mut full = [0x28, 0x60, 0xFB, 0x83, 0x0F, 0x00, 0x00, 0x00];
        full[7] = crc8(&full[..7]);

        for byte in 0..8 {
            for bit in 0..8 {
                let mut corrupted = full;
                corrupted[byte] ^= 1 << bit;
                assert_eq!(
                    check_crc8::<()>(&corrupted),
                    Err(Error::CrcMismatch),
                    "flip of bit {bit} in byte {byte} not detected"
                );
            }
        }
    }
}

//! Flash memory map shared by the bootloader and the firmware it boots.

use core::ops::Range;

/// Compile-time description of the flash regions.
///
/// The firmware region ends with its metadata:
/// firmware version, device identifier and firmware CRC, one word each.
/// The last `crc_trailer_size` bytes are excluded from the CRC, as they hold the stored CRC itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashLayout {
    pub bootloader: Range<u32>,
    pub firmware: Range<u32>,
    pub crc_trailer_size: u32,
}

impl FlashLayout {
    /// Bricklet co-processor with 16 KiB of flash.
    ///
    /// ```text
    /// | bootloader  | firmware    | version     | device id   | crc         |
    /// | 0000-2000   | 2000-3ff4   | 3ff4-3ff8   | 3ff8-3ffc   | 3ffc-4000   |
    /// ```
    pub const BRICKLET_16K: FlashLayout = FlashLayout {
        bootloader: 0x0000..0x2000,
        firmware: 0x2000..0x4000,
        crc_trailer_size: 4,
    };

    /// Address of the firmware vector table, and of its first word.
    pub const fn firmware_start(&self) -> u32 {
        self.firmware.start
    }

    /// Bytes covered by the firmware CRC.
    pub const fn crc_range(&self) -> Range<u32> {
        self.firmware.start..self.firmware.end - self.crc_trailer_size
    }

    /// Start of the metadata block at the end of the firmware region.
    pub const fn metadata_address(&self) -> u32 {
        self.firmware.end - FirmwareMetadata::SIZE
    }
}

/// Metadata the firmware build places at the end of its image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareMetadata {
    pub firmware_version: u32,
    pub device_identifier: u32,
    pub firmware_crc: u32,
}

impl FirmwareMetadata {
    pub const SIZE: u32 = 12;

    /// Decode from the little-endian bytes as stored in flash.
    pub fn from_bytes(bytes: &[u8; Self::SIZE as usize]) -> Self {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Self {
            firmware_version: word(0),
            device_identifier: word(4),
            firmware_crc: word(8),
        }
    }
}

/// Semantic version of the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8, revision: u8) -> Self {
        Self { major, minor, revision }
    }

    /// Version word as stored in the bootloader version section: `0x00MMmmrr`.
    pub const fn word(&self) -> u32 {
        (self.major as u32) << 16 | (self.minor as u32) << 8 | self.revision as u32
    }
}

impl core::fmt::Display for Version {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bricklet_16k() {
        let layout = FlashLayout::BRICKLET_16K;
        assert_eq!(layout.firmware_start(), 0x2000);
        assert_eq!(layout.crc_range(), 0x2000..0x3ffc);
        assert_eq!(layout.metadata_address(), 0x3ff4);
    }

    #[test]
    fn metadata_words() {
        let bytes = [
            0x03, 0x02, 0x01, 0x00, // version
            0x78, 0x56, 0x34, 0x12, // device identifier
            0xef, 0xbe, 0xad, 0xde, // crc
        ];
        assert_eq!(
            FirmwareMetadata::from_bytes(&bytes),
            FirmwareMetadata {
                firmware_version: 0x0001_0203,
                device_identifier: 0x1234_5678,
                firmware_crc: 0xdead_beef,
            }
        );
    }

    #[test]
    fn version_word() {
        let version = Version::new(2, 1, 7);
        assert_eq!(version.word(), 0x0002_0107);
        assert_eq!(format!("{}", version), "2.1.7");
    }
}

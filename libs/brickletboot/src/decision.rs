//! Deciding at reset whether the firmware can be booted.

use core::ops::Range;

use crc::{Crc, CRC_32_JAMCRC};
use defmt_or_log::{debug, info, warn};
use embedded_storage::nor_flash::ReadNorFlash;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::layout::{FirmwareMetadata, FlashLayout};

/// Value of an erased flash word.
pub const ERASED_WORD: u32 = 0xFFFF_FFFF;

/// Outcome of the boot decision.
///
/// The values are the status codes of the bootloader protocol's "set bootloader mode" function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BootStatus {
    /// Firmware is present, meant for this device and intact.
    Ok = 0,
    /// First firmware word is erased, or the firmware could not be read.
    FirmwareNotPresent = 3,
    /// Firmware was built for another device.
    DeviceIdentifierIncorrect = 4,
    /// Stored CRC does not match the firmware.
    CrcMismatch = 5,
}

/// Computes the running CRC-32 over a flash range.
///
/// The running value starts at all ones and uses the reflected polynomial `0xEDB88320`,
/// without the final complement.
pub trait Crc32Engine<F: ReadNorFlash> {
    type Error;

    fn running_crc(&mut self, flash: &mut F, range: Range<u32>) -> Result<u32, Self::Error>;
}

static CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_JAMCRC);

/// CRC engine reading the flash in chunks of `CHUNK` bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareCrc<const CHUNK: usize>;

impl<F: ReadNorFlash, const CHUNK: usize> Crc32Engine<F> for SoftwareCrc<CHUNK> {
    type Error = F::Error;

    fn running_crc(&mut self, flash: &mut F, range: Range<u32>) -> Result<u32, Self::Error> {
        let mut digest = CRC.digest();
        let mut buf = [0u8; CHUNK];

        let mut offset = range.start;
        while offset < range.end {
            let len = (range.end - offset).min(CHUNK as u32);
            let chunk = &mut buf[..len as usize];
            flash.read(offset, chunk)?;
            digest.update(chunk);
            offset += len;
        }

        Ok(digest.finalize())
    }
}

/// Firmware validation against a [FlashLayout] and the identifier of this device.
pub struct BootDecision<'a, F, E> {
    flash: &'a mut F,
    engine: &'a mut E,
    layout: &'a FlashLayout,
    device_identifier: u32,
}

impl<'a, F: ReadNorFlash, E: Crc32Engine<F>> BootDecision<'a, F, E> {
    pub fn new(flash: &'a mut F, engine: &'a mut E, layout: &'a FlashLayout, device_identifier: u32) -> Self {
        Self {
            flash,
            engine,
            layout,
            device_identifier,
        }
    }

    /// CRC-32 of the firmware, excluding the CRC trailer.
    pub fn compute_firmware_crc(&mut self) -> Result<u32, E::Error> {
        let running = self.engine.running_crc(self.flash, self.layout.crc_range())?;
        Ok(!running)
    }

    /// First word of the firmware, the initial stack pointer of its vector table.
    pub fn first_word(&mut self) -> Result<u32, F::Error> {
        let mut bytes = [0u8; 4];
        self.flash.read(self.layout.firmware_start(), &mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn metadata(&mut self) -> Result<FirmwareMetadata, F::Error> {
        let mut bytes = [0u8; FirmwareMetadata::SIZE as usize];
        self.flash.read(self.layout.metadata_address(), &mut bytes)?;
        Ok(FirmwareMetadata::from_bytes(&bytes))
    }

    /// Decide whether the firmware can be jumped to.
    ///
    /// Checks are done in order and the first failing one decides:
    /// erased first word, device identifier, then CRC.
    pub fn can_jump_to_firmware(&mut self) -> BootStatus {
        let Ok(first_word) = self.first_word() else {
            warn!("Failed to read the firmware vector table");
            return BootStatus::FirmwareNotPresent;
        };

        if first_word == ERASED_WORD {
            info!("No firmware present");
            return BootStatus::FirmwareNotPresent;
        }

        let Ok(metadata) = self.metadata() else {
            warn!("Failed to read the firmware metadata");
            return BootStatus::FirmwareNotPresent;
        };

        debug!("Firmware metadata: {:?}", metadata);

        if metadata.device_identifier != self.device_identifier {
            warn!(
                "Firmware is built for device {:?}, expected {:?}",
                metadata.device_identifier, self.device_identifier
            );
            return BootStatus::DeviceIdentifierIncorrect;
        }

        let Ok(crc) = self.compute_firmware_crc() else {
            warn!("Failed to compute the firmware CRC");
            return BootStatus::FirmwareNotPresent;
        };

        if metadata.firmware_crc != crc {
            warn!(
                "Firmware CRC mismatch: stored {:x}, computed {:x}",
                metadata.firmware_crc, crc
            );
            return BootStatus::CrcMismatch;
        }

        info!("Firmware version {:x} is valid", metadata.firmware_version);
        BootStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use crc::CRC_32_ISO_HDLC;

    use super::*;
    use crate::mock::MockFlashBase;

    const DEVICE_IDENTIFIER: u32 = 2125;

    /// 16 KiB of flash in 64 byte rows.
    type MockFlash = MockFlashBase<256, 4, 16>;

    type Engine = SoftwareCrc<64>;

    /// Program a firmware image with valid metadata, returning its CRC.
    fn program_image(flash: &mut MockFlash, layout: &FlashLayout, device_identifier: u32) -> u32 {
        let start = layout.firmware.start as usize;
        let metadata = layout.metadata_address() as usize;

        let bytes = flash.as_bytes_mut();
        // Initial stack pointer and reset vector.
        bytes[start..start + 4].copy_from_slice(&0x2000_1000u32.to_le_bytes());
        bytes[start + 4..start + 8].copy_from_slice(&(layout.firmware.start + 0x101).to_le_bytes());
        for (i, byte) in bytes[start + 8..metadata].iter_mut().enumerate() {
            *byte = (i * 7 + 3) as u8;
        }
        bytes[metadata..metadata + 4].copy_from_slice(&0x0002_0001u32.to_le_bytes());
        bytes[metadata + 4..metadata + 8].copy_from_slice(&device_identifier.to_le_bytes());

        let crc_range = layout.crc_range();
        let crc = Crc::<u32>::new(&CRC_32_ISO_HDLC).checksum(&bytes[crc_range.start as usize..crc_range.end as usize]);
        flash.program(crc_range.end, &crc.to_le_bytes());
        crc
    }

    fn decide(flash: &mut MockFlash) -> BootStatus {
        let mut engine = Engine::default();
        BootDecision::new(flash, &mut engine, &FlashLayout::BRICKLET_16K, DEVICE_IDENTIFIER).can_jump_to_firmware()
    }

    #[test]
    fn valid_image() {
        let layout = FlashLayout::BRICKLET_16K;
        let mut flash = MockFlash::new();
        let crc = program_image(&mut flash, &layout, DEVICE_IDENTIFIER);

        let mut engine = Engine::default();
        let mut decision = BootDecision::new(&mut flash, &mut engine, &layout, DEVICE_IDENTIFIER);
        assert_eq!(decision.compute_firmware_crc(), Ok(crc));
        assert_eq!(
            decision.metadata(),
            Ok(FirmwareMetadata {
                firmware_version: 0x0002_0001,
                device_identifier: DEVICE_IDENTIFIER,
                firmware_crc: crc,
            })
        );
        assert_eq!(decision.can_jump_to_firmware(), BootStatus::Ok);
        // Idempotent.
        assert_eq!(decision.can_jump_to_firmware(), BootStatus::Ok);
    }

    #[test]
    fn crc_of_erased_region() {
        // All ones over the CRC range, which is 0x1ffc bytes.
        let mut flash = MockFlash::new();
        let mut engine = Engine::default();
        let mut decision = BootDecision::new(&mut flash, &mut engine, &FlashLayout::BRICKLET_16K, DEVICE_IDENTIFIER);

        let expected = Crc::<u32>::new(&CRC_32_ISO_HDLC).checksum(&[0xff; 0x1ffc]);
        assert_eq!(decision.compute_firmware_crc(), Ok(expected));
    }

    #[test]
    fn chunk_size_does_not_matter() {
        let layout = FlashLayout::BRICKLET_16K;
        let mut flash = MockFlash::new();
        let crc = program_image(&mut flash, &layout, DEVICE_IDENTIFIER);

        let mut small = SoftwareCrc::<4>;
        let mut odd = SoftwareCrc::<12>;
        assert_eq!(
            BootDecision::new(&mut flash, &mut small, &layout, DEVICE_IDENTIFIER).compute_firmware_crc(),
            Ok(crc)
        );
        assert_eq!(
            BootDecision::new(&mut flash, &mut odd, &layout, DEVICE_IDENTIFIER).compute_firmware_crc(),
            Ok(crc)
        );
    }

    #[test]
    fn corrupted_image() {
        let layout = FlashLayout::BRICKLET_16K;
        let mut flash = MockFlash::new();
        program_image(&mut flash, &layout, DEVICE_IDENTIFIER);

        flash.as_bytes_mut()[0x2100] ^= 0x01;
        assert_eq!(decide(&mut flash), BootStatus::CrcMismatch);
    }

    #[test]
    fn any_single_bit_flip_is_detected() {
        let layout = FlashLayout::BRICKLET_16K;
        let mut flash = MockFlash::new();
        program_image(&mut flash, &layout, DEVICE_IDENTIFIER);

        // Skips the first word, flipping it to all ones means erased,
        // and the device identifier, which is checked first.
        let device_identifier = layout.metadata_address() + 4..layout.metadata_address() + 8;
        for address in (layout.firmware.start + 4..layout.crc_range().end)
            .step_by(61)
            .filter(|address| !device_identifier.contains(address))
        {
            for bit in [0, 3, 7] {
                flash.as_bytes_mut()[address as usize] ^= 1 << bit;
                assert_eq!(decide(&mut flash), BootStatus::CrcMismatch, "flip {:#x}:{}", address, bit);
                flash.as_bytes_mut()[address as usize] ^= 1 << bit;
            }
        }

        assert_eq!(decide(&mut flash), BootStatus::Ok);
    }

    #[test]
    fn stored_crc_mismatch() {
        let layout = FlashLayout::BRICKLET_16K;
        let mut flash = MockFlash::new();
        let crc = program_image(&mut flash, &layout, DEVICE_IDENTIFIER);

        flash.program(layout.crc_range().end, &(crc ^ 0x8000_0000).to_le_bytes());
        assert_eq!(decide(&mut flash), BootStatus::CrcMismatch);
    }

    #[test]
    fn erased_image() {
        let mut flash = MockFlash::new();
        assert_eq!(decide(&mut flash), BootStatus::FirmwareNotPresent);
        // Only the first word was read, no CRC was computed.
        assert_eq!(flash.bytes_read, 4);
    }

    #[test]
    fn erased_first_word_wins() {
        let layout = FlashLayout::BRICKLET_16K;
        let mut flash = MockFlash::new();
        program_image(&mut flash, &layout, DEVICE_IDENTIFIER + 1);
        flash.program(layout.firmware.start, &ERASED_WORD.to_le_bytes());

        assert_eq!(decide(&mut flash), BootStatus::FirmwareNotPresent);
    }

    #[test]
    fn wrong_device() {
        let layout = FlashLayout::BRICKLET_16K;
        let mut flash = MockFlash::new();
        program_image(&mut flash, &layout, DEVICE_IDENTIFIER + 1);

        assert_eq!(decide(&mut flash), BootStatus::DeviceIdentifierIncorrect);
        // Decided before computing the CRC.
        assert_eq!(flash.bytes_read, 4 + FirmwareMetadata::SIZE as usize);
    }

    #[test]
    fn device_checked_before_crc() {
        let layout = FlashLayout::BRICKLET_16K;
        let mut flash = MockFlash::new();
        program_image(&mut flash, &layout, DEVICE_IDENTIFIER + 1);
        flash.as_bytes_mut()[0x2100] ^= 0x01;

        assert_eq!(decide(&mut flash), BootStatus::DeviceIdentifierIncorrect);
    }

    #[test]
    fn read_errors_stay_in_bootloader() {
        let layout = FlashLayout::BRICKLET_16K;
        let mut flash = MockFlash::new();
        program_image(&mut flash, &layout, DEVICE_IDENTIFIER);

        for address in [layout.firmware.start, layout.metadata_address(), 0x3000] {
            flash.fail_at = Some(address);
            assert_eq!(decide(&mut flash), BootStatus::FirmwareNotPresent);
        }

        flash.fail_at = None;
        assert_eq!(decide(&mut flash), BootStatus::Ok);
    }

    #[test]
    fn status_codes() {
        assert_eq!(u8::from(BootStatus::Ok), 0);
        assert_eq!(u8::from(BootStatus::FirmwareNotPresent), 3);
        assert_eq!(u8::from(BootStatus::DeviceIdentifierIncorrect), 4);
        assert_eq!(u8::from(BootStatus::CrcMismatch), 5);
        assert!(matches!(BootStatus::try_from(5u8), Ok(BootStatus::CrcMismatch)));
        assert!(BootStatus::try_from(1u8).is_err());
    }
}

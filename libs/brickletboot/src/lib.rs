//! Resident bootloader for Tinkerforge Bricklet co-processors.
//!
//! On every reset the firmware image is validated by [decision::BootDecision].
//! A valid firmware is jumped to, otherwise the bootloader stays resident and ticks
//! its transport forever, so that new firmware can be flashed.
#![cfg_attr(not(feature = "_test"), no_std)]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod decision;
pub mod layout;
#[cfg(any(test, feature = "_test"))]
pub mod mock;
pub mod status;

use defmt_or_log::{info, warn};

pub use decision::{BootDecision, BootStatus, Crc32Engine, SoftwareCrc};
pub use layout::{FirmwareMetadata, FlashLayout, Version};
pub use status::{BootMode, BootloaderStatus, Heartbeat};

/// Compile-time configuration of a bootloader build.
pub trait BootConfig {
    /// Flash regions of the chip.
    const LAYOUT: FlashLayout;

    /// Identifier the firmware metadata must carry to be booted on this device.
    const DEVICE_IDENTIFIER: u32;

    const BOOTLOADER_VERSION: Version;
}

/// Communication with the host whilst resident, driving the firmware upload.
pub trait Transport {
    /// Make progress; called about [Heartbeat::TICKS_PER_MS] times per millisecond.
    fn tick(&mut self, status: &mut BootloaderStatus);
}

/// A board that can validate and boot a firmware image.
///
/// Typically a board supports the intrinsics of a microcontroller
/// and owns the flash holding both the bootloader and the firmware.
pub trait Board {
    /// Type used to instantiate a [Board] implementation.
    type Config: BootConfig;

    type Transport: Transport;

    /// Initialize the [Board], can only be called once.
    fn init(config: Self::Config) -> Self;

    /// Validate the firmware against [BootConfig::LAYOUT] and [BootConfig::DEVICE_IDENTIFIER].
    fn can_jump_to_firmware(&mut self) -> BootStatus;

    /// Hand control over to the firmware.
    ///
    /// # Safety
    /// Only valid after [Board::can_jump_to_firmware] yielded [BootStatus::Ok].
    /// Nothing of the bootloader is dropped or unwound.
    unsafe fn jump_to_firmware(&mut self) -> !;

    fn set_status_led(&mut self, on: bool);

    /// Bring up everything needed to stay resident, like flash programming and the DMA backed transport.
    fn init_transport(&mut self) -> Self::Transport;
}

/// Run the bootloader: boot the firmware when valid, otherwise stay resident.
pub fn start<B: Board>(config: B::Config) -> ! {
    let mut board = B::init(config);

    let status = board.can_jump_to_firmware();
    if status == BootStatus::Ok {
        board.set_status_led(true);
        // Safety: the firmware was just validated.
        unsafe { board.jump_to_firmware() }
    }

    info!("Starting brickletboot (version {})", B::Config::BOOTLOADER_VERSION);
    warn!("Staying in bootloader mode: {:?}", status);

    let mut bootloader_status = BootloaderStatus::new();
    let mut transport = board.init_transport();
    let mut heartbeat = Heartbeat::new();

    loop {
        if let Some(led) = heartbeat.tick(&mut bootloader_status) {
            board.set_status_led(led);
        }

        transport.tick(&mut bootloader_status);
    }
}

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Boot mode as reported over the bootloader protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BootMode {
    Bootloader = 0,
    Firmware = 1,
    BootloaderWaitForReboot = 2,
    FirmwareWaitForReboot = 3,
    FirmwareWaitForEraseAndReboot = 4,
}

/// State of the resident bootloader, shared with the transport on every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootloaderStatus {
    pub boot_mode: BootMode,
    /// Raw status LED configuration, owned by the protocol handler.
    pub status_led_config: u8,
    /// Milliseconds since entering the main loop, approximately.
    pub system_timer_tick: u32,
}

impl BootloaderStatus {
    pub const fn new() -> Self {
        Self {
            boot_mode: BootMode::Bootloader,
            status_led_config: 0,
            system_timer_tick: 0,
        }
    }
}

impl Default for BootloaderStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives the system timer and the status LED heartbeat from transport ticks.
#[derive(Debug, Default)]
pub struct Heartbeat {
    tick_counter: u8,
}

impl Heartbeat {
    /// The transport is ticked about this many times per millisecond.
    pub const TICKS_PER_MS: u8 = 40;

    pub const fn new() -> Self {
        Self { tick_counter: 0 }
    }

    /// Count a transport tick.
    ///
    /// Once every [Self::TICKS_PER_MS] ticks the system timer advances
    /// and the new status LED state is returned, on for odd milliseconds.
    pub fn tick(&mut self, status: &mut BootloaderStatus) -> Option<bool> {
        self.tick_counter += 1;
        if self.tick_counter < Self::TICKS_PER_MS {
            return None;
        }

        self.tick_counter = 0;
        status.system_timer_tick = status.system_timer_tick.wrapping_add(1);
        Some(status.system_timer_tick % 2 == 1)
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use super::*;

    #[test]
    fn heartbeat_every_40_ticks() {
        let mut heartbeat = Heartbeat::new();
        let mut status = BootloaderStatus::new();

        let toggles = (0..200)
            .enumerate()
            .filter_map(|(i, _)| heartbeat.tick(&mut status).map(|led| (i, led)))
            .collect::<Vec<_>>();

        assert_eq!(toggles, [(39, true), (79, false), (119, true), (159, false), (199, true)]);
        assert_eq!(status.system_timer_tick, 5);
    }

    #[test]
    fn initial_status() {
        let status = BootloaderStatus::default();
        assert_eq!(status.boot_mode, BootMode::Bootloader);
        assert_eq!(u8::from(status.boot_mode), 0);
        assert_eq!(status.system_timer_tick, 0);
    }
}

//! Seam between the channel lifecycle and the DMA controller hardware.

use critical_section::CriticalSection;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::bitmap::ChannelIndex;

/// Arbitration priority level of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Priority {
    Level0 = 0,
    Level1 = 1,
    Level2 = 2,
    Level3 = 3,
}

/// What a single trigger transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TriggerAction {
    /// One trigger per block.
    Block = 0,
    /// One trigger per beat.
    Beat = 2,
    /// One trigger for the whole transaction.
    Transaction = 3,
}

/// Action on a channel event input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum EventInputAction {
    NoAction = 0,
    Trigger = 1,
    ConditionalTrigger = 2,
    ConditionalBlock = 3,
    Suspend = 4,
    Resume = 5,
    SkipNextBlock = 6,
}

/// Channel-level configuration applied on allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaResourceConfig {
    pub priority: Priority,
    /// Peripheral trigger source, 0 for software and event triggers only.
    pub peripheral_trigger: u8,
    pub trigger_action: TriggerAction,
    pub event_input_action: EventInputAction,
    /// Enable the event output; the selection itself lives in each descriptor.
    pub event_output_enable: bool,
}

impl Default for DmaResourceConfig {
    fn default() -> Self {
        Self {
            priority: Priority::Level0,
            peripheral_trigger: 0,
            trigger_action: TriggerAction::Transaction,
            event_input_action: EventInputAction::NoAction,
            event_output_enable: false,
        }
    }
}

/// Value of a channel control register (CHCTRLB), with the command field cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelControl(u32);

impl ChannelControl {
    const EVACT_POS: u32 = 0;
    const EVIE: u32 = 1 << 3;
    const EVOE: u32 = 1 << 4;
    const LVL_POS: u32 = 5;
    const TRIGSRC_POS: u32 = 8;
    const TRIGSRC_MASK: u32 = 0x3f;
    const TRIGACT_POS: u32 = 22;

    /// Offset of the command field.
    pub const CMD_POS: u32 = 24;

    pub fn from_config(config: &DmaResourceConfig) -> Self {
        let mut bits = (u8::from(config.priority) as u32) << Self::LVL_POS
            | (config.peripheral_trigger as u32 & Self::TRIGSRC_MASK) << Self::TRIGSRC_POS
            | (u8::from(config.trigger_action) as u32) << Self::TRIGACT_POS;

        if config.event_input_action != EventInputAction::NoAction {
            bits |= Self::EVIE | (u8::from(config.event_input_action) as u32) << Self::EVACT_POS;
        }

        if config.event_output_enable {
            bits |= Self::EVOE;
        }

        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }
}

/// Command issued to a running channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ChannelCommand {
    Suspend = 1,
    Resume = 2,
}

/// A DMA controller with per-channel registers.
///
/// Selecting a channel and writing its registers is a multi-step sequence on the hardware,
/// hence every method that does so requires the token of an exclusive region.
pub trait DmaController {
    /// Reset the controller, program the section base addresses and enable all priority levels.
    fn init(&self, cs: CriticalSection<'_>, descriptor_base: u32, write_back_base: u32);

    /// Disable and software-reset a single channel.
    fn reset_channel(&self, cs: CriticalSection<'_>, channel: ChannelIndex);

    /// Clear the software trigger of a channel and write its control register.
    fn configure_channel(&self, cs: CriticalSection<'_>, channel: ChannelIndex, control: ChannelControl);

    /// Set the enable bit of a channel.
    fn enable_channel(&self, cs: CriticalSection<'_>, channel: ChannelIndex);

    /// Issue a command; completion is only observable through the hardware flags.
    fn send_command(&self, cs: CriticalSection<'_>, channel: ChannelIndex, command: ChannelCommand);

    /// Whether the channel is currently busy, a single register read.
    fn is_busy(&self, channel: ChannelIndex) -> bool;
}

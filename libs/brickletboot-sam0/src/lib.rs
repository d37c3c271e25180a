#![no_std]

mod bootload;
mod dmac;
mod dsu;
mod flash;
mod led;
mod regs;

use brickletboot::{BootConfig, BootDecision, BootStatus, Board, Transport};
use brickletboot_dma::{DescriptorSection, DmaResourceManager};
use defmt_or_log::info;
use static_cell::StaticCell;

pub use bootload::Handoff;
pub use dmac::{on_interrupt, Dmac};
pub use dsu::{DsuCrc, DsuError};
pub use flash::{MappedFlash, MappedFlashError};
pub use led::StatusLed;

/// DMA channels available to the transport.
pub const CHANNEL_COUNT: usize = 6;

/// Slots in the descriptor section, the first [CHANNEL_COUNT] being the first descriptor of each channel.
pub const DESCRIPTOR_COUNT: usize = 8;

pub type DmaManager = DmaResourceManager<'static, Dmac, CHANNEL_COUNT, DESCRIPTOR_COUNT>;

/// Board specific configuration on top of [BootConfig].
pub trait Sam0Config: BootConfig {
    /// Port A pin of the active low status LED.
    const STATUS_LED_PIN: u8;

    type Transport: Transport;

    /// Bring up clocks and the watchdog, before the boot decision.
    fn system_init(&mut self) {}

    /// Create the transport once the bootloader stays resident.
    fn transport(&mut self, dma: &'static DmaManager) -> Self::Transport;
}

pub struct Sam0<C> {
    flash: MappedFlash,
    crc: DsuCrc,
    led: StatusLed,
    config: C,
}

impl<C: Sam0Config> Board for Sam0<C> {
    type Config = C;
    type Transport = C::Transport;

    fn init(mut config: Self::Config) -> Self {
        config.system_init();

        // Safety: init is only called once, and the firmware region is on-chip flash past the bootloader.
        let (flash, crc, led) = unsafe {
            (
                MappedFlash::on_chip(C::LAYOUT.firmware),
                DsuCrc::take(),
                StatusLed::new(C::STATUS_LED_PIN),
            )
        };

        Self { flash, crc, led, config }
    }

    fn can_jump_to_firmware(&mut self) -> BootStatus {
        let layout = C::LAYOUT;
        BootDecision::new(&mut self.flash, &mut self.crc, &layout, C::DEVICE_IDENTIFIER).can_jump_to_firmware()
    }

    unsafe fn jump_to_firmware(&mut self) -> ! {
        let vector_table = C::LAYOUT.firmware_start() as usize as *const u32;
        unsafe { bootload::jump_to_firmware(vector_table) }
    }

    fn set_status_led(&mut self, on: bool) {
        self.led.set(on);
    }

    fn init_transport(&mut self) -> Self::Transport {
        static DESCRIPTORS: StaticCell<DescriptorSection<DESCRIPTOR_COUNT>> = StaticCell::new();
        static WRITE_BACK: StaticCell<DescriptorSection<CHANNEL_COUNT>> = StaticCell::new();
        static DMA: StaticCell<DmaManager> = StaticCell::new();

        let descriptors = DESCRIPTORS.init(DescriptorSection::new());
        let write_back = WRITE_BACK.init(DescriptorSection::new());

        // Safety: the DMAC is only driven through this manager, which is created once.
        let dma = DMA.init(DmaManager::init(unsafe { Dmac::steal() }, descriptors, write_back));

        info!(
            "DMA ready, descriptors @ {:x}, write-back @ {:x}",
            dma.descriptor_section_address(),
            dma.write_back_section_address()
        );

        self.config.transport(dma)
    }
}

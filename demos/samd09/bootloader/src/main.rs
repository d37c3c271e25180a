#![no_std]
#![no_main]

use brickletboot::{BootConfig, BootloaderStatus, FlashLayout, Transport, Version};
use brickletboot_dma::controller::{Priority, TriggerAction};
use brickletboot_dma::{ChannelIndex, Descriptor, DescriptorConfig, DmaResource, DmaResourceConfig, JobStatus};
use brickletboot_sam0::{DmaManager, Sam0, Sam0Config};
#[cfg(feature = "defmt")]
use defmt_rtt as _;
use defmt_or_log::{trace, unwrap, warn};
use panic_probe as _;
use static_cell::StaticCell;

struct Config;

impl BootConfig for Config {
    const LAYOUT: FlashLayout = FlashLayout::BRICKLET_16K;
    const DEVICE_IDENTIFIER: u32 = 2125;
    const BOOTLOADER_VERSION: Version = Version::new(2, 0, 4);
}

#[link_section = ".device_identifier"]
#[used]
static DEVICE_IDENTIFIER: u32 = Config::DEVICE_IDENTIFIER;

#[link_section = ".bootloader_version"]
#[used]
static BOOTLOADER_VERSION: u32 = Config::BOOTLOADER_VERSION.word();

impl Sam0Config for Config {
    const STATUS_LED_PIN: u8 = 16;

    type Transport = SpiEcho;

    fn transport(&mut self, dma: &'static DmaManager) -> Self::Transport {
        SpiEcho::new(dma)
    }
}

const SERCOM0_DATA: u32 = 0x4200_0800 + 0x28;
const SERCOM0_DMAC_ID_RX: u8 = 0x01;
const SERCOM0_DMAC_ID_TX: u8 = 0x02;

const PACKET_SIZE: u16 = 64;

/// Echoes every packet received on SERCOM0 back to the host.
///
/// Stands in for the packet protocol, which moves its buffers the same way.
/// SERCOM0 itself is expected to be set up as SPI by the board.
struct SpiEcho {
    dma: &'static DmaManager,
    rx: &'static DmaResource,
    tx: &'static DmaResource,
}

impl SpiEcho {
    fn new(dma: &'static DmaManager) -> Self {
        static RX: DmaResource = DmaResource::new();
        static TX: DmaResource = DmaResource::new();
        static BUFFER: StaticCell<[u8; PACKET_SIZE as usize]> = StaticCell::new();

        // Only ever accessed by the DMAC from here on.
        let buffer = BUFFER.init([0; PACKET_SIZE as usize]).as_ptr() as u32;

        let rx_channel = unwrap!(dma.allocate_with_config(&RX, &channel_config(SERCOM0_DMAC_ID_RX)));
        let tx_channel = unwrap!(dma.allocate_with_config(&TX, &channel_config(SERCOM0_DMAC_ID_TX)));

        // The DMAC requires the end address of incrementing transfers.
        load(
            dma,
            &RX,
            rx_channel,
            DescriptorConfig {
                src_increment_enable: false,
                source_address: SERCOM0_DATA,
                destination_address: buffer + PACKET_SIZE as u32,
                block_transfer_count: PACKET_SIZE,
                ..Default::default()
            },
        );
        load(
            dma,
            &TX,
            tx_channel,
            DescriptorConfig {
                dst_increment_enable: false,
                source_address: buffer + PACKET_SIZE as u32,
                destination_address: SERCOM0_DATA,
                block_transfer_count: PACKET_SIZE,
                ..Default::default()
            },
        );

        unwrap!(dma.start_job(&RX));

        Self { dma, rx: &RX, tx: &TX }
    }
}

fn channel_config(peripheral_trigger: u8) -> DmaResourceConfig {
    DmaResourceConfig {
        priority: Priority::Level1,
        peripheral_trigger,
        trigger_action: TriggerAction::Beat,
        ..Default::default()
    }
}

/// Place the only descriptor of a job in the slot the DMAC fetches for its channel.
fn load(dma: &DmaManager, resource: &DmaResource, channel: ChannelIndex, config: DescriptorConfig) {
    let slot = unwrap!(dma.descriptor_ref(channel.index()));
    dma.write_descriptor(slot, Descriptor::new(&config));
    unwrap!(dma.append(resource, slot));
}

impl Transport for SpiEcho {
    fn tick(&mut self, status: &mut BootloaderStatus) {
        brickletboot_sam0::on_interrupt(self.dma);

        let next = match (self.rx.job_status(), self.tx.job_status()) {
            (JobStatus::Completed, _) => {
                trace!("Packet received @ {:?} ms", status.system_timer_tick);
                self.rx.set_job_status(JobStatus::Configured);
                self.tx
            }
            (_, JobStatus::Completed) => {
                self.tx.set_job_status(JobStatus::Configured);
                self.rx
            }
            _ => return,
        };

        if let Err(e) = self.dma.start_job(next) {
            warn!("Failed to start DMA job: {:?}", e);
        }
    }
}

#[cortex_m_rt::entry]
fn main() -> ! {
    brickletboot::start::<Sam0<Config>>(Config)
}

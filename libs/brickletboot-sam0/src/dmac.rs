use brickletboot_dma::{
    ChannelCommand, ChannelControl, ChannelIndex, DmaController, DmaResourceManager, ExclusiveRegion, JobStatus,
};
use critical_section::CriticalSection;
use defmt_or_log::{error, trace};

use crate::regs::{dmac, modify_reg, pm, read_reg, write_reg, DMAC, PM};

/// Register level access to the DMA controller.
///
/// Channel registers are banked behind CHID, hence selecting and writing happens under a [CriticalSection].
pub struct Dmac {
    _private: (),
}

impl Dmac {
    /// # Safety
    /// Only one [Dmac] may exist.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }

    fn select(channel: ChannelIndex) {
        write_reg!(dmac, DMAC, CHID, u8::from(channel));
    }
}

impl DmaController for Dmac {
    fn init(&self, _cs: CriticalSection<'_>, descriptor_base: u32, write_back_base: u32) {
        modify_reg!(pm, PM, AHBMASK, DMAC: 1);
        modify_reg!(pm, PM, APBBMASK, DMAC: 1);

        modify_reg!(dmac, DMAC, CTRL, DMAENABLE: 0);
        write_reg!(dmac, DMAC, CTRL, SWRST: 1);

        write_reg!(dmac, DMAC, BASEADDR, descriptor_base);
        write_reg!(dmac, DMAC, WRBADDR, write_back_base);

        // Channel interrupts stay disabled, see [on_interrupt].
        write_reg!(dmac, DMAC, CTRL, DMAENABLE: 1, LVLEN0: 1, LVLEN1: 1, LVLEN2: 1, LVLEN3: 1);
    }

    fn reset_channel(&self, _cs: CriticalSection<'_>, channel: ChannelIndex) {
        Self::select(channel);
        modify_reg!(dmac, DMAC, CHCTRLA, ENABLE: 0);
        write_reg!(dmac, DMAC, CHCTRLA, SWRST: 1);
    }

    fn configure_channel(&self, _cs: CriticalSection<'_>, channel: ChannelIndex, control: ChannelControl) {
        Self::select(channel);
        modify_reg!(dmac, DMAC, SWTRIGCTRL, |v: u32| v & !channel.mask());
        write_reg!(dmac, DMAC, CHCTRLB, control.bits());
    }

    fn enable_channel(&self, _cs: CriticalSection<'_>, channel: ChannelIndex) {
        Self::select(channel);
        modify_reg!(dmac, DMAC, CHCTRLA, ENABLE: 1);
    }

    fn send_command(&self, _cs: CriticalSection<'_>, channel: ChannelIndex, command: ChannelCommand) {
        Self::select(channel);
        modify_reg!(dmac, DMAC, CHCTRLB, CMD: u8::from(command) as u32);
    }

    fn is_busy(&self, channel: ChannelIndex) -> bool {
        let busy = read_reg!(dmac, DMAC, BUSYCH);
        busy & channel.mask() != 0
    }
}

/// Service the highest priority pending channel, if any.
///
/// Channel interrupts are never enabled, so this is polled, typically from the transport tick.
/// Transfer complete and suspend are recorded on the owning resource.
/// Transfer errors are logged and left for the owner to notice through the write-back descriptor.
pub fn on_interrupt<const N: usize, const D: usize>(manager: &DmaResourceManager<'_, Dmac, N, D>) {
    let (channel, pending) = {
        let _region = ExclusiveRegion::enter();
        let (id, terr, tcmpl, susp) = read_reg!(dmac, DMAC, INTPEND, ID, TERR, TCMPL, SUSP);

        // Writing the flags back with the channel ID clears them.
        write_reg!(dmac, DMAC, INTPEND, ID: id, TERR: terr, TCMPL: tcmpl, SUSP: susp);
        (ChannelIndex::new(id as u8), Pending { terr, tcmpl, susp })
    };

    let Some(resource) = manager.resource(channel) else {
        trace!("Interrupt for unowned DMA channel {:?}", channel);
        return;
    };

    if pending.terr != 0 {
        error!("DMA transfer error on {:?}", channel);
    }

    if pending.tcmpl != 0 {
        resource.set_job_status(JobStatus::Completed);
    } else if pending.susp != 0 {
        resource.set_job_status(JobStatus::Suspended);
    }
}

/// Channel flags taken from INTPEND.
struct Pending {
    terr: u16,
    tcmpl: u16,
    susp: u16,
}

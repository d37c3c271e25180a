use core::ops::Range;

use brickletboot::Crc32Engine;
use embedded_storage::nor_flash::ReadNorFlash;

use crate::regs::{dsu, modify_reg, pac1, pm, read_reg, write_reg, DSU, PAC1, PM};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DsuError {
    /// The DSU hit a bus error whilst reading the range.
    BusError,
}

/// CRC-32 computed by the Device Service Unit, straight from the memory map.
///
/// The flash handed to [Crc32Engine::running_crc] is not read; the range holds addresses.
pub struct DsuCrc {
    _private: (),
}

impl DsuCrc {
    /// Unlock the DSU and enable its bus clock.
    ///
    /// # Safety
    /// Only one [DsuCrc] may exist.
    pub unsafe fn take() -> Self {
        write_reg!(pac1, PAC1, WPCLR, DSU: 1);
        modify_reg!(pm, PM, APBBMASK, DSU: 1);
        Self { _private: () }
    }
}

impl<F: ReadNorFlash> Crc32Engine<F> for DsuCrc {
    type Error = DsuError;

    fn running_crc(&mut self, _flash: &mut F, range: Range<u32>) -> Result<u32, Self::Error> {
        write_reg!(dsu, DSU, STATUSA, DONE: 1, BERR: 1);

        write_reg!(dsu, DSU, DATA, 0xFFFF_FFFF);
        write_reg!(dsu, DSU, ADDR, range.start);
        write_reg!(dsu, DSU, LENGTH, range.end - range.start);
        write_reg!(dsu, DSU, CTRL, CRC: 1);

        while read_reg!(dsu, DSU, STATUSA, DONE == 0) {}

        let bus_error = read_reg!(dsu, DSU, STATUSA, BERR == 1);
        write_reg!(dsu, DSU, STATUSA, DONE: 1, BERR: 1);

        if bus_error {
            return Err(DsuError::BusError);
        }

        let crc = read_reg!(dsu, DSU, DATA);
        Ok(crc)
    }
}

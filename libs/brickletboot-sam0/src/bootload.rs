use defmt_or_log::info;

/// Table offset bits of VTOR.
const VTOR_TBLOFF_MASK: u32 = 0xFFFF_FF80;

/// Register values for handing control to a firmware, derived from its vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Handoff {
    /// Initial main stack pointer, the first vector table word.
    pub stack_pointer: u32,
    /// Value for VTOR.
    pub vector_table: u32,
    /// Reset handler, the second vector table word.
    pub reset_vector: u32,
}

impl Handoff {
    pub fn new(vector_table_address: u32, vector_table: [u32; 2]) -> Self {
        Self {
            stack_pointer: vector_table[0],
            vector_table: vector_table_address & VTOR_TBLOFF_MASK,
            reset_vector: vector_table[1],
        }
    }

    /// Read the first two vector table words of a firmware.
    ///
    /// # Safety
    /// `vector_table` must point to two readable words.
    pub unsafe fn read(vector_table: *const u32) -> Self {
        let words = unsafe { [vector_table.read_volatile(), vector_table.add(1).read_volatile()] };
        Self::new(vector_table as usize as u32, words)
    }
}

/// Jump to the firmware whose vector table is at `vector_table`.
///
/// Sets the main stack pointer, then VTOR, then branches to the reset handler.
/// Nothing is dropped, the bootloader stack is abandoned.
///
/// # Safety
/// The vector table must belong to a validated firmware image for this chip.
pub unsafe fn jump_to_firmware(vector_table: *const u32) -> ! {
    let handoff = unsafe { Handoff::read(vector_table) };
    info!("Jumping to firmware: {:?}", handoff);

    unsafe { jump(handoff) }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
unsafe fn jump(handoff: Handoff) -> ! {
    use cortex_m::peripheral::SCB;

    // A single block, as nothing may touch the stack after MSP is replaced.
    unsafe {
        let vtor = core::ptr::addr_of!((*SCB::PTR).vtor);
        core::arch::asm!(
            "msr msp, {sp}",
            "str {table}, [{vtor}]",
            "dsb",
            "isb",
            "bx {reset}",
            sp = in(reg) handoff.stack_pointer,
            table = in(reg) handoff.vector_table,
            vtor = in(reg) vtor,
            reset = in(reg) handoff.reset_vector,
            options(noreturn),
        )
    }
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
unsafe fn jump(_handoff: Handoff) -> ! {
    defmt_or_log::panic!("Firmware can only be jumped to on target")
}

//! The handful of SAM D09/D10 peripheral registers the bootloader touches.
//!
//! Register blocks are laid out for the `ral_registers` macros: every register is a field of a
//! `#[repr(C)]` block, and every bit field a module holding its `offset` and `mask`.

#![allow(non_snake_case, non_upper_case_globals)]

pub(crate) use ral_registers::{modify_reg, read_reg, write_reg};

/// Pointer to the register block of a peripheral.
pub(crate) struct Static<T>(*const T);

impl<T> core::ops::Deref for Static<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        // Safety: only constructed below, for peripheral memory that is always mapped.
        unsafe { &*self.0 }
    }
}

impl<T> Clone for Static<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Static<T> {}

/// Bit fields of a register.
macro_rules! fields {
    ($ty:ty => $( $field:ident: $offset:expr, $width:expr; )+) => {
        $(
            pub mod $field {
                pub const offset: $ty = $offset;
                pub const mask: $ty = (((1 as $ty) << $width) - 1) << offset;
                pub mod R {}
                pub mod W {}
                pub mod RW {}
            }
        )+
    };
}

pub(crate) const PAC1: Static<pac1::RegisterBlock> = Static(0x4100_0000 as *const _);
pub(crate) const PM: Static<pm::RegisterBlock> = Static(0x4000_0400 as *const _);
pub(crate) const DSU: Static<dsu::RegisterBlock> = Static(0x4100_2000 as *const _);
pub(crate) const DMAC: Static<dmac::RegisterBlock> = Static(0x4100_4800 as *const _);
pub(crate) const PORT: Static<port::RegisterBlock> = Static(0x4100_4400 as *const _);

/// Peripheral access controller of bridge B.
pub(crate) mod pac1 {
    use ral_registers::RWRegister;

    #[repr(C)]
    pub struct RegisterBlock {
        pub WPCLR: RWRegister<u32>,
    }

    pub mod WPCLR {
        fields!(u32 => DSU: 1, 1;);
    }
}

/// Power manager, for the bus clock masks.
pub(crate) mod pm {
    use ral_registers::RWRegister;

    #[repr(C)]
    pub struct RegisterBlock {
        _reserved0: [u8; 0x14],
        pub AHBMASK: RWRegister<u32>,
        _reserved1: [u8; 0x04],
        pub APBBMASK: RWRegister<u32>,
    }

    pub mod AHBMASK {
        fields!(u32 => DMAC: 5, 1;);
    }

    pub mod APBBMASK {
        fields!(u32 =>
            DSU: 1, 1;
            DMAC: 4, 1;
        );
    }
}

/// Device service unit, for its memory CRC.
pub(crate) mod dsu {
    use ral_registers::{RWRegister, WORegister};

    #[repr(C)]
    pub struct RegisterBlock {
        pub CTRL: WORegister<u8>,
        pub STATUSA: RWRegister<u8>,
        _reserved0: [u8; 0x02],
        pub ADDR: RWRegister<u32>,
        pub LENGTH: RWRegister<u32>,
        pub DATA: RWRegister<u32>,
    }

    pub mod CTRL {
        fields!(u8 => CRC: 2, 1;);
    }

    pub mod STATUSA {
        fields!(u8 =>
            DONE: 0, 1;
            BERR: 2, 1;
        );
    }
}

/// DMA controller, with the channel registers banked behind CHID.
pub(crate) mod dmac {
    use ral_registers::{RORegister, RWRegister};

    #[repr(C)]
    pub struct RegisterBlock {
        pub CTRL: RWRegister<u16>,
        _reserved0: [u8; 0x0E],
        pub SWTRIGCTRL: RWRegister<u32>,
        _reserved1: [u8; 0x0C],
        pub INTPEND: RWRegister<u16>,
        _reserved2: [u8; 0x06],
        pub BUSYCH: RORegister<u32>,
        _reserved3: [u8; 0x08],
        pub BASEADDR: RWRegister<u32>,
        pub WRBADDR: RWRegister<u32>,
        _reserved4: [u8; 0x03],
        pub CHID: RWRegister<u8>,
        pub CHCTRLA: RWRegister<u8>,
        _reserved5: [u8; 0x03],
        pub CHCTRLB: RWRegister<u32>,
    }

    pub mod CTRL {
        fields!(u16 =>
            SWRST: 0, 1;
            DMAENABLE: 1, 1;
            LVLEN0: 8, 1;
            LVLEN1: 9, 1;
            LVLEN2: 10, 1;
            LVLEN3: 11, 1;
        );
    }

    pub mod INTPEND {
        fields!(u16 =>
            ID: 0, 4;
            TERR: 8, 1;
            TCMPL: 9, 1;
            SUSP: 10, 1;
        );
    }

    pub mod CHCTRLA {
        fields!(u8 =>
            SWRST: 0, 1;
            ENABLE: 1, 1;
        );
    }

    pub mod CHCTRLB {
        fields!(u32 => CMD: 24, 2;);
    }
}

/// Port group A.
pub(crate) mod port {
    use ral_registers::{RWRegister, WORegister};

    #[repr(C)]
    pub struct RegisterBlock {
        _reserved0: [u8; 0x08],
        pub DIRSET: RWRegister<u32>,
        _reserved1: [u8; 0x08],
        pub OUTCLR: RWRegister<u32>,
        pub OUTSET: RWRegister<u32>,
        _reserved2: [u8; 0x0C],
        pub WRCONFIG: WORegister<u32>,
    }

    pub mod WRCONFIG {
        fields!(u32 =>
            PINMASK: 0, 16;
            WRPMUX: 28, 1;
            WRPINCFG: 30, 1;
            HWSEL: 31, 1;
        );
    }
}

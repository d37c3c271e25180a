use crate::regs::{port, write_reg, PORT};

/// Active low status LED on port group A.
pub struct StatusLed {
    pins: u32,
}

impl StatusLed {
    /// Configure `pin` as a GPIO output and switch the LED off.
    ///
    /// # Safety
    /// The pin must not be used by anything else.
    pub unsafe fn new(pin: u8) -> Self {
        let pins = 1u32 << pin;

        // WRCONFIG can only address half of the port at a time.
        write_reg!(port, PORT, WRCONFIG, PINMASK: pins & 0xFFFF, WRPMUX: 1, WRPINCFG: 1);
        write_reg!(port, PORT, WRCONFIG, PINMASK: pins >> 16, WRPMUX: 1, WRPINCFG: 1, HWSEL: 1);

        write_reg!(port, PORT, DIRSET, pins);
        write_reg!(port, PORT, OUTSET, pins);

        Self { pins }
    }

    pub fn set(&mut self, on: bool) {
        if on {
            write_reg!(port, PORT, OUTCLR, self.pins);
        } else {
            write_reg!(port, PORT, OUTSET, self.pins);
        }
    }
}

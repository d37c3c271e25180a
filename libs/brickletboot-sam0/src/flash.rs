use core::fmt::Display;
use core::ops::Range;

use embedded_storage::nor_flash::{ErrorType, NorFlashError, NorFlashErrorKind, ReadNorFlash};

/// Read access to a window of memory mapped flash, addressed by absolute address.
pub struct MappedFlash {
    base: *const u8,
    window: Range<u32>,
}

impl MappedFlash {
    /// Expose `window`, which starts at `base` in the address space of the core.
    ///
    /// # Safety
    /// `base` must point to `window.len()` bytes that stay readable and unchanged whilst this value exists.
    pub unsafe fn new(base: *const u8, window: Range<u32>) -> Self {
        Self { base, window }
    }

    /// Expose a window of the on-chip flash, which is mapped at address 0.
    ///
    /// # Safety
    /// See [MappedFlash::new]; the window must not include address 0.
    pub unsafe fn on_chip(window: Range<u32>) -> Self {
        unsafe { Self::new(window.start as usize as *const u8, window) }
    }
}

impl ErrorType for MappedFlash {
    type Error = MappedFlashError;
}

impl ReadNorFlash for MappedFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let Some(end) = offset.checked_add(bytes.len() as u32) else {
            return Err(MappedFlashError::OutOfBounds);
        };

        if offset < self.window.start || end > self.window.end {
            return Err(MappedFlashError::OutOfBounds);
        }

        // Safety: within the window guaranteed readable by the constructor.
        unsafe {
            let source = self.base.add((offset - self.window.start) as usize);
            core::ptr::copy_nonoverlapping(source, bytes.as_mut_ptr(), bytes.len());
        }

        Ok(())
    }

    /// Size of the window; offsets start at its first address, not at 0.
    fn capacity(&self) -> usize {
        (self.window.end - self.window.start) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MappedFlashError {
    /// Read outside of the mapped window.
    OutOfBounds,
}

impl Display for MappedFlashError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "out of bounds")
    }
}

impl NorFlashError for MappedFlashError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::OutOfBounds
    }
}

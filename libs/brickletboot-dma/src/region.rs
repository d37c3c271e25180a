//! Exclusive regions around the shared DMA state.

use core::marker::PhantomData;

use critical_section::{CriticalSection, RestoreState};

/// Guard holding the single-core exclusive region.
///
/// On target this keeps interrupts disabled from [ExclusiveRegion::enter] until the guard is dropped,
/// which also happens on early returns and `?` propagation.
/// Regions nest: an inner region restores the state its outer region left behind.
///
/// Guards must be dropped in the reverse order of entering, which scoped use guarantees.
pub struct ExclusiveRegion {
    restore: RestoreState,
    /// Bound to the execution context that entered it.
    _not_send: PhantomData<*const ()>,
}

impl ExclusiveRegion {
    /// Enter the exclusive region.
    pub fn enter() -> Self {
        // Safety: the state is released exactly once, when the guard is dropped.
        let restore = unsafe { critical_section::acquire() };
        Self {
            restore,
            _not_send: PhantomData,
        }
    }

    /// Token to borrow data guarded by a [critical_section::Mutex] whilst this region is held.
    pub fn token(&self) -> CriticalSection<'_> {
        // Safety: the token cannot outlive the borrow of the guard, and the region is held until the guard drops.
        unsafe { CriticalSection::new() }
    }
}

impl Drop for ExclusiveRegion {
    fn drop(&mut self) {
        // Safety: paired with the acquire in `enter`.
        unsafe { critical_section::release(self.restore) }
    }
}

//! DMA channel resource management for the brickletboot transport.
//!
//! Channels are handed out from a [bitmap::ChannelBitmap], transfers are described by
//! chains of [descriptor::Descriptor]s living in a statically reserved [descriptor::DescriptorSection],
//! and the [manager::DmaResourceManager] ties both to the hardware behind a [controller::DmaController].
//!
//! All shared state is mutated inside an [region::ExclusiveRegion].
#![cfg_attr(not(feature = "_test"), no_std)]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod bitmap;
pub mod controller;
pub mod descriptor;
pub mod manager;
#[cfg(any(test, feature = "_test"))]
pub mod mock;
pub mod region;

pub use bitmap::{ChannelBitmap, ChannelIndex};
pub use controller::{ChannelCommand, ChannelControl, DmaController, DmaResourceConfig};
pub use descriptor::{Descriptor, DescriptorConfig, DescriptorRef, DescriptorSection};
pub use manager::{DmaResource, DmaResourceManager, JobStatus, MAX_JOB_RESUME_COUNT};
pub use region::ExclusiveRegion;

/// Errors yielded by the DMA resource lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaError {
    /// Every hardware channel is already allocated.
    ResourceExhausted,

    /// The channel is busy, either according to the hardware or to the job status.
    Busy,

    /// The resource does not own an allocated channel.
    NotInitialized,

    /// The channel did not report busy within [MAX_JOB_RESUME_COUNT] polls after a resume.
    Timeout,
}

use crate::DmaError;

/// Index of a hardware DMA channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelIndex(u8);

impl ChannelIndex {
    /// Highest channel count a [ChannelBitmap] can track.
    pub const MAX_CHANNELS: usize = 32;

    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Bit of this channel in channel-wide registers and in [ChannelBitmap].
    pub const fn mask(self) -> u32 {
        1 << self.0
    }
}

impl From<ChannelIndex> for u8 {
    fn from(val: ChannelIndex) -> Self {
        val.0
    }
}

impl core::fmt::Display for ChannelIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "CH{}", self.0)
    }
}

/// Tracks which of the `N` hardware channels are in use.
///
/// Invariant: `free_count == N - allocated.count_ones()`.
///
/// The bitmap is plain data; callers keep it inside an [crate::ExclusiveRegion]
/// as interrupt handlers may allocate and free as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBitmap<const N: usize> {
    allocated: u32,
    free_count: u8,
}

impl<const N: usize> Default for ChannelBitmap<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ChannelBitmap<N> {
    pub const fn new() -> Self {
        const {
            assert!(N > 0 && N <= ChannelIndex::MAX_CHANNELS, "channel count out of range");
        }

        Self {
            allocated: 0,
            free_count: N as u8,
        }
    }

    /// Allocate the lowest free channel.
    pub fn allocate(&mut self) -> Result<ChannelIndex, DmaError> {
        let channel = (0..N as u8)
            .map(ChannelIndex::new)
            .find(|channel| self.allocated & channel.mask() == 0)
            .ok_or(DmaError::ResourceExhausted)?;

        self.allocated |= channel.mask();
        self.free_count -= 1;
        Ok(channel)
    }

    /// Release a channel.
    ///
    /// Does not check whether the channel was allocated, that is up to the caller.
    pub fn free(&mut self, channel: ChannelIndex) {
        self.allocated &= !channel.mask();
        self.free_count += 1;
    }

    pub fn is_allocated(&self, channel: ChannelIndex) -> bool {
        self.allocated & channel.mask() != 0
    }

    /// Number of channels still available.
    pub fn free_count(&self) -> u8 {
        self.free_count
    }

    /// Raw bitset, bit `n` set for allocated channel `n`.
    pub fn allocated(&self) -> u32 {
        self.allocated
    }
}

//! Transfer descriptors and the statically reserved memory they live in.
//!
//! A [Descriptor] has the exact memory layout the SAM0 DMAC fetches:
//! block transfer control, block transfer count, source, destination and next descriptor address.
//! Chains are linked through the hardware next-address word, but are addressed from Rust
//! by [DescriptorRef] indices into a [DescriptorSection].

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// When the channel strobes its event output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum EventOutputSelection {
    /// Event generation disabled.
    Disable = 0,
    /// Event strobe when a block transfer completes.
    Block = 1,
    /// Event strobe on every beat transfer.
    Beat = 3,
}

/// Action taken when a block transfer completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BlockAction {
    /// Disable the channel if this was the last block.
    NoAction = 0,
    /// As [BlockAction::NoAction], and raise the transfer complete interrupt.
    Interrupt = 1,
    /// Suspend the channel.
    Suspend = 2,
    /// Suspend the channel and raise the transfer complete interrupt.
    Both = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BeatSize {
    Byte = 0,
    HalfWord = 1,
    Word = 2,
}

/// Which side of the transfer the address step size applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StepSelection {
    Destination = 0,
    Source = 1,
}

/// Address increment in multiples of the beat size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StepSize {
    X1 = 0,
    X2 = 1,
    X4 = 2,
    X8 = 3,
    X16 = 4,
    X32 = 5,
    X64 = 6,
    X128 = 7,
}

/// Everything needed to fill in a [Descriptor].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DescriptorConfig {
    pub descriptor_valid: bool,
    pub event_output_selection: EventOutputSelection,
    pub block_action: BlockAction,
    pub beat_size: BeatSize,
    pub src_increment_enable: bool,
    pub dst_increment_enable: bool,
    pub step_selection: StepSelection,
    pub step_size: StepSize,
    /// Number of beats in the block.
    pub block_transfer_count: u16,
    /// Source address; when incrementing this is the address one past the end of the block.
    pub source_address: u32,
    /// Destination address; when incrementing this is the address one past the end of the block.
    pub destination_address: u32,
    /// Hardware address of the next descriptor, 0 to end the chain.
    ///
    /// Usually left 0, with chains built by [DescriptorSection::link] or by appending to a job.
    pub next_descriptor_address: u32,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            descriptor_valid: true,
            event_output_selection: EventOutputSelection::Disable,
            block_action: BlockAction::NoAction,
            beat_size: BeatSize::Byte,
            src_increment_enable: true,
            dst_increment_enable: true,
            step_selection: StepSelection::Destination,
            step_size: StepSize::X1,
            block_transfer_count: 0,
            source_address: 0,
            destination_address: 0,
            next_descriptor_address: 0,
        }
    }
}

/// DMA transfer descriptor, laid out as fetched by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C, align(16))]
pub struct Descriptor {
    btctrl: u16,
    btcnt: u16,
    srcaddr: u32,
    dstaddr: u32,
    descaddr: u32,
}

impl Descriptor {
    const BTCTRL_VALID: u16 = 1 << 0;
    const BTCTRL_EVOSEL_POS: u16 = 1;
    const BTCTRL_BLOCKACT_POS: u16 = 3;
    const BTCTRL_BEATSIZE_POS: u16 = 8;
    const BTCTRL_SRCINC: u16 = 1 << 10;
    const BTCTRL_DSTINC: u16 = 1 << 11;
    const BTCTRL_STEPSEL: u16 = 1 << 12;
    const BTCTRL_STEPSIZE_POS: u16 = 13;

    /// Descriptor with every field cleared, which the hardware treats as invalid.
    pub const EMPTY: Self = Self {
        btctrl: 0,
        btcnt: 0,
        srcaddr: 0,
        dstaddr: 0,
        descaddr: 0,
    };

    /// Fill in a descriptor from its configuration.
    ///
    /// The descriptor links to [DescriptorConfig::next_descriptor_address].
    pub fn new(config: &DescriptorConfig) -> Self {
        let mut btctrl = (u8::from(config.event_output_selection) as u16) << Self::BTCTRL_EVOSEL_POS
            | (u8::from(config.block_action) as u16) << Self::BTCTRL_BLOCKACT_POS
            | (u8::from(config.beat_size) as u16) << Self::BTCTRL_BEATSIZE_POS
            | (u8::from(config.step_size) as u16) << Self::BTCTRL_STEPSIZE_POS;

        if config.descriptor_valid {
            btctrl |= Self::BTCTRL_VALID;
        }
        if config.src_increment_enable {
            btctrl |= Self::BTCTRL_SRCINC;
        }
        if config.dst_increment_enable {
            btctrl |= Self::BTCTRL_DSTINC;
        }
        if config.step_selection == StepSelection::Source {
            btctrl |= Self::BTCTRL_STEPSEL;
        }

        Self {
            btctrl,
            btcnt: config.block_transfer_count,
            srcaddr: config.source_address,
            dstaddr: config.destination_address,
            descaddr: config.next_descriptor_address,
        }
    }

    /// Raw block transfer control word.
    pub fn block_transfer_control(&self) -> u16 {
        self.btctrl
    }

    pub fn is_valid(&self) -> bool {
        self.btctrl & Self::BTCTRL_VALID != 0
    }

    /// Beats remaining in the block, as reported in a write-back descriptor.
    pub fn block_transfer_count(&self) -> u16 {
        self.btcnt
    }

    pub fn source_address(&self) -> u32 {
        self.srcaddr
    }

    pub fn destination_address(&self) -> u32 {
        self.dstaddr
    }

    /// Raw hardware address of the next descriptor, 0 for the end of a chain.
    pub fn next_address(&self) -> u32 {
        self.descaddr
    }
}

/// Reference to a [Descriptor] slot within a [DescriptorSection].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DescriptorRef(u8);

impl DescriptorRef {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Statically reserved, 128-bit aligned block of `D` descriptors.
///
/// The DMAC fetches the first descriptor of channel `n` from slot `n` of the section
/// programmed as its descriptor base address; further slots can hold chained descriptors.
/// The same type is used for the write-back section, which the DMAC writes to.
///
/// The section must not move after descriptors have been linked,
/// as links hold the hardware address of their successor.
#[repr(C, align(16))]
pub struct DescriptorSection<const D: usize> {
    descriptors: [Descriptor; D],
}

impl<const D: usize> Default for DescriptorSection<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> DescriptorSection<D> {
    pub const fn new() -> Self {
        const {
            assert!(D > 0 && D <= u8::MAX as usize + 1, "descriptor count out of range");
        }

        Self {
            descriptors: [Descriptor::EMPTY; D],
        }
    }

    /// Reference to slot `index`, if it exists in this section.
    pub fn reference(&self, index: usize) -> Option<DescriptorRef> {
        (index < D).then_some(DescriptorRef(index as u8))
    }

    /// Address of the section as seen from the DMA bus.
    pub fn base_address(&self) -> u32 {
        self.descriptors.as_ptr() as usize as u32
    }

    /// Address of a slot as seen from the DMA bus.
    pub fn address_of(&self, descriptor: DescriptorRef) -> u32 {
        self.base_address()
            .wrapping_add((descriptor.index() * core::mem::size_of::<Descriptor>()) as u32)
    }

    pub(crate) fn as_ptr(&self) -> *const Descriptor {
        self.descriptors.as_ptr()
    }

    /// Get a copy of a descriptor.
    ///
    /// Panics if the reference was created for a larger section.
    pub fn get(&self, descriptor: DescriptorRef) -> Descriptor {
        self.descriptors[descriptor.index()]
    }

    /// Overwrite the slot, replacing its link with the one of `value`.
    pub fn set(&mut self, descriptor: DescriptorRef, value: Descriptor) {
        self.descriptors[descriptor.index()] = value;
    }

    /// Successor of a descriptor, decoded from its hardware next-address word.
    pub fn next(&self, descriptor: DescriptorRef) -> Option<DescriptorRef> {
        let address = self.descriptors[descriptor.index()].descaddr;
        if address == 0 {
            return None;
        }

        let index = address.wrapping_sub(self.base_address()) as usize / core::mem::size_of::<Descriptor>();
        self.reference(index)
    }

    /// Make `next` the successor of `descriptor`.
    pub fn link(&mut self, descriptor: DescriptorRef, next: DescriptorRef) {
        let address = self.address_of(next);
        self.descriptors[descriptor.index()].descaddr = address;
    }

    /// Walk the chain from `head` to its last descriptor.
    ///
    /// The chain must be acyclic: a cycle makes this walk forever.
    pub fn tail(&self, head: DescriptorRef) -> DescriptorRef {
        let mut descriptor = head;
        while let Some(next) = self.next(descriptor) {
            descriptor = next;
        }
        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        assert_eq!(core::mem::size_of::<Descriptor>(), 16);
        assert_eq!(core::mem::align_of::<Descriptor>(), 16);

        let section = DescriptorSection::<4>::new();
        assert_eq!(section.base_address() % 16, 0);
        assert_eq!(
            section.address_of(DescriptorRef(3)).wrapping_sub(section.base_address()),
            48
        );
    }

    #[test]
    fn create_from_config() {
        let config = DescriptorConfig {
            descriptor_valid: true,
            event_output_selection: EventOutputSelection::Beat,
            block_action: BlockAction::Interrupt,
            beat_size: BeatSize::Word,
            src_increment_enable: false,
            dst_increment_enable: true,
            step_selection: StepSelection::Source,
            step_size: StepSize::X4,
            block_transfer_count: 64,
            source_address: 0x4200_0828,
            destination_address: 0x2000_0100,
            next_descriptor_address: 0,
        };
        let descriptor = Descriptor::new(&config);

        // VALID | EVOSEL=3 | BLOCKACT=1 | BEATSIZE=2 | DSTINC | STEPSEL | STEPSIZE=2
        assert_eq!(descriptor.block_transfer_control(), 0x1 | 0x6 | 0x8 | 0x200 | 0x800 | 0x1000 | 0x4000);
        assert!(descriptor.is_valid());
        assert_eq!(descriptor.block_transfer_count(), 64);
        assert_eq!(descriptor.source_address(), 0x4200_0828);
        assert_eq!(descriptor.destination_address(), 0x2000_0100);
        assert_eq!(descriptor.next_address(), 0);
    }

    #[test]
    fn default_config() {
        let descriptor = Descriptor::new(&DescriptorConfig::default());
        assert_eq!(descriptor.block_transfer_control(), 0x1 | 0x400 | 0x800);
    }

    #[test]
    fn link_and_walk() {
        let mut section = DescriptorSection::<4>::new();
        let a = section.reference(0).unwrap();
        let b = section.reference(3).unwrap();
        let c = section.reference(1).unwrap();

        assert_eq!(section.next(a), None);
        assert_eq!(section.tail(a), a);

        section.link(a, b);
        section.link(b, c);
        assert_eq!(section.get(a).next_address(), section.address_of(b));
        assert_eq!(section.next(a), Some(b));
        assert_eq!(section.next(b), Some(c));
        assert_eq!(section.next(c), None);
        assert_eq!(section.tail(a), c);

        // Re-creating a slot unlinks it.
        section.set(b, Descriptor::new(&DescriptorConfig::default()));
        assert_eq!(section.tail(a), b);
    }

    #[test]
    fn linked_from_config() {
        let mut section = DescriptorSection::<4>::new();
        let a = section.reference(2).unwrap();
        let b = section.reference(1).unwrap();

        let config = DescriptorConfig {
            next_descriptor_address: section.address_of(b),
            ..Default::default()
        };
        section.set(a, Descriptor::new(&config));
        section.set(b, Descriptor::new(&DescriptorConfig::default()));

        assert_eq!(section.get(a).next_address(), section.address_of(b));
        assert_eq!(section.next(a), Some(b));
        assert_eq!(section.tail(a), b);
    }

    #[test]
    fn reference_bounds() {
        let section = DescriptorSection::<2>::new();
        assert!(section.reference(1).is_some());
        assert!(section.reference(2).is_none());
    }
}

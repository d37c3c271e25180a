//! Channel lifecycle: `Free → Configured → Running ⇄ Suspended → (Completed | Error) → Free`.

use core::cell::RefCell;
use core::marker::PhantomData;

use critical_section::Mutex;
use defmt_or_log::{debug, trace, warn};

use crate::bitmap::{ChannelBitmap, ChannelIndex};
use crate::controller::{ChannelCommand, ChannelControl, DmaController, DmaResourceConfig};
use crate::descriptor::{Descriptor, DescriptorRef, DescriptorSection};
use crate::region::ExclusiveRegion;
use crate::DmaError;

/// Number of busy flag polls after a resume command before giving up.
///
/// This is a loop bound, not a duration.
pub const MAX_JOB_RESUME_COUNT: u32 = 10_000;

/// Status of the job on a [DmaResource].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JobStatus {
    /// No channel is owned.
    Free,
    /// Owner is still assembling the descriptor chain.
    ///
    /// Never set by the manager; owners record it with [DmaResource::set_job_status]
    /// whilst building a chain across several calls.
    Configuring,
    /// Channel allocated and configured, not started.
    Configured,
    Running,
    Suspended,
    Completed,
    Error(DmaError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResourceState {
    channel: Option<ChannelIndex>,
    descriptor_head: Option<DescriptorRef>,
    job_status: JobStatus,
}

/// A DMA job owned by a transport collaborator.
///
/// The owner creates it, typically in a `static`, and hands it to [DmaResourceManager::allocate_with_config].
/// Its state is shared with interrupt handlers and is only accessed inside an exclusive region.
pub struct DmaResource {
    state: Mutex<RefCell<ResourceState>>,
}

impl Default for DmaResource {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaResource {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(ResourceState {
                channel: None,
                descriptor_head: None,
                job_status: JobStatus::Free,
            })),
        }
    }

    fn state(&self, region: &ExclusiveRegion) -> ResourceState {
        *self.state.borrow_ref(region.token())
    }

    fn update<R>(&self, region: &ExclusiveRegion, f: impl FnOnce(&mut ResourceState) -> R) -> R {
        f(&mut self.state.borrow_ref_mut(region.token()))
    }

    /// Channel owned by this resource, if any.
    pub fn channel(&self) -> Option<ChannelIndex> {
        self.state(&ExclusiveRegion::enter()).channel
    }

    /// First descriptor of the chain attached to this resource.
    pub fn descriptor_head(&self) -> Option<DescriptorRef> {
        self.state(&ExclusiveRegion::enter()).descriptor_head
    }

    pub fn job_status(&self) -> JobStatus {
        self.state(&ExclusiveRegion::enter()).job_status
    }

    /// Record a status observed outside the manager, like completion or suspension flagged by the hardware.
    pub fn set_job_status(&self, job_status: JobStatus) {
        self.update(&ExclusiveRegion::enter(), |state| state.job_status = job_status);
    }
}

impl core::fmt::Debug for DmaResource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state(&ExclusiveRegion::enter());
        f.debug_struct("DmaResource")
            .field("channel", &state.channel)
            .field("descriptor_head", &state.descriptor_head)
            .field("job_status", &state.job_status)
            .finish()
    }
}

/// State in the mutual exclusion domain, besides the channel registers themselves.
struct Shared<'r, const N: usize, const D: usize> {
    bitmap: ChannelBitmap<N>,
    /// Owner of every allocated channel.
    active: [Option<&'r DmaResource>; N],
    descriptors: &'r mut DescriptorSection<D>,
}

/// Owner of the `N` DMA channels and of the `D` slot descriptor section.
///
/// Created once at startup and shared by reference with every collaborator,
/// including interrupt handlers.
pub struct DmaResourceManager<'r, C, const N: usize, const D: usize> {
    controller: C,
    shared: Mutex<RefCell<Shared<'r, N, D>>>,
    descriptor_base: u32,
    /// Written by the hardware, hence only read volatile.
    write_back: *const Descriptor,
    write_back_base: u32,
    _write_back: PhantomData<&'r mut DescriptorSection<N>>,
}

// Safety: the write-back pointer is derived from an exclusive borrow that lives for 'r,
// and is only ever read through volatile reads.
unsafe impl<C: Sync, const N: usize, const D: usize> Sync for DmaResourceManager<'_, C, N, D> {}
// Safety: see above.
unsafe impl<C: Send, const N: usize, const D: usize> Send for DmaResourceManager<'_, C, N, D> {}

impl<'r, C: DmaController, const N: usize, const D: usize> DmaResourceManager<'r, C, N, D> {
    /// Take ownership of the controller and the two reserved sections and initialize the hardware.
    pub fn init(
        controller: C,
        descriptors: &'r mut DescriptorSection<D>,
        write_back: &'r mut DescriptorSection<N>,
    ) -> Self {
        const {
            assert!(D >= N, "every channel needs its first descriptor slot");
        }

        let descriptor_base = descriptors.base_address();
        let write_back_base = write_back.base_address();

        {
            let region = ExclusiveRegion::enter();
            controller.init(region.token(), descriptor_base, write_back_base);
        }

        debug!(
            "DMA initialized with {:?} channels, descriptors @ {:x}, write-back @ {:x}",
            N, descriptor_base, write_back_base
        );

        Self {
            controller,
            shared: Mutex::new(RefCell::new(Shared {
                bitmap: ChannelBitmap::new(),
                active: [None; N],
                descriptors,
            })),
            descriptor_base,
            write_back: write_back.as_ptr(),
            write_back_base,
            _write_back: PhantomData,
        }
    }

    /// Base address of the descriptor section, for the DMAC descriptor base register.
    pub fn descriptor_section_address(&self) -> u32 {
        self.descriptor_base
    }

    /// Base address of the write-back section, for the DMAC write-back base register.
    pub fn write_back_section_address(&self) -> u32 {
        self.write_back_base
    }

    /// The controller driven by this manager.
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Allocate the lowest free channel for `resource` and configure it.
    ///
    /// Fails with [DmaError::Busy] when the resource already owns a channel,
    /// and with [DmaError::ResourceExhausted] when none is left; no state is changed on failure.
    pub fn allocate_with_config(
        &self,
        resource: &'r DmaResource,
        config: &DmaResourceConfig,
    ) -> Result<ChannelIndex, DmaError> {
        let region = ExclusiveRegion::enter();
        if let Some(channel) = resource.state(&region).channel {
            warn!("Resource already owns DMA channel {:?}", channel);
            return Err(DmaError::Busy);
        }

        let mut shared = self.shared.borrow_ref_mut(region.token());

        let channel = match shared.bitmap.allocate() {
            Ok(channel) => channel,
            Err(e) => {
                warn!("No DMA channel left to allocate");
                return Err(e);
            }
        };

        self.controller.reset_channel(region.token(), channel);
        self.controller
            .configure_channel(region.token(), channel, ChannelControl::from_config(config));

        shared.active[channel.index()] = Some(resource);
        resource.update(&region, |state| {
            state.channel = Some(channel);
            state.descriptor_head = None;
            state.job_status = JobStatus::Configured;
        });

        debug!("Allocated DMA channel {:?}, {:?} left", channel, shared.bitmap.free_count());
        Ok(channel)
    }

    /// Release the channel owned by `resource`.
    ///
    /// Fails with [DmaError::Busy] whilst the hardware reports the channel busy,
    /// leaving all state untouched.
    pub fn free(&self, resource: &DmaResource) -> Result<(), DmaError> {
        let region = ExclusiveRegion::enter();
        let Some(channel) = resource.state(&region).channel else {
            return Err(DmaError::NotInitialized);
        };

        if self.controller.is_busy(channel) {
            return Err(DmaError::Busy);
        }

        let mut shared = self.shared.borrow_ref_mut(region.token());
        if !shared.bitmap.is_allocated(channel) {
            return Err(DmaError::NotInitialized);
        }

        shared.bitmap.free(channel);
        shared.active[channel.index()] = None;
        resource.update(&region, |state| {
            state.channel = None;
            state.job_status = JobStatus::Free;
        });

        debug!("Freed DMA channel {:?}", channel);
        Ok(())
    }

    /// Enable a channel, transfers then start as configured by its trigger.
    ///
    /// The job status is left alone, see [Self::start_job].
    pub fn start(&self, channel: ChannelIndex) {
        let region = ExclusiveRegion::enter();
        self.controller.enable_channel(region.token(), channel);
        trace!("Started DMA channel {:?}", channel);
    }

    /// Enable the channel of `resource` and mark its job as running.
    pub fn start_job(&self, resource: &DmaResource) -> Result<(), DmaError> {
        let region = ExclusiveRegion::enter();
        let state = resource.state(&region);
        let Some(channel) = state.channel else {
            return Err(DmaError::NotInitialized);
        };

        if state.job_status == JobStatus::Running {
            return Err(DmaError::Busy);
        }

        self.controller.enable_channel(region.token(), channel);
        resource.update(&region, |state| state.job_status = JobStatus::Running);
        trace!("Started DMA job on {:?}", channel);
        Ok(())
    }

    /// Request the channel of `resource` to suspend.
    ///
    /// Does not wait for the suspension and leaves the job status as is;
    /// the owner observes the suspend flag of the channel and records it with [DmaResource::set_job_status].
    pub fn suspend(&self, resource: &DmaResource) -> Result<(), DmaError> {
        let region = ExclusiveRegion::enter();
        let Some(channel) = resource.state(&region).channel else {
            return Err(DmaError::NotInitialized);
        };

        self.controller
            .send_command(region.token(), channel, ChannelCommand::Suspend);
        trace!("Requested suspend of {:?}", channel);
        Ok(())
    }

    /// Resume a suspended job.
    ///
    /// Returns immediately when the job is not [JobStatus::Suspended].
    /// Otherwise polls the busy flag at most [MAX_JOB_RESUME_COUNT] times,
    /// outside of the exclusive region.
    pub fn resume(&self, resource: &DmaResource) -> Result<(), DmaError> {
        let channel = {
            let region = ExclusiveRegion::enter();
            let state = resource.state(&region);
            if state.job_status != JobStatus::Suspended {
                return Ok(());
            }

            let Some(channel) = state.channel else {
                return Err(DmaError::NotInitialized);
            };

            self.controller
                .send_command(region.token(), channel, ChannelCommand::Resume);
            channel
        };

        let resumed = (0..MAX_JOB_RESUME_COUNT).any(|_| self.controller.is_busy(channel));

        let region = ExclusiveRegion::enter();
        if resumed {
            resource.update(&region, |state| state.job_status = JobStatus::Running);
            trace!("Resumed {:?}", channel);
            Ok(())
        } else {
            resource.update(&region, |state| state.job_status = JobStatus::Error(DmaError::Timeout));
            warn!("Resuming {:?} timed out", channel);
            Err(DmaError::Timeout)
        }
    }

    /// Store a descriptor in a slot of the descriptor section.
    ///
    /// The slot must not be part of a running chain.
    pub fn write_descriptor(&self, slot: DescriptorRef, descriptor: Descriptor) {
        let region = ExclusiveRegion::enter();
        self.shared.borrow_ref_mut(region.token()).descriptors.set(slot, descriptor);
    }

    /// Append a descriptor to the chain of `resource`.
    ///
    /// Walks from the head to the tail of the chain, so chains must be acyclic:
    /// appending to a chain containing a cycle never returns.
    pub fn append(&self, resource: &DmaResource, descriptor: DescriptorRef) -> Result<(), DmaError> {
        let region = ExclusiveRegion::enter();
        let mut shared = self.shared.borrow_ref_mut(region.token());

        resource.update(&region, |state| {
            if state.job_status == JobStatus::Running {
                return Err(DmaError::Busy);
            }

            match state.descriptor_head {
                None => state.descriptor_head = Some(descriptor),
                Some(head) => {
                    let tail = shared.descriptors.tail(head);
                    shared.descriptors.link(tail, descriptor);
                }
            }
            Ok(())
        })
    }

    /// Reference to slot `index` of the descriptor section.
    pub fn descriptor_ref(&self, index: usize) -> Option<DescriptorRef> {
        let region = ExclusiveRegion::enter();
        let slot = self.shared.borrow_ref(region.token()).descriptors.reference(index);
        slot
    }

    /// Copy of the descriptor in a slot.
    pub fn descriptor(&self, slot: DescriptorRef) -> Descriptor {
        let region = ExclusiveRegion::enter();
        let descriptor = self.shared.borrow_ref(region.token()).descriptors.get(slot);
        descriptor
    }

    /// Successor of a descriptor in its chain.
    pub fn next_descriptor(&self, slot: DescriptorRef) -> Option<DescriptorRef> {
        let region = ExclusiveRegion::enter();
        let next = self.shared.borrow_ref(region.token()).descriptors.next(slot);
        next
    }

    /// Descriptor the hardware wrote back for a channel, holding the remaining block transfer count.
    pub fn write_back(&self, channel: ChannelIndex) -> Descriptor {
        defmt_or_log::assert!(channel.index() < N);

        // Safety: the index is within the section borrowed for 'r.
        unsafe { self.write_back.add(channel.index()).read_volatile() }
    }

    /// Resource currently owning `channel`, for interrupt handlers to record completion.
    pub fn resource(&self, channel: ChannelIndex) -> Option<&'r DmaResource> {
        let region = ExclusiveRegion::enter();
        let owner = self.shared.borrow_ref(region.token()).active.get(channel.index()).copied().flatten();
        owner
    }

    pub fn is_allocated(&self, channel: ChannelIndex) -> bool {
        let region = ExclusiveRegion::enter();
        let allocated = self.shared.borrow_ref(region.token()).bitmap.is_allocated(channel);
        allocated
    }

    /// Number of channels still available.
    pub fn free_channels(&self) -> u8 {
        let region = ExclusiveRegion::enter();
        let free = self.shared.borrow_ref(region.token()).bitmap.free_count();
        free
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{EventInputAction, Priority, TriggerAction};
    use crate::descriptor::DescriptorConfig;
    use crate::mock::{MockDmac, Operation};

    type Manager<'r> = DmaResourceManager<'r, MockDmac, 6, 8>;

    fn descriptor(count: u16) -> Descriptor {
        Descriptor::new(&DescriptorConfig {
            block_transfer_count: count,
            ..Default::default()
        })
    }

    #[test]
    fn init_programs_sections() {
        let mut descriptors = DescriptorSection::<8>::new();
        let mut write_back = DescriptorSection::<6>::new();
        let descriptor_base = descriptors.base_address();
        let write_back_base = write_back.base_address();

        let manager = Manager::init(MockDmac::new(), &mut descriptors, &mut write_back);
        assert_eq!(manager.descriptor_section_address(), descriptor_base);
        assert_eq!(manager.write_back_section_address(), write_back_base);
        assert_eq!(
            manager.controller().operations(),
            vec![Operation::Init {
                descriptor_base,
                write_back_base
            }]
        );
        assert_eq!(manager.free_channels(), 6);
    }

    /// Six channels go out in order, the seventh allocation fails and freeing one makes it the next.
    #[test]
    fn allocate_six_channels() {
        let mut descriptors = DescriptorSection::<8>::new();
        let mut write_back = DescriptorSection::<6>::new();
        let resources: [DmaResource; 7] = Default::default();
        let manager = Manager::init(MockDmac::new(), &mut descriptors, &mut write_back);

        for (i, resource) in resources[..6].iter().enumerate() {
            let channel = manager
                .allocate_with_config(resource, &DmaResourceConfig::default())
                .unwrap();
            assert_eq!(channel, ChannelIndex::new(i as u8));
            assert_eq!(resource.channel(), Some(channel));
            assert_eq!(resource.job_status(), JobStatus::Configured);
            assert_eq!(manager.free_channels() as usize, 6 - (i + 1));
            assert!(core::ptr::eq(manager.resource(channel).unwrap(), resource));
        }

        let operations_before = manager.controller().operations().len();
        assert_eq!(
            manager.allocate_with_config(&resources[6], &DmaResourceConfig::default()),
            Err(DmaError::ResourceExhausted)
        );
        assert_eq!(resources[6].channel(), None);
        assert_eq!(resources[6].job_status(), JobStatus::Free);
        assert_eq!(manager.controller().operations().len(), operations_before);

        manager.free(&resources[2]).unwrap();
        assert_eq!(resources[2].job_status(), JobStatus::Free);
        assert!(manager.resource(ChannelIndex::new(2)).is_none());

        let channel = manager
            .allocate_with_config(&resources[6], &DmaResourceConfig::default())
            .unwrap();
        assert_eq!(channel, ChannelIndex::new(2));
        assert!(core::ptr::eq(manager.resource(channel).unwrap(), &resources[6]));
    }

    #[test]
    fn allocate_configures_hardware() {
        let mut descriptors = DescriptorSection::<8>::new();
        let mut write_back = DescriptorSection::<6>::new();
        let resource = DmaResource::new();
        let manager = Manager::init(MockDmac::new(), &mut descriptors, &mut write_back);

        let config = DmaResourceConfig {
            priority: Priority::Level1,
            peripheral_trigger: 0x05,
            trigger_action: TriggerAction::Beat,
            event_input_action: EventInputAction::NoAction,
            event_output_enable: false,
        };
        let channel = manager.allocate_with_config(&resource, &config).unwrap();

        let operations = manager.controller().operations();
        assert_eq!(
            operations[1..],
            [
                Operation::Reset(channel),
                Operation::Configure(channel, ChannelControl::from_config(&config)),
            ]
        );
    }

    #[test]
    fn allocate_twice_keeps_first_channel() {
        let mut descriptors = DescriptorSection::<8>::new();
        let mut write_back = DescriptorSection::<6>::new();
        let resource = DmaResource::new();
        let manager = Manager::init(MockDmac::new(), &mut descriptors, &mut write_back);

        let first = manager
            .allocate_with_config(&resource, &DmaResourceConfig::default())
            .unwrap();
        manager.start_job(&resource).unwrap();
        let operations_before = manager.controller().operations().len();

        assert_eq!(
            manager.allocate_with_config(&resource, &DmaResourceConfig::default()),
            Err(DmaError::Busy)
        );
        assert_eq!(resource.channel(), Some(first));
        assert_eq!(resource.job_status(), JobStatus::Running);
        assert_eq!(manager.free_channels(), 5);
        assert!(!manager.is_allocated(ChannelIndex::new(1)));
        assert_eq!(manager.controller().operations().len(), operations_before);

        manager.free(&resource).unwrap();
        assert_eq!(manager.free_channels(), 6);
        assert!(manager.resource(first).is_none());
    }

    #[test]
    fn free_busy_channel() {
        let mut descriptors = DescriptorSection::<8>::new();
        let mut write_back = DescriptorSection::<6>::new();
        let resource = DmaResource::new();
        let manager = Manager::init(MockDmac::new(), &mut descriptors, &mut write_back);

        let channel = manager
            .allocate_with_config(&resource, &DmaResourceConfig::default())
            .unwrap();
        manager.controller().set_busy(channel, true);

        assert_eq!(manager.free(&resource), Err(DmaError::Busy));
        assert!(manager.is_allocated(channel));
        assert_eq!(manager.free_channels(), 5);
        assert!(core::ptr::eq(manager.resource(channel).unwrap(), &resource));
        assert_eq!(resource.channel(), Some(channel));

        manager.controller().set_busy(channel, false);
        assert_eq!(manager.free(&resource), Ok(()));
        assert!(!manager.is_allocated(channel));
        assert_eq!(manager.free_channels(), 6);
    }

    #[test]
    fn free_unallocated() {
        let mut descriptors = DescriptorSection::<8>::new();
        let mut write_back = DescriptorSection::<6>::new();
        let resource = DmaResource::new();
        let manager = Manager::init(MockDmac::new(), &mut descriptors, &mut write_back);

        assert_eq!(manager.free(&resource), Err(DmaError::NotInitialized));

        manager
            .allocate_with_config(&resource, &DmaResourceConfig::default())
            .unwrap();
        manager.free(&resource).unwrap();
        assert_eq!(manager.free(&resource), Err(DmaError::NotInitialized));
        assert_eq!(manager.free_channels(), 6);
    }

    #[test]
    fn append_builds_chain_in_order() {
        let mut descriptors = DescriptorSection::<8>::new();
        let mut write_back = DescriptorSection::<6>::new();
        let resource = DmaResource::new();
        let manager = Manager::init(MockDmac::new(), &mut descriptors, &mut write_back);
        manager
            .allocate_with_config(&resource, &DmaResourceConfig::default())
            .unwrap();

        let slots = [0, 6, 7].map(|i| manager.descriptor_ref(i).unwrap());
        for (i, slot) in slots.iter().enumerate() {
            manager.write_descriptor(*slot, descriptor(i as u16 + 1));
            manager.append(&resource, *slot).unwrap();
        }

        assert_eq!(resource.descriptor_head(), Some(slots[0]));
        assert_eq!(manager.next_descriptor(slots[0]), Some(slots[1]));
        assert_eq!(manager.next_descriptor(slots[1]), Some(slots[2]));
        assert_eq!(manager.next_descriptor(slots[2]), None);

        let mut walked = vec![];
        let mut cursor = resource.descriptor_head();
        while let Some(slot) = cursor {
            walked.push(manager.descriptor(slot).block_transfer_count());
            cursor = manager.next_descriptor(slot);
        }
        assert_eq!(walked, [1, 2, 3]);
    }

    #[test]
    fn append_to_running_job() {
        let mut descriptors = DescriptorSection::<8>::new();
        let mut write_back = DescriptorSection::<6>::new();
        let resource = DmaResource::new();
        let manager = Manager::init(MockDmac::new(), &mut descriptors, &mut write_back);
        let channel = manager
            .allocate_with_config(&resource, &DmaResourceConfig::default())
            .unwrap();

        let first = manager.descriptor_ref(channel.index()).unwrap();
        manager.write_descriptor(first, descriptor(4));
        manager.append(&resource, first).unwrap();
        manager.start_job(&resource).unwrap();
        assert_eq!(resource.job_status(), JobStatus::Running);
        assert_eq!(manager.start_job(&resource), Err(DmaError::Busy));

        let second = manager.descriptor_ref(7).unwrap();
        assert_eq!(manager.append(&resource, second), Err(DmaError::Busy));
        assert_eq!(manager.next_descriptor(first), None);
    }

    #[test]
    fn start_enables_without_status() {
        let mut descriptors = DescriptorSection::<8>::new();
        let mut write_back = DescriptorSection::<6>::new();
        let resource = DmaResource::new();
        let manager = Manager::init(MockDmac::new(), &mut descriptors, &mut write_back);
        let channel = manager
            .allocate_with_config(&resource, &DmaResourceConfig::default())
            .unwrap();

        manager.start(channel);
        assert_eq!(manager.controller().operations().last(), Some(&Operation::Enable(channel)));
        assert_eq!(resource.job_status(), JobStatus::Configured);
    }

    #[test]
    fn suspend_leaves_status() {
        let mut descriptors = DescriptorSection::<8>::new();
        let mut write_back = DescriptorSection::<6>::new();
        let resource = DmaResource::new();
        let manager = Manager::init(MockDmac::new(), &mut descriptors, &mut write_back);

        assert_eq!(manager.suspend(&resource), Err(DmaError::NotInitialized));

        let channel = manager
            .allocate_with_config(&resource, &DmaResourceConfig::default())
            .unwrap();
        manager.start_job(&resource).unwrap();
        manager.suspend(&resource).unwrap();

        assert_eq!(
            manager.controller().operations().last(),
            Some(&Operation::Command(channel, ChannelCommand::Suspend))
        );
        assert_eq!(resource.job_status(), JobStatus::Running);
    }

    #[test]
    fn resume_only_when_suspended() {
        let mut descriptors = DescriptorSection::<8>::new();
        let mut write_back = DescriptorSection::<6>::new();
        let resource = DmaResource::new();
        let manager = Manager::init(MockDmac::new(), &mut descriptors, &mut write_back);
        manager
            .allocate_with_config(&resource, &DmaResourceConfig::default())
            .unwrap();
        manager.start_job(&resource).unwrap();

        let operations_before = manager.controller().operations().len();
        assert_eq!(manager.resume(&resource), Ok(()));
        assert_eq!(resource.job_status(), JobStatus::Running);
        assert_eq!(manager.controller().operations().len(), operations_before);
        assert_eq!(manager.controller().polls(), 0);
    }

    #[test]
    fn resume_succeeds_when_busy_appears() {
        let mut descriptors = DescriptorSection::<8>::new();
        let mut write_back = DescriptorSection::<6>::new();
        let resource = DmaResource::new();
        let manager = Manager::init(MockDmac::new(), &mut descriptors, &mut write_back);
        let channel = manager
            .allocate_with_config(&resource, &DmaResourceConfig::default())
            .unwrap();
        resource.set_job_status(JobStatus::Suspended);

        manager.controller().set_resume_latency(Some(25));
        assert_eq!(manager.resume(&resource), Ok(()));
        assert_eq!(resource.job_status(), JobStatus::Running);
        assert_eq!(
            manager.controller().operations().last(),
            Some(&Operation::Command(channel, ChannelCommand::Resume))
        );
        assert_eq!(manager.controller().polls(), 26);
    }

    #[test]
    fn resume_times_out() {
        let mut descriptors = DescriptorSection::<8>::new();
        let mut write_back = DescriptorSection::<6>::new();
        let resource = DmaResource::new();
        let manager = Manager::init(MockDmac::new(), &mut descriptors, &mut write_back);
        manager
            .allocate_with_config(&resource, &DmaResourceConfig::default())
            .unwrap();
        resource.set_job_status(JobStatus::Suspended);

        manager.controller().set_resume_latency(None);
        assert_eq!(manager.resume(&resource), Err(DmaError::Timeout));
        assert_eq!(resource.job_status(), JobStatus::Error(DmaError::Timeout));
        assert_eq!(manager.controller().polls(), MAX_JOB_RESUME_COUNT);

        // A failed job is not suspended, so resuming again is a no-op.
        assert_eq!(manager.resume(&resource), Ok(()));
        assert_eq!(manager.controller().polls(), MAX_JOB_RESUME_COUNT);
    }

    #[test]
    fn resume_just_within_bound() {
        let mut descriptors = DescriptorSection::<8>::new();
        let mut write_back = DescriptorSection::<6>::new();
        let resource = DmaResource::new();
        let manager = Manager::init(MockDmac::new(), &mut descriptors, &mut write_back);
        manager
            .allocate_with_config(&resource, &DmaResourceConfig::default())
            .unwrap();
        resource.set_job_status(JobStatus::Suspended);

        manager
            .controller()
            .set_resume_latency(Some(MAX_JOB_RESUME_COUNT - 1));
        assert_eq!(manager.resume(&resource), Ok(()));
        assert_eq!(manager.controller().polls(), MAX_JOB_RESUME_COUNT);
    }

    #[test]
    fn completion_through_active_table() {
        let mut descriptors = DescriptorSection::<8>::new();
        let mut write_back = DescriptorSection::<6>::new();
        let resource = DmaResource::new();
        let manager = Manager::init(MockDmac::new(), &mut descriptors, &mut write_back);
        let channel = manager
            .allocate_with_config(&resource, &DmaResourceConfig::default())
            .unwrap();
        manager.start_job(&resource).unwrap();

        // As a transfer complete interrupt handler would.
        if let Some(owner) = manager.resource(channel) {
            owner.set_job_status(JobStatus::Completed);
        }

        assert_eq!(resource.job_status(), JobStatus::Completed);
        manager.free(&resource).unwrap();
        assert_eq!(resource.job_status(), JobStatus::Free);
    }

    #[test]
    fn write_back_is_read_from_section() {
        let mut descriptors = DescriptorSection::<8>::new();
        let mut write_back = DescriptorSection::<6>::new();
        let written = descriptor(17);
        let slot = write_back.reference(3).unwrap();
        write_back.set(slot, written);

        let manager = Manager::init(MockDmac::new(), &mut descriptors, &mut write_back);
        assert_eq!(manager.write_back(ChannelIndex::new(3)), written);
        assert_eq!(manager.write_back(ChannelIndex::new(0)), Descriptor::EMPTY);
    }
}

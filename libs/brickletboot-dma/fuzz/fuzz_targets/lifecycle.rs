#![no_main]

extern crate libfuzzer_sys;
extern crate std;

use arbitrary::Arbitrary;
use brickletboot_dma::{
    mock::MockDmac, ChannelIndex, Descriptor, DescriptorConfig, DescriptorSection, DmaError, DmaResource,
    DmaResourceConfig, DmaResourceManager, JobStatus,
};
use libfuzzer_sys::fuzz_target;

const CHANNELS: usize = 6;
const DESCRIPTORS: usize = 10;
const RESOURCES: usize = 8;

fuzz_target!(|operations: Vec<Op>| fuzz(operations));

#[derive(Debug, Arbitrary)]
enum Op {
    Allocate { resource: u8, trigger: u8 },
    Free { resource: u8 },
    SetBusy { resource: u8, busy: bool },
    StartJob { resource: u8 },
    Suspend { resource: u8 },
    Suspended { resource: u8 },
    Resume { resource: u8, latency: Option<u16> },
    Complete { resource: u8 },
    Append { resource: u8, count: u16 },
}

/// Checks for 'any sequence of lifecycle calls keeps the channel table and the bitmap consistent'.
fn fuzz(operations: Vec<Op>) {
    let mut descriptors = DescriptorSection::<DESCRIPTORS>::new();
    let mut write_back = DescriptorSection::<CHANNELS>::new();
    let resources: [DmaResource; RESOURCES] = Default::default();
    let manager = DmaResourceManager::<_, CHANNELS, DESCRIPTORS>::init(MockDmac::new(), &mut descriptors, &mut write_back);

    // Descriptor slots handed out so far, never reused so chains stay acyclic.
    let mut next_slot = 0;
    let mut chain_lengths = [0usize; RESOURCES];

    for op in operations {
        match op {
            Op::Allocate { resource, trigger } => {
                let r = resource as usize % RESOURCES;
                let owned = resources[r].channel();
                let status = resources[r].job_status();
                let free_before = manager.free_channels();

                let expected = (0..CHANNELS as u8)
                    .map(ChannelIndex::new)
                    .find(|channel| !manager.is_allocated(*channel));
                let config = DmaResourceConfig {
                    peripheral_trigger: trigger,
                    ..Default::default()
                };
                match (manager.allocate_with_config(&resources[r], &config), expected) {
                    (Err(DmaError::Busy), _) => {
                        assert!(owned.is_some());
                        assert_eq!(resources[r].channel(), owned);
                        assert_eq!(resources[r].job_status(), status);
                        assert_eq!(manager.free_channels(), free_before);
                    }
                    (Ok(channel), Some(expected)) => {
                        assert_eq!(owned, None);
                        assert_eq!(channel, expected);
                        assert_eq!(resources[r].job_status(), JobStatus::Configured);
                        chain_lengths[r] = 0;
                    }
                    (Err(DmaError::ResourceExhausted), None) => {
                        assert_eq!(resources[r].channel(), None);
                    }
                    (result, expected) => panic!("Allocated {:?}, expected {:?}", result, expected),
                }
            }
            Op::Free { resource } => {
                let r = resource as usize % RESOURCES;
                let channel = resources[r].channel();
                let status = resources[r].job_status();
                match manager.free(&resources[r]) {
                    Ok(()) => {
                        let channel = channel.expect("freed a resource without a channel");
                        assert!(!manager.is_allocated(channel));
                        assert_eq!(resources[r].job_status(), JobStatus::Free);
                    }
                    Err(DmaError::Busy) => {
                        let channel = channel.expect("busy resource without a channel");
                        assert!(manager.is_allocated(channel));
                        assert_eq!(resources[r].channel(), Some(channel));
                        assert_eq!(resources[r].job_status(), status);
                    }
                    Err(DmaError::NotInitialized) => assert_eq!(channel, None),
                    Err(e) => panic!("Unexpected error {:?}", e),
                }
            }
            Op::SetBusy { resource, busy } => {
                if let Some(channel) = resources[resource as usize % RESOURCES].channel() {
                    manager.controller().set_busy(channel, busy);
                }
            }
            Op::StartJob { resource } => {
                let r = resource as usize % RESOURCES;
                let before = resources[r].job_status();
                match manager.start_job(&resources[r]) {
                    Ok(()) => assert_eq!(resources[r].job_status(), JobStatus::Running),
                    Err(DmaError::Busy) => assert_eq!(before, JobStatus::Running),
                    Err(DmaError::NotInitialized) => assert_eq!(resources[r].channel(), None),
                    Err(e) => panic!("Unexpected error {:?}", e),
                }
            }
            Op::Suspend { resource } => {
                let r = resource as usize % RESOURCES;
                let result = manager.suspend(&resources[r]);
                assert_eq!(result.is_err(), resources[r].channel().is_none());
            }
            Op::Suspended { resource } => {
                let r = resource as usize % RESOURCES;
                if resources[r].channel().is_some() {
                    resources[r].set_job_status(JobStatus::Suspended);
                }
            }
            Op::Resume { resource, latency } => {
                let r = resource as usize % RESOURCES;
                let before = resources[r].job_status();
                manager.controller().set_resume_latency(latency.map(u32::from));
                match manager.resume(&resources[r]) {
                    Ok(()) if before == JobStatus::Suspended => {
                        assert_eq!(resources[r].job_status(), JobStatus::Running)
                    }
                    Ok(()) => assert_eq!(resources[r].job_status(), before),
                    Err(DmaError::Timeout) => {
                        assert_eq!(resources[r].job_status(), JobStatus::Error(DmaError::Timeout))
                    }
                    Err(e) => panic!("Unexpected error {:?}", e),
                }
            }
            Op::Complete { resource } => {
                let r = resource as usize % RESOURCES;
                if let Some(channel) = resources[r].channel() {
                    let owner = manager.resource(channel).expect("allocated channel without owner");
                    assert!(core::ptr::eq(owner, &resources[r]));
                    owner.set_job_status(JobStatus::Completed);
                }
            }
            Op::Append { resource, count } => {
                let r = resource as usize % RESOURCES;
                let Some(slot) = manager.descriptor_ref(next_slot) else {
                    continue;
                };
                manager.write_descriptor(
                    slot,
                    Descriptor::new(&DescriptorConfig {
                        block_transfer_count: count,
                        ..Default::default()
                    }),
                );

                match manager.append(&resources[r], slot) {
                    Ok(()) => {
                        next_slot += 1;
                        chain_lengths[r] += 1;
                    }
                    Err(DmaError::Busy) => assert_eq!(resources[r].job_status(), JobStatus::Running),
                    Err(e) => panic!("Unexpected error {:?}", e),
                }

                let mut length = 0;
                let mut cursor = resources[r].descriptor_head();
                while let Some(slot) = cursor {
                    length += 1;
                    cursor = manager.next_descriptor(slot);
                }
                assert_eq!(length, chain_lengths[r]);
            }
        }

        let owned = resources.iter().filter_map(|r| r.channel()).collect::<Vec<_>>();
        assert_eq!(manager.free_channels() as usize, CHANNELS - owned.len());
        for channel in (0..CHANNELS as u8).map(ChannelIndex::new) {
            let owner = manager.resource(channel);
            assert_eq!(owner.is_some(), manager.is_allocated(channel));
            if let Some(owner) = owner {
                assert_eq!(owner.channel(), Some(channel));
            }
        }
    }
}

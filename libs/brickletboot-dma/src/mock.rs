use core::cell::RefCell;
use std::vec::Vec;

use critical_section::CriticalSection;

use crate::bitmap::ChannelIndex;
use crate::controller::{ChannelCommand, ChannelControl, DmaController};

/// Register level operation performed on a [MockDmac].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Init { descriptor_base: u32, write_back_base: u32 },
    Reset(ChannelIndex),
    Configure(ChannelIndex, ChannelControl),
    Enable(ChannelIndex),
    Command(ChannelIndex, ChannelCommand),
}

#[derive(Debug)]
struct State {
    operations: Vec<Operation>,
    /// Bit `n` set whilst channel `n` reports busy.
    busy: u32,
    /// Polls after a resume command until the channel reports busy, or never.
    resume_latency: Option<u32>,
    /// Channel with an outstanding resume command and the polls it has left.
    pending_resume: Option<(ChannelIndex, Option<u32>)>,
    polls: u32,
}

/// In memory DMA controller that records every operation.
#[derive(Debug)]
pub struct MockDmac {
    state: RefCell<State>,
}

impl Default for MockDmac {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDmac {
    /// Controller on which a resumed channel reports busy on the very first poll.
    pub fn new() -> Self {
        Self {
            state: RefCell::new(State {
                operations: Vec::new(),
                busy: 0,
                resume_latency: Some(0),
                pending_resume: None,
                polls: 0,
            }),
        }
    }

    /// Every operation performed so far, oldest first.
    pub fn operations(&self) -> Vec<Operation> {
        self.state.borrow().operations.clone()
    }

    /// Force the busy flag of a channel, as an ongoing transfer would.
    pub fn set_busy(&self, channel: ChannelIndex, busy: bool) {
        let mut state = self.state.borrow_mut();
        if busy {
            state.busy |= channel.mask();
        } else {
            state.busy &= !channel.mask();
        }
    }

    /// Number of polls a resumed channel stays idle before reporting busy; `None` to never resume.
    pub fn set_resume_latency(&self, latency: Option<u32>) {
        self.state.borrow_mut().resume_latency = latency;
    }

    /// Number of busy flag reads so far.
    pub fn polls(&self) -> u32 {
        self.state.borrow().polls
    }

    fn record(&self, operation: Operation) {
        self.state.borrow_mut().operations.push(operation);
    }
}

impl DmaController for MockDmac {
    fn init(&self, _cs: CriticalSection<'_>, descriptor_base: u32, write_back_base: u32) {
        self.state.borrow_mut().busy = 0;
        self.record(Operation::Init {
            descriptor_base,
            write_back_base,
        });
    }

    fn reset_channel(&self, _cs: CriticalSection<'_>, channel: ChannelIndex) {
        self.set_busy(channel, false);
        self.record(Operation::Reset(channel));
    }

    fn configure_channel(&self, _cs: CriticalSection<'_>, channel: ChannelIndex, control: ChannelControl) {
        self.record(Operation::Configure(channel, control));
    }

    fn enable_channel(&self, _cs: CriticalSection<'_>, channel: ChannelIndex) {
        self.record(Operation::Enable(channel));
    }

    fn send_command(&self, _cs: CriticalSection<'_>, channel: ChannelIndex, command: ChannelCommand) {
        match command {
            ChannelCommand::Suspend => self.set_busy(channel, false),
            ChannelCommand::Resume => {
                let mut state = self.state.borrow_mut();
                state.pending_resume = Some((channel, state.resume_latency));
            }
        }
        self.record(Operation::Command(channel, command));
    }

    fn is_busy(&self, channel: ChannelIndex) -> bool {
        let mut state = self.state.borrow_mut();
        state.polls += 1;

        match state.pending_resume {
            Some((pending, Some(0))) if pending == channel => {
                state.pending_resume = None;
                state.busy |= channel.mask();
            }
            Some((pending, Some(left))) if pending == channel => {
                state.pending_resume = Some((pending, Some(left - 1)));
            }
            _ => {}
        }

        state.busy & channel.mask() != 0
    }
}

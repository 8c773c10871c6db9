//! Flash transaction sequencing
//!
//! The sequencer owns every opcode that goes to the flash. Each state runs
//! a fixed plan of steps; most steps are a single chip-select frame, a few
//! repeat or branch on what the flash answered:
//!
//! - `PollWip` re-issues RDSR until WIP reads clear
//! - `CheckQe` reads SR2 and, if QE is clear, splices in
//!   WREN / WRSR2 / poll
//! - `HostDrained` waits for the host to accept the last read byte
//!
//! Any opcode that leaves the flash busy (reset, erase, program, status
//! write) takes the write-in-progress lock; only status reads may go out
//! until a poll has seen WIP clear.

use crate::ack::AckArbiter;
use crate::config::ControllerConfig;
use crate::error::{Error, Result, WaitTarget};
use crate::host::{CommandDecoder, CommandHeader, Operation};
use crate::link::Links;
use crate::serializer::LineSerializer;
use crate::spi::{opcodes, FlashCommand, Status1, Status2};

/// Top-level sequencer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequencerState {
    /// Software reset of the flash
    PowerUpReset,
    /// Global block-protection unlock and chip erase
    GlobalUnlockAndErase,
    /// Waiting for the erase, then making sure QE is set
    ErasePoll,
    /// Ready for a host request
    Idle,
    /// Programming a host payload
    WriteSequence,
    /// Reading into the host
    ReadSequence,
    /// Waiting for the ack bus grant
    Acknowledge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Frame with just an opcode
    Issue(u8),
    /// Configured chip erase opcode
    ChipErase,
    /// RDSR until WIP is clear
    PollWip,
    /// RDSR2, branch on QE
    CheckQe,
    /// WRSR2 with QE added to the last SR2 value
    SetQe,
    /// Quad page program of the host payload
    Program,
    /// Quad output read into the host
    Read,
    /// Host has taken every read byte
    HostDrained,
}

impl Step {
    /// Steps that leave the flash busy once their frame ends
    const fn sets_wip(&self) -> bool {
        matches!(
            self,
            Self::Issue(opcodes::RST) | Self::ChipErase | Self::SetQe | Self::Program
        )
    }
}

const POWER_UP: &[Step] = &[
    Step::Issue(opcodes::WREN),
    Step::Issue(opcodes::RSTEN),
    Step::Issue(opcodes::RST),
    Step::PollWip,
];
const UNLOCK_AND_ERASE: &[Step] = &[
    Step::Issue(opcodes::WREN),
    Step::Issue(opcodes::ULBPR),
    Step::Issue(opcodes::WREN),
    Step::ChipErase,
];
const ERASE_POLL: &[Step] = &[Step::PollWip, Step::CheckQe];
const QUAD_ENABLE: &[Step] = &[Step::Issue(opcodes::WREN), Step::SetQe, Step::PollWip];
const WRITE: &[Step] = &[
    Step::PollWip,
    Step::Issue(opcodes::WREN),
    Step::Program,
    Step::PollWip,
];
const READ: &[Step] = &[Step::PollWip, Step::Read, Step::HostDrained];

/// The components the sequencer drives each cycle
pub struct Ports<'a> {
    /// Flash-side serializer
    pub serializer: &'a mut LineSerializer,
    /// Payload links shared with the decoder
    pub links: &'a mut Links,
    /// Host-side decoder
    pub decoder: &'a mut CommandDecoder,
    /// Ack bus client
    pub ack: &'a mut AckArbiter,
}

/// Flash command sequencer and owner of the write-in-progress lock
#[derive(Debug)]
pub struct TransactionSequencer {
    erase_opcode: u8,
    max_status_polls: u32,
    state: SequencerState,
    plan: &'static [Step],
    cursor: usize,
    /// Step whose frame is on the wire
    current: Option<Step>,
    header: Option<CommandHeader>,
    wip_held: bool,
    /// Current poll was inserted ahead of a held-back step
    interposed: bool,
    polls: u32,
    last_reg: u8,
    status2: Status2,
    frames: u32,
}

impl TransactionSequencer {
    /// Create a sequencer at the start of power-up
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            erase_opcode: config.erase_opcode.opcode(),
            max_status_polls: config.max_status_polls,
            state: SequencerState::PowerUpReset,
            plan: POWER_UP,
            cursor: 0,
            current: None,
            header: None,
            wip_held: false,
            interposed: false,
            polls: 0,
            last_reg: 0,
            status2: Status2::empty(),
            frames: 0,
        }
    }

    /// Forget the request in hand and start over at `PowerUpReset`
    ///
    /// The flash is not reset with the controller, so the write-in-progress
    /// lock survives. A busy-making frame cut short by the reset still
    /// takes it, since the flash commits whatever it received at chip
    /// select release.
    pub fn reset(&mut self) {
        if self.current.is_some_and(|step| step.sets_wip()) {
            self.wip_held = true;
        }
        self.state = SequencerState::PowerUpReset;
        self.plan = POWER_UP;
        self.cursor = 0;
        self.current = None;
        self.header = None;
        self.interposed = false;
        self.polls = 0;
        self.last_reg = 0;
        self.status2 = Status2::empty();
    }

    /// Current state
    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// The request being served, if any
    pub fn header(&self) -> Option<CommandHeader> {
        self.header
    }

    /// Returns true while the flash may still be busy
    pub fn wip_held(&self) -> bool {
        self.wip_held
    }

    /// Frames started since creation
    pub fn frames_issued(&self) -> u32 {
        self.frames
    }

    /// Returns true while a flash frame or the read drain is outstanding
    pub fn in_flight(&self) -> bool {
        self.current.is_some() || self.plan.get(self.cursor) == Some(&Step::HostDrained)
    }

    /// What a stuck transaction is waiting on
    pub fn waiting_on(&self, serializer: &LineSerializer) -> WaitTarget {
        if let Some(target) = serializer.stalled_on() {
            return target;
        }
        match (self.current, self.plan.get(self.cursor)) {
            (None, Some(Step::HostDrained)) => WaitTarget::RxValid,
            _ => WaitTarget::Done,
        }
    }

    /// Advance one cycle; returns true if anything moved
    pub fn clock(&mut self, ports: &mut Ports<'_>) -> Result<bool> {
        let mut progress = false;

        if let Some(step) = self.current {
            progress |= self.move_data(step, ports);
            if !ports.serializer.take_done() {
                return Ok(progress);
            }
            self.current = None;
            self.frame_finished(step)?;
            progress = true;
        }

        if self.current.is_none() {
            progress |= self.advance(ports)?;
        }
        Ok(progress)
    }

    fn move_data(&mut self, step: Step, ports: &mut Ports<'_>) -> bool {
        let ser = &mut *ports.serializer;
        match step {
            Step::Program => {
                if ser.tx_ready() {
                    if let Some(byte) = ports.links.to_flash.pop() {
                        return ser.push_tx(byte);
                    }
                }
                false
            }
            Step::SetQe => {
                let value = (self.status2 | Status2::QE).bits();
                ser.tx_ready() && ser.push_tx(value)
            }
            Step::Read => {
                if ser.rx_valid() && ports.links.from_flash.ready() {
                    if let Some(byte) = ser.take_rx() {
                        return ports.links.from_flash.push(byte);
                    }
                }
                false
            }
            Step::PollWip | Step::CheckQe => match ser.take_rx() {
                Some(byte) => {
                    self.last_reg = byte;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    fn frame_finished(&mut self, step: Step) -> Result<()> {
        if step.sets_wip() {
            self.wip_held = true;
        }
        match step {
            Step::PollWip => {
                self.polls += 1;
                if Status1::from_bits_truncate(self.last_reg).contains(Status1::WIP) {
                    if self.polls >= self.max_status_polls {
                        log::error!("sequencer: WIP still set after {} polls", self.polls);
                        return Err(Error::ProtocolTimeout {
                            waiting_for: WaitTarget::WipClear,
                            waited: self.polls,
                        });
                    }
                    // Poll again
                    return Ok(());
                }
                log::trace!("sequencer: WIP clear after {} polls", self.polls);
                self.polls = 0;
                self.wip_held = false;
                if core::mem::take(&mut self.interposed) {
                    // Retry the step that was held back
                    return Ok(());
                }
            }
            Step::CheckQe => {
                self.status2 = Status2::from_bits_retain(self.last_reg);
                if !self.status2.contains(Status2::QE) {
                    log::debug!("sequencer: QE clear (SR2={:#04x}), enabling", self.last_reg);
                    self.plan = QUAD_ENABLE;
                    self.cursor = 0;
                    return Ok(());
                }
            }
            _ => {}
        }
        self.cursor += 1;
        Ok(())
    }

    fn command_for(&self, step: Step) -> Option<FlashCommand> {
        let cmd = match step {
            Step::Issue(opcode) => FlashCommand::simple(opcode),
            Step::ChipErase => FlashCommand::simple(self.erase_opcode),
            Step::PollWip => FlashCommand::read_reg(opcodes::RDSR),
            Step::CheckQe => FlashCommand::read_reg(opcodes::RDSR2),
            Step::SetQe => FlashCommand::write_reg(opcodes::WRSR2),
            Step::Program => {
                let header = self.header?;
                FlashCommand::quad_program(header.address, header.transfer_len()?)
            }
            Step::Read => {
                let header = self.header?;
                FlashCommand::quad_read(header.address, header.transfer_len()?)
            }
            Step::HostDrained => return None,
        };
        Some(cmd)
    }

    fn advance(&mut self, ports: &mut Ports<'_>) -> Result<bool> {
        let Some(&step) = self.plan.get(self.cursor) else {
            return self.plan_finished(ports);
        };

        if step == Step::HostDrained {
            if ports.decoder.payload_done() {
                self.cursor += 1;
                return self.advance(ports).map(|_| true);
            }
            return Ok(false);
        }

        let Some(cmd) = self.command_for(step) else {
            // A data step without a request to serve
            self.cursor += 1;
            return Ok(true);
        };
        if self.wip_held && !matches!(cmd.opcode, opcodes::RDSR | opcodes::RDSR2) {
            log::warn!(
                "sequencer: {:#04x} held back while write in progress",
                cmd.opcode
            );
            ports.serializer.start(FlashCommand::read_reg(opcodes::RDSR))?;
            self.current = Some(Step::PollWip);
            self.interposed = true;
            self.frames += 1;
            return Ok(true);
        }

        log::trace!("sequencer: {:?} -> opcode {:#04x}", self.state, cmd.opcode);
        ports.serializer.start(cmd)?;
        self.current = Some(step);
        self.frames += 1;
        Ok(true)
    }

    fn plan_finished(&mut self, ports: &mut Ports<'_>) -> Result<bool> {
        let next = match self.state {
            SequencerState::PowerUpReset => SequencerState::GlobalUnlockAndErase,
            SequencerState::GlobalUnlockAndErase => SequencerState::ErasePoll,
            SequencerState::ErasePoll => {
                log::info!("flash ready: unlocked, erased, quad enabled");
                SequencerState::Idle
            }
            SequencerState::Idle => match ports.decoder.pending() {
                Some(header) => {
                    ports.decoder.accept();
                    self.header = Some(header);
                    match header.operation {
                        Operation::WriteResult => SequencerState::WriteSequence,
                        Operation::ReadKey | Operation::ReadText => SequencerState::ReadSequence,
                        Operation::Invalid => {
                            self.header = None;
                            ports.decoder.release();
                            return Ok(true);
                        }
                    }
                }
                None => return Ok(false),
            },
            SequencerState::WriteSequence | SequencerState::ReadSequence => {
                if let Some(header) = self.header {
                    log::debug!(
                        "sequencer: {:?} for {:?} at {} complete",
                        header.operation,
                        header.accelerator(),
                        header.address
                    );
                }
                ports.ack.notify_complete()?;
                SequencerState::Acknowledge
            }
            SequencerState::Acknowledge => {
                if !ports.ack.is_idle() {
                    return Ok(false);
                }
                self.header = None;
                ports.decoder.release();
                SequencerState::Idle
            }
        };
        self.enter(next);
        Ok(true)
    }

    fn enter(&mut self, state: SequencerState) {
        log::debug!("sequencer: {:?} -> {:?}", self.state, state);
        self.state = state;
        self.cursor = 0;
        self.plan = match state {
            SequencerState::PowerUpReset => POWER_UP,
            SequencerState::GlobalUnlockAndErase => UNLOCK_AND_ERASE,
            SequencerState::ErasePoll => ERASE_POLL,
            SequencerState::WriteSequence => WRITE,
            SequencerState::ReadSequence => READ,
            SequencerState::Idle | SequencerState::Acknowledge => &[],
        };
    }
}

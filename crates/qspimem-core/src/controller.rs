//! Top-level controller glue
//!
//! [`MemController`] wires the decoder, sequencer, serializer and ack
//! arbiter together behind one clocked [`step`](MemController::step). All
//! outputs are registered: what `step` returns is what the peers see
//! during the following cycle.

use crate::ack::AckArbiter;
use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::host::CommandDecoder;
use crate::link::Links;
use crate::sequencer::{Ports, SequencerState, TransactionSequencer};
use crate::serializer::LineSerializer;
use crate::wire::QspiPins;

/// Inputs sampled on one clock edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerInputs {
    /// Active-low reset
    pub rst_n: bool,
    /// Host inbound valid
    pub in_valid: bool,
    /// Host inbound data
    pub in_data: u8,
    /// Host outbound ready
    pub out_ready: bool,
    /// Ack bus grant
    pub ack_owned: bool,
    /// Resolved IO[3:0] levels
    pub flash_io: u8,
}

impl Default for ControllerInputs {
    fn default() -> Self {
        Self {
            rst_n: true,
            in_valid: false,
            in_data: 0,
            out_ready: false,
            ack_owned: false,
            flash_io: 0xF,
        }
    }
}

/// Registered outputs after one clock edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOutputs {
    /// Host inbound ready
    pub in_ready: bool,
    /// Host outbound valid
    pub out_valid: bool,
    /// Host outbound data
    pub out_data: u8,
    /// Ack bus request
    pub ack_request: bool,
    /// Ack bus id (0 while not requesting)
    pub ack_id: u8,
    /// Flash pins
    pub pins: QspiPins,
    /// A protocol fault is latched
    pub fault: bool,
}

impl ControllerOutputs {
    /// Everything deasserted
    pub const fn idle(sclk_idle_high: bool) -> Self {
        Self {
            in_ready: false,
            out_valid: false,
            out_data: 0,
            ack_request: false,
            ack_id: 0,
            pins: QspiPins::idle(sclk_idle_high),
            fault: false,
        }
    }
}

/// The flash-backed memory controller
#[derive(Debug)]
pub struct MemController {
    config: ControllerConfig,
    decoder: CommandDecoder,
    links: Links,
    sequencer: TransactionSequencer,
    serializer: LineSerializer,
    ack: AckArbiter,
    outputs: ControllerOutputs,
    fault: Option<Error>,
    in_reset: bool,
    stalled: u32,
    cycle: u64,
}

impl MemController {
    /// Create a controller; it starts in `PowerUpReset`
    pub fn new(config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            decoder: CommandDecoder::new(),
            links: Links::new(),
            sequencer: TransactionSequencer::new(&config),
            serializer: LineSerializer::new(config.sclk_idle_high),
            ack: AckArbiter::new(config.ack_id),
            outputs: ControllerOutputs::idle(config.sclk_idle_high),
            fault: None,
            in_reset: false,
            stalled: 0,
            cycle: 0,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Outputs registered by the last step
    pub fn outputs(&self) -> ControllerOutputs {
        self.outputs
    }

    /// Sequencer state
    pub fn state(&self) -> SequencerState {
        self.sequencer.state()
    }

    /// Steps taken since creation
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// The latched fault, if any
    pub fn fault(&self) -> Option<Error> {
        self.fault
    }

    /// Headers dropped as malformed
    pub fn rejected_headers(&self) -> u32 {
        self.decoder.rejected()
    }

    /// Ack grants received
    pub fn acks_granted(&self) -> u32 {
        self.ack.granted()
    }

    /// Flash frames started
    pub fn frames_issued(&self) -> u32 {
        self.sequencer.frames_issued()
    }

    /// Returns true when the controller is waiting for a new request with
    /// nothing in flight
    pub fn is_idle(&self) -> bool {
        self.fault.is_none()
            && self.sequencer.state() == SequencerState::Idle
            && self.serializer.is_idle()
            && self.ack.is_idle()
            && self.decoder.is_idle()
            && self.links.to_flash.is_empty()
            && self.links.from_flash.is_empty()
    }

    /// Advance one clock
    ///
    /// Once a [`Error::ProtocolTimeout`] is raised it stays latched: the
    /// outputs go idle with `fault` set and every further step returns the
    /// same error until reset is asserted.
    pub fn step(&mut self, inputs: &ControllerInputs) -> Result<ControllerOutputs> {
        self.cycle += 1;

        if !inputs.rst_n {
            if !self.in_reset {
                log::debug!("controller: reset asserted at cycle {}", self.cycle);
            }
            self.in_reset = true;
            self.reset_all();
            self.fault = None;
            self.outputs = ControllerOutputs::idle(self.config.sclk_idle_high);
            return Ok(self.outputs);
        }
        if self.in_reset {
            log::debug!("controller: reset released at cycle {}", self.cycle);
            self.in_reset = false;
        }
        if let Some(err) = self.fault {
            return Err(err);
        }

        match self.clock(inputs) {
            Ok(outputs) => Ok(outputs),
            Err(err) => {
                log::error!("controller: {} at cycle {}", err, self.cycle);
                self.reset_all();
                self.fault = Some(err);
                self.outputs = ControllerOutputs {
                    fault: true,
                    ..ControllerOutputs::idle(self.config.sclk_idle_high)
                };
                Err(err)
            }
        }
    }

    fn clock(&mut self, inputs: &ControllerInputs) -> Result<ControllerOutputs> {
        let mut progress = self.decoder.clock(
            inputs.in_valid,
            inputs.in_data,
            inputs.out_ready,
            &mut self.links,
        );

        let mut ports = Ports {
            serializer: &mut self.serializer,
            links: &mut self.links,
            decoder: &mut self.decoder,
            ack: &mut self.ack,
        };
        progress |= self.sequencer.clock(&mut ports)?;
        progress |= self.serializer.tick(inputs.flash_io);
        self.ack.clock(inputs.ack_owned);
        self.decoder.update(&self.links);

        self.watchdog(progress)?;

        let host = self.decoder.outputs();
        let ack = self.ack.outputs();
        self.outputs = ControllerOutputs {
            in_ready: host.in_ready,
            out_valid: host.out_valid,
            out_data: host.out_data,
            ack_request: ack.request,
            ack_id: ack.id,
            pins: self.serializer.pins(),
            fault: false,
        };
        Ok(self.outputs)
    }

    fn watchdog(&mut self, progress: bool) -> Result<()> {
        if progress || !self.sequencer.in_flight() {
            self.stalled = 0;
            return Ok(());
        }
        self.stalled += 1;
        if self.stalled >= self.config.handshake_timeout_cycles {
            return Err(Error::ProtocolTimeout {
                waiting_for: self.sequencer.waiting_on(&self.serializer),
                waited: self.stalled,
            });
        }
        Ok(())
    }

    fn reset_all(&mut self) {
        self.decoder.reset();
        self.links.clear();
        self.sequencer.reset();
        self.serializer.reset();
        self.ack.reset();
        self.stalled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WaitTarget;

    #[test]
    fn test_invalid_config_rejected() {
        let config = ControllerConfig {
            max_status_polls: 0,
            ..Default::default()
        };
        assert!(matches!(
            MemController::new(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_ready_for_header_after_reset() {
        let mut ctrl = MemController::new(ControllerConfig::default()).unwrap();
        let held = ControllerInputs {
            rst_n: false,
            ..Default::default()
        };
        let out = ctrl.step(&held).unwrap();
        assert_eq!(out, ControllerOutputs::idle(true));

        let out = ctrl.step(&ControllerInputs::default()).unwrap();
        assert!(out.in_ready);
        assert_eq!(ctrl.state(), SequencerState::PowerUpReset);
        assert!(!out.ack_request);
    }

    #[test]
    fn test_fault_latches_until_reset() {
        let config = ControllerConfig {
            max_status_polls: 2,
            ..Default::default()
        };
        let mut ctrl = MemController::new(config).unwrap();
        let inputs = ControllerInputs::default();

        // Nothing drives IO1, so every status read returns 0xFF
        let err = (0..1_000)
            .find_map(|_| ctrl.step(&inputs).err())
            .unwrap();
        assert_eq!(
            err,
            Error::ProtocolTimeout {
                waiting_for: WaitTarget::WipClear,
                waited: 2
            }
        );
        assert!(ctrl.outputs().fault);
        assert!(ctrl.outputs().pins.cs_n);
        assert_eq!(ctrl.step(&inputs), Err(err));

        let reset = ControllerInputs {
            rst_n: false,
            ..Default::default()
        };
        assert!(ctrl.step(&reset).is_ok());
        assert!(ctrl.step(&inputs).is_ok());
        assert_eq!(ctrl.fault(), None);
    }
}

//! qspimem-core - Flash-backed memory controller for crypto accelerators
//!
//! This crate models, cycle by cycle, a controller that sits between a host
//! command bus (carrying typed read/write requests for AES and SHA
//! accelerators) and a serial NOR flash reached over a Quad-SPI link.
//!
//! The whole controller advances on a single clock: every call to
//! [`MemController::step`] samples the inputs, moves each internal state
//! machine forward by one cycle and returns the registered outputs. There
//! is no blocking anywhere; a component that waits simply stays where it is
//! until the peer handshake shows up on a later cycle.
//!
//! # Components
//!
//! - [`serializer::LineSerializer`] - turns flash commands into CS/SCLK/IO
//!   activity in 1, 2 or 4 lane widths and samples inbound data
//! - [`host::CommandDecoder`] - parses the 4-byte host header and relays the
//!   payload with backpressure
//! - [`sequencer::TransactionSequencer`] - flash initialization and per
//!   request opcode sequencing, owner of the write-in-progress lock
//! - [`ack::AckArbiter`] - completion notification on the shared ack bus
//! - [`controller::MemController`] - the top-level glue
//!
//! # Example
//!
//! ```ignore
//! use qspimem_core::{ControllerConfig, ControllerInputs, MemController};
//!
//! let mut ctrl = MemController::new(ControllerConfig::default())?;
//! let mut inputs = ControllerInputs::default();
//! loop {
//!     inputs.flash_io = device.respond(ctrl.outputs().pins);
//!     let outputs = ctrl.step(&inputs)?;
//!     // drive the host bus from `outputs`
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod ack;
pub mod config;
pub mod controller;
pub mod error;
pub mod host;
pub mod link;
pub mod sequencer;
pub mod serializer;
pub mod spi;
pub mod wire;

pub use config::{ControllerConfig, EraseOpcode};
pub use controller::{ControllerInputs, ControllerOutputs, MemController};
pub use error::{Error, Result, WaitTarget};
pub use host::{AccelId, CommandHeader, EncType, Operation};
pub use sequencer::SequencerState;
pub use spi::{Address24, Direction, FlashCommand, LaneWidth};
pub use wire::{LineDrive, QspiPins};

//! Bench error types

use qspimem_core::{Operation, SequencerState};
use qspimem_dummy::{DummyError, Violation};
use thiserror::Error;

/// Everything a bench run can fail with
#[derive(Debug, Error)]
pub enum BenchError {
    /// The controller latched a fault
    #[error(transparent)]
    Controller(#[from] qspimem_core::Error),
    /// The flash emulator rejected a setup call
    #[error(transparent)]
    Flash(#[from] DummyError),
    /// Bench configuration rejected
    #[error("invalid bench configuration: {0}")]
    InvalidConfig(&'static str),
    /// An operation ran past its cycle budget without the controller faulting
    #[error("no completion after {cycles} cycles (sequencer in {state:?})")]
    Stalled {
        /// Cycles spent
        cycles: u64,
        /// Sequencer state when the budget ran out
        state: SequencerState,
    },
    /// The ack bus contract was broken
    #[error("ack bus violation at cycle {cycle}: {what}")]
    AckDiscipline {
        /// Bench cycle
        cycle: u64,
        /// What went wrong
        what: &'static str,
    },
    /// Data read back differs from what was written
    #[error("data mismatch at byte {index}: expected {expected:#04x}, got {actual:#04x}")]
    DataMismatch {
        /// Byte offset
        index: usize,
        /// Byte written
        expected: u8,
        /// Byte read back
        actual: u8,
    },
    /// Read-back length differs from what was written
    #[error("read {actual} bytes, expected {expected}")]
    LengthMismatch {
        /// Bytes written
        expected: usize,
        /// Bytes read back
        actual: usize,
    },
    /// The flash saw something its contract forbids
    #[error("flash contract violation: {0}")]
    DeviceViolation(Violation),
    /// Controller and flash drove the same IO line
    #[error("bus contention on {0} cycles")]
    Contention(u32),
    /// Something was active while the controller should have been quiet
    #[error("idle invariant broken at cycle {cycle}: {what}")]
    IdleViolation {
        /// Bench cycle
        cycle: u64,
        /// Which output was active
        what: &'static str,
    },
    /// Payload length does not match the header
    #[error("{operation:?} carries {expected} bytes, got {actual}")]
    PayloadLength {
        /// Operation from the header
        operation: Operation,
        /// Length the header implies
        expected: usize,
        /// Length supplied
        actual: usize,
    },
    /// The header does not move data in the requested direction
    #[error("{0:?} cannot be used for this transfer")]
    WrongDirection(Operation),
}

/// Result type for bench operations
pub type Result<T> = std::result::Result<T, BenchError>;

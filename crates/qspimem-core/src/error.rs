//! Error types for qspimem-core
//!
//! The controller reports failures structurally through its outputs; this
//! type is what [`MemController::step`](crate::MemController::step) hands
//! back to the caller when a run cannot continue.

use core::fmt;

/// The handshake the sequencer was waiting on when it gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    /// The line serializer needed a payload byte that never arrived
    TxReady,
    /// An inbound byte could not be handed on to the host side
    RxValid,
    /// A flash frame never finished
    Done,
    /// The status register kept reporting write-in-progress
    WipClear,
}

/// Why a host header was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// Opcode bits were `11`
    Opcode(u8),
    /// The (source, dest) pair is not legal for the operation
    Pairing {
        /// Raw source id
        source: u8,
        /// Raw destination id
        dest: u8,
    },
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Header decoded to an illegal opcode/source/dest combination
    MalformedCommand(MalformedReason),
    /// A peer handshake did not arrive within the configured budget
    ProtocolTimeout {
        /// What the sequencer was waiting on
        waiting_for: WaitTarget,
        /// Cycles (or status polls, for [`WaitTarget::WipClear`]) spent waiting
        waited: u32,
    },
    /// A flash frame was started while the serializer was still busy
    SerializerBusy,
    /// A completion was signalled while an ack request was still pending
    AckPending,
    /// Configuration value out of range
    InvalidConfig(&'static str),
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opcode(op) => write!(f, "illegal opcode bits {:#04b}", op),
            Self::Pairing { source, dest } => {
                write!(f, "illegal pairing source={:#04b} dest={:#04b}", source, dest)
            }
        }
    }
}

impl fmt::Display for WaitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TxReady => write!(f, "TX ready"),
            Self::RxValid => write!(f, "RX valid"),
            Self::Done => write!(f, "frame done"),
            Self::WipClear => write!(f, "WIP clear"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedCommand(reason) => write!(f, "malformed command: {}", reason),
            Self::ProtocolTimeout {
                waiting_for: WaitTarget::WipClear,
                waited,
            } => write!(f, "protocol timeout: WIP still set after {} status polls", waited),
            Self::ProtocolTimeout {
                waiting_for,
                waited,
            } => write!(
                f,
                "protocol timeout: no {} after {} cycles",
                waiting_for, waited
            ),
            Self::SerializerBusy => write!(f, "line serializer busy"),
            Self::AckPending => write!(f, "ack request already pending"),
            Self::InvalidConfig(what) => write!(f, "invalid configuration: {}", what),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

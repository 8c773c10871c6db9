//! Host command header
//!
//! Every host transaction opens with four bytes:
//!
//! | Byte | Bits | Field |
//! |------|------|-------|
//! | 0 | 7 | encryption direction |
//! | 0 | 6 | reserved (ignored) |
//! | 0 | 5:4 | destination id |
//! | 0 | 3:2 | source id |
//! | 0 | 1:0 | opcode |
//! | 1..=3 | | 24-bit address, first byte received is bits [7:0] |

use crate::error::{Error, MalformedReason, Result};
use crate::spi::{Address24, Direction};

/// Accelerator / module id on the host and ack buses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AccelId {
    /// This memory controller
    #[default]
    Mem,
    /// SHA accelerator
    Sha,
    /// AES accelerator
    Aes,
    /// Unassigned id `11`
    Reserved,
}

impl AccelId {
    /// Decode from the two low bits
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::Mem,
            0b01 => Self::Sha,
            0b10 => Self::Aes,
            _ => Self::Reserved,
        }
    }

    /// The two bit encoding
    pub const fn bits(&self) -> u8 {
        match self {
            Self::Mem => 0b00,
            Self::Sha => 0b01,
            Self::Aes => 0b10,
            Self::Reserved => 0b11,
        }
    }
}

/// Requested operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Fetch an AES key from flash
    ReadKey,
    /// Fetch plaintext/ciphertext from flash
    ReadText,
    /// Store an accelerator result in flash
    WriteResult,
    /// Illegal opcode or id pairing
    Invalid,
}

impl Operation {
    /// The two bit opcode (`11` for [`Operation::Invalid`])
    pub const fn bits(&self) -> u8 {
        match self {
            Self::ReadKey => 0b00,
            Self::ReadText => 0b01,
            Self::WriteResult => 0b10,
            Self::Invalid => 0b11,
        }
    }
}

/// Encryption direction carried for the accelerators' benefit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EncType {
    /// Bit 7 clear
    #[default]
    Encrypt,
    /// Bit 7 set
    Decrypt,
}

/// A decoded host header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    /// Requested operation
    pub operation: Operation,
    /// Source module id
    pub source: AccelId,
    /// Destination module id
    pub dest: AccelId,
    /// Encryption direction
    pub enc_type: EncType,
    /// Flash address
    pub address: Address24,
}

impl CommandHeader {
    /// Header length on the host bus
    pub const LEN: usize = 4;

    /// Decode four header bytes in arrival order
    ///
    /// Illegal opcode/source/dest combinations decode with
    /// [`Operation::Invalid`]; use [`CommandHeader::validate_bytes`] for
    /// the reason.
    pub fn decode(bytes: [u8; Self::LEN]) -> Self {
        let op_bits = bytes[0] & 0b11;
        let source = AccelId::from_bits(bytes[0] >> 2);
        let dest = AccelId::from_bits(bytes[0] >> 4);
        let enc_type = if bytes[0] & 0x80 != 0 {
            EncType::Decrypt
        } else {
            EncType::Encrypt
        };
        let operation = match op_bits {
            0b00 => Operation::ReadKey,
            0b01 => Operation::ReadText,
            0b10 => Operation::WriteResult,
            _ => Operation::Invalid,
        };
        let mut header = Self {
            operation,
            source,
            dest,
            enc_type,
            address: Address24::from_arrival_bytes([bytes[1], bytes[2], bytes[3]]),
        };
        if header.transfer_len().is_none() {
            header.operation = Operation::Invalid;
        }
        header
    }

    /// Encode back to the four host bytes
    pub fn encode(&self) -> [u8; Self::LEN] {
        let enc = match self.enc_type {
            EncType::Encrypt => 0,
            EncType::Decrypt => 0x80,
        };
        let first = enc | (self.dest.bits() << 4) | (self.source.bits() << 2) | self.operation.bits();
        let addr = self.address.to_arrival_bytes();
        [first, addr[0], addr[1], addr[2]]
    }

    /// ReadKey for the AES accelerator
    pub const fn read_key(address: Address24) -> Self {
        Self {
            operation: Operation::ReadKey,
            source: AccelId::Aes,
            dest: AccelId::Mem,
            enc_type: EncType::Encrypt,
            address,
        }
    }

    /// ReadText on behalf of `accel`
    pub const fn read_text(accel: AccelId, address: Address24) -> Self {
        Self {
            operation: Operation::ReadText,
            source: accel,
            dest: AccelId::Mem,
            enc_type: EncType::Encrypt,
            address,
        }
    }

    /// WriteResult of `accel` (memory is the source, the accelerator the
    /// destination of the result)
    pub const fn write_result(accel: AccelId, address: Address24) -> Self {
        Self {
            operation: Operation::WriteResult,
            source: AccelId::Mem,
            dest: accel,
            enc_type: EncType::Encrypt,
            address,
        }
    }

    /// Set the encryption direction
    pub const fn with_enc_type(mut self, enc_type: EncType) -> Self {
        self.enc_type = enc_type;
        self
    }

    /// The accelerator this request is for (the side that is not memory)
    pub const fn accelerator(&self) -> AccelId {
        match self.source {
            AccelId::Mem => self.dest,
            other => other,
        }
    }

    /// Payload length, or `None` if the header is not legal
    pub const fn transfer_len(&self) -> Option<u16> {
        use AccelId::*;
        match (self.operation, self.source, self.dest) {
            (Operation::ReadKey, Aes, Mem) => Some(32),
            (Operation::ReadText, Aes, Mem) => Some(16),
            (Operation::ReadText, Sha, Mem) => Some(32),
            (Operation::WriteResult, Mem, Aes) | (Operation::WriteResult, Aes, Mem) => Some(16),
            (Operation::WriteResult, Mem, Sha) | (Operation::WriteResult, Sha, Mem) => Some(32),
            _ => None,
        }
    }

    /// Direction of the payload relative to the flash
    pub const fn direction(&self) -> Option<Direction> {
        match self.operation {
            Operation::ReadKey | Operation::ReadText => Some(Direction::FromFlash),
            Operation::WriteResult => Some(Direction::ToFlash),
            Operation::Invalid => None,
        }
    }

    /// Returns true if the header passed validation
    pub const fn is_valid(&self) -> bool {
        !matches!(self.operation, Operation::Invalid)
    }

    /// Re-check raw header bytes and report why they are not legal
    pub fn validate_bytes(bytes: [u8; Self::LEN]) -> Result<Self> {
        let op_bits = bytes[0] & 0b11;
        if op_bits == 0b11 {
            return Err(Error::MalformedCommand(MalformedReason::Opcode(op_bits)));
        }
        let header = Self::decode(bytes);
        if !header.is_valid() {
            return Err(Error::MalformedCommand(MalformedReason::Pairing {
                source: (bytes[0] >> 2) & 0b11,
                dest: (bytes[0] >> 4) & 0b11,
            }));
        }
        Ok(header)
    }
}

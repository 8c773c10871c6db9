//! Controller configuration

use crate::error::{Error, Result};
use crate::host::AccelId;
use crate::spi::opcodes;

/// Which chip erase opcode the initialization sequence uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EraseOpcode {
    /// 0xC7
    #[default]
    C7,
    /// 0x60
    #[cfg_attr(feature = "serde", serde(rename = "60"))]
    X60,
}

impl EraseOpcode {
    /// The opcode byte
    pub const fn opcode(&self) -> u8 {
        match self {
            Self::C7 => opcodes::CE_C7,
            Self::X60 => opcodes::CE_60,
        }
    }
}

/// Tunables for a [`MemController`](crate::MemController)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ControllerConfig {
    /// Fixed id this controller presents on the ack bus
    pub ack_id: AccelId,
    /// Cycles a flash transaction may go without progress before it is
    /// declared a protocol timeout
    pub handshake_timeout_cycles: u32,
    /// Status polls one busy-wait loop may issue before giving up
    pub max_status_polls: u32,
    /// Chip erase opcode used during initialization
    pub erase_opcode: EraseOpcode,
    /// SCLK level while chip select is released
    pub sclk_idle_high: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            ack_id: AccelId::Mem,
            handshake_timeout_cycles: 10_000,
            max_status_polls: 65_536,
            erase_opcode: EraseOpcode::C7,
            sclk_idle_high: true,
        }
    }
}

impl ControllerConfig {
    /// Check the configuration for values the controller cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.handshake_timeout_cycles == 0 {
            return Err(Error::InvalidConfig("handshake_timeout_cycles must be non-zero"));
        }
        if self.max_status_polls == 0 {
            return Err(Error::InvalidConfig("max_status_polls must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ack_id, AccelId::Mem);
        assert_eq!(config.erase_opcode.opcode(), 0xC7);
    }

    #[test]
    fn test_zero_budgets_rejected() {
        let config = ControllerConfig {
            handshake_timeout_cycles: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}

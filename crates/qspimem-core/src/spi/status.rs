//! Flash status register flags

use bitflags::bitflags;

use super::opcodes;

bitflags! {
    /// Status register 1
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Status1: u8 {
        /// Write In Progress - an erase, program or register write is running
        const WIP = opcodes::SR1_WIP;
        /// Write Enable Latch
        const WEL = opcodes::SR1_WEL;
    }
}

bitflags! {
    /// Status register 2
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Status2: u8 {
        /// Quad Enable - 4-lane transfers are legal
        const QE = opcodes::SR2_QE;
    }
}

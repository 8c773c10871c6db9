//! SPI flash types and command descriptors
//!
//! This module provides the flash-side vocabulary: lane widths, 24-bit
//! addresses, status register flags, the opcodes this controller issues
//! and the per-frame [`FlashCommand`] descriptor.

mod address;
mod command;
mod lanes;
pub mod opcodes;
mod status;

pub use address::Address24;
pub use command::FlashCommand;
pub use lanes::{Direction, LaneWidth};
pub use status::{Status1, Status2};

//! SPI NOR flash opcodes used by the controller and the emulator
//!
//! Standard JEDEC opcodes plus the vendor specific global unlock. Only the
//! subset the controller actually drives, and the few extra the emulator
//! answers, are listed here.

// ============================================================================
// Write control
// ============================================================================

/// Write Enable - required before any program/erase/status write
pub const WREN: u8 = 0x06;
/// Write Disable - clears WEL
pub const WRDI: u8 = 0x04;

// ============================================================================
// Status register operations
// ============================================================================

/// Read Status Register 1 (WIP, WEL)
pub const RDSR: u8 = 0x05;
/// Read Status Register 2 (QE)
pub const RDSR2: u8 = 0x35;
/// Write Status Register 2
pub const WRSR2: u8 = 0x31;

// ============================================================================
// Identification
// ============================================================================

/// Read JEDEC ID (manufacturer + device ID)
pub const RDID: u8 = 0x9F;

// ============================================================================
// Read commands - 3-byte address
// ============================================================================

/// Read Data
pub const READ: u8 = 0x03;
/// Fast Read (8 dummy clocks)
pub const FAST_READ: u8 = 0x0B;
/// Dual Output Read (1-1-2, 8 dummy clocks)
pub const DOR: u8 = 0x3B;
/// Quad Output Read (1-1-4, 8 dummy clocks)
pub const QOR: u8 = 0x6B;

// ============================================================================
// Page Program
// ============================================================================

/// Page Program (1-1-1)
pub const PP: u8 = 0x02;
/// Quad Page Program (1-1-4)
pub const QPP: u8 = 0x32;

// ============================================================================
// Erase and protection
// ============================================================================

/// Chip Erase (entire chip)
pub const CE_60: u8 = 0x60;
/// Chip Erase (alternate opcode)
pub const CE_C7: u8 = 0xC7;
/// Global Block Protection Unlock
pub const ULBPR: u8 = 0x98;

// ============================================================================
// Reset
// ============================================================================

/// Reset Enable
pub const RSTEN: u8 = 0x66;
/// Reset Device (must follow RSTEN)
pub const RST: u8 = 0x99;

// ============================================================================
// Status register bits
// ============================================================================

/// SR1: Write In Progress
pub const SR1_WIP: u8 = 0x01;
/// SR1: Write Enable Latch
pub const SR1_WEL: u8 = 0x02;
/// SR2: Quad Enable
pub const SR2_QE: u8 = 0x02;

/// Dummy clocks between address and data for the fast, dual and quad reads
pub const READ_DUMMY_CLOCKS: u8 = 8;

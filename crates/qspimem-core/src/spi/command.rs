//! Flash command descriptor

use super::{opcodes, Address24, Direction, LaneWidth};

/// One chip-select framed flash transaction
///
/// The opcode and address always go out on a single lane. Dummy bytes are
/// clocked on a single lane with every output tri-stated. The data phase
/// uses `lane_width` in `direction` for `data_len` bytes; the bytes
/// themselves are handed over one at a time through the serializer's
/// handshake rather than stored here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlashCommand {
    /// The opcode byte
    pub opcode: u8,
    /// Address (if any), sent most significant byte first
    pub address: Option<Address24>,
    /// Dummy bytes after the address (8 clocks each)
    pub dummy_bytes: u8,
    /// Direction of the data phase
    pub direction: Direction,
    /// Lane width of the data phase
    pub lane_width: LaneWidth,
    /// Number of data bytes
    pub data_len: u16,
}

impl FlashCommand {
    /// Create a simple command with no address or data (e.g., WREN)
    pub const fn simple(opcode: u8) -> Self {
        Self {
            opcode,
            address: None,
            dummy_bytes: 0,
            direction: Direction::ToFlash,
            lane_width: LaneWidth::X1,
            data_len: 0,
        }
    }

    /// Create a one byte register read (e.g., RDSR)
    pub const fn read_reg(opcode: u8) -> Self {
        Self {
            opcode,
            address: None,
            dummy_bytes: 0,
            direction: Direction::FromFlash,
            lane_width: LaneWidth::X1,
            data_len: 1,
        }
    }

    /// Create a one byte register write (e.g., WRSR2)
    pub const fn write_reg(opcode: u8) -> Self {
        Self {
            opcode,
            address: None,
            dummy_bytes: 0,
            direction: Direction::ToFlash,
            lane_width: LaneWidth::X1,
            data_len: 1,
        }
    }

    /// Quad output read (1-1-4) with the fixed dummy byte
    pub const fn quad_read(address: Address24, len: u16) -> Self {
        Self {
            opcode: opcodes::QOR,
            address: Some(address),
            dummy_bytes: opcodes::READ_DUMMY_CLOCKS / 8,
            direction: Direction::FromFlash,
            lane_width: LaneWidth::X4,
            data_len: len,
        }
    }

    /// Dual output read (1-1-2) with the fixed dummy byte
    pub const fn dual_read(address: Address24, len: u16) -> Self {
        Self {
            opcode: opcodes::DOR,
            address: Some(address),
            dummy_bytes: opcodes::READ_DUMMY_CLOCKS / 8,
            direction: Direction::FromFlash,
            lane_width: LaneWidth::X2,
            data_len: len,
        }
    }

    /// Quad page program (1-1-4)
    pub const fn quad_program(address: Address24, len: u16) -> Self {
        Self {
            opcode: opcodes::QPP,
            address: Some(address),
            dummy_bytes: 0,
            direction: Direction::ToFlash,
            lane_width: LaneWidth::X4,
            data_len: len,
        }
    }

    /// Number of single-lane header bytes (opcode plus address)
    pub const fn header_len(&self) -> u8 {
        match self.address {
            Some(_) => 4,
            None => 1,
        }
    }

    /// Header byte `index` in wire order
    pub const fn header_byte(&self, index: u8) -> u8 {
        match (index, self.address) {
            (0, _) => self.opcode,
            (i, Some(addr)) if i < 4 => addr.to_wire_bytes()[(i - 1) as usize],
            _ => 0,
        }
    }

    /// Returns true if this command has a data phase
    pub const fn has_data(&self) -> bool {
        self.data_len > 0
    }

    /// Total SCLK cycles the frame takes when never stalled
    pub const fn total_clocks(&self) -> u32 {
        let header = self.header_len() as u32 * 8;
        let dummy = self.dummy_bytes as u32 * 8;
        let data = self.data_len as u32 * self.lane_width.clocks_per_byte() as u32;
        header + dummy + data
    }
}

//! Line serializer: flash frames to CS/SCLK/IO activity
//!
//! The serializer runs one [`FlashCommand`] at a time. Each bit takes two
//! controller cycles: a setup cycle that pulls SCLK low and drives the
//! outbound bits, then a sample cycle that raises SCLK and latches the
//! inbound bits. Opcode and address always go out on IO0; dummy bytes are
//! clocked with every lane released; the data phase uses the command's
//! lane width.
//!
//! Data bytes are exchanged through a one byte holding register in each
//! direction. When the next outbound byte has not been pushed, or the last
//! inbound byte has not been taken, the serializer parks with SCLK high and
//! chip select still asserted until the handshake completes. The last
//! inbound byte must be taken before chip select is released.

use crate::error::{Error, Result, WaitTarget};
use crate::spi::{Direction, FlashCommand, LaneWidth};
use crate::wire::QspiPins;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Select,
    Header,
    Dummy,
    Data,
    Release,
}

/// What a single clocked phase moves
#[derive(Debug, Clone, Copy)]
struct Lanes {
    width: LaneWidth,
    /// `None` while clocking dummy bytes
    direction: Option<Direction>,
}

/// Bit/nibble serializer for one flash frame at a time
#[derive(Debug)]
pub struct LineSerializer {
    sclk_idle_high: bool,
    cmd: FlashCommand,
    phase: Phase,
    /// Byte index within the current phase
    index: u16,
    /// Clock index within the current byte
    clock: u8,
    /// The next tick is the rising (sample) half of a bit
    sampling: bool,
    shift: u8,
    tx: Option<u8>,
    rx: Option<u8>,
    done: bool,
    pins: QspiPins,
}

impl LineSerializer {
    /// Create an idle serializer
    pub const fn new(sclk_idle_high: bool) -> Self {
        Self {
            sclk_idle_high,
            cmd: FlashCommand::simple(0),
            phase: Phase::Idle,
            index: 0,
            clock: 0,
            sampling: false,
            shift: 0,
            tx: None,
            rx: None,
            done: false,
            pins: QspiPins::idle(sclk_idle_high),
        }
    }

    /// Return to idle, dropping any frame in flight
    pub fn reset(&mut self) {
        *self = Self::new(self.sclk_idle_high);
    }

    /// Begin a new frame; chip select asserts on the next tick
    pub fn start(&mut self, cmd: FlashCommand) -> Result<()> {
        if self.phase != Phase::Idle {
            return Err(Error::SerializerBusy);
        }
        log::trace!(
            "serializer: start opcode {:#04x} ({} clocks)",
            cmd.opcode,
            cmd.total_clocks()
        );
        self.cmd = cmd;
        self.phase = Phase::Select;
        self.index = 0;
        self.clock = 0;
        self.sampling = false;
        self.tx = None;
        self.rx = None;
        self.done = false;
        Ok(())
    }

    /// Returns true when no frame is in flight
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// Outbound holding register is empty
    pub fn tx_ready(&self) -> bool {
        self.phase == Phase::Data && self.cmd.direction == Direction::ToFlash && self.tx.is_none()
    }

    /// Hand over the next outbound data byte; returns true if it was taken
    pub fn push_tx(&mut self, byte: u8) -> bool {
        if !self.tx_ready() {
            return false;
        }
        self.tx = Some(byte);
        true
    }

    /// An inbound data byte is waiting
    pub fn rx_valid(&self) -> bool {
        self.rx.is_some()
    }

    /// Take the waiting inbound byte
    pub fn take_rx(&mut self) -> Option<u8> {
        self.rx.take()
    }

    /// Consume the end-of-frame flag
    ///
    /// Set on the tick that releases chip select and held until taken.
    pub fn take_done(&mut self) -> bool {
        core::mem::take(&mut self.done)
    }

    /// Registered pin state
    pub fn pins(&self) -> QspiPins {
        self.pins
    }

    /// The handshake a parked frame is waiting for, if any
    pub fn stalled_on(&self) -> Option<WaitTarget> {
        if self.phase == Phase::Release && self.rx.is_some() {
            return Some(WaitTarget::RxValid);
        }
        if self.phase != Phase::Data || self.sampling || self.clock != 0 {
            return None;
        }
        match self.cmd.direction {
            Direction::ToFlash if self.tx.is_none() => Some(WaitTarget::TxReady),
            Direction::FromFlash if self.rx.is_some() => Some(WaitTarget::RxValid),
            _ => None,
        }
    }

    /// Advance one controller cycle
    ///
    /// `io_in` is what the controller sees on IO[3:0] this cycle. Returns
    /// true if the pins moved or the frame advanced.
    pub fn tick(&mut self, io_in: u8) -> bool {
        match self.phase {
            Phase::Idle => false,
            Phase::Select => {
                self.pins = QspiPins {
                    cs_n: false,
                    sclk: self.sclk_idle_high,
                    io: 0,
                    io_oe: 0,
                };
                self.phase = Phase::Header;
                true
            }
            Phase::Header => {
                if self.at_byte_start() {
                    self.shift = self.cmd.header_byte(self.index as u8);
                }
                let lanes = Lanes {
                    width: LaneWidth::X1,
                    direction: Some(Direction::ToFlash),
                };
                if self.clock_bit(lanes, io_in) {
                    self.index += 1;
                    if self.index == self.cmd.header_len() as u16 {
                        self.enter_after_header();
                    }
                }
                true
            }
            Phase::Dummy => {
                let lanes = Lanes {
                    width: LaneWidth::X1,
                    direction: None,
                };
                if self.clock_bit(lanes, io_in) {
                    self.index += 1;
                    if self.index == self.cmd.dummy_bytes as u16 {
                        self.enter_data_or_release();
                    }
                }
                true
            }
            Phase::Data => {
                if self.stalled_on().is_some() {
                    return false;
                }
                if self.at_byte_start() && self.cmd.direction == Direction::ToFlash {
                    // stalled_on() guarantees a byte is waiting here
                    self.shift = self.tx.take().unwrap_or(0xFF);
                }
                let lanes = Lanes {
                    width: self.cmd.lane_width,
                    direction: Some(self.cmd.direction),
                };
                if self.clock_bit(lanes, io_in) {
                    if self.cmd.direction == Direction::FromFlash {
                        self.rx = Some(self.shift);
                    }
                    self.index += 1;
                    if self.index == self.cmd.data_len {
                        self.phase = Phase::Release;
                    }
                }
                true
            }
            Phase::Release => {
                if self.rx.is_some() {
                    return false;
                }
                self.pins = QspiPins::idle(self.sclk_idle_high);
                self.phase = Phase::Idle;
                self.done = true;
                true
            }
        }
    }

    fn at_byte_start(&self) -> bool {
        !self.sampling && self.clock == 0
    }

    fn enter_after_header(&mut self) {
        self.index = 0;
        if self.cmd.dummy_bytes > 0 {
            self.phase = Phase::Dummy;
        } else {
            self.enter_data_or_release();
        }
    }

    fn enter_data_or_release(&mut self) {
        self.index = 0;
        self.phase = if self.cmd.has_data() {
            Phase::Data
        } else {
            Phase::Release
        };
    }

    /// Run half a bit; returns true when the last bit of a byte was sampled
    fn clock_bit(&mut self, lanes: Lanes, io_in: u8) -> bool {
        let shift_by = lanes.width.lanes();
        if !self.sampling {
            self.pins.sclk = false;
            match lanes.direction {
                Some(Direction::ToFlash) => {
                    self.pins.io = lanes.width.drive(self.shift);
                    self.pins.io_oe = lanes.width.output_mask();
                }
                _ => {
                    self.pins.io = 0;
                    self.pins.io_oe = 0;
                }
            }
            self.sampling = true;
            return false;
        }

        self.pins.sclk = true;
        self.sampling = false;
        self.shift = match lanes.direction {
            Some(Direction::FromFlash) => (self.shift << shift_by) | lanes.width.sample(io_in),
            _ => self.shift << shift_by,
        };
        self.clock += 1;
        if self.clock == lanes.width.clocks_per_byte() {
            self.clock = 0;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spi::{opcodes, Address24};

    /// Collect the bits driven on each rising edge until the frame ends
    fn run_out(ser: &mut LineSerializer, payload: &[u8]) -> std::vec::Vec<QspiPins> {
        let mut edges = std::vec::Vec::new();
        let mut data = payload.iter();
        let mut last = ser.pins();
        for _ in 0..10_000 {
            if ser.tx_ready() {
                if let Some(&b) = data.next() {
                    ser.push_tx(b);
                }
            }
            ser.tick(0xF);
            let pins = ser.pins();
            if !last.sclk && pins.sclk && pins.is_selected() {
                edges.push(pins);
            }
            last = pins;
            if ser.take_done() {
                break;
            }
        }
        edges
    }

    fn collect_x1(edges: &[QspiPins]) -> std::vec::Vec<u8> {
        edges
            .chunks(8)
            .map(|bits| bits.iter().fold(0u8, |acc, p| (acc << 1) | (p.io & 1)))
            .collect()
    }

    #[test]
    fn test_simple_command_frame() {
        let mut ser = LineSerializer::new(true);
        assert!(ser.pins().cs_n);
        ser.start(FlashCommand::simple(opcodes::WREN)).unwrap();
        assert_eq!(ser.start(FlashCommand::simple(opcodes::WREN)), Err(Error::SerializerBusy));

        let edges = run_out(&mut ser, &[]);
        assert_eq!(edges.len(), 8);
        assert!(edges.iter().all(|p| p.io_oe == 0b0001));
        assert_eq!(collect_x1(&edges), [opcodes::WREN]);
        assert!(ser.is_idle());
        assert_eq!(ser.pins(), QspiPins::idle(true));
    }

    #[test]
    fn test_quad_program_frame() {
        let mut ser = LineSerializer::new(true);
        let cmd = FlashCommand::quad_program(Address24::truncate(0x123456), 2);
        ser.start(cmd).unwrap();
        let edges = run_out(&mut ser, &[0xA5, 0x3C]);
        assert_eq!(edges.len() as u32, cmd.total_clocks());

        assert_eq!(collect_x1(&edges[..32]), [opcodes::QPP, 0x12, 0x34, 0x56]);
        let nibbles: std::vec::Vec<u8> = edges[32..].iter().map(|p| p.io).collect();
        assert_eq!(nibbles, [0xA, 0x5, 0x3, 0xC]);
        assert!(edges[32..].iter().all(|p| p.io_oe == 0b1111));
    }

    #[test]
    fn test_dual_write_frame() {
        let mut ser = LineSerializer::new(true);
        let cmd = FlashCommand {
            lane_width: LaneWidth::X2,
            ..FlashCommand::quad_program(Address24::truncate(0x000100), 1)
        };
        ser.start(cmd).unwrap();
        let edges = run_out(&mut ser, &[0xB4]);
        assert_eq!(edges.len(), 32 + 4);

        assert_eq!(collect_x1(&edges[..32]), [opcodes::QPP, 0x00, 0x01, 0x00]);
        let pairs: std::vec::Vec<(u8, u8)> = edges[32..].iter().map(|p| (p.io, p.io_oe)).collect();
        assert_eq!(pairs, [(0b10, 0b0011), (0b11, 0b0011), (0b01, 0b0011), (0b00, 0b0011)]);
    }

    #[test]
    fn test_dual_read_frame() {
        let mut ser = LineSerializer::new(true);
        ser.start(FlashCommand::dual_read(Address24::truncate(0), 1)).unwrap();
        // Select, then opcode, address and dummy byte at two ticks per clock
        for _ in 0..(1 + 40 * 2) {
            ser.tick(0xF);
        }
        // 0xB4 as bit pairs on IO[1:0], most significant first
        for pair in [0b10u8, 0b11, 0b01, 0b00] {
            ser.tick(0xF);
            assert!(!ser.pins().sclk);
            assert_eq!(ser.pins().io_oe, 0);
            ser.tick(0b1100 | pair);
        }
        assert_eq!(ser.take_rx(), Some(0xB4));
        ser.tick(0xF);
        assert!(ser.take_done());
    }

    #[test]
    fn test_stall_holds_clock_high() {
        let mut ser = LineSerializer::new(true);
        ser.start(FlashCommand::write_reg(opcodes::WRSR2)).unwrap();
        for _ in 0..17 {
            ser.tick(0xF);
        }
        assert_eq!(ser.stalled_on(), Some(WaitTarget::TxReady));
        let parked = ser.pins();
        assert!(parked.sclk);
        assert!(parked.is_selected());
        assert!(!ser.tick(0xF));
        assert_eq!(ser.pins(), parked);

        assert!(ser.push_tx(0x02));
        assert!(!ser.push_tx(0x03));
        assert!(ser.tick(0xF));
        assert!(!ser.pins().sclk);
    }

    #[test]
    fn test_register_read_samples_io1() {
        let mut ser = LineSerializer::new(true);
        ser.start(FlashCommand::read_reg(opcodes::RDSR)).unwrap();
        // Header: select + 8 bits
        for _ in 0..17 {
            ser.tick(0xF);
        }
        // Feed 0b1000_0001 on IO1, one bit per rising edge
        let value = 0x81u8;
        for bit in (0..8).rev() {
            ser.tick(0xF);
            assert_eq!(ser.pins().io_oe, 0);
            let level = (value >> bit) & 1;
            ser.tick(0b1101 | (level << 1));
        }
        assert!(ser.rx_valid());
        assert_eq!(ser.take_rx(), Some(0x81));
        ser.tick(0xF);
        assert!(ser.take_done());
        assert!(!ser.take_done());
    }

    #[test]
    fn test_quad_read_dummy_releases_lanes() {
        let mut ser = LineSerializer::new(true);
        let cmd = FlashCommand::quad_read(Address24::truncate(0), 1);
        ser.start(cmd).unwrap();
        let mut oe_seen = std::vec::Vec::new();
        for _ in 0..(1 + cmd.total_clocks() * 2) {
            ser.tick(0x7);
            if !ser.pins().sclk {
                oe_seen.push(ser.pins().io_oe);
            }
        }
        assert_eq!(&oe_seen[..32], &[0b0001; 32]);
        assert_eq!(&oe_seen[32..], &[0; 10]);
        assert_eq!(ser.take_rx(), Some(0x77));
    }
}

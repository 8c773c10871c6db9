//! qspimem-dummy - Cycle-level SPI NOR flash emulator
//!
//! This crate emulates a serial NOR flash at the pin level so the
//! controller core can be exercised without hardware. Call
//! [`DummyFlash::clock`] once per controller cycle with the controller's
//! pins; it returns what the device drives back onto IO[3:0].
//!
//! The emulator samples on rising SCLK edges and shifts data out after
//! falling edges (SPI mode 0 or 3). Commands take effect when chip select
//! is released. Anything the controller does that a real part would
//! reject or ignore is recorded as a [`Violation`].

use qspimem_core::spi::{opcodes, LaneWidth, Status1, Status2};
use qspimem_core::wire::{LineDrive, QspiPins};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the emulator's host-side helpers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DummyError {
    /// Range falls outside the array
    #[error("range {addr:#08x}+{len} is outside the {size} byte array")]
    OutOfBounds {
        /// Start address
        addr: u32,
        /// Length in bytes
        len: usize,
        /// Array size
        size: usize,
    },
    /// Configuration rejected
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Result type for emulator helpers
pub type Result<T> = std::result::Result<T, DummyError>;

/// Something the controller did that the device contract does not allow
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum Violation {
    /// Opcode other than a status read while an operation was running
    #[error("opcode {opcode:#04x} sent while write in progress")]
    WhileBusy {
        /// Offending opcode
        opcode: u8,
    },
    /// Quad transfer with QE clear
    #[error("quad opcode {opcode:#04x} sent with QE clear")]
    QuadDisabled {
        /// Offending opcode
        opcode: u8,
    },
    /// Program, erase, unlock or status write without WEL
    #[error("opcode {opcode:#04x} sent without write enable")]
    WriteNotEnabled {
        /// Offending opcode
        opcode: u8,
    },
    /// Program or erase while block protection is locked
    #[error("opcode {opcode:#04x} hit locked block protection")]
    Protected {
        /// Offending opcode
        opcode: u8,
    },
    /// Opcode the emulator does not implement
    #[error("unknown opcode {opcode:#04x}")]
    UnknownOpcode {
        /// Offending opcode
        opcode: u8,
    },
    /// Chip select released in the middle of a byte
    #[error("chip select released mid-byte (opcode {opcode:02x?})")]
    PartialByte {
        /// Opcode, if the first byte completed
        opcode: Option<u8>,
    },
}

/// Configuration for the dummy flash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DummyConfig {
    /// Bytes returned by RDID
    pub jedec_id: [u8; 3],
    /// Flash size in bytes (power of two, at most 16 MiB)
    pub size: usize,
    /// Page size for programming (power of two)
    pub page_size: usize,
    /// Cycles WIP stays set after a chip erase
    pub erase_cycles: u32,
    /// Cycles WIP stays set after a page program
    pub program_cycles: u32,
    /// Cycles WIP stays set after a status register write
    pub status_write_cycles: u32,
    /// Cycles WIP stays set after a software reset
    pub reset_cycles: u32,
    /// QE already set at power-up
    pub initial_qe: bool,
    /// Block protection locked at power-up and after reset
    pub locked: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            jedec_id: [0xBF, 0x26, 0x43],
            size: 16 * 1024 * 1024,
            page_size: 256,
            erase_cycles: 2_000,
            program_cycles: 300,
            status_write_cycles: 200,
            reset_cycles: 50,
            initial_qe: false,
            locked: true,
        }
    }
}

impl DummyConfig {
    /// Check sizes
    pub fn validate(&self) -> Result<()> {
        if !self.size.is_power_of_two() || self.size > 16 * 1024 * 1024 {
            return Err(DummyError::InvalidConfig("size must be a power of two up to 16 MiB"));
        }
        if !self.page_size.is_power_of_two() || self.page_size > self.size {
            return Err(DummyError::InvalidConfig("page_size must be a power of two within size"));
        }
        Ok(())
    }
}

/// One chip-select frame as the device saw it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRecord {
    /// Opcode, if a full byte was clocked
    pub opcode: Option<u8>,
    /// Address, if the opcode takes one and all 24 bits arrived
    pub address: Option<u32>,
    /// Data bytes clocked in or out
    pub data_bytes: usize,
    /// An operation was running when the frame started
    pub while_busy: bool,
    /// Output enables the controller held on data-in sample edges
    pub data_oe: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Status1,
    Status2,
    Jedec,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Command,
    Address,
    Dummy,
    DataIn(LaneWidth),
    DataOut(LaneWidth, Source),
    /// Opcode-only command, or one that is being ignored
    Ignore,
}

#[derive(Debug)]
struct Frame {
    phase: Phase,
    opcode: Option<u8>,
    honoured: bool,
    shift: u8,
    clocks: u8,
    address: u32,
    addr_bits: u8,
    has_address: bool,
    dummy_clocks: u8,
    data_phase: Phase,
    data: Vec<u8>,
    out_addr: u32,
    out_shift: u8,
    out_clocks: u8,
    bytes_out: usize,
    while_busy: bool,
    data_oe: u8,
}

impl Frame {
    fn new(while_busy: bool) -> Self {
        Self {
            phase: Phase::Command,
            opcode: None,
            honoured: false,
            shift: 0,
            clocks: 0,
            address: 0,
            addr_bits: 0,
            has_address: false,
            dummy_clocks: 0,
            data_phase: Phase::Ignore,
            data: Vec::new(),
            out_addr: 0,
            out_shift: 0,
            out_clocks: 0,
            bytes_out: 0,
            while_busy,
            data_oe: 0,
        }
    }

    fn record(&self) -> FrameRecord {
        FrameRecord {
            opcode: self.opcode,
            address: (self.has_address && self.addr_bits == 24).then_some(self.address),
            data_bytes: self.data.len() + self.bytes_out,
            while_busy: self.while_busy,
            data_oe: self.data_oe,
        }
    }
}

/// Pin-level SPI NOR flash
pub struct DummyFlash {
    config: DummyConfig,
    data: Vec<u8>,
    wel: bool,
    status2: Status2,
    locked: bool,
    reset_enabled: bool,
    busy: u32,
    frame: Option<Frame>,
    last_sclk: bool,
    drive: LineDrive,
    trace: Vec<FrameRecord>,
    violations: Vec<Violation>,
    contention: u32,
}

impl DummyFlash {
    /// Create a new dummy flash, erased to 0xFF
    pub fn new(config: DummyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Create a new dummy flash with default configuration
    pub fn new_default() -> Self {
        Self::build(DummyConfig::default())
    }

    fn build(config: DummyConfig) -> Self {
        let status2 = if config.initial_qe {
            Status2::QE
        } else {
            Status2::empty()
        };
        Self {
            data: vec![0xFF; config.size],
            locked: config.locked,
            config,
            wel: false,
            status2,
            reset_enabled: false,
            busy: 0,
            frame: None,
            last_sclk: true,
            drive: LineDrive::RELEASED,
            trace: Vec::new(),
            violations: Vec::new(),
            contention: 0,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Get a reference to the flash data
    pub fn memory(&self) -> &[u8] {
        &self.data
    }

    /// Copy `bytes` into the array at `addr`, bypassing program semantics
    pub fn preload(&mut self, addr: u32, bytes: &[u8]) -> Result<()> {
        let range = self.range(addr, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Read `len` bytes at `addr`
    pub fn read(&self, addr: u32, len: usize) -> Result<&[u8]> {
        let range = self.range(addr, len)?;
        Ok(&self.data[range])
    }

    fn range(&self, addr: u32, len: usize) -> Result<core::ops::Range<usize>> {
        let start = addr as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(start..end),
            _ => Err(DummyError::OutOfBounds {
                addr,
                len,
                size: self.data.len(),
            }),
        }
    }

    /// Status register 1 as RDSR would return it
    pub fn status1(&self) -> Status1 {
        let mut sr1 = Status1::empty();
        sr1.set(Status1::WIP, self.busy > 0);
        sr1.set(Status1::WEL, self.wel);
        sr1
    }

    /// Status register 2
    pub fn status2(&self) -> Status2 {
        self.status2
    }

    /// Returns true while an erase, program, status write or reset runs
    pub fn is_busy(&self) -> bool {
        self.busy > 0
    }

    /// Block protection is still locked
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Frames seen so far
    pub fn trace(&self) -> &[FrameRecord] {
        &self.trace
    }

    /// Opcodes of the frames seen so far
    pub fn opcode_trace(&self) -> Vec<u8> {
        self.trace.iter().filter_map(|f| f.opcode).collect()
    }

    /// Drain the frame trace
    pub fn take_trace(&mut self) -> Vec<FrameRecord> {
        std::mem::take(&mut self.trace)
    }

    /// Contract violations seen so far
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Cycles on which both sides drove the same lane
    pub fn contention(&self) -> u32 {
        self.contention
    }

    /// Advance one controller cycle
    ///
    /// `pins` are the controller's registered outputs for this cycle; the
    /// return value is what the device drives back.
    pub fn clock(&mut self, pins: QspiPins) -> LineDrive {
        if self.busy > 0 {
            self.busy -= 1;
            if self.busy == 0 {
                log::trace!("dummy: operation complete");
            }
        }

        if pins.cs_n {
            if let Some(frame) = self.frame.take() {
                self.end_frame(frame);
            }
            self.drive = LineDrive::RELEASED;
        } else {
            match self.frame.take() {
                Some(mut frame) => {
                    if !self.last_sclk && pins.sclk {
                        if matches!(frame.phase, Phase::DataIn(_)) {
                            frame.data_oe |= pins.io_oe;
                        }
                        self.rising(&mut frame, pins.driven_lines());
                    } else if self.last_sclk && !pins.sclk {
                        self.falling(&mut frame);
                    }
                    self.frame = Some(frame);
                }
                None => self.frame = Some(Frame::new(self.is_busy())),
            }
        }
        self.last_sclk = pins.sclk;

        if self.drive.oe & pins.io_oe != 0 {
            self.contention += 1;
        }
        self.drive
    }

    fn rising(&mut self, frame: &mut Frame, io: u8) {
        match frame.phase {
            Phase::Command => {
                frame.shift = (frame.shift << 1) | (io & 1);
                frame.clocks += 1;
                if frame.clocks == 8 {
                    frame.clocks = 0;
                    let opcode = frame.shift;
                    frame.opcode = Some(opcode);
                    self.decode(frame, opcode);
                }
            }
            Phase::Address => {
                frame.address = (frame.address << 1) | (io & 1) as u32;
                frame.addr_bits += 1;
                if frame.addr_bits == 24 {
                    frame.address &= (self.data.len() - 1) as u32;
                    frame.out_addr = frame.address;
                    frame.phase = if frame.dummy_clocks > 0 {
                        Phase::Dummy
                    } else {
                        frame.data_phase
                    };
                }
            }
            Phase::Dummy => {
                frame.dummy_clocks -= 1;
                if frame.dummy_clocks == 0 {
                    frame.phase = frame.data_phase;
                }
            }
            Phase::DataIn(width) => {
                let bits = match width {
                    LaneWidth::X1 => io & 1,
                    _ => width.sample(io),
                };
                frame.shift = (frame.shift << width.lanes()) | bits;
                frame.clocks += 1;
                if frame.clocks == width.clocks_per_byte() {
                    frame.clocks = 0;
                    frame.data.push(frame.shift);
                }
            }
            Phase::DataOut(..) | Phase::Ignore => {}
        }
    }

    fn falling(&mut self, frame: &mut Frame) {
        let Phase::DataOut(width, source) = frame.phase else {
            return;
        };
        if frame.out_clocks == 0 {
            frame.out_shift = self.next_out_byte(frame, source);
            frame.bytes_out += 1;
        }
        let bits = width.drive(frame.out_shift);
        self.drive = match width {
            LaneWidth::X1 => LineDrive {
                io: bits << 1,
                oe: 0b0010,
            },
            _ => LineDrive {
                io: bits,
                oe: width.output_mask(),
            },
        };
        frame.out_shift <<= width.lanes();
        frame.out_clocks = (frame.out_clocks + 1) % width.clocks_per_byte();
    }

    fn next_out_byte(&self, frame: &mut Frame, source: Source) -> u8 {
        match source {
            Source::Status1 => self.status1().bits(),
            Source::Status2 => self.status2.bits(),
            Source::Jedec => self.config.jedec_id[frame.bytes_out % 3],
            Source::Memory => {
                let byte = self.data[frame.out_addr as usize % self.data.len()];
                frame.out_addr = frame.out_addr.wrapping_add(1);
                byte
            }
        }
    }

    fn decode(&mut self, frame: &mut Frame, opcode: u8) {
        if self.is_busy() && !matches!(opcode, opcodes::RDSR | opcodes::RDSR2) {
            self.violation(Violation::WhileBusy { opcode });
            frame.phase = Phase::Ignore;
            return;
        }
        if matches!(opcode, opcodes::QOR | opcodes::QPP) && !self.status2.contains(Status2::QE) {
            self.violation(Violation::QuadDisabled { opcode });
            frame.phase = Phase::Ignore;
            return;
        }

        frame.honoured = true;
        let (has_address, dummy_clocks, data_phase) = match opcode {
            opcodes::RDSR => (false, 0, Phase::DataOut(LaneWidth::X1, Source::Status1)),
            opcodes::RDSR2 => (false, 0, Phase::DataOut(LaneWidth::X1, Source::Status2)),
            opcodes::RDID => (false, 0, Phase::DataOut(LaneWidth::X1, Source::Jedec)),
            opcodes::WRSR2 => (false, 0, Phase::DataIn(LaneWidth::X1)),
            opcodes::WREN
            | opcodes::WRDI
            | opcodes::RSTEN
            | opcodes::RST
            | opcodes::ULBPR
            | opcodes::CE_C7
            | opcodes::CE_60 => (false, 0, Phase::Ignore),
            opcodes::READ => (true, 0, Phase::DataOut(LaneWidth::X1, Source::Memory)),
            opcodes::FAST_READ => (
                true,
                opcodes::READ_DUMMY_CLOCKS,
                Phase::DataOut(LaneWidth::X1, Source::Memory),
            ),
            opcodes::DOR => (
                true,
                opcodes::READ_DUMMY_CLOCKS,
                Phase::DataOut(LaneWidth::X2, Source::Memory),
            ),
            opcodes::QOR => (
                true,
                opcodes::READ_DUMMY_CLOCKS,
                Phase::DataOut(LaneWidth::X4, Source::Memory),
            ),
            opcodes::PP => (true, 0, Phase::DataIn(LaneWidth::X1)),
            opcodes::QPP => (true, 0, Phase::DataIn(LaneWidth::X4)),
            _ => {
                frame.honoured = false;
                self.violation(Violation::UnknownOpcode { opcode });
                frame.phase = Phase::Ignore;
                return;
            }
        };
        frame.has_address = has_address;
        frame.dummy_clocks = dummy_clocks;
        frame.data_phase = data_phase;
        frame.phase = if has_address {
            Phase::Address
        } else {
            data_phase
        };
    }

    fn end_frame(&mut self, frame: Frame) {
        let record = frame.record();
        log::trace!("dummy: frame {:02x?} addr {:x?}", record.opcode, record.address);
        self.trace.push(record);

        let partial = match frame.phase {
            Phase::Command | Phase::DataIn(_) => frame.clocks != 0,
            Phase::Address => true,
            _ => false,
        };
        if partial {
            self.violation(Violation::PartialByte {
                opcode: frame.opcode,
            });
        }

        // RSTEN only arms the very next frame
        let reset_armed = std::mem::take(&mut self.reset_enabled);
        if !frame.honoured {
            return;
        }
        let Some(opcode) = frame.opcode else {
            return;
        };

        match opcode {
            opcodes::WREN => self.wel = true,
            opcodes::WRDI => self.wel = false,
            opcodes::RSTEN => self.reset_enabled = true,
            opcodes::RST => {
                if reset_armed {
                    log::debug!("dummy: software reset");
                    self.wel = false;
                    self.locked = self.config.locked;
                    self.busy = self.config.reset_cycles;
                } else {
                    log::warn!("dummy: RST without RSTEN ignored");
                }
            }
            opcodes::ULBPR => {
                if self.take_wel(opcode) {
                    log::debug!("dummy: block protection unlocked");
                    self.locked = false;
                }
            }
            opcodes::CE_C7 | opcodes::CE_60 => {
                if self.take_wel(opcode) && self.check_unlocked(opcode) {
                    log::debug!("dummy: chip erase");
                    self.data.fill(0xFF);
                    self.busy = self.config.erase_cycles;
                }
            }
            opcodes::PP | opcodes::QPP => {
                if self.take_wel(opcode) && self.check_unlocked(opcode) {
                    self.program(frame.address, &frame.data);
                    self.busy = self.config.program_cycles;
                }
            }
            opcodes::WRSR2 => {
                if self.take_wel(opcode) {
                    if let Some(&value) = frame.data.first() {
                        self.status2 = Status2::from_bits_truncate(value);
                        log::debug!("dummy: SR2 <- {:#04x}", value);
                    }
                    self.busy = self.config.status_write_cycles;
                }
            }
            _ => {}
        }
    }

    fn take_wel(&mut self, opcode: u8) -> bool {
        if std::mem::take(&mut self.wel) {
            true
        } else {
            self.violation(Violation::WriteNotEnabled { opcode });
            false
        }
    }

    fn check_unlocked(&mut self, opcode: u8) -> bool {
        if self.locked {
            self.violation(Violation::Protected { opcode });
            return false;
        }
        true
    }

    /// Flash programming: can only change 1 -> 0, wrapping inside the page
    fn program(&mut self, address: u32, bytes: &[u8]) {
        let page = self.config.page_size;
        let base = address as usize & !(page - 1);
        let start = address as usize - base;
        for (i, &byte) in bytes.iter().enumerate() {
            let idx = base + (start + i) % page;
            self.data[idx] &= byte;
        }
        log::debug!("dummy: programmed {} bytes at {:#08x}", bytes.len(), address);
    }

    fn violation(&mut self, violation: Violation) {
        log::warn!("dummy: {}", violation);
        self.violations.push(violation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal mode-3 SPI master driving the emulator one bit per two cycles
    struct Master {
        pins: QspiPins,
        flash: DummyFlash,
    }

    impl Master {
        fn new(flash: DummyFlash) -> Self {
            Self {
                pins: QspiPins::idle(true),
                flash,
            }
        }

        fn cycle(&mut self) -> u8 {
            let drive = self.flash.clock(self.pins);
            qspimem_core::wire::resolve_lines(self.pins, drive)
        }

        fn select(&mut self) {
            self.pins.cs_n = false;
            self.cycle();
        }

        fn deselect(&mut self) {
            self.pins = QspiPins::idle(true);
            self.cycle();
            self.cycle();
        }

        fn exchange(&mut self, width: LaneWidth, out: Option<u8>) -> u8 {
            let mut shift = out.unwrap_or(0);
            let mut byte = 0u8;
            for _ in 0..width.clocks_per_byte() {
                self.pins.sclk = false;
                match out {
                    Some(_) => {
                        self.pins.io = width.drive(shift);
                        self.pins.io_oe = width.output_mask();
                    }
                    None => self.pins.io_oe = 0,
                }
                self.cycle();
                self.pins.sclk = true;
                let io = self.cycle();
                byte = (byte << width.lanes()) | width.sample(io);
                shift <<= width.lanes();
            }
            byte
        }

        fn command(&mut self, opcode: u8, addr: Option<u32>, write: &[u8], width: LaneWidth) {
            self.select();
            self.exchange(LaneWidth::X1, Some(opcode));
            if let Some(a) = addr {
                for b in [(a >> 16) as u8, (a >> 8) as u8, a as u8] {
                    self.exchange(LaneWidth::X1, Some(b));
                }
            }
            for &b in write {
                self.exchange(width, Some(b));
            }
            self.deselect();
        }

        fn read_reg(&mut self, opcode: u8) -> u8 {
            self.select();
            self.exchange(LaneWidth::X1, Some(opcode));
            let value = self.exchange(LaneWidth::X1, None);
            self.deselect();
            value
        }

        fn quad_read(&mut self, addr: u32, len: usize) -> Vec<u8> {
            self.select();
            self.exchange(LaneWidth::X1, Some(opcodes::QOR));
            for b in [(addr >> 16) as u8, (addr >> 8) as u8, addr as u8] {
                self.exchange(LaneWidth::X1, Some(b));
            }
            self.exchange(LaneWidth::X1, None);
            let data = (0..len).map(|_| self.exchange(LaneWidth::X4, None)).collect();
            self.deselect();
            data
        }

        fn wait_idle(&mut self) -> usize {
            let mut polls = 0;
            while self.read_reg(opcodes::RDSR) & opcodes::SR1_WIP != 0 {
                polls += 1;
            }
            polls
        }
    }

    fn fast_config() -> DummyConfig {
        DummyConfig {
            size: 64 * 1024,
            erase_cycles: 100,
            program_cycles: 40,
            status_write_cycles: 20,
            reset_cycles: 10,
            ..Default::default()
        }
    }

    fn unlocked_quad(config: DummyConfig) -> Master {
        let mut m = Master::new(DummyFlash::new(DummyConfig {
            initial_qe: true,
            ..config
        })
        .unwrap());
        m.command(opcodes::WREN, None, &[], LaneWidth::X1);
        m.command(opcodes::ULBPR, None, &[], LaneWidth::X1);
        m
    }

    #[test]
    fn test_read_jedec_id() {
        let mut m = Master::new(DummyFlash::new_default());
        m.select();
        m.exchange(LaneWidth::X1, Some(opcodes::RDID));
        let id: Vec<u8> = (0..3).map(|_| m.exchange(LaneWidth::X1, None)).collect();
        m.deselect();
        assert_eq!(id, [0xBF, 0x26, 0x43]);
        assert_eq!(m.flash.opcode_trace(), [opcodes::RDID]);
    }

    #[test]
    fn test_quad_program_and_read() {
        let mut m = unlocked_quad(fast_config());
        m.command(opcodes::WREN, None, &[], LaneWidth::X1);
        assert!(m.flash.status1().contains(Status1::WEL));
        m.command(opcodes::QPP, Some(0x1234), &[0x12, 0x34, 0x56, 0x78], LaneWidth::X4);
        assert!(m.flash.is_busy());
        assert!(m.wait_idle() > 0);

        assert_eq!(m.flash.read(0x1234, 4).unwrap(), &[0x12, 0x34, 0x56, 0x78]);
        let program = m.flash.trace().iter().find(|f| f.opcode == Some(opcodes::QPP)).unwrap();
        assert_eq!(program.data_oe, 0b1111);
        assert_eq!(m.quad_read(0x1234, 4), [0x12, 0x34, 0x56, 0x78]);
        assert!(m.flash.violations().is_empty());
        assert_eq!(m.flash.contention(), 0);
    }

    #[test]
    fn test_dual_read_without_quad_enable() {
        let mut m = Master::new(DummyFlash::new(fast_config()).unwrap());
        m.flash.preload(0x2000, &[0xB4, 0x1E]).unwrap();
        m.select();
        m.exchange(LaneWidth::X1, Some(opcodes::DOR));
        for b in [0x00, 0x20, 0x00] {
            m.exchange(LaneWidth::X1, Some(b));
        }
        m.exchange(LaneWidth::X1, None);
        let data: Vec<u8> = (0..2).map(|_| m.exchange(LaneWidth::X2, None)).collect();
        m.deselect();
        assert_eq!(data, [0xB4, 0x1E]);
        assert!(m.flash.violations().is_empty());
        assert_eq!(m.flash.contention(), 0);
    }

    #[test]
    fn test_program_wraps_within_page_and_only_clears_bits() {
        let mut m = unlocked_quad(fast_config());
        m.flash.preload(0x1FF, &[0x0F]).unwrap();
        m.command(opcodes::WREN, None, &[], LaneWidth::X1);
        m.command(opcodes::QPP, Some(0x1FE), &[0xAA, 0xF0, 0x55], LaneWidth::X4);
        m.wait_idle();
        assert_eq!(m.flash.read(0x1FE, 2).unwrap(), &[0xAA, 0x00]);
        assert_eq!(m.flash.read(0x100, 1).unwrap(), &[0x55]);
        assert_eq!(m.flash.read(0x200, 1).unwrap(), &[0xFF]);
    }

    #[test]
    fn test_locked_and_unenabled_writes_rejected() {
        let mut m = Master::new(DummyFlash::new(fast_config()).unwrap());
        m.command(opcodes::CE_C7, None, &[], LaneWidth::X1);
        m.command(opcodes::WREN, None, &[], LaneWidth::X1);
        m.command(opcodes::CE_C7, None, &[], LaneWidth::X1);
        assert_eq!(
            m.flash.violations(),
            &[
                Violation::WriteNotEnabled { opcode: 0xC7 },
                Violation::Protected { opcode: 0xC7 }
            ]
        );
        assert!(!m.flash.is_busy());
    }

    #[test]
    fn test_commands_while_busy_are_ignored() {
        let mut m = unlocked_quad(fast_config());
        m.command(opcodes::WREN, None, &[], LaneWidth::X1);
        m.command(opcodes::CE_60, None, &[], LaneWidth::X1);
        assert!(m.flash.is_busy());
        m.command(opcodes::WREN, None, &[], LaneWidth::X1);
        assert!(!m.flash.status1().contains(Status1::WEL));
        assert_eq!(m.flash.violations(), &[Violation::WhileBusy { opcode: opcodes::WREN }]);
        assert!(m.flash.trace().last().map(|f| f.while_busy).unwrap_or(false));
    }

    #[test]
    fn test_quad_enable_via_wrsr2() {
        let mut m = Master::new(DummyFlash::new(fast_config()).unwrap());
        assert_eq!(m.read_reg(opcodes::RDSR2) & opcodes::SR2_QE, 0);

        m.command(opcodes::QOR, Some(0), &[], LaneWidth::X1);
        assert_eq!(m.flash.violations(), &[Violation::QuadDisabled { opcode: opcodes::QOR }]);

        m.command(opcodes::WREN, None, &[], LaneWidth::X1);
        m.command(opcodes::WRSR2, None, &[opcodes::SR2_QE], LaneWidth::X1);
        m.wait_idle();
        assert!(m.flash.status2().contains(Status2::QE));
    }

    #[test]
    fn test_software_reset_needs_rsten() {
        let mut m = unlocked_quad(fast_config());
        assert!(!m.flash.is_locked());
        m.command(opcodes::RST, None, &[], LaneWidth::X1);
        assert!(!m.flash.is_busy());

        m.command(opcodes::RSTEN, None, &[], LaneWidth::X1);
        m.command(opcodes::RST, None, &[], LaneWidth::X1);
        assert!(m.flash.is_busy());
        assert!(m.flash.is_locked());
    }

    #[test]
    fn test_preload_bounds() {
        let mut flash = DummyFlash::new(fast_config()).unwrap();
        assert!(flash.preload(0xFFFC, &[1, 2, 3, 4]).is_ok());
        assert_eq!(
            flash.preload(0xFFFD, &[1, 2, 3, 4]),
            Err(DummyError::OutOfBounds {
                addr: 0xFFFD,
                len: 4,
                size: 0x10000
            })
        );
    }

    #[test]
    fn test_bad_config() {
        let config = DummyConfig {
            size: 3000,
            ..Default::default()
        };
        assert!(matches!(DummyFlash::new(config), Err(DummyError::InvalidConfig(_))));
    }
}

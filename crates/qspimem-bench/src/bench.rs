//! The lock-step bench
//!
//! Each [`Bench`] cycle runs, in order:
//!
//! 1. the flash emulator against the pins the controller registered last cycle
//! 2. line resolution, giving the levels the controller samples
//! 3. the host and ack bus models, deciding this cycle's handshakes
//! 4. one controller step
//!
//! and then checks the ack bus contract against the new outputs.

use qspimem_core::wire::{resolve_lines, QspiPins};
use qspimem_core::{
    CommandHeader, ControllerConfig, ControllerInputs, ControllerOutputs, MemController,
    SequencerState,
};
use qspimem_core::spi::Direction;
use qspimem_dummy::{DummyConfig, DummyFlash, FrameRecord, Violation};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::BenchConfig;
use crate::error::{BenchError, Result};
use crate::host::{Granter, HostDriver};

/// One granted ack request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckEvent {
    /// Id presented with the request
    pub id: u8,
    /// Cycle the request first showed on the bus
    pub raised_at: u64,
    /// Cycle the grant was observed
    pub granted_at: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct TickResult {
    sent: bool,
    received: Option<u8>,
}

/// Controller, flash emulator and bus models in one clock domain
pub struct Bench {
    ctrl: MemController,
    flash: DummyFlash,
    config: BenchConfig,
    rng: ChaCha8Rng,
    host: HostDriver,
    granter: Granter,
    outputs: ControllerOutputs,
    rst_n: bool,
    cycle: u64,
    outstanding: u32,
    raised_at: u64,
    acks: Vec<AckEvent>,
    violation_mark: usize,
    contention_mark: u32,
}

impl Bench {
    /// Build a bench; the controller starts in power-up reset
    pub fn new(controller: ControllerConfig, flash: DummyConfig, config: BenchConfig) -> Result<Self> {
        config.validate().map_err(BenchError::InvalidConfig)?;
        let ctrl = MemController::new(controller)?;
        let flash = DummyFlash::new(flash)?;
        log::debug!("bench: seed {:#x}", config.seed);
        Ok(Self {
            outputs: ctrl.outputs(),
            ctrl,
            flash,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            granter: Granter::new(config.grant_latency),
            config,
            host: HostDriver::default(),
            rst_n: true,
            cycle: 0,
            outstanding: 0,
            raised_at: 0,
            acks: Vec::new(),
            violation_mark: 0,
            contention_mark: 0,
        })
    }

    /// The controller under test
    pub fn controller(&self) -> &MemController {
        &self.ctrl
    }

    /// The flash emulator
    pub fn flash(&self) -> &DummyFlash {
        &self.flash
    }

    /// The flash emulator, for preloading contents
    pub fn flash_mut(&mut self) -> &mut DummyFlash {
        &mut self.flash
    }

    /// Bench configuration
    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Cycles run so far
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Outputs the controller registered last cycle
    pub fn outputs(&self) -> ControllerOutputs {
        self.outputs
    }

    /// Every ack grant so far
    pub fn acks(&self) -> &[AckEvent] {
        &self.acks
    }

    /// Opcodes of every flash frame so far
    pub fn opcode_trace(&self) -> Vec<u8> {
        self.flash.opcode_trace()
    }

    /// Every flash frame so far
    pub fn frames(&self) -> &[FrameRecord] {
        self.flash.trace()
    }

    pub(crate) fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// `len` bytes from the bench's seeded generator
    pub fn random_payload(&mut self, len: usize) -> Vec<u8> {
        let mut payload = vec![0u8; len];
        self.rng.fill(&mut payload[..]);
        payload
    }

    fn tick(&mut self, next_in: Option<u8>, want_out: bool) -> Result<TickResult> {
        let prev = self.outputs;
        let (in_valid, in_data) = self.host.offer(next_in, self.config.in_valid_prob, &mut self.rng);
        let out_ready = self.host.accept(want_out, self.config.out_ready_prob, &mut self.rng);
        let drive = self.flash.clock(prev.pins);
        let ack_owned = self.rst_n && self.granter.poll(prev.ack_request);

        let inputs = ControllerInputs {
            rst_n: self.rst_n,
            in_valid,
            in_data,
            out_ready,
            ack_owned,
            flash_io: resolve_lines(prev.pins, drive),
        };
        let stepped = self.ctrl.step(&inputs);
        self.cycle += 1;
        let out = match stepped {
            Ok(out) => out,
            Err(err) => {
                self.outputs = self.ctrl.outputs();
                return Err(err.into());
            }
        };

        let result = TickResult {
            sent: self.rst_n && self.host.inbound_fires(prev.in_ready),
            received: (self.rst_n && out_ready && prev.out_valid).then_some(prev.out_data),
        };
        self.check_ack(prev, out, ack_owned)?;
        self.outputs = out;
        Ok(result)
    }

    fn check_ack(&mut self, prev: ControllerOutputs, out: ControllerOutputs, owned: bool) -> Result<()> {
        let expected_id = self.ctrl.config().ack_id.bits();
        if prev.ack_request && prev.ack_id != expected_id {
            return Err(self.ack_error("request carries the wrong id"));
        }
        if !prev.ack_request && prev.ack_id != 0 {
            return Err(self.ack_error("id driven without a request"));
        }
        if owned {
            if out.ack_request {
                return Err(self.ack_error("request still raised after the grant"));
            }
            log::debug!("bench: ack granted at cycle {}", self.cycle);
            self.acks.push(AckEvent {
                id: prev.ack_id,
                raised_at: self.raised_at,
                granted_at: self.cycle,
            });
            self.outstanding = self.outstanding.saturating_sub(1);
        }
        if out.ack_request && !prev.ack_request {
            if self.outstanding == 0 {
                return Err(self.ack_error("request without a completed transaction"));
            }
            self.raised_at = self.cycle;
        }
        Ok(())
    }

    fn ack_error(&self, what: &'static str) -> BenchError {
        BenchError::AckDiscipline {
            cycle: self.cycle,
            what,
        }
    }

    fn budget(&self, start: u64) -> Result<()> {
        let cycles = self.cycle - start;
        if cycles > self.config.max_cycles {
            return Err(BenchError::Stalled {
                cycles,
                state: self.ctrl.state(),
            });
        }
        Ok(())
    }

    /// Run until the initialization sequence has finished
    ///
    /// Returns the number of cycles it took.
    pub fn run_startup(&mut self) -> Result<u64> {
        let start = self.cycle;
        while !self.ctrl.is_idle() {
            self.tick(None, false)?;
            self.budget(start)?;
        }
        self.check_device()?;
        log::info!("bench: flash ready after {} cycles", self.cycle - start);
        Ok(self.cycle - start)
    }

    /// Push raw bytes over the inbound host bus
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let start = self.cycle;
        let mut sent = 0;
        while sent < bytes.len() {
            if self.tick(Some(bytes[sent]), false)?.sent {
                sent += 1;
            }
            self.budget(start)?;
        }
        Ok(())
    }

    /// Send four header bytes, legal or not
    pub fn send_header(&mut self, raw: [u8; CommandHeader::LEN]) -> Result<()> {
        self.send(&raw)?;
        if CommandHeader::validate_bytes(raw).is_ok() {
            self.outstanding += 1;
        }
        Ok(())
    }

    /// Take `len` bytes from the outbound host bus
    pub fn receive(&mut self, len: usize) -> Result<Vec<u8>> {
        let start = self.cycle;
        let mut data = Vec::with_capacity(len);
        while data.len() < len {
            if let Some(byte) = self.tick(None, true)?.received {
                data.push(byte);
            }
            self.budget(start)?;
        }
        Ok(data)
    }

    /// Run until every accepted request has been acknowledged and the
    /// controller is back in `Idle`
    pub fn wait_idle(&mut self) -> Result<()> {
        let start = self.cycle;
        while self.outstanding > 0 || !self.ctrl.is_idle() {
            self.tick(None, false)?;
            self.budget(start)?;
        }
        Ok(())
    }

    fn expect_direction(header: &CommandHeader, direction: Direction) -> Result<usize> {
        match (header.direction(), header.transfer_len()) {
            (Some(d), Some(len)) if d == direction => Ok(len as usize),
            _ => Err(BenchError::WrongDirection(header.operation)),
        }
    }

    /// Perform a WriteResult request
    pub fn write(&mut self, header: CommandHeader, payload: &[u8]) -> Result<()> {
        let len = Self::expect_direction(&header, Direction::ToFlash)?;
        if payload.len() != len {
            return Err(BenchError::PayloadLength {
                operation: header.operation,
                expected: len,
                actual: payload.len(),
            });
        }
        log::debug!("bench: write {} bytes at {}", len, header.address);
        self.send_header(header.encode())?;
        self.send(payload)?;
        self.finish()
    }

    /// Perform a ReadKey or ReadText request
    pub fn read(&mut self, header: CommandHeader) -> Result<Vec<u8>> {
        let len = Self::expect_direction(&header, Direction::FromFlash)?;
        log::debug!("bench: read {} bytes at {}", len, header.address);
        self.send_header(header.encode())?;
        let data = self.receive(len)?;
        self.finish()?;
        Ok(data)
    }

    /// Write `payload`, read it back with `read_header` and compare
    pub fn roundtrip(&mut self, write_header: CommandHeader, read_header: CommandHeader, payload: &[u8]) -> Result<()> {
        self.write(write_header, payload)?;
        let data = self.read(read_header)?;
        compare(payload, &data)
    }

    fn finish(&mut self) -> Result<()> {
        self.wait_idle()?;
        self.check_device()?;
        self.check_quiet()
    }

    /// Run `cycles` cycles with both host handshakes low, checking that the
    /// controller stays quiet
    pub fn idle(&mut self, cycles: u64) -> Result<()> {
        for _ in 0..cycles {
            self.tick(None, false)?;
            self.check_quiet()?;
        }
        Ok(())
    }

    /// Run `cycles` cycles with both host handshakes low and no checks
    pub fn run_quiet(&mut self, cycles: u64) -> Result<()> {
        for _ in 0..cycles {
            self.tick(None, false)?;
        }
        Ok(())
    }

    /// Hold reset for `cycles`, release it and run the initialization again
    ///
    /// The flash keeps whatever state it was in. A frame cut off by the
    /// reset shows up as a partial byte, so the violations seen between
    /// asserting reset and the controller reaching `Idle` are returned
    /// instead of failing.
    pub fn reset(&mut self, cycles: u64) -> Result<Vec<Violation>> {
        log::info!("bench: reset for {} cycles", cycles);
        self.host.quiesce();
        self.granter.reset();
        self.rst_n = false;
        for _ in 0..cycles.max(1) {
            self.tick(None, false)?;
            if self.outputs != ControllerOutputs::idle(self.ctrl.config().sclk_idle_high) {
                return Err(BenchError::IdleViolation {
                    cycle: self.cycle,
                    what: "outputs active during reset",
                });
            }
        }
        self.rst_n = true;
        self.outstanding = 0;

        let start = self.cycle;
        while !self.ctrl.is_idle() {
            self.tick(None, false)?;
            self.budget(start)?;
        }
        let during = self.flash.violations()[self.violation_mark..].to_vec();
        self.violation_mark = self.flash.violations().len();
        self.contention_mark = self.flash.contention();
        Ok(during)
    }

    /// Fail on any device contract violation or line contention since the
    /// last check
    pub fn check_device(&mut self) -> Result<()> {
        if let Some(violation) = self.flash.violations().get(self.violation_mark) {
            return Err(BenchError::DeviceViolation(*violation));
        }
        let contention = self.flash.contention();
        if contention > self.contention_mark {
            return Err(BenchError::Contention(contention - self.contention_mark));
        }
        Ok(())
    }

    fn check_quiet(&self) -> Result<()> {
        let what = if self.outputs.pins != QspiPins::idle(self.ctrl.config().sclk_idle_high) {
            "flash pins active"
        } else if self.outputs.ack_request {
            "ack request raised"
        } else if self.outputs.out_valid {
            "out_valid raised"
        } else {
            return Ok(());
        };
        Err(BenchError::IdleViolation {
            cycle: self.cycle,
            what,
        })
    }

    /// Sequencer state
    pub fn state(&self) -> SequencerState {
        self.ctrl.state()
    }
}

/// Compare read-back data against what was written
pub(crate) fn compare(expected: &[u8], actual: &[u8]) -> Result<()> {
    if let Some(index) = expected.iter().zip(actual).position(|(e, a)| e != a) {
        return Err(BenchError::DataMismatch {
            index,
            expected: expected[index],
            actual: actual[index],
        });
    }
    if expected.len() != actual.len() {
        return Err(BenchError::LengthMismatch {
            expected: expected.len(),
            actual: actual.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qspimem_core::spi::{opcodes, Address24, Status2};
    use qspimem_core::{AccelId, EraseOpcode, WaitTarget};

    const STARTUP: [u8; 13] = [
        0x06, 0x66, 0x99, 0x05, 0x06, 0x98, 0x06, 0xC7, 0x05, 0x35, 0x06, 0x31, 0x05,
    ];

    fn bench_with(config: BenchConfig) -> Bench {
        Bench::new(ControllerConfig::default(), DummyConfig::default(), config).unwrap()
    }

    fn ready_bench(config: BenchConfig) -> Bench {
        let mut bench = bench_with(config);
        bench.run_startup().unwrap();
        bench
    }

    fn dedup_polls(trace: &[u8]) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        for &op in trace {
            if op == opcodes::RDSR && out.last() == Some(&opcodes::RDSR) {
                continue;
            }
            out.push(op);
        }
        out
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(37).wrapping_add(seed)).collect()
    }

    #[test]
    fn test_startup_sequence() {
        let bench = ready_bench(BenchConfig::full_rate());
        assert_eq!(dedup_polls(&bench.opcode_trace()), STARTUP);
        assert!(bench.flash().status2().contains(Status2::QE));
        assert!(!bench.flash().is_locked());
        assert!(bench.acks().is_empty());
        assert_eq!(bench.state(), SequencerState::Idle);
    }

    #[test]
    fn test_startup_skips_quad_enable_when_set() {
        let flash = DummyConfig {
            initial_qe: true,
            ..Default::default()
        };
        let mut bench = Bench::new(ControllerConfig::default(), flash, BenchConfig::full_rate()).unwrap();
        bench.run_startup().unwrap();
        assert_eq!(dedup_polls(&bench.opcode_trace()), &STARTUP[..10]);
    }

    #[test]
    fn test_startup_with_alternate_erase() {
        let ctrl = ControllerConfig {
            erase_opcode: EraseOpcode::X60,
            ..Default::default()
        };
        let mut bench = Bench::new(ctrl, DummyConfig::default(), BenchConfig::default()).unwrap();
        bench.run_startup().unwrap();
        assert_eq!(dedup_polls(&bench.opcode_trace())[7], 0x60);
    }

    #[test]
    fn test_aes_write_frames() {
        let mut bench = ready_bench(BenchConfig::default());
        let before = bench.frames().len();
        let payload = pattern(16, 3);
        let header = CommandHeader::write_result(AccelId::Aes, Address24::truncate(0x123456));
        bench.write(header, &payload).unwrap();

        let frames = &bench.frames()[before..];
        let ops: Vec<u8> = frames.iter().filter_map(|f| f.opcode).collect();
        assert_eq!(dedup_polls(&ops), [0x05, 0x06, 0x32, 0x05]);
        let program = frames.iter().find(|f| f.opcode == Some(0x32)).unwrap();
        assert_eq!(program.address, Some(0x123456));
        assert_eq!(program.data_bytes, 16);
        assert_eq!(program.data_oe, 0b1111);
        assert_eq!(bench.flash().read(0x123456, 16).unwrap(), &payload[..]);

        assert_eq!(bench.acks().len(), 1);
        assert_eq!(bench.acks()[0].id, 0);
    }

    #[test]
    fn test_sha_roundtrip_with_backpressure() {
        let mut bench = ready_bench(BenchConfig::default());
        let addr = Address24::truncate(0x0400);
        let payload = pattern(32, 0x5A);
        bench
            .roundtrip(
                CommandHeader::write_result(AccelId::Sha, addr),
                CommandHeader::read_text(AccelId::Sha, addr),
                &payload,
            )
            .unwrap();
        assert_eq!(bench.acks().len(), 2);
        let ops = bench.opcode_trace();
        assert_eq!(ops.last(), Some(&opcodes::QOR));
    }

    #[test]
    fn test_read_key_returns_preloaded_bytes() {
        let mut bench = ready_bench(BenchConfig::default());
        let key = pattern(32, 0xC3);
        bench.flash_mut().preload(0x1000, &key).unwrap();
        let data = bench.read(CommandHeader::read_key(Address24::truncate(0x1000))).unwrap();
        assert_eq!(data, key);
    }

    #[test]
    fn test_aes_text_is_sixteen_bytes() {
        let mut bench = ready_bench(BenchConfig::full_rate());
        let text = pattern(32, 9);
        bench.flash_mut().preload(0x2000, &text).unwrap();
        let data = bench
            .read(CommandHeader::read_text(AccelId::Aes, Address24::truncate(0x2000)))
            .unwrap();
        assert_eq!(data, &text[..16]);
    }

    #[test]
    fn test_invalid_headers_are_dropped() {
        let mut bench = ready_bench(BenchConfig::default());
        let frames = bench.frames().len();
        for first in [0x03, 0x87, 0x04, 0x21, 0x2A] {
            bench.send_header([first, 0x00, 0x10, 0x00]).unwrap();
            bench.idle(200).unwrap();
        }
        assert_eq!(bench.frames().len(), frames);
        assert_eq!(bench.controller().rejected_headers(), 5);
        assert!(bench.acks().is_empty());

        // The next legal request is served normally
        let payload = pattern(16, 1);
        bench
            .write(CommandHeader::write_result(AccelId::Aes, Address24::truncate(0x40)), &payload)
            .unwrap();
        assert_eq!(bench.acks().len(), 1);
    }

    #[test]
    fn test_header_latched_during_startup() {
        let mut bench = bench_with(BenchConfig::default());
        let payload = pattern(16, 0x77);
        let header = CommandHeader::write_result(AccelId::Aes, Address24::truncate(0x300));
        bench.write(header, &payload).unwrap();

        let ops = dedup_polls(&bench.opcode_trace());
        assert_eq!(&ops[..STARTUP.len()], STARTUP);
        assert_eq!(bench.flash().read(0x300, 16).unwrap(), &payload[..]);
    }

    #[test]
    fn test_payload_length_checked() {
        let mut bench = bench_with(BenchConfig::default());
        let header = CommandHeader::write_result(AccelId::Sha, Address24::truncate(0));
        assert!(matches!(
            bench.write(header, &[0; 16]),
            Err(BenchError::PayloadLength { expected: 32, actual: 16, .. })
        ));
        assert!(matches!(
            bench.read(header),
            Err(BenchError::WrongDirection(_))
        ));
    }

    #[test]
    fn test_slow_grant_holds_request() {
        let config = BenchConfig {
            grant_latency: 50,
            ..BenchConfig::full_rate()
        };
        let mut bench = ready_bench(config);
        bench
            .write(CommandHeader::write_result(AccelId::Aes, Address24::truncate(0)), &[0; 16])
            .unwrap();
        let event = bench.acks()[0];
        assert!(event.granted_at - event.raised_at >= 50);
    }

    #[test]
    fn test_missing_payload_times_out() {
        let ctrl = ControllerConfig {
            handshake_timeout_cycles: 500,
            ..Default::default()
        };
        let mut bench = Bench::new(ctrl, DummyConfig::default(), BenchConfig::full_rate()).unwrap();
        bench.run_startup().unwrap();
        let header = CommandHeader::write_result(AccelId::Aes, Address24::truncate(0));
        bench.send_header(header.encode()).unwrap();
        bench.send(&[1, 2, 3, 4]).unwrap();

        let err = bench.run_quiet(2_000).unwrap_err();
        assert!(matches!(
            err,
            BenchError::Controller(qspimem_core::Error::ProtocolTimeout {
                waiting_for: WaitTarget::TxReady,
                ..
            })
        ));
        assert!(bench.controller().outputs().fault);
        assert!(bench.acks().is_empty());

        // Reset recovers the controller
        bench.reset(4).unwrap();
        assert!(bench.controller().fault().is_none());
        assert_eq!(bench.state(), SequencerState::Idle);
    }

    #[test]
    fn test_reset_mid_transaction() {
        let mut bench = ready_bench(BenchConfig::full_rate());
        let header = CommandHeader::write_result(AccelId::Sha, Address24::truncate(0x800));
        bench.send_header(header.encode()).unwrap();
        bench.send(&pattern(10, 0)).unwrap();

        let violations = bench.reset(3).unwrap();
        assert!(violations
            .iter()
            .all(|v| matches!(v, Violation::PartialByte { .. })));
        assert!(bench.acks().is_empty());
        let restart = dedup_polls(&bench.opcode_trace());
        assert!(restart.ends_with(&[0x06, 0x98, 0x06, 0xC7, 0x05, 0x35]));

        let payload = pattern(32, 0xEE);
        bench
            .roundtrip(header, CommandHeader::read_text(AccelId::Sha, Address24::truncate(0x800)), &payload)
            .unwrap();
    }

    #[test]
    fn test_reset_while_programming_waits_for_wip() {
        let mut bench = ready_bench(BenchConfig::default());
        let header = CommandHeader::write_result(AccelId::Aes, Address24::truncate(0x40));
        bench.send_header(header.encode()).unwrap();
        bench.send(&pattern(16, 0x30)).unwrap();
        while !bench.flash().is_busy() {
            bench.run_quiet(1).unwrap();
        }
        let before = bench.frames().len();

        let violations = bench.reset(2).unwrap();
        assert!(violations.is_empty(), "{violations:?}");
        let restart: Vec<u8> = bench.frames()[before..]
            .iter()
            .filter_map(|f| f.opcode)
            .collect();
        let first_write = restart.iter().position(|&op| op != 0x05).unwrap();
        assert!(first_write > 0);
        assert_eq!(&restart[first_write..first_write + 3], &[0x06, 0x66, 0x99]);
        assert!(bench.frames()[before..]
            .iter()
            .all(|f| !f.while_busy || matches!(f.opcode, None | Some(0x05))));
        // The restart erased the chip again
        assert_eq!(bench.flash().read(0x40, 16).unwrap(), &[0xFF; 16]);

        bench
            .roundtrip(header, CommandHeader::read_text(AccelId::Aes, Address24::truncate(0x40)), &pattern(16, 0x51))
            .unwrap();
    }

    #[test]
    fn test_controller_faults_surface() {
        let ctrl = ControllerConfig {
            handshake_timeout_cycles: 0,
            ..Default::default()
        };
        assert!(matches!(
            Bench::new(ctrl, DummyConfig::default(), BenchConfig::default()),
            Err(BenchError::Controller(qspimem_core::Error::InvalidConfig(_)))
        ));
    }
}

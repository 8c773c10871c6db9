//! Randomized request mix

use qspimem_core::spi::Address24;
use qspimem_core::{AccelId, CommandHeader, EncType};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::bench::{compare, Bench};
use crate::error::Result;

/// First header bytes that never decode to a legal request
const ILLEGAL_FIRST_BYTES: [u8; 5] = [0x03, 0x87, 0x04, 0x21, 0x2A];

/// Stress writes land on slots of this size, so none crosses a page
const SLOT: u32 = 32;

/// Totals from a [`Bench::stress`] run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StressReport {
    /// Iterations run
    pub iterations: u32,
    /// Write requests completed
    pub writes: u32,
    /// Read requests completed
    pub reads: u32,
    /// Reads compared against the payload written to a fresh slot
    pub verified: u32,
    /// Illegal headers sent and dropped
    pub rejected: u32,
    /// Bench cycles spent
    pub cycles: u64,
}

impl Bench {
    /// Run `iterations` random write/read-back pairs, with the occasional
    /// illegal header mixed in
    ///
    /// Writes go to shuffled 32-byte slots. A read-back from a slot
    /// written for the first time is compared against the payload; once
    /// every slot has been used, later writes only clear bits, so their
    /// reads are counted but not compared. `progress` is called after each
    /// iteration with the number completed.
    pub fn stress<F>(&mut self, iterations: u32, mut progress: F) -> Result<StressReport>
    where
        F: FnMut(u32),
    {
        self.run_startup()?;
        let start = self.cycle();
        let slots = (self.flash().config().size as u32 / SLOT).min(iterations.max(1).saturating_mul(4));
        let mut order: Vec<u32> = (0..slots).collect();
        order.shuffle(self.rng());

        let mut report = StressReport::default();
        for i in 0..iterations {
            if self.rng().gen_ratio(1, 8) {
                let first = *ILLEGAL_FIRST_BYTES.choose(self.rng()).unwrap_or(&0x03);
                let addr = self.rng().gen::<[u8; 3]>();
                self.send_header([first, addr[0], addr[1], addr[2]])?;
                self.idle(16)?;
                report.rejected += 1;
            }

            let slot = order[i as usize % order.len()];
            let addr = Address24::truncate(slot * SLOT);
            let (write, read) = self.pick_pair(addr);
            let len = write.transfer_len().unwrap_or(0) as usize;
            let payload = self.random_payload(len);

            // A reused slot still holds the previous payload
            let fresh = (i as usize) < order.len();
            self.write(write, &payload)?;
            report.writes += 1;
            let data = self.read(read)?;
            report.reads += 1;
            if fresh {
                compare(&payload[..data.len()], &data)?;
                report.verified += 1;
            }

            report.iterations += 1;
            progress(report.iterations);
        }
        report.cycles = self.cycle() - start;
        log::info!(
            "bench: stress {} iterations, {} verified, {} rejected, {} cycles",
            report.iterations,
            report.verified,
            report.rejected,
            report.cycles
        );
        Ok(report)
    }

    fn pick_pair(&mut self, addr: Address24) -> (CommandHeader, CommandHeader) {
        let enc = if self.rng().gen_bool(0.5) {
            EncType::Encrypt
        } else {
            EncType::Decrypt
        };
        match self.rng().gen_range(0..3) {
            0 => (
                CommandHeader::write_result(AccelId::Aes, addr).with_enc_type(enc),
                CommandHeader::read_text(AccelId::Aes, addr).with_enc_type(enc),
            ),
            1 => (
                CommandHeader::write_result(AccelId::Sha, addr),
                CommandHeader::read_text(AccelId::Sha, addr),
            ),
            _ => (
                CommandHeader::write_result(AccelId::Sha, addr),
                CommandHeader::read_key(addr).with_enc_type(enc),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BenchConfig;
    use qspimem_core::ControllerConfig;
    use qspimem_dummy::DummyConfig;

    fn small_flash() -> DummyConfig {
        DummyConfig {
            size: 64 * 1024,
            erase_cycles: 400,
            ..Default::default()
        }
    }

    #[test]
    fn test_stress_across_seeds() {
        for seed in [1, 2, 3] {
            let config = BenchConfig {
                seed,
                in_valid_prob: 0.5,
                out_ready_prob: 0.5,
                grant_latency: seed as u32,
                ..Default::default()
            };
            let mut bench = Bench::new(ControllerConfig::default(), small_flash(), config).unwrap();
            let mut seen = 0;
            let report = bench.stress(12, |n| seen = n).unwrap();
            assert_eq!(seen, 12);
            assert_eq!(report.writes, 12);
            assert_eq!(report.reads, 12);
            assert_eq!(report.verified, 12);
            assert_eq!(bench.acks().len(), 24);
            assert_eq!(bench.controller().rejected_headers(), report.rejected);
            assert!(bench.flash().violations().is_empty());
            assert_eq!(bench.flash().contention(), 0);
        }
    }

    #[test]
    fn test_reused_slots_are_not_verified() {
        // Two slots, so the last two iterations write over used slots
        let flash = DummyConfig {
            size: 64,
            page_size: 32,
            erase_cycles: 50,
            ..Default::default()
        };
        let mut bench = Bench::new(ControllerConfig::default(), flash, BenchConfig::full_rate()).unwrap();
        let report = bench.stress(4, |_| {}).unwrap();
        assert_eq!(report.reads, 4);
        assert_eq!(report.verified, 2);
    }

    #[test]
    fn test_stress_is_deterministic() {
        let run = || {
            let mut bench =
                Bench::new(ControllerConfig::default(), small_flash(), BenchConfig::default()).unwrap();
            let report = bench.stress(6, |_| {}).unwrap();
            (report, bench.opcode_trace())
        };
        assert_eq!(run(), run());
    }
}

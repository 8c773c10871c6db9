//! CLI command implementations
//!
//! Every command builds a fresh [`Bench`] from the effective configuration,
//! so each run starts from power-up with an erased flash.

mod stress;
mod transfer;

pub use stress::run_stress;
pub use transfer::{run_read, run_roundtrip, run_startup, run_trace, run_write};

use qspimem_bench::{Bench, BenchError};
use qspimem_dummy::FrameRecord;

use crate::config::AppConfig;

/// Build a bench from the configuration
pub fn open_bench(config: &AppConfig) -> Result<Bench, BenchError> {
    Bench::new(config.controller, config.flash.clone(), config.bench.clone())
}

/// Format bytes as space-separated hex
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Print one line per flash frame
pub fn print_frames(frames: &[FrameRecord]) {
    println!("{:>5}  {:<6}  {:<8}  {:>5}  Note", "Frame", "Opcode", "Address", "Bytes");
    for (i, frame) in frames.iter().enumerate() {
        let opcode = frame
            .opcode
            .map(|op| format!("0x{:02X}", op))
            .unwrap_or_else(|| "-".into());
        let address = frame
            .address
            .map(|a| format!("0x{:06X}", a))
            .unwrap_or_else(|| "-".into());
        let note = if frame.while_busy { "while busy" } else { "" };
        println!(
            "{:>5}  {:<6}  {:<8}  {:>5}  {}",
            i, opcode, address, frame.data_bytes, note
        );
    }
}

/// Collapse runs of repeated opcodes into `opxN`
pub fn summarize_opcodes(ops: &[u8]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut iter = ops.iter().peekable();
    while let Some(&op) = iter.next() {
        let mut count = 1;
        while iter.peek() == Some(&&op) {
            iter.next();
            count += 1;
        }
        if count > 1 {
            parts.push(format!("{:02X}x{}", op, count));
        } else {
            parts.push(format!("{:02X}", op));
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_opcodes() {
        assert_eq!(summarize_opcodes(&[0x06, 0x05, 0x05, 0x05, 0x35]), "06 05x3 35");
        assert_eq!(summarize_opcodes(&[]), "");
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x00, 0xAB]), "00 ab");
    }
}

//! Single-request commands

use qspimem_bench::Bench;
use qspimem_core::{AccelId, CommandHeader};

use super::{hex, open_bench, print_frames, summarize_opcodes};
use crate::cli::{HexBytes, ReadKind, RequestArgs};
use crate::config::AppConfig;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

fn ready_bench(config: &AppConfig) -> Result<Bench, Box<dyn std::error::Error>> {
    let mut bench = open_bench(config)?;
    let cycles = bench.run_startup()?;
    log::info!("Initialization took {} cycles", cycles);
    Ok(bench)
}

/// Run the initialization sequence and show what it issued
pub fn run_startup(config: &AppConfig) -> CmdResult {
    let bench = ready_bench(config)?;
    println!("Startup opcodes: {}", summarize_opcodes(&bench.opcode_trace()));
    println!("Cycles:          {}", bench.cycle());
    println!(
        "Flash status:    SR1={:?} SR2={:?}",
        bench.flash().status1(),
        bench.flash().status2()
    );
    Ok(())
}

/// Send one WriteResult request
pub fn run_write(config: &AppConfig, request: &RequestArgs, data: Option<&HexBytes>) -> CmdResult {
    let mut bench = ready_bench(config)?;
    let header = request.write_header();
    let payload = match data {
        Some(HexBytes(bytes)) => bytes.clone(),
        None => bench.random_payload(header.transfer_len().unwrap_or(0) as usize),
    };

    let start = bench.cycle();
    bench.write(header, &payload)?;
    println!("Wrote {} bytes at {}: {}", payload.len(), header.address, hex(&payload));
    println!("Completed in {} cycles, ack id {:#04b}", bench.cycle() - start, last_ack_id(&bench));
    Ok(())
}

/// Send one ReadKey or ReadText request
pub fn run_read(
    config: &AppConfig,
    request: &RequestArgs,
    kind: ReadKind,
    preload: Option<&HexBytes>,
) -> CmdResult {
    let header = match kind {
        ReadKind::Key if AccelId::from(request.accel) != AccelId::Aes => {
            return Err("Keys are only read for the AES accelerator".into());
        }
        ReadKind::Key => CommandHeader::read_key(request.addr),
        ReadKind::Text => request.text_header(),
    };

    let mut bench = ready_bench(config)?;
    if let Some(HexBytes(bytes)) = preload {
        bench.flash_mut().preload(request.addr.get(), bytes)?;
    }
    let start = bench.cycle();
    let data = bench.read(header)?;
    println!("Read {} bytes at {}: {}", data.len(), header.address, hex(&data));
    println!("Completed in {} cycles, ack id {:#04b}", bench.cycle() - start, last_ack_id(&bench));
    Ok(())
}

/// Write a random payload and read it back
pub fn run_roundtrip(config: &AppConfig, request: &RequestArgs) -> CmdResult {
    let mut bench = ready_bench(config)?;
    let write = request.write_header();
    let payload = bench.random_payload(write.transfer_len().unwrap_or(0) as usize);
    bench.roundtrip(write, request.text_header(), &payload)?;
    println!("Round trip of {} bytes at {} verified", payload.len(), write.address);
    Ok(())
}

/// Show every flash frame of a write and read-back
pub fn run_trace(config: &AppConfig, request: &RequestArgs) -> CmdResult {
    let mut bench = ready_bench(config)?;
    let skip = bench.frames().len();
    let write = request.write_header();
    let payload = bench.random_payload(write.transfer_len().unwrap_or(0) as usize);
    bench.roundtrip(write, request.text_header(), &payload)?;
    print_frames(&bench.frames()[skip..]);
    for (i, ack) in bench.acks().iter().enumerate() {
        println!(
            "Ack {}: id {:#04b}, raised at cycle {}, granted at cycle {}",
            i, ack.id, ack.raised_at, ack.granted_at
        );
    }
    Ok(())
}

fn last_ack_id(bench: &Bench) -> u8 {
    bench.acks().last().map(|a| a.id).unwrap_or(0)
}

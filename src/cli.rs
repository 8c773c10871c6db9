//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use qspimem_core::spi::Address24;
use qspimem_core::{AccelId, CommandHeader, EncType, EraseOpcode};
use std::path::PathBuf;

use crate::config::AppConfig;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a string as a hex or decimal u64
fn parse_hex_u64(s: &str) -> Result<u64, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u64>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a 24-bit flash address
fn parse_address(s: &str) -> Result<Address24, String> {
    let value = parse_hex_u32(s)?;
    Address24::new(value).ok_or_else(|| format!("Address {:#x} does not fit in 24 bits", value))
}

/// Raw bytes given on the command line as hex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

/// Parse a hex byte string such as `00112233` or `00:11:22:33`
fn parse_hex_bytes(s: &str) -> Result<HexBytes, String> {
    if let Some(bad) = s.chars().find(|c| !c.is_ascii_hexdigit() && !matches!(c, ':' | ' ' | '_')) {
        return Err(format!("Invalid hex digit {:?}", bad));
    }
    let digits: Vec<u8> = s.bytes().filter(|c| c.is_ascii_hexdigit()).collect();
    if digits.len() % 2 != 0 {
        return Err("Hex data must have an even number of digits".into());
    }
    Ok(HexBytes(
        digits
            .chunks(2)
            .map(|pair| (hex_value(pair[0]) << 4) | hex_value(pair[1]))
            .collect(),
    ))
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

#[derive(Parser)]
#[command(name = "qspimem")]
#[command(author, version, about = "Cycle-level QSPI flash memory controller bench", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (TOML format)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Commands,
}

/// Command line settings that take precedence over the configuration file
#[derive(clap::Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Backpressure seed
    #[arg(long, global = true, value_parser = parse_hex_u64)]
    pub seed: Option<u64>,

    /// Host never stalls and grants are immediate
    #[arg(long, global = true)]
    pub full_rate: bool,

    /// Flash powers up with QE already set
    #[arg(long, global = true)]
    pub qe_set: bool,

    /// Chip erase opcode for initialization
    #[arg(long, global = true)]
    pub erase: Option<EraseArg>,
}

impl Overrides {
    /// Apply on top of a loaded configuration
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(seed) = self.seed {
            config.bench.seed = seed;
        }
        if self.full_rate {
            config.bench.in_valid_prob = 1.0;
            config.bench.out_ready_prob = 1.0;
            config.bench.grant_latency = 0;
        }
        if self.qe_set {
            config.flash.initial_qe = true;
        }
        if let Some(erase) = self.erase {
            config.controller.erase_opcode = match erase {
                EraseArg::C7 => EraseOpcode::C7,
                EraseArg::X60 => EraseOpcode::X60,
            };
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseArg {
    #[value(name = "c7")]
    C7,
    #[value(name = "60")]
    X60,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelArg {
    Aes,
    Sha,
}

impl From<AccelArg> for AccelId {
    fn from(arg: AccelArg) -> Self {
        match arg {
            AccelArg::Aes => AccelId::Aes,
            AccelArg::Sha => AccelId::Sha,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadKind {
    /// 32-byte AES key
    Key,
    /// Accelerator input text
    Text,
}

/// Request selection shared by the transfer commands
#[derive(clap::Args, Debug, Clone)]
pub struct RequestArgs {
    /// Accelerator the request is for
    #[arg(short, long, value_enum)]
    pub accel: AccelArg,

    /// Flash address (hex with 0x prefix, or decimal)
    #[arg(long, value_parser = parse_address)]
    pub addr: Address24,

    /// Mark the request as a decryption
    #[arg(long)]
    pub decrypt: bool,
}

impl RequestArgs {
    fn enc_type(&self) -> EncType {
        if self.decrypt {
            EncType::Decrypt
        } else {
            EncType::Encrypt
        }
    }

    /// WriteResult header for this request
    pub fn write_header(&self) -> CommandHeader {
        CommandHeader::write_result(self.accel.into(), self.addr).with_enc_type(self.enc_type())
    }

    /// ReadText header for this request
    pub fn text_header(&self) -> CommandHeader {
        CommandHeader::read_text(self.accel.into(), self.addr).with_enc_type(self.enc_type())
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the flash initialization sequence and show the opcodes issued
    Startup,

    /// Send one WriteResult request
    Write {
        #[command(flatten)]
        request: RequestArgs,

        /// Payload as hex (random if omitted)
        #[arg(short, long, value_parser = parse_hex_bytes)]
        data: Option<HexBytes>,
    },

    /// Send one ReadKey or ReadText request
    Read {
        #[command(flatten)]
        request: RequestArgs,

        /// What to read (keys are AES only)
        #[arg(short, long, value_enum, default_value = "text")]
        kind: ReadKind,

        /// Bytes to preload at the address before reading (hex)
        #[arg(short, long, value_parser = parse_hex_bytes)]
        preload: Option<HexBytes>,
    },

    /// Write a random payload and read it back
    Roundtrip {
        #[command(flatten)]
        request: RequestArgs,
    },

    /// Run a random mix of requests
    Stress {
        /// Number of write/read-back pairs
        #[arg(short = 'n', long, default_value = "100")]
        iterations: u32,
    },

    /// Show every flash frame of a write and read-back
    Trace {
        #[command(flatten)]
        request: RequestArgs,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

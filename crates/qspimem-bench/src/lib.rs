//! qspimem-bench - Clocked bench around the memory controller
//!
//! A [`Bench`] owns a [`MemController`](qspimem_core::MemController), a
//! [`DummyFlash`](qspimem_dummy::DummyFlash), a host bus driver with
//! seeded random backpressure and an ack bus granter, and advances them all
//! in lock step. It is what the CLI runs scenarios on and what the
//! end-to-end tests drive.

mod bench;
mod config;
mod error;
mod host;
mod stress;

pub use bench::{AckEvent, Bench};
pub use config::BenchConfig;
pub use error::BenchError;
pub use stress::StressReport;

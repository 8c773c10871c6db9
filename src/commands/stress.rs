//! Stress command implementation

use indicatif::{ProgressBar, ProgressStyle};

use super::open_bench;
use crate::config::AppConfig;

/// Run a random request mix with a progress bar
pub fn run_stress(config: &AppConfig, iterations: u32) -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = open_bench(config)?;

    let pb = ProgressBar::new(u64::from(iterations));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} requests ({eta})")?
            .progress_chars("#>-"),
    );

    let result = bench.stress(iterations, |done| pb.set_position(u64::from(done)));
    pb.finish_and_clear();
    let report = result?;

    println!("Seed:        {:#x}", config.bench.seed);
    println!("Iterations:  {}", report.iterations);
    println!("Writes:      {}", report.writes);
    println!("Reads:       {} ({} verified)", report.reads, report.verified);
    println!("Rejected:    {}", report.rejected);
    println!("Cycles:      {}", report.cycles);
    println!("Acks:        {}", bench.acks().len());
    Ok(())
}

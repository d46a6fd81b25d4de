use anyhow::Context;
use clap::Parser;
use geodata_harvest::utils::logger::{self, component_span};
use geodata_harvest::WcsClient;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "wcs_capabilities")]
#[command(about = "List the coverages offered by a WCS 1.0.0 endpoint")]
struct Args {
    /// WCS endpoint URL
    url: String,

    /// Also list the time positions of this coverage
    #[arg(long)]
    times_for: Option<String>,

    /// Only keep time positions from this year
    #[arg(long, requires = "times_for")]
    year: Option<i32>,

    /// Request timeout in seconds
    #[arg(long, default_value = "300")]
    timeout: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    let client = WcsClient::new(Duration::from_secs(args.timeout), component_span("wcs"));

    let coverages = client
        .capabilities(&args.url)
        .await
        .with_context(|| format!("GetCapabilities failed for {}", args.url))?;

    println!("📋 {} coverage(s) at {}", coverages.len(), args.url);
    for coverage in &coverages {
        let envelope = coverage
            .lon_lat_envelope
            .map(|b| b.to_query_value())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<45} {:<50} {}",
            coverage.name,
            coverage.label.as_deref().unwrap_or(""),
            envelope
        );
    }

    if let Some(coverage) = &args.times_for {
        let times = client
            .time_positions(&args.url, coverage, args.year)
            .await
            .with_context(|| format!("DescribeCoverage failed for {}", coverage))?;
        println!();
        println!("🕒 {} time position(s) for {}", times.len(), coverage);
        for time in times {
            println!("  {}", time);
        }
    }

    Ok(())
}

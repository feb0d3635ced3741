//! nifty-risk CLI
//!
//! Sector volatility, beta, flow lead-lag and regime analytics over NIFTY
//! sector indices and FII/DII flows.
//!
//! # Usage
//!
//! ```bash
//! # Full run, writing the master table
//! nifty-risk run --prices data/sectors --flows data/fii_dii.csv --output out/master.csv
//!
//! # Lead-lag of flows against sector returns
//! nifty-risk lead-lag --prices data/sectors --flows data/fii_dii.csv --max-lag 5
//!
//! # Sector momentum as of a date
//! nifty-risk momentum --prices data/sectors --as-of 2024-03-28
//!
//! # Data integrity report
//! nifty-risk validate --prices data/sectors --flows data/fii_dii.csv
//!
//! # Write the default configuration
//! nifty-risk init-config --output config.json
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;

use nifty_risk::analytics::MomentumSnapshot;
use nifty_risk::data::{align, DataLoader};
use nifty_risk::validation::DataIntegrityValidator;
use nifty_risk::{PipelineConfig, PipelineEngine};

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "nifty-risk")]
#[command(about = "Sector risk analytics for NIFTY indices and institutional flows")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the master table
    Run {
        /// Price CSV file or directory of per-sector files
        #[arg(short, long)]
        prices: PathBuf,

        /// FII/DII flow CSV
        #[arg(short, long)]
        flows: Option<PathBuf>,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Master CSV output path
        #[arg(short, long, default_value = "output/master.csv")]
        output: PathBuf,

        /// Also write every lead-lag coefficient here
        #[arg(long)]
        lead_lag_output: Option<PathBuf>,
    },

    /// Lead-lag correlation of flows against sector returns
    LeadLag {
        /// Price CSV file or directory of per-sector files
        #[arg(short, long)]
        prices: PathBuf,

        /// FII/DII flow CSV
        #[arg(short, long)]
        flows: PathBuf,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Largest lag in sessions, both directions
        #[arg(long)]
        max_lag: Option<usize>,
    },

    /// Sector momentum snapshot
    Momentum {
        /// Price CSV file or directory of per-sector files
        #[arg(short, long)]
        prices: PathBuf,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// As-of date (YYYY-MM-DD), defaults to the last session
        #[arg(long)]
        as_of: Option<String>,
    },

    /// Check loaded data and print an integrity report
    Validate {
        /// Price CSV file or directory of per-sector files
        #[arg(short, long)]
        prices: PathBuf,

        /// FII/DII flow CSV
        #[arg(short, long)]
        flows: Option<PathBuf>,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write the default configuration as JSON
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::load(p)
            .with_context(|| format!("Failed to load config from {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn cmd_run(
    prices: &Path,
    flows: Option<&Path>,
    config: PipelineConfig,
    output: &Path,
    lead_lag_output: Option<&Path>,
) -> Result<()> {
    let engine = PipelineEngine::new(config)?;
    let result = engine
        .run_files(prices, flows)
        .context("Pipeline run failed")?;

    result
        .write_master_csv(output)
        .with_context(|| format!("Failed to write master table to {}", output.display()))?;
    if let Some(path) = lead_lag_output {
        result
            .write_lead_lag_csv(path)
            .with_context(|| format!("Failed to write lead-lag table to {}", path.display()))?;
    }

    println!("{}", SEPARATOR);
    println!("NIFTY SECTOR RISK PIPELINE");
    println!("{}", SEPARATOR);
    println!("{}", result.summary());

    if result.correlation_matrix.len() > 1 {
        println!("Return correlation matrix:");
        println!("{}", result.correlation_matrix.format_table());
    }

    println!("{}", SEPARATOR);
    println!("Master table: {}", output.display());
    if let Some(path) = lead_lag_output {
        println!("Lead-lag table: {}", path.display());
    }
    println!("{}", SEPARATOR);
    Ok(())
}

fn cmd_lead_lag(prices: &Path, flows: &Path, mut config: PipelineConfig, max_lag: Option<usize>) -> Result<()> {
    if let Some(lag) = max_lag {
        config.lead_lag.max_lag = lag;
    }
    let engine = PipelineEngine::new(config)?;
    let result = engine
        .run_files(prices, Some(flows))
        .context("Pipeline run failed")?;

    if result.lead_lag.is_empty() {
        bail!("No flow series loaded from {}", flows.display());
    }

    println!("{}", SEPARATOR);
    println!(
        "LEAD-LAG (flow at t-k vs return at t, k in -{}..={})",
        engine.config().lead_lag.max_lag,
        engine.config().lead_lag.max_lag
    );
    println!("{}", SEPARATOR);

    for report in &result.lead_lag {
        println!("{}", report.summary());
    }

    println!("\n{:<20} {:<4} {:>5} {:>9} {:>6} {:>8}", "Sector", "Flow", "Lag", "r", "n", "p");
    println!("{}", "-".repeat(58));
    for report in &result.lead_lag {
        for c in &report.profile {
            println!(
                "{:<20} {:<4} {:>+5} {:>9} {:>6} {:>8}",
                report.sector,
                report.investor_class.as_str(),
                c.lag,
                c.correlation.map(|r| format!("{:+.4}", r)).unwrap_or_else(|| "-".to_string()),
                c.observations,
                c.p_value.map(|p| format!("{:.4}", p)).unwrap_or_else(|| "-".to_string()),
            );
        }
    }
    println!("{}", SEPARATOR);
    Ok(())
}

fn cmd_momentum(prices: &Path, config: PipelineConfig, as_of: Option<NaiveDate>) -> Result<()> {
    let inputs = DataLoader::new(config.loader.clone())
        .load(prices, None)
        .with_context(|| format!("Failed to load prices from {}", prices.display()))?;
    let panel = align(&inputs, &config.alignment)?;

    let Some(snapshot) = MomentumSnapshot::compute(&panel, as_of, config.momentum.lookback_days) else {
        bail!("No sessions to compute momentum over");
    };
    info!(as_of = %snapshot.as_of, sectors = snapshot.ranked.len(), "momentum snapshot");

    let fmt = |r: Option<f64>| r.map(|r| format!("{:+.2}%", r)).unwrap_or_else(|| "-".to_string());

    println!("{}", SEPARATOR);
    println!(
        "SECTOR MOMENTUM as of {} ({} to {})",
        snapshot.as_of, snapshot.start_date, snapshot.end_date
    );
    println!("{}", SEPARATOR);
    println!("{:<20} {:>10}  (benchmark)", snapshot.benchmark.name, fmt(snapshot.benchmark.return_pct));
    println!("{}", "-".repeat(40));
    for (rank, sector) in snapshot.ranked.iter().enumerate() {
        println!("{:>2}. {:<16} {:>10}", rank + 1, sector.name, fmt(sector.return_pct));
    }

    let beating = snapshot.outperformers();
    println!("\nOutperforming {}: {}", snapshot.benchmark.name, beating.len());
    for s in beating {
        println!("  {}", s.name);
    }
    println!("{}", SEPARATOR);
    Ok(())
}

fn cmd_validate(prices: &Path, flows: Option<&Path>, config: PipelineConfig) -> Result<()> {
    let validator = DataIntegrityValidator::new(
        config.loader.clone(),
        &config.alignment.benchmark,
        config.integrity.clone(),
    );
    let report = validator
        .validate_files(prices, flows)
        .context("Failed to load inputs for validation")?;

    println!("{}", SEPARATOR);
    println!("DATA INTEGRITY");
    println!("{}", SEPARATOR);
    print!("{}", report.format_checks());
    println!("{}", SEPARATOR);
    println!("{}", report.summary());
    println!("{}", SEPARATOR);

    if !report.all_passed() {
        bail!("{} integrity check(s) failed", report.failed_checks().len());
    }
    Ok(())
}

fn cmd_init_config(output: &Path) -> Result<()> {
    let config = PipelineConfig::default();
    config
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote default configuration to {}", output.display());
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nifty_risk=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            prices,
            flows,
            config,
            output,
            lead_lag_output,
        } => {
            let config = load_config(config.as_deref())?;
            cmd_run(&prices, flows.as_deref(), config, &output, lead_lag_output.as_deref())?;
        }
        Commands::LeadLag {
            prices,
            flows,
            config,
            max_lag,
        } => {
            let config = load_config(config.as_deref())?;
            cmd_lead_lag(&prices, &flows, config, max_lag)?;
        }
        Commands::Momentum { prices, config, as_of } => {
            let config = load_config(config.as_deref())?;
            let as_of = match as_of {
                Some(d) => Some(
                    NaiveDate::parse_from_str(&d, "%Y-%m-%d").context("Invalid as-of date format")?,
                ),
                None => None,
            };
            cmd_momentum(&prices, config, as_of)?;
        }
        Commands::Validate { prices, flows, config } => {
            let config = load_config(config.as_deref())?;
            cmd_validate(&prices, flows.as_deref(), config)?;
        }
        Commands::InitConfig { output } => cmd_init_config(&output)?,
    }

    Ok(())
}

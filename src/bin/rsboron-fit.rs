//! Fit a kinetic boron partitioning model to a dataset
//!
//! # Usage
//!
//! ```bash
//! rsboron-fit --dataset uchikawa.json --config fit.toml --output report.json
//! ```
//!
//! The dataset is JSON with a `records` array of sample records. Speciation
//! must already be present in every record; derived quantities are
//! recalculated unless the config sets `derive_quantities = false`.

use clap::Parser;
use rsboron::config::FitConfig;
use rsboron::fit::{compare_variants, fit, FitReport};
use rsboron::{Error, Result};
use rsboron_core::dataset::Dataset;
use rsboron_core::model::ModelVariant;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Fit kinetic boron partitioning models to precipitation experiments
#[derive(Parser, Debug)]
#[command(name = "rsboron-fit")]
#[command(about = "Fit kinetic boron partitioning models to precipitation experiments")]
struct Args {
    /// JSON dataset
    #[arg(short, long)]
    dataset: PathBuf,

    /// TOML fit configuration. Defaults are used when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model variant, overriding the configuration
    #[arg(long)]
    variant: Option<String>,

    /// Fit every model variant and rank them by cost
    #[arg(long)]
    compare: bool,

    /// Write the report as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print per-sample residuals
    #[arg(short, long)]
    verbose: bool,
}

fn load_dataset(path: &Path) -> Result<Dataset> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut dataset: Dataset = serde_json::from_reader(reader)?;
    dataset.sort();
    Ok(dataset)
}

fn parse_variant(name: &str) -> Result<ModelVariant> {
    ModelVariant::ALL
        .into_iter()
        .find(|v| v.name() == name)
        .ok_or_else(|| {
            let names: Vec<&str> = ModelVariant::ALL.iter().map(|v| v.name()).collect();
            Error::Config(format!(
                "unknown variant {name}, expected one of {}",
                names.join(", ")
            ))
        })
}

fn print_report(report: &FitReport, verbose: bool) {
    if verbose {
        print!("{report}");
        let (lambda_rms, epsilon_rms) = report.normalised_rms();
        println!("normalised RMS: LambdaB {lambda_rms:.3}, EpsilonB {epsilon_rms:.3}");
    } else {
        println!(
            "{:>20} cost {:.6e} {:?}{}",
            report.variant.name(),
            report.cost,
            report.parameter_values(),
            if report.converged { "" } else { " (not converged)" }
        );
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => FitConfig::from_file(path)?,
        None => FitConfig::default(),
    };
    if let Some(name) = &args.variant {
        config.variant = parse_variant(name)?;
        config.validate()?;
    }

    let dataset = load_dataset(&args.dataset)?;
    if args.verbose {
        println!(
            "Loaded {} records ({}) from {}",
            dataset.len(),
            dataset.experiments().join(", "),
            args.dataset.display()
        );
    }

    if args.compare {
        let reports = compare_variants(&dataset, &config)?;
        for report in &reports {
            print_report(report, args.verbose);
        }
        if let Some(path) = &args.output {
            write_json(path, &reports)?;
            println!("Wrote {}", path.display());
        }
    } else {
        let report = fit(&dataset, &config)?;
        print_report(&report, args.verbose);
        if let Some(path) = &args.output {
            write_json(path, &report)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

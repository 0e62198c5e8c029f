use clap::Parser;
use mhn_repro::driver::{self, DatasetSpec, DriverConfig};
use mhn_repro::lambda::LambdaGrid;
use std::path::PathBuf;
use std::process;

/// Datasets reproduced when no --dataset overrides are given.
const DEFAULT_DATASETS: [(&str, &str); 2] = [
    ("COAD", "data/COAD_n12.csv"),
    ("LUAD", "data/LUAD_n12.csv"),
];

#[derive(Parser)]
#[command(
    name = "mhn-repro",
    about = "Fit oMHN and cMHN mutual hazard networks for tumor mutation datasets",
    long_about = "Reproduces the COAD/LUAD mutual hazard network analysis: for every dataset \
                  the tool selects a regularization strength by cross-validation, trains the \
                  omega and classical model variants with a symmetric-sparsity penalty, and \
                  writes each fitted network to the results directory."
)]
struct Cli {
    /// Dataset to process, as LABEL=PATH; repeatable (defaults to COAD and LUAD)
    #[arg(long = "dataset", value_name = "LABEL=PATH", value_parser = parse_dataset)]
    datasets: Vec<DatasetSpec>,

    /// Directory that receives the fitted networks
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// Seed for the cross-validation random state
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Smallest candidate regularization strength
    #[arg(long, default_value_t = 1e-4)]
    lambda_min: f64,

    /// Largest candidate regularization strength
    #[arg(long, default_value_t = 1e-1)]
    lambda_max: f64,

    /// Number of log-spaced candidate strengths searched
    #[arg(long, default_value_t = 9)]
    lambda_steps: usize,

    /// Cross-validation fold count
    #[arg(long, default_value_t = 5)]
    folds: usize,

    /// BFGS iteration budget per fit
    #[arg(long, default_value_t = 500)]
    max_iterations: usize,

    /// BFGS convergence tolerance
    #[arg(long, default_value_t = 1e-6)]
    tolerance: f64,

    /// Suppress the lambda-search progress bar
    #[arg(long)]
    quiet: bool,
}

fn parse_dataset(raw: &str) -> Result<DatasetSpec, String> {
    match raw.split_once('=') {
        Some((label, path)) if !label.is_empty() && !path.is_empty() => Ok(DatasetSpec {
            label: label.to_string(),
            path: PathBuf::from(path),
        }),
        _ => Err(format!("expected LABEL=PATH, got '{raw}'")),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let datasets = if cli.datasets.is_empty() {
        DEFAULT_DATASETS
            .iter()
            .map(|&(label, path)| DatasetSpec {
                label: label.to_string(),
                path: PathBuf::from(path),
            })
            .collect()
    } else {
        cli.datasets
    };

    let config = DriverConfig {
        datasets,
        results_dir: cli.results_dir,
        seed: cli.seed,
        grid: LambdaGrid {
            min: cli.lambda_min,
            max: cli.lambda_max,
            steps: cli.lambda_steps,
        },
        folds: cli.folds,
        max_iterations: cli.max_iterations,
        tolerance: cli.tolerance,
        show_progress: !cli.quiet,
        ..DriverConfig::default()
    };

    if let Err(e) = std::fs::create_dir_all(&config.results_dir) {
        eprintln!(
            "Error: cannot create results directory {}: {e}",
            config.results_dir.display()
        );
        process::exit(1);
    }
    if let Err(e) = driver::run(&config) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

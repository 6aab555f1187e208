//! # Phase 1 proof-of-concept calibration over a fixed catalog
//! alpha-calibrator phase1 --data data/factors.parquet --start 2019-01-01 --end 2023-12-31
//!
//! # Phase 2 gated calibration with 2000 Dirichlet draws
//! alpha-calibrator phase2 --data data/factors.parquet --start 2019-01-01 --end 2023-12-31 \
//!     --draws 2000 --seed 42 --out results/calibration.json
//!
//! # Inspect the current artifact
//! alpha-calibrator show --artifact results/calibration.json

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use alpha_calibrator::calibrate::{
    run_calibration, CalibrationConfig, CalibrationOutcome, CalibrationResult, Phase,
};
use alpha_calibrator::data::FactorMatrixLoader;

#[derive(Parser)]
#[command(name = "alpha-calibrator")]
#[command(about = "Cost-aware factor-weight calibration with statistical validation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Arguments shared by both calibration phases.
#[derive(Args)]
struct RunArgs {
    /// Path to the factor matrix parquet file
    #[arg(long)]
    data: PathBuf,

    /// Output path for the calibration artifact
    #[arg(long, default_value = "calibration.json")]
    out: PathBuf,

    /// Lookback start date (YYYY-MM-DD)
    #[arg(long)]
    start: String,

    /// Lookback end date (YYYY-MM-DD)
    #[arg(long)]
    end: String,

    /// Universe identifier recorded in the artifact
    #[arg(long, default_value = "default")]
    universe: String,

    /// Base random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Disable the transaction cost model (pure ranking mode)
    #[arg(long)]
    no_cost_model: bool,

    /// Commission as a fraction of traded notional
    #[arg(long, default_value_t = 0.0005)]
    commission_rate: f64,

    /// Market-impact calibration constant
    #[arg(long, default_value_t = 0.005)]
    impact_constant: f64,

    /// Market-impact exponent
    #[arg(long, default_value_t = 0.75)]
    impact_exponent: f64,

    /// Overwrite a validated artifact even with an unvalidated result
    #[arg(long)]
    force: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the fixed candidate catalog (no significance gate)
    Phase1 {
        #[command(flatten)]
        run: RunArgs,

        /// Maximum drawdown ceiling for selection, as a fraction
        #[arg(long, default_value_t = 0.25)]
        max_drawdown: f64,
    },

    /// Full gated search: coarse scan + Dirichlet refinement
    Phase2 {
        #[command(flatten)]
        run: RunArgs,

        /// Number of Dirichlet draws
        #[arg(long, default_value_t = 2000)]
        draws: usize,

        /// Bootstrap resamples per candidate
        #[arg(long, default_value_t = 1000)]
        resamples: usize,

        /// Significance threshold (p-value must be below this)
        #[arg(long, default_value_t = 0.05)]
        significance: f64,

        /// Stability threshold (fraction of positive windows)
        #[arg(long, default_value_t = 0.65)]
        stability: f64,

        /// Stop after evaluating this many candidates
        #[arg(long)]
        max_candidates: Option<usize>,

        /// Wall-clock budget in seconds
        #[arg(long)]
        time_budget_secs: Option<u64>,
    },

    /// Print the current calibration artifact
    Show {
        /// Path to the calibration artifact
        #[arg(long, default_value = "calibration.json")]
        artifact: PathBuf,
    },
}

fn parse_date(value: &str, which: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid {} date '{}', expected YYYY-MM-DD", which, value))
}

fn build_config(args: &RunArgs, phase: Phase) -> Result<CalibrationConfig> {
    let mut config = CalibrationConfig {
        phase,
        start: parse_date(&args.start, "start")?,
        end: parse_date(&args.end, "end")?,
        universe: args.universe.clone(),
        seed: args.seed,
        ..Default::default()
    };
    config.backtest.use_cost_model = !args.no_cost_model;
    config.backtest.cost.commission_rate = args.commission_rate;
    config.backtest.cost.impact_constant = args.impact_constant;
    config.backtest.cost.impact_exponent = args.impact_exponent;
    Ok(config)
}

fn execute(config: CalibrationConfig, args: &RunArgs) -> Result<()> {
    let loader = FactorMatrixLoader::new(
        args.data
            .to_str()
            .context("Data path is not valid UTF-8")?,
    );
    let matrix = loader.load(config.start, config.end)?;

    let universe = config.universe.clone();
    let phase = config.phase;
    let seed = config.seed;
    let outcome = run_calibration(config, &matrix, None)?;

    match &outcome {
        CalibrationOutcome::Selected {
            weights,
            metrics,
            validated,
            partial,
            candidates_evaluated,
        } => {
            println!("Calibration selected: {}", weights.key());
            println!("  Net Sharpe:    {:.3}", metrics.net_sharpe);
            println!("  Max drawdown:  {:.2}%", metrics.max_drawdown * 100.0);
            println!("  Growth rate:   {:.2}%", metrics.growth_rate * 100.0);
            if let Some(p) = metrics.p_value {
                println!("  p-value:       {:.4}", p);
            }
            if let Some(s) = metrics.stability {
                println!("  Stability:     {:.2}", s);
            }
            println!("  Validated:     {}", validated);
            println!("  Candidates:    {}{}", candidates_evaluated, if *partial { " (partial)" } else { "" });
        }
        CalibrationOutcome::NoSignificantAlpha {
            candidates_evaluated,
            partial,
        } => {
            println!(
                "No significant alpha found ({} candidates evaluated{})",
                candidates_evaluated,
                if *partial { ", partial" } else { "" }
            );
            println!("The existing artifact, if any, was left untouched.");
        }
    }

    let result = CalibrationResult::from_outcome(&outcome, &universe, phase, seed);
    result.save(&args.out, args.force)?;

    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("alpha_calibrator=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Phase1 { run, max_drawdown } => {
            let mut config = build_config(&run, Phase::Phase1)?;
            config.max_drawdown_ceiling = max_drawdown;
            info!("Starting phase 1 calibration");
            execute(config, &run)?;
        }
        Commands::Phase2 {
            run,
            draws,
            resamples,
            significance,
            stability,
            max_candidates,
            time_budget_secs,
        } => {
            let mut config = build_config(&run, Phase::Phase2)?;
            config.dirichlet_draws = draws;
            config.bootstrap.resample_count = resamples;
            config.significance_threshold = significance;
            config.stability.threshold = stability;
            config.max_candidates = max_candidates;
            config.time_budget_secs = time_budget_secs;
            info!("Starting phase 2 calibration ({} draws)", draws);
            execute(config, &run)?;
        }
        Commands::Show { artifact } => {
            let result = CalibrationResult::load(&artifact)
                .with_context(|| format!("Failed to load artifact {}", artifact.display()))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

use std::{fs, path::PathBuf, time::Instant};

use anyhow::{bail, ensure, Context};
use clap::{Parser, ValueEnum};
use reach_margin::{
    scenario::fraction_range, Format, Scale, TableBuilder, MAX_REACH_SUPPORT,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Writes Pr[forkable] for a sweep of adversarial fractions and time
/// horizons to a file.
#[derive(Debug, Parser)]
struct Args {
    /// File the table is written to.
    #[arg(short, long, default_value = "forkability_probs_matrix.txt")]
    output: PathBuf,
    /// Adversarial fractions, from MIN to MAX in steps of INC.
    #[arg(
        long,
        num_args = 3,
        value_names = ["MIN", "MAX", "INC"],
        default_values_t = [0.01, 0.491, 0.05]
    )]
    fractions: Vec<f64>,
    /// Time slots at which Pr[forkable] is recorded, from MIN to MAX in
    /// steps of INC. The chain is evolved up to MAX.
    #[arg(
        long,
        num_args = 3,
        value_names = ["MIN", "MAX", "INC"],
        default_values_t = [10, 50, 10]
    )]
    horizons: Vec<usize>,
    /// Support of the initial reach distribution is 0..=R.
    #[arg(short = 'R', long, default_value_t = MAX_REACH_SUPPORT)]
    reach_support: usize,
    /// Report probabilities rather than their base-10 logarithms.
    #[arg(long)]
    linear: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Tsv)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Tsv,
    Pretty,
}

impl From<OutputFormat> for Format {
    fn from(value: OutputFormat) -> Self {
        match value {
            OutputFormat::Csv => Format::CSV,
            OutputFormat::Tsv => Format::TSV,
            OutputFormat::Pretty => Format::PrettyPrint,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let &[f_min, f_max, f_inc] = args.fractions.as_slice() else {
        bail!("--fractions takes exactly MIN MAX INC");
    };
    let &[n_min, n_max, n_inc] = args.horizons.as_slice() else {
        bail!("--horizons takes exactly MIN MAX INC");
    };
    ensure!(f_inc > 0.0, "fraction increment must be positive");
    ensure!(n_inc > 0, "horizon increment must be positive");
    ensure!(n_min <= n_max, "no horizons between {} and {}", n_min, n_max);

    let fractions: Vec<_> = fraction_range(f_min, f_max, f_inc).collect();
    let horizons: Vec<_> = (n_min..=n_max).step_by(n_inc).collect();
    let horizon = horizons[horizons.len() - 1];

    if args.reach_support > MAX_REACH_SUPPORT {
        warn!(
            requested = args.reach_support,
            max = MAX_REACH_SUPPORT,
            "reach support will be clamped"
        );
    }

    let start = Instant::now();
    let table = TableBuilder::new(fractions.iter().copied())
        .horizons(horizons)
        .reach_support(args.reach_support)
        .scale(if args.linear { Scale::Linear } else { Scale::Log10 })
        .format(args.format.into())
        .build()?;

    let fraction_list: Vec<_> =
        fractions.iter().map(|f| format!("{:.3}", f)).collect();
    let text = format!(
        "Creating instance with N = {}, R = {}, and fractions: {}\n\
         Using memory: {} bytes\n\n{}\n",
        horizon,
        table.reach_support(),
        fraction_list.join(", "),
        table.memory_bytes(),
        table
    );

    fs::write(&args.output, &text).with_context(|| {
        format!("could not write to {}", args.output.display())
    })?;
    info!(
        output = %args.output.display(),
        elapsed = ?start.elapsed(),
        "wrote forkability table"
    );

    print!("{}", text);

    Ok(())
}

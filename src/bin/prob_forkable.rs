use anyhow::ensure;
use clap::Parser;
use reach_margin::{ReachMargin, MAX_REACH_SUPPORT};
use tracing_subscriber::EnvFilter;

/// Upper bound on Pr[forkable] for a single execution.
#[derive(Debug, Parser)]
struct Args {
    /// Length of the execution (at least 1).
    n: usize,
    /// Maximum reach of the prefix.
    r: usize,
    /// Bias; the adversarial fraction is (1 - eps) / 2.
    eps: f64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Args { n, r, eps } = Args::parse();
    ensure!(n >= 1, "N must be at least 1");
    ensure!(
        r <= MAX_REACH_SUPPORT,
        "R must be between 0 and {} (inclusive)",
        MAX_REACH_SUPPORT
    );
    ensure!((0.0..=1.0).contains(&eps), "eps must be between 0 and 1");

    let fraction = (1.0 - eps) / 2.0;
    println!("Received N: {} R: {} eps: {}", n, r, eps);

    let mut chain = ReachMargin::new(n, r, [fraction])?;
    chain.evolve_to(n)?;

    println!("\tPr[forkable] <= {:.12}", chain.forkable_probability()[0]);

    Ok(())
}

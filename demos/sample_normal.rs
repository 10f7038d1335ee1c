//! Draw from a truncated normal and a gamma density and print summaries.

use anyhow::Context;
use rand::{rngs::StdRng, SeedableRng};
use tdr_rs::{ContDistr, LogDensity, TdrParams};

/// Gamma density with shape `alpha >= 1`, unnormalized.
#[derive(Clone, Copy, Debug)]
struct Gamma {
    alpha: f64,
}

impl LogDensity for Gamma {
    fn log_pdf(&self, x: f64) -> f64 {
        (self.alpha - 1.) * x.ln() - x
    }

    fn dlog_pdf(&self, x: f64) -> f64 {
        (self.alpha - 1.) / x - 1.
    }

    fn domain(&self) -> (f64, f64) {
        (0., f64::INFINITY)
    }

    fn center(&self) -> Option<f64> {
        Some(self.alpha - 1.)
    }
}

fn summary(name: &str, draws: &[f64]) {
    let n = draws.len() as f64;
    let mean = draws.iter().sum::<f64>() / n;
    let var = draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.);
    println!("{name}: n = {n}, mean = {mean:.4}, variance = {var:.4}");
}

fn main() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(42);

    let truncated = ContDistr::builder()
        .log_pdf(|x| -0.5 * x * x)
        .dlog_pdf(|x| -x)
        .domain(-1., 2.)
        .build()?;
    let mut generator = TdrParams::new(truncated)?
        .init()
        .context("Could not build generator for truncated normal")?;
    let draws = generator.sample_n(&mut rng, 100_000)?;
    summary("normal on [-1, 2]", &draws);
    println!(
        "  {} intervals, squeeze/hat = {:.4}",
        generator.n_intervals(),
        generator.squeeze_hat_ratio()
    );

    let mut params = TdrParams::new(Gamma { alpha: 5. })?;
    params.set_cpoint_count(4)?.set_max_sqhratio(0.999)?;
    let mut generator = params
        .init()
        .context("Could not build generator for gamma")?;
    let draws = generator.sample_n(&mut rng, 100_000)?;
    summary("gamma(5)", &draws);
    println!(
        "  {} intervals, squeeze/hat = {:.4}, {:?}",
        generator.n_intervals(),
        generator.squeeze_hat_ratio(),
        generator.stats()
    );

    Ok(())
}

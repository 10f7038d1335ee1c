use rand::{rngs::StdRng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tdr_rs::{sample_parallel, ContDistr, LogDensity, TdrParams, TdrSettings, Tdrgw};

#[derive(Clone, Copy, Debug)]
struct Normal {
    mu: f64,
    sigma: f64,
}

impl LogDensity for Normal {
    fn log_pdf(&self, x: f64) -> f64 {
        let z = (x - self.mu) / self.sigma;
        -0.5 * z * z
    }

    fn dlog_pdf(&self, x: f64) -> f64 {
        -(x - self.mu) / (self.sigma * self.sigma)
    }

    fn center(&self) -> Option<f64> {
        Some(self.mu)
    }
}

const STD_NORMAL: Normal = Normal { mu: 0., sigma: 1. };

fn mean_var(draws: &[f64]) -> (f64, f64) {
    let n = draws.len() as f64;
    let mean = draws.iter().sum::<f64>() / n;
    let var = draws.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (n - 1.);
    (mean, var)
}

#[test]
fn moments_of_standard_normal() -> anyhow::Result<()> {
    let distr = ContDistr::builder()
        .log_pdf(|x| -x * x / 2.)
        .dlog_pdf(|x| -x)
        .build()?;
    let mut generator = TdrParams::new(distr)?.init()?;
    let mut rng = StdRng::seed_from_u64(42);
    let draws = generator.sample_n(&mut rng, 20_000)?;

    let (mean, var) = mean_var(&draws);
    assert!(mean.abs() < 0.05, "mean {mean}");
    assert!((var - 1.).abs() < 0.05, "variance {var}");
    assert!(generator.squeeze_area() <= generator.hat_area());
    Ok(())
}

#[test]
fn moments_of_shifted_normal() -> anyhow::Result<()> {
    let distr = Normal { mu: 1e4, sigma: 2. };
    let mut generator = TdrParams::new(distr)?.init()?;
    let mut rng = StdRng::seed_from_u64(5);
    let draws = generator.sample_n(&mut rng, 20_000)?;

    let (mean, var) = mean_var(&draws);
    assert!((mean - 1e4).abs() < 0.1, "mean {mean}");
    assert!((var / 4. - 1.).abs() < 0.05, "variance {var}");
    Ok(())
}

#[test]
fn narrow_normals() -> anyhow::Result<()> {
    // the hat peaks far above the density at the default points
    for (seed, sigma) in [0.1, 0.05, 0.02, 0.01].into_iter().enumerate() {
        let mut params = TdrParams::new(Normal { mu: 0., sigma })?;
        params.set_verify(true)?;
        let mut generator = params.init()?;
        assert!(generator.log_hat_area().is_finite());

        let mut rng = StdRng::seed_from_u64(seed as u64);
        let draws = generator.sample_n(&mut rng, 1000)?;
        assert!(draws.iter().all(|x| x.is_finite()));
        assert!(generator.log_hat_area().is_finite());
        assert_eq!(generator.stats().above_hat, 0);
        assert_eq!(generator.stats().below_squeeze, 0);

        let (mean, var) = mean_var(&draws);
        assert!(mean.abs() < 0.15 * sigma, "sigma {sigma}: mean {mean}");
        assert!((var / (sigma * sigma) - 1.).abs() < 0.2, "sigma {sigma}: variance {var}");
    }
    Ok(())
}

#[test]
fn checked_sampling_finds_no_violations() -> anyhow::Result<()> {
    let mut params = TdrParams::new(STD_NORMAL)?;
    params.set_verify(true)?;
    let mut generator = params.init()?;
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    generator.sample_n(&mut rng, 100_000)?;

    let stats = generator.stats();
    assert!(stats.checked >= 100_000);
    assert_eq!(stats.above_hat, 0);
    assert_eq!(stats.below_squeeze, 0);
    assert_eq!(stats.out_of_domain, 0);
    Ok(())
}

#[test]
fn same_seed_same_draws() -> anyhow::Result<()> {
    let params = TdrParams::new(STD_NORMAL)?;
    let mut first = params.clone().init()?;
    let mut second = params.init()?;

    let a = first.sample_n(&mut StdRng::seed_from_u64(7), 5000)?;
    let b = second.sample_n(&mut StdRng::seed_from_u64(7), 5000)?;
    assert_eq!(a, b);
    assert_eq!(first.construction_points(), second.construction_points());

    let c = first.sample_n(&mut StdRng::seed_from_u64(8), 10)?;
    assert_ne!(&a[..10], &c[..]);
    Ok(())
}

#[test]
fn refinement_is_monotone() -> anyhow::Result<()> {
    let settings = TdrSettings {
        max_sqh_ratio: 1.,
        max_intervals: 200,
        ..Default::default()
    };
    let mut generator = Tdrgw::new(STD_NORMAL, settings)?;
    let mut rng = StdRng::seed_from_u64(11);

    let mut hat = generator.hat_area();
    let mut squeeze = generator.squeeze_area();
    let mut ratio = generator.squeeze_hat_ratio();
    for _ in 0..5000 {
        generator.sample(&mut rng)?;
        assert!(generator.hat_area() <= hat * (1. + 1e-12));
        assert!(generator.squeeze_area() >= squeeze * (1. - 1e-12));
        assert!(generator.squeeze_hat_ratio() >= ratio * (1. - 1e-12));
        assert!(generator.squeeze_area() <= generator.hat_area());
        hat = generator.hat_area();
        squeeze = generator.squeeze_area();
        ratio = generator.squeeze_hat_ratio();
    }
    assert!(ratio > 0.99);
    assert!(generator.n_intervals() <= generator.max_intervals());

    let points = generator.construction_points();
    assert!(points.windows(2).all(|w| w[0] < w[1]));
    Ok(())
}

#[test]
fn refinement_stops_at_target_ratio() -> anyhow::Result<()> {
    let mut generator = TdrParams::new(STD_NORMAL)?.init()?;
    let mut rng = StdRng::seed_from_u64(2);
    generator.sample_n(&mut rng, 20_000)?;
    let n_intervals = generator.n_intervals();
    assert!(generator.squeeze_hat_ratio() >= 0.99);

    generator.sample_n(&mut rng, 20_000)?;
    assert_eq!(generator.n_intervals(), n_intervals);
    Ok(())
}

#[test]
fn capacity_limit_keeps_sampling() -> anyhow::Result<()> {
    let mut params = TdrParams::new(STD_NORMAL)?;
    params.set_max_intervals(3)?;
    let mut generator = params.init()?;
    // never below two intervals per starting point
    assert_eq!(generator.max_intervals(), 4);

    let mut rng = StdRng::seed_from_u64(9);
    let draws = generator.sample_n(&mut rng, 10_000)?;
    assert!(draws.iter().all(|x| x.is_finite()));
    assert!(generator.n_intervals() <= 4);
    assert!(generator.squeeze_hat_ratio() < 0.99);

    let (mean, var) = mean_var(&draws);
    assert!(mean.abs() < 0.05);
    assert!((var - 1.).abs() < 0.1);
    Ok(())
}

#[test]
fn inverse_hat_is_increasing() -> anyhow::Result<()> {
    let generator = TdrParams::new(STD_NORMAL)?.init()?;
    let xs = (1..1000)
        .map(|i| generator.eval_inverse_hat(i as f64 / 1000.))
        .collect::<Result<Vec<_>, _>>()?;
    assert!(xs.windows(2).all(|w| w[0] <= w[1]));
    assert!(xs.iter().all(|x| x.is_finite()));
    assert!(generator.eval_inverse_hat(-0.1).is_err());
    Ok(())
}

#[test]
fn parallel_workers_are_reproducible() -> anyhow::Result<()> {
    let params = TdrParams::new(STD_NORMAL)?;
    let a = sample_parallel(&params, 8, 1000, 123)?;
    let b = sample_parallel(&params, 8, 1000, 123)?;
    assert_eq!(a, b);

    let draws: Vec<f64> = a.into_iter().flatten().collect();
    let (mean, var) = mean_var(&draws);
    assert!(mean.abs() < 0.05);
    assert!((var - 1.).abs() < 0.08);
    Ok(())
}

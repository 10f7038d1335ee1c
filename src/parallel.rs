use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::debug;

use crate::{density::LogDensity, error::Result, settings::TdrParams};

/// Draw `draws_per_worker` variates on each of `n_workers` independent
/// generators, in parallel.
///
/// Every worker builds its own generator from `params` and uses its own
/// random stream, so the result depends only on `seed`, not on the thread
/// pool or scheduling.
pub fn sample_parallel<D>(
    params: &TdrParams<D>,
    n_workers: u64,
    draws_per_worker: usize,
    seed: u64,
) -> Result<Vec<Vec<f64>>>
where
    D: LogDensity + Clone + Send + Sync,
{
    (0..n_workers)
        .into_par_iter()
        .map(|worker| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.set_stream(worker);

            let mut generator = params.clone().init()?;
            let draws = generator.sample_n(&mut rng, draws_per_worker)?;
            debug!(
                worker,
                n_intervals = generator.n_intervals(),
                ratio = generator.squeeze_hat_ratio(),
                "worker finished"
            );
            Ok(draws)
        })
        .collect()
}

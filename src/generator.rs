use itertools::Itertools;
use rand::Rng;
use tracing::{debug, warn};

use crate::{
    density::{check_domain, LogDensity},
    error::{Result, TdrError},
    interval::{Interval, IntervalStatus},
    math::{fp_greater, fp_less},
    settings::TdrSettings,
    setup::{equiangular_points, Hat},
};

/// Whether `sample` checks every point against hat and squeeze.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleMode {
    Plain,
    Checked,
}

/// What happens when a refinement step fails with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailurePolicy {
    /// Keep the old hat and continue.
    Rollback,
    /// Disable the generator for good.
    Disable,
}

/// Counters collected while sampling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Candidates drawn from the hat.
    pub candidates: u64,
    /// Candidates accepted below the squeeze, without evaluating the density.
    pub squeeze_accepts: u64,
    pub rejections: u64,
    /// New construction points added while sampling.
    pub splits: u64,
    /// Boundary points moved inwards because the density vanished at a
    /// rejected point.
    pub truncations: u64,
    /// Refinement attempts that were skipped or rolled back.
    pub failed_splits: u64,
    /// Points checked by the verifying sampler.
    pub checked: u64,
    pub out_of_domain: u64,
    /// Points where the density exceeded the hat.
    pub above_hat: u64,
    /// Points where the density was below the squeeze.
    pub below_squeeze: u64,
}

/// Outcome of a successful call to `split`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Split {
    /// Point not used, list unchanged.
    Skipped,
    Inserted,
    /// A zero-density boundary point was moved to the new point.
    Truncated,
}

/// Above this `ln(t)` the inversion uses `ln(1 + t) = ln(t)`.
const LOG_T_LARGE: f64 = 30.;

/// A draw from the hat, before the acceptance test.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    x: f64,
    /// Interval containing `x`.
    iv: usize,
    log_hat: f64,
}

/// Adaptive rejection sampler for a log-concave density.
///
/// The generator refines its hat while sampling, so every sampling method
/// takes `&mut self`. Use one generator per thread.
#[derive(Debug, Clone)]
pub struct Tdrgw<D> {
    distr: D,
    settings: TdrSettings,
    hat: Hat,
    max_intervals: usize,
    /// Cleared once the squeeze/hat ratio reaches its target.
    refine: bool,
    mode: SampleMode,
    on_failure: FailurePolicy,
    disabled: bool,
    stats: SamplerStats,
}

impl<D: LogDensity> Tdrgw<D> {
    /// Build hat and squeeze for `distr`.
    ///
    /// Fails if the density is not log-concave or the hat cannot be made
    /// bounded within `settings.max_intervals` intervals.
    pub fn new(distr: D, settings: TdrSettings) -> Result<Self> {
        check_domain(distr.domain())?;
        settings.validate()?;

        let max_intervals = settings
            .max_intervals
            .max(2 * settings.n_starting_points());
        let xs = settings.starting_points(&distr);
        let hat = Hat::build(&distr, &xs, max_intervals, settings.guide_factor)?;

        let mode = if settings.verify {
            SampleMode::Checked
        } else {
            SampleMode::Plain
        };
        let on_failure = if settings.pedantic {
            FailurePolicy::Disable
        } else {
            FailurePolicy::Rollback
        };

        let mut generator = Tdrgw {
            distr,
            settings,
            hat,
            max_intervals,
            refine: true,
            mode,
            on_failure,
            disabled: false,
            stats: SamplerStats::default(),
        };
        generator.update_refine();
        Ok(generator)
    }

    /// Draw one variate.
    ///
    /// Only fails once the generator has been disabled, which can only
    /// happen in pedantic mode.
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<f64> {
        match self.mode {
            SampleMode::Plain => self.draw(rng, false),
            SampleMode::Checked => self.draw(rng, true),
        }
    }

    /// Draw one variate and check that it lies in the domain and that
    /// squeeze <= density <= hat holds there.
    ///
    /// Violations are logged and counted in [`SamplerStats`].
    pub fn sample_checked<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<f64> {
        self.draw(rng, true)
    }

    pub fn sample_n<R: Rng + ?Sized>(&mut self, rng: &mut R, n: usize) -> Result<Vec<f64>> {
        (0..n).map(|_| self.sample(rng)).collect()
    }

    fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R, checked: bool) -> Result<f64> {
        if self.disabled {
            return Err(TdrError::GenerationDisabled);
        }

        loop {
            let candidate = self.invert_hat(rng.random::<f64>());
            let log_v = rng.random::<f64>().ln() + candidate.log_hat;
            self.stats.candidates += 1;

            let x = candidate.x;
            if !x.is_finite() {
                continue;
            }

            if checked {
                self.check_candidate(&candidate);
            }

            if log_v <= self.hat.list.nodes[candidate.iv].log_squeeze(x) {
                self.stats.squeeze_accepts += 1;
                return Ok(x);
            }

            let log_fx = self.distr.log_pdf(x);
            if log_v <= log_fx {
                return Ok(x);
            }

            self.stats.rejections += 1;
            if self.refine && self.hat.list.n_intervals < self.max_intervals {
                self.refine_at(candidate.iv, x, log_fx)?;
            }
        }
    }

    /// Split after a rejection and apply the failure policy.
    fn refine_at(&mut self, iv: usize, x: f64, log_fx: f64) -> Result<()> {
        match self.split(iv, x, log_fx) {
            Ok(Split::Skipped) => self.stats.failed_splits += 1,
            Ok(changed) => {
                if changed == Split::Inserted {
                    self.stats.splits += 1;
                } else {
                    self.stats.truncations += 1;
                }
                self.hat.rebuild_guide(self.settings.guide_factor);
                self.update_refine();
            }
            Err(err) => {
                self.stats.failed_splits += 1;
                match self.on_failure {
                    FailurePolicy::Rollback => {
                        debug!(x, %err, "refinement failed, keeping old hat");
                    }
                    FailurePolicy::Disable => {
                        warn!(x, %err, "refinement failed, generator disabled");
                        self.disabled = true;
                        return Err(TdrError::GenerationDisabled);
                    }
                }
            }
        }
        Ok(())
    }

    fn update_refine(&mut self) {
        if self.hat.areas.squeeze >= self.settings.max_sqh_ratio * self.hat.areas.hat {
            self.refine = false;
        }
    }

    /// Add a construction point at `x` inside the interval starting at `idx`.
    ///
    /// On any failure the interval list is restored to its previous state.
    /// Totals and guide table are left to the caller.
    fn split(&mut self, idx: usize, x: f64, log_fx: f64) -> Result<Split> {
        let list = &self.hat.list;
        let Some(next_idx) = list.nodes[idx].next else {
            return Ok(Split::Skipped);
        };
        let left_bak = list.nodes[idx];
        let right_bak = list.nodes[next_idx];
        let n_nodes = list.nodes.len();
        let n_intervals = list.n_intervals;

        if !x.is_finite() || !(x > left_bak.x && x < right_bak.x) {
            return Ok(Split::Skipped);
        }

        let new_iv = Interval::new(&self.distr, x, log_fx)?;
        let log_scale = self.hat.log_scale;
        let list = &mut self.hat.list;

        let kind = if new_iv.has_zero_density() {
            Split::Truncated
        } else {
            Split::Inserted
        };
        let status = if kind == Split::Truncated {
            let moved = if left_bak.has_zero_density() {
                idx
            } else if right_bak.has_zero_density() {
                next_idx
            } else {
                return Err(TdrError::NotLogConcave(format!(
                    "density vanishes at x = {x} between points of positive density"
                )));
            };
            list.nodes[moved].move_point_to(&new_iv);
            let status = list.compute(idx, log_scale);
            if moved == next_idx && list.nodes[next_idx].next.is_some() {
                worst(status, list.compute(next_idx, log_scale))
            } else {
                status
            }
        } else {
            let new_idx = list.insert_after(idx, new_iv);
            let left = list.compute(idx, log_scale);
            let right = list.compute(new_idx, log_scale);
            worst(left, right)
        };

        match status {
            Ok(IntervalStatus::Success) => Ok(kind),
            other => {
                list.nodes.truncate(n_nodes);
                list.nodes[idx] = left_bak;
                list.nodes[next_idx] = right_bak;
                list.n_intervals = n_intervals;
                other.map(|_| Split::Skipped)
            }
        }
    }

    /// Invert the hat distribution at `u` in `[0, 1)`.
    fn invert_hat(&self, u: f64) -> Candidate {
        let list = &self.hat.list;
        let iv_idx = self.hat.guide.lookup(list, u, self.hat.areas.hat);
        let iv = &list.nodes[iv_idx];

        // area left to cover, in (-a_hat, 0]
        let mut v = u * self.hat.areas.hat - iv.a_cum;
        let pt = if -v <= iv.a_hat_right {
            &list.nodes[iv.next.unwrap_or(iv_idx)]
        } else {
            v += iv.a_hat;
            iv
        };

        // w = v / f(pt.x) is the width of a box of area v below the point.
        // Area and density may be far apart in scale, so go through logs.
        let x = if v == 0. {
            pt.x
        } else {
            let log_w = v.abs().ln() + self.hat.log_scale - pt.log_fx;
            let w = v.signum() * log_w.exp();
            if pt.dlog_fx == 0. {
                pt.x + w
            } else {
                let log_t = pt.dlog_fx.abs().ln() + log_w;
                let t = pt.dlog_fx * w;
                if log_t > LOG_T_LARGE && t > 0. {
                    pt.x + log_t / pt.dlog_fx
                } else if t.abs() > 1e-6 {
                    pt.x + t.ln_1p() / pt.dlog_fx
                } else if t.abs() > 1e-8 {
                    pt.x + w * (1. - t / 2. + t * t / 3.)
                } else {
                    pt.x + w * (1. - t / 2.)
                }
            }
        };

        Candidate {
            x,
            iv: iv_idx,
            log_hat: pt.log_tangent(x),
        }
    }

    fn check_candidate(&mut self, candidate: &Candidate) {
        let x = candidate.x;
        let (left, right) = self.distr.domain();
        self.stats.checked += 1;

        if x < left || x > right {
            warn!(x, left, right, "generated point out of domain");
            self.stats.out_of_domain += 1;
        }

        // relative to the hat, which is finite wherever x can be drawn
        let scale = candidate.log_hat;
        let fx = (self.distr.log_pdf(x) - scale).exp();
        let hx = 1.;
        let sqx = (self.hat.list.nodes[candidate.iv].log_squeeze(x) - scale).exp();

        if fp_greater(fx, hx) {
            warn!(x, fx, hx, "PDF > hat, density not log-concave");
            self.stats.above_hat += 1;
        }
        if fp_less(fx, sqx) {
            warn!(x, fx, sqx, "PDF < squeeze, density not log-concave");
            self.stats.below_squeeze += 1;
        }
    }

    /// Quantile of the hat distribution.
    pub fn eval_inverse_hat(&self, u: f64) -> Result<f64> {
        if !(0. ..1.).contains(&u) {
            return Err(TdrError::InvalidParameter(format!(
                "u must be in [0, 1), got {u}"
            )));
        }
        Ok(self.invert_hat(u).x)
    }

    /// Rebuild the hat, typically after the distribution was changed
    /// through [`Tdrgw::distribution_mut`].
    ///
    /// The percentiles of the current hat are tried as starting points
    /// first, then equiangular points. If both fail the generator is
    /// disabled and the last error returned.
    pub fn reinit(&mut self) -> Result<()> {
        let xs: Vec<f64> = self
            .settings
            .reinit_percentiles
            .iter()
            .map(|&p| self.invert_hat(p).x)
            .filter(|x| x.is_finite())
            .dedup()
            .collect();

        let hat = Hat::build(
            &self.distr,
            &xs,
            self.max_intervals,
            self.settings.guide_factor,
        )
        .or_else(|err| {
            debug!(%err, "reinit from hat percentiles failed, using equiangular points");
            let xs = equiangular_points(
                self.distr.domain(),
                self.settings.reinit_ncpoints,
                self.settings.center_for(&self.distr),
            );
            Hat::build(&self.distr, &xs, self.max_intervals, self.settings.guide_factor)
        });

        match hat {
            Ok(hat) => {
                self.hat = hat;
                self.disabled = false;
                self.refine = true;
                self.update_refine();
                Ok(())
            }
            Err(err) => {
                warn!(%err, "reinit failed, generator disabled");
                self.disabled = true;
                Err(err)
            }
        }
    }

    /// Total area below the hat.
    pub fn hat_area(&self) -> f64 {
        self.hat.areas.hat * self.hat.log_scale.exp()
    }

    /// Logarithm of [`Tdrgw::hat_area`], finite even if the area overflows.
    pub fn log_hat_area(&self) -> f64 {
        self.hat.areas.hat.ln() + self.hat.log_scale
    }

    pub fn squeeze_area(&self) -> f64 {
        self.hat.areas.squeeze * self.hat.log_scale.exp()
    }

    pub fn squeeze_hat_ratio(&self) -> f64 {
        self.hat.areas.squeeze / self.hat.areas.hat
    }

    pub fn n_intervals(&self) -> usize {
        self.hat.list.n_intervals
    }

    pub fn max_intervals(&self) -> usize {
        self.max_intervals
    }

    pub fn guide_size(&self) -> usize {
        self.hat.guide.len()
    }

    /// Construction points in increasing order. Zero-density boundary
    /// points are included, the right boundary is not.
    pub fn construction_points(&self) -> Vec<f64> {
        self.hat.list.intervals().map(|iv| iv.x).collect()
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn settings(&self) -> &TdrSettings {
        &self.settings
    }

    pub fn distribution(&self) -> &D {
        &self.distr
    }

    /// Mutable access to the distribution. Call [`Tdrgw::reinit`]
    /// afterwards if the density changed.
    pub fn distribution_mut(&mut self) -> &mut D {
        &mut self.distr
    }
}

/// Combine the results of two interval computations, keeping the worse one.
fn worst(a: Result<IntervalStatus>, b: Result<IntervalStatus>) -> Result<IntervalStatus> {
    match (a, b) {
        (Err(err), _) | (_, Err(err)) => Err(err),
        (Ok(IntervalStatus::Success), other) => other,
        (status, _) => status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::density::{
        test_densities::{Exponential, StdNormal},
        ContDistr,
    };
    use crate::settings::CPoints;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn normal() -> Tdrgw<StdNormal> {
        Tdrgw::new(StdNormal, TdrSettings::default()).unwrap()
    }

    #[test]
    fn default_setup_for_normal() {
        let generator = normal();
        assert_eq!(generator.n_intervals(), 3);
        assert_eq!(generator.guide_size(), 6);
        assert!(generator.squeeze_area() <= generator.hat_area());
        assert!(generator.hat_area() >= (2. * std::f64::consts::PI).sqrt());
        assert_relative_eq!(generator.log_hat_area(), generator.hat_area().ln());
    }

    #[test]
    fn split_inserts_point_and_lowers_hat() {
        let mut generator = normal();
        let before = generator.hat_area();
        let idx = generator.hat.list.head;
        let next = generator.hat.list.nodes[idx].next.unwrap();
        let x = generator.hat.list.nodes[next].x - 1.;
        assert_eq!(generator.split(idx, x, StdNormal.log_pdf(x)).unwrap(), Split::Inserted);
        generator.hat.rebuild_guide(2.);
        assert_eq!(generator.n_intervals(), 4);
        assert!(generator.hat_area() <= before);
    }

    #[test]
    fn split_outside_interval_is_ignored() {
        let mut generator = normal();
        let idx = generator.hat.list.head;
        let nodes_before = generator.hat.list.nodes.clone();
        assert_eq!(generator.split(idx, 5., -12.5).unwrap(), Split::Skipped);
        assert_eq!(generator.split(idx, f64::NAN, 0.).unwrap(), Split::Skipped);
        assert_eq!(generator.hat.list.nodes, nodes_before);
    }

    #[test]
    fn failed_split_restores_list() {
        let mut generator = normal();
        let nodes_before = generator.hat.list.nodes.clone();
        // interval [-0.577, 0.577]; claim the density vanishes in between
        let idx = generator.hat.list.nodes[generator.hat.list.head].next.unwrap();
        let err = generator.split(idx, 0., f64::NEG_INFINITY).unwrap_err();
        assert!(matches!(err, TdrError::NotLogConcave(_)));
        assert_eq!(generator.hat.list.nodes, nodes_before);

        // a density value above the tangent breaks concavity of the squeeze
        let err = generator.split(idx, 0.1, 5.).unwrap_err();
        assert!(matches!(err, TdrError::NotLogConcave(_)));
        assert_eq!(generator.hat.list.nodes, nodes_before);
        assert_eq!(generator.n_intervals(), 3);
    }

    #[test]
    fn inverse_hat_is_monotone() {
        let generator = normal();
        let xs: Vec<f64> = (1..100)
            .map(|i| generator.eval_inverse_hat(i as f64 / 100.).unwrap())
            .collect();
        assert!(xs.iter().all(|x| x.is_finite()));
        assert!(xs.windows(2).all(|w| w[0] <= w[1]));
        assert!(generator.eval_inverse_hat(1.).is_err());
        assert_relative_eq!(generator.eval_inverse_hat(0.5).unwrap(), 0., epsilon = 1e-12);
    }

    #[test]
    fn refinement_raises_ratio() {
        let mut generator = normal();
        let mut rng = StdRng::seed_from_u64(42);
        let ratio = generator.squeeze_hat_ratio();
        generator.sample_n(&mut rng, 1000).unwrap();
        assert!(generator.squeeze_hat_ratio() > ratio);
        assert!(generator.stats().splits > 0);
        assert_eq!(generator.stats().splits as usize + 3, generator.n_intervals());
    }

    #[test]
    fn truncation_is_counted_separately() {
        let distr = ContDistr::builder()
            .log_pdf(|x| if x >= 0. { -x } else { f64::NEG_INFINITY })
            .dlog_pdf(|_| -1.)
            .build()
            .unwrap();
        let settings = TdrSettings {
            cpoints: CPoints::Points(vec![1., 2.]),
            ..Default::default()
        };
        let mut generator = Tdrgw::new(distr, settings).unwrap();
        let head = generator.hat.list.head;
        assert!(generator.hat.list.nodes[head].has_zero_density());
        assert_eq!(generator.n_intervals(), 3);
        let area = generator.hat_area();

        generator.refine_at(head, -0.1, f64::NEG_INFINITY).unwrap();
        let stats = generator.stats();
        assert_eq!(stats.truncations, 1);
        assert_eq!(stats.splits, 0);
        assert_eq!(stats.failed_splits, 0);
        assert_eq!(generator.n_intervals(), 3);
        assert_eq!(generator.construction_points()[0], -0.1);
        assert!(generator.hat_area() <= area);
    }

    #[test]
    fn failed_refinement_keeps_old_hat() {
        let mut generator = normal();
        let idx = generator.hat.list.nodes[generator.hat.list.head].next.unwrap();
        let area = generator.hat_area();
        generator.refine_at(idx, 0., f64::NEG_INFINITY).unwrap();
        assert!(!generator.is_disabled());
        assert_eq!(generator.stats().failed_splits, 1);
        assert_eq!(generator.hat_area(), area);

        let mut rng = StdRng::seed_from_u64(1);
        assert!(generator.sample(&mut rng).is_ok());
    }

    #[test]
    fn pedantic_failure_is_sticky() {
        let settings = TdrSettings {
            pedantic: true,
            ..Default::default()
        };
        let mut generator = Tdrgw::new(StdNormal, settings).unwrap();
        let idx = generator.hat.list.nodes[generator.hat.list.head].next.unwrap();
        let err = generator.refine_at(idx, 0., f64::NEG_INFINITY).unwrap_err();
        assert_eq!(err, TdrError::GenerationDisabled);
        assert!(generator.is_disabled());

        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(generator.sample(&mut rng), Err(TdrError::GenerationDisabled));
        assert_eq!(generator.sample_n(&mut rng, 3), Err(TdrError::GenerationDisabled));
    }

    #[test]
    fn exponential_needs_no_refinement() {
        let mut generator = Tdrgw::new(Exponential, TdrSettings::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let draws = generator.sample_n(&mut rng, 10_000).unwrap();
        assert!(draws.iter().all(|&x| x >= 0.));
        assert_eq!(generator.stats().splits, 0);
        assert_eq!(generator.stats().rejections, 0);
    }

    #[test]
    fn reinit_after_parameter_change() {
        #[derive(Clone, Copy)]
        struct Shifted(f64);
        impl LogDensity for Shifted {
            fn log_pdf(&self, x: f64) -> f64 {
                -0.5 * (x - self.0) * (x - self.0)
            }
            fn dlog_pdf(&self, x: f64) -> f64 {
                self.0 - x
            }
        }

        let mut generator = Tdrgw::new(Shifted(0.), TdrSettings::default()).unwrap();
        generator.distribution_mut().0 = 50.;
        generator.reinit().unwrap();
        assert!(!generator.is_disabled());

        let mut rng = StdRng::seed_from_u64(7);
        let draws = generator.sample_n(&mut rng, 5000).unwrap();
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        assert!((mean - 50.).abs() < 0.1);
    }
}

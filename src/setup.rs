//! Construction of the initial hat.

use std::f64::consts::FRAC_PI_2;

use tracing::{debug, warn};

use crate::{
    density::LogDensity,
    error::{Result, TdrError},
    guide::{Areas, GuideTable},
    interval::{Interval, IntervalList, IntervalStatus},
    math::arcmean,
};

/// Interval list together with everything derived from it.
#[derive(Debug, Clone)]
pub(crate) struct Hat {
    pub(crate) list: IntervalList,
    pub(crate) guide: GuideTable,
    pub(crate) areas: Areas,
    /// Log of the unit the linear areas are measured in.
    pub(crate) log_scale: f64,
}

impl Hat {
    /// Build hat and squeeze from the interior starting points `xs`.
    pub(crate) fn build<D: LogDensity + ?Sized>(
        distr: &D,
        xs: &[f64],
        max_intervals: usize,
        guide_factor: f64,
    ) -> Result<Hat> {
        let mut list = starting_cpoints(distr, xs)?;
        let log_scale = max_log_fx(&list);
        starting_intervals(distr, &mut list, max_intervals, log_scale)?;
        list.compact();

        let mut hat = Hat {
            list,
            guide: GuideTable::default(),
            areas: Areas::default(),
            log_scale,
        };
        hat.rebuild_guide(guide_factor);
        if !(hat.areas.hat > 0. && hat.areas.hat.is_finite()) {
            return Err(TdrError::DegenerateHat);
        }

        debug!(
            n_intervals = hat.list.n_intervals,
            hat = hat.areas.hat,
            squeeze = hat.areas.squeeze,
            log_scale = hat.log_scale,
            "built hat"
        );

        Ok(hat)
    }

    /// Rescale the areas and rebuild guide table and totals after the list
    /// changed.
    pub(crate) fn rebuild_guide(&mut self, guide_factor: f64) {
        self.rescale();
        let (guide, areas) = GuideTable::build(&mut self.list, guide_factor);
        self.guide = guide;
        self.areas = areas;
    }

    /// Use the largest log-area of all intervals as scale, so the largest
    /// linear area is exactly 1.
    ///
    /// The hat can peak far above the density at the construction points,
    /// and refinement can shrink it by as many orders of magnitude.
    fn rescale(&mut self) {
        let Some(log_scale) = self
            .list
            .intervals()
            .map(|iv| iv.log_a_hat)
            .filter(|v| v.is_finite())
            .reduce(f64::max)
        else {
            return;
        };

        self.log_scale = log_scale;
        for idx in 0..self.list.nodes.len() {
            if self.list.nodes[idx].next.is_some() {
                self.list.nodes[idx].rescale(log_scale);
            }
        }
    }
}

/// Place `n` points by the equiangular rule.
///
/// The domain is mapped to an interval of angles by `atan(x - center)`,
/// which is divided into `n + 1` equal steps.
pub(crate) fn equiangular_points((left, right): (f64, f64), n: usize, center: f64) -> Vec<f64> {
    let left_angle = if left == f64::NEG_INFINITY {
        -FRAC_PI_2
    } else {
        (left - center).atan()
    };
    let right_angle = if right == f64::INFINITY {
        FRAC_PI_2
    } else {
        (right - center).atan()
    };
    let step = (right_angle - left_angle) / (n + 1) as f64;

    (1..=n)
        .map(|i| (left_angle + i as f64 * step).tan() + center)
        .collect()
}

/// Largest finite log-density among the construction points. Only a first
/// guess for the scale, [`Hat::rebuild_guide`] replaces it.
fn max_log_fx(list: &IntervalList) -> f64 {
    list.indices()
        .map(|idx| list.nodes[idx].log_fx)
        .filter(|v| v.is_finite())
        .reduce(f64::max)
        .unwrap_or(0.)
}

/// Create the list of construction points: the left boundary, the points
/// in `xs` that lie inside the domain and the right boundary.
///
/// Runs of zero density are collapsed into a single point, so at most one
/// point of zero density remains at each end.
pub(crate) fn starting_cpoints<D: LogDensity + ?Sized>(
    distr: &D,
    xs: &[f64],
) -> Result<IntervalList> {
    let (left, right) = distr.domain();

    let first = Interval::at(distr, left)?;
    let mut last_x = left;
    let mut last_log_fx = first.log_fx;
    let mut list = IntervalList::new(first);
    let mut current = list.head;
    let mut is_increasing = true;

    let n = xs.len();
    for (i, x) in xs.iter().copied().chain(std::iter::once(right)).enumerate() {
        let is_boundary = i == n;
        if !is_boundary && !(x > last_x && x < right) {
            warn!(x, "starting point out of domain or not increasing, skipped");
            continue;
        }

        let iv = Interval::at(distr, x)?;
        let log_fx = iv.log_fx;

        if !is_increasing && log_fx > last_log_fx + f64::EPSILON {
            return Err(TdrError::NotLogConcave(format!(
                "density not unimodal: increases again at x = {x}"
            )));
        }

        if iv.has_zero_density() && last_log_fx == f64::NEG_INFINITY {
            if !is_increasing {
                break;
            }
            // still zero from the left
            if !is_boundary {
                list.nodes[current].move_point_to(&iv);
                last_x = x;
                continue;
            }
        }

        current = list.insert_after(current, iv);

        if is_increasing && log_fx < last_log_fx {
            is_increasing = false;
        }
        last_x = x;
        last_log_fx = log_fx;
    }

    list.nodes[current].make_sentinel();
    Ok(list)
}

/// Compute all interval parameters. Unbounded intervals are bisected,
/// degenerate ones merged with their right neighbour.
pub(crate) fn starting_intervals<D: LogDensity + ?Sized>(
    distr: &D,
    list: &mut IntervalList,
    max_intervals: usize,
    log_scale: f64,
) -> Result<()> {
    let mut idx = list.head;

    while let Some(next_idx) = list.nodes[idx].next {
        match list.compute(idx, log_scale)? {
            IntervalStatus::Success => {
                idx = next_idx;
                continue;
            }
            IntervalStatus::Silent => {
                let after = list.nodes[next_idx].next;
                list.nodes[idx].next = after;
                list.n_intervals -= 1;
                if after.is_none() {
                    list.nodes[idx].make_sentinel();
                }
                continue;
            }
            IntervalStatus::Unbounded => (),
        }

        if list.n_intervals >= max_intervals {
            return Err(TdrError::CapacityExceeded { max_intervals });
        }

        let x = arcmean(list.nodes[idx].x, list.nodes[next_idx].x);
        let iv = Interval::at(distr, x)?;

        if !iv.has_zero_density() {
            list.insert_after(idx, iv);
        } else if list.nodes[idx].has_zero_density() {
            // cut off left tail
            list.nodes[idx].move_point_to(&iv);
        } else if list.nodes[next_idx].has_zero_density() {
            // cut off right tail
            list.nodes[next_idx].move_point_to(&iv);
        } else {
            return Err(TdrError::NotLogConcave(format!(
                "density vanishes at x = {x} between points of positive density"
            )));
        }
    }

    Ok(())
}

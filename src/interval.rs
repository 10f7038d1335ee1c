//! Intervals of the piecewise exponential hat and squeeze.
//!
//! The hat is built from tangents of the log-density at construction points.
//! Each interval is anchored at its left construction point and borrows the
//! tangent of the next construction point for the part right of `ip`, the
//! point where both tangents cross. The squeeze is the secant between the two
//! construction points.
//!
//! All integrals are computed and stored in log space. The linear areas used
//! for table lookup are exponentiated after subtracting a common `log_scale`,
//! so densities with values far outside the range of `f64` still give usable
//! areas.

use crate::{
    density::LogDensity,
    error::{Result, TdrError},
    math::{fp_approx, fp_greater, fp_less, fp_same, logaddexp},
};

/// Tangent slopes above this are treated as vertical.
const VERTICAL_SLOPE: f64 = 1e140;

/// Below this `|t|` the area integral switches to a Taylor expansion.
const TAYLOR_THRESHOLD: f64 = 1e-6;

/// Outcome of [`Interval::compute`] that is not a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IntervalStatus {
    Success,
    /// Construction points coincide or both have zero density. The caller
    /// drops the right point.
    Silent,
    /// The area below the hat is infinite. The caller bisects.
    Unbounded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Interval {
    /// Left construction point.
    pub(crate) x: f64,
    pub(crate) log_fx: f64,
    /// `+inf` where the density is zero.
    pub(crate) dlog_fx: f64,
    /// Intersection of this tangent with the tangent of the next point.
    pub(crate) ip: f64,
    /// Slope of the squeeze in log space, `None` if there is no squeeze.
    pub(crate) sq: Option<f64>,
    pub(crate) log_a_hat: f64,
    pub(crate) log_a_hat_right: f64,
    pub(crate) log_a_squeeze: f64,
    /// Linear areas, relative to `exp(log_scale)`.
    pub(crate) a_hat: f64,
    /// Part of `a_hat` right of `ip`.
    pub(crate) a_hat_right: f64,
    pub(crate) a_squeeze: f64,
    pub(crate) a_cum: f64,
    pub(crate) next: Option<usize>,
}

impl Interval {
    /// Create a construction point at `x`, where the log-density is `log_fx`.
    ///
    /// The derivative is only evaluated where the density is positive.
    pub(crate) fn new<D: LogDensity + ?Sized>(distr: &D, x: f64, log_fx: f64) -> Result<Self> {
        if log_fx.is_nan() || log_fx == f64::INFINITY {
            return Err(TdrError::DataOverflow { x, value: log_fx });
        }

        let dlog_fx = if log_fx == f64::NEG_INFINITY {
            f64::INFINITY
        } else {
            let dlog_fx = distr.dlog_pdf(x);
            if dlog_fx.is_nan() || dlog_fx == f64::NEG_INFINITY {
                return Err(TdrError::DataOverflow { x, value: dlog_fx });
            }
            dlog_fx
        };

        Ok(Interval {
            x,
            log_fx,
            dlog_fx,
            ip: x,
            sq: None,
            log_a_hat: f64::NEG_INFINITY,
            log_a_hat_right: f64::NEG_INFINITY,
            log_a_squeeze: f64::NEG_INFINITY,
            a_hat: 0.,
            a_hat_right: 0.,
            a_squeeze: 0.,
            a_cum: 0.,
            next: None,
        })
    }

    /// Evaluate the log-density at `x` and create a construction point there.
    pub(crate) fn at<D: LogDensity + ?Sized>(distr: &D, x: f64) -> Result<Self> {
        let log_fx = if x.is_finite() {
            distr.log_pdf(x)
        } else {
            f64::NEG_INFINITY
        };
        Self::new(distr, x, log_fx)
    }

    /// Turn this record into the terminating right boundary of the list.
    pub(crate) fn make_sentinel(&mut self) {
        self.ip = self.x;
        self.sq = None;
        self.log_a_hat = f64::NEG_INFINITY;
        self.log_a_hat_right = f64::NEG_INFINITY;
        self.log_a_squeeze = f64::NEG_INFINITY;
        self.a_hat = 0.;
        self.a_hat_right = 0.;
        self.a_squeeze = 0.;
        self.a_cum = f64::INFINITY;
        self.next = None;
    }

    /// Copy the construction point of `other`, keeping the link of `self`.
    pub(crate) fn move_point_to(&mut self, other: &Interval) {
        self.x = other.x;
        self.log_fx = other.log_fx;
        self.dlog_fx = other.dlog_fx;
    }

    #[inline]
    pub(crate) fn has_zero_density(&self) -> bool {
        self.log_fx == f64::NEG_INFINITY
    }

    /// Log of the tangent at this construction point, evaluated at `x`.
    #[inline]
    pub(crate) fn log_tangent(&self, x: f64) -> f64 {
        self.log_fx + self.dlog_fx * (x - self.x)
    }

    /// Log of the squeeze of this interval at `x`, `-inf` without squeeze.
    #[inline]
    pub(crate) fn log_squeeze(&self, x: f64) -> f64 {
        match self.sq {
            Some(sq) => self.log_fx + sq * (x - self.x),
            None => f64::NEG_INFINITY,
        }
    }

    /// Compute intersection point, squeeze and areas for the interval
    /// between `self` and `next`.
    pub(crate) fn compute(&mut self, next: &Interval, log_scale: f64) -> Result<IntervalStatus> {
        if fp_approx(self.x, next.x) || (self.has_zero_density() && next.has_zero_density()) {
            return Ok(IntervalStatus::Silent);
        }

        self.ip = tangent_intersection(self, next)?;

        let log_a_squeeze = if self.log_fx.is_finite() && next.log_fx.is_finite() {
            let sq = (next.log_fx - self.log_fx) / (next.x - self.x);

            let too_steep = sq > self.dlog_fx && !fp_approx(sq, self.dlog_fx);
            let too_flat = sq < next.dlog_fx && !fp_approx(sq, next.dlog_fx);
            if (too_steep || too_flat) && next.dlog_fx < f64::INFINITY {
                return Err(TdrError::NotLogConcave(format!(
                    "squeeze slope {sq} outside tangent slopes [{}, {}] on [{}, {}]",
                    next.dlog_fx, self.dlog_fx, self.x, next.x
                )));
            }
            self.sq = Some(sq);

            // integrate away from the larger value
            if self.log_fx >= next.log_fx {
                interval_logarea(self.x, self.log_fx, sq, next.x)
            } else {
                interval_logarea(next.x, next.log_fx, sq, self.x)
            }
        } else {
            self.sq = None;
            f64::NEG_INFINITY
        };

        let log_hat_left = interval_logarea(self.x, self.log_fx, self.dlog_fx, self.ip);
        let log_hat_right = interval_logarea(next.x, next.log_fx, next.dlog_fx, self.ip);

        if !(log_hat_left < f64::INFINITY && log_hat_right < f64::INFINITY) {
            return Ok(IntervalStatus::Unbounded);
        }

        let log_hat = logaddexp(log_hat_left, log_hat_right);
        if fp_greater((log_a_squeeze - log_hat).exp(), 1.) {
            return Err(TdrError::NotLogConcave(format!(
                "area below squeeze exceeds area below hat on [{}, {}], log areas {} > {}",
                self.x, next.x, log_a_squeeze, log_hat
            )));
        }

        self.log_a_hat = log_hat;
        self.log_a_hat_right = log_hat_right.min(log_hat);
        self.log_a_squeeze = log_a_squeeze.min(log_hat);
        self.rescale(log_scale);

        Ok(IntervalStatus::Success)
    }

    /// Recompute the linear areas relative to `exp(log_scale)`.
    pub(crate) fn rescale(&mut self, log_scale: f64) {
        self.a_hat = (self.log_a_hat - log_scale).exp();
        self.a_hat_right = (self.log_a_hat_right - log_scale).exp().min(self.a_hat);
        self.a_squeeze = (self.log_a_squeeze - log_scale).exp().min(self.a_hat);
    }
}

/// Point where the tangents at the two construction points intersect.
///
/// Round-off can push the closed form outside the interval or make slopes
/// that should be steep come out tiny; both cases fall back to a boundary or
/// the midpoint. A genuine increase of the slope is an error.
pub(crate) fn tangent_intersection(iv: &Interval, next: &Interval) -> Result<f64> {
    if iv.dlog_fx > VERTICAL_SLOPE {
        return Ok(iv.x);
    }
    if next.dlog_fx < -VERTICAL_SLOPE || next.dlog_fx.is_infinite() {
        return Ok(next.x);
    }

    if fp_less(iv.dlog_fx, next.dlog_fx) {
        if iv.dlog_fx.abs() < f64::EPSILON * next.dlog_fx.abs() {
            return Ok(iv.x);
        }
        if next.dlog_fx.abs() < f64::EPSILON * iv.dlog_fx.abs() {
            return Ok(next.x);
        }
        return Err(TdrError::NotLogConcave(format!(
            "tangent slope increases from {} at x = {} to {} at x = {}",
            iv.dlog_fx, iv.x, next.dlog_fx, next.x
        )));
    }

    let mid = 0.5 * (iv.x + next.x);
    if fp_approx(iv.dlog_fx, next.dlog_fx) {
        return Ok(mid);
    }

    let ip = (next.log_fx - iv.log_fx - next.dlog_fx * next.x + iv.dlog_fx * iv.x)
        / (iv.dlog_fx - next.dlog_fx);

    if ip.is_nan() || fp_less(ip, iv.x) || fp_greater(ip, next.x) {
        Ok(mid)
    } else {
        Ok(ip.clamp(iv.x, next.x))
    }
}

/// Log of `|∫ exp(log_fx0 + slope * (t - x0)) dt|` between `x0` and `bound`.
///
/// Returns `+inf` when the integral diverges.
pub(crate) fn interval_logarea(x0: f64, log_fx0: f64, slope: f64, bound: f64) -> f64 {
    if fp_same(bound, x0) || log_fx0 == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }

    if slope == 0. {
        if bound.is_infinite() {
            return f64::INFINITY;
        }
        return log_fx0 + (bound - x0).abs().ln();
    }

    if bound.is_infinite() {
        let converges = (bound > 0. && slope < 0.) || (bound < 0. && slope > 0.);
        return if converges {
            log_fx0 - slope.abs().ln()
        } else {
            f64::INFINITY
        };
    }

    if !slope.is_finite() {
        return f64::INFINITY;
    }

    let log_xdiff = (bound - x0).abs().ln();
    let t = slope * (bound - x0);
    if t.abs() > TAYLOR_THRESHOLD {
        if t > f64::MAX.ln() / 10. {
            log_fx0 + log_xdiff + t - t.ln()
        } else {
            log_fx0 + log_xdiff + t.exp_m1().abs().ln() - t.abs().ln()
        }
    } else {
        log_fx0 + log_xdiff + (t / 2. + t * t / 6.).ln_1p()
    }
}

/// Arena of intervals linked in increasing order of `x`.
///
/// The last record reachable from `head` is the sentinel holding the right
/// boundary. Records unlinked during setup stay in `nodes` until
/// [`IntervalList::compact`] runs.
#[derive(Debug, Clone)]
pub(crate) struct IntervalList {
    pub(crate) nodes: Vec<Interval>,
    pub(crate) head: usize,
    /// Number of intervals, not counting the sentinel.
    pub(crate) n_intervals: usize,
}

impl IntervalList {
    pub(crate) fn new(first: Interval) -> Self {
        IntervalList {
            nodes: vec![first],
            head: 0,
            n_intervals: 0,
        }
    }

    /// Indices in list order, sentinel included.
    pub(crate) fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(self.head), move |&idx| self.nodes[idx].next)
    }

    /// Intervals in list order, sentinel excluded.
    pub(crate) fn intervals(&self) -> impl Iterator<Item = &Interval> + '_ {
        self.indices()
            .map(move |idx| &self.nodes[idx])
            .filter(|iv| iv.next.is_some())
    }

    /// Link `iv` directly behind `idx` and return its index.
    pub(crate) fn insert_after(&mut self, idx: usize, mut iv: Interval) -> usize {
        let new_idx = self.nodes.len();
        iv.next = self.nodes[idx].next;
        self.nodes.push(iv);
        self.nodes[idx].next = Some(new_idx);
        self.n_intervals += 1;
        new_idx
    }

    /// Recompute the parameters of the interval starting at `idx`.
    pub(crate) fn compute(&mut self, idx: usize, log_scale: f64) -> Result<IntervalStatus> {
        let Some(next_idx) = self.nodes[idx].next else {
            return Ok(IntervalStatus::Silent);
        };
        let next = self.nodes[next_idx];
        self.nodes[idx].compute(&next, log_scale)
    }

    /// Rewrite the arena in list order, dropping unlinked records.
    pub(crate) fn compact(&mut self) {
        let mut nodes: Vec<Interval> = self.indices().map(|idx| self.nodes[idx]).collect();
        let n = nodes.len();
        for (i, iv) in nodes.iter_mut().enumerate() {
            iv.next = if i + 1 < n { Some(i + 1) } else { None };
        }
        self.nodes = nodes;
        self.head = 0;
        self.n_intervals = n - 1;
    }
}

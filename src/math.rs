use std::{
    cmp::Ordering,
    f64::consts::{FRAC_PI_2, LN_2},
};

/// Relative tolerance for "strictly less/greater" comparisons.
pub(crate) const FP_EPSILON: f64 = 100. * f64::EPSILON;

/// Relative tolerance for "approximately equal".
pub(crate) const FP_SQRT_EPSILON: f64 = 1.490_116_119_384_765_6e-8;

/// Compare two floats with a tolerance relative to the smaller magnitude.
///
/// Two infinities of the same sign compare equal, so do two numbers that are
/// both below `2 * f64::MIN_POSITIVE` in magnitude.
pub(crate) fn fp_cmp(a: f64, b: f64, eps: f64) -> Ordering {
    let fa = a.abs();
    let fb = b.abs();
    if fa <= 2. * f64::MIN_POSITIVE && fb <= 2. * f64::MIN_POSITIVE {
        return Ordering::Equal;
    }
    let mut delta = eps * fa.min(fb);
    if delta.is_infinite() {
        delta = eps * f64::MAX;
    }
    let diff = a - b;
    if diff > delta {
        Ordering::Greater
    } else if diff < -delta {
        Ordering::Less
    } else {
        Ordering::Equal
    }
}

#[inline]
pub(crate) fn fp_less(a: f64, b: f64) -> bool {
    fp_cmp(a, b, FP_EPSILON) == Ordering::Less
}

#[inline]
pub(crate) fn fp_greater(a: f64, b: f64) -> bool {
    fp_cmp(a, b, FP_EPSILON) == Ordering::Greater
}

#[inline]
pub(crate) fn fp_approx(a: f64, b: f64) -> bool {
    fp_cmp(a, b, FP_SQRT_EPSILON) == Ordering::Equal
}

#[inline]
pub(crate) fn fp_same(a: f64, b: f64) -> bool {
    fp_cmp(a, b, f64::EPSILON) == Ordering::Equal
}

/// Mean of two points taken in arctan space.
///
/// This stays finite when one end is infinite. Far from the origin the
/// harmonic mean is used instead, since `atan` is flat there.
pub(crate) fn arcmean(x0: f64, x1: f64) -> f64 {
    let (x0, x1) = if x0 > x1 { (x1, x0) } else { (x0, x1) };

    if x1 < -1e3 || x0 > 1e3 {
        return 2. / (1. / x0 + 1. / x1);
    }

    let a0 = if x0 == f64::NEG_INFINITY {
        -FRAC_PI_2
    } else {
        x0.atan()
    };
    let a1 = if x1 == f64::INFINITY {
        FRAC_PI_2
    } else {
        x1.atan()
    };

    if (a0 - a1).abs() < 1e-6 {
        0.5 * x0 + 0.5 * x1
    } else {
        ((a0 + a1) / 2.).tan()
    }
}

#[inline]
pub(crate) fn logaddexp(a: f64, b: f64) -> f64 {
    if a == b {
        return a + LN_2;
    }
    let diff = a - b;
    if diff > 0. {
        a + (-diff).exp().ln_1p()
    } else if diff < 0. {
        b + diff.exp().ln_1p()
    } else {
        // diff is NAN
        diff
    }
}

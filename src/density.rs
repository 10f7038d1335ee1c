use std::{fmt, sync::Arc};

use crate::error::{Result, TdrError};

/// A univariate log-concave density, known up to a normalizing constant.
///
/// The generator only evaluates the log-density and its derivative
/// pointwise, so both must be cheap and free of side effects.
pub trait LogDensity {
    /// Logarithm of the (unnormalized) density at `x`.
    ///
    /// Return `f64::NEG_INFINITY` where the density is zero.
    fn log_pdf(&self, x: f64) -> f64;

    /// Derivative of [`LogDensity::log_pdf`] at `x`.
    ///
    /// May be `f64::INFINITY` at a point of zero density. It must not be
    /// `-inf` or NaN where the density is positive.
    fn dlog_pdf(&self, x: f64) -> f64;

    /// Support of the density. Either side may be infinite.
    fn domain(&self) -> (f64, f64) {
        (f64::NEG_INFINITY, f64::INFINITY)
    }

    /// A point near the bulk of the mass, used to place starting points.
    fn center(&self) -> Option<f64> {
        None
    }
}

impl<T: LogDensity + ?Sized> LogDensity for &T {
    fn log_pdf(&self, x: f64) -> f64 {
        (**self).log_pdf(x)
    }

    fn dlog_pdf(&self, x: f64) -> f64 {
        (**self).dlog_pdf(x)
    }

    fn domain(&self) -> (f64, f64) {
        (**self).domain()
    }

    fn center(&self) -> Option<f64> {
        (**self).center()
    }
}

type DensityFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// A continuous distribution given by closures.
#[derive(Clone)]
pub struct ContDistr {
    log_pdf: DensityFn,
    dlog_pdf: DensityFn,
    domain: (f64, f64),
    center: Option<f64>,
}

impl fmt::Debug for ContDistr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContDistr")
            .field("domain", &self.domain)
            .field("center", &self.center)
            .finish_non_exhaustive()
    }
}

impl ContDistr {
    pub fn builder() -> ContDistrBuilder {
        ContDistrBuilder::default()
    }
}

impl LogDensity for ContDistr {
    fn log_pdf(&self, x: f64) -> f64 {
        (self.log_pdf)(x)
    }

    fn dlog_pdf(&self, x: f64) -> f64 {
        (self.dlog_pdf)(x)
    }

    fn domain(&self) -> (f64, f64) {
        self.domain
    }

    fn center(&self) -> Option<f64> {
        self.center
    }
}

#[derive(Default)]
pub struct ContDistrBuilder {
    log_pdf: Option<DensityFn>,
    dlog_pdf: Option<DensityFn>,
    domain: Option<(f64, f64)>,
    center: Option<f64>,
}

impl ContDistrBuilder {
    pub fn log_pdf<F>(mut self, f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        self.log_pdf = Some(Arc::new(f));
        self
    }

    pub fn dlog_pdf<F>(mut self, f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        self.dlog_pdf = Some(Arc::new(f));
        self
    }

    pub fn domain(mut self, left: f64, right: f64) -> Self {
        self.domain = Some((left, right));
        self
    }

    pub fn center(mut self, center: f64) -> Self {
        self.center = Some(center);
        self
    }

    /// Finish the distribution. Both oracles are required.
    pub fn build(self) -> Result<ContDistr> {
        let log_pdf = self.log_pdf.ok_or(TdrError::MissingFunction("logPDF"))?;
        let dlog_pdf = self.dlog_pdf.ok_or(TdrError::MissingFunction("dlogPDF"))?;
        let domain = self.domain.unwrap_or((f64::NEG_INFINITY, f64::INFINITY));
        check_domain(domain)?;
        if let Some(center) = self.center {
            if !center.is_finite() {
                return Err(TdrError::InvalidParameter(format!(
                    "center must be finite, got {center}"
                )));
            }
        }
        Ok(ContDistr {
            log_pdf,
            dlog_pdf,
            domain,
            center: self.center,
        })
    }
}

pub(crate) fn check_domain((left, right): (f64, f64)) -> Result<()> {
    if left.is_nan() || right.is_nan() || left >= right {
        return Err(TdrError::InvalidParameter(format!(
            "domain [{left}, {right}] is empty"
        )));
    }
    Ok(())
}

use itertools::Itertools;

use crate::{
    density::{check_domain, LogDensity},
    error::{Result, TdrError},
    generator::Tdrgw,
    setup::equiangular_points,
};

/// How the starting construction points are chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum CPoints {
    /// This many points placed by the equiangular rule.
    Count(usize),
    /// Explicit, strictly increasing points.
    Points(Vec<f64>),
}

/// Settings for the adaptive rejection sampler
#[derive(Debug, Clone, PartialEq)]
pub struct TdrSettings {
    /// Starting construction points. The domain boundaries are always added.
    pub cpoints: CPoints,
    /// Center of the equiangular rule. Defaults to the center of the
    /// distribution, or 0, moved into the domain.
    pub center: Option<f64>,
    /// Hard limit for the number of intervals. Raised to twice the number of
    /// starting points if that is larger.
    pub max_intervals: usize,
    /// Size of the guide table relative to the number of intervals.
    /// `0` disables the table.
    pub guide_factor: f64,
    /// Stop adding construction points once area(squeeze) / area(hat)
    /// reaches this value.
    pub max_sqh_ratio: f64,
    /// Check every generated point against hat and squeeze.
    pub verify: bool,
    /// Disable the generator when a refinement step shows that the density
    /// is not log-concave, instead of continuing with the old hat.
    pub pedantic: bool,
    /// Percentiles of the old hat used as starting points by `reinit`.
    pub reinit_percentiles: Vec<f64>,
    /// Number of equiangular starting points if `reinit` has to fall back.
    pub reinit_ncpoints: usize,
}

impl Default for TdrSettings {
    fn default() -> Self {
        Self {
            cpoints: CPoints::Count(2),
            center: None,
            max_intervals: 100,
            guide_factor: 2.,
            max_sqh_ratio: 0.99,
            verify: false,
            pedantic: false,
            reinit_percentiles: vec![0.1, 0.5, 0.9],
            reinit_ncpoints: 10,
        }
    }
}

impl TdrSettings {
    pub fn validate(&self) -> Result<()> {
        match &self.cpoints {
            CPoints::Count(n) => check_count(*n, "number of starting points")?,
            CPoints::Points(points) => check_increasing(points, "starting points")?,
        }
        if let Some(center) = self.center {
            if !center.is_finite() {
                return invalid(format!("center must be finite, got {center}"));
            }
        }
        check_count(self.max_intervals, "max_intervals")?;
        if !(self.guide_factor >= 0. && self.guide_factor.is_finite()) {
            return invalid(format!(
                "guide factor must be finite and >= 0, got {}",
                self.guide_factor
            ));
        }
        if !(0. ..=1.).contains(&self.max_sqh_ratio) {
            return invalid(format!(
                "ratio squeeze/hat must be in [0, 1], got {}",
                self.max_sqh_ratio
            ));
        }
        check_increasing(&self.reinit_percentiles, "reinit percentiles")?;
        if let Some(p) = self
            .reinit_percentiles
            .iter()
            .find(|&&p| !(p > 0. && p < 1.))
        {
            return invalid(format!("percentiles must be in (0, 1), got {p}"));
        }
        check_count(self.reinit_ncpoints, "reinit_ncpoints")?;
        Ok(())
    }

    /// Center of the equiangular rule for `distr`.
    pub(crate) fn center_for<D: LogDensity + ?Sized>(&self, distr: &D) -> f64 {
        let (left, right) = distr.domain();
        self.center
            .or_else(|| distr.center())
            .unwrap_or(0.)
            .clamp(left, right)
    }

    /// Interior starting points for `distr`, domain boundaries excluded.
    pub(crate) fn starting_points<D: LogDensity + ?Sized>(&self, distr: &D) -> Vec<f64> {
        match &self.cpoints {
            CPoints::Count(n) => {
                equiangular_points(distr.domain(), *n, self.center_for(distr))
            }
            CPoints::Points(points) => points.clone(),
        }
    }

    pub(crate) fn n_starting_points(&self) -> usize {
        match &self.cpoints {
            CPoints::Count(n) => *n,
            CPoints::Points(points) => points.len(),
        }
    }
}

fn invalid<T>(msg: String) -> Result<T> {
    Err(TdrError::InvalidParameter(msg))
}

fn check_count(n: usize, what: &str) -> Result<()> {
    if n == 0 {
        return invalid(format!("{what} must be at least 1"));
    }
    Ok(())
}

fn check_increasing(points: &[f64], what: &str) -> Result<()> {
    if let Some(x) = points.iter().find(|x| !x.is_finite()) {
        return invalid(format!("{what} must be finite, got {x}"));
    }
    if let Some((a, b)) = points.iter().tuple_windows().find(|(a, b)| a >= b) {
        return invalid(format!(
            "{what} must be strictly increasing, got {a} before {b}"
        ));
    }
    Ok(())
}

/// A distribution together with validated sampler settings.
///
/// Every setter checks its argument and leaves the parameters unchanged
/// on error.
#[derive(Debug, Clone)]
pub struct TdrParams<D> {
    distr: D,
    settings: TdrSettings,
}

impl<D: LogDensity> TdrParams<D> {
    pub fn new(distr: D) -> Result<Self> {
        Self::with_settings(distr, TdrSettings::default())
    }

    pub fn with_settings(distr: D, settings: TdrSettings) -> Result<Self> {
        check_domain(distr.domain())?;
        settings.validate()?;
        Ok(TdrParams { distr, settings })
    }

    pub fn settings(&self) -> &TdrSettings {
        &self.settings
    }

    pub fn distribution(&self) -> &D {
        &self.distr
    }

    fn update(&mut self, apply: impl FnOnce(&mut TdrSettings)) -> Result<&mut Self> {
        let mut settings = self.settings.clone();
        apply(&mut settings);
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }

    /// Use these starting construction points.
    pub fn set_cpoints(&mut self, points: &[f64]) -> Result<&mut Self> {
        let points = points.to_vec();
        self.update(|s| s.cpoints = CPoints::Points(points))
    }

    /// Use `n` starting construction points placed by the equiangular rule.
    pub fn set_cpoint_count(&mut self, n: usize) -> Result<&mut Self> {
        self.update(|s| s.cpoints = CPoints::Count(n))
    }

    pub fn set_center(&mut self, center: f64) -> Result<&mut Self> {
        self.update(|s| s.center = Some(center))
    }

    pub fn set_max_intervals(&mut self, n: usize) -> Result<&mut Self> {
        self.update(|s| s.max_intervals = n)
    }

    pub fn set_guidefactor(&mut self, factor: f64) -> Result<&mut Self> {
        self.update(|s| s.guide_factor = factor)
    }

    pub fn set_max_sqhratio(&mut self, ratio: f64) -> Result<&mut Self> {
        self.update(|s| s.max_sqh_ratio = ratio)
    }

    pub fn set_verify(&mut self, verify: bool) -> Result<&mut Self> {
        self.update(|s| s.verify = verify)
    }

    pub fn set_pedantic(&mut self, pedantic: bool) -> Result<&mut Self> {
        self.update(|s| s.pedantic = pedantic)
    }

    pub fn set_reinit_percentiles(&mut self, percentiles: &[f64]) -> Result<&mut Self> {
        let percentiles = percentiles.to_vec();
        self.update(|s| s.reinit_percentiles = percentiles)
    }

    pub fn set_reinit_ncpoints(&mut self, n: usize) -> Result<&mut Self> {
        self.update(|s| s.reinit_ncpoints = n)
    }

    /// Build the generator.
    pub fn init(self) -> Result<Tdrgw<D>> {
        Tdrgw::new(self.distr, self.settings)
    }
}

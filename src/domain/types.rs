//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV by report-layer callers
//! - reloaded later for plotting or comparisons

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};

/// Response payload of a [`Dataset`].
///
/// Most fits carry a single response series. Some callers fit one parameter
/// vector against several response series observed at the same x points
/// (e.g. simultaneous dose-response curves); those use `Multi`, and the model
/// callback receives the response index alongside the x vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    /// One response value and one weight per observation.
    Single { y: Vec<f64>, weight: Vec<f64> },
    /// Several response series over the same observation points, each with
    /// its own weight series. All inner vectors have the dataset length N.
    Multi {
        y: Vec<Vec<f64>>,
        weight: Vec<Vec<f64>>,
    },
}

impl Series {
    /// Number of response series (1 for `Single`).
    pub fn n_responses(&self) -> usize {
        match self {
            Series::Single { .. } => 1,
            Series::Multi { y, .. } => y.len(),
        }
    }
}

/// Per-observation data for one fit: independent-variable rows, response
/// values, and weights.
///
/// Weights are per-observation *standard deviations*: residuals are divided
/// by them, so a smaller weight means a more trusted observation. If any
/// supplied weight is exactly zero, weighting is disabled for the whole
/// dataset (every weight reset to 1) rather than letting a single
/// observation carry infinite influence.
///
/// The dataset is immutable once constructed; the solver never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// One row per independent variable, each of length N.
    x_rows: Vec<Vec<f64>>,
    series: Series,
    /// False when weighting was disabled (all-unit weights).
    weighted: bool,
}

impl Dataset {
    /// Single-response dataset with unit weights.
    pub fn single(x_rows: Vec<Vec<f64>>, y: Vec<f64>) -> Result<Self> {
        let n = y.len();
        Self::build(x_rows, Series::Single { y, weight: vec![1.0; n] }, false)
    }

    /// Single-response dataset with explicit weights (standard deviations).
    pub fn weighted(x_rows: Vec<Vec<f64>>, y: Vec<f64>, weight: Vec<f64>) -> Result<Self> {
        if weight.len() != y.len() {
            return Err(FitError::LengthMismatch {
                context: "weight array",
                expected: y.len(),
                got: weight.len(),
            });
        }
        let disable = weight.iter().any(|&w| w == 0.0);
        let n = y.len();
        let (weight, weighted) = if disable { (vec![1.0; n], false) } else { (weight, true) };
        Self::build(x_rows, Series::Single { y, weight }, weighted)
    }

    /// Multi-response dataset with unit weights.
    pub fn multi(x_rows: Vec<Vec<f64>>, y: Vec<Vec<f64>>) -> Result<Self> {
        let n = y.first().map_or(0, Vec::len);
        let weight = vec![vec![1.0; n]; y.len()];
        Self::build(x_rows, Series::Multi { y, weight }, false)
    }

    /// Multi-response dataset with explicit weights (one series per response).
    pub fn weighted_multi(
        x_rows: Vec<Vec<f64>>,
        y: Vec<Vec<f64>>,
        weight: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if weight.len() != y.len() {
            return Err(FitError::LengthMismatch {
                context: "weight series count",
                expected: y.len(),
                got: weight.len(),
            });
        }
        let n = y.first().map_or(0, Vec::len);
        let disable = weight.iter().flatten().any(|&w| w == 0.0);
        let (weight, weighted) = if disable {
            (vec![vec![1.0; n]; y.len()], false)
        } else {
            (weight, true)
        };
        Self::build(x_rows, Series::Multi { y, weight }, weighted)
    }

    fn build(x_rows: Vec<Vec<f64>>, series: Series, weighted: bool) -> Result<Self> {
        let n = match &series {
            Series::Single { y, .. } => y.len(),
            Series::Multi { y, .. } => {
                if y.is_empty() {
                    return Err(FitError::EmptyDataset);
                }
                y[0].len()
            }
        };
        if n == 0 || x_rows.is_empty() {
            return Err(FitError::EmptyDataset);
        }
        for row in &x_rows {
            if row.len() != n {
                return Err(FitError::LengthMismatch {
                    context: "x row",
                    expected: n,
                    got: row.len(),
                });
            }
        }
        if let Series::Multi { y, weight } = &series {
            for s in y.iter().chain(weight.iter()) {
                if s.len() != n {
                    return Err(FitError::LengthMismatch {
                        context: "response series",
                        expected: n,
                        got: s.len(),
                    });
                }
            }
        }
        Ok(Self {
            x_rows,
            series,
            weighted,
        })
    }

    /// Number of observation points per response series.
    pub fn n(&self) -> usize {
        self.x_rows[0].len()
    }

    /// Number of response series.
    pub fn n_responses(&self) -> usize {
        self.series.n_responses()
    }

    /// Total observation count across all response series (used for degrees
    /// of freedom).
    pub fn n_total(&self) -> usize {
        self.n() * self.n_responses()
    }

    /// Number of independent-variable rows.
    pub fn n_x_rows(&self) -> usize {
        self.x_rows.len()
    }

    /// True when the supplied weights are in effect (no zero weight forced a
    /// reset to unit weights).
    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    pub fn x_rows(&self) -> &[Vec<f64>] {
        &self.x_rows
    }

    pub fn series(&self) -> &Series {
        &self.series
    }

    /// The independent-variable vector for observation `k` (one value per
    /// x row).
    pub fn x_point(&self, k: usize) -> Vec<f64> {
        self.x_rows.iter().map(|row| row[k]).collect()
    }

    /// Mean absolute response value across every series, used by the
    /// relative-residual convergence policy.
    pub fn mean_abs_y(&self) -> f64 {
        let (sum, count) = match &self.series {
            Series::Single { y, .. } => (y.iter().map(|v| v.abs()).sum::<f64>(), y.len()),
            Series::Multi { y, .. } => (
                y.iter().flatten().map(|v| v.abs()).sum::<f64>(),
                y.iter().map(Vec::len).sum(),
            ),
        };
        sum / count as f64
    }

    /// Reorder observations by ascending first-row value.
    ///
    /// Distribution-fit callers rely on this ordering for their
    /// cumulative-probability linearization tricks.
    pub fn sorted_by_first_row(mut self) -> Self {
        let n = self.n();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            self.x_rows[0][a]
                .partial_cmp(&self.x_rows[0][b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let permute = |v: &[f64]| -> Vec<f64> { order.iter().map(|&i| v[i]).collect() };
        for row in &mut self.x_rows {
            *row = permute(row);
        }
        match &mut self.series {
            Series::Single { y, weight } => {
                *y = permute(y);
                *weight = permute(weight);
            }
            Series::Multi { y, weight } => {
                for s in y.iter_mut().chain(weight.iter_mut()) {
                    *s = permute(s);
                }
            }
        }
        self
    }
}

/// Soft numerical-failure flags.
///
/// A fit that hits one of these still returns best-effort values; callers
/// must inspect the flags before trusting the derived statistics. Affected
/// statistics are reported as NaN, never silently substituted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitFlags {
    /// The numerically-differentiated Hessian inverted successfully.
    pub hessian_invert_ok: bool,
    /// Every covariance-diagonal entry was non-negative.
    pub positive_variance: bool,
    /// Per parameter: the best estimate was exactly zero and the optimizer's
    /// step size was substituted during numerical differentiation.
    pub zero_substituted: Vec<bool>,
    /// At least one evaluation during the fit incurred a constraint penalty.
    pub penalty_applied: bool,
}

impl FitFlags {
    /// Flags for an analytic (linear) fit, where none of the numerical
    /// failure modes apply.
    pub fn analytic(p: usize) -> Self {
        Self {
            hessian_invert_ok: true,
            positive_variance: true,
            zero_substituted: vec![false; p],
            penalty_applied: false,
        }
    }
}

/// Goodness-of-fit summary shared by linear and nonlinear fits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitQuality {
    /// Weighted sum of squared residuals at the best estimate.
    pub sum_of_squares: f64,
    /// Chi-square statistic; only meaningful (Some) for weighted fits.
    pub chi_square: Option<f64>,
    /// Chi-square divided by degrees of freedom.
    pub reduced_chi_square: Option<f64>,
    /// (Multiple) sample correlation coefficient.
    pub r: f64,
    /// Coefficient of determination.
    pub r_squared: f64,
    /// F-ratio for multivariate fits; None for single-parameter fits or a
    /// perfect fit (zero residual variance).
    pub f_ratio: Option<f64>,
}

/// Outcome of one fit call. Created once per fit, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Best parameter estimate.
    pub params: Vec<f64>,
    /// Per-parameter standard errors (NaN where undefined).
    pub standard_errors: Vec<f64>,
    /// Gradient-based pseudo standard deviations, reported for nonlinear
    /// fits as a cross-check on `standard_errors`. None for linear fits.
    pub pseudo_sd: Option<Vec<f64>>,
    /// P x P covariance matrix (entries NaN where undefined).
    pub covariance: Vec<Vec<f64>>,
    /// P x P correlation matrix.
    pub correlation: Vec<Vec<f64>>,
    pub quality: FitQuality,
    /// False when the optimizer exhausted its iteration budget. Always true
    /// for linear fits.
    pub converged: bool,
    pub iterations: usize,
    pub restarts: usize,
    pub flags: FitFlags,
    /// Model values at the best estimate, one inner vector per response
    /// series.
    pub predicted: Vec<Vec<f64>>,
    /// `y - predicted`, one inner vector per response series.
    pub residuals: Vec<Vec<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_rejects_mismatched_rows() {
        let err = Dataset::single(vec![vec![1.0, 2.0], vec![3.0]], vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, FitError::LengthMismatch { .. }));
    }

    #[test]
    fn dataset_rejects_empty() {
        let err = Dataset::single(vec![], vec![]).unwrap_err();
        assert!(matches!(err, FitError::EmptyDataset));
    }

    #[test]
    fn zero_weight_disables_weighting() {
        let ds = Dataset::weighted(
            vec![vec![1.0, 2.0, 3.0]],
            vec![1.0, 2.0, 3.0],
            vec![1.0, 0.0, 2.0],
        )
        .unwrap();
        assert!(!ds.is_weighted());
        match ds.series() {
            Series::Single { weight, .. } => assert!(weight.iter().all(|&w| w == 1.0)),
            Series::Multi { .. } => panic!("expected single series"),
        }
    }

    #[test]
    fn sorted_by_first_row_keeps_rows_aligned() {
        let ds = Dataset::weighted(
            vec![vec![3.0, 1.0, 2.0], vec![30.0, 10.0, 20.0]],
            vec![300.0, 100.0, 200.0],
            vec![3.0, 1.0, 2.0],
        )
        .unwrap()
        .sorted_by_first_row();

        assert_eq!(ds.x_rows()[0], vec![1.0, 2.0, 3.0]);
        assert_eq!(ds.x_rows()[1], vec![10.0, 20.0, 30.0]);
        match ds.series() {
            Series::Single { y, weight } => {
                assert_eq!(y, &vec![100.0, 200.0, 300.0]);
                assert_eq!(weight, &vec![1.0, 2.0, 3.0]);
            }
            Series::Multi { .. } => panic!("expected single series"),
        }
    }

    #[test]
    fn multi_series_counts_total_observations() {
        let ds = Dataset::multi(
            vec![vec![1.0, 2.0, 3.0]],
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        )
        .unwrap();
        assert_eq!(ds.n(), 3);
        assert_eq!(ds.n_responses(), 2);
        assert_eq!(ds.n_total(), 6);
    }

    #[test]
    fn x_point_gathers_one_value_per_row() {
        let ds = Dataset::single(
            vec![vec![1.0, 2.0], vec![10.0, 20.0]],
            vec![0.0, 0.0],
        )
        .unwrap();
        assert_eq!(ds.x_point(1), vec![2.0, 20.0]);
    }
}

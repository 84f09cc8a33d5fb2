//! ARIMA(p,d,q) estimation and multi-step forecasting.
//!
//! Parameters are estimated by conditional sum of squares (CSS). The series
//! is differenced `d` times (and demeaned when `d == 0`), then the AR and MA
//! coefficients are searched with a Nelder–Mead simplex over an
//! unconstrained space. Each raw vector is mapped through partial
//! autocorrelations, which keeps every candidate AR polynomial stationary and
//! every MA polynomial invertible.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::domain::error::FitError;

/// Iteration budget per free parameter.
/// Largest AR or MA lag accepted from configuration.
pub const MAX_LAG: usize = 30;
/// Largest differencing order accepted from configuration.
pub const MAX_DIFFERENCE: usize = 2;

const ITERATIONS_PER_PARAM: usize = 1_000;
const F_TOLERANCE: f64 = 1e-10;
/// Relative spread below which the simplex is considered flat.
const FLAT_TOLERANCE: f64 = 1e-13;
const X_TOLERANCE: f64 = 1e-6;
const INITIAL_STEP: f64 = 0.5;

/// Model order `(p, d, q)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    /// Parses `"p,d,q"` (whitespace and surrounding parentheses allowed).
    /// `p` and `q` are capped at [`MAX_LAG`], `d` at [`MAX_DIFFERENCE`].
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim().trim_start_matches('(').trim_end_matches(')');
        let parts: Vec<usize> = trimmed
            .split(',')
            .map(|s| s.trim().parse::<usize>())
            .collect::<Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            [p, d, q] if *p <= MAX_LAG && *q <= MAX_LAG && *d <= MAX_DIFFERENCE => {
                Some(Self::new(*p, *d, *q))
            }
            _ => None,
        }
    }

    /// Free ARMA coefficients estimated by the optimizer.
    pub const fn free_params(self) -> usize {
        self.p + self.q
    }

    /// Smallest series length this order can be fitted on.
    ///
    /// `d` values are consumed by differencing, `p` by the conditional start,
    /// and the remaining residuals must outnumber the coefficients.
    pub const fn min_observations(self) -> usize {
        self.d + self.p + self.free_params() + 2
    }
}

impl Display for ArimaOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)
    }
}

/// A fitted model. Lives for one train/forecast cycle.
#[derive(Debug, Clone)]
pub struct FittedArima {
    order: ArimaOrder,
    ar: Vec<f64>,
    ma: Vec<f64>,
    mean: f64,
    sigma2: f64,
    iterations: usize,
    centered: Vec<f64>,
    residuals: Vec<f64>,
    last_levels: Vec<f64>,
}

impl FittedArima {
    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn ar(&self) -> &[f64] {
        &self.ar
    }

    pub fn ma(&self) -> &[f64] {
        &self.ma
    }

    /// Residual variance of the conditional fit.
    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Forecasts `steps` values beyond the end of the fitted series in one pass.
    ///
    /// Future innovations are zero; forecasts on the differenced scale are fed
    /// back as AR inputs and then integrated back to price levels.
    pub fn forecast(&self, steps: usize) -> Vec<f64> {
        let mut z = self.centered.clone();
        let mut e = self.residuals.clone();
        let mut levels = self.last_levels.clone();
        let mut out = Vec::with_capacity(steps);

        for _ in 0..steps {
            let t = z.len();
            let mut pred = 0.0;
            for (i, phi) in self.ar.iter().enumerate() {
                if t > i {
                    pred += phi * z[t - 1 - i];
                }
            }
            for (j, theta) in self.ma.iter().enumerate() {
                if t > j {
                    pred += theta * e[t - 1 - j];
                }
            }
            z.push(pred);
            e.push(0.0);

            let mut value = pred + self.mean;
            for level in levels.iter_mut().rev() {
                value += *level;
                *level = value;
            }
            out.push(value);
        }

        out
    }
}

/// Fits `order` to `series` (oldest first).
pub fn fit(series: &[f64], order: ArimaOrder) -> Result<FittedArima, FitError> {
    if series.iter().any(|v| !v.is_finite()) {
        return Err(FitError::DegenerateSeries {
            reason: "series contains non-finite values".into(),
        });
    }

    let needed = order.min_observations();
    if series.len() < needed {
        return Err(FitError::InsufficientData {
            needed,
            have: series.len(),
        });
    }

    let (lo, hi) = series
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    if hi - lo <= f64::EPSILON * hi.abs().max(1.0) {
        return Err(FitError::DegenerateSeries {
            reason: "series is constant".into(),
        });
    }

    let (differenced, last_levels) = difference(series, order.d);
    let mean = if order.d == 0 {
        differenced.iter().sum::<f64>() / differenced.len() as f64
    } else {
        0.0
    };
    let centered: Vec<f64> = differenced.iter().map(|v| v - mean).collect();

    let objective = |raw: &[f64]| {
        let (ar, ma) = unpack(raw, order.p);
        conditional_sum_of_squares(&centered, &ar, &ma)
    };

    let (raw, iterations) = if order.free_params() == 0 {
        (Vec::new(), 0)
    } else {
        nelder_mead(
            objective,
            &vec![0.0; order.free_params()],
            ITERATIONS_PER_PARAM * order.free_params(),
        )?
    };

    let (ar, ma) = unpack(&raw, order.p);
    let residuals = residuals(&centered, &ar, &ma);
    let count = centered.len() - order.p;
    let sigma2 = residuals[order.p..].iter().map(|e| e * e).sum::<f64>() / count as f64;
    if !sigma2.is_finite() {
        return Err(FitError::NoConvergence { iterations });
    }

    Ok(FittedArima {
        order,
        ar,
        ma,
        mean,
        sigma2,
        iterations,
        centered,
        residuals,
        last_levels,
    })
}

/// Differences `series` `d` times, returning the result and the last value of
/// every intermediate level (needed to integrate forecasts back).
fn difference(series: &[f64], d: usize) -> (Vec<f64>, Vec<f64>) {
    let mut current = series.to_vec();
    let mut last_levels = Vec::with_capacity(d);
    for _ in 0..d {
        last_levels.push(current[current.len() - 1]);
        current = current.windows(2).map(|w| w[1] - w[0]).collect();
    }
    (current, last_levels)
}

fn unpack(raw: &[f64], p: usize) -> (Vec<f64>, Vec<f64>) {
    let ar = constrain(&raw[..p]);
    let ma = constrain(&raw[p..]).into_iter().map(|c| -c).collect();
    (ar, ma)
}

/// Maps unconstrained values to coefficients of a stationary AR polynomial.
///
/// Each value becomes a partial autocorrelation in (-1, 1); the
/// Levinson–Durbin recursion turns those into AR coefficients.
fn constrain(raw: &[f64]) -> Vec<f64> {
    let pacf: Vec<f64> = raw.iter().map(|x| x / (1.0 + x * x).sqrt()).collect();
    let mut phi = vec![0.0; pacf.len()];
    for k in 0..pacf.len() {
        let prev = phi[..k].to_vec();
        phi[k] = pacf[k];
        for j in 0..k {
            phi[j] = prev[j] - pacf[k] * prev[k - 1 - j];
        }
    }
    phi
}

fn residuals(z: &[f64], ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let p = ar.len();
    let mut e = vec![0.0; z.len()];
    for t in p..z.len() {
        let mut pred = 0.0;
        for (i, phi) in ar.iter().enumerate() {
            pred += phi * z[t - 1 - i];
        }
        for (j, theta) in ma.iter().enumerate() {
            if t > j {
                pred += theta * e[t - 1 - j];
            }
        }
        e[t] = z[t] - pred;
    }
    e
}

fn conditional_sum_of_squares(z: &[f64], ar: &[f64], ma: &[f64]) -> f64 {
    let e = residuals(z, ar, ma);
    let ss: f64 = e[ar.len()..].iter().map(|v| v * v).sum();
    if ss.is_finite() { ss } else { f64::INFINITY }
}

/// Minimizes `f` from `start`. Returns the best point and iterations used.
fn nelder_mead<F>(f: F, start: &[f64], max_iterations: usize) -> Result<(Vec<f64>, usize), FitError>
where
    F: Fn(&[f64]) -> f64,
{
    let n = start.len();
    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
    simplex.push((start.to_vec(), f(start)));
    for i in 0..n {
        let mut vertex = start.to_vec();
        vertex[i] += INITIAL_STEP;
        let value = f(&vertex);
        simplex.push((vertex, value));
    }

    for iteration in 0..max_iterations {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

        let best = simplex[0].1;
        let worst = simplex[n].1;
        let spread = simplex[1..]
            .iter()
            .flat_map(|(v, _)| v.iter().zip(&simplex[0].0).map(|(a, b)| (a - b).abs()))
            .fold(0.0_f64, f64::max);
        let f_spread = (worst - best).abs();
        let converged = f_spread <= F_TOLERANCE * (1.0 + best.abs()) && spread <= X_TOLERANCE;
        let flat = f_spread <= FLAT_TOLERANCE * (1.0 + best.abs());
        if best.is_finite() && (converged || flat) {
            return Ok((simplex.swap_remove(0).0, iteration));
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|(v, _)| v[j]).sum::<f64>() / n as f64)
            .collect();
        let along = |t: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&simplex[n].0)
                .map(|(c, w)| c + t * (w - c))
                .collect()
        };

        let reflected = along(-1.0);
        let f_reflected = f(&reflected);

        if f_reflected < simplex[0].1 {
            let expanded = along(-2.0);
            let f_expanded = f(&expanded);
            simplex[n] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
            continue;
        }

        if f_reflected < simplex[n - 1].1 {
            simplex[n] = (reflected, f_reflected);
            continue;
        }

        let (contracted, f_contracted) = if f_reflected < simplex[n].1 {
            let c = along(-0.5);
            let fc = f(&c);
            (c, fc)
        } else {
            let c = along(0.5);
            let fc = f(&c);
            (c, fc)
        };

        if f_contracted < simplex[n].1.min(f_reflected) {
            simplex[n] = (contracted, f_contracted);
            continue;
        }

        // shrink towards the best vertex
        let best_vertex = simplex[0].0.clone();
        for (vertex, value) in simplex.iter_mut().skip(1) {
            for (x, b) in vertex.iter_mut().zip(&best_vertex) {
                *x = b + 0.5 * (*x - b);
            }
            *value = f(vertex);
        }
    }

    Err(FitError::NoConvergence {
        iterations: max_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Deterministic pseudo-random shocks in [-0.5, 0.5).
    fn shocks(seed: u64, count: usize) -> Vec<f64> {
        let mut state = seed;
        (0..count)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                ((state >> 11) as f64 / (1u64 << 53) as f64) - 0.5
            })
            .collect()
    }

    fn random_walk(start: f64, count: usize, seed: u64) -> Vec<f64> {
        let mut price = start;
        shocks(seed, count)
            .into_iter()
            .map(|s| {
                price += 2.0 * s;
                price
            })
            .collect()
    }

    #[test]
    fn parses_orders() {
        assert_eq!(ArimaOrder::parse("2,1,2"), Some(ArimaOrder::new(2, 1, 2)));
        assert_eq!(ArimaOrder::parse(" (1, 1, 1) "), Some(ArimaOrder::new(1, 1, 1)));
        assert_eq!(ArimaOrder::parse("1,1"), None);
        assert_eq!(ArimaOrder::parse("a,1,1"), None);
        assert_eq!(ArimaOrder::parse("30,2,30"), Some(ArimaOrder::new(30, 2, 30)));
        assert_eq!(ArimaOrder::parse("31,1,1"), None);
        assert_eq!(ArimaOrder::parse("1,3,1"), None);
        assert_eq!(ArimaOrder::parse(&format!("1,1,{}", usize::MAX)), None);
    }

    #[test]
    fn displays_as_model_identifier() {
        assert_eq!(ArimaOrder::new(2, 1, 2).to_string(), "ARIMA(2,1,2)");
    }

    #[test]
    fn constrained_coefficients_are_stationary() {
        // a single pacf r gives phi = r with |r| < 1
        let phi = constrain(&[1000.0]);
        assert!(phi[0] < 1.0 && phi[0] > 0.99);
        let phi = constrain(&[0.0, 0.0]);
        assert_eq!(phi, vec![0.0, 0.0]);
    }

    #[test]
    fn nelder_mead_finds_quadratic_minimum() {
        let (x, _) = nelder_mead(
            |v| (v[0] - 1.5).powi(2) + (v[1] + 0.25).powi(2) + 3.0,
            &[0.0, 0.0],
            2_000,
        )
        .unwrap();
        assert_relative_eq!(x[0], 1.5, epsilon = 1e-4);
        assert_relative_eq!(x[1], -0.25, epsilon = 1e-4);
    }

    #[test]
    fn nelder_mead_reports_exhausted_budget() {
        let err = nelder_mead(|v| (v[0] - 3.0).powi(2), &[0.0], 2).unwrap_err();
        assert_eq!(err, FitError::NoConvergence { iterations: 2 });
    }

    #[test]
    fn recovers_ar1_coefficient() {
        let noise = shocks(7, 400);
        let mut series = Vec::with_capacity(noise.len());
        let mut prev = 0.0;
        for s in noise {
            prev = 0.6 * prev + s;
            series.push(50.0 + prev);
        }
        let model = fit(&series, ArimaOrder::new(1, 0, 0)).unwrap();
        assert!((model.ar()[0] - 0.6).abs() < 0.1, "ar = {:?}", model.ar());
        assert_eq!(model.order(), ArimaOrder::new(1, 0, 0));
        assert!(model.ma().is_empty());
    }

    #[test]
    fn random_walk_order_forecasts_last_value() {
        let series = random_walk(100.0, 30, 3);
        let model = fit(&series, ArimaOrder::new(0, 1, 0)).unwrap();
        let fc = model.forecast(3);
        for v in fc {
            assert_relative_eq!(v, series[series.len() - 1], epsilon = 1e-12);
        }
    }

    #[test]
    fn white_noise_order_forecasts_mean() {
        let series: Vec<f64> = shocks(11, 50).into_iter().map(|s| 20.0 + s).collect();
        let mean = series.iter().sum::<f64>() / series.len() as f64;
        let model = fit(&series, ArimaOrder::new(0, 0, 0)).unwrap();
        assert_relative_eq!(model.forecast(1)[0], mean, epsilon = 1e-12);
    }

    #[test]
    fn default_orders_fit_a_noisy_walk() {
        let series = random_walk(150.0, 40, 42);
        for order in [ArimaOrder::new(2, 1, 2), ArimaOrder::new(1, 1, 1)] {
            let model = fit(&series, order).unwrap();
            let fc = model.forecast(6);
            assert_eq!(fc.len(), 6);
            assert!(fc.iter().all(|v| v.is_finite() && *v > 0.0));
            assert!(model.sigma2() > 0.0);
        }
    }

    #[test]
    fn rejects_short_series() {
        let series = random_walk(100.0, 40, 5);
        let err = fit(&series, ArimaOrder::new(30, 1, 5)).unwrap_err();
        assert_eq!(err, FitError::InsufficientData { needed: 68, have: 40 });
    }

    #[test]
    fn rejects_constant_series() {
        let series = vec![42.0; 40];
        let err = fit(&series, ArimaOrder::new(1, 1, 1)).unwrap_err();
        assert!(matches!(err, FitError::DegenerateSeries { .. }));
    }

    #[test]
    fn rejects_non_finite_values() {
        let mut series = random_walk(100.0, 40, 5);
        series[10] = f64::NAN;
        let err = fit(&series, ArimaOrder::new(1, 1, 1)).unwrap_err();
        assert!(matches!(err, FitError::DegenerateSeries { .. }));
    }

    #[test]
    fn second_difference_integrates_back() {
        // without drift, ARIMA(0,2,0) extends the last slope (82 - 65 = 17)
        let series: Vec<f64> = (0..10).map(|t| (t * t) as f64 + 1.0).collect();
        let model = fit(&series, ArimaOrder::new(0, 2, 0)).unwrap();
        let fc = model.forecast(2);
        assert_relative_eq!(fc[0], 82.0 + 17.0, epsilon = 1e-9);
        assert_relative_eq!(fc[1], 82.0 + 34.0, epsilon = 1e-9);
    }
}

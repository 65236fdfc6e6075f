use eyre::{bail, Result};
use ndarray::Array1;

use super::{Optimiser, Problem, SearchOptions};
use crate::routines::budget::Counting;
use crate::routines::output::{OptResult, Termination};

/// Exhaustive search over a regular grid spanning the bounds
///
/// Each dimension is sampled with the number of points whose spacing is closest to its tolerance.
/// The initial point is ignored. With `maxfev > 0`, the search stops once the scored function has
/// been evaluated `maxfev` times, and returns the best point found so far.
#[derive(Debug, Clone)]
pub struct BruteForce {
    options: SearchOptions,
}

impl BruteForce {
    pub fn new(options: SearchOptions) -> Self {
        BruteForce { options }
    }
}

impl Optimiser for BruteForce {
    fn minimize(&self, cf: &mut dyn Counting, problem: &Problem) -> Result<OptResult> {
        let axes = grid_axes(problem.lower(), problem.upper(), problem.xtol())?;
        // May not fit in a usize with many dimensions
        let npoints: f64 = axes.iter().map(|axis| axis.len() as f64).product();
        tracing::debug!("Brute force search over {:e} grid points", npoints);

        let maxfev = self.options.maxfev;
        let mut fbest = f64::INFINITY;
        let mut xbest: Option<Array1<f64>> = None;
        let mut termination = Termination::Success;

        // Odometer over the Cartesian product, last dimension fastest
        let mut index = vec![0usize; axes.len()];
        'grid: loop {
            if maxfev > 0 && cf.calls() >= maxfev {
                termination = Termination::MaxEvaluations;
                break;
            }

            let x: Array1<f64> = index.iter().zip(&axes).map(|(&i, axis)| axis[i]).collect();
            let f = cf.score(&x)?;
            if f < fbest {
                fbest = f;
                xbest = Some(x);
            }

            for d in (0..axes.len()).rev() {
                index[d] += 1;
                if index[d] < axes[d].len() {
                    continue 'grid;
                }
                index[d] = 0;
            }
            break;
        }

        let nfev = cf.calls();
        tracing::info!(
            "Brute force finished after {} evaluations: {}",
            nfev,
            termination
        );
        // Nothing better than +inf was found, e.g. a budget of one already spent
        let xbest = xbest.unwrap_or_else(|| problem.x0().clone());
        Ok(OptResult::new(xbest, fbest, nfev, nfev, termination))
    }
}

/// Most intervals allowed along a single dimension
const MAX_STEPS: f64 = 1e9;

/// Evenly spaced values along each dimension, `round((ub - lb) / tol) + 1` of them
pub fn grid_axes(
    lower: &Array1<f64>,
    upper: &Array1<f64>,
    xtol: &Array1<f64>,
) -> Result<Vec<Array1<f64>>> {
    let mut axes = Vec::with_capacity(lower.len());
    let mut deviates = false;
    for ((&lb, &ub), &tol) in lower.iter().zip(upper.iter()).zip(xtol.iter()) {
        let steps = ((ub - lb) / tol).round().max(0.0);
        if !steps.is_finite() || steps >= MAX_STEPS {
            bail!(
                "Cannot sample [{}, {}] with a spacing of {}, the grid would be too large",
                lb,
                ub,
                tol
            );
        }
        let steps = steps as usize;
        let spacing = if steps > 0 {
            (ub - lb) / steps as f64
        } else {
            f64::INFINITY
        };
        if (spacing - tol).abs() > 1e-6 + 1e-6 * tol.abs() {
            deviates = true;
        }
        axes.push(Array1::linspace(lb, ub, steps + 1));
    }
    if deviates {
        tracing::warn!(
            "The spacing between values to be evaluated differs from the specified tolerances. To avoid this warning, please ensure that each element of xtol cleanly divides the corresponding element of (ub - lb)."
        );
    }
    Ok(axes)
}

//! Multidirectional search
//!
//! Algorithm 8.2.1 of Kelley, *Iterative Methods for Optimization*. All non-best vertices are reflected
//! through the best one at once; the whole reflected simplex is then either expanded or contracted.

use eyre::Result;
use ndarray::{Array1, Array2};

use super::{Optimiser, Problem, Samples, SearchOptions};
use crate::routines::budget::{default_maxfev, Budget, Counting, Exhausted, Halt};
use crate::routines::output::{OptResult, Termination};
use crate::structs::simplex::Simplex;

const MU_E: f64 = 2.0;
const MU_C: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct MultidirectionalSearch {
    options: SearchOptions,
}

impl MultidirectionalSearch {
    pub fn new(options: SearchOptions) -> Self {
        MultidirectionalSearch { options }
    }
}

impl Optimiser for MultidirectionalSearch {
    fn minimize(&self, cf: &mut dyn Counting, problem: &Problem) -> Result<OptResult> {
        let n = problem.dim();
        let maxiter = self.options.iteration_limit(n);
        let maxfev = default_maxfev(self.options.maxfev, n);

        let mut budget = Budget::new(cf, maxfev);
        let mut sim = Simplex::new(
            problem.x0(),
            self.options.simplex,
            self.options.length(),
            self.options.seed,
        );
        let mut samples = Samples::default();
        let mut niter = 0;

        let outcome = search(
            &mut budget,
            &mut sim,
            &mut samples,
            &mut niter,
            maxiter,
            problem.xtol(),
        );
        let termination = match outcome {
            Ok(()) => Termination::Success,
            Err(Halt::Exhausted(exhausted)) => exhausted.into(),
            Err(Halt::Failed(report)) => return Err(report),
        };

        sim.sort();
        let (xbest, fbest) = samples.best_or(sim.point(0).to_owned(), sim.score(0));
        let nfev = budget.used();
        tracing::info!(
            "Multidirectional search finished after {} iterations and {} evaluations: {}",
            niter,
            nfev,
            termination
        );

        let (x, f) = sim.into_parts();
        Ok(OptResult::new(xbest, fbest, niter, nfev, termination).with_simplex(x, f))
    }
}

fn search<F: Counting>(
    budget: &mut Budget<F>,
    sim: &mut Simplex,
    samples: &mut Samples,
    niter: &mut usize,
    maxiter: usize,
    xtol: &Array1<f64>,
) -> Result<(), Halt> {
    let n = sim.dim();

    for i in 0..=n {
        let x = sim.point(i).to_owned();
        let f = budget.evaluate(&x)?;
        sim.set_score(i, f);
        sim.sort();
    }

    while !sim.converged(xtol) {
        *niter += 1;
        sim.sort();
        if *niter >= maxiter {
            return Err(Exhausted::Iterations.into());
        }
        samples.clear();

        let best = sim.point(0).to_owned();
        // Offsets of the other vertices from the best one
        let offsets: Array2<f64> = sim.x().slice(ndarray::s![1.., ..]).to_owned() - &best;

        let (reflected, fr) = evaluate_all(budget, &best, &offsets, -1.0, samples)?;
        let fr_min = fr.iter().cloned().fold(f64::INFINITY, f64::min);

        if sim.score(0) > fr_min {
            let (expanded, fe) = evaluate_all(budget, &best, &offsets, -MU_E, samples)?;
            let fe_min = fe.iter().cloned().fold(f64::INFINITY, f64::min);
            if fr_min > fe_min {
                tracing::debug!("Iteration {}: expand, f = {}", niter, fe_min);
                replace_all(sim, &expanded, &fe);
            } else {
                tracing::debug!("Iteration {}: reflect, f = {}", niter, fr_min);
                replace_all(sim, &reflected, &fr);
            }
        } else {
            // Contracted vertices go straight into the simplex
            tracing::debug!("Iteration {}: contract", niter);
            for j in 1..=n {
                let x = &best + &(&offsets.row(j - 1) * MU_C);
                let f = budget.evaluate(&x)?;
                sim.set(j, &x, f);
            }
        }
        sim.sort();
    }
    Ok(())
}

/// Score `best + mu * offset` for every offset
fn evaluate_all<F: Counting>(
    budget: &mut Budget<F>,
    best: &Array1<f64>,
    offsets: &Array2<f64>,
    mu: f64,
    samples: &mut Samples,
) -> Result<(Array2<f64>, Array1<f64>), Halt> {
    let points = offsets * mu + best;
    let mut scores = Array1::from_elem(points.nrows(), f64::INFINITY);
    for (j, x) in points.rows().into_iter().enumerate() {
        let x = x.to_owned();
        scores[j] = budget.evaluate(&x)?;
        samples.push(x, scores[j]);
    }
    Ok((points, scores))
}

fn replace_all(sim: &mut Simplex, points: &Array2<f64>, scores: &Array1<f64>) {
    for (j, (x, &f)) in points.rows().into_iter().zip(scores.iter()).enumerate() {
        sim.set(j + 1, &x.to_owned(), f);
    }
}

//! Nelder-Mead simplex search
//!
//! Follows Algorithm 8.1.1 of Kelley, *Iterative Methods for Optimization* (SIAM, 1999). Each iteration
//! tries, in order, a reflection, an expansion, an outside contraction and an inside contraction of the
//! worst vertex through the centroid of the others, and shrinks the simplex towards its best vertex if
//! none of them helps.

use eyre::Result;
use ndarray::Array1;

use super::{Optimiser, Problem, Samples, SearchOptions};
use crate::routines::budget::{default_maxfev, Budget, Counting, Exhausted, Halt};
use crate::routines::output::{OptResult, Termination};
use crate::structs::simplex::Simplex;

/// Reflection
const MU_R: f64 = 1.0;
/// Expansion
const MU_E: f64 = 2.0;
/// Outside contraction
const MU_OC: f64 = 0.5;
/// Inside contraction
const MU_IC: f64 = -0.5;

#[derive(Debug, Clone)]
pub struct NelderMead {
    options: SearchOptions,
}

impl NelderMead {
    pub fn new(options: SearchOptions) -> Self {
        NelderMead { options }
    }
}

impl Optimiser for NelderMead {
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
        let mut search = Search {
            sim: &mut sim,
            samples: Samples::default(),
            niter: 0,
            maxiter,
            maxfev,
        };

        let termination = match search.run(&mut budget, problem.xtol()) {
            Ok(()) => Termination::Success,
            Err(Halt::Exhausted(exhausted)) => exhausted.into(),
            Err(Halt::Failed(report)) => return Err(report),
        };
        let Search { samples, niter, .. } = search;

        sim.sort();
        let (xbest, fbest) = samples.best_or(sim.point(0).to_owned(), sim.score(0));
        let nfev = budget.used();
        tracing::info!(
            "Nelder-Mead finished after {} iterations and {} evaluations: {}",
            niter,
            nfev,
            termination
        );

        let (x, f) = sim.into_parts();
        Ok(OptResult::new(xbest, fbest, niter, nfev, termination).with_simplex(x, f))
    }
}

struct Search<'a> {
    sim: &'a mut Simplex,
    samples: Samples,
    niter: usize,
    maxiter: usize,
    maxfev: usize,
}

impl Search<'_> {
    fn run<F: Counting>(&mut self, budget: &mut Budget<F>, xtol: &Array1<f64>) -> Result<(), Halt> {
        let n = self.sim.dim();

        // Unevaluated vertices score +inf, so sorting keeps them at the end
        for i in 0..=n {
            let x = self.sim.point(i).to_owned();
            let f = budget.evaluate(&x)?;
            self.sim.set_score(i, f);
            self.sim.sort();
        }

        while !self.sim.converged(xtol) {
            self.niter += 1;
            self.sim.sort();
            if self.niter >= self.maxiter {
                return Err(Exhausted::Iterations.into());
            }
            self.samples.clear();

            let xr = self.extrapolate(MU_R);
            let fr = budget.evaluate(&xr)?;
            self.samples.push(xr.clone(), fr);

            // Reflect
            if self.sim.score(0) <= fr && fr < self.sim.score(n - 1) {
                tracing::debug!("Iteration {}: reflect, f = {}", self.niter, fr);
                self.sim.replace_worst(&xr, fr);
                self.sim.sort();
                continue;
            }

            // Expand
            if fr < self.sim.score(0) {
                let xe = self.extrapolate(MU_E);
                let fe = budget.evaluate(&xe)?;
                self.samples.push(xe.clone(), fe);
                if fe < fr {
                    tracing::debug!("Iteration {}: expand, f = {}", self.niter, fe);
                    self.sim.replace_worst(&xe, fe);
                } else {
                    tracing::debug!("Iteration {}: reflect, f = {}", self.niter, fr);
                    self.sim.replace_worst(&xr, fr);
                }
                self.sim.sort();
                continue;
            }

            if self.sim.score(n - 1) <= fr && fr < self.sim.score(n) {
                // Outside contraction
                let xc = self.extrapolate(MU_OC);
                let fc = budget.evaluate(&xc)?;
                self.samples.push(xc.clone(), fc);
                if fc <= fr {
                    tracing::debug!("Iteration {}: outside contraction, f = {}", self.niter, fc);
                    self.sim.replace_worst(&xc, fc);
                    self.sim.sort();
                } else {
                    self.shrink(budget)?;
                }
            } else {
                // Inside contraction
                let xc = self.extrapolate(MU_IC);
                let fc = budget.evaluate(&xc)?;
                self.samples.push(xc.clone(), fc);
                if fc < self.sim.score(n) {
                    tracing::debug!("Iteration {}: inside contraction, f = {}", self.niter, fc);
                    self.sim.replace_worst(&xc, fc);
                    self.sim.sort();
                } else {
                    self.shrink(budget)?;
                }
            }
        }
        Ok(())
    }

    /// `(1 + mu) * xbar - mu * xworst`
    fn extrapolate(&self, mu: f64) -> Array1<f64> {
        (1.0 + mu) * self.sim.xbar() - mu * &self.sim.xworst()
    }

    fn shrink<F: Counting>(&mut self, budget: &mut Budget<F>) -> Result<(), Halt> {
        let n = self.sim.dim();
        // A shrink costs N evaluations at once
        if budget.used() >= self.maxfev.saturating_sub(n) {
            return Err(Exhausted::Evaluations.into());
        }
        tracing::debug!("Iteration {}: shrink", self.niter);
        self.sim.shrink();
        for i in 1..=n {
            let x = self.sim.point(i).to_owned();
            let f = budget.evaluate(&x)?;
            self.sim.set_score(i, f);
        }
        self.sim.sort();
        Ok(())
    }
}

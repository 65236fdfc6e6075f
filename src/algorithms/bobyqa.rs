//! Bound-constrained trust-region search, delegated to the BOBYQA solver of NLopt
//!
//! Only available with the `bobyqa` feature, which builds NLopt from source.

use eyre::Result;

use super::{Optimiser, Problem, SearchOptions};
use crate::routines::budget::Counting;
use crate::routines::output::OptResult;

#[derive(Debug, Clone)]
pub struct Bobyqa {
    options: SearchOptions,
}

#[cfg(feature = "bobyqa")]
impl Bobyqa {
    pub fn new(options: SearchOptions) -> Result<Self> {
        Ok(Bobyqa { options })
    }

    /// Initial trust-region radius
    ///
    /// The solver requires the initial radius to be less than half of the extent of every
    /// dimension. Scaled lower bounds are all zero, so the smallest upper bound is that extent.
    pub fn rhobeg(&self, problem: &Problem) -> f64 {
        let min_ub = problem
            .upper()
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        self.options.length().min(0.499 * min_ub)
    }
}

#[cfg(not(feature = "bobyqa"))]
impl Bobyqa {
    pub fn new(_options: SearchOptions) -> Result<Self> {
        eyre::bail!("The 'bobyqa' optimiser is not available, rebuild with the `bobyqa` feature enabled")
    }
}

#[cfg(feature = "bobyqa")]
mod solver {
    use eyre::{bail, eyre, Result};
    use ndarray::Array1;
    use nlopt::{Algorithm as NlAlgorithm, FailState, Nlopt, SuccessState, Target as NlTarget};

    use super::{Bobyqa, Counting, OptResult, Optimiser, Problem};
    use crate::routines::budget::default_maxfev;
    use crate::routines::output::Termination;
    use crate::routines::scaling::MAGIC_TOL;

    /// State shared with the objective, which NLopt calls through a plain function
    struct Objective<'a> {
        cf: &'a mut dyn Counting,
        error: Option<eyre::Report>,
        xbest: Option<Array1<f64>>,
        fbest: f64,
    }

    fn objective(x: &[f64], _grad: Option<&mut [f64]>, data: &mut &mut Objective<'_>) -> f64 {
        // NLopt cannot be stopped from here; once failed, return without measuring
        if data.error.is_some() {
            return f64::MAX;
        }
        let x = Array1::from(x.to_vec());
        match data.cf.score(&x) {
            Ok(f) => {
                if f < data.fbest {
                    data.fbest = f;
                    data.xbest = Some(x);
                }
                f
            }
            Err(report) => {
                data.error = Some(report);
                f64::MAX
            }
        }
    }

    impl Optimiser for Bobyqa {
        fn minimize(&self, cf: &mut dyn Counting, problem: &Problem) -> Result<OptResult> {
            let n = problem.dim();
            let maxfev = default_maxfev(self.options.maxfev, n);
            let rhobeg = self.rhobeg(problem);
            let start = cf.calls();

            let mut data = Objective {
                cf,
                error: None,
                xbest: None,
                fbest: f64::INFINITY,
            };
            let mut x = problem.x0().to_vec();

            let outcome = {
                let mut opt = Nlopt::new(
                    NlAlgorithm::Bobyqa,
                    n,
                    objective,
                    NlTarget::Minimize,
                    &mut data,
                );
                let settings = [
                    opt.set_lower_bounds(&problem.lower().to_vec()),
                    opt.set_upper_bounds(&problem.upper().to_vec()),
                    opt.set_maxeval(maxfev as u32),
                    opt.set_initial_step1(rhobeg),
                    opt.set_xtol_abs1(MAGIC_TOL),
                ];
                if let Some(Err(fail)) = settings.into_iter().find(|s| s.is_err()) {
                    bail!("BOBYQA could not be configured: {:?}", fail);
                }
                opt.optimize(&mut x)
            };

            // Errors raised by the scored function take precedence over whatever NLopt reports
            if let Some(report) = data.error.take() {
                return Err(report);
            }

            let termination = match outcome {
                Ok((state, _)) => match state {
                    SuccessState::Success
                    | SuccessState::FtolReached
                    | SuccessState::XtolReached
                    | SuccessState::StopValReached => Termination::Success,
                    SuccessState::MaxEvalReached | SuccessState::MaxTimeReached => {
                        Termination::MaxEvaluations
                    }
                },
                Err((FailState::RoundoffLimited, _)) => Termination::SlowProgress,
                Err((FailState::ForcedStop, _)) => {
                    Termination::Solver("Optimisation terminated (forced stop).".to_string())
                }
                Err((fail, _)) => return Err(eyre!("BOBYQA failed: {:?}", fail)),
            };

            let nfev = data.cf.calls() - start;
            let (xbest, fbest) = match data.xbest.take() {
                Some(xbest) => (xbest, data.fbest),
                None => (Array1::from(x), f64::INFINITY),
            };
            tracing::info!("BOBYQA finished after {} evaluations: {}", nfev, termination);

            Ok(OptResult::new(xbest, fbest, 0, nfev, termination))
        }
    }
}

#[cfg(not(feature = "bobyqa"))]
impl Optimiser for Bobyqa {
    fn minimize(&self, _cf: &mut dyn Counting, _problem: &Problem) -> Result<OptResult> {
        eyre::bail!("The 'bobyqa' optimiser is not available, rebuild with the `bobyqa` feature enabled")
    }
}

#[cfg(all(test, feature = "bobyqa"))]
mod tests {
    use super::*;
    use crate::routines::budget::{from_fn, Counted};
    use crate::routines::output::Termination;
    use eyre::eyre;
    use ndarray::{array, Array1};

    fn problem() -> Problem {
        Problem::new(
            array![0.3, 0.3],
            array![0.03, 0.03],
            array![0.0, 0.0],
            array![3.0, 3.0],
        )
        .unwrap()
    }

    #[test]
    fn initial_radius_is_clamped() {
        let bobyqa = Bobyqa::new(SearchOptions::default()).unwrap();
        assert!((bobyqa.rhobeg(&problem()) - 0.3).abs() < 1e-12);

        let narrow = Problem::new(array![0.1], array![0.03], array![0.0], array![0.4]).unwrap();
        assert!((bobyqa.rhobeg(&narrow) - 0.1996).abs() < 1e-12);
    }

    #[test]
    fn finds_minimum_of_paraboloid() {
        let mut cf = Counted::new(from_fn(|x: &Array1<f64>| {
            Ok((x[0] - 1.2).powi(2) + (x[1] - 2.1).powi(2))
        }));
        let res = Bobyqa::new(SearchOptions::default())
            .unwrap()
            .minimize(&mut cf, &problem())
            .unwrap();
        assert!((res.xbest()[0] - 1.2).abs() < 0.1);
        assert!((res.xbest()[1] - 2.1).abs() < 0.1);
        assert_eq!(res.niter(), 0);
        assert_eq!(res.nfev(), cf.calls());
        assert!(res.simplex().is_none());
    }

    #[test]
    fn respects_budget() {
        let mut cf = Counted::new(from_fn(|x: &Array1<f64>| Ok(x.sum().sin() + x[0])));
        let options = SearchOptions {
            maxfev: 8,
            ..SearchOptions::default()
        };
        let res = Bobyqa::new(options)
            .unwrap()
            .minimize(&mut cf, &problem())
            .unwrap();
        assert!(res.nfev() <= 8);
        if res.nfev() == 8 {
            assert_eq!(res.termination(), &Termination::MaxEvaluations);
        }
    }

    #[test]
    fn collaborator_errors_propagate() {
        let mut cf = Counted::new(from_fn(|_: &Array1<f64>| Err(eyre!("spectrometer busy"))));
        let err = Bobyqa::new(SearchOptions::default())
            .unwrap()
            .minimize(&mut cf, &problem())
            .unwrap_err();
        assert_eq!(err.to_string(), "spectrometer busy");
    }
}

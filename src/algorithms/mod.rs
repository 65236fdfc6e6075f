use std::fmt;
use std::str::FromStr;

use crate::routines::budget::Counting;
use crate::routines::output::OptResult;
use crate::routines::scaling::{Scaled, MAGIC_TOL};
use crate::structs::simplex::SimplexMethod;
use eyre::{bail, Result};
use ndarray::Array1;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod bobyqa;
pub mod brute;
pub mod mds;
pub mod nelder_mead;

use bobyqa::Bobyqa;
use brute::BruteForce;
use mds::MultidirectionalSearch;
use nelder_mead::NelderMead;

/// The available search algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// Nelder-Mead simplex search, `nm`
    #[default]
    NelderMead,
    /// Multidirectional search, `mds`
    MultidirectionalSearch,
    /// BOBYQA trust-region solver, `bobyqa`
    Bobyqa,
    /// Exhaustive grid search, `brute`
    BruteForce,
}

impl Algorithm {
    /// Whether points outside the bounds must be rejected before acquisition
    ///
    /// The simplex methods can step outside the bounds; the other solvers never do.
    pub fn rejects_out_of_bounds(&self) -> bool {
        matches!(
            self,
            Algorithm::NelderMead | Algorithm::MultidirectionalSearch
        )
    }
}

impl FromStr for Algorithm {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "nm" => Ok(Algorithm::NelderMead),
            "mds" => Ok(Algorithm::MultidirectionalSearch),
            "bobyqa" => Ok(Algorithm::Bobyqa),
            "brute" => Ok(Algorithm::BruteForce),
            _ => bail!(
                "Invalid optimiser '{}' specified, expected one of 'nm', 'mds', 'bobyqa' or 'brute'",
                s
            ),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::NelderMead => write!(f, "nm"),
            Algorithm::MultidirectionalSearch => write!(f, "mds"),
            Algorithm::Bobyqa => write!(f, "bobyqa"),
            Algorithm::BruteForce => write!(f, "brute"),
        }
    }
}

impl Serialize for Algorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Algorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Options shared by all optimisers. Each optimiser ignores those which do not apply to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    /// Maximum number of evaluations. Zero means `500 * N`, or no limit for brute force
    pub maxfev: usize,
    /// Maximum number of simplex iterations. Zero means `500 * N`
    pub maxiter: usize,
    /// Initial size of the simplex or trust region, in units of [MAGIC_TOL]
    pub nfactor: f64,
    pub simplex: SimplexMethod,
    pub seed: Option<u64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            maxfev: 0,
            maxiter: 0,
            nfactor: 10.0,
            simplex: SimplexMethod::Spendley,
            seed: None,
        }
    }
}

impl SearchOptions {
    /// Edge length of the initial simplex, or radius of the initial trust region
    pub fn length(&self) -> f64 {
        MAGIC_TOL * self.nfactor
    }

    /// Iteration limit of the simplex methods in `n` dimensions
    pub fn iteration_limit(&self, n: usize) -> usize {
        if self.maxiter == 0 {
            500 * n
        } else {
            self.maxiter
        }
    }
}

/// Starting point, tolerances and bounds of a search, all in scaled coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    x0: Array1<f64>,
    xtol: Array1<f64>,
    lower: Array1<f64>,
    upper: Array1<f64>,
}

impl Problem {
    pub fn new(
        x0: Array1<f64>,
        xtol: Array1<f64>,
        lower: Array1<f64>,
        upper: Array1<f64>,
    ) -> Result<Self> {
        if x0.len() != xtol.len() {
            bail!(
                "x0 and xtol have incompatible lengths ({} and {})",
                x0.len(),
                xtol.len()
            );
        }
        if x0.len() != lower.len() || x0.len() != upper.len() {
            bail!(
                "x0 and bounds have incompatible lengths ({}, {} and {})",
                x0.len(),
                lower.len(),
                upper.len()
            );
        }
        if x0.is_empty() {
            bail!("Nothing to optimise, x0 is empty");
        }
        if xtol.iter().any(|tol| !(tol.is_finite() && *tol > 0.0)) {
            bail!("Tolerances must be positive and finite, got {}", xtol);
        }
        if x0
            .iter()
            .zip(lower.iter().zip(upper.iter()))
            .any(|(x, (lb, ub))| x < lb || x > ub)
        {
            bail!("x0 is outside of specified bounds");
        }
        Ok(Problem {
            x0,
            xtol,
            lower,
            upper,
        })
    }

    /// The problem described by a scaled parameter set
    pub fn from_scaled(scaled: &Scaled) -> Result<Self> {
        Problem::new(
            scaled.values.clone(),
            scaled.tol.clone(),
            scaled.lower.clone(),
            scaled.upper.clone(),
        )
    }

    /// Number of dimensions
    pub fn dim(&self) -> usize {
        self.x0.len()
    }

    pub fn x0(&self) -> &Array1<f64> {
        &self.x0
    }

    pub fn xtol(&self) -> &Array1<f64> {
        &self.xtol
    }

    pub fn lower(&self) -> &Array1<f64> {
        &self.lower
    }

    pub fn upper(&self) -> &Array1<f64> {
        &self.upper
    }
}

/// A derivative-free minimiser
///
/// The scored function must already be counted; its call count is read to enforce budgets and to
/// report the number of evaluations. Running out of budget is not an error and ends with a regular
/// [OptResult]. Errors are reserved for failures of the scored function or of an external solver.
pub trait Optimiser {
    fn minimize(&self, cf: &mut dyn Counting, problem: &Problem) -> Result<OptResult>;
}

/// Points sampled during the current iteration of a simplex method, with their scores
///
/// A sampled point may be better than every vertex and still not enter the simplex, e.g. when
/// the budget runs out right after it was measured.
#[derive(Debug, Default)]
pub(crate) struct Samples {
    xs: Vec<Array1<f64>>,
    fs: Vec<f64>,
}

impl Samples {
    pub(crate) fn clear(&mut self) {
        self.xs.clear();
        self.fs.clear();
    }

    pub(crate) fn push(&mut self, x: Array1<f64>, f: f64) {
        self.xs.push(x);
        self.fs.push(f);
    }

    /// The best of the sampled points if it beats `fbest`, otherwise `(xbest, fbest)`
    pub(crate) fn best_or(&self, xbest: Array1<f64>, fbest: f64) -> (Array1<f64>, f64) {
        let lowest = self
            .fs
            .iter()
            .enumerate()
            .fold(None, |acc: Option<(usize, f64)>, (i, &f)| match acc {
                Some((_, g)) if g <= f => acc,
                _ => Some((i, f)),
            });
        match lowest {
            Some((i, f)) if f < fbest => (self.xs[i].clone(), f),
            _ => (xbest, fbest),
        }
    }
}

/// Construct the optimiser for `algorithm`
pub fn dispatch_algorithm(
    algorithm: Algorithm,
    options: SearchOptions,
) -> Result<Box<dyn Optimiser>> {
    match algorithm {
        Algorithm::NelderMead => Ok(Box::new(NelderMead::new(options))),
        Algorithm::MultidirectionalSearch => Ok(Box::new(MultidirectionalSearch::new(options))),
        Algorithm::Bobyqa => Ok(Box::new(Bobyqa::new(options)?)),
        Algorithm::BruteForce => Ok(Box::new(BruteForce::new(options))),
    }
}

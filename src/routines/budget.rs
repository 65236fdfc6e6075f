//! Scored functions, call counting and evaluation budgets
//!
//! Every optimiser minimises a [ScoredFunction]. Before an optimiser sees it, the function is wrapped in
//! [Counted], which keeps a per-run count of the evaluations that actually happened. Optimisers that
//! enforce a maximum number of evaluations wrap it once more in a [Budget], which stops the search with
//! [Exhausted::Evaluations] instead of calling through.
//!
//! A score of `+inf` is a sentinel: the point was rejected without being measured, so it is not counted.

use std::fmt;

use eyre::Result;
use ndarray::Array1;

/// The function minimised by the optimisers, lower is better
///
/// Anything the function needs besides the candidate point (cost functions, instruments, bounds)
/// is owned or borrowed by the implementor and bound when it is constructed.
pub trait ScoredFunction {
    /// Score a point in scaled coordinates.
    ///
    /// Returning `f64::INFINITY` marks the point as rejected; it does not count as an evaluation.
    fn score(&mut self, x: &Array1<f64>) -> Result<f64>;
}

impl<T: ScoredFunction + ?Sized> ScoredFunction for &mut T {
    fn score(&mut self, x: &Array1<f64>) -> Result<f64> {
        (**self).score(x)
    }
}

/// A [ScoredFunction] which can report how many evaluations it has made
pub trait Counting: ScoredFunction {
    fn calls(&self) -> usize;
}

impl<T: Counting + ?Sized> Counting for &mut T {
    fn calls(&self) -> usize {
        (**self).calls()
    }
}

/// Adapter turning a closure into a [ScoredFunction], see [from_fn]
pub struct FromFn<F>(F);

/// Use a closure as a [ScoredFunction]
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: FnMut(&Array1<f64>) -> Result<f64>,
{
    FromFn(f)
}

impl<F> ScoredFunction for FromFn<F>
where
    F: FnMut(&Array1<f64>) -> Result<f64>,
{
    fn score(&mut self, x: &Array1<f64>) -> Result<f64> {
        (self.0)(x)
    }
}

/// Whether a score counts as an evaluation
#[inline]
pub fn counts(score: f64) -> bool {
    score != f64::INFINITY
}

/// Counts the calls to the wrapped function, ignoring those returning `+inf`
#[derive(Debug, Clone)]
pub struct Counted<F> {
    inner: F,
    calls: usize,
}

impl<F: ScoredFunction> Counted<F> {
    pub fn new(inner: F) -> Self {
        Counted { inner, calls: 0 }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: ScoredFunction> ScoredFunction for Counted<F> {
    fn score(&mut self, x: &Array1<f64>) -> Result<f64> {
        let score = self.inner.score(x)?;
        if counts(score) {
            self.calls += 1;
        }
        Ok(score)
    }
}

impl<F: ScoredFunction> Counting for Counted<F> {
    fn calls(&self) -> usize {
        self.calls
    }
}

/// Budget that ended a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhausted {
    Evaluations,
    Iterations,
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exhausted::Evaluations => write!(f, "maximum function evaluations reached"),
            Exhausted::Iterations => write!(f, "maximum iterations reached"),
        }
    }
}

impl std::error::Error for Exhausted {}

/// Why a search loop stopped before converging
///
/// Only [Halt::Failed] is an error; an exhausted budget ends the run with a regular result.
#[derive(Debug)]
pub enum Halt {
    Exhausted(Exhausted),
    Failed(eyre::Report),
}

impl From<Exhausted> for Halt {
    fn from(exhausted: Exhausted) -> Self {
        Halt::Exhausted(exhausted)
    }
}

impl From<eyre::Report> for Halt {
    fn from(report: eyre::Report) -> Self {
        // A nested budget reports exhaustion through the error channel of `ScoredFunction`
        match report.downcast::<Exhausted>() {
            Ok(exhausted) => Halt::Exhausted(exhausted),
            Err(report) => Halt::Failed(report),
        }
    }
}

/// Enforces a maximum number of evaluations on a counted function
///
/// Before each call, the count of the wrapped function is compared to `maxfev`. The budget keeps its
/// own count of the evaluations made through it, so wrapping a budget in another budget still leaves
/// a valid counter on the outermost wrapper.
#[derive(Debug)]
pub struct Budget<F> {
    inner: F,
    maxfev: usize,
    calls: usize,
}

impl<F: Counting> Budget<F> {
    pub fn new(inner: F, maxfev: usize) -> Self {
        Budget {
            inner,
            maxfev,
            calls: 0,
        }
    }

    /// Evaluations counted by the wrapped function, which is what the budget is checked against
    pub fn used(&self) -> usize {
        self.inner.calls()
    }

    /// Evaluate `x`, or signal [Exhausted::Evaluations] if the wrapped function has used up the budget
    pub fn evaluate(&mut self, x: &Array1<f64>) -> Result<f64, Halt> {
        if self.inner.calls() >= self.maxfev {
            return Err(Exhausted::Evaluations.into());
        }
        let score = self.inner.score(x)?;
        if counts(score) {
            self.calls += 1;
        }
        Ok(score)
    }
}

impl<F: Counting> ScoredFunction for Budget<F> {
    fn score(&mut self, x: &Array1<f64>) -> Result<f64> {
        match self.evaluate(x) {
            Ok(score) => Ok(score),
            Err(Halt::Exhausted(exhausted)) => Err(exhausted.into()),
            Err(Halt::Failed(report)) => Err(report),
        }
    }
}

impl<F: Counting> Counting for Budget<F> {
    /// Evaluations made through this budget
    fn calls(&self) -> usize {
        self.calls
    }
}

/// Default evaluation budget: `500 * N` when `maxfev` is zero
pub fn default_maxfev(maxfev: usize, n: usize) -> usize {
    if maxfev == 0 {
        500 * n
    } else {
        maxfev
    }
}

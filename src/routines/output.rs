use std::fmt;
use std::fs::{create_dir_all, File, OpenOptions};
use std::path::Path;

use csv::{Writer, WriterBuilder};
use eyre::{Result, WrapErr};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::routines::budget::Exhausted;

/// Why an optimisation run stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    Success,
    MaxEvaluations,
    MaxIterations,
    /// The trust-region solver could not make further progress (rounding errors)
    SlowProgress,
    /// The trust-region solver gave up after too many steps that failed to improve
    FalseSuccessSteps,
    /// Any other message from an external solver, carried verbatim
    Solver(String),
}

impl Termination {
    pub fn message(&self) -> &str {
        match self {
            Termination::Success => "Optimisation terminated successfully.",
            Termination::MaxEvaluations => "Maximum function evaluations reached.",
            Termination::MaxIterations => "Maximum iterations reached.",
            Termination::SlowProgress => "Optimisation terminated (slow progress).",
            Termination::FalseSuccessSteps => "Optimisation terminated (max false good steps).",
            Termination::Solver(message) => message.as_str(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Success)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl From<Exhausted> for Termination {
    fn from(exhausted: Exhausted) -> Self {
        match exhausted {
            Exhausted::Evaluations => Termination::MaxEvaluations,
            Exhausted::Iterations => Termination::MaxIterations,
        }
    }
}

/// Outcome of a single optimisation run, in scaled coordinates
///
/// Produced once by an optimiser, and read-only afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct OptResult {
    xbest: Array1<f64>,
    fbest: f64,
    niter: usize,
    nfev: usize,
    simplex: Option<Array2<f64>>,
    fvals: Option<Array1<f64>>,
    termination: Termination,
}

impl OptResult {
    pub fn new(
        xbest: Array1<f64>,
        fbest: f64,
        niter: usize,
        nfev: usize,
        termination: Termination,
    ) -> Self {
        OptResult {
            xbest,
            fbest,
            niter,
            nfev,
            simplex: None,
            fvals: None,
            termination,
        }
    }

    /// Attach the final simplex and its scores
    pub fn with_simplex(mut self, simplex: Array2<f64>, fvals: Array1<f64>) -> Self {
        self.simplex = Some(simplex);
        self.fvals = Some(fvals);
        self
    }

    pub fn xbest(&self) -> &Array1<f64> {
        &self.xbest
    }

    pub fn fbest(&self) -> f64 {
        self.fbest
    }

    /// Number of iterations, zero for solvers without a notion of iteration
    pub fn niter(&self) -> usize {
        self.niter
    }

    pub fn nfev(&self) -> usize {
        self.nfev
    }

    pub fn simplex(&self) -> Option<&Array2<f64>> {
        self.simplex.as_ref()
    }

    pub fn fvals(&self) -> Option<&Array1<f64>> {
        self.fvals.as_ref()
    }

    pub fn termination(&self) -> &Termination {
        &self.termination
    }

    pub fn message(&self) -> &str {
        self.termination.message()
    }

    /// Writes `result.json` to `folder`
    pub fn write(&self, folder: &str) -> Result<()> {
        let outputfile = OutputFile::new(folder, "result.json")?;
        serde_json::to_writer_pretty(outputfile.file_owned(), self)
            .wrap_err("Failed to write result.json")?;
        Ok(())
    }
}

/// Best parameter set found by [crate::entrypoints::optimize], in physical units
#[derive(Debug, Clone, Serialize)]
pub struct Optimum {
    /// Optimal values, one per parameter and in the configured order
    pub best_values: Array1<f64>,
    pub fbest: f64,
    pub message: String,
    /// Number of acquisitions made
    pub nfev: usize,
    /// The underlying result, in scaled coordinates
    pub result: OptResult,
}

/// Records every scored acquisition to `evaluations.csv`
///
/// One row per evaluation: a running index, the physical parameter values, the score, and whether
/// it counted towards the budget.
pub struct EvaluationLog {
    writer: Writer<File>,
    rows: usize,
}

impl EvaluationLog {
    pub fn new(folder: &str, names: &[String]) -> Result<Self> {
        let outputfile = OutputFile::new(folder, "evaluations.csv")?;
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(outputfile.file_owned());

        let mut header = vec!["eval".to_string()];
        header.extend(names.iter().cloned());
        header.push("cost".to_string());
        header.push("counted".to_string());
        writer.write_record(&header)?;

        Ok(EvaluationLog { writer, rows: 0 })
    }

    pub fn record(&mut self, values: &Array1<f64>, cost: f64, counted: bool) -> Result<()> {
        self.rows += 1;
        let mut row = vec![self.rows.to_string()];
        row.extend(values.iter().map(|v| v.to_string()));
        row.push(cost.to_string());
        row.push(counted.to_string());
        self.writer.write_record(&row)?;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Contains all the necessary information of an output file
#[derive(Debug)]
pub struct OutputFile {
    file: File,
}

impl OutputFile {
    pub fn new(folder: &str, file_name: &str) -> Result<Self> {
        let path = Path::new(&folder).join(file_name);

        if let Some(parent) = path.parent() {
            create_dir_all(parent)
                .with_context(|| format!("Failed to create directories for {:?}", parent))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("Failed to open file: {:?}", path))?;

        Ok(OutputFile { file })
    }

    pub fn file_owned(self) -> File {
        self.file
    }
}

//! Closed-loop, derivative-free optimisation of spectrometer acquisition parameters
//!
//! Candidate parameter values are written to the instrument, an experiment is acquired, and the
//! resulting dataset is reduced to a scalar by a user-supplied cost function. The optimisers
//! minimise that cost using only function values, under a fixed budget of acquisitions.
//!
//! The entrypoint is [entrypoints::optimize], configured through [routines::settings::Settings].

/// Glue between the optimisers and the instrument
pub mod acquisition;
/// The derivative-free optimisers
pub mod algorithms;
/// Entrypoints for running an optimisation
pub mod entrypoints;
/// Routines shared by the optimisers and the entrypoints
pub mod routines;
/// Core data structures
pub mod structs;

pub use crate::entrypoints::{optimize, run_optimized};

/// A collection of commonly used items
pub mod prelude {
    pub use crate::acquisition::targets::ParameterTarget;
    pub use crate::acquisition::{Callback, CostFunction, Instrument};
    pub use crate::algorithms::{dispatch_algorithm, Algorithm, Optimiser, Problem, SearchOptions};
    pub use crate::entrypoints::{optimize, run_optimized};
    pub use crate::routines::budget::{from_fn, Counted, Counting, ScoredFunction};
    pub use crate::routines::output::{OptResult, Optimum, Termination};
    pub use crate::routines::rounding::round2tol;
    pub use crate::routines::scaling::{ScaleBy, Scaling};
    pub use crate::routines::settings::{Parameter, Parameters, Settings};
    pub use crate::structs::simplex::SimplexMethod;
}

// Evaluation counting and budgets
pub mod budget;
// Routines for logging
pub mod logger;
// Routines for output
pub mod output;
// Rounding to parameter tolerances
pub mod rounding;
// Scaling between physical units and the optimiser's space
pub mod scaling;
// Routines for settings
pub mod settings;

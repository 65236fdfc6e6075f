//! Closed-loop acquisition
//!
//! Glue between the optimisers and the spectrometer. Every candidate point is unscaled, checked
//! against the bounds, written to the instrument, measured, and scored by the user's cost function.

use std::path::{Path, PathBuf};

use eyre::{bail, Result};
use ndarray::Array1;

use crate::routines::budget::ScoredFunction;
use crate::routines::output::EvaluationLog;
use crate::routines::rounding::round2tol;
use crate::routines::scaling::Scaling;
use crate::routines::settings::{Files, Parameters};

pub mod targets;

use targets::ParameterTarget;

/// The spectrometer, or anything that can be set up and measured
pub trait Instrument {
    /// A measured dataset
    type Data;

    /// Set a native parameter, addressed by group and key
    fn set_native(&mut self, group: &str, key: &str, value: &str) -> Result<()>;

    /// Rewrite variables of a pulse-program definition file
    fn modify_definitions(
        &mut self,
        definition: &Path,
        names: &[String],
        values: &[String],
    ) -> Result<()>;

    /// Reload an experiment, so that modified definitions take effect
    fn load_experiment(&mut self, experiment: &Path) -> Result<()>;

    /// Run the current experiment and return its data
    fn acquire(&mut self) -> Result<Self::Data>;
}

/// Reduces a dataset to a score, lower is better
pub trait CostFunction<D> {
    fn cost(&self, data: &D) -> f64;
}

impl<D, F> CostFunction<D> for F
where
    F: Fn(&D) -> f64,
{
    fn cost(&self, data: &D) -> f64 {
        self(data)
    }
}

/// User hook applying parameters without a native setter
///
/// Called before every acquisition with the names and (unrounded) values of all parameters.
pub type Callback<'a> = dyn FnMut(&[(String, f64)]) -> Result<()> + 'a;

/// Resolved destination of every parameter, checked before the first acquisition
#[derive(Debug, Clone)]
pub struct Routing {
    names: Vec<String>,
    tol: Vec<f64>,
    targets: Vec<ParameterTarget>,
    definition: Option<PathBuf>,
    experiment: Option<PathBuf>,
}

impl Routing {
    pub fn new(parameters: &Parameters, files: &Files, has_callback: bool) -> Result<Self> {
        let targets = parameters.targets();

        if let Some(user) = parameters
            .iter()
            .zip(&targets)
            .find(|(_, target)| **target == ParameterTarget::User)
        {
            if !has_callback {
                bail!(
                    "Parameter '{}' is a user parameter, which requires a callback",
                    user.0.name()
                );
            }
        }

        if targets.contains(&ParameterTarget::Definition) {
            if files.definition.is_none() {
                bail!("Some parameters are definition-file parameters. The definition file path is required to modify them.");
            }
            if files.experiment.is_none() {
                bail!("Some parameters are definition-file parameters. The experiment file path is required to modify them.");
            }
        }

        Ok(Routing {
            names: parameters.names(),
            tol: parameters.tol().to_vec(),
            targets,
            definition: files.definition.clone(),
            experiment: files.experiment.clone(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn targets(&self) -> &[ParameterTarget] {
        &self.targets
    }

    /// Send a parameter set, in physical units, to the instrument and the callback
    ///
    /// Values sent to the instrument are rounded to their tolerance; the callback receives them as they are.
    pub fn apply<I: Instrument + ?Sized>(
        &self,
        instrument: &mut I,
        values: &Array1<f64>,
        callback: Option<&mut Callback<'_>>,
    ) -> Result<()> {
        let rounded = round2tol(&values.to_vec(), &self.tol);

        let mut def_names = Vec::new();
        let mut def_values = Vec::new();
        for ((name, target), value) in self.names.iter().zip(&self.targets).zip(rounded) {
            match target {
                ParameterTarget::Native { group, key } => {
                    instrument.set_native(group, key, &value)?
                }
                ParameterTarget::User => {}
                ParameterTarget::Definition => {
                    def_names.push(name.clone());
                    def_values.push(value);
                }
            }
        }

        if let Some(callback) = callback {
            let pairs: Vec<(String, f64)> = self
                .names
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect();
            callback(&pairs)?;
        }

        if !def_names.is_empty() {
            if let (Some(definition), Some(experiment)) = (&self.definition, &self.experiment) {
                instrument.modify_definitions(definition, &def_names, &def_values)?;
                instrument.load_experiment(experiment)?;
            } else {
                bail!("Definition-file parameters require both a definition and an experiment file");
            }
        }
        Ok(())
    }
}

/// The scored function seen by the optimisers: one acquisition per call
pub struct Acquisition<'a, 'b, I: Instrument, C> {
    instrument: &'a mut I,
    cost: &'a C,
    routing: &'a Routing,
    scaling: &'a Scaling,
    reject_out_of_bounds: bool,
    callback: Option<&'a mut Callback<'b>>,
    log: Option<EvaluationLog>,
}

impl<'a, 'b, I, C> Acquisition<'a, 'b, I, C>
where
    I: Instrument,
    C: CostFunction<I::Data>,
{
    pub fn new(
        instrument: &'a mut I,
        cost: &'a C,
        routing: &'a Routing,
        scaling: &'a Scaling,
        reject_out_of_bounds: bool,
    ) -> Self {
        Acquisition {
            instrument,
            cost,
            routing,
            scaling,
            reject_out_of_bounds,
            callback: None,
            log: None,
        }
    }

    pub fn with_callback(mut self, callback: Option<&'a mut Callback<'b>>) -> Self {
        self.callback = callback;
        self
    }

    /// Record every evaluation to `evaluations.csv`
    pub fn with_log(mut self, log: EvaluationLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Flush the evaluation log, if any
    pub fn finish(mut self) -> Result<()> {
        if let Some(log) = self.log.as_mut() {
            log.flush()?;
        }
        Ok(())
    }
}

impl<I, C> ScoredFunction for Acquisition<'_, '_, I, C>
where
    I: Instrument,
    C: CostFunction<I::Data>,
{
    fn score(&mut self, x: &Array1<f64>) -> Result<f64> {
        let values = self.scaling.unscale(x);

        if self.reject_out_of_bounds && !self.scaling.contains(&values) {
            tracing::debug!("Rejected point outside of bounds: {}", values);
            if let Some(log) = self.log.as_mut() {
                log.record(&values, f64::INFINITY, false)?;
            }
            return Ok(f64::INFINITY);
        }

        self.routing
            .apply(&mut *self.instrument, &values, self.callback.as_deref_mut())?;
        let data = self.instrument.acquire()?;
        let cost = self.cost.cost(&data);

        let rounded = round2tol(&values.to_vec(), &self.scaling.tol().to_vec());
        let row: String = rounded.iter().map(|v| format!("{:^10}  ", v)).collect();
        tracing::info!("{}{:^10.4}", row, cost);

        if let Some(log) = self.log.as_mut() {
            log.record(&values, cost, cost != f64::INFINITY)?;
        }
        Ok(cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routines::scaling::ScaleBy;
    use ndarray::array;

    #[derive(Default)]
    struct Recorder {
        native: Vec<(String, String, String)>,
        definitions: Vec<(Vec<String>, Vec<String>)>,
        loads: usize,
        acquisitions: usize,
    }

    impl Instrument for Recorder {
        type Data = f64;

        fn set_native(&mut self, group: &str, key: &str, value: &str) -> Result<()> {
            self.native.push((group.into(), key.into(), value.into()));
            Ok(())
        }

        fn modify_definitions(
            &mut self,
            _definition: &Path,
            names: &[String],
            values: &[String],
        ) -> Result<()> {
            self.definitions.push((names.to_vec(), values.to_vec()));
            Ok(())
        }

        fn load_experiment(&mut self, _experiment: &Path) -> Result<()> {
            self.loads += 1;
            Ok(())
        }

        fn acquire(&mut self) -> Result<f64> {
            self.acquisitions += 1;
            Ok(self.acquisitions as f64)
        }
    }

    fn files() -> Files {
        Files {
            experiment: Some(PathBuf::from("hahn.exp")),
            definition: Some(PathBuf::from("hahn.def")),
        }
    }

    #[test]
    fn routes_each_kind() {
        let params = Parameters::new()
            .add("Attenuation", 12.34, 0.0, 60.0, 0.1)
            .unwrap()
            .add("p1", 17.0, 8.0, 40.0, 2.0)
            .unwrap()
            .add("&amp", 0.5, 0.0, 1.0, 0.05)
            .unwrap();
        let routing = Routing::new(&params, &files(), true).unwrap();

        let mut seen = Vec::new();
        let mut record = |pairs: &[(String, f64)]| -> Result<()> {
            seen.extend(pairs.iter().cloned());
            Ok(())
        };
        let callback: &mut Callback = &mut record;
        let mut recorder = Recorder::default();
        routing
            .apply(&mut recorder, &array![12.34, 17.0, 0.512], Some(callback))
            .unwrap();

        assert_eq!(
            recorder.native,
            vec![(
                "AcqHidden".to_string(),
                "ftBridge.Attenuation".to_string(),
                "12.3".to_string()
            )]
        );
        assert_eq!(
            recorder.definitions,
            vec![(vec!["p1".to_string()], vec!["16".to_string()])]
        );
        assert_eq!(recorder.loads, 1);
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2], ("&amp".to_string(), 0.512));
    }

    #[test]
    fn user_parameters_need_a_callback() {
        let params = Parameters::new().add("&amp", 0.5, 0.0, 1.0, 0.05).unwrap();
        let err = Routing::new(&params, &Files::default(), false).unwrap_err();
        assert!(err.to_string().contains("callback"));
    }

    #[test]
    fn definition_parameters_need_files() {
        let params = Parameters::new().add("d1", 400.0, 200.0, 800.0, 10.0).unwrap();
        let err = Routing::new(&params, &Files::default(), false).unwrap_err();
        assert!(err.to_string().contains("definition file"));

        let only_def = Files {
            experiment: None,
            definition: Some(PathBuf::from("hahn.def")),
        };
        let err = Routing::new(&params, &only_def, false).unwrap_err();
        assert!(err.to_string().contains("experiment file"));
    }

    #[test]
    fn out_of_bounds_points_are_not_acquired() {
        let params = Parameters::new()
            .add("VideoGain", 18.0, 0.0, 48.0, 6.0)
            .unwrap();
        let routing = Routing::new(&params, &Files::default(), false).unwrap();
        let scaling = Scaling::new(
            params.lower(),
            params.upper(),
            params.tol(),
            ScaleBy::Tolerances,
        )
        .unwrap();
        let cost = |data: &f64| *data;
        let mut recorder = Recorder::default();

        {
            let mut acquisition = Acquisition::new(&mut recorder, &cost, &routing, &scaling, true);
            // 48 dB is 0.24 scaled, anything beyond is out of bounds
            assert_eq!(acquisition.score(&array![0.3]).unwrap(), f64::INFINITY);
            assert_eq!(acquisition.score(&array![-0.01]).unwrap(), f64::INFINITY);
            assert_eq!(acquisition.score(&array![0.09]).unwrap(), 1.0);
        }
        assert_eq!(recorder.acquisitions, 1);
        assert_eq!(recorder.native[0].2, "18");
    }

    #[test]
    fn bounds_are_not_enforced_for_other_solvers() {
        let params = Parameters::new()
            .add("VideoGain", 18.0, 0.0, 48.0, 6.0)
            .unwrap();
        let routing = Routing::new(&params, &Files::default(), false).unwrap();
        let scaling = Scaling::new(
            params.lower(),
            params.upper(),
            params.tol(),
            ScaleBy::Tolerances,
        )
        .unwrap();
        let cost = |data: &f64| *data;
        let mut recorder = Recorder::default();

        let mut acquisition = Acquisition::new(&mut recorder, &cost, &routing, &scaling, false);
        assert_eq!(acquisition.score(&array![0.2400001]).unwrap(), 1.0);
    }
}

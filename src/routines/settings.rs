use std::collections::HashSet;
use std::path::PathBuf;

use crate::acquisition::targets::ParameterTarget;
use crate::algorithms::Algorithm;
use crate::structs::simplex::SimplexMethod;

use super::output::OutputFile;
use config::Config as eConfig;
use eyre::{bail, Result};
use ndarray::Array1;
use serde::Deserialize;
use serde_derive::Serialize;

/// Contains all settings for an optimisation run
#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    /// General configuration settings
    config: Config,
    /// Parameters to be optimised, in order
    parameters: Parameters,
    /// Instrument files used by definition-file parameters
    files: Files,
    /// Configuration for logging
    log: Log,
    /// Configuration for the output files
    output: Output,
}

impl Settings {
    pub fn new() -> Self {
        Settings::default()
    }

    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        self.parameters.validate()?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn files(&self) -> &Files {
        &self.files
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.config.algorithm = algorithm;
    }

    pub fn set_maxfev(&mut self, maxfev: usize) {
        self.config.maxfev = maxfev;
    }

    pub fn set_maxiter(&mut self, maxiter: usize) {
        self.config.maxiter = maxiter;
    }

    pub fn set_nfactor(&mut self, nfactor: f64) {
        self.config.nfactor = nfactor;
    }

    pub fn set_simplex(&mut self, simplex: SimplexMethod) {
        self.config.simplex = simplex;
    }

    pub fn set_seed(&mut self, seed: Option<u64>) {
        self.config.seed = seed;
    }

    pub fn set_parameters(&mut self, parameters: Parameters) {
        self.parameters = parameters;
    }

    pub fn set_experiment_file(&mut self, path: impl Into<PathBuf>) {
        self.files.experiment = Some(path.into());
    }

    pub fn set_definition_file(&mut self, path: impl Into<PathBuf>) {
        self.files.definition = Some(path.into());
    }

    pub fn set_log_level(&mut self, level: impl Into<String>) {
        self.log.level = level.into();
    }

    pub fn set_write_logs(&mut self, write: bool) {
        self.log.write = write;
    }

    pub fn set_output_path(&mut self, path: impl Into<String>) {
        self.output.path = path.into();
    }

    pub fn disable_output(&mut self) {
        self.output.write = false;
    }

    /// Writes a copy of the settings to `settings.json` in the output folder
    pub fn write(&self) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        let outputfile = OutputFile::new(self.output.path.as_str(), "settings.json")?;
        let mut file = outputfile.file_owned();
        std::io::Write::write_all(&mut file, serialized.as_bytes())?;
        Ok(())
    }
}

/// Fluent construction of [Settings] from code
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        SettingsBuilder::default()
    }

    pub fn set_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.settings.set_algorithm(algorithm);
        self
    }

    pub fn set_parameters(mut self, parameters: Parameters) -> Self {
        self.settings.set_parameters(parameters);
        self
    }

    pub fn set_maxfev(mut self, maxfev: usize) -> Self {
        self.settings.set_maxfev(maxfev);
        self
    }

    pub fn set_maxiter(mut self, maxiter: usize) -> Self {
        self.settings.set_maxiter(maxiter);
        self
    }

    pub fn set_nfactor(mut self, nfactor: f64) -> Self {
        self.settings.set_nfactor(nfactor);
        self
    }

    pub fn set_simplex(mut self, simplex: SimplexMethod, seed: Option<u64>) -> Self {
        self.settings.set_simplex(simplex);
        self.settings.set_seed(seed);
        self
    }

    pub fn set_files(
        mut self,
        experiment: impl Into<PathBuf>,
        definition: impl Into<PathBuf>,
    ) -> Self {
        self.settings.set_experiment_file(experiment);
        self.settings.set_definition_file(definition);
        self
    }

    pub fn set_output_path(mut self, path: impl Into<String>) -> Self {
        self.settings.set_output_path(path);
        self
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}

/// General configuration settings
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Denotes the algorithm to use
    pub algorithm: Algorithm,
    /// Maximum number of acquisitions. If zero, defaults to `500 * N`
    pub maxfev: usize,
    /// Maximum number of simplex iterations. If zero, defaults to `500 * N`
    pub maxiter: usize,
    /// Size of the initial simplex or trust region, in tolerances
    pub nfactor: f64,
    /// How the initial simplex is generated
    pub simplex: SimplexMethod,
    /// Seed for the random simplex. If not set, the generator is seeded from the OS
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            algorithm: Algorithm::NelderMead,
            maxfev: 0,
            maxiter: 0,
            nfactor: 10.0,
            simplex: SimplexMethod::Spendley,
            seed: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(self.nfactor > 0.0) || !self.nfactor.is_finite() {
            bail!("nfactor must be a positive number, got {}", self.nfactor);
        }
        Ok(())
    }
}

/// Defines a parameter to be optimised
///
/// The value is searched within `[lower, upper]`. Values closer than `tol` are considered indistinguishable.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Parameter {
    name: String,
    init: f64,
    lower: f64,
    upper: f64,
    tol: f64,
    #[serde(default)]
    target: Option<ParameterTarget>,
}

impl Parameter {
    /// Create a new parameter
    pub fn new(
        name: impl Into<String>,
        init: f64,
        lower: f64,
        upper: f64,
        tol: f64,
    ) -> Result<Self> {
        let parameter = Parameter {
            name: name.into(),
            init,
            lower,
            upper,
            tol,
            target: None,
        };
        parameter.validate()?;
        Ok(parameter)
    }

    /// Route this parameter explicitly instead of classifying it by name
    pub fn with_target(mut self, target: ParameterTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.lower >= self.upper {
            bail!(
                "In key '{}', lower bound ({}) is not less than upper bound ({})",
                self.name,
                self.lower,
                self.upper
            );
        }
        if self.init < self.lower || self.init > self.upper {
            bail!(
                "In key '{}', initial value ({}) is out of bounds [{}, {}]",
                self.name,
                self.init,
                self.lower,
                self.upper
            );
        }
        if !(self.tol > 0.0) {
            bail!(
                "In key '{}', tolerance must be positive, got {}",
                self.name,
                self.tol
            );
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn init(&self) -> f64 {
        self.init
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn tol(&self) -> f64 {
        self.tol
    }

    /// The explicit target, falling back to classification by name
    pub fn target(&self) -> ParameterTarget {
        match &self.target {
            Some(target) => target.clone(),
            None => ParameterTarget::classify(&self.name),
        }
    }
}

/// This structure contains information on all [Parameter]s to be optimised, in order
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(transparent)]
pub struct Parameters {
    parameters: Vec<Parameter>,
}

impl Parameters {
    /// Create a new set of parameters
    pub fn new() -> Self {
        Parameters {
            parameters: Vec::new(),
        }
    }

    /// Add a parameter to the set
    pub fn add(
        self,
        name: impl Into<String>,
        init: f64,
        lower: f64,
        upper: f64,
        tol: f64,
    ) -> Result<Self> {
        let parameter = Parameter::new(name, init, lower, upper, tol)?;
        self.push(parameter)
    }

    /// Add a fully specified parameter, e.g. one with an explicit target
    pub fn push(mut self, parameter: Parameter) -> Result<Self> {
        parameter.validate()?;
        if self.get(parameter.name()).is_some() {
            bail!("Parameter '{}' is defined more than once", parameter.name());
        }
        self.parameters.push(parameter);
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.parameters.is_empty() {
            bail!("At least one parameter must be given");
        }
        let mut seen = HashSet::new();
        for parameter in &self.parameters {
            parameter.validate()?;
            if !seen.insert(parameter.name()) {
                bail!("Parameter '{}' is defined more than once", parameter.name());
            }
        }
        Ok(())
    }

    /// Get a parameter by name
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Get the names of the parameters
    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    pub fn init(&self) -> Array1<f64> {
        self.parameters.iter().map(|p| p.init).collect()
    }

    pub fn lower(&self) -> Array1<f64> {
        self.parameters.iter().map(|p| p.lower).collect()
    }

    pub fn upper(&self) -> Array1<f64> {
        self.parameters.iter().map(|p| p.upper).collect()
    }

    pub fn tol(&self) -> Array1<f64> {
        self.parameters.iter().map(|p| p.tol).collect()
    }

    pub fn targets(&self) -> Vec<ParameterTarget> {
        self.parameters.iter().map(|p| p.target()).collect()
    }
}

/// Instrument files, needed only when definition-file parameters are optimised
#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Files {
    /// Experiment file, reloaded after the definitions change
    pub experiment: Option<PathBuf>,
    /// Definition file whose variables are rewritten
    pub definition: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
    /// The maximum log level to display
    ///
    /// The log level is defined as a string, and can be one of the following:
    /// - `trace`
    /// - `debug`
    /// - `info`
    /// - `warn`
    /// - `error`
    pub level: String,
    /// The file to write the log to, inside the output folder
    pub file: String,
    /// Whether to write logs
    ///
    /// If set to `false`, a global subscriber will not be set.
    /// This can be useful when the host application installs its own subscriber.
    pub write: bool,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: String::from("info"),
            file: String::from("log.txt"),
            write: true,
        }
    }
}

/// Configuration for the output files
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Output {
    /// Whether to write the output files
    pub write: bool,
    /// The (relative) path to write the output files to
    pub path: String,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            write: true,
            path: String::from("outputs/"),
        }
    }
}

impl Output {
    /// Parses the output folder location
    ///
    /// If a `#` symbol is found, it will automatically increment the number by one.
    pub fn parse_output_folder(&mut self) -> Result<()> {
        if self.path.is_empty() {
            self.path = Output::default().path;
        }

        let count = self.path.matches('#').count();
        match count {
            0 => Ok(()),
            1 => {
                let mut num = 1;
                while std::path::Path::new(&self.path.replace('#', &num.to_string())).exists() {
                    num += 1;
                }
                self.path = self.path.replace('#', &num.to_string());
                Ok(())
            }
            _ => {
                bail!("Only one `#` symbol is allowed in the output folder path. Rename the `path` setting in the configuration file and re-run the program.")
            }
        }
    }
}

/// Parses the settings from a TOML configuration file
///
/// The settings are validated, and a copy of the settings is written to the output folder.
///
/// Entries in the TOML file may be overridden by environment variables. The environment variables must be prefixed with `ACQOPT_`, and the TOML entry must be in uppercase. For example, the budget may be set with `ACQOPT_CONFIG_MAXFEV=40`. A single underscore, `_`, is used as the separator for nested entries.
pub fn read(path: impl Into<String>) -> Result<Settings> {
    let settings_path = path.into();

    let parsed = eConfig::builder()
        .add_source(config::File::with_name(&settings_path).format(config::FileFormat::Toml))
        .add_source(config::Environment::with_prefix("ACQOPT").separator("_"))
        .build()?;

    // Deserialize settings to the Settings struct
    let mut settings: Settings = parsed.try_deserialize()?;

    // Validate entries
    settings.validate()?;

    // Parse the output folder
    settings.output.parse_output_folder()?;

    // Write a copy of the settings to file if output is enabled
    if settings.output.write {
        if let Err(error) = settings.write() {
            bail!("Could not write settings to file: {}", error);
        }
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_validation() {
        assert!(Parameter::new("p1", 16.0, 8.0, 32.0, 2.0).is_ok());

        let err = Parameter::new("p1", 16.0, 32.0, 8.0, 2.0).unwrap_err();
        assert!(err.to_string().contains("lower bound"));

        let err = Parameter::new("p1", 40.0, 8.0, 32.0, 2.0).unwrap_err();
        assert!(err.to_string().contains("out of bounds"));

        let err = Parameter::new("p1", 16.0, 8.0, 32.0, 0.0).unwrap_err();
        assert!(err.to_string().contains("tolerance"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let params = Parameters::new()
            .add("p1", 16.0, 8.0, 32.0, 2.0)
            .unwrap();
        assert!(params.add("p1", 1.0, 0.0, 2.0, 0.5).is_err());
    }

    #[test]
    fn parameter_vectors_keep_order() {
        let params = Parameters::new()
            .add("p1", 16.0, 8.0, 32.0, 2.0)
            .unwrap()
            .add("CenterField", 3350.0, 3300.0, 3400.0, 0.5)
            .unwrap();
        assert_eq!(params.names(), vec!["p1", "CenterField"]);
        assert_eq!(params.init(), ndarray::array![16.0, 3350.0]);
        assert_eq!(params.tol(), ndarray::array![2.0, 0.5]);
        assert_eq!(
            params.targets()[1],
            ParameterTarget::Native {
                group: "Experiment".to_string(),
                key: "fieldCtrl.CenterField".to_string()
            }
        );
    }

    #[test]
    fn builder_sets_fields() {
        let settings = Settings::builder()
            .set_algorithm(Algorithm::MultidirectionalSearch)
            .set_maxfev(40)
            .set_maxiter(15)
            .set_simplex(SimplexMethod::Random, Some(7))
            .build();
        assert_eq!(settings.config().algorithm, Algorithm::MultidirectionalSearch);
        assert_eq!(settings.config().maxfev, 40);
        assert_eq!(settings.config().maxiter, 15);
        assert_eq!(settings.config().seed, Some(7));
        // no parameters yet
        assert!(settings.validate().is_err());
    }

    #[test]
    fn output_folder_increments() {
        let base = std::env::temp_dir().join(format!("acqopt-folder-{}", std::process::id()));
        std::fs::create_dir_all(base.join("run1")).unwrap();

        let mut output = Output {
            write: true,
            path: base.join("run#").to_string_lossy().into_owned(),
        };
        output.parse_output_folder().unwrap();
        assert!(output.path.ends_with("run2"));

        let mut output = Output {
            write: true,
            path: "a#b#".to_string(),
        };
        assert!(output.parse_output_folder().is_err());
        std::fs::remove_dir_all(&base).ok();
    }
}

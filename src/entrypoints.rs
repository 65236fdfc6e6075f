use std::time::Instant;

use crate::acquisition::{Acquisition, Callback, CostFunction, Instrument, Routing};
use crate::algorithms::{dispatch_algorithm, Problem, SearchOptions};
use crate::routines::budget::Counted;
use crate::routines::logger;
use crate::routines::output::{EvaluationLog, Optimum};
use crate::routines::rounding::round2tol;
use crate::routines::scaling::{ScaleBy, Scaling};
use crate::routines::settings::Settings;

use eyre::{Result, WrapErr};
use ndarray::Array1;

/// Primary entrypoint, running one closed-loop optimisation
///
/// Every evaluation sets the parameters on the `instrument`, acquires a dataset, and scores it with
/// `cost`. The `callback`, if given, receives all parameter values before each acquisition; it is
/// required when user parameters (names containing `&`) are optimised.
///
/// Configuration problems are reported before the first acquisition. Running out of budget is not
/// an error: the best point found so far is returned, with the reason in [Optimum::message].
pub fn optimize<I, C>(
    instrument: &mut I,
    settings: &Settings,
    cost: &C,
    callback: Option<&mut Callback<'_>>,
) -> Result<Optimum>
where
    I: Instrument,
    C: CostFunction<I::Data>,
{
    let tic = Instant::now();
    logger::setup_log(settings)?;

    settings.validate()?;
    let config = settings.config();
    let parameters = settings.parameters();
    let names = parameters.names();

    let routing = Routing::new(parameters, settings.files(), callback.is_some())?;
    let optimiser = dispatch_algorithm(
        config.algorithm,
        SearchOptions {
            maxfev: config.maxfev,
            maxiter: config.maxiter,
            nfactor: config.nfactor,
            simplex: config.simplex,
            seed: config.seed,
        },
    )?;
    let scaling = Scaling::new(
        parameters.lower(),
        parameters.upper(),
        parameters.tol(),
        ScaleBy::Tolerances,
    )?;
    let scaled = scaling.scale(&parameters.init())?;
    let problem = Problem::from_scaled(&scaled)?;

    log_header(settings);

    let mut acquisition = Acquisition::new(
        instrument,
        cost,
        &routing,
        &scaling,
        config.algorithm.rejects_out_of_bounds(),
    )
    .with_callback(callback);
    if settings.output().write {
        let log = EvaluationLog::new(&settings.output().path, &names)?;
        acquisition = acquisition.with_log(log);
    }

    // A fresh counter for every run
    let mut cf = Counted::new(acquisition);
    let result = optimiser.minimize(&mut cf, &problem)?;
    let nfev = cf.calls();
    cf.into_inner().finish()?;

    let best_values = scaling.unscale(result.xbest());
    let tol = parameters.tol().to_vec();

    tracing::info!("{}", "-".repeat(40));
    tracing::info!(
        "{:27} - {:?}",
        "Best values found",
        round2tol(&best_values.to_vec(), &tol)
    );
    tracing::info!("{:27} - {}", "Cost function at minimum", result.fbest());
    tracing::info!("{:27} - {}", "Number of experiments ran", nfev);
    tracing::info!("{:27} - {}", "Total time taken", logger::hms(tic.elapsed()));
    tracing::info!("{:27} - {}", "Optimisation message", result.message());
    tracing::info!("{}", "=".repeat(60));

    if settings.output().write {
        result
            .write(&settings.output().path)
            .wrap_err("Could not write the optimisation result")?;
    }

    Ok(Optimum {
        best_values,
        fbest: result.fbest(),
        message: result.message().to_string(),
        nfev,
        result,
    })
}

/// Apply a parameter set, e.g. the optimum, and acquire once more
pub fn run_optimized<I>(
    instrument: &mut I,
    settings: &Settings,
    values: &Array1<f64>,
    callback: Option<&mut Callback<'_>>,
) -> Result<I::Data>
where
    I: Instrument,
{
    let parameters = settings.parameters();
    if values.len() != parameters.len() {
        eyre::bail!(
            "Expected {} values, one per parameter, got {}",
            parameters.len(),
            values.len()
        );
    }
    let routing = Routing::new(parameters, settings.files(), callback.is_some())?;
    routing.apply(&mut *instrument, values, callback)?;
    instrument
        .acquire()
        .wrap_err("Acquisition with the optimised parameters failed")
}

fn log_header(settings: &Settings) {
    let parameters = settings.parameters();
    let names = parameters.names();

    tracing::info!("{}", "=".repeat(60));
    tracing::info!("{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    tracing::info!("{:25} - {:?}", "Optimisation parameters", names);
    tracing::info!("{:25} - {}", "Initial values", parameters.init());
    tracing::info!("{:25} - {}", "Lower bounds", parameters.lower());
    tracing::info!("{:25} - {}", "Upper bounds", parameters.upper());
    tracing::info!("{:25} - {}", "Tolerances", parameters.tol());
    tracing::info!(
        "{:25} - {}",
        "Optimisation algorithm",
        settings.config().algorithm
    );

    let columns: String = names
        .iter()
        .chain(std::iter::once(&"cf".to_string()))
        .map(|name| format!("{:^10}  ", name))
        .collect();
    tracing::info!("{}", columns.trim_end());
    tracing::info!("{}", "-".repeat(12 * (names.len() + 1)));
}

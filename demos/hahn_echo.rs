//! Optimise a simulated Hahn echo
//!
//! The "spectrometer" returns a noisy echo whose height peaks at 24 dB attenuation, a 22 ns
//! pulse and a pulse shape factor of 0.8. Run with `cargo run --example hahn_echo`.

use std::cell::Cell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use acqopt::prelude::*;
use acqopt::routines::settings::read;
use eyre::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct SimulatedSpectrometer {
    values: HashMap<String, f64>,
    /// Set by the arbitrary waveform generator, outside of the spectrometer
    shape: Rc<Cell<f64>>,
    rng: StdRng,
}

impl SimulatedSpectrometer {
    fn new(shape: Rc<Cell<f64>>) -> Self {
        SimulatedSpectrometer {
            values: HashMap::new(),
            shape,
            rng: StdRng::seed_from_u64(22),
        }
    }

    fn echo_height(&self) -> f64 {
        let attenuation = self.values.get("Attenuation").copied().unwrap_or(0.0);
        let p1 = self.values.get("p1").copied().unwrap_or(0.0);
        let mismatch = ((attenuation - 24.0) / 6.0).powi(2)
            + ((p1 - 22.0) / 8.0).powi(2)
            + ((self.shape.get() - 0.8) / 0.3).powi(2);
        (-mismatch).exp()
    }
}

impl Instrument for SimulatedSpectrometer {
    type Data = Vec<f64>;

    fn set_native(&mut self, group: &str, key: &str, value: &str) -> Result<()> {
        tracing::debug!("{}/{} = {}", group, key, value);
        let name = key.rsplit('.').next().unwrap_or(key);
        self.values.insert(name.to_string(), value.parse()?);
        Ok(())
    }

    fn modify_definitions(
        &mut self,
        _definition: &Path,
        names: &[String],
        values: &[String],
    ) -> Result<()> {
        for (name, value) in names.iter().zip(values) {
            self.values.insert(name.clone(), value.parse()?);
        }
        Ok(())
    }

    fn load_experiment(&mut self, experiment: &Path) -> Result<()> {
        tracing::debug!("Reloading {}", experiment.display());
        Ok(())
    }

    fn acquire(&mut self) -> Result<Vec<f64>> {
        let height = self.echo_height();
        let trace = (0..128)
            .map(|i| {
                let t = (i as f64 - 64.0) / 8.0;
                height * (-t * t).exp() + 0.01 * (self.rng.random::<f64>() - 0.5)
            })
            .collect();
        Ok(trace)
    }
}

/// Negative echo height, so that the strongest echo scores lowest
fn cost(trace: &Vec<f64>) -> f64 {
    -trace.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
}

fn main() -> Result<()> {
    let settings = read("demos/hahn_echo.toml")?;

    let shape = Rc::new(Cell::new(0.5));
    let mut spectrometer = SimulatedSpectrometer::new(Rc::clone(&shape));
    let mut set_shape = |pairs: &[(String, f64)]| -> Result<()> {
        if let Some((_, value)) = pairs.iter().find(|(name, _)| name == "&shape") {
            shape.set(*value);
        }
        Ok(())
    };

    let callback: &mut Callback = &mut set_shape;
    let optimum = optimize(&mut spectrometer, &settings, &cost, Some(callback))?;

    let callback: &mut Callback = &mut set_shape;
    let trace = run_optimized(&mut spectrometer, &settings, &optimum.best_values, Some(callback))?;
    println!("Best values: {}", optimum.best_values);
    println!("Echo height at optimum: {:.3}", -cost(&trace));
    Ok(())
}

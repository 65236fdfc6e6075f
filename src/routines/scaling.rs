use std::fmt;
use std::str::FromStr;

use eyre::{bail, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Size every tolerance is mapped to when scaling by tolerances.
///
/// The value itself is arbitrary; what matters is that all dimensions share it,
/// so a step of a given length means the same thing along every axis.
pub const MAGIC_TOL: f64 = 0.03;

/// Coordinate system used inside the optimisers
///
/// - `Bounds`: every lower bound maps to 0 and every upper bound to 1
/// - `Tolerances`: every tolerance maps to [MAGIC_TOL], lower bounds map to 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScaleBy {
    #[serde(rename = "bounds")]
    Bounds,
    #[default]
    #[serde(rename = "tols")]
    Tolerances,
}

impl FromStr for ScaleBy {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bounds" => Ok(ScaleBy::Bounds),
            "tols" => Ok(ScaleBy::Tolerances),
            other => bail!("Invalid argument scaleby={} given.", other),
        }
    }
}

impl fmt::Display for ScaleBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleBy::Bounds => write!(f, "bounds"),
            ScaleBy::Tolerances => write!(f, "tols"),
        }
    }
}

/// Values, bounds and tolerances expressed in the scaled coordinate system
#[derive(Debug, Clone, PartialEq)]
pub struct Scaled {
    pub values: Array1<f64>,
    pub lower: Array1<f64>,
    pub upper: Array1<f64>,
    pub tol: Array1<f64>,
}

/// Scale a set of values (and their bounds and tolerances)
///
/// Fails if the vectors have different lengths, or if any value lies outside of `[lower, upper]`.
pub fn scale(
    values: &Array1<f64>,
    lower: &Array1<f64>,
    upper: &Array1<f64>,
    tol: &Array1<f64>,
    by: ScaleBy,
) -> Result<Scaled> {
    check_lengths(values.len(), lower, upper, tol)?;
    for (i, ((v, lb), ub)) in values.iter().zip(lower).zip(upper).enumerate() {
        if v < lb || v > ub {
            bail!(
                "scale(): value {} of dimension {} is out of bounds [{}, {}]",
                v,
                i,
                lb,
                ub
            );
        }
    }

    let scaled = match by {
        ScaleBy::Bounds => {
            let extent = upper - lower;
            Scaled {
                values: (values - lower) / &extent,
                lower: Array1::zeros(values.len()),
                upper: Array1::ones(values.len()),
                tol: tol / &extent,
            }
        }
        ScaleBy::Tolerances => Scaled {
            values: (values - lower) * MAGIC_TOL / tol,
            lower: Array1::zeros(values.len()),
            upper: (upper - lower) * MAGIC_TOL / tol,
            tol: Array1::from_elem(values.len(), MAGIC_TOL),
        },
    };
    Ok(scaled)
}

/// Map scaled values back into physical units. Exact inverse of [scale].
pub fn unscale(
    scaled: &Array1<f64>,
    lower: &Array1<f64>,
    upper: &Array1<f64>,
    tol: &Array1<f64>,
    by: ScaleBy,
) -> Array1<f64> {
    match by {
        ScaleBy::Bounds => lower + &(scaled * &(upper - lower)),
        ScaleBy::Tolerances => (scaled * tol / MAGIC_TOL) + lower,
    }
}

/// The physical description of a search space, able to translate points in both directions
#[derive(Debug, Clone, PartialEq)]
pub struct Scaling {
    lower: Array1<f64>,
    upper: Array1<f64>,
    tol: Array1<f64>,
    by: ScaleBy,
}

impl Scaling {
    pub fn new(
        lower: Array1<f64>,
        upper: Array1<f64>,
        tol: Array1<f64>,
        by: ScaleBy,
    ) -> Result<Self> {
        check_lengths(lower.len(), &lower, &upper, &tol)?;
        Ok(Scaling {
            lower,
            upper,
            tol,
            by,
        })
    }

    pub fn scale(&self, values: &Array1<f64>) -> Result<Scaled> {
        scale(values, &self.lower, &self.upper, &self.tol, self.by)
    }

    pub fn unscale(&self, scaled: &Array1<f64>) -> Array1<f64> {
        unscale(scaled, &self.lower, &self.upper, &self.tol, self.by)
    }

    /// True if every component of the physical point lies within its bounds
    pub fn contains(&self, values: &Array1<f64>) -> bool {
        values
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .all(|(v, (lb, ub))| v >= lb && v <= ub)
    }

    pub fn lower(&self) -> &Array1<f64> {
        &self.lower
    }

    pub fn upper(&self) -> &Array1<f64> {
        &self.upper
    }

    pub fn tol(&self) -> &Array1<f64> {
        &self.tol
    }
}

fn check_lengths(
    n: usize,
    lower: &Array1<f64>,
    upper: &Array1<f64>,
    tol: &Array1<f64>,
) -> Result<()> {
    if lower.len() != n || upper.len() != n || tol.len() != n {
        bail!(
            "Incompatible lengths: {} values, {} lower bounds, {} upper bounds, {} tolerances",
            n,
            lower.len(),
            upper.len(),
            tol.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_close(a: &Array1<f64>, b: &Array1<f64>) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() <= 1e-9 * (1.0 + y.abs()), "{} != {}", x, y);
        }
    }

    #[test]
    fn tolerances_become_magic_tol() {
        let val = array![12.0, 180.0, 3350.0];
        let lb = array![2.0, 0.0, 3300.0];
        let ub = array![40.0, 360.0, 3400.0];
        let tol = array![2.0, 5.0, 0.5];

        let scaled = scale(&val, &lb, &ub, &tol, ScaleBy::Tolerances).unwrap();

        assert_close(&scaled.tol, &array![MAGIC_TOL, MAGIC_TOL, MAGIC_TOL]);
        assert_close(&scaled.lower, &array![0.0, 0.0, 0.0]);
        assert_close(&scaled.values, &array![0.15, 1.08, 3.0]);
        assert_close(&scaled.upper, &array![0.57, 2.16, 6.0]);
    }

    #[test]
    fn bounds_become_unit_interval() {
        let val = array![1.0, 5.0];
        let lb = array![0.0, 0.0];
        let ub = array![4.0, 10.0];
        let tol = array![0.5, 1.0];

        let scaled = scale(&val, &lb, &ub, &tol, ScaleBy::Bounds).unwrap();

        assert_close(&scaled.values, &array![0.25, 0.5]);
        assert_close(&scaled.upper, &array![1.0, 1.0]);
        assert_close(&scaled.tol, &array![0.125, 0.1]);
    }

    #[test]
    fn round_trip_both_modes() {
        let lb = array![-10.0, 0.0, 3300.0, 1e-3];
        let ub = array![10.0, 360.0, 3400.0, 2e-3];
        let tol = array![0.1, 2.0, 0.05, 1e-5];
        let samples = [
            array![-10.0, 0.0, 3300.0, 1e-3],
            array![10.0, 360.0, 3400.0, 2e-3],
            array![0.123, 97.5, 3351.37, 1.5e-3],
        ];
        for by in [ScaleBy::Bounds, ScaleBy::Tolerances] {
            for val in &samples {
                let scaled = scale(val, &lb, &ub, &tol, by).unwrap();
                let back = unscale(&scaled.values, &lb, &ub, &tol, by);
                assert_close(&back, val);
            }
        }
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let err = scale(
            &array![11.0],
            &array![0.0],
            &array![10.0],
            &array![1.0],
            ScaleBy::Tolerances,
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of bounds"));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let res = scale(
            &array![1.0, 2.0],
            &array![0.0],
            &array![10.0, 10.0],
            &array![1.0, 1.0],
            ScaleBy::Bounds,
        );
        assert!(res.is_err());
    }

    #[test]
    fn parse_scale_mode() {
        assert_eq!("tols".parse::<ScaleBy>().unwrap(), ScaleBy::Tolerances);
        assert_eq!("bounds".parse::<ScaleBy>().unwrap(), ScaleBy::Bounds);
        let err = "range".parse::<ScaleBy>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid argument scaleby=range given.");
    }

    #[test]
    fn scaling_contains() {
        let scaling = Scaling::new(
            array![0.0, 0.0],
            array![1.0, 2.0],
            array![0.1, 0.1],
            ScaleBy::Tolerances,
        )
        .unwrap();
        assert!(scaling.contains(&array![0.5, 2.0]));
        assert!(!scaling.contains(&array![0.5, 2.1]));
        assert!(!scaling.contains(&array![-1e-9, 1.0]));
    }
}

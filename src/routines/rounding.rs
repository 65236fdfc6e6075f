/// Round values to the nearest multiple of their tolerance, formatted for display and for the instrument.
///
/// Integral tolerances give integer strings. Otherwise the number of decimals is that of the tolerance
/// itself, so a tolerance of `0.005` always prints three decimals.
pub fn round2tol(values: &[f64], tols: &[f64]) -> Vec<String> {
    values
        .iter()
        .zip(tols.iter())
        .map(|(&value, &tol)| round_one(value, tol))
        .collect()
}

fn round_one(value: f64, tol: f64) -> String {
    let rounded = tol * (value / tol).round_ties_even();
    if tol.fract() == 0.0 {
        format!("{:.0}", rounded)
    } else {
        format!("{:.*}", decimals(tol), rounded)
    }
}

// Digits after the decimal point in the shortest representation of `tol`
fn decimals(tol: f64) -> usize {
    let repr = tol.to_string();
    match repr.split_once('.') {
        Some((_, digits)) => digits.len(),
        None => 0,
    }
}

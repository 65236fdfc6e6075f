use std::fmt;
use std::str::FromStr;

use eyre::{bail, Result};
use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Strategy used to build the initial simplex around `x0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimplexMethod {
    /// Regular simplex of Spendley, Hext and Himsworth (1962), all edges of equal length
    #[default]
    Spendley,
    /// `x0` extended by a fixed length along each axis in turn
    Axis,
    /// Every vertex except `x0` drawn uniformly from `[0, 1)^N`
    Random,
}

impl FromStr for SimplexMethod {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "spendley" => Ok(SimplexMethod::Spendley),
            "axis" => Ok(SimplexMethod::Axis),
            "random" => Ok(SimplexMethod::Random),
            _ => bail!("invalid simplex generation method '{}' specified", s),
        }
    }
}

impl fmt::Display for SimplexMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimplexMethod::Spendley => write!(f, "spendley"),
            SimplexMethod::Axis => write!(f, "axis"),
            SimplexMethod::Random => write!(f, "random"),
        }
    }
}

/// A simplex of `N + 1` points in `N` dimensions, together with their scores
///
/// Row `i` of [Simplex::x] is a vertex, and `f[i]` its score. Scores start at `+inf` until evaluated.
/// After [Simplex::sort], row 0 holds the best vertex and row `N` the worst.
#[derive(Debug, Clone, PartialEq)]
pub struct Simplex {
    x: Array2<f64>,
    f: Array1<f64>,
    n: usize,
}

impl Simplex {
    /// Build the initial simplex around `x0`
    ///
    /// # Arguments
    ///
    /// * `x0` - The apex of the simplex, always stored as vertex 0
    /// * `method` - How the remaining `N` vertices are generated
    /// * `length` - Size of the simplex, ignored by [SimplexMethod::Random]
    /// * `seed` - Seed for [SimplexMethod::Random]. If `None`, the generator is seeded from the OS
    pub fn new(x0: &Array1<f64>, method: SimplexMethod, length: f64, seed: Option<u64>) -> Self {
        let n = x0.len();
        let mut x = Array2::zeros((n + 1, n));
        x.row_mut(0).assign(x0);

        match method {
            SimplexMethod::Spendley => {
                let nf = n as f64;
                let p = (nf - 1.0 + (nf + 1.0).sqrt()) / (nf * 2f64.sqrt());
                let q = ((nf + 1.0).sqrt() - 1.0) / (nf * 2f64.sqrt());
                for i in 1..=n {
                    for j in 0..n {
                        let offset = if j == i - 1 { p } else { q };
                        x[[i, j]] = x0[j] + length * offset;
                    }
                }
            }
            SimplexMethod::Axis => {
                for i in 1..=n {
                    x.row_mut(i).assign(x0);
                    x[[i, i - 1]] += length;
                }
            }
            SimplexMethod::Random => {
                let mut rng = match seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_os_rng(),
                };
                for i in 1..=n {
                    for j in 0..n {
                        x[[i, j]] = rng.random::<f64>();
                    }
                }
            }
        }

        Simplex {
            x,
            f: Array1::from_elem(n + 1, f64::INFINITY),
            n,
        }
    }

    /// Number of dimensions, `N`
    pub fn dim(&self) -> usize {
        self.n
    }

    /// The vertices, one per row
    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    /// The scores, co-indexed with the rows of [Simplex::x]
    pub fn f(&self) -> &Array1<f64> {
        &self.f
    }

    pub fn point(&self, i: usize) -> ArrayView1<'_, f64> {
        self.x.row(i)
    }

    pub fn score(&self, i: usize) -> f64 {
        self.f[i]
    }

    /// Overwrite vertex `i` and its score
    pub fn set(&mut self, i: usize, x: &Array1<f64>, f: f64) {
        self.x.row_mut(i).assign(x);
        self.f[i] = f;
    }

    pub fn set_score(&mut self, i: usize, f: f64) {
        self.f[i] = f;
    }

    /// Sort vertices by ascending score. The sort is stable, so ties keep their relative order.
    pub fn sort(&mut self) {
        let mut indices: Vec<usize> = (0..=self.n).collect();
        indices.sort_by(|&a, &b| self.f[a].total_cmp(&self.f[b]));
        self.x = self.x.select(Axis(0), &indices);
        self.f = self.f.select(Axis(0), &indices);
    }

    /// Centroid of the best `N` vertices. Assumes the simplex is sorted.
    pub fn xbar(&self) -> Array1<f64> {
        self.x
            .slice(s![0..self.n, ..])
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.n))
    }

    /// The worst vertex. Assumes the simplex is sorted.
    pub fn xworst(&self) -> ArrayView1<'_, f64> {
        self.x.row(self.n)
    }

    /// Sort, then overwrite the worst vertex with `xnew` and its score `fnew`
    pub fn replace_worst(&mut self, xnew: &Array1<f64>, fnew: f64) {
        self.sort();
        let n = self.n;
        self.set(n, xnew, fnew);
    }

    /// Move every vertex but the first halfway towards the first one.
    ///
    /// Scores are left untouched and must be re-evaluated by the caller.
    pub fn shrink(&mut self) {
        let best = self.x.row(0).to_owned();
        for i in 1..=self.n {
            let moved = &best + &((&self.x.row(i) - &best) / 2.0);
            self.x.row_mut(i).assign(&moved);
        }
    }

    /// Range (max - min) of the vertices along each dimension
    pub fn ranges(&self) -> Array1<f64> {
        self.x
            .axis_iter(Axis(1))
            .map(|col| {
                let max = col.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let min = col.iter().cloned().fold(f64::INFINITY, f64::min);
                max - min
            })
            .collect()
    }

    /// Converged when, in every dimension, the range of the simplex is at most `xtol`
    pub fn converged(&self, xtol: &Array1<f64>) -> bool {
        self.ranges()
            .iter()
            .zip(xtol.iter())
            .all(|(range, tol)| range <= tol)
    }

    /// Consume the simplex, returning the vertices and their scores
    pub fn into_parts(self) -> (Array2<f64>, Array1<f64>) {
        (self.x, self.f)
    }
}

//! Field container: grid, component planes, transform, worker pool.
//!
//! A `Field` owns everything one synthesized vector field needs: the grid
//! geometry, `components` real planes, the spectral transform with its
//! scratch buffers, and a dedicated rayon pool sized at construction. No
//! global state is touched; two fields in one process never share workers.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::error::FieldError;
use crate::grid::Grid;
use crate::scalar::Real;
use crate::transform::SpectralTransform;

/// Elements per partial sum in deterministic reductions.
const SUM_CHUNK: usize = 1 << 14;

fn default_l_box() -> f64 {
    1.0
}

fn default_components() -> usize {
    3
}

/// Construction-time parameters of a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    pub dimension: usize,
    pub size: usize,
    /// Physical box length; grid spacing is `l_box / size`.
    #[serde(default = "default_l_box")]
    pub l_box: f64,
    /// Number of vector components (3 for the cascade fields).
    #[serde(default = "default_components")]
    pub components: usize,
    /// Worker threads for this field; `None` uses all cores.
    #[serde(default)]
    pub threads: Option<usize>,
    /// Base seed for variate fills; `None` draws from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl FieldConfig {
    pub fn new(dimension: usize, size: usize) -> Self {
        Self {
            dimension,
            size,
            l_box: default_l_box(),
            components: default_components(),
            threads: None,
            seed: None,
        }
    }
}

pub struct Field<T: Real> {
    pub(crate) name: String,
    pub(crate) config: FieldConfig,
    pub(crate) transform: SpectralTransform<T>,
    pub(crate) pool: ThreadPool,
    /// Real component planes, each of length n^d.
    pub(crate) res: Vec<Vec<T>>,
}

impl<T: Real> Field<T> {
    pub fn new(name: impl Into<String>, config: FieldConfig) -> Result<Self, FieldError> {
        let grid = Grid::new(config.dimension, config.size, config.l_box)?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.threads.unwrap_or(0))
            .build()
            .map_err(|e| FieldError::ThreadPool(e.to_string()))?;
        let res = vec![vec![T::zero(); grid.real_len()]; config.components];
        Ok(Self {
            name: name.into(),
            config,
            transform: SpectralTransform::new(grid),
            pool,
            res,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        self.transform.grid()
    }

    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    pub fn components(&self) -> usize {
        self.config.components
    }

    /// Component planes of the synthesized field.
    pub fn res(&self) -> &[Vec<T>] {
        &self.res
    }

    pub fn res_mut(&mut self) -> &mut [Vec<T>] {
        &mut self.res
    }

    pub fn transform(&self) -> &SpectralTransform<T> {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut SpectralTransform<T> {
        &mut self.transform
    }

    pub(crate) fn zero_res(&mut self) {
        let pool = &self.pool;
        for plane in self.res.iter_mut() {
            pool.install(|| plane.par_iter_mut().for_each(|v| *v = T::zero()));
        }
    }

    /// Root-mean-square over all points and components.
    pub fn rms(&self) -> f64 {
        let mut total = 0.0;
        for plane in &self.res {
            total += chunked_sum(plane, &self.pool, |v| v * v);
        }
        let count = (self.res.len() * self.grid().real_len()) as f64;
        (total / count).sqrt()
    }

    /// Scale every component so the global RMS becomes exactly 1.
    pub fn normalize(&mut self) {
        let rms = self.rms();
        let inv = T::from_float(rms.recip());
        let pool = &self.pool;
        for plane in self.res.iter_mut() {
            pool.install(|| plane.par_iter_mut().for_each(|v| *v = *v * inv));
        }
    }

}

/// Deterministic parallel reduction: fixed-size chunk partials summed in
/// order, so the result does not depend on the thread count.
pub(crate) fn chunked_sum<T, F>(buf: &[T], pool: &ThreadPool, term: F) -> f64
where
    T: Real,
    F: Fn(f64) -> f64 + Sync,
{
    let partials: Vec<f64> = pool.install(|| {
        buf.par_chunks(SUM_CHUNK)
            .map(|chunk| chunk.iter().map(|v| term(v.into_float())).sum::<f64>())
            .collect()
    });
    partials.iter().sum()
}

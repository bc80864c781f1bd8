//! Real-to-half-spectrum transform built on rustfft.
//!
//! The forward transform runs a real-to-complex pass along the contiguous
//! last axis (keeping the n/2+1 non-redundant bins) followed by
//! complex-to-complex passes along the leading axes. The backward transform
//! undoes the leading axes first, reconstructs each last-axis line from its
//! Hermitian half, inverse-transforms it and writes the real part scaled by
//! 1/n^d. Forward is unnormalized, matching the usual FFT convention.
//!
//! The transform owns one real scratch buffer and one complex half-spectrum
//! scratch buffer. Their contents are valid only until the next transform
//! call; access goes through the accessors so nothing else can alias them.

use std::sync::Arc;

use num_complex::Complex;
use rayon::prelude::*;
use rayon::ThreadPool;
use rustfft::{Fft, FftPlanner};

use crate::grid::Grid;
use crate::scalar::Real;

pub struct SpectralTransform<T: Real> {
    grid: Grid,
    fwd: Arc<dyn Fft<T>>,
    inv: Arc<dyn Fft<T>>,
    real: Vec<T>,
    spec: Vec<Complex<T>>,
    /// Lane workspace for leading-axis passes (empty in 1-D).
    lanes: Vec<Complex<T>>,
}

enum Direction {
    Forward,
    Backward,
}

impl<T: Real> SpectralTransform<T> {
    pub fn new(grid: Grid) -> Self {
        let mut planner = FftPlanner::new();
        let fwd = planner.plan_fft_forward(grid.size());
        let inv = planner.plan_fft_inverse(grid.size());
        let real = vec![T::zero(); grid.real_len()];
        let spec = vec![Complex::new(T::zero(), T::zero()); grid.spec_len()];
        let lanes = if grid.dimension() > 1 {
            vec![Complex::new(T::zero(), T::zero()); grid.spec_len()]
        } else {
            Vec::new()
        };
        Self {
            grid,
            fwd,
            inv,
            real,
            spec,
            lanes,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Real scratch buffer. Valid until the next transform call.
    pub fn real(&self) -> &[T] {
        &self.real
    }

    pub fn real_mut(&mut self) -> &mut [T] {
        &mut self.real
    }

    /// Complex half-spectrum scratch buffer. Valid until the next transform call.
    pub fn spec(&self) -> &[Complex<T>] {
        &self.spec
    }

    pub fn spec_mut(&mut self) -> &mut [Complex<T>] {
        &mut self.spec
    }

    /// Real buffer -> half-spectrum buffer, unnormalized.
    pub fn forward(&mut self, pool: &ThreadPool) {
        let n = self.grid.size();
        let m = self.grid.spec_last();
        let fwd = Arc::clone(&self.fwd);
        let real = &self.real;
        let spec = &mut self.spec;
        pool.install(|| {
            spec.par_chunks_mut(m).enumerate().for_each_init(
                || {
                    (
                        vec![Complex::new(T::zero(), T::zero()); n],
                        vec![Complex::new(T::zero(), T::zero()); fwd.get_inplace_scratch_len()],
                    )
                },
                |(line, scratch), (li, out)| {
                    let base = li * n;
                    for (t, c) in line.iter_mut().enumerate() {
                        *c = Complex::new(real[base + t], T::zero());
                    }
                    fwd.process_with_scratch(line, scratch);
                    out.copy_from_slice(&line[..m]);
                },
            );
        });
        for axis in 0..self.grid.dimension() - 1 {
            self.transform_axis(axis, Direction::Forward, pool);
        }
    }

    /// Half-spectrum buffer -> real buffer, scaled by 1/n^d.
    ///
    /// The leading axes are inverted before the last axis so that each
    /// last-axis line is Hermitian when its redundant half is rebuilt.
    pub fn backward(&mut self, pool: &ThreadPool) {
        for axis in (0..self.grid.dimension() - 1).rev() {
            self.transform_axis(axis, Direction::Backward, pool);
        }
        let n = self.grid.size();
        let m = self.grid.spec_last();
        let norm = T::from_float((n as f64).powi(self.grid.dimension() as i32).recip());
        let inv = Arc::clone(&self.inv);
        let spec = &self.spec;
        let real = &mut self.real;
        pool.install(|| {
            real.par_chunks_mut(n).enumerate().for_each_init(
                || {
                    (
                        vec![Complex::new(T::zero(), T::zero()); n],
                        vec![Complex::new(T::zero(), T::zero()); inv.get_inplace_scratch_len()],
                    )
                },
                |(line, scratch), (li, out)| {
                    let base = li * m;
                    line[..m].copy_from_slice(&spec[base..base + m]);
                    for l in m..n {
                        line[l] = spec[base + (n - l)].conj();
                    }
                    inv.process_with_scratch(line, scratch);
                    for (t, v) in out.iter_mut().enumerate() {
                        *v = line[t].re * norm;
                    }
                },
            );
        });
    }

    /// One complex pass along a leading axis of the half spectrum:
    /// gather lanes into the contiguous workspace, transform, scatter back.
    fn transform_axis(&mut self, axis: usize, direction: Direction, pool: &ThreadPool) {
        let n = self.grid.size();
        let stride = self.grid.spec_stride(axis);
        let outer_stride = stride * n;
        let plan = match direction {
            Direction::Forward => Arc::clone(&self.fwd),
            Direction::Backward => Arc::clone(&self.inv),
        };
        let spec = &mut self.spec;
        let lanes = &mut self.lanes;
        pool.install(|| {
            lanes.par_chunks_mut(n).enumerate().for_each_init(
                || vec![Complex::new(T::zero(), T::zero()); plan.get_inplace_scratch_len()],
                |scratch, (li, lane)| {
                    let base = (li / stride) * outer_stride + li % stride;
                    for (t, c) in lane.iter_mut().enumerate() {
                        *c = spec[base + t * stride];
                    }
                    plan.process_with_scratch(lane, scratch);
                },
            );
            spec.par_chunks_mut(outer_stride)
                .enumerate()
                .for_each(|(ob, block)| {
                    for rem in 0..stride {
                        let lane = &lanes[(ob * stride + rem) * n..];
                        for t in 0..n {
                            block[rem + t * stride] = lane[t];
                        }
                    }
                });
        });
    }
}

/// Multiply every half-spectrum entry by a real-valued kernel of k².
///
/// Wavenumbers are in box units (integer cycles); `kernel` runs in f64.
pub fn apply_spectral_kernel<T, F>(
    grid: &Grid,
    spec: &mut [Complex<T>],
    pool: &ThreadPool,
    kernel: F,
) where
    T: Real,
    F: Fn(f64) -> f64 + Sync,
{
    let m = grid.spec_last();
    let k_last = grid.wavenumber(grid.dimension() - 1);
    pool.install(|| {
        spec.par_chunks_mut(m).enumerate().for_each(|(li, line)| {
            let prefix = grid.line_k2_prefix(li);
            for (l, c) in line.iter_mut().enumerate() {
                let k2 = prefix + k_last[l] * k_last[l];
                let factor = T::from_float(kernel(k2));
                *c = *c * factor;
            }
        });
    });
}

/// `dst += src * kernel(k²)`, the accumulation step of the wavelet cascade.
pub fn accumulate_with_kernel<T, F>(
    grid: &Grid,
    src: &[Complex<T>],
    dst: &mut [Complex<T>],
    pool: &ThreadPool,
    kernel: F,
) where
    T: Real,
    F: Fn(f64) -> f64 + Sync,
{
    let m = grid.spec_last();
    let k_last = grid.wavenumber(grid.dimension() - 1);
    pool.install(|| {
        dst.par_chunks_mut(m)
            .zip(src.par_chunks(m))
            .enumerate()
            .for_each(|(li, (out, inp))| {
                let prefix = grid.line_k2_prefix(li);
                for (l, (o, i)) in out.iter_mut().zip(inp.iter()).enumerate() {
                    let k2 = prefix + k_last[l] * k_last[l];
                    let factor = T::from_float(kernel(k2));
                    *o = *o + *i * factor;
                }
            });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;

    fn pool() -> ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap()
    }

    fn roundtrip(dimension: usize, size: usize) -> Result<f64, FieldError> {
        let grid = Grid::new(dimension, size, 1.0)?;
        let mut tr = SpectralTransform::<f64>::new(grid);
        let pool = pool();
        let len = tr.grid().real_len();
        let original: Vec<f64> = (0..len)
            .map(|i| ((i * 2654435761) % 1000) as f64 / 1000.0 - 0.5)
            .collect();
        tr.real_mut().copy_from_slice(&original);
        tr.forward(&pool);
        tr.backward(&pool);
        let max_err = tr
            .real()
            .iter()
            .zip(original.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f64, f64::max);
        Ok(max_err)
    }

    #[test]
    fn roundtrip_is_identity_in_1d_2d_3d() {
        assert!(roundtrip(1, 16).unwrap() < 1e-12);
        assert!(roundtrip(2, 8).unwrap() < 1e-12);
        assert!(roundtrip(3, 8).unwrap() < 1e-12);
    }

    #[test]
    fn forward_dc_bin_is_the_plain_sum() {
        let grid = Grid::new(2, 4, 1.0).unwrap();
        let mut tr = SpectralTransform::<f64>::new(grid);
        let pool = pool();
        for (i, v) in tr.real_mut().iter_mut().enumerate() {
            *v = (i % 7) as f64;
        }
        let sum: f64 = tr.real().iter().sum();
        tr.forward(&pool);
        assert!((tr.spec()[0].re - sum).abs() < 1e-12);
        assert!(tr.spec()[0].im.abs() < 1e-12);
    }

    #[test]
    fn single_mode_produces_a_plane_wave() {
        // Setting one k=1 bin along the last axis and inverting must give
        // a cosine along that axis, constant along the others.
        let grid = Grid::new(2, 8, 1.0).unwrap();
        let n = grid.size();
        let mut tr = SpectralTransform::<f64>::new(grid);
        let pool = pool();
        tr.spec_mut().iter_mut().for_each(|c| *c = Complex::new(0.0, 0.0));
        // k = (0, 1), amplitude chosen so the cosine has unit amplitude
        // after the 1/n^d backward scaling and Hermitian doubling.
        tr.spec_mut()[1] = Complex::new((n * n) as f64 / 2.0, 0.0);
        tr.backward(&pool);
        for i in 0..n {
            for j in 0..n {
                let expect = (2.0 * std::f64::consts::PI * j as f64 / n as f64).cos();
                let got = tr.real()[i * n + j];
                assert!(
                    (got - expect).abs() < 1e-12,
                    "plane wave mismatch at ({i}, {j}): {got} vs {expect}"
                );
            }
        }
    }

    #[test]
    fn kernel_application_scales_each_shell() {
        let grid = Grid::new(1, 8, 1.0).unwrap();
        let mut tr = SpectralTransform::<f64>::new(grid);
        let pool = pool();
        tr.spec_mut()
            .iter_mut()
            .for_each(|c| *c = Complex::new(1.0, 0.0));
        let grid = tr.grid().clone();
        apply_spectral_kernel(&grid, tr.spec_mut(), &pool, |k2| k2);
        // Bins are k = 0, 1, 2, 3, 4 -> k² = 0, 1, 4, 9, 16.
        let expect = [0.0, 1.0, 4.0, 9.0, 16.0];
        for (c, e) in tr.spec().iter().zip(expect.iter()) {
            assert!((c.re - e).abs() < 1e-15);
        }
    }
}

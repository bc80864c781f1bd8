//! Spectral and geometric diagnostics of a synthesized field.

use rayon::prelude::*;

use crate::diffops;
use crate::field::Field;
use crate::grid::Grid;
use crate::scalar::Real;

/// Geometric wavenumber bin edges and centers.
///
/// Edges are the unique integer truncations of a geometric progression
/// from `lo` (default 1) to `hi` (default n/2) with `num` points
/// (default n/4); centers are the midpoints.
pub fn kbins(
    grid: &Grid,
    lo: Option<f64>,
    hi: Option<f64>,
    num: Option<usize>,
    prepend_zero: bool,
) -> (Vec<f64>, Vec<f64>) {
    let lo = lo.unwrap_or(1.0);
    let hi = hi.unwrap_or((grid.size() / 2) as f64);
    let num = num.unwrap_or(grid.size() / 4).max(2);
    let ratio = hi / lo;
    let mut edges: Vec<f64> = (0..num)
        .map(|i| (lo * ratio.powf(i as f64 / (num - 1) as f64)).trunc())
        .collect();
    edges.dedup();
    if prepend_zero {
        edges.insert(0, 0.0);
    }
    let centers = edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    (edges, centers)
}

/// Radial power spectrum of each component, histogrammed over |k| bins.
///
/// Per component: |F[res_i]|² summed into the bins of `edges`, then
/// density-normalized so that Σ S_j · width_j = 1. The last bin includes
/// its upper edge. Partial histograms are reduced in line order, so the
/// result does not depend on the thread count.
pub fn spectrum<T: Real>(field: &mut Field<T>, edges: &[f64]) -> Vec<Vec<f64>> {
    let grid = field.grid().clone();
    let m = grid.spec_last();
    let bins = edges.len() - 1;
    let k_last = grid.wavenumber(grid.dimension() - 1).to_vec();
    let mut spectra = Vec::with_capacity(field.components());
    for i in 0..field.components() {
        let Field {
            transform,
            pool,
            res,
            ..
        } = &mut *field;
        transform.real_mut().copy_from_slice(&res[i]);
        transform.forward(pool);
        let spec = transform.spec();
        let partials: Vec<Vec<f64>> = pool.install(|| {
            spec.par_chunks(m)
                .enumerate()
                .map(|(li, line)| {
                    let prefix = grid.line_k2_prefix(li);
                    let mut hist = vec![0.0f64; bins];
                    for (l, c) in line.iter().enumerate() {
                        let kmag = (prefix + k_last[l] * k_last[l]).sqrt();
                        if let Some(b) = bin_of(edges, kmag) {
                            let power = c.norm_sqr().into_float();
                            hist[b] += power;
                        }
                    }
                    hist
                })
                .collect()
        });
        let mut hist = vec![0.0f64; bins];
        for partial in &partials {
            for (h, p) in hist.iter_mut().zip(partial.iter()) {
                *h += p;
            }
        }
        let total: f64 = hist.iter().sum();
        if total > 0.0 {
            for (b, h) in hist.iter_mut().enumerate() {
                *h /= total * (edges[b + 1] - edges[b]);
            }
        }
        spectra.push(hist);
    }
    spectra
}

fn bin_of(edges: &[f64], value: f64) -> Option<usize> {
    let last = edges.len() - 1;
    if value < edges[0] || value > edges[last] {
        return None;
    }
    if value == edges[last] {
        return Some(last - 1);
    }
    // Bins are few; a linear scan beats a binary search at this size.
    edges.windows(2).position(|w| value >= w[0] && value < w[1])
}

/// Discrete divergence plane of the field's components.
pub fn divergence<T: Real>(field: &Field<T>) -> Vec<T> {
    let grid = field.grid();
    let mut out = vec![T::zero(); grid.real_len()];
    diffops::divergence(grid, field.res(), grid.dx(), &mut out, field.pool());
    out
}

/// Curvature magnitude plane |B × (B·∇)B| / |B|³ of a three-component field.
pub fn curvature<T: Real>(field: &Field<T>) -> Vec<T> {
    let grid = field.grid();
    let len = grid.real_len();
    let mut work = vec![vec![T::zero(); len]; 3];
    let mut scratch = vec![T::zero(); len];
    let mut out = vec![T::zero(); len];
    diffops::curvature(
        grid,
        field.res(),
        grid.dx(),
        &mut work,
        &mut scratch,
        &mut out,
        field.pool(),
    );
    out
}

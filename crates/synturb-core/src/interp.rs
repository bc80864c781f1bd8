//! Inverse-distance-weighted regridding of scattered samples.
//!
//! Samples live at advected coordinates but keep their original grid
//! indices; after the per-axis sort the index of a sample tracks its
//! position, so the candidates for an output cell are the samples whose
//! indices lie in a window around that cell. The window is sized per axis
//! from the largest observed drift between a sample's position and its
//! home index, plus the query radius, so a sample inside the radius can
//! never fall outside the search. Each output cell is one parallel task
//! that gathers its candidates, weights them by inverse distance and
//! normalizes; no two tasks write the same cell, so the sweep needs no
//! synchronization.
//!
//! Distances are periodic (minimum image) and measured in grid units.
//! A cell whose window holds no sample within `query_spacing` stays 0.

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::grid::Grid;
use crate::scalar::Real;

/// Regrid three scattered component planes onto the regular grid.
///
/// `coords` holds d planes of sample positions in physical units;
/// `values` the three component planes sampled at those points. `out`
/// receives the weighted averages and `weights` the per-cell weight sums.
pub fn idw_regrid<T: Real>(
    grid: &Grid,
    coords: &[Vec<T>],
    values: &[Vec<T>],
    query_spacing: f64,
    out: &mut [Vec<T>],
    weights: &mut [T],
    pool: &ThreadPool,
) {
    debug_assert_eq!(coords.len(), grid.dimension());
    debug_assert_eq!(values.len(), 3);
    debug_assert_eq!(out.len(), 3);
    let d = grid.dimension();
    let n = grid.size() as isize;
    let nf = grid.size() as f64;
    let dx = grid.dx();
    let dq2 = query_spacing * query_spacing;
    let eps = T::epsilon().into_float();
    let eps2 = eps * eps;

    // Candidate index offsets per axis: the query radius widened by the
    // largest min-image drift of any sample from its home index. A window
    // that reaches halfway around the box degenerates to the full axis,
    // visiting every index exactly once.
    let offsets: Vec<Vec<isize>> = (0..3)
        .map(|a| {
            if a >= d {
                return vec![0];
            }
            let drift = max_index_drift(grid, &coords[a], a, pool);
            let window = (query_spacing.abs() + drift).ceil() as isize;
            if 2 * window + 1 >= n {
                (0..n).collect()
            } else {
                (-window..=window).collect()
            }
        })
        .collect();

    let (o0, rest) = out.split_at_mut(1);
    let (o1, o2) = rest.split_at_mut(1);
    let (v0, v1, v2) = (&values[0], &values[1], &values[2]);
    pool.install(|| {
        weights
            .par_iter_mut()
            .zip(o0[0].par_iter_mut())
            .zip(o1[0].par_iter_mut())
            .zip(o2[0].par_iter_mut())
            .enumerate()
            .for_each(|(cell, (((wsum, a0), a1), a2))| {
                // Decompose the flat cell index per axis.
                let mut idx = [0isize; 3];
                let mut rem = cell;
                for a in (0..d).rev() {
                    idx[a] = (rem % grid.size()) as isize;
                    rem /= grid.size();
                }
                let mut acc = [0.0f64; 3];
                let mut total = 0.0f64;
                for &oi in &offsets[0] {
                    for &oj in &offsets[1] {
                        for &ok in &offsets[2] {
                            let off = [oi, oj, ok];
                            // Wrapped sample index and its flat offset.
                            let mut sflat = 0usize;
                            for a in 0..d {
                                let s = (idx[a] + off[a]).rem_euclid(n) as usize;
                                sflat = sflat * grid.size() + s;
                            }
                            // Periodic distance between the sample position
                            // and the cell center, in grid units.
                            let mut dsq = 0.0f64;
                            for (a, coord) in coords.iter().enumerate().take(d) {
                                let mut pos = (coord[sflat].into_float() / dx) % nf;
                                if pos < 0.0 {
                                    pos += nf;
                                }
                                let mut delta = pos - idx[a] as f64;
                                if delta > nf / 2.0 {
                                    delta -= nf;
                                } else if delta < -nf / 2.0 {
                                    delta += nf;
                                }
                                dsq += delta * delta;
                            }
                            if dsq < dq2 {
                                let w = 1.0 / (dsq + eps2).sqrt();
                                acc[0] += w * v0[sflat].into_float();
                                acc[1] += w * v1[sflat].into_float();
                                acc[2] += w * v2[sflat].into_float();
                                total += w;
                            }
                        }
                    }
                }
                *wsum = T::from_float(total);
                if total != 0.0 {
                    *a0 = T::from_float(acc[0] / total);
                    *a1 = T::from_float(acc[1] / total);
                    *a2 = T::from_float(acc[2] / total);
                } else {
                    *a0 = T::zero();
                    *a1 = T::zero();
                    *a2 = T::zero();
                }
            });
    });
}

/// Largest periodic distance, in grid units, between a sample's position
/// along `axis` and the grid index it is stored at. Max reductions are
/// order-independent, so the result does not depend on the thread count.
fn max_index_drift<T: Real>(grid: &Grid, coord: &[T], axis: usize, pool: &ThreadPool) -> f64 {
    let n = grid.size();
    let nf = n as f64;
    let dx = grid.dx();
    let stride = grid.real_stride(axis);
    pool.install(|| {
        coord
            .par_iter()
            .enumerate()
            .map(|(t, c)| {
                let home = ((t / stride) % n) as f64;
                let mut pos = (c.into_float() / dx) % nf;
                if pos < 0.0 {
                    pos += nf;
                }
                let mut delta = pos - home;
                if delta > nf / 2.0 {
                    delta -= nf;
                } else if delta < -nf / 2.0 {
                    delta += nf;
                }
                delta.abs()
            })
            .reduce(|| 0.0, f64::max)
    })
}

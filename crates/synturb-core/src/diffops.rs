//! Periodic second-order finite differences and the operators built on them.
//!
//! All derivatives are central differences with wraparound at both box
//! edges. The curl follows the cyclic component convention: the derivative
//! of component i along axis j accumulates positively into component k and
//! the derivative along axis k accumulates negatively into component j,
//! with (j, k) = (2, 1), (0, 2), (1, 0) for i = 0, 1, 2. Derivatives along
//! axes the grid does not have are identically zero, which lets the same
//! three-component operators run on 1-D and 2-D domains.
//!
//! Input and output buffers must not alias; every operator here reads one
//! plane and writes a different one.

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::grid::Grid;
use crate::scalar::Real;

/// Cyclic curl pairing for component `i`.
fn cyclic(i: usize) -> (usize, usize) {
    match i {
        0 => (2, 1),
        1 => (0, 2),
        _ => (1, 0),
    }
}

/// `out += sign * d(arr)/dx_axis`, periodic central difference.
pub fn diff_accumulate<T: Real>(
    grid: &Grid,
    arr: &[T],
    axis: usize,
    dx: f64,
    sign: f64,
    out: &mut [T],
    pool: &ThreadPool,
) {
    if axis >= grid.dimension() {
        return;
    }
    let n = grid.size();
    let stride = grid.real_stride(axis);
    let block = stride * n;
    let factor = T::from_float(sign / (2.0 * dx));
    pool.install(|| {
        out.par_chunks_mut(stride).enumerate().for_each(|(c, slab)| {
            let outer = c / n;
            let t = c % n;
            let base = outer * block;
            let next = base + ((t + 1) % n) * stride;
            let prev = base + ((t + n - 1) % n) * stride;
            for (r, o) in slab.iter_mut().enumerate() {
                *o = *o + (arr[next + r] - arr[prev + r]) * factor;
            }
        });
    });
}

/// `out = d(arr)/dx_axis`, periodic central difference.
pub fn diff<T: Real>(
    grid: &Grid,
    arr: &[T],
    axis: usize,
    dx: f64,
    out: &mut [T],
    pool: &ThreadPool,
) {
    if axis >= grid.dimension() {
        zero(out, pool);
        return;
    }
    zero(out, pool);
    diff_accumulate(grid, arr, axis, dx, 1.0, out, pool);
}

fn zero<T: Real>(buf: &mut [T], pool: &ThreadPool) {
    pool.install(|| {
        buf.par_iter_mut().for_each(|v| *v = T::zero());
    });
}

/// Accumulate the two curl contributions of vector component `i` into `out`.
pub fn curl_step<T: Real>(
    grid: &Grid,
    input: &[T],
    i: usize,
    dx: f64,
    out: &mut [Vec<T>],
    pool: &ThreadPool,
) {
    let (j, k) = cyclic(i);
    diff_accumulate(grid, input, j, dx, 1.0, &mut out[k], pool);
    diff_accumulate(grid, input, k, dx, -1.0, &mut out[j], pool);
}

/// `out = curl(input)` for a three-component field.
pub fn curl<T: Real>(
    grid: &Grid,
    input: &[Vec<T>],
    dx: f64,
    out: &mut [Vec<T>],
    pool: &ThreadPool,
) {
    for plane in out.iter_mut() {
        zero(plane, pool);
    }
    for (i, component) in input.iter().enumerate() {
        curl_step(grid, component, i, dx, out, pool);
    }
}

/// `out = div(input)`, summing the axis-i derivative of component i.
pub fn divergence<T: Real>(
    grid: &Grid,
    input: &[Vec<T>],
    dx: f64,
    out: &mut [T],
    pool: &ThreadPool,
) {
    zero(out, pool);
    for (i, component) in input.iter().enumerate() {
        diff_accumulate(grid, component, i, dx, 1.0, out, pool);
    }
}

/// Curvature magnitude |B × (B·∇)B| / |B|³ of a three-component field.
///
/// `work` holds three planes for the directional derivative, `scratch` one
/// plane for single derivatives; `out` receives the scalar result.
pub fn curvature<T: Real>(
    grid: &Grid,
    res: &[Vec<T>],
    dx: f64,
    work: &mut [Vec<T>],
    scratch: &mut [T],
    out: &mut [T],
    pool: &ThreadPool,
) {
    debug_assert_eq!(res.len(), 3);
    for plane in work.iter_mut() {
        zero(plane, pool);
    }
    // (B·∇)B: work_i = sum_j res_j * d(res_i)/dx_j
    for i in 0..res.len() {
        for j in 0..res.len() {
            if j >= grid.dimension() {
                continue;
            }
            diff(grid, &res[i], j, dx, scratch, pool);
            let (wi, rj, sc) = (&mut work[i], &res[j], &*scratch);
            pool.install(|| {
                wi.par_iter_mut()
                    .zip(rj.par_iter())
                    .zip(sc.par_iter())
                    .for_each(|((w, r), s)| *w = *w + *r * *s);
            });
        }
    }
    // |B| into out, then divide the directional derivative by |B|³.
    let (r0, r1, r2) = (&res[0], &res[1], &res[2]);
    pool.install(|| {
        out.par_iter_mut().enumerate().for_each(|(t, o)| {
            *o = (r0[t] * r0[t] + r1[t] * r1[t] + r2[t] * r2[t]).sqrt();
        });
    });
    for plane in work.iter_mut() {
        let mag = &*out;
        pool.install(|| {
            plane
                .par_iter_mut()
                .zip(mag.par_iter())
                .for_each(|(w, m)| *w = *w / (*m * *m * *m));
        });
    }
    // B × work, elementwise with temporaries, then its magnitude.
    let (w0, w1, w2) = {
        let (a, rest) = work.split_at_mut(1);
        let (b, c) = rest.split_at_mut(1);
        (&mut a[0], &mut b[0], &mut c[0])
    };
    pool.install(|| {
        w0.par_iter_mut()
            .zip(w1.par_iter_mut())
            .zip(w2.par_iter_mut())
            .enumerate()
            .for_each(|(t, ((a, b), c))| {
                let (bx, by, bz) = (r0[t], r1[t], r2[t]);
                let (vx, vy, vz) = (*a, *b, *c);
                *a = by * vz - bz * vy;
                *b = bz * vx - bx * vz;
                *c = bx * vy - by * vx;
            });
    });
    let (w0, w1, w2) = (&work[0], &work[1], &work[2]);
    pool.install(|| {
        out.par_iter_mut().enumerate().for_each(|(t, o)| {
            *o = (w0[t] * w0[t] + w1[t] * w1[t] + w2[t] * w2[t]).sqrt();
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rvs::VariateSource;
    use std::f64::consts::PI;

    fn pool() -> ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap()
    }

    #[test]
    fn central_difference_of_a_sine_is_a_scaled_cosine() {
        // On a uniform grid the central difference of sin(2πx) is exactly
        // cos(2πx) · sin(2πh)/h.
        let n = 16;
        let grid = Grid::new(1, n, 1.0).unwrap();
        let dx = grid.dx();
        let pool = pool();
        let f: Vec<f64> = (0..n).map(|i| (2.0 * PI * i as f64 * dx).sin()).collect();
        let mut df = vec![0.0; n];
        diff(&grid, &f, 0, dx, &mut df, &pool);
        let factor = (2.0 * PI * dx).sin() / dx;
        for (i, v) in df.iter().enumerate() {
            let expect = (2.0 * PI * i as f64 * dx).cos() * factor;
            assert!((v - expect).abs() < 1e-12, "at {i}: {v} vs {expect}");
        }
    }

    #[test]
    fn derivative_wraps_periodically() {
        let n = 8;
        let grid = Grid::new(1, n, 1.0).unwrap();
        let pool = pool();
        let mut f = vec![0.0f64; n];
        f[0] = 1.0;
        let mut df = vec![0.0; n];
        diff(&grid, &f, 0, grid.dx(), &mut df, &pool);
        let h = grid.dx();
        assert_eq!(df[1], -1.0 / (2.0 * h));
        assert_eq!(df[n - 1], 1.0 / (2.0 * h));
        assert_eq!(df[0], 0.0);
    }

    #[test]
    fn curl_of_a_z_directed_sine_points_in_minus_y() {
        // A = (0, 0, sin(2πx)) -> curl A = (0, -dA_z/dx, 0).
        let n = 16;
        let grid = Grid::new(3, n, 1.0).unwrap();
        let dx = grid.dx();
        let pool = pool();
        let len = grid.real_len();
        let mut a = vec![vec![0.0f64; len], vec![0.0; len], vec![0.0; len]];
        for i in 0..n {
            let v = (2.0 * PI * i as f64 * dx).sin();
            for r in 0..n * n {
                a[2][i * n * n + r] = v;
            }
        }
        let mut c = vec![vec![0.0f64; len], vec![0.0; len], vec![0.0; len]];
        curl(&grid, &a, dx, &mut c, &pool);
        let factor = (2.0 * PI * dx).sin() / dx;
        for i in 0..n {
            let expect = -(2.0 * PI * i as f64 * dx).cos() * factor;
            for r in 0..n * n {
                let t = i * n * n + r;
                assert!(c[0][t].abs() < 1e-12);
                assert!((c[1][t] - expect).abs() < 1e-11);
                assert!(c[2][t].abs() < 1e-12);
            }
        }
    }

    #[test]
    fn divergence_of_a_curl_vanishes() {
        // Central differences along different axes commute, so the discrete
        // div of a discrete curl cancels exactly.
        let n = 8;
        let grid = Grid::new(3, n, 1.0).unwrap();
        let dx = grid.dx();
        let pool = pool();
        let len = grid.real_len();
        let mut source = VariateSource::new(Some(19));
        let mut a = vec![vec![0.0f64; len]; 3];
        for plane in a.iter_mut() {
            source.fill_normal(plane, 0.0, 1.0, &pool);
        }
        let mut c = vec![vec![0.0f64; len]; 3];
        curl(&grid, &a, dx, &mut c, &pool);
        let mut d = vec![0.0f64; len];
        divergence(&grid, &c, dx, &mut d, &pool);
        let max = d.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(max < 1e-9, "max |div curl| = {max}");
    }

    #[test]
    fn curl_in_two_dimensions_skips_the_missing_axis() {
        // A = (0, 0, f(x, y)) on a 2-D grid: curl = (df/dy, -df/dx, 0).
        let n = 8;
        let grid = Grid::new(2, n, 1.0).unwrap();
        let dx = grid.dx();
        let pool = pool();
        let len = grid.real_len();
        let mut source = VariateSource::new(Some(23));
        let mut a = vec![vec![0.0f64; len]; 3];
        source.fill_normal(&mut a[2], 0.0, 1.0, &pool);
        let mut c = vec![vec![0.0f64; len]; 3];
        curl(&grid, &a, dx, &mut c, &pool);
        let mut dfdy = vec![0.0f64; len];
        diff(&grid, &a[2], 1, dx, &mut dfdy, &pool);
        for t in 0..len {
            assert!((c[0][t] - dfdy[t]).abs() < 1e-12);
            assert!(c[2][t].abs() < 1e-12);
        }
    }

    #[test]
    fn curvature_of_a_uniform_field_is_zero() {
        let n = 8;
        let grid = Grid::new(3, n, 1.0).unwrap();
        let pool = pool();
        let len = grid.real_len();
        let res = vec![vec![1.0f64; len], vec![0.5; len], vec![0.25; len]];
        let mut work = vec![vec![0.0f64; len]; 3];
        let mut scratch = vec![0.0f64; len];
        let mut out = vec![0.0f64; len];
        curvature(&grid, &res, grid.dx(), &mut work, &mut scratch, &mut out, &pool);
        assert!(out.iter().all(|v| v.abs() < 1e-12));
    }
}

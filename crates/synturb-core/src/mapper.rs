//! Lagrangian coordinate mapping on top of the cascade.
//!
//! The mapper runs the same scale ladder as the plain cascade, but after
//! every scale it takes the curl of the potential accumulated so far and
//! advects a coordinate field along it, with a CFL-style step limited by
//! the largest vector magnitude. The advected coordinates define a volume
//! deformation; the potential is then scattered through that deformation
//! back onto the regular grid by inverse-distance weighting, low-pass
//! filtered, curled and normalized.
//!
//! Sorting each coordinate plane along its own axis before regridding is a
//! deliberate approximation of the inverse flow map: it restores index
//! monotonicity per axis without untangling the full 3-D permutation.

use serde::{Deserialize, Serialize};

use crate::cascade::{Cascade, CascadeParams, ScaleLadder};
use crate::diffops;
use crate::error::FieldError;
use crate::field::{Field, FieldConfig};
use crate::interp::idw_regrid;
use crate::scalar::Real;

// ── Options ───────────────────────────────────────────────────────────────────

/// Spectral low-pass applied to each regridded component.
///
/// The kernel is k²^(p0/2) · exp(−k²/k0²/2) with a hard cutoff above k1
/// and a zeroed DC bin. `None` for k0/k1 means n/2.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LowPassParams {
    pub k0: Option<f64>,
    pub k1: Option<f64>,
    #[serde(default)]
    pub p0: f64,
}

/// Per-call options of the mapping run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapperOptions {
    /// Run a second, fixed-coordinate cascade pass before regridding. The
    /// pass redraws the potential from the continuing variate stream while
    /// the coordinates keep the deformation of the first pass.
    pub reference_pass: bool,
    pub lowpass: LowPassParams,
}

// ── Mapper ────────────────────────────────────────────────────────────────────

pub struct LagrangianMapper<T: Real> {
    cascade: Cascade<T>,
    cfl: f64,
    query_spacing: f64,
    /// One plane of advected positions per grid axis, physical units.
    coords: Vec<Vec<T>>,
    /// IDW weight sums of the last regrid.
    weights: Vec<T>,
}

impl<T: Real> LagrangianMapper<T> {
    pub fn new(
        name: impl Into<String>,
        config: FieldConfig,
        cfl: f64,
        query_spacing: f64,
    ) -> Result<Self, FieldError> {
        if cfl == 0.0 {
            return Err(FieldError::ZeroCfl);
        }
        let cascade = Cascade::new(name, config)?;
        let grid = cascade.field().grid();
        let coords = vec![vec![T::zero(); grid.real_len()]; grid.dimension()];
        let weights = vec![T::zero(); grid.real_len()];
        Ok(Self {
            cascade,
            cfl,
            query_spacing,
            coords,
            weights,
        })
    }

    pub fn field(&self) -> &Field<T> {
        self.cascade.field()
    }

    pub fn field_mut(&mut self) -> &mut Field<T> {
        self.cascade.field_mut()
    }

    pub fn cfl(&self) -> f64 {
        self.cfl
    }

    pub fn set_cfl(&mut self, cfl: f64) -> Result<(), FieldError> {
        if cfl == 0.0 {
            return Err(FieldError::ZeroCfl);
        }
        self.cfl = cfl;
        Ok(())
    }

    /// Weight sums of the last regrid, one per output cell.
    pub fn weights(&self) -> &[T] {
        &self.weights
    }

    /// Advected coordinate planes of the last run.
    pub fn coords(&self) -> &[Vec<T>] {
        &self.coords
    }

    /// Run the full mapping: advected cascade pass, optional reference
    /// pass, regrid, low-pass, curl, RMS normalization.
    pub fn generate(
        &mut self,
        params: &CascadeParams,
        options: &MapperOptions,
    ) -> Result<&[Vec<T>], FieldError> {
        self.reset_coords();
        self.mapping_pass(params, true, true)?;
        if options.reference_pass {
            self.mapping_pass(params, false, false)?;
        }
        self.transform_and_regrid(&options.lowpass);
        self.cascade.field_mut().normalize();
        Ok(self.cascade.field().res())
    }

    /// Put every coordinate back on the regular grid.
    fn reset_coords(&mut self) {
        let grid = self.cascade.field().grid().clone();
        let n = grid.size();
        let dx = T::from_float(grid.dx());
        for (a, plane) in self.coords.iter_mut().enumerate() {
            let stride = grid.real_stride(a);
            for (t, v) in plane.iter_mut().enumerate() {
                *v = T::from_float(((t / stride) % n) as f64) * dx;
            }
        }
    }

    /// One ladder sweep; `advect` distinguishes the primary pass from the
    /// fixed-coordinate reference pass.
    fn mapping_pass(
        &mut self,
        params: &CascadeParams,
        reseed: bool,
        advect: bool,
    ) -> Result<(), FieldError> {
        let ladder = ScaleLadder::new(self.cascade.field().grid(), params)?;
        if reseed {
            let seed = self.cascade.field().config().seed;
            self.cascade.source.reseed(seed);
        }
        self.cascade.zero_state();
        let dimension = self.cascade.field().grid().dimension() as f64;
        let steps: Vec<_> = ladder.weighted_steps(params, dimension).collect();
        for (scale, variance, scalefactor) in steps {
            self.cascade.generate_step(scale, variance, scalefactor);
            if advect {
                self.advect(scale);
            }
        }
        Ok(())
    }

    /// Move the coordinates along the curl of the potential accumulated so
    /// far, step size cfl · scale, scaled by the peak vector magnitude.
    fn advect(&mut self, scale: f64) {
        self.cascade.curl_from_potential();
        let norm = self.cascade.max_magnitude();
        if norm == 0.0 {
            return;
        }
        let step = self.cfl * scale / norm;
        let res = self.cascade.field().res();
        let pool = self.cascade.field().pool();
        for (a, plane) in self.coords.iter_mut().enumerate() {
            let velocity = &res[a];
            let step = T::from_float(step);
            pool.install(|| {
                use rayon::prelude::*;
                plane
                    .par_iter_mut()
                    .zip(velocity.par_iter())
                    .for_each(|(c, v)| *c = *c + step * *v);
            });
        }
    }

    /// Potential to real space, per-axis coordinate sort, IDW regrid,
    /// low-pass and curl of each regridded component.
    fn transform_and_regrid(&mut self, lowpass: &LowPassParams) {
        // Real-space potential into the component planes.
        for i in 0..self.cascade.potential.len() {
            let Cascade {
                field, potential, ..
            } = &mut self.cascade;
            let pool = &field.pool;
            let transform = &mut field.transform;
            transform.spec_mut().copy_from_slice(&potential[i]);
            transform.backward(pool);
            field.res[i].copy_from_slice(transform.real());
        }
        self.sort_coords();

        // Scatter through the deformation. The noise planes are free after
        // the ladder loop and take the regridded components.
        let grid = self.cascade.field().grid().clone();
        {
            let Cascade {
                field, noise, ..
            } = &mut self.cascade;
            idw_regrid(
                &grid,
                &self.coords,
                &field.res,
                self.query_spacing,
                noise,
                &mut self.weights,
                &field.pool,
            );
        }

        // Low-pass each regridded component and accumulate its curl.
        let n2 = (grid.size() / 2) as f64;
        let k0 = lowpass.k0.unwrap_or(n2);
        let k1 = lowpass.k1.unwrap_or(n2);
        let p0 = lowpass.p0;
        let dx = grid.dx();
        self.cascade.field_mut().zero_res();
        for i in 0..self.cascade.potential.len() {
            let Cascade {
                field,
                potential,
                noise,
                ..
            } = &mut self.cascade;
            let pool = &field.pool;
            let transform = &mut field.transform;
            transform.real_mut().copy_from_slice(&noise[i]);
            transform.forward(pool);
            crate::transform::apply_spectral_kernel(&grid, transform.spec_mut(), pool, |k2| {
                if k2 > k1 * k1 {
                    0.0
                } else {
                    k2.powf(p0 / 2.0) * (-k2 / (k0 * k0) / 2.0).exp()
                }
            });
            transform.spec_mut()[0] = num_complex::Complex::new(T::zero(), T::zero());
            potential[i].copy_from_slice(transform.spec());
            transform.backward(pool);
            diffops::curl_step(&grid, transform.real(), i, dx, &mut field.res, pool);
        }
    }

    /// Sort each coordinate plane along its own axis, independently per
    /// pencil. Gather, sort, scatter, mirroring the transform's lane sweeps.
    fn sort_coords(&mut self) {
        use rayon::prelude::*;
        use std::cmp::Ordering;
        let grid = self.cascade.field().grid().clone();
        let n = grid.size();
        let len = grid.real_len();
        let pool = self.cascade.field().pool();
        let mut lanes = vec![T::zero(); len];
        for (a, plane) in self.coords.iter_mut().enumerate() {
            let stride = grid.real_stride(a);
            let block = stride * n;
            pool.install(|| {
                lanes.par_chunks_mut(n).enumerate().for_each(|(li, lane)| {
                    let base = (li / stride) * block + li % stride;
                    for (t, v) in lane.iter_mut().enumerate() {
                        *v = plane[base + t * stride];
                    }
                    lane.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));
                });
                plane
                    .par_chunks_mut(block)
                    .enumerate()
                    .for_each(|(ob, chunk)| {
                        for rem in 0..stride {
                            let lane = &lanes[(ob * stride + rem) * n..];
                            for t in 0..n {
                                chunk[rem + t * stride] = lane[t];
                            }
                        }
                    });
            });
        }
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(seed: u64) -> FieldConfig {
        let mut config = FieldConfig::new(3, 16);
        config.threads = Some(2);
        config.seed = Some(seed);
        config
    }

    fn small_params() -> CascadeParams {
        CascadeParams::new(4, 0.5)
    }

    #[test]
    fn zero_cfl_is_rejected_up_front() {
        assert!(matches!(
            LagrangianMapper::<f64>::new("m", small_config(1), 0.0, 2.0),
            Err(FieldError::ZeroCfl)
        ));
        let mut mapper = LagrangianMapper::<f64>::new("m", small_config(1), 0.3, 2.0).unwrap();
        assert!(matches!(mapper.set_cfl(0.0), Err(FieldError::ZeroCfl)));
        mapper.set_cfl(-0.5).unwrap();
        assert_eq!(mapper.cfl(), -0.5);
    }

    #[test]
    fn reset_coordinates_lie_on_the_grid() {
        let mut mapper = LagrangianMapper::<f64>::new("m", small_config(1), 0.3, 2.0).unwrap();
        mapper.reset_coords();
        let grid = mapper.field().grid().clone();
        let dx = grid.dx();
        let n = grid.size();
        for (a, plane) in mapper.coords().iter().enumerate() {
            let stride = grid.real_stride(a);
            for (t, v) in plane.iter().enumerate() {
                let expect = ((t / stride) % n) as f64 * dx;
                assert_eq!(*v, expect);
            }
        }
    }

    #[test]
    fn sorted_coordinates_are_monotone_per_pencil() {
        let mut mapper = LagrangianMapper::<f64>::new("m", small_config(2), 0.3, 2.0).unwrap();
        let grid = mapper.field().grid().clone();
        let n = grid.size();
        // Scramble, then sort.
        for plane in mapper.coords.iter_mut() {
            for (t, v) in plane.iter_mut().enumerate() {
                *v = ((t * 2654435761) % 1009) as f64;
            }
        }
        mapper.sort_coords();
        for (a, plane) in mapper.coords().iter().enumerate() {
            let stride = grid.real_stride(a);
            let block = stride * n;
            for li in 0..grid.real_len() / n {
                let base = (li / stride) * block + li % stride;
                for t in 1..n {
                    assert!(
                        plane[base + (t - 1) * stride] <= plane[base + t * stride],
                        "axis {a} pencil {li} not sorted at {t}"
                    );
                }
            }
        }
    }

    #[test]
    fn mapped_field_has_unit_rms_and_is_reproducible() {
        let mut a = LagrangianMapper::<f64>::new("a", small_config(42), 0.3, 2.0).unwrap();
        let mut b = LagrangianMapper::<f64>::new("b", small_config(42), 0.3, 2.0).unwrap();
        let options = MapperOptions::default();
        a.generate(&small_params(), &options).unwrap();
        b.generate(&small_params(), &options).unwrap();
        assert!((a.field().rms() - 1.0).abs() < 1e-6);
        assert_eq!(a.field().res(), b.field().res());
    }

    #[test]
    fn regrid_weights_are_populated() {
        let mut mapper = LagrangianMapper::<f64>::new("m", small_config(7), 0.3, 2.0).unwrap();
        mapper.generate(&small_params(), &MapperOptions::default()).unwrap();
        assert!(mapper.weights().iter().any(|w| *w > 0.0));
    }

    #[test]
    fn reference_pass_changes_the_field() {
        let params = small_params();
        let mut plain = LagrangianMapper::<f64>::new("p", small_config(13), 0.3, 2.0).unwrap();
        plain.generate(&params, &MapperOptions::default()).unwrap();
        let direct = plain.field().res().to_vec();
        let mut other = LagrangianMapper::<f64>::new("o", small_config(13), 0.3, 2.0).unwrap();
        let options = MapperOptions {
            reference_pass: true,
            ..Default::default()
        };
        other.generate(&params, &options).unwrap();
        assert!((other.field().rms() - 1.0).abs() < 1e-6);
        assert_ne!(other.field().res(), &direct[..]);
    }

    #[test]
    fn lowpass_cutoff_removes_fine_structure() {
        let params = small_params();
        let mut sharp = LagrangianMapper::<f64>::new("s", small_config(3), 0.3, 2.0).unwrap();
        sharp.generate(&params, &MapperOptions::default()).unwrap();
        let unfiltered = sharp.field().res().to_vec();
        let mut smooth = LagrangianMapper::<f64>::new("t", small_config(3), 0.3, 2.0).unwrap();
        let options = MapperOptions {
            reference_pass: false,
            lowpass: LowPassParams {
                k0: Some(2.0),
                k1: Some(2.0),
                p0: 0.0,
            },
        };
        smooth.generate(&params, &options).unwrap();
        assert_ne!(smooth.field().res(), &unfiltered[..]);
    }
}

//! Multiplicative cascade synthesis of a solenoidal vector field.
//!
//! The generator walks a geometric ladder of scales from the correlation
//! length down to the grid spacing. At every scale it draws band-passed
//! Gaussian noise for a log-amplitude channel and two angle channels, maps
//! the angles through the exact Gaussian quantile so they cover the sphere,
//! and accumulates the resulting wavelet contribution into a spectral
//! vector potential. Taking the curl of that potential yields a field with
//! zero discrete divergence; a final normalization pins the global RMS to 1.

use num_complex::Complex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::diffops;
use crate::error::FieldError;
use crate::field::{chunked_sum, Field, FieldConfig};
use crate::grid::Grid;
use crate::rvs::VariateSource;
use crate::scalar::Real;
use crate::transform::{accumulate_with_kernel, apply_spectral_kernel};

/// Dimensional constant of the cascade variance, π/6.
const CASCADE_CD: f64 = std::f64::consts::PI / 6.0;

// ── Parameters ────────────────────────────────────────────────────────────────

/// Per-call cascade parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeParams {
    /// Number of ladder steps between correlation length and grid spacing.
    pub number_of_modes: usize,
    /// Outer scale of the cascade, in the same units as the box length.
    pub correlation_length: f64,
    /// Spectral index α of the target power law E(k) ~ k^(−α).
    pub spectral_index: f64,
    /// Intermittency parameter μ of the log-normal amplitude cascade.
    pub intermittency: f64,
}

impl CascadeParams {
    /// Kolmogorov-like defaults: α = 5/3, mild intermittency.
    pub fn new(number_of_modes: usize, correlation_length: f64) -> Self {
        Self {
            number_of_modes,
            correlation_length,
            spectral_index: 5.0 / 3.0,
            intermittency: 0.2,
        }
    }
}

// ── Scale ladder ──────────────────────────────────────────────────────────────

/// Geometric ladder of cascade scales, in box units.
///
/// Entry 0 is the correlation length over the box length; the last entry is
/// the normalized grid spacing, exactly. Strictly decreasing.
pub struct ScaleLadder {
    scales: Vec<f64>,
}

impl ScaleLadder {
    pub fn new(grid: &Grid, params: &CascadeParams) -> Result<Self, FieldError> {
        let dx = grid.dx_norm();
        let top = params.correlation_length / grid.l_box();
        let n = params.number_of_modes;
        if n == 0 || !top.is_finite() || top <= dx {
            return Err(FieldError::DegenerateScaleLadder {
                modes: n,
                correlation_length: params.correlation_length,
                spacing: dx,
            });
        }
        let ratio = top / dx;
        let scales = (0..=n)
            .map(|j| dx * ratio.powf((n - j) as f64 / n as f64))
            .collect();
        Ok(Self { scales })
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    /// Ladder steps from the largest scale down: (scale, ds) pairs with
    /// ds the gap to the next smaller scale.
    pub fn steps(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.scales.windows(2).map(|w| (w[0], w[0] - w[1]))
    }

    /// Ladder steps with the cascade weights attached:
    /// (scale, variance, scalefactor) with
    /// variance = (π/6)·μ·ds/s^(d+1) and scalefactor = ds·s^(α−d).
    pub fn weighted_steps<'a>(
        &'a self,
        params: &'a CascadeParams,
        dimension: f64,
    ) -> impl Iterator<Item = (f64, f64, f64)> + 'a {
        self.steps().map(move |(scale, ds)| {
            let variance =
                CASCADE_CD * params.intermittency * ds / scale.powf(dimension + 1.0);
            let scalefactor = ds * scale.powf(params.spectral_index - dimension);
            (scale, variance, scalefactor)
        })
    }
}

// ── Noise channels ────────────────────────────────────────────────────────────

/// The three noise channels of one cascade step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseChannel {
    /// Log-amplitude; accumulates across scales.
    Omega,
    /// Polar angle; overwritten each scale.
    Theta,
    /// Azimuthal angle; overwritten each scale.
    Phi,
}

impl NoiseChannel {
    fn index(self) -> usize {
        match self {
            NoiseChannel::Omega => 0,
            NoiseChannel::Theta => 1,
            NoiseChannel::Phi => 2,
        }
    }
}

// ── Generator ─────────────────────────────────────────────────────────────────

pub struct Cascade<T: Real> {
    pub(crate) field: Field<T>,
    /// Spectral vector potential, accumulated across scales.
    pub(crate) potential: Vec<Vec<Complex<T>>>,
    /// ω / θ / φ real-space noise planes.
    pub(crate) noise: Vec<Vec<T>>,
    pub(crate) source: VariateSource,
}

impl<T: Real> Cascade<T> {
    pub fn new(name: impl Into<String>, config: FieldConfig) -> Result<Self, FieldError> {
        // The cascade always synthesizes a 3-vector, whatever the grid
        // dimension; the sphere angles need all three components.
        let mut config = config;
        config.components = 3;
        let seed = config.seed;
        let field = Field::new(name, config)?;
        let spec_len = field.grid().spec_len();
        let real_len = field.grid().real_len();
        let components = field.components();
        Ok(Self {
            field,
            potential: vec![vec![Complex::new(T::zero(), T::zero()); spec_len]; components],
            noise: vec![vec![T::zero(); real_len]; 3],
            source: VariateSource::new(seed),
        })
    }

    pub fn field(&self) -> &Field<T> {
        &self.field
    }

    pub fn field_mut(&mut self) -> &mut Field<T> {
        &mut self.field
    }

    /// Seed actually in use (drawn from OS entropy when none was given).
    pub fn seed(&self) -> u64 {
        self.source.seed()
    }

    /// Run the full cascade and return the curl-projected, RMS-normalized
    /// field components.
    pub fn generate(&mut self, params: &CascadeParams) -> Result<&[Vec<T>], FieldError> {
        self.cascade_pass(params, true)?;
        self.curl_from_potential();
        self.field.normalize();
        Ok(self.field.res())
    }

    /// One full ladder sweep: zero the state, then run every scale step.
    /// `reseed` restarts the variate stream from the configured seed; the
    /// reference pass of the Lagrangian mapper passes `false` to keep
    /// drawing fresh variates from the same stream.
    pub(crate) fn cascade_pass(
        &mut self,
        params: &CascadeParams,
        reseed: bool,
    ) -> Result<(), FieldError> {
        let ladder = ScaleLadder::new(self.field.grid(), params)?;
        if reseed {
            self.source.reseed(self.field.config.seed);
        }
        self.zero_state();
        let dimension = self.field.grid().dimension() as f64;
        for (scale, variance, scalefactor) in ladder.weighted_steps(params, dimension) {
            self.generate_step(scale, variance, scalefactor);
        }
        Ok(())
    }

    pub(crate) fn zero_state(&mut self) {
        self.field.zero_res();
        let pool = self.field.pool();
        for plane in self.potential.iter_mut() {
            pool.install(|| {
                plane
                    .par_iter_mut()
                    .for_each(|c| *c = Complex::new(T::zero(), T::zero()));
            });
        }
        for plane in self.noise.iter_mut() {
            pool.install(|| plane.par_iter_mut().for_each(|v| *v = T::zero()));
        }
    }

    /// One scale of the cascade: draw the three noise channels, map the
    /// angles onto the sphere, accumulate the wavelet contribution.
    pub(crate) fn generate_step(&mut self, scale: f64, variance: f64, scalefactor: f64) {
        self.gaussian_noise(NoiseChannel::Omega, scale, -variance / 2.0, variance, true);
        self.gaussian_noise(NoiseChannel::Theta, scale, 0.0, 1.0, false);
        self.gaussian_noise(NoiseChannel::Phi, scale, 0.0, 1.0, false);
        self.normalize_noise();
        self.wavelet_convolution(scale, scalefactor);
    }

    /// Band-passed Gaussian noise into one channel: fill the half spectrum
    /// with N(0, √variance) per scalar, pin the DC bin to `mean`, apply the
    /// band-pass kernel (s·n)^d · exp(−k²s²), transform to real space.
    fn gaussian_noise(
        &mut self,
        channel: NoiseChannel,
        scale: f64,
        mean: f64,
        variance: f64,
        accumulate: bool,
    ) {
        let Self {
            field,
            noise,
            source,
            ..
        } = self;
        let pool = &field.pool;
        let transform = &mut field.transform;
        source.fill_normal_complex(transform.spec_mut(), 0.0, variance.sqrt(), pool);
        transform.spec_mut()[0] = Complex::new(T::from_float(mean), T::zero());
        let grid = transform.grid().clone();
        let n = grid.size() as f64;
        let d = grid.dimension() as i32;
        apply_spectral_kernel(&grid, transform.spec_mut(), pool, |k2| {
            (scale * n).powi(d) * (-k2 * scale * scale).exp()
        });
        transform.backward(pool);
        let src = transform.real();
        let dst = &mut noise[channel.index()];
        pool.install(|| {
            if accumulate {
                dst.par_iter_mut()
                    .zip(src.par_iter())
                    .for_each(|(o, v)| *o = *o + *v);
            } else {
                dst.par_iter_mut()
                    .zip(src.par_iter())
                    .for_each(|(o, v)| *o = *v);
            }
        });
    }

    /// Map the raw angle channels onto sphere angles: divide by the
    /// empirical RMS, then θ → arccos(−erf(θ/√2)) ∈ [0, π] and
    /// φ → π(1 + erf(φ/√2)) ∈ [0, 2π].
    fn normalize_noise(&mut self) {
        let pool = self.field.pool();
        let count = self.field.grid().real_len() as f64;
        let inv_sqrt2 = T::from_float(std::f64::consts::FRAC_1_SQRT_2);
        let pi = T::from_float(std::f64::consts::PI);
        for channel in [NoiseChannel::Theta, NoiseChannel::Phi] {
            let plane = &mut self.noise[channel.index()];
            let std = (chunked_sum(plane, pool, |v| v * v) / count).sqrt();
            let inv_std = T::from_float(std.recip());
            pool.install(|| {
                plane.par_iter_mut().for_each(|v| {
                    let e = (*v * inv_std * inv_sqrt2).erf();
                    *v = match channel {
                        NoiseChannel::Theta => (-e).acos(),
                        _ => pi * (T::one() + e),
                    };
                });
            });
        }
    }

    /// Accumulate the wavelet contribution of one scale into the spectral
    /// potential: v_k += scalefactor · F[exp(ω)·r_k] · s^(d+2) · k² · exp(−k²s²)
    /// with r = (sin θ cos φ, sin θ sin φ, cos θ).
    fn wavelet_convolution(&mut self, scale: f64, scalefactor: f64) {
        let d = self.field.grid().dimension() as f64;
        let prefactor = scalefactor * scale.powf(d + 2.0);
        for k in 0..self.potential.len() {
            let Self {
                field,
                potential,
                noise,
                ..
            } = self;
            let pool = &field.pool;
            let transform = &mut field.transform;
            let (omega, theta, phi) = (&noise[0], &noise[1], &noise[2]);
            let real = transform.real_mut();
            pool.install(|| {
                real.par_iter_mut().enumerate().for_each(|(t, v)| {
                    let amp = omega[t].exp();
                    *v = amp
                        * match k {
                            0 => theta[t].sin() * phi[t].cos(),
                            1 => theta[t].sin() * phi[t].sin(),
                            _ => theta[t].cos(),
                        };
                });
            });
            transform.forward(pool);
            let grid = transform.grid().clone();
            accumulate_with_kernel(&grid, transform.spec(), &mut potential[k], pool, |k2| {
                prefactor * k2 * (-k2 * scale * scale).exp()
            });
        }
    }

    /// Curl of the accumulated potential into the component planes.
    pub(crate) fn curl_from_potential(&mut self) {
        self.field.zero_res();
        let dx = self.field.grid().dx();
        for i in 0..self.potential.len() {
            let Self {
                field, potential, ..
            } = self;
            let pool = &field.pool;
            let transform = &mut field.transform;
            transform.spec_mut().copy_from_slice(&potential[i]);
            transform.backward(pool);
            let grid = transform.grid().clone();
            diffops::curl_step(&grid, transform.real(), i, dx, &mut field.res, pool);
        }
    }

    /// Largest pointwise vector magnitude of the component planes.
    pub(crate) fn max_magnitude(&self) -> f64 {
        let (r0, r1, r2) = (&self.field.res[0], &self.field.res[1], &self.field.res[2]);
        self.field.pool().install(|| {
            (0..r0.len())
                .into_par_iter()
                .map(|t| {
                    (r0[t] * r0[t] + r1[t] * r1[t] + r2[t] * r2[t])
                        .into_float()
                        .sqrt()
                })
                .reduce(|| 0.0, f64::max)
        })
    }

    /// Replace the phases of the accumulated potential with uniform draws,
    /// keeping |v̂_k|. Produces a Gaussianized surrogate with the same
    /// spectrum as the last cascade run. Requires a prior `generate` call.
    pub fn randomize_phases(&mut self) -> Result<&[Vec<T>], FieldError> {
        self.field.zero_res();
        let dx = self.field.grid().dx();
        let spec_len = self.field.grid().spec_len();
        let mut phases = vec![T::zero(); spec_len];
        for i in 0..self.potential.len() {
            let Self {
                field,
                potential,
                source,
                ..
            } = self;
            let pool = &field.pool;
            let transform = &mut field.transform;
            source.fill_uniform(
                &mut phases,
                -std::f64::consts::PI,
                std::f64::consts::PI,
                pool,
            );
            let spec = transform.spec_mut();
            let src = &potential[i];
            pool.install(|| {
                spec.par_iter_mut()
                    .zip(src.par_iter())
                    .zip(phases.par_iter())
                    .for_each(|((out, v), p)| {
                        *out = Complex::from_polar(v.norm(), *p);
                    });
            });
            transform.backward(pool);
            let grid = transform.grid().clone();
            diffops::curl_step(&grid, transform.real(), i, dx, &mut field.res, pool);
        }
        self.field.normalize();
        Ok(self.field.res())
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

//! Scalar precision abstraction.
//!
//! The whole pipeline is generic over one floating-point type: every buffer,
//! transform and variate fill uses the same element width, fixed when a field
//! is constructed. `Real` bundles the FFT, float-math, sampling and raw-byte
//! requirements so the rest of the crate can stay agnostic of `f32` vs `f64`.

use num_traits::{Float, FloatConst};
use rand::Rng;
use rand_distr::StandardNormal;
use rustfft::FftNum;

/// Floating-point scalar usable throughout the synthesis pipeline.
///
/// Implemented for `f32` (single precision) and `f64` (double precision).
/// Intermediate arithmetic that is not per-element (ladder scales, kernel
/// prefactors, reductions) runs in `f64` regardless; `Real` covers the
/// per-element storage and math.
pub trait Real: FftNum + Float + FloatConst {
    /// Dtype tag recorded in provenance manifests ("f32" / "f64").
    const DTYPE: &'static str;
    /// Element width in bytes for raw binary storage.
    const BYTES: usize;

    fn from_float(v: f64) -> Self;
    fn into_float(self) -> f64;

    /// Exact error function, evaluated in double precision.
    fn erf(self) -> Self;

    /// One standard-normal draw.
    fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> Self;

    /// One uniform draw in [0, 1).
    fn unit_uniform<R: Rng + ?Sized>(rng: &mut R) -> Self;

    fn write_le(self, buf: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
}

impl Real for f32 {
    const DTYPE: &'static str = "f32";
    const BYTES: usize = 4;

    #[inline]
    fn from_float(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn into_float(self) -> f64 {
        f64::from(self)
    }

    #[inline]
    fn erf(self) -> Self {
        statrs::function::erf::erf(f64::from(self)) as f32
    }

    #[inline]
    fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.sample(StandardNormal)
    }

    #[inline]
    fn unit_uniform<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.gen()
    }

    #[inline]
    fn write_le(self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

impl Real for f64 {
    const DTYPE: &'static str = "f64";
    const BYTES: usize = 8;

    #[inline]
    fn from_float(v: f64) -> Self {
        v
    }

    #[inline]
    fn into_float(self) -> f64 {
        self
    }

    #[inline]
    fn erf(self) -> Self {
        statrs::function::erf::erf(self)
    }

    #[inline]
    fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.sample(StandardNormal)
    }

    #[inline]
    fn unit_uniform<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.gen()
    }

    #[inline]
    fn write_le(self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        let mut b = [0u8; 8];
        b.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn erf_matches_known_values() {
        // erf(0) = 0, erf(inf) -> 1, erf is odd.
        assert_eq!(0.0f64.erf(), 0.0);
        // statrs evaluates erf to about ten digits, not full f64 precision.
        assert_abs_diff_eq!(1.0f64.erf(), 0.842_700_792_949_715, epsilon = 1e-10);
        assert_abs_diff_eq!((-1.0f64).erf(), -(1.0f64.erf()), epsilon = 1e-15);
        assert_abs_diff_eq!(2.0f32.erf(), 0.995_322_3, epsilon = 1e-6);
    }

    #[test]
    fn le_roundtrip_preserves_bits() {
        let mut buf = Vec::new();
        1.234_567_890_123_456_7f64.write_le(&mut buf);
        assert_eq!(buf.len(), f64::BYTES);
        assert_eq!(f64::read_le(&buf), 1.234_567_890_123_456_7);

        let mut buf = Vec::new();
        (-0.5f32).write_le(&mut buf);
        assert_eq!(buf.len(), f32::BYTES);
        assert_eq!(f32::read_le(&buf), -0.5);
    }
}

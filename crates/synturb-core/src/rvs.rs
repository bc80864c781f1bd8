//! Seeded random variate fills.
//!
//! Fills are chunked at a fixed size and each chunk gets its own generator,
//! seeded from (seed, stream, chunk index). The chunk layout never depends
//! on the thread count, so a given seed produces bit-identical buffers on
//! one thread or sixty-four. The stream counter advances once per fill,
//! which keeps successive fills from one source independent.

use num_complex::Complex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::scalar::Real;

/// Elements per independently-seeded chunk.
const FILL_CHUNK: usize = 1 << 15;

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Reproducible source of normal and uniform variates.
pub struct VariateSource {
    seed: u64,
    stream: u64,
}

impl VariateSource {
    /// `None` draws a seed from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            seed: seed.unwrap_or_else(rand::random),
            stream: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Restart the stream sequence, optionally with a new seed.
    pub fn reseed(&mut self, seed: Option<u64>) {
        self.seed = seed.unwrap_or_else(rand::random);
        self.stream = 0;
    }

    fn chunk_rng(&self, chunk: usize) -> StdRng {
        let base = splitmix64(self.seed) ^ splitmix64(self.stream.wrapping_mul(0xA076_1D64_78BD_642F));
        StdRng::seed_from_u64(splitmix64(base ^ (chunk as u64)))
    }

    /// Fill `out` with N(mean, sigma²) draws.
    pub fn fill_normal<T: Real>(&mut self, out: &mut [T], mean: f64, sigma: f64, pool: &ThreadPool) {
        let source = &*self;
        pool.install(|| {
            out.par_chunks_mut(FILL_CHUNK)
                .enumerate()
                .for_each(|(ci, chunk)| {
                    let mut rng = source.chunk_rng(ci);
                    let mean = T::from_float(mean);
                    let sigma = T::from_float(sigma);
                    for v in chunk.iter_mut() {
                        *v = mean + sigma * T::standard_normal(&mut rng);
                    }
                });
        });
        self.stream += 1;
    }

    /// Fill `out` with uniform draws in [low, high).
    pub fn fill_uniform<T: Real>(&mut self, out: &mut [T], low: f64, high: f64, pool: &ThreadPool) {
        let source = &*self;
        pool.install(|| {
            out.par_chunks_mut(FILL_CHUNK)
                .enumerate()
                .for_each(|(ci, chunk)| {
                    let mut rng = source.chunk_rng(ci);
                    let span = T::from_float(high - low);
                    let low = T::from_float(low);
                    for v in chunk.iter_mut() {
                        *v = low + span * T::unit_uniform(&mut rng);
                    }
                });
        });
        self.stream += 1;
    }

    /// Fill a complex buffer with independent N(mean, sigma²) real and
    /// imaginary parts. Chunking is per complex element.
    pub fn fill_normal_complex<T: Real>(
        &mut self,
        out: &mut [Complex<T>],
        mean: f64,
        sigma: f64,
        pool: &ThreadPool,
    ) {
        let source = &*self;
        pool.install(|| {
            out.par_chunks_mut(FILL_CHUNK)
                .enumerate()
                .for_each(|(ci, chunk)| {
                    let mut rng = source.chunk_rng(ci);
                    let mean = T::from_float(mean);
                    let sigma = T::from_float(sigma);
                    for c in chunk.iter_mut() {
                        c.re = mean + sigma * T::standard_normal(&mut rng);
                        c.im = mean + sigma * T::standard_normal(&mut rng);
                    }
                });
        });
        self.stream += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(threads: usize) -> ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
    }

    #[test]
    fn fills_are_independent_of_thread_count() {
        let len = 3 * FILL_CHUNK + 17;
        let mut a = vec![0.0f64; len];
        let mut b = vec![0.0f64; len];
        VariateSource::new(Some(7)).fill_normal(&mut a, 0.0, 1.0, &pool(1));
        VariateSource::new(Some(7)).fill_normal(&mut b, 0.0, 1.0, &pool(8));
        assert_eq!(a, b);
    }

    #[test]
    fn successive_fills_use_distinct_streams() {
        let mut source = VariateSource::new(Some(11));
        let mut a = vec![0.0f64; 256];
        let mut b = vec![0.0f64; 256];
        let pool = pool(2);
        source.fill_normal(&mut a, 0.0, 1.0, &pool);
        source.fill_normal(&mut b, 0.0, 1.0, &pool);
        assert_ne!(a, b);
    }

    #[test]
    fn normal_fill_matches_requested_moments() {
        let mut source = VariateSource::new(Some(3));
        let mut buf = vec![0.0f64; 1 << 18];
        source.fill_normal(&mut buf, 2.0, 0.5, &pool(4));
        let n = buf.len() as f64;
        let mean: f64 = buf.iter().sum::<f64>() / n;
        let var: f64 = buf.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        assert!((mean - 2.0).abs() < 5e-3, "mean {mean}");
        assert!((var - 0.25).abs() < 5e-3, "var {var}");
    }

    #[test]
    fn uniform_fill_stays_in_range() {
        let mut source = VariateSource::new(Some(5));
        let mut buf = vec![0.0f32; 1 << 16];
        source.fill_uniform(&mut buf, -1.0, 3.0, &pool(4));
        assert!(buf.iter().all(|v| (-1.0..3.0).contains(v)));
        let mean: f32 = buf.iter().sum::<f32>() / buf.len() as f32;
        assert!((mean - 1.0).abs() < 0.05, "mean {mean}");
    }

    #[test]
    fn complex_fill_is_reproducible() {
        let mut a = vec![Complex::new(0.0f64, 0.0); 1024];
        let mut b = vec![Complex::new(0.0f64, 0.0); 1024];
        VariateSource::new(Some(42)).fill_normal_complex(&mut a, 0.0, 1.0, &pool(1));
        VariateSource::new(Some(42)).fill_normal_complex(&mut b, 0.0, 1.0, &pool(4));
        assert_eq!(a, b);
    }
}

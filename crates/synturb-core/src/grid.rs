//! Periodic grid geometry and wavenumber bookkeeping.
//!
//! A `Grid` is a uniform periodic lattice of `size` points per axis in
//! `dimension` axes, spanning a box of physical length `l_box`. It owns the
//! integer wavenumber arrays used by every spectral kernel and the shape
//! arithmetic shared by the transform, the difference operators and the
//! interpolator. Immutable after construction.

use crate::error::FieldError;

/// Uniform periodic grid with precomputed wavenumbers.
///
/// Wavenumbers follow the standard discrete-frequency layout
/// (0, 1, ..., n/2-1, -n/2, ..., -1) in box units; the last axis is
/// truncated to n/2+1 entries for the real-valued half-spectrum transform.
#[derive(Debug, Clone)]
pub struct Grid {
    dimension: usize,
    size: usize,
    l_box: f64,
    /// Per-axis wavenumbers; the last axis holds only the half spectrum.
    wavenumbers: Vec<Vec<f64>>,
}

/// Discrete frequencies for `n` samples at unit box length.
///
/// Matches `numpy.fft.fftfreq(n, 1/n)`: integer cycles per box.
pub fn fftfreq(n: usize) -> Vec<f64> {
    let mut freq = vec![0.0; n];
    let half = n.div_ceil(2);
    for (i, f) in freq.iter_mut().enumerate() {
        *f = if i < half {
            i as f64
        } else {
            i as f64 - n as f64
        };
    }
    freq
}

impl Grid {
    pub fn new(dimension: usize, size: usize, l_box: f64) -> Result<Self, FieldError> {
        if dimension == 0 || dimension > 3 {
            return Err(FieldError::UnsupportedDimension(dimension));
        }
        if size < 2 {
            return Err(FieldError::InvalidGridSize(size));
        }
        let full = fftfreq(size);
        let mut wavenumbers: Vec<Vec<f64>> = vec![full.clone(); dimension - 1];
        wavenumbers.push(full[..size / 2 + 1].to_vec());
        Ok(Self {
            dimension,
            size,
            l_box,
            wavenumbers,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn l_box(&self) -> f64 {
        self.l_box
    }

    /// Physical grid spacing, `l_box / n`.
    pub fn dx(&self) -> f64 {
        self.l_box / self.size as f64
    }

    /// Grid spacing in box units, `1 / n`.
    pub fn dx_norm(&self) -> f64 {
        1.0 / self.size as f64
    }

    /// Number of points in a real-space plane, n^d.
    pub fn real_len(&self) -> usize {
        self.size.pow(self.dimension as u32)
    }

    /// Half-spectrum length of the last axis, n/2 + 1.
    pub fn spec_last(&self) -> usize {
        self.size / 2 + 1
    }

    /// Number of entries in a half-spectrum plane, n^(d-1) * (n/2+1).
    pub fn spec_len(&self) -> usize {
        self.size.pow(self.dimension as u32 - 1) * self.spec_last()
    }

    /// Wavenumber array for one axis (box units; last axis truncated).
    pub fn wavenumber(&self, axis: usize) -> &[f64] {
        &self.wavenumbers[axis]
    }

    /// Row-major stride of `axis` in a real-space plane.
    pub fn real_stride(&self, axis: usize) -> usize {
        self.size.pow((self.dimension - 1 - axis) as u32)
    }

    /// Row-major stride of `axis` in a half-spectrum plane.
    pub fn spec_stride(&self, axis: usize) -> usize {
        if axis == self.dimension - 1 {
            1
        } else {
            self.size.pow((self.dimension - 2 - axis) as u32) * self.spec_last()
        }
    }

    /// Squared-wavenumber contribution of the leading axes for one
    /// last-axis line of the half spectrum. Lines are indexed in row-major
    /// order over the leading axes.
    pub fn line_k2_prefix(&self, line: usize) -> f64 {
        match self.dimension {
            1 => 0.0,
            2 => {
                let k = self.wavenumbers[0][line];
                k * k
            }
            _ => {
                let i = line / self.size;
                let j = line % self.size;
                let ki = self.wavenumbers[0][i];
                let kj = self.wavenumbers[1][j];
                ki * ki + kj * kj
            }
        }
    }

    /// Number of last-axis lines in the half spectrum, n^(d-1).
    pub fn spec_lines(&self) -> usize {
        self.size.pow(self.dimension as u32 - 1)
    }
}

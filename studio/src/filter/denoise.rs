use fairytale_common::frame::Frame;

use super::traits::{reflect_101, FrameStage};

/// Standard deviation implied by a Gaussian kernel size when none is given.
pub fn sigma_for_kernel(ksize: usize) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1-D Gaussian weights, `ksize` taps centred on the middle one.
pub fn gaussian_kernel(ksize: usize, sigma: f32) -> Vec<f32> {
    let center = (ksize / 2) as f32;
    let scale = -0.5 / (sigma * sigma);
    let mut weights: Vec<f32> = (0..ksize)
        .map(|i| {
            let d = i as f32 - center;
            (scale * d * d).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// Gaussian smoothing with a square odd kernel, applied separably per axis.
///
/// Borders use reflect-101. Results are rounded back to 8 bits.
pub struct GaussianDenoise {
    kernel: Vec<f32>,
}

impl GaussianDenoise {
    /// `ksize` must be odd; sigma is derived from it.
    pub fn new(ksize: usize) -> Self {
        Self::with_sigma(ksize, sigma_for_kernel(ksize))
    }

    pub fn with_sigma(ksize: usize, sigma: f32) -> Self {
        Self {
            kernel: gaussian_kernel(ksize, sigma),
        }
    }
}

impl FrameStage for GaussianDenoise {
    fn apply(&self, frame: &Frame) -> Frame {
        let (h, w, c) = frame.shape();
        let radius = (self.kernel.len() / 2) as isize;
        let src = frame.data();

        let mut horizontal = vec![0f32; src.len()];
        for y in 0..h {
            let row = y * w * c;
            for x in 0..w {
                for ch in 0..c {
                    let mut acc = 0f32;
                    for (k, weight) in self.kernel.iter().enumerate() {
                        let sx = reflect_101(x as isize + k as isize - radius, w);
                        acc += weight * src[row + sx * c + ch] as f32;
                    }
                    horizontal[row + x * c + ch] = acc;
                }
            }
        }

        let mut out = vec![0u8; src.len()];
        for y in 0..h {
            for x in 0..w {
                for ch in 0..c {
                    let mut acc = 0f32;
                    for (k, weight) in self.kernel.iter().enumerate() {
                        let sy = reflect_101(y as isize + k as isize - radius, h);
                        acc += weight * horizontal[(sy * w + x) * c + ch];
                    }
                    out[(y * w + x) * c + ch] = acc.round().clamp(0.0, 255.0) as u8;
                }
            }
        }

        frame.with_pixels(out)
    }

    fn name(&self) -> &str {
        "gaussian-denoise"
    }
}

use fairytale_common::frame::Frame;

use super::traits::{reflect_101, FrameStage};

/// Passes of the domain transform; each halves the box width of the last.
const ITERATIONS: i32 = 3;

/// Edge-aware "storybook" abstraction.
///
/// Two steps:
/// 1. Edge-preserving smoothing with the domain transform (normalized
///    convolution variant). Pixels are averaged along rows and columns over
///    a window measured in a warped coordinate that stretches wherever colour
///    changes, so flat regions merge while strong edges stop the averaging.
///    `sigma_s` sets the spatial reach, `sigma_r` the colour-difference
///    scale (smaller keeps more edges).
/// 2. Outline darkening: the Sobel gradient magnitude of the smoothed image,
///    averaged over channels, scales each pixel by `1 - magnitude`.
pub struct DomainStylize {
    sigma_s: f32,
    sigma_r: f32,
}

impl DomainStylize {
    pub fn new(sigma_s: f32, sigma_r: f32) -> Self {
        Self { sigma_s, sigma_r }
    }
}

impl FrameStage for DomainStylize {
    fn apply(&self, frame: &Frame) -> Frame {
        let (h, w, c) = frame.shape();
        let img: Vec<f32> = frame.data().iter().map(|&v| v as f32 / 255.0).collect();

        let smoothed = self.edge_preserving_smooth(&img, h, w, c);
        let edges = edge_magnitude(&smoothed, h, w, c);

        let mut out = vec![0u8; img.len()];
        for (i, px) in out.chunks_exact_mut(c).enumerate() {
            let keep = 1.0 - edges[i];
            for ch in 0..c {
                let v = smoothed[i * c + ch] * keep * 255.0;
                px[ch] = v.round().clamp(0.0, 255.0) as u8;
            }
        }

        frame.with_pixels(out)
    }

    fn name(&self) -> &str {
        "domain-stylize"
    }
}

impl DomainStylize {
    fn edge_preserving_smooth(&self, img: &[f32], h: usize, w: usize, c: usize) -> Vec<f32> {
        let ratio = self.sigma_s / self.sigma_r;

        // Warped coordinates: cumulative 1 + ratio * |dI| along each row / column.
        let mut ct_rows = vec![0f32; h * w];
        for y in 0..h {
            for x in 1..w {
                let a = (y * w + x - 1) * c;
                let b = (y * w + x) * c;
                let diff: f32 = (0..c).map(|ch| (img[b + ch] - img[a + ch]).abs()).sum();
                ct_rows[y * w + x] = ct_rows[y * w + x - 1] + 1.0 + ratio * diff;
            }
        }
        let mut ct_cols = vec![0f32; h * w];
        for x in 0..w {
            for y in 1..h {
                let a = ((y - 1) * w + x) * c;
                let b = (y * w + x) * c;
                let diff: f32 = (0..c).map(|ch| (img[b + ch] - img[a + ch]).abs()).sum();
                // stored column-major so each column is a contiguous slice
                ct_cols[x * h + y] = ct_cols[x * h + y - 1] + 1.0 + ratio * diff;
            }
        }

        let mut out = img.to_vec();
        let mut line = Vec::new();
        let mut filtered = Vec::new();
        let norm = (4f32.powi(ITERATIONS) - 1.0).sqrt();

        for i in 0..ITERATIONS {
            let sigma_i = self.sigma_s * 3f32.sqrt() * 2f32.powi(ITERATIONS - (i + 1)) / norm;
            let radius = 3f32.sqrt() * sigma_i;

            for y in 0..h {
                let row = y * w * c..(y + 1) * w * c;
                line.clear();
                line.extend_from_slice(&out[row.clone()]);
                box_in_domain(&line, &ct_rows[y * w..(y + 1) * w], c, radius, &mut filtered);
                out[row].copy_from_slice(&filtered);
            }

            for x in 0..w {
                line.clear();
                for y in 0..h {
                    let p = (y * w + x) * c;
                    line.extend_from_slice(&out[p..p + c]);
                }
                box_in_domain(&line, &ct_cols[x * h..(x + 1) * h], c, radius, &mut filtered);
                for y in 0..h {
                    let p = (y * w + x) * c;
                    out[p..p + c].copy_from_slice(&filtered[y * c..(y + 1) * c]);
                }
            }
        }

        out
    }
}

/// Average every sample with all samples whose warped coordinate lies within
/// `radius` of its own. `ct` is non-decreasing, so the window bounds only
/// ever move forward.
fn box_in_domain(line: &[f32], ct: &[f32], c: usize, radius: f32, out: &mut Vec<f32>) {
    let n = ct.len();
    let mut prefix = vec![0f32; (n + 1) * c];
    for i in 0..n {
        for ch in 0..c {
            prefix[(i + 1) * c + ch] = prefix[i * c + ch] + line[i * c + ch];
        }
    }

    out.clear();
    out.resize(n * c, 0.0);
    let mut lo = 0;
    let mut hi = 0;
    for i in 0..n {
        while ct[lo] < ct[i] - radius {
            lo += 1;
        }
        while hi + 1 < n && ct[hi + 1] <= ct[i] + radius {
            hi += 1;
        }
        let count = (hi - lo + 1) as f32;
        for ch in 0..c {
            out[i * c + ch] = (prefix[(hi + 1) * c + ch] - prefix[lo * c + ch]) / count;
        }
    }
}

/// Per-pixel Sobel gradient magnitude, averaged over channels.
fn edge_magnitude(img: &[f32], h: usize, w: usize, c: usize) -> Vec<f32> {
    let at = |x: isize, y: isize, ch: usize| -> f32 {
        let sx = reflect_101(x, w);
        let sy = reflect_101(y, h);
        img[(sy * w + sx) * c + ch]
    };

    let mut mag = vec![0f32; h * w];
    for y in 0..h as isize {
        for x in 0..w as isize {
            let mut total = 0f32;
            for ch in 0..c {
                let gx = (at(x + 1, y - 1, ch) + 2.0 * at(x + 1, y, ch) + at(x + 1, y + 1, ch))
                    - (at(x - 1, y - 1, ch) + 2.0 * at(x - 1, y, ch) + at(x - 1, y + 1, ch));
                let gy = (at(x - 1, y + 1, ch) + 2.0 * at(x, y + 1, ch) + at(x + 1, y + 1, ch))
                    - (at(x - 1, y - 1, ch) + 2.0 * at(x, y - 1, ch) + at(x + 1, y - 1, ch));
                total += (gx * gx + gy * gy).sqrt();
            }
            mag[y as usize * w + x as usize] = total / c as f32;
        }
    }
    mag
}

//! Fixed-layout feature extraction over a canonical face crop.
//!
//! The slot layout is a compatibility contract: templates encode positions,
//! so reordering or resizing any family silently breaks every stored
//! template.
//!
//! | slots    | family                                        |
//! |----------|-----------------------------------------------|
//! | 0..32    | LBP texture histogram (first 32 of 256 bins)  |
//! | 32..39   | log-scaled Hu moment invariants               |
//! | 39..55   | Sobel gradient orientation histogram          |
//! | 55..63   | Gabor filter bank response energies           |
//! | 63..75   | quadrant intensity statistics                 |
//! | 75..78   | eye-candidate layout                          |
//! | 78..86   | quadrant spectral statistics                  |
//! | 86..128  | zero padding                                  |

use crate::encoding::ENCODING_LEN;
use crate::fft::{self, Complex};
use crate::locator;
use crate::preprocess::resize_bilinear;
use crate::types::Frame;
use thiserror::Error;

/// Canonical square size every crop is resized to before extraction.
pub const CANONICAL_SIZE: u32 = 128;
/// Crops below this edge length carry too little texture to encode.
pub const MIN_CROP_SIZE: u32 = 32;
/// Slots carrying measured values; everything past this is zero padding.
pub const POPULATED_LEN: usize = 86;

const GABOR_KERNEL_SIZE: i32 = 21;
const GABOR_SIGMA: f64 = 3.0;
const GABOR_GAMMA: f64 = 0.5;
const GABOR_ANGLES_DEG: [f64; 4] = [0.0, 45.0, 90.0, 135.0];
const GABOR_FREQUENCIES: [f64; 2] = [0.1, 0.3];

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("face crop too small ({width}x{height}, minimum {MIN_CROP_SIZE}x{MIN_CROP_SIZE})")]
    CropTooSmall { width: u32, height: u32 },
}

/// Extract the raw (un-normalized) feature vector from a face crop.
///
/// Always returns exactly [`ENCODING_LEN`] finite values on success.
pub fn extract(crop: &Frame) -> Result<Vec<f64>, FeatureError> {
    if crop.width() < MIN_CROP_SIZE || crop.height() < MIN_CROP_SIZE {
        return Err(FeatureError::CropTooSmall {
            width: crop.width(),
            height: crop.height(),
        });
    }

    let g = resize_bilinear(crop, CANONICAL_SIZE, CANONICAL_SIZE);

    let mut slots = Vec::with_capacity(ENCODING_LEN);
    slots.extend(lbp_histogram(&g));
    slots.extend(hu_moments(&g));
    slots.extend(gradient_orientation_histogram(&g));
    slots.extend(gabor_energies(&g));
    slots.extend(quadrant_intensity_stats(&g));
    slots.extend(eye_layout(&g));
    slots.extend(quadrant_spectral_stats(&g));

    slots.truncate(ENCODING_LEN);
    slots.resize(ENCODING_LEN, 0.0);
    Ok(slots)
}

fn population_stats(vals: &[f64]) -> (f64, f64) {
    let n = vals.len() as f64;
    let mean = vals.iter().sum::<f64>() / n;
    let var = vals.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// The four quadrants of the canonical crop as half-open rectangles.
fn quadrants(size: usize) -> [(usize, usize, usize, usize); 4] {
    let m = size / 2;
    [(0, 0, m, m), (m, 0, size, m), (0, m, m, size), (m, m, size, size)]
}

/// First 32 bins of the 8-neighbor local binary pattern histogram,
/// normalized by the total interior pixel count.
fn lbp_histogram(g: &Frame) -> Vec<f64> {
    let w = g.width() as usize;
    let h = g.height() as usize;
    let px = g.data();

    // Circular neighbor offsets, nearest-pixel, starting east.
    let mut offsets = [(0i32, 0i32); 8];
    for (k, off) in offsets.iter_mut().enumerate() {
        let a = 2.0 * std::f64::consts::PI * k as f64 / 8.0;
        *off = (a.cos().round() as i32, a.sin().round() as i32);
    }

    let mut hist = [0u32; 256];
    for i in 1..h - 1 {
        for j in 1..w - 1 {
            let c = px[i * w + j];
            let mut pat = 0u8;
            for (k, &(dr, dc)) in offsets.iter().enumerate() {
                let ni = (i as i32 + dr) as usize;
                let nj = (j as i32 + dc) as usize;
                if px[ni * w + nj] >= c {
                    pat |= 1 << k;
                }
            }
            hist[pat as usize] += 1;
        }
    }

    let total: u32 = hist.iter().sum();
    if total == 0 {
        return vec![0.0; 32];
    }
    hist[..32].iter().map(|&c| c as f64 / total as f64).collect()
}

/// Seven Hu moment invariants, signed-log scaled so they sit in a usable
/// numeric range.
fn hu_moments(g: &Frame) -> Vec<f64> {
    let w = g.width() as usize;
    let h = g.height() as usize;
    let px = g.data();

    let (mut m00, mut m10, mut m01) = (0.0f64, 0.0f64, 0.0f64);
    let (mut m20, mut m11, mut m02) = (0.0f64, 0.0f64, 0.0f64);
    let (mut m30, mut m21, mut m12, mut m03) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);

    for y in 0..h {
        let yf = y as f64;
        for x in 0..w {
            let xf = x as f64;
            let v = px[y * w + x] as f64;
            m00 += v;
            m10 += xf * v;
            m01 += yf * v;
            m20 += xf * xf * v;
            m11 += xf * yf * v;
            m02 += yf * yf * v;
            m30 += xf * xf * xf * v;
            m21 += xf * xf * yf * v;
            m12 += xf * yf * yf * v;
            m03 += yf * yf * yf * v;
        }
    }

    if m00 == 0.0 {
        return vec![0.0; 7];
    }

    let xb = m10 / m00;
    let yb = m01 / m00;

    let mu20 = m20 - xb * m10;
    let mu02 = m02 - yb * m01;
    let mu11 = m11 - xb * m01;
    let mu30 = m30 - 3.0 * xb * m20 + 2.0 * xb * xb * m10;
    let mu03 = m03 - 3.0 * yb * m02 + 2.0 * yb * yb * m01;
    let mu21 = m21 - 2.0 * xb * m11 - yb * m20 + 2.0 * xb * xb * m01;
    let mu12 = m12 - 2.0 * yb * m11 - xb * m02 + 2.0 * yb * yb * m10;

    let norm = |mu: f64, order: f64| mu / m00.powf(1.0 + order / 2.0);
    let n20 = norm(mu20, 2.0);
    let n02 = norm(mu02, 2.0);
    let n11 = norm(mu11, 2.0);
    let n30 = norm(mu30, 3.0);
    let n03 = norm(mu03, 3.0);
    let n21 = norm(mu21, 3.0);
    let n12 = norm(mu12, 3.0);

    let h1 = n20 + n02;
    let h2 = (n20 - n02).powi(2) + 4.0 * n11 * n11;
    let h3 = (n30 - 3.0 * n12).powi(2) + (3.0 * n21 - n03).powi(2);
    let h4 = (n30 + n12).powi(2) + (n21 + n03).powi(2);
    let h5 = (n30 - 3.0 * n12)
        * (n30 + n12)
        * ((n30 + n12).powi(2) - 3.0 * (n21 + n03).powi(2))
        + (3.0 * n21 - n03) * (n21 + n03) * (3.0 * (n30 + n12).powi(2) - (n21 + n03).powi(2));
    let h6 = (n20 - n02) * ((n30 + n12).powi(2) - (n21 + n03).powi(2))
        + 4.0 * n11 * (n30 + n12) * (n21 + n03);
    let h7 = (3.0 * n21 - n03)
        * (n30 + n12)
        * ((n30 + n12).powi(2) - 3.0 * (n21 + n03).powi(2))
        - (n30 - 3.0 * n12) * (n21 + n03) * (3.0 * (n30 + n12).powi(2) - (n21 + n03).powi(2));

    [h1, h2, h3, h4, h5, h6, h7]
        .iter()
        .map(|&v| {
            let sgn = if v > 0.0 {
                1.0
            } else if v < 0.0 {
                -1.0
            } else {
                0.0
            };
            -sgn * (v.abs() + 1e-10).log10()
        })
        .collect()
}

/// 16-bin histogram of Sobel gradient orientations over interior pixels.
fn gradient_orientation_histogram(g: &Frame) -> Vec<f64> {
    let w = g.width() as usize;
    let h = g.height() as usize;
    let px = g.data();
    let at = |x: usize, y: usize| px[y * w + x] as i32;

    let mut hist = [0u32; 16];
    let mut total = 0u64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = (at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x - 1, y) + at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x, y - 1) + at(x + 1, y - 1));
            let a = (gy as f64).atan2(gx as f64);
            let bin = (((a + std::f64::consts::PI) / (2.0 * std::f64::consts::PI)) * 16.0) as usize;
            hist[bin.min(15)] += 1;
            total += 1;
        }
    }

    hist.iter().map(|&c| c as f64 / (total as f64 + 1e-10)).collect()
}

/// Gabor kernel sampled on a [`GABOR_KERNEL_SIZE`] square grid.
fn gabor_kernel(theta_deg: f64, frequency: f64) -> Vec<Vec<f64>> {
    let theta = theta_deg.to_radians();
    let lambda = 2.0 * std::f64::consts::PI * frequency;
    let half = GABOR_KERNEL_SIZE / 2;

    let mut kernel = Vec::with_capacity(GABOR_KERNEL_SIZE as usize);
    for y in -half..=half {
        let mut row = Vec::with_capacity(GABOR_KERNEL_SIZE as usize);
        for x in -half..=half {
            let xf = x as f64;
            let yf = y as f64;
            let xp = xf * theta.cos() + yf * theta.sin();
            let yp = -xf * theta.sin() + yf * theta.cos();
            let envelope =
                (-(xp * xp + GABOR_GAMMA * GABOR_GAMMA * yp * yp) / (2.0 * GABOR_SIGMA * GABOR_SIGMA))
                    .exp();
            row.push(envelope * (2.0 * std::f64::consts::PI * xp / lambda).cos());
        }
        kernel.push(row);
    }
    kernel
}

/// Response energy (standard deviation of the filtered image) for each of
/// the 4 orientations x 2 frequencies. Convolution is circular via the FFT,
/// so one forward transform of the crop is shared by all eight filters.
fn gabor_energies(g: &Frame) -> Vec<f64> {
    let size = g.width() as usize;
    let n = size * size;
    let image_f = fft::fft2d_of_pixels(g.data(), size);

    let half = (GABOR_KERNEL_SIZE / 2) as i64;
    let mut energies = Vec::with_capacity(8);

    for &theta in &GABOR_ANGLES_DEG {
        for &freq in &GABOR_FREQUENCIES {
            let kernel = gabor_kernel(theta, freq);

            // Center the kernel on the origin with wrap-around.
            let mut padded: Vec<Complex> = vec![(0.0, 0.0); n];
            for (ky, row) in kernel.iter().enumerate() {
                for (kx, &kv) in row.iter().enumerate() {
                    let y = (ky as i64 - half).rem_euclid(size as i64) as usize;
                    let x = (kx as i64 - half).rem_euclid(size as i64) as usize;
                    padded[y * size + x] = (kv, 0.0);
                }
            }
            fft::fft2d_in_place(&mut padded, size);

            let mut product: Vec<Complex> = image_f
                .iter()
                .zip(&padded)
                .map(|(&(ar, ai), &(br, bi))| (ar * br - ai * bi, ar * bi + ai * br))
                .collect();
            fft::ifft2d_in_place(&mut product, size);

            let vals: Vec<f64> = product
                .iter()
                .map(|&(re, _)| re.round().clamp(0.0, 255.0))
                .collect();
            let (_, std) = population_stats(&vals);
            energies.push(std);
        }
    }

    energies
}

/// Mean, standard deviation and intensity range for each quadrant.
fn quadrant_intensity_stats(g: &Frame) -> Vec<f64> {
    let size = g.width() as usize;
    let px = g.data();

    let mut out = Vec::with_capacity(12);
    for (x0, y0, x1, y1) in quadrants(size) {
        let mut vals = Vec::with_capacity((x1 - x0) * (y1 - y0));
        let mut lo = u8::MAX;
        let mut hi = u8::MIN;
        for y in y0..y1 {
            for x in x0..x1 {
                let v = px[y * size + x];
                lo = lo.min(v);
                hi = hi.max(v);
                vals.push(v as f64);
            }
        }
        let (mean, std) = population_stats(&vals);
        out.push(mean);
        out.push(std);
        out.push((hi - lo) as f64);
    }
    out
}

/// Eye-candidate layout: count, mean candidate area, horizontal spread.
fn eye_layout(g: &Frame) -> Vec<f64> {
    let eyes = locator::locate_eyes(g);
    if eyes.is_empty() {
        return vec![0.0, 0.0, 0.0];
    }
    let n = eyes.len() as f64;
    let mean_area = eyes.iter().map(|e| (e.w * e.h) as f64).sum::<f64>() / n;
    let xs: Vec<f64> = eyes.iter().map(|e| e.x as f64).collect();
    let (_, x_spread) = population_stats(&xs);
    vec![n, mean_area, x_spread]
}

/// Mean and standard deviation of the log-scaled spectrum per quadrant.
///
/// Raw FFT magnitudes span several orders within one crop; log1p keeps the
/// spectral slots commensurate with the other families after z-scoring.
fn quadrant_spectral_stats(g: &Frame) -> Vec<f64> {
    let size = g.width() as usize;
    let mag: Vec<f64> = fft::fft2d_magnitude(g.data(), size)
        .iter()
        .map(|&m| m.ln_1p())
        .collect();

    let mut out = Vec::with_capacity(8);
    for (x0, y0, x1, y1) in quadrants(size) {
        let mut vals = Vec::with_capacity((x1 - x0) * (y1 - y0));
        for y in y0..y1 {
            for x in x0..x1 {
                vals.push(mag[y * size + x]);
            }
        }
        let (mean, std) = population_stats(&vals);
        out.push(mean);
        out.push(std);
    }
    out
}

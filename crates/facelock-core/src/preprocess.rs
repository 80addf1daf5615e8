//! Shared image kernels — bilinear resize, histogram equalization,
//! edge-preserving smoothing, integral images.
//!
//! Everything operates on grayscale [`Frame`]s and is a pure function of
//! its input.

use crate::types::Frame;

/// Resize using bilinear interpolation with half-pixel centers.
pub fn resize_bilinear(src: &Frame, new_w: u32, new_h: u32) -> Frame {
    let w = src.width() as usize;
    let h = src.height() as usize;
    let nw = new_w as usize;
    let nh = new_h as usize;

    let sx = w as f64 / nw as f64;
    let sy = h as f64 / nh as f64;

    let mut out = vec![0u8; nw * nh];
    for y in 0..nh {
        let fy = (y as f64 + 0.5) * sy - 0.5;
        let y0 = (fy.floor() as i64).clamp(0, h as i64 - 1) as usize;
        let y1 = (y0 + 1).min(h - 1);
        let dy = (fy - fy.floor()).clamp(0.0, 1.0);

        for x in 0..nw {
            let fx = (x as f64 + 0.5) * sx - 0.5;
            let x0 = (fx.floor() as i64).clamp(0, w as i64 - 1) as usize;
            let x1 = (x0 + 1).min(w - 1);
            let dx = (fx - fx.floor()).clamp(0.0, 1.0);

            let tl = src.data()[y0 * w + x0] as f64;
            let tr = src.data()[y0 * w + x1] as f64;
            let bl = src.data()[y1 * w + x0] as f64;
            let br = src.data()[y1 * w + x1] as f64;

            let val = tl * (1.0 - dx) * (1.0 - dy)
                + tr * dx * (1.0 - dy)
                + bl * (1.0 - dx) * dy
                + br * dx * dy;

            out[y * nw + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    Frame::new(out, new_w, new_h).expect("resize buffer matches dimensions")
}

/// Global histogram equalization.
///
/// Builds the cumulative distribution over all 256 intensities and remaps
/// each pixel so the output histogram is approximately flat. Improves
/// detection contrast on under- or over-exposed captures.
pub fn equalize_hist(src: &Frame) -> Frame {
    let total = src.data().len();

    let mut hist = [0u32; 256];
    for &v in src.data() {
        hist[v as usize] += 1;
    }

    let mut cdf = [0u64; 256];
    let mut acc = 0u64;
    for i in 0..256 {
        acc += hist[i] as u64;
        cdf[i] = acc;
    }

    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    let denom = total as u64 - cdf_min;

    let mut lut = [0u8; 256];
    for i in 0..256 {
        lut[i] = if denom == 0 {
            // Constant image: nothing to equalize.
            i as u8
        } else if cdf[i] < cdf_min {
            0
        } else {
            (((cdf[i] - cdf_min) as f64 / denom as f64) * 255.0)
                .round()
                .clamp(0.0, 255.0) as u8
        };
    }

    let data = src.data().iter().map(|&v| lut[v as usize]).collect();
    Frame::new(data, src.width(), src.height()).expect("lut preserves length")
}

const BILATERAL_RADIUS: i32 = 2;
const BILATERAL_SIGMA_SPACE: f64 = 2.0;
const BILATERAL_SIGMA_RANGE: f64 = 40.0;

/// Edge-preserving bilateral smoothing (5x5 neighborhood).
///
/// Weights each neighbor by spatial distance and intensity similarity, so
/// sensor noise is flattened while face boundaries stay sharp. Border
/// pixels use clamped sampling.
pub fn bilateral_smooth(src: &Frame) -> Frame {
    let w = src.width() as i32;
    let h = src.height() as i32;
    let r = BILATERAL_RADIUS;

    // Spatial weights are fixed per offset; range weights are a 256-entry
    // lookup over absolute intensity difference.
    let dim = (2 * r + 1) as usize;
    let mut spatial = vec![0.0f64; dim * dim];
    for dy in -r..=r {
        for dx in -r..=r {
            let d2 = (dx * dx + dy * dy) as f64;
            spatial[((dy + r) as usize) * dim + (dx + r) as usize] =
                (-d2 / (2.0 * BILATERAL_SIGMA_SPACE * BILATERAL_SIGMA_SPACE)).exp();
        }
    }
    let mut range = [0.0f64; 256];
    for (d, slot) in range.iter_mut().enumerate() {
        let d2 = (d * d) as f64;
        *slot = (-d2 / (2.0 * BILATERAL_SIGMA_RANGE * BILATERAL_SIGMA_RANGE)).exp();
    }

    let mut out = vec![0u8; src.data().len()];
    for y in 0..h {
        for x in 0..w {
            let center = src.pixel(x as u32, y as u32);
            let mut num = 0.0f64;
            let mut den = 0.0f64;
            for dy in -r..=r {
                let yy = (y + dy).clamp(0, h - 1) as u32;
                for dx in -r..=r {
                    let xx = (x + dx).clamp(0, w - 1) as u32;
                    let v = src.pixel(xx, yy);
                    let wgt = spatial[((dy + r) as usize) * dim + (dx + r) as usize]
                        * range[(v as i16 - center as i16).unsigned_abs() as usize];
                    num += wgt * v as f64;
                    den += wgt;
                }
            }
            out[(y * w + x) as usize] = (num / den).round().clamp(0.0, 255.0) as u8;
        }
    }

    Frame::new(out, src.width(), src.height()).expect("filter preserves length")
}

/// Summed-area tables over intensity and squared intensity, for O(1)
/// rectangular mean and variance queries during window scanning.
pub struct IntegralImage {
    sum: Vec<u64>,
    sq: Vec<u64>,
    width: usize,
    height: usize,
}

impl IntegralImage {
    pub fn build(frame: &Frame) -> Self {
        let w = frame.width() as usize;
        let h = frame.height() as usize;
        // (w+1) x (h+1) tables with a zero first row/column.
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sq = vec![0u64; stride * (h + 1)];

        for y in 0..h {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = frame.data()[y * w + x] as u64;
                row_sum += v;
                row_sq += v * v;
                sum[(y + 1) * stride + (x + 1)] = sum[y * stride + (x + 1)] + row_sum;
                sq[(y + 1) * stride + (x + 1)] = sq[y * stride + (x + 1)] + row_sq;
            }
        }

        Self {
            sum,
            sq,
            width: w,
            height: h,
        }
    }

    #[inline]
    fn rect_sum(table: &[u64], stride: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0]
    }

    /// Mean intensity over the half-open rectangle [x0,x1) x [y0,y1).
    pub fn region_mean(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return 0.0;
        }
        let area = ((x1 - x0) * (y1 - y0)) as f64;
        Self::rect_sum(&self.sum, self.width + 1, x0, y0, x1, y1) as f64 / area
    }

    /// Population variance over the half-open rectangle [x0,x1) x [y0,y1).
    pub fn region_variance(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return 0.0;
        }
        let area = ((x1 - x0) * (y1 - y0)) as f64;
        let stride = self.width + 1;
        let mean = Self::rect_sum(&self.sum, stride, x0, y0, x1, y1) as f64 / area;
        let sq_mean = Self::rect_sum(&self.sq, stride, x0, y0, x1, y1) as f64 / area;
        (sq_mean - mean * mean).max(0.0)
    }
}

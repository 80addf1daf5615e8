//! Cascade-style face localization.
//!
//! A multi-scale sliding window is screened by a short sequence of
//! integral-image contrast stages (variance, eye-band/cheek contrast,
//! eye-socket/bridge contrast, bilateral symmetry, cheek smoothness).
//! Windows that survive every stage are grouped into candidates, filtered
//! by plausibility, and the best candidate is scored by size and
//! centeredness.
//!
//! Detection runs through a descending ladder of sensitivity tiers, from
//! strict to permissive: the first tier that yields any grouped candidate
//! wins. The tier parameters are empirically tuned; treat the ordering and
//! thresholds as a compatibility contract, not as incidental values.

use crate::preprocess::IntegralImage;
use crate::types::{FaceRegion, Frame};
use thiserror::Error;

// --- Window screening stages ---
const STAGE_MIN_VARIANCE: f64 = 144.0;
const STAGE_EYE_CHEEK_CONTRAST: f64 = 10.0;
const STAGE_BRIDGE_CONTRAST: f64 = 5.0;
const STAGE_SYMMETRY_TOLERANCE: f64 = 25.0;
const STAGE_CHEEK_MAX_VARIANCE: f64 = 900.0;

// --- Candidate plausibility filters ---
const MIN_AREA_RATIO: f64 = 0.01;
const MAX_AREA_RATIO: f64 = 0.8;
const MIN_ASPECT_RATIO: f64 = 0.7;
const MAX_ASPECT_RATIO: f64 = 1.4;

// --- Selection and crop expansion ---
const AREA_SCORE_WEIGHT: f64 = 0.6;
const CENTER_SCORE_WEIGHT: f64 = 0.4;
const CROP_MARGIN_RATIO: f64 = 0.15;

// --- Grouping ---
const GROUP_POSITION_EPS: f64 = 0.2;
const GROUP_MAX_SIZE_RATIO: f64 = 1.3;

// --- Eye detector ---
const EYE_MIN_SIZE: u32 = 12;
const EYE_MAX_SIZE: u32 = 40;
const EYE_SCALE_STEP: f64 = 1.2;
const EYE_SCAN_STEP: usize = 2;
const EYE_BLOB_CONTRAST: f64 = 30.0;
const EYE_MIN_NEIGHBORS: usize = 3;

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("no face detected")]
    NoFaceDetected,
}

/// One detector sensitivity configuration.
#[derive(Debug, Clone)]
pub struct DetectionTier {
    /// Multiplier between successive window scales (> 1.0).
    pub scale_factor: f64,
    /// Minimum raw windows per cluster for a candidate to survive grouping.
    pub min_neighbors: usize,
    pub min_size: u32,
    pub max_size: u32,
}

#[derive(Debug, Clone)]
pub struct LocatorConfig {
    /// Sensitivity ladder, strict first. The first tier producing at least
    /// one grouped candidate terminates the scan.
    pub tiers: Vec<DetectionTier>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                DetectionTier { scale_factor: 1.1, min_neighbors: 5, min_size: 60, max_size: 300 },
                DetectionTier { scale_factor: 1.1, min_neighbors: 4, min_size: 50, max_size: 400 },
                DetectionTier { scale_factor: 1.2, min_neighbors: 3, min_size: 40, max_size: 500 },
                DetectionTier { scale_factor: 1.3, min_neighbors: 3, min_size: 30, max_size: 600 },
            ],
        }
    }
}

/// Internal rectangle used during scanning and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

pub struct FaceLocator {
    config: LocatorConfig,
}

impl Default for FaceLocator {
    fn default() -> Self {
        Self::new(LocatorConfig::default())
    }
}

impl FaceLocator {
    pub fn new(config: LocatorConfig) -> Self {
        Self { config }
    }

    /// Find the most plausible face region in a frame.
    ///
    /// Pure function of the frame; returns [`LocateError::NoFaceDetected`]
    /// when no candidate survives any tier.
    pub fn locate(&self, frame: &Frame) -> Result<FaceRegion, LocateError> {
        let integral = IntegralImage::build(frame);

        for (tier_idx, tier) in self.config.tiers.iter().enumerate() {
            let raw = scan_windows(frame, &integral, tier);
            let candidates = group_rects(&raw, tier.min_neighbors);
            if candidates.is_empty() {
                continue;
            }
            tracing::debug!(
                tier = tier_idx,
                raw = raw.len(),
                grouped = candidates.len(),
                "detection tier produced candidates"
            );

            // The first tier with grouped candidates decides the outcome.
            // If none of them is a plausible face, the frame has no face;
            // falling through to a more permissive tier is not allowed.
            return select_best(frame, &candidates).ok_or(LocateError::NoFaceDetected);
        }

        Err(LocateError::NoFaceDetected)
    }
}

/// Fraction of the window size, rounded to pixels.
#[inline]
fn at(size: u32, fraction: f64) -> usize {
    (fraction * size as f64).round() as usize
}

/// Screening cascade for one window. All stages must pass.
fn window_passes(ii: &IntegralImage, x: usize, y: usize, size: u32) -> bool {
    let f = |a: f64| at(size, a);

    // 1. The window must have texture at all.
    if ii.region_variance(x + f(0.1), y + f(0.1), x + f(0.9), y + f(0.9)) < STAGE_MIN_VARIANCE {
        return false;
    }

    // 2. The eye band sits darker than the cheek band below it.
    let eye_band = ii.region_mean(x + f(0.15), y + f(0.20), x + f(0.85), y + f(0.45));
    let cheek_band = ii.region_mean(x + f(0.20), y + f(0.48), x + f(0.80), y + f(0.68));
    if cheek_band - eye_band < STAGE_EYE_CHEEK_CONTRAST {
        return false;
    }

    // 3. Both eye sockets are darker than the nose bridge between them.
    let bridge = ii.region_mean(x + f(0.42), y + f(0.22), x + f(0.58), y + f(0.42));
    let left_eye = ii.region_mean(x + f(0.18), y + f(0.22), x + f(0.42), y + f(0.42));
    let right_eye = ii.region_mean(x + f(0.58), y + f(0.22), x + f(0.82), y + f(0.42));
    if bridge - left_eye < STAGE_BRIDGE_CONTRAST || bridge - right_eye < STAGE_BRIDGE_CONTRAST {
        return false;
    }

    // 4. Faces are roughly bilaterally symmetric in mean intensity.
    let left_half = ii.region_mean(x + f(0.15), y + f(0.20), x + f(0.50), y + f(0.80));
    let right_half = ii.region_mean(x + f(0.50), y + f(0.20), x + f(0.85), y + f(0.80));
    if (left_half - right_half).abs() > STAGE_SYMMETRY_TOLERANCE {
        return false;
    }

    // 5. The cheek band is smooth skin, not periodic or noisy texture.
    if ii.region_variance(x + f(0.20), y + f(0.48), x + f(0.80), y + f(0.68))
        > STAGE_CHEEK_MAX_VARIANCE
    {
        return false;
    }

    true
}

/// Slide square windows across the frame at every scale in the tier.
fn scan_windows(frame: &Frame, ii: &IntegralImage, tier: &DetectionTier) -> Vec<Rect> {
    let w = frame.width() as usize;
    let h = frame.height() as usize;
    let limit = w.min(h) as u32;

    let mut raw = Vec::new();
    let mut scale = tier.min_size as f64;
    loop {
        let size = scale as u32;
        if size > limit || size > tier.max_size {
            break;
        }
        let isz = size as usize;
        let step = (isz / 16).max(2);
        let mut y = 0usize;
        while y + isz <= h {
            let mut x = 0usize;
            while x + isz <= w {
                if window_passes(ii, x, y, size) {
                    raw.push(Rect { x: x as u32, y: y as u32, w: size, h: size });
                }
                x += step;
            }
            y += step;
        }
        scale *= tier.scale_factor;
    }
    raw
}

/// Whether two rectangles are close enough in position and size to belong
/// to the same detection cluster.
fn rects_similar(a: &Rect, b: &Rect) -> bool {
    let mean_size = (a.w + b.w) as f64 / 2.0;
    let eps = GROUP_POSITION_EPS * mean_size;
    let size_ratio = a.w.max(b.w) as f64 / a.w.min(b.w) as f64;
    (a.x as f64 - b.x as f64).abs() <= eps
        && (a.y as f64 - b.y as f64).abs() <= eps
        && size_ratio <= GROUP_MAX_SIZE_RATIO
}

/// Cluster raw windows and keep the averaged rectangle of every cluster
/// with at least `min_neighbors` members. Deterministic: clusters form in
/// input order and are compared against their first member.
pub(crate) fn group_rects(raw: &[Rect], min_neighbors: usize) -> Vec<Rect> {
    let mut clusters: Vec<Vec<Rect>> = Vec::new();

    for &r in raw {
        let mut placed = false;
        for cluster in clusters.iter_mut() {
            if rects_similar(&r, &cluster[0]) {
                cluster.push(r);
                placed = true;
                break;
            }
        }
        if !placed {
            clusters.push(vec![r]);
        }
    }

    clusters
        .into_iter()
        .filter(|c| c.len() >= min_neighbors.max(1))
        .map(|c| {
            let n = c.len() as u32;
            Rect {
                x: c.iter().map(|r| r.x).sum::<u32>() / n,
                y: c.iter().map(|r| r.y).sum::<u32>() / n,
                w: c.iter().map(|r| r.w).sum::<u32>() / n,
                h: c.iter().map(|r| r.h).sum::<u32>() / n,
            }
        })
        .collect()
}

/// Filter candidates by area/aspect plausibility, score the survivors by
/// size and centeredness, and expand the winner by the crop margin.
fn select_best(frame: &Frame, candidates: &[Rect]) -> Option<FaceRegion> {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let frame_area = fw * fh;

    let valid: Vec<&Rect> = candidates
        .iter()
        .filter(|r| {
            let area_ratio = (r.w as f64 * r.h as f64) / frame_area;
            let aspect = r.w as f64 / r.h as f64;
            (MIN_AREA_RATIO..=MAX_AREA_RATIO).contains(&area_ratio)
                && (MIN_ASPECT_RATIO..=MAX_ASPECT_RATIO).contains(&aspect)
        })
        .collect();

    if valid.is_empty() {
        return None;
    }

    let max_area = valid
        .iter()
        .map(|r| r.w as f64 * r.h as f64)
        .fold(0.0, f64::max);
    let center_x = fw / 2.0;
    let center_y = fh / 2.0;
    let max_dist = center_x.hypot(center_y);

    let mut best: Option<(&Rect, f64)> = None;
    for r in &valid {
        let rcx = r.x as f64 + r.w as f64 / 2.0;
        let rcy = r.y as f64 + r.h as f64 / 2.0;
        let centeredness = 1.0 - (rcx - center_x).hypot(rcy - center_y) / max_dist;
        let area_score = (r.w as f64 * r.h as f64) / max_area;
        let score = AREA_SCORE_WEIGHT * area_score + CENTER_SCORE_WEIGHT * centeredness;
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((r, score));
        }
    }

    let (r, score) = best?;

    // Expand by the crop margin, clamped to the frame.
    let mx = (r.w as f64 * CROP_MARGIN_RATIO) as u32;
    let my = (r.h as f64 * CROP_MARGIN_RATIO) as u32;
    let x0 = r.x.saturating_sub(mx);
    let y0 = r.y.saturating_sub(my);
    let x1 = (r.x + r.w + mx).min(frame.width());
    let y1 = (r.y + r.h + my).min(frame.height());

    Some(FaceRegion {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
        quality: score,
    })
}

/// Secondary dark-blob eye detector, run on the canonical face crop.
///
/// A small dark window surrounded by a brighter ring is an eye candidate;
/// candidates are grouped exactly like face windows. Returns the grouped
/// rectangles (possibly none).
pub(crate) fn locate_eyes(frame: &Frame) -> Vec<Rect> {
    let w = frame.width() as usize;
    let h = frame.height() as usize;
    let ii = IntegralImage::build(frame);

    let mut raw = Vec::new();
    let mut scale = EYE_MIN_SIZE as f64;
    loop {
        let size = scale as u32;
        let isz = size as usize;
        if (isz * 3) / 2 >= w.min(h) || size > EYE_MAX_SIZE {
            break;
        }
        let ring = (isz / 4).max(2);
        let mut y = ring;
        while y + isz + ring < h {
            let mut x = ring;
            while x + isz + ring < w {
                let core = ii.region_mean(x, y, x + isz, y + isz);
                let outer_area = ((isz + 2 * ring) * (isz + 2 * ring) - isz * isz) as f64;
                let outer_sum = ii.region_mean(x - ring, y - ring, x + isz + ring, y + isz + ring)
                    * ((isz + 2 * ring) * (isz + 2 * ring)) as f64
                    - core * (isz * isz) as f64;
                let surround = outer_sum / outer_area;
                if surround - core >= EYE_BLOB_CONTRAST {
                    raw.push(Rect { x: x as u32, y: y as u32, w: size, h: size });
                }
                x += EYE_SCAN_STEP;
            }
            y += EYE_SCAN_STEP;
        }
        scale *= EYE_SCALE_STEP;
    }

    group_rects(&raw, EYE_MIN_NEIGHBORS)
}

use crate::encoding::Encoding;
use serde::{Deserialize, Serialize};

/// A grayscale image buffer, row-major, one byte per pixel.
///
/// Frames are ephemeral: captured, encoded, discarded. Only the resulting
/// [`Encoding`] ever leaves the core.
#[derive(Clone)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("zero-sized frame ({width}x{height})")]
    ZeroSized { width: u32, height: u32 },
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroSized { width, height });
        }
        let expected = (width as usize) * (height as usize);
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Build a frame filled with a single intensity. Handy for tests and
    /// padding; dimensions must be non-zero.
    pub fn filled(value: u8, width: u32, height: u32) -> Result<Self, FrameError> {
        Self::new(
            vec![value; (width as usize) * (height as usize)],
            width,
            height,
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.data[(y as usize) * (self.width as usize) + (x as usize)]
    }

    /// Average pixel intensity (0.0–255.0).
    pub fn mean_brightness(&self) -> f64 {
        self.data.iter().map(|&b| b as f64).sum::<f64>() / self.data.len() as f64
    }

    /// Mean absolute per-pixel difference against another frame.
    ///
    /// Returns `None` when dimensions differ (nothing meaningful to compare).
    pub fn mean_abs_diff(&self, other: &Frame) -> Option<f64> {
        if self.width != other.width || self.height != other.height {
            return None;
        }
        let sum: u64 = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| (a as i16 - b as i16).unsigned_abs() as u64)
            .sum();
        Some(sum as f64 / self.data.len() as f64)
    }

    /// Extract a sub-frame. The rectangle is clamped to the frame bounds.
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Frame {
        let x0 = x.min(self.width.saturating_sub(1));
        let y0 = y.min(self.height.saturating_sub(1));
        let x1 = (x.saturating_add(w)).min(self.width).max(x0 + 1);
        let y1 = (y.saturating_add(h)).min(self.height).max(y0 + 1);

        let cw = x1 - x0;
        let ch = y1 - y0;
        let mut data = Vec::with_capacity((cw as usize) * (ch as usize));
        for row in y0..y1 {
            let start = (row as usize) * (self.width as usize) + (x0 as usize);
            data.extend_from_slice(&self.data[start..start + cw as usize]);
        }
        Frame {
            data,
            width: cw,
            height: ch,
        }
    }
}

/// Axis-aligned face rectangle within a frame, plus a selection quality score.
///
/// Produced by the locator, consumed immediately by the feature extractor.
/// Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Combined area/centeredness score in [0, 1]; higher is better.
    pub quality: f64,
}

impl FaceRegion {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// An enrolled template: one encoding persisted per identity.
///
/// The core treats the encoding as an opaque comparison subject; storage
/// and lifecycle belong to the persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub identity: String,
    pub label: String,
    pub encoding: Encoding,
    pub created_at: String,
}

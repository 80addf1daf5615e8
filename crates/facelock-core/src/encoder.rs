//! Full-frame to encoding pipeline.

use crate::encoding::{Encoding, EncodingError};
use crate::features::{self, FeatureError, MIN_CROP_SIZE};
use crate::locator::{FaceLocator, LocateError, LocatorConfig};
use crate::preprocess::{bilateral_smooth, equalize_hist};
use crate::types::{FaceRegion, Frame};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    NoFace(#[from] LocateError),
    #[error("detected face too small ({width}x{height}, minimum {MIN_CROP_SIZE}x{MIN_CROP_SIZE})")]
    FaceTooSmall { width: u32, height: u32 },
    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodingError),
}

/// Encodes a grayscale frame into a biometric [`Encoding`].
///
/// Pipeline: contrast equalization and edge-preserving smoothing for
/// detection only, face localization, crop of the *original* frame (the
/// extractor sees unfiltered pixels), feature extraction, z-score
/// normalization.
pub struct FaceEncoder {
    locator: FaceLocator,
}

impl Default for FaceEncoder {
    fn default() -> Self {
        Self::new(LocatorConfig::default())
    }
}

impl FaceEncoder {
    pub fn new(config: LocatorConfig) -> Self {
        Self { locator: FaceLocator::new(config) }
    }

    /// Encode the single most plausible face in the frame.
    pub fn encode(&self, frame: &Frame) -> Result<Encoding, EncodeError> {
        let (encoding, _) = self.encode_with_region(frame)?;
        Ok(encoding)
    }

    /// Like [`encode`](Self::encode), also returning where the face was.
    pub fn encode_with_region(
        &self,
        frame: &Frame,
    ) -> Result<(Encoding, FaceRegion), EncodeError> {
        let prepared = bilateral_smooth(&equalize_hist(frame));
        let region = self.locator.locate(&prepared)?;
        tracing::debug!(
            x = region.x,
            y = region.y,
            width = region.width,
            height = region.height,
            quality = region.quality,
            "face located"
        );

        let crop = frame.crop(region.x, region.y, region.width, region.height);
        let raw = features::extract(&crop).map_err(|e| match e {
            FeatureError::CropTooSmall { width, height } => {
                EncodeError::FaceTooSmall { width, height }
            }
        })?;
        let encoding = Encoding::normalized(&raw)?;
        Ok((encoding, region))
    }

    /// Locate without encoding; diagnostic surface.
    pub fn locate(&self, frame: &Frame) -> Result<FaceRegion, LocateError> {
        let prepared = bilateral_smooth(&equalize_hist(frame));
        self.locator.locate(&prepared)
    }
}

//! facelock-core — Face encoding and matching engine.
//!
//! A deterministic, classical computer-vision pipeline: cascade-style face
//! localization, a fixed-length 128-element feature encoding (LBP, Hu
//! moments, gradient orientation, Gabor energy, regional and spectral
//! statistics), multi-sample enrollment with quality gates, and
//! multi-metric distance matching with a confidence score.
//!
//! Everything here is a pure, synchronous computation over caller-owned
//! buffers. No I/O, no hidden state, no panics on bad input — all failures
//! are explicit `Result` values.

pub mod encoder;
pub mod encoding;
pub mod enroll;
pub mod features;
pub mod fft;
pub mod locator;
pub mod matcher;
pub mod preprocess;
pub mod types;

#[cfg(test)]
mod testimg;

pub use encoder::{EncodeError, FaceEncoder};
pub use encoding::{Encoding, EncodingError, ENCODING_LEN};
pub use enroll::{EnrollmentConfig, EnrollmentSession, QualityGates, RejectReason, SampleOutcome};
pub use locator::{DetectionTier, FaceLocator, LocateError, LocatorConfig};
pub use matcher::{FusedMatcher, MatchError, MatchOutcome, Matcher, MatchingEngine, DEFAULT_THRESHOLD};
pub use types::{FaceRegion, Frame, Template};

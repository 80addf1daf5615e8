//! Multi-sample enrollment session.
//!
//! Frames are offered one at a time. Each frame passes a brightness gate
//! and a motion gate (a frame that differs too much from the previous one
//! is motion-blurred or mid-movement and would poison the template), then
//! runs through the encoder. Accepted samples accumulate until the target
//! count is reached; the final template is the element-wise mean of the
//! samples, renormalized.

use crate::encoder::FaceEncoder;
use crate::encoding::{Encoding, EncodingError, ENCODING_LEN};
use crate::types::Frame;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct QualityGates {
    /// Mean frame brightness below this is rejected as too dark.
    pub min_brightness: f64,
    /// Mean frame brightness above this is rejected as too bright.
    pub max_brightness: f64,
    /// Mean absolute per-pixel difference against the previous offered
    /// frame above this is rejected as excess motion.
    pub motion_threshold: f64,
}

impl Default for QualityGates {
    fn default() -> Self {
        Self { min_brightness: 50.0, max_brightness: 200.0, motion_threshold: 15.0 }
    }
}

#[derive(Debug, Clone)]
pub struct EnrollmentConfig {
    pub samples_required: usize,
    pub gates: QualityGates,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self { samples_required: 5, gates: QualityGates::default() }
    }
}

/// Why an offered frame did not produce a sample.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    TooDark { brightness: f64 },
    TooBright { brightness: f64 },
    ExcessMotion { delta: f64 },
    NoValidFace,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooDark { brightness } => write!(f, "frame too dark ({brightness:.1})"),
            Self::TooBright { brightness } => write!(f, "frame too bright ({brightness:.1})"),
            Self::ExcessMotion { delta } => {
                write!(f, "excess motion between frames ({delta:.1})")
            }
            Self::NoValidFace => write!(f, "no valid face in frame"),
        }
    }
}

/// Result of offering one frame to the session.
#[derive(Debug)]
pub enum SampleOutcome {
    /// The frame produced a sample; more are needed.
    Accepted { collected: usize, required: usize },
    /// The frame was discarded; no sample slot was consumed.
    Rejected(RejectReason),
    /// The final sample was collected and the template is ready.
    Complete(Encoding),
}

#[derive(Debug, Error)]
pub enum EnrollError {
    #[error("enrollment session is already complete")]
    AlreadyComplete,
    #[error("enrollment session was cancelled")]
    Cancelled,
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

#[derive(Debug, PartialEq)]
enum Phase {
    Collecting,
    Complete,
    Cancelled,
}

/// State machine driving one enrollment. All state lives here; sessions
/// are independent and single-use.
pub struct EnrollmentSession {
    config: EnrollmentConfig,
    encoder: FaceEncoder,
    samples: Vec<Encoding>,
    reference: Option<Frame>,
    phase: Phase,
}

impl EnrollmentSession {
    pub fn new(config: EnrollmentConfig) -> Self {
        Self::with_encoder(config, FaceEncoder::default())
    }

    pub fn with_encoder(config: EnrollmentConfig, encoder: FaceEncoder) -> Self {
        Self {
            config,
            encoder,
            samples: Vec::new(),
            reference: None,
            phase: Phase::Collecting,
        }
    }

    pub fn collected(&self) -> usize {
        self.samples.len()
    }

    pub fn required(&self) -> usize {
        self.config.samples_required
    }

    pub fn is_finished(&self) -> bool {
        self.phase != Phase::Collecting
    }

    /// Abandon the session. Nothing is emitted; further offers fail.
    pub fn cancel(&mut self) {
        if self.phase == Phase::Collecting {
            self.phase = Phase::Cancelled;
        }
    }

    /// Offer the next captured frame.
    pub fn offer_frame(&mut self, frame: &Frame) -> Result<SampleOutcome, EnrollError> {
        match self.phase {
            Phase::Complete => return Err(EnrollError::AlreadyComplete),
            Phase::Cancelled => return Err(EnrollError::Cancelled),
            Phase::Collecting => {}
        }

        let brightness = frame.mean_brightness();
        if brightness < self.config.gates.min_brightness {
            return Ok(SampleOutcome::Rejected(RejectReason::TooDark { brightness }));
        }
        if brightness > self.config.gates.max_brightness {
            return Ok(SampleOutcome::Rejected(RejectReason::TooBright { brightness }));
        }

        // The motion reference always tracks the last frame that reached
        // this gate, accepted or not, so a subject that settles down is
        // compared against the latest capture rather than an old one.
        let delta = self
            .reference
            .replace(frame.clone())
            .as_ref()
            .and_then(|prev| frame.mean_abs_diff(prev));
        if let Some(delta) = delta {
            if delta > self.config.gates.motion_threshold {
                return Ok(SampleOutcome::Rejected(RejectReason::ExcessMotion { delta }));
            }
        }

        let encoding = match self.encoder.encode(frame) {
            Ok(enc) => enc,
            Err(err) => {
                tracing::debug!(error = %err, "enrollment frame rejected by encoder");
                return Ok(SampleOutcome::Rejected(RejectReason::NoValidFace));
            }
        };

        self.samples.push(encoding);
        tracing::info!(
            collected = self.samples.len(),
            required = self.config.samples_required,
            "enrollment sample accepted"
        );

        if self.samples.len() >= self.config.samples_required {
            let template = self.finalize()?;
            self.phase = Phase::Complete;
            return Ok(SampleOutcome::Complete(template));
        }

        Ok(SampleOutcome::Accepted {
            collected: self.samples.len(),
            required: self.config.samples_required,
        })
    }

    /// Element-wise mean of the collected samples, renormalized.
    fn finalize(&self) -> Result<Encoding, EncodingError> {
        let n = self.samples.len() as f64;
        let mut mean = vec![0.0f64; ENCODING_LEN];
        for sample in &self.samples {
            for (slot, v) in mean.iter_mut().zip(sample.as_slice()) {
                *slot += v;
            }
        }
        for slot in mean.iter_mut() {
            *slot /= n;
        }
        Encoding::normalized(&mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testimg;

    fn two_sample_config() -> EnrollmentConfig {
        EnrollmentConfig { samples_required: 2, ..EnrollmentConfig::default() }
    }

    #[test]
    fn test_brightness_gates() {
        let mut session = EnrollmentSession::new(EnrollmentConfig::default());

        let dark = Frame::filled(30, 160, 160).unwrap();
        assert!(matches!(
            session.offer_frame(&dark).unwrap(),
            SampleOutcome::Rejected(RejectReason::TooDark { .. })
        ));

        let bright = Frame::filled(220, 160, 160).unwrap();
        assert!(matches!(
            session.offer_frame(&bright).unwrap(),
            SampleOutcome::Rejected(RejectReason::TooBright { .. })
        ));

        assert_eq!(session.collected(), 0);
    }

    #[test]
    fn test_motion_gate_rejects_moving_subject() {
        let mut session = EnrollmentSession::new(two_sample_config());

        assert!(matches!(
            session.offer_frame(&testimg::face_frame()).unwrap(),
            SampleOutcome::Accepted { collected: 1, .. }
        ));

        // A large jump between consecutive frames is excess motion.
        let moved = testimg::shifted_face_frame(22, 0, 1, 0);
        assert!(matches!(
            session.offer_frame(&moved).unwrap(),
            SampleOutcome::Rejected(RejectReason::ExcessMotion { .. })
        ));
        assert_eq!(session.collected(), 1);

        // The reference advanced to the rejected frame, so a subject that
        // holds the new position is accepted on the next offer.
        assert!(matches!(
            session.offer_frame(&moved).unwrap(),
            SampleOutcome::Complete(_)
        ));
    }

    #[test]
    fn test_faceless_frame_consumes_no_slot() {
        let mut session = EnrollmentSession::new(two_sample_config());
        let blank = Frame::filled(100, 160, 160).unwrap();
        assert!(matches!(
            session.offer_frame(&blank).unwrap(),
            SampleOutcome::Rejected(RejectReason::NoValidFace)
        ));
        assert_eq!(session.collected(), 0);
        assert!(!session.is_finished());
    }

    #[test]
    fn test_completion_produces_normalized_template() {
        let frame = testimg::face_frame();
        let mut session = EnrollmentSession::new(two_sample_config());
        session.offer_frame(&frame).unwrap();
        let outcome = session.offer_frame(&frame).unwrap();
        let SampleOutcome::Complete(template) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert!(session.is_finished());

        let mean: f64 =
            template.as_slice().iter().sum::<f64>() / template.as_slice().len() as f64;
        assert!(mean.abs() < 1e-6);

        // Identical samples: the template is the renormalized mean, which
        // collapses to the per-sample encoding itself.
        let single = crate::encoder::FaceEncoder::default().encode(&frame).unwrap();
        for (t, e) in template.as_slice().iter().zip(single.as_slice()) {
            assert!((t - e).abs() < 1e-6);
        }

        // Sealed: further frames are an error, not a silent no-op.
        assert!(matches!(
            session.offer_frame(&testimg::face_frame()),
            Err(EnrollError::AlreadyComplete)
        ));
    }

    #[test]
    fn test_cancellation_poisons_session() {
        let mut session = EnrollmentSession::new(two_sample_config());
        session.offer_frame(&testimg::face_frame()).unwrap();
        session.cancel();
        assert!(session.is_finished());
        assert!(matches!(
            session.offer_frame(&testimg::face_frame()),
            Err(EnrollError::Cancelled)
        ));
    }
}

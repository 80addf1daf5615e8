//! End-to-end pipeline properties: enroll from synthetic captures, then
//! verify that the enrolled subject is accepted and an unrelated probe is
//! not mistaken for them.

use facelock_core::{
    features, EnrollmentConfig, EnrollmentSession, Encoding, FaceEncoder, MatchingEngine,
    SampleOutcome, Template, DEFAULT_THRESHOLD,
};
use facelock_core::types::Frame;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Flat-shaded frontal face in a 160x160 frame: skin block on a dark
/// background, two darker eye rectangles, a mouth bar, optional per-pixel
/// noise. Enough structure to satisfy every detector stage.
fn face_frame(fx: u32, fy: u32, seed: u64, noise_amp: i32) -> Frame {
    let (w, h, fs) = (160u32, 160u32, 80u32);
    let (bg, skin, eye, mouth) = (40u8, 190u8, 70u8, 90u8);
    let mut data = vec![bg; (w * h) as usize];

    let mut rect = |x0: u32, y0: u32, x1: u32, y1: u32, v: u8| {
        for y in y0..y1.min(h) {
            for x in x0..x1.min(w) {
                data[(y * w + x) as usize] = v;
            }
        }
    };

    let at = |frac: f64| (fs as f64 * frac) as u32;
    rect(fx, fy, fx + fs, fy + fs, skin);
    let es = at(0.18);
    let ey = fy + at(0.24);
    let eh = (es as f64 * 0.8) as u32;
    rect(fx + at(0.18), ey, fx + at(0.18) + es, ey + eh, eye);
    rect(fx + at(0.64), ey, fx + at(0.64) + es, ey + eh, eye);
    rect(fx + at(0.30), fy + at(0.70), fx + at(0.70), fy + at(0.82), mouth);

    if noise_amp > 0 {
        let mut rng = StdRng::seed_from_u64(seed);
        for v in data.iter_mut() {
            *v = (*v as i32 + rng.gen_range(-noise_amp..=noise_amp)).clamp(0, 255) as u8;
        }
    }

    Frame::new(data, w, h).unwrap()
}

fn noise_frame(size: u32, seed: u64) -> Frame {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<u8> = (0..(size * size) as usize).map(|_| rng.gen()).collect();
    Frame::new(data, size, size).unwrap()
}

/// Run a full enrollment over noisy captures of the canonical face.
///
/// The subject holds still; only sensor noise varies between captures,
/// which keeps the frame-to-frame difference under the motion gate.
fn enroll_canonical_face() -> Encoding {
    let mut session = EnrollmentSession::new(EnrollmentConfig::default());
    for i in 0..5u64 {
        let frame = face_frame(40, 40, 20 + i, 6);
        match session.offer_frame(&frame).unwrap() {
            SampleOutcome::Accepted { .. } => {}
            SampleOutcome::Complete(template) => return template,
            SampleOutcome::Rejected(reason) => panic!("capture {i} rejected: {reason}"),
        }
    }
    panic!("enrollment did not complete after all captures");
}

fn as_template(encoding: Encoding) -> Template {
    Template {
        id: "tpl-1".to_string(),
        identity: "alice".to_string(),
        label: "default".to_string(),
        encoding,
        created_at: "2026-01-01T00:00:00Z".to_string(),
    }
}

#[test]
fn test_enrolled_subject_is_accepted() {
    let template = as_template(enroll_canonical_face());

    // A fresh capture of the same subject, noise the session never saw.
    let probe = FaceEncoder::default()
        .encode(&face_frame(40, 40, 99, 6))
        .expect("probe face must encode");

    let outcome = MatchingEngine::new()
        .authenticate(&probe, std::slice::from_ref(&template), DEFAULT_THRESHOLD)
        .unwrap();

    assert!(outcome.accepted, "same subject rejected at d={}", outcome.distance);
    assert_eq!(outcome.identity.as_deref(), Some("alice"));
    assert!(
        outcome.confidence > 0.5,
        "same-subject confidence too low: {}",
        outcome.confidence
    );
}

#[test]
fn test_unrelated_pattern_is_rejected() {
    let template = as_template(enroll_canonical_face());

    // End to end, verifying against a random pattern rejects at any
    // threshold: the pattern holds no face, so the probe-building step
    // refuses to encode it and matching never runs.
    assert!(FaceEncoder::default().encode(&noise_frame(160, 77)).is_err());

    // Even an encoding forced out of the pattern by bypassing the locator
    // must sit far from the template. Unrelated textures concentrate near
    // distance 0.29 while fresh captures of the enrolled subject land near
    // 0.06, so assert the separation at a strict threshold.
    let raw = features::extract(&noise_frame(128, 77)).unwrap();
    let imposter = Encoding::normalized(&raw).unwrap();
    let strict = 0.12;
    let outcome = MatchingEngine::new()
        .authenticate(&imposter, std::slice::from_ref(&template), strict)
        .unwrap();

    assert!(!outcome.accepted, "imposter accepted at d={}", outcome.distance);
    assert!(outcome.distance > 2.0 * strict, "imposter too close: {}", outcome.distance);
    assert_eq!(outcome.identity, None);
    assert_eq!(outcome.confidence, 0.0);

    // The genuine subject still clears the same strict threshold.
    let probe = FaceEncoder::default()
        .encode(&face_frame(40, 40, 99, 6))
        .unwrap();
    let genuine = MatchingEngine::new()
        .authenticate(&probe, std::slice::from_ref(&template), strict)
        .unwrap();
    assert!(genuine.accepted, "genuine subject rejected at d={}", genuine.distance);
    assert!(
        genuine.distance < outcome.distance / 2.0,
        "separation eroded: genuine {} vs imposter {}",
        genuine.distance,
        outcome.distance
    );
}

#[test]
fn test_frames_without_faces_never_encode() {
    let encoder = FaceEncoder::default();
    assert!(encoder.encode(&Frame::filled(128, 160, 160).unwrap()).is_err());
    assert!(encoder.encode(&noise_frame(160, 5)).is_err());
}

//! Template matching: fused multi-metric distance and accept decision.

use crate::encoding::Encoding;
use crate::features::POPULATED_LEN;
use crate::types::Template;
use serde::Serialize;
use thiserror::Error;

/// Default accept threshold on the fused distance.
pub const DEFAULT_THRESHOLD: f64 = 0.6;

const WEIGHT_EUCLIDEAN: f64 = 0.4;
const WEIGHT_COSINE: f64 = 0.3;
const WEIGHT_MANHATTAN: f64 = 0.2;
const WEIGHT_CORRELATION: f64 = 0.1;

/// Distance between two encodings, in [0, 1]; lower is more similar.
pub trait Matcher {
    fn distance(&self, a: &Encoding, b: &Encoding) -> f64;
}

/// The production distance: a weighted fusion of dimension-normalized
/// euclidean, cosine, dimension-normalized manhattan and Pearson
/// correlation terms, clipped to [0, 2] and halved.
///
/// No single metric is robust across all feature families; the fusion
/// keeps one pathological family from dominating the decision.
///
/// Only the populated feature slots take part in the comparison. The
/// padding slots are a per-encoding constant, so between any two
/// encodings they agree almost exactly and drag every distance toward
/// zero regardless of content.
#[derive(Debug, Default, Clone, Copy)]
pub struct FusedMatcher;

impl Matcher for FusedMatcher {
    fn distance(&self, a: &Encoding, b: &Encoding) -> f64 {
        let len = POPULATED_LEN.min(a.len()).min(b.len());
        let x = &a.as_slice()[..len];
        let y = &b.as_slice()[..len];
        // Identical encodings are distance zero by definition; the sqrt in
        // the cosine term would otherwise leave rounding dust.
        if x == y {
            return 0.0;
        }
        let n = x.len() as f64;

        let euclidean = x
            .iter()
            .zip(y)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
            / n.sqrt();

        let dot: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
        let norm_x = x.iter().map(|v| v * v).sum::<f64>().sqrt();
        let norm_y = y.iter().map(|v| v * v).sum::<f64>().sqrt();
        let cosine = if norm_x > 0.0 && norm_y > 0.0 {
            dot / (norm_x * norm_y)
        } else {
            0.0
        };

        let manhattan = x.iter().zip(y).map(|(a, b)| (a - b).abs()).sum::<f64>() / n;

        let mean_x = x.iter().sum::<f64>() / n;
        let mean_y = y.iter().sum::<f64>() / n;
        let cov: f64 = x
            .iter()
            .zip(y)
            .map(|(a, b)| (a - mean_x) * (b - mean_y))
            .sum();
        let dev_x = x.iter().map(|v| (v - mean_x) * (v - mean_x)).sum::<f64>().sqrt();
        let dev_y = y.iter().map(|v| (v - mean_y) * (v - mean_y)).sum::<f64>().sqrt();
        let correlation = if dev_x > 0.0 && dev_y > 0.0 {
            cov / (dev_x * dev_y)
        } else {
            0.0
        };

        let combined = WEIGHT_EUCLIDEAN * euclidean
            + WEIGHT_COSINE * (1.0 - cosine)
            + WEIGHT_MANHATTAN * manhattan
            + WEIGHT_CORRELATION * (1.0 - correlation.abs());

        combined.clamp(0.0, 2.0) / 2.0
    }
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("no enrolled templates")]
    NoEnrolledTemplates,
}

/// Authentication decision. A rejection names no identity; it still
/// reports the best distance found so callers can log margins.
#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    pub accepted: bool,
    pub template_id: Option<String>,
    pub identity: Option<String>,
    pub label: Option<String>,
    pub distance: f64,
    pub confidence: f64,
    pub threshold: f64,
}

/// Scans enrolled templates for the closest match to a probe encoding.
#[derive(Debug, Default)]
pub struct MatchingEngine<M: Matcher = FusedMatcher> {
    matcher: M,
}

impl MatchingEngine<FusedMatcher> {
    pub fn new() -> Self {
        Self { matcher: FusedMatcher }
    }
}

impl<M: Matcher> MatchingEngine<M> {
    pub fn with_matcher(matcher: M) -> Self {
        Self { matcher }
    }

    /// Compare the probe against every template and decide.
    ///
    /// The accept decision is a strict `distance < threshold`; ties between
    /// equally distant templates resolve to the earliest in the slice.
    pub fn authenticate(
        &self,
        probe: &Encoding,
        templates: &[Template],
        threshold: f64,
    ) -> Result<MatchOutcome, MatchError> {
        let mut best: Option<(&Template, f64)> = None;
        for template in templates {
            let d = self.matcher.distance(probe, &template.encoding);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((template, d));
            }
        }

        let (template, distance) = best.ok_or(MatchError::NoEnrolledTemplates)?;
        let accepted = distance < threshold;
        let confidence = (1.0 - distance / threshold).max(0.0);

        tracing::info!(
            identity = %template.identity,
            distance,
            threshold,
            accepted,
            "authentication decision"
        );

        if !accepted {
            return Ok(MatchOutcome {
                accepted: false,
                template_id: None,
                identity: None,
                label: None,
                distance,
                confidence,
                threshold,
            });
        }

        Ok(MatchOutcome {
            accepted: true,
            template_id: Some(template.id.clone()),
            identity: Some(template.identity.clone()),
            label: Some(template.label.clone()),
            distance,
            confidence,
            threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::ENCODING_LEN;

    fn encoding_from(raw: impl Fn(usize) -> f64) -> Encoding {
        Encoding::normalized(&(0..ENCODING_LEN).map(raw).collect::<Vec<_>>()).unwrap()
    }

    fn template(id: &str, identity: &str, encoding: Encoding) -> Template {
        Template {
            id: id.to_string(),
            identity: identity.to_string(),
            label: "test".to_string(),
            encoding,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_distance_ignores_padding_slots() {
        let populated: Vec<f64> = (0..POPULATED_LEN).map(|i| (i as f64 * 0.37).sin()).collect();
        let mut a = populated.clone();
        a.resize(ENCODING_LEN, 0.0);
        let mut b = populated;
        b.resize(ENCODING_LEN, -0.5);

        let a = Encoding::from_vec(a).unwrap();
        let b = Encoding::from_vec(b).unwrap();
        assert_eq!(FusedMatcher.distance(&a, &b), 0.0);
    }

    #[test]
    fn test_distance_identity_is_exactly_zero() {
        let e = encoding_from(|i| (i as f64 * 0.37).sin());
        assert_eq!(FusedMatcher.distance(&e, &e.clone()), 0.0);
    }

    #[test]
    fn test_distance_symmetric_and_bounded() {
        let a = encoding_from(|i| (i as f64 * 0.37).sin());
        let b = encoding_from(|i| (i as f64 * 0.91).cos());
        let d_ab = FusedMatcher.distance(&a, &b);
        let d_ba = FusedMatcher.distance(&b, &a);
        assert!((d_ab - d_ba).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&d_ab));
        assert!(d_ab > 0.1, "unrelated encodings should not look close: {d_ab}");
    }

    #[test]
    fn test_distance_small_perturbation_stays_small() {
        let a = encoding_from(|i| (i as f64 * 0.37).sin());
        let b = encoding_from(|i| (i as f64 * 0.37).sin() + 0.01 * (i % 5) as f64);
        assert!(FusedMatcher.distance(&a, &b) < 0.05);
    }

    #[test]
    fn test_authenticate_empty_store_is_explicit() {
        let probe = encoding_from(|i| i as f64);
        let engine = MatchingEngine::new();
        assert!(matches!(
            engine.authenticate(&probe, &[], DEFAULT_THRESHOLD),
            Err(MatchError::NoEnrolledTemplates)
        ));
    }

    #[test]
    fn test_authenticate_picks_closest_template() {
        let target = encoding_from(|i| (i as f64 * 0.37).sin());
        let other = encoding_from(|i| (i as f64 * 0.91).cos());
        let templates = vec![
            template("t-far", "mallory", other),
            template("t-near", "alice", target.clone()),
        ];

        let outcome = MatchingEngine::new()
            .authenticate(&target, &templates, DEFAULT_THRESHOLD)
            .unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.template_id.as_deref(), Some("t-near"));
        assert_eq!(outcome.identity.as_deref(), Some("alice"));
        assert_eq!(outcome.distance, 0.0);
        assert!((outcome.confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_authenticate_tie_resolves_to_first() {
        let e = encoding_from(|i| (i as f64 * 0.37).sin());
        let templates = vec![
            template("t-one", "alice", e.clone()),
            template("t-two", "alice", e.clone()),
        ];
        let outcome = MatchingEngine::new()
            .authenticate(&e, &templates, DEFAULT_THRESHOLD)
            .unwrap();
        assert_eq!(outcome.template_id.as_deref(), Some("t-one"));
    }

    #[test]
    fn test_authenticate_reject_reports_distance() {
        let probe = encoding_from(|i| (i as f64 * 0.37).sin());
        let far = encoding_from(|i| (i as f64 * 0.91).cos());
        let templates = vec![template("t", "alice", far)];

        // A strict threshold turns the same comparison into a reject.
        let d = MatchingEngine::new()
            .authenticate(&probe, &templates, DEFAULT_THRESHOLD)
            .unwrap()
            .distance;
        let outcome = MatchingEngine::new()
            .authenticate(&probe, &templates, d / 2.0)
            .unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.identity, None);
        assert_eq!(outcome.template_id, None);
        assert_eq!(outcome.distance, d);
        assert_eq!(outcome.confidence, 0.0);
    }
}

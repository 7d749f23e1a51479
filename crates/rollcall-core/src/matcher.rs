//! Heuristic face matcher.
//!
//! Each enrolled payload is scored against the probe with the first strategy
//! that applies, in fixed priority order:
//!
//! 1. signature distance (mean absolute per-cell difference),
//! 2. exact content hash (score 0, only on equality),
//! 3. string similarity of the two captures (score `100 - percent`, only
//!    when the similarity reaches the comparability cutoff).
//!
//! The lowest score wins; the winner is accepted only under its strategy's
//! own bound.

use crate::payload::FacePayload;
use crate::similarity;
use serde::{Deserialize, Serialize};
use std::fmt;

// --- Default thresholds ---
const DEFAULT_SIGNATURE_MAX_DISTANCE: f64 = 60.0;
const DEFAULT_SIMILARITY_COMPARABLE: f64 = 92.0;
const DEFAULT_SIMILARITY_ACCEPT: f64 = 88.0;

/// Comparison strategy that produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Signature,
    Hash,
    Similarity,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Signature => "signature",
            Strategy::Hash => "hash",
            Strategy::Similarity => "similarity",
        })
    }
}

/// Acceptance bounds for each strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Highest mean signature distance accepted as a match.
    pub signature_max_distance: f64,
    /// Minimum similarity (percent) for two captures to be compared at all.
    pub similarity_comparable: f64,
    /// Minimum similarity (percent) accepted as a match.
    pub similarity_accept: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            signature_max_distance: DEFAULT_SIGNATURE_MAX_DISTANCE,
            similarity_comparable: DEFAULT_SIMILARITY_COMPARABLE,
            similarity_accept: DEFAULT_SIMILARITY_ACCEPT,
        }
    }
}

impl Thresholds {
    /// Whether `score` produced by `strategy` is good enough to accept.
    pub fn accepts(&self, strategy: Strategy, score: f64) -> bool {
        match strategy {
            Strategy::Signature => score <= self.signature_max_distance,
            Strategy::Hash => score == 0.0,
            Strategy::Similarity => score <= 100.0 - self.similarity_accept,
        }
    }
}

/// An enrolled face to compare against.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub employee_id: String,
    pub full_name: String,
    pub payload: FacePayload,
}

/// Outcome of matching a probe against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Best (lowest) score seen, if any candidate was comparable.
    pub score: Option<f64>,
    /// Strategy that produced `score`.
    pub strategy: Option<Strategy>,
    /// Matched employee (only when `matched`).
    pub employee_id: Option<String>,
    pub full_name: Option<String>,
}

impl MatchResult {
    fn rejected(score: Option<f64>, strategy: Option<Strategy>) -> Self {
        Self {
            matched: false,
            score,
            strategy,
            employee_id: None,
            full_name: None,
        }
    }
}

/// Strategy for comparing a probe payload against the enrolled gallery.
pub trait Matcher {
    fn compare(&self, probe: &FacePayload, gallery: &[Candidate]) -> MatchResult;
}

/// Signature / hash / similarity matcher.
#[derive(Debug, Clone, Default)]
pub struct HeuristicMatcher {
    pub thresholds: Thresholds,
}

impl HeuristicMatcher {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Score one enrolled payload with the first strategy that applies.
    ///
    /// Returns `None` when the two payloads are not comparable.
    pub fn score(&self, probe: &FacePayload, enrolled: &FacePayload) -> Option<(Strategy, f64)> {
        if let (Some(a), Some(b)) = (&probe.signature, &enrolled.signature) {
            if let Some(distance) = a.distance(b) {
                return Some((Strategy::Signature, distance));
            }
        }

        if let (Some(a), Some(b)) = (&probe.hash, &enrolled.hash) {
            if constant_time_eq(a.as_bytes(), b.as_bytes()) {
                return Some((Strategy::Hash, 0.0));
            }
        }

        if probe.image.is_empty() || enrolled.image.is_empty() {
            return None;
        }
        let (a, b) = (probe.image.as_bytes(), enrolled.image.as_bytes());
        let cutoff = self.thresholds.similarity_comparable;
        if similarity::max_percent(a.len(), b.len()) < cutoff {
            return None;
        }
        let percent = similarity::percent(a, b);
        (percent >= cutoff).then_some((Strategy::Similarity, 100.0 - percent))
    }
}

impl Matcher for HeuristicMatcher {
    fn compare(&self, probe: &FacePayload, gallery: &[Candidate]) -> MatchResult {
        let mut best: Option<(usize, Strategy, f64)> = None;

        for (i, candidate) in gallery.iter().enumerate() {
            let Some((strategy, score)) = self.score(probe, &candidate.payload) else {
                continue;
            };
            tracing::debug!(
                employee_id = %candidate.employee_id,
                %strategy,
                score,
                "scored candidate"
            );
            // Strict comparison: the first candidate keeps a tie.
            if best.map_or(true, |(_, _, best_score)| score < best_score) {
                best = Some((i, strategy, score));
            }
        }

        match best {
            Some((idx, strategy, score)) if self.thresholds.accepts(strategy, score) => {
                MatchResult {
                    matched: true,
                    score: Some(score),
                    strategy: Some(strategy),
                    employee_id: Some(gallery[idx].employee_id.clone()),
                    full_name: Some(gallery[idx].full_name.clone()),
                }
            }
            Some((_, strategy, score)) => MatchResult::rejected(Some(score), Some(strategy)),
            None => MatchResult::rejected(None, None),
        }
    }
}

/// Byte equality that always inspects every byte of equal-length inputs.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::tests::{data_url, encode_image, solid_capture};
    use crate::payload::Signature;
    use image::{ImageFormat, Rgb, RgbImage};

    fn payload(image: &str, signature: Option<Vec<u8>>, hash: Option<&str>) -> FacePayload {
        FacePayload {
            image: image.into(),
            signature: signature.map(Signature::new),
            hash: hash.map(String::from),
        }
    }

    fn candidate(id: &str, payload: FacePayload) -> Candidate {
        Candidate {
            employee_id: id.into(),
            full_name: format!("Employee {id}"),
            payload,
        }
    }

    #[test]
    fn test_signature_picks_closest() {
        let probe = payload("p", Some(vec![100; 4]), None);
        let gallery = vec![
            candidate("far", payload("a", Some(vec![150; 4]), None)),
            candidate("near", payload("b", Some(vec![110; 4]), None)),
        ];
        let result = HeuristicMatcher::default().compare(&probe, &gallery);
        assert!(result.matched);
        assert_eq!(result.employee_id.as_deref(), Some("near"));
        assert_eq!(result.strategy, Some(Strategy::Signature));
        assert_eq!(result.score, Some(10.0));
    }

    #[test]
    fn test_signature_over_bound_rejected() {
        let probe = payload("p", Some(vec![0; 4]), None);
        let gallery = vec![candidate("e1", payload("a", Some(vec![61; 4]), None))];
        let result = HeuristicMatcher::default().compare(&probe, &gallery);
        assert!(!result.matched);
        assert_eq!(result.score, Some(61.0));
        assert_eq!(result.employee_id, None);
    }

    #[test]
    fn test_signature_bound_is_inclusive() {
        let probe = payload("p", Some(vec![0; 4]), None);
        let gallery = vec![candidate("e1", payload("a", Some(vec![60; 4]), None))];
        assert!(HeuristicMatcher::default().compare(&probe, &gallery).matched);
    }

    #[test]
    fn test_signature_takes_priority_over_hash() {
        let probe = payload("p", Some(vec![0; 4]), Some("same"));
        let enrolled = payload("a", Some(vec![20; 4]), Some("same"));
        let score = HeuristicMatcher::default().score(&probe, &enrolled);
        assert_eq!(score, Some((Strategy::Signature, 20.0)));
    }

    #[test]
    fn test_hash_used_when_signature_lengths_differ() {
        let probe = payload("p", Some(vec![0; 4]), Some("h1"));
        let enrolled = payload("a", Some(vec![0; 3]), Some("h1"));
        let score = HeuristicMatcher::default().score(&probe, &enrolled);
        assert_eq!(score, Some((Strategy::Hash, 0.0)));
    }

    #[test]
    fn test_hash_mismatch_is_not_comparable() {
        let probe = payload("aaaa", None, Some("h1"));
        let enrolled = payload("zzzz", None, Some("h2"));
        assert_eq!(HeuristicMatcher::default().score(&probe, &enrolled), None);
    }

    #[test]
    fn test_hash_beats_worse_signature_score() {
        let probe = payload("p", Some(vec![0; 4]), Some("h"));
        let gallery = vec![
            candidate("sig", payload("a", Some(vec![5; 4]), None)),
            candidate("hash", payload("b", None, Some("h"))),
        ];
        let result = HeuristicMatcher::default().compare(&probe, &gallery);
        assert_eq!(result.employee_id.as_deref(), Some("hash"));
        assert_eq!(result.strategy, Some(Strategy::Hash));
    }

    #[test]
    fn test_similarity_fallback() {
        let base = "A".repeat(100);
        let mut other = base.clone();
        other.replace_range(0..5, "BBBBB");
        let probe = payload(&base, None, None);
        let enrolled = payload(&other, None, None);

        let (strategy, score) = HeuristicMatcher::default().score(&probe, &enrolled).unwrap();
        assert_eq!(strategy, Strategy::Similarity);
        assert!((score - 5.0).abs() < 1e-9, "got {score}");

        let result = HeuristicMatcher::default().compare(&probe, &[candidate("e1", enrolled)]);
        assert!(result.matched);
    }

    #[test]
    fn test_similarity_below_cutoff_not_comparable() {
        let base = "A".repeat(100);
        let mut other = base.clone();
        other.replace_range(0..10, "BBBBBBBBBB");
        let probe = payload(&base, None, None);
        let enrolled = payload(&other, None, None);
        assert_eq!(HeuristicMatcher::default().score(&probe, &enrolled), None);
    }

    #[test]
    fn test_similarity_accept_bound_applies() {
        // 95% similar: comparable at the default cutoff, rejected when the
        // acceptance bound is raised above it.
        let base = "A".repeat(100);
        let mut other = base.clone();
        other.replace_range(0..5, "BBBBB");
        let strict = HeuristicMatcher::new(Thresholds {
            similarity_accept: 97.0,
            ..Thresholds::default()
        });
        let result = strict.compare(
            &payload(&base, None, None),
            &[candidate("e1", payload(&other, None, None))],
        );
        assert!(!result.matched);
        assert_eq!(result.strategy, Some(Strategy::Similarity));
    }

    #[test]
    fn test_tie_keeps_first_candidate() {
        let probe = payload("p", Some(vec![10; 4]), None);
        let gallery = vec![
            candidate("first", payload("a", Some(vec![12; 4]), None)),
            candidate("second", payload("b", Some(vec![8; 4]), None)),
        ];
        let result = HeuristicMatcher::default().compare(&probe, &gallery);
        assert_eq!(result.employee_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_empty_gallery_no_match() {
        let probe = payload("p", Some(vec![0; 4]), Some("h"));
        let result = HeuristicMatcher::default().compare(&probe, &[]);
        assert_eq!(result, MatchResult::rejected(None, None));
    }

    #[test]
    fn test_identical_capture_matches_with_zero_score() {
        let capture = solid_capture([40, 80, 120]);
        let enrolled = FacePayload::encode(&capture).unwrap();
        let probe = FacePayload::encode(&capture).unwrap();
        let result = HeuristicMatcher::default().compare(&probe, &[candidate("E1", enrolled)]);
        assert!(result.matched);
        assert_eq!(result.employee_id.as_deref(), Some("E1"));
        assert_eq!(result.score, Some(0.0));
    }

    #[test]
    fn test_identical_opaque_capture_matches_by_hash() {
        let capture = data_url(b"raw sensor dump, not a bitmap");
        let enrolled = FacePayload::encode(&capture).unwrap();
        let probe = FacePayload::encode(&capture).unwrap();
        let result = HeuristicMatcher::default().compare(&probe, &[candidate("E1", enrolled)]);
        assert!(result.matched);
        assert_eq!(result.strategy, Some(Strategy::Hash));
        assert_eq!(result.score, Some(0.0));
    }

    #[test]
    fn test_reencoded_bitmap_matches_by_signature() {
        let img = RgbImage::from_fn(48, 48, |x, y| Rgb([(x * 5) as u8, (y * 5) as u8, 128]));
        let png = FacePayload::encode(&data_url(&encode_image(&img, ImageFormat::Png))).unwrap();
        let bmp = FacePayload::encode(&data_url(&encode_image(&img, ImageFormat::Bmp))).unwrap();
        assert_ne!(png.hash, bmp.hash);

        let result = HeuristicMatcher::default().compare(&bmp, &[candidate("E1", png)]);
        assert!(result.matched);
        assert_eq!(result.strategy, Some(Strategy::Signature));
        assert_eq!(result.score, Some(0.0));
    }

    #[test]
    fn test_unpadded_capture_matches_padded_one() {
        let capture = data_url(b"opaque bytes!");
        assert!(capture.ends_with('='));
        let unpadded = capture.trim_end_matches('=').to_string();

        let enrolled = FacePayload::encode(&capture).unwrap();
        let probe = FacePayload::encode(&unpadded).unwrap();
        let result = HeuristicMatcher::default().compare(&probe, &[candidate("E1", enrolled)]);
        assert!(result.matched);
        assert_eq!(result.strategy, Some(Strategy::Hash));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}

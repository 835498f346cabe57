//! Per-frame identity resolution.
//!
//! The resolver is the only component that reads both tracker output and
//! ledger state, and the only writer of the ledger. Each call to
//! [`IdentityResolver::resolve`] consumes one frame's track-annotated
//! detections plus OCR evidence and produces the frame's bindings.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::frame::GrayFrame;
use crate::identity::crop::{self, CropConfig};
use crate::identity::fallback;
use crate::identity::ledger::{IdentityKey, IdentityLedger};
use crate::identity::ocr::{OcrReader, ReadError};
use crate::identity::roster::{self, Roster};
use crate::tracker::{TrackId, TrackedDetection};

/// Tunables for the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Identities that must always be seated when unbound, in precedence
    /// order. Seated by the priority-override fallback at
    /// `priority_confidence`, stable immediately.
    pub priority_identities: Vec<IdentityKey>,
    /// Consistent votes required before a binding becomes stable.
    pub stability_votes: u32,
    /// Confidence bonus when a read agrees with the track's majority vote.
    pub majority_bonus: f32,
    /// Tracks whose binding confidence exceeds this skip OCR evaluation.
    pub high_confidence_skip: f32,
    /// Confidence given to priority-override bindings.
    pub priority_confidence: f32,
    /// Confidence given to positional (left-to-right) bindings.
    pub positional_confidence: f32,
    /// Frames without evidence before a non-stable binding counts as stale.
    pub stale_after: u32,
    /// Whether stale non-stable bindings are released for reassignment.
    /// Off by default: stale bindings are only logged.
    pub unbind_stale: bool,
    pub crop: CropConfig,
    /// Window side for the adaptive-threshold enhancement pass.
    pub threshold_block: u32,
    /// Constant subtracted from the neighborhood mean when thresholding.
    pub threshold_c: i16,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            priority_identities: Vec::new(),
            stability_votes: 3,
            majority_bonus: 0.1,
            high_confidence_skip: 0.9,
            priority_confidence: 0.8,
            positional_confidence: 0.7,
            stale_after: 30,
            unbind_stale: false,
            crop: CropConfig::default(),
            threshold_block: 11,
            threshold_c: 2,
        }
    }
}

impl ResolverConfig {
    fn validate(&self) -> crate::Result<()> {
        for (name, value) in [
            ("majority_bonus", self.majority_bonus),
            ("high_confidence_skip", self.high_confidence_skip),
            ("priority_confidence", self.priority_confidence),
            ("positional_confidence", self.positional_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(crate::Error::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.stability_votes == 0 {
            return Err(crate::Error::InvalidConfig(
                "stability_votes must be at least 1".to_string(),
            ));
        }
        if self.threshold_block == 0 || self.threshold_block % 2 == 0 {
            return Err(crate::Error::InvalidConfig(format!(
                "threshold_block must be odd, got {}",
                self.threshold_block
            )));
        }
        Ok(())
    }
}

/// The association between one identity and one track at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Binding {
    pub identity: IdentityKey,
    pub track_id: TrackId,
    pub confidence: f32,
    pub is_stable: bool,
}

/// What happened to one track's OCR evaluation this frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReadOutcome {
    /// OCR evidence matched a roster identity.
    Matched {
        identity: IdentityKey,
        confidence: f32,
    },
    /// OCR ran but produced no usable roster match.
    NoEvidence,
    /// Track is stably bound; OCR was skipped.
    SkippedStable,
    /// The track's binding confidence already exceeds the skip threshold.
    SkippedHighConfidence,
    /// Crop region was below the minimum size; OCR was not invoked.
    SkippedSmallCrop,
}

/// Per-track read result. An engine failure on one track is visible here and
/// does not abort resolution for the others.
#[derive(Debug)]
pub struct TrackRead {
    pub track_id: TrackId,
    pub outcome: Result<ReadOutcome, ReadError>,
}

/// Everything one `resolve` call produced.
#[derive(Debug)]
pub struct Resolution {
    /// All current bindings, stable and non-stable, in identity-key order.
    pub bindings: Vec<Binding>,
    /// Per-track OCR outcomes for this frame.
    pub reads: Vec<TrackRead>,
    /// Tracks present this frame that carry no identity. Surfaced so callers
    /// can render them as unidentified instead of dropping them.
    pub unbound_tracks: Vec<TrackId>,
}

/// Orchestrates OCR evidence into ledger updates and per-frame bindings.
pub struct IdentityResolver {
    config: ResolverConfig,
    ledger: IdentityLedger,
}

impl IdentityResolver {
    pub fn new(config: ResolverConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ledger: IdentityLedger::new(),
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn ledger(&self) -> &IdentityLedger {
        &self.ledger
    }

    /// Propagate track eviction from the associator: per-track votes reset
    /// and bindings to dead tracks are released.
    pub fn forget_tracks(&mut self, evicted: &[TrackId]) {
        for &track_id in evicted {
            self.ledger.forget_track(track_id);
        }
    }

    /// Resolve one frame.
    ///
    /// Consumes the associator's track-annotated detections and the frame
    /// buffer, queries the OCR reader for unresolved tracks, updates the
    /// ledger, and returns the frame's bindings. Never fails as a whole:
    /// per-track OCR errors are reported in [`Resolution::reads`] and
    /// resolution continues for the remaining tracks.
    pub fn resolve(
        &mut self,
        frame: &GrayFrame,
        tracked: &[TrackedDetection],
        reader: &mut dyn OcrReader,
        roster: &Roster,
        frame_index: u64,
    ) -> Resolution {
        let roster = roster.or_placeholder();
        self.ledger.begin_frame(frame_index);

        // Identities reinforced by evidence (or by a fresh assignment) this
        // frame; the rest age in step "timeout bookkeeping" below.
        let mut reinforced: HashSet<IdentityKey> = HashSet::new();

        // Stable bindings are preserved as-is: their evidence clock resets
        // and their tracks skip OCR evaluation entirely.
        for key in roster.keys() {
            if self
                .ledger
                .identity(key)
                .is_some_and(|i| i.is_stable && i.bound_track.is_some())
            {
                self.ledger.mark_seen(key);
                reinforced.insert(key.clone());
            }
        }

        let mut reads = Vec::with_capacity(tracked.len());
        for det in tracked {
            let outcome = self.evaluate_track(frame, det, reader, &roster, &mut reinforced);
            reads.push(TrackRead {
                track_id: det.track_id,
                outcome,
            });
        }

        self.apply_priority_override(tracked, frame.width(), &roster, &mut reinforced);
        self.apply_positional_fallback(tracked, &roster, &mut reinforced);
        self.age_unreinforced(&roster, &reinforced);

        let bindings = self
            .ledger
            .identities()
            .filter_map(|identity| {
                identity.bound_track.map(|track_id| Binding {
                    identity: identity.key.clone(),
                    track_id,
                    confidence: identity.confidence,
                    is_stable: identity.is_stable,
                })
            })
            .collect();

        let unbound_tracks = tracked
            .iter()
            .map(|det| det.track_id)
            .filter(|&track_id| self.ledger.identity_for_track(track_id).is_none())
            .collect();

        Resolution {
            bindings,
            reads,
            unbound_tracks,
        }
    }

    /// Crop, enhance, and OCR one track's jersey region, then fold any
    /// matched reads into the ledger.
    fn evaluate_track(
        &mut self,
        frame: &GrayFrame,
        det: &TrackedDetection,
        reader: &mut dyn OcrReader,
        roster: &Roster,
        reinforced: &mut HashSet<IdentityKey>,
    ) -> Result<ReadOutcome, ReadError> {
        let track_id = det.track_id;

        if self.ledger.is_track_stable(track_id) {
            return Ok(ReadOutcome::SkippedStable);
        }
        if self
            .ledger
            .confidence_for_track(track_id)
            .is_some_and(|c| c > self.config.high_confidence_skip)
        {
            return Ok(ReadOutcome::SkippedHighConfidence);
        }

        let Some(region) = crop::jersey_region(&det.bbox, frame.width(), frame.height(), &self.config.crop)
        else {
            debug!(track_id, "jersey crop too small, skipping ocr");
            return Ok(ReadOutcome::SkippedSmallCrop);
        };

        let jersey_crop = frame.crop(region);
        let enhanced = jersey_crop.adaptive_threshold(self.config.threshold_block, self.config.threshold_c);

        // Both the raw crop and the contrast-enhanced version get a pass;
        // digit reads from either count as evidence.
        let mut candidates = Vec::new();
        for image in [&jersey_crop, &enhanced] {
            match reader.read_text(image) {
                Ok(found) => candidates.extend(found),
                Err(err) => {
                    warn!(track_id, error = %err, "ocr failed, no evidence this frame");
                    return Err(err);
                }
            }
        }

        let mut best: Option<(IdentityKey, f32)> = None;
        for read in candidates {
            let cleaned = roster::clean_digits(&read.text);
            if cleaned.is_empty() {
                continue;
            }
            let Some(matched) = roster.match_candidate(&cleaned) else {
                continue;
            };
            let matched = matched.clone();

            self.ledger.record_vote(track_id, &matched);
            self.ledger.mark_seen(&matched);
            reinforced.insert(matched.clone());

            let mut confidence = read.confidence.clamp(0.0, 1.0);
            if self
                .ledger
                .majority_vote(track_id)
                .is_some_and(|(key, _)| *key == matched)
            {
                confidence = (confidence + self.config.majority_bonus).min(1.0);
            }

            if let Some(promoted) = self
                .ledger
                .promote_if_stable(track_id, self.config.stability_votes)
            {
                confidence = 1.0;
                best = Some((promoted, confidence));
                continue;
            }

            if self.ledger.bind(&matched, track_id, confidence, false) {
                debug!(track_id, identity = %matched, confidence, "jersey read accepted");
            }
            match &best {
                Some((_, best_conf)) if *best_conf >= confidence => {}
                _ => best = Some((matched, confidence)),
            }
        }

        Ok(match best {
            Some((identity, confidence)) => ReadOutcome::Matched {
                identity,
                confidence,
            },
            None => ReadOutcome::NoEvidence,
        })
    }

    /// Seat every unbound priority identity on the most centrally-framed
    /// remaining detection, stable immediately.
    fn apply_priority_override(
        &mut self,
        tracked: &[TrackedDetection],
        frame_width: u32,
        roster: &Roster,
        reinforced: &mut HashSet<IdentityKey>,
    ) {
        let mut taken: HashSet<TrackId> = HashSet::new();
        let priority = self.config.priority_identities.clone();

        for key in &priority {
            if !roster.contains(key) || self.ledger.track_for_identity(key).is_some() {
                continue;
            }

            // Walk candidates outward from the frame center until one of
            // them accepts the binding.
            loop {
                let Some(target) = fallback::priority_target(tracked, frame_width, &taken) else {
                    break;
                };
                taken.insert(target.track_id);
                if self
                    .ledger
                    .bind(key, target.track_id, self.config.priority_confidence, true)
                {
                    info!(
                        identity = %key,
                        track_id = target.track_id,
                        "priority identity seated on central detection"
                    );
                    reinforced.insert(key.clone());
                    break;
                }
            }
        }
    }

    /// Cold-start assignment: when nothing has ever been bound and every
    /// athlete is plausibly in frame, hand out identities left to right.
    fn apply_positional_fallback(
        &mut self,
        tracked: &[TrackedDetection],
        roster: &Roster,
        reinforced: &mut HashSet<IdentityKey>,
    ) {
        if tracked.is_empty() || tracked.len() > roster.len() || self.ledger.ever_bound() {
            return;
        }

        for (key, track_id) in fallback::positional_assignment(tracked, roster) {
            if self
                .ledger
                .bind(key, track_id, self.config.positional_confidence, false)
            {
                info!(identity = %key, track_id, "identity assigned by position");
                reinforced.insert(key.clone());
            }
        }
    }

    /// Age identities that saw no evidence this frame and handle stale
    /// non-stable bindings per configuration.
    fn age_unreinforced(&mut self, roster: &Roster, reinforced: &HashSet<IdentityKey>) {
        for key in roster.keys() {
            if reinforced.contains(key) {
                continue;
            }
            self.ledger.tick_unseen(key);

            let Some(identity) = self.ledger.identity(key) else {
                continue;
            };
            if identity.is_stable || identity.bound_track.is_none() {
                continue;
            }
            if identity.frames_since_last_detection > self.config.stale_after {
                if self.config.unbind_stale {
                    info!(
                        identity = %key,
                        frames = identity.frames_since_last_detection,
                        "stale binding released"
                    );
                    self.ledger.unbind_stale(key);
                } else {
                    debug!(
                        identity = %key,
                        frames = identity.frames_since_last_detection,
                        "binding stale but kept"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ocr::OcrRead;
    use crate::tracker::{Detection, Rect};

    /// Scripted OCR: pops one batch of reads per call.
    struct ScriptedOcr {
        script: Vec<Result<Vec<OcrRead>, ReadError>>,
    }

    impl ScriptedOcr {
        fn new(script: Vec<Result<Vec<OcrRead>, ReadError>>) -> Self {
            Self { script }
        }

        fn reading(text: &str, confidence: f32) -> Self {
            // One batch for the raw crop, an empty one for the enhanced pass.
            Self::new(vec![Ok(vec![OcrRead::new(text, confidence)]), Ok(vec![])])
        }
    }

    impl OcrReader for ScriptedOcr {
        fn read_text(&mut self, _image: &GrayFrame) -> Result<Vec<OcrRead>, ReadError> {
            if self.script.is_empty() {
                Ok(Vec::new())
            } else {
                self.script.remove(0)
            }
        }
    }

    fn tracked(x1: f32, y1: f32, x2: f32, y2: f32, track_id: TrackId) -> TrackedDetection {
        let det = Detection::from_rect(Rect::new(x1, y1, x2, y2), 0.9);
        TrackedDetection {
            bbox: det.bbox,
            score: det.score,
            track_id,
        }
    }

    fn frame() -> GrayFrame {
        GrayFrame::new(1280, 720)
    }

    fn resolver() -> IdentityResolver {
        IdentityResolver::new(ResolverConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ResolverConfig {
            majority_bonus: 1.5,
            ..ResolverConfig::default()
        };
        assert!(IdentityResolver::new(config).is_err());

        let config = ResolverConfig {
            threshold_block: 10,
            ..ResolverConfig::default()
        };
        assert!(IdentityResolver::new(config).is_err());
    }

    #[test]
    fn test_ocr_match_binds_identity() {
        let mut resolver = resolver();
        let roster = Roster::new(["9", "14"]);
        let dets = vec![tracked(500.0, 100.0, 700.0, 500.0, 5)];
        let mut reader = ScriptedOcr::reading("9", 0.6);

        let resolution = resolver.resolve(&frame(), &dets, &mut reader, &roster, 1);

        // First vote is automatically the majority, so the bonus applies.
        let binding = &resolution.bindings[0];
        assert_eq!(binding.identity, "9");
        assert_eq!(binding.track_id, 5);
        assert!((binding.confidence - 0.7).abs() < 1e-6);
        assert!(!binding.is_stable);
        assert!(resolution.unbound_tracks.is_empty());
    }

    #[test]
    fn test_read_outcome_reported_per_track() {
        let mut resolver = resolver();
        let roster = Roster::new(["9"]);
        let dets = vec![
            tracked(500.0, 100.0, 700.0, 500.0, 5),
            tracked(900.0, 100.0, 1100.0, 500.0, 6),
        ];
        // Track 5 errors on its raw pass; track 6 reads nothing. The error
        // is visible for track 5 only and track 6 still resolves.
        let mut reader = ScriptedOcr::new(vec![
            Err(ReadError::Engine {
                engine: "easyocr".into(),
                message: "cuda oom".into(),
            }),
            Ok(vec![]),
            Ok(vec![]),
        ]);

        let resolution = resolver.resolve(&frame(), &dets, &mut reader, &roster, 1);
        assert!(resolution.reads[0].outcome.is_err());
        assert_eq!(resolution.reads[1].outcome.as_ref().unwrap(), &ReadOutcome::NoEvidence);
    }

    #[test]
    fn test_small_crop_skips_ocr() {
        let mut resolver = resolver();
        let roster = Roster::new(["9"]);
        let dets = vec![tracked(10.0, 10.0, 25.0, 40.0, 1)];
        let mut reader = ScriptedOcr::reading("9", 0.9);

        let resolution = resolver.resolve(&frame(), &dets, &mut reader, &roster, 1);
        assert_eq!(
            resolution.reads[0].outcome.as_ref().unwrap(),
            &ReadOutcome::SkippedSmallCrop
        );
        // No OCR evidence, so the only binding is the positional one.
        assert_eq!(resolution.bindings.len(), 1);
        assert!((resolution.bindings[0].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_stability_after_three_consistent_votes() {
        let mut resolver = resolver();
        let roster = Roster::new(["9", "14"]);
        let dets = vec![tracked(500.0, 100.0, 700.0, 500.0, 5)];

        for frame_index in 1..=3 {
            let mut reader = ScriptedOcr::reading("9", 0.5);
            resolver.resolve(&frame(), &dets, &mut reader, &roster, frame_index);
        }

        let identity = resolver.ledger().identity("9").unwrap();
        assert!(identity.is_stable);
        assert_eq!(identity.confidence, 1.0);
        assert_eq!(identity.bound_track, Some(5));

        // A fourth frame with conflicting evidence does not move the
        // binding: the stable track skips OCR evaluation entirely.
        let mut reader = ScriptedOcr::reading("14", 0.99);
        let resolution = resolver.resolve(&frame(), &dets, &mut reader, &roster, 4);
        assert_eq!(
            resolution.reads[0].outcome.as_ref().unwrap(),
            &ReadOutcome::SkippedStable
        );
        assert_eq!(resolver.ledger().track_for_identity("9"), Some(5));
        assert!(resolver.ledger().track_for_identity("14").is_none());
    }

    #[test]
    fn test_priority_identity_seated_centrally() {
        let config = ResolverConfig {
            priority_identities: vec!["01523".to_string()],
            ..ResolverConfig::default()
        };
        let mut resolver = IdentityResolver::new(config).unwrap();
        let roster = Roster::new(["01523", "9"]);
        let dets = vec![
            tracked(100.0, 100.0, 300.0, 500.0, 1),
            tracked(600.0, 100.0, 800.0, 500.0, 2), // center 700, closest to 640
        ];
        let mut reader = ScriptedOcr::new(vec![]);

        let resolution = resolver.resolve(&frame(), &dets, &mut reader, &roster, 1);
        let binding = resolution
            .bindings
            .iter()
            .find(|b| b.identity == "01523")
            .unwrap();
        assert_eq!(binding.track_id, 2);
        assert!(binding.is_stable);
        assert!((binding.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_positional_fallback_left_to_right() {
        let mut resolver = resolver();
        let roster = Roster::new(["A", "B"]);
        let dets = vec![
            tracked(350.0, 100.0, 450.0, 500.0, 2), // center 400
            tracked(50.0, 100.0, 150.0, 500.0, 1),  // center 100
        ];
        let mut reader = ScriptedOcr::new(vec![]);

        let resolution = resolver.resolve(&frame(), &dets, &mut reader, &roster, 1);
        let find = |key: &str| {
            resolution
                .bindings
                .iter()
                .find(|b| b.identity == key)
                .unwrap()
        };
        assert_eq!(find("A").track_id, 1);
        assert_eq!(find("B").track_id, 2);
        assert!((find("A").confidence - 0.7).abs() < 1e-6);
        assert!(!find("A").is_stable);
    }

    #[test]
    fn test_positional_fallback_only_on_cold_ledger() {
        let mut resolver = resolver();
        let roster = Roster::new(["9", "14"]);

        // Frame 1: track 5 earns an OCR binding.
        let dets = vec![tracked(500.0, 100.0, 700.0, 500.0, 5)];
        let mut reader = ScriptedOcr::reading("9", 0.6);
        resolver.resolve(&frame(), &dets, &mut reader, &roster, 1);

        // Frame 2: a second athlete appears; positional must not fire.
        let dets = vec![
            tracked(500.0, 100.0, 700.0, 500.0, 5),
            tracked(100.0, 100.0, 300.0, 500.0, 6),
        ];
        let mut reader = ScriptedOcr::new(vec![]);
        let resolution = resolver.resolve(&frame(), &dets, &mut reader, &roster, 2);
        assert!(resolution.bindings.iter().all(|b| b.identity != "14"));
        assert_eq!(resolution.unbound_tracks, vec![6]);
    }

    #[test]
    fn test_positional_fallback_skipped_when_detections_exceed_roster() {
        let mut resolver = resolver();
        let roster = Roster::new(["A"]);
        let dets = vec![
            tracked(50.0, 100.0, 150.0, 500.0, 1),
            tracked(350.0, 100.0, 450.0, 500.0, 2),
        ];
        let mut reader = ScriptedOcr::new(vec![]);
        let resolution = resolver.resolve(&frame(), &dets, &mut reader, &roster, 1);
        assert!(resolution.bindings.is_empty());
        assert_eq!(resolution.unbound_tracks, vec![1, 2]);
    }

    #[test]
    fn test_empty_roster_degrades_to_placeholder() {
        let mut resolver = resolver();
        let roster = Roster::default();
        let dets = vec![tracked(500.0, 100.0, 700.0, 500.0, 5)];
        let mut reader = ScriptedOcr::reading("2", 0.6);

        let resolution = resolver.resolve(&frame(), &dets, &mut reader, &roster, 1);
        assert!(resolution.bindings.iter().any(|b| b.identity == "2"));
    }

    #[test]
    fn test_stale_binding_kept_by_default() {
        let mut resolver = resolver();
        let roster = Roster::new(["9", "14"]);
        let dets = vec![tracked(500.0, 100.0, 700.0, 500.0, 5)];

        let mut reader = ScriptedOcr::reading("9", 0.6);
        resolver.resolve(&frame(), &dets, &mut reader, &roster, 1);

        // 35 frames with no further evidence; the track itself remains, so
        // the binding goes stale but stays bound.
        for frame_index in 2..=36 {
            let mut reader = ScriptedOcr::new(vec![]);
            resolver.resolve(&frame(), &[], &mut reader, &roster, frame_index);
        }
        assert_eq!(resolver.ledger().track_for_identity("9"), Some(5));
        assert!(
            resolver
                .ledger()
                .identity("9")
                .unwrap()
                .frames_since_last_detection
                > 30
        );
    }

    #[test]
    fn test_stale_binding_released_when_configured() {
        let config = ResolverConfig {
            unbind_stale: true,
            stale_after: 5,
            ..ResolverConfig::default()
        };
        let mut resolver = IdentityResolver::new(config).unwrap();
        let roster = Roster::new(["9", "14"]);
        let dets = vec![tracked(500.0, 100.0, 700.0, 500.0, 5)];

        let mut reader = ScriptedOcr::reading("9", 0.6);
        resolver.resolve(&frame(), &dets, &mut reader, &roster, 1);

        for frame_index in 2..=8 {
            let mut reader = ScriptedOcr::new(vec![]);
            resolver.resolve(&frame(), &[], &mut reader, &roster, frame_index);
        }
        assert!(resolver.ledger().track_for_identity("9").is_none());
    }

    #[test]
    fn test_forget_tracks_resets_votes() {
        let mut resolver = resolver();
        let roster = Roster::new(["9"]);
        let dets = vec![tracked(500.0, 100.0, 700.0, 500.0, 5)];

        let mut reader = ScriptedOcr::reading("9", 0.6);
        resolver.resolve(&frame(), &dets, &mut reader, &roster, 1);
        assert_eq!(resolver.ledger().track_for_identity("9"), Some(5));

        resolver.forget_tracks(&[5]);
        assert!(resolver.ledger().track_for_identity("9").is_none());
        assert!(resolver.ledger().votes_for(5).is_none());
    }
}

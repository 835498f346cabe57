//! The identity ledger: roster-keyed identity state for one video stream.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info};

use crate::tracker::TrackId;

/// Stable, externally meaningful identity label (a jersey number).
pub type IdentityKey = String;

/// One roster entry, independent of any track.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub key: IdentityKey,
    /// The track currently believed to carry this identity.
    pub bound_track: Option<TrackId>,
    /// Binding confidence in `[0, 1]`.
    pub confidence: f32,
    /// Once stable, the binding is sticky: it resists displacement by
    /// non-stable evidence while its track remains active.
    pub is_stable: bool,
    /// Frames since OCR evidence last supported this identity.
    pub frames_since_last_detection: u32,
}

impl Identity {
    fn new(key: IdentityKey) -> Self {
        Self {
            key,
            bound_track: None,
            confidence: 0.0,
            is_stable: false,
            frames_since_last_detection: 0,
        }
    }
}

/// Sole owner of all identity state for one stream.
///
/// Identity records and per-track vote histograms live in separate maps;
/// there are no sentinel keys and no process-wide state. One stream owns one
/// ledger, created at stream start and discarded at stream end.
#[derive(Debug, Default)]
pub struct IdentityLedger {
    identities: BTreeMap<IdentityKey, Identity>,
    /// Rolling vote histogram per track: candidate identity -> observation
    /// count. Counts only grow; the whole entry resets when the track dies.
    votes: HashMap<TrackId, BTreeMap<IdentityKey, u32>>,
    frame_count: u64,
    /// Whether any binding has ever been made this session. Guards the
    /// positional fallback, which only runs on a completely cold ledger.
    ever_bound: bool,
}

impl IdentityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the frame currently being resolved.
    pub fn begin_frame(&mut self, frame_index: u64) {
        self.frame_count = frame_index;
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn ever_bound(&self) -> bool {
        self.ever_bound
    }

    pub fn identity(&self, key: &str) -> Option<&Identity> {
        self.identities.get(key)
    }

    /// All identities seen so far, in key order.
    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values()
    }

    /// The identity a track is currently bound to, if any.
    pub fn identity_for_track(&self, track_id: TrackId) -> Option<&IdentityKey> {
        self.identities
            .values()
            .find(|identity| identity.bound_track == Some(track_id))
            .map(|identity| &identity.key)
    }

    /// The track an identity is currently bound to, if any.
    pub fn track_for_identity(&self, key: &str) -> Option<TrackId> {
        self.identities.get(key).and_then(|i| i.bound_track)
    }

    pub fn is_track_stable(&self, track_id: TrackId) -> bool {
        self.identities
            .values()
            .any(|i| i.bound_track == Some(track_id) && i.is_stable)
    }

    /// Confidence of the binding currently held by a track, if any.
    pub fn confidence_for_track(&self, track_id: TrackId) -> Option<f32> {
        self.identities
            .values()
            .find(|i| i.bound_track == Some(track_id))
            .map(|i| i.confidence)
    }

    /// Increment the vote histogram entry for (`track_id`, `key`) and return
    /// the new count.
    pub fn record_vote(&mut self, track_id: TrackId, key: &str) -> u32 {
        let count = self
            .votes
            .entry(track_id)
            .or_default()
            .entry(key.to_string())
            .or_insert(0);
        *count += 1;
        debug!(track_id, identity = key, votes = *count, "vote recorded");
        *count
    }

    pub fn votes_for(&self, track_id: TrackId) -> Option<&BTreeMap<IdentityKey, u32>> {
        self.votes.get(&track_id)
    }

    /// The most-voted identity for a track. Ties resolve to the
    /// lexicographically first key, which keeps resolution deterministic.
    pub fn majority_vote(&self, track_id: TrackId) -> Option<(&IdentityKey, u32)> {
        self.votes.get(&track_id).and_then(|histogram| {
            histogram.iter().fold(None, |best, (key, &count)| match best {
                Some((_, best_count)) if count <= best_count => best,
                _ => Some((key, count)),
            })
        })
    }

    /// Promote the track's majority identity to a stable binding once it has
    /// accumulated at least `stability_votes` votes. A stable binding gets
    /// confidence 1.0 and displaces any non-stable binding for the same
    /// identity; a competing stable binding is never displaced.
    ///
    /// Returns the promoted identity key, if a promotion happened.
    pub fn promote_if_stable(
        &mut self,
        track_id: TrackId,
        stability_votes: u32,
    ) -> Option<IdentityKey> {
        let (key, count) = match self.majority_vote(track_id) {
            Some((key, count)) => (key.clone(), count),
            None => return None,
        };
        if count < stability_votes {
            return None;
        }
        if self
            .identities
            .get(&key)
            .is_some_and(|i| i.is_stable && i.bound_track == Some(track_id))
        {
            return None;
        }
        if self.bind(&key, track_id, 1.0, true) {
            info!(track_id, identity = %key, votes = count, "stable association created");
            Some(key)
        } else {
            None
        }
    }

    /// Bind an identity to a track, enforcing the ledger invariants:
    ///
    /// - a stable binding is never displaced by non-stable evidence, and a
    ///   stable promotion cannot displace a competing stable binding;
    /// - a non-stable binding is displaced only by higher confidence or by a
    ///   stable promotion;
    /// - a track holds at most one identity, so binding releases the track's
    ///   previous identity;
    /// - a track that is stably bound keeps its identity.
    ///
    /// Returns whether the binding was applied.
    pub fn bind(&mut self, key: &str, track_id: TrackId, confidence: f32, stable: bool) -> bool {
        let confidence = confidence.clamp(0.0, 1.0);

        if let Some(existing) = self.identities.get(key) {
            if existing.bound_track.is_some_and(|t| t != track_id) {
                if existing.is_stable {
                    debug!(
                        track_id,
                        identity = key,
                        "bind refused, identity stably bound elsewhere"
                    );
                    return false;
                }
                if !stable && confidence <= existing.confidence {
                    return false;
                }
            }
        }

        // A stably-bound track keeps its identity, and switching a track to a
        // different identity takes strictly better evidence.
        let previous = self.identity_for_track(track_id).cloned();
        if let Some(previous) = &previous {
            if previous != key {
                if self.is_track_stable(track_id) {
                    debug!(
                        track_id,
                        identity = key,
                        "bind refused, track stably bound to another identity"
                    );
                    return false;
                }
                let previous_conf = self
                    .identities
                    .get(previous)
                    .map(|i| i.confidence)
                    .unwrap_or(0.0);
                if !stable && confidence <= previous_conf {
                    return false;
                }
                self.unbind(previous);
            }
        }

        let identity = self
            .identities
            .entry(key.to_string())
            .or_insert_with(|| Identity::new(key.to_string()));
        identity.confidence = if stable {
            confidence
        } else if identity.bound_track == Some(track_id) {
            // Re-binding the same track only ever raises confidence.
            identity.confidence.max(confidence)
        } else {
            confidence
        };
        identity.bound_track = Some(track_id);
        identity.is_stable = identity.is_stable || stable;
        identity.frames_since_last_detection = 0;
        self.ever_bound = true;
        true
    }

    fn unbind(&mut self, key: &str) {
        if let Some(identity) = self.identities.get_mut(key) {
            identity.bound_track = None;
            identity.is_stable = false;
            identity.confidence = 0.0;
        }
    }

    /// Reset the evidence clock for an identity reinforced this frame.
    pub fn mark_seen(&mut self, key: &str) {
        let identity = self
            .identities
            .entry(key.to_string())
            .or_insert_with(|| Identity::new(key.to_string()));
        identity.frames_since_last_detection = 0;
    }

    /// Age an identity that received no evidence this frame. Never unbinds;
    /// stale handling is the resolver's decision.
    pub fn tick_unseen(&mut self, key: &str) {
        let identity = self
            .identities
            .entry(key.to_string())
            .or_insert_with(|| Identity::new(key.to_string()));
        identity.frames_since_last_detection += 1;
    }

    /// Release a stale non-stable binding so the identity can be reassigned.
    pub fn unbind_stale(&mut self, key: &str) {
        if self.identities.get(key).is_some_and(|i| !i.is_stable) {
            self.unbind(key);
        }
    }

    /// Drop all state tied to a destroyed track: its vote histogram resets
    /// and any identity bound to it is released for reassignment.
    pub fn forget_track(&mut self, track_id: TrackId) {
        self.votes.remove(&track_id);
        let keys: Vec<IdentityKey> = self
            .identities
            .values()
            .filter(|i| i.bound_track == Some(track_id))
            .map(|i| i.key.clone())
            .collect();
        for key in keys {
            debug!(track_id, identity = %key, "binding released, track evicted");
            if let Some(identity) = self.identities.get_mut(&key) {
                identity.bound_track = None;
                identity.is_stable = false;
                identity.confidence = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_accumulation_and_majority() {
        let mut ledger = IdentityLedger::new();
        ledger.record_vote(5, "9");
        ledger.record_vote(5, "9");
        ledger.record_vote(5, "14");
        let (key, count) = ledger.majority_vote(5).unwrap();
        assert_eq!(key, "9");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_promotion_at_threshold() {
        let mut ledger = IdentityLedger::new();
        ledger.record_vote(5, "9");
        ledger.record_vote(5, "9");
        assert!(ledger.promote_if_stable(5, 3).is_none());

        ledger.record_vote(5, "9");
        assert_eq!(ledger.promote_if_stable(5, 3).as_deref(), Some("9"));

        let identity = ledger.identity("9").unwrap();
        assert_eq!(identity.bound_track, Some(5));
        assert!(identity.is_stable);
        assert_eq!(identity.confidence, 1.0);
    }

    #[test]
    fn test_stable_binding_not_displaced() {
        let mut ledger = IdentityLedger::new();
        for _ in 0..3 {
            ledger.record_vote(5, "9");
        }
        ledger.promote_if_stable(5, 3);

        // A competing track reaching the threshold does not steal the
        // identity.
        for _ in 0..3 {
            ledger.record_vote(8, "9");
        }
        assert!(ledger.promote_if_stable(8, 3).is_none());
        assert_eq!(ledger.track_for_identity("9"), Some(5));
    }

    #[test]
    fn test_nonstable_binding_displaced_by_promotion() {
        let mut ledger = IdentityLedger::new();
        assert!(ledger.bind("9", 2, 0.7, false));
        for _ in 0..3 {
            ledger.record_vote(5, "9");
        }
        assert!(ledger.promote_if_stable(5, 3).is_some());
        assert_eq!(ledger.track_for_identity("9"), Some(5));
    }

    #[test]
    fn test_one_identity_per_track() {
        let mut ledger = IdentityLedger::new();
        assert!(ledger.bind("9", 5, 0.6, false));
        assert!(ledger.bind("14", 5, 0.8, false));
        assert_eq!(ledger.identity_for_track(5).map(String::as_str), Some("14"));
        assert!(ledger.identity("9").unwrap().bound_track.is_none());
    }

    #[test]
    fn test_lower_confidence_does_not_displace() {
        let mut ledger = IdentityLedger::new();
        assert!(ledger.bind("9", 5, 0.8, false));
        assert!(!ledger.bind("9", 8, 0.5, false));
        assert_eq!(ledger.track_for_identity("9"), Some(5));
    }

    #[test]
    fn test_stable_track_keeps_identity() {
        let mut ledger = IdentityLedger::new();
        for _ in 0..3 {
            ledger.record_vote(5, "9");
        }
        ledger.promote_if_stable(5, 3);
        assert!(!ledger.bind("14", 5, 0.9, false));
        assert_eq!(ledger.identity_for_track(5).map(String::as_str), Some("9"));
    }

    #[test]
    fn test_forget_track_resets_votes_and_binding() {
        let mut ledger = IdentityLedger::new();
        for _ in 0..3 {
            ledger.record_vote(5, "9");
        }
        ledger.promote_if_stable(5, 3);

        ledger.forget_track(5);
        assert!(ledger.votes_for(5).is_none());
        let identity = ledger.identity("9").unwrap();
        assert!(identity.bound_track.is_none());
        assert!(!identity.is_stable);

        // The freed identity is reassignable.
        for _ in 0..3 {
            ledger.record_vote(8, "9");
        }
        assert!(ledger.promote_if_stable(8, 3).is_some());
        assert_eq!(ledger.track_for_identity("9"), Some(8));
    }

    #[test]
    fn test_tick_and_mark_seen() {
        let mut ledger = IdentityLedger::new();
        ledger.tick_unseen("9");
        ledger.tick_unseen("9");
        assert_eq!(ledger.identity("9").unwrap().frames_since_last_detection, 2);
        ledger.mark_seen("9");
        assert_eq!(ledger.identity("9").unwrap().frames_since_last_detection, 0);
    }

    #[test]
    fn test_unbind_stale_spares_stable() {
        let mut ledger = IdentityLedger::new();
        for _ in 0..3 {
            ledger.record_vote(5, "9");
        }
        ledger.promote_if_stable(5, 3);
        ledger.unbind_stale("9");
        assert_eq!(ledger.track_for_identity("9"), Some(5));

        ledger.bind("14", 8, 0.7, false);
        ledger.unbind_stale("14");
        assert!(ledger.track_for_identity("14").is_none());
    }
}

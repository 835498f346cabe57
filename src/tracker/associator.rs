//! Online IoU associator.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tracker::detection::{Detection, TrackedDetection};
use crate::tracker::matching::{self, MatchingStrategy};
use crate::tracker::rect::Rect;
use crate::tracker::track::{Track, TrackId};

/// Configuration for the [`Associator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociatorConfig {
    /// Minimum IoU for a detection to continue an existing track.
    pub iou_thresh: f32,
    /// Frames a track may go unmatched before it is evicted.
    pub max_frames_unseen: u32,
    pub strategy: MatchingStrategy,
}

impl Default for AssociatorConfig {
    fn default() -> Self {
        Self {
            iou_thresh: 0.3,
            max_frames_unseen: 30,
            strategy: MatchingStrategy::default(),
        }
    }
}

/// Turns each frame's unordered detections into the same detections annotated
/// with a [`TrackId`], using only spatial overlap between frames.
///
/// The associator owns all track state for one video stream. It knows nothing
/// about identities; identity semantics live in
/// [`IdentityResolver`](crate::identity::resolver::IdentityResolver).
pub struct Associator {
    tracks: Vec<Track>,
    evicted: Vec<TrackId>,
    next_id: TrackId,
    config: AssociatorConfig,
}

impl Associator {
    pub fn new(config: AssociatorConfig) -> Self {
        Self {
            tracks: Vec::new(),
            evicted: Vec::new(),
            next_id: 1,
            config,
        }
    }

    /// Consume one frame's detections and return them, in input order, with a
    /// track id appended.
    ///
    /// Matched tracks get their bbox replaced and their age reset; unmatched
    /// detections open new tracks; tracks unmatched for more than
    /// `max_frames_unseen` frames are evicted. Empty input ages every track
    /// and returns an empty list.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<TrackedDetection> {
        let track_boxes: Vec<Rect> = self.tracks.iter().map(|t| t.bbox).collect();
        let det_boxes: Vec<Rect> = detections.iter().map(|d| d.bbox).collect();

        let result = matching::assign(
            self.config.strategy,
            &track_boxes,
            &det_boxes,
            self.config.iou_thresh,
        );

        let mut assigned: Vec<Option<TrackId>> = vec![None; detections.len()];

        for (t, d) in result.matches {
            self.tracks[t].mark_matched(det_boxes[d]);
            assigned[d] = Some(self.tracks[t].track_id);
        }

        for t in result.unmatched_tracks {
            self.tracks[t].mark_unmatched();
        }

        // New tracks for unmatched detections, in input order.
        for d in result.unmatched_detections {
            let track_id = self.allocate_id();
            self.tracks.push(Track::new(track_id, det_boxes[d]));
            assigned[d] = Some(track_id);
            debug!(track_id, "track born");
        }

        let max_unseen = self.config.max_frames_unseen;
        let evicted = &mut self.evicted;
        self.tracks.retain_mut(|track| {
            if track.frames_since_seen > max_unseen {
                track.mark_evicted();
                debug!(track_id = track.track_id, "track evicted");
                evicted.push(track.track_id);
                false
            } else {
                true
            }
        });

        detections
            .iter()
            .zip(assigned)
            .map(|(det, track_id)| {
                // Every detection was either matched or given a fresh track.
                TrackedDetection::new(det, track_id.unwrap_or_default())
            })
            .collect()
    }

    /// Drain the ids of tracks evicted since the last call. Callers feed these
    /// to [`IdentityLedger::forget_track`] so per-track vote histograms reset
    /// when a track dies.
    ///
    /// [`IdentityLedger::forget_track`]: crate::identity::ledger::IdentityLedger::forget_track
    pub fn take_evicted(&mut self) -> Vec<TrackId> {
        std::mem::take(&mut self.evicted)
    }

    /// Currently active tracks.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn allocate_id(&mut self) -> TrackId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

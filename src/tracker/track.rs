//! Track lifecycle for the online associator.

use crate::tracker::rect::Rect;

/// Unique track identifier. Allocated monotonically per [`Associator`]
/// instance and never reused, even after eviction.
///
/// [`Associator`]: crate::tracker::Associator
pub type TrackId = u64;

/// Track lifecycle states.
///
/// A track cycles between `Matched` and `Unmatched` arbitrarily many times;
/// `Evicted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Created this frame from an unmatched detection.
    #[default]
    New,
    /// Matched a detection this frame.
    Matched,
    /// Missed a detection this frame.
    Unmatched,
    /// Removed from the active pool.
    Evicted,
}

/// One continuously-observed moving object.
#[derive(Debug, Clone)]
pub struct Track {
    pub track_id: TrackId,
    /// Current best bounding-box estimate, replaced wholesale on every match.
    pub bbox: Rect,
    /// Frames elapsed since this track last matched a detection.
    pub frames_since_seen: u32,
    pub state: TrackState,
}

impl Track {
    pub(crate) fn new(track_id: TrackId, bbox: Rect) -> Self {
        Self {
            track_id,
            bbox,
            frames_since_seen: 0,
            state: TrackState::New,
        }
    }

    pub(crate) fn mark_matched(&mut self, bbox: Rect) {
        self.bbox = bbox;
        self.frames_since_seen = 0;
        self.state = TrackState::Matched;
    }

    pub(crate) fn mark_unmatched(&mut self) {
        self.frames_since_seen += 1;
        self.state = TrackState::Unmatched;
    }

    pub(crate) fn mark_evicted(&mut self) {
        self.state = TrackState::Evicted;
    }
}

//! Detection types at the boundary to the upstream person detector.

use serde::{Deserialize, Serialize};

use crate::tracker::rect::Rect;
use crate::tracker::track::TrackId;

/// Detection input for the associator.
///
/// The upstream detector emits `[x1, y1, x2, y2, confidence]` per person and
/// carries no identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding box in TLBR format (x1, y1, x2, y2).
    pub bbox: Rect,
    /// Detection confidence score.
    pub score: f32,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self {
            bbox: Rect::new(x1, y1, x2, y2),
            score,
        }
    }

    pub fn from_rect(bbox: Rect, score: f32) -> Self {
        Self { bbox, score }
    }

    /// Build from the detector's raw `[x1, y1, x2, y2, confidence]` row.
    pub fn from_array(row: [f32; 5]) -> Self {
        Self::new(row[0], row[1], row[2], row[3], row[4])
    }
}

/// A detection annotated with the track that carries it.
///
/// This is the associator's per-frame output: the input detections in input
/// order, each with a [`TrackId`] appended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackedDetection {
    pub bbox: Rect,
    pub score: f32,
    pub track_id: TrackId,
}

impl TrackedDetection {
    pub(crate) fn new(detection: &Detection, track_id: TrackId) -> Self {
        Self {
            bbox: detection.bbox,
            score: detection.score,
            track_id,
        }
    }
}

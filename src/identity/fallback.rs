//! Fallback assignment policies.
//!
//! Pure strategies used by the resolver when direct OCR evidence is
//! insufficient. Neither mutates anything; the resolver decides whether to
//! apply their suggestions to the ledger.

use std::collections::HashSet;

use crate::identity::ledger::IdentityKey;
use crate::identity::roster::Roster;
use crate::tracker::{TrackId, TrackedDetection};

/// Pick the detection whose horizontal center is closest to the frame's
/// horizontal center, skipping tracks in `exclude`. This is where an unbound
/// priority identity gets seated: the athlete of interest is assumed to be
/// framed centrally.
pub fn priority_target<'a>(
    tracked: &'a [TrackedDetection],
    frame_width: u32,
    exclude: &HashSet<TrackId>,
) -> Option<&'a TrackedDetection> {
    let frame_center = frame_width as f32 / 2.0;
    tracked
        .iter()
        .filter(|det| !exclude.contains(&det.track_id))
        .min_by(|a, b| {
            let da = (a.bbox.center_x() - frame_center).abs();
            let db = (b.bbox.center_x() - frame_center).abs();
            da.total_cmp(&db)
        })
}

/// Assign roster identities to detections left-to-right: detections sorted by
/// horizontal center, identities taken in roster order. Surplus detections
/// (beyond the roster) and surplus identities are left out.
pub fn positional_assignment<'a>(
    tracked: &[TrackedDetection],
    roster: &'a Roster,
) -> Vec<(&'a IdentityKey, TrackId)> {
    let mut ordered: Vec<&TrackedDetection> = tracked.iter().collect();
    ordered.sort_by(|a, b| a.bbox.center_x().total_cmp(&b.bbox.center_x()));

    roster
        .keys()
        .iter()
        .zip(ordered)
        .map(|(key, det)| (key, det.track_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{Detection, Rect};

    fn tracked(x1: f32, x2: f32, track_id: TrackId) -> TrackedDetection {
        let det = Detection::from_rect(Rect::new(x1, 0.0, x2, 100.0), 0.9);
        TrackedDetection {
            bbox: det.bbox,
            score: det.score,
            track_id,
        }
    }

    #[test]
    fn test_priority_target_picks_most_central() {
        let dets = vec![
            tracked(0.0, 100.0, 1),   // center 50
            tracked(600.0, 700.0, 2), // center 650, frame center 640
            tracked(1100.0, 1200.0, 3),
        ];
        let target = priority_target(&dets, 1280, &HashSet::new()).unwrap();
        assert_eq!(target.track_id, 2);
    }

    #[test]
    fn test_priority_target_respects_exclusions() {
        let dets = vec![tracked(600.0, 700.0, 2), tracked(500.0, 900.0, 4)];
        let exclude = HashSet::from([2]);
        let target = priority_target(&dets, 1280, &exclude).unwrap();
        assert_eq!(target.track_id, 4);
    }

    #[test]
    fn test_priority_target_empty() {
        assert!(priority_target(&[], 1280, &HashSet::new()).is_none());
    }

    #[test]
    fn test_positional_left_to_right() {
        let roster = Roster::new(["A", "B"]);
        let dets = vec![tracked(350.0, 450.0, 7), tracked(50.0, 150.0, 3)];
        let assigned = positional_assignment(&dets, &roster);
        assert_eq!(assigned.len(), 2);
        assert_eq!(assigned[0], (&"A".to_string(), 3));
        assert_eq!(assigned[1], (&"B".to_string(), 7));
    }

    #[test]
    fn test_positional_fewer_identities_than_detections() {
        let roster = Roster::new(["A"]);
        let dets = vec![tracked(350.0, 450.0, 7), tracked(50.0, 150.0, 3)];
        let assigned = positional_assignment(&dets, &roster);
        assert_eq!(assigned, vec![(&"A".to_string(), 3)]);
    }
}

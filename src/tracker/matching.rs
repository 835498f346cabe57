//! Track-to-detection assignment strategies.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::tracker::rect::Rect;

/// How tracks are matched to detections each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchingStrategy {
    /// Per-detection greedy highest-IoU matching in input order. Order
    /// dependent: crossing trajectories can swap identities.
    #[default]
    Greedy,
    /// Globally optimal assignment over the full `1 - IoU` cost matrix.
    /// Immune to input-order swaps at the cost of an LAP solve per frame.
    Hungarian,
}

#[derive(Debug, Clone)]
pub struct AssignmentResult {
    /// Matched `(track_index, detection_index)` pairs.
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Dispatch to the configured strategy. A match is accepted only when the
/// pair's IoU strictly exceeds `iou_thresh`.
pub fn assign(
    strategy: MatchingStrategy,
    track_boxes: &[Rect],
    det_boxes: &[Rect],
    iou_thresh: f32,
) -> AssignmentResult {
    match strategy {
        MatchingStrategy::Greedy => greedy_assignment(track_boxes, det_boxes, iou_thresh),
        MatchingStrategy::Hungarian => hungarian_assignment(track_boxes, det_boxes, iou_thresh),
    }
}

/// Greedy matching: each detection, in input order, claims the still-unmatched
/// track with the highest IoU. Ties between detections are broken by input
/// order (first detection considered wins); ties between tracks by pool order.
pub fn greedy_assignment(
    track_boxes: &[Rect],
    det_boxes: &[Rect],
    iou_thresh: f32,
) -> AssignmentResult {
    let mut matches = Vec::new();
    let mut track_taken = vec![false; track_boxes.len()];
    let mut unmatched_detections = Vec::new();

    for (d, det) in det_boxes.iter().enumerate() {
        let mut best_iou = iou_thresh;
        let mut best_track = None;

        for (t, track) in track_boxes.iter().enumerate() {
            if track_taken[t] {
                continue;
            }
            let iou = track.iou(det);
            if iou > best_iou {
                best_iou = iou;
                best_track = Some(t);
            }
        }

        match best_track {
            Some(t) => {
                track_taken[t] = true;
                matches.push((t, d));
            }
            None => unmatched_detections.push(d),
        }
    }

    let unmatched_tracks = track_taken
        .iter()
        .enumerate()
        .filter_map(|(t, &taken)| if taken { None } else { Some(t) })
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}

/// Compute the `1 - IoU` distance matrix between tracks and detections.
pub fn iou_distance(track_boxes: &[Rect], det_boxes: &[Rect]) -> Array2<f32> {
    let mut dists = Array2::zeros((track_boxes.len(), det_boxes.len()));
    for (i, t) in track_boxes.iter().enumerate() {
        for (j, d) in det_boxes.iter().enumerate() {
            dists[[i, j]] = 1.0 - t.iou(d);
        }
    }
    dists
}

/// Globally optimal matching via the Jonker-Volgenant solver over the
/// `1 - IoU` cost matrix.
pub fn hungarian_assignment(
    track_boxes: &[Rect],
    det_boxes: &[Rect],
    iou_thresh: f32,
) -> AssignmentResult {
    let dists = iou_distance(track_boxes, det_boxes);
    linear_assignment(&dists, 1.0 - iou_thresh)
}

/// Solve a rectangular assignment problem, accepting only pairs whose cost is
/// strictly below `cost_limit`.
pub fn linear_assignment(cost_matrix: &Array2<f32>, cost_limit: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: vec![],
            unmatched_detections: (0..num_cols).collect(),
        };
    }

    if num_cols == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: (0..num_rows).collect(),
            unmatched_detections: vec![],
        };
    }

    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), 1e6);

    for i in 0..num_rows {
        for j in 0..num_cols {
            padded[[i, j]] = cost_matrix[[i, j]] as f64;
        }
    }

    let result = lapjv::lapjv(&padded);
    let mut matches = vec![];
    let mut unmatched_tracks = vec![];
    let mut unmatched_detections_mask: Vec<bool> = vec![true; num_cols];

    match result {
        Ok((row_to_col, _)) => {
            for (row_idx, &col_idx) in row_to_col.iter().enumerate() {
                if row_idx >= num_rows {
                    continue;
                }
                if col_idx >= num_cols {
                    unmatched_tracks.push(row_idx);
                } else if cost_matrix[[row_idx, col_idx]] < cost_limit {
                    matches.push((row_idx, col_idx));
                    unmatched_detections_mask[col_idx] = false;
                } else {
                    unmatched_tracks.push(row_idx);
                }
            }
        }
        Err(_) => {
            unmatched_tracks = (0..num_rows).collect();
        }
    }

    let unmatched_detections: Vec<usize> = unmatched_detections_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &u)| if u { Some(i) } else { None })
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}

//! Jersey crop geometry.

use serde::{Deserialize, Serialize};

use crate::frame::CropRect;
use crate::tracker::Rect;

/// Where inside a person box the jersey number is expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropConfig {
    /// Crop starts this fraction down from the top of the person box.
    pub top_frac: f32,
    /// Crop ends this fraction down from the top of the person box.
    pub bottom_frac: f32,
    /// Widen the crop by this fraction of the box width on each side.
    pub expand_frac: f32,
    /// Crops with either side below this are skipped without invoking OCR.
    pub min_side: u32,
}

impl Default for CropConfig {
    fn default() -> Self {
        // Numbers sit on the chest: the band from 20% to 60% of body height.
        Self {
            top_frac: 0.2,
            bottom_frac: 0.6,
            expand_frac: 0.1,
            min_side: 20,
        }
    }
}

/// Compute the upper-body sub-rectangle of a detection, clamped to the frame.
/// Returns `None` when the clamped crop is smaller than the configured
/// minimum in either dimension.
pub fn jersey_region(
    bbox: &Rect,
    frame_width: u32,
    frame_height: u32,
    config: &CropConfig,
) -> Option<CropRect> {
    let height = bbox.height();
    let width = bbox.width();

    let y1 = (bbox.y1 + height * config.top_frac).max(0.0) as u32;
    let y2 = ((bbox.y1 + height * config.bottom_frac) as u32).min(frame_height);
    let x1 = (bbox.x1 - width * config.expand_frac).max(0.0) as u32;
    let x2 = ((bbox.x2 + width * config.expand_frac) as u32).min(frame_width);

    let rect = CropRect { x1, y1, x2, y2 };
    if rect.width() < config.min_side || rect.height() < config.min_side {
        return None;
    }
    Some(rect)
}

mod associator;
mod detection;
mod matching;
mod rect;
mod track;

pub use associator::{Associator, AssociatorConfig};
pub use detection::{Detection, TrackedDetection};
pub use matching::{AssignmentResult, MatchingStrategy};
pub use rect::{Rect, iou_batch};
pub use track::{Track, TrackId, TrackState};

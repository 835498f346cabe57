//! Online athlete tracking and jersey-number identity resolution.
//!
//! The crate turns a per-frame stream of person detections into stable,
//! human-meaningful identity bindings:
//!
//! 1. the [`Associator`] matches detections to tracks by bounding-box overlap,
//! 2. an external OCR engine (behind the [`OcrReader`] seam) reads jersey
//!    digits from body crops,
//! 3. the [`IdentityResolver`] accumulates those noisy reads into a per-stream
//!    [`IdentityLedger`] and emits [`Binding`]s that resist flicker once they
//!    become stable.
//!
//! Processing is strictly online: bindings for frame N are computed from
//! information available at or before frame N. One video stream owns one
//! `Associator` and one resolver; nothing is shared across streams.
//!
//! ```rust,ignore
//! use jerseytrack_rs::{Associator, AssociatorConfig, Detection, IdentityResolver,
//!                      ResolverConfig, Roster, NullOcr, GrayFrame};
//!
//! let mut associator = Associator::new(AssociatorConfig::default());
//! let mut resolver = IdentityResolver::new(ResolverConfig::default()).unwrap();
//! let roster = Roster::new(["7", "23"]);
//! let mut reader = NullOcr;
//!
//! let frame = GrayFrame::new(1280, 720);
//! let tracked = associator.update(&[Detection::new(100.0, 80.0, 180.0, 300.0, 0.9)]);
//! resolver.forget_tracks(&associator.take_evicted());
//! let resolution = resolver.resolve(&frame, &tracked, &mut reader, &roster, 1);
//! ```

pub mod frame;
pub mod identity;
pub mod pipeline;
pub mod tracker;

pub use frame::{CropRect, GrayFrame};
pub use identity::crop::CropConfig;
pub use identity::ledger::{Identity, IdentityKey, IdentityLedger};
pub use identity::ocr::{MultiOcr, NullOcr, OcrRead, OcrReader, ReadError};
pub use identity::resolver::{
    Binding, IdentityResolver, ReadOutcome, Resolution, ResolverConfig, TrackRead,
};
pub use identity::roster::Roster;
pub use pipeline::{DetectionSource, FrameOutput, IdentityPipeline};
pub use tracker::{
    Associator, AssociatorConfig, Detection, MatchingStrategy, Rect, TrackId, TrackedDetection,
};

pub use crate::error::{Error, Result};

mod error {
    use thiserror::Error;

    /// Errors surfaced by constructors and the pipeline layer.
    #[derive(Error, Debug)]
    pub enum Error {
        #[error("invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("ocr read failed: {0}")]
        Read(#[from] crate::identity::ocr::ReadError),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

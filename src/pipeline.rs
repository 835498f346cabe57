//! End-to-end per-frame pipeline: detect, associate, resolve.
//!
//! Detection and OCR are external collaborators behind traits, so any
//! inference backend can be plugged in. The pipeline wires the per-frame data
//! flow: detections go through the [`Associator`], evictions propagate to the
//! ledger, and the [`IdentityResolver`] turns OCR evidence into bindings.

use crate::frame::GrayFrame;
use crate::identity::ocr::OcrReader;
use crate::identity::resolver::{IdentityResolver, Resolution};
use crate::identity::roster::Roster;
use crate::tracker::{Associator, Detection, TrackedDetection};

/// Upstream person detector.
///
/// Implementations run inference on a frame and emit plain detections with
/// no identity attached.
pub trait DetectionSource {
    /// Error type for detection failures.
    type Error;

    /// Run inference on one frame and return its detections.
    fn detect(&mut self, frame: &GrayFrame) -> Result<Vec<Detection>, Self::Error>;
}

/// Per-frame output: the associator's track-annotated detections plus the
/// resolver's bindings and read outcomes.
#[derive(Debug)]
pub struct FrameOutput {
    pub tracked: Vec<TrackedDetection>,
    pub resolution: Resolution,
}

/// Bundles a detector, an OCR reader, and the tracking/identity state for
/// one video stream.
///
/// One stream owns one pipeline; nothing is shared across streams, so hosts
/// processing several videos run one pipeline per video.
pub struct IdentityPipeline<D: DetectionSource, R: OcrReader> {
    detector: D,
    reader: R,
    associator: Associator,
    resolver: IdentityResolver,
    roster: Roster,
    frame_index: u64,
}

impl<D: DetectionSource, R: OcrReader> IdentityPipeline<D, R> {
    pub fn new(
        detector: D,
        reader: R,
        associator: Associator,
        resolver: IdentityResolver,
        roster: Roster,
    ) -> Self {
        Self {
            detector,
            reader,
            associator,
            resolver,
            roster,
            frame_index: 0,
        }
    }

    /// Process one frame in stream order.
    ///
    /// Detection errors abort the frame (there is nothing to track); OCR
    /// errors do not, they surface per-track in the resolution.
    pub fn process_frame(&mut self, frame: &GrayFrame) -> Result<FrameOutput, D::Error> {
        self.frame_index += 1;

        let detections = self.detector.detect(frame)?;
        let tracked = self.associator.update(&detections);
        self.resolver.forget_tracks(&self.associator.take_evicted());

        let resolution = self.resolver.resolve(
            frame,
            &tracked,
            &mut self.reader,
            &self.roster,
            self.frame_index,
        );

        Ok(FrameOutput {
            tracked,
            resolution,
        })
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    pub fn associator(&self) -> &Associator {
        &self.associator
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }
}

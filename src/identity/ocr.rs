//! Seam to the external OCR engine.
//!
//! The OCR engine is a black-box collaborator: it may return nothing, it is
//! not assumed deterministic, and it may fail outright. Failures surface as
//! [`ReadError`] so callers and metrics can see them instead of a silent
//! empty frame.

use thiserror::Error;
use tracing::{debug, warn};

use crate::frame::GrayFrame;

/// One text region returned by the OCR engine: bounding quad (four corner
/// points, pixel coordinates of the crop), raw text, and engine confidence.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OcrRead {
    pub quad: [[f32; 2]; 4],
    pub text: String,
    pub confidence: f32,
}

impl OcrRead {
    /// Convenience constructor for engines (and tests) that do not report a
    /// quad.
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            quad: [[0.0, 0.0]; 4],
            text: text.into(),
            confidence,
        }
    }
}

#[derive(Error, Debug)]
pub enum ReadError {
    /// The engine itself failed on this crop.
    #[error("ocr engine {engine} failed: {message}")]
    Engine { engine: String, message: String },

    /// Every engine in a fallback chain failed.
    #[error("all {attempts} ocr engines failed, last: {last}")]
    Exhausted { attempts: usize, last: String },
}

/// An OCR engine that can read text out of a grayscale crop.
///
/// `&mut self` because real engines keep internal buffers and model state.
pub trait OcrReader {
    fn read_text(&mut self, image: &GrayFrame) -> Result<Vec<OcrRead>, ReadError>;
}

/// Reader that never finds text. The terminal fallback when no real engine
/// is available; keeps the pipeline emitting (unidentified) bindings.
pub struct NullOcr;

impl OcrReader for NullOcr {
    fn read_text(&mut self, _image: &GrayFrame) -> Result<Vec<OcrRead>, ReadError> {
        Ok(Vec::new())
    }
}

/// Ordered fallback chain over several OCR engines.
///
/// Engines are tried in registration order; the first one that returns a
/// non-empty result wins. An engine that errors is skipped. If every engine
/// errors the last error is returned; if at least one ran but none found
/// text, the frame legitimately has no evidence and `Ok(vec![])` is returned.
#[derive(Default)]
pub struct MultiOcr {
    readers: Vec<(String, Box<dyn OcrReader>)>,
}

impl MultiOcr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, reader: Box<dyn OcrReader>) {
        self.readers.push((name.into(), reader));
    }

    pub fn with_reader(mut self, name: impl Into<String>, reader: Box<dyn OcrReader>) -> Self {
        self.push(name, reader);
        self
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

impl OcrReader for MultiOcr {
    fn read_text(&mut self, image: &GrayFrame) -> Result<Vec<OcrRead>, ReadError> {
        let mut attempted = 0;
        let mut any_succeeded = false;
        let mut last_error = None;

        for (name, reader) in &mut self.readers {
            attempted += 1;
            match reader.read_text(image) {
                Ok(reads) if !reads.is_empty() => {
                    debug!(engine = %name, reads = reads.len(), "ocr results");
                    return Ok(reads);
                }
                Ok(_) => any_succeeded = true,
                Err(err) => {
                    warn!(engine = %name, error = %err, "ocr engine failed, trying next");
                    last_error = Some(err);
                }
            }
        }

        if any_succeeded || last_error.is_none() {
            Ok(Vec::new())
        } else {
            Err(ReadError::Exhausted {
                attempts: attempted,
                last: last_error.map(|e| e.to_string()).unwrap_or_default(),
            })
        }
    }
}

//! Identity resolution: binding tracks to roster identities from OCR evidence.

pub mod crop;
pub mod fallback;
pub mod ledger;
pub mod ocr;
pub mod resolver;
pub mod roster;

pub use crop::CropConfig;
pub use fallback::{positional_assignment, priority_target};
pub use ledger::{Identity, IdentityKey, IdentityLedger};
pub use ocr::{MultiOcr, NullOcr, OcrRead, OcrReader, ReadError};
pub use resolver::{Binding, IdentityResolver, ReadOutcome, Resolution, ResolverConfig, TrackRead};
pub use roster::Roster;

//! The roster of valid identities and OCR candidate matching.

use tracing::warn;

use crate::identity::ledger::IdentityKey;

/// Fixed set of identities (jersey numbers) eligible for binding in one
/// session. Externally supplied; order matters for the positional fallback.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    keys: Vec<IdentityKey>,
}

impl Roster {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<IdentityKey>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Placeholder roster used when the caller supplies no identities. Keeps
    /// the stream operational in a documented degraded mode.
    pub fn placeholder() -> Self {
        Self::new(["1", "2", "3"])
    }

    /// Returns `self` when non-empty, the placeholder roster otherwise.
    pub fn or_placeholder(&self) -> Roster {
        if self.keys.is_empty() {
            warn!("empty roster, falling back to placeholder identities");
            Roster::placeholder()
        } else {
            self.clone()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[IdentityKey] {
        &self.keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Match a cleaned OCR candidate against the roster.
    ///
    /// Rules are tried in order:
    /// 1. exact match,
    /// 2. right-anchored: the candidate is a suffix of a roster entry
    ///    (tolerates dropped leading zeros, "7" reads as "007"),
    /// 3. left-stripped: a roster entry minus its leading zeros equals the
    ///    candidate.
    pub fn match_candidate(&self, candidate: &str) -> Option<&IdentityKey> {
        if candidate.is_empty() {
            return None;
        }
        if let Some(key) = self.keys.iter().find(|k| k.as_str() == candidate) {
            return Some(key);
        }
        if let Some(key) = self.keys.iter().find(|k| k.ends_with(candidate)) {
            return Some(key);
        }
        self.keys
            .iter()
            .find(|k| k.trim_start_matches('0') == candidate)
    }
}

/// Strip everything but ASCII digits from an OCR read.
pub fn clean_digits(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

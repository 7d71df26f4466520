/// Page state definitions for tracking indexing progress
///
/// A page moves strictly forward through `Pending -> Processing -> Finished`.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the lifecycle state of a listing page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageState {
    /// Page is part of a requested range but has not been fetched yet
    Pending,

    /// Rows of the page are being parsed; the total is a running count
    Processing,

    /// All rows of the page were handled; the total is final
    Finished,
}

impl PageState {
    /// Returns true if moving from `self` to `next` is allowed
    ///
    /// Re-entering the same state is allowed so that repeated `Processing`
    /// updates and duplicate `Finished` events are idempotent.
    pub fn can_advance_to(&self, next: PageState) -> bool {
        next >= *self
    }

    /// Converts the page state to its persisted string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Finished => "finished",
        }
    }

    /// Returns all possible page states
    pub fn all_states() -> [Self; 3] {
        [Self::Pending, Self::Processing, Self::Finished]
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

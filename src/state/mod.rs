//! State module for tracking indexing progress
//!
//! # Components
//!
//! - `PageState`: lifecycle of a listing page (pending, processing, finished)
//! - `ProgressStore`: thread-safe map of page number to `PageProgress`
//! - `SnapshotFile`: durable JSON copy of the progress map
//! - `DomainState`: per-domain request pacing used by the scheduler

mod domain_state;
mod page_state;
mod progress;
mod snapshot;

// Re-export main types
pub use domain_state::DomainState;
pub use page_state::PageState;
pub use progress::{PageProgress, ProgressSnapshot, ProgressStore};
pub use snapshot::SnapshotFile;

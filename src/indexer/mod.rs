//! Indexing pipeline
//!
//! - `BatchWriter`: drains record results into transactional batches
//! - `Orchestrator`: runs one range job at a time and reports status

mod orchestrator;
mod writer;

pub use orchestrator::{JobHandle, JobReport, JobRequest, Orchestrator, StatusReport};
pub use writer::{BatchWriter, WriterCounts, WriterStats};

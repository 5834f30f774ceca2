//! Checkpoint persistence for job collections.
//!
//! One JSON document per checkpoint path, always read and replaced whole:
//! `{ "version": "1.0", "jobs": [...] }`. A legacy document that is a bare
//! array of `{title, link}` items is migrated into the structured form the
//! first time it is read.

mod document;
mod error;
mod store;

pub use document::{load_jobs, save_jobs, DOCUMENT_VERSION};
pub use error::CheckpointError;
pub use store::{CheckpointStore, JsonFileStore, MemoryStore};

//! Shared data model, error taxonomy and collaborator traits for feedcast.
//!
//! The orchestrators only ever talk to the four traits in [`traits`]; concrete
//! HTTP, database and process-backed implementations live in the `feedcast`
//! crate.

pub mod defs;
pub mod error;
pub mod traits;

pub use defs::*;
pub use error::{PipelineError, Result};
pub use traits::{ArtifactGenerator, BlobStore, FeedSource, ItemStore};

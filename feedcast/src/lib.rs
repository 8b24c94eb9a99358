pub mod types;
pub mod config;
pub mod fetcher;
pub mod parser;
pub mod feed_manager;
pub mod state;
pub mod blob;
pub mod document;
pub mod generator;
pub mod scratch;
pub mod tasks;
pub mod replication;
pub mod ingestion;
pub mod pipeline;
pub mod api;
pub mod telemetry;
pub mod utils;

pub use types::*;
pub use feed_manager::PgItemStore;
pub use fetcher::Fetcher;
pub use state::MemoryItemStore;
pub use ingestion::IngestionOrchestrator;
pub use pipeline::{CycleDispatch, CycleOptions, PodcastOrchestrator};
pub use tasks::TaskGroup;

pub mod books;
pub mod ingestion;
pub mod jobs;
pub mod movies;
pub mod preferences;
pub mod users;
pub mod watch_history;

pub use ingestion::{ingest, IngestSummary, MediaType};
pub use jobs::{IngestionQueue, IngestionWorkerHandle};

use crate::{db::SharedRepository, services::IngestionQueue};

/// Shared application state
pub struct AppState {
    pub repo: SharedRepository,
    pub ingestion: IngestionQueue,
    /// Page size used when a list request does not ask for one
    pub page_size: u32,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(repo: SharedRepository, ingestion: IngestionQueue) -> Self {
        Self {
            repo,
            ingestion,
            page_size: 10,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

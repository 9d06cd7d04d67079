use serde::{Deserialize, Serialize};

/// Hard cap on `page_size` regardless of what the client asks for
pub const MAX_PAGE_SIZE: u32 = 100;

/// `?page=&page_size=` query parameters; pages are 1-based
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// Resolved limit/offset window handed to the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn resolve(params: PageParams, default_page_size: u32) -> Self {
        let page_size = params
            .page_size
            .unwrap_or(default_page_size)
            .clamp(1, MAX_PAGE_SIZE);
        Self {
            page: params.page.unwrap_or(1).max(1),
            page_size,
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

/// Paginated list body: `{count, next, previous, results}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Builds the envelope; `base_path` is the list endpoint without query string
    pub fn new(results: Vec<T>, count: i64, request: PageRequest, base_path: &str) -> Self {
        let link = |page: u32| format!("{}?page={}&page_size={}", base_path, page, request.page_size);
        let shown = request.offset() + results.len() as i64;
        Self {
            count,
            next: (shown < count).then(|| link(request.page + 1)),
            previous: (request.page > 1).then(|| link(request.page - 1)),
            results,
        }
    }
}

//! Paginated (infinite) query entries
//!
//! Pages are fetched with a cursor that is the identifier of the last item of
//! the previous page. An empty page ends pagination.

use serde::{Deserialize, Serialize};

/// Items that can anchor cursor pagination
pub trait Identified {
    fn id(&self) -> &str;
}

/// Cursor for the page after `last_page`, `None` once a page comes back empty
pub fn next_page_param<T: Identified>(last_page: &[T]) -> Option<String> {
    last_page.last().map(|item| item.id().to_string())
}

/// Cached pages of one paginated query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfinitePages<T> {
    pub pages: Vec<Vec<T>>,
    /// Cursor each page was fetched with
    pub page_params: Vec<Option<String>>,
    pub next_cursor: Option<String>,
}

impl<T> Default for InfinitePages<T> {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            page_params: Vec::new(),
            next_cursor: None,
        }
    }
}

impl<T: Identified> InfinitePages<T> {
    pub fn push_page(&mut self, param: Option<String>, page: Vec<T>) {
        self.next_cursor = next_page_param(&page);
        self.page_params.push(param);
        self.pages.push(page);
    }
}

impl<T> InfinitePages<T> {
    pub fn has_next_page(&self) -> bool {
        self.next_cursor.is_some()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|p| p.is_empty())
    }

    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flatten()
    }
}

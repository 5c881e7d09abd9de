use crate::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Pagination for list queries, newest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub count: u32,
    pub skip: u32,
}

impl Page {
    /// Build a page from caller input. A `count` outside `(0, MAX_PAGE_SIZE]` falls back to
    /// `DEFAULT_PAGE_SIZE`; a negative `skip` is treated as zero.
    pub fn new(count: i64, skip: i64) -> Self {
        let count = match u32::try_from(count) {
            Ok(count) if count > 0 && count <= MAX_PAGE_SIZE => count,
            _ => DEFAULT_PAGE_SIZE,
        };
        let skip = u32::try_from(skip.max(0)).unwrap_or(u32::MAX);
        Self { count, skip }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            count: DEFAULT_PAGE_SIZE,
            skip: 0,
        }
    }
}

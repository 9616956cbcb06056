use serde::Serialize;

use crate::errors::InvalidArgument;

/// Upper bound on a single page.
pub const MAX_PAGE_SIZE: i64 = 1000;

/// A validated 1-based page request. The only way to build one is through
/// [`PageRequest::new`], so a listing query never sees a zero or negative
/// page or page size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    page: i64,
    page_size: i64,
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Result<Self, InvalidArgument> {
        if page < 1 {
            return Err(InvalidArgument::Page(page));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(InvalidArgument::PageSize {
                actual: page_size,
                max: MAX_PAGE_SIZE,
            });
        }
        (page - 1)
            .checked_mul(page_size)
            .ok_or(InvalidArgument::OffsetOverflow { page, page_size })?;
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    /// Rows to skip: `(page - 1) * page_size`. Cannot overflow, `new` checked it.
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// The page requested through the `page_num` and `page_size` query parameters.
/// Pages are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page_num: u64,
    page_size: u64,
}

impl Pagination {
    pub fn new(page_num: u64, page_size: u64) -> Result<Self, Error> {
        if page_num == 0 {
            return Err(Error::bad_request("Pages are numbered from 1"));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(Error::bad_request(format!(
                "Page size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        // Offsets travel to the database as signed 64-bit integers.
        let in_range = (page_num - 1)
            .checked_mul(page_size)
            .map_or(false, |skip| skip <= i64::MAX as u64);
        if !in_range {
            return Err(Error::bad_request(format!("Page {page_num} is out of range")));
        }
        Ok(Self {
            page_num,
            page_size,
        })
    }

    /// How many documents precede this page.
    pub fn skip(&self) -> u64 {
        (self.page_num - 1) * self.page_size
    }

    /// The page size as a query limit.
    pub fn limit(&self) -> i64 {
        i64::try_from(self.page_size).unwrap_or(i64::MAX)
    }

    /// Wrap one page of results.
    pub fn page<T>(self, items: Vec<T>, total: u64) -> Paginated<T> {
        Paginated {
            items,
            pagination: PaginationResult {
                page_num: self.page_num,
                page_size: self.page_size,
                total,
            },
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page_num: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Pagination {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let invalid = |name: &str| {
            request::Outcome::Failure((
                Status::BadRequest,
                Error::bad_request(format!("Invalid `{name}` parameter")),
            ))
        };
        let page_num = match req.query_value::<u64>("page_num").unwrap_or(Ok(1)) {
            Ok(page_num) => page_num,
            Err(_) => return invalid("page_num"),
        };
        let page_size = match req
            .query_value::<u64>("page_size")
            .unwrap_or(Ok(DEFAULT_PAGE_SIZE))
        {
            Ok(page_size) => page_size,
            Err(_) => return invalid("page_size"),
        };
        match Self::new(page_num, page_size) {
            Ok(pagination) => request::Outcome::Success(pagination),
            Err(e) => request::Outcome::Failure((Status::BadRequest, e)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationResult {
    pub page_num: u64,
    pub page_size: u64,
    pub total: u64,
}

/// One page of a longer list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: PaginationResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_counts_earlier_pages() {
        assert_eq!(Pagination::default().skip(), 0);
        let third = Pagination::new(3, 10).unwrap();
        assert_eq!(third.skip(), 20);
        assert_eq!(third.limit(), 10);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(Pagination::new(0, 10).is_err());
        assert!(Pagination::new(1, 0).is_err());
        assert!(Pagination::new(1, MAX_PAGE_SIZE + 1).is_err());
        assert!(Pagination::new(1, MAX_PAGE_SIZE).is_ok());
    }

    #[test]
    fn rejects_pages_beyond_any_offset() {
        assert!(Pagination::new(1_000_000_000_000_000_000, MAX_PAGE_SIZE).is_err());
        assert!(Pagination::new(u64::MAX, 1).is_err());
        let last = i64::MAX as u64 / MAX_PAGE_SIZE + 1;
        let page = Pagination::new(last, MAX_PAGE_SIZE).unwrap();
        assert!(page.skip() <= i64::MAX as u64);
    }

    #[test]
    fn page_reports_total() {
        let page = Pagination::new(2, 2).unwrap().page(vec!['c', 'd'], 5);
        assert_eq!(page.items, vec!['c', 'd']);
        assert_eq!(
            page.pagination,
            PaginationResult {
                page_num: 2,
                page_size: 2,
                total: 5
            }
        );
    }
}

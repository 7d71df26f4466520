//! Crawler module for listing and detail page scraping
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with an allow-list and user agent rotation
//! - Listing, pagination and detail page parsing
//! - Request scheduling and rate limiting
//! - Range crawling with bounded row fan-out

mod fetcher;
mod parser;
mod range;
mod row;
mod sanitize;
mod scheduler;

pub use fetcher::{build_http_client, FetchResult, Fetcher, DEFAULT_USER_AGENTS};
pub use parser::{parse_content, parse_last_page, parse_listing, ListingCell, ListingRow};
pub use range::{validate_range, Crawler, CANCELLED_ANNOTATION};
pub use row::{parse_row, ParsedRow, TIMESTAMP_FORMAT};
pub use sanitize::{HtmlSanitizer, PassthroughSanitizer, Sanitizer};
pub use scheduler::{Admission, Scheduler};

use crate::IndexerError;
use std::fmt;

/// Number of rows per listing page accepted by the remote source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PageSize {
    Ten,
    TwentyFive,
    Fifty,
    Hundred,
    #[default]
    TwoHundred,
}

impl PageSize {
    /// Every accepted size, in ascending order
    pub const ALLOWED: [u32; 5] = [10, 25, 50, 100, 200];

    pub fn as_u32(self) -> u32 {
        match self {
            PageSize::Ten => 10,
            PageSize::TwentyFive => 25,
            PageSize::Fifty => 50,
            PageSize::Hundred => 100,
            PageSize::TwoHundred => 200,
        }
    }
}

impl TryFrom<u32> for PageSize {
    type Error = IndexerError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(PageSize::Ten),
            25 => Ok(PageSize::TwentyFive),
            50 => Ok(PageSize::Fifty),
            100 => Ok(PageSize::Hundred),
            200 => Ok(PageSize::TwoHundred),
            other => Err(IndexerError::InvalidParameter(format!(
                "page size {} is not supported (expected one of {:?})",
                other,
                PageSize::ALLOWED
            ))),
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_whitelist() {
        for value in PageSize::ALLOWED {
            let size = PageSize::try_from(value).unwrap();
            assert_eq!(size.as_u32(), value);
        }
    }

    #[test]
    fn test_page_size_rejects_others() {
        for value in [0, 1, 30, 150, 201, 1000] {
            assert!(matches!(
                PageSize::try_from(value),
                Err(IndexerError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_page_size_default_and_display() {
        assert_eq!(PageSize::default(), PageSize::TwoHundred);
        assert_eq!(PageSize::TwentyFive.to_string(), "25");
    }
}

//! HTML parser for listing, pagination and detail documents
//!
//! Parsing is synchronous and returns owned data, so no `scraper::Html` value
//! ever lives across an `.await` point in the crawler.

use scraper::{ElementRef, Html, Selector};

/// Result table on a listing page
const RESULT_TABLE: &str = ".table.search-result";

/// Rows of the result table
const RESULT_ROWS: &str = ".table.search-result tbody tr";

/// Pagination control on a listing page
const PAGINATION_ITEMS: &str = "ul.pagination li";

/// Body of a detail page
const CONTENT_BLOCK: &str = "div#content";

/// One `<td>` of a listing row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingCell {
    /// Text content with surrounding whitespace trimmed
    ///
    /// Links and formatting inside the cell are flattened away; entities are
    /// decoded.
    pub text: String,
}

impl ListingCell {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Cells of one listing row in column order
pub type ListingRow = Vec<ListingCell>;

fn selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("invalid selector '{}': {:?}", css, e))
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Extracts the rows of the result table
///
/// # Returns
///
/// * `Ok(rows)` - The table was found (it may have no rows)
/// * `Err(message)` - The document has no result table
pub fn parse_listing(html: &str) -> Result<Vec<ListingRow>, String> {
    let document = Html::parse_document(html);
    let table_selector = selector(RESULT_TABLE)?;
    let row_selector = selector(RESULT_ROWS)?;
    let cell_selector = selector("td")?;

    if document.select(&table_selector).next().is_none() {
        return Err("result table not found".to_string());
    }

    let rows = document
        .select(&row_selector)
        .map(|row| {
            row.select(&cell_selector)
                .map(|cell| ListingCell::new(element_text(&cell)))
                .collect::<ListingRow>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    Ok(rows)
}

/// Reads the last page number from the pagination control
///
/// The penultimate item of the control holds the highest page number; the last
/// item is the "next" arrow.
pub fn parse_last_page(html: &str) -> Result<u32, String> {
    let document = Html::parse_document(html);
    let item_selector = selector(PAGINATION_ITEMS)?;

    let items: Vec<String> = document
        .select(&item_selector)
        .map(|item| element_text(&item))
        .collect();

    if items.len() < 2 {
        return Err("pagination control not found".to_string());
    }

    let candidate = &items[items.len() - 2];
    candidate
        .parse::<u32>()
        .map_err(|e| format!("invalid last page '{}': {}", candidate, e))
}

/// Extracts the inner markup of the content block of a detail page
pub fn parse_content(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let content_selector = selector(CONTENT_BLOCK).ok()?;

    document
        .select(&content_selector)
        .next()
        .map(|element| element.inner_html())
}

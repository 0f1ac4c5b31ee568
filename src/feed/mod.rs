//! Feed acquisition: HTTP fetching and tolerant RSS extraction.
//!
//! The two halves are deliberately decoupled. [`fetch_feed`] knows nothing
//! about XML and returns raw text; [`parse_items`] knows nothing about HTTP
//! and accepts any string. Real-world feeds are frequently malformed, so the
//! parser salvages what it can instead of validating.

mod fetcher;
mod parser;

pub use fetcher::{client, fetch_feed, FetchError, DEFAULT_FETCH_TIMEOUT};
pub use parser::{parse_items, ParsedItem};

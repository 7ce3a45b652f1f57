//! Utility functions shared by the ingestion and snapshot paths.
//!
//! - **Text processing**: markup stripping, quote normalisation, and the
//!   byte-budget trim used before entity tagging
//! - **URL validation**: scheme checks for feed URLs and SSRF checks for
//!   feed-supplied article links
//!
//! # Examples
//!
//! ```
//! use feedsync::util::{clean_description, validate_link};
//!
//! assert_eq!(clean_description("<p>Hello</p>&nbsp;"), "Hello");
//! assert!(validate_link("http://127.0.0.1/post").is_err());
//! ```

mod text;
mod url_validator;

pub use text::{
    clean_description, join_terms, normalize_quotes, strip_html_tags, truncate_to_byte_budget,
    EMPTY_DESCRIPTION,
};
pub use url_validator::{validate_feed_url, validate_link, UrlValidationError};

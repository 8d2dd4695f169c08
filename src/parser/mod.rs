// HTML parsing with site selector rules
pub mod selectors;

pub use selectors::{SiteExtractor, meta_tags};

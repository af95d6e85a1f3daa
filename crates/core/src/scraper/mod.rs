//! Portal scraper: drives one browser session through one lookup query.

mod classify;
mod portal;

pub use classify::{classify_page, map_row, PageKind, RawRow};
pub use portal::{PortalScraper, ScrapingPortal};

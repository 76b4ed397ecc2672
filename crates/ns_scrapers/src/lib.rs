pub mod manager;
pub mod scrapers;

pub use manager::{NewsCollector, WriteMode};
pub use scrapers::{Candidate, CandidateSource};

pub mod prelude {
    pub use super::manager::{NewsCollector, WriteMode};
    pub use super::scrapers::file::JsonFileSource;
    pub use super::scrapers::rbc::RbcSearchScraper;
    pub use super::scrapers::{Candidate, CandidateSource};
    pub use ns_core::{Error, NewsItem, Result};
}

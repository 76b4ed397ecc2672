use async_trait::async_trait;
use ns_core::Result;
use serde::{Deserialize, Serialize};

pub mod file;
pub mod rbc;

/// A search result before filtering and date normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    #[serde(default)]
    pub text: String,
    /// Unparsed byline, e.g. `"Экономика, 5 мар 2024, 14:30"`.
    #[serde(default, alias = "date")]
    pub raw_date: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

impl Candidate {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            raw_date: None,
            link: None,
        }
    }

    pub fn with_date(mut self, raw_date: impl Into<String>) -> Self {
        self.raw_date = Some(raw_date.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Short name used in logs and on the command line.
    fn name(&self) -> &str;

    /// One page of results for `query`. Pages start at 1; an empty page
    /// means there is nothing more.
    async fn fetch_page(&self, query: &str, page: usize) -> Result<Vec<Candidate>>;
}

/// Collapse the whitespace of rendered element text.
pub(crate) fn clean_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

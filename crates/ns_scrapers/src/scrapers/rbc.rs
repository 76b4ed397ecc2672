use async_trait::async_trait;
use lazy_static::lazy_static;
use ns_core::{Error, Result};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::{clean_text, Candidate, CandidateSource};

lazy_static! {
    static ref ITEM: Selector = Selector::parse(".search-item").expect("valid selector");
    static ref TITLE: Selector = Selector::parse(".search-item__title").expect("valid selector");
    static ref TEXT: Selector = Selector::parse(".search-item__text").expect("valid selector");
    static ref CATEGORY: Selector = Selector::parse(".search-item__category").expect("valid selector");
    static ref LINK: Selector = Selector::parse(".search-item__link").expect("valid selector");
}

/// Search results of rbc.ru.
#[derive(Debug, Clone)]
pub struct RbcSearchScraper {
    client: reqwest::Client,
    base_url: Url,
}

impl RbcSearchScraper {
    const BASE_URL: &'static str = "https://www.rbc.ru";

    pub fn new() -> Result<Self> {
        Self::with_base_url(Self::BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| Error::Scraping(format!("Invalid base URL {}: {}", base_url, e)))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }

    pub fn search_url(&self, query: &str, page: usize) -> Result<Url> {
        let mut url = self
            .base_url
            .join("/search/")
            .map_err(|e| Error::Scraping(format!("Failed to build search URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("page", &page.to_string());
        Ok(url)
    }

    pub fn parse_search_page(&self, html: &str) -> Vec<Candidate> {
        let document = Html::parse_document(html);
        document
            .select(&ITEM)
            .filter_map(|item| self.parse_item(item))
            .collect()
    }

    fn parse_item(&self, item: ElementRef<'_>) -> Option<Candidate> {
        let title = item.select(&TITLE).next().map(|el| clean_text(el.text()))?;
        if title.is_empty() {
            return None;
        }

        let text = item
            .select(&TEXT)
            .next()
            .map(|el| clean_text(el.text()))
            .unwrap_or_default();
        let raw_date = item.select(&CATEGORY).next().map(|el| clean_text(el.text()));
        let link = item
            .select(&LINK)
            .next()
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| self.base_url.join(href).ok())
            .map(String::from);

        Some(Candidate {
            title,
            text,
            raw_date,
            link,
        })
    }
}

#[async_trait]
impl CandidateSource for RbcSearchScraper {
    fn name(&self) -> &str {
        "rbc"
    }

    async fn fetch_page(&self, query: &str, page: usize) -> Result<Vec<Candidate>> {
        let url = self.search_url(query, page)?;
        debug!("🌐 GET {}", url);
        let html = self
            .client
            .get(url.as_str())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(self.parse_search_page(&html))
    }
}

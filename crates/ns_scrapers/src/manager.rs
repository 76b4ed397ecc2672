use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Local;
use ns_core::logging::Logger;
use ns_core::{normalize, Error, NewsItem, NewsStorage, Result, TextEncoder};
use ns_inference::aggregation::Clock;
use ns_inference::filter::DEFAULT_THRESHOLD;
use ns_inference::SemanticFilter;

use crate::scrapers::{Candidate, CandidateSource};

/// How collected items reach the raw store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Replace the stored collection.
    #[default]
    Overwrite,
    /// Append, skipping titles already stored.
    Merge,
}

impl FromStr for WriteMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "overwrite" => Ok(WriteMode::Overwrite),
            "merge" | "append" => Ok(WriteMode::Merge),
            other => Err(Error::InvalidInput(format!("Unknown write mode: {}", other))),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Overwrite => write!(f, "overwrite"),
            WriteMode::Merge => write!(f, "merge"),
        }
    }
}

/// Runs one scrape session: fetch, filter, normalize, store.
pub struct NewsCollector {
    source: Arc<dyn CandidateSource>,
    encoder: Arc<dyn TextEncoder>,
    storage: Arc<dyn NewsStorage>,
    threshold: f32,
    max_pages: usize,
    clock: Clock,
}

impl fmt::Debug for NewsCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewsCollector")
            .field("source", &self.source.name())
            .field("encoder", &self.encoder.name())
            .field("threshold", &self.threshold)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

impl NewsCollector {
    pub const DEFAULT_MAX_PAGES: usize = 50;

    pub fn new(
        source: Arc<dyn CandidateSource>,
        encoder: Arc<dyn TextEncoder>,
        storage: Arc<dyn NewsStorage>,
    ) -> Self {
        Self {
            source,
            encoder,
            storage,
            threshold: DEFAULT_THRESHOLD,
            max_pages: Self::DEFAULT_MAX_PAGES,
            clock: Arc::new(|| Local::now().date_naive()),
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Collects up to `count` relevant items for `query` and writes them to
    /// the raw store. Returns what was collected in this session.
    ///
    /// Only page fetches run on the async runtime. Embedding titles and
    /// writing the store happen on the blocking pool.
    pub async fn collect(&self, query: &str, count: usize, mode: WriteMode) -> Result<Vec<NewsItem>> {
        if count == 0 {
            return Err(Error::InvalidInput("news count must be positive".to_string()));
        }
        let logger = Logger::new()
            .with_prefix(self.source.name())
            .with_prefix(query);

        let mut filter = {
            let encoder = self.encoder.clone();
            let query = query.to_string();
            let threshold = self.threshold;
            blocking(move || SemanticFilter::new(encoder, &query, threshold)).await?
        };
        let today = (self.clock)();
        let mut collected: Vec<NewsItem> = Vec::with_capacity(count);

        for page in 1..=self.max_pages {
            let candidates = match self.source.fetch_page(query, page).await {
                Ok(candidates) => candidates,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    logger.warn(&format!("⚠️ Page {} failed, stopping: {}", page, e));
                    break;
                }
            };
            if candidates.is_empty() {
                logger.debug(&format!("📭 Page {} is empty", page));
                break;
            }
            logger.debug(&format!("📄 Page {}: {} candidates", page, candidates.len()));

            let wanted = count - collected.len();
            let (returned, accepted) = blocking(move || {
                let accepted = accept_page(&mut filter, candidates, today, wanted);
                Ok((filter, accepted))
            })
            .await?;
            filter = returned;
            collected.extend(accepted);
            if collected.len() >= count {
                break;
            }
        }

        if collected.len() < count {
            logger.warn(&format!(
                "🔎 Found {} of {} requested items (threshold {:.2})",
                filter.accepted(),
                count,
                filter.threshold()
            ));
        }

        let storage = self.storage.clone();
        let items = collected.clone();
        let written = blocking(move || match mode {
            WriteMode::Overwrite => storage.save_news(&items).map(|_| items.len()),
            WriteMode::Merge => storage.merge_news(&items),
        })
        .await;
        match written {
            Ok(written) => logger.info(&format!(
                "💾 Wrote {} of {} collected items ({})",
                written,
                collected.len(),
                mode
            )),
            Err(e) => {
                logger.error(&format!("❌ Failed to write {} collected items: {}", collected.len(), e));
                return Err(e);
            }
        }
        Ok(collected)
    }
}

/// Runs synchronous embedding or file work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Scraping(format!("background task failed: {}", e)))?
}

/// Accepted candidates of one page, at most `wanted` of them, in page order.
fn accept_page(
    filter: &mut SemanticFilter,
    candidates: Vec<Candidate>,
    today: chrono::NaiveDate,
    wanted: usize,
) -> Vec<NewsItem> {
    let mut accepted = Vec::new();
    for candidate in candidates {
        if accepted.len() >= wanted {
            break;
        }
        if filter.accept(&candidate.title) {
            accepted.push(to_news_item(candidate, today));
        }
    }
    accepted
}

fn to_news_item(candidate: Candidate, today: chrono::NaiveDate) -> NewsItem {
    let normalized = normalize(candidate.raw_date.as_deref().unwrap_or_default(), today);
    let mut item = NewsItem::new(
        candidate.title,
        candidate.text,
        normalized.formatted(),
        candidate.link.unwrap_or_default(),
    );
    item.raw_date = normalized.raw().map(String::from);
    item
}

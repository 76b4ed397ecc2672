use std::sync::RwLock;

use ns_core::{Error, NewsItem, NewsStorage, PlotSeries, PlotStorage, Result};

/// Process-local store, used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    news: RwLock<Vec<NewsItem>>,
    plot: RwLock<PlotSeries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_news(news: Vec<NewsItem>) -> Self {
        Self {
            news: RwLock::new(news),
            plot: RwLock::new(PlotSeries::new()),
        }
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Storage("memory store lock poisoned".to_string())
}

impl NewsStorage for MemoryStore {
    fn load_news(&self) -> Result<Vec<NewsItem>> {
        Ok(self.news.read().map_err(poisoned)?.clone())
    }

    fn save_news(&self, items: &[NewsItem]) -> Result<()> {
        *self.news.write().map_err(poisoned)? = items.to_vec();
        Ok(())
    }
}

impl PlotStorage for MemoryStore {
    fn load_plot(&self) -> Result<PlotSeries> {
        Ok(self.plot.read().map_err(poisoned)?.clone())
    }

    fn save_plot(&self, series: &PlotSeries) -> Result<()> {
        *self.plot.write().map_err(poisoned)? = series.clone();
        Ok(())
    }
}

use std::collections::HashSet;

use crate::types::{NewsItem, PlotPoint, PlotSeries};
use crate::Result;

/// The raw news collection.
///
/// A missing or malformed backing file reads as an empty collection.
/// Writes replace the whole collection at once.
pub trait NewsStorage: Send + Sync {
    fn load_news(&self) -> Result<Vec<NewsItem>>;

    fn save_news(&self, items: &[NewsItem]) -> Result<()>;

    /// Append the items whose title is not stored yet. Returns how many were added.
    fn merge_news(&self, items: &[NewsItem]) -> Result<usize> {
        let mut stored = self.load_news()?;
        let mut titles: HashSet<String> = stored.iter().map(|i| i.title.clone()).collect();
        let mut added = 0;
        for item in items {
            if titles.insert(item.title.clone()) {
                stored.push(item.clone());
                added += 1;
            }
        }
        if added > 0 {
            self.save_news(&stored)?;
        }
        Ok(added)
    }
}

/// The plot time series.
pub trait PlotStorage: Send + Sync {
    fn load_plot(&self) -> Result<PlotSeries>;

    fn save_plot(&self, series: &PlotSeries) -> Result<()>;

    /// Extend every column by one aligned element. Returns the stored series.
    fn append_point(&self, point: PlotPoint) -> Result<PlotSeries> {
        let mut series = self.load_plot()?;
        series.push(point);
        self.save_plot(&series)?;
        Ok(series)
    }

    /// Drop the last element of every column.
    fn retract_last(&self) -> Result<Option<PlotPoint>> {
        let mut series = self.load_plot()?;
        let removed = series.pop();
        if removed.is_some() {
            self.save_plot(&series)?;
        }
        Ok(removed)
    }
}

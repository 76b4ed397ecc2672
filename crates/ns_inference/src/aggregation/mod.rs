//! Turns the raw news store into the plot series.
//!
//! Two paths:
//! - refresh: `Idle → Sorting → Predicting → Persisting → Idle`,
//! - simulate: `Idle → SimulatingAppend → Presenting → SimulatingRetract → Idle`.
//!
//! Every operation holds the service's writer lock from start to finish, so
//! within one process the stores are never read mid-write. Other processes
//! writing the same files are not coordinated.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use ns_core::dates::format_date;
use ns_core::{
    sort_by_date, NewsItem, NewsStorage, PlotPoint, PlotSeries, PlotStorage, PlotView, Result, SortOrder,
};
use tracing::{debug, error, info};

use crate::models::RegressionPredictor;

pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationState {
    Idle,
    Sorting,
    Predicting,
    Persisting,
    SimulatingAppend,
    Presenting,
    SimulatingRetract,
}

/// Holds the writer lock for one operation and returns to `Idle` when
/// dropped, on success and on error alike.
struct Run<'a> {
    state: MutexGuard<'a, AggregationState>,
}

impl Run<'_> {
    fn enter(&mut self, next: AggregationState) {
        debug!("🔀 {:?} → {:?}", *self.state, next);
        *self.state = next;
    }
}

impl Drop for Run<'_> {
    fn drop(&mut self) {
        if *self.state != AggregationState::Idle {
            debug!("🔀 {:?} → Idle", *self.state);
            *self.state = AggregationState::Idle;
        }
    }
}

pub struct AggregationService {
    news: Arc<dyn NewsStorage>,
    plot: Arc<dyn PlotStorage>,
    predictor: Arc<RegressionPredictor>,
    clock: Clock,
    state: Mutex<AggregationState>,
}

impl fmt::Debug for AggregationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregationService")
            .field("predictor", &self.predictor)
            .field("state", &self.state.try_lock().map(|state| *state).ok())
            .finish()
    }
}

impl AggregationService {
    pub fn new(
        news: Arc<dyn NewsStorage>,
        plot: Arc<dyn PlotStorage>,
        predictor: Arc<RegressionPredictor>,
    ) -> Self {
        Self {
            news,
            plot,
            predictor,
            clock: Arc::new(|| chrono::Local::now().date_naive()),
            state: Mutex::new(AggregationState::Idle),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> AggregationState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> Run<'_> {
        Run {
            state: self.state.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Re-score every stored article and replace the plot series.
    ///
    /// The plot store is written once, after every prediction succeeded.
    pub fn refresh(&self) -> Result<PlotSeries> {
        let mut run = self.begin();

        run.enter(AggregationState::Sorting);
        let mut news = self.news.load_news()?;
        sort_by_date(&mut news, SortOrder::Ascending);

        run.enter(AggregationState::Predicting);
        let texts: Vec<String> = news.iter().map(NewsItem::prediction_text).collect();
        let predictions = self.predictor.predict(&texts)?;

        run.enter(AggregationState::Persisting);
        let series = PlotSeries::from_points(
            news.into_iter()
                .zip(predictions)
                .map(|(item, prediction)| PlotPoint {
                    prediction,
                    date: item.date,
                    title: item.title,
                })
                .collect(),
        );
        self.plot.save_plot(&series)?;

        info!("📈 Plot refreshed with {} points", series.len());
        Ok(series)
    }

    /// Score one ad-hoc text and show it on top of the current series.
    ///
    /// The point is appended, the extended view captured, and the point
    /// retracted again before returning: the next read never sees it. If the
    /// retraction cannot be written, the series read before the append is
    /// written back instead.
    pub fn simulate(&self, text: &str) -> Result<PlotView> {
        if text.trim().is_empty() {
            info!("🧪 Empty simulation text, nothing to simulate");
            return self.current_view(SortOrder::Ascending);
        }

        let mut run = self.begin();

        run.enter(AggregationState::SimulatingAppend);
        let prediction = self.predictor.predict_one(text)?;
        let point = PlotPoint {
            prediction,
            date: format_date((self.clock)()),
            title: simulated_title(text).to_string(),
        };
        let before = self.plot.load_plot()?;
        let extended = self.plot.append_point(point)?;

        run.enter(AggregationState::Presenting);
        let view = self.load_sorted_news(SortOrder::Ascending).map(|news_data| PlotView {
            plot_data: extended,
            news_data,
        });

        run.enter(AggregationState::SimulatingRetract);
        if let Err(e) = self.plot.retract_last() {
            error!("❌ Failed to retract simulated point, restoring previous plot: {}", e);
            if let Err(restore) = self.plot.save_plot(&before) {
                error!("❌ Failed to restore plot with {} points: {}", before.len(), restore);
            }
            return Err(e);
        }

        let view = view?;
        info!("🧪 Simulated {:?} → {:.3}", simulated_title(text), prediction);
        Ok(view)
    }

    pub fn current_view(&self, order: SortOrder) -> Result<PlotView> {
        let _run = self.begin();
        Ok(PlotView {
            plot_data: self.plot.load_plot()?,
            news_data: self.load_sorted_news(order)?,
        })
    }

    fn load_sorted_news(&self, order: SortOrder) -> Result<Vec<NewsItem>> {
        let mut news = self.news.load_news()?;
        sort_by_date(&mut news, order);
        Ok(news)
    }
}

/// Text up to the first period.
pub fn simulated_title(text: &str) -> &str {
    text.split('.').next().unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEncoder;
    use crate::models::RegressionHead;
    use ns_core::{Error, TextEncoder};
    use ns_storage::{JsonStore, MemoryStore};

    fn fixed_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()
    }

    fn predictor() -> Arc<RegressionPredictor> {
        let encoder = Arc::new(HashingEncoder::new(16, 64));
        let weights: Vec<f32> = (0..16).map(|i| if i % 2 == 0 { 0.4 } else { -0.3 }).collect();
        let head = RegressionHead::new(weights, 0.05, 0.1).unwrap();
        Arc::new(RegressionPredictor::new(encoder, head).unwrap())
    }

    fn news() -> Vec<NewsItem> {
        vec![
            NewsItem::new("B", "y", "02.01.2024", "https://example.com/b"),
            NewsItem::new("A", "x", "01.01.2024", "https://example.com/a"),
            NewsItem::new("C", "z", "15.02.2024", "https://example.com/c"),
        ]
    }

    fn service_with(store: Arc<MemoryStore>) -> AggregationService {
        AggregationService::new(store.clone(), store, predictor()).with_clock(Arc::new(fixed_day))
    }

    #[test]
    fn test_refresh_sorts_and_scores() {
        let store = Arc::new(MemoryStore::with_news(news()));
        let service = service_with(store.clone());

        let series = service.refresh().unwrap();
        assert_eq!(series.titles(), vec!["A", "B", "C"]);
        assert_eq!(series.dates(), vec!["01.01.2024", "02.01.2024", "15.02.2024"]);
        assert!(series.predictions().iter().all(|p| (-1.0..=1.0).contains(p)));

        let expected = predictor().predict(&["A. x", "B. y", "C. z"]).unwrap();
        assert_eq!(series.predictions(), expected);

        assert_eq!(store.load_plot().unwrap(), series);
        assert_eq!(service.state(), AggregationState::Idle);
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let store = Arc::new(MemoryStore::with_news(news()));
        let service = service_with(store.clone());

        let first = service.refresh().unwrap();
        let second = service.refresh().unwrap();
        assert_eq!(first, second);
        assert_eq!(store.load_plot().unwrap(), second);
    }

    #[test]
    fn test_refresh_replaces_previous_series() {
        let store = Arc::new(MemoryStore::with_news(news()));
        let service = service_with(store.clone());
        store
            .save_plot(&PlotSeries::from_points(vec![PlotPoint {
                prediction: 0.9,
                date: "01.01.2020".to_string(),
                title: "stale".to_string(),
            }]))
            .unwrap();

        let series = service.refresh().unwrap();
        assert_eq!(series.len(), 3);
        assert!(!series.titles().contains(&"stale".to_string()));
    }

    #[test]
    fn test_refresh_with_empty_store() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store.clone());
        assert!(service.refresh().unwrap().is_empty());
    }

    #[derive(Debug)]
    struct BrokenEncoder;

    impl TextEncoder for BrokenEncoder {
        fn name(&self) -> &str {
            "broken"
        }

        fn dimension(&self) -> usize {
            2
        }

        fn encode(&self, text: &str) -> ns_core::Result<Vec<f32>> {
            if text.starts_with('B') {
                Err(Error::Embedding("forward pass failed".to_string()))
            } else {
                Ok(vec![0.5, 0.5])
            }
        }
    }

    #[test]
    fn test_failed_prediction_leaves_plot_untouched() {
        let store = Arc::new(MemoryStore::with_news(news()));
        let previous = PlotSeries::from_points(vec![PlotPoint {
            prediction: 0.1,
            date: "01.01.2020".to_string(),
            title: "previous".to_string(),
        }]);
        store.save_plot(&previous).unwrap();

        let head = RegressionHead::new(vec![1.0, 1.0], 0.0, 0.0).unwrap();
        let predictor = Arc::new(RegressionPredictor::new(Arc::new(BrokenEncoder), head).unwrap());
        let service = AggregationService::new(store.clone(), store.clone(), predictor);

        assert!(matches!(service.refresh(), Err(Error::Prediction(_))));
        assert_eq!(store.load_plot().unwrap(), previous);
        assert_eq!(service.state(), AggregationState::Idle);

        assert!(service.simulate("Boom. Nothing else").is_err());
        assert_eq!(store.load_plot().unwrap(), previous);
    }

    #[test]
    fn test_simulate_appends_then_retracts() {
        let store = Arc::new(MemoryStore::with_news(news()));
        let service = service_with(store.clone());
        let before = service.refresh().unwrap();

        let view = service.simulate("Market crashes. Details follow.").unwrap();
        assert_eq!(view.plot_data.len(), before.len() + 1);
        let simulated = view.plot_data.last().unwrap();
        assert_eq!(simulated.title, "Market crashes");
        assert_eq!(simulated.date, "08.03.2024");
        assert_eq!(
            simulated.prediction,
            predictor().predict_one("Market crashes. Details follow.").unwrap()
        );
        assert_eq!(view.news_data.len(), 3);
        assert_eq!(view.news_data[0].title, "A");

        let after = store.load_plot().unwrap();
        assert_eq!(after.len(), before.len());
        assert_eq!(after, before);
        assert_eq!(service.current_view(SortOrder::Ascending).unwrap().plot_data, before);
        assert_eq!(service.state(), AggregationState::Idle);
    }

    /// Plot store whose n-th `save_plot` call fails.
    struct FailingSave {
        inner: MemoryStore,
        fail_on: usize,
        saves: std::sync::Mutex<usize>,
    }

    impl PlotStorage for FailingSave {
        fn load_plot(&self) -> Result<PlotSeries> {
            self.inner.load_plot()
        }

        fn save_plot(&self, series: &PlotSeries) -> Result<()> {
            let mut saves = self.saves.lock().unwrap();
            *saves += 1;
            if *saves == self.fail_on {
                return Err(Error::Storage("disk full".to_string()));
            }
            self.inner.save_plot(series)
        }
    }

    #[test]
    fn test_failed_retraction_restores_previous_plot() {
        let store = Arc::new(MemoryStore::with_news(news()));
        let before = service_with(store.clone()).refresh().unwrap();

        let plot = Arc::new(FailingSave {
            inner: MemoryStore::new(),
            fail_on: 2,
            saves: std::sync::Mutex::new(0),
        });
        plot.inner.save_plot(&before).unwrap();
        let service = AggregationService::new(store, plot.clone(), predictor()).with_clock(Arc::new(fixed_day));

        let result = service.simulate("Market crashes. Details follow.");
        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(plot.load_plot().unwrap(), before);
        assert_eq!(*plot.saves.lock().unwrap(), 3);
        assert_eq!(service.state(), AggregationState::Idle);
    }

    #[test]
    fn test_simulate_on_empty_plot() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store.clone());

        let view = service.simulate("No period here").unwrap();
        assert_eq!(view.plot_data.titles(), vec!["No period here"]);
        assert!(store.load_plot().unwrap().is_empty());
    }

    #[test]
    fn test_simulate_empty_text_returns_current_view() {
        let store = Arc::new(MemoryStore::with_news(news()));
        let service = service_with(store.clone());
        let before = service.refresh().unwrap();

        let view = service.simulate("   ").unwrap();
        assert_eq!(view.plot_data, before);
    }

    #[test]
    fn test_simulate_through_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStore::new(dir.path().join("news.json"), dir.path().join("plot.json")).unwrap());
        store.save_news(&news()).unwrap();
        let service = AggregationService::new(store.clone(), store.clone(), predictor())
            .with_clock(Arc::new(fixed_day));

        let before = service.refresh().unwrap();
        let view = service.simulate("Rates cut. More soon.").unwrap();
        assert_eq!(view.plot_data.len(), 4);

        let after = store.load_plot().unwrap();
        assert_eq!(after, before);
        assert_eq!(after.predictions().len(), after.dates().len());
        assert_eq!(after.dates().len(), after.titles().len());
    }

    #[test]
    fn test_current_view_order() {
        let store = Arc::new(MemoryStore::with_news(news()));
        let service = service_with(store);

        let descending = service.current_view(SortOrder::Descending).unwrap();
        let titles: Vec<&str> = descending.news_data.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "B", "A"]);
    }

    #[test]
    fn test_simulated_title() {
        assert_eq!(simulated_title("Market crashes. Details follow."), "Market crashes");
        assert_eq!(simulated_title("No period"), "No period");
        assert_eq!(simulated_title(".leading"), "");
    }
}

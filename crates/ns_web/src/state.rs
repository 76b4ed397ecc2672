use std::sync::Arc;

use ns_inference::AggregationService;
use ns_scrapers::NewsCollector;

pub struct AppState {
    pub aggregation: Arc<AggregationService>,
    pub collector: Arc<NewsCollector>,
}

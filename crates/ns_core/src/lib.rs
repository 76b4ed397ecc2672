pub mod dates;
pub mod error;
pub mod logging;
pub mod models;
pub mod similarity;
pub mod storage;
pub mod types;

pub use dates::{normalize, parse_date, sort_by_date, DateSource, NormalizedDate, SortOrder};
pub use error::{Error, Result};
pub use models::TextEncoder;
pub use similarity::cosine_similarity;
pub use storage::{NewsStorage, PlotStorage};
pub use types::{NewsItem, PlotPoint, PlotSeries, PlotView};

pub mod prelude {
    pub use super::{Error, NewsItem, PlotPoint, PlotSeries, Result, SortOrder, TextEncoder};
}

use serde::{Deserialize, Serialize};

/// A scraped news article as kept in the raw store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub text: String,
    /// `DD.MM.YYYY`
    pub date: String,
    pub link: String,
    /// Original date text, kept only when the date could not be parsed and
    /// today's date was substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_date: Option<String>,
}

impl NewsItem {
    pub fn new(
        title: impl Into<String>,
        text: impl Into<String>,
        date: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            date: date.into(),
            link: link.into(),
            raw_date: None,
        }
    }

    /// Text fed to the predictor: `"{title}. {text}"`, trimmed.
    pub fn prediction_text(&self) -> String {
        format!("{}. {}", self.title, self.text).trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlotPoint {
    pub prediction: f64,
    pub date: String,
    pub title: String,
}

/// Time series backing the chart.
///
/// Held as one sequence of records so the three columns can never drift
/// apart. On the wire it is the `{predictions, dates, titles}` object of
/// parallel arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "PlotSeriesWire", try_from = "PlotSeriesWire")]
pub struct PlotSeries {
    points: Vec<PlotPoint>,
}

impl PlotSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: Vec<PlotPoint>) -> Self {
        Self { points }
    }

    pub fn push(&mut self, point: PlotPoint) {
        self.points.push(point);
    }

    pub fn pop(&mut self) -> Option<PlotPoint> {
        self.points.pop()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlotPoint> {
        self.points.iter()
    }

    pub fn last(&self) -> Option<&PlotPoint> {
        self.points.last()
    }

    pub fn predictions(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.prediction).collect()
    }

    pub fn dates(&self) -> Vec<String> {
        self.points.iter().map(|p| p.date.clone()).collect()
    }

    pub fn titles(&self) -> Vec<String> {
        self.points.iter().map(|p| p.title.clone()).collect()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PlotSeriesWire {
    #[serde(default)]
    predictions: Vec<f64>,
    #[serde(default)]
    dates: Vec<String>,
    #[serde(default)]
    titles: Vec<String>,
}

impl From<PlotSeries> for PlotSeriesWire {
    fn from(series: PlotSeries) -> Self {
        let mut wire = PlotSeriesWire {
            predictions: Vec::with_capacity(series.len()),
            dates: Vec::with_capacity(series.len()),
            titles: Vec::with_capacity(series.len()),
        };
        for point in series.points {
            wire.predictions.push(point.prediction);
            wire.dates.push(point.date);
            wire.titles.push(point.title);
        }
        wire
    }
}

impl TryFrom<PlotSeriesWire> for PlotSeries {
    type Error = String;

    fn try_from(wire: PlotSeriesWire) -> Result<Self, Self::Error> {
        let len = wire.predictions.len();
        if wire.dates.len() != len || wire.titles.len() != len {
            return Err(format!(
                "plot columns differ in length: predictions={}, dates={}, titles={}",
                len,
                wire.dates.len(),
                wire.titles.len()
            ));
        }

        let points = wire
            .predictions
            .into_iter()
            .zip(wire.dates)
            .zip(wire.titles)
            .map(|((prediction, date), title)| PlotPoint {
                prediction,
                date,
                title,
            })
            .collect();
        Ok(Self { points })
    }
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlotView {
    pub plot_data: PlotSeries,
    pub news_data: Vec<NewsItem>,
}

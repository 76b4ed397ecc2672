use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use ns_core::{Error, NewsItem, NewsStorage, PlotSeries, PlotStorage, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// File-backed store: a JSON array of news items and a JSON object of plot
/// columns.
///
/// Every write is a full snapshot written next to the target and renamed
/// over it, so readers see either the old or the new file. There is no
/// locking between processes.
#[derive(Debug, Clone)]
pub struct JsonStore {
    news_path: PathBuf,
    plot_path: PathBuf,
}

impl JsonStore {
    pub fn new(news_path: impl Into<PathBuf>, plot_path: impl Into<PathBuf>) -> Result<Self> {
        let news_path = news_path.into();
        let plot_path = plot_path.into();
        for path in [&news_path, &plot_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::Storage(format!("Failed to create directory {}: {}", parent.display(), e))
                })?;
            }
        }
        Ok(Self { news_path, plot_path })
    }

    pub fn news_path(&self) -> &Path {
        &self.news_path
    }

    pub fn plot_path(&self) -> &Path {
        &self.plot_path
    }
}

fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("📂 {} does not exist yet, starting empty", path.display());
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!("⚠️ {} is malformed ({}), treating it as empty", path.display(), e);
            Ok(T::default())
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(&buffer)?;
    file.as_file().sync_all()?;
    file.persist(path)
        .map_err(|e| Error::Storage(format!("Failed to replace {}: {}", path.display(), e.error)))?;
    Ok(())
}

impl NewsStorage for JsonStore {
    fn load_news(&self) -> Result<Vec<NewsItem>> {
        read_json(&self.news_path)
    }

    fn save_news(&self, items: &[NewsItem]) -> Result<()> {
        write_json(&self.news_path, items)?;
        debug!("💾 Wrote {} news items to {}", items.len(), self.news_path.display());
        Ok(())
    }
}

impl PlotStorage for JsonStore {
    fn load_plot(&self) -> Result<PlotSeries> {
        read_json(&self.plot_path)
    }

    fn save_plot(&self, series: &PlotSeries) -> Result<()> {
        write_json(&self.plot_path, series)?;
        debug!("💾 Wrote {} plot points to {}", series.len(), self.plot_path.display());
        Ok(())
    }
}

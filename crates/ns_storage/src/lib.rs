use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use ns_core::{NewsStorage, PlotStorage, Result};

pub mod backends;

pub use backends::*;

pub const DEFAULT_NEWS_FILE: &str = "news.json";
pub const DEFAULT_PLOT_FILE: &str = "plot_data.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Json,
    Memory,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" | "file" => Ok(StorageKind::Json),
            "memory" => Ok(StorageKind::Memory),
            other => Err(format!("Unknown storage backend: {}", other)),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Json => write!(f, "json"),
            StorageKind::Memory => write!(f, "memory"),
        }
    }
}

/// Both collections served by one backend.
#[derive(Clone)]
pub struct Storage {
    pub news: Arc<dyn NewsStorage>,
    pub plot: Arc<dyn PlotStorage>,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("news", &"<dyn NewsStorage>")
            .field("plot", &"<dyn PlotStorage>")
            .finish()
    }
}

pub fn create_storage(kind: StorageKind, news_path: PathBuf, plot_path: PathBuf) -> Result<Storage> {
    match kind {
        StorageKind::Json => {
            let store = Arc::new(JsonStore::new(news_path, plot_path)?);
            Ok(Storage {
                news: store.clone(),
                plot: store,
            })
        }
        StorageKind::Memory => {
            let store = Arc::new(MemoryStore::new());
            Ok(Storage {
                news: store.clone(),
                plot: store,
            })
        }
    }
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, Storage, StorageKind};
}

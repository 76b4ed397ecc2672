use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ns_core::{sort_by_date, NewsStorage, PlotStorage, PlotView, SortOrder};
use ns_inference::filter::DEFAULT_THRESHOLD;
use ns_inference::models::create_predictor;
use ns_inference::{create_embedder, AggregationService, EncoderKind, DEFAULT_HIDDEN_SIZE, DEFAULT_MAX_LENGTH};
use ns_scrapers::prelude::{JsonFileSource, RbcSearchScraper};
use ns_scrapers::{CandidateSource, NewsCollector, WriteMode};
use ns_storage::{create_storage, Storage, StorageKind, DEFAULT_NEWS_FILE, DEFAULT_PLOT_FILE};
use ns_web::AppState;
use tracing::{error, info};

mod duration;

use duration::HumanDuration;

#[derive(Parser, Debug)]
#[command(author, version, about = "News sentiment timeline", long_about = None)]
pub struct Cli {
    #[arg(long, env = "storage", default_value = "json", help = "Storage backend: json (default), memory")]
    storage: StorageKind,
    #[arg(long, env = "news_json_file_name", default_value = DEFAULT_NEWS_FILE)]
    news_file: PathBuf,
    #[arg(long, env = "plot_data_json_file_name", default_value = DEFAULT_PLOT_FILE)]
    plot_file: PathBuf,
    /// Exported encoder (model.onnx + tokenizer files) and head.json
    #[arg(long, env = "model_dir")]
    model_dir: Option<PathBuf>,
    #[arg(long, env = "head_file")]
    head_file: Option<PathBuf>,
    #[arg(long, env = "encoder", default_value = "fastembed", help = "Encoder: fastembed (default), hashing")]
    encoder: EncoderKind,
    #[arg(long, env = "model_hidden_size", default_value_t = DEFAULT_HIDDEN_SIZE)]
    hidden_size: usize,
    #[arg(long, env = "encoding_max_length", default_value_t = DEFAULT_MAX_LENGTH)]
    max_length: usize,
    #[arg(long, env = "similarity_threshold", default_value_t = DEFAULT_THRESHOLD)]
    threshold: f32,
    #[arg(long, env = "embedding_cache_dir")]
    cache_dir: Option<PathBuf>,
    /// Local sentence model export (e.g. rubert-tiny-turbo) for the relevance filter
    #[arg(long, env = "sentence_model_dir")]
    sentence_model_dir: Option<PathBuf>,
    #[arg(long, env = "log_level", default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Collect news for a query into the raw store and rebuild the plot
    Extract {
        query: String,
        #[arg(long, short = 'n', default_value_t = 10)]
        count: usize,
        /// Merge into the stored news instead of replacing them
        #[arg(long)]
        append: bool,
        /// Read candidates from a JSON file instead of searching rbc.ru
        #[arg(long)]
        from_file: Option<PathBuf>,
        #[arg(long, default_value_t = NewsCollector::DEFAULT_MAX_PAGES)]
        max_pages: usize,
        /// Repeat with the given interval (e.g. 1h, 30m, 1h15m30s)
        #[arg(long)]
        every: Option<HumanDuration>,
    },
    /// Score every stored item and replace the plot
    Plot,
    /// Show an ad-hoc text on top of the current plot without storing it
    Simulate { text: String },
    /// Print the stored plot and news
    Show {
        #[arg(long, default_value = "asc")]
        order: SortOrder,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "bind_addr", default_value = "127.0.0.1:8000")]
        addr: String,
    },
}

impl Cli {
    fn inference_config(&self) -> ns_inference::Config {
        ns_inference::Config {
            encoder: self.encoder,
            model_dir: self.model_dir.clone(),
            head_file: self.head_file.clone(),
            hidden_size: self.hidden_size,
            max_length: self.max_length,
            similarity_threshold: self.threshold,
            cache_dir: self.cache_dir.clone(),
            sentence_model_dir: self.sentence_model_dir.clone(),
        }
    }

    fn storage(&self) -> anyhow::Result<Storage> {
        let storage = create_storage(self.storage, self.news_file.clone(), self.plot_file.clone())?;
        info!("💾 Storage initialized (using {})", self.storage);
        Ok(storage)
    }

    fn aggregation(&self, storage: &Storage) -> anyhow::Result<Arc<AggregationService>> {
        let predictor = create_predictor(&self.inference_config()).context("failed to load the regression model")?;
        Ok(Arc::new(AggregationService::new(
            storage.news.clone(),
            storage.plot.clone(),
            predictor,
        )))
    }

    fn collector(&self, storage: &Storage, from_file: Option<PathBuf>, max_pages: usize) -> anyhow::Result<NewsCollector> {
        let source: Arc<dyn CandidateSource> = match from_file {
            Some(path) => Arc::new(JsonFileSource::new(path)),
            None => Arc::new(RbcSearchScraper::new()?),
        };
        let embedder = create_embedder(&self.inference_config()).context("failed to load the sentence encoder")?;
        info!("🦗 Collector ready (source: {}, encoder: {})", source.name(), embedder.name());
        Ok(NewsCollector::new(source, embedder, storage.news.clone())
            .with_threshold(self.threshold)
            .with_max_pages(max_pages))
    }
}

async fn on_blocking<T, F>(aggregation: &Arc<AggregationService>, f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&AggregationService) -> ns_core::Result<T> + Send + 'static,
{
    let aggregation = aggregation.clone();
    Ok(tokio::task::spawn_blocking(move || f(&aggregation)).await??)
}

async fn extract_once(
    collector: &NewsCollector,
    aggregation: &Arc<AggregationService>,
    query: &str,
    count: usize,
    mode: WriteMode,
) -> anyhow::Result<()> {
    let collected = collector.collect(query, count, mode).await?;
    info!("📰 Collected {} items for {:?}", collected.len(), query);
    let series = on_blocking(aggregation, |svc| svc.refresh()).await?;
    info!("📈 Plot has {} points", series.len());
    Ok(())
}

fn print_view(view: &PlotView) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(view)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    ns_core::logging::init_logging(&cli.log_level);

    let storage = cli.storage()?;

    match &cli.command {
        Commands::Extract {
            query,
            count,
            append,
            from_file,
            max_pages,
            every,
        } => {
            let collector = cli.collector(&storage, from_file.clone(), *max_pages)?;
            let aggregation = cli.aggregation(&storage)?;
            let mode = if *append { WriteMode::Merge } else { WriteMode::Overwrite };

            match every {
                Some(interval) => {
                    info!("⏰ Running in periodic mode every {}", interval);
                    loop {
                        info!("🦗 Starting extract cycle for {:?}", query);
                        if let Err(e) = extract_once(&collector, &aggregation, query, *count, mode).await {
                            error!("❌ Extract cycle failed: {:#}", e);
                        }
                        info!("💤 Waiting {} before next cycle", interval);
                        tokio::time::sleep(interval.0).await;
                    }
                }
                None => extract_once(&collector, &aggregation, query, *count, mode).await?,
            }
        }
        Commands::Plot => {
            let aggregation = cli.aggregation(&storage)?;
            let view = on_blocking(&aggregation, |svc| {
                svc.refresh()?;
                svc.current_view(SortOrder::Ascending)
            })
            .await?;
            print_view(&view)?;
        }
        Commands::Simulate { text } => {
            let aggregation = cli.aggregation(&storage)?;
            let text = text.clone();
            let view = on_blocking(&aggregation, move |svc| svc.simulate(&text)).await?;
            print_view(&view)?;
        }
        Commands::Show { order } => {
            // Reading needs no model.
            let mut news_data = storage.news.load_news()?;
            sort_by_date(&mut news_data, *order);
            let view = PlotView {
                plot_data: storage.plot.load_plot()?,
                news_data,
            };
            print_view(&view)?;
        }
        Commands::Serve { addr } => {
            let collector = cli.collector(&storage, None, NewsCollector::DEFAULT_MAX_PAGES)?;
            let aggregation = cli.aggregation(&storage)?;
            let state = AppState {
                aggregation,
                collector: Arc::new(collector),
            };
            ns_web::serve(state, addr).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_extract() {
        let cli = Cli::try_parse_from([
            "ns", "--encoder", "hashing", "extract", "нефть", "-n", "5", "--append", "--every", "1h30m",
        ])
        .unwrap();
        assert_eq!(cli.encoder, EncoderKind::Hashing);
        match cli.command {
            Commands::Extract {
                query,
                count,
                append,
                every,
                ..
            } => {
                assert_eq!(query, "нефть");
                assert_eq!(count, 5);
                assert!(append);
                assert_eq!(every.map(|d| d.0.as_secs()), Some(5400));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_show_order_is_validated() {
        assert!(Cli::try_parse_from(["ns", "show", "--order", "desc"]).is_ok());
        assert!(Cli::try_parse_from(["ns", "show", "--order", "sideways"]).is_err());
    }

    #[test]
    fn test_inference_config_follows_flags() {
        let cli = Cli::try_parse_from([
            "ns",
            "--model-dir",
            "/models/rubert",
            "--max-length",
            "128",
            "--threshold",
            "0.5",
            "--sentence-model-dir",
            "/models/rubert-tiny-turbo",
            "plot",
        ])
        .unwrap();
        let config = cli.inference_config();
        assert_eq!(config.model_dir, Some(PathBuf::from("/models/rubert")));
        assert_eq!(config.max_length, 128);
        assert_eq!(config.similarity_threshold, 0.5);
        assert_eq!(config.sentence_model_dir, Some(PathBuf::from("/models/rubert-tiny-turbo")));
        assert_eq!(config.head_path().unwrap(), PathBuf::from("/models/rubert/head.json"));
    }
}

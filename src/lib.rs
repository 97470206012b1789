pub mod annotate;
pub mod cache;
pub mod config;
pub mod distance;
pub mod errors;
pub mod geocoder;
pub mod pipeline;
pub mod rate_limit;
pub mod resolver;
pub mod table;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use annotate::{
    Address, Classification, FailureReason, Record, RecordAnnotator, RecordOutcome,
};
pub use cache::GeocodeCache;
pub use config::{AppConfig, PublicAppConfig};
pub use distance::{haversine_km, Coordinate};
pub use errors::{AppError, AppResult};
pub use geocoder::{AddressLookup, HttpGeocoder, ResolutionOutcome};
pub use pipeline::{
    BatchOutput, BatchPipeline, BatchProgress, BatchStats, ProgressObserver, DISTANCE_HEADER,
    RESULT_HEADER,
};
pub use rate_limit::RateLimiter;
pub use resolver::{AddressResolver, ResolverStats};
pub use table::{
    read_csv, read_csv_path, write_csv, write_csv_path, CellValue, ColumnSchema, Table,
};

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,card_distance_monitor=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}

pub fn build_pipeline(config: &AppConfig, lookup: Arc<dyn AddressLookup>) -> BatchPipeline {
    let resolver = AddressResolver::new(
        lookup,
        Arc::new(GeocodeCache::new()),
        Arc::new(RateLimiter::new(config.min_interval())),
    );
    let annotator = RecordAnnotator::new(Arc::new(resolver), config.distance_threshold_km);
    BatchPipeline::new(annotator, config.columns)
}

pub fn pipeline_from_config(config: &AppConfig) -> AppResult<BatchPipeline> {
    let geocoder = HttpGeocoder::from_config(config)?;
    Ok(build_pipeline(config, Arc::new(geocoder)))
}

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod metrics;
pub mod source;
pub mod testing;

pub use aggregator::{AggregateError, Aggregator, AggregatorConfig, SourceFailure};
pub use cache::{CacheError, CacheLookup, CacheStats, ResultCache};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, IbitConfig,
    YtsConfig,
};
pub use source::{
    IbitSource, Source, SourceError, TorrentResult, YtsSource, IBIT_SOURCE_NAME, YTS_SOURCE_NAME,
};

pub mod config;
pub mod record;

pub use config::{parse_chart_config, ConfigSource, Dimension, ParsedMapConfig, TimeValue};
pub use record::ChartRecord;

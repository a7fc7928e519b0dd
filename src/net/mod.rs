pub mod metrics;
pub mod resolver;

pub use metrics::MetricsCollector;
pub use resolver::resolve;

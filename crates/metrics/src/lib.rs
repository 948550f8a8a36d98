//! Metrics and log setup for the Hyperdrive agent runtime
//!
//! Counters live in one process-wide prometheus registry; [`MetricsCollector`]
//! is the handle the executor and chain controller record through.
//!
//! # Example
//!
//! ```no_run
//! use hyperdrive_agents_metrics::{init_tracing, MetricsCollector, TracingConfig};
//!
//! init_tracing(&TracingConfig::default()).unwrap();
//! let collector = MetricsCollector::new();
//! collector.record_checkpoint_created();
//! println!("{}", collector.gather().unwrap());
//! ```

pub mod collector;
pub mod metrics;
pub mod tracing;

pub use collector::{MetricsCollector, MetricsError};
pub use tracing::{init_tracing, CorrelationId, TracingConfig, TracingError, TradeBatchSpan};

//! Call metrics for the pipeline.
//!
//! Every call made through the pipeline is recorded twice: once in the
//! `"global"` collector and once in the collector of the API it targeted.
//!
//! # Overview
//!
//! - [`MetricsCollector`]: Atomic counters for one stream of calls
//! - [`MetricsSnapshot`]: A serializable point-in-time view of a collector
//! - [`MetricsRegistry`]: Named collectors sharing one enabled switch
//! - [`MonitoringReport`]: Snapshots of every collector at once
//!
//! # Example
//!
//! ```rust
//! use shopify_pipeline::metrics::MetricsRegistry;
//!
//! let registry = MetricsRegistry::new();
//! let report = registry.report();
//!
//! assert!(report.enabled);
//! assert!(!report.global.has_errors());
//! ```

mod collector;
mod registry;
mod snapshot;

pub use collector::MetricsCollector;
pub use registry::{MetricsRegistry, GLOBAL_COLLECTOR};
pub use snapshot::{FailureCounts, MetricsSnapshot, MonitoringReport};

//! groupingtail-core: log tailing metrics extraction.
//!
//! Provides:
//! - `source`: line sources (resumable file tailer, UDP syslog listener)
//! - `grouping`: per-source grouping tail feeding instruments
//! - `instrument`: counters, gauges and throughput accumulators
//! - `config`: JSON configuration model
//! - `collector`: poll cycle over all tails
//! - `dispatch`: collectd `PUTVAL` output

pub mod collector;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod grouping;
pub mod instrument;
pub mod pattern;
pub mod source;

pub use collector::{Collector, Sample};
pub use config::Config;
pub use error::{Error, Result};
pub use grouping::{GroupingTail, Metric};

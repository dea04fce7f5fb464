//! Collector driver: one poll cycle over every configured tail.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::grouping::GroupingTail;

/// Plugin name used in dispatched identifiers.
pub const PLUGIN: &str = "groupingtail";

/// A value ready for the monitoring backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub plugin: &'static str,
    /// `<file instance>.<group>*<match instance>`
    pub plugin_instance: String,
    pub value_type: String,
    pub value: f64,
}

/// Timing information for the last collection cycle.
#[derive(Debug, Clone, Default)]
pub struct CollectTiming {
    /// Total cycle time.
    pub total: Duration,
    /// Time spent pulling and classifying lines.
    pub update: Duration,
    /// Time spent reading instruments.
    pub read: Duration,
    /// Lines that were assigned a group.
    pub grouped_lines: usize,
}

/// Drives all tails: update everything, then read everything.
pub struct Collector {
    tails: Vec<(String, GroupingTail)>,
    last_timing: Option<CollectTiming>,
}

impl Collector {
    pub fn new(tails: Vec<(String, GroupingTail)>) -> Self {
        Self {
            tails,
            last_timing: None,
        }
    }

    /// Build every tail described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let tails = config.build_tails()?;
        info!(tails = tails.len(), "collector configured");
        Ok(Self::new(tails))
    }

    pub fn tail_count(&self) -> usize {
        self.tails.len()
    }

    /// Timing information from the last [`collect`](Self::collect) call.
    pub fn last_timing(&self) -> Option<&CollectTiming> {
        self.last_timing.as_ref()
    }

    /// Run one poll cycle and return the samples to dispatch.
    pub fn collect(&mut self) -> Vec<Sample> {
        let start = Instant::now();

        let mut grouped_lines = 0;
        for (_, tail) in &mut self.tails {
            grouped_lines += tail.update();
        }
        let update = start.elapsed();

        let mut samples = Vec::new();
        for (instance, tail) in &mut self.tails {
            for metric in tail.read_metrics() {
                samples.push(Sample {
                    plugin: PLUGIN,
                    plugin_instance: format!("{instance}.{}", metric.name),
                    value_type: metric.value_type,
                    value: metric.value,
                });
            }
        }

        let total = start.elapsed();
        let timing = CollectTiming {
            total,
            update,
            read: total.saturating_sub(update),
            grouped_lines,
        };
        debug!(
            tails = self.tails.len(),
            samples = samples.len(),
            grouped_lines,
            elapsed_ms = timing.total.as_millis() as u64,
            "collection cycle"
        );
        self.last_timing = Some(timing);
        samples
    }
}

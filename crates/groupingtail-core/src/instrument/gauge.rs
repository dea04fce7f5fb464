//! Per-cycle gauges. Both variants drop their bucket after every read.

use chrono::{DateTime, Utc};

use super::{Bucket, Extractor, Instrument, InstrumentKind, ValueCast, write_with};

const CAST: ValueCast = ValueCast::Wrap32;

fn read_and_reset(bucket: &mut Bucket<f64>) -> Vec<(String, f64)> {
    bucket.trim();
    bucket.normalize(|v| CAST.apply(*v));
    let values = bucket.snapshot(|v| *v);
    bucket.reset();
    values
}

/// Sum of captured integers per group within one read cycle.
pub struct GaugeInt {
    extractor: Extractor,
    bucket: Bucket<f64>,
}

impl GaugeInt {
    pub fn new(extractor: Extractor, max_groups: usize) -> Self {
        Self {
            extractor,
            bucket: Bucket::new(max_groups),
        }
    }
}

impl Instrument for GaugeInt {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::GaugeInt
    }

    fn write_at(&mut self, group: &str, line: &str, now: DateTime<Utc>) {
        write_with(
            InstrumentKind::GaugeInt,
            &self.extractor,
            &mut self.bucket,
            group,
            line,
            now,
            |bucket, caps| {
                let value = self.extractor.value(caps, CAST)?;
                let current = bucket.get(group).copied().unwrap_or(0.0);
                bucket.insert(group, current + value);
                Ok(())
            },
        );
    }

    fn read_at(&mut self, _now: DateTime<Utc>) -> Vec<(String, f64)> {
        read_and_reset(&mut self.bucket)
    }

    fn reset(&mut self) {
        self.bucket.reset();
    }
}

/// Largest captured integer per group within one read cycle.
pub struct Max {
    extractor: Extractor,
    bucket: Bucket<f64>,
}

impl Max {
    pub fn new(extractor: Extractor, max_groups: usize) -> Self {
        Self {
            extractor,
            bucket: Bucket::new(max_groups),
        }
    }
}

impl Instrument for Max {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Max
    }

    fn write_at(&mut self, group: &str, line: &str, now: DateTime<Utc>) {
        write_with(
            InstrumentKind::Max,
            &self.extractor,
            &mut self.bucket,
            group,
            line,
            now,
            |bucket, caps| {
                let value = self.extractor.value(caps, CAST)?;
                if !bucket.get(group).is_some_and(|current| *current >= value) {
                    bucket.insert(group, value);
                }
                Ok(())
            },
        );
    }

    fn read_at(&mut self, _now: DateTime<Utc>) -> Vec<(String, f64)> {
        read_and_reset(&mut self.bucket)
    }

    fn reset(&mut self) {
        self.bucket.reset();
    }
}

//! Counting instruments: occurrence counts, running sums and derived rates.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{Bucket, Extractor, Instrument, InstrumentKind, ValueCast, write_with};

/// Counts matching lines per group. Counts restart at zero after every read;
/// groups stay tracked so an idle group reports 0.
pub struct CounterInc {
    extractor: Extractor,
    bucket: Bucket<f64>,
}

impl CounterInc {
    const CAST: ValueCast = ValueCast::Wrap32;

    pub fn new(extractor: Extractor, max_groups: usize) -> Self {
        Self {
            extractor,
            bucket: Bucket::new(max_groups),
        }
    }
}

impl Instrument for CounterInc {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::CounterInc
    }

    fn write_at(&mut self, group: &str, line: &str, now: DateTime<Utc>) {
        write_with(
            InstrumentKind::CounterInc,
            &self.extractor,
            &mut self.bucket,
            group,
            line,
            now,
            |bucket, _caps| {
                let count = bucket.get(group).copied().unwrap_or(0.0);
                bucket.insert(group, count + 1.0);
                Ok(())
            },
        );
    }

    fn read_at(&mut self, _now: DateTime<Utc>) -> Vec<(String, f64)> {
        self.bucket.trim();
        self.bucket.normalize(|v| Self::CAST.apply(*v));
        let values = self.bucket.snapshot(|v| *v);
        self.bucket.for_each_value(|v| *v = 0.0);
        values
    }

    fn reset(&mut self) {
        self.bucket.reset();
    }
}

/// Running total of a captured value per group. Never reset by a read.
pub struct CounterSum {
    kind: InstrumentKind,
    extractor: Extractor,
    cast: ValueCast,
    bucket: Bucket<f64>,
}

impl CounterSum {
    pub fn new(extractor: Extractor, cast: ValueCast, max_groups: usize) -> Self {
        let kind = match cast {
            ValueCast::Float => InstrumentKind::CounterSum,
            ValueCast::Wrap32 => InstrumentKind::CounterSumInt,
        };
        Self {
            kind,
            extractor,
            cast,
            bucket: Bucket::new(max_groups),
        }
    }
}

impl Instrument for CounterSum {
    fn kind(&self) -> InstrumentKind {
        self.kind
    }

    fn write_at(&mut self, group: &str, line: &str, now: DateTime<Utc>) {
        let cast = self.cast;
        write_with(
            self.kind,
            &self.extractor,
            &mut self.bucket,
            group,
            line,
            now,
            |bucket, caps| {
                let value = self.extractor.value(caps, cast)?;
                let total = bucket.get(group).copied().unwrap_or(0.0);
                bucket.insert(group, total + value);
                Ok(())
            },
        );
    }

    fn read_at(&mut self, _now: DateTime<Utc>) -> Vec<(String, f64)> {
        let cast = self.cast;
        self.bucket.trim();
        self.bucket.normalize(|v| cast.apply(*v));
        self.bucket.snapshot(|v| *v)
    }

    fn reset(&mut self) {
        self.bucket.reset();
    }
}

/// Per-second rate of a running 32-bit total, measured between reads.
pub struct DeriveCounter {
    sum: CounterSum,
    last_read: Option<DateTime<Utc>>,
}

impl DeriveCounter {
    pub fn new(extractor: Extractor, max_groups: usize) -> Self {
        Self {
            sum: CounterSum::new(extractor, ValueCast::Wrap32, max_groups),
            last_read: None,
        }
    }

    /// Seconds since the previous read; 1.0 on the first read or when the
    /// clock did not move forward.
    fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = match self.last_read {
            Some(last) => (now - last).num_milliseconds() as f64 / 1000.0,
            None => 1.0,
        };
        if elapsed > 0.0 { elapsed } else { 1.0 }
    }
}

impl Instrument for DeriveCounter {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::DeriveCounter
    }

    fn write_at(&mut self, group: &str, line: &str, now: DateTime<Utc>) {
        self.sum.write_at(group, line, now);
    }

    fn read_at(&mut self, now: DateTime<Utc>) -> Vec<(String, f64)> {
        let elapsed = self.elapsed_secs(now);
        self.last_read = Some(now);
        debug!(elapsed, "derive counter read");
        self.sum
            .read_at(now)
            .into_iter()
            .map(|(group, total)| (group, total / elapsed))
            .collect()
    }

    fn reset(&mut self) {
        self.sum.reset();
    }
}

//! Throughput gauges: quantity divided by elapsed time, per read cycle.

use chrono::{DateTime, Utc};
use regex::Captures;

use super::{Bucket, Extractor, Instrument, InstrumentKind, ValueCast, named_value, write_with};
use crate::error::{AppendError, Error, Result};
use crate::pattern;

const CAST: ValueCast = ValueCast::Float;

/// Accumulates `[total_value, total_elapsed]` per group and reports
/// `total_value / total_elapsed` (or the raw total when no time elapsed).
///
/// With more than one quantity capture, the first one that is present and
/// converts is used. This covers log formats that emit the same measurement
/// at one of two positions.
pub struct GaugeThroughput {
    kind: InstrumentKind,
    extractor: Extractor,
    quantity: Vec<String>,
    time: String,
    bucket: Bucket<(f64, f64)>,
}

impl GaugeThroughput {
    pub fn new(
        extractor: Extractor,
        quantity: Vec<String>,
        time: String,
        max_groups: usize,
    ) -> Result<Self> {
        Self::with_kind(InstrumentKind::GaugeThroughput, extractor, quantity, time, max_groups)
    }

    /// Quantity taken from `primary`, falling back to `alternate`.
    pub fn total(
        extractor: Extractor,
        primary: String,
        alternate: String,
        time: String,
        max_groups: usize,
    ) -> Result<Self> {
        Self::with_kind(
            InstrumentKind::GaugeTotalThroughput,
            extractor,
            vec![primary, alternate],
            time,
            max_groups,
        )
    }

    fn with_kind(
        kind: InstrumentKind,
        extractor: Extractor,
        quantity: Vec<String>,
        time: String,
        max_groups: usize,
    ) -> Result<Self> {
        for name in quantity.iter().chain(std::iter::once(&time)) {
            if !pattern::has_named_group(extractor.regex(), name) {
                return Err(Error::invalid_config(format!(
                    "{kind} regex {:?} has no capture group named {name:?}",
                    extractor.regex().as_str()
                )));
            }
        }
        Ok(Self {
            kind,
            extractor,
            quantity,
            time,
            bucket: Bucket::new(max_groups),
        })
    }
}

/// First quantity capture that is present and converts.
fn first_quantity(caps: &Captures<'_>, names: &[String]) -> std::result::Result<f64, AppendError> {
    let mut last_err = None;
    for name in names {
        match named_value(caps, Some(name), CAST) {
            Ok(value) => return Ok(value),
            Err(err @ AppendError::Conversion { .. }) => last_err = Some(err),
            Err(err) => {
                if last_err.is_none() {
                    last_err = Some(err);
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| AppendError::missing_capture(None)))
}

fn bandwidth(&(total, elapsed): &(f64, f64)) -> f64 {
    if elapsed > 0.0 { total / elapsed } else { total }
}

impl Instrument for GaugeThroughput {
    fn kind(&self) -> InstrumentKind {
        self.kind
    }

    fn write_at(&mut self, group: &str, line: &str, now: DateTime<Utc>) {
        let (names, time) = (&self.quantity, &self.time);
        write_with(
            self.kind,
            &self.extractor,
            &mut self.bucket,
            group,
            line,
            now,
            |bucket, caps| {
                let quantity = first_quantity(caps, names)?;
                let elapsed = named_value(caps, Some(time), CAST)?;
                let (total, spent) = bucket.get(group).copied().unwrap_or((0.0, 0.0));
                bucket.insert(group, (total + quantity, spent + elapsed));
                Ok(())
            },
        );
    }

    fn read_at(&mut self, _now: DateTime<Utc>) -> Vec<(String, f64)> {
        self.bucket.trim();
        self.bucket.normalize(|&(total, elapsed)| (CAST.apply(total), CAST.apply(elapsed)));
        let values = self.bucket.snapshot(bandwidth);
        self.bucket.reset();
        values
    }

    fn reset(&mut self) {
        self.bucket.reset();
    }
}

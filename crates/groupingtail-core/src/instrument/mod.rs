//! Stateful instruments that turn matched log lines into metric values.
//!
//! Every instrument owns an extraction regex and a [`Bucket`] of per-group
//! values. `write()` feeds one line for one group; `read()` trims the bucket
//! to the cardinality cap and reports `(group, value)` pairs. Whether the
//! bucket is reset after a read depends on the variant:
//!
//! | Kind                   | Accumulation          | After read      |
//! |------------------------|-----------------------|-----------------|
//! | `CounterInc`           | +1 per line           | counts zeroed   |
//! | `CounterSum[Int]`      | + value               | kept            |
//! | `DeriveCounter`        | + value               | kept, rate out  |
//! | `GaugeInt`             | + value               | reset           |
//! | `Max`                  | max(value)            | reset           |
//! | `GaugeThroughput`      | + (value, elapsed)    | reset, rate out |
//! | `GaugeTotalThroughput` | as above, 2 sources   | reset, rate out |

mod bucket;
mod cast;
mod counter;
mod gauge;
mod throughput;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use tracing::{trace, warn};

use crate::error::{AppendError, Error, Result};
use crate::pattern;

pub use bucket::Bucket;
pub use cast::{NUM32, ValueCast};
pub use counter::{CounterInc, CounterSum, DeriveCounter};
pub use gauge::{GaugeInt, Max};
pub use throughput::GaugeThroughput;

/// Default cap on distinct groups per instrument.
pub const DEFAULT_MAX_GROUPS: usize = 64;

/// A stateful accumulator for one output metric.
pub trait Instrument: Send {
    /// Kind name, for logging.
    fn kind(&self) -> InstrumentKind;

    /// Feed one line for `group`, stamping the touch with `now`.
    fn write_at(&mut self, group: &str, line: &str, now: DateTime<Utc>);

    /// Report current values as of `now`, applying the variant's reset policy.
    fn read_at(&mut self, now: DateTime<Utc>) -> Vec<(String, f64)>;

    /// Drop all accumulated state.
    fn reset(&mut self);

    fn write(&mut self, group: &str, line: &str) {
        self.write_at(group, line, Utc::now());
    }

    fn read(&mut self) -> Vec<(String, f64)> {
        self.read_at(Utc::now())
    }
}

/// Closed set of instrument kinds, selected by name in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    CounterInc,
    CounterSum,
    CounterSumInt,
    GaugeInt,
    Max,
    GaugeThroughput,
    GaugeTotalThroughput,
    DeriveCounter,
}

impl InstrumentKind {
    pub const ALL: [InstrumentKind; 8] = [
        InstrumentKind::CounterInc,
        InstrumentKind::CounterSum,
        InstrumentKind::CounterSumInt,
        InstrumentKind::GaugeInt,
        InstrumentKind::Max,
        InstrumentKind::GaugeThroughput,
        InstrumentKind::GaugeTotalThroughput,
        InstrumentKind::DeriveCounter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InstrumentKind::CounterInc => "CounterInc",
            InstrumentKind::CounterSum => "CounterSum",
            InstrumentKind::CounterSumInt => "CounterSumInt",
            InstrumentKind::GaugeInt => "GaugeInt",
            InstrumentKind::Max => "Max",
            InstrumentKind::GaugeThroughput => "GaugeThroughput",
            InstrumentKind::GaugeTotalThroughput => "GaugeTotalThroughput",
            InstrumentKind::DeriveCounter => "DeriveCounter",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstrumentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        InstrumentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownInstrument {
                kind: s.to_string(),
            })
    }
}

/// Everything needed to construct an instrument.
#[derive(Debug, Clone)]
pub struct InstrumentSpec {
    pub kind: InstrumentKind,
    pub regex: String,
    /// Value capture; for throughput kinds, the quantity capture.
    pub group_name: Option<String>,
    /// Elapsed-time capture for throughput kinds.
    pub time_group: Option<String>,
    /// Second quantity capture for `GaugeTotalThroughput`.
    pub alt_group: Option<String>,
    pub max_groups: usize,
}

impl InstrumentSpec {
    pub fn new(kind: InstrumentKind, regex: impl Into<String>) -> Self {
        Self {
            kind,
            regex: regex.into(),
            group_name: None,
            time_group: None,
            alt_group: None,
            max_groups: DEFAULT_MAX_GROUPS,
        }
    }

    pub fn group_name(mut self, name: impl Into<String>) -> Self {
        self.group_name = Some(name.into());
        self
    }

    pub fn time_group(mut self, name: impl Into<String>) -> Self {
        self.time_group = Some(name.into());
        self
    }

    pub fn alt_group(mut self, name: impl Into<String>) -> Self {
        self.alt_group = Some(name.into());
        self
    }

    pub fn max_groups(mut self, max_groups: usize) -> Self {
        self.max_groups = max_groups;
        self
    }

    /// Build the instrument this spec describes.
    pub fn build(&self) -> Result<Box<dyn Instrument>> {
        let kind = self.kind;
        let value = || Extractor::new(&self.regex, self.group_name.clone());
        let named = |param: &'static str, value: &Option<String>| {
            value.clone().ok_or(Error::MissingParameter {
                kind: kind.as_str(),
                param,
            })
        };
        tracing::info!(
            kind = %kind,
            regex = %self.regex,
            group_name = self.group_name.as_deref().unwrap_or("-"),
            max_groups = self.max_groups,
            "building instrument"
        );

        let instrument: Box<dyn Instrument> = match kind {
            InstrumentKind::CounterInc => Box::new(CounterInc::new(
                Extractor::matcher(&self.regex)?,
                self.max_groups,
            )),
            InstrumentKind::CounterSum => Box::new(CounterSum::new(
                value()?.require_capture()?,
                ValueCast::Float,
                self.max_groups,
            )),
            InstrumentKind::CounterSumInt => Box::new(CounterSum::new(
                value()?.require_capture()?,
                ValueCast::Wrap32,
                self.max_groups,
            )),
            InstrumentKind::DeriveCounter => Box::new(DeriveCounter::new(
                value()?.require_capture()?,
                self.max_groups,
            )),
            InstrumentKind::GaugeInt => Box::new(GaugeInt::new(
                value()?.require_capture()?,
                self.max_groups,
            )),
            InstrumentKind::Max => {
                Box::new(Max::new(value()?.require_capture()?, self.max_groups))
            }
            InstrumentKind::GaugeThroughput => Box::new(GaugeThroughput::new(
                Extractor::matcher(&self.regex)?,
                vec![named("group_name", &self.group_name)?],
                named("time_group", &self.time_group)?,
                self.max_groups,
            )?),
            InstrumentKind::GaugeTotalThroughput => Box::new(GaugeThroughput::total(
                Extractor::matcher(&self.regex)?,
                named("group_name", &self.group_name)?,
                named("alt_group", &self.alt_group)?,
                named("time_group", &self.time_group)?,
                self.max_groups,
            )?),
        };
        Ok(instrument)
    }
}

/// Extraction regex plus the capture that carries the value.
#[derive(Debug, Clone)]
pub struct Extractor {
    regex: Regex,
    group: Option<String>,
}

impl Extractor {
    /// Regex with a value capture: `group` if given, else the first capture group.
    pub fn new(pattern: &str, group: Option<String>) -> Result<Self> {
        let regex = pattern::compile_anchored(pattern)?;
        if let Some(name) = &group
            && !pattern::has_named_group(&regex, name)
        {
            return Err(Error::invalid_config(format!(
                "regex {pattern:?} has no capture group named {name:?}"
            )));
        }
        Ok(Self { regex, group })
    }

    /// Regex used only to decide whether a line matches.
    pub fn matcher(pattern: &str) -> Result<Self> {
        Self::new(pattern, None)
    }

    fn require_capture(self) -> Result<Self> {
        if self.group.is_none() && pattern::group_count(&self.regex) == 0 {
            return Err(Error::invalid_config(format!(
                "regex {:?} needs a capture group for the value",
                self.regex.as_str()
            )));
        }
        Ok(self)
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn captures<'h>(&self, line: &'h str) -> Option<Captures<'h>> {
        self.regex.captures(line)
    }

    /// Extract and cast the value capture.
    pub fn value(
        &self,
        caps: &Captures<'_>,
        cast: ValueCast,
    ) -> std::result::Result<f64, AppendError> {
        named_value(caps, self.group.as_deref(), cast)
    }
}

/// Extract and cast a capture; a missing capture is a fault.
pub(crate) fn named_value(
    caps: &Captures<'_>,
    name: Option<&str>,
    cast: ValueCast,
) -> std::result::Result<f64, AppendError> {
    let text = pattern::capture(caps, name).ok_or_else(|| AppendError::missing_capture(name))?;
    cast.parse(text)
}

/// Shared `write()` flow: match, append, then touch or recover.
///
/// A conversion error leaves the bucket untouched. Any other failure drops
/// the whole bucket.
pub(crate) fn write_with<T>(
    kind: InstrumentKind,
    extractor: &Extractor,
    bucket: &mut Bucket<T>,
    group: &str,
    line: &str,
    now: DateTime<Utc>,
    append: impl FnOnce(&mut Bucket<T>, &Captures<'_>) -> std::result::Result<(), AppendError>,
) {
    let Some(caps) = extractor.captures(line) else {
        return;
    };
    match append(bucket, &caps) {
        Ok(()) => {
            trace!(%kind, group, "touch group");
            bucket.touch(group, now);
        }
        Err(AppendError::Conversion { text }) => {
            trace!(%kind, group, text = %text, "ignoring unconvertible value");
        }
        Err(AppendError::Fault { reason }) => {
            warn!(%kind, group, reason = %reason, "instrument failed, dropping accumulated state");
            bucket.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        for kind in InstrumentKind::ALL {
            assert_eq!(kind.as_str().parse::<InstrumentKind>().unwrap(), kind);
        }
        assert!(matches!(
            "Histogram".parse::<InstrumentKind>(),
            Err(Error::UnknownInstrument { .. })
        ));
    }

    #[test]
    fn test_build_every_kind() {
        let regex = r"(?P<bytes>\d+) (?P<alt>\d+) (?P<secs>[\d.]+)";
        for kind in InstrumentKind::ALL {
            let spec = InstrumentSpec::new(kind, regex)
                .group_name("bytes")
                .alt_group("alt")
                .time_group("secs");
            let instrument = spec.build().unwrap();
            assert_eq!(instrument.kind(), kind);
        }
    }

    #[test]
    fn test_build_rejects_unknown_named_group() {
        let spec = InstrumentSpec::new(InstrumentKind::GaugeInt, r"(?P<a>\d+)").group_name("b");
        assert!(matches!(spec.build(), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_build_requires_value_capture() {
        let spec = InstrumentSpec::new(InstrumentKind::CounterSum, r"GET \d+");
        assert!(spec.build().is_err());
        // CounterInc only counts matches
        let spec = InstrumentSpec::new(InstrumentKind::CounterInc, r"GET \d+");
        assert!(spec.build().is_ok());
    }

    #[test]
    fn test_build_throughput_requires_time_group() {
        let spec = InstrumentSpec::new(InstrumentKind::GaugeThroughput, r"(?P<b>\d+)")
            .group_name("b");
        assert!(matches!(
            spec.build(),
            Err(Error::MissingParameter {
                param: "time_group",
                ..
            })
        ));
    }
}

//! collectd plain-text protocol output (`PUTVAL`), as read by the exec plugin.

use std::io::{self, Write};

use crate::collector::Sample;

/// Characters collectd does not accept inside identifier parts.
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| match c {
            '/' | '"' | ' ' | '\t' | '\n' | '\r' => '_',
            c => c,
        })
        .collect()
}

/// Format a value the way collectd parses it.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "U".to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Writes samples as `PUTVAL "<host>/<plugin>-<instance>/<type>" interval=<n> N:<value>`.
pub struct PutvalWriter<W: Write> {
    out: W,
    hostname: String,
    interval: u64,
}

impl<W: Write> PutvalWriter<W> {
    pub fn new(out: W, hostname: impl Into<String>, interval: u64) -> Self {
        Self {
            out,
            hostname: sanitize(&hostname.into()),
            interval,
        }
    }

    /// Render one sample without writing it.
    pub fn format(&self, sample: &Sample) -> String {
        format!(
            "PUTVAL \"{}/{}-{}/{}\" interval={} N:{}",
            self.hostname,
            sanitize(sample.plugin),
            sanitize(&sample.plugin_instance),
            sanitize(&sample.value_type),
            self.interval,
            format_value(sample.value)
        )
    }

    /// Write all samples and flush.
    pub fn write_all(&mut self, samples: &[Sample]) -> io::Result<()> {
        for sample in samples {
            let line = self.format(sample);
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

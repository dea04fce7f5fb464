//! Log line sources.
//!
//! A [`LineSource`] hands out batches of lines that were not returned
//! before. Polling never blocks and never fails: read problems are logged
//! and show up as an empty batch.

pub mod syslog;
pub mod tailer;

use std::collections::VecDeque;
use std::path::PathBuf;

use crate::error::{Error, Result};

pub use syslog::SyslogListener;
pub use tailer::{FileTailer, Offset};

/// Produces new log lines since the previous poll.
pub trait LineSource: Send {
    /// Lines not returned by any earlier call, in arrival order.
    fn pull_new_lines(&mut self) -> Vec<String>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Where a tail reads its lines from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    File(PathBuf),
    Syslog { host: String, port: u16 },
}

impl SourceLocator {
    /// Parse a filesystem path or a `syslog://host:port` URL.
    pub fn parse(locator: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidSource {
            locator: locator.to_string(),
            reason: reason.to_string(),
        };
        match locator.strip_prefix("syslog://") {
            Some(rest) => {
                let rest = rest.trim_end_matches('/');
                let (host, port) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| invalid("expected syslog://host:port"))?;
                let host = host.trim_start_matches('[').trim_end_matches(']');
                if host.is_empty() {
                    return Err(invalid("missing host"));
                }
                let port = port.parse().map_err(|_| invalid("invalid port"))?;
                Ok(SourceLocator::Syslog {
                    host: host.to_string(),
                    port,
                })
            }
            None if locator.is_empty() => Err(invalid("empty path")),
            None => Ok(SourceLocator::File(PathBuf::from(locator))),
        }
    }

    /// Open the source. `offset_path` is used by file sources only.
    pub fn open(&self, offset_path: PathBuf) -> Result<Box<dyn LineSource>> {
        match self {
            SourceLocator::File(path) => Ok(Box::new(FileTailer::new(path.clone(), offset_path))),
            SourceLocator::Syslog { host, port } => {
                Ok(Box::new(SyslogListener::bind(host, *port)?))
            }
        }
    }
}

/// In-memory source: lines pushed by the caller are handed out on the next poll.
#[derive(Debug, Default)]
pub struct MemorySource {
    pending: VecDeque<String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pending: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.pending.push_back(line.into());
    }
}

impl LineSource for MemorySource {
    fn pull_new_lines(&mut self) -> Vec<String> {
        self.pending.drain(..).collect()
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

//! Configuration model.
//!
//! One JSON document lists the tailed sources (`files`) and, for each of
//! them, the match blocks that bind instruments to output metrics.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::grouping::GroupingTail;
use crate::instrument::{DEFAULT_MAX_GROUPS, InstrumentKind, InstrumentSpec};
use crate::source::{LineSource, SourceLocator};

fn default_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn default_interval() -> u64 {
    10
}

fn default_max_groups() -> usize {
    DEFAULT_MAX_GROUPS
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// Poll interval in seconds.
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Directory for offset files.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    #[serde(default)]
    pub files: Vec<FileConfig>,
}

/// One tailed source.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub instance: String,
    /// Filesystem path or `syslog://host:port`.
    pub source: String,
    pub group_by: String,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default = "default_max_groups")]
    pub max_groups: usize,
    #[serde(default)]
    pub offset_file: Option<PathBuf>,
    #[serde(default)]
    pub matches: Vec<MatchConfig>,
}

/// One output metric of a source.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchConfig {
    pub instance: String,
    /// Value type label handed to the dispatcher unchanged.
    #[serde(rename = "type")]
    pub value_type: String,
    pub ds_type: String,
    pub regex: String,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub time_group: Option<String>,
    #[serde(default)]
    pub alt_group: Option<String>,
}

impl Config {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(Error::invalid_config("interval must be at least 1 second"));
        }
        let mut seen = HashSet::new();
        for file in &self.files {
            if !seen.insert(file.instance.as_str()) {
                return Err(Error::invalid_config(format!(
                    "duplicate file instance {:?}",
                    file.instance
                )));
            }
            file.validate()?;
        }
        Ok(())
    }

    /// Build every configured tail, opening its source.
    pub fn build_tails(&self) -> Result<Vec<(String, GroupingTail)>> {
        self.files
            .iter()
            .map(|file| {
                let tail = file.build_tail(self.state_dir.as_deref())?;
                Ok((file.instance.clone(), tail))
            })
            .collect()
    }

    pub fn file(&self, instance: &str) -> Option<&FileConfig> {
        self.files.iter().find(|f| f.instance == instance)
    }
}

impl FileConfig {
    fn validate(&self) -> Result<()> {
        if self.max_groups == 0 {
            return Err(Error::invalid_config(format!(
                "file {:?}: max_groups must be positive",
                self.instance
            )));
        }
        SourceLocator::parse(&self.source)?;
        for m in &self.matches {
            m.kind()?;
        }
        Ok(())
    }

    /// Where the read position of a file source is persisted.
    pub fn offset_path(&self, state_dir: Option<&Path>) -> PathBuf {
        if let Some(path) = &self.offset_file {
            return path.clone();
        }
        match state_dir {
            Some(dir) => dir.join(format!("{}.offset", self.instance)),
            None => PathBuf::from(format!("{}.offset", self.source)),
        }
    }

    /// Open the configured source and build the tail around it.
    pub fn build_tail(&self, state_dir: Option<&Path>) -> Result<GroupingTail> {
        let locator = SourceLocator::parse(&self.source)?;
        let source = locator.open(self.offset_path(state_dir))?;
        self.build_tail_with_source(source)
    }

    /// Build the tail around an already opened source.
    pub fn build_tail_with_source(&self, source: Box<dyn LineSource>) -> Result<GroupingTail> {
        let mut tail = GroupingTail::new(source, &self.group_by, self.group_name.clone())?
            .with_instance(&self.instance);
        for m in &self.matches {
            let instrument = m.spec(self.max_groups)?.build()?;
            tail.add_match(m.instance.clone(), m.value_type.clone(), instrument);
        }
        info!(
            instance = %self.instance,
            source = %self.source,
            matches = self.matches.len(),
            max_groups = self.max_groups,
            "configured tail"
        );
        Ok(tail)
    }
}

impl MatchConfig {
    pub fn kind(&self) -> Result<InstrumentKind> {
        self.ds_type.parse()
    }

    pub fn spec(&self, max_groups: usize) -> Result<InstrumentSpec> {
        Ok(InstrumentSpec {
            kind: self.kind()?,
            regex: self.regex.clone(),
            group_name: self.group_name.clone(),
            time_group: self.time_group.clone(),
            alt_group: self.alt_group.clone(),
            max_groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "hostname": "proxy-01",
        "interval": 30,
        "files": [
            {
                "instance": "swift",
                "source": "/var/log/swift/proxy.log",
                "group_by": "\\S+ (?P<container>[-\\w.]+) ",
                "group_name": "container",
                "max_groups": 16,
                "matches": [
                    { "instance": "requests", "type": "counter",
                      "ds_type": "CounterInc", "regex": ".* GET " },
                    { "instance": "get_bytes", "type": "bytes",
                      "ds_type": "CounterSumInt", "regex": ".* GET .* (?P<bytes>\\d+)$",
                      "group_name": "bytes" }
                ]
            },
            {
                "instance": "push",
                "source": "syslog://127.0.0.1:0",
                "group_by": "(\\w+):"
            }
        ]
    }"#;

    fn parse(content: &str) -> Result<Config> {
        let config: Config = serde_json::from_str(content).map_err(|source| Error::ConfigParse {
            path: PathBuf::from("inline"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_parse_sample() {
        let config = parse(SAMPLE).unwrap();
        assert_eq!(config.hostname, "proxy-01");
        assert_eq!(config.interval, 30);
        let swift = config.file("swift").unwrap();
        assert_eq!(swift.max_groups, 16);
        assert_eq!(swift.matches[1].value_type, "bytes");
        assert_eq!(
            swift.matches[1].kind().unwrap(),
            InstrumentKind::CounterSumInt
        );
        assert_eq!(config.file("push").unwrap().max_groups, DEFAULT_MAX_GROUPS);
    }

    #[test]
    fn test_defaults() {
        let config = parse(r#"{ "files": [] }"#).unwrap();
        assert_eq!(config.interval, 10);
        assert!(!config.hostname.is_empty());
        assert!(config.state_dir.is_none());
    }

    #[test]
    fn test_rejects_unknown_ds_type() {
        let content = SAMPLE.replace("CounterInc", "Histogram");
        assert!(matches!(
            parse(&content),
            Err(Error::UnknownInstrument { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_instances() {
        let content = SAMPLE.replace("\"push\"", "\"swift\"");
        assert!(matches!(parse(&content), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let result = parse(r#"{ "files": [], "intervall": 5 }"#);
        assert!(matches!(result, Err(Error::ConfigParse { .. })));
    }

    #[test]
    fn test_offset_path_resolution() {
        let config = parse(SAMPLE).unwrap();
        let swift = config.file("swift").unwrap();
        assert_eq!(
            swift.offset_path(None),
            PathBuf::from("/var/log/swift/proxy.log.offset")
        );
        assert_eq!(
            swift.offset_path(Some(Path::new("/var/lib/gt"))),
            PathBuf::from("/var/lib/gt/swift.offset")
        );
        let mut explicit = swift.clone();
        explicit.offset_file = Some(PathBuf::from("/tmp/x.offset"));
        assert_eq!(explicit.offset_path(None), PathBuf::from("/tmp/x.offset"));
    }

    #[test]
    fn test_build_tails_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        std::fs::write(&log, "").unwrap();
        let content = format!(
            r#"{{
                "state_dir": {state:?},
                "files": [{{
                    "instance": "app",
                    "source": {log:?},
                    "group_by": "(\\w+) ",
                    "matches": [
                        {{ "instance": "hits", "type": "counter",
                           "ds_type": "CounterInc", "regex": ".*hit" }}
                    ]
                }}]
            }}"#,
            state = dir.path().to_str().unwrap(),
            log = log.to_str().unwrap(),
        );
        let path = dir.path().join("config.json");
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        let mut tails = config.build_tails().unwrap();
        assert_eq!(tails.len(), 1);
        let (instance, tail) = &mut tails[0];
        assert_eq!(instance, "app");
        assert_eq!(tail.instance(), Some("app"));

        std::fs::write(&log, "web hit\ndb hit\nweb hit\n").unwrap();
        tail.update();
        let mut metrics: Vec<(String, f64)> = tail
            .read_metrics()
            .into_iter()
            .map(|m| (m.name, m.value))
            .collect();
        metrics.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            metrics,
            vec![("db*hits".to_string(), 1.0), ("web*hits".to_string(), 2.0)]
        );
        assert!(dir.path().join("app.offset").exists());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/groupingtail.json"));
        assert!(matches!(result, Err(Error::Io { .. })));
    }
}

//! Grouping tail: classifies lines from one source into groups and feeds
//! them to every attached instrument.

use regex::Regex;
use tracing::field::Empty;
use tracing::{Span, debug, info_span, trace};

use crate::error::{Error, Result};
use crate::instrument::Instrument;
use crate::pattern;
use crate::source::LineSource;

/// One computed value, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    /// `<group_key>*<output_instance_name>`
    pub name: String,
    /// Pass-through value type label.
    pub value_type: String,
    pub value: f64,
}

/// Binding of one instrument to one named output metric.
pub struct MatchDefinition {
    pub instance_name: String,
    pub value_type: String,
    pub instrument: Box<dyn Instrument>,
}

/// All matchings for a single log source.
pub struct GroupingTail {
    source: Box<dyn LineSource>,
    group_by: Regex,
    group_name: Option<String>,
    matches: Vec<MatchDefinition>,
    instance: Option<String>,
    span: Span,
}

impl GroupingTail {
    /// `group_by` is matched at the start of each line. Without `group_name`
    /// it must define exactly one capture group, which becomes the group key.
    pub fn new(
        source: Box<dyn LineSource>,
        group_by: &str,
        group_name: Option<String>,
    ) -> Result<Self> {
        let regex = pattern::compile_anchored(group_by)?;
        match &group_name {
            Some(name) if !pattern::has_named_group(&regex, name) => {
                return Err(Error::invalid_config(format!(
                    "grouping regex {group_by:?} has no capture group named {name:?}"
                )));
            }
            None if pattern::group_count(&regex) != 1 => {
                return Err(Error::invalid_config(format!(
                    "grouping regex {group_by:?} must define exactly one capture group \
                     when no group name is given"
                )));
            }
            _ => {}
        }

        let span = info_span!("tail", instance = Empty, source = %source.describe());
        Ok(Self {
            source,
            group_by: regex,
            group_name,
            matches: Vec::new(),
            instance: None,
            span,
        })
    }

    /// Name this tail; recorded on its span.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        let instance = instance.into();
        self.span.record("instance", instance.as_str());
        self.instance = Some(instance);
        self
    }

    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    /// Attach an instrument under an output name.
    pub fn add_match(
        &mut self,
        instance_name: impl Into<String>,
        value_type: impl Into<String>,
        instrument: Box<dyn Instrument>,
    ) {
        let definition = MatchDefinition {
            instance_name: instance_name.into(),
            value_type: value_type.into(),
            instrument,
        };
        debug!(
            parent: &self.span,
            instance = %definition.instance_name,
            kind = %definition.instrument.kind(),
            "match added"
        );
        self.matches.push(definition);
    }

    pub fn matches(&self) -> &[MatchDefinition] {
        &self.matches
    }

    /// Normalized group key for `line`, or `None` if the line is not grouped.
    pub fn group_key(&self, line: &str) -> Option<String> {
        let caps = self.group_by.captures(line)?;
        let raw = pattern::capture(&caps, self.group_name.as_deref())?;
        Some(pattern::normalize_group_key(raw))
    }

    /// Pull new lines from the source and feed them to the instruments.
    ///
    /// Returns the number of lines that were assigned a group.
    pub fn update(&mut self) -> usize {
        let _enter = self.span.clone().entered();
        let lines = self.source.pull_new_lines();
        let total = lines.len();
        let mut grouped = 0;
        for line in &lines {
            let Some(group) = self.group_key(line) else {
                trace!(line = %line, "line not grouped");
                continue;
            };
            grouped += 1;
            for definition in &mut self.matches {
                definition.instrument.write(&group, line);
            }
        }
        debug!(lines = total, grouped, "tail updated");
        grouped
    }

    /// Current values of every instrument, named `<group>*<instance>`.
    ///
    /// Does not pull new lines; call [`update`](Self::update) first.
    pub fn read_metrics(&mut self) -> Vec<Metric> {
        let _enter = self.span.clone().entered();
        let mut metrics = Vec::new();
        for definition in &mut self.matches {
            for (group, value) in definition.instrument.read() {
                metrics.push(Metric {
                    name: format!("{group}*{}", definition.instance_name),
                    value_type: definition.value_type.clone(),
                    value,
                });
            }
        }
        debug!(metrics = metrics.len(), "metrics read");
        metrics
    }
}

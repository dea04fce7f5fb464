//! groupingtail-check - try a configuration against a sample log.
//!
//! Feeds every line of the input file through the configured grouping and
//! match regexes in a single cycle and prints the resulting metrics. No
//! offset files are written and no sockets are opened.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use groupingtail_core::source::MemorySource;
use groupingtail_core::{Config, Result};

#[derive(Parser)]
#[command(
    name = "groupingtail-check",
    about = "Run a sample log through a groupingtail configuration",
    version
)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Sample log file.
    #[arg(short, long)]
    input: PathBuf,

    /// Only check this file instance.
    #[arg(short, long)]
    file: Option<String>,

    /// Show per-line debug output.
    #[arg(short, long)]
    verbose: bool,
}

/// Per-file result of a check run.
struct Report {
    instance: String,
    total_lines: usize,
    grouped_lines: usize,
    metrics: Vec<String>,
}

fn run(config: &Config, lines: &[String], only: Option<&str>) -> Result<Vec<Report>> {
    let mut reports = Vec::new();
    for file in &config.files {
        if only.is_some_and(|name| name != file.instance) {
            continue;
        }
        let source = MemorySource::from_lines(lines.iter().cloned());
        let mut tail = file.build_tail_with_source(Box::new(source))?;
        let grouped_lines = tail.update();
        let metrics = tail
            .read_metrics()
            .into_iter()
            .map(|m| format!("{}.{} {} {}", file.instance, m.name, m.value_type, m.value))
            .collect();
        reports.push(Report {
            instance: file.instance.clone(),
            total_lines: lines.len(),
            grouped_lines,
            metrics,
        });
    }
    Ok(reports)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("groupingtail_core={level}")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(name) = &args.file
        && config.file(name).is_none()
    {
        eprintln!("error: no file instance named {name:?} in configuration");
        return ExitCode::FAILURE;
    }

    let content = match std::fs::read(&args.input) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            eprintln!("error: cannot read {}: {e}", args.input.display());
            return ExitCode::FAILURE;
        }
    };
    let lines: Vec<String> = content.lines().map(str::to_string).collect();

    match run(&config, &lines, args.file.as_deref()) {
        Ok(reports) => {
            for report in reports {
                println!(
                    "# {}: {}/{} lines grouped",
                    report.instance, report.grouped_lines, report.total_lines
                );
                for metric in report.metrics {
                    println!("{metric}");
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groupingtail_core::config::{FileConfig, MatchConfig};

    fn config() -> Config {
        let file = |instance: &str| FileConfig {
            instance: instance.to_string(),
            source: "/var/log/unused.log".to_string(),
            group_by: r"\S+ (?P<tenant>\w+) ".to_string(),
            group_name: Some("tenant".to_string()),
            max_groups: 64,
            offset_file: None,
            matches: vec![MatchConfig {
                instance: "get_bytes".to_string(),
                value_type: "bytes".to_string(),
                ds_type: "CounterSumInt".to_string(),
                regex: r".* GET .* (?P<bytes>\d+)$".to_string(),
                group_name: Some("bytes".to_string()),
                time_group: None,
                alt_group: None,
            }],
        };
        Config {
            hostname: "test".to_string(),
            interval: 10,
            state_dir: None,
            files: vec![file("swift"), file("other")],
        }
    }

    #[test]
    fn test_run_reports_metrics_per_file() {
        let lines: Vec<String> = [
            "10:00 acme GET /v1/obj 200 512",
            "10:01 acme GET /v1/obj 200 512",
            "10:02 acme HEAD /v1/obj 204 -",
            "unparsable",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let reports = run(&config(), &lines, Some("swift")).unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.instance, "swift");
        assert_eq!(report.total_lines, 4);
        assert_eq!(report.grouped_lines, 3);
        assert_eq!(report.metrics, vec!["swift.acme*get_bytes bytes 1024"]);
    }

    #[test]
    fn test_run_all_files() {
        let reports = run(&config(), &[], None).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.metrics.is_empty()));
    }
}

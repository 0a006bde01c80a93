use std::env;
use std::path::PathBuf;

use es_explorer::analysis::query::GroupBy;
use es_explorer::config::AnalysisConfig;
use es_explorer::runner::Command;
use es_explorer::similarity::DistanceMetric;

pub struct CliOptions {
    pub command: Command,
    pub data: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub preset: Option<String>,
    pub out_dir: Option<PathBuf>,
}

/// Parses the process arguments; `Ok(None)` means help was requested.
pub fn parse_args() -> Result<Option<CliOptions>, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

fn parse_args_from(args: Vec<String>) -> Result<Option<CliOptions>, String> {
    if args.iter().any(|a| a == "--help" || a == "-h") {
        return Ok(None);
    }
    parse_options(&args).map(Some)
}

fn parse_options(args: &[String]) -> Result<CliOptions, String> {
    let (first, rest) = args
        .split_first()
        .ok_or_else(|| "missing command".to_string())?;
    let command = Command::from_name(first).ok_or_else(|| {
        format!(
            "unknown command \"{first}\", expected one of: {}",
            Command::NAMES.join(", ")
        )
    })?;

    let mut i = 0usize;
    let mut data = None;
    let mut config = None;
    let mut preset = None;
    let mut out_dir = None;

    while i < rest.len() {
        match rest[i].as_str() {
            "--data" => {
                i += 1;
                let path = rest.next_or_err(i, "missing value for --data (expected a CSV path)")?;
                if data.replace(PathBuf::from(path)).is_some() {
                    return Err("--data provided more than once".to_string());
                }
            }
            "--config" => {
                i += 1;
                let path =
                    rest.next_or_err(i, "missing value for --config (expected a TOML path)")?;
                if config.replace(PathBuf::from(path)).is_some() {
                    return Err("--config provided more than once".to_string());
                }
            }
            "--preset" => {
                i += 1;
                let name =
                    rest.next_or_err(i, "missing value for --preset (expected a preset name)")?;
                if preset.replace(name.to_string()).is_some() {
                    return Err("--preset provided more than once".to_string());
                }
            }
            "--out-dir" => {
                i += 1;
                let path =
                    rest.next_or_err(i, "missing value for --out-dir (expected a directory)")?;
                if out_dir.replace(PathBuf::from(path)).is_some() {
                    return Err("--out-dir provided more than once".to_string());
                }
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if config.is_some() && preset.is_some() {
        return Err(
            "arguments `--config` and `--preset` are mutually exclusive; choose one source"
                .to_string(),
        );
    }

    if config.is_none() && preset.is_none() {
        preset = Some("default".to_string());
    }

    Ok(CliOptions {
        command,
        data,
        config,
        preset,
        out_dir,
    })
}

trait SliceArgExt {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String>;
}

impl SliceArgExt for [String] {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String> {
        self.get(index)
            .map(String::as_str)
            .ok_or_else(|| err.to_string())
    }
}

pub fn print_usage() {
    eprintln!("es-explorer: exploratory analysis of energy storage facility approvals");
    eprintln!();
    eprintln!("Usage:");
    eprintln!(
        "  es-explorer <{}> [--data <path>] [--config <path> | --preset <name>] [--out-dir <path>]",
        Command::NAMES.join("|")
    );
    eprintln!();
    eprintln!("Presets: {}", AnalysisConfig::PRESETS.join(", "));
    eprintln!("Group by ([query] group_by): {}", GroupBy::NAMES.join(", "));
    eprintln!(
        "Distance metrics ([similarity] metric): {}",
        DistanceMetric::NAMES.join(", ")
    );
    eprintln!("Log level follows RUST_LOG (default: info).");
}

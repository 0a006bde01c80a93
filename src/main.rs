//! es-explorer entry point: CLI wiring and config-driven pipeline runs.

mod cli;

use std::process;

use anyhow::{Context, Result, anyhow, bail};
use log::info;

use es_explorer::config::AnalysisConfig;
use es_explorer::runner::{self, load_dataset};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = match cli::parse_args() {
        Ok(Some(options)) => options,
        Ok(None) => {
            cli::print_usage();
            return;
        }
        Err(e) => {
            eprintln!("error: {e}");
            cli::print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = run(&options) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn load_config(options: &cli::CliOptions) -> Result<AnalysisConfig> {
    let config = match (&options.config, &options.preset) {
        (Some(path), _) => AnalysisConfig::from_toml_file(path)?,
        (None, Some(name)) => AnalysisConfig::from_preset(name)?,
        (None, None) => AnalysisConfig::default(),
    };

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        bail!("{} configuration error(s)", errors.len());
    }
    Ok(config)
}

fn run(options: &cli::CliOptions) -> Result<()> {
    let config = load_config(options)?;

    let data = options
        .data
        .as_deref()
        .or(config.dataset.path.as_deref())
        .ok_or_else(|| anyhow!("no input file; pass --data or set dataset.path"))?;
    let out_dir = options
        .out_dir
        .as_deref()
        .unwrap_or(&config.dataset.output_dir);

    info!("running {} on {}", options.command, data.display());
    let dataset =
        load_dataset(data).with_context(|| format!("cannot load \"{}\"", data.display()))?;
    let summary = runner::run(options.command, &dataset, &config, out_dir)
        .with_context(|| format!("{} failed", options.command))?;

    println!("{summary}");
    Ok(())
}

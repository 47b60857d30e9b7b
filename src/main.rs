use std::io::Write;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod pipeline;
mod preprocess;
mod profiles;
mod report;
mod semantic;
mod storage;
#[cfg(test)]
mod tests;

use cli::{Command, SelectionArgs};
use config::Config;
use pipeline::Pipeline;
use preprocess::PreprocessOption;
use semantic::{FastEmbedLoader, ModelSpec};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_options(codes: &[u8]) -> anyhow::Result<Vec<PreprocessOption>> {
    if codes.is_empty() {
        return Ok(PreprocessOption::ALL.to_vec());
    }

    let mut options = codes
        .iter()
        .map(|&code| PreprocessOption::try_from(code))
        .collect::<Result<Vec<_>, _>>()?;
    options.sort();
    options.dedup();
    Ok(options)
}

fn resolve_models(config: &Config, names: &[String]) -> anyhow::Result<Vec<ModelSpec>> {
    if names.is_empty() {
        return Ok(config.models.clone());
    }

    let mut models: Vec<ModelSpec> = Vec::new();
    for name in names {
        let Some(spec) = config.model(name) else {
            bail!(
                "unknown model '{}'; configured: {}",
                name,
                config
                    .models
                    .iter()
                    .map(|m| m.key.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        };
        if !models.contains(spec) {
            models.push(spec.clone());
        }
    }
    Ok(models)
}

fn apply_top_k(config: &mut Config, top_k: Option<usize>) -> anyhow::Result<()> {
    match top_k {
        Some(0) => bail!("--top-k must be greater than 0"),
        Some(k) => config.top_k = k,
        None => {}
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = cli::Args::parse();

    let mut config = Config::load_with(&args.data_dir)
        .with_context(|| format!("failed to load config from {}", args.data_dir.display()))?;

    let command = args.command.unwrap_or(Command::Run {
        selection: SelectionArgs::default(),
        top_k: None,
    });

    if let Command::Run { top_k, .. } | Command::Query { top_k, .. } = &command {
        apply_top_k(&mut config, *top_k)?;
    }

    let loader = FastEmbedLoader {
        cache_dir: config.base_path().to_path_buf(),
        batch_size: config.embedding_batch_size,
        show_progress: config.show_progress,
    };
    let pipeline = Pipeline::new(&config, &loader)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match command {
        Command::Run { selection, .. } => {
            let options = resolve_options(&selection.options)?;
            let models = resolve_models(&config, &selection.models)?;
            let reports = pipeline.run(&options, &models, &config.queries, &mut out)?;
            log::info!("Answered {} queries", reports.len());
        }
        Command::Build { selection } => {
            let options = resolve_options(&selection.options)?;
            let models = resolve_models(&config, &selection.models)?;
            pipeline.build(&options, &models)?;
        }
        Command::Query {
            text,
            option,
            model,
            ..
        } => {
            let option = PreprocessOption::try_from(option)?;
            let models = resolve_models(&config, &[model])?;
            for spec in &models {
                pipeline.query(option, spec, &text, &mut out)?;
            }
        }
        Command::Models {} => {
            for spec in &config.models {
                writeln!(out, "{}\t{}", spec.key, spec.model_name)?;
            }
        }
    }

    Ok(())
}

mod descriptor;
mod element;
mod jobs;
mod loader;
mod model;
mod reduce;
mod resolve;
mod simulate;

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::jobs::{ProjectReport, analyze_project};
use crate::loader::load_project;

/// CLI arguments for jaxray execution.
#[derive(Parser, Debug)]
#[command(
    name = "jaxray",
    about = "Recovers the REST API surface of a JAX-RS project from its bytecode class model.",
    version
)]
struct Cli {
    /// Class model document or directory of documents.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Output file; `-` or absent means stdout.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "text")]
    format: Format,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet);
    run(cli)
}

fn init_logging(quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jaxray=info,warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();
}

fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }

    let started_at = Instant::now();
    let classes = load_project(&cli.input)?;
    let load_duration_ms = started_at.elapsed().as_millis();
    let class_count = classes.len();
    info!("loaded {class_count} classes from {}", cli.input.display());

    let report = analyze_project(&classes);
    let rendered = match cli.format {
        Format::Text => render_text(&report),
        Format::Json => render_json(&report)?,
    };

    let mut writer = output_writer(cli.output.as_deref())?;
    writer
        .write_all(rendered.as_bytes())
        .context("failed to write report")?;

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} load_ms={} classes={} methods={}",
            started_at.elapsed().as_millis(),
            load_duration_ms,
            class_count,
            report.methods.len()
        );
    }

    Ok(())
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

fn render_json(report: &ProjectReport) -> Result<String> {
    let mut rendered =
        serde_json::to_string_pretty(report).context("failed to serialize report")?;
    rendered.push('\n');
    Ok(rendered)
}

fn render_text(report: &ProjectReport) -> String {
    let mut out = String::new();
    for method in &report.methods {
        match (&method.http_method, &method.path) {
            (Some(verb), Some(path)) => {
                let _ = writeln!(
                    out,
                    "{verb} {path}  {}.{}",
                    method.class_name, method.method_name
                );
            }
            _ => {
                let _ = writeln!(out, "{}.{}", method.class_name, method.method_name);
            }
        }
        if !method.statuses.is_empty() {
            let _ = writeln!(out, "  statuses: {}", join_i64(&method.statuses));
        }
        if !method.headers.is_empty() {
            let _ = writeln!(out, "  headers: {}", join_str(method.headers.iter()));
        }
        if !method.content_types.is_empty() {
            let _ = writeln!(out, "  content: {}", join_str(method.content_types.iter()));
        }
        if !method.produces.is_empty() {
            let _ = writeln!(out, "  produces: {}", join_str(method.produces.iter()));
        }
        if !method.entity_types.is_empty() {
            let _ = writeln!(out, "  entities: {}", join_str(method.entity_types.iter()));
        }
        for sample in &method.entity_samples {
            let _ = writeln!(out, "  sample: {sample}");
        }
    }
    out
}

fn join_i64(values: &std::collections::BTreeSet<i64>) -> String {
    values
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_str<'a>(values: impl Iterator<Item = &'a String>) -> String {
    values.cloned().collect::<Vec<_>>().join(", ")
}

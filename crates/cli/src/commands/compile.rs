// `quire compile`: render a source file with the local engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use quire_server::compile::{CompileOptions, CompileOrchestrator, DEFAULT_COMPILE_TIMEOUT};
use serde::{Deserialize, Serialize};

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct CompileArgs {
    /// LaTeX source file.
    pub file: PathBuf,

    /// Where to write the PDF (defaults to the source path with `.pdf`).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Engine executable (defaults to `bin/tectonic`).
    #[arg(long)]
    pub engine: Option<PathBuf>,

    /// Seconds before the engine is stopped.
    #[arg(long, default_value_t = DEFAULT_COMPILE_TIMEOUT.as_secs())]
    pub timeout: u64,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompileReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub bytes: usize,
}

pub fn run(args: CompileArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);

    match super::block_on(compile_file(&args)).and_then(|result| result) {
        Ok(report) => {
            output::print_output(format, &report, format_human)?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

async fn compile_file(args: &CompileArgs) -> anyhow::Result<CompileReport> {
    let source = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("failed to read `{}`", args.file.display()))?;

    let orchestrator = CompileOrchestrator::new(compile_options(args));
    let artifact = orchestrator.compile(&source).await?;

    let output = output_path(&args.file, args.output.as_deref());
    tokio::fs::write(&output, &artifact.bytes)
        .await
        .with_context(|| format!("failed to write `{}`", output.display()))?;

    Ok(CompileReport { source: args.file.clone(), output, bytes: artifact.bytes.len() })
}

fn compile_options(args: &CompileArgs) -> CompileOptions {
    let mut options =
        CompileOptions { timeout: Duration::from_secs(args.timeout), ..CompileOptions::default() };
    if let Some(engine) = &args.engine {
        options.engine_program = engine.clone();
    }
    options
}

fn output_path(source: &Path, requested: Option<&Path>) -> PathBuf {
    match requested {
        Some(path) => path.to_path_buf(),
        None => source.with_extension("pdf"),
    }
}

fn format_human(report: &CompileReport) -> String {
    format!(
        "Wrote {} ({} bytes) from {}",
        report.output.display(),
        report.bytes,
        report.source.display()
    )
}

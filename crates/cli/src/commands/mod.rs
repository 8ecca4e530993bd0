// CLI subcommand dispatch.

use std::future::Future;

use anyhow::Context;
use clap::Subcommand;

pub mod compile;
pub mod diff;

#[derive(Subcommand)]
pub enum Command {
    /// Render a LaTeX source file to PDF
    Compile(compile::CompileArgs),
    /// Compare a document with a proposed replacement
    Diff(diff::DiffArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Compile(args) => compile::run(args),
        Command::Diff(args) => diff::run(args),
    }
}

/// Drives `future` on a fresh current-thread runtime.
pub(crate) fn block_on<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}

// Turns document text into a rendered PDF by running the engine once per
// request in an isolated working area.

mod runner;
mod workspace;

pub use runner::{EngineInvocation, EngineOutput, EngineRunner, ProcessRunner};
pub use workspace::{CompileWorkspace, CACHE_ENV_VARS, OUTPUT_FILE_NAME, SOURCE_FILE_NAME};

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use quire_common::protocol::compile::{ARTIFACT_FILE_NAME, PDF_CONTENT_TYPE};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(60);
pub const UNKNOWN_COMPILE_ERROR: &str = "Unknown compilation error";

/// Default engine location, relative to the server's working directory.
pub fn default_engine_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("bin").join("tectonic.exe")
    } else {
        PathBuf::from("bin").join("tectonic")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub engine_program: PathBuf,
    /// Arguments placed before the `compile` subcommand.
    pub engine_args: Vec<String>,
    pub timeout: Duration,
    /// Parent of the per-job working directories. `None` uses the system
    /// temp dir.
    pub work_root: Option<PathBuf>,
    /// Upper bound on jobs running at once. `None` is unbounded.
    pub max_concurrent: Option<usize>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            engine_program: default_engine_path(),
            engine_args: vec!["-X".to_owned()],
            timeout: DEFAULT_COMPILE_TIMEOUT,
            work_root: None,
            max_concurrent: None,
        }
    }
}

/// A rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub file_name: &'static str,
}

impl Artifact {
    pub fn pdf(bytes: Vec<u8>) -> Self {
        Self { bytes, content_type: PDF_CONTENT_TYPE, file_name: ARTIFACT_FILE_NAME }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// The engine ran and rejected the document.
    Document,
    /// The engine could not be run to completion.
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum CompileError {
    /// Engine diagnostics, verbatim.
    #[error("{message}")]
    Rejected { message: String, exit_code: Option<i32> },
    #[error("failed to launch engine `{}`: {source}", program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("compilation timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

impl CompileError {
    pub fn kind(&self) -> CompileErrorKind {
        match self {
            Self::Rejected { .. } => CompileErrorKind::Document,
            Self::Launch { .. } | Self::Io { .. } | Self::TimedOut(_) => {
                CompileErrorKind::Infrastructure
            }
        }
    }

    pub(crate) fn io(context: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io { context, source }
    }
}

pub struct CompileOrchestrator<R = ProcessRunner> {
    options: CompileOptions,
    runner: R,
    permits: Option<Arc<Semaphore>>,
}

impl CompileOrchestrator {
    pub fn new(options: CompileOptions) -> Self {
        Self::with_runner(options, ProcessRunner)
    }
}

impl<R: EngineRunner> CompileOrchestrator<R> {
    pub fn with_runner(options: CompileOptions, runner: R) -> Self {
        let permits = options.max_concurrent.map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        Self { options, runner, permits }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Renders `source`. Dropping the returned future stops the engine and
    /// removes the working area.
    pub async fn compile(&self, source: &str) -> Result<Artifact, CompileError> {
        let _permit = match &self.permits {
            Some(permits) => Some(permits.acquire().await.map_err(|_| CompileError::Io {
                context: "waiting for a compile slot",
                source: io::Error::other("compile queue closed"),
            })?),
            None => None,
        };

        let job_id = Uuid::new_v4();
        let workspace = CompileWorkspace::create(self.options.work_root.as_deref()).await?;
        let result = self.run_job(job_id, &workspace, source).await;
        if let Err(error) = workspace.remove().await {
            warn!(%job_id, %error, "failed to remove working area");
        }
        result
    }

    async fn run_job(
        &self,
        job_id: Uuid,
        workspace: &CompileWorkspace,
        source: &str,
    ) -> Result<Artifact, CompileError> {
        let started_at = Instant::now();
        workspace.write_source(source).await?;
        let invocation = self.invocation(workspace);

        let output = match tokio::time::timeout(self.options.timeout, self.runner.run(&invocation))
            .await
        {
            Ok(result) => result.map_err(|source| CompileError::Launch {
                program: self.options.engine_program.clone(),
                source,
            })?,
            Err(_) => {
                warn!(%job_id, timeout_secs = self.options.timeout.as_secs(), "compile timed out");
                return Err(CompileError::TimedOut(self.options.timeout));
            }
        };

        if !output.success {
            info!(
                %job_id,
                exit_code = ?output.exit_code,
                latency_ms = started_at.elapsed().as_millis() as u64,
                "document rejected by engine"
            );
            let message = if output.stderr.is_empty() {
                UNKNOWN_COMPILE_ERROR.to_owned()
            } else {
                output.stderr
            };
            return Err(CompileError::Rejected { message, exit_code: output.exit_code });
        }

        let artifact = Artifact::pdf(workspace.read_artifact().await?);
        info!(
            %job_id,
            source_bytes = source.len(),
            artifact_bytes = artifact.bytes.len(),
            latency_ms = started_at.elapsed().as_millis() as u64,
            "compile succeeded"
        );
        Ok(artifact)
    }

    fn invocation(&self, workspace: &CompileWorkspace) -> EngineInvocation {
        let mut args: Vec<OsString> = self.options.engine_args.iter().map(OsString::from).collect();
        args.push("compile".into());
        args.push(workspace.source_path().into_os_string());
        args.push("--outdir".into());
        args.push(workspace.output_dir().into_os_string());
        args.push("--synctex=false".into());

        EngineInvocation {
            program: self.options.engine_program.clone(),
            args,
            cwd: workspace.path().to_path_buf(),
            env: workspace.engine_env(),
        }
    }
}

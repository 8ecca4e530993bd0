// Launches the rendering engine as a child process.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

/// A fully resolved engine command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
    /// Variables set on top of the inherited environment.
    pub env: Vec<(String, PathBuf)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

pub trait EngineRunner: Send + Sync {
    /// Runs the engine to completion. Errors mean the engine could not be
    /// started or waited on, not that the document failed to compile.
    /// Dropping the returned future must stop the engine.
    fn run(
        &self,
        invocation: &EngineInvocation,
    ) -> impl Future<Output = io::Result<EngineOutput>> + Send;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl EngineRunner for ProcessRunner {
    async fn run(&self, invocation: &EngineInvocation) -> io::Result<EngineOutput> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .envs(invocation.env.iter().map(|(key, value)| (key.as_str(), value.as_os_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn()?;
        let mut group = ProcessGroupGuard::new(child.id());
        let output = child.wait_with_output().await?;
        group.disarm();

        Ok(EngineOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Kills the engine's whole process group when a run is abandoned, so
/// helpers the engine started do not outlive the job.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.and_then(|pid| libc::pid_t::try_from(pid).ok()) {
            // SAFETY: killpg has no memory-safety preconditions. The group
            // id is the engine's own pid, set by process_group(0).
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
}

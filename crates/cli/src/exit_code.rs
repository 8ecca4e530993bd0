// Consistent exit codes for the quire CLI.
//
//   0 = success
//   1 = general error
//   2 = usage/argument error (emitted by clap)
//   3 = document rejected by the engine
//   4 = compilation timed out

use std::process;

use quire_server::compile::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Rejected = 3,
    TimedOut = 4,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(compile_err) = cause.downcast_ref::<CompileError>() {
                return match compile_err {
                    CompileError::Rejected { .. } => Self::Rejected,
                    CompileError::TimedOut(_) => Self::TimedOut,
                    CompileError::Launch { .. } | CompileError::Io { .. } => Self::Error,
                };
            }
        }
        Self::Error
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

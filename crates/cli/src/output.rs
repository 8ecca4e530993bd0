// Output format auto-detection for the CLI.
//
// TTY → human-readable text. Piped/redirected → structured JSON.
// `--json` flag forces JSON output regardless of terminal.

use std::io::{self, IsTerminal, Write};

use quire_server::compile::CompileError;
use serde::Serialize;

const ANSI_RED: &str = "\x1b[31m";
const ANSI_RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Human,
    /// Machine-readable JSON (one object per response).
    Json,
}

impl OutputFormat {
    /// JSON if `--json` was passed or stdout is not a TTY.
    pub fn detect(json_flag: bool) -> Self {
        if json_flag {
            return Self::Json;
        }
        Self::detect_from_terminal(io::stdout().is_terminal())
    }

    pub fn detect_from_terminal(is_tty: bool) -> Self {
        if is_tty {
            Self::Human
        } else {
            Self::Json
        }
    }
}

/// Write a value to stdout in the selected format.
pub fn print_output<T, F>(format: OutputFormat, value: &T, human_fn: F) -> io::Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    write_output(&mut io::stdout().lock(), format, value, human_fn)
}

pub fn write_output<W, T, F>(
    writer: &mut W,
    format: OutputFormat,
    value: &T,
    human_fn: F,
) -> io::Result<()>
where
    W: Write,
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Human => {
            writeln!(writer, "{}", human_fn(value))
        }
        OutputFormat::Json => {
            serde_json::to_writer(&mut *writer, value).map_err(io::Error::other)?;
            writeln!(writer)
        }
    }
}

/// Write an error to stderr in the selected format.
pub fn print_error(format: OutputFormat, code: &str, message: &str) {
    let mut err = io::stderr().lock();
    let _ = write_error(&mut err, format, code, message, io::stderr().is_terminal());
}

/// Print a mapped, actionable error for a command failure.
pub fn print_anyhow_error(format: OutputFormat, error: &anyhow::Error) {
    let (code, message) = actionable_error(error);
    print_error(format, code, &message);
}

fn write_error<W: Write>(
    writer: &mut W,
    format: OutputFormat,
    code: &str,
    message: &str,
    is_tty: bool,
) -> io::Result<()> {
    match format {
        OutputFormat::Human => {
            writeln!(writer, "{}", render_human_stderr_line("error", message, is_tty, ANSI_RED))
        }
        OutputFormat::Json => {
            let obj = serde_json::json!({
                "error": {
                    "code": code,
                    "message": message,
                }
            });
            serde_json::to_writer(&mut *writer, &obj).map_err(io::Error::other)?;
            writeln!(writer)
        }
    }
}

fn actionable_error(error: &anyhow::Error) -> (&'static str, String) {
    for cause in error.chain() {
        if let Some(compile_err) = cause.downcast_ref::<CompileError>() {
            return match compile_err {
                // Engine diagnostics are shown untouched.
                CompileError::Rejected { message, .. } => ("COMPILE_FAILED", message.clone()),
                CompileError::TimedOut(_) => ("COMPILE_TIMEOUT", compile_err.to_string()),
                CompileError::Launch { program, .. } => (
                    "ENGINE_UNAVAILABLE",
                    format!(
                        "Could not start the engine at {}. Install it or pass --engine <path>",
                        program.display()
                    ),
                ),
                CompileError::Io { .. } => ("IO_ERROR", format!("{error:#}")),
            };
        }
    }
    ("ERROR", format!("{error:#}"))
}

fn render_human_stderr_line(label: &str, message: &str, is_tty: bool, color: &str) -> String {
    let message = message.trim_end();
    if is_tty {
        format!("{color}{label}:{ANSI_RESET} {message}")
    } else {
        format!("{label}: {message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn detect_tty_returns_human() {
        assert_eq!(OutputFormat::detect_from_terminal(true), OutputFormat::Human);
    }

    #[test]
    fn detect_pipe_returns_json() {
        assert_eq!(OutputFormat::detect_from_terminal(false), OutputFormat::Json);
    }

    #[test]
    fn detect_json_flag_overrides_tty() {
        assert_eq!(OutputFormat::detect(true), OutputFormat::Json);
    }

    #[test]
    fn write_output_human_format() {
        #[derive(Serialize)]
        struct Info {
            name: String,
        }
        let info = Info { name: "main.tex".into() };
        let mut buf = Vec::new();
        write_output(&mut buf, OutputFormat::Human, &info, |i| format!("Source: {}", i.name))
            .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "Source: main.tex\n");
    }

    #[test]
    fn write_output_json_does_not_call_human_fn() {
        #[derive(Serialize)]
        struct Info {
            bytes: u32,
        }
        let mut buf = Vec::new();
        write_output(&mut buf, OutputFormat::Json, &Info { bytes: 42 }, |_| {
            unreachable!("human_fn should not be called in JSON mode")
        })
        .unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(String::from_utf8(buf).unwrap().trim()).unwrap();
        assert_eq!(parsed["bytes"], 42);
    }

    #[test]
    fn json_error_is_wrapped_in_error_object() {
        let mut buf = Vec::new();
        write_error(&mut buf, OutputFormat::Json, "COMPILE_FAILED", "! Oops.", false).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed["error"]["code"], "COMPILE_FAILED");
        assert_eq!(parsed["error"]["message"], "! Oops.");
    }

    #[test]
    fn render_human_error_uses_color_for_tty() {
        let line = render_human_stderr_line("error", "boom\n", true, ANSI_RED);
        assert!(line.contains(ANSI_RED));
        assert!(line.ends_with("boom"));
    }

    #[test]
    fn rejected_compile_keeps_engine_text() {
        let err = anyhow::Error::new(CompileError::Rejected {
            message: "! Undefined control sequence.\nl.3 \\foo".into(),
            exit_code: Some(1),
        });
        let (code, message) = actionable_error(&err);
        assert_eq!(code, "COMPILE_FAILED");
        assert_eq!(message, "! Undefined control sequence.\nl.3 \\foo");
    }

    #[test]
    fn launch_failure_suggests_engine_flag() {
        let err = anyhow::Error::new(CompileError::Launch {
            program: PathBuf::from("bin/tectonic"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        });
        let (code, message) = actionable_error(&err);
        assert_eq!(code, "ENGINE_UNAVAILABLE");
        assert!(message.contains("--engine"));
    }

    #[test]
    fn untyped_errors_pass_through() {
        let err = anyhow::anyhow!("file not found").context("failed to read `main.tex`");
        let (code, message) = actionable_error(&err);
        assert_eq!(code, "ERROR");
        assert_eq!(message, "failed to read `main.tex`: file not found");
    }
}

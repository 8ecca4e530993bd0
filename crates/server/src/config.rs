// Compile server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::compile::{default_engine_path, CompileOptions, DEFAULT_COMPILE_TIMEOUT};

pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
pub const DEFAULT_MAX_CONCURRENT_COMPILES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Core server configuration.
///
/// Constructed via [`ServerConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Engine executable.
    pub engine_path: PathBuf,
    /// Arguments placed before the engine's `compile` subcommand.
    pub engine_args: Vec<String>,
    pub compile_timeout: Duration,
    /// Parent directory for per-job working areas (system temp if unset).
    pub work_dir: Option<PathBuf>,
    /// Simultaneous compile jobs; `0` means unbounded.
    pub max_concurrent_compiles: usize,
    pub max_body_bytes: usize,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `quire_server=debug`).
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `QUIRE_HOST` | `0.0.0.0` |
    /// | `QUIRE_PORT` | `8080` |
    /// | `QUIRE_ENGINE_PATH` | `bin/tectonic` (`bin/tectonic.exe` on Windows) |
    /// | `QUIRE_ENGINE_ARGS` | `-X` (whitespace-separated) |
    /// | `QUIRE_COMPILE_TIMEOUT_SECS` | `60` |
    /// | `QUIRE_WORK_DIR` | *(system temp)* |
    /// | `QUIRE_MAX_CONCURRENT_COMPILES` | `4` |
    /// | `QUIRE_MAX_BODY_BYTES` | `8388608` |
    /// | `QUIRE_CORS_ORIGINS` | *(none, cors.rs uses dev defaults)* |
    /// | `QUIRE_LOG_FILTER` | `info` |
    /// | `QUIRE_LOG_FORMAT` | `text` (`json` for structured output) |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    pub(crate) fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("QUIRE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("QUIRE_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let engine_path =
            env("QUIRE_ENGINE_PATH").map(PathBuf::from).unwrap_or_else(|_| default_engine_path());
        let engine_args = env("QUIRE_ENGINE_ARGS")
            .map(|raw| raw.split_whitespace().map(ToOwned::to_owned).collect())
            .unwrap_or_else(|_| vec!["-X".to_owned()]);

        let compile_timeout = env("QUIRE_COMPILE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_COMPILE_TIMEOUT);

        let work_dir = env("QUIRE_WORK_DIR").ok().filter(|v| !v.is_empty()).map(PathBuf::from);

        let max_concurrent_compiles = env("QUIRE_MAX_CONCURRENT_COMPILES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONCURRENT_COMPILES);
        let max_body_bytes = env("QUIRE_MAX_BODY_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);

        let cors_origins = env("QUIRE_CORS_ORIGINS").ok();
        let log_filter = env("QUIRE_LOG_FILTER").unwrap_or_else(|_| "info".into());
        let log_format = match env("QUIRE_LOG_FORMAT").ok().as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            listen_addr,
            engine_path,
            engine_args,
            compile_timeout,
            work_dir,
            max_concurrent_compiles,
            max_body_bytes,
            cors_origins,
            log_filter,
            log_format,
        }
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            engine_program: self.engine_path.clone(),
            engine_args: self.engine_args.clone(),
            timeout: self.compile_timeout,
            work_root: self.work_dir.clone(),
            max_concurrent: (self.max_concurrent_compiles > 0)
                .then_some(self.max_concurrent_compiles),
        }
    }
}

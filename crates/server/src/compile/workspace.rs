// Per-job working area for one engine invocation.
//
//   <root>/quire-compile-XXXX/
//     input.tex      source written from the request
//     out/           engine output directory (input.pdf)
//     cache/         engine caches, never shared between jobs
//     home/          HOME for the engine process
//
// Filesystem work runs off the async workers. `remove` deletes the tree on
// the blocking pool; a workspace dropped without it is removed inline.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempDir};

use super::CompileError;

pub const SOURCE_FILE_NAME: &str = "input.tex";
pub const OUTPUT_FILE_NAME: &str = "input.pdf";
const OUTPUT_DIR: &str = "out";
const CACHE_DIR: &str = "cache";
const HOME_DIR: &str = "home";

/// Environment variables the engine consults for its caches.
pub const CACHE_ENV_VARS: [&str; 3] = ["XDG_CACHE_HOME", "TECTONIC_CACHE_DIR", "TEXMFVAR"];

#[derive(Debug)]
pub struct CompileWorkspace {
    dir: TempDir,
}

impl CompileWorkspace {
    /// Creates a fresh working area under `root`, or the system temp dir.
    pub async fn create(root: Option<&Path>) -> Result<Self, CompileError> {
        let root = root.map(Path::to_path_buf);
        let dir = blocking("creating working directory", move || create_tree(root.as_deref()))
            .await??;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn source_path(&self) -> PathBuf {
        self.path().join(SOURCE_FILE_NAME)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join(OUTPUT_DIR)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.path().join(CACHE_DIR)
    }

    pub fn home_dir(&self) -> PathBuf {
        self.path().join(HOME_DIR)
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir().join(OUTPUT_FILE_NAME)
    }

    pub async fn write_source(&self, text: &str) -> Result<(), CompileError> {
        tokio::fs::write(self.source_path(), text)
            .await
            .map_err(CompileError::io("writing source file"))
    }

    pub async fn read_artifact(&self) -> Result<Vec<u8>, CompileError> {
        tokio::fs::read(self.artifact_path())
            .await
            .map_err(CompileError::io("reading compiled artifact"))
    }

    /// Engine environment: `HOME` plus every cache variable, all inside
    /// this workspace.
    pub fn engine_env(&self) -> Vec<(String, PathBuf)> {
        let cache = self.cache_dir();
        std::iter::once(("HOME".to_owned(), self.home_dir()))
            .chain(CACHE_ENV_VARS.iter().map(|var| ((*var).to_owned(), cache.clone())))
            .collect()
    }

    /// Deletes the working area on the blocking pool.
    pub async fn remove(self) -> Result<(), CompileError> {
        let dir = self.dir;
        blocking("removing working directory", move || dir.close())
            .await?
            .map_err(CompileError::io("removing working directory"))
    }
}

fn create_tree(root: Option<&Path>) -> Result<TempDir, CompileError> {
    let mut builder = Builder::new();
    builder.prefix("quire-compile-");
    let dir = match root {
        Some(root) => {
            fs::create_dir_all(root).map_err(CompileError::io("creating work root"))?;
            builder.tempdir_in(root)
        }
        None => builder.tempdir(),
    }
    .map_err(CompileError::io("creating working directory"))?;

    for sub in [OUTPUT_DIR, CACHE_DIR, HOME_DIR] {
        fs::create_dir(dir.path().join(sub))
            .map_err(CompileError::io("creating working subdirectory"))?;
    }
    Ok(dir)
}

async fn blocking<T, F>(context: &'static str, f: F) -> Result<T, CompileError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CompileError::Io { context, source: io::Error::other(e) })
}

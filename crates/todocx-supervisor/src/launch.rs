use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
};

use serde::Serialize;
use todocx_observability::DiagnosticLog;

use crate::error::SupervisorError;

pub const PACKAGED_EXECUTABLE: &str = if cfg!(windows) {
    "to-docx-backend.exe"
} else {
    "to-docx-backend"
};
pub const SCRATCH_DIR_ENV: &str = "TEMP_DIR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    Development,
    Packaged,
}

impl fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LaunchMode::Development => "development",
            LaunchMode::Packaged => "packaged",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Interpreter,
    Script,
    Executable,
    WorkingDirectory,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactKind::Interpreter => "Python interpreter",
            ArtifactKind::Script => "Worker script",
            ArtifactKind::Executable => "Worker executable",
            ArtifactKind::WorkingDirectory => "Working directory",
        })
    }
}

/// Filesystem locations the worker launch depends on.
///
/// `program` is the interpreter in development mode and the bundled
/// executable in packaged mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsConfig {
    pub program: PathBuf,
    pub script: Option<PathBuf>,
    pub working_dir: PathBuf,
    pub scratch_dir: Option<PathBuf>,
}

pub fn venv_python(backend_root: &Path) -> PathBuf {
    if cfg!(windows) {
        backend_root.join("venv").join("Scripts").join("python.exe")
    } else {
        backend_root.join("venv").join("bin").join("python")
    }
}

impl PathsConfig {
    pub fn development(backend_root: &Path, python: Option<PathBuf>) -> Self {
        Self {
            program: python.unwrap_or_else(|| venv_python(backend_root)),
            script: Some(backend_root.join("main.py")),
            working_dir: backend_root.to_path_buf(),
            scratch_dir: None,
        }
    }

    // The install dir may be read-only, so scratch space lives under user data.
    pub fn packaged(resources_dir: &Path, data_dir: &Path) -> Self {
        let backend = resources_dir.join("backend");
        Self {
            program: backend.join(PACKAGED_EXECUTABLE),
            script: None,
            working_dir: backend,
            scratch_dir: Some(data_dir.join("temp")),
        }
    }
}

/// Fully resolved spawn arguments. Only built after every artifact checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub mode: LaunchMode,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
    pub env: Vec<(String, OsString)>,
}

fn require(kind: ArtifactKind, path: &Path) -> Result<(), SupervisorError> {
    if path.exists() {
        return Ok(());
    }
    Err(SupervisorError::MissingArtifact {
        kind,
        path: path.to_path_buf(),
    })
}

impl LaunchPlan {
    pub fn prepare(
        mode: LaunchMode,
        paths: &PathsConfig,
        log: &DiagnosticLog,
    ) -> Result<Self, SupervisorError> {
        match mode {
            LaunchMode::Development => {
                log.info(format!("Python: {}", paths.program.display()));
                let script = paths.script.clone().unwrap_or_default();
                log.info(format!("Script: {}", script.display()));
                log.info(format!("CWD: {}", paths.working_dir.display()));

                require(ArtifactKind::Interpreter, &paths.program)?;
                require(ArtifactKind::Script, &script)?;
                require(ArtifactKind::WorkingDirectory, &paths.working_dir)?;
                Ok(Self {
                    mode,
                    program: paths.program.clone(),
                    args: vec![script.into_os_string()],
                    working_dir: paths.working_dir.clone(),
                    env: Vec::new(),
                })
            }
            LaunchMode::Packaged => {
                log.info(format!("Worker executable: {}", paths.program.display()));
                log.info(format!("CWD: {}", paths.working_dir.display()));

                require(ArtifactKind::Executable, &paths.program)?;
                require(ArtifactKind::WorkingDirectory, &paths.working_dir)?;

                let mut env = Vec::new();
                if let Some(scratch) = &paths.scratch_dir {
                    if !scratch.exists() {
                        log.info(format!("Creating scratch directory: {}", scratch.display()));
                        std::fs::create_dir_all(scratch).map_err(|source| {
                            SupervisorError::ScratchDir {
                                path: scratch.clone(),
                                source,
                            }
                        })?;
                    }
                    env.push((SCRATCH_DIR_ENV.to_string(), scratch.clone().into_os_string()));
                }
                Ok(Self {
                    mode,
                    program: paths.program.clone(),
                    args: Vec::new(),
                    working_dir: paths.working_dir.clone(),
                    env,
                })
            }
        }
    }
}

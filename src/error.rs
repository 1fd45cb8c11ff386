//! Error types for zerobuild.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for zerobuild operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Failures that terminate a build.
///
/// Package-resolution misses and missing helper tools are not represented here:
/// they degrade to empty flag sets and never abort a run on their own.
#[derive(Error, Debug)]
pub enum BuildError {
    /// No C/C++ source file exists in the project at all.
    #[error("no source files found")]
    NoMainSource,

    /// Neither a native nor a requested cross compiler could be located.
    #[error("no C/C++ compiler found")]
    NoCompilerFound,

    /// A translation unit failed to compile. Remaining sources were not attempted.
    #[error("failed to compile {}", file.display())]
    CompileFailure { file: PathBuf, output: String },

    /// All objects compiled but the link step failed.
    #[error("linking failed")]
    LinkFailure { output: String },

    /// A header is absent from every system include directory and the
    /// package manager's file search knows which package ships it.
    #[error("could not find \"{header}\", install with: {install_command}")]
    MissingPackage {
        header: String,
        package: String,
        install_command: String,
    },

    /// A test executable built but exited with a failure status.
    #[error("test {} failed", name.display())]
    TestFailure { name: PathBuf },

    /// Filesystem access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `zb.toml` could not be parsed.
    #[error("failed to parse zb.toml: {0}")]
    Config(#[from] toml::de::Error),
}

impl BuildError {
    /// Captured compiler or linker output, when the failure carries any.
    pub fn tool_output(&self) -> Option<&str> {
        match self {
            BuildError::CompileFailure { output, .. } | BuildError::LinkFailure { output } => {
                Some(output)
            }
            _ => None,
        }
    }
}

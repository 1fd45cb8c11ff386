use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Compiler family, decided from the executable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum CompilerType {
    /// GNU Compiler Collection (gcc, g++, mingw cross compilers)
    GCC,
    /// Clang/LLVM (clang, clang++)
    Clang,
    /// Anything else (`cc`, `c++`, zapcc++)
    Other,
}

impl CompilerType {
    pub fn from_path(path: &Path) -> Self {
        if is_gcc_name(path) {
            CompilerType::GCC
        } else if is_clang_name(path) {
            CompilerType::Clang
        } else {
            CompilerType::Other
        }
    }
}

/// `g++`/`gcc` in the basename, not preceded by a letter
/// (`x86_64-w64-mingw32-g++` matches, `zapcc` does not).
pub fn is_gcc_name(path: &Path) -> bool {
    let base = basename(path);
    for needle in ["g++", "gcc"] {
        if let Some(idx) = base.find(needle)
            && (idx == 0 || !base.as_bytes()[idx - 1].is_ascii_alphabetic())
        {
            return true;
        }
    }
    false
}

pub fn is_clang_name(path: &Path) -> bool {
    basename(path).contains("clang")
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// The compiler chosen for this build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    pub compiler_type: CompilerType,
    /// Absolute path (or PATH-resolved name) of the compiler driver.
    pub path: PathBuf,
    /// True for a mingw cross compiler.
    pub win64: bool,
    /// True for zapcc++.
    pub zap: bool,
}

impl Toolchain {
    pub fn new(path: PathBuf) -> Self {
        Self {
            compiler_type: CompilerType::from_path(&path),
            path,
            win64: false,
            zap: false,
        }
    }

    pub fn is_gcc(&self) -> bool {
        self.compiler_type == CompilerType::GCC
    }

    pub fn is_clang(&self) -> bool {
        self.compiler_type == CompilerType::Clang
    }

    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

//! Toolchain discovery
//!
//! Picks the compiler driver for a build: zapcc++ when asked for, a mingw cross
//! compiler for win64 targets, otherwise a native gcc/clang honoring `CC`/`CXX`.
//! Also probes the newest `-std=` the chosen C++ compiler accepts.

pub mod types;

pub use types::{CompilerType, Toolchain};

use crate::config::EnvOverrides;
use crate::error::{BuildError, Result};
use crate::tools::{ToolCommand, ToolRunner};
use tracing::debug;

/// C++ standards probed newest first.
pub const CXX_STANDARDS: [&str; 7] = [
    "c++23", "c++2b", "c++20", "c++2a", "c++17", "c++14", "c++11",
];

/// Fallback when no probe succeeds.
pub const DEFAULT_CXX_STD: &str = "c++17";

/// What the caller wants from compiler selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompilerRequest {
    pub is_c: bool,
    pub clang: bool,
    pub win64: bool,
    pub zap: bool,
}

/// Select the compiler for a build. Failing to find one is fatal.
pub fn detect_toolchain(
    runner: &dyn ToolRunner,
    env: &EnvOverrides,
    request: CompilerRequest,
) -> Result<Toolchain> {
    if request.zap
        && let Some(path) = runner.which("zapcc++")
    {
        let mut toolchain = Toolchain::new(path);
        toolchain.zap = true;
        return Ok(toolchain);
    }

    if request.win64
        && let Some(toolchain) = find_win64_compiler(runner, request.is_c)
    {
        return Ok(toolchain);
    }

    find_native_compiler(runner, env, request.clang, request.is_c)
        .ok_or(BuildError::NoCompilerFound)
}

/// Native compiler: clang first when preferred, then `CC`/`CXX`, then the usual names.
pub fn find_native_compiler(
    runner: &dyn ToolRunner,
    env: &EnvOverrides,
    prefer_clang: bool,
    is_c: bool,
) -> Option<Toolchain> {
    if prefer_clang {
        let name = if is_c { "clang" } else { "clang++" };
        if let Some(path) = runner.which(name) {
            return Some(Toolchain::new(path));
        }
    }

    if let Some(name) = env.compiler(is_c)
        && let Some(path) = runner.which(name)
    {
        debug!(compiler = %path.display(), "using compiler from environment");
        return Some(Toolchain::new(path));
    }

    let candidates: &[&str] = if is_c {
        &["gcc", "cc", "clang"]
    } else {
        &["g++", "clang++", "c++"]
    };
    candidates
        .iter()
        .find_map(|name| runner.which(name))
        .map(Toolchain::new)
}

pub fn find_win64_compiler(runner: &dyn ToolRunner, is_c: bool) -> Option<Toolchain> {
    let candidates: &[&str] = if is_c {
        &["x86_64-w64-mingw32-gcc", "i686-w64-mingw32-gcc"]
    } else {
        &["x86_64-w64-mingw32-g++", "i686-w64-mingw32-g++"]
    };
    candidates.iter().find_map(|name| runner.which(name)).map(|path| {
        let mut toolchain = Toolchain::new(path);
        toolchain.win64 = true;
        toolchain
    })
}

/// Trial-compile an empty `main` with `-std=<std>`.
pub fn compiler_supports_std(runner: &dyn ToolRunner, toolchain: &Toolchain, std: &str) -> bool {
    let cmd = ToolCommand::new(&toolchain.path)
        .arg(format!("-std={}", std))
        .args(["-x", "c++", "-fsyntax-only", "-"])
        .stdin("int main(){}\n");
    runner.run(&cmd).map(|out| out.success).unwrap_or(false)
}

/// Newest C++ standard the compiler accepts, `c++17` when none probe.
pub fn best_std_flag(runner: &dyn ToolRunner, toolchain: &Toolchain) -> String {
    for std in CXX_STANDARDS {
        if compiler_supports_std(runner, toolchain, std) {
            debug!(std, "compiler accepts standard");
            return std.to_string();
        }
    }
    DEFAULT_CXX_STD.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolOutput;
    use std::collections::HashSet;
    use std::io;
    use std::path::PathBuf;

    /// Only the listed programs exist; `-std=` probes succeed for `accepts`.
    struct FakeHost {
        programs: HashSet<&'static str>,
        accepts: HashSet<&'static str>,
    }

    impl FakeHost {
        fn new(programs: &[&'static str], accepts: &[&'static str]) -> Self {
            Self {
                programs: programs.iter().copied().collect(),
                accepts: accepts.iter().copied().collect(),
            }
        }
    }

    impl ToolRunner for FakeHost {
        fn run(&self, cmd: &ToolCommand) -> io::Result<ToolOutput> {
            let std = cmd.args[0].trim_start_matches("-std=");
            Ok(ToolOutput {
                success: self.accepts.contains(std),
                ..Default::default()
            })
        }

        fn which(&self, name: &str) -> Option<PathBuf> {
            self.programs
                .contains(name)
                .then(|| PathBuf::from("/usr/bin").join(name))
        }
    }

    #[test]
    fn test_gcc_first_by_default() {
        let host = FakeHost::new(&["g++", "clang++"], &[]);
        let env = EnvOverrides::default();
        let tc = detect_toolchain(&host, &env, CompilerRequest::default()).unwrap();
        assert_eq!(tc.path, PathBuf::from("/usr/bin/g++"));
        assert!(tc.is_gcc());
    }

    #[test]
    fn test_clang_preference() {
        let host = FakeHost::new(&["g++", "clang++", "clang"], &[]);
        let env = EnvOverrides::default();
        let req = CompilerRequest {
            clang: true,
            ..Default::default()
        };
        let tc = detect_toolchain(&host, &env, req).unwrap();
        assert_eq!(tc.path, PathBuf::from("/usr/bin/clang++"));
        let req = CompilerRequest {
            clang: true,
            is_c: true,
            ..Default::default()
        };
        let tc = detect_toolchain(&host, &env, req).unwrap();
        assert_eq!(tc.path, PathBuf::from("/usr/bin/clang"));
    }

    #[test]
    fn test_env_override_before_defaults() {
        let host = FakeHost::new(&["gcc", "cc", "tcc"], &[]);
        let env = EnvOverrides {
            cc: Some("tcc".into()),
            ..Default::default()
        };
        let req = CompilerRequest {
            is_c: true,
            ..Default::default()
        };
        let tc = detect_toolchain(&host, &env, req).unwrap();
        assert_eq!(tc.path, PathBuf::from("/usr/bin/tcc"));
    }

    #[test]
    fn test_win64_cross_then_native() {
        let host = FakeHost::new(&["g++", "i686-w64-mingw32-g++"], &[]);
        let env = EnvOverrides::default();
        let req = CompilerRequest {
            win64: true,
            ..Default::default()
        };
        let tc = detect_toolchain(&host, &env, req).unwrap();
        assert!(tc.win64);
        assert_eq!(tc.path, PathBuf::from("/usr/bin/i686-w64-mingw32-g++"));

        let host = FakeHost::new(&["g++"], &[]);
        let tc = detect_toolchain(&host, &env, req).unwrap();
        assert!(!tc.win64);
    }

    #[test]
    fn test_zapcc_when_requested() {
        let host = FakeHost::new(&["g++", "zapcc++"], &[]);
        let req = CompilerRequest {
            zap: true,
            ..Default::default()
        };
        let tc = detect_toolchain(&host, &EnvOverrides::default(), req).unwrap();
        assert!(tc.zap);
    }

    #[test]
    fn test_no_compiler_is_fatal() {
        let host = FakeHost::new(&[], &[]);
        let err = detect_toolchain(&host, &EnvOverrides::default(), CompilerRequest::default());
        assert!(matches!(err, Err(BuildError::NoCompilerFound)));
    }

    #[test]
    fn test_best_std_newest_first() {
        let tc = Toolchain::new(PathBuf::from("/usr/bin/g++"));
        let host = FakeHost::new(&[], &["c++17", "c++20", "c++2a"]);
        assert_eq!(best_std_flag(&host, &tc), "c++20");
        let host = FakeHost::new(&[], &[]);
        assert_eq!(best_std_flag(&host, &tc), DEFAULT_CXX_STD);
    }
}

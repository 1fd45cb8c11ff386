//! External header extraction.
//!
//! The preferred path hides every `#include` behind a marker, runs the C
//! preprocessor so conditionals are evaluated without any header actually
//! being opened, and reads the surviving directives back. When no usable
//! preprocessor exists, a textual scan of angle-bracket includes is used.

use crate::platform::HostOs;
use crate::scanner::LOCAL_INCLUDE_PATHS;
use crate::tools::{ToolCommand, ToolRunner};
use rayon::prelude::*;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

const INCLUDE_MARKER: &str = "@@@@@include";

/// Headers supplied by the C/C++ standard library or the base system.
pub const STD_HEADERS: &[&str] = &[
    // C
    "assert.h", "complex.h", "ctype.h", "errno.h", "fenv.h", "float.h", "inttypes.h",
    "iso646.h", "limits.h", "locale.h", "math.h", "setjmp.h", "signal.h", "stdalign.h",
    "stdarg.h", "stdatomic.h", "stdbool.h", "stddef.h", "stdint.h", "stdio.h", "stdlib.h",
    "stdnoreturn.h", "string.h", "tgmath.h", "threads.h", "time.h", "uchar.h", "wchar.h",
    "wctype.h",
    // C++ wrappers of the C library
    "cassert", "cctype", "cerrno", "cfenv", "cfloat", "cinttypes", "climits", "clocale",
    "cmath", "csetjmp", "csignal", "cstdarg", "cstddef", "cstdint", "cstdio", "cstdlib",
    "cstring", "ctime",
    // C++ library
    "algorithm", "any", "array", "atomic", "barrier", "bit", "bitset", "charconv", "chrono",
    "codecvt", "compare", "complex", "concepts", "condition_variable", "coroutine", "deque",
    "exception", "execution", "filesystem", "format", "forward_list", "fstream", "functional",
    "future", "initializer_list", "iomanip", "ios", "iosfwd", "iostream", "istream",
    "iterator", "latch", "limits", "list", "locale", "map", "memory", "memory_resource",
    "mutex", "new", "numbers", "numeric", "optional", "ostream", "queue", "random", "ranges",
    "ratio", "regex", "scoped_allocator", "semaphore", "set", "shared_mutex",
    "source_location", "span", "sstream", "stack", "stacktrace", "stdexcept", "stop_token",
    "streambuf", "string", "strstream", "syncstream", "system_error", "thread", "tuple",
    "type_traits", "typeindex", "typeinfo", "unordered_map", "unordered_set", "utility",
    "valarray", "variant", "vector", "version",
    // System
    "windows.h", "dlfcn.h", "pthread.h", "glibc",
];

/// Headers the mingw toolchain provides itself.
pub const WIN64_SKIP_HEADERS: &[&str] = &[
    "windows.h", "windowsx.h", "winsock2.h", "ws2tcpip.h", "commctrl.h", "shellapi.h",
    "shlobj.h", "mmsystem.h", "direct.h", "conio.h", "io.h", "process.h", "tchar.h",
];

static STD_HEADER_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STD_HEADERS.iter().copied().collect());

static ANGLE_INCLUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#include[^<]*<([^>]*)>").expect("valid regex"));

static QUOTED_INCLUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^#include[^"]*"([^"]*)""#).expect("valid regex"));

pub fn is_std_header(header: &str) -> bool {
    STD_HEADER_SET.contains(header)
}

pub fn is_win64_skip_header(header: &str) -> bool {
    WIN64_SKIP_HEADERS.contains(&header.to_lowercase().as_str())
}

/// True when `header` exists under one of the project's include directories.
pub fn is_local_include(root: &Path, header: &str) -> bool {
    LOCAL_INCLUDE_PATHS
        .iter()
        .any(|dir| root.join(dir).join(header).exists())
}

/// The external C preprocessor, driven with the marker substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessor {
    program: PathBuf,
}

impl Preprocessor {
    /// `cpp` from `PATH`, if installed.
    pub fn locate(runner: &dyn ToolRunner) -> Option<Self> {
        runner.which("cpp").map(|program| Self { program })
    }

    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Includes surviving conditional compilation, both `<>` and `""` forms.
    /// `None` when the preprocessor fails.
    pub fn includes(&self, runner: &dyn ToolRunner, source: &str) -> Option<Vec<String>> {
        let cmd = ToolCommand::new(&self.program)
            .args(["-E", "-P", "-w", "-pipe", "-"])
            .env("LC_CTYPE", "C")
            .env("LANG", "C")
            .stdin(disguise_includes(source));
        let out = runner.run(&cmd).ok()?;
        if !out.success {
            debug!(stderr = %out.stderr.trim(), "preprocessor failed");
            return None;
        }
        Some(
            restore_includes(&out.stdout)
                .lines()
                .filter_map(|line| parse_include_line(line.trim()))
                .collect(),
        )
    }
}

/// Replace `#include` at line start with the marker so cpp leaves it alone.
pub fn disguise_includes(source: &str) -> String {
    let mut out = String::with_capacity(source.len() + 64);
    for line in source.lines() {
        match line.strip_prefix("#include") {
            Some(rest) => {
                out.push_str(INCLUDE_MARKER);
                out.push_str(rest);
            }
            None => out.push_str(line),
        }
        out.push('\n');
    }
    out
}

pub fn restore_includes(preprocessed: &str) -> String {
    let mut out = String::with_capacity(preprocessed.len());
    for line in preprocessed.lines() {
        match line.strip_prefix(INCLUDE_MARKER) {
            Some(rest) => {
                out.push_str("#include");
                out.push_str(rest);
            }
            None => out.push_str(line),
        }
        out.push('\n');
    }
    out
}

/// Header name from an `#include` line; angle form is tried first.
fn parse_include_line(line: &str) -> Option<String> {
    if !line.starts_with("#include") {
        return None;
    }
    let caps = ANGLE_INCLUDE
        .captures(line)
        .or_else(|| QUOTED_INCLUDE.captures(line))?;
    let name = caps.get(1)?.as_str().trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Angle-bracket includes found by reading the text directly.
pub fn direct_scan_includes(source: &str) -> Vec<String> {
    source
        .lines()
        .filter_map(|line| {
            let caps = ANGLE_INCLUDE.captures(line.trim())?;
            Some(caps.get(1)?.as_str().to_string())
        })
        .collect()
}

/// Computes the external header set of a project.
pub struct IncludeResolver<'a> {
    runner: &'a dyn ToolRunner,
    preprocessor: Option<Preprocessor>,
    os: HostOs,
}

impl<'a> IncludeResolver<'a> {
    pub fn new(runner: &'a dyn ToolRunner, os: HostOs) -> Self {
        Self {
            runner,
            preprocessor: Preprocessor::locate(runner),
            os,
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: Option<Preprocessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// Ordered, deduplicated external headers across all `sources`.
    pub fn external_includes(&self, root: &Path, sources: &[PathBuf], win64: bool) -> Vec<String> {
        let per_file: Vec<Vec<String>> = sources
            .par_iter()
            .map(|src| self.file_includes(&root.join(src)))
            .collect();

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for inc in per_file.into_iter().flatten() {
            if is_std_header(&inc) {
                continue;
            }
            if win64 && is_win64_skip_header(&inc) {
                continue;
            }
            if is_local_include(root, &inc) {
                continue;
            }
            let key = if self.os.case_insensitive() {
                inc.to_lowercase()
            } else {
                inc.clone()
            };
            if seen.insert(key) {
                result.push(inc);
            }
        }
        result
    }

    fn file_includes(&self, path: &Path) -> Vec<String> {
        let Ok(text) = fs::read_to_string(path) else {
            return Vec::new();
        };
        if let Some(pp) = &self.preprocessor
            && let Some(found) = pp.includes(self.runner, &text)
        {
            return found;
        }
        debug!(file = %path.display(), "textual include scan");
        direct_scan_includes(&text)
    }
}

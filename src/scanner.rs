//! Project detection.
//!
//! Walks a source tree that has no project file and classifies what it finds:
//! the main source, dependency sources, test sources and a handful of language
//! features spotted by line scanning. All paths in a [`Project`] are relative
//! to the project root.

use crate::includes::IncludeResolver;
use crate::platform::HostOs;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Recognized source extensions, in lookup priority order.
pub const SOURCE_EXTS: [&str; 4] = ["cpp", "cc", "cxx", "c"];

/// Relative directories searched for project headers.
pub const LOCAL_INCLUDE_PATHS: [&str; 10] = [
    ".",
    "include",
    "Include",
    "..",
    "../include",
    "../Include",
    "common",
    "Common",
    "../common",
    "../Common",
];

/// Relative directories holding shared implementation files.
pub const LOCAL_COMMON_PATHS: [&str; 4] = ["common", "Common", "../common", "../Common"];

/// Language and library features detected by line scanning.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Features {
    pub openmp: bool,
    pub boost: bool,
    /// `boost_<component>` guesses, first-seen order.
    pub boost_libs: Vec<String>,
    pub qt6: bool,
    pub math_lib: bool,
    pub filesystem: bool,
    pub threads: bool,
    /// `windows.h` is included, so the target is win64.
    pub win64: bool,
    pub glfw_vulkan: bool,
    pub dlopen: bool,
}

/// The detected shape of a source tree.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub main_source: Option<PathBuf>,
    pub dep_sources: Vec<PathBuf>,
    pub test_sources: Vec<PathBuf>,
    /// External headers, first-seen order.
    pub includes: Vec<String>,
    pub features: Features,
    pub is_c: bool,
}

impl Project {
    /// Main source (if any) followed by dependency sources.
    pub fn build_sources(&self) -> Vec<PathBuf> {
        self.main_source
            .iter()
            .cloned()
            .chain(self.dep_sources.iter().cloned())
            .collect()
    }

    /// Every source the project knows about.
    pub fn all_sources(&self) -> Vec<PathBuf> {
        let mut all = self.build_sources();
        all.extend(self.test_sources.iter().cloned());
        all
    }

    pub fn has_any_sources(&self) -> bool {
        self.main_source.is_some() || !self.dep_sources.is_empty() || !self.test_sources.is_empty()
    }
}

/// Scan `root` and produce a full [`Project`], external includes included.
pub fn detect_project(root: &Path, os: HostOs, resolver: &IncludeResolver) -> Project {
    let mut project = SourceScanner::new(root, os).scan();
    let win64 = project.features.win64;
    project.includes = resolver.external_includes(root, &project.all_sources(), win64);
    debug!(includes = ?project.includes, "external includes");
    project
}

/// Classifies the files of one project directory.
pub struct SourceScanner<'a> {
    root: &'a Path,
    os: HostOs,
}

impl<'a> SourceScanner<'a> {
    pub fn new(root: &'a Path, os: HostOs) -> Self {
        Self { root, os }
    }

    /// Everything except external includes.
    pub fn scan(&self) -> Project {
        let mut project = Project {
            test_sources: self.test_sources(),
            ..Default::default()
        };
        project.main_source = self.main_source(&project.test_sources);
        project.dep_sources = self.dep_sources(project.main_source.as_deref(), &project.test_sources);
        project.is_c = project
            .main_source
            .as_ref()
            .is_some_and(|m| m.extension().is_some_and(|e| e == "c"));

        for src in project.all_sources() {
            scan_source_for_features(&self.root.join(&src), &mut project.features);
        }

        self.resolve_common_deps(&mut project);
        project.dep_sources = self.unique(std::mem::take(&mut project.dep_sources));
        project.test_sources = self.unique(std::mem::take(&mut project.test_sources));

        debug!(
            main = ?project.main_source,
            deps = project.dep_sources.len(),
            tests = project.test_sources.len(),
            "scanned project"
        );
        project
    }

    /// `*_test.<ext>` files plus the first `test.<ext>`, in the root and common dirs.
    pub fn test_sources(&self) -> Vec<PathBuf> {
        let mut tests = Vec::new();
        for dir in std::iter::once(".").chain(LOCAL_COMMON_PATHS) {
            for ext in SOURCE_EXTS {
                tests.extend(
                    self.sources_in(dir, ext)
                        .into_iter()
                        .filter(|p| file_stem(p).ends_with("_test")),
                );
            }
            if let Some(test) = SOURCE_EXTS
                .iter()
                .map(|ext| rel_join(dir, &format!("test.{}", ext)))
                .find(|p| self.exists(p))
            {
                tests.push(test);
            }
        }
        self.unique(tests)
    }

    /// Explicit `main.*` first, then a single unambiguous `main()`-bearing
    /// source. `src/` is consulted only when the root has no candidates.
    pub fn main_source(&self, tests: &[PathBuf]) -> Option<PathBuf> {
        if let Some(main) = self.explicit_main(".") {
            return Some(main);
        }

        let tests = self.key_set(tests);
        let mut candidates: Vec<PathBuf> = self
            .sources_in_dir(".")
            .into_iter()
            .filter(|p| !tests.contains(&self.key(p)) && !is_test_file(p))
            .collect();

        if candidates.is_empty() {
            if let Some(main) = self.explicit_main("src") {
                return Some(main);
            }
            candidates = self
                .sources_in_dir("src")
                .into_iter()
                .filter(|p| !is_test_file(p))
                .collect();
        }

        match candidates.as_slice() {
            [] => None,
            [only] => self.contains_main(only).then(|| only.clone()),
            many => many.iter().find(|p| self.contains_main(p)).cloned(),
        }
    }

    fn explicit_main(&self, dir: &str) -> Option<PathBuf> {
        SOURCE_EXTS
            .iter()
            .map(|ext| rel_join(dir, &format!("main.{}", ext)))
            .find(|p| self.exists(p))
    }

    /// Non-main, non-test sources in the root and the common dirs. A main
    /// source living in `src/` brings its siblings along.
    pub fn dep_sources(&self, main: Option<&Path>, tests: &[PathBuf]) -> Vec<PathBuf> {
        let tests = self.key_set(tests);
        let main_key = main.map(|m| self.key(m));
        let is_dep = |p: &PathBuf| {
            Some(self.key(p)) != main_key && !tests.contains(&self.key(p)) && !is_test_file(p)
        };

        let mut deps: Vec<PathBuf> = self.sources_in_dir(".").into_iter().filter(is_dep).collect();
        if main.is_some_and(|m| m.parent() == Some(Path::new("src"))) {
            deps.extend(self.sources_in_dir("src").into_iter().filter(is_dep));
        }
        for dir in LOCAL_COMMON_PATHS {
            deps.extend(
                self.sources_in_dir(dir)
                    .into_iter()
                    .filter(|p| !is_test_file(p)),
            );
        }
        self.unique(deps)
    }

    /// Add common-dir implementations of locally included headers until
    /// nothing new turns up.
    fn resolve_common_deps(&self, project: &mut Project) {
        let Some(main) = project.main_source.clone() else {
            return;
        };
        loop {
            let mut files = vec![main.clone()];
            files.extend(project.dep_sources.iter().cloned());
            let includes = self.local_includes(&files);
            let mut existing = self.key_set(&project.dep_sources);
            let mut found_new = false;

            for inc in includes {
                let base = strip_extension(&inc);
                for dir in LOCAL_COMMON_PATHS {
                    for ext in SOURCE_EXTS {
                        let candidate = rel_join(dir, &format!("{}.{}", base, ext));
                        if self.exists(&candidate) && existing.insert(self.key(&candidate)) {
                            debug!(source = %candidate.display(), header = %inc, "common dependency");
                            project.dep_sources.push(candidate);
                            found_new = true;
                        }
                    }
                }
            }
            if !found_new {
                break;
            }
        }
    }

    /// `#include "..."` names from `files` and, transitively, from the local
    /// headers they pull in.
    pub fn local_includes(&self, files: &[PathBuf]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut examined = HashSet::new();
        let mut result = Vec::new();
        let mut queue: VecDeque<PathBuf> = files.iter().cloned().collect();

        while let Some(file) = queue.pop_front() {
            if !examined.insert(file.to_string_lossy().to_lowercase()) {
                continue;
            }
            let Ok(text) = fs::read_to_string(self.root.join(&file)) else {
                continue;
            };
            for line in text.lines() {
                let Some(inc) = quoted_include(line.trim()) else {
                    continue;
                };
                if !seen.insert(inc.to_string()) {
                    continue;
                }
                result.push(inc.to_string());
                if let Some(header) = LOCAL_INCLUDE_PATHS
                    .iter()
                    .map(|dir| rel_join(dir, inc))
                    .find(|p| self.exists(p))
                {
                    queue.push_back(header);
                }
            }
        }
        result
    }

    pub fn contains_main(&self, rel: &Path) -> bool {
        fs::read_to_string(self.root.join(rel))
            .map(|text| source_contains_main(&text))
            .unwrap_or(false)
    }

    fn sources_in_dir(&self, dir: &str) -> Vec<PathBuf> {
        SOURCE_EXTS
            .iter()
            .flat_map(|ext| self.sources_in(dir, ext))
            .collect()
    }

    /// Files in `dir` with extension `ext`, sorted by name.
    fn sources_in(&self, dir: &str, ext: &str) -> Vec<PathBuf> {
        let abs = self.root.join(dir);
        if !abs.is_dir() {
            return Vec::new();
        }
        WalkDir::new(&abs)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|x| x == ext))
            .map(|e| rel_join(dir, &e.file_name().to_string_lossy()))
            .collect()
    }

    fn exists(&self, rel: &Path) -> bool {
        self.root.join(rel).exists()
    }

    /// Dedup key: case-folded where the filesystem ignores case.
    fn key(&self, path: &Path) -> String {
        let s = path.to_string_lossy();
        if self.os.case_insensitive() {
            s.to_lowercase()
        } else {
            s.to_string()
        }
    }

    fn key_set(&self, paths: &[PathBuf]) -> HashSet<String> {
        paths.iter().map(|p| self.key(p)).collect()
    }

    fn unique(&self, paths: Vec<PathBuf>) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        paths
            .into_iter()
            .filter(|p| seen.insert(self.key(p)))
            .collect()
    }
}

/// Update `features` from one source file. Unreadable files are skipped.
pub fn scan_source_for_features(path: &Path, features: &mut Features) {
    let Ok(text) = fs::read_to_string(path) else {
        return;
    };
    scan_text_for_features(&text, features);
}

pub fn scan_text_for_features(text: &str, f: &mut Features) {
    for line in text.lines() {
        let trimmed = line.trim();

        if line.contains("#pragma omp") {
            f.openmp = true;
        }
        if line.contains("#include <boost/") {
            f.boost = true;
            if let Some((_, rest)) = line.split_once("<boost/")
                && let Some(end) = rest.find(['.', '/', '>'])
            {
                let lib = format!("boost_{}", &rest[..end]);
                if !f.boost_libs.contains(&lib) {
                    f.boost_libs.push(lib);
                }
            }
        }
        if line.contains("#include <QApplication") {
            f.qt6 = true;
        }
        if line.contains("#include <filesystem>") {
            f.filesystem = true;
        }
        if matches!(
            trimmed,
            "#include <cmath>" | "#include \"math.h\"" | "#include <math.h>"
        ) {
            f.math_lib = true;
        }
        if matches!(
            trimmed,
            "#include <thread>"
                | "#include <pthread.h>"
                | "#include <mutex>"
                | "#include <future>"
                | "#include <condition_variable>"
                | "#include <shared_mutex>"
        ) {
            f.threads = true;
        }
        if trimmed == "#include <dlfcn.h>" {
            f.dlopen = true;
        }
        if ["#include <windows.h>", "#include \"windows.h\"", "#include<windows.h>"]
            .iter()
            .any(|w| line.contains(w))
        {
            f.win64 = true;
        }
        if line.contains("#define GLFW_INCLUDE_VULKAN") {
            f.glfw_vulkan = true;
        }
    }
}

/// True if a `main(`/`SDL_main(` token appears outside comments.
pub fn source_contains_main(text: &str) -> bool {
    let mut in_block = false;
    for line in text.lines() {
        let code = strip_comments(line, &mut in_block);
        if has_main_token(&code) {
            return true;
        }
    }
    false
}

fn has_main_token(code: &str) -> bool {
    ["main(", "main (", "SDL_main("].iter().any(|pat| {
        code.match_indices(pat).any(|(idx, _)| {
            code[..idx]
                .chars()
                .next_back()
                .is_none_or(char::is_whitespace)
        })
    })
}

/// Drop `//` and `/* */` comment text from one line, tracking open blocks.
fn strip_comments(line: &str, in_block: &mut bool) -> String {
    let mut code = String::new();
    let mut rest = line;
    loop {
        if *in_block {
            match rest.find("*/") {
                Some(end) => {
                    rest = &rest[end + 2..];
                    *in_block = false;
                }
                None => return code,
            }
        }
        let line_comment = rest.find("//");
        let block = rest.find("/*");
        match (line_comment, block) {
            (Some(lc), Some(b)) if lc < b => {
                code.push_str(&rest[..lc]);
                return code;
            }
            (Some(lc), None) => {
                code.push_str(&rest[..lc]);
                return code;
            }
            (_, Some(b)) => {
                code.push_str(&rest[..b]);
                code.push(' ');
                rest = &rest[b + 2..];
                *in_block = true;
            }
            (None, None) => {
                code.push_str(rest);
                return code;
            }
        }
    }
}

pub fn is_test_file(path: &Path) -> bool {
    let stem = file_stem(path);
    stem.ends_with("_test") || stem == "test"
}

/// Name of the output executable: the directory name, `main` for `src`.
pub fn executable_name(root: &Path) -> String {
    let canonical = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    match canonical.file_name().map(|n| n.to_string_lossy().to_string()) {
        Some(name) if name != "src" => name,
        _ => "main".to_string(),
    }
}

fn quoted_include(trimmed: &str) -> Option<&str> {
    let rest = trimmed.strip_prefix("#include \"")?;
    rest.split('"').next()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn strip_extension(name: &str) -> &str {
    let file_start = name.rfind('/').map_or(0, |i| i + 1);
    match name[file_start..].rfind('.') {
        Some(dot) => &name[..file_start + dot],
        None => name,
    }
}

/// Join without a leading `./` so paths match what a user would type.
pub fn rel_join(dir: &str, name: &str) -> PathBuf {
    if dir == "." {
        PathBuf::from(name)
    } else {
        Path::new(dir).join(name)
    }
}

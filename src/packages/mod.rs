//! External header → compiler/linker flag resolution.
//!
//! Tiers, in precedence order:
//!
//! 1. the static header table ([`table`]),
//! 2. a pkg-config query by the name tier 1 produced,
//! 3. special-case rules ([`special`]) that always run,
//! 4. package-manager introspection ([`resolve`]), only for headers that
//!    tiers 1–3 left without any flags.
//!
//! Headers that are missing from the system entirely are handled after a
//! failed compile by [`advisory`].

pub mod advisory;
pub mod resolve;
pub mod special;
pub mod table;

use crate::flags::FlagSet;
use crate::platform::SystemContext;
use crate::tools::{ToolCommand, ToolRunner};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Per-run memo of package-manager and pkg-config answers.
///
/// Installed files are assumed not to change during a run, so nothing is
/// ever invalidated.
#[derive(Debug, Default)]
pub struct PackageCache {
    pc_files: Mutex<HashMap<String, Vec<PathBuf>>>,
    pkg_config: Mutex<HashMap<(String, Option<PathBuf>), Option<String>>>,
}

impl PackageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `.pc` files owned by `pkg`, computing them with `lookup` on first use.
    pub fn pc_files_or_insert_with(
        &self,
        pkg: &str,
        lookup: impl FnOnce() -> Vec<PathBuf>,
    ) -> Vec<PathBuf> {
        if let Ok(map) = self.pc_files.lock()
            && let Some(files) = map.get(pkg)
        {
            return files.clone();
        }
        let files = lookup();
        if let Ok(mut map) = self.pc_files.lock() {
            map.insert(pkg.to_string(), files.clone());
        }
        files
    }

    pub fn cached_packages(&self) -> usize {
        self.pc_files.lock().map(|m| m.len()).unwrap_or(0)
    }

    fn pkg_config_or_insert_with(
        &self,
        key: (String, Option<PathBuf>),
        query: impl FnOnce() -> Option<String>,
    ) -> Option<String> {
        if let Ok(map) = self.pkg_config.lock()
            && let Some(answer) = map.get(&key)
        {
            return answer.clone();
        }
        let answer = query();
        if let Ok(mut map) = self.pkg_config.lock() {
            map.insert(key, answer.clone());
        }
        answer
    }
}

/// Build-specific facts the resolution tiers depend on.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    pub win64: bool,
    /// Compiler target triple (`-dumpmachine`).
    pub machine: Option<String>,
    /// Existing system include directories, lookup order.
    pub include_dirs: Vec<PathBuf>,
}

impl ResolveContext {
    pub fn new(sys: &SystemContext, win64: bool, machine: Option<String>) -> Self {
        let include_dirs = sys.system_include_dirs(machine.as_deref());
        Self {
            win64,
            machine,
            include_dirs,
        }
    }
}

/// Maps external headers to flags.
pub struct PackageMapper<'a> {
    runner: &'a dyn ToolRunner,
    sys: &'a SystemContext,
    cache: PackageCache,
    pkg_config: Option<PathBuf>,
}

impl<'a> PackageMapper<'a> {
    pub fn new(runner: &'a dyn ToolRunner, sys: &'a SystemContext) -> Self {
        Self::with_cache(runner, sys, PackageCache::new())
    }

    pub fn with_cache(
        runner: &'a dyn ToolRunner,
        sys: &'a SystemContext,
        cache: PackageCache,
    ) -> Self {
        let pkg_config = runner.which("pkg-config");
        if pkg_config.is_none() {
            debug!("pkg-config not found, pkg-config tiers disabled");
        }
        Self {
            runner,
            sys,
            cache,
            pkg_config,
        }
    }

    pub fn runner(&self) -> &dyn ToolRunner {
        self.runner
    }

    pub fn system(&self) -> &SystemContext {
        self.sys
    }

    pub fn cache(&self) -> &PackageCache {
        &self.cache
    }

    pub fn has_pkg_config(&self) -> bool {
        self.pkg_config.is_some()
    }

    /// `pkg-config --cflags --libs <name>`; `None` when unavailable, failing or empty.
    pub fn pkg_config(&self, name: &str) -> Option<String> {
        self.pkg_config_query(name, None)
    }

    /// Same, with `PKG_CONFIG_PATH` pointing at `dir`.
    pub fn pkg_config_in(&self, name: &str, dir: &Path) -> Option<String> {
        self.pkg_config_query(name, Some(dir))
    }

    fn pkg_config_query(&self, name: &str, dir: Option<&Path>) -> Option<String> {
        let program = self.pkg_config.as_ref()?;
        let key = (name.to_string(), dir.map(Path::to_path_buf));
        self.cache.pkg_config_or_insert_with(key, || {
            let mut cmd = ToolCommand::new(program).args(["--cflags", "--libs", name]);
            if let Some(dir) = dir {
                cmd = cmd.env("PKG_CONFIG_PATH", dir.to_string_lossy());
            }
            let answer = self.runner.query(&cmd).filter(|out| !out.is_empty());
            debug!(package = name, flags = ?answer, "pkg-config");
            answer
        })
    }

    /// Flags for a single header.
    pub fn resolve(&self, header: &str, ctx: &ResolveContext) -> FlagSet {
        self.resolve_all(std::slice::from_ref(&header.to_string()), ctx)
    }

    /// Flags for every header. Each package name is queried once per pass.
    /// Output order: table/pkg-config flags, special-rule flags, then
    /// package-manager flags.
    pub fn resolve_all(&self, headers: &[String], ctx: &ResolveContext) -> FlagSet {
        let mut by_table = FlagSet::new();
        let mut by_rules = FlagSet::new();
        let mut by_platform = FlagSet::new();
        let mut queried: HashMap<String, bool> = HashMap::new();
        let mut platform_done: HashSet<&str> = HashSet::new();

        for header in headers {
            let mut resolved = false;

            if let Some(pkg) = table::pkg_name_from_include(header) {
                resolved = *queried.entry(pkg.clone()).or_insert_with(|| {
                    match self.pkg_config(&pkg) {
                        Some(flags) => {
                            by_table.merge_str(&flags);
                            true
                        }
                        None => false,
                    }
                });
            }

            let extra = special::extra_flags(self, header, ctx);
            if !extra.is_empty() {
                by_rules.extend(&extra);
                resolved = true;
            }

            if !resolved && platform_done.insert(header.as_str()) {
                let flags = resolve::platform_flags(self, header, ctx);
                if flags.is_empty() {
                    debug!(header = header.as_str(), "no flags resolved");
                }
                by_platform.extend(&flags);
            }
        }

        by_table.extend(&by_rules);
        by_table.extend(&by_platform);
        by_table
    }
}

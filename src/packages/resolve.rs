//! Package-manager backed resolution for headers the earlier tiers missed.

use super::{PackageMapper, ResolveContext};
use crate::flags::FlagSet;
use crate::platform::PlatformProbe;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Owners that are never a useful answer.
pub const SKIP_PACKAGES: [&str; 3] = ["glibc", "gcc", "wine"];

/// Owners known to ship no `.pc` files; no warning for these.
const QUIET_PACKAGES: [&str; 3] = ["boost", "qt5-base", "qt6-base"];

/// Header-only packages whose `.pc` yields nothing to link.
const HEADER_ONLY_PC: [&str; 3] = ["glm", "libglvnd", "RapidJSON"];

/// Depth of the recursive header search below each include directory.
const SEARCH_DEPTH: usize = 3;

/// Tier 4: find the header on disk, ask who owns it, and turn the owner's
/// `.pc` files (or bare libraries) into flags.
pub fn platform_flags(mapper: &PackageMapper, header: &str, ctx: &ResolveContext) -> FlagSet {
    for dir in &ctx.include_dirs {
        let path = dir.join(header);
        if path.is_file() {
            let flags = include_path_to_flags(mapper, &path, ctx);
            if !flags.is_empty() {
                return flags;
            }
        }
    }

    for dir in &ctx.include_dirs {
        let Some(path) = find_include_file(dir, header) else {
            continue;
        };
        debug!(header, found = %path.display(), "header found by search");
        let flags = include_path_to_flags(mapper, &path, ctx);
        if !flags.is_empty() {
            return flags;
        }
    }
    FlagSet::new()
}

/// Last file under `dir` (at most three levels down) whose path ends in `/<header>`.
pub fn find_include_file(dir: &Path, header: &str) -> Option<PathBuf> {
    let suffix = Path::new(header);
    WalkDir::new(dir)
        .max_depth(SEARCH_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .strip_prefix(dir)
                .is_ok_and(|rel| rel != suffix && rel.ends_with(suffix))
        })
        .map(|e| e.into_path())
        .last()
}

fn include_path_to_flags(mapper: &PackageMapper, path: &Path, ctx: &ResolveContext) -> FlagSet {
    let sys = mapper.system();
    if sys.probe == PlatformProbe::Generic {
        return generic_flags(mapper, path);
    }

    let Some(pkg) = sys.probe.owner_of(mapper.runner(), path) else {
        return FlagSet::new();
    };
    if SKIP_PACKAGES.contains(&pkg.as_str()) {
        return FlagSet::new();
    }
    debug!(header = %path.display(), package = %pkg, "package owner");

    let pc_files = mapper
        .cache()
        .pc_files_or_insert_with(&pkg, || sys.probe.list_pc_files(mapper.runner(), &pkg));

    if pc_files.is_empty() {
        let lib_dirs = sys.probe.lib_dirs(&sys.sysroot, ctx.machine.as_deref());
        let flags = if sys.probe.windows_style_libs() {
            windows_lib_fallback(path, &pkg, &lib_dirs)
        } else {
            lib_fallback(path, &pkg, &lib_dirs)
        };
        if flags.is_empty() && !QUIET_PACKAGES.contains(&pkg.as_str()) {
            warn!(package = %pkg, "no pkg-config files for package");
        }
        return flags;
    }

    pc_files_to_flags(mapper, &pc_files, sys.probe.pc_needs_own_dir())
}

/// pkg-config output for every `.pc` file, `-l<name>` when a file yields nothing.
pub fn pc_files_to_flags(mapper: &PackageMapper, pc_files: &[PathBuf], own_dir: bool) -> FlagSet {
    let mut out = FlagSet::new();
    for pc in pc_files {
        let Some(name) = pc.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            continue;
        };
        let flags = match (own_dir, pc.parent()) {
            (true, Some(dir)) => mapper.pkg_config_in(&name, dir),
            _ => mapper.pkg_config(&name),
        };
        match flags {
            Some(flags) => out.merge_str(&flags),
            None if !HEADER_ONLY_PC.contains(&name.as_str()) => {
                out.add_link(format!("-l{}", name));
            }
            None => {}
        }
    }
    out
}

/// `<parent>_<stem>`, the Boost library naming scheme.
fn boost_style(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();
    let parent = path.parent()?.file_name()?.to_string_lossy();
    Some(format!("{}_{}", parent, stem))
}

fn header_stem(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().to_string())
}

/// Probe `lib<name>.so` under several name guesses.
pub fn lib_fallback(path: &Path, pkg: &str, lib_dirs: &[PathBuf]) -> FlagSet {
    let candidates = [
        Some(pkg.to_string()),
        boost_style(path),
        Some(pkg.to_uppercase()),
        header_stem(path),
    ];
    let mut out = FlagSet::new();
    for name in candidates.into_iter().flatten().filter(|n| !n.is_empty()) {
        for dir in lib_dirs {
            if !dir.join(format!("lib{}.so", name)).exists() {
                continue;
            }
            out.add_link(format!("-l{}", name));
            if let Some(inc_dir) = path.parent().filter(|d| d.exists()) {
                out.add_compile(format!("-I{}", inc_dir.display()));
            }
            if dir.join(format!("lib{}++.so", name)).exists() {
                out.add_link(format!("-l{}++", name));
            }
            return out;
        }
    }
    out
}

/// MSYS2/VCPKG: static, import or MSVC libraries.
pub fn windows_lib_fallback(path: &Path, pkg: &str, lib_dirs: &[PathBuf]) -> FlagSet {
    let candidates = [Some(pkg.to_string()), header_stem(path)];
    let mut out = FlagSet::new();
    for name in candidates.into_iter().flatten().filter(|n| !n.is_empty()) {
        for dir in lib_dirs {
            let found = [
                format!("lib{}.a", name),
                format!("lib{}.dll.a", name),
                format!("{}.lib", name),
                format!("lib{}.lib", name),
            ]
            .iter()
            .any(|file| dir.join(file).exists());
            if !found {
                continue;
            }
            if let Some(inc_dir) = path.parent().filter(|d| d.exists()) {
                out.add_compile(format!("-I{}", inc_dir.display()));
            }
            out.add_link(format!("-l{}", name));
            out.add_link(format!("-L{}", dir.display()));
            return out;
        }
    }
    out
}

/// No package manager: guess the library name from the path layout.
fn generic_flags(mapper: &PackageMapper, path: &Path) -> FlagSet {
    let sys = mapper.system();
    let logical = path
        .strip_prefix(&sys.sysroot)
        .map(|rel| Path::new("/").join(rel))
        .unwrap_or_else(|_| path.to_path_buf());
    let logical = logical.to_string_lossy().to_string();

    // "/usr/include/<guess>/..."
    let Some(guess) = logical.split('/').nth(3).map(str::to_string) else {
        return FlagSet::new();
    };
    let candidates: Vec<String> = [Some(guess.clone()), boost_style(path), Some(guess.to_lowercase())]
        .into_iter()
        .flatten()
        .collect();
    if candidates.iter().any(|c| SKIP_PACKAGES.contains(&c.as_str())) {
        return FlagSet::new();
    }

    let lib_dirs = sys.probe.lib_dirs(&sys.sysroot, None);
    let mut out = FlagSet::new();
    for pkg in candidates.iter().filter(|c| !c.is_empty()) {
        for lib in [pkg.clone(), pkg.to_uppercase()] {
            for dir in &lib_dirs {
                if !dir.join(format!("lib{}.so", lib)).exists() {
                    continue;
                }
                out.add_link(format!("-l{}", lib));
                if dir.join(format!("lib{}++.so", lib)).exists() {
                    out.add_link(format!("-l{}++", lib));
                }
                return out;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{HostOs, SystemContext};
    use crate::tools::{ToolCommand, ToolOutput, ToolRunner};
    use std::fs;
    use std::io;

    struct NoTools;

    impl ToolRunner for NoTools {
        fn run(&self, _cmd: &ToolCommand) -> io::Result<ToolOutput> {
            Err(io::Error::new(io::ErrorKind::NotFound, "none"))
        }

        fn which(&self, _name: &str) -> Option<PathBuf> {
            None
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_find_include_file_takes_last_match() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a/foo/bar.h"));
        touch(&dir.path().join("b/foo/bar.h"));
        touch(&dir.path().join("c/d/e/foo/bar.h"));
        let found = find_include_file(dir.path(), "foo/bar.h").unwrap();
        assert_eq!(found, dir.path().join("b/foo/bar.h"));
        assert!(find_include_file(dir.path(), "missing.h").is_none());
    }

    #[test]
    fn test_lib_fallback_candidates() {
        let root = tempfile::tempdir().unwrap();
        let lib = root.path().join("lib");
        let header = root.path().join("include/boost/filesystem.hpp");
        touch(&header);
        touch(&lib.join("libboost_filesystem.so"));
        let f = lib_fallback(&header, "boost", &[lib.clone()]);
        assert_eq!(f.link, vec!["-lboost_filesystem"]);
        assert_eq!(
            f.compile,
            vec![format!("-I{}", root.path().join("include/boost").display())]
        );

        touch(&lib.join("libconfig.so"));
        touch(&lib.join("libconfig++.so"));
        let h = root.path().join("include/libconfig.h");
        touch(&h);
        let f = lib_fallback(&h, "config", &[lib]);
        assert_eq!(f.link, vec!["-lconfig", "-lconfig++"]);
    }

    #[test]
    fn test_windows_lib_fallback() {
        let root = tempfile::tempdir().unwrap();
        let lib = root.path().join("mingw64/lib");
        let header = root.path().join("mingw64/include/zlib.h");
        touch(&header);
        touch(&lib.join("libz.dll.a"));
        assert!(windows_lib_fallback(&header, "zlib", &[lib.clone()]).is_empty());
        touch(&lib.join("zlib.lib"));
        let f = windows_lib_fallback(&header, "zlib", &[lib.clone()]);
        assert_eq!(f.link, vec!["-lzlib".to_string(), format!("-L{}", lib.display())]);
    }

    #[test]
    fn test_generic_guess_from_path() {
        let root = tempfile::tempdir().unwrap();
        let header = root.path().join("usr/include/SDL2/SDL.h");
        touch(&header);
        touch(&root.path().join("usr/lib/libSDL2.so"));
        let sys = SystemContext::new(HostOs::Linux, PlatformProbe::Generic, root.path());
        let mapper = PackageMapper::new(&NoTools, &sys);
        let ctx = ResolveContext::new(&sys, false, None);
        let f = platform_flags(&mapper, "SDL2/SDL.h", &ctx);
        assert_eq!(f.link, vec!["-lSDL2"]);
    }

    #[test]
    fn test_generic_skips_glibc() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("usr/include/glibc/x.h"));
        touch(&root.path().join("usr/lib/libglibc.so"));
        let sys = SystemContext::new(HostOs::Linux, PlatformProbe::Generic, root.path());
        let mapper = PackageMapper::new(&NoTools, &sys);
        let ctx = ResolveContext::new(&sys, false, None);
        assert!(platform_flags(&mapper, "glibc/x.h", &ctx).is_empty());
    }

    #[test]
    fn test_pc_fallback_to_bare_lib_name() {
        let sys = SystemContext::new(HostOs::Linux, PlatformProbe::Arch, "/");
        let mapper = PackageMapper::new(&NoTools, &sys);
        let f = pc_files_to_flags(
            &mapper,
            &[PathBuf::from("/usr/lib/pkgconfig/foo.pc"), PathBuf::from("/usr/lib/pkgconfig/glm.pc")],
            false,
        );
        assert_eq!(f.link, vec!["-lfoo"]);
        assert!(f.compile.is_empty());
    }
}

//! Hand-written rules for libraries that pkg-config alone gets wrong:
//! macOS frameworks, mingw import libraries, thread libraries and a few
//! warning suppressions.

use super::{PackageMapper, ResolveContext};
use super::table::sdl2_sublib;
use crate::flags::FlagSet;
use crate::platform::HostOs;

/// Searched when neither frameworks nor pkg-config can supply a library.
pub const FALLBACK_LIB_DIRS: [&str; 4] = [
    "/usr/lib",
    "/usr/lib/x86_64-linux-gnu",
    "/usr/local/lib",
    "/usr/pkg/lib",
];

const THREAD_HEADERS: [&str; 7] = [
    "thread",
    "mutex",
    "future",
    "condition_variable",
    "pthread.h",
    "new",
    "dlfcn.h",
];

/// Where a library comes from on this host.
enum LinkSource {
    /// `/Library/Frameworks` exists and the target is native.
    Framework,
    /// mingw cross target.
    Win64,
    PkgConfig,
    /// Probe the fallback library directories.
    LibDirs,
}

/// Extra flags for one header.
pub fn extra_flags(mapper: &PackageMapper, inc: &str, ctx: &ResolveContext) -> FlagSet {
    let sys = mapper.system();
    let lower = inc.to_lowercase();
    let has_frameworks = sys.sys_path("/Library/Frameworks").exists();
    let has_sys_frameworks = sys.sys_path("/System/Library/Frameworks").exists();
    let source = if has_frameworks && !ctx.win64 {
        LinkSource::Framework
    } else if ctx.win64 {
        LinkSource::Win64
    } else if mapper.has_pkg_config() {
        LinkSource::PkgConfig
    } else {
        LinkSource::LibDirs
    };

    let mut out = FlagSet::new();

    if THREAD_HEADERS.contains(&inc) {
        out.add_link("-ldl");
        out.add_link("-pthread");
        out.add_link("-lpthread");
    }

    // SFML's graphics module needs OpenGL underneath
    if lower.starts_with("sfml/") {
        match source {
            LinkSource::Framework => add_framework(&mut out, "OpenGL"),
            LinkSource::Win64 => out.add_link("-lopengl32"),
            _ => {}
        }
        merge_pkg(mapper, &mut out, "gl");
    }

    if lower.starts_with("gl/")
        || lower.starts_with("opengl/")
        || lower.starts_with("glut/")
        || lower.starts_with("glfw/")
        || lower.contains("opengl")
    {
        match source {
            LinkSource::Framework => add_framework(&mut out, "OpenGL"),
            LinkSource::Win64 => out.add_link("-lopengl32"),
            LinkSource::PkgConfig => {
                merge_pkg(mapper, &mut out, "gl");
            }
            LinkSource::LibDirs => probe_lib(mapper, &mut out, "GL"),
        }
    }

    if lower.ends_with("/glut.h") || lower.ends_with("/freeglut.h") || lower.starts_with("glut/") {
        match source {
            LinkSource::Framework => out.add_framework("GLUT"),
            LinkSource::Win64 => out.add_link("-lglu32"),
            LinkSource::PkgConfig => {
                if !merge_pkg(mapper, &mut out, "glu") {
                    merge_pkg(mapper, &mut out, "freeglut");
                }
            }
            LinkSource::LibDirs => probe_lib(mapper, &mut out, "glut"),
        }
    }

    if lower.ends_with("/glew.h") {
        if ctx.win64 {
            out.add_link("-lglew32");
        }
        merge_pkg(mapper, &mut out, "glew");
    }

    if lower.starts_with("al/") || lower.starts_with("openal") || lower.contains("/al.h") {
        if has_sys_frameworks && !ctx.win64 {
            out.add_compile("-I/System/Library/Frameworks/OpenAL.framework/Headers");
            out.add_link("-F/System/Library/Frameworks");
            out.add_framework("OpenAL");
        } else if ctx.win64 {
            out.add_link("-lopenal32");
        } else if mapper.has_pkg_config() {
            merge_pkg(mapper, &mut out, "openal");
        } else {
            probe_lib(mapper, &mut out, "openal");
        }
    }

    // GTK builder callbacks are looked up in the executable's symbol table
    if lower == "gtk/gtk.h" {
        out.add_link("-Wl,-export-dynamic");
    }

    if lower.starts_with("sdl2/sdl_") {
        merge_pkg(mapper, &mut out, &sdl2_sublib(inc));
    }

    if lower.starts_with("vulkan/") {
        if mapper.has_pkg_config() {
            merge_pkg(mapper, &mut out, "vulkan");
        } else {
            out.add_link("-lvulkan");
        }
    }

    if inc.starts_with('Q') {
        out.add_compile("-Wno-class-memaccess");
        out.add_compile("-Wno-pedantic");
        for dir in &ctx.include_dirs {
            let qt = dir.join("qt");
            if qt.exists() {
                out.add_compile(format!("-I{}", qt.display()));
            }
        }
    }

    if lower.starts_with("glm/") {
        out.add_compile("-Wno-shadow");
    }

    if sys.os == HostOs::Darwin && has_frameworks && !ctx.win64 {
        let first = inc.split('/').next().unwrap_or(inc);
        if sys
            .sys_path(&format!("/Library/Frameworks/{}.framework", first))
            .exists()
        {
            add_framework(&mut out, first);
        }
    }

    out
}

fn add_framework(out: &mut FlagSet, name: &str) {
    out.add_compile("-I/usr/local/include");
    out.add_link("-F/Library/Frameworks");
    out.add_framework(name);
}

/// Merge pkg-config output for `pkg`; false when it had none.
fn merge_pkg(mapper: &PackageMapper, out: &mut FlagSet, pkg: &str) -> bool {
    match mapper.pkg_config(pkg) {
        Some(flags) => {
            out.merge_str(&flags);
            true
        }
        None => false,
    }
}

/// `-l<name>` if `lib<name>.so` sits in one of the fallback directories.
fn probe_lib(mapper: &PackageMapper, out: &mut FlagSet, name: &str) {
    let sys = mapper.system();
    let so = format!("lib{}.so", name);
    if FALLBACK_LIB_DIRS
        .iter()
        .any(|dir| sys.sys_path(dir).join(&so).exists())
    {
        out.add_link(format!("-l{}", name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{PlatformProbe, SystemContext};
    use crate::tools::{ToolCommand, ToolOutput, ToolRunner};
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};

    /// Optionally provides pkg-config answering `gl`, `glu` and `SDL2_image`.
    struct Host {
        pkg_config: bool,
    }

    impl ToolRunner for Host {
        fn run(&self, cmd: &ToolCommand) -> io::Result<ToolOutput> {
            let stdout = match cmd.args.last().map(String::as_str) {
                Some("gl") => "-lGL",
                Some("glu") => "-lGLU -lGL",
                Some("SDL2_image") => "-I/usr/include/SDL2 -lSDL2_image -lSDL2",
                _ => "",
            };
            Ok(ToolOutput {
                success: !stdout.is_empty(),
                stdout: stdout.into(),
                stderr: String::new(),
            })
        }

        fn which(&self, name: &str) -> Option<PathBuf> {
            (self.pkg_config && name == "pkg-config").then(|| PathBuf::from("/usr/bin/pkg-config"))
        }
    }

    fn flags(host: &Host, sys: &SystemContext, inc: &str, win64: bool) -> FlagSet {
        let mapper = PackageMapper::new(host, sys);
        let ctx = ResolveContext {
            win64,
            ..Default::default()
        };
        extra_flags(&mapper, inc, &ctx)
    }

    fn linux(root: &Path) -> SystemContext {
        SystemContext::new(HostOs::Linux, PlatformProbe::Generic, root)
    }

    #[test]
    fn test_thread_headers_link_pthread() {
        let root = tempfile::tempdir().unwrap();
        let f = flags(&Host { pkg_config: true }, &linux(root.path()), "thread", false);
        assert_eq!(f.link, vec!["-ldl", "-pthread", "-lpthread"]);
    }

    #[test]
    fn test_glut_with_pkg_config() {
        let root = tempfile::tempdir().unwrap();
        let f = flags(&Host { pkg_config: true }, &linux(root.path()), "GL/glut.h", false);
        assert_eq!(f.link, vec!["-lGL", "-lGLU"]);
    }

    #[test]
    fn test_win64_import_libs() {
        let root = tempfile::tempdir().unwrap();
        let sys = linux(root.path());
        let host = Host { pkg_config: false };
        assert_eq!(flags(&host, &sys, "GL/glut.h", true).link, vec!["-lopengl32", "-lglu32"]);
        assert_eq!(flags(&host, &sys, "AL/al.h", true).link, vec!["-lopenal32"]);
        assert_eq!(flags(&host, &sys, "GL/glew.h", true).link, vec!["-lopengl32", "-lglew32"]);
    }

    #[test]
    fn test_lib_dir_probe_without_pkg_config() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("usr/lib")).unwrap();
        fs::write(root.path().join("usr/lib/libGL.so"), "").unwrap();
        let f = flags(&Host { pkg_config: false }, &linux(root.path()), "GL/gl.h", false);
        assert_eq!(f.link, vec!["-lGL"]);
    }

    #[test]
    fn test_frameworks_on_macos() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("Library/Frameworks/SDL2.framework")).unwrap();
        fs::create_dir_all(root.path().join("System/Library/Frameworks")).unwrap();
        let sys = SystemContext::new(HostOs::Darwin, PlatformProbe::Generic, root.path());
        let host = Host { pkg_config: false };

        let f = flags(&host, &sys, "OpenGL/gl.h", false);
        assert_eq!(f.link, vec!["-F/Library/Frameworks", "-framework", "OpenGL"]);

        let f = flags(&host, &sys, "GLUT/glut.h", false);
        assert_eq!(
            f.link,
            vec!["-F/Library/Frameworks", "-framework", "OpenGL", "-framework", "GLUT"]
        );

        let f = flags(&host, &sys, "AL/al.h", false);
        assert!(f.compile.contains(&"-I/System/Library/Frameworks/OpenAL.framework/Headers".to_string()));
        assert!(f.link.ends_with(&["-framework".to_string(), "OpenAL".to_string()]));

        let f = flags(&host, &sys, "SDL2/SDL.h", false);
        assert!(f.link.ends_with(&["-framework".to_string(), "SDL2".to_string()]));
    }

    #[test]
    fn test_qt_glm_gtk_sdl_sublib() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("usr/include/qt")).unwrap();
        let sys = linux(root.path());
        let host = Host { pkg_config: true };
        let mapper = PackageMapper::new(&host, &sys);
        let ctx = ResolveContext::new(&sys, false, None);

        let qt = extra_flags(&mapper, "QApplication", &ctx);
        assert_eq!(qt.compile[..2], ["-Wno-class-memaccess", "-Wno-pedantic"]);
        assert!(qt.compile[2].ends_with("usr/include/qt"));

        assert_eq!(extra_flags(&mapper, "glm/glm.hpp", &ctx).compile, vec!["-Wno-shadow"]);
        assert_eq!(extra_flags(&mapper, "gtk/gtk.h", &ctx).link, vec!["-Wl,-export-dynamic"]);
        let sdl = extra_flags(&mapper, "SDL2/SDL_image.h", &ctx);
        assert_eq!(sdl.link, vec!["-lSDL2_image", "-lSDL2"]);
    }

    #[test]
    fn test_unrelated_header_has_no_rules() {
        let root = tempfile::tempdir().unwrap();
        let f = flags(&Host { pkg_config: true }, &linux(root.path()), "zlib.h", false);
        assert!(f.is_empty());
    }
}

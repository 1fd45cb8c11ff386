//! Compiler and flag selection.
//!
//! [`FlagAssembler::assemble`] turns a [`Project`] and [`BuildOptions`] into
//! [`BuildFlags`]. Flags are only ever appended, so the order below is the order
//! on the command line: optimization tier, common flags, hardening, warnings,
//! include paths, directory defines, per-feature flags, PGO, win64 overrides,
//! resolved package flags, `lib/`, OS search paths, `--as-needed`, and finally
//! the user's environment flags.

use crate::config::{BuildOptions, EnvOverrides};
use crate::error::Result;
use crate::flags::{FlagSet, append_unique};
use crate::packages::{PackageMapper, ResolveContext};
use crate::platform::SystemContext;
use crate::scanner::{LOCAL_INCLUDE_PATHS, Project};
use crate::toolchain::{self, CompilerRequest, Toolchain};
use crate::tools::{ToolCommand, ToolRunner};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Logical data directories and the macro each one defines.
pub const DIR_DEFINES: [(&str, &str); 9] = [
    ("img", "IMGDIR"),
    ("data", "DATADIR"),
    ("shaders", "SHADERDIR"),
    ("shader", "SHADERDIR"),
    ("share", "SHAREDIR"),
    ("resources", "RESOURCEDIR"),
    ("resource", "RESOURCEDIR"),
    ("res", "RESDIR"),
    ("scripts", "SCRIPTDIR"),
];

const DEFAULT_WARNINGS: [&str; 7] = [
    "-Wall",
    "-Wshadow",
    "-Wpedantic",
    "-Wno-parentheses",
    "-Wfatal-errors",
    "-Wvla",
    "-Wignored-qualifiers",
];

const STRICT_WARNINGS: [&str; 5] = [
    "-Wextra",
    "-Wconversion",
    "-Wparentheses",
    "-Weffc++",
    "-Wunused-function",
];

const SLOPPY_FLAGS: [&str; 3] = ["-fpermissive", "-fms-extensions", "-w"];

const MINGW_INCLUDE_DIR: &str = "/usr/x86_64-w64-mingw32/include";

const QT6_MODULES: [&str; 74] = [
    "Qt3DAnimation", "Qt3DCore", "Qt3DExtras", "Qt3DInput", "Qt3DLogic", "Qt3DQuick",
    "Qt3DQuickAnimation", "Qt3DQuickExtras", "Qt3DQuickInput", "Qt3DQuickRender",
    "Qt3DQuickScene2D", "Qt3DRender", "QtConcurrent", "QtCore", "QtCore5Compat", "QtDBus",
    "QtDesigner", "QtDesignerComponents", "QtDeviceDiscoverySupport",
    "QtEglFSDeviceIntegration", "QtEglFsKmsGbmSupport", "QtEglFsKmsSupport", "QtFbSupport",
    "QtGui", "QtHelp", "QtInputSupport", "QtKmsSupport", "QtLabsAnimation",
    "QtLabsFolderListModel", "QtLabsQmlModels", "QtLabsSettings", "QtLabsSharedImage",
    "QtLabsWavefrontMesh", "QtNetwork", "QtNetworkAuth", "QtOpenGL", "QtOpenGLWidgets",
    "QtPacketProtocol", "QtPrintSupport", "QtQml", "QtQmlCompiler", "QtQmlDebug", "QtQmlDom",
    "QtQmlLocalStorage", "QtQmlModels", "QtQmlWorkerScript", "QtQuick", "QtQuick3D",
    "QtQuick3DAssetImport", "QtQuick3DIblBaker", "QtQuick3DParticles",
    "QtQuick3DRuntimeRender", "QtQuick3DUtils", "QtQuickControls2", "QtQuickControls2Impl",
    "QtQuickLayouts", "QtQuickParticles", "QtQuickShapes", "QtQuickTemplates2", "QtQuickTest",
    "QtQuickWidgets", "QtShaderTools", "QtSql", "QtSvg", "QtSvgWidgets", "QtTest", "QtTools",
    "QtUiPlugin", "QtUiTools", "QtWaylandClient", "QtWaylandCompositor", "QtWidgets", "QtXml",
    "QtXmlPatterns",
];

const QT6_LIBS: [&str; 16] = [
    "Concurrent", "Core", "DBus", "EglFSDeviceIntegration", "EglFsKmsGbmSupport",
    "EglFsKmsSupport", "Gui", "Network", "OpenGL", "OpenGLWidgets", "PrintSupport", "Sql",
    "Test", "Widgets", "XcbQpa", "Xml",
];

/// The assembled compiler contract.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BuildFlags {
    pub compiler: PathBuf,
    /// Value for `-std=`, e.g. `c++20`.
    pub std: String,
    pub compile_flags: Vec<String>,
    pub link_flags: Vec<String>,
    pub defines: Vec<String>,
    pub include_paths: Vec<String>,
    /// Effective target is win64 (requested or `windows.h` detected).
    pub win64: bool,
}

impl BuildFlags {
    fn add_compile(&mut self, flags: &[&str]) {
        self.compile_flags.extend(flags.iter().map(|f| f.to_string()));
    }

    fn add_link(&mut self, flags: &[&str]) {
        self.link_flags.extend(flags.iter().map(|f| f.to_string()));
    }

    fn merge(&mut self, set: &FlagSet) {
        self.compile_flags.extend(set.compile.iter().cloned());
        self.link_flags.extend(set.link.iter().cloned());
    }
}

/// `-D<NAME>DIR="dir/"` for each data directory present here or one level up.
pub fn dir_defines(root: &Path) -> Vec<String> {
    let mut defines: Vec<String> = Vec::new();
    let mut names: Vec<&str> = Vec::new();
    for (dir, name) in DIR_DEFINES {
        let path = if root.join(dir).exists() {
            format!("{}/", dir)
        } else if root.join("..").join(dir).exists() {
            format!("../{}/", dir)
        } else {
            continue;
        };
        if !names.contains(&name) {
            names.push(name);
            defines.push(format!("-D{}=\"{}\"", name, path));
        }
    }
    defines
}

/// Like [`dir_defines`] but pointing below an install prefix.
pub fn install_dir_defines(root: &Path, prefix: &Path) -> Vec<String> {
    let mut defines: Vec<String> = Vec::new();
    let mut names: Vec<&str> = Vec::new();
    for (dir, name) in DIR_DEFINES {
        if !(root.join(dir).exists() || root.join("..").join(dir).exists()) {
            continue;
        }
        if !names.contains(&name) {
            names.push(name);
            defines.push(format!("-D{}=\"{}/\"", name, prefix.join(dir).display()));
        }
    }
    defines
}

/// Combines project, options, environment and host into [`BuildFlags`].
pub struct FlagAssembler<'a> {
    runner: &'a dyn ToolRunner,
    sys: &'a SystemContext,
    env: &'a EnvOverrides,
}

impl<'a> FlagAssembler<'a> {
    pub fn new(runner: &'a dyn ToolRunner, sys: &'a SystemContext, env: &'a EnvOverrides) -> Self {
        Self { runner, sys, env }
    }

    /// Pick the compiler for this project and options.
    pub fn select_toolchain(&self, project: &Project, opts: &BuildOptions) -> Result<Toolchain> {
        toolchain::detect_toolchain(
            self.runner,
            self.env,
            CompilerRequest {
                is_c: project.is_c,
                clang: opts.clang,
                win64: opts.win64 || project.features.win64,
                zap: opts.zap,
            },
        )
    }

    pub fn assemble(
        &self,
        root: &Path,
        project: &Project,
        opts: &BuildOptions,
        mapper: &PackageMapper,
    ) -> Result<BuildFlags> {
        let tc = self.select_toolchain(project, opts)?;
        Ok(self.assemble_with(root, project, opts, &tc, mapper))
    }

    /// Everything after compiler selection.
    pub fn assemble_with(
        &self,
        root: &Path,
        project: &Project,
        opts: &BuildOptions,
        tc: &Toolchain,
        mapper: &PackageMapper,
    ) -> BuildFlags {
        let os = self.sys.os;
        let win64 = opts.win64 || project.features.win64;
        let features = &project.features;
        let small = opts.small || opts.tiny;

        let mut bf = BuildFlags {
            compiler: tc.path.clone(),
            std: self.select_std(project, opts, win64, tc),
            win64,
            ..Default::default()
        };

        // Optimization tier
        if opts.debug {
            bf.add_compile(&["-O0", "-g", "-fno-omit-frame-pointer"]);
            if !opts.no_sanitizers {
                bf.add_compile(&["-fsanitize=address"]);
                bf.add_link(&["-fsanitize=address"]);
                if !os.is_darwin() {
                    if tc.is_clang() {
                        bf.add_compile(&["-static-libsan"]);
                    } else if tc.is_gcc() {
                        bf.add_compile(&["-static-libasan"]);
                    }
                }
            }
        } else if small {
            bf.add_compile(&["-Os", "-ffunction-sections", "-fdata-sections"]);
            bf.add_link(&["-ffunction-sections", "-fdata-sections", "-Wl,-s", "-Wl,-gc-sections"]);
            if opts.tiny {
                bf.add_compile(&["-s", "-nostdlib", "-fno-rtti", "-fno-ident", "-fomit-frame-pointer"]);
                bf.add_link(&["-Wl,-z,norelro"]);
            }
        } else if opts.opt {
            bf.add_compile(&["-Ofast", "-flto"]);
            bf.add_link(&["-Wl,-flto"]);
        } else if features.openmp {
            bf.add_compile(&["-O3"]);
        } else {
            bf.add_compile(&["-O2"]);
        }

        bf.add_compile(&["-pipe"]);
        if !small {
            bf.add_compile(&["-fPIC"]);
        }

        if os.is_linux() && !win64 && !opts.sloppy && !opts.zap && !small && !opts.debug {
            bf.add_compile(&["-fno-plt", "-fstack-protector-strong"]);
        }

        if opts.sloppy {
            bf.add_compile(&SLOPPY_FLAGS);
        } else {
            bf.add_compile(&DEFAULT_WARNINGS);
            if opts.strict {
                bf.add_compile(&STRICT_WARNINGS);
            }
        }

        for dir in LOCAL_INCLUDE_PATHS {
            if root.join(dir).exists() {
                append_unique(&mut bf.include_paths, dir);
            }
        }

        bf.defines = match &opts.install_prefix {
            Some(prefix) => install_dir_defines(root, prefix),
            None => dir_defines(root),
        };

        if project.is_c {
            bf.defines.push(os.c_define().to_string());
        }

        self.add_feature_flags(&mut bf, project);
        self.add_pgo_flags(&mut bf, root, opts, tc);

        if win64 {
            bf.add_compile(&["-Wno-unused-variable"]);
            if !project.is_c {
                bf.add_compile(&["-mwindows", "-fms-extensions"]);
                bf.add_link(&["-mwindows", "-fms-extensions"]);
            }
            append_unique(&mut bf.link_flags, "-lm");
            if self.sys.sys_path(MINGW_INCLUDE_DIR).exists() {
                append_unique(&mut bf.include_paths, MINGW_INCLUDE_DIR);
            }
        }

        let machine = self.sys.machine(self.runner, Some(tc.path_str().as_str()));
        let ctx = ResolveContext::new(self.sys, win64, machine);
        let resolved = mapper.resolve_all(&project.includes, &ctx);
        debug!(compile = ?resolved.compile, link = ?resolved.link, "resolved package flags");
        bf.merge(&resolved);

        bf.link_flags.extend(local_lib_flags(root));
        bf.add_link(os.extra_lib_paths());

        if !bf.link_flags.is_empty()
            && let Some(flag) = os.as_needed_flag()
        {
            append_unique(&mut bf.link_flags, flag);
        }

        bf.compile_flags.extend(self.env.compile_flags(project.is_c));
        bf.link_flags.extend(self.env.link_flags());
        bf
    }

    fn select_std(&self, project: &Project, opts: &BuildOptions, win64: bool, tc: &Toolchain) -> String {
        if project.is_c {
            let std = if win64 { "c11" } else { "c18" };
            std.to_string()
        } else if opts.zap {
            "c++14".to_string()
        } else {
            toolchain::best_std_flag(self.runner, tc)
        }
    }

    fn add_feature_flags(&self, bf: &mut BuildFlags, project: &Project) {
        let f = &project.features;

        if f.openmp {
            bf.add_compile(&["-fopenmp"]);
            bf.add_link(&["-fopenmp", "-pthread", "-lpthread"]);
        }

        if f.boost {
            bf.add_compile(&["-Wno-unknown-pragmas"]);
            bf.add_link(&["-pthread", "-lpthread"]);
            for lib in &f.boost_libs {
                append_unique(&mut bf.link_flags, format!("-l{}", lib));
            }
            if f.boost_libs.iter().any(|l| l.starts_with("boost_")) && self.has_boost_system() {
                append_unique(&mut bf.link_flags, "-lboost_system");
            }
        }

        if f.threads {
            append_unique(&mut bf.link_flags, "-lpthread");
        }
        if f.dlopen {
            append_unique(&mut bf.link_flags, "-ldl");
        }
        if f.math_lib {
            append_unique(&mut bf.link_flags, "-lm");
        }
        if f.filesystem && self.sys.os.is_linux() {
            append_unique(&mut bf.link_flags, "-lstdc++fs");
        }

        if f.qt6 {
            append_unique(&mut bf.compile_flags, "-I/usr/include/qt6");
            for module in QT6_MODULES {
                append_unique(&mut bf.compile_flags, format!("-I/usr/include/qt6/{}", module));
            }
            for lib in QT6_LIBS {
                append_unique(&mut bf.link_flags, format!("-lQt6{}", lib));
            }
        }

        if f.glfw_vulkan {
            append_unique(&mut bf.link_flags, "-lvulkan");
        }
    }

    /// `ldconfig -p` lists it, or the usual shared object exists.
    fn has_boost_system(&self) -> bool {
        let listed = self
            .runner
            .query(&ToolCommand::new("ldconfig").arg("-p"))
            .is_some_and(|out| out.contains("boost_system"));
        listed || self.sys.sys_path("/usr/lib/libboost_system.so").exists()
    }

    fn add_pgo_flags(&self, bf: &mut BuildFlags, root: &Path, opts: &BuildOptions, tc: &Toolchain) {
        let generate = opts.profile_generate;
        let use_profile = !generate && (opts.profile_use || has_profile_data(root));
        let flags: &[&str] = match (generate, use_profile) {
            (true, _) if tc.is_gcc() => &["-coverage", "-fprofile-generate", "-fprofile-correction"],
            (true, _) if tc.is_clang() => &["-fprofile-generate"],
            (false, true) if tc.is_gcc() => &["-fprofile-use", "-fprofile-correction"],
            (false, true) if tc.is_clang() => &["-fprofile-use"],
            _ => &[],
        };
        bf.add_compile(flags);
        bf.add_link(flags);
    }
}

/// `*.gcda` files from an earlier instrumented run.
fn has_profile_data(root: &Path) -> bool {
    fs::read_dir(root)
        .map(|entries| {
            entries
                .flatten()
                .any(|e| e.path().extension().is_some_and(|x| x == "gcda"))
        })
        .unwrap_or(false)
}

/// Link against every shared library in the project's own `lib/`.
fn local_lib_flags(root: &Path) -> Vec<String> {
    let lib = root.join("lib");
    if !lib.is_dir() {
        return Vec::new();
    }
    let mut flags = vec!["-Llib".to_string(), "-Wl,-rpath,./lib".to_string()];
    let mut names: Vec<String> = fs::read_dir(&lib)
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|e| {
                    let file = e.file_name().to_string_lossy().to_string();
                    let name = file.strip_prefix("lib")?.strip_suffix(".so")?;
                    Some(name.to_string())
                })
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    flags.extend(names.into_iter().map(|n| format!("-l{}", n)));
    flags
}

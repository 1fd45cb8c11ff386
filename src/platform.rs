//! Host operating system and package-manager probing.
//!
//! [`HostOs`] captures the per-OS conventions the flag assembler needs
//! (feature-test define, `--as-needed` spelling, extra library paths).
//! [`PlatformProbe`] is the package-manager capability used by the last
//! resolution tier: who owns a header, which `.pc` files that owner ships, and
//! where its libraries live. Both are selected once in [`SystemContext::detect`]
//! and passed down.

use crate::tools::{ToolCommand, ToolRunner};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Operating system family of the machine running the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HostOs {
    Linux,
    Darwin,
    FreeBsd,
    OpenBsd,
    NetBsd,
    Solaris,
    Windows,
    Other,
}

impl HostOs {
    pub fn current() -> Self {
        Self::from_name(std::env::consts::OS)
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "linux" => HostOs::Linux,
            "macos" | "darwin" => HostOs::Darwin,
            "freebsd" => HostOs::FreeBsd,
            "openbsd" => HostOs::OpenBsd,
            "netbsd" => HostOs::NetBsd,
            "solaris" | "illumos" => HostOs::Solaris,
            "windows" => HostOs::Windows,
            _ => HostOs::Other,
        }
    }

    pub fn is_linux(self) -> bool {
        self == HostOs::Linux
    }

    pub fn is_darwin(self) -> bool {
        self == HostOs::Darwin
    }

    /// Paths compare case-insensitively on these filesystems.
    pub fn case_insensitive(self) -> bool {
        matches!(self, HostOs::Darwin | HostOs::Windows)
    }

    /// Feature-test macro defined for C projects.
    pub fn c_define(self) -> &'static str {
        match self {
            HostOs::Linux => "-D_GNU_SOURCE",
            HostOs::FreeBsd | HostOs::OpenBsd | HostOs::NetBsd => "-D_BSD_SOURCE",
            _ => "-D_XOPEN_SOURCE=700",
        }
    }

    /// Library search paths the system linker does not know by default.
    pub fn extra_lib_paths(self) -> &'static [&'static str] {
        match self {
            HostOs::NetBsd => &["-L/usr/pkg/lib"],
            HostOs::OpenBsd => &["-L/usr/local/lib"],
            _ => &[],
        }
    }

    /// Linker flag dropping unneeded shared libraries, if the linker has one.
    pub fn as_needed_flag(self) -> Option<&'static str> {
        match self {
            HostOs::Solaris => Some("-Wl,-zignore"),
            HostOs::Darwin => None,
            _ => Some("-Wl,--as-needed"),
        }
    }
}

/// Installed-package introspection strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PlatformProbe {
    Arch,
    Debian,
    FreeBsd,
    OpenBsd,
    Homebrew,
    Msys2 { prefix: PathBuf },
    Vcpkg { installed: PathBuf },
    Generic,
}

impl PlatformProbe {
    /// Pick the probe for this host. `sysroot` prefixes the well-known tool paths.
    pub fn detect(os: HostOs, runner: &dyn ToolRunner, sysroot: &Path) -> Self {
        let exists = |p: &str| sys_join(sysroot, p).exists();
        let probe = match os {
            HostOs::Linux if exists("/usr/bin/pacman") => PlatformProbe::Arch,
            HostOs::Linux if exists("/usr/bin/dpkg-query") => PlatformProbe::Debian,
            HostOs::Darwin if runner.which("brew").is_some() => PlatformProbe::Homebrew,
            HostOs::FreeBsd if exists("/usr/sbin/pkg") => PlatformProbe::FreeBsd,
            HostOs::OpenBsd if exists("/usr/sbin/pkg_info") => PlatformProbe::OpenBsd,
            HostOs::Windows => Self::detect_windows(runner),
            _ => PlatformProbe::Generic,
        };
        debug!(?probe, "selected package-manager probe");
        probe
    }

    fn detect_windows(runner: &dyn ToolRunner) -> Self {
        if let Ok(prefix) = std::env::var("MSYSTEM_PREFIX")
            && runner.which("pacman").is_some()
        {
            return PlatformProbe::Msys2 {
                prefix: msys2_to_windows_path(&prefix).unwrap_or_else(|| PathBuf::from(&prefix)),
            };
        }
        if let Ok(root) = std::env::var("VCPKG_ROOT") {
            let triplet =
                std::env::var("VCPKG_DEFAULT_TRIPLET").unwrap_or_else(|_| "x64-windows".into());
            let installed = Path::new(&root).join("installed").join(triplet);
            if installed.exists() {
                return PlatformProbe::Vcpkg { installed };
            }
        }
        PlatformProbe::Generic
    }

    /// Name of the installed package that owns `header_path`.
    pub fn owner_of(&self, runner: &dyn ToolRunner, header_path: &Path) -> Option<String> {
        let path = header_path.to_string_lossy().to_string();
        let owner = match self {
            PlatformProbe::Arch => runner
                .query(&c_locale("/usr/bin/pacman").args(["-Qo", "--", &path]))
                .and_then(|out| out.split_whitespace().nth(4).map(str::to_string)),
            PlatformProbe::Debian => runner
                .query(&c_locale("/usr/bin/dpkg-query").args(["-S", &path]))
                .and_then(|out| {
                    out.lines()
                        .next()
                        .and_then(|l| l.split(':').next())
                        .map(|s| s.trim().to_string())
                }),
            PlatformProbe::FreeBsd => {
                runner.query(&ToolCommand::new("/usr/sbin/pkg").args(["which", "-q", &path]))
            }
            PlatformProbe::OpenBsd => runner
                .query(&ToolCommand::new("/usr/sbin/pkg_info").args(["-E", &path]))
                .and_then(|out| {
                    let first = out.lines().next()?.split_whitespace().nth(1)?;
                    first.split('-').next().map(str::to_string)
                }),
            PlatformProbe::Homebrew => brew_package_from_path(header_path),
            PlatformProbe::Msys2 { .. } => {
                let msys_path = windows_to_msys2_path(&path);
                runner
                    .query(&ToolCommand::new("pacman").args(["-Qo", "--quiet", &msys_path]))
                    .or_else(|| {
                        runner.query(&ToolCommand::new("pacman").args(["-Qo", "--quiet", &path]))
                    })
            }
            PlatformProbe::Vcpkg { installed } => vcpkg_guess_package(header_path, installed),
            PlatformProbe::Generic => None,
        };
        owner.filter(|o| !o.is_empty())
    }

    /// `.pc` files installed by `pkg`. Uncached; see `PackageCache`.
    pub fn list_pc_files(&self, runner: &dyn ToolRunner, pkg: &str) -> Vec<PathBuf> {
        let listing = match self {
            PlatformProbe::Arch => {
                runner.query(&c_locale("/usr/bin/pacman").args(["-Ql", "--", pkg]))
            }
            PlatformProbe::Debian => {
                runner.query(&c_locale("/usr/bin/dpkg-query").args(["-L", pkg]))
            }
            PlatformProbe::FreeBsd => {
                runner.query(&ToolCommand::new("/usr/sbin/pkg").args(["list", pkg]))
            }
            PlatformProbe::OpenBsd => {
                runner.query(&ToolCommand::new("/usr/sbin/pkg_info").args(["-L", pkg]))
            }
            PlatformProbe::Homebrew => {
                runner.query(&c_locale("brew").args(["ls", "--verbose", pkg]))
            }
            PlatformProbe::Msys2 { .. } => {
                runner.query(&ToolCommand::new("pacman").args(["-Ql", pkg]))
            }
            PlatformProbe::Vcpkg { installed } => return vcpkg_pc_files(installed, pkg),
            PlatformProbe::Generic => None,
        };

        let Some(listing) = listing else {
            return Vec::new();
        };
        listing
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                // pacman prefixes every path with the package name
                let path = match self {
                    PlatformProbe::Arch | PlatformProbe::Msys2 { .. } => line.split_once(' ')?.1,
                    _ => line,
                };
                path.ends_with(".pc").then(|| self.native_path(path))
            })
            .collect()
    }

    fn native_path(&self, path: &str) -> PathBuf {
        match self {
            PlatformProbe::Msys2 { .. } => {
                msys2_to_windows_path(path).unwrap_or_else(|| PathBuf::from(path))
            }
            _ => PathBuf::from(path),
        }
    }

    /// Directories searched by the shared/static library fallback.
    pub fn lib_dirs(&self, sysroot: &Path, machine: Option<&str>) -> Vec<PathBuf> {
        let unix = |paths: &[&str]| -> Vec<PathBuf> {
            paths.iter().map(|p| sys_join(sysroot, p)).collect()
        };
        match self {
            PlatformProbe::Arch => unix(&["/usr/lib"]),
            PlatformProbe::Debian => {
                let mut dirs = unix(&["/usr/lib", "/usr/lib/x86_64-linux-gnu", "/usr/local/lib"]);
                if let Some(machine) = machine {
                    dirs.push(sys_join(sysroot, &format!("/usr/lib/{}", machine)));
                }
                dirs
            }
            PlatformProbe::FreeBsd | PlatformProbe::OpenBsd => unix(&["/usr/local/lib"]),
            PlatformProbe::Homebrew => unix(&["/usr/local/lib", "/opt/homebrew/lib", "/usr/lib"]),
            PlatformProbe::Msys2 { prefix } => vec![prefix.join("lib")],
            PlatformProbe::Vcpkg { installed } => vec![installed.join("lib")],
            PlatformProbe::Generic => unix(&[
                "/usr/lib",
                "/usr/lib/x86_64-linux-gnu",
                "/usr/local/lib",
                "/usr/pkg/lib",
            ]),
        }
    }

    /// pkg-config must be pointed at the `.pc` file's own directory.
    pub fn pc_needs_own_dir(&self) -> bool {
        matches!(self, PlatformProbe::Homebrew | PlatformProbe::Vcpkg { .. })
    }

    /// Libraries follow Windows naming (`.a`, `.dll.a`, `.lib`).
    pub fn windows_style_libs(&self) -> bool {
        matches!(self, PlatformProbe::Msys2 { .. } | PlatformProbe::Vcpkg { .. })
    }

    /// Include roots owned by the package manager itself.
    fn include_roots(&self) -> Vec<PathBuf> {
        match self {
            PlatformProbe::Msys2 { prefix } => vec![prefix.join("include")],
            PlatformProbe::Vcpkg { installed } => vec![installed.join("include")],
            _ => Vec::new(),
        }
    }
}

/// Everything about the build machine that resolution depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemContext {
    pub os: HostOs,
    pub probe: PlatformProbe,
    /// Prefix applied to every well-known absolute system path. `/` on a real host.
    pub sysroot: PathBuf,
}

impl SystemContext {
    pub fn detect(runner: &dyn ToolRunner) -> Self {
        let os = HostOs::current();
        let sysroot = PathBuf::from("/");
        let probe = PlatformProbe::detect(os, runner, &sysroot);
        Self { os, probe, sysroot }
    }

    pub fn new(os: HostOs, probe: PlatformProbe, sysroot: impl Into<PathBuf>) -> Self {
        Self {
            os,
            probe,
            sysroot: sysroot.into(),
        }
    }

    /// Map a logical absolute path (`/usr/include`) onto the sysroot.
    pub fn sys_path(&self, path: &str) -> PathBuf {
        sys_join(&self.sysroot, path)
    }

    /// Target triple reported by the compiler, e.g. `x86_64-linux-gnu`.
    pub fn machine(&self, runner: &dyn ToolRunner, compiler: Option<&str>) -> Option<String> {
        let compiler = compiler?;
        runner
            .query(&ToolCommand::new(compiler).arg("-dumpmachine"))
            .filter(|m| !m.is_empty())
    }

    /// Existing system include directories in lookup order.
    pub fn system_include_dirs(&self, machine: Option<&str>) -> Vec<PathBuf> {
        let mut dirs = self.probe.include_roots();
        let mut push = |p: PathBuf| {
            if p.exists() && !dirs.contains(&p) {
                dirs.push(p);
            }
        };
        push(self.sys_path("/usr/include"));
        if let Some(machine) = machine {
            push(self.sys_path(&format!("/usr/include/{}", machine)));
        }
        push(self.sys_path("/usr/local/include"));
        push(self.sys_path("/usr/pkg/include"));
        dirs.retain(|d| d.exists());
        dirs
    }
}

fn sys_join(sysroot: &Path, path: &str) -> PathBuf {
    if sysroot == Path::new("/") {
        PathBuf::from(path)
    } else {
        sysroot.join(path.trim_start_matches('/'))
    }
}

fn c_locale(program: &str) -> ToolCommand {
    ToolCommand::new(program).env("LC_ALL", "C")
}

/// Homebrew package name from a header path inside (or symlinked into) the Cellar.
fn brew_package_from_path(header_path: &Path) -> Option<String> {
    let real = fs::canonicalize(header_path).unwrap_or_else(|_| header_path.to_path_buf());
    let real = real.to_string_lossy();
    for cellar in ["/usr/local/Cellar/", "/opt/homebrew/Cellar/"] {
        if let Some(rest) = real.strip_prefix(cellar)
            && rest.matches('/').count() > 1
        {
            return rest.split('/').next().map(str::to_string);
        }
    }
    let original = header_path.to_string_lossy();
    for include in ["/usr/local/include/", "/opt/homebrew/include/"] {
        if let Some(rest) = original.strip_prefix(include) {
            return rest.split('/').next().map(str::to_string);
        }
    }
    None
}

/// First path component below `<installed>/include`, lowercased.
fn vcpkg_guess_package(header_path: &Path, installed: &Path) -> Option<String> {
    let rel = header_path.strip_prefix(installed.join("include")).ok()?;
    let first = rel.components().next()?.as_os_str().to_string_lossy().to_lowercase();
    let stem = first.rsplit_once('.').map(|(s, _)| s.to_string());
    // A header sitting directly in include/ names its package by its stem
    if rel.components().count() == 1 {
        return stem.or(Some(first));
    }
    Some(first)
}

fn vcpkg_pc_files(installed: &Path, pkg: &str) -> Vec<PathBuf> {
    let pkgconfig = installed.join("lib").join("pkgconfig");
    let exact = pkgconfig.join(format!("{}.pc", pkg));
    if exact.exists() {
        return vec![exact];
    }
    let Ok(entries) = fs::read_dir(&pkgconfig) else {
        return Vec::new();
    };
    let mut matches: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.extension().is_some_and(|e| e == "pc")
                && p.file_stem()
                    .is_some_and(|s| s.to_string_lossy().eq_ignore_ascii_case(pkg))
        })
        .collect();
    matches.sort();
    matches.truncate(1);
    matches
}

const MSYS2_ROOTS: [&str; 3] = ["C:/msys64", "C:/msys2", "D:/msys64"];

/// `C:\msys64\mingw64\include\SDL2` → `/mingw64/include/SDL2`
pub fn windows_to_msys2_path(win_path: &str) -> String {
    let slashed = win_path.replace('\\', "/");
    for root in MSYS2_ROOTS {
        if slashed.to_lowercase().starts_with(&root.to_lowercase()) {
            return slashed[root.len()..].to_string();
        }
    }
    slashed
}

/// `/mingw64/lib/pkgconfig/x.pc` → the existing Windows path, if any.
pub fn msys2_to_windows_path(msys_path: &str) -> Option<PathBuf> {
    if !msys_path.starts_with('/') {
        return Some(PathBuf::from(msys_path));
    }
    let rel = msys_path.trim_start_matches('/');
    for root in MSYS2_ROOTS {
        let candidate = Path::new(root).join(rel);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    if let Ok(prefix) = std::env::var("MSYSTEM_PREFIX") {
        let base = Path::new(&prefix).parent()?.parent()?;
        let candidate = base.join(rel);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolOutput;
    use std::io;
    use std::sync::Mutex;

    /// Answers every command with a fixed stdout and records the invocations.
    struct Canned {
        stdout: String,
        calls: Mutex<Vec<ToolCommand>>,
    }

    impl Canned {
        fn new(stdout: &str) -> Self {
            Self {
                stdout: stdout.into(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ToolRunner for Canned {
        fn run(&self, cmd: &ToolCommand) -> io::Result<ToolOutput> {
            self.calls.lock().unwrap().push(cmd.clone());
            Ok(ToolOutput {
                success: true,
                stdout: self.stdout.clone(),
                stderr: String::new(),
            })
        }

        fn which(&self, _name: &str) -> Option<PathBuf> {
            None
        }
    }

    #[test]
    fn test_host_os_conventions() {
        assert_eq!(HostOs::Linux.c_define(), "-D_GNU_SOURCE");
        assert_eq!(HostOs::OpenBsd.c_define(), "-D_BSD_SOURCE");
        assert_eq!(HostOs::Darwin.c_define(), "-D_XOPEN_SOURCE=700");
        assert_eq!(HostOs::Darwin.as_needed_flag(), None);
        assert_eq!(HostOs::Solaris.as_needed_flag(), Some("-Wl,-zignore"));
        assert_eq!(HostOs::NetBsd.extra_lib_paths(), &["-L/usr/pkg/lib"]);
        assert_eq!(HostOs::from_name("illumos"), HostOs::Solaris);
        assert_eq!(HostOs::from_name("macos"), HostOs::Darwin);
    }

    #[test]
    fn test_detect_from_sysroot() {
        let root = tempfile::tempdir().unwrap();
        let runner = Canned::new("");
        assert_eq!(
            PlatformProbe::detect(HostOs::Linux, &runner, root.path()),
            PlatformProbe::Generic
        );
        fs::create_dir_all(root.path().join("usr/bin")).unwrap();
        fs::write(root.path().join("usr/bin/dpkg-query"), "").unwrap();
        assert_eq!(
            PlatformProbe::detect(HostOs::Linux, &runner, root.path()),
            PlatformProbe::Debian
        );
        fs::write(root.path().join("usr/bin/pacman"), "").unwrap();
        assert_eq!(
            PlatformProbe::detect(HostOs::Linux, &runner, root.path()),
            PlatformProbe::Arch
        );
    }

    #[test]
    fn test_arch_owner_parsing() {
        let runner = Canned::new("/usr/include/SDL2/SDL.h is owned by sdl2 2.28.5-1\n");
        let owner = PlatformProbe::Arch.owner_of(&runner, Path::new("/usr/include/SDL2/SDL.h"));
        assert_eq!(owner.as_deref(), Some("sdl2"));
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].args, vec!["-Qo", "--", "/usr/include/SDL2/SDL.h"]);
        assert!(calls[0].env.contains(&("LC_ALL".into(), "C".into())));
    }

    #[test]
    fn test_debian_owner_parsing() {
        let runner = Canned::new("libsdl2-dev:amd64: /usr/include/SDL2/SDL.h\n");
        let owner = PlatformProbe::Debian.owner_of(&runner, Path::new("/usr/include/SDL2/SDL.h"));
        assert_eq!(owner.as_deref(), Some("libsdl2-dev"));
    }

    #[test]
    fn test_openbsd_owner_parsing() {
        let runner = Canned::new("/usr/local/include/SDL2/SDL.h: sdl2-2.0.20p0\n");
        let owner =
            PlatformProbe::OpenBsd.owner_of(&runner, Path::new("/usr/local/include/SDL2/SDL.h"));
        assert_eq!(owner.as_deref(), Some("sdl2"));
    }

    #[test]
    fn test_pacman_pc_listing() {
        let runner = Canned::new(
            "sdl2 /usr/include/SDL2/SDL.h\nsdl2 /usr/lib/pkgconfig/sdl2.pc\nsdl2 /usr/lib/libSDL2.so\n",
        );
        let files = PlatformProbe::Arch.list_pc_files(&runner, "sdl2");
        assert_eq!(files, vec![PathBuf::from("/usr/lib/pkgconfig/sdl2.pc")]);
    }

    #[test]
    fn test_dpkg_pc_listing() {
        let runner = Canned::new("/usr/lib/x86_64-linux-gnu/pkgconfig/gl.pc\n/usr/share/doc\n");
        let files = PlatformProbe::Debian.list_pc_files(&runner, "libgl-dev");
        assert_eq!(
            files,
            vec![PathBuf::from("/usr/lib/x86_64-linux-gnu/pkgconfig/gl.pc")]
        );
    }

    #[test]
    fn test_generic_has_no_owner() {
        let runner = Canned::new("anything");
        assert!(PlatformProbe::Generic
            .owner_of(&runner, Path::new("/usr/include/x.h"))
            .is_none());
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_brew_package_from_include_path() {
        assert_eq!(
            brew_package_from_path(Path::new("/opt/homebrew/include/SDL2/SDL.h")).as_deref(),
            Some("SDL2")
        );
    }

    #[test]
    fn test_vcpkg_guess_and_pc_lookup() {
        let root = tempfile::tempdir().unwrap();
        let installed = root.path().join("installed/x64-windows");
        fs::create_dir_all(installed.join("include/SDL2")).unwrap();
        fs::create_dir_all(installed.join("lib/pkgconfig")).unwrap();
        fs::write(installed.join("lib/pkgconfig/SDL2.pc"), "").unwrap();
        let header = installed.join("include/SDL2/SDL.h");

        let guess = vcpkg_guess_package(&header, &installed);
        assert_eq!(guess.as_deref(), Some("sdl2"));
        let files = vcpkg_pc_files(&installed, "sdl2");
        assert_eq!(files, vec![installed.join("lib/pkgconfig/SDL2.pc")]);
    }

    #[test]
    fn test_msys2_path_conversion() {
        assert_eq!(
            windows_to_msys2_path("C:\\msys64\\mingw64\\include\\SDL2\\SDL.h"),
            "/mingw64/include/SDL2/SDL.h"
        );
        assert_eq!(windows_to_msys2_path("/already/unix"), "/already/unix");
    }

    #[test]
    fn test_debian_lib_dirs_include_machine() {
        let dirs = PlatformProbe::Debian.lib_dirs(Path::new("/"), Some("aarch64-linux-gnu"));
        assert_eq!(dirs.last(), Some(&PathBuf::from("/usr/lib/aarch64-linux-gnu")));
    }

    #[test]
    fn test_system_include_dirs_exist_only() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("usr/include/x86_64-linux-gnu")).unwrap();
        let sys = SystemContext::new(HostOs::Linux, PlatformProbe::Generic, root.path());
        let dirs = sys.system_include_dirs(Some("x86_64-linux-gnu"));
        assert_eq!(
            dirs,
            vec![
                root.path().join("usr/include"),
                root.path().join("usr/include/x86_64-linux-gnu")
            ]
        );
    }
}

//! Post-failure advice for headers that are not installed at all.

use super::resolve::SKIP_PACKAGES;
use crate::error::BuildError;
use crate::platform::{HostOs, PlatformProbe, SystemContext};
use crate::tools::{ToolCommand, ToolRunner};
use std::path::PathBuf;

/// First header that is absent from every system include directory and that
/// the package manager's file search can attribute to an installable package.
pub fn recommend_package(
    runner: &dyn ToolRunner,
    sys: &SystemContext,
    include_dirs: &[PathBuf],
    headers: &[String],
) -> Option<BuildError> {
    for header in headers {
        if include_dirs.iter().any(|dir| dir.join(header).exists()) {
            continue;
        }
        let found = match sys.probe {
            PlatformProbe::Arch => pkgfile_search(runner, header),
            PlatformProbe::Debian => apt_file_search(runner, header),
            _ => None,
        };
        if let Some((package, install_command)) = found {
            return Some(BuildError::MissingPackage {
                header: header.clone(),
                package,
                install_command,
            });
        }
    }
    None
}

fn pkgfile_search(runner: &dyn ToolRunner, header: &str) -> Option<(String, String)> {
    let pkgfile = runner.which("pkgfile")?;
    let out = runner.query(&ToolCommand::new(pkgfile).env("LC_ALL", "C").arg(header))?;
    out.lines()
        .map(|line| {
            // "extra/sdl2" → "sdl2"
            line.split_once('/').map_or(line, |(_, pkg)| pkg).trim()
        })
        .find(|pkg| !pkg.is_empty() && !SKIP_PACKAGES.contains(pkg))
        .map(|pkg| (pkg.to_string(), format!("pacman -S {}", pkg)))
}

fn apt_file_search(runner: &dyn ToolRunner, header: &str) -> Option<(String, String)> {
    let apt_file = runner.which("apt-file")?;
    let out = runner.query(
        &ToolCommand::new(apt_file)
            .env("LC_ALL", "C")
            .args(["find", "-Fl", header]),
    )?;
    let pkg = out.lines().next()?.trim();
    if pkg.is_empty() || SKIP_PACKAGES.contains(&pkg) {
        return None;
    }
    Some((pkg.to_string(), format!("apt install {}", pkg)))
}

/// macOS keeps GL headers under framework-specific names.
pub fn platform_hints(os: HostOs, headers: &[String]) -> Vec<String> {
    if os != HostOs::Darwin {
        return Vec::new();
    }
    headers
        .iter()
        .filter_map(|header| {
            let (mac, other) = match header.as_str() {
                "GL/glut.h" => ("GLUT/glut.h", "GL/glut.h"),
                "GL/gl.h" => ("OpenGL/gl.h", "GL/gl.h"),
                _ => return None,
            };
            Some(format!(
                "On macOS, include {mac} instead of {other}.\n\n\
                 Suggested code:\n\n    \
                 #ifdef __APPLE__\n    \
                 #include <{mac}>\n    \
                 #else\n    \
                 #include <{other}>\n    \
                 #endif"
            ))
        })
        .collect()
}

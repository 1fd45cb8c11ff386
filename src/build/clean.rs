//! Build artifact cleanup.
//!
//! `zb clean` removes what a build leaves behind in the source tree: object
//! and dependency files, profiling data, the executable and test executables.

use crate::error::Result;
use crate::platform::HostOs;
use crate::scanner::{SourceScanner, executable_name};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const OBJECT_DIRS: [&str; 4] = [".", "common", "include", "src"];
const OBJECT_EXTS: [&str; 2] = ["o", "d"];
const PROFILE_EXTS: [&str; 3] = ["profraw", "gcda", "gcno"];

fn files_with_ext(dir: &Path, exts: &[&str]) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| exts.contains(&e))
        })
        .collect();
    files.sort();
    files
}

/// Every artifact `clean` would delete, relative paths joined onto `root`.
pub fn artifacts(root: &Path, os: HostOs) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in OBJECT_DIRS {
        found.extend(files_with_ext(&root.join(dir), &OBJECT_EXTS));
    }
    found.extend(files_with_ext(root, &PROFILE_EXTS));

    let mut names = vec![executable_name(root)];
    names.extend(
        SourceScanner::new(root, os)
            .test_sources()
            .iter()
            .filter_map(|t| t.file_stem().map(|s| s.to_string_lossy().to_string())),
    );
    for name in names {
        for candidate in [root.join(&name), root.join(format!("{}.exe", name))] {
            if candidate.is_file() && !found.contains(&candidate) {
                found.push(candidate);
            }
        }
    }
    found
}

/// Remove build artifacts from `root`. Returns how many files were deleted.
pub fn clean(root: &Path, os: HostOs) -> Result<usize> {
    let targets = artifacts(root, os);
    for path in &targets {
        debug!(file = %path.display(), "removing");
        fs::remove_file(path)?;
    }

    if targets.is_empty() {
        println!("{} Nothing to clean", "!".yellow());
    } else {
        println!("{} Clean complete ({} files).", "✓".green(), targets.len());
    }
    Ok(targets.len())
}

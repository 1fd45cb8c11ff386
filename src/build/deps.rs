//! Staleness checks against `.o` and `.d` files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Object file for a source: same stem, `.o`, next to the source.
pub fn object_path(src: &Path) -> PathBuf {
    src.with_extension("o")
}

/// Dependency file written by `-MMD` next to the object.
pub fn dep_file_path(obj: &Path) -> PathBuf {
    obj.with_extension("d")
}

/// Prerequisites listed in a make-syntax `.d` file.
pub fn parse_dep_file(content: &str) -> Vec<String> {
    let flat = content.replace("\\\r\n", " ").replace("\\\n", " ");
    match flat.split_once(':') {
        Some((_, deps)) => deps.split_whitespace().map(str::to_string).collect(),
        None => Vec::new(),
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).ok()?.modified().ok()
}

/// Whether `src` (relative to `root`) must be compiled again.
///
/// True when the object is missing, the source is newer than it, or any
/// header listed in the object's `.d` file is newer than it.
pub fn needs_recompile(root: &Path, src: &Path) -> bool {
    let obj = root.join(object_path(src));
    let Some(obj_time) = mtime(&obj) else {
        debug!(source = %src.display(), "no object file");
        return true;
    };

    match mtime(&root.join(src)) {
        Some(src_time) if src_time > obj_time => {
            debug!(source = %src.display(), "source newer than object");
            return true;
        }
        None => return true,
        _ => {}
    }

    let Ok(content) = fs::read_to_string(dep_file_path(&obj)) else {
        return false;
    };
    for dep in parse_dep_file(&content) {
        // Headers that vanished are left for the compiler to report.
        if let Some(dep_time) = mtime(&root.join(&dep))
            && dep_time > obj_time
        {
            debug!(source = %src.display(), header = dep, "header newer than object");
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn touch(path: &Path, t: SystemTime) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        if !path.exists() {
            fs::write(path, "").unwrap();
        }
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(t)
            .unwrap();
    }

    #[test]
    fn test_parse_dep_file_joins_continuations() {
        let d = "main.o: main.cpp include/a.h \\\n include/b.h\\\r\n  c.h\n";
        assert_eq!(
            parse_dep_file(d),
            vec!["main.cpp", "include/a.h", "include/b.h", "c.h"]
        );
        assert!(parse_dep_file("garbage without colon").is_empty());
    }

    #[test]
    fn test_paths() {
        assert_eq!(object_path(Path::new("src/foo.cpp")), PathBuf::from("src/foo.o"));
        assert_eq!(dep_file_path(Path::new("foo.o")), PathBuf::from("foo.d"));
    }

    #[test]
    fn test_staleness_rules() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let base = SystemTime::now() - Duration::from_secs(1000);
        let src = Path::new("a.cpp");

        touch(&root.join("a.cpp"), base);
        assert!(needs_recompile(root, src), "missing object");

        touch(&root.join("a.o"), base + Duration::from_secs(10));
        assert!(!needs_recompile(root, src));

        fs::write(root.join("a.d"), "a.o: a.cpp inc/a.h gone.h\n").unwrap();
        touch(&root.join("inc/a.h"), base + Duration::from_secs(5));
        assert!(!needs_recompile(root, src), "older header and missing header");

        touch(&root.join("inc/a.h"), base + Duration::from_secs(20));
        assert!(needs_recompile(root, src), "newer header");

        touch(&root.join("inc/a.h"), base);
        touch(&root.join("a.cpp"), base + Duration::from_secs(30));
        assert!(needs_recompile(root, src), "newer source");
    }

    #[test]
    fn test_equal_mtime_is_not_stale() {
        let dir = tempfile::tempdir().unwrap();
        let t = SystemTime::now() - Duration::from_secs(100);
        touch(&dir.path().join("b.c"), t);
        touch(&dir.path().join("b.o"), t);
        assert!(!needs_recompile(dir.path(), Path::new("b.c")));
    }
}

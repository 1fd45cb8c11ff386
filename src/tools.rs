//! External tool invocation.
//!
//! Every compiler, preprocessor, pkg-config and package-manager call goes
//! through [`ToolRunner`]. The real implementation is [`SystemRunner`]; tests
//! substitute recording fakes so the engine can be exercised without any of
//! those tools installed.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A fully described child-process invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
    pub cwd: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Shell-style rendering used for echoing build steps.
    pub fn display_line(&self) -> String {
        let mut line = self.program.to_string_lossy().to_string();
        for arg in compact_args(&self.args) {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Trimmed stdout when the command succeeded.
    pub fn stdout_if_ok(&self) -> Option<&str> {
        if self.success {
            Some(self.stdout.trim())
        } else {
            None
        }
    }

    /// stdout followed by stderr, the way a terminal would have shown them.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !out.is_empty() && !self.stderr.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }
}

/// Synchronous process execution plus executable lookup.
pub trait ToolRunner: Send + Sync {
    /// Run to completion and capture output. `Err` means the program could not
    /// be started at all.
    fn run(&self, cmd: &ToolCommand) -> io::Result<ToolOutput>;

    /// Resolve a program name against `PATH`.
    fn which(&self, name: &str) -> Option<PathBuf>;

    /// Convenience: run and return trimmed stdout on success, `None` on any failure.
    fn query(&self, cmd: &ToolCommand) -> Option<String> {
        self.run(cmd)
            .ok()
            .and_then(|out| out.stdout_if_ok().map(str::to_string))
    }
}

/// Runs real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, cmd: &ToolCommand) -> io::Result<ToolOutput> {
        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        for (key, value) in &cmd.env {
            command.env(key, value);
        }
        if let Some(dir) = &cmd.cwd {
            command.current_dir(dir);
        }
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        command.stdin(if cmd.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = command.spawn()?;
        if let Some(input) = &cmd.stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            // A tool that exits early closes the pipe; its exit status tells the rest.
            let _ = pipe.write_all(input.as_bytes());
        }
        let output = child.wait_with_output()?;

        Ok(ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn which(&self, name: &str) -> Option<PathBuf> {
        find_in_path(name, std::env::var_os("PATH").as_deref())
    }
}

/// Look `name` up in a `PATH`-style list. Names containing a separator are
/// checked directly.
pub fn find_in_path(name: &str, path_var: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = path_var?;
    for dir in std::env::split_paths(path_var) {
        let full = dir.join(name);
        if is_executable(&full) {
            return Some(full);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{}.exe", name));
            if is_executable(&exe) {
                return Some(exe);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Shorten long argument lists for display.
pub fn compact_args(args: &[String]) -> Vec<String> {
    if args.len() <= 20 {
        return args.to_vec();
    }
    let mut result = Vec::with_capacity(16);
    result.extend_from_slice(&args[..10]);
    result.push("...".to_string());
    result.extend_from_slice(&args[args.len() - 5..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_args_short_list_untouched() {
        let args: Vec<String> = (0..5).map(|i| i.to_string()).collect();
        assert_eq!(compact_args(&args), args);
    }

    #[test]
    fn test_compact_args_long_list() {
        let args: Vec<String> = (0..30).map(|i| i.to_string()).collect();
        let compact = compact_args(&args);
        assert_eq!(compact.len(), 16);
        assert_eq!(compact[10], "...");
        assert_eq!(compact[11], "25");
        assert_eq!(compact[15], "29");
    }

    #[test]
    fn test_find_in_path_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_in_path("definitely-not-here", Some(dir.path().as_os_str())).is_none());
        assert!(find_in_path("anything", None).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_in_path_requires_exec_bit() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("mytool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        assert!(find_in_path("mytool", Some(dir.path().as_os_str())).is_none());

        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(
            find_in_path("mytool", Some(dir.path().as_os_str())),
            Some(tool)
        );
    }

    #[test]
    fn test_tool_output_combined() {
        let out = ToolOutput {
            success: false,
            stdout: "a".into(),
            stderr: "b\n".into(),
        };
        assert_eq!(out.combined(), "a\nb\n");
        assert!(out.stdout_if_ok().is_none());
    }
}

use super::deps::{needs_recompile, object_path};
use super::feedback::FeedbackAnalyzer;
use crate::assemble::{BuildFlags, FlagAssembler};
use crate::config::{BuildOptions, EnvOverrides};
use crate::error::{BuildError, Result};
use crate::includes::IncludeResolver;
use crate::packages::PackageMapper;
use crate::packages::advisory::{platform_hints, recommend_package};
use crate::platform::SystemContext;
use crate::scanner::{self, Project};
use crate::tools::{ToolCommand, ToolOutput, ToolRunner};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::Instant;
use tracing::debug;

/// What a build run ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Only library or test sources exist.
    NothingToBuild,
    /// Every object and the executable were current; nothing was written.
    UpToDate { executable: PathBuf },
    /// `compiled` translation units were compiled and the executable linked.
    Built { executable: PathBuf, compiled: usize },
}

impl BuildOutcome {
    pub fn executable(&self) -> Option<&Path> {
        match self {
            BuildOutcome::NothingToBuild => None,
            BuildOutcome::UpToDate { executable } | BuildOutcome::Built { executable, .. } => {
                Some(executable.as_path())
            }
        }
    }
}

/// Drives detection, flag assembly and compilation for one project directory.
///
/// Paths handed around are relative to the project root and every tool runs
/// with the root as its working directory.
pub struct Builder<'a> {
    root: PathBuf,
    runner: &'a dyn ToolRunner,
    sys: &'a SystemContext,
    env: &'a EnvOverrides,
    progress: bool,
}

impl<'a> Builder<'a> {
    pub fn new(
        root: impl Into<PathBuf>,
        runner: &'a dyn ToolRunner,
        sys: &'a SystemContext,
        env: &'a EnvOverrides,
    ) -> Self {
        Self {
            root: root.into(),
            runner,
            sys,
            env,
            progress: true,
        }
    }

    /// Show or hide the compile progress bar.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn system(&self) -> &SystemContext {
        self.sys
    }

    pub fn detect(&self) -> Project {
        let resolver = IncludeResolver::new(self.runner, self.sys.os);
        scanner::detect_project(&self.root, self.sys.os, &resolver)
    }

    pub fn flags(&self, project: &Project, opts: &BuildOptions) -> Result<BuildFlags> {
        let mapper = PackageMapper::new(self.runner, self.sys);
        FlagAssembler::new(self.runner, self.sys, self.env).assemble(&self.root, project, opts, &mapper)
    }

    /// Executable file name, relative to the root.
    pub fn executable_name(&self, win64: bool) -> PathBuf {
        let name = scanner::executable_name(&self.root);
        if win64 {
            PathBuf::from(format!("{}.exe", name))
        } else {
            PathBuf::from(name)
        }
    }

    pub fn build(&self, opts: &BuildOptions) -> Result<BuildOutcome> {
        let project = self.detect();
        self.build_project(&project, opts)
    }

    pub fn build_project(&self, project: &Project, opts: &BuildOptions) -> Result<BuildOutcome> {
        if project.main_source.is_none() {
            if project.has_any_sources() {
                println!("{} Nothing to build", "!".yellow());
                return Ok(BuildOutcome::NothingToBuild);
            }
            return Err(BuildError::NoMainSource);
        }

        let start_time = Instant::now();
        let flags = self.flags(project, opts)?;
        let exe = self.executable_name(flags.win64);
        let outcome = self
            .compile_and_link(&flags, &project.build_sources(), &exe)
            .map_err(|err| self.advise(project, &flags, err))?;

        match &outcome {
            BuildOutcome::UpToDate { .. } => println!("{} Up to date", "⚡".green()),
            BuildOutcome::Built { executable, .. } => println!(
                "{} Built {} in {:.2?}",
                "✓".green(),
                executable.display(),
                start_time.elapsed()
            ),
            BuildOutcome::NothingToBuild => {}
        }
        Ok(outcome)
    }

    /// Remove every artifact, then build from scratch.
    pub fn rebuild(&self, opts: &BuildOptions) -> Result<BuildOutcome> {
        super::clean(&self.root, self.sys.os)?;
        self.build(opts)
    }

    /// Build, then run the executable from the project root.
    pub fn run(&self, opts: &BuildOptions, args: &[String]) -> Result<Option<ExitStatus>> {
        let outcome = self.build(opts)?;
        let Some(exe) = outcome.executable() else {
            return Ok(None);
        };
        println!("{} Running...\n", "▶".green());
        let status = Command::new(self.root.join(exe))
            .args(args)
            .current_dir(&self.root)
            .status()?;
        Ok(Some(status))
    }

    /// Compile `sources` into `exe`.
    ///
    /// A single source is compiled and linked in one invocation. Otherwise
    /// each stale source is compiled to its `.o`, in order, stopping at the
    /// first failure, and the executable is relinked from all objects when
    /// anything was compiled or it does not exist yet.
    pub fn compile_and_link(
        &self,
        flags: &BuildFlags,
        sources: &[PathBuf],
        exe: &Path,
    ) -> Result<BuildOutcome> {
        if let [single] = sources {
            let cmd = self
                .compiler(flags)
                .args(compile_prefix(flags, false))
                .arg("-o")
                .arg(exe.to_string_lossy())
                .arg(single.to_string_lossy())
                .args(flags.link_flags.iter().cloned());
            let out = self.execute(&cmd, None)?;
            if !out.success {
                report_failure(&format!("Error compiling {}", single.display()), &out, None);
                return Err(BuildError::CompileFailure {
                    file: single.clone(),
                    output: out.combined(),
                });
            }
            return Ok(BuildOutcome::Built {
                executable: exe.to_path_buf(),
                compiled: 1,
            });
        }

        let stale: Vec<&PathBuf> = sources
            .iter()
            .filter(|src| needs_recompile(&self.root, src))
            .collect();
        debug!(stale = stale.len(), total = sources.len(), "incremental plan");

        let pb = self.progress_bar(stale.len());
        for src in &stale {
            let obj = object_path(src);
            pb.set_message(format!("{}", src.display()));
            let cmd = self
                .compiler(flags)
                .args(compile_prefix(flags, true))
                .arg("-c")
                .arg("-o")
                .arg(obj.to_string_lossy())
                .arg(src.to_string_lossy());
            let out = self.execute(&cmd, Some(&pb))?;
            if !out.success {
                pb.abandon();
                report_failure(&format!("Error compiling {}", src.display()), &out, None);
                return Err(BuildError::CompileFailure {
                    file: (*src).clone(),
                    output: out.combined(),
                });
            }
            if !out.stderr.trim().is_empty() {
                emit(
                    Some(&pb),
                    format!("{} Warning in {}:\n{}", "!".yellow(), src.display(), out.stderr.trim_end()),
                );
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        if stale.is_empty() && self.root.join(exe).exists() {
            return Ok(BuildOutcome::UpToDate {
                executable: exe.to_path_buf(),
            });
        }

        let cmd = self
            .compiler(flags)
            .arg("-o")
            .arg(exe.to_string_lossy())
            .args(sources.iter().map(|s| object_path(s).to_string_lossy().to_string()))
            .args(flags.link_flags.iter().cloned());
        let out = self.execute(&cmd, None)?;
        if !out.success {
            let hint = FeedbackAnalyzer::analyze(&out.combined());
            report_failure("Linking failed", &out, hint.as_deref());
            return Err(BuildError::LinkFailure {
                output: out.combined(),
            });
        }

        Ok(BuildOutcome::Built {
            executable: exe.to_path_buf(),
            compiled: stale.len(),
        })
    }

    /// Hints for a failed compile; a header that is not installed at all but
    /// that a package search can name turns into [`BuildError::MissingPackage`].
    pub(super) fn advise(&self, project: &Project, flags: &BuildFlags, err: BuildError) -> BuildError {
        if !matches!(err, BuildError::CompileFailure { .. }) {
            return err;
        }
        if let Some(hint) = err.tool_output().and_then(FeedbackAnalyzer::analyze) {
            println!("{} {}", "!".yellow(), hint);
        }
        for hint in platform_hints(self.sys.os, &project.includes) {
            println!("{} {}", "!".yellow(), hint);
        }
        let compiler = flags.compiler.to_string_lossy();
        let machine = self.sys.machine(self.runner, Some(compiler.as_ref()));
        let include_dirs = self.sys.system_include_dirs(machine.as_deref());
        recommend_package(self.runner, self.sys, &include_dirs, &project.includes).unwrap_or(err)
    }

    fn compiler(&self, flags: &BuildFlags) -> ToolCommand {
        ToolCommand::new(&flags.compiler).current_dir(&self.root)
    }

    /// Echo `[dir] compiler args` and run.
    fn execute(&self, cmd: &ToolCommand, pb: Option<&ProgressBar>) -> Result<ToolOutput> {
        emit(pb, format!("[{}] {}", self.dir_label(), cmd.display_line()));
        Ok(self.runner.run(cmd)?)
    }

    fn dir_label(&self) -> String {
        fs::canonicalize(&self.root)
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_else(|| self.root.display().to_string())
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.progress || len < 2 {
            return ProgressBar::hidden();
        }
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        let pb = ProgressBar::new(len as u64);
        pb.set_style(style);
        pb
    }
}

/// Print above a visible progress bar, plainly otherwise.
fn emit(pb: Option<&ProgressBar>, line: String) {
    match pb {
        Some(pb) if !pb.is_hidden() => pb.println(line),
        _ => println!("{}", line),
    }
}

/// `-std=… [-MMD] <compile flags> <defines> -I<paths>`
fn compile_prefix(flags: &BuildFlags, dep_file: bool) -> Vec<String> {
    let mut args = vec![format!("-std={}", flags.std)];
    if dep_file {
        args.push("-MMD".to_string());
    }
    args.extend(flags.compile_flags.iter().cloned());
    args.extend(flags.defines.iter().cloned());
    args.extend(flags.include_paths.iter().map(|p| format!("-I{}", p)));
    args
}

fn report_failure(title: &str, out: &ToolOutput, hint: Option<&str>) {
    println!("{} {}:\n{}", "x".red(), title, out.combined().trim_end());
    if let Some(hint) = hint {
        println!("{} {}", "!".yellow(), hint);
    }
}

//! # zerobuild CLI Entry Point
//!
//! The `zb` command. Parses arguments with clap, loads `zb.toml` and the
//! environment once, detects the host, and hands off to [`zerobuild::build`].

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use zerobuild::build::{self, Builder};
use zerobuild::config::{self, BuildOptions, EnvOverrides};
use zerobuild::platform::SystemContext;
use zerobuild::scanner;
use zerobuild::tools::SystemRunner;

#[derive(Parser)]
#[command(name = "zb")]
#[command(about = "Build C and C++ projects without a build file", version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
struct Cli {
    /// Run as if zb was started in <DIR>
    #[arg(short = 'C', value_name = "DIR", global = true)]
    dir: Option<PathBuf>,

    /// Log resolution decisions and staleness reasons
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    switches: Switches,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug, Default)]
struct Switches {
    /// Debug build with sanitizers
    #[arg(long, global = true)]
    debug: bool,
    /// Aggressive optimization with LTO
    #[arg(long, global = true)]
    opt: bool,
    /// Extra warnings
    #[arg(long, global = true)]
    strict: bool,
    /// Permissive compile, warnings off
    #[arg(long, global = true)]
    sloppy: bool,
    /// Optimize for size
    #[arg(long, global = true)]
    small: bool,
    /// Optimize for size, no stdlib
    #[arg(long, global = true)]
    tiny: bool,
    /// Prefer clang
    #[arg(long, global = true)]
    clang: bool,
    /// Cross-compile for 64-bit Windows
    #[arg(long, global = true)]
    win64: bool,
    /// Use zapcc++
    #[arg(long, global = true)]
    zap: bool,
    /// Build an instrumented binary for profile collection
    #[arg(long, global = true)]
    profile_generate: bool,
    /// Optimize with collected profiles
    #[arg(long, global = true)]
    profile_use: bool,
    /// Debug build without -fsanitize=address
    #[arg(long, global = true)]
    no_sanitizers: bool,
    /// Point data directory defines at $PREFIX/share/<name>
    #[arg(long, global = true)]
    install: bool,
}

impl Switches {
    fn to_options(&self) -> BuildOptions {
        BuildOptions {
            debug: self.debug,
            opt: self.opt,
            strict: self.strict,
            sloppy: self.sloppy,
            small: self.small,
            tiny: self.tiny,
            clang: self.clang,
            win64: self.win64,
            zap: self.zap,
            profile_generate: self.profile_generate,
            profile_use: self.profile_use,
            no_sanitizers: self.no_sanitizers,
            install_prefix: None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the project in the current directory
    Build,
    /// Clean, then build
    Rebuild,
    /// Build and run the executable
    Run {
        /// Arguments passed to the program
        #[arg(num_args = 0.., allow_hyphen_values = true, last = true)]
        args: Vec<String>,
    },
    /// Remove objects, dependency files, profiles and executables
    Clean,
    /// Build and run every test source
    Test,
    /// Print the detected project as JSON
    Detect,
    /// Print the assembled compiler flags as JSON
    Flags,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match dispatch(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "x".red(), e);
            std::process::exit(1);
        }
    }
}

fn dispatch(cli: Cli) -> Result<i32> {
    let root = match &cli.dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let root = fs::canonicalize(&root)
        .with_context(|| format!("cannot enter {}", root.display()))?;

    let runner = SystemRunner;
    let sys = SystemContext::detect(&runner);
    let env = EnvOverrides::from_env();

    let mut opts = config::load_config(&root)?
        .build
        .unwrap_or_default()
        .merged_with(&cli.switches.to_options());
    if cli.switches.install {
        let name = scanner::executable_name(&root);
        opts.install_prefix = Some(env.install_root().join("share").join(name));
    }
    tracing::debug!(os = ?sys.os, probe = ?sys.probe, ?opts, "starting");

    let builder = Builder::new(&root, &runner, &sys, &env);
    match cli.command.unwrap_or(Commands::Build) {
        Commands::Build => {
            builder.build(&opts)?;
        }
        Commands::Rebuild => {
            builder.rebuild(&opts)?;
        }
        Commands::Run { args } => {
            if let Some(status) = builder.run(&opts, &args)?
                && !status.success()
            {
                return Ok(status.code().unwrap_or(1));
            }
        }
        Commands::Clean => {
            build::clean(&root, sys.os)?;
        }
        Commands::Test => {
            build::run_tests(&builder, &opts)?;
        }
        Commands::Detect => {
            let project = builder.detect();
            println!("{}", serde_json::to_string_pretty(&project)?);
        }
        Commands::Flags => {
            let project = builder.detect();
            let flags = builder.flags(&project, &opts)?;
            println!("{}", serde_json::to_string_pretty(&flags)?);
        }
    }
    Ok(0)
}

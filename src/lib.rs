//! # zerobuild - Zero-configuration C/C++ builds
//!
//! zerobuild looks at a directory of C or C++ sources and builds it without a
//! build file: it finds the entry point, works out which external headers are
//! used, maps those headers to compiler and linker flags through pkg-config and
//! the host's package manager, and compiles incrementally.
//!
//! ## Features
//!
//! - **No build file**: `main.cpp` or the one source with `main()` is the program
//! - **Header to package mapping**: static table, pkg-config, special rules, package managers
//! - **Incremental builds**: mtime and `.d` dependency file comparison
//! - **Cross targets**: mingw win64 builds, zapcc, clang or gcc
//!
//! ## Quick Start
//!
//! ```bash
//! # Build and run the project in the current directory
//! zb run
//!
//! # Show the flags that would be used
//! zb flags --debug
//! ```
//!
//! ## Module Organization
//!
//! - [`scanner`] - Main, dependency and test source detection
//! - [`includes`] - External header discovery
//! - [`packages`] - Header to flag resolution
//! - [`assemble`] - Compiler and flag selection
//! - [`build`] - Incremental compile and link

/// Compiler and flag selection.
pub mod assemble;

/// Incremental compilation, clean and test runs.
pub mod build;

/// Build options, `zb.toml` and environment overrides.
pub mod config;

/// Error taxonomy.
pub mod error;

/// Compile/link flag lists.
pub mod flags;

/// External header discovery.
pub mod includes;

/// Header to package flag resolution.
pub mod packages;

/// Host OS and package-manager detection.
pub mod platform;

/// Source tree classification.
pub mod scanner;

/// Toolchain detection.
pub mod toolchain;

/// External process execution.
pub mod tools;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the optional per-project defaults file.
pub const CONFIG_FILE: &str = "zb.toml";

#[derive(Deserialize, Debug, Default)]
pub struct ZbConfig {
    pub build: Option<BuildOptions>,
}

/// Switches that shape the assembled flag set.
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BuildOptions {
    pub debug: bool,
    pub opt: bool,
    pub strict: bool,
    pub sloppy: bool,
    pub small: bool,
    pub tiny: bool,
    pub clang: bool,
    pub win64: bool,
    pub zap: bool,
    pub profile_generate: bool,
    pub profile_use: bool,
    pub no_sanitizers: bool,
    /// When set, directory defines point below this prefix instead of the source tree.
    pub install_prefix: Option<PathBuf>,
}

impl BuildOptions {
    /// Overlay `other` on top of `self`: switches are OR-ed, an explicit prefix wins.
    pub fn merged_with(&self, other: &BuildOptions) -> BuildOptions {
        BuildOptions {
            debug: self.debug || other.debug,
            opt: self.opt || other.opt,
            strict: self.strict || other.strict,
            sloppy: self.sloppy || other.sloppy,
            small: self.small || other.small || other.tiny,
            tiny: self.tiny || other.tiny,
            clang: self.clang || other.clang,
            win64: self.win64 || other.win64,
            zap: self.zap || other.zap,
            profile_generate: self.profile_generate || other.profile_generate,
            profile_use: self.profile_use || other.profile_use,
            no_sanitizers: self.no_sanitizers || other.no_sanitizers,
            install_prefix: other
                .install_prefix
                .clone()
                .or_else(|| self.install_prefix.clone()),
        }
    }
}

/// Load `zb.toml` from the project root. A missing file yields defaults.
pub fn load_config(root: &Path) -> Result<ZbConfig> {
    let path = root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(ZbConfig::default());
    }
    let config_str = fs::read_to_string(&path)?;
    let config: ZbConfig = toml::from_str(&config_str)?;
    Ok(config)
}

/// Snapshot of the environment variables the engine honors.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvOverrides {
    pub cc: Option<String>,
    pub cxx: Option<String>,
    pub cflags: Option<String>,
    pub cxxflags: Option<String>,
    pub ldflags: Option<String>,
    pub prefix: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            cc: var("CC"),
            cxx: var("CXX"),
            cflags: var("CFLAGS"),
            cxxflags: var("CXXFLAGS"),
            ldflags: var("LDFLAGS"),
            prefix: var("PREFIX"),
        }
    }

    /// Compiler override for the given language.
    pub fn compiler(&self, is_c: bool) -> Option<&str> {
        if is_c {
            self.cc.as_deref()
        } else {
            self.cxx.as_deref()
        }
    }

    /// User compile flags for the given language, split on whitespace.
    pub fn compile_flags(&self, is_c: bool) -> Vec<String> {
        let raw = if is_c { &self.cflags } else { &self.cxxflags };
        split_flags(raw.as_deref())
    }

    pub fn link_flags(&self) -> Vec<String> {
        split_flags(self.ldflags.as_deref())
    }

    /// Install prefix, `/usr/local` unless `PREFIX` is set.
    pub fn install_root(&self) -> PathBuf {
        PathBuf::from(self.prefix.as_deref().unwrap_or("/usr/local"))
    }
}

fn split_flags(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

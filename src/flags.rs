//! Ordered, duplicate-free compile/link flag accumulation.

use serde::Serialize;

/// Push `val` unless it is already present. Preserves first-seen order.
pub fn append_unique(list: &mut Vec<String>, val: impl Into<String>) {
    let val = val.into();
    if !list.contains(&val) {
        list.push(val);
    }
}

/// True for tokens that belong on the link line.
pub fn is_link_flag(token: &str) -> bool {
    token.starts_with("-l") || token.starts_with("-L") || token.starts_with("-Wl,")
}

/// A pair of flag lists produced by package resolution.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FlagSet {
    pub compile: Vec<String>,
    pub link: Vec<String>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.compile.is_empty() && self.link.is_empty()
    }

    /// Split a whitespace-separated flag string (pkg-config output) into
    /// compile and link flags and add each idempotently.
    pub fn merge_str(&mut self, flags: &str) {
        for token in flags.split_whitespace() {
            self.add_token(token);
        }
    }

    /// Route one token by the link-flag prefix rule.
    pub fn add_token(&mut self, token: &str) {
        if is_link_flag(token) {
            append_unique(&mut self.link, token);
        } else {
            append_unique(&mut self.compile, token);
        }
    }

    pub fn add_compile(&mut self, flag: impl Into<String>) {
        append_unique(&mut self.compile, flag);
    }

    pub fn add_link(&mut self, flag: impl Into<String>) {
        append_unique(&mut self.link, flag);
    }

    /// Add `-framework <name>` as a unit; the bare `-framework` token repeats
    /// legitimately, so it cannot go through [`append_unique`].
    pub fn add_framework(&mut self, name: &str) {
        let present = self
            .link
            .windows(2)
            .any(|w| w[0] == "-framework" && w[1] == name);
        if !present {
            self.link.push("-framework".to_string());
            self.link.push(name.to_string());
        }
    }

    /// Merge another set, keeping this set's order and skipping duplicates.
    pub fn extend(&mut self, other: &FlagSet) {
        for flag in &other.compile {
            append_unique(&mut self.compile, flag.clone());
        }
        let mut i = 0;
        while i < other.link.len() {
            if other.link[i] == "-framework" && i + 1 < other.link.len() {
                self.add_framework(&other.link[i + 1]);
                i += 2;
            } else {
                append_unique(&mut self.link, other.link[i].clone());
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_routes_by_prefix() {
        let mut set = FlagSet::new();
        set.merge_str("-I/usr/include/SDL2 -D_REENTRANT -L/usr/lib -lSDL2 -Wl,-rpath,/x -pthread");
        assert_eq!(set.compile, vec!["-I/usr/include/SDL2", "-D_REENTRANT", "-pthread"]);
        assert_eq!(set.link, vec!["-L/usr/lib", "-lSDL2", "-Wl,-rpath,/x"]);
    }

    #[test]
    fn test_merge_is_idempotent_and_ordered() {
        let mut set = FlagSet::new();
        set.merge_str("-lb -la");
        set.merge_str("-la -lc -lb");
        assert_eq!(set.link, vec!["-lb", "-la", "-lc"]);
    }

    #[test]
    fn test_frameworks_are_pairs() {
        let mut set = FlagSet::new();
        set.add_framework("OpenGL");
        set.add_framework("GLUT");
        set.add_framework("OpenGL");
        assert_eq!(set.link, vec!["-framework", "OpenGL", "-framework", "GLUT"]);
    }

    #[test]
    fn test_extend_keeps_framework_pairs() {
        let mut a = FlagSet::new();
        a.add_framework("OpenGL");
        let mut b = FlagSet::new();
        b.add_framework("OpenAL");
        b.add_framework("OpenGL");
        b.add_link("-lm");
        a.extend(&b);
        assert_eq!(
            a.link,
            vec!["-framework", "OpenGL", "-framework", "OpenAL", "-lm"]
        );
    }
}

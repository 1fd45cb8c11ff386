use colored::*;
use regex::Regex;
use std::sync::LazyLock;

static MISSING_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"fatal error: ([^:\s]+): No such file or directory").expect("valid regex")
});

/// Turns captured compiler or linker output into a short hint.
pub struct FeedbackAnalyzer;

impl FeedbackAnalyzer {
    pub fn analyze(output: &str) -> Option<String> {
        if output.contains("undefined reference to `main'")
            || output.contains("undefined reference to main")
            || output.contains("_main\", referenced from")
        {
            return Some(format!(
                "No {} function was linked in.\nzb builds an executable from the source that defines {}; add one or rename the entry file to main.cpp.",
                "main()".bold().yellow(),
                "main()".bold().yellow(),
            ));
        }

        if output.contains("undefined reference to") || output.contains("Undefined symbols") {
            return Some(format!(
                "It looks like a {} error.\nA library may be missing from the link line. Check that its pkg-config package is installed, or pass it with {}.",
                "Linker".bold().red(),
                "LDFLAGS=-l<name>".bold().green()
            ));
        }

        if let Some(caps) = MISSING_HEADER.captures(output) {
            return Some(format!(
                "It looks like a {} error: {}.\nInstall the development package that provides it, or add its directory with {}.",
                "Missing Header".bold().red(),
                caps[1].bold().yellow(),
                "CXXFLAGS=-I<dir>".bold().green()
            ));
        }

        None
    }
}

//! Raw module text and its id header.
//!
//! Module sources fetched from a running client start with a header comment
//! such as `// Webpack Module 12345 - Patched by ...`. The digits are the
//! module id that other modules pass to the require runtime.

use std::sync::OnceLock;

use regex::Regex;

/// Numeric webpack module id, kept as its decimal text.
pub type ModuleId = String;

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        Regex::new(r"^\s*//\s*Webpack Module (\d+)").expect("header pattern is valid")
    })
}

/// Returns true if `candidate` looks like a module id (one or more decimal digits).
pub fn is_module_id(candidate: &str) -> bool {
    !candidate.is_empty() && candidate.bytes().all(|b| b.is_ascii_digit())
}

/// Extract the module id from a source header, if one is present.
pub fn parse_header_id(source: &str) -> Option<ModuleId> {
    header_regex()
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// One module's source text. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleText {
    id: Option<ModuleId>,
    source: String,
}

impl ModuleText {
    /// Wrap source text, taking the id from its header comment.
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let id = parse_header_id(&source);
        Self { id, source }
    }

    /// Wrap source text whose id is known from elsewhere (e.g. the file name).
    ///
    /// A header id, when present, still takes precedence.
    pub fn with_id(id: impl Into<ModuleId>, source: impl Into<String>) -> Self {
        let source = source.into();
        let id = parse_header_id(&source).unwrap_or_else(|| id.into());
        Self {
            id: Some(id),
            source,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

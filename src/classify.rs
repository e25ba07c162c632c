//! Path → language tag, and diff record → line counts.

use crate::error::{LocError, Result};
use crate::model::{DiffBody, RawFileDiff};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::collections::HashMap;
use std::path::Path;

/// Reserved tag for paths whose language is not known.
pub const OTHER: &str = "other";

/// Built-in language for a path: known file names first, then the
/// lowercased extension.
pub fn builtin_language(path: &str) -> Option<&'static str> {
    let file_name = Path::new(path).file_name().and_then(|n| n.to_str())?;

    let by_name = match file_name {
        "Makefile" | "GNUmakefile" | "makefile" => Some("make"),
        "Dockerfile" | "Containerfile" => Some("dockerfile"),
        "CMakeLists.txt" => Some("cmake"),
        "Rakefile" | "Gemfile" => Some("ruby"),
        "Jenkinsfile" => Some("groovy"),
        "BUILD" | "BUILD.bazel" | "WORKSPACE" => Some("starlark"),
        _ => None,
    };
    if by_name.is_some() {
        return by_name;
    }

    let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
    let lang = match ext.as_str() {
        "rs" => "rust",
        "go" => "go",
        "py" | "pyi" => "python",
        "js" | "mjs" | "cjs" | "jsx" => "javascript",
        "ts" | "tsx" | "mts" | "cts" => "typescript",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "scala" => "scala",
        "groovy" | "gradle" => "groovy",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
        "cs" => "csharp",
        "m" | "mm" => "objective-c",
        "swift" => "swift",
        "rb" => "ruby",
        "php" => "php",
        "pl" | "pm" => "perl",
        "lua" => "lua",
        "dart" => "dart",
        "r" => "r",
        "jl" => "julia",
        "erl" | "hrl" => "erlang",
        "ex" | "exs" => "elixir",
        "clj" | "cljs" => "clojure",
        "el" => "emacs-lisp",
        "hs" => "haskell",
        "coffee" => "coffeescript",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" | "sass" => "scss",
        "less" => "less",
        "vue" => "vue",
        "json" => "json",
        "yml" | "yaml" => "yaml",
        "xml" => "xml",
        "toml" => "toml",
        "ini" | "conf" | "cfg" => "ini",
        "md" | "markdown" => "markdown",
        "rst" => "restructuredtext",
        "adoc" => "asciidoc",
        "tex" => "tex",
        "txt" => "text",
        "sh" | "bash" | "zsh" | "fish" => "shell",
        "bat" | "cmd" => "batch",
        "ps1" => "powershell",
        "sql" => "sql",
        "graphql" | "gql" => "graphql",
        "proto" => "protobuf",
        "cmake" => "cmake",
        _ => return None,
    };
    Some(lang)
}

#[derive(Debug, Clone)]
pub struct Classifier {
    overrides: HashMap<String, String>,
    exclude: Gitignore,
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
            exclude: Gitignore::empty(),
        }
    }

    /// Extension → tag mappings that take precedence over the built-in table.
    /// Extensions are matched without the leading dot, case-insensitively.
    pub fn with_languages<I, K, V>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (ext, tag) in languages {
            let ext = ext.as_ref().trim_start_matches('.').to_ascii_lowercase();
            self.overrides.insert(ext, tag.into());
        }
        self
    }

    /// Gitignore-style patterns for paths that never count.
    pub fn with_excludes<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new("");
        for pattern in patterns {
            builder.add_line(None, pattern.as_ref()).map_err(|e| {
                LocError::Config(format!("Invalid exclude pattern '{}': {e}", pattern.as_ref()))
            })?;
        }
        self.exclude = builder
            .build()
            .map_err(|e| LocError::Config(format!("Invalid exclude patterns: {e}")))?;
        Ok(self)
    }

    pub fn classify<'a>(&'a self, path: &str) -> &'a str {
        if !self.overrides.is_empty() {
            let ext = Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            if let Some(tag) = ext.and_then(|e| self.overrides.get(&e)) {
                return tag;
            }
        }
        builtin_language(path).unwrap_or(OTHER)
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        !path.is_empty()
            && self
                .exclude
                .matched_path_or_any_parents(path, false)
                .is_ignore()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Added and removed line counts for one file diff. Binary diffs are
/// `(0, 0)`.
pub fn extract_delta(diff: &RawFileDiff) -> (u64, u64) {
    match &diff.body {
        DiffBody::Binary => (0, 0),
        DiffBody::Counted { added, removed } => (*added, *removed),
        DiffBody::Unified(patch) => count_unified(patch),
    }
}

fn count_unified(patch: &str) -> (u64, u64) {
    if patch.lines().any(|l| l.starts_with("Binary files ") || l == "GIT binary patch") {
        return (0, 0);
    }

    let has_hunks = patch.lines().any(|l| l.starts_with("@@"));
    let mut in_hunk = !has_hunks;
    let (mut added, mut removed) = (0u64, 0u64);

    for line in patch.lines() {
        if line.starts_with("@@") {
            in_hunk = true;
            continue;
        }
        if line.starts_with("diff --git ") {
            in_hunk = false;
            continue;
        }
        if !in_hunk {
            continue;
        }
        // Without hunk headers the file headers are indistinguishable from
        // content, so they are dropped by prefix.
        if !has_hunks && (line.starts_with("+++ ") || line.starts_with("--- ")) {
            continue;
        }
        match line.as_bytes().first() {
            Some(b'+') => added += 1,
            Some(b'-') => removed += 1,
            _ => {}
        }
    }

    (added, removed)
}

//! Language detection for structural chunking.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Language with a structural chunk strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
}

impl Lang {
    pub const ALL: [Lang; 5] = [
        Lang::Rust,
        Lang::Python,
        Lang::JavaScript,
        Lang::TypeScript,
        Lang::Go,
    ];

    /// Identifier stored on chunks and used in query filters.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Go => "go",
        }
    }

    /// Detect from file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext.to_ascii_lowercase().as_str() {
            "rs" => Some(Self::Rust),
            "py" => Some(Self::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "ts" | "tsx" => Some(Self::TypeScript),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    /// Parse a language identifier, accepting common aliases.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_ascii_lowercase().as_str() {
            "rust" | "rs" => Some(Self::Rust),
            "python" | "py" => Some(Self::Python),
            "javascript" | "js" => Some(Self::JavaScript),
            "typescript" | "ts" => Some(Self::TypeScript),
            "go" | "golang" => Some(Self::Go),
            _ => None,
        }
    }

    /// Whether blocks are delimited by braces rather than indentation.
    #[must_use]
    pub fn uses_braces(self) -> bool {
        !matches!(self, Self::Python)
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Language identifier for any path. Files without a structural strategy keep
/// a descriptive identifier so they can still be filtered on; unknown
/// extensions map to `"text"`.
#[must_use]
pub fn language_id_for_path(path: &Path) -> String {
    if let Some(lang) = Lang::from_path(path) {
        return lang.id().to_string();
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let id = match ext.as_str() {
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "rb" => "ruby",
        "php" => "php",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "swift" => "swift",
        "scala" => "scala",
        "sh" | "bash" | "zsh" => "bash",
        "sql" => "sql",
        "md" | "markdown" => "markdown",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "html" | "htm" => "html",
        "css" | "scss" => "css",
        _ => "text",
    };
    id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_path_rs() {
        assert_eq!(Lang::from_path(Path::new("src/main.rs")), Some(Lang::Rust));
    }

    #[test]
    fn from_path_js_variants() {
        for ext in &["js", "jsx", "mjs", "cjs"] {
            let path = format!("file.{ext}");
            assert_eq!(
                Lang::from_path(Path::new(&path)),
                Some(Lang::JavaScript),
                "failed for .{ext}"
            );
        }
    }

    #[test]
    fn from_path_ts_variants() {
        assert_eq!(Lang::from_path(Path::new("a.ts")), Some(Lang::TypeScript));
        assert_eq!(Lang::from_path(Path::new("a.tsx")), Some(Lang::TypeScript));
    }

    #[test]
    fn from_path_unknown_returns_none() {
        assert_eq!(Lang::from_path(Path::new("file.xyz")), None);
        assert_eq!(Lang::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn from_id_accepts_aliases() {
        assert_eq!(Lang::from_id("Python"), Some(Lang::Python));
        assert_eq!(Lang::from_id("golang"), Some(Lang::Go));
        assert_eq!(Lang::from_id("java"), None);
    }

    #[test]
    fn id_roundtrip() {
        for lang in Lang::ALL {
            assert_eq!(Lang::from_id(lang.id()), Some(lang));
            assert_eq!(lang.to_string(), lang.id());
        }
    }

    #[test]
    fn language_id_for_unsupported_extension() {
        assert_eq!(language_id_for_path(Path::new("App.java")), "java");
        assert_eq!(language_id_for_path(Path::new("README.md")), "markdown");
        assert_eq!(language_id_for_path(Path::new("LICENSE")), "text");
        assert_eq!(language_id_for_path(Path::new("lib.rs")), "rust");
    }
}

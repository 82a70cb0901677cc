//! Supported languages and language detection.
//!
//! Detection is extension-first, with a shebang sniff for extensionless
//! scripts. Files whose language cannot be determined are skipped by the
//! discoverer with reason `unsupported-language`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use tree_sitter::Language;

/// Supported programming languages for parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportedLanguage {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Rust,
    Go,
    C,
    Cpp,
    CSharp,
}

impl SupportedLanguage {
    /// Get the language name as stored in the `file` relation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SupportedLanguage::Python => "python",
            SupportedLanguage::JavaScript => "javascript",
            SupportedLanguage::TypeScript => "typescript",
            SupportedLanguage::Tsx => "tsx",
            SupportedLanguage::Rust => "rust",
            SupportedLanguage::Go => "go",
            SupportedLanguage::C => "c",
            SupportedLanguage::Cpp => "cpp",
            SupportedLanguage::CSharp => "csharp",
        }
    }

    /// Get the tree-sitter Language for this language.
    pub fn tree_sitter_language(&self) -> Language {
        match self {
            SupportedLanguage::Python => tree_sitter_python::LANGUAGE.into(),
            SupportedLanguage::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            SupportedLanguage::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            SupportedLanguage::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            SupportedLanguage::Rust => tree_sitter_rust::LANGUAGE.into(),
            SupportedLanguage::Go => tree_sitter_go::LANGUAGE.into(),
            SupportedLanguage::C => tree_sitter_c::LANGUAGE.into(),
            SupportedLanguage::Cpp => tree_sitter_cpp::LANGUAGE.into(),
            SupportedLanguage::CSharp => tree_sitter_c_sharp::LANGUAGE.into(),
        }
    }

    /// Detect language from file extension.
    ///
    /// Returns `None` if the extension is not recognized.
    pub fn from_extension(ext: &str) -> Option<Self> {
        get_extension_map()
            .get(ext.to_lowercase().as_str())
            .copied()
    }

    /// Detect language from file path.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Detect language from a shebang line (`#!...`).
    ///
    /// Used for extensionless scripts; only interpreters with a supported
    /// grammar are recognized.
    pub fn from_shebang(first_line: &str) -> Option<Self> {
        let line = first_line.strip_prefix("#!")?;
        // `#!/usr/bin/env python3` or `#!/usr/bin/python3`
        let interpreter = line
            .split_whitespace()
            .find(|tok| !tok.ends_with("/env"))
            .map(|tok| tok.rsplit('/').next().unwrap_or(tok))?;

        if interpreter.starts_with("python") {
            Some(SupportedLanguage::Python)
        } else if interpreter.starts_with("node") || interpreter.starts_with("deno") {
            Some(SupportedLanguage::JavaScript)
        } else {
            None
        }
    }

    /// Get all supported file extensions.
    pub fn all_extensions() -> &'static [&'static str] {
        &[
            "py", "js", "mjs", "cjs", "ts", "tsx", "rs", "go", "c", "h", "cpp", "hpp", "cc", "cxx",
            "cs",
        ]
    }
}

impl std::fmt::Display for SupportedLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static extension to language mapping.
static EXTENSION_MAP: OnceLock<HashMap<&'static str, SupportedLanguage>> = OnceLock::new();

fn get_extension_map() -> &'static HashMap<&'static str, SupportedLanguage> {
    EXTENSION_MAP.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert("py", SupportedLanguage::Python);
        map.insert("js", SupportedLanguage::JavaScript);
        map.insert("mjs", SupportedLanguage::JavaScript);
        map.insert("cjs", SupportedLanguage::JavaScript);
        map.insert("ts", SupportedLanguage::TypeScript);
        map.insert("tsx", SupportedLanguage::Tsx);
        map.insert("rs", SupportedLanguage::Rust);
        map.insert("go", SupportedLanguage::Go);
        map.insert("c", SupportedLanguage::C);
        map.insert("h", SupportedLanguage::C);
        map.insert("cpp", SupportedLanguage::Cpp);
        map.insert("hpp", SupportedLanguage::Cpp);
        map.insert("cc", SupportedLanguage::Cpp);
        map.insert("cxx", SupportedLanguage::Cpp);
        map.insert("cs", SupportedLanguage::CSharp);
        map
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_extension() {
        assert_eq!(
            SupportedLanguage::from_extension("py"),
            Some(SupportedLanguage::Python)
        );
        assert_eq!(
            SupportedLanguage::from_extension("GO"),
            Some(SupportedLanguage::Go)
        );
        assert_eq!(
            SupportedLanguage::from_extension("tsx"),
            Some(SupportedLanguage::Tsx)
        );
        assert_eq!(SupportedLanguage::from_extension("unknown"), None);
    }

    #[test]
    fn test_language_from_path() {
        assert_eq!(
            SupportedLanguage::from_path(Path::new("src/main.rs")),
            Some(SupportedLanguage::Rust)
        );
        assert_eq!(SupportedLanguage::from_path(Path::new("README.md")), None);
        assert_eq!(SupportedLanguage::from_path(Path::new("script")), None);
    }

    #[test]
    fn test_language_from_shebang() {
        assert_eq!(
            SupportedLanguage::from_shebang("#!/usr/bin/env python3"),
            Some(SupportedLanguage::Python)
        );
        assert_eq!(
            SupportedLanguage::from_shebang("#!/usr/bin/python"),
            Some(SupportedLanguage::Python)
        );
        assert_eq!(
            SupportedLanguage::from_shebang("#!/usr/bin/env node"),
            Some(SupportedLanguage::JavaScript)
        );
        assert_eq!(SupportedLanguage::from_shebang("#!/bin/bash"), None);
        assert_eq!(SupportedLanguage::from_shebang("not a shebang"), None);
    }
}

//! Language-specific configurations for code splitting
//!
//! This module centralizes all language-specific parsing configurations,
//! including Tree-sitter language definitions, declaration queries, and
//! file-extension mappings.

use lazy_static::lazy_static;
use std::collections::HashMap;
use tree_sitter::Language;

/// Configuration for a specific programming language
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// The language identifier (e.g., "rust", "python")
    pub id: &'static str,
    /// File extensions associated with this language
    pub extensions: &'static [&'static str],
    /// Tree-sitter language parser
    pub tree_sitter_language: Language,
    /// Tree-sitter query for extracting declarations; capture names double
    /// as the stored `symbol_type`
    pub declaration_query: &'static str,
}

lazy_static! {
    /// Registry of all supported language configurations
    pub static ref LANGUAGE_REGISTRY: HashMap<&'static str, LanguageConfig> = {
        let mut registry = HashMap::new();

        registry.insert(
            "rust",
            LanguageConfig {
                id: "rust",
                extensions: &["rs"],
                tree_sitter_language: tree_sitter_rust::LANGUAGE.into(),
                declaration_query: r"
                    (function_item) @function
                    (impl_item) @impl
                    (struct_item) @struct
                    (enum_item) @enum
                    (trait_item) @interface
                    (mod_item) @module
                ",
            },
        );

        registry.insert(
            "python",
            LanguageConfig {
                id: "python",
                extensions: &["py", "pyi"],
                tree_sitter_language: tree_sitter_python::LANGUAGE.into(),
                declaration_query: r"
                    (function_definition) @function
                    (class_definition) @class
                ",
            },
        );

        registry.insert(
            "javascript",
            LanguageConfig {
                id: "javascript",
                extensions: &["js", "mjs", "cjs", "jsx"],
                tree_sitter_language: tree_sitter_javascript::LANGUAGE.into(),
                declaration_query: r"
                    (function_declaration) @function
                    (class_declaration) @class
                    (method_definition) @method
                ",
            },
        );

        registry.insert(
            "typescript",
            LanguageConfig {
                id: "typescript",
                extensions: &["ts", "mts", "cts", "tsx"],
                tree_sitter_language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                declaration_query: r"
                    (function_declaration) @function
                    (class_declaration) @class
                    (method_definition) @method
                    (interface_declaration) @interface
                    (enum_declaration) @enum
                ",
            },
        );

        registry.insert(
            "go",
            LanguageConfig {
                id: "go",
                extensions: &["go"],
                tree_sitter_language: tree_sitter_go::LANGUAGE.into(),
                declaration_query: r"
                    (function_declaration) @function
                    (method_declaration) @method
                    (type_declaration) @struct
                ",
            },
        );

        registry.insert(
            "java",
            LanguageConfig {
                id: "java",
                extensions: &["java"],
                tree_sitter_language: tree_sitter_java::LANGUAGE.into(),
                declaration_query: r"
                    (class_declaration) @class
                    (interface_declaration) @interface
                    (enum_declaration) @enum
                    (method_declaration) @method
                ",
            },
        );

        registry.insert(
            "c",
            LanguageConfig {
                id: "c",
                extensions: &["c", "h"],
                tree_sitter_language: tree_sitter_c::LANGUAGE.into(),
                declaration_query: r"
                    (function_definition) @function
                    (struct_specifier) @struct
                    (enum_specifier) @enum
                ",
            },
        );

        registry.insert(
            "cpp",
            LanguageConfig {
                id: "cpp",
                extensions: &["cpp", "cc", "cxx", "hpp", "hh", "hxx"],
                tree_sitter_language: tree_sitter_cpp::LANGUAGE.into(),
                declaration_query: r"
                    (function_definition) @function
                    (class_specifier) @class
                    (struct_specifier) @struct
                    (enum_specifier) @enum
                ",
            },
        );

        registry.insert(
            "csharp",
            LanguageConfig {
                id: "csharp",
                extensions: &["cs"],
                tree_sitter_language: tree_sitter_c_sharp::LANGUAGE.into(),
                declaration_query: r"
                    (class_declaration) @class
                    (interface_declaration) @interface
                    (enum_declaration) @enum
                    (method_declaration) @method
                ",
            },
        );

        registry
    };

    /// Reverse map from file extension to language id
    static ref EXTENSION_MAP: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        for config in LANGUAGE_REGISTRY.values() {
            for ext in config.extensions {
                map.insert(*ext, config.id);
            }
        }
        map
    };
}

/// Look up a language configuration by id
pub fn get_language_config(language: &str) -> Option<&'static LanguageConfig> {
    LANGUAGE_REGISTRY.get(language)
}

/// Map a file extension (without dot) to a language id
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    EXTENSION_MAP.get(ext.to_ascii_lowercase().as_str()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_all_supported_languages() {
        for id in [
            "rust",
            "python",
            "javascript",
            "typescript",
            "go",
            "java",
            "c",
            "cpp",
            "csharp",
        ] {
            assert!(get_language_config(id).is_some(), "missing {id}");
        }
    }

    #[test]
    fn extension_lookup() {
        assert_eq!(language_for_extension("rs"), Some("rust"));
        assert_eq!(language_for_extension("PY"), Some("python"));
        assert_eq!(language_for_extension("tsx"), Some("typescript"));
        assert_eq!(language_for_extension("exe"), None);
    }
}

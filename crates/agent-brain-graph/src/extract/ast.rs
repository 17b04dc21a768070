//! AST triple extractor
//!
//! Reads the code splitter's symbol metadata and emits structural triples
//! without touching a model: `Module contains Class`, `Class extends
//! Class`, `Module imports Module`, `Function defined_in Module`.

use crate::triple::{EntityType, Relationship, Triple};
use agent_brain_ingest::{Chunk, SourceType};

/// Extract structural triples from a code chunk's metadata and text
pub fn extract_structural(chunk: &Chunk) -> Vec<Triple> {
    if chunk.source_type != SourceType::Code {
        return Vec::new();
    }

    let module = module_name(&chunk.source_path);
    let mut triples = Vec::new();

    if let (Some(symbol_type), Some(symbol_name)) = (&chunk.symbol_type, &chunk.symbol_name) {
        let entity_type = EntityType::normalize(symbol_type);
        triples.push(Triple {
            subject: module.clone(),
            predicate: Relationship::Contains,
            object: symbol_name.clone(),
            subject_type: Some(EntityType::Module),
            object_type: Some(entity_type.clone()),
            chunk_id: Some(chunk.chunk_id.clone()),
        });
        triples.push(Triple {
            subject: symbol_name.clone(),
            predicate: Relationship::DefinedIn,
            object: module.clone(),
            subject_type: Some(entity_type.clone()),
            object_type: Some(EntityType::Module),
            chunk_id: Some(chunk.chunk_id.clone()),
        });

        if let Some(parent) = extends_target(chunk) {
            triples.push(Triple {
                subject: symbol_name.clone(),
                predicate: Relationship::Extends,
                object: parent,
                subject_type: Some(entity_type),
                object_type: Some(EntityType::Class),
                chunk_id: Some(chunk.chunk_id.clone()),
            });
        }
    }

    for import in imports(chunk) {
        triples.push(Triple {
            subject: module.clone(),
            predicate: Relationship::Imports,
            object: import,
            subject_type: Some(EntityType::Module),
            object_type: Some(EntityType::Module),
            chunk_id: Some(chunk.chunk_id.clone()),
        });
    }

    triples
}

/// Module identity for a source path: the path without its extension
fn module_name(source_path: &str) -> String {
    source_path
        .rsplit_once('.')
        .map_or(source_path, |(stem, _)| stem)
        .to_string()
}

/// Scan chunk text for import statements per language
fn imports(chunk: &Chunk) -> Vec<String> {
    let language = chunk.language.as_deref().unwrap_or_default();
    let mut found = Vec::new();
    for line in chunk.text.lines() {
        let line = line.trim();
        let target = match language {
            "rust" => line
                .strip_prefix("use ")
                .map(|rest| rest.trim_end_matches(';').split("::").next().unwrap_or(rest)),
            "python" => line
                .strip_prefix("import ")
                .or_else(|| line.strip_prefix("from "))
                .map(|rest| rest.split_whitespace().next().unwrap_or(rest))
                .map(|name| name.split('.').next().unwrap_or(name)),
            "javascript" | "typescript" => line
                .split_once(" from ")
                .map(|(_, module)| module.trim().trim_end_matches(';').trim_matches(['"', '\''])),
            "go" => line
                .strip_prefix("import ")
                .map(|rest| rest.trim_matches('"')),
            "java" | "csharp" => line
                .strip_prefix("import ")
                .or_else(|| line.strip_prefix("using "))
                .map(|rest| rest.trim_end_matches(';')),
            "c" | "cpp" => line
                .strip_prefix("#include ")
                .map(|rest| rest.trim_matches(['<', '>', '"'])),
            _ => None,
        };
        if let Some(target) = target {
            let target = target.trim();
            if !target.is_empty() {
                found.push(target.to_string());
            }
        }
    }
    found.sort();
    found.dedup();
    found
}

/// Find the parent type in an inheritance declaration, where expressible
fn extends_target(chunk: &Chunk) -> Option<String> {
    let language = chunk.language.as_deref().unwrap_or_default();
    let name = chunk.symbol_name.as_deref()?;
    let first_line = chunk.text.lines().next()?;

    match language {
        "python" => {
            // class Name(Parent):
            let after = first_line.split_once(&format!("class {name}"))?.1;
            let inside = after.trim().strip_prefix('(')?.split(')').next()?;
            let parent = inside.split(',').next()?.trim();
            (!parent.is_empty() && parent != "object").then(|| parent.to_string())
        }
        "java" | "typescript" | "javascript" | "csharp" => {
            let after = first_line.split_once(" extends ")?.1;
            let parent = after
                .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
                .next()?;
            (!parent.is_empty()).then(|| parent.to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_chunk(path: &str, language: &str, symbol_type: &str, name: &str, text: &str) -> Chunk {
        Chunk::code(
            path,
            0,
            text,
            language,
            Some(symbol_type.to_string()),
            Some(name.to_string()),
            1,
            text.lines().count().max(1),
        )
    }

    #[test]
    fn module_contains_and_defined_in() {
        let chunk = code_chunk("src/indexer.rs", "rust", "struct", "Indexer", "struct Indexer {}");
        let triples = extract_structural(&chunk);

        assert!(triples.iter().any(|t| {
            t.subject == "src/indexer"
                && t.predicate == Relationship::Contains
                && t.object == "Indexer"
        }));
        assert!(triples.iter().any(|t| {
            t.subject == "Indexer"
                && t.predicate == Relationship::DefinedIn
                && t.object == "src/indexer"
        }));
    }

    #[test]
    fn rust_use_statements_become_imports() {
        let chunk = code_chunk(
            "src/lib.rs",
            "rust",
            "function",
            "run",
            "use std::collections::HashMap;\nuse serde::Serialize;\nfn run() {}",
        );
        let triples = extract_structural(&chunk);
        let imports: Vec<&str> = triples
            .iter()
            .filter(|t| t.predicate == Relationship::Imports)
            .map(|t| t.object.as_str())
            .collect();
        assert_eq!(imports, vec!["serde", "std"]);
    }

    #[test]
    fn python_inheritance_is_extends() {
        let chunk = code_chunk(
            "app/models.py",
            "python",
            "class",
            "User",
            "class User(BaseModel):\n    pass",
        );
        let triples = extract_structural(&chunk);
        assert!(triples.iter().any(|t| {
            t.subject == "User" && t.predicate == Relationship::Extends && t.object == "BaseModel"
        }));
    }

    #[test]
    fn typescript_extends_clause() {
        let chunk = code_chunk(
            "src/widget.ts",
            "typescript",
            "class",
            "Widget",
            "class Widget extends Component {\n}",
        );
        let triples = extract_structural(&chunk);
        assert!(triples.iter().any(|t| {
            t.subject == "Widget" && t.predicate == Relationship::Extends && t.object == "Component"
        }));
    }

    #[test]
    fn document_chunks_produce_nothing() {
        let chunk = Chunk::document("README.md", 0, "import nothing");
        assert!(extract_structural(&chunk).is_empty());
    }
}

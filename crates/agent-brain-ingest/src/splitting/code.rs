//! Language-aware code splitter
//!
//! Chunks align to declarations (function/method/class/enum/interface)
//! when they fit within the token budget; larger declarations are
//! subdivided at nested block boundaries, never arbitrarily mid-statement.
//! A file that fails to parse falls back to the document splitter upstream.

use crate::chunk::Chunk;
use crate::error::{IngestError, IngestResult};
use crate::splitting::languages::{LanguageConfig, get_language_config};
use crate::tokens::TokenCounterRef;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, StreamingIterator};

// Compiled tree-sitter queries are expensive; cache them per language.
type QueryCache = HashMap<usize, Arc<Query>>;
static QUERY_CACHE: Lazy<Mutex<QueryCache>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn get_cached_query(language: &Language, query_str: &str) -> IngestResult<Arc<Query>> {
    let key = std::ptr::from_ref(language) as usize;
    {
        let cache = QUERY_CACHE
            .lock()
            .map_err(|_| IngestError::Parse("query cache lock poisoned".to_string()))?;
        if let Some(query) = cache.get(&key) {
            return Ok(Arc::clone(query));
        }
    }

    let query = Query::new(language, query_str)
        .map_err(|e| IngestError::Parse(format!("failed to compile query: {e}")))?;
    let query = Arc::new(query);
    let mut cache = QUERY_CACHE
        .lock()
        .map_err(|_| IngestError::Parse("query cache lock poisoned".to_string()))?;
    cache.insert(key, Arc::clone(&query));
    Ok(query)
}

/// A declaration found by the query, before chunking
struct Declaration {
    start_byte: usize,
    end_byte: usize,
    start_line: usize,
    end_line: usize,
    symbol_type: String,
    symbol_name: Option<String>,
}

/// Splits source files into declaration-aligned chunks via tree-sitter
pub struct CodeSplitter {
    max_tokens: usize,
    counter: TokenCounterRef,
}

impl CodeSplitter {
    /// Create a splitter with the given token budget per chunk
    pub fn new(max_tokens: usize, counter: TokenCounterRef) -> Self {
        Self { max_tokens, counter }
    }

    /// Split `content` (in `language`) into chunks attributed to `source_path`
    ///
    /// # Errors
    /// Returns `IngestError::Parse` when the language is unknown or the
    /// grammar rejects the file; callers fall back to the document splitter.
    pub fn split(&self, source_path: &str, content: &str, language: &str) -> IngestResult<Vec<Chunk>> {
        let config = get_language_config(language)
            .ok_or_else(|| IngestError::Parse(format!("unsupported language: {language}")))?;

        let mut parser = Parser::new();
        parser
            .set_language(&config.tree_sitter_language)
            .map_err(|e| IngestError::Parse(format!("failed to load {language} grammar: {e}")))?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| IngestError::Parse(format!("failed to parse {source_path}")))?;

        let declarations = self.collect_declarations(config, tree.root_node(), content)?;

        let mut chunks = Vec::new();
        let mut cursor_byte = 0;

        for decl in &declarations {
            // Preamble / code between declarations (imports, top-level statements)
            if decl.start_byte > cursor_byte {
                self.push_plain_spans(
                    source_path,
                    content,
                    language,
                    cursor_byte,
                    decl.start_byte,
                    &mut chunks,
                );
            }

            let text = content
                .get(decl.start_byte..decl.end_byte)
                .unwrap_or_default();
            if self.counter.count(text) <= self.max_tokens {
                let index = chunks.len();
                chunks.push(Chunk::code(
                    source_path,
                    index,
                    text,
                    language,
                    Some(decl.symbol_type.clone()),
                    decl.symbol_name.clone(),
                    decl.start_line,
                    decl.end_line,
                ));
            } else {
                self.subdivide_declaration(source_path, content, language, config, decl, &mut chunks)?;
            }
            cursor_byte = cursor_byte.max(decl.end_byte);
        }

        if cursor_byte < content.len() {
            self.push_plain_spans(source_path, content, language, cursor_byte, content.len(), &mut chunks);
        }

        Ok(chunks)
    }

    /// Run the declaration query and keep only outermost matches
    fn collect_declarations(
        &self,
        config: &LanguageConfig,
        root: Node<'_>,
        content: &str,
    ) -> IngestResult<Vec<Declaration>> {
        let query = get_cached_query(&config.tree_sitter_language, config.declaration_query)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, root, content.as_bytes());

        let mut raw: Vec<Declaration> = Vec::new();
        while let Some(m) = matches.next() {
            for capture in m.captures {
                let node = capture.node;
                let symbol_type = query
                    .capture_names()
                    .get(capture.index as usize)
                    .map_or("declaration", |name| *name)
                    .to_string();
                raw.push(Declaration {
                    start_byte: node.start_byte(),
                    end_byte: node.end_byte(),
                    start_line: node.start_position().row + 1,
                    end_line: node.end_position().row + 1,
                    symbol_type,
                    symbol_name: declaration_name(node, content),
                });
            }
        }

        raw.sort_by_key(|d| (d.start_byte, std::cmp::Reverse(d.end_byte)));

        // Keep outermost declarations only; methods inside a class stay part
        // of the class chunk unless the class is subdivided later.
        let mut outermost: Vec<Declaration> = Vec::new();
        for decl in raw {
            let contained = outermost
                .last()
                .is_some_and(|prev| decl.start_byte >= prev.start_byte && decl.end_byte <= prev.end_byte);
            if !contained {
                outermost.push(decl);
            }
        }
        Ok(outermost)
    }

    /// Subdivide an oversized declaration at nested block boundaries
    fn subdivide_declaration(
        &self,
        source_path: &str,
        content: &str,
        language: &str,
        config: &LanguageConfig,
        decl: &Declaration,
        chunks: &mut Vec<Chunk>,
    ) -> IngestResult<()> {
        // Re-parse is avoided: walk the declaration's subtree by running the
        // query again scoped to the declaration's span.
        let mut parser = Parser::new();
        parser
            .set_language(&config.tree_sitter_language)
            .map_err(|e| IngestError::Parse(e.to_string()))?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| IngestError::Parse("re-parse failed".to_string()))?;
        let root = tree.root_node();
        let node = root
            .descendant_for_byte_range(decl.start_byte, decl.end_byte)
            .unwrap_or(root);

        let mut groups: Vec<(usize, usize)> = Vec::new();
        self.group_children(node, content, &mut groups);

        for (start_byte, end_byte) in groups {
            let text = content.get(start_byte..end_byte).unwrap_or_default();
            if text.trim().is_empty() {
                continue;
            }
            let (start_line, end_line) = line_span(content, start_byte, end_byte);
            let index = chunks.len();
            chunks.push(Chunk::code(
                source_path,
                index,
                text,
                language,
                Some(decl.symbol_type.clone()),
                decl.symbol_name.clone(),
                start_line,
                end_line,
            ));
        }
        Ok(())
    }

    /// Group a node's named children into byte ranges within the budget
    fn group_children(&self, node: Node<'_>, content: &str, groups: &mut Vec<(usize, usize)>) {
        let mut walker = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut walker).collect();

        if children.is_empty() {
            // No block structure left: fall back to line grouping.
            self.group_lines(node.start_byte(), node.end_byte(), content, groups);
            return;
        }

        let mut group_start: Option<usize> = None;
        let mut group_end = 0;
        let mut group_tokens = 0;

        for child in children {
            let text = content
                .get(child.start_byte()..child.end_byte())
                .unwrap_or_default();
            let tokens = self.counter.count(text);

            if tokens > self.max_tokens {
                if let Some(start) = group_start.take() {
                    groups.push((start, group_end));
                    group_tokens = 0;
                }
                self.group_children(child, content, groups);
                continue;
            }

            if group_start.is_some() && group_tokens + tokens > self.max_tokens {
                if let Some(start) = group_start.take() {
                    groups.push((start, group_end));
                }
                group_tokens = 0;
            }
            if group_start.is_none() {
                group_start = Some(child.start_byte());
            }
            group_end = child.end_byte();
            group_tokens += tokens;
        }
        if let Some(start) = group_start {
            groups.push((start, group_end));
        }
    }

    /// Last-resort grouping of an unstructured span by whole lines
    fn group_lines(&self, start_byte: usize, end_byte: usize, content: &str, groups: &mut Vec<(usize, usize)>) {
        let span = content.get(start_byte..end_byte).unwrap_or_default();
        let mut piece_start = start_byte;
        let mut tokens = 0;
        let mut offset = start_byte;

        for line in span.split_inclusive('\n') {
            let line_tokens = self.counter.count(line);
            if tokens + line_tokens > self.max_tokens && offset > piece_start {
                groups.push((piece_start, offset));
                piece_start = offset;
                tokens = 0;
            }
            offset += line.len();
            tokens += line_tokens;
        }
        if offset > piece_start {
            groups.push((piece_start, offset));
        }
    }

    /// Chunk code that sits between declarations (imports, module docs)
    fn push_plain_spans(
        &self,
        source_path: &str,
        content: &str,
        language: &str,
        start_byte: usize,
        end_byte: usize,
        chunks: &mut Vec<Chunk>,
    ) {
        let text = content.get(start_byte..end_byte).unwrap_or_default();
        if text.trim().is_empty() {
            return;
        }
        let mut groups = Vec::new();
        if self.counter.count(text) <= self.max_tokens {
            groups.push((start_byte, end_byte));
        } else {
            self.group_lines(start_byte, end_byte, content, &mut groups);
        }
        for (start, end) in groups {
            let piece = content.get(start..end).unwrap_or_default();
            if piece.trim().is_empty() {
                continue;
            }
            let (start_line, end_line) = line_span(content, start, end);
            let index = chunks.len();
            chunks.push(Chunk::code(
                source_path,
                index,
                piece.trim_end(),
                language,
                None,
                None,
                start_line,
                end_line,
            ));
        }
    }
}

/// Extract a declaration's name from its `name` (or `type`) field
fn declaration_name(node: Node<'_>, content: &str) -> Option<String> {
    let name_node = node
        .child_by_field_name("name")
        .or_else(|| node.child_by_field_name("type"))
        .or_else(|| node.child_by_field_name("declarator"))?;
    content
        .get(name_node.start_byte()..name_node.end_byte())
        .map(str::to_string)
}

/// 1-indexed line numbers covering a byte range
fn line_span(content: &str, start_byte: usize, end_byte: usize) -> (usize, usize) {
    let before = content.get(..start_byte).unwrap_or_default();
    let start_line = before.matches('\n').count() + 1;
    let span = content.get(start_byte..end_byte).unwrap_or_default();
    let span_lines = span.trim_end_matches('\n').matches('\n').count();
    (start_line, start_line + span_lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SourceType;
    use crate::tokens::HeuristicCounter;

    fn splitter(max_tokens: usize) -> CodeSplitter {
        CodeSplitter::new(max_tokens, Arc::new(HeuristicCounter::new("test")))
    }

    const RUST_SAMPLE: &str = r#"use std::collections::HashMap;

fn lookup(map: &HashMap<String, u32>, key: &str) -> Option<u32> {
    map.get(key).copied()
}

struct Registry {
    entries: HashMap<String, u32>,
}

fn insert(map: &mut HashMap<String, u32>, key: String, value: u32) {
    map.insert(key, value);
}
"#;

    #[test]
    fn declarations_become_chunks() {
        let chunks = splitter(200).split("src/lib.rs", RUST_SAMPLE, "rust").unwrap();
        assert!(chunks.len() >= 3);

        let lookup = chunks
            .iter()
            .find(|c| c.symbol_name.as_deref() == Some("lookup"))
            .expect("lookup function chunk");
        assert_eq!(lookup.symbol_type.as_deref(), Some("function"));
        assert_eq!(lookup.language.as_deref(), Some("rust"));
        assert_eq!(lookup.source_type, SourceType::Code);
        assert!(lookup.text.contains("map.get(key)"));

        let registry = chunks
            .iter()
            .find(|c| c.symbol_name.as_deref() == Some("Registry"))
            .expect("Registry struct chunk");
        assert_eq!(registry.symbol_type.as_deref(), Some("struct"));
    }

    #[test]
    fn imports_are_kept_as_plain_chunks() {
        let chunks = splitter(200).split("src/lib.rs", RUST_SAMPLE, "rust").unwrap();
        let preamble = &chunks[0];
        assert!(preamble.text.contains("use std::collections::HashMap"));
        assert!(preamble.symbol_type.is_none());
    }

    #[test]
    fn chunk_indices_are_sequential_and_lines_recorded() {
        let chunks = splitter(200).split("src/lib.rs", RUST_SAMPLE, "rust").unwrap();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert!(chunk.start_line >= 1);
            assert!(chunk.end_line >= chunk.start_line);
        }
    }

    #[test]
    fn oversized_function_is_subdivided_not_dropped() {
        let mut body = String::from("fn big() {\n");
        for i in 0..200 {
            body.push_str(&format!("    let value_{i} = compute_something({i});\n"));
        }
        body.push_str("}\n");

        let chunks = splitter(50).split("src/big.rs", &body, "rust").unwrap();
        assert!(chunks.len() > 1, "should subdivide the oversized function");
        for chunk in &chunks {
            assert_eq!(chunk.symbol_name.as_deref(), Some("big"));
        }
        // All statements survive across the subdivision
        let total: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert!(total.contains("value_0"));
        assert!(total.contains("value_199"));
    }

    #[test]
    fn python_classes_and_functions_are_detected() {
        let source = "class Greeter:\n    def greet(self):\n        return 'hi'\n\ndef main():\n    print(Greeter().greet())\n";
        let chunks = splitter(200).split("app.py", source, "python").unwrap();
        assert!(chunks.iter().any(|c| c.symbol_type.as_deref() == Some("class")));
        assert!(
            chunks
                .iter()
                .any(|c| c.symbol_name.as_deref() == Some("main"))
        );
    }

    #[test]
    fn unknown_language_is_a_parse_error() {
        let result = splitter(200).split("x.cob", "MOVE A TO B.", "cobol");
        assert!(result.is_err());
    }
}

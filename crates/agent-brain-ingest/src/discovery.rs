//! File discovery
//!
//! Walks a root path honoring include/exclude globs. The project's own
//! state directory is always excluded; unsupported extensions are
//! reported (never a failure) so the indexing job can count skips.

use crate::error::{IngestError, IngestResult};
use crate::splitting::language_for_extension;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};

/// Document extensions the splitter understands directly
const DOCUMENT_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "text", "html", "htm"];

/// Document formats accepted only through a pre-extracted text sidecar
const BINARY_DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "docx"];

/// What kind of content a discovered file holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    /// Prose handled by the document splitter
    Document,
    /// Source code in a recognized language
    Code(&'static str),
    /// Known extension but binary content with no text sidecar
    Skipped,
}

/// A file found during discovery
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the walk root
    pub relative_path: String,
    /// Absolute path on disk
    pub absolute_path: PathBuf,
    /// Content classification
    pub kind: FileKind,
}

/// Outcome of walking a root path
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Files the pipeline will ingest
    pub files: Vec<DiscoveredFile>,
    /// Paths skipped for unsupported extensions
    pub skipped: Vec<String>,
}

/// Discovery configuration
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfig {
    /// Include globs; empty means everything
    pub include: Vec<String>,
    /// Exclude globs applied after includes
    pub exclude: Vec<String>,
    /// Whether to descend into subdirectories
    pub recursive: bool,
    /// Whether code files are ingested at all
    pub include_code: bool,
}

impl DiscoveryConfig {
    /// Discovery of everything under a root, code included
    pub fn recursive() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            recursive: true,
            include_code: true,
        }
    }
}

fn build_globset(patterns: &[String]) -> IngestResult<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| IngestError::InvalidGlob(format!("{pattern}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| IngestError::InvalidGlob(e.to_string()))
}

/// Classify a path by extension
fn classify(path: &Path) -> Option<FileKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
        return Some(FileKind::Document);
    }
    if BINARY_DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
        // Ingested only when a `.txt` sidecar with the extracted text exists.
        let sidecar = path.with_extension(format!("{ext}.txt"));
        if sidecar.exists() {
            return Some(FileKind::Document);
        }
        return Some(FileKind::Skipped);
    }
    language_for_extension(&ext).map(FileKind::Code)
}

/// Walk `root` and classify every candidate file
///
/// `state_dir_name` is always excluded, as are VCS metadata directories
/// (the walker respects `.gitignore` by construction).
///
/// # Errors
/// Returns `IngestError::InvalidGlob` on malformed patterns and
/// `IngestError::Io` when the root cannot be read.
pub fn discover(
    root: &Path,
    config: &DiscoveryConfig,
    state_dir_name: &str,
) -> IngestResult<DiscoveryReport> {
    if !root.exists() {
        return Err(IngestError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("path not found: {}", root.display()),
        )));
    }

    let include = build_globset(&config.include)?;
    let exclude = build_globset(&config.exclude)?;

    let max_depth = if config.recursive { None } else { Some(1) };
    let mut builder = ignore::WalkBuilder::new(root);
    builder.hidden(false).follow_links(false);
    if let Some(depth) = max_depth {
        builder.max_depth(Some(depth));
    }
    let state_dir = state_dir_name.to_string();
    builder.filter_entry(move |entry| {
        let name = entry.file_name().to_string_lossy();
        name != state_dir && name != ".git"
    });

    let mut report = DiscoveryReport::default();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Discovery error: {e}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        if let Some(include) = &include {
            if !include.is_match(&relative) {
                continue;
            }
        }
        if let Some(exclude) = &exclude {
            if exclude.is_match(&relative) {
                continue;
            }
        }

        match classify(path) {
            Some(FileKind::Code(language)) => {
                if config.include_code {
                    report.files.push(DiscoveredFile {
                        relative_path: relative,
                        absolute_path: path.to_path_buf(),
                        kind: FileKind::Code(language),
                    });
                }
            }
            Some(FileKind::Document) => report.files.push(DiscoveredFile {
                relative_path: relative,
                absolute_path: path.to_path_buf(),
                kind: FileKind::Document,
            }),
            Some(FileKind::Skipped) | None => {
                tracing::warn!("Skipping unsupported file: {relative}");
                report.skipped.push(relative);
            }
        }
    }

    // Deterministic ordering for stable chunk ids across runs
    report.files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    report.skipped.sort();
    Ok(report)
}

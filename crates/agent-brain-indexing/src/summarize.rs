//! Chunk summarization stage
//!
//! Optional: when a summarization provider is configured, each chunk gets
//! an LLM summary stored alongside its text and embedded together with it
//! ("summary\n\ntext"). Per-chunk failures degrade gracefully - warn and
//! leave the summary empty.

use agent_brain_ingest::Chunk;
use agent_brain_providers::TextGeneratorRef;

const SUMMARY_PROMPT: &str = "Summarize the following content in one or two sentences. \
                              Respond with the summary only.";

/// Produce a summary for one chunk, or `None` on failure
pub async fn summarize_chunk(generator: &TextGeneratorRef, chunk: &Chunk) -> Option<String> {
    let prompt = format!("{SUMMARY_PROMPT}\n\n{}", chunk.text);
    match generator.generate(&prompt).await {
        Ok(summary) => {
            let summary = summary.trim().to_string();
            (!summary.is_empty()).then_some(summary)
        }
        Err(e) => {
            tracing::warn!("Summarization failed for {}: {e}", chunk.chunk_id);
            None
        }
    }
}

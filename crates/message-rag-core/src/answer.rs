//! Answer assembly: threshold filtering, context rendering, prompt
//! templating, source attribution, and display formatting.
//!
//! Everything here is pure. The orchestration that calls the embedder and
//! the LLM lives in the app crate's query engine.

use crate::models::{QueryResponse, SearchResult, Source};

/// Answer returned when no retrieved message clears the similarity threshold.
pub const NO_RESULTS_ANSWER: &str =
    "I couldn't find any relevant messages to answer your question.";

/// Maximum preview length in characters, before the ellipsis.
pub const PREVIEW_CHARS: usize = 100;

/// Marker whose presence in an answer suppresses the appended source list.
pub const SOURCES_MARKER: &str = "Sources:";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions \
about a team's message history. Answer only from the provided messages. If the messages do \
not contain the answer, say so. Cite authors and URLs when you rely on a message.";

pub const DEFAULT_QUERY_TEMPLATE: &str = "Use the following messages to answer the question.\n\n\
{context}\n\
Question: {question}\n\n\
Answer:";

/// Keep results with `score >= min_similarity`, preserving order.
pub fn filter_by_similarity(results: Vec<SearchResult>, min_similarity: f64) -> Vec<SearchResult> {
    results
        .into_iter()
        .filter(|r| r.score >= min_similarity)
        .collect()
}

/// Render results as 1-indexed message blocks separated by a blank line.
pub fn format_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "Message {}:\nAuthor: {}\nTimestamp: {}\nURL: {}\nContent: {}\n",
                i + 1,
                r.meta_or("author", "Unknown"),
                r.meta_or("timestamp", ""),
                r.meta_or("url", ""),
                r.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// First [`PREVIEW_CHARS`] characters of `content`, with `"..."` if truncated.
pub fn content_preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// One [`Source`] per result, in result order.
pub fn build_sources(results: &[SearchResult]) -> Vec<Source> {
    results
        .iter()
        .map(|r| Source {
            url: r.meta_or("url", "").to_string(),
            author: r.meta_or("author", "Unknown").to_string(),
            timestamp: r.meta_or("timestamp", "").to_string(),
            score: r.score,
            content_preview: content_preview(&r.content),
        })
        .collect()
}

/// Response for a query whose results were all filtered out.
pub fn empty_response() -> QueryResponse {
    QueryResponse {
        answer: NO_RESULTS_ANSWER.to_string(),
        sources: Vec::new(),
        context_used: Vec::new(),
        num_sources: 0,
    }
}

/// Render a response for display.
///
/// The answer is returned verbatim when there are no sources. Otherwise a
/// `Sources:` section is appended, unless the answer already contains that
/// marker anywhere.
pub fn format_response(response: &QueryResponse) -> String {
    let mut output = response.answer.clone();
    if response.sources.is_empty() || output.contains(SOURCES_MARKER) {
        return output;
    }

    output.push_str("\n\nSources:\n");
    for source in &response.sources {
        output.push_str(&format!(
            "- {} by {} ({})\n",
            source.content_preview, source.author, source.url
        ));
    }
    output
}

/// System instruction plus a query template with `{context}` and
/// `{question}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    pub system: String,
    pub query: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            query: DEFAULT_QUERY_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Substitute placeholders in a single pass, so braces inside the
    /// context or question are never re-expanded.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.query.len() + context.len() + question.len());
        let mut rest = self.query.as_str();
        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix("{context}") {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{question}") {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

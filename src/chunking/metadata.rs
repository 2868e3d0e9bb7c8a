//! Chunk enrichment: document type, enclosing markdown section, abstraction
//! level, keywords, topics and file modification time.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::stream::{self, StreamExt};
use regex::Regex;

use crate::llm::{GenerationProvider, Outcome};
use crate::models::{AbstractionLevel, Chunk};

use super::SourceText;

const HIGH_INDICATORS: &[&str] = &[
    "concept",
    "pattern",
    "architecture",
    "design",
    "principle",
    "approach",
    "strategy",
    "overview",
    "summary",
];

const LOW_INDICATORS: &[&str] = &[
    "function", "class", "method", "variable", "const", "let", "import", "export", "return",
    "if", "for", "while",
];

/// Chars of chunk text shown to the classifier.
const CLASSIFY_PREVIEW_CHARS: usize = 500;

pub struct MetadataExtractor {
    classifier: Option<Arc<dyn GenerationProvider>>,
    max_concurrency: usize,
}

impl MetadataExtractor {
    /// Rule-based abstraction levels only.
    pub fn heuristic() -> Self {
        Self {
            classifier: None,
            max_concurrency: 1,
        }
    }

    /// Ask the generation provider for abstraction levels, falling back to
    /// the heuristic per chunk when a call fails.
    pub fn with_llm(classifier: Arc<dyn GenerationProvider>, max_concurrency: usize) -> Self {
        Self {
            classifier: Some(classifier),
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Fills enrichment fields. Text, embedding, offsets, indices and
    /// hierarchy links are left as they are.
    pub async fn enrich(&self, chunks: Vec<Chunk>, document: &str, source_path: &str) -> Vec<Chunk> {
        let document_type = document_type(Path::new(source_path));
        let file_name = Path::new(source_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source_path.to_string());
        let timestamp = file_timestamp(Path::new(source_path));
        let source = SourceText::new(document);

        stream::iter(chunks.into_iter().map(|mut chunk| {
            let section = extract_section(&source, chunk.metadata.start_index);
            let file_name = file_name.clone();
            let timestamp = timestamp.clone();
            async move {
                let level = self.classify(&chunk.text).await.into_logged("abstraction classification");
                let keywords = extract_keywords(&chunk.text);

                let meta = &mut chunk.metadata;
                meta.source_path = Some(source_path.to_string());
                meta.source_file = Some(file_name);
                meta.document_type = Some(document_type.to_string());
                meta.section = section;
                meta.abstraction_level = Some(level);
                meta.topics = extract_topics(&keywords);
                meta.keywords = keywords;
                meta.timestamp = timestamp;
                chunk
            }
        }))
        .buffered(self.max_concurrency)
        .collect()
        .await
    }

    async fn classify(&self, text: &str) -> Outcome<AbstractionLevel> {
        let Some(classifier) = &self.classifier else {
            return Outcome::Fresh(classify_heuristic(text));
        };
        let preview: String = text.chars().take(CLASSIFY_PREVIEW_CHARS).collect();
        match classifier.generate(&build_classification_prompt(&preview)).await {
            Ok(response) => Outcome::Fresh(parse_level(&response)),
            Err(e) => Outcome::fallback(classify_heuristic(text), e.to_string()),
        }
    }
}

fn build_classification_prompt(preview: &str) -> String {
    format!(
        "Classify the abstraction level of this text as \"high\", \"medium\", or \"low\".\n\n\
         High: Concepts, patterns, architecture, high-level descriptions\n\
         Medium: Implementation details, APIs, specific functionality\n\
         Low: Specific code, exact syntax, detailed implementation\n\n\
         Text: \"{}\"\n\n\
         Respond with only one word: high, medium, or low.",
        crate::llm::sanitize_for_prompt(preview)
    )
}

fn parse_level(response: &str) -> AbstractionLevel {
    let normalized = response.trim().to_lowercase();
    if normalized.contains("high") {
        AbstractionLevel::High
    } else if normalized.contains("low") {
        AbstractionLevel::Low
    } else {
        AbstractionLevel::Medium
    }
}

pub fn document_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "md" => "markdown",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "py" => "python",
        "rs" => "rust",
        "go" => "go",
        "java" => "java",
        "cpp" => "cpp",
        "c" => "c",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "xml" => "xml",
        "html" => "html",
        "css" => "css",
        _ => "text",
    }
}

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})[ \t]+(.+)$").unwrap());

/// Most recent markdown header before `start`. A deeper header never
/// replaces a shallower one already seen.
pub fn extract_section(source: &SourceText<'_>, start: usize) -> Option<String> {
    let before = source.slice(0, start);
    let mut section = None;
    let mut level = 0usize;

    for caps in HEADER_RE.captures_iter(before) {
        let depth = caps[1].len();
        if level == 0 || depth <= level {
            section = Some(caps[2].trim().to_string());
            level = depth;
        }
    }

    section
}

pub fn classify_heuristic(text: &str) -> AbstractionLevel {
    let lower = text.to_lowercase();
    let count = |indicators: &[&str]| indicators.iter().filter(|i| lower.contains(*i)).count();
    let high = count(HIGH_INDICATORS);
    let low = count(LOW_INDICATORS);

    if high > low && high > 2 {
        AbstractionLevel::High
    } else if low > high && low > 3 {
        AbstractionLevel::Low
    } else {
        AbstractionLevel::Medium
    }
}

/// Words longer than four chars seen at least twice, most frequent first,
/// ties in first-seen order, at most ten.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();

    let mut order: Vec<&str> = Vec::new();
    let mut freq: HashMap<&str, usize> = HashMap::new();
    for word in normalized.split_whitespace().filter(|w| w.chars().count() > 4) {
        let count = freq.entry(word).or_insert(0);
        if *count == 0 {
            order.push(word);
        }
        *count += 1;
    }

    let mut ranked: Vec<(&str, usize)> = order
        .into_iter()
        .map(|w| (w, freq[w]))
        .filter(|(_, c)| *c >= 2)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.into_iter().take(10).map(|(w, _)| w.to_string()).collect()
}

/// The five most frequent keywords.
fn extract_topics(keywords: &[String]) -> Vec<String> {
    keywords.iter().take(5).cloned().collect()
}

fn file_timestamp(path: &Path) -> Option<String> {
    match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => {
            let dt: DateTime<Utc> = modified.into();
            Some(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        Err(e) => {
            tracing::warn!("Could not read modification time of {}: {e}", path.display());
            None
        }
    }
}

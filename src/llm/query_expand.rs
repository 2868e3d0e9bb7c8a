use super::{parse_list_lines, sanitize_for_prompt, GenerationProvider, Outcome};

pub const MIN_VARIATIONS: usize = 2;
pub const MAX_VARIATIONS: usize = 5;

/// Rewrites a query into alternative phrasings with a single LLM call.
#[derive(Debug, Clone, Copy)]
pub struct QueryExpander {
    num_variations: usize,
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self::new(3)
    }
}

impl QueryExpander {
    /// `num_variations` counts the original query and is clamped to 2..=5.
    pub fn new(num_variations: usize) -> Self {
        Self {
            num_variations: num_variations.clamp(MIN_VARIATIONS, MAX_VARIATIONS),
        }
    }

    pub fn num_variations(&self) -> usize {
        self.num_variations
    }

    /// Exactly `num_variations` queries, the original first. Missing
    /// paraphrases are padded with the original. On provider failure the
    /// fallback is the original query alone.
    pub async fn expand(&self, provider: &dyn GenerationProvider, original: &str) -> Outcome<Vec<String>> {
        let wanted = self.num_variations - 1;
        let prompt = build_expansion_prompt(original, wanted);

        match provider.generate(&prompt).await {
            Ok(response) => {
                let mut queries = Vec::with_capacity(self.num_variations);
                queries.push(original.to_string());
                queries.extend(parse_variations(&response).into_iter().take(wanted));
                while queries.len() < self.num_variations {
                    queries.push(original.to_string());
                }
                tracing::debug!("Expanded query into {} variations", queries.len());
                Outcome::Fresh(queries)
            }
            Err(e) => Outcome::fallback(vec![original.to_string()], e.to_string()),
        }
    }
}

fn build_expansion_prompt(original: &str, wanted: usize) -> String {
    format!(
        "Generate {wanted} different variations of this query. Each variation should:\n\
         - Capture different phrasings or synonyms\n\
         - Focus on different aspects if the query is complex\n\
         - Be concise (1-2 sentences max)\n\
         - Be semantically similar but use different wording\n\n\
         Original query: \"{}\"\n\n\
         Generate {wanted} variations, one per line, without numbering or bullets:",
        sanitize_for_prompt(original)
    )
}

/// Accepts a JSON array of strings anywhere in the response, otherwise one
/// variation per line. Lead-in lines ending in ':' are skipped.
fn parse_variations(response: &str) -> Vec<String> {
    if let (Some(start), Some(end)) = (response.find('['), response.rfind(']')) {
        if start < end {
            if let Ok(items) = serde_json::from_str::<Vec<String>>(&response[start..=end]) {
                return items
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
        }
    }

    parse_list_lines(response)
        .into_iter()
        .filter(|line| !line.ends_with(':'))
        .collect()
}

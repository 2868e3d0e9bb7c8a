//! LLM-judged answer quality: whether an answer is grounded in its context
//! (faithfulness) and whether it addresses the question (answer relevance).

use std::sync::Arc;

use serde::Serialize;

use crate::llm::{sanitize_for_prompt, GenerationProvider, Outcome};
use crate::models::Chunk;
use crate::search::pipeline::build_context_block;

/// Score for an unclear verdict or a failed judge call.
pub const NEUTRAL_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetrics {
    pub faithfulness: f64,
    pub answer_relevance: f64,
}

/// Asks the generation provider yes/no questions about an answer.
pub struct GenerationJudge {
    provider: Arc<dyn GenerationProvider>,
}

impl GenerationJudge {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider }
    }

    /// 1.0 when the judge says the answer is supported by `context`.
    pub async fn faithfulness(&self, query: &str, context: &[Chunk], answer: &str) -> Outcome<f64> {
        let prompt = format!(
            "Evaluate whether the following response is grounded in the provided context.\n\n\
             Query: \"{}\"\n\n\
             Context:\n{}\n\n\
             Response: \"{}\"\n\n\
             Is the response fully supported by the context? Answer with only \"yes\" or \"no\".",
            sanitize_for_prompt(query),
            build_context_block(context),
            sanitize_for_prompt(answer)
        );
        self.verdict(&prompt).await
    }

    /// 1.0 when the judge says the answer addresses `query`.
    pub async fn answer_relevance(&self, query: &str, answer: &str) -> Outcome<f64> {
        let prompt = format!(
            "Evaluate whether the following response answers the query.\n\n\
             Query: \"{}\"\n\n\
             Response: \"{}\"\n\n\
             Does the response answer the query? Answer with only \"yes\" or \"no\".",
            sanitize_for_prompt(query),
            sanitize_for_prompt(answer)
        );
        self.verdict(&prompt).await
    }

    /// Both judgments, requested concurrently. Failed calls score neutral.
    pub async fn evaluate(&self, query: &str, context: &[Chunk], answer: &str) -> GenerationMetrics {
        let (faithfulness, relevance) = tokio::join!(
            self.faithfulness(query, context, answer),
            self.answer_relevance(query, answer)
        );
        GenerationMetrics {
            faithfulness: faithfulness.into_logged("faithfulness judgment"),
            answer_relevance: relevance.into_logged("answer relevance judgment"),
        }
    }

    async fn verdict(&self, prompt: &str) -> Outcome<f64> {
        match self.provider.generate(prompt).await {
            Ok(response) => Outcome::Fresh(parse_verdict(&response)),
            Err(e) => Outcome::fallback(NEUTRAL_SCORE, e.to_string()),
        }
    }
}

/// `yes` scores 1.0, `no` 0.0, anything else neutral. Whole words only, so
/// "I don't know" is not read as "no".
fn parse_verdict(response: &str) -> f64 {
    let lowered = response.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    if words.contains(&"yes") {
        1.0
    } else if words.contains(&"no") {
        0.0
    } else {
        NEUTRAL_SCORE
    }
}

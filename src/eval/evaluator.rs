//! Runs a labelled query set through the engine and scores both retrieval
//! and the generated answers.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::engine::RagEngine;
use crate::models::{Chunk, RagOptions};

use super::generation::{GenerationJudge, GenerationMetrics};
use super::{evaluate, evaluate_many, JudgedRetrieval, RetrievalMetrics};

/// Queries with the identity keys of the chunks that should answer them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EvaluationDataset {
    pub queries: Vec<EvaluationQuery>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationQuery {
    pub query: String,
    #[serde(default)]
    pub relevant_chunk_ids: Vec<String>,
}

impl EvaluationDataset {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid dataset {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub query: String,
    pub retrieval_metrics: RetrievalMetrics,
    pub generation_metrics: GenerationMetrics,
    pub response: String,
    pub retrieved_chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    pub results: Vec<EvaluationResult>,
    pub average_retrieval_metrics: RetrievalMetrics,
    pub average_generation_metrics: GenerationMetrics,
    pub total_queries: usize,
}

pub struct RagEvaluator<'a> {
    engine: &'a RagEngine,
    judge: GenerationJudge,
    options: RagOptions,
}

impl<'a> RagEvaluator<'a> {
    /// Judges with the engine's own generation provider.
    pub fn new(engine: &'a RagEngine, options: RagOptions) -> Self {
        Self {
            judge: GenerationJudge::new(engine.generator()),
            engine,
            options,
        }
    }

    pub fn with_judge(mut self, judge: GenerationJudge) -> Self {
        self.judge = judge;
        self
    }

    /// Evaluates every query in order. A failed answer generation aborts
    /// the run.
    pub async fn evaluate(&self, dataset: &EvaluationDataset, top_k: usize) -> Result<EvaluationReport> {
        let mut results = Vec::with_capacity(dataset.queries.len());
        let mut judged = Vec::with_capacity(dataset.queries.len());

        for item in &dataset.queries {
            let result = self
                .evaluate_single(&item.query, Some(&item.relevant_chunk_ids), top_k)
                .await?;
            judged.push(JudgedRetrieval {
                retrieved: result.retrieved_chunks.clone(),
                relevant: item.relevant_chunk_ids.clone(),
            });
            results.push(result);
        }

        tracing::info!("Evaluated {} queries", results.len());
        Ok(EvaluationReport {
            average_retrieval_metrics: evaluate_many(&judged, top_k),
            average_generation_metrics: average_generation(&results),
            total_queries: results.len(),
            results,
        })
    }

    /// One query. Without relevance labels the retrieval metrics are zero.
    pub async fn evaluate_single(
        &self,
        query: &str,
        relevant: Option<&[String]>,
        top_k: usize,
    ) -> Result<EvaluationResult> {
        let (retrieved, response) = self
            .engine
            .query_with_context(query, top_k, &self.options)
            .await?;

        let retrieval_metrics = relevant
            .map(|keys| evaluate(&retrieved, keys, top_k))
            .unwrap_or_default();
        let generation_metrics = self.judge.evaluate(query, &retrieved, &response).await;

        Ok(EvaluationResult {
            query: query.to_string(),
            retrieval_metrics,
            generation_metrics,
            response,
            retrieved_chunks: retrieved,
        })
    }
}

fn average_generation(results: &[EvaluationResult]) -> GenerationMetrics {
    if results.is_empty() {
        return GenerationMetrics::default();
    }
    let n = results.len() as f64;
    GenerationMetrics {
        faithfulness: results.iter().map(|r| r.generation_metrics.faithfulness).sum::<f64>() / n,
        answer_relevance: results.iter().map(|r| r.generation_metrics.answer_relevance).sum::<f64>() / n,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::llm::mock::{FailingProvider, HashEmbedder, ScriptedGenerator};
    use crate::llm::GenerationProvider;

    async fn indexed_engine(store: &Path, docs: &Path, generator: Arc<dyn GenerationProvider>) -> RagEngine {
        std::fs::write(docs.join("bread.txt"), "Sourdough needs a lively starter.").unwrap();
        std::fs::write(docs.join("rust.txt"), "Ownership moves values between bindings.").unwrap();
        let engine = RagEngine::with_providers(
            Config {
                store_dir: store.to_path_buf(),
                ..Config::default()
            },
            Arc::new(HashEmbedder::new(128)),
            generator,
        );
        engine.index(&[docs], &RagOptions::default()).await.unwrap();
        engine
    }

    /// Answers the final prompt, says yes to grounding and no to relevance.
    fn judging_generator() -> Arc<ScriptedGenerator> {
        Arc::new(ScriptedGenerator::new(|prompt| {
            Ok(if prompt.starts_with("Based on the following context") {
                "Feed the starter.".to_string()
            } else if prompt.contains("grounded in the provided context") {
                "Yes".to_string()
            } else {
                "No".to_string()
            })
        }))
    }

    #[test]
    fn test_dataset_parses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(
            &path,
            r#"{"queries":[{"query":"q1","relevantChunkIds":["a_0_0_5"]},{"query":"q2"}]}"#,
        )
        .unwrap();
        let dataset = EvaluationDataset::from_file(&path).unwrap();
        assert_eq!(dataset.queries.len(), 2);
        assert_eq!(dataset.queries[0].relevant_chunk_ids, vec!["a_0_0_5"]);
        assert!(dataset.queries[1].relevant_chunk_ids.is_empty());

        assert!(EvaluationDataset::from_file(&dir.path().join("missing.json")).is_err());
    }

    #[tokio::test]
    async fn test_report_averages_retrieval_and_generation() {
        let docs = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let engine = indexed_engine(store.path(), docs.path(), judging_generator()).await;
        let chunks = engine.loaded_chunks(crate::store::StoreFormat::Binary).unwrap();
        let bread = chunks
            .iter()
            .find(|c| c.text.contains("Sourdough"))
            .unwrap()
            .key();

        let dataset = EvaluationDataset {
            queries: vec![
                EvaluationQuery {
                    query: "sourdough starter".into(),
                    relevant_chunk_ids: vec![bread.clone()],
                },
                EvaluationQuery {
                    query: "ownership values".into(),
                    relevant_chunk_ids: vec![bread],
                },
            ],
        };
        let report = RagEvaluator::new(&engine, RagOptions::default())
            .evaluate(&dataset, 1)
            .await
            .unwrap();

        assert_eq!(report.total_queries, 2);
        assert_eq!(report.results[0].response, "Feed the starter.");
        assert_eq!(report.results[0].retrieval_metrics.mrr, 1.0);
        assert_eq!(report.results[1].retrieval_metrics.mrr, 0.0);
        assert_eq!(report.average_retrieval_metrics.mrr, 0.5);
        assert_eq!(report.average_generation_metrics.faithfulness, 1.0);
        assert_eq!(report.average_generation_metrics.answer_relevance, 0.0);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["averageGenerationMetrics"]["answerRelevance"].is_number());
        assert!(json["results"][0]["retrievalMetrics"]["precisionAtK"].is_number());
    }

    #[tokio::test]
    async fn test_failing_judge_is_neutral_and_unlabelled_query_scores_zero() {
        let docs = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let engine = indexed_engine(store.path(), docs.path(), judging_generator()).await;

        let result = RagEvaluator::new(&engine, RagOptions::default())
            .with_judge(GenerationJudge::new(Arc::new(FailingProvider::new(4))))
            .evaluate_single("sourdough starter", None, 1)
            .await
            .unwrap();
        assert_eq!(result.retrieval_metrics, RetrievalMetrics::default());
        assert_eq!(result.generation_metrics.faithfulness, 0.5);
        assert_eq!(result.generation_metrics.answer_relevance, 0.5);
        assert_eq!(result.retrieved_chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_answer_failure_aborts_run() {
        let docs = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let engine = indexed_engine(store.path(), docs.path(), Arc::new(FailingProvider::new(4))).await;
        let dataset = EvaluationDataset {
            queries: vec![EvaluationQuery {
                query: "q".into(),
                relevant_chunk_ids: Vec::new(),
            }],
        };
        assert!(RagEvaluator::new(&engine, RagOptions::default())
            .evaluate(&dataset, 1)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_empty_dataset_reports_zeros() {
        let docs = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let engine = indexed_engine(store.path(), docs.path(), judging_generator()).await;
        let report = RagEvaluator::new(&engine, RagOptions::default())
            .evaluate(&EvaluationDataset::default(), 3)
            .await
            .unwrap();
        assert_eq!(report.total_queries, 0);
        assert_eq!(report.average_generation_metrics, GenerationMetrics::default());
    }
}

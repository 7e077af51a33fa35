//! Retrieval-augmented strategy: embed chunks, retrieve per topic, pattern-match

use super::{chunks_for, finish, names, restrict_to_topics, selected_topics, Strategy, StrategyOptions};
use crate::chunking::Chunker;
use crate::config::ExtractorConfig;
use crate::error::ExtractorError;
use crate::patterns::extract_fields;
use async_trait::async_trait;
use concord_domain::topic::names as topics;
use concord_domain::{Chunk, FieldMap, StrategyResult, TopicDefinition, TopicRegistry};
use concord_retrieval::{EmbeddingModel, VectorIndex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Retrieval query for a topic
fn topic_query(topic: &TopicDefinition) -> String {
    let query = match topic.name.as_str() {
        topics::BASIC_INFO => "合同编号 合同名称 项目名称 甲方 乙方 委托方 受托方 买方 卖方",
        topics::FINANCIAL => "合同金额 总价 含税金额 不含税金额 税率 币种 付款方式 结算",
        topics::TIME_INFO => "签订日期 签署日期 开始日期 结束日期 服务期限 有效期",
        topics::MILESTONES => "付款节点 付款比例 里程碑 阶段 验收 首付款 尾款",
        topics::RATE_ITEMS => "人员 角色 级别 费率 人天 人月 单价",
        topics::LINE_ITEMS => "产品名称 规格型号 数量 单价 小计 清单",
        topics::RISK_CLAUSES => "违约责任 违约金 赔偿 责任上限 解除 终止 争议解决 仲裁 诉讼",
        _ => "",
    };
    if !query.is_empty() {
        return query.to_string();
    }

    let mut words = vec![topic.display_name.clone()];
    words.extend(topic.fields.iter().map(|f| f.description.clone()));
    words.join(" ")
}

/// Embeds chunks into a vector index and applies the pattern extractor to
/// the chunks retrieved for each topic
pub struct RagStrategy {
    embedder: Arc<dyn EmbeddingModel>,
    registry: Arc<TopicRegistry>,
    chunker: Chunker,
    config: ExtractorConfig,
}

impl RagStrategy {
    /// Create the strategy
    pub fn new(
        embedder: Arc<dyn EmbeddingModel>,
        registry: Arc<TopicRegistry>,
        config: ExtractorConfig,
    ) -> Self {
        Self {
            embedder,
            registry,
            chunker: Chunker::new(config.chunker.clone()),
            config,
        }
    }

    /// Embed one batch off the runtime, failing with `Timeout` past `embed_timeout_ms`
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ExtractorError> {
        let embedder = Arc::clone(&self.embedder);
        let budget = Duration::from_millis(self.config.rag.embed_timeout_ms);
        let task = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            embedder.embed_batch(&refs)
        });

        match tokio::time::timeout(budget, task).await {
            Ok(Ok(result)) => result.map_err(ExtractorError::from),
            Ok(Err(join_error)) => Err(ExtractorError::Embedding(format!(
                "embedding task failed: {}",
                join_error
            ))),
            Err(_) => Err(ExtractorError::Timeout(format!(
                "embedding after {}ms",
                budget.as_millis()
            ))),
        }
    }

    /// Embed every chunk that has text to embed, batch by batch
    async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        options: &StrategyOptions,
    ) -> Result<Vec<(usize, Vec<f32>)>, ExtractorError> {
        let rag = &self.config.rag;
        let embeddable: Vec<(usize, String)> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.text.chars().any(char::is_alphanumeric))
            .map(|(i, c)| (i, c.text.clone()))
            .collect();

        let mut embedded = Vec::with_capacity(embeddable.len());
        for (n, batch) in embeddable.chunks(rag.embed_batch_size.max(1)).enumerate() {
            if options.is_aborted() {
                return Err(ExtractorError::Timeout("aborted".to_string()));
            }
            if n > 0 && rag.embed_batch_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(rag.embed_batch_delay_ms)).await;
            }

            let texts = batch.iter().map(|(_, text)| text.clone()).collect();
            let vectors = self.embed(texts).await?;
            embedded.extend(batch.iter().map(|(id, _)| *id).zip(vectors));
        }
        Ok(embedded)
    }

    async fn retrieve(
        &self,
        text: &str,
        options: &StrategyOptions,
    ) -> Result<(FieldMap, Vec<f32>, Vec<String>, Vec<&TopicDefinition>), ExtractorError> {
        let chunks = chunks_for(&self.chunker, text, options);
        let embedded = self.embed_chunks(&chunks, options).await?;
        let selected = selected_topics(&self.registry, options);
        let queries = selected.iter().map(|t| topic_query(t)).collect();
        let query_vectors = self.embed(queries).await?;

        let index = VectorIndex::with_capacity(self.embedder.dimension(), embedded.len());
        for (id, vector) in &embedded {
            index.add(*id, vector)?;
        }
        debug!(indexed = index.len(), "Built chunk index");

        let rag = &self.config.rag;
        let mut fields = FieldMap::new();
        let mut similarities = Vec::new();
        let mut warnings = Vec::new();

        for (topic, query) in selected.iter().zip(&query_vectors) {
            let mut hits = index.search(query, rag.top_k, rag.similarity_threshold)?;
            if hits.is_empty() {
                warnings.push(format!("{}: no chunks retrieved", topic.name));
                continue;
            }
            similarities.extend(hits.iter().map(|(_, s)| *s));

            hits.sort_by_key(|(id, _)| *id);
            let retrieved: Vec<&str> = hits
                .iter()
                .filter_map(|(id, _)| chunks.get(*id))
                .map(|c| c.text.as_str())
                .collect();
            let found = restrict_to_topics(extract_fields(&retrieved.join("\n")), &[*topic]);
            debug!(topic = %topic.name, chunks = retrieved.len(), fields = found.len(), "Retrieved topic");
            for (name, value) in found {
                fields.entry(name).or_insert(value);
            }
        }
        Ok((fields, similarities, warnings, selected))
    }
}

#[async_trait]
impl Strategy for RagStrategy {
    fn name(&self) -> &str {
        names::RAG
    }

    fn is_available(&self) -> bool {
        self.embedder.dimension() > 0
    }

    fn priority(&self) -> u32 {
        60
    }

    async fn parse(&self, text: &str, options: &StrategyOptions) -> StrategyResult {
        let started = Instant::now();
        if text.trim().is_empty() {
            return StrategyResult::failed(self.name(), "document is empty");
        }

        match self.retrieve(text, options).await {
            Ok((fields, similarities, warnings, selected)) => {
                let confidence = if similarities.is_empty() {
                    0.0
                } else {
                    let mean = similarities.iter().sum::<f32>() / similarities.len() as f32;
                    (mean as f64 * 100.0).clamp(0.0, 100.0)
                };
                finish(
                    self.name(),
                    &self.registry,
                    fields,
                    &selected,
                    confidence,
                    warnings,
                    started,
                )
            }
            Err(e) => {
                warn!(error = %e, "Retrieval failed");
                StrategyResult::failed(self.name(), format!("retrieval failed: {}", e))
                    .with_duration_ms(started.elapsed().as_millis() as u64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RagConfig;
    use concord_retrieval::{EmbeddingError, NgramEmbeddingModel};
    use serde_json::json;

    const CONTRACT: &str = "合同编号：CT-001\n甲方：北京某某科技有限公司\n\
第一条 合同价款\n总价：人民币500,000元，税率6%\n\
第二条 违约责任\n违约方承担责任。\n";

    /// One axis per keyword, plus a small shared component
    struct KeywordModel;

    impl EmbeddingModel for KeywordModel {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let axis = |kw: &str| if text.contains(kw) { 1.0 } else { 0.0 };
            Ok(vec![axis("合同编号"), axis("总价"), 0.05])
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    struct BrokenModel;

    impl EmbeddingModel for BrokenModel {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::ModelNotLoaded)
        }

        fn dimension(&self) -> usize {
            8
        }
    }

    struct SlowModel;

    impl EmbeddingModel for SlowModel {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            std::thread::sleep(std::time::Duration::from_millis(300));
            Ok(vec![1.0, 0.0])
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn config(top_k: usize) -> ExtractorConfig {
        ExtractorConfig {
            rag: RagConfig {
                top_k,
                embed_batch_delay_ms: 0,
                ..RagConfig::default()
            },
            ..ExtractorConfig::default()
        }
    }

    fn strategy(embedder: Arc<dyn EmbeddingModel>, top_k: usize) -> RagStrategy {
        RagStrategy::new(
            embedder,
            Arc::new(TopicRegistry::contract_defaults()),
            config(top_k),
        )
    }

    #[test]
    fn test_every_default_topic_has_a_query() {
        let registry = TopicRegistry::contract_defaults();
        for topic in registry.topics() {
            assert!(!topic_query(topic).is_empty(), "{}", topic.name);
        }
        assert!(topic_query(registry.get("financial").unwrap()).contains("总价"));
    }

    #[tokio::test]
    async fn test_retrieved_chunks_feed_pattern_extraction() {
        let strategy = strategy(Arc::new(KeywordModel), 1);
        let result = strategy.parse(CONTRACT, &StrategyOptions::default()).await;

        assert_eq!(result.strategy_name, "rag");
        assert_eq!(result.fields["contractNo"], json!("CT-001"));
        assert_eq!(result.fields["amountWithTax"], json!("500000"));
        assert_eq!(result.fields["taxRate"], json!("0.06"));
        assert!(result.confidence > 99.0);
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_fields_come_only_from_retrieved_chunks() {
        let strategy = strategy(Arc::new(KeywordModel), 1);
        let options = StrategyOptions {
            topics: Some(vec!["basic_info".to_string()]),
            ..Default::default()
        };
        let result = strategy.parse(CONTRACT, &options).await;
        assert_eq!(result.fields["contractNo"], json!("CT-001"));
        assert!(!result.fields.contains_key("amountWithTax"));
        assert_eq!(result.topics, vec!["basic_info"]);
    }

    #[tokio::test]
    async fn test_ngram_model_with_small_batches() {
        let mut config = config(3);
        config.rag.embed_batch_size = 1;
        config.rag.embed_batch_delay_ms = 1;
        let strategy = RagStrategy::new(
            Arc::new(NgramEmbeddingModel::new(64)),
            Arc::new(TopicRegistry::contract_defaults()),
            config,
        );
        let options = StrategyOptions {
            topics: Some(vec!["financial".to_string()]),
            ..Default::default()
        };
        let result = strategy.parse(CONTRACT, &options).await;
        assert_eq!(result.fields["amountWithTax"], json!("500000"));
        assert!(result.confidence > 0.0);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_contained() {
        let strategy = strategy(Arc::new(BrokenModel), 3);
        let result = strategy.parse(CONTRACT, &StrategyOptions::default()).await;
        assert!(result.fields.is_empty());
        assert_eq!(result.confidence, 0.0);
        assert!(result.warnings[0].starts_with("retrieval failed"));
    }

    #[tokio::test]
    async fn test_slow_embedding_times_out() {
        let mut config = config(3);
        config.rag.embed_timeout_ms = 20;
        config.rag.embed_batch_size = 1;
        let strategy = RagStrategy::new(
            Arc::new(SlowModel),
            Arc::new(TopicRegistry::contract_defaults()),
            config,
        );

        let started = Instant::now();
        let result = strategy.parse(CONTRACT, &StrategyOptions::default()).await;
        assert!(started.elapsed() < Duration::from_millis(250));
        assert!(result.fields.is_empty());
        assert_eq!(
            result.warnings,
            vec!["retrieval failed: Timeout: embedding after 20ms"]
        );
    }

    #[tokio::test]
    async fn test_empty_document() {
        let result = strategy(Arc::new(KeywordModel), 3)
            .parse("", &StrategyOptions::default())
            .await;
        assert_eq!(result.completeness, 0.0);
        assert_eq!(result.warnings, vec!["document is empty"]);
    }
}

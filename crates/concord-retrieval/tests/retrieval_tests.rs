//! Integration tests for embedding plus index retrieval

use concord_retrieval::{EmbeddingModel, NgramEmbeddingModel, VectorIndex};

const SECTIONS: &[&str] = &[
    "合同编号：CT-2024-001 合同名称：数据平台建设项目",
    "甲方：北京某某科技有限公司 乙方：上海某某信息技术有限公司",
    "合同总价为人民币500,000元（含税），税率6%，付款方式为银行转账",
    "里程碑：需求确认后支付30%，上线验收后支付40%，质保期满支付30%",
    "违约责任：逾期交付的，每日按合同总价的千分之一支付违约金",
    "争议解决：因本合同引起的争议，提交上海仲裁委员会仲裁",
];

fn build_index(model: &NgramEmbeddingModel) -> VectorIndex {
    let index = VectorIndex::with_capacity(model.dimension(), SECTIONS.len());
    let embeddings = model.embed_batch(SECTIONS).unwrap();
    for (id, embedding) in embeddings.iter().enumerate() {
        index.add(id, embedding).unwrap();
    }
    index
}

#[test]
fn test_query_retrieves_matching_section() {
    let model = NgramEmbeddingModel::new(512);
    let index = build_index(&model);

    let query = model.embed("争议解决 仲裁").unwrap();
    let hits = index.search(&query, 2, 0.05).unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].0, 5);
}

#[test]
fn test_financial_query_ranks_price_section_first() {
    let model = NgramEmbeddingModel::new(512);
    let index = build_index(&model);

    let query = model.embed("合同总价 含税 税率 付款方式").unwrap();
    let hits = index.search(&query, 3, 0.05).unwrap();
    assert_eq!(hits[0].0, 2);
    assert!(hits.windows(2).all(|w| w[0].1 >= w[1].1));
}

#[test]
fn test_high_threshold_returns_nothing_for_unrelated_query() {
    let model = NgramEmbeddingModel::new(512);
    let index = build_index(&model);

    let query = model.embed("weather forecast sunny").unwrap();
    let hits = index.search(&query, 3, 0.5).unwrap();
    assert!(hits.is_empty());
}

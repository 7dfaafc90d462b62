//! 批次处理流程 - 流程层
//!
//! 核心职责：定义"一个批次"的完整处理流程
//!
//! 流程顺序：
//! 1. 批次提示词 → Oracle 调用 → 解析对齐
//! 2. 批次失败（调用异常或应答不可解析）→ 逐题兜底
//! 3. 逐题兜底也失败 → 记为 Failed（未解决）
//!
//! 每道题最终都有一个带标签的结局：Classified 或 Failed，绝不静默丢弃

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{info, warn};

use crate::models::dimension::Dimension;
use crate::models::question::Question;
use crate::models::reference::ReferenceSet;
use crate::models::report::{
    DimensionMapping, DimensionRating, MappingRecommendation, Rating, RatingResult, TokenUsage,
};
use crate::services::llm_service::Oracle;
use crate::services::prompt_builder;
use crate::services::response_parser;
use crate::workflow::batch_ctx::BatchCtx;
use crate::workflow::pacer::Pacer;

/// 批次大小下限
pub const MIN_BATCH_SIZE: usize = 1;
/// 批次大小上限
pub const MAX_BATCH_SIZE: usize = 10;

/// 把配置的批次大小钳制到合法区间
pub fn clamp_batch_size(requested: usize) -> usize {
    let clamped = requested.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE);
    if clamped != requested {
        warn!(
            "⚠️ 批次大小 {} 超出 [{}, {}]，已钳制为 {}",
            requested, MIN_BATCH_SIZE, MAX_BATCH_SIZE, clamped
        );
    }
    clamped
}

/// 单道题目的最终结局
#[derive(Debug, Clone)]
pub enum ItemOutcome<T> {
    /// 成功产出结果
    Classified(T),
    /// 批次与逐题兜底均失败
    Failed {
        question_number: String,
        reason: String,
    },
}

/// 批次处理流程
///
/// - 编排单个批次：批量调用 → 解析 → 兜底
/// - 持有 Oracle 与节流器，不关心批次之间的顺序
pub struct BatchFlow {
    oracle: Arc<dyn Oracle>,
    pacer: Arc<dyn Pacer>,
    references: Vec<ReferenceSet>,
}

impl BatchFlow {
    pub fn new(oracle: Arc<dyn Oracle>, pacer: Arc<dyn Pacer>, references: Vec<ReferenceSet>) -> Self {
        Self {
            oracle,
            pacer,
            references,
        }
    }

    pub fn references(&self) -> &[ReferenceSet] {
        &self.references
    }

    fn is_multi(&self) -> bool {
        self.references.len() > 1
    }

    /// 调用 Oracle 并累计 token 用量
    async fn call(&self, user_message: &str, max_tokens: u32, usage: &mut TokenUsage) -> Result<String> {
        let reply = self
            .oracle
            .complete(prompt_builder::SYSTEM_PROMPT, user_message, max_tokens)
            .await?;
        usage.record(reply.prompt_tokens, reply.completion_tokens);
        self.pacer.after_call().await;
        Ok(reply.content)
    }

    // ========== 分类（Mode A） ==========

    /// 处理一个分类批次
    pub async fn classify_batch(
        &self,
        batch: &[Question],
        ctx: &BatchCtx,
        usage: &mut TokenUsage,
    ) -> Vec<ItemOutcome<MappingRecommendation>> {
        let ids: Vec<String> = batch.iter().map(|q| q.number.clone()).collect();
        let user_message = if self.is_multi() {
            prompt_builder::multi_mapping_prompt(batch, &self.references)
        } else {
            prompt_builder::batch_mapping_prompt(batch, &self.references[0])
        };
        let budget = prompt_builder::response_budget(batch.len(), self.references.len(), false);

        let entries = match self.call(&user_message, budget, usage).await {
            Ok(content) => match response_parser::parse_json_relaxed(&content) {
                Ok(payload) => Some(response_parser::aligned_entries(&payload, "mappings", &ids)),
                Err(e) => {
                    warn!("{} ⚠️ 批次应答不可解析: {}，转入逐题兜底", ctx, e);
                    None
                }
            },
            Err(e) => {
                warn!("{} ⚠️ 批次调用失败: {}，转入逐题兜底", ctx, e);
                None
            }
        };

        let mut outcomes = Vec::with_capacity(batch.len());
        match entries {
            Some(entries) => {
                for (question, entry) in batch.iter().zip(entries.into_iter()) {
                    match entry.and_then(|e| self.recommendation_from_entry(question, &e)) {
                        Some(rec) => outcomes.push(ItemOutcome::Classified(rec)),
                        None => {
                            warn!("{} ⚠️ 题目 {} 缺少可用条目，逐题兜底", ctx, question.number);
                            outcomes.push(self.fallback_classify_item(question, usage).await);
                        }
                    }
                }
            }
            None => {
                for question in batch {
                    outcomes.push(self.fallback_classify_item(question, usage).await);
                }
            }
        }

        let recovered = outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::Classified(_)))
            .count();
        info!("{} ✓ 批次完成: 成功 {}/{}", ctx, recovered, batch.len());
        outcomes
    }

    /// 逐题兜底：对每个请求维度发一次单题单维度提示词
    async fn fallback_classify_item(
        &self,
        question: &Question,
        usage: &mut TokenUsage,
    ) -> ItemOutcome<MappingRecommendation> {
        let mut mappings: BTreeMap<Dimension, DimensionMapping> = BTreeMap::new();
        let mut justification = String::new();

        for reference in &self.references {
            let user_message = prompt_builder::single_mapping_prompt(question, reference);
            let budget = prompt_builder::response_budget(1, 1, false);

            let content = match self.call(&user_message, budget, usage).await {
                Ok(content) => content,
                Err(e) => {
                    return ItemOutcome::Failed {
                        question_number: question.number.clone(),
                        reason: format!("兜底调用失败 ({}): {}", reference.dimension, e),
                    }
                }
            };

            let payload = match response_parser::parse_json_relaxed(&content) {
                Ok(payload) => payload,
                Err(e) => {
                    return ItemOutcome::Failed {
                        question_number: question.number.clone(),
                        reason: format!("兜底应答不可解析 ({}): {}", reference.dimension, e),
                    }
                }
            };

            let ids = vec![question.number.clone()];
            let entry = response_parser::aligned_entries(&payload, "mappings", &ids)
                .into_iter()
                .next()
                .flatten();
            let mapping = entry
                .as_ref()
                .and_then(|e| single_dimension_mapping(reference.dimension, e, &question.number, 0.0));

            match mapping {
                Some(mapping) => {
                    if let Some(entry) = entry.as_ref() {
                        if let Some(j) = response_parser::str_field(entry, &["justification"]) {
                            justification = j;
                        }
                    }
                    mappings.insert(reference.dimension, mapping);
                }
                None => {
                    return ItemOutcome::Failed {
                        question_number: question.number.clone(),
                        reason: format!("兜底应答缺少映射字段 ({})", reference.dimension),
                    }
                }
            }
        }

        let confidence = average_confidence(&mappings);
        ItemOutcome::Classified(MappingRecommendation {
            question_number: question.number.clone(),
            question_text: question.text.clone(),
            mappings,
            confidence,
            justification,
        })
    }

    /// 把一个批次条目转成分类建议；缺少映射字段时返回 None（触发兜底）
    fn recommendation_from_entry(
        &self,
        question: &Question,
        entry: &Value,
    ) -> Option<MappingRecommendation> {
        let mut mappings: BTreeMap<Dimension, DimensionMapping> = BTreeMap::new();

        if self.is_multi() {
            for reference in &self.references {
                if let Some(mapping) =
                    multi_dimension_mapping(reference.dimension, entry, &question.number)
                {
                    mappings.insert(reference.dimension, mapping);
                } else {
                    warn!(
                        "⚠️ 题目 {} 的应答缺少维度 {}",
                        question.number, reference.dimension
                    );
                }
            }
        } else {
            let dimension = self.references[0].dimension;
            if let Some(mapping) = single_dimension_mapping(dimension, entry, &question.number, 0.0)
            {
                mappings.insert(dimension, mapping);
            }
        }

        if mappings.is_empty() {
            return None;
        }

        let confidence = average_confidence(&mappings);
        Some(MappingRecommendation {
            question_number: question.number.clone(),
            question_text: question.text.clone(),
            mappings,
            confidence,
            justification: response_parser::str_field(entry, &["justification"])
                .unwrap_or_default(),
        })
    }

    // ========== 评审（Mode B） ==========

    /// 处理一个评审批次
    pub async fn rate_batch(
        &self,
        batch: &[Question],
        ctx: &BatchCtx,
        usage: &mut TokenUsage,
    ) -> Vec<ItemOutcome<RatingResult>> {
        let ids: Vec<String> = batch.iter().map(|q| q.number.clone()).collect();
        let user_message = if self.is_multi() {
            prompt_builder::multi_rating_prompt(batch, &self.references)
        } else {
            prompt_builder::batch_rating_prompt(batch, &self.references[0])
        };
        let budget = prompt_builder::response_budget(batch.len(), self.references.len(), true);

        let entries = match self.call(&user_message, budget, usage).await {
            Ok(content) => match response_parser::parse_json_relaxed(&content) {
                Ok(payload) => Some(response_parser::aligned_entries(&payload, "ratings", &ids)),
                Err(e) => {
                    warn!("{} ⚠️ 批次应答不可解析: {}，转入逐题兜底", ctx, e);
                    None
                }
            },
            Err(e) => {
                warn!("{} ⚠️ 批次调用失败: {}，转入逐题兜底", ctx, e);
                None
            }
        };

        let mut outcomes = Vec::with_capacity(batch.len());
        match entries {
            Some(entries) => {
                for (question, entry) in batch.iter().zip(entries.into_iter()) {
                    match entry.map(|e| self.rating_from_entry(question, &e)) {
                        Some(result) => outcomes.push(ItemOutcome::Classified(result)),
                        None => {
                            warn!("{} ⚠️ 题目 {} 缺少可用条目，逐题兜底", ctx, question.number);
                            outcomes.push(self.fallback_rate_item(question, usage).await);
                        }
                    }
                }
            }
            None => {
                for question in batch {
                    outcomes.push(self.fallback_rate_item(question, usage).await);
                }
            }
        }

        let recovered = outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::Classified(_)))
            .count();
        info!("{} ✓ 批次完成: 成功 {}/{}", ctx, recovered, batch.len());
        outcomes
    }

    /// 逐题兜底：对每个请求维度发一次单题评审提示词
    async fn fallback_rate_item(
        &self,
        question: &Question,
        usage: &mut TokenUsage,
    ) -> ItemOutcome<RatingResult> {
        let mut dimension_ratings: BTreeMap<Dimension, DimensionRating> = BTreeMap::new();
        let mut justification = String::new();

        for reference in &self.references {
            let user_message = prompt_builder::single_rating_prompt(question, reference);
            let budget = prompt_builder::response_budget(1, 1, true);

            let content = match self.call(&user_message, budget, usage).await {
                Ok(content) => content,
                Err(e) => {
                    return ItemOutcome::Failed {
                        question_number: question.number.clone(),
                        reason: format!("兜底调用失败 ({}): {}", reference.dimension, e),
                    }
                }
            };

            let payload = match response_parser::parse_json_relaxed(&content) {
                Ok(payload) => payload,
                Err(e) => {
                    return ItemOutcome::Failed {
                        question_number: question.number.clone(),
                        reason: format!("兜底应答不可解析 ({}): {}", reference.dimension, e),
                    }
                }
            };

            let ids = vec![question.number.clone()];
            let entry = response_parser::aligned_entries(&payload, "ratings", &ids)
                .into_iter()
                .next()
                .flatten();

            match entry {
                Some(entry) => {
                    if let Some(j) = response_parser::str_field(&entry, &["justification"]) {
                        justification = j;
                    }
                    let rating =
                        single_dimension_rating(question, reference.dimension, &entry);
                    dimension_ratings.insert(reference.dimension, rating);
                }
                None => {
                    return ItemOutcome::Failed {
                        question_number: question.number.clone(),
                        reason: format!("兜底应答缺少条目 ({})", reference.dimension),
                    }
                }
            }
        }

        ItemOutcome::Classified(assemble_rating_result(
            question,
            dimension_ratings,
            None,
            justification,
        ))
    }

    /// 把一个批次条目转成评审结果
    fn rating_from_entry(&self, question: &Question, entry: &Value) -> RatingResult {
        let mut dimension_ratings: BTreeMap<Dimension, DimensionRating> = BTreeMap::new();

        if self.is_multi() {
            for reference in &self.references {
                let sub = entry.get(reference.dimension.key());
                let rating = match sub {
                    Some(sub) => single_dimension_rating(question, reference.dimension, sub),
                    None => {
                        warn!(
                            "⚠️ 题目 {} 的评审应答缺少维度 {}",
                            question.number, reference.dimension
                        );
                        DimensionRating {
                            current: question
                                .existing_mapping(reference.dimension)
                                .unwrap_or("")
                                .to_string(),
                            rating: Rating::Unknown,
                            suggested: None,
                            confidence: 0.0,
                        }
                    }
                };
                dimension_ratings.insert(reference.dimension, rating);
            }
        } else {
            let dimension = self.references[0].dimension;
            let rating = single_dimension_rating(question, dimension, entry);
            dimension_ratings.insert(dimension, rating);
        }

        let overall = response_parser::str_field(entry, &["overall_rating"]).map(|s| Rating::parse(&s));
        assemble_rating_result(
            question,
            dimension_ratings,
            overall,
            response_parser::str_field(entry, &["justification"]).unwrap_or_default(),
        )
    }
}

// ========== 条目字段提取 ==========

/// 单维度条目 → 映射结果；没有任何编码字段时返回 None
fn single_dimension_mapping(
    dimension: Dimension,
    entry: &Value,
    question_number: &str,
    default_confidence: f64,
) -> Option<DimensionMapping> {
    let (code, subtopic) = match dimension {
        Dimension::AreaTopics => {
            let topic = response_parser::str_field(entry, &["mapped_topic", "topic"])?;
            let subtopic = response_parser::str_field(entry, &["mapped_subtopic", "subtopic"]);
            (topic, subtopic)
        }
        _ => {
            let code = response_parser::str_field(entry, &["mapped_id", "code", "mapped_code"])?;
            (code, None)
        }
    };

    let confidence = response_parser::checked_confidence(
        response_parser::num_field(
            entry,
            &["confidence_score", "confidence"],
            default_confidence,
        ),
        question_number,
    );
    if !dimension.matches_code(&code) {
        warn!(
            "⚠️ 题目 {} 的编码 \"{}\" 不符合维度 {} 的形态",
            question_number, code, dimension
        );
    }
    Some(DimensionMapping {
        code,
        subtopic,
        confidence,
    })
}

/// 多维度条目里取某一维度的映射
///
/// 支持嵌套对象（`{"competency": {"code": ...}}`）和
/// 扁平字段（`area_topics_topic` 等）两种应答风格
fn multi_dimension_mapping(
    dimension: Dimension,
    entry: &Value,
    question_number: &str,
) -> Option<DimensionMapping> {
    if let Some(sub) = entry.get(dimension.key()) {
        if sub.is_object() {
            // 多维度应答的置信度缺省偏高：Oracle 普遍省略该字段
            return single_dimension_mapping(dimension, sub, question_number, 0.85);
        }
        if let Some(code) = sub.as_str() {
            return Some(DimensionMapping {
                code: code.trim().to_string(),
                subtopic: None,
                confidence: 0.85,
            });
        }
    }

    if dimension == Dimension::AreaTopics {
        let topic = response_parser::str_field(entry, &["area_topics_topic"])?;
        let subtopic = response_parser::str_field(entry, &["area_topics_subtopic"]);
        let confidence = response_parser::checked_confidence(
            response_parser::num_field(entry, &["area_topics_confidence"], 0.85),
            question_number,
        );
        return Some(DimensionMapping {
            code: topic,
            subtopic,
            confidence,
        });
    }
    None
}

/// 单维度评审条目 → 评审结果
///
/// 一致性规则：判定为 correct 但建议编码与当前不同时，只告警并保留当前编码
fn single_dimension_rating(
    question: &Question,
    dimension: Dimension,
    entry: &Value,
) -> DimensionRating {
    let current = response_parser::str_field(entry, &["current"])
        .or_else(|| question.existing_mapping(dimension).map(|s| s.to_string()))
        .unwrap_or_default();
    let rating = response_parser::str_field(entry, &["rating"])
        .map(|s| Rating::parse(&s))
        .unwrap_or(Rating::Unknown);
    let mut suggested = response_parser::str_field(
        entry,
        &["suggested_id", "suggested_code", "suggested", "suggested_topic"],
    );
    let confidence = response_parser::checked_confidence(
        response_parser::num_field(entry, &["agreement_score", "confidence"], 0.0),
        &question.number,
    );

    if rating == Rating::Correct {
        if let Some(s) = suggested.as_deref() {
            if !current.is_empty() && s != current {
                warn!(
                    "⚠️ 题目 {} 维度 {} 判定为 correct 但建议了不同编码 \"{}\"，保留当前编码",
                    question.number, dimension, s
                );
                suggested = Some(current.clone());
            }
        }
    }

    DimensionRating {
        current,
        rating,
        suggested,
        confidence,
    }
}

fn assemble_rating_result(
    question: &Question,
    dimension_ratings: BTreeMap<Dimension, DimensionRating>,
    overall: Option<Rating>,
    justification: String,
) -> RatingResult {
    let worst = dimension_ratings
        .values()
        .map(|r| r.rating)
        .fold(Rating::Correct, Rating::worst);
    let overall_rating = match overall {
        Some(rating) if rating != Rating::Unknown => rating,
        _ => worst,
    };
    let agreement_score = if dimension_ratings.is_empty() {
        0.0
    } else {
        dimension_ratings.values().map(|r| r.confidence).sum::<f64>()
            / dimension_ratings.len() as f64
    };

    RatingResult {
        question_number: question.number.clone(),
        question_text: question.text.clone(),
        dimension_ratings,
        overall_rating,
        agreement_score,
        justification,
    }
}

fn average_confidence(mappings: &BTreeMap<Dimension, DimensionMapping>) -> f64 {
    if mappings.is_empty() {
        return 0.0;
    }
    mappings.values().map(|m| m.confidence).sum::<f64>() / mappings.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clamp_batch_size() {
        assert_eq!(clamp_batch_size(0), 1);
        assert_eq!(clamp_batch_size(5), 5);
        assert_eq!(clamp_batch_size(50), 10);
    }

    #[test]
    fn test_single_dimension_mapping_defaults() {
        let entry = json!({"mapped_id": "C2"});
        let mapping =
            single_dimension_mapping(Dimension::Competency, &entry, "Q1", 0.0).expect("缺少映射");
        assert_eq!(mapping.code, "C2");
        assert_eq!(mapping.confidence, 0.0);
        assert!(mapping.subtopic.is_none());
    }

    #[test]
    fn test_area_topics_mapping_fields() {
        let entry = json!({
            "mapped_topic": "Cardiology",
            "mapped_subtopic": "Shock",
            "confidence_score": 0.8,
        });
        let mapping =
            single_dimension_mapping(Dimension::AreaTopics, &entry, "Q1", 0.0).expect("缺少映射");
        assert_eq!(mapping.code, "Cardiology");
        assert_eq!(mapping.subtopic.as_deref(), Some("Shock"));
    }

    #[test]
    fn test_mapping_missing_code_is_none() {
        let entry = json!({"confidence_score": 0.9});
        assert!(single_dimension_mapping(Dimension::Skill, &entry, "Q1", 0.0).is_none());
    }

    #[test]
    fn test_multi_dimension_mapping_nested_and_flat() {
        let entry = json!({
            "question_id": "Q1",
            "blooms": {"code": "KL3", "confidence": 0.7},
            "area_topics_topic": "Respiratory",
            "area_topics_subtopic": "Asthma",
        });
        let blooms =
            multi_dimension_mapping(Dimension::Blooms, &entry, "Q1").expect("缺少 blooms");
        assert_eq!(blooms.code, "KL3");
        assert!((blooms.confidence - 0.7).abs() < 1e-9);

        let topics =
            multi_dimension_mapping(Dimension::AreaTopics, &entry, "Q1").expect("缺少 topics");
        assert_eq!(topics.code, "Respiratory");
        assert!((topics.confidence - 0.85).abs() < 1e-9);

        assert!(multi_dimension_mapping(Dimension::Skill, &entry, "Q1").is_none());
    }

    #[test]
    fn test_consistent_correct_rating_keeps_suggestion() {
        let mut question = Question::new("Q1", "text");
        question
            .existing
            .insert(Dimension::Competency, "C1".to_string());
        let entry = json!({"rating": "correct", "suggested_id": "C1", "agreement_score": 0.9});
        let rating = single_dimension_rating(&question, Dimension::Competency, &entry);
        assert_eq!(rating.rating, Rating::Correct);
        assert_eq!(rating.suggested.as_deref(), Some("C1"));
    }

    #[test]
    fn test_divergent_correct_rating_is_reconciled() {
        let mut question = Question::new("Q1", "text");
        question
            .existing
            .insert(Dimension::Competency, "C1".to_string());
        // 判定 correct 却建议了别的编码：保留当前编码
        let entry = json!({"rating": "correct", "suggested_id": "C4", "agreement_score": 0.9});
        let rating = single_dimension_rating(&question, Dimension::Competency, &entry);
        assert_eq!(rating.suggested.as_deref(), Some("C1"));
    }

    #[test]
    fn test_assemble_overall_takes_worst() {
        let question = Question::new("Q1", "text");
        let mut ratings = BTreeMap::new();
        ratings.insert(
            Dimension::Competency,
            DimensionRating {
                current: "C1".to_string(),
                rating: Rating::Correct,
                suggested: None,
                confidence: 1.0,
            },
        );
        ratings.insert(
            Dimension::Blooms,
            DimensionRating {
                current: "KL2".to_string(),
                rating: Rating::Incorrect,
                suggested: Some("KL4".to_string()),
                confidence: 0.5,
            },
        );
        let result = assemble_rating_result(&question, ratings, None, String::new());
        assert_eq!(result.overall_rating, Rating::Incorrect);
        assert!((result.agreement_score - 0.75).abs() < 1e-9);
    }
}

//! 评审引擎 - 编排层
//!
//! ## 职责
//!
//! Mode B（评审已有映射）的运行级循环：
//!
//! 1. **预检**：参考体系为空立即报错；缺少已有映射的题目只告警
//! 2. **分批调度**：同分类引擎，逐批交给 BatchFlow
//! 3. **结果汇总**：判定计数、正确率、平均认同度、按维度细分
//! 4. **修正建议**：非 correct 的判定生成修正建议，供导出时采纳

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::AppResult;
use crate::models::question::Question;
use crate::models::reference::ReferenceSet;
use crate::models::report::{
    CorrectionRecommendation, DimensionSummary, Rating, RatingReport, RatingResult, RatingSummary,
    TokenUsage, UnresolvedItem,
};
use crate::services::llm_service::Oracle;
use crate::services::unresolved_writer::UnresolvedWriter;
use crate::workflow::batch_ctx::BatchCtx;
use crate::workflow::batch_flow::{clamp_batch_size, BatchFlow, ItemOutcome};
use crate::workflow::pacer::Pacer;

use super::audit_engine::{log_run_start, validate_references};

/// 评审引擎
pub struct RatingEngine {
    flow: BatchFlow,
    pacer: Arc<dyn Pacer>,
    batch_size: usize,
    unresolved_writer: Option<UnresolvedWriter>,
}

impl RatingEngine {
    /// 创建引擎；参考体系为空时在这里直接失败（预检）
    pub fn new(
        oracle: Arc<dyn Oracle>,
        pacer: Arc<dyn Pacer>,
        references: Vec<ReferenceSet>,
        batch_size: usize,
    ) -> AppResult<Self> {
        validate_references(&references)?;
        let batch_size = clamp_batch_size(batch_size);
        Ok(Self {
            flow: BatchFlow::new(oracle, pacer.clone(), references),
            pacer,
            batch_size,
            unresolved_writer: None,
        })
    }

    /// 启用未解决题目落盘
    pub fn with_unresolved_writer(mut self, writer: UnresolvedWriter) -> Self {
        self.unresolved_writer = Some(writer);
        self
    }

    /// 运行一次完整的评审
    pub async fn run(&self, questions: &[Question]) -> AppResult<RatingReport> {
        let dimensions: Vec<_> = self.flow.references().iter().map(|r| r.dimension).collect();
        log_run_start("评审", questions.len(), self.batch_size, &dimensions);

        for question in questions {
            for dim in &dimensions {
                if question.existing_mapping(*dim).is_none() {
                    warn!(
                        "⚠️ 题目 {} 缺少维度 {} 的已有映射，评审时按 (none) 处理",
                        question.number, dim
                    );
                }
            }
        }

        let mut usage = TokenUsage::default();
        let mut ratings: Vec<RatingResult> = Vec::new();
        let mut unresolved: Vec<UnresolvedItem> = Vec::new();

        let total_batches = (questions.len() + self.batch_size - 1) / self.batch_size;
        for (idx, batch) in questions.chunks(self.batch_size).enumerate() {
            let ctx = BatchCtx::new(
                idx + 1,
                total_batches,
                idx * self.batch_size + 1,
                idx * self.batch_size + batch.len(),
            );
            info!("\n📦 {} 题目 {}-{}", ctx, ctx.start, ctx.end);

            let outcomes = self.flow.rate_batch(batch, &ctx, &mut usage).await;
            for outcome in outcomes {
                match outcome {
                    ItemOutcome::Classified(result) => ratings.push(result),
                    ItemOutcome::Failed {
                        question_number,
                        reason,
                    } => {
                        warn!("❌ 题目 {} 未解决: {}", question_number, reason);
                        if let Some(writer) = self.unresolved_writer.as_ref() {
                            if let Err(e) = writer.write(&question_number, &reason) {
                                warn!("⚠️ 未解决记录写入失败: {}", e);
                            }
                        }
                        unresolved.push(UnresolvedItem {
                            question_number,
                            reason,
                        });
                    }
                }
            }

            if idx + 1 < total_batches {
                self.pacer.between_batches().await;
            }
        }

        let summary = summarize(&ratings);
        let recommendations = extract_recommendations(&ratings);
        print_final_stats(&summary, unresolved.len(), &usage);

        Ok(RatingReport {
            dimensions,
            ratings,
            summary,
            recommendations,
            unresolved,
            token_usage: usage,
        })
    }
}

/// 汇总评审统计
fn summarize(ratings: &[RatingResult]) -> RatingSummary {
    let total_rated = ratings.len();
    let mut correct = 0usize;
    let mut partially_correct = 0usize;
    let mut incorrect = 0usize;
    let mut unknown = 0usize;
    let mut per_dimension: BTreeMap<_, DimensionSummary> = BTreeMap::new();

    for result in ratings {
        match result.overall_rating {
            Rating::Correct => correct += 1,
            Rating::PartiallyCorrect => partially_correct += 1,
            Rating::Incorrect => incorrect += 1,
            Rating::Unknown => unknown += 1,
        }
        for (dim, rating) in &result.dimension_ratings {
            let entry = per_dimension.entry(*dim).or_default();
            match rating.rating {
                Rating::Correct => entry.correct += 1,
                Rating::PartiallyCorrect => entry.partially_correct += 1,
                Rating::Incorrect => entry.incorrect += 1,
                Rating::Unknown => entry.unknown += 1,
            }
        }
    }

    let accuracy_rate = if total_rated == 0 {
        0.0
    } else {
        correct as f64 / total_rated as f64
    };
    let average_agreement_score = if total_rated == 0 {
        0.0
    } else {
        ratings.iter().map(|r| r.agreement_score).sum::<f64>() / total_rated as f64
    };

    RatingSummary {
        total_rated,
        correct,
        partially_correct,
        incorrect,
        unknown,
        accuracy_rate,
        average_agreement_score,
        per_dimension,
    }
}

/// 非 correct 的维度判定生成修正建议
fn extract_recommendations(ratings: &[RatingResult]) -> Vec<CorrectionRecommendation> {
    let mut recommendations = Vec::new();
    for result in ratings {
        for (dim, rating) in &result.dimension_ratings {
            if !matches!(rating.rating, Rating::PartiallyCorrect | Rating::Incorrect) {
                continue;
            }
            recommendations.push(CorrectionRecommendation {
                question_number: result.question_number.clone(),
                question_text: result.question_text.clone(),
                dimension: *dim,
                current_code: rating.current.clone(),
                suggested_code: rating.suggested.clone().unwrap_or_default(),
                suggestion_confidence: rating.confidence,
                rating: rating.rating,
                justification: result.justification.clone(),
            });
        }
    }
    recommendations
}

fn print_final_stats(summary: &RatingSummary, unresolved: usize, usage: &TokenUsage) {
    info!("\n{}", "=".repeat(60));
    info!("📊 评审完成统计");
    info!("{}", "=".repeat(60));
    info!("✅ correct: {}/{}", summary.correct, summary.total_rated);
    info!("🟡 partially_correct: {}", summary.partially_correct);
    info!("❌ incorrect: {}", summary.incorrect);
    if summary.unknown > 0 {
        info!("❓ unknown: {}", summary.unknown);
    }
    info!("📈 正确率: {:.3} | 平均认同度: {:.3}",
        summary.accuracy_rate, summary.average_agreement_score
    );
    info!("⚠️ 未解决: {}", unresolved);
    info!(
        "🔢 Token 用量: {} (调用 {} 次)",
        usage.total_tokens, usage.api_calls
    );
    info!("{}", "=".repeat(60));
}

//! 分类审核引擎 - 编排层
//!
//! ## 职责
//!
//! Mode A（首次分类）的运行级循环：
//!
//! 1. **预检**：参考体系为空立即报错，不发起任何 Oracle 调用
//! 2. **分批调度**：把题目按钳制后的批次大小切块，逐批交给 BatchFlow
//! 3. **断点续跑**：带 run_id 时跳过已完成的批次
//! 4. **结果汇总**：覆盖度、缺口、未解决清单、平均置信度、token 用量
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个批次的细节，向下委托 workflow::BatchFlow
//! - **全串行**：批与批之间顺序执行，节流交给 Pacer

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{AppError, AppResult, BusinessError, ReferenceError};
use crate::models::question::Question;
use crate::models::reference::ReferenceSet;
use crate::models::report::{AuditReport, MappingRecommendation, TokenUsage, UnresolvedItem};
use crate::services::coverage::CoverageAggregator;
use crate::services::llm_service::Oracle;
use crate::services::unresolved_writer::UnresolvedWriter;
use crate::workflow::batch_ctx::BatchCtx;
use crate::workflow::batch_flow::{clamp_batch_size, BatchFlow, ItemOutcome};
use crate::workflow::checkpoint::{CheckpointStore, RunCheckpoint};
use crate::workflow::pacer::Pacer;

/// 分类审核引擎
pub struct AuditEngine {
    flow: BatchFlow,
    pacer: Arc<dyn Pacer>,
    batch_size: usize,
    checkpoints: Option<CheckpointStore>,
    unresolved_writer: Option<UnresolvedWriter>,
}

impl AuditEngine {
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
            checkpoints: None,
            unresolved_writer: None,
        })
    }

    /// 启用断点续跑
    pub fn with_checkpoints(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// 启用未解决题目落盘
    pub fn with_unresolved_writer(mut self, writer: UnresolvedWriter) -> Self {
        self.unresolved_writer = Some(writer);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 运行一次完整的分类审核
    ///
    /// `run_id` 非空且启用了断点存储时，同一 run_id 的重跑会跳过已完成批次
    pub async fn run(
        &self,
        questions: &[Question],
        run_id: Option<&str>,
    ) -> AppResult<AuditReport> {
        let dimensions: Vec<_> = self.flow.references().iter().map(|r| r.dimension).collect();
        log_run_start("分类审核", questions.len(), self.batch_size, &dimensions);

        let mut usage = TokenUsage::default();
        let mut recommendations: Vec<MappingRecommendation> = Vec::new();
        let mut unresolved: Vec<UnresolvedItem> = Vec::new();

        if questions.is_empty() {
            warn!("⚠️ 题目列表为空，直接生成空报告");
            return Ok(self.assemble_report(recommendations, unresolved, 0, usage));
        }

        let mut checkpoint = self.load_checkpoint(run_id)?;

        let total_batches = (questions.len() + self.batch_size - 1) / self.batch_size;
        for (idx, batch) in questions.chunks(self.batch_size).enumerate() {
            let batch_num = idx + 1;
            let ctx = BatchCtx::new(
                batch_num,
                total_batches,
                idx * self.batch_size + 1,
                idx * self.batch_size + batch.len(),
            );

            if let Some(cp) = checkpoint.as_ref() {
                if cp.is_batch_done(batch_num) {
                    info!("{} ⏭️ 断点已覆盖，跳过", ctx);
                    if let Some(done) = cp.completed.get(&batch_num) {
                        recommendations.extend(done.iter().cloned());
                    }
                    continue;
                }
            }

            log_batch_start(&ctx);
            let outcomes = self.flow.classify_batch(batch, &ctx, &mut usage).await;

            let mut batch_recs = Vec::new();
            for outcome in outcomes {
                match outcome {
                    ItemOutcome::Classified(rec) => batch_recs.push(rec),
                    ItemOutcome::Failed {
                        question_number,
                        reason,
                    } => {
                        warn!("❌ 题目 {} 未解决: {}", question_number, reason);
                        self.write_unresolved(&question_number, &reason);
                        unresolved.push(UnresolvedItem {
                            question_number,
                            reason,
                        });
                    }
                }
            }
            recommendations.extend(batch_recs.iter().cloned());

            if let (Some(cp), Some(store)) = (checkpoint.as_mut(), self.checkpoints.as_ref()) {
                cp.mark_batch(batch_num, batch_recs);
                store.save(cp)?;
            }

            if batch_num < total_batches {
                self.pacer.between_batches().await;
            }
        }

        if let (Some(cp), Some(store)) = (checkpoint.as_ref(), self.checkpoints.as_ref()) {
            store.remove(&cp.run_id)?;
        }

        let report = self.assemble_report(recommendations, unresolved, questions.len(), usage);
        print_final_stats(&report);
        Ok(report)
    }

    fn load_checkpoint(&self, run_id: Option<&str>) -> AppResult<Option<RunCheckpoint>> {
        let (Some(run_id), Some(store)) = (run_id, self.checkpoints.as_ref()) else {
            return Ok(None);
        };
        match store.load(run_id)? {
            Some(existing) => Ok(Some(existing)),
            None => Ok(Some(RunCheckpoint::new(run_id))),
        }
    }

    fn write_unresolved(&self, question_number: &str, reason: &str) {
        if let Some(writer) = self.unresolved_writer.as_ref() {
            if let Err(e) = writer.write(question_number, reason) {
                warn!("⚠️ 未解决记录写入失败: {}", e);
            }
        }
    }

    fn assemble_report(
        &self,
        recommendations: Vec<MappingRecommendation>,
        unresolved: Vec<UnresolvedItem>,
        total_questions: usize,
        token_usage: TokenUsage,
    ) -> AuditReport {
        let mut aggregator = CoverageAggregator::new(self.flow.references());
        for rec in &recommendations {
            for (dim, mapping) in &rec.mappings {
                aggregator.record(*dim, &mapping.code);
            }
        }

        let average_confidence = if recommendations.is_empty() {
            0.0
        } else {
            recommendations.iter().map(|r| r.confidence).sum::<f64>()
                / recommendations.len() as f64
        };

        AuditReport {
            dimensions: self.flow.references().iter().map(|r| r.dimension).collect(),
            mapped_questions: recommendations.len(),
            coverage: aggregator.all_counts(),
            gaps: aggregator.all_gaps(),
            recommendations,
            unresolved,
            total_questions,
            average_confidence,
            batch_mode: self.batch_size > 1,
            batch_size: self.batch_size,
            token_usage,
        }
    }
}

/// 预检：至少一个维度，且每个维度的参考体系非空
pub(crate) fn validate_references(references: &[ReferenceSet]) -> AppResult<()> {
    if references.is_empty() {
        return Err(AppError::Business(BusinessError::DimensionParseFailed {
            dimension: "(none)".to_string(),
        }));
    }
    for reference in references {
        if reference.is_empty() {
            return Err(AppError::Reference(ReferenceError::Empty {
                dimension: reference.dimension.to_string(),
            }));
        }
    }
    Ok(())
}

// ========== 日志辅助函数 ==========

pub(crate) fn log_run_start(
    mode: &str,
    total_questions: usize,
    batch_size: usize,
    dimensions: &[crate::models::dimension::Dimension],
) {
    let keys: Vec<&str> = dimensions.iter().map(|d| d.key()).collect();
    info!("{}", "=".repeat(60));
    info!("🚀 开始{} - 维度: {}", mode, keys.join(", "));
    info!("📊 题目总数: {} | 批次大小: {}", total_questions, batch_size);
    info!("{}", "=".repeat(60));
}

fn log_batch_start(ctx: &BatchCtx) {
    info!("\n{}", "─".repeat(60));
    info!("📦 {} 题目 {}-{}", ctx, ctx.start, ctx.end);
    info!("{}", "─".repeat(60));
}

fn print_final_stats(report: &AuditReport) {
    info!("\n{}", "=".repeat(60));
    info!("📊 分类审核完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!(
        "✅ 已映射: {}/{}",
        report.mapped_questions, report.total_questions
    );
    info!("❌ 未解决: {}", report.unresolved.len());
    info!("📈 平均置信度: {:.3}", report.average_confidence);
    for (dim, gaps) in &report.gaps {
        if gaps.is_empty() {
            info!("✓ 维度 {} 无缺口", dim);
        } else {
            info!("⚠️ 维度 {} 缺口: {}", dim, gaps.join(", "));
        }
    }
    info!(
        "🔢 Token 用量: {} (调用 {} 次)",
        report.token_usage.total_tokens, report.token_usage.api_calls
    );
    info!("{}", "=".repeat(60));
}

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use curriculum_audit::config::Config;
use curriculum_audit::error::{AppError, BusinessError};
use curriculum_audit::models::dimension::Dimension;
use curriculum_audit::models::loaders::{load_questions, load_references_from_path, load_table, Table};
use curriculum_audit::models::{Question, ReferenceSet};
use curriculum_audit::orchestrator::{AuditEngine, RatingEngine};
use curriculum_audit::services::{ExportApplier, LlmService, UnresolvedWriter};
use curriculum_audit::utils;
use curriculum_audit::workflow::{CheckpointStore, FixedDelayPacer};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    utils::logging::init();

    // 加载配置
    let config = Config::from_env();

    // 解析审核维度
    let dimensions = parse_dimensions(&config.dimensions)?;

    // 加载题目与参考体系
    let question_path = Path::new(&config.question_file);
    let question_table = load_table(question_path)?;
    let questions = load_questions(&question_table, &dimensions, &config.question_file)?;
    if questions.is_empty() {
        bail!(AppError::from(BusinessError::NoQuestions));
    }

    let reference_loads =
        load_references_from_path(Path::new(&config.reference_file), &dimensions)?;
    for load in &reference_loads {
        info!(
            "📋 维度 {} 布局: {} (置信度 {:.2}, {} 条)",
            load.reference.dimension,
            load.layout,
            load.confidence,
            load.reference.len()
        );
    }
    let references: Vec<_> = reference_loads.into_iter().map(|l| l.reference).collect();

    // 初始化 Oracle 与节流器（连通性测试推迟到引擎预检通过之后）
    let oracle = Arc::new(LlmService::new(&config));
    let pacer = Arc::new(FixedDelayPacer::from_config(&config));
    let unresolved_writer = UnresolvedWriter::with_path(config.unresolved_file.clone());

    std::fs::create_dir_all(&config.output_folder)
        .with_context(|| format!("创建输出目录失败: {}", config.output_folder))?;

    // 按运行模式分派
    match config.run_mode.as_str() {
        "classify" => {
            run_classify(
                &config,
                oracle,
                pacer,
                references,
                &questions,
                question_table,
                &dimensions,
                unresolved_writer,
            )
            .await
        }
        "rate" => {
            run_rate(
                &config,
                oracle,
                pacer,
                references,
                &questions,
                question_table,
                &dimensions,
                unresolved_writer,
            )
            .await
        }
        other => bail!("未知运行模式: {}（支持 classify / rate）", other),
    }
}

/// Mode A：首次分类，全部建议直接采纳并导出
#[allow(clippy::too_many_arguments)]
async fn run_classify(
    config: &Config,
    oracle: Arc<LlmService>,
    pacer: Arc<FixedDelayPacer>,
    references: Vec<ReferenceSet>,
    questions: &[Question],
    mut table: Table,
    dimensions: &[Dimension],
    unresolved_writer: UnresolvedWriter,
) -> Result<()> {
    let engine = AuditEngine::new(oracle.clone(), pacer, references, config.batch_size)?
        .with_checkpoints(CheckpointStore::new(&config.checkpoint_folder))
        .with_unresolved_writer(unresolved_writer);

    // 预检（参考体系非空）通过后才发起连通性测试，避免浪费 Oracle 调用
    oracle
        .test_connection()
        .await
        .context("Oracle 连接测试失败")?;

    let run_id = resolve_run_id(config);
    let report = engine.run(questions, Some(&run_id)).await?;

    ExportApplier::apply_mappings(&mut table, &report.recommendations, None)?;
    let out = ExportApplier::output_path(Path::new(&config.output_folder), dimensions, "xlsx");
    ExportApplier::write_xlsx(&table, &out)?;

    if !report.unresolved.is_empty() {
        warn!(
            "⚠️ {} 道题未解决，详见 {}",
            report.unresolved.len(),
            config.unresolved_file
        );
    }
    Ok(())
}

/// Mode B：评审已有映射，非 correct 的修正建议全部采纳并导出
#[allow(clippy::too_many_arguments)]
async fn run_rate(
    config: &Config,
    oracle: Arc<LlmService>,
    pacer: Arc<FixedDelayPacer>,
    references: Vec<ReferenceSet>,
    questions: &[Question],
    mut table: Table,
    dimensions: &[Dimension],
    unresolved_writer: UnresolvedWriter,
) -> Result<()> {
    let engine = RatingEngine::new(oracle.clone(), pacer, references, config.batch_size)?
        .with_unresolved_writer(unresolved_writer);

    oracle
        .test_connection()
        .await
        .context("Oracle 连接测试失败")?;

    let report = engine.run(questions).await?;

    ExportApplier::apply_corrections(&mut table, &report.recommendations, None)?;
    let out = ExportApplier::output_path(Path::new(&config.output_folder), dimensions, "xlsx");
    ExportApplier::write_xlsx(&table, &out)?;
    Ok(())
}

/// 运行标识：优先用配置的 RUN_ID（同一 id 重跑可从断点继续），
/// 未指定时退回当前时间戳
fn resolve_run_id(config: &Config) -> String {
    match config.run_id.as_deref() {
        Some(id) => id.to_string(),
        None => chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
    }
}

/// 解析逗号分隔的维度列表，未知维度直接报错
fn parse_dimensions(raw: &str) -> Result<Vec<Dimension>> {
    let mut dimensions = Vec::new();
    for part in raw.split(',') {
        let key = part.trim();
        if key.is_empty() {
            continue;
        }
        match Dimension::from_key(key) {
            Some(dim) => {
                if !dimensions.contains(&dim) {
                    dimensions.push(dim);
                }
            }
            None => bail!(AppError::from(BusinessError::DimensionParseFailed {
                dimension: key.to_string(),
            })),
        }
    }
    if dimensions.is_empty() {
        bail!("AUDIT_DIMENSIONS 未指定任何有效维度");
    }
    Ok(dimensions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_run_id_prefers_config() {
        let config = Config {
            run_id: Some("nightly_42".to_string()),
            ..Config::default()
        };
        assert_eq!(resolve_run_id(&config), "nightly_42");
    }

    #[test]
    fn test_resolve_run_id_falls_back_to_timestamp() {
        let config = Config::default();
        let run_id = resolve_run_id(&config);
        // 时间戳形如 20260829_153000
        assert_eq!(run_id.len(), 15);
        assert!(run_id.chars().nth(8) == Some('_'));
    }

    #[test]
    fn test_parse_dimensions() {
        let dims = parse_dimensions("competency, blooms,competency").expect("解析失败");
        assert_eq!(dims, vec![Dimension::Competency, Dimension::Blooms]);
        assert!(parse_dimensions("nonsense").is_err());
        assert!(parse_dimensions("").is_err());
    }
}

//! 引擎集成测试
//!
//! 用脚本化的 MockOracle 驱动完整的引擎流程（不发真实网络请求）：
//! - 分类：覆盖度 / 缺口 / 平均置信度
//! - 降级：批次失败 → 逐题兜底 → 未解决
//! - 评审：判定统计与修正建议
//! - 预检 / 钳制 / 断点续跑

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use curriculum_audit::error::{AppError, ReferenceError};
use curriculum_audit::models::dimension::Dimension;
use curriculum_audit::models::question::Question;
use curriculum_audit::models::reference::{ReferenceEntry, ReferenceSet};
use curriculum_audit::models::report::{DimensionMapping, MappingRecommendation, Rating};
use curriculum_audit::orchestrator::{AuditEngine, RatingEngine};
use curriculum_audit::services::{Oracle, OracleReply};
use curriculum_audit::workflow::{CheckpointStore, FixedDelayPacer, RunCheckpoint};

// ========== 测试工具 ==========

/// 按脚本顺序吐出应答的 Oracle
struct MockOracle {
    replies: Mutex<VecDeque<Result<String, String>>>,
}

impl MockOracle {
    fn new(replies: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
        })
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn complete(
        &self,
        _system_message: &str,
        _user_message: &str,
        _max_tokens: u32,
    ) -> anyhow::Result<OracleReply> {
        let next = self.replies.lock().expect("锁中毒").pop_front();
        match next {
            Some(Ok(content)) => Ok(OracleReply {
                content,
                prompt_tokens: 100,
                completion_tokens: 50,
            }),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("脚本应答已耗尽")),
        }
    }
}

fn competency_reference(codes: &[&str]) -> ReferenceSet {
    let mut set = ReferenceSet::new(Dimension::Competency);
    for code in codes {
        set.entries.push(ReferenceEntry {
            code: code.to_string(),
            label: "Competency".to_string(),
            description: format!("definition of {}", code),
        });
    }
    set
}

fn blooms_reference() -> ReferenceSet {
    let mut set = ReferenceSet::new(Dimension::Blooms);
    for code in ["KL1", "KL2", "KL3"] {
        set.entries.push(ReferenceEntry {
            code: code.to_string(),
            label: "Bloom".to_string(),
            description: format!("level {}", code),
        });
    }
    set
}

fn questions(count: usize) -> Vec<Question> {
    (1..=count)
        .map(|i| Question::new(format!("Q{}", i), format!("question text {}", i)))
        .collect()
}

fn mapping_entry(number: &str, code: &str, confidence: f64) -> String {
    format!(
        r#"{{"question_id":"{}","mapped_id":"{}","confidence_score":{},"justification":"matches {}"}}"#,
        number, code, confidence, code
    )
}

fn mappings_reply(entries: &[String]) -> Result<String, String> {
    Ok(format!(r#"{{"mappings":[{}]}}"#, entries.join(",")))
}

// ========== 分类（Mode A） ==========

#[tokio::test]
async fn test_classify_coverage_gaps_and_confidence() {
    let oracle = MockOracle::new(vec![mappings_reply(&[
        mapping_entry("Q1", "C1", 0.9),
        mapping_entry("Q2", "C1", 0.8),
        mapping_entry("Q3", "C2", 0.6),
    ])]);
    let references = vec![competency_reference(&["C1", "C2", "C3"])];
    let engine = AuditEngine::new(oracle, Arc::new(FixedDelayPacer::none()), references, 10)
        .expect("创建引擎失败");

    let report = engine.run(&questions(3), None).await.expect("运行失败");

    assert_eq!(report.total_questions, 3);
    assert_eq!(report.mapped_questions, 3);
    assert!(report.unresolved.is_empty());

    let coverage = report
        .coverage
        .get(&Dimension::Competency)
        .expect("缺少覆盖度");
    assert_eq!(coverage.get("C1"), Some(&2));
    assert_eq!(coverage.get("C2"), Some(&1));
    assert_eq!(coverage.get("C3"), Some(&0));
    // 覆盖度计数之和等于已映射题数
    assert_eq!(coverage.values().sum::<usize>(), report.mapped_questions);

    let gaps = report.gaps.get(&Dimension::Competency).expect("缺少缺口");
    assert_eq!(gaps, &vec!["C3".to_string()]);

    let expected = (0.9 + 0.8 + 0.6) / 3.0;
    assert!((report.average_confidence - expected).abs() < 1e-9);
    assert_eq!(report.token_usage.api_calls, 1);
    assert_eq!(report.token_usage.total_tokens, 150);
}

#[tokio::test]
async fn test_classify_degrades_to_per_item_fallback() {
    // 批次 2 整体失败，两道题逐题兜底后仍然全部有结果
    let oracle = MockOracle::new(vec![
        mappings_reply(&[mapping_entry("Q1", "C1", 0.9), mapping_entry("Q2", "C2", 0.9)]),
        Err("网络抖动".to_string()),
        mappings_reply(&[mapping_entry("Q3", "C1", 0.7)]),
        mappings_reply(&[mapping_entry("Q4", "C3", 0.7)]),
        mappings_reply(&[mapping_entry("Q5", "C2", 0.8)]),
    ]);
    let references = vec![competency_reference(&["C1", "C2", "C3"])];
    let engine = AuditEngine::new(oracle, Arc::new(FixedDelayPacer::none()), references, 2)
        .expect("创建引擎失败");

    let report = engine.run(&questions(5), None).await.expect("运行失败");

    assert_eq!(report.mapped_questions, 5);
    assert!(report.batch_mode);
    assert!(report.unresolved.is_empty());
    let numbers: Vec<&str> = report
        .recommendations
        .iter()
        .map(|r| r.question_number.as_str())
        .collect();
    assert_eq!(numbers, vec!["Q1", "Q2", "Q3", "Q4", "Q5"]);
}

#[tokio::test]
async fn test_classify_fallback_failure_is_unresolved() {
    let oracle = MockOracle::new(vec![
        Err("批次调用失败".to_string()),
        Err("兜底也失败".to_string()),
    ]);
    let references = vec![competency_reference(&["C1"])];
    let engine = AuditEngine::new(oracle, Arc::new(FixedDelayPacer::none()), references, 5)
        .expect("创建引擎失败");

    let report = engine.run(&questions(1), None).await.expect("运行失败");

    assert_eq!(report.mapped_questions, 0);
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].question_number, "Q1");
    assert!(!report.unresolved[0].reason.is_empty());
}

#[tokio::test]
async fn test_classify_multi_dimension_nested_reply() {
    let oracle = MockOracle::new(vec![Ok(r#"{"mappings":[{
        "question_id":"Q1",
        "competency":{"code":"C2","confidence":0.9},
        "blooms":{"code":"KL3","confidence":0.7},
        "justification":"applies knowledge"
    }]}"#
        .to_string())]);
    let references = vec![competency_reference(&["C1", "C2"]), blooms_reference()];
    let engine = AuditEngine::new(oracle, Arc::new(FixedDelayPacer::none()), references, 5)
        .expect("创建引擎失败");

    let report = engine.run(&questions(1), None).await.expect("运行失败");

    assert_eq!(report.mapped_questions, 1);
    let rec = &report.recommendations[0];
    assert_eq!(rec.mappings[&Dimension::Competency].code, "C2");
    assert_eq!(rec.mappings[&Dimension::Blooms].code, "KL3");
    assert!((rec.confidence - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_empty_reference_fails_preflight() {
    let oracle = MockOracle::new(vec![]);
    let references = vec![ReferenceSet::new(Dimension::Competency)];
    let result = AuditEngine::new(oracle, Arc::new(FixedDelayPacer::none()), references, 5);

    match result {
        Err(AppError::Reference(ReferenceError::Empty { dimension })) => {
            assert_eq!(dimension, "competency");
        }
        other => panic!("期望 ReferenceError::Empty，得到 {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_batch_size_is_clamped() {
    let references = vec![competency_reference(&["C1"])];
    let engine = AuditEngine::new(
        MockOracle::new(vec![]),
        Arc::new(FixedDelayPacer::none()),
        references.clone(),
        50,
    )
    .expect("创建引擎失败");
    assert_eq!(engine.batch_size(), 10);

    let engine = AuditEngine::new(
        MockOracle::new(vec![]),
        Arc::new(FixedDelayPacer::none()),
        references,
        0,
    )
    .expect("创建引擎失败");
    assert_eq!(engine.batch_size(), 1);
}

#[tokio::test]
async fn test_classify_resumes_from_checkpoint() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let store = CheckpointStore::new(dir.path());

    // 预置：批次 1（Q1、Q2）已完成
    let mut checkpoint = RunCheckpoint::new("run_001");
    let done: Vec<MappingRecommendation> = ["Q1", "Q2"]
        .iter()
        .map(|number| {
            let mut mappings = BTreeMap::new();
            mappings.insert(
                Dimension::Competency,
                DimensionMapping {
                    code: "C1".to_string(),
                    subtopic: None,
                    confidence: 0.9,
                },
            );
            MappingRecommendation {
                question_number: number.to_string(),
                question_text: String::new(),
                mappings,
                confidence: 0.9,
                justification: String::new(),
            }
        })
        .collect();
    checkpoint.mark_batch(1, done);
    store.save(&checkpoint).expect("保存断点失败");

    // 只为批次 2 准备应答；批次 1 若未被跳过脚本就会耗尽
    let oracle = MockOracle::new(vec![mappings_reply(&[
        mapping_entry("Q3", "C2", 0.8),
        mapping_entry("Q4", "C2", 0.8),
    ])]);
    let references = vec![competency_reference(&["C1", "C2"])];
    let engine = AuditEngine::new(oracle, Arc::new(FixedDelayPacer::none()), references, 2)
        .expect("创建引擎失败")
        .with_checkpoints(CheckpointStore::new(dir.path()));

    let report = engine
        .run(&questions(4), Some("run_001"))
        .await
        .expect("运行失败");

    assert_eq!(report.mapped_questions, 4);
    assert_eq!(report.token_usage.api_calls, 1);
    // 跑完后断点被清理
    let leftover = store.load("run_001").expect("读取断点失败");
    assert!(leftover.is_none());
}

// ========== 评审（Mode B） ==========

fn rated_questions(count: usize) -> Vec<Question> {
    let mut questions = questions(count);
    for question in &mut questions {
        question
            .existing
            .insert(Dimension::Competency, "C1".to_string());
    }
    questions
}

#[tokio::test]
async fn test_rating_summary_and_recommendations() {
    let oracle = MockOracle::new(vec![Ok(r#"{"ratings":[
        {"question_id":"Q1","rating":"correct","agreement_score":0.9},
        {"question_id":"Q2","rating":"incorrect","suggested_id":"C3","agreement_score":0.8},
        {"question_id":"Q3","rating":"partially_correct","suggested_id":"C2","agreement_score":0.7},
        {"question_id":"Q4","rating":"correct","agreement_score":0.6}
    ]}"#
        .to_string())]);
    let references = vec![competency_reference(&["C1", "C2", "C3"])];
    let engine = RatingEngine::new(oracle, Arc::new(FixedDelayPacer::none()), references, 10)
        .expect("创建引擎失败");

    let report = engine.run(&rated_questions(4)).await.expect("运行失败");

    assert_eq!(report.summary.total_rated, 4);
    assert_eq!(report.summary.correct, 2);
    assert_eq!(report.summary.partially_correct, 1);
    assert_eq!(report.summary.incorrect, 1);
    assert!((report.summary.accuracy_rate - 0.5).abs() < 1e-9);

    assert_eq!(report.recommendations.len(), 2);
    let suggested: Vec<&str> = report
        .recommendations
        .iter()
        .map(|r| r.suggested_code.as_str())
        .collect();
    assert!(suggested.contains(&"C3"));
    assert!(suggested.contains(&"C2"));
    assert!(report
        .recommendations
        .iter()
        .all(|r| r.current_code == "C1"));
}

#[tokio::test]
async fn test_rating_overall_is_worst_dimension() {
    let oracle = MockOracle::new(vec![Ok(r#"{"ratings":[{
        "question_id":"Q1",
        "competency":{"rating":"correct","agreement_score":0.9},
        "blooms":{"rating":"incorrect","suggested_id":"KL3","agreement_score":0.4}
    }]}"#
        .to_string())]);
    let references = vec![competency_reference(&["C1"]), blooms_reference()];
    let engine = RatingEngine::new(oracle, Arc::new(FixedDelayPacer::none()), references, 5)
        .expect("创建引擎失败");

    let mut questions = rated_questions(1);
    questions[0]
        .existing
        .insert(Dimension::Blooms, "KL1".to_string());

    let report = engine.run(&questions).await.expect("运行失败");
    assert_eq!(report.ratings.len(), 1);
    assert_eq!(report.ratings[0].overall_rating, Rating::Incorrect);
    assert_eq!(report.summary.incorrect, 1);
}

#[tokio::test]
async fn test_rating_fallback_on_bad_json() {
    // 批次应答不是 JSON，逐题兜底后仍然产出评审
    let oracle = MockOracle::new(vec![
        Ok("对不起，我不能返回 JSON".to_string()),
        Ok(r#"{"ratings":[{"question_id":"Q1","rating":"correct","agreement_score":0.9}]}"#
            .to_string()),
    ]);
    let references = vec![competency_reference(&["C1"])];
    let engine = RatingEngine::new(oracle, Arc::new(FixedDelayPacer::none()), references, 5)
        .expect("创建引擎失败");

    let report = engine.run(&rated_questions(1)).await.expect("运行失败");
    assert_eq!(report.summary.total_rated, 1);
    assert_eq!(report.summary.correct, 1);
    assert!(report.unresolved.is_empty());
}

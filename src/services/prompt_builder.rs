//! 提示词构建 - 业务能力层
//!
//! 纯函数：把参考体系和题目批次渲染成发给 Oracle 的自然语言请求。
//! 五种形态：单题分类、批量分类、批量评审、多维度批量分类、多维度批量评审。
//! 所有形态都要求 Oracle 在每个条目里回显 question_id，便于解析端按 id 对齐

use crate::models::dimension::Dimension;
use crate::models::question::Question;
use crate::models::reference::ReferenceSet;

/// 系统提示词（所有请求共用）
pub const SYSTEM_PROMPT: &str = "You are an expert in medical education and curriculum mapping. \
You classify exam questions against curriculum frameworks precisely and return only valid JSON, \
with no commentary outside the JSON object.";

/// 渲染参考体系定义块
pub fn render_reference(reference: &ReferenceSet) -> String {
    let mut lines = Vec::with_capacity(reference.entries.len());
    for entry in &reference.entries {
        if entry.description.is_empty() {
            lines.push(format!("- {}", entry.code));
        } else if entry.label.is_empty() {
            lines.push(format!("- {}: {}", entry.code, entry.description));
        } else {
            lines.push(format!(
                "- {} ({}): {}",
                entry.code, entry.label, entry.description
            ));
        }
    }
    lines.join("\n")
}

/// 渲染题目批次，形如 `[Q12]: 题目全文`
fn render_batch(batch: &[Question]) -> String {
    batch
        .iter()
        .map(|q| format!("[{}]: {}", q.number, q.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 单维度分类的条目 schema
fn mapping_entry_schema(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::AreaTopics => {
            r#"{"question_id": "<id>", "mapped_topic": "<topic>", "mapped_subtopic": "<subtopic>", "confidence_score": <0.0-1.0>, "justification": "<brief reason>"}"#
        }
        _ => {
            r#"{"question_id": "<id>", "mapped_id": "<code>", "confidence_score": <0.0-1.0>, "justification": "<brief reason>"}"#
        }
    }
}

/// 单题分类提示词（也用于批次失败后的逐题兜底）
pub fn single_mapping_prompt(question: &Question, reference: &ReferenceSet) -> String {
    format!(
        r#"Classify the following exam question against the {dimension} framework below.

{dimension} framework:
{reference}

Question [{id}]:
{text}

Respond with a JSON object of this exact shape:
{{"mappings": [{schema}]}}

Use only codes that appear in the framework. Echo the question id exactly as given."#,
        dimension = reference.dimension.display_name(),
        reference = render_reference(reference),
        id = question.number,
        text = question.text,
        schema = mapping_entry_schema(reference.dimension),
    )
}

/// 批量分类提示词（单维度）
pub fn batch_mapping_prompt(batch: &[Question], reference: &ReferenceSet) -> String {
    format!(
        r#"Classify each of the following {count} exam questions against the {dimension} framework below.

{dimension} framework:
{reference}

Questions (each tagged with its id):
{questions}

Respond with a JSON object of this exact shape, one entry per question, in the same order:
{{"mappings": [{schema}, ...]}}

Use only codes that appear in the framework. Echo each question id exactly as given."#,
        count = batch.len(),
        dimension = reference.dimension.display_name(),
        reference = render_reference(reference),
        questions = render_batch(batch),
        schema = mapping_entry_schema(reference.dimension),
    )
}

/// 多维度批量分类提示词
pub fn multi_mapping_prompt(batch: &[Question], references: &[ReferenceSet]) -> String {
    let mut framework_blocks = Vec::new();
    let mut entry_fields = vec![r#""question_id": "<id>""#.to_string()];

    for reference in references {
        framework_blocks.push(format!(
            "{} framework:\n{}",
            reference.dimension.display_name(),
            render_reference(reference)
        ));
        let field = match reference.dimension {
            Dimension::AreaTopics => {
                r#""area_topics": {"topic": "<topic>", "subtopic": "<subtopic>", "confidence": <0.0-1.0>}"#.to_string()
            }
            dim => format!(
                r#""{}": {{"code": "<code>", "confidence": <0.0-1.0>}}"#,
                dim.key()
            ),
        };
        entry_fields.push(field);
    }
    entry_fields.push(r#""justification": "<brief reason>""#.to_string());

    format!(
        r#"Classify each of the following {count} exam questions against ALL of the frameworks below.

{frameworks}

Questions (each tagged with its id):
{questions}

Respond with a JSON object of this exact shape, one entry per question, in the same order:
{{"mappings": [{{{entry}}}, ...]}}

Use only codes that appear in the corresponding framework. Echo each question id exactly as given."#,
        count = batch.len(),
        frameworks = framework_blocks.join("\n\n"),
        questions = render_batch(batch),
        entry = entry_fields.join(", "),
    )
}

/// 渲染评审批次：题目 + 当前映射
fn render_rating_batch(batch: &[Question], dimension: Dimension) -> String {
    batch
        .iter()
        .map(|q| {
            format!(
                "[{}]: {}\nCurrent mapping: {}",
                q.number,
                q.text,
                q.existing_mapping(dimension).unwrap_or("(none)")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 批量评审提示词（单维度）
pub fn batch_rating_prompt(batch: &[Question], reference: &ReferenceSet) -> String {
    format!(
        r#"Each of the following {count} exam questions has already been mapped to the {dimension} framework below. Rate each existing mapping.

{dimension} framework:
{reference}

Questions with their current mappings:
{questions}

Respond with a JSON object of this exact shape, one entry per question, in the same order:
{{"ratings": [{{"question_id": "<id>", "rating": "correct" | "partially_correct" | "incorrect", "agreement_score": <0.0-1.0>, "suggested_id": "<better code, or the current one if correct>", "justification": "<brief reason>"}}, ...]}}

Use only codes that appear in the framework. Echo each question id exactly as given."#,
        count = batch.len(),
        dimension = reference.dimension.display_name(),
        reference = render_reference(reference),
        questions = render_rating_batch(batch, reference.dimension),
    )
}

/// 单题评审提示词（评审模式的逐题兜底）
pub fn single_rating_prompt(question: &Question, reference: &ReferenceSet) -> String {
    batch_rating_prompt(std::slice::from_ref(question), reference)
}

/// 多维度批量评审提示词
pub fn multi_rating_prompt(batch: &[Question], references: &[ReferenceSet]) -> String {
    let mut framework_blocks = Vec::new();
    let mut entry_fields = vec![r#""question_id": "<id>""#.to_string()];

    for reference in references {
        framework_blocks.push(format!(
            "{} framework:\n{}",
            reference.dimension.display_name(),
            render_reference(reference)
        ));
        entry_fields.push(format!(
            r#""{}": {{"current": "<current code>", "rating": "correct" | "partially_correct" | "incorrect", "suggested": "<code>", "confidence": <0.0-1.0>}}"#,
            reference.dimension.key()
        ));
    }
    entry_fields.push(r#""overall_rating": "correct" | "partially_correct" | "incorrect""#.to_string());
    entry_fields.push(r#""justification": "<brief reason>""#.to_string());

    let questions = batch
        .iter()
        .map(|q| {
            let current: Vec<String> = references
                .iter()
                .map(|r| {
                    format!(
                        "{}: {}",
                        r.dimension.key(),
                        q.existing_mapping(r.dimension).unwrap_or("(none)")
                    )
                })
                .collect();
            format!(
                "[{}]: {}\nCurrent mappings: {}",
                q.number,
                q.text,
                current.join("; ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"Each of the following {count} exam questions has already been mapped against ALL of the frameworks below. Rate every existing mapping.

{frameworks}

Questions with their current mappings:
{questions}

Respond with a JSON object of this exact shape, one entry per question, in the same order:
{{"ratings": [{{{entry}}}, ...]}}

Use only codes that appear in the corresponding framework. Echo each question id exactly as given."#,
        count = batch.len(),
        frameworks = framework_blocks.join("\n\n"),
        questions = questions,
        entry = entry_fields.join(", "),
    )
}

/// 应答 token 预算
///
/// 随批次大小和维度数量同时放大，避免长批次被截断
pub fn response_budget(items: usize, dimensions: usize, rating: bool) -> u32 {
    let items = items.max(1) as u32;
    let extra_dims = dimensions.saturating_sub(1) as u32;
    if rating {
        let base = 2500u32.max(350 * items);
        base + 300 * extra_dims
    } else if items == 1 && extra_dims == 0 {
        500
    } else {
        let base = 2000u32.max(300 * items);
        base + 500 * extra_dims
    }
}

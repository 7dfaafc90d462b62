//! Oracle 应答解析 - 业务能力层
//!
//! Oracle 的应答只是"大概率是 JSON"：可能带 ```json 围栏、
//! 夹杂解释文字、条目缺字段或数量不足。这里做三件事：
//! 1. 宽松提取 JSON（剥围栏 → 直接解析 → 提取第一段配平的 JSON）
//! 2. 条目与批次对齐（优先按回显的 question_id，缺失时退回位置对齐并告警）
//! 3. 字段兜底（置信度缺省 0.0，理由缺省空串；越界置信度原样放行并告警）

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, OracleError};

/// 宽松解析 JSON 应答
pub fn parse_json_relaxed(content: &str) -> AppResult<Value> {
    let trimmed = strip_code_fences(content);

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    if let Some(candidate) = extract_first_balanced_json(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            debug!("从混合文本中提取出 JSON（{} 字符）", candidate.len());
            return Ok(value);
        }
    }

    Err(AppError::Oracle(OracleError::InvalidJson {
        snippet: snippet(content),
    }))
}

/// 剥掉 ```json / ``` 围栏
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // 跳过围栏语言标记所在的首行
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

/// 提取第一段大括号 / 中括号配平的 JSON 片段
///
/// 逐字符扫描，跟踪字符串与转义状态，避免把字符串里的括号算进深度
fn extract_first_balanced_json(content: &str) -> Option<&str> {
    let bytes = content.as_bytes();
    let start = content.find(|c| c == '{' || c == '[')?;
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            _ if in_string => {}
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn snippet(content: &str) -> String {
    crate::utils::logging::truncate_text(content, 120)
}

/// 把应答条目对齐到批次的题号序列
///
/// 所有条目都带 question_id 时按 id 匹配；否则退回位置对齐并记录告警。
/// 返回与 `ids` 等长的向量，缺失的条目为 `None`，多余的条目被忽略
pub fn aligned_entries(payload: &Value, key: &str, ids: &[String]) -> Vec<Option<Value>> {
    let entries: Vec<Value> = match payload.get(key) {
        Some(Value::Array(arr)) => arr.clone(),
        // 缺少预期的数组键按空数组处理
        _ => {
            warn!("⚠️ 应答缺少 \"{}\" 数组，按空结果处理", key);
            Vec::new()
        }
    };

    if entries.len() > ids.len() {
        warn!(
            "⚠️ 应答条目数 {} 超过批次大小 {}，多余条目被忽略",
            entries.len(),
            ids.len()
        );
    }

    let all_have_ids = !entries.is_empty() && entries.iter().all(|e| entry_id(e).is_some());

    if all_have_ids {
        ids.iter()
            .map(|id| {
                let found = entries
                    .iter()
                    .find(|e| entry_id(e).map(|eid| eid == id.trim()).unwrap_or(false))
                    .cloned();
                if found.is_none() {
                    warn!("⚠️ 应答中找不到题号 {} 的条目", id);
                }
                found
            })
            .collect()
    } else {
        if !entries.is_empty() {
            warn!("⚠️ 应答条目未回显 question_id，退回按位置对齐");
        }
        ids.iter()
            .enumerate()
            .map(|(i, _)| entries.get(i).cloned())
            .collect()
    }
}

/// 条目里回显的题号
fn entry_id(entry: &Value) -> Option<&str> {
    entry
        .get("question_id")
        .or_else(|| entry.get("id"))
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
}

/// 按候选字段名取字符串
pub fn str_field(entry: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        entry
            .get(*name)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// 按候选字段名取数值，缺失时取默认值
pub fn num_field(entry: &Value, names: &[&str], default: f64) -> f64 {
    names
        .iter()
        .find_map(|name| entry.get(*name).and_then(|v| v.as_f64()))
        .unwrap_or(default)
}

/// 校验置信度范围：越界的值原样放行，只告警
pub fn checked_confidence(value: f64, question_number: &str) -> f64 {
    if !(0.0..=1.0).contains(&value) {
        warn!(
            "⚠️ 题目 {} 的置信度 {} 超出 [0,1] 范围，原样保留",
            question_number, value
        );
    }
    value
}

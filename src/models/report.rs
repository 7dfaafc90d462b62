//! 审核结果数据模型
//!
//! 包含分类建议、评审结果、运行汇总与 token 用量统计

use std::collections::BTreeMap;

use crate::models::dimension::Dimension;

/// 单个维度的映射结果
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DimensionMapping {
    /// 映射到的编码（或主题名）
    pub code: String,
    /// 子主题（仅 area_topics 维度使用）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtopic: Option<String>,
    /// 置信度（建议范围 [0,1]，越界值原样保留）
    pub confidence: f64,
}

/// 一道题目的分类建议（每次运行、每题一条）
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MappingRecommendation {
    pub question_number: String,
    pub question_text: String,
    /// 各维度的映射结果
    pub mappings: BTreeMap<Dimension, DimensionMapping>,
    /// 平均置信度（多维度时为各维度均值）
    pub confidence: f64,
    pub justification: String,
}

impl MappingRecommendation {
    /// 展示用的映射摘要，多个维度用 " | " 连接
    pub fn recommended_display(&self) -> String {
        let parts: Vec<String> = self
            .mappings
            .iter()
            .map(|(dim, m)| match (&m.subtopic, dim) {
                (Some(sub), Dimension::AreaTopics) if !sub.is_empty() => {
                    format!("{} - {}", m.code, sub)
                }
                _ => m.code.clone(),
            })
            .collect();
        parts.join(" | ")
    }
}

/// 评审判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Correct,
    PartiallyCorrect,
    Incorrect,
    /// Oracle 返回了无法识别的判定值
    Unknown,
}

impl Rating {
    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Correct => "correct",
            Rating::PartiallyCorrect => "partially_correct",
            Rating::Incorrect => "incorrect",
            Rating::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "correct" => Rating::Correct,
            "partially_correct" | "partially correct" | "partial" => Rating::PartiallyCorrect,
            "incorrect" | "wrong" => Rating::Incorrect,
            _ => Rating::Unknown,
        }
    }

    /// 严重程度（多维度时整体判定取最差）
    fn severity(self) -> u8 {
        match self {
            Rating::Correct => 0,
            Rating::PartiallyCorrect => 1,
            Rating::Unknown => 2,
            Rating::Incorrect => 3,
        }
    }

    pub fn worst(a: Rating, b: Rating) -> Rating {
        if b.severity() > a.severity() {
            b
        } else {
            a
        }
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 单个维度的评审结果
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DimensionRating {
    /// 题目当前的映射编码
    pub current: String,
    pub rating: Rating,
    /// Oracle 建议的替换编码
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested: Option<String>,
    /// 认同度（建议范围 [0,1]）
    pub confidence: f64,
}

/// 一道题目的完整评审结果
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RatingResult {
    pub question_number: String,
    pub question_text: String,
    pub dimension_ratings: BTreeMap<Dimension, DimensionRating>,
    /// 整体判定（各维度取最差）
    pub overall_rating: Rating,
    /// 整体认同度（各维度均值）
    pub agreement_score: f64,
    pub justification: String,
}

/// 修正建议（评审模式下非 correct 的题目）
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CorrectionRecommendation {
    pub question_number: String,
    pub question_text: String,
    pub dimension: Dimension,
    pub current_code: String,
    pub suggested_code: String,
    pub suggestion_confidence: f64,
    pub rating: Rating,
    pub justification: String,
}

/// 双重失败（批次 + 兜底均失败）后留下的未解决题目
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UnresolvedItem {
    pub question_number: String,
    pub reason: String,
}

/// Token 用量统计（跨整次运行累计）
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub api_calls: u64,
}

impl TokenUsage {
    pub fn record(&mut self, prompt_tokens: u32, completion_tokens: u32) {
        self.prompt_tokens += prompt_tokens as u64;
        self.completion_tokens += completion_tokens as u64;
        self.total_tokens += (prompt_tokens + completion_tokens) as u64;
        self.api_calls += 1;
    }
}

/// 分类模式（Mode A）运行报告
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditReport {
    pub dimensions: Vec<Dimension>,
    pub recommendations: Vec<MappingRecommendation>,
    /// 维度 → 编码 → 命中次数（含零命中的参考编码）
    pub coverage: BTreeMap<Dimension, BTreeMap<String, usize>>,
    /// 维度 → 零命中的编码列表
    pub gaps: BTreeMap<Dimension, Vec<String>>,
    pub unresolved: Vec<UnresolvedItem>,
    pub total_questions: usize,
    pub mapped_questions: usize,
    pub average_confidence: f64,
    pub batch_mode: bool,
    pub batch_size: usize,
    pub token_usage: TokenUsage,
}

/// 单个维度的评审计数
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct DimensionSummary {
    pub correct: usize,
    pub partially_correct: usize,
    pub incorrect: usize,
    /// Oracle 返回了无法识别判定值的条目数
    pub unknown: usize,
}

/// 评审模式汇总统计
#[derive(Debug, Clone, serde::Serialize)]
pub struct RatingSummary {
    pub total_rated: usize,
    pub correct: usize,
    pub partially_correct: usize,
    pub incorrect: usize,
    /// 无法识别的判定（保证四个计数之和等于 total_rated）
    pub unknown: usize,
    /// correct / total_rated，空集时为 0
    pub accuracy_rate: f64,
    pub average_agreement_score: f64,
    pub per_dimension: BTreeMap<Dimension, DimensionSummary>,
}

/// 评审模式（Mode B）运行报告
#[derive(Debug, Clone, serde::Serialize)]
pub struct RatingReport {
    pub dimensions: Vec<Dimension>,
    pub ratings: Vec<RatingResult>,
    pub summary: RatingSummary,
    pub recommendations: Vec<CorrectionRecommendation>,
    pub unresolved: Vec<UnresolvedItem>,
    pub token_usage: TokenUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_parse() {
        assert_eq!(Rating::parse("correct"), Rating::Correct);
        assert_eq!(Rating::parse("Partially Correct"), Rating::PartiallyCorrect);
        assert_eq!(Rating::parse("INCORRECT"), Rating::Incorrect);
        assert_eq!(Rating::parse("maybe"), Rating::Unknown);
    }

    #[test]
    fn test_rating_worst() {
        assert_eq!(Rating::worst(Rating::Correct, Rating::Incorrect), Rating::Incorrect);
        assert_eq!(
            Rating::worst(Rating::PartiallyCorrect, Rating::Correct),
            Rating::PartiallyCorrect
        );
        assert_eq!(Rating::worst(Rating::Unknown, Rating::Incorrect), Rating::Incorrect);
    }

    #[test]
    fn test_recommended_display_joins_dimensions() {
        let mut rec = MappingRecommendation {
            question_number: "Q1".to_string(),
            question_text: "What is shock?".to_string(),
            mappings: BTreeMap::new(),
            confidence: 0.9,
            justification: String::new(),
        };
        rec.mappings.insert(
            Dimension::AreaTopics,
            DimensionMapping {
                code: "Cardiology".to_string(),
                subtopic: Some("Shock".to_string()),
                confidence: 0.9,
            },
        );
        rec.mappings.insert(
            Dimension::Blooms,
            DimensionMapping {
                code: "KL2".to_string(),
                subtopic: None,
                confidence: 0.8,
            },
        );

        assert_eq!(rec.recommended_display(), "Cardiology - Shock | KL2");
    }

    #[test]
    fn test_token_usage_record() {
        let mut usage = TokenUsage::default();
        usage.record(100, 20);
        usage.record(50, 10);
        assert_eq!(usage.prompt_tokens, 150);
        assert_eq!(usage.completion_tokens, 30);
        assert_eq!(usage.total_tokens, 180);
        assert_eq!(usage.api_calls, 2);
    }
}

//! 题目数据模型

use std::collections::BTreeMap;

use crate::models::dimension::Dimension;

/// 待审核的题目
///
/// `text` 可能由题干和选择题选项拼接而成；
/// `existing` 保存各维度的已有映射（评审模式使用）
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Question {
    /// 题号（外部提供的字符串标识）
    pub number: String,
    /// 题目全文
    pub text: String,
    /// 各维度的已有映射编码
    #[serde(default)]
    pub existing: BTreeMap<Dimension, String>,
}

impl Question {
    pub fn new(number: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            text: text.into(),
            existing: BTreeMap::new(),
        }
    }

    /// 取某维度的已有映射
    pub fn existing_mapping(&self, dimension: Dimension) -> Option<&str> {
        self.existing.get(&dimension).map(|s| s.as_str())
    }
}

impl std::fmt::Display for Question {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[题目 #{}]", self.number)
    }
}

//! 参考体系数据模型
//!
//! 一个 `ReferenceSet` 对应一个维度的完整分类定义表，加载后不可变

use crate::models::dimension::Dimension;

/// 参考体系中的一条定义
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ReferenceEntry {
    /// 编码（如 C3、MI1.2，或主题名）
    pub code: String,
    /// 类别标签（如 Competency / Objective，或子主题列表）
    pub label: String,
    /// 描述文本
    pub description: String,
}

/// 某一维度的参考体系
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ReferenceSet {
    pub dimension: Dimension,
    pub entries: Vec<ReferenceEntry>,
}

impl ReferenceSet {
    pub fn new(dimension: Dimension) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 全部编码
    pub fn codes(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.code.as_str()).collect()
    }

    /// 按编码查找（大小写不敏感）
    pub fn get(&self, code: &str) -> Option<&ReferenceEntry> {
        self.entries
            .iter()
            .find(|e| e.code.eq_ignore_ascii_case(code.trim()))
    }
}
